//! Playlist engine
//!
//! Owns the ordered playback queue, the per-track playing flag, and the
//! next/previous pointers, and drives playable handles through the
//! resource pool. One track plays at a time: the queue head starts
//! automatically, finished tracks are dequeued and the next one begins.
//!
//! All mutation happens through `&mut self` intents plus the completion
//! drain in `poll_completions`, so one signal is always fully processed
//! before the next — ordering, not locking, is what keeps two begins
//! from racing on the same handle.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::mpsc::{ unbounded_channel, UnboundedReceiver, UnboundedSender };

use crate::catalog::{ Catalog, Locator, Track };
use crate::pool::ResourcePool;
use crate::resource::{ Completion, ResourceError, ResourceLayer };


/// Errors surfaced by engine intents.
#[derive( Debug, Error )]
pub enum EngineError {
    #[error( "Unknown locator: {0}" )]
    UnknownLocator( Locator ),

    #[error( "Resource error: {0}" )]
    Resource( #[from] ResourceError ),
}


/// Immutable copy of the caller-visible engine state.
///
/// Returned after every intent so a UI can re-render without reaching
/// into the engine; also serves as the rollback checkpoint that keeps
/// failed intents from leaving partial mutations behind.
#[derive( Debug, Clone, PartialEq )]
pub struct EngineSnapshot {
    /// Queued locators, head (index 0) first.
    pub queue: Vec<Locator>,
    /// Locator → "is currently playing". Entries linger after a track
    /// leaves the queue until the next pause clears them.
    pub status: HashMap<Locator, bool>,
    /// Best-effort hint: what plays after the current track.
    pub next_track: Option<Locator>,
    /// Best-effort hint: what played before the current head.
    pub prev_track: Option<Locator>,
}


impl EngineSnapshot {
    /// True if the locator is marked playing.
    pub fn is_playing( &self, locator: &Locator ) -> bool {
        self.status.get( locator ).copied().unwrap_or( false )
    }
}


/// Single-track-at-a-time playlist engine.
pub struct PlaylistEngine {
    catalog: Catalog,
    pool: ResourcePool,
    queue: Vec<Locator>,
    status: HashMap<Locator, bool>,
    next_track: Option<Locator>,
    prev_track: Option<Locator>,
    completion_tx: UnboundedSender<Completion>,
    completion_rx: UnboundedReceiver<Completion>,
}


impl PlaylistEngine {
    /// Creates an engine for the given catalog, playing through the
    /// given resource layer.
    pub fn new( catalog: Catalog, layer: Box<dyn ResourceLayer> ) -> Self {
        let ( completion_tx, completion_rx ) = unbounded_channel();

        Self {
            catalog,
            pool: ResourcePool::new( layer ),
            queue: Vec::new(),
            status: HashMap::new(),
            next_track: None,
            prev_track: None,
            completion_tx,
            completion_rx,
        }
    }


    /// Appends a track to the queue.
    ///
    /// A locator already in the queue is a no-op. If the queue was empty
    /// the track starts playing immediately.
    pub fn enqueue( &mut self, locator: &Locator ) -> Result<EngineSnapshot, EngineError> {
        self.ensure_known( locator )?;

        if self.queue.contains( locator ) {
            tracing::debug!( "Already queued: {}", locator );
            return Ok( self.snapshot() );
        }

        let saved = self.snapshot();
        let result = self.enqueue_inner( locator );
        self.commit( saved, result )
    }


    fn enqueue_inner( &mut self, locator: &Locator ) -> Result<(), EngineError> {
        self.queue.push( locator.clone() );

        if self.queue.len() == 1 {
            self.begin_playback( locator, None )?;
        } else {
            self.next_track = self.queue.get( 1 ).cloned();
        }

        Ok(())
    }


    /// Pauses the playing head, or promotes a track to the head and
    /// plays it.
    ///
    /// Only the head-and-playing case pauses in place (position kept);
    /// every other case moves the track to the front of the queue,
    /// pausing and rewinding whatever was playing there.
    pub fn toggle_play_pause( &mut self, locator: &Locator ) -> Result<EngineSnapshot, EngineError> {
        self.ensure_known( locator )?;

        if self.queue.first() == Some( locator ) && self.is_playing( locator ) {
            if let Some( handle ) = self.pool.get_mut( locator ) {
                handle.pause();
            }
            self.status.insert( locator.clone(), false );
            tracing::info!( "Paused: {}", locator );
            return Ok( self.snapshot() );
        }

        let saved = self.snapshot();
        let result = self.toggle_inner( locator );
        self.commit( saved, result )
    }


    fn toggle_inner( &mut self, locator: &Locator ) -> Result<(), EngineError> {
        let prior_head = self.queue.first().cloned();

        // Promoting always rewinds the displaced head, playing or paused;
        // a later toggle back restarts it from the top.
        if let Some( prior ) = prior_head.as_ref() {
            if prior != locator {
                if let Some( handle ) = self.pool.get_mut( prior ) {
                    handle.pause();
                    handle.reset_position();
                }
                self.status.insert( prior.clone(), false );
            }
        }

        if let Some( pos ) = self.queue.iter().position( |l| l == locator ) {
            self.queue.remove( pos );
        }
        self.queue.insert( 0, locator.clone() );

        self.begin_playback( locator, prior_head )
    }


    /// Removes a track from the queue wherever it sits.
    ///
    /// Removing the head pauses and rewinds it, then starts the new head
    /// if one exists. Removing any other entry only changes the order.
    pub fn remove_from_playlist( &mut self, locator: &Locator ) -> Result<EngineSnapshot, EngineError> {
        self.ensure_known( locator )?;

        let Some( pos ) = self.queue.iter().position( |l| l == locator ) else {
            tracing::debug!( "Not queued: {}", locator );
            return Ok( self.snapshot() );
        };

        let saved = self.snapshot();
        let result = self.remove_inner( locator, pos );
        self.commit( saved, result )
    }


    fn remove_inner( &mut self, locator: &Locator, pos: usize ) -> Result<(), EngineError> {
        self.queue.remove( pos );
        self.next_track = self.queue.get( 1 ).cloned();

        if pos > 0 {
            return Ok(());
        }

        if let Some( handle ) = self.pool.get_mut( locator ) {
            handle.pause();
            handle.reset_position();
        }
        self.status.insert( locator.clone(), false );
        tracing::info!( "Removed: {}", locator );

        if let Some( head ) = self.queue.first().cloned() {
            self.begin_playback( &head, None )?;
        }

        Ok(())
    }


    /// Starts the next track without touching queue order.
    ///
    /// The skipped head stays in the queue (unlike natural completion,
    /// which dequeues the finished track); it is only recorded as the
    /// previous track and paused. A skip with fewer than two queued
    /// tracks or no known next track is a no-op.
    pub fn skip_to_next( &mut self ) -> Result<EngineSnapshot, EngineError> {
        let Some( target ) = self.next_track.clone() else {
            tracing::debug!( "Skip ignored, no next track" );
            return Ok( self.snapshot() );
        };

        if self.queue.len() < 2 {
            tracing::debug!( "Skip ignored, queue too short" );
            return Ok( self.snapshot() );
        }

        let saved = self.snapshot();
        let result = self.skip_inner( &target );
        self.commit( saved, result )
    }


    fn skip_inner( &mut self, target: &Locator ) -> Result<(), EngineError> {
        let prior_head = self.queue.first().cloned();
        self.prev_track = prior_head.clone();
        self.begin_playback( target, prior_head )
    }


    /// Drains pending completion signals and auto-advances for each.
    ///
    /// Call this whenever the resource layer may have delivered a
    /// completion (an async host can await the channel instead and call
    /// it once per wakeup). Stale sessions and non-head completions are
    /// dropped; a valid one dequeues the finished track and begins the
    /// new head.
    pub fn poll_completions( &mut self ) -> Result<EngineSnapshot, EngineError> {
        while let Ok( completion ) = self.completion_rx.try_recv() {
            self.on_track_completed( completion )?;
        }

        Ok( self.snapshot() )
    }


    fn on_track_completed( &mut self, completion: Completion ) -> Result<(), EngineError> {
        let Completion { locator, session } = completion;

        if self.pool.session_of( &locator ) != Some( session ) {
            tracing::debug!( "Stale completion ignored: {} (session {})", locator, session );
            return Ok(());
        }

        tracing::info!( "Finished: {}", locator );

        // The resource went silent whether or not it sits at the head;
        // the playing flag must follow it either way.
        if let Some( handle ) = self.pool.get_mut( &locator ) {
            handle.pause();
        }
        self.status.insert( locator.clone(), false );

        if self.queue.first() != Some( &locator ) {
            // Reachable after a skip, where the active track sits deeper
            // in the queue. Nothing gets dequeued and nothing advances;
            // the next intent decides what plays.
            tracing::warn!( "Completion for non-head track, not advancing: {}", locator );
            return Ok(());
        }

        self.prev_track = Some( locator.clone() );

        // The finished track leaves the queue even if the next one fails
        // to start; a begin failure stops the advance, it does not undo
        // the completion.
        self.queue.remove( 0 );
        self.next_track = self.queue.get( 1 ).cloned();

        if let Some( head ) = self.queue.first().cloned() {
            self.begin_playback( &head, None )?;
        }

        Ok(())
    }


    /// Pauses and rewinds the prior head if needed, then starts the
    /// target under a fresh completion session.
    fn begin_playback(
        &mut self,
        locator: &Locator,
        prior_head: Option<Locator>,
    ) -> Result<(), EngineError> {
        if let Some( prior ) = prior_head {
            if prior != *locator && self.is_playing( &prior ) {
                if let Some( handle ) = self.pool.get_mut( &prior ) {
                    handle.pause();
                    handle.reset_position();
                }
                self.status.insert( prior, false );
            }
        }

        let handle = self.pool.acquire( locator )?;
        let session = handle.begin( locator, &self.completion_tx )?;
        tracing::info!( "Playing: {} (session {})", locator, session );

        self.status.insert( locator.clone(), true );

        // Next points past the track that just started. That is the
        // entry after the head everywhere except right after a skip,
        // where the started track sits deeper in the queue.
        self.next_track = self.queue.iter()
            .position( |l| l == locator )
            .and_then( |pos| self.queue.get( pos + 1 ) )
            .cloned();

        Ok(())
    }


    fn ensure_known( &self, locator: &Locator ) -> Result<(), EngineError> {
        if self.catalog.contains( locator ) {
            Ok(())
        } else {
            Err( EngineError::UnknownLocator( locator.clone() ) )
        }
    }


    fn commit(
        &mut self,
        saved: EngineSnapshot,
        result: Result<(), EngineError>,
    ) -> Result<EngineSnapshot, EngineError> {
        match result {
            Ok(()) => Ok( self.snapshot() ),
            Err( e ) => {
                tracing::warn!( "Intent failed, state restored: {}", e );
                self.restore( saved );
                Err( e )
            }
        }
    }


    fn restore( &mut self, saved: EngineSnapshot ) {
        self.queue = saved.queue;
        self.status = saved.status;
        self.next_track = saved.next_track;
        self.prev_track = saved.prev_track;
    }


    /// Copies the caller-visible state.
    pub fn snapshot( &self ) -> EngineSnapshot {
        EngineSnapshot {
            queue: self.queue.clone(),
            status: self.status.clone(),
            next_track: self.next_track.clone(),
            prev_track: self.prev_track.clone(),
        }
    }


    /// Gets the queued locators, head first.
    pub fn queue( &self ) -> &[Locator] {
        &self.queue
    }


    /// True if the locator is marked playing.
    pub fn is_playing( &self, locator: &Locator ) -> bool {
        self.status.get( locator ).copied().unwrap_or( false )
    }


    /// Gets the head of the queue if it is currently playing.
    pub fn now_playing( &self ) -> Option<&Locator> {
        self.queue.first().filter( |l| self.is_playing( l ) )
    }


    /// Gets the hint for what plays after the current track.
    pub fn next_track( &self ) -> Option<&Locator> {
        self.next_track.as_ref()
    }


    /// Gets the hint for what played before the current head.
    pub fn prev_track( &self ) -> Option<&Locator> {
        self.prev_track.as_ref()
    }


    /// Looks up a catalog track, e.g. for display titles.
    pub fn track( &self, locator: &Locator ) -> Option<&Track> {
        self.catalog.get( locator )
    }


    /// Gets the catalog this engine plays from.
    pub fn catalog( &self ) -> &Catalog {
        &self.catalog
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    use crate::resource::{ CompletionHook, PlayableResource };


    #[derive( Debug, Clone, PartialEq, Eq )]
    enum Call {
        Load( String ),
        Begin( String ),
        Pause( String ),
        Reset( String ),
    }


    #[derive( Clone, Default )]
    struct Shared {
        calls: Rc<RefCell<Vec<Call>>>,
        hooks: Rc<RefCell<HashMap<String, Vec<CompletionHook>>>>,
        fail_load: Rc<RefCell<HashSet<String>>>,
        fail_begin: Rc<RefCell<HashSet<String>>>,
    }


    impl Shared {
        fn calls( &self ) -> Vec<Call> {
            self.calls.borrow().clone()
        }


        fn clear_calls( &self ) {
            self.calls.borrow_mut().clear();
        }


        fn take_latest_hook( &self, locator: &str ) -> CompletionHook {
            self.hooks
                .borrow_mut()
                .get_mut( locator )
                .and_then( |hooks| hooks.pop() )
                .unwrap_or_else( || panic!( "no armed hook for {}", locator ) )
        }


        fn take_first_hook( &self, locator: &str ) -> CompletionHook {
            let mut hooks = self.hooks.borrow_mut();
            let list = hooks.get_mut( locator ).expect( "no hooks for locator" );
            assert!( !list.is_empty() );
            list.remove( 0 )
        }
    }


    struct FakeLayer {
        shared: Shared,
    }


    impl ResourceLayer for FakeLayer {
        fn load( &mut self, locator: &Locator ) -> Result<Box<dyn PlayableResource>, ResourceError> {
            if self.shared.fail_load.borrow().contains( locator.as_str() ) {
                return Err( ResourceError::Load( locator.to_string() ) );
            }
            self.shared.calls.borrow_mut().push( Call::Load( locator.to_string() ) );
            Ok( Box::new( FakeResource {
                locator: locator.clone(),
                shared: self.shared.clone(),
            }))
        }
    }


    struct FakeResource {
        locator: Locator,
        shared: Shared,
    }


    impl PlayableResource for FakeResource {
        fn begin( &mut self, on_completed: CompletionHook ) -> Result<(), ResourceError> {
            if self.shared.fail_begin.borrow().contains( self.locator.as_str() ) {
                return Err( ResourceError::Begin( self.locator.to_string() ) );
            }
            self.shared.calls.borrow_mut().push( Call::Begin( self.locator.to_string() ) );
            self.shared.hooks
                .borrow_mut()
                .entry( self.locator.to_string() )
                .or_default()
                .push( on_completed );
            Ok(())
        }


        fn pause( &mut self ) {
            self.shared.calls.borrow_mut().push( Call::Pause( self.locator.to_string() ) );
        }


        fn reset_position( &mut self ) {
            self.shared.calls.borrow_mut().push( Call::Reset( self.locator.to_string() ) );
        }
    }


    fn setup( locators: &[&str] ) -> ( PlaylistEngine, Shared ) {
        let tracks = locators
            .iter()
            .enumerate()
            .map( |( i, l )| Track::new( i as u64 + 1, *l, format!( "Track {}", l ) ) )
            .collect();
        let catalog = Catalog::from_tracks( tracks ).unwrap();

        let shared = Shared::default();
        let engine = PlaylistEngine::new( catalog, Box::new( FakeLayer { shared: shared.clone() } ) );

        ( engine, shared )
    }


    fn queued( engine: &PlaylistEngine ) -> Vec<&str> {
        engine.queue().iter().map( |l| l.as_str() ).collect()
    }


    fn complete( engine: &mut PlaylistEngine, shared: &Shared, locator: &str )
        -> Result<EngineSnapshot, EngineError>
    {
        shared.take_latest_hook( locator ).fire();
        engine.poll_completions()
    }


    fn assert_at_most_one_playing( engine: &PlaylistEngine ) {
        let playing: Vec<_> = engine
            .snapshot()
            .status
            .iter()
            .filter( |( _, p )| **p )
            .map( |( l, _ )| l.clone() )
            .collect();
        assert!( playing.len() <= 1, "more than one playing: {:?}", playing );
    }


    #[test]
    fn test_enqueue_autoplays_first_track() {
        let ( mut engine, shared ) = setup( &[ "a", "b" ] );
        let a = Locator::from( "a" );

        let snapshot = engine.enqueue( &a ).unwrap();

        assert_eq!( queued( &engine ), vec![ "a" ] );
        assert!( snapshot.is_playing( &a ) );
        assert_eq!( engine.now_playing(), Some( &a ) );
        assert_eq!( snapshot.next_track, None );
        assert_eq!(
            shared.calls(),
            vec![ Call::Load( "a".into() ), Call::Begin( "a".into() ) ]
        );
    }


    #[test]
    fn test_enqueue_appends_without_playing() {
        let ( mut engine, shared ) = setup( &[ "a", "b" ] );

        engine.enqueue( &"a".into() ).unwrap();
        shared.clear_calls();
        let snapshot = engine.enqueue( &"b".into() ).unwrap();

        assert_eq!( queued( &engine ), vec![ "a", "b" ] );
        assert!( snapshot.is_playing( &"a".into() ) );
        assert!( !snapshot.is_playing( &"b".into() ) );
        assert_eq!( snapshot.next_track, Some( "b".into() ) );
        // No resource traffic for the append
        assert!( shared.calls().is_empty() );
    }


    #[test]
    fn test_enqueue_twice_is_idempotent() {
        let ( mut engine, _shared ) = setup( &[ "a", "b" ] );

        engine.enqueue( &"a".into() ).unwrap();
        engine.enqueue( &"b".into() ).unwrap();
        let once = engine.snapshot();

        let again = engine.enqueue( &"b".into() ).unwrap();

        assert_eq!( once, again );
        assert_eq!( queued( &engine ), vec![ "a", "b" ] );
    }


    #[test]
    fn test_enqueue_unknown_locator_rejected() {
        let ( mut engine, shared ) = setup( &[ "a" ] );

        let result = engine.enqueue( &"mystery".into() );

        assert!( matches!( result, Err( EngineError::UnknownLocator( _ ) ) ) );
        assert!( engine.queue().is_empty() );
        assert!( shared.calls().is_empty() );
    }


    #[test]
    fn test_enqueue_rolls_back_when_load_fails() {
        let ( mut engine, shared ) = setup( &[ "a" ] );
        shared.fail_load.borrow_mut().insert( "a".to_string() );

        let before = engine.snapshot();
        let result = engine.enqueue( &"a".into() );

        assert!( matches!( result, Err( EngineError::Resource( ResourceError::Load( _ ) ) ) ) );
        assert_eq!( engine.snapshot(), before );
        assert!( engine.queue().is_empty() );
        assert!( !engine.is_playing( &"a".into() ) );
    }


    #[test]
    fn test_toggle_pauses_playing_head_in_place() {
        let ( mut engine, shared ) = setup( &[ "a", "b" ] );
        engine.enqueue( &"a".into() ).unwrap();
        engine.enqueue( &"b".into() ).unwrap();
        shared.clear_calls();

        let snapshot = engine.toggle_play_pause( &"a".into() ).unwrap();

        assert_eq!( queued( &engine ), vec![ "a", "b" ] );
        assert!( !snapshot.is_playing( &"a".into() ) );
        assert_eq!( engine.now_playing(), None );
        // Paused in place: no rewind
        assert_eq!( shared.calls(), vec![ Call::Pause( "a".into() ) ] );
    }


    #[test]
    fn test_toggle_promotes_queued_track() {
        let ( mut engine, shared ) = setup( &[ "a", "b" ] );
        engine.enqueue( &"a".into() ).unwrap();
        engine.enqueue( &"b".into() ).unwrap();
        shared.clear_calls();

        let snapshot = engine.toggle_play_pause( &"b".into() ).unwrap();

        assert_eq!( queued( &engine ), vec![ "b", "a" ] );
        assert!( !snapshot.is_playing( &"a".into() ) );
        assert!( snapshot.is_playing( &"b".into() ) );
        assert_eq!( snapshot.next_track, Some( "a".into() ) );
        // The displaced head is paused and rewound before the new one starts
        assert_eq!(
            shared.calls(),
            vec![
                Call::Pause( "a".into() ),
                Call::Reset( "a".into() ),
                Call::Load( "b".into() ),
                Call::Begin( "b".into() ),
            ]
        );
        assert_at_most_one_playing( &engine );
    }


    #[test]
    fn test_toggle_resumes_paused_head_without_rewind() {
        let ( mut engine, shared ) = setup( &[ "a" ] );
        engine.enqueue( &"a".into() ).unwrap();
        engine.toggle_play_pause( &"a".into() ).unwrap();
        shared.clear_calls();

        let snapshot = engine.toggle_play_pause( &"a".into() ).unwrap();

        assert!( snapshot.is_playing( &"a".into() ) );
        // Resume reuses the pooled handle: no load, no reset
        assert_eq!( shared.calls(), vec![ Call::Begin( "a".into() ) ] );
    }


    #[test]
    fn test_toggle_promote_rewinds_paused_head() {
        let ( mut engine, shared ) = setup( &[ "a", "b" ] );
        engine.enqueue( &"a".into() ).unwrap();
        engine.enqueue( &"b".into() ).unwrap();
        engine.toggle_play_pause( &"a".into() ).unwrap();
        shared.clear_calls();

        let snapshot = engine.toggle_play_pause( &"b".into() ).unwrap();

        assert_eq!( queued( &engine ), vec![ "b", "a" ] );
        assert!( snapshot.is_playing( &"b".into() ) );
        // The displaced head rewinds even though it was already paused,
        // so toggling back to it restarts from the top
        assert_eq!(
            shared.calls(),
            vec![
                Call::Pause( "a".into() ),
                Call::Reset( "a".into() ),
                Call::Load( "b".into() ),
                Call::Begin( "b".into() ),
            ]
        );
    }


    #[test]
    fn test_toggle_inserts_unqueued_track_at_head() {
        let ( mut engine, _shared ) = setup( &[ "a", "c" ] );
        engine.enqueue( &"a".into() ).unwrap();

        let snapshot = engine.toggle_play_pause( &"c".into() ).unwrap();

        assert_eq!( queued( &engine ), vec![ "c", "a" ] );
        assert!( snapshot.is_playing( &"c".into() ) );
        assert!( !snapshot.is_playing( &"a".into() ) );
    }


    #[test]
    fn test_toggle_unknown_locator_rejected() {
        let ( mut engine, _shared ) = setup( &[ "a" ] );
        engine.enqueue( &"a".into() ).unwrap();
        let before = engine.snapshot();

        let result = engine.toggle_play_pause( &"mystery".into() );

        assert!( matches!( result, Err( EngineError::UnknownLocator( _ ) ) ) );
        assert_eq!( engine.snapshot(), before );
    }


    #[test]
    fn test_toggle_rolls_back_when_begin_fails() {
        let ( mut engine, shared ) = setup( &[ "a", "b" ] );
        engine.enqueue( &"a".into() ).unwrap();
        engine.enqueue( &"b".into() ).unwrap();
        shared.fail_begin.borrow_mut().insert( "b".to_string() );
        let before = engine.snapshot();

        let result = engine.toggle_play_pause( &"b".into() );

        assert!( matches!( result, Err( EngineError::Resource( ResourceError::Begin( _ ) ) ) ) );
        assert_eq!( engine.snapshot(), before );
        assert_eq!( queued( &engine ), vec![ "a", "b" ] );
    }


    #[test]
    fn test_remove_head_advances_to_next() {
        let ( mut engine, shared ) = setup( &[ "a", "b", "c" ] );
        for l in [ "a", "b", "c" ] {
            engine.enqueue( &l.into() ).unwrap();
        }
        shared.clear_calls();

        let snapshot = engine.remove_from_playlist( &"a".into() ).unwrap();

        assert_eq!( queued( &engine ), vec![ "b", "c" ] );
        assert!( !snapshot.is_playing( &"a".into() ) );
        assert!( snapshot.is_playing( &"b".into() ) );
        assert_eq!( snapshot.next_track, Some( "c".into() ) );
        assert_eq!(
            shared.calls(),
            vec![
                Call::Pause( "a".into() ),
                Call::Reset( "a".into() ),
                Call::Load( "b".into() ),
                Call::Begin( "b".into() ),
            ]
        );
        assert_at_most_one_playing( &engine );
    }


    #[test]
    fn test_remove_non_head_is_silent() {
        let ( mut engine, shared ) = setup( &[ "a", "b", "c" ] );
        for l in [ "a", "b", "c" ] {
            engine.enqueue( &l.into() ).unwrap();
        }
        shared.clear_calls();

        let snapshot = engine.remove_from_playlist( &"c".into() ).unwrap();

        assert_eq!( queued( &engine ), vec![ "a", "b" ] );
        assert!( snapshot.is_playing( &"a".into() ) );
        assert_eq!( snapshot.next_track, Some( "b".into() ) );
        // Queue-order change only, no playback traffic at all
        assert!( shared.calls().is_empty() );
    }


    #[test]
    fn test_remove_unqueued_track_is_noop() {
        let ( mut engine, _shared ) = setup( &[ "a", "b" ] );
        engine.enqueue( &"a".into() ).unwrap();
        let before = engine.snapshot();

        let snapshot = engine.remove_from_playlist( &"b".into() ).unwrap();

        assert_eq!( snapshot, before );
    }


    #[test]
    fn test_remove_last_track_empties_queue() {
        let ( mut engine, shared ) = setup( &[ "a" ] );
        engine.enqueue( &"a".into() ).unwrap();
        shared.clear_calls();

        let snapshot = engine.remove_from_playlist( &"a".into() ).unwrap();

        assert!( engine.queue().is_empty() );
        assert!( !snapshot.is_playing( &"a".into() ) );
        assert_eq!( snapshot.next_track, None );
        assert_eq!(
            shared.calls(),
            vec![ Call::Pause( "a".into() ), Call::Reset( "a".into() ) ]
        );
    }


    #[test]
    fn test_skip_starts_next_without_dequeuing() {
        let ( mut engine, _shared ) = setup( &[ "a", "b", "c" ] );
        for l in [ "a", "b", "c" ] {
            engine.enqueue( &l.into() ).unwrap();
        }

        let snapshot = engine.skip_to_next().unwrap();

        // The skipped head stays queued, unlike natural completion
        assert_eq!( queued( &engine ), vec![ "a", "b", "c" ] );
        assert!( !snapshot.is_playing( &"a".into() ) );
        assert!( snapshot.is_playing( &"b".into() ) );
        assert_eq!( snapshot.prev_track, Some( "a".into() ) );
        assert_eq!( snapshot.next_track, Some( "c".into() ) );
    }


    #[test]
    fn test_skip_with_single_track_is_noop() {
        let ( mut engine, shared ) = setup( &[ "a" ] );
        engine.enqueue( &"a".into() ).unwrap();
        shared.clear_calls();
        let before = engine.snapshot();

        let snapshot = engine.skip_to_next().unwrap();

        assert_eq!( snapshot, before );
        assert!( shared.calls().is_empty() );
    }


    #[test]
    fn test_skip_on_empty_queue_is_noop() {
        let ( mut engine, _shared ) = setup( &[ "a" ] );

        let snapshot = engine.skip_to_next().unwrap();

        assert!( snapshot.queue.is_empty() );
        assert_eq!( snapshot.next_track, None );
    }


    #[test]
    fn test_completion_advances_to_next_track() {
        let ( mut engine, shared ) = setup( &[ "a", "b", "c" ] );
        for l in [ "a", "b", "c" ] {
            engine.enqueue( &l.into() ).unwrap();
        }

        let snapshot = complete( &mut engine, &shared, "a" ).unwrap();

        assert_eq!( queued( &engine ), vec![ "b", "c" ] );
        assert!( !snapshot.is_playing( &"a".into() ) );
        assert!( snapshot.is_playing( &"b".into() ) );
        assert_eq!( snapshot.prev_track, Some( "a".into() ) );
        assert_eq!( snapshot.next_track, Some( "c".into() ) );
        assert_at_most_one_playing( &engine );
    }


    #[test]
    fn test_completion_of_last_track_empties_queue() {
        let ( mut engine, shared ) = setup( &[ "a" ] );
        engine.enqueue( &"a".into() ).unwrap();

        let snapshot = complete( &mut engine, &shared, "a" ).unwrap();

        assert!( engine.queue().is_empty() );
        assert!( !snapshot.is_playing( &"a".into() ) );
        assert_eq!( snapshot.prev_track, Some( "a".into() ) );
        assert_eq!( snapshot.next_track, None );
        assert_eq!( engine.now_playing(), None );
    }


    #[test]
    fn test_completion_rearms_for_each_session() {
        let ( mut engine, shared ) = setup( &[ "a", "b", "c" ] );
        for l in [ "a", "b", "c" ] {
            engine.enqueue( &l.into() ).unwrap();
        }

        // Each auto-advance arms a fresh hook for the new head
        complete( &mut engine, &shared, "a" ).unwrap();
        let snapshot = complete( &mut engine, &shared, "b" ).unwrap();

        assert_eq!( queued( &engine ), vec![ "c" ] );
        assert!( snapshot.is_playing( &"c".into() ) );
        assert_eq!( snapshot.prev_track, Some( "b".into() ) );
    }


    #[test]
    fn test_stale_completion_is_ignored() {
        let ( mut engine, shared ) = setup( &[ "a" ] );
        engine.enqueue( &"a".into() ).unwrap();            // session 1
        engine.toggle_play_pause( &"a".into() ).unwrap();  // pause
        engine.toggle_play_pause( &"a".into() ).unwrap();  // resume, session 2

        // The session-1 hook fires late
        let hook = shared.take_first_hook( "a" );
        assert_eq!( hook.session(), 1 );
        assert_eq!( hook.locator().as_str(), "a" );
        hook.fire();
        let snapshot = engine.poll_completions().unwrap();

        assert_eq!( queued( &engine ), vec![ "a" ] );
        assert!( snapshot.is_playing( &"a".into() ) );
        assert_eq!( snapshot.prev_track, None );
    }


    #[test]
    fn test_completion_for_non_head_does_not_advance() {
        let ( mut engine, shared ) = setup( &[ "a", "b" ] );
        engine.enqueue( &"a".into() ).unwrap();
        engine.enqueue( &"b".into() ).unwrap();
        // Promote b; a's session still matches but a is no longer head
        engine.toggle_play_pause( &"b".into() ).unwrap();

        shared.take_first_hook( "a" ).fire();
        let snapshot = engine.poll_completions().unwrap();

        assert_eq!( queued( &engine ), vec![ "b", "a" ] );
        assert!( snapshot.is_playing( &"b".into() ) );
        assert!( !snapshot.is_playing( &"a".into() ) );
    }


    #[test]
    fn test_completion_after_skip_silences_finished_track() {
        let ( mut engine, shared ) = setup( &[ "a", "b", "c" ] );
        for l in [ "a", "b", "c" ] {
            engine.enqueue( &l.into() ).unwrap();
        }
        engine.skip_to_next().unwrap();
        shared.clear_calls();

        // b (playing, not head) finishes naturally
        let snapshot = complete( &mut engine, &shared, "b" ).unwrap();

        assert_eq!( queued( &engine ), vec![ "a", "b", "c" ] );
        assert!( !snapshot.is_playing( &"b".into() ) );
        assert_eq!( engine.now_playing(), None );
        // No dequeue and no advance; the playing flag just follows the
        // silent resource
        assert_eq!( shared.calls(), vec![ Call::Pause( "b".into() ) ] );
        assert_eq!( snapshot.prev_track, Some( "a".into() ) );
        assert_eq!( snapshot.next_track, Some( "c".into() ) );
    }


    #[test]
    fn test_advance_failure_keeps_new_head_unplayed() {
        let ( mut engine, shared ) = setup( &[ "a", "b" ] );
        engine.enqueue( &"a".into() ).unwrap();
        engine.enqueue( &"b".into() ).unwrap();
        shared.fail_load.borrow_mut().insert( "b".to_string() );

        shared.take_latest_hook( "a" ).fire();
        let result = engine.poll_completions();

        assert!( matches!( result, Err( EngineError::Resource( _ ) ) ) );
        // The finished track is gone, the failed successor stays queued but silent
        assert_eq!( queued( &engine ), vec![ "b" ] );
        assert!( !engine.is_playing( &"a".into() ) );
        assert!( !engine.is_playing( &"b".into() ) );
        assert_eq!( engine.prev_track(), Some( &"a".into() ) );
    }


    #[test]
    fn test_at_most_one_playing_through_mixed_intents() {
        let ( mut engine, shared ) = setup( &[ "a", "b", "c", "d" ] );

        for l in [ "a", "b", "c", "d" ] {
            engine.enqueue( &l.into() ).unwrap();
            assert_at_most_one_playing( &engine );
        }

        engine.toggle_play_pause( &"c".into() ).unwrap();
        assert_at_most_one_playing( &engine );

        engine.skip_to_next().unwrap();
        assert_at_most_one_playing( &engine );

        engine.remove_from_playlist( &"c".into() ).unwrap();
        assert_at_most_one_playing( &engine );

        let head = engine.queue().first().cloned().unwrap();
        complete( &mut engine, &shared, head.as_str() ).unwrap();
        assert_at_most_one_playing( &engine );
    }


    #[test]
    fn test_next_track_matches_queue_after_mutations() {
        let ( mut engine, _shared ) = setup( &[ "a", "b", "c" ] );

        engine.enqueue( &"a".into() ).unwrap();
        assert_eq!( engine.next_track(), None );

        engine.enqueue( &"b".into() ).unwrap();
        assert_eq!( engine.next_track(), Some( &"b".into() ) );

        engine.enqueue( &"c".into() ).unwrap();
        assert_eq!( engine.next_track(), Some( &"b".into() ) );

        engine.remove_from_playlist( &"b".into() ).unwrap();
        assert_eq!( engine.next_track(), Some( &"c".into() ) );
    }


    #[test]
    fn test_track_lookup_for_display() {
        let ( mut engine, _shared ) = setup( &[ "a", "b" ] );
        engine.enqueue( &"a".into() ).unwrap();

        let playing = engine.now_playing().cloned().unwrap();
        let track = engine.track( &playing ).unwrap();

        assert_eq!( track.title, "Track a" );
        assert_eq!( engine.catalog().len(), 2 );
    }
}
