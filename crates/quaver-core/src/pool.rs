//! Track resource pool
//!
//! Lazily creates and caches one playable handle per distinct locator,
//! so repeated play requests reuse the handle instead of loading the
//! resource again. Handles are never evicted; the pool lives exactly as
//! long as the engine that owns it.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tokio::sync::mpsc::UnboundedSender;

use crate::catalog::Locator;
use crate::resource::{ Completion, CompletionHook, PlayableResource, ResourceError, ResourceLayer, SessionId };


/// A pooled playable resource plus its playback session counter.
pub struct PooledHandle {
    resource: Box<dyn PlayableResource>,
    session: SessionId,
}


impl PooledHandle {
    fn new( resource: Box<dyn PlayableResource> ) -> Self {
        Self { resource, session: 0 }
    }


    /// Starts (or resumes) playback under a fresh session.
    ///
    /// Arms exactly one completion hook for the new session; any hook
    /// from an earlier session is invalidated by the session bump and
    /// will be ignored if it still fires.
    ///
    /// @returns The session id the playback was started under
    pub fn begin(
        &mut self,
        locator: &Locator,
        tx: &UnboundedSender<Completion>,
    ) -> Result<SessionId, ResourceError> {
        self.session += 1;
        let hook = CompletionHook::new( locator.clone(), self.session, tx.clone() );
        self.resource.begin( hook )?;
        Ok( self.session )
    }


    /// Pauses the resource, keeping its position.
    pub fn pause( &mut self ) {
        self.resource.pause();
    }


    /// Rewinds the resource to the start of the track.
    pub fn reset_position( &mut self ) {
        self.resource.reset_position();
    }


    /// Gets the current playback session.
    pub fn session( &self ) -> SessionId {
        self.session
    }
}


/// Cache of playable handles, one per distinct locator.
pub struct ResourcePool {
    layer: Box<dyn ResourceLayer>,
    handles: HashMap<Locator, PooledHandle>,
}


impl ResourcePool {
    /// Creates an empty pool backed by the given resource layer.
    pub fn new( layer: Box<dyn ResourceLayer> ) -> Self {
        Self {
            layer,
            handles: HashMap::new(),
        }
    }


    /// Gets the handle for a locator, loading the resource on first use.
    ///
    /// Within one pool lifetime the same locator always yields the same
    /// handle; the underlying resource is only ever loaded once.
    pub fn acquire( &mut self, locator: &Locator ) -> Result<&mut PooledHandle, ResourceError> {
        let handle = match self.handles.entry( locator.clone() ) {
            Entry::Occupied( entry ) => entry.into_mut(),
            Entry::Vacant( entry ) => {
                tracing::debug!( "Loading resource: {}", locator );
                let resource = self.layer.load( locator )?;
                entry.insert( PooledHandle::new( resource ) )
            }
        };

        Ok( handle )
    }


    /// Gets an already-loaded handle without loading anything.
    pub fn get_mut( &mut self, locator: &Locator ) -> Option<&mut PooledHandle> {
        self.handles.get_mut( locator )
    }


    /// Gets the current session of an already-loaded handle.
    pub fn session_of( &self, locator: &Locator ) -> Option<SessionId> {
        self.handles.get( locator ).map( |h| h.session() )
    }


    /// Checks whether a handle exists for the locator.
    pub fn contains( &self, locator: &Locator ) -> bool {
        self.handles.contains_key( locator )
    }


    /// Gets the number of loaded handles.
    pub fn len( &self ) -> usize {
        self.handles.len()
    }


    /// Returns true if no resource has been loaded yet.
    pub fn is_empty( &self ) -> bool {
        self.handles.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    use tokio::sync::mpsc::unbounded_channel;


    struct CountingLayer {
        loads: Rc<RefCell<Vec<String>>>,
        fail: Option<String>,
    }


    impl ResourceLayer for CountingLayer {
        fn load( &mut self, locator: &Locator ) -> Result<Box<dyn PlayableResource>, ResourceError> {
            if self.fail.as_deref() == Some( locator.as_str() ) {
                return Err( ResourceError::Load( locator.to_string() ) );
            }
            self.loads.borrow_mut().push( locator.to_string() );
            Ok( Box::new( NullResource ) )
        }
    }


    struct NullResource;


    impl PlayableResource for NullResource {
        fn begin( &mut self, _on_completed: CompletionHook ) -> Result<(), ResourceError> {
            Ok(())
        }

        fn pause( &mut self ) {}

        fn reset_position( &mut self ) {}
    }


    fn pool_with_log() -> ( ResourcePool, Rc<RefCell<Vec<String>>> ) {
        let loads = Rc::new( RefCell::new( Vec::new() ) );
        let layer = CountingLayer { loads: Rc::clone( &loads ), fail: None };
        ( ResourcePool::new( Box::new( layer ) ), loads )
    }


    #[test]
    fn test_acquire_loads_once_per_locator() {
        let ( mut pool, loads ) = pool_with_log();
        let locator = Locator::from( "a.mp3" );

        pool.acquire( &locator ).unwrap();
        pool.acquire( &locator ).unwrap();
        pool.acquire( &locator ).unwrap();

        assert_eq!( *loads.borrow(), vec![ "a.mp3".to_string() ] );
        assert_eq!( pool.len(), 1 );
    }


    #[test]
    fn test_acquire_separates_locators() {
        let ( mut pool, loads ) = pool_with_log();

        pool.acquire( &Locator::from( "a.mp3" ) ).unwrap();
        pool.acquire( &Locator::from( "b.mp3" ) ).unwrap();

        assert_eq!( loads.borrow().len(), 2 );
        assert_eq!( pool.len(), 2 );
        assert!( pool.contains( &Locator::from( "a.mp3" ) ) );
        assert!( pool.contains( &Locator::from( "b.mp3" ) ) );
    }


    #[test]
    fn test_failed_load_leaves_pool_empty() {
        let loads = Rc::new( RefCell::new( Vec::new() ) );
        let layer = CountingLayer {
            loads: Rc::clone( &loads ),
            fail: Some( "broken.mp3".to_string() ),
        };
        let mut pool = ResourcePool::new( Box::new( layer ) );

        let result = pool.acquire( &Locator::from( "broken.mp3" ) );

        assert!( matches!( result, Err( ResourceError::Load( _ ) ) ) );
        assert!( pool.is_empty() );
        assert!( !pool.contains( &Locator::from( "broken.mp3" ) ) );
    }


    #[test]
    fn test_begin_bumps_session_per_start() {
        let ( mut pool, _loads ) = pool_with_log();
        let ( tx, _rx ) = unbounded_channel();
        let locator = Locator::from( "a.mp3" );

        let handle = pool.acquire( &locator ).unwrap();
        assert_eq!( handle.begin( &locator, &tx ).unwrap(), 1 );
        assert_eq!( handle.begin( &locator, &tx ).unwrap(), 2 );

        assert_eq!( pool.session_of( &locator ), Some( 2 ) );
    }


    #[test]
    fn test_get_mut_does_not_load() {
        let ( mut pool, loads ) = pool_with_log();

        assert!( pool.get_mut( &Locator::from( "a.mp3" ) ).is_none() );
        assert!( loads.borrow().is_empty() );
        assert_eq!( pool.session_of( &Locator::from( "a.mp3" ) ), None );
    }
}
