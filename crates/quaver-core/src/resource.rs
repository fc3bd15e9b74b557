//! Resource layer contract
//!
//! The engine never touches audio bytes itself; it drives opaque playable
//! resources supplied by an external layer (local file, network stream,
//! test fake). Completion of a track is the one asynchronous signal in
//! the design and travels back over an mpsc channel, tagged with the
//! playback session it belongs to.

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::catalog::Locator;


/// Identifies one playback session of one handle.
///
/// Bumped on every `begin`, so a completion that fires late (after the
/// handle was paused and restarted) no longer matches and is dropped.
pub type SessionId = u64;


/// Errors surfaced by the resource layer.
#[derive( Debug, Error )]
pub enum ResourceError {
    #[error( "Failed to load resource: {0}" )]
    Load( String ),

    #[error( "Failed to begin playback: {0}" )]
    Begin( String ),
}


/// Factory for playable resources.
///
/// `load` is called at most once per locator for the lifetime of the
/// pool; it is the only point where acquisition can fail.
pub trait ResourceLayer {
    fn load( &mut self, locator: &Locator ) -> Result<Box<dyn PlayableResource>, ResourceError>;
}


/// One loaded, controllable instance of a track's audio resource.
///
/// `begin` must be safe to call on an already-playing resource, and a
/// pause followed by a later begin resumes rather than restarts unless
/// `reset_position` was called in between. `pause` and `reset_position`
/// are fire-and-forget signals and cannot fail.
pub trait PlayableResource {
    fn begin( &mut self, on_completed: CompletionHook ) -> Result<(), ResourceError>;

    fn pause( &mut self );

    fn reset_position( &mut self );
}


/// Message sent when a resource finishes playing naturally.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Completion {
    pub locator: Locator,
    pub session: SessionId,
}


/// One-shot completion notification, handed to a resource on `begin`.
///
/// The resource fires it when playback reaches the natural end of the
/// track. Firing consumes the hook; the engine discards completions
/// whose session is no longer current.
#[derive( Debug )]
pub struct CompletionHook {
    locator: Locator,
    session: SessionId,
    tx: UnboundedSender<Completion>,
}


impl CompletionHook {
    pub(crate) fn new( locator: Locator, session: SessionId, tx: UnboundedSender<Completion> ) -> Self {
        Self { locator, session, tx }
    }


    /// Gets the locator this hook was armed for.
    pub fn locator( &self ) -> &Locator {
        &self.locator
    }


    /// Gets the playback session this hook was armed for.
    pub fn session( &self ) -> SessionId {
        self.session
    }


    /// Delivers the completion signal to the engine.
    pub fn fire( self ) {
        let completion = Completion {
            locator: self.locator,
            session: self.session,
        };

        // A closed channel means the engine is gone; nothing to notify.
        if self.tx.send( completion ).is_err() {
            tracing::debug!( "Completion dropped, engine no longer listening" );
        }
    }
}
