//! Quaver Core - Playlist playback engine
//!
//! This crate provides a single-track-at-a-time playlist engine: an
//! ordered queue of catalog tracks, play/pause/promote/skip intents,
//! and auto-advance when a track finishes. Audio itself lives behind
//! the resource layer traits; the engine only drives handles.

pub mod catalog;
pub mod engine;
pub mod pool;
pub mod resource;

pub use catalog::{ Catalog, CatalogError, Locator, Track };
pub use engine::{ EngineError, EngineSnapshot, PlaylistEngine };
pub use pool::{ PooledHandle, ResourcePool };
pub use resource::{ Completion, CompletionHook, PlayableResource, ResourceError, ResourceLayer, SessionId };
