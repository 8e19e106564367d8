//! Jukebox Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod admission;
pub mod config;
pub mod guest;
pub mod identity;
pub mod notifications;
pub mod prequeue;
pub mod server;
pub mod settings;
pub mod spotify;

// Re-export commonly used types for convenience
pub use admission::{AdmissionController, AdmissionError};
pub use guest::{FingerprintRegistry, GuestStore, SqliteGuestStore};
pub use prequeue::{PrequeueError, PrequeueWorkflow};
pub use server::{run_server, RequestsLoggingLevel};
pub use settings::PolicySnapshot;
pub use spotify::{PlaybackGateway, SpotifyClient};
