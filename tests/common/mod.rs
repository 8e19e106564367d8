//! Shared e2e test infrastructure: an isolated server per test with a
//! scripted playback gateway and a recording notifier.
#![allow(dead_code)] // Not every test binary exercises every helper.

pub mod client;
pub mod fixtures;
pub mod server;

pub use client::TestClient;
pub use fixtures::{track, RecordingNotifier, ScriptedGateway};
pub use server::TestServer;
