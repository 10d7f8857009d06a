//! HTTP and WebSocket transport. Forwards raw protocol text to the
//! [`Pipeline`](crate::pipeline::Pipeline) and returns its text result.

pub mod auth;
pub mod server;

pub use server::{AppState, router, run};
