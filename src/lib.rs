#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! cloudvar library — a WebSocket pub/sub "cloud variable" server.
//!
//! This library re-exports the key building blocks:
//! - `buffer` — bounded growable byte buffer
//! - `username` — username validation
//! - `protocol` — JSON message decoding
//! - `reassembly` — WebSocket frame reassembly
//! - `room` — room registry and variable store
//! - `session` — per-connection session state machine and catch-up writer
//! - `ws` — WebSocket event dispatcher
//! - `config` — configuration loading
//! - `state` — shared application state
//! - `routes` — HTTP route handlers

pub mod app;
pub mod buffer;
pub mod config;
pub mod protocol;
pub mod reassembly;
pub mod room;
pub mod routes;
pub mod session;
pub mod state;
pub mod username;
pub mod ws;

pub use buffer::BoundedBuffer;
pub use config::Config;
pub use room::RoomRegistry;
pub use state::AppState;
