//! # Conquest Server
//!
//! Match server for the territory-conquest rules in [`conquest_core`].
//!
//! Players meet in lobby rooms, and each started match runs in its own
//! task as the single writer of its state. Clients speak newline-delimited
//! text over TCP on two endpoints, one for rooms and one for matches.
//!
//! ## Crate Structure
//!
//! - [`config`] - RON server configuration
//! - [`arbiter`] - Per-match tick loop and command queues
//! - [`registry`] - Live matches and seat claims
//! - [`lobby`] - Rooms, countdowns and match start
//! - [`session`] - Per-connection protocol state
//! - [`network`] - TCP listeners

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod arbiter;
pub mod config;
pub mod lobby;
pub mod network;
pub mod registry;
pub mod session;

pub use config::ServerConfig;
pub use network::Server;
