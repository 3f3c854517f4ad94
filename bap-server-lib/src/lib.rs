//! Core BAP server library: auth negotiation, tty tree, connection state
//! machine, write arbiter, key dispatch, and raw/suspend coordination.
//! The wire format and error taxonomy live in `bap-protocol`;
//! this crate is the state and policy layered on top of it.

pub mod arbiter;
pub mod auth;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod core;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod params;
pub mod raw;
pub mod server;
pub mod suspend;
pub mod telemetry;
pub mod transport;
pub mod tty;

pub use core::ServerCore;
pub use error::{BapError, Result, WireError};
pub use server::run;
