pub mod connection;
pub mod guards;
pub mod manager;
pub mod state;

pub use connection::{AutoRepeatState, Connection, KeyEventBuffer};
pub use guards::UnauthGuard;
pub use manager::{AcceptError, ConnectionRegistry};
pub use state::{ConnState, Trigger};
