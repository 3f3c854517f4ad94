pub mod credentials;
pub mod negotiator;

pub use credentials::{peer_credentials, PeerCredentials};
pub use negotiator::{negotiate, NegotiationOutcome};
