//! Coordinator node for the Custos storage network.
//!
//! The coordinator sits at the trust boundary between end users and the
//! untrusted provider set. It re-encrypts user data under its own custodial
//! key, fans ciphertext out to providers with configurable redundancy, and
//! periodically challenges each provider to prove it still holds what it
//! agreed to keep, using Pedersen commitments chained across rounds and
//! Merkle inclusion proofs over ciphertext chunks.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod placement;
pub mod rounds;
pub mod state;
pub mod transport;

pub use config::{load_config, CoordinatorConfig};
pub use context::NetworkContext;
pub use error::{CoordinatorError, Result};
