//! Storage provider node for the Custos network.
//!
//! A provider holds ciphertext it agreed to keep and answers the
//! proof-of-storage protocol:
//! - **Store**: file the ciphertext under its content id and return an
//!   initial Pedersen commitment over it
//! - **Challenge**: reveal one chunk with a Merkle inclusion proof, a chunk
//!   commitment, and the next link of the commitment-hash chain
//! - **Retrieve**: return the ciphertext together with fresh chain hashes
//! - **Delete**: drop the ciphertext and its chain state
//!
//! The provider is untrusted: everything it returns is signed so the
//! coordinator can hold it to its answers, and nothing it self-reports is
//! accepted without verification on the other side.

pub mod config;
pub mod handlers;
pub mod node;
pub mod store;

pub use config::{load_config, ProviderConfig};
pub use node::{ProviderError, ProviderNode};
pub use store::ProviderStore;
