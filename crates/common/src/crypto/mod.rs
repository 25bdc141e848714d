//! Shared cryptographic primitives for encrypting data at rest.

pub mod encryption;

pub use encryption::{EncryptedData, EncryptionManager, Payload};
