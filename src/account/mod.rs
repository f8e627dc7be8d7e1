//! Account lifecycle: keys, registration and authenticated resource access.

pub mod credentials;
pub mod key_rollover;
pub mod manager;

pub use credentials::{AccountKeyPair, EabCredentials, KeyAlgorithm};
pub use key_rollover::KeyRollover;
pub use manager::AccountManager;
