//! ACME protocol primitives: directory, JWK/JWS, nonce pools and problem
//! documents.

pub mod directory;
pub mod jwk;
pub mod jws;
pub mod nonce;
pub mod problem;

pub use directory::{Directory, DirectoryManager, DirectoryMeta};
pub use jwk::Jwk;
pub use jws::{JoseBody, JwsSigner, KeyAddressing};
pub use nonce::{
    HttpNonceFetcher, NonceConfig, NonceFetcher, NonceManager, NonceNamespace,
};
pub use problem::{Problem, ProblemKind, ServerProblem, map_problem};
