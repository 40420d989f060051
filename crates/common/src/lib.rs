//! Shared types used across the credchain projection services.

pub mod acl;
pub mod types;

pub use acl::{AclError, PrivilegedKeys};
pub use types::{PublicKey, TransactionId};
