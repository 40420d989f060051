//! Deterministic addressing for the credchain transaction family.
//!
//! Every piece of ledger state lives under a 70-character lowercase hex
//! address: a 6-character family namespace, a 3-character type prefix, and
//! hash-derived segments that identify the entity and its participants.
//! Derivation is a pure function of the entity's logical identifier and the
//! participant keys, so two independent parties always derive the same
//! address for the same entity.

mod address;

pub use address::{
    ADDRESS_LENGTH, Address, AddressSpace, FAMILY_NAME, actor_address, class_address,
    environment_address, job_address, manager_segment, namespace, owner_segment,
    portfolio_address, record_address, voting_address,
};
