//! Domain records for the credchain family.
//!
//! This crate provides:
//! - Typed records per address space (actors, records, classes, portfolios,
//!   votings, environment), each carrying its ordered version history
//! - [`decode`] for turning a raw state payload plus its address into a
//!   [`StateEntry`]
//!
//! A single state key holds a container with a repeated group of records, so
//! decoding one payload can yield several logical records.

pub mod decode;
pub mod error;
pub mod records;

pub use decode::{StateEntry, decode};
pub use error::DecodeError;
pub use records::{
    Actor, ActorRole, ActorStatus, Class, EduProgramData, Environment, Portfolio, PortfolioEntry,
    PortfolioType, ProfileEntry, Record, RecordStatus, RecordType, RecordVersion, Vote,
    VoteResult, VoteType, Voting,
};
