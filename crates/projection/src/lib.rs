//! Relational projection of credchain ledger state.
//!
//! This crate holds the write side of the projector:
//! - [`Event`] batches as delivered by the upstream feed, and the binary
//!   state-delta codec
//! - [`ForkCheck`] deciding duplicate / new head / history rewrite per block
//! - [`ProjectionStore`] with a PostgreSQL implementation and an in-memory
//!   test double
//! - [`EventPipeline`], the single logical writer applying one atomic unit of
//!   work per block
//!
//! Read queries for the external reporting layer live in [`queries`].

pub mod error;
pub mod event;
pub mod fork;
pub mod memory;
pub mod pipeline;
pub mod postgres;
pub mod queries;
pub mod rows;
pub mod store;

pub use error::{ProjectionError, Result};
pub use event::{Event, EventAttribute, StateChange, BLOCK_COMMIT_EVENT, STATE_DELTA_EVENT};
pub use fork::{BlockRef, ForkCheck};
pub use memory::InMemoryProjectionStore;
pub use pipeline::EventPipeline;
pub use postgres::PostgresProjectionStore;
pub use rows::ProjectedEntity;
pub use store::ProjectionStore;
