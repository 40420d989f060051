//! Core projection store trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::fork::BlockRef;
use crate::rows::ProjectedEntity;

/// Storage backend for the projection.
///
/// The event pipeline is the only writer; read-serving consumers query the
/// backing database directly under read-committed isolation and never
/// observe a partially applied block.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Fetches the committed block row at `block_num`, if any.
    async fn fetch_block(&self, block_num: i64) -> Result<Option<BlockRef>>;

    /// Fetches up to `count` most recently committed blocks, newest first.
    /// Used to seed replay on (re)connect.
    async fn last_known_blocks(&self, count: i64) -> Result<Vec<BlockRef>>;

    /// Applies one block as a single atomic unit of work.
    ///
    /// If `rollback_from` is set, every row in every entity table (and
    /// `blocks`) with `start_block_num >= rollback_from` is deleted first.
    /// The rollback, the upserts, and the block row insert commit together
    /// or not at all. The block row is recorded even for an empty change
    /// set so later blocks can detect forks against it.
    async fn apply_block(
        &self,
        block: &BlockRef,
        rollback_from: Option<i64>,
        rows: Vec<ProjectedEntity>,
    ) -> Result<()>;
}
