//! In-memory projection store for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::fork::BlockRef;
use crate::rows::{
    ActorRow, ClassRow, EduProgramRow, EnvironmentRow, ProjectedEntity, RecordRow, VotingRow,
};
use crate::store::ProjectionStore;

#[derive(Default)]
struct Tables {
    blocks: BTreeMap<i64, String>,
    actors: HashMap<String, ActorRow>,
    records: HashMap<String, RecordRow>,
    classes: HashMap<(String, String), ClassRow>,
    edu_programs: HashMap<String, EduProgramRow>,
    votings: HashMap<String, VotingRow>,
    environment: HashMap<String, EnvironmentRow>,
}

/// In-memory implementation with the same atomicity guarantees as the
/// PostgreSQL store, for pipeline tests.
#[derive(Clone, Default)]
pub struct InMemoryProjectionStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryProjectionStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the projected actor row at `address`, if any.
    pub async fn actor(&self, address: &str) -> Option<ActorRow> {
        self.tables.read().await.actors.get(address).cloned()
    }

    /// Returns the projected record row at `address`, if any.
    pub async fn record(&self, address: &str) -> Option<RecordRow> {
        self.tables.read().await.records.get(address).cloned()
    }

    /// Returns all class rows at `address`, one per student.
    pub async fn class_rows(&self, address: &str) -> Vec<ClassRow> {
        self.tables
            .read()
            .await
            .classes
            .values()
            .filter(|r| r.address.as_str() == address)
            .cloned()
            .collect()
    }

    /// Returns all committed blocks, oldest first.
    pub async fn blocks(&self) -> Vec<BlockRef> {
        self.tables
            .read()
            .await
            .blocks
            .iter()
            .map(|(num, id)| BlockRef::new(*num, id.clone()))
            .collect()
    }

    /// Total number of projected entity rows across all tables.
    pub async fn row_count(&self) -> usize {
        let tables = self.tables.read().await;
        tables.actors.len()
            + tables.records.len()
            + tables.classes.len()
            + tables.edu_programs.len()
            + tables.votings.len()
            + tables.environment.len()
    }
}

#[async_trait]
impl ProjectionStore for InMemoryProjectionStore {
    async fn fetch_block(&self, block_num: i64) -> Result<Option<BlockRef>> {
        let tables = self.tables.read().await;
        Ok(tables
            .blocks
            .get(&block_num)
            .map(|id| BlockRef::new(block_num, id.clone())))
    }

    async fn last_known_blocks(&self, count: i64) -> Result<Vec<BlockRef>> {
        let tables = self.tables.read().await;
        Ok(tables
            .blocks
            .iter()
            .rev()
            .take(count as usize)
            .map(|(num, id)| BlockRef::new(*num, id.clone()))
            .collect())
    }

    async fn apply_block(
        &self,
        block: &BlockRef,
        rollback_from: Option<i64>,
        rows: Vec<ProjectedEntity>,
    ) -> Result<()> {
        // The whole apply happens under one write lock, mirroring the
        // single transaction of the PostgreSQL store.
        let mut tables = self.tables.write().await;

        if let Some(block_num) = rollback_from {
            tables.actors.retain(|_, r| r.start_block_num < block_num);
            tables.records.retain(|_, r| r.start_block_num < block_num);
            tables.classes.retain(|_, r| r.start_block_num < block_num);
            tables
                .edu_programs
                .retain(|_, r| r.start_block_num < block_num);
            tables.votings.retain(|_, r| r.start_block_num < block_num);
            tables
                .environment
                .retain(|_, r| r.start_block_num < block_num);
            tables.blocks.retain(|num, _| *num < block_num);
        }

        for row in rows {
            match row {
                ProjectedEntity::Actor(row) => {
                    // Upsert: latest status wins at the same address.
                    tables.actors.insert(row.address.as_str().to_string(), row);
                }
                ProjectedEntity::Record(row) => {
                    tables
                        .records
                        .insert(row.address.as_str().to_string(), row);
                }
                ProjectedEntity::Class(row) => {
                    let key = (
                        row.address.as_str().to_string(),
                        row.student_public_key.as_str().to_string(),
                    );
                    // Class membership is immutable once projected.
                    tables.classes.entry(key).or_insert(row);
                }
                ProjectedEntity::EduProgram(row) => {
                    tables
                        .edu_programs
                        .entry(row.address.as_str().to_string())
                        .or_insert(row);
                }
                ProjectedEntity::Voting(row) => {
                    tables
                        .votings
                        .insert(row.address.as_str().to_string(), row);
                }
                ProjectedEntity::Environment(row) => {
                    tables
                        .environment
                        .insert(row.address.as_str().to_string(), row);
                }
            }
        }

        tables
            .blocks
            .entry(block.block_num)
            .or_insert_with(|| block.block_id.clone());

        Ok(())
    }
}
