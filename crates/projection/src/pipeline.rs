//! The event pipeline: one atomic state transition per block.

use domain::DecodeError;

use crate::error::Result;
use crate::event::{BLOCK_COMMIT_EVENT, Event, STATE_DELTA_EVENT, StateChange, decode_state_changes};
use crate::fork::{BlockRef, ForkCheck};
use crate::rows::{ProjectedEntity, rows_for_entry};
use crate::store::ProjectionStore;

/// Applies event batches from the upstream feed to a projection store.
///
/// Exactly one pipeline instance processes batches, serially. Correctness
/// under redelivery and history rewrites comes from the fork check: a
/// duplicate block is a no-op and a conflicting block triggers rollback
/// inside the same transaction that applies the replacement.
pub struct EventPipeline<S: ProjectionStore> {
    store: S,
}

impl<S: ProjectionStore> EventPipeline<S> {
    /// Creates a pipeline writing to `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Gets a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handles one event batch for one block.
    ///
    /// A batch without a block-commit notification is skipped without side
    /// effects. Any error aborts the batch before commit; the caller logs it
    /// and keeps the loop alive so the block can be redelivered.
    #[tracing::instrument(skip(self, events))]
    pub async fn handle(&self, events: &[Event]) -> Result<()> {
        let Some(block) = parse_block_commit(events) else {
            tracing::warn!("batch has no block-commit notification, skipping");
            metrics::counter!("projector_batches_skipped").increment(1);
            return Ok(());
        };
        tracing::debug!(block_num = block.block_num, block_id = %block.block_id, "handling deltas");

        let existing = self.store.fetch_block(block.block_num).await?;
        let rollback_from = match ForkCheck::compare(existing.as_ref(), &block) {
            ForkCheck::Duplicate => {
                tracing::debug!(block_num = block.block_num, "duplicate block, skipping");
                metrics::counter!("projector_blocks_duplicate").increment(1);
                return Ok(());
            }
            ForkCheck::Forked => {
                // existing is Some here by construction.
                if let Some(committed) = &existing {
                    tracing::info!(
                        block_num = block.block_num,
                        old_id = %committed.block_id,
                        new_id = %block.block_id,
                        "fork detected, rolling back"
                    );
                }
                metrics::counter!("projector_forks_resolved").increment(1);
                Some(block.block_num)
            }
            ForkCheck::NewBlock => None,
        };

        let changes = parse_state_changes(events)?;
        let mut rows: Vec<ProjectedEntity> = Vec::new();
        for change in &changes {
            match domain::decode(&change.address, &change.value) {
                Ok(entry) => {
                    rows.extend(rows_for_entry(&change.address, entry, block.block_num)?);
                }
                Err(DecodeError::Unsupported(space)) => {
                    tracing::warn!(%space, address = %change.address, "unsupported data type");
                }
                Err(err) => return Err(err.into()),
            }
        }

        // The block row is recorded even for an empty change set so later
        // blocks can detect gaps and forks against it.
        let row_count = rows.len();
        self.store.apply_block(&block, rollback_from, rows).await?;

        metrics::counter!("projector_blocks_applied").increment(1);
        metrics::counter!("projector_changes_projected").increment(row_count as u64);
        Ok(())
    }
}

/// Extracts the `(block_num, block_id)` pair from a batch, if present and
/// well formed.
fn parse_block_commit(events: &[Event]) -> Option<BlockRef> {
    let event = events.iter().find(|e| e.event_type == BLOCK_COMMIT_EVENT)?;
    let block_num = event.attribute("block_num")?.parse().ok()?;
    let block_id = event.attribute("block_id")?;
    Some(BlockRef::new(block_num, block_id))
}

/// Extracts the namespace-filtered state changes from a batch.
///
/// A batch without a state-delta section yields an empty list; foreign
/// addresses are dropped, not errors.
fn parse_state_changes(events: &[Event]) -> Result<Vec<StateChange>> {
    let Some(event) = events.iter().find(|e| e.event_type == STATE_DELTA_EVENT) else {
        return Ok(Vec::new());
    };
    let changes = decode_state_changes(&event.data)?;
    Ok(changes
        .into_iter()
        .filter(|c| c.address.in_namespace())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryProjectionStore;
    use addressing::{Address, actor_address, class_address, record_address};
    use common::PublicKey;
    use serde_json::json;

    fn key(name: &str) -> PublicKey {
        PublicKey::new(name)
    }

    fn actor_payload(id: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "actors": [{
                "actor_public_key": "02aa",
                "manager_public_key": "02bb",
                "id": id,
                "role": "INSTITUTION",
                "profile": [
                    {"data": "", "status": status, "timestamp": 10, "transaction_id": "t1"}
                ],
                "timestamp": 10,
                "transaction_id": "t1"
            }]
        }))
        .unwrap()
    }

    fn record_payload(record_id: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "records": [{
                "owner_public_key": "02aa",
                "issuer_public_key": "02cc",
                "manager_public_key": "02bb",
                "record_id": record_id,
                "record_type": "CERTIFICATE",
                "versions": [
                    {"portfolio_id": "p1", "data": "enc", "record_status": status,
                     "timestamp": 10, "transaction_id": "t1"}
                ]
            }]
        }))
        .unwrap()
    }

    fn batch(block_num: i64, block_id: &str, changes: &[StateChange]) -> Vec<Event> {
        vec![
            Event::block_commit(block_num, block_id),
            Event::state_delta(changes),
        ]
    }

    fn change(address: Address, value: Vec<u8>) -> StateChange {
        StateChange { address, value }
    }

    #[tokio::test]
    async fn applies_actor_change_and_records_block() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let addr = actor_address(&key("02aa"));
        let events = batch(100, "A", &[change(addr.clone(), actor_payload("a1", "ACTIVE"))]);
        pipeline.handle(&events).await.unwrap();

        let row = store.actor(addr.as_str()).await.unwrap();
        assert_eq!(row.status, "ACTIVE");
        assert_eq!(row.start_block_num, 100);
        assert_eq!(store.blocks().await, vec![BlockRef::new(100, "A")]);
    }

    #[tokio::test]
    async fn duplicate_block_is_a_no_op() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let addr = actor_address(&key("02aa"));
        let events = batch(100, "A", &[change(addr.clone(), actor_payload("a1", "ACTIVE"))]);
        pipeline.handle(&events).await.unwrap();
        let rows_after_first = store.row_count().await;

        pipeline.handle(&events).await.unwrap();

        assert_eq!(store.row_count().await, rows_after_first);
        assert_eq!(store.blocks().await.len(), 1);
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let addr = record_address("r1", &key("02aa"), &key("02bb"));
        let events = batch(5, "B5", &[change(addr.clone(), record_payload("r1", "CREATED"))]);

        pipeline.handle(&events).await.unwrap();
        let first = store.record(addr.as_str()).await.unwrap();
        pipeline.handle(&events).await.unwrap();
        let second = store.record(addr.as_str()).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn fork_rolls_back_old_branch_before_applying_new() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let old_addr = actor_address(&key("02aa"));
        let events = batch(100, "A", &[change(old_addr.clone(), actor_payload("a1", "ACTIVE"))]);
        pipeline.handle(&events).await.unwrap();

        let new_addr = record_address("r1", &key("02aa"), &key("02bb"));
        let events = batch(100, "B", &[change(new_addr.clone(), record_payload("r1", "CREATED"))]);
        pipeline.handle(&events).await.unwrap();

        // Old branch rows are gone, new branch rows and block identity remain.
        assert!(store.actor(old_addr.as_str()).await.is_none());
        assert!(store.record(new_addr.as_str()).await.is_some());
        assert_eq!(store.blocks().await, vec![BlockRef::new(100, "B")]);
    }

    #[tokio::test]
    async fn fork_rollback_spares_earlier_blocks() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let early = actor_address(&key("02aa"));
        pipeline
            .handle(&batch(99, "X", &[change(early.clone(), actor_payload("a1", "ACTIVE"))]))
            .await
            .unwrap();
        let late = actor_address(&key("02dd"));
        pipeline
            .handle(&batch(100, "A", &[change(late.clone(), actor_payload("a2", "WAITING"))]))
            .await
            .unwrap();

        pipeline.handle(&batch(100, "B", &[])).await.unwrap();

        assert!(store.actor(early.as_str()).await.is_some());
        assert!(store.actor(late.as_str()).await.is_none());
        assert_eq!(
            store.blocks().await,
            vec![BlockRef::new(99, "X"), BlockRef::new(100, "B")]
        );
    }

    #[tokio::test]
    async fn foreign_namespace_changes_are_ignored_but_block_is_recorded() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let foreign = Address::new("f".repeat(70));
        if foreign.in_namespace() {
            return;
        }
        let events = batch(7, "F", &[change(foreign, b"not even json".to_vec())]);
        pipeline.handle(&events).await.unwrap();

        assert_eq!(store.row_count().await, 0);
        assert_eq!(store.blocks().await, vec![BlockRef::new(7, "F")]);
    }

    #[tokio::test]
    async fn batch_without_block_commit_is_skipped() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let addr = actor_address(&key("02aa"));
        let events = vec![Event::state_delta(&[change(
            addr.clone(),
            actor_payload("a1", "ACTIVE"),
        )])];
        pipeline.handle(&events).await.unwrap();

        assert_eq!(store.row_count().await, 0);
        assert!(store.blocks().await.is_empty());
    }

    #[tokio::test]
    async fn empty_change_set_still_records_block() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        pipeline
            .handle(&[Event::block_commit(3, "C")])
            .await
            .unwrap();

        assert_eq!(store.blocks().await, vec![BlockRef::new(3, "C")]);
    }

    #[tokio::test]
    async fn decode_failure_aborts_without_side_effects() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let addr = actor_address(&key("02aa"));
        let events = batch(9, "D", &[change(addr, b"garbage".to_vec())]);
        let err = pipeline.handle(&events).await.unwrap_err();
        assert!(matches!(err, crate::ProjectionError::Decode(_)));

        assert_eq!(store.row_count().await, 0);
        assert!(store.blocks().await.is_empty());
    }

    #[tokio::test]
    async fn later_status_updates_in_place() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let addr = actor_address(&key("02aa"));
        pipeline
            .handle(&batch(1, "B1", &[change(addr.clone(), actor_payload("a1", "WAITING"))]))
            .await
            .unwrap();
        pipeline
            .handle(&batch(2, "B2", &[change(addr.clone(), actor_payload("a1", "ACTIVE"))]))
            .await
            .unwrap();

        let row = store.actor(addr.as_str()).await.unwrap();
        assert_eq!(row.status, "ACTIVE");
        assert_eq!(row.start_block_num, 2);
        assert_eq!(store.row_count().await, 1);
    }

    #[tokio::test]
    async fn class_change_projects_one_row_per_student() {
        let store = InMemoryProjectionStore::new();
        let pipeline = EventPipeline::new(store.clone());

        let addr = class_address("c1", &key("02inst"));
        let payload = serde_json::to_vec(&json!({
            "classes": [{
                "class_id": "c1",
                "institution_public_key": "02inst",
                "subject_id": "s1",
                "teacher_public_key": "02t",
                "credit": 3,
                "student_public_keys": ["02s1", "02s2"],
                "timestamp": 10,
                "transaction_id": "t1"
            }]
        }))
        .unwrap();

        pipeline
            .handle(&batch(4, "B4", &[change(addr.clone(), payload)]))
            .await
            .unwrap();

        assert_eq!(store.class_rows(addr.as_str()).await.len(), 2);
    }
}
