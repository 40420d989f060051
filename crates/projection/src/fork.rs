//! Fork resolution: duplicate, new head, or history rewrite.

use serde::{Deserialize, Serialize};

/// A committed block's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub block_num: i64,
    pub block_id: String,
}

impl BlockRef {
    pub fn new(block_num: i64, block_id: impl Into<String>) -> Self {
        Self {
            block_num,
            block_id: block_id.into(),
        }
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.block_num, &self.block_id)
    }
}

/// Outcome of checking an incoming block against the committed `blocks` row
/// for the same number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkCheck {
    /// No row exists for this block number; apply normally.
    NewBlock,

    /// The same `(block_num, block_id)` pair is already committed; skip
    /// change application entirely.
    Duplicate,

    /// A different `block_id` is committed at this number: the chain history
    /// was rewritten and every projected row with `start_block_num >=
    /// block_num` must be rolled back before applying.
    Forked,
}

impl ForkCheck {
    /// Compares the incoming block against whatever is committed at its
    /// number.
    pub fn compare(existing: Option<&BlockRef>, incoming: &BlockRef) -> Self {
        match existing {
            None => ForkCheck::NewBlock,
            Some(committed) if committed.block_id == incoming.block_id => ForkCheck::Duplicate,
            Some(_) => ForkCheck::Forked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_block_is_new() {
        let incoming = BlockRef::new(100, "aaa");
        assert_eq!(ForkCheck::compare(None, &incoming), ForkCheck::NewBlock);
    }

    #[test]
    fn same_id_is_duplicate() {
        let committed = BlockRef::new(100, "aaa");
        let incoming = BlockRef::new(100, "aaa");
        assert_eq!(
            ForkCheck::compare(Some(&committed), &incoming),
            ForkCheck::Duplicate
        );
    }

    #[test]
    fn different_id_is_fork() {
        let committed = BlockRef::new(100, "aaa");
        let incoming = BlockRef::new(100, "bbb");
        assert_eq!(
            ForkCheck::compare(Some(&committed), &incoming),
            ForkCheck::Forked
        );
    }
}
