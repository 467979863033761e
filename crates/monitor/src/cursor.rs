use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use contract_watch_domain::model::ContractId;
use contract_watch_domain::storage::{BlockCursorStore, StorageResult};

/// How far back the first scan of a contract reaches.
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 100;

/// Inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub from: u64,
    pub to: u64,
}

impl BlockWindow {
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// True when the endpoint reports a height below the stored cursor.
    pub const fn is_empty(&self) -> bool {
        self.from > self.to
    }
}

/// Process-local cursors; lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: DashMap<ContractId, u64>,
}

#[async_trait]
impl BlockCursorStore for InMemoryCursorStore {
    async fn last_processed_block(&self, id: ContractId) -> StorageResult<Option<u64>> {
        Ok(self.cursors.get(&id).map(|entry| *entry.value()))
    }

    async fn advance_cursor(&self, id: ContractId, height: u64) -> StorageResult<()> {
        self.cursors
            .entry(id)
            .and_modify(|current| *current = (*current).max(height))
            .or_insert(height);
        Ok(())
    }
}

/// Computes the block window each scan covers.
pub struct BlockRangeTracker {
    store: Arc<dyn BlockCursorStore>,
    lookback: u64,
}

impl BlockRangeTracker {
    pub fn new(store: Arc<dyn BlockCursorStore>) -> Self {
        Self {
            store,
            lookback: DEFAULT_LOOKBACK_BLOCKS,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCursorStore::default()))
    }

    /// `[cursor, current]` once a cursor exists, otherwise the trailing
    /// `lookback` blocks. The cursor block itself is re-scanned.
    pub async fn next_window(&self, id: ContractId, current: u64) -> StorageResult<BlockWindow> {
        let from = match self.store.last_processed_block(id).await? {
            Some(cursor) => cursor,
            None => current.saturating_sub(self.lookback),
        };
        Ok(BlockWindow::new(from, current))
    }

    pub async fn last_processed(&self, id: ContractId) -> StorageResult<Option<u64>> {
        self.store.last_processed_block(id).await
    }

    pub async fn advance(&self, id: ContractId, height: u64) -> StorageResult<()> {
        self.store.advance_cursor(id, height).await
    }
}
