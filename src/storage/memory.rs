use async_trait::async_trait;
use parking_lot::RwLock;

use super::{summarize, SearchCriteria, StatsSummary, StorageProvider};
use crate::error::StorageResult;
use crate::record::{RequestRecord, TimeWindow};

/// Ephemeral, process-local record store.
///
/// Appends and reads take the lock only for the duration of a plain
/// `Vec` operation, never across an await point. Pruning is the sole
/// removal path.
#[derive(Default)]
pub struct InMemoryStorage {
    records: RwLock<Vec<RequestRecord>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn store(&self, record: RequestRecord) -> StorageResult<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn get_stats(&self, window: TimeWindow) -> StorageResult<StatsSummary> {
        let records = self.records.read();
        Ok(summarize(records.iter().filter(|r| window.overlaps(r))))
    }

    async fn get_requests(&self, window: TimeWindow) -> StorageResult<Vec<RequestRecord>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| window.overlaps(r))
            .cloned()
            .collect())
    }

    async fn get_request_by_id(&self, id: &str) -> StorageResult<Option<RequestRecord>> {
        Ok(self.records.read().iter().find(|r| r.id == id).cloned())
    }

    async fn search_requests(
        &self,
        criteria: &SearchCriteria,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<RequestRecord>> {
        let mut matched: Vec<RequestRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| criteria.matches(r))
            .cloned()
            .collect();

        // Stable sort: equal start times keep insertion order
        matched.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_requests_older_than(&self, cutoff: i64) -> StorageResult<u64> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.start_time >= cutoff);
        Ok((before - records.len()) as u64)
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
