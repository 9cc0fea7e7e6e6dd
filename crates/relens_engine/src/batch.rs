//! Resumable, checkpoint-aware page iteration over the record store.

use crate::retry::{with_backoff, RetryPolicy};
use relens_db::{RecordFilter, RecordStore, StoreError};
use relens_protocol::TextRecord;
use std::sync::Arc;

/// Produces ordered pages of records at ascending offsets.
///
/// The filter (date bounds, alias-expanded tool family, resume predicate) is
/// fixed at construction; the offset advances by one batch per call whether
/// the fetch succeeded or failed, so a failing page is skipped rather than
/// refetched forever.
pub struct BatchIterator {
    records: Arc<dyn RecordStore>,
    filter: RecordFilter,
    batch_size: u32,
    offset: u64,
    retry: RetryPolicy,
}

impl BatchIterator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        filter: RecordFilter,
        batch_size: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            records,
            filter,
            batch_size,
            offset: 0,
            retry,
        }
    }

    /// Offset the next fetch will use.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Fetch the next page. `Ok(None)` means the collection is exhausted.
    ///
    /// Throttling is retried inside; an error returned here already survived
    /// backoff and the iterator has moved past the failing offset.
    pub async fn next_page(&mut self) -> Result<Option<Vec<TextRecord>>, StoreError> {
        let records = &self.records;
        let filter = &self.filter;
        let offset = self.offset;
        let limit = self.batch_size;

        let result = with_backoff(&self.retry, || async move {
            records.fetch_page(filter, offset, limit).await
        })
        .await;

        self.offset += self.batch_size as u64;

        match result {
            Ok(page) if page.is_empty() => Ok(None),
            Ok(page) => Ok(Some(page)),
            Err(err) => Err(err),
        }
    }
}
