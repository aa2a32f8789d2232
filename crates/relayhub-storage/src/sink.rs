use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use relayhub_core::{StatsRecord, StatsSink};
use tracing::warn;

use crate::storage::StatsStorage;

/// Persist stats rows via `StatsStorage::insert_request`.
///
/// Failures are logged and swallowed; persistence must never fail a request.
pub struct DbStatsSink {
    storage: Arc<StatsStorage>,
}

impl DbStatsSink {
    pub fn new(storage: Arc<StatsStorage>) -> Self {
        Self { storage }
    }
}

impl StatsSink for DbStatsSink {
    fn insert<'a>(&'a self, record: &'a StatsRecord) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Err(err) = self.storage.insert_request(record).await {
                warn!(event = "stats_insert_failed", error = %err);
            }
        })
    }
}
