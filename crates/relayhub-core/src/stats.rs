use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use serde::Serialize;

use relayhub_common::InterfaceType;
use relayhub_transform::TokenUsage;

/// Cumulative per-endpoint counters for the `/stats` view.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatsEntry {
    pub endpoint: String,
    pub input: u64,
    pub output: u64,
    pub cached_create: u64,
    pub cached_read: u64,
    pub reasoning: u64,
    pub total: u64,
}

/// In-memory token totals keyed by endpoint name.
pub struct TokenStatsMap {
    totals: Mutex<BTreeMap<String, TokenUsage>>,
}

impl TokenStatsMap {
    pub fn new() -> Self {
        Self {
            totals: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record(&self, endpoint: &str, usage: &TokenUsage) {
        if usage.is_empty() {
            return;
        }
        let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        let entry = totals.entry(endpoint.to_string()).or_default();
        entry.input += usage.input;
        entry.output += usage.output;
        entry.cached_create += usage.cached_create;
        entry.cached_read += usage.cached_read;
        entry.reasoning += usage.reasoning;
    }

    pub fn snapshot(&self) -> Vec<TokenStatsEntry> {
        let totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        totals
            .iter()
            .map(|(endpoint, usage)| TokenStatsEntry {
                endpoint: endpoint.clone(),
                input: usage.input,
                output: usage.output,
                cached_create: usage.cached_create,
                cached_read: usage.cached_read,
                reasoning: usage.reasoning,
                total: usage.total(),
            })
            .collect()
    }
}

impl Default for TokenStatsMap {
    fn default() -> Self {
        Self::new()
    }
}

/// One row for the append-only stats store.
#[derive(Debug, Clone)]
pub struct StatsRecord {
    pub vendor_id: i64,
    pub endpoint_id: i64,
    pub endpoint_name: String,
    pub path: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub interface_type: InterfaceType,
    pub duration_ms: i64,
    pub status_code: u16,
    pub status_tag: String,
    pub usage: TokenUsage,
}

/// Insert-only persistence boundary.
///
/// Implementations must be best-effort and must not block the request path.
pub trait StatsSink: Send + Sync {
    fn insert<'a>(&'a self, record: &'a StatsRecord) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Sink used when no storage is configured.
pub struct NullStatsSink;

impl StatsSink for NullStatsSink {
    fn insert<'a>(&'a self, _record: &'a StatsRecord) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

pub fn today_date() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}",
        now.year(),
        now.month() as u8,
        now.day()
    )
}
