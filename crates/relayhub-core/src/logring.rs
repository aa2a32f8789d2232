use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

use relayhub_common::InterfaceType;

pub const LOG_RING_CAPACITY: usize = 5;

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_SUCCESS: &str = "success";

pub fn status_error(code: u16) -> String {
    format!("error_{code}")
}

/// One request in the recent-log view.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEntry {
    pub id: String,
    pub interface_type: InterfaceType,
    pub vendor_id: i64,
    pub endpoint_name: String,
    pub path: String,
    /// Unix milliseconds.
    pub started_at_ms: i64,
    pub duration_ms: i64,
    pub status: String,
    pub method: String,
    pub upstream_status: u16,
    pub target_url: String,
    /// Already sanitised (auth masked, cookies redacted).
    pub request_headers: Vec<(String, String)>,
    pub request_body: String,
    /// First ≤50 KiB of the response body or stream.
    pub response_preview: String,
    /// Masked upstream credential.
    pub auth_preview: String,
}

/// Bounded in-memory log, newest first, upsert by request id.
///
/// Separate from the stats sink on purpose: this ring serves the live
/// detail view only, aggregation queries go to storage.
pub struct RequestLog {
    entries: Mutex<VecDeque<RequestLogEntry>>,
    capacity: usize,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_RING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Insert or replace by request id, keeping newest first.
    pub fn upsert(&self, entry: RequestLogEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(position) = entries.iter().position(|e| e.id == entry.id) {
            entries.remove(position);
            entries.push_front(entry);
            return;
        }
        entries.push_front(entry);
        while entries.len() > self.capacity {
            entries.pop_back();
        }
    }

    pub fn snapshot(&self) -> Vec<RequestLogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, status: &str) -> RequestLogEntry {
        RequestLogEntry {
            id: id.to_string(),
            interface_type: InterfaceType::Claude,
            vendor_id: 0,
            endpoint_name: "a".to_string(),
            path: "/v1/messages".to_string(),
            started_at_ms: 0,
            duration_ms: 0,
            status: status.to_string(),
            method: "POST".to_string(),
            upstream_status: 0,
            target_url: String::new(),
            request_headers: Vec::new(),
            request_body: String::new(),
            response_preview: String::new(),
            auth_preview: String::new(),
        }
    }

    #[test]
    fn upsert_replaces_by_id() {
        let log = RequestLog::new();
        log.upsert(entry("r1", STATUS_IN_PROGRESS));
        log.upsert(entry("r2", STATUS_IN_PROGRESS));
        log.upsert(entry("r1", STATUS_SUCCESS));

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, "r1");
        assert_eq!(snapshot[0].status, STATUS_SUCCESS);
        assert_eq!(snapshot[1].id, "r2");
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let log = RequestLog::new();
        for i in 0..7 {
            log.upsert(entry(&format!("r{i}"), STATUS_SUCCESS));
        }
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), LOG_RING_CAPACITY);
        assert_eq!(snapshot[0].id, "r6");
        assert!(snapshot.iter().all(|e| e.id != "r0"));
    }

    #[test]
    fn status_tags() {
        assert_eq!(status_error(404), "error_404");
    }
}
