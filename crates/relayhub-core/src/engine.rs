use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{Value as JsonValue, json};
use tokio::sync::mpsc;
use tracing::{info, warn};

use relayhub_common::{
    Endpoint, EndpointKey, InterfaceType, detect_interface_type, mask_secret, sanitize_headers,
};
use relayhub_transform::TokenUsage;

use crate::breaker::CircuitBreaker;
use crate::client::UpstreamClient;
use crate::events::{Event, EventHub, FallbackSwitch, TempDisabled};
use crate::executor::{
    Executor, ForwardError, ForwardRequest, ForwardResult, StreamFinalizer, StreamSummary,
    capture_body,
};
use crate::logring::{RequestLog, RequestLogEntry, STATUS_IN_PROGRESS, STATUS_SUCCESS, status_error};
use crate::router::EndpointRouter;
use crate::stats::{StatsRecord, StatsSink, TokenStatsMap, today_date};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_attempts_per_endpoint: u32,
    pub max_total_attempts: u32,
    pub breaker_threshold: u32,
    pub temp_disable_ttl: Duration,
    /// Enables retry/rotation for retryable paths.
    pub fallback: bool,
    /// Treat upstream 429 as retryable.
    pub retry429: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_endpoint: 2,
            max_total_attempts: 10,
            breaker_threshold: 2,
            temp_disable_ttl: Duration::from_secs(5 * 60),
            fallback: true,
            retry429: false,
        }
    }
}

/// Inbound request as seen by the engine, body fully read.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub id: String,
    pub method: http::Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

pub enum EngineResponse {
    Buffered {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
    Stream {
        status: u16,
        headers: Vec<(String, String)>,
        content_type: String,
        body: mpsc::Receiver<Bytes>,
    },
}

/// Per-request attempt bookkeeping.
#[derive(Debug, Default)]
struct RetryTracker {
    attempts: HashMap<EndpointKey, u32>,
    exhausted: HashSet<EndpointKey>,
    total: u32,
}

impl RetryTracker {
    fn record_attempt(&mut self, key: &EndpointKey) -> u32 {
        self.total += 1;
        let count = self.attempts.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    fn mark_exhausted(&mut self, key: &EndpointKey) {
        self.exhausted.insert(key.clone());
    }

    fn is_exhausted(&self, key: &EndpointKey) -> bool {
        self.exhausted.contains(key)
    }
}

enum FailureClass {
    /// Cancellation or local deadline; no breaker update, no retry.
    Ignorable,
    /// Upstream answered with a non-retriable status; hand it to the client.
    Passthrough,
    /// Transport error or retriable status; counts toward the breaker.
    Retryable,
    /// Translator rejected the request; 400, no retry.
    BadRequest,
}

/// Orchestrates router, breaker, tracker and executor for one request.
pub struct ProxyEngine {
    pub router: Arc<EndpointRouter>,
    pub events: EventHub,
    pub log: Arc<RequestLog>,
    pub stats: Arc<TokenStatsMap>,
    breaker: CircuitBreaker,
    executor: Executor,
    sink: Arc<dyn StatsSink>,
    config: EngineConfig,
}

impl ProxyEngine {
    pub fn new(
        router: Arc<EndpointRouter>,
        client: Arc<dyn UpstreamClient>,
        sink: Arc<dyn StatsSink>,
        events: EventHub,
        config: EngineConfig,
    ) -> Self {
        router.set_temp_disable_ttl(config.temp_disable_ttl);
        Self {
            router,
            events,
            log: Arc::new(RequestLog::new()),
            stats: Arc::new(TokenStatsMap::new()),
            breaker: CircuitBreaker::new(config.breaker_threshold),
            executor: Executor::new(client),
            sink,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn execute(&self, request: ClientRequest) -> EngineResponse {
        let interface = detect_interface_type(&request.path);
        let is_streaming = detect_streaming(&request);
        let started_at_ms = now_ms();
        let started = std::time::Instant::now();

        let forward_request = ForwardRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            is_streaming,
        };

        self.record_log(base_entry(&request, interface, started_at_ms, None));

        let retry_enabled = self.config.fallback && is_retryable_path(&request.path);
        let mut tracker = RetryTracker::default();
        let mut current = self.router.get_active(interface);
        let mut last_error: Option<String> = None;

        while let Some(endpoint) = current.take() {
            if tracker.total >= self.config.max_total_attempts {
                break;
            }
            let key = endpoint.key();
            if tracker.is_exhausted(&key) {
                current = self
                    .router
                    .find_next_untried(interface, &key, &tracker.exhausted);
                if current.is_none() {
                    break;
                }
                continue;
            }
            let attempt_no = tracker.record_attempt(&key);

            info!(
                event = "forward_attempt",
                request_id = %request.id,
                endpoint = %endpoint.name,
                interface = %interface,
                attempt = attempt_no,
                total = tracker.total
            );

            let finalizer =
                self.stream_finalizer(&request, &endpoint, interface, started_at_ms, started);
            let result = self.executor.forward(&forward_request, &endpoint, finalizer).await;

            if let Some(stream) = result.stream {
                // Bytes are on the wire; streams are never retried. The pump
                // task finishes the log entry and stats when the stream ends.
                if retry_enabled {
                    self.breaker.record_success(&key);
                }
                return EngineResponse::Stream {
                    status: result.status,
                    headers: result.headers,
                    content_type: result
                        .content_type
                        .unwrap_or_else(|| "text/event-stream".to_string()),
                    body: stream,
                };
            }

            if result.is_success() {
                if retry_enabled {
                    self.breaker.record_success(&key);
                }
                self.finalize(
                    &request,
                    &endpoint,
                    interface,
                    started_at_ms,
                    started,
                    &result,
                    STATUS_SUCCESS.to_string(),
                );
                return buffered(result);
            }

            last_error = Some(describe_failure(&result));
            let class = classify_failure(&result, self.config.retry429);

            if matches!(class, FailureClass::BadRequest) {
                let body = error_body(last_error.as_deref().unwrap_or("invalid request"));
                self.finalize_synthesized(
                    &request, &endpoint, interface, started_at_ms, started, &result, 400,
                );
                return synthesized(400, body);
            }

            if !retry_enabled {
                // Single attempt; breaker untouched.
                return self.settle_failure(
                    &request, &endpoint, interface, started_at_ms, started, result, last_error,
                );
            }

            match class {
                FailureClass::Ignorable => {
                    return self.settle_failure(
                        &request, &endpoint, interface, started_at_ms, started, result, last_error,
                    );
                }
                FailureClass::Passthrough => {
                    return self.settle_failure(
                        &request, &endpoint, interface, started_at_ms, started, result, last_error,
                    );
                }
                FailureClass::Retryable => {
                    let count = self.breaker.record_failure(&key);
                    if self.breaker.should_trip(&key) {
                        let until_ms = self.router.disable(interface, &key);
                        self.breaker.reset(&key);
                        tracker.mark_exhausted(&key);
                        warn!(
                            event = "endpoint_temp_disabled",
                            endpoint = %endpoint.name,
                            interface = %interface,
                            failures = count,
                            until_ms
                        );
                        self.events.emit(Event::EndpointTempDisabled(TempDisabled {
                            interface_type: interface,
                            endpoint: endpoint.name.clone(),
                            until_ms,
                        }));
                        current = self.rotate(interface, &endpoint, &tracker, "breaker tripped");
                    } else if count_attempts(&tracker, &key) >= self.config.max_attempts_per_endpoint
                    {
                        tracker.mark_exhausted(&key);
                        current = self.rotate(interface, &endpoint, &tracker, "attempts exhausted");
                    } else {
                        current = Some(endpoint);
                    }
                }
                FailureClass::BadRequest => unreachable!("handled above"),
            }
        }

        let message = match last_error {
            Some(reason) => format!("All endpoints failed: {reason}"),
            None => format!("no enabled endpoint for interface {interface}"),
        };
        self.record_log(RequestLogEntry {
            status: status_error(503),
            duration_ms: started.elapsed().as_millis() as i64,
            ..base_entry(&request, interface, started_at_ms, None)
        });
        synthesized(503, error_body(&message))
    }

    fn rotate(
        &self,
        interface: InterfaceType,
        from: &Endpoint,
        tracker: &RetryTracker,
        reason: &str,
    ) -> Option<Endpoint> {
        let next = self
            .router
            .find_next_untried(interface, &from.key(), &tracker.exhausted);
        info!(
            event = "fallback_switch",
            interface = %interface,
            from = %from.name,
            to = %next.as_ref().map(|e| e.name.as_str()).unwrap_or("-"),
            reason
        );
        self.events.emit(Event::FallbackSwitch(FallbackSwitch {
            interface_type: interface,
            from: from.name.clone(),
            to: next.as_ref().map(|e| e.name.clone()),
            reason: reason.to_string(),
        }));
        if let Some(next) = &next {
            // Keep new requests off the failing endpoint too.
            let _ = self.router.set_active(interface, &next.key());
        }
        next
    }

    /// Terminal failure: passthrough upstream responses as-is, synthesize a
    /// 503 for local errors.
    #[allow(clippy::too_many_arguments)]
    fn settle_failure(
        &self,
        request: &ClientRequest,
        endpoint: &Endpoint,
        interface: InterfaceType,
        started_at_ms: i64,
        started: std::time::Instant,
        result: ForwardResult,
        last_error: Option<String>,
    ) -> EngineResponse {
        if result.status > 0 {
            self.finalize(
                request,
                endpoint,
                interface,
                started_at_ms,
                started,
                &result,
                status_error(result.status),
            );
            return buffered(result);
        }
        let message = last_error.unwrap_or_else(|| "upstream failure".to_string());
        self.finalize_synthesized(
            request, endpoint, interface, started_at_ms, started, &result, 503,
        );
        synthesized(503, error_body(&message))
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        request: &ClientRequest,
        endpoint: &Endpoint,
        interface: InterfaceType,
        started_at_ms: i64,
        started: std::time::Instant,
        result: &ForwardResult,
        status_tag: String,
    ) {
        let entry = RequestLogEntry {
            endpoint_name: endpoint.name.clone(),
            vendor_id: endpoint.vendor_id,
            duration_ms: started.elapsed().as_millis() as i64,
            status: status_tag.clone(),
            upstream_status: result.status,
            target_url: result.target_url.clone(),
            response_preview: capture_body(&result.body),
            auth_preview: mask_secret(&endpoint.api_key),
            ..base_entry(request, interface, started_at_ms, Some(endpoint))
        };
        self.record_log(entry);
        self.record_usage(request, endpoint, interface, started, result.status, status_tag, &result.usage);
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize_synthesized(
        &self,
        request: &ClientRequest,
        endpoint: &Endpoint,
        interface: InterfaceType,
        started_at_ms: i64,
        started: std::time::Instant,
        result: &ForwardResult,
        status: u16,
    ) {
        let entry = RequestLogEntry {
            endpoint_name: endpoint.name.clone(),
            vendor_id: endpoint.vendor_id,
            duration_ms: started.elapsed().as_millis() as i64,
            status: status_error(status),
            upstream_status: result.status,
            target_url: result.target_url.clone(),
            auth_preview: mask_secret(&endpoint.api_key),
            ..base_entry(request, interface, started_at_ms, Some(endpoint))
        };
        self.record_log(entry);
    }

    fn record_log(&self, entry: RequestLogEntry) {
        self.log.upsert(entry.clone());
        self.events.emit(Event::RequestLog(entry));
    }

    #[allow(clippy::too_many_arguments)]
    fn record_usage(
        &self,
        request: &ClientRequest,
        endpoint: &Endpoint,
        interface: InterfaceType,
        started: std::time::Instant,
        status_code: u16,
        status_tag: String,
        usage: &TokenUsage,
    ) {
        if !usage.is_empty() {
            self.stats.record(&endpoint.name, usage);
            self.events.emit(Event::TokenStats(self.stats.snapshot()));
        }
        let record = StatsRecord {
            vendor_id: endpoint.vendor_id,
            endpoint_id: endpoint.id,
            endpoint_name: endpoint.name.clone(),
            path: request.path.clone(),
            date: today_date(),
            interface_type: interface,
            duration_ms: started.elapsed().as_millis() as i64,
            status_code,
            status_tag,
            usage: *usage,
        };
        let sink = self.sink.clone();
        tokio::spawn(async move {
            sink.insert(&record).await;
        });
    }

    fn stream_finalizer(
        &self,
        request: &ClientRequest,
        endpoint: &Endpoint,
        interface: InterfaceType,
        started_at_ms: i64,
        started: std::time::Instant,
    ) -> StreamFinalizer {
        let log = self.log.clone();
        let stats = self.stats.clone();
        let sink = self.sink.clone();
        let events = self.events.clone();
        let request = request.clone();
        let endpoint = endpoint.clone();

        Box::new(move |summary: StreamSummary| {
            let status_tag = if summary.status == 200 {
                STATUS_SUCCESS.to_string()
            } else {
                status_error(summary.status)
            };
            let entry = RequestLogEntry {
                endpoint_name: endpoint.name.clone(),
                vendor_id: endpoint.vendor_id,
                duration_ms: started.elapsed().as_millis() as i64,
                status: status_tag.clone(),
                upstream_status: summary.status,
                target_url: summary.target_url,
                response_preview: summary.preview,
                auth_preview: mask_secret(&endpoint.api_key),
                ..base_entry(&request, interface, started_at_ms, Some(&endpoint))
            };
            log.upsert(entry.clone());
            events.emit(Event::RequestLog(entry));

            if !summary.usage.is_empty() {
                stats.record(&endpoint.name, &summary.usage);
                events.emit(Event::TokenStats(stats.snapshot()));
            }
            let record = StatsRecord {
                vendor_id: endpoint.vendor_id,
                endpoint_id: endpoint.id,
                endpoint_name: endpoint.name,
                path: request.path,
                date: today_date(),
                interface_type: interface,
                duration_ms: started.elapsed().as_millis() as i64,
                status_code: summary.status,
                status_tag,
                usage: summary.usage,
            };
            tokio::spawn(async move {
                sink.insert(&record).await;
            });
        })
    }
}

fn count_attempts(tracker: &RetryTracker, key: &EndpointKey) -> u32 {
    tracker.attempts.get(key).copied().unwrap_or(0)
}

fn base_entry(
    request: &ClientRequest,
    interface: InterfaceType,
    started_at_ms: i64,
    endpoint: Option<&Endpoint>,
) -> RequestLogEntry {
    RequestLogEntry {
        id: request.id.clone(),
        interface_type: interface,
        vendor_id: endpoint.map(|e| e.vendor_id).unwrap_or(0),
        endpoint_name: endpoint.map(|e| e.name.clone()).unwrap_or_default(),
        path: request.path.clone(),
        started_at_ms,
        duration_ms: 0,
        status: STATUS_IN_PROGRESS.to_string(),
        method: request.method.to_string(),
        upstream_status: 0,
        target_url: String::new(),
        request_headers: sanitize_headers(&request.headers),
        request_body: capture_body(&request.body),
        response_preview: String::new(),
        auth_preview: String::new(),
    }
}

fn buffered(result: ForwardResult) -> EngineResponse {
    EngineResponse::Buffered {
        status: result.status,
        headers: result.headers,
        body: result.body,
    }
}

fn synthesized(status: u16, body: Bytes) -> EngineResponse {
    EngineResponse::Buffered {
        status,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        body,
    }
}

fn error_body(message: &str) -> Bytes {
    Bytes::from(json!({"error": message}).to_string())
}

fn describe_failure(result: &ForwardResult) -> String {
    match &result.error {
        Some(error) => error.to_string(),
        None => format!("upstream status {}", result.status),
    }
}

fn classify_failure(result: &ForwardResult, retry429: bool) -> FailureClass {
    match &result.error {
        Some(ForwardError::Transformer(_)) => FailureClass::BadRequest,
        Some(ForwardError::Transport(failure)) if failure.is_ignorable() => FailureClass::Ignorable,
        Some(ForwardError::Transport(_)) => FailureClass::Retryable,
        None => match result.status {
            500..=599 => FailureClass::Retryable,
            429 if retry429 => FailureClass::Retryable,
            _ => FailureClass::Passthrough,
        },
    }
}

/// Only upstream-bound completion endpoints rotate on failure; auxiliary
/// paths get a single attempt whatever the fallback flag says.
pub fn is_retryable_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    if lower.contains("count_tokens") {
        return false;
    }
    lower.starts_with("/v1/messages")
        || lower.starts_with("/v1/chat/completions")
        || lower.ends_with("/chat/completions")
        || lower.starts_with("/v1/responses")
        || lower.ends_with("/responses")
        || lower.contains("generatecontent")
        || lower.starts_with("/chat")
}

fn detect_streaming(request: &ClientRequest) -> bool {
    if request.path.to_ascii_lowercase().contains(":streamgeneratecontent") {
        return true;
    }
    if request
        .query
        .as_deref()
        .is_some_and(|q| q.contains("alt=sse"))
    {
        return true;
    }
    serde_json::from_slice::<JsonValue>(&request.body)
        .ok()
        .and_then(|value| value["stream"].as_bool())
        .unwrap_or(false)
}

fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use crate::client::{UpstreamBody, UpstreamFailure, UpstreamRequest, UpstreamResponse};
    use crate::stats::NullStatsSink;

    enum Scripted {
        Status(u16, &'static str),
        Fail(UpstreamFailure),
    }

    struct ScriptedClient {
        script: Mutex<VecDeque<Scripted>>,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                urls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.urls.lock().unwrap().len()
        }
    }

    impl UpstreamClient for ScriptedClient {
        fn send<'a>(
            &'a self,
            req: UpstreamRequest,
        ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>>
        {
            self.urls.lock().unwrap().push(req.url.clone());
            let next = self.script.lock().unwrap().pop_front();
            Box::pin(async move {
                match next {
                    Some(Scripted::Status(status, body)) => Ok(UpstreamResponse {
                        status,
                        headers: vec![(
                            "Content-Type".to_string(),
                            "application/json".to_string(),
                        )],
                        body: UpstreamBody::Bytes(Bytes::from_static(body.as_bytes())),
                    }),
                    Some(Scripted::Fail(failure)) => Err(failure),
                    None => Ok(UpstreamResponse {
                        status: 200,
                        headers: Vec::new(),
                        body: UpstreamBody::Bytes(Bytes::from_static(b"{}")),
                    }),
                }
            })
        }
    }

    fn endpoint(id: i64, name: &str, priority: i32) -> Endpoint {
        Endpoint {
            id,
            name: name.to_string(),
            api_url: "https://u.test".to_string(),
            api_key: "k1".to_string(),
            interface_type: InterfaceType::Claude,
            transformer: None,
            model: None,
            models: Vec::new(),
            proxy_url: None,
            headers: Vec::new(),
            priority,
            enabled: true,
            active: false,
            vendor_id: 7,
        }
    }

    fn engine_with(script: Vec<Scripted>, endpoints: Vec<Endpoint>) -> (ProxyEngine, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(script));
        let router = Arc::new(EndpointRouter::new());
        router.load_endpoints(endpoints);
        let engine = ProxyEngine::new(
            router,
            client.clone(),
            Arc::new(NullStatsSink),
            EventHub::new(),
            EngineConfig::default(),
        );
        (engine, client)
    }

    fn claude_request(body: serde_json::Value) -> ClientRequest {
        ClientRequest {
            id: "req-1".to_string(),
            method: http::Method::POST,
            path: "/v1/messages".to_string(),
            query: None,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Bytes::from(serde_json::to_vec(&body).unwrap()),
        }
    }

    #[tokio::test]
    async fn single_successful_forward() {
        let (engine, client) = engine_with(
            vec![Scripted::Status(
                200,
                r#"{"content":[{"type":"text","text":"ok"}],"usage":{"input_tokens":3,"output_tokens":1}}"#,
            )],
            vec![endpoint(1, "a", 1)],
        );

        let response = engine
            .execute(claude_request(
                serde_json::json!({"model": "claude-3", "stream": false, "messages": []}),
            ))
            .await;

        match response {
            EngineResponse::Buffered { status, body, .. } => {
                assert_eq!(status, 200);
                assert!(String::from_utf8_lossy(&body).contains("\"ok\""));
            }
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client.calls(), 1);

        let logs = engine.log.snapshot();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, STATUS_SUCCESS);
        assert_eq!(logs[0].endpoint_name, "a");
        assert_eq!(logs[0].upstream_status, 200);

        let stats = engine.stats.snapshot();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].input, 3);
        assert_eq!(stats[0].output, 1);
        assert_eq!(stats[0].total, 4);
    }

    #[tokio::test]
    async fn five_hundred_trips_breaker_and_rotates() {
        let (engine, client) = engine_with(
            vec![
                Scripted::Status(500, r#"{"error":"boom"}"#),
                Scripted::Status(500, r#"{"error":"boom"}"#),
                Scripted::Status(200, r#"{"content":[]}"#),
            ],
            vec![endpoint(1, "a", 1), endpoint(2, "b", 2)],
        );
        let mut events = engine.events.subscribe();

        let response = engine.execute(claude_request(serde_json::json!({"messages": []}))).await;
        match response {
            EngineResponse::Buffered { status, .. } => assert_eq!(status, 200),
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client.calls(), 3);

        // B became the active endpoint; A is temp-disabled.
        let active = engine.router.get_active(InterfaceType::Claude).unwrap();
        assert_eq!(active.name, "b");
        let enabled = engine.router.get_enabled_by_type(InterfaceType::Claude);
        assert!(enabled.iter().all(|e| e.name != "a"));

        let mut saw_disable = false;
        let mut saw_switch = false;
        while let Ok(event) = events.try_recv() {
            match event {
                Event::EndpointTempDisabled(payload) => {
                    assert_eq!(payload.endpoint, "a");
                    assert!(payload.until_ms > 0);
                    saw_disable = true;
                }
                Event::FallbackSwitch(payload) => {
                    assert_eq!(payload.from, "a");
                    assert_eq!(payload.to.as_deref(), Some("b"));
                    saw_switch = true;
                }
                _ => {}
            }
        }
        assert!(saw_disable);
        assert!(saw_switch);
    }

    #[tokio::test]
    async fn four_oh_four_passes_through_without_rotation() {
        let (engine, client) = engine_with(
            vec![Scripted::Status(404, r#"{"error":"nope"}"#)],
            vec![endpoint(1, "a", 1), endpoint(2, "b", 2)],
        );

        let response = engine.execute(claude_request(serde_json::json!({"messages": []}))).await;
        match response {
            EngineResponse::Buffered { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(&body[..], br#"{"error":"nope"}"#);
            }
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client.calls(), 1);

        // A stays active; its breaker counter was not bumped, so one more
        // 500 later still would not trip it.
        let active = engine.router.get_active(InterfaceType::Claude).unwrap();
        assert_eq!(active.name, "a");
    }

    #[tokio::test]
    async fn exhaustion_returns_503_with_last_error() {
        let (engine, client) = engine_with(
            vec![
                Scripted::Status(500, "e1"),
                Scripted::Status(500, "e2"),
                Scripted::Status(502, "e3"),
                Scripted::Status(502, "e4"),
            ],
            vec![endpoint(1, "a", 1), endpoint(2, "b", 2)],
        );

        let response = engine.execute(claude_request(serde_json::json!({"messages": []}))).await;
        match response {
            EngineResponse::Buffered { status, body, .. } => {
                assert_eq!(status, 503);
                let text = String::from_utf8_lossy(&body).to_string();
                assert!(text.contains("All endpoints failed"));
                assert!(text.contains("502"));
            }
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn attempts_capped_per_endpoint_and_total() {
        // A single endpoint failing forever: 2 attempts, then exhaustion.
        let script = (0..20)
            .map(|_| Scripted::Fail(UpstreamFailure::other("connection refused")))
            .collect();
        let (engine, client) = engine_with(script, vec![endpoint(1, "a", 1)]);

        let response = engine.execute(claude_request(serde_json::json!({"messages": []}))).await;
        match response {
            EngineResponse::Buffered { status, .. } => assert_eq!(status, 503),
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn no_endpoint_gives_routing_error() {
        let (engine, client) = engine_with(vec![], vec![]);
        let response = engine.execute(claude_request(serde_json::json!({}))).await;
        match response {
            EngineResponse::Buffered { status, body, .. } => {
                assert_eq!(status, 503);
                assert!(String::from_utf8_lossy(&body).contains("no enabled endpoint"));
            }
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn fallback_off_makes_single_attempt_without_breaker() {
        let client = Arc::new(ScriptedClient::new(vec![
            Scripted::Status(500, "boom"),
        ]));
        let router = Arc::new(EndpointRouter::new());
        router.load_endpoints(vec![endpoint(1, "a", 1), endpoint(2, "b", 2)]);
        let engine = ProxyEngine::new(
            router,
            client.clone(),
            Arc::new(NullStatsSink),
            EventHub::new(),
            EngineConfig {
                fallback: false,
                ..EngineConfig::default()
            },
        );

        let response = engine.execute(claude_request(serde_json::json!({"messages": []}))).await;
        match response {
            EngineResponse::Buffered { status, .. } => assert_eq!(status, 500),
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client.calls(), 1);
        // Endpoint stays enabled and active.
        let enabled = engine.router.get_enabled_by_type(InterfaceType::Claude);
        assert_eq!(enabled.len(), 2);
    }

    #[tokio::test]
    async fn non_retryable_path_never_rotates() {
        let (engine, client) = engine_with(
            vec![Scripted::Status(500, "boom")],
            vec![endpoint(1, "a", 1), endpoint(2, "b", 2)],
        );
        let request = ClientRequest {
            path: "/v1/models".to_string(),
            ..claude_request(serde_json::json!({}))
        };
        let response = engine.execute(request).await;
        match response {
            EngineResponse::Buffered { status, .. } => assert_eq!(status, 500),
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn retry429_flag_controls_rotation() {
        let (engine, client) = engine_with(
            vec![Scripted::Status(429, "slow down")],
            vec![endpoint(1, "a", 1), endpoint(2, "b", 2)],
        );
        let response = engine.execute(claude_request(serde_json::json!({"messages": []}))).await;
        match response {
            EngineResponse::Buffered { status, .. } => assert_eq!(status, 429),
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client.calls(), 1);

        let client2 = Arc::new(ScriptedClient::new(vec![
            Scripted::Status(429, "slow down"),
            Scripted::Status(429, "slow down"),
            Scripted::Status(200, "{}"),
        ]));
        let router = Arc::new(EndpointRouter::new());
        router.load_endpoints(vec![endpoint(1, "a", 1), endpoint(2, "b", 2)]);
        let engine = ProxyEngine::new(
            router,
            client2.clone(),
            Arc::new(NullStatsSink),
            EventHub::new(),
            EngineConfig {
                retry429: true,
                ..EngineConfig::default()
            },
        );
        let response = engine.execute(claude_request(serde_json::json!({"messages": []}))).await;
        match response {
            EngineResponse::Buffered { status, .. } => assert_eq!(status, 200),
            _ => panic!("expected buffered response"),
        }
        assert_eq!(client2.calls(), 3);
    }

    #[test]
    fn retryable_path_classification() {
        assert!(is_retryable_path("/v1/messages"));
        assert!(is_retryable_path("/v1/chat/completions"));
        assert!(is_retryable_path("/openai/v1/chat/completions"));
        assert!(is_retryable_path("/v1/responses"));
        assert!(is_retryable_path("/v1beta/models/m:generateContent"));
        assert!(is_retryable_path("/v1beta/models/m:streamGenerateContent"));
        assert!(!is_retryable_path("/v1/models"));
        assert!(!is_retryable_path("/v1/messages/count_tokens"));
    }
}
