use std::sync::Arc;

use bytes::Bytes;
use relayhub_common::{Endpoint, InterfaceType};
use relayhub_protocol::{LineBuffer, data_payload};
use relayhub_transform::{TokenUsage, TransformError, Transformer, extract_usage};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing::debug;

use crate::client::{UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamRequest};
use crate::url::join_target_url;

/// Cap on captured request/response previews for the log-detail view.
pub const MAX_CAPTURE_BYTES: usize = 50 * 1024;

/// Inbound request, already read to completion.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: http::Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub is_streaming: bool,
}

#[derive(Debug)]
pub enum ForwardError {
    Transport(UpstreamFailure),
    Transformer(TransformError),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Transport(failure) => write!(f, "{failure}"),
            ForwardError::Transformer(err) => write!(f, "{err}"),
        }
    }
}

/// What happened when the stream finished; handed to the finalizer the
/// engine installed before the attempt.
pub struct StreamSummary {
    pub target_url: String,
    pub status: u16,
    pub usage: TokenUsage,
    pub preview: String,
}

pub type StreamFinalizer = Box<dyn FnOnce(StreamSummary) + Send>;

/// Outcome of one forward attempt.
///
/// `status == 0` with `error` set means the attempt failed locally; a
/// non-200 status with `error == None` is an upstream response preserved for
/// passthrough. Once `streamed` is true the response bytes are already on
/// their way to the client and the attempt is final.
pub struct ForwardResult {
    pub target_url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stream: Option<mpsc::Receiver<Bytes>>,
    pub content_type: Option<String>,
    pub usage: TokenUsage,
    pub streamed: bool,
    pub error: Option<ForwardError>,
}

impl ForwardResult {
    fn local_error(target_url: String, error: ForwardError) -> Self {
        Self {
            target_url,
            status: 0,
            headers: Vec::new(),
            body: Bytes::new(),
            stream: None,
            content_type: None,
            usage: TokenUsage::default(),
            streamed: false,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status == 200
    }
}

/// Per-attempt forwarder: URL join, translation, model mapping, header
/// hygiene, auth injection, and response handling for one endpoint.
pub struct Executor {
    client: Arc<dyn UpstreamClient>,
}

impl Executor {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self { client }
    }

    pub async fn forward(
        &self,
        request: &ForwardRequest,
        endpoint: &Endpoint,
        finalizer: StreamFinalizer,
    ) -> ForwardResult {
        // Model mapping happens on the raw body so unknown keys and numeric
        // formatting survive untouched.
        let (body, upstream_model) = map_model(&request.body, endpoint);

        let mut transformer = endpoint
            .transformer
            .as_deref()
            .and_then(|spec| relayhub_transform::resolve(endpoint.interface_type, spec));

        let (body, target_path, auth_interface) = match transformer.as_mut() {
            Some(translator) => {
                let translated =
                    translator.transform_request(&upstream_model, &body, request.is_streaming);
                match translated {
                    Ok(translated) => (
                        Bytes::from(translated),
                        translator.target_path(request.is_streaming, &upstream_model),
                        translator.target_interface_type(),
                    ),
                    Err(err) => {
                        return ForwardResult::local_error(
                            join_target_url(&endpoint.api_url, &request.path),
                            ForwardError::Transformer(err),
                        );
                    }
                }
            }
            None => (body, request.path.clone(), endpoint.interface_type),
        };

        let mut target_url = join_target_url(&endpoint.api_url, &target_path);
        let query = build_query(request, endpoint, auth_interface);
        if !query.is_empty() {
            target_url.push('?');
            target_url.push_str(&query);
        }

        let headers = build_headers(request, endpoint, auth_interface);

        debug!(
            event = "upstream_dial",
            endpoint = %endpoint.name,
            url = %target_url,
            streaming = request.is_streaming
        );

        let upstream = self
            .client
            .send(UpstreamRequest {
                method: to_wreq_method(&request.method),
                url: target_url.clone(),
                headers,
                body: (!body.is_empty()).then(|| body.clone()),
                is_stream: request.is_streaming,
                proxy: endpoint.proxy_url.clone(),
            })
            .await;

        let response = match upstream {
            Ok(response) => response,
            Err(failure) => {
                return ForwardResult::local_error(target_url, ForwardError::Transport(failure));
            }
        };

        let status = response.status;
        let headers = scrub_response_headers(response.headers);
        match response.body {
            UpstreamBody::Bytes(raw) => {
                buffered_result(target_url, status, headers, raw, transformer.as_mut())
            }
            UpstreamBody::Stream(rx) => stream_result(
                target_url,
                status,
                headers,
                rx,
                transformer,
                finalizer,
            ),
        }
    }
}

/// Replace a `model` alias with its upstream name, or inject the endpoint
/// default when the body has none. Every other byte of the body is left
/// as-is unless a substitution actually happens.
fn map_model(body: &Bytes, endpoint: &Endpoint) -> (Bytes, String) {
    let fallback = endpoint.model.clone().unwrap_or_default();
    if body.is_empty() {
        return (body.clone(), fallback);
    }
    let Ok(mut value) = serde_json::from_slice::<JsonValue>(body) else {
        return (body.clone(), fallback);
    };
    if !value.is_object() {
        return (body.clone(), fallback);
    }

    let requested = value["model"].as_str().map(str::to_string);
    match requested {
        Some(requested) => {
            let mapped = endpoint.map_model(&requested).to_string();
            if mapped == requested {
                return (body.clone(), requested);
            }
            value["model"] = JsonValue::String(mapped.clone());
            match serde_json::to_vec(&value) {
                Ok(rewritten) => (Bytes::from(rewritten), mapped),
                Err(_) => (body.clone(), mapped),
            }
        }
        None if !fallback.is_empty() => {
            value["model"] = JsonValue::String(fallback.clone());
            match serde_json::to_vec(&value) {
                Ok(rewritten) => (Bytes::from(rewritten), fallback),
                Err(_) => (body.clone(), fallback),
            }
        }
        None => (body.clone(), fallback),
    }
}

fn build_query(
    request: &ForwardRequest,
    endpoint: &Endpoint,
    auth_interface: InterfaceType,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
        parts.push(query.to_string());
    }
    if auth_interface == InterfaceType::Gemini {
        parts.push(format!("key={}", endpoint.api_key));
        if request.is_streaming {
            parts.push("alt=sse".to_string());
        }
    }
    parts.join("&")
}

const DROPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "accept-encoding",
    "content-length",
    "authorization",
    "x-api-key",
    "connection",
    "keep-alive",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn build_headers(
    request: &ForwardRequest,
    endpoint: &Endpoint,
    auth_interface: InterfaceType,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            !DROPPED_REQUEST_HEADERS.contains(&lower.as_str())
        })
        .cloned()
        .collect();

    match auth_interface {
        InterfaceType::Gemini => {}
        InterfaceType::Codex | InterfaceType::Chat => {
            headers.push((
                "Authorization".to_string(),
                format!("Bearer {}", endpoint.api_key),
            ));
        }
        InterfaceType::Claude => {
            headers.push((
                "Authorization".to_string(),
                format!("Bearer {}", endpoint.api_key),
            ));
            headers.push(("x-api-key".to_string(), endpoint.api_key.clone()));
        }
    }

    for (name, value) in &endpoint.headers {
        headers.push((name.clone(), value.clone()));
    }
    headers
}

/// The body seen by callers is already decoded and possibly rewritten, so
/// the upstream's framing headers no longer apply.
fn scrub_response_headers(headers: Vec<(String, String)>) -> Vec<(String, String)> {
    headers
        .into_iter()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            lower != "content-length" && lower != "content-encoding" && lower != "transfer-encoding"
        })
        .collect()
}

fn buffered_result(
    target_url: String,
    status: u16,
    headers: Vec<(String, String)>,
    raw: Bytes,
    transformer: Option<&mut Box<dyn Transformer>>,
) -> ForwardResult {
    let usage = serde_json::from_slice::<JsonValue>(&raw)
        .ok()
        .and_then(|value| extract_usage(&value))
        .unwrap_or_default();

    let body = match transformer {
        Some(translator) if status == 200 => match translator.transform_response(&raw) {
            Ok(translated) => Bytes::from(translated),
            Err(err) => {
                return ForwardResult::local_error(target_url, ForwardError::Transformer(err));
            }
        },
        _ => raw,
    };

    ForwardResult {
        target_url,
        status,
        headers,
        body,
        stream: None,
        content_type: None,
        usage,
        streamed: false,
        error: None,
    }
}

fn stream_result(
    target_url: String,
    status: u16,
    headers: Vec<(String, String)>,
    upstream_rx: mpsc::Receiver<Bytes>,
    transformer: Option<Box<dyn Transformer>>,
    finalizer: StreamFinalizer,
) -> ForwardResult {
    let content_type = transformer
        .as_ref()
        .map(|t| t.output_content_type(true).to_string())
        .or_else(|| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                .map(|(_, value)| value.clone())
        })
        .unwrap_or_else(|| "text/event-stream".to_string());

    let (tx, rx) = mpsc::channel::<Bytes>(16);
    tokio::spawn(pump_stream(
        upstream_rx,
        tx,
        transformer,
        finalizer,
        target_url.clone(),
        status,
    ));

    ForwardResult {
        target_url,
        status,
        headers,
        body: Bytes::new(),
        stream: Some(rx),
        content_type: Some(content_type),
        usage: TokenUsage::default(),
        streamed: true,
        error: None,
    }
}

/// Line-oriented pass-through: capture, usage extraction, and translation
/// happen per line; the client is flushed after every write. A dropped
/// client ends the pump without touching the breaker.
async fn pump_stream(
    mut upstream_rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Bytes>,
    mut transformer: Option<Box<dyn Transformer>>,
    finalizer: StreamFinalizer,
    target_url: String,
    status: u16,
) {
    let mut buffer = LineBuffer::new();
    let mut usage = TokenUsage::default();
    let mut preview = String::new();

    'outer: {
        while let Some(chunk) = upstream_rx.recv().await {
            for line in buffer.push_bytes(&chunk) {
                if !forward_line(&line, &tx, &mut transformer, &mut usage, &mut preview).await {
                    break 'outer;
                }
            }
        }
        if let Some(line) = buffer.finish() {
            let _ = forward_line(&line, &tx, &mut transformer, &mut usage, &mut preview).await;
        }
    }

    finalizer(StreamSummary {
        target_url,
        status,
        usage,
        preview,
    });
}

async fn forward_line(
    line: &str,
    tx: &mpsc::Sender<Bytes>,
    transformer: &mut Option<Box<dyn Transformer>>,
    usage: &mut TokenUsage,
    preview: &mut String,
) -> bool {
    capture_line(preview, line);

    let payload = data_payload(line).unwrap_or(line).trim();
    if payload.starts_with('{')
        && let Ok(value) = serde_json::from_str::<JsonValue>(payload)
        && let Some(found) = extract_usage(&value)
    {
        usage.merge_max(&found);
    }

    match transformer {
        Some(translator) => {
            let events = match translator.transform_stream_line(line) {
                Ok(events) => events,
                // Mid-stream translation failures cannot be reported to the
                // client anymore; drop the line.
                Err(_) => return true,
            };
            for event in events {
                if tx.send(Bytes::from(event)).await.is_err() {
                    return false;
                }
            }
            true
        }
        None => {
            let mut raw = String::with_capacity(line.len() + 1);
            raw.push_str(line);
            raw.push('\n');
            tx.send(Bytes::from(raw)).await.is_ok()
        }
    }
}

fn capture_line(preview: &mut String, line: &str) {
    if preview.len() >= MAX_CAPTURE_BYTES {
        return;
    }
    let remaining = MAX_CAPTURE_BYTES - preview.len();
    if line.len() <= remaining {
        preview.push_str(line);
        preview.push('\n');
    } else {
        let mut cut = remaining;
        while cut > 0 && !line.is_char_boundary(cut) {
            cut -= 1;
        }
        preview.push_str(&line[..cut]);
    }
}

pub fn capture_body(body: &Bytes) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_CAPTURE_BYTES {
        return text.into_owned();
    }
    let mut cut = MAX_CAPTURE_BYTES;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}

fn to_wreq_method(method: &http::Method) -> wreq::Method {
    wreq::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(wreq::Method::POST)
}
