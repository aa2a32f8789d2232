use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use wreq::{Client, Method, Proxy};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Dns,
    Tls,
    Canceled,
    Other,
}

#[derive(Debug, Clone)]
pub struct UpstreamFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl UpstreamFailure {
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Other,
            message: message.into(),
        }
    }

    /// Cancellations do not count toward the circuit breaker.
    pub fn is_ignorable(&self) -> bool {
        self.kind == TransportErrorKind::Canceled
    }
}

impl std::fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub is_stream: bool,
    pub proxy: Option<String>,
}

pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(tokio::sync::mpsc::Receiver<Bytes>),
}

pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: UpstreamBody,
}

/// Transport boundary between the executor and the network.
///
/// Dyn-dispatched so the retry engine can be exercised against scripted
/// responses in tests.
pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>>;
}

/// wreq-backed client with one `Client` per distinct outbound proxy.
///
/// Gzip decoding is handled by the client itself; callers see decoded bodies
/// and must drop `Content-Encoding`/`Content-Length` when re-serving them.
pub struct WreqUpstreamClient {
    timeout: Duration,
    clients: Arc<Mutex<HashMap<Option<String>, Client>>>,
}

impl WreqUpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, wreq::Error> {
        let shared = build_client(timeout, None)?;
        let mut clients = HashMap::new();
        clients.insert(None, shared);
        Ok(Self {
            timeout,
            clients: Arc::new(Mutex::new(clients)),
        })
    }

    fn client_for_proxy(&self, proxy: Option<String>) -> Result<Client, UpstreamFailure> {
        let proxy = proxy
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        let mut guard = self
            .clients
            .lock()
            .map_err(|_| UpstreamFailure::other("client cache lock poisoned"))?;
        if let Some(client) = guard.get(&proxy) {
            return Ok(client.clone());
        }
        let client = build_client(self.timeout, proxy.as_deref()).map_err(map_wreq_error)?;
        guard.insert(proxy, client.clone());
        Ok(client)
    }
}

fn build_client(timeout: Duration, proxy: Option<&str>) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10));
    if let Some(proxy) = proxy {
        // Scheme-dispatched by wreq: http/https/socks5 URLs are all accepted.
        builder = builder.proxy(Proxy::all(proxy)?);
    }
    builder.build()
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client_for_proxy(req.proxy.clone())?;
            let mut builder = client.request(req.method.clone(), &req.url);
            for (name, value) in &req.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = req.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(map_wreq_error)?;
            convert_response(response, req.is_stream).await
        })
    }
}

async fn convert_response(
    response: wreq::Response,
    want_stream: bool,
) -> Result<UpstreamResponse, UpstreamFailure> {
    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());

    let streamable = want_stream && status == 200;
    if !streamable {
        let body = response.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            let Ok(chunk) = item else {
                break;
            };
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });

    Ok(UpstreamResponse {
        status,
        headers,
        body: UpstreamBody::Stream(rx),
    })
}

fn collect_headers(map: &wreq::header::HeaderMap) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (name, value) in map {
        if let Ok(value) = value.to_str() {
            out.push((name.as_str().to_string(), value.to_string()));
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        if lower.contains("dns") || lower.contains("resolve") {
            TransportErrorKind::Dns
        } else if lower.contains("tls") || lower.contains("ssl") {
            TransportErrorKind::Tls
        } else {
            TransportErrorKind::Connect
        }
    } else if lower.contains("tls") || lower.contains("ssl") {
        TransportErrorKind::Tls
    } else if lower.contains("canceled") || lower.contains("cancelled") {
        TransportErrorKind::Canceled
    } else {
        TransportErrorKind::Other
    };
    UpstreamFailure { kind, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_ignorable() {
        let failure = UpstreamFailure {
            kind: TransportErrorKind::Canceled,
            message: "client went away".to_string(),
        };
        assert!(failure.is_ignorable());
        assert!(!UpstreamFailure::other("boom").is_ignorable());
    }
}
