use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use uuid::Uuid;

use relayhub_common::InterfaceType;
use relayhub_core::{ClientRequest, EngineResponse};

use crate::ServerState;

pub async fn health(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "port": state.port}))
}

pub async fn stats(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "recent_logs": state.engine.log.snapshot(),
        "token_stats": state.engine.stats.snapshot(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct TransformersQuery {
    from: Option<String>,
}

pub async fn transformers(Query(query): Query<TransformersQuery>) -> Response {
    let from = match query.from.as_deref() {
        Some(value) => match InterfaceType::parse(value) {
            Some(interface) => Some(interface),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("unknown interface type: {value}")})),
                )
                    .into_response();
            }
        },
        None => None,
    };
    Json(json!({"transformers": relayhub_transform::available(from)})).into_response()
}

pub async fn proxy(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = state.auth_secret.as_deref()
        && !authorized(&headers, secret)
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid or missing api key"})),
        )
            .into_response();
    }

    let request_id = Uuid::new_v4().to_string();
    let path = uri.path().to_string();
    info!(
        event = "request_received",
        request_id = %request_id,
        method = %method,
        path = %path
    );

    let request = ClientRequest {
        id: request_id,
        method: method.clone(),
        path,
        query: uri.query().map(str::to_string),
        headers: collect_headers(&headers),
        body,
    };

    match state.engine.execute(request).await {
        EngineResponse::Buffered {
            status,
            headers,
            body,
        } => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() =
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            apply_headers(response.headers_mut(), &headers);
            response
        }
        EngineResponse::Stream {
            status,
            headers,
            content_type,
            body,
        } => {
            let stream = ReceiverStream::new(body).map(Ok::<Bytes, Infallible>);
            let mut response = Response::new(Body::from_stream(stream));
            *response.status_mut() =
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            apply_headers(response.headers_mut(), &headers);
            if !response.headers().contains_key(header::CONTENT_TYPE)
                && let Ok(value) = HeaderValue::from_str(&content_type)
            {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
    }
}

fn authorized(headers: &HeaderMap, secret: &str) -> bool {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if bearer == Some(secret) {
        return true;
    }
    headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        == Some(secret)
}

fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn apply_headers(target: &mut HeaderMap, headers: &[(String, String)]) {
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            target.append(name, value);
        }
    }
}
