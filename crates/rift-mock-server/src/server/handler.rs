//! Request handling: hyper request → [`RecordedRequest`] → dispatcher →
//! hyper response.

use super::upgrade::{accept_key, is_websocket_upgrade, serve_websocket};
use crate::dispatch::Dispatcher;
use crate::metrics;
use crate::request::RecordedRequest;
use crate::response::{split_chunks, MockResponse, ResponseBody};
use bytes::Bytes;
use futures::stream;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{HeaderName, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, UPGRADE};
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

pub type HttpBody = BoxBody<Bytes, Infallible>;

/// State shared by every connection of one server.
pub struct ServerContext {
    pub dispatcher: Arc<dyn Dispatcher>,
    pub request_count: AtomicU64,
    pub max_chunk_size: usize,
}

impl ServerContext {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, max_chunk_size: usize) -> Self {
        Self {
            dispatcher,
            request_count: AtomicU64::new(0),
            max_chunk_size,
        }
    }
}

pub async fn handle_request(
    mut req: Request<Incoming>,
    ctx: Arc<ServerContext>,
) -> Result<Response<HttpBody>, Infallible> {
    ctx.request_count.fetch_add(1, Ordering::Relaxed);

    let upgrade = is_websocket_upgrade(req.headers()).then(|| hyper::upgrade::on(&mut req));
    let accept = accept_key(req.headers());

    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("Failed to read body of {} {}: {}", method, path, e);
            Bytes::new()
        }
    };

    let recorded = RecordedRequest {
        method,
        path,
        headers,
        body,
    };

    let dispatcher = ctx.dispatcher.name();
    let started = Instant::now();
    let result = ctx.dispatcher.dispatch(&recorded);
    metrics::record_dispatch_duration(dispatcher, started.elapsed().as_secs_f64() * 1000.0);

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            error!("Dispatch failed for {} {}: {}", recorded.method, recorded.path, e);
            metrics::record_request(dispatcher, 500);
            return Ok(build_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Full::new(Bytes::from(e.to_string())).boxed(),
            ));
        }
    };
    debug!(
        "{} {} -> {}",
        recorded.method, recorded.path, response.status
    );
    metrics::record_request(dispatcher, response.status);

    Ok(into_http_response(response, upgrade, accept, ctx.max_chunk_size).await)
}

async fn into_http_response(
    response: MockResponse,
    upgrade: Option<OnUpgrade>,
    accept: Option<String>,
    max_chunk_size: usize,
) -> Response<HttpBody> {
    if let Some(delay) = response.body_delay {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
        warn!("Invalid status code {}, answering 500", response.status);
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let (body, upgrade_headers) = match response.body {
        ResponseBody::Empty => (Empty::<Bytes>::new().boxed(), None),
        ResponseBody::Full(bytes) => (Full::new(bytes).boxed(), None),
        ResponseBody::Chunked(bytes) => {
            let frames = split_chunks(&bytes, max_chunk_size)
                .into_iter()
                .map(|chunk| Ok::<_, Infallible>(Frame::data(chunk)));
            (StreamBody::new(stream::iter(frames)).boxed(), None)
        }
        ResponseBody::WebSocket(session) => match (upgrade, accept) {
            (Some(on_upgrade), Some(accept)) => {
                tokio::spawn(serve_websocket(on_upgrade, session));
                (Empty::<Bytes>::new().boxed(), Some(accept))
            }
            _ => {
                warn!("Expectation upgrades to WebSocket but the request is not an upgrade");
                session.on_close(1002, "not an upgrade request");
                return build_response(
                    StatusCode::BAD_REQUEST,
                    Full::new(Bytes::from("Expected a WebSocket upgrade request")).boxed(),
                );
            }
        },
    };

    let mut http = build_response(status, body);
    if let Some(accept) = upgrade_headers {
        let headers = http.headers_mut();
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        if let Ok(value) = HeaderValue::from_str(&accept) {
            headers.insert(SEC_WEBSOCKET_ACCEPT, value);
        }
    }
    for (name, value) in response.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                http.headers_mut().append(name, value);
            }
            _ => warn!("Skipping invalid response header {}: {}", name, value),
        }
    }
    http
}

/// Build a response with `status` and `body`.
pub fn build_response(status: StatusCode, body: HttpBody) -> Response<HttpBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}
