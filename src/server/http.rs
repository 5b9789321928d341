//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. `POST /` takes JSON-RPC
//! calls, `GET /health` reports liveness.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::health::build_health_response;
use super::rpc::handle_rpc;
use crate::api::QueryApi;
use crate::types::PrismError;

/// Shared application state
pub struct AppState {
    pub api: QueryApi,
    pub listen: SocketAddr,
    pub started: Instant,
}

impl AppState {
    pub fn new(api: QueryApi, listen: SocketAddr) -> Self {
        Self {
            api,
            listen,
            started: Instant::now(),
        }
    }
}

/// Accept connections until shutdown
pub async fn run(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) -> Result<(), PrismError> {
    let listener = TcpListener::bind(state.listen).await?;
    info!("Prism query API listening on {}", state.listen);

    loop {
        let accepted = tokio::select! {
            _ = shutdown.recv() => {
                info!("Query API shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            json_response(StatusCode::OK, &build_health_response(&state))
        }
        (Method::OPTIONS, _) => preflight_response(),
        (Method::POST, "/") => {
            let body = match req.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!("RPC request body error: {}", e);
                    return Ok(json_response(
                        StatusCode::BAD_REQUEST,
                        &serde_json::json!({"error": "Failed to read request body"}),
                    ));
                }
            };
            let (status, reply) = handle_rpc(&state.api, &body).await;
            json_response(status, &reply)
        }
        (_, path) => json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({"error": "Not Found", "path": path}),
        ),
    };
    Ok(response)
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json_body = serde_json::to_vec(body)
        .unwrap_or_else(|_| br#"{"error":"Serialization failed"}"#.to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json_body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response_headers() {
        let response = json_response(StatusCode::GONE, &serde_json::json!({"a": 1}));
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }
}
