//! Hyper-based HTTP Server
//!
//! Direct Hyper implementation of the OpenAI-compatible embeddings API

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use hyper::{Body, Request, Response, Server, Method, StatusCode};
use hyper::service::{make_service_fn, service_fn};
use hyper::body::to_bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use tokio::net::TcpSocket;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::models::{create_embeddings, EmbeddingError, LifecyclePhase, ModelLifecycle};
use crate::protocol::http::{
    EmbeddingRequest, HealthResponse, HttpErrorResponse, RootResponse,
};
use crate::server::config::ServerConfig;

/// Shared state for Hyper server
#[derive(Clone)]
pub(crate) struct ServerState {
    lifecycle: Arc<ModelLifecycle>,
    config: Arc<ServerConfig>,
}

impl ServerState {
    pub(crate) fn new(config: Arc<ServerConfig>, lifecycle: Arc<ModelLifecycle>) -> Self {
        Self { lifecycle, config }
    }
}

/// Start the Hyper HTTP server; returns once `shutdown` resolves and
/// in-flight requests have drained
pub async fn start_hyper_http_server(
    config: Arc<ServerConfig>,
    lifecycle: Arc<ModelLifecycle>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bind_address = config.network.bind_address();

    info!("Starting HTTP server");
    info!("Binding to {}", bind_address);

    let keep_alive = config.network.keep_alive;
    let state = ServerState::new(config, lifecycle);

    // Create service factory
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                handle_request(req, state)
            }))
        }
    });

    let addr: std::net::SocketAddr = bind_address.parse()?;

    let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    // Small JSON responses; don't let Nagle hold them back
    socket.set_nodelay(true)?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;

    let server = Server::from_tcp(listener.into_std()?)?
        .http1_keepalive(keep_alive)
        .tcp_nodelay(true)
        .tcp_sleep_on_accept_errors(true)
        .serve(make_svc)
        .with_graceful_shutdown(shutdown);

    info!("HTTP server listening on {}", bind_address);
    info!("Endpoints:");
    info!("   POST /v1/embeddings - Create embeddings (OpenAI compatible)");
    info!("   POST /embeddings    - Same as /v1/embeddings");
    info!("   GET  /health        - Health check");
    info!("   GET  /              - Server info");

    server.await?;

    Ok(())
}

/// Main request handler
pub(crate) async fn handle_request(
    req: Request<Body>,
    state: ServerState,
) -> Result<Response<Body>, Infallible> {
    let origin = req.headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("*")
        .to_string();

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut response = match (&method, path.as_str()) {
        (&Method::POST, "/v1/embeddings") | (&Method::POST, "/embeddings") => {
            handle_embeddings(req, state).await
        }
        (&Method::GET, "/health") => handle_health(state).await,
        (&Method::GET, "/") => handle_root(state).await,
        (&Method::OPTIONS, _) => handle_options(),
        _ => handle_not_found(),
    };

    let headers = response.headers_mut();
    if let Ok(origin) = origin.parse() {
        headers.insert("access-control-allow-origin", origin);
    }
    headers.insert("access-control-allow-methods", HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert("access-control-allow-headers", HeaderValue::from_static("content-type, authorization"));

    Ok(response)
}

/// OPTIONS handler for CORS preflight
fn handle_options() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// 404 handler
fn handle_not_found() -> Response<Body> {
    json_response(StatusCode::NOT_FOUND, &HttpErrorResponse::new("Not Found"))
}

/// Root endpoint - server info
async fn handle_root(state: ServerState) -> Response<Body> {
    let device = match state.lifecycle.current_state().await {
        Ok(model_state) => Some(model_state.device.to_string()),
        Err(_) => None,
    };
    let status = state.lifecycle.phase().await.as_str().to_string();

    let info = RootResponse {
        status,
        model: state.config.model.served_model_name.clone(),
        device,
    };
    json_response(StatusCode::OK, &info)
}

/// Health check endpoint
async fn handle_health(state: ServerState) -> Response<Body> {
    debug!("Health check requested");

    match state.lifecycle.phase().await {
        LifecyclePhase::Ready => json_response(StatusCode::OK, &HealthResponse::healthy()),
        phase => {
            warn!("Health check while model is {}", phase.as_str());
            let body = match state.lifecycle.failure().await {
                Some(cause) => HttpErrorResponse::model_not_ready().with_details(cause),
                None => HttpErrorResponse::model_not_ready(),
            };
            json_response(StatusCode::SERVICE_UNAVAILABLE, &body)
        }
    }
}

/// Embeddings endpoint, shared by /v1/embeddings and /embeddings
async fn handle_embeddings(req: Request<Body>, state: ServerState) -> Response<Body> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("embeddings", %request_id);

    async move {
        let start_time = std::time::Instant::now();

        let body_bytes = match to_bytes(req.into_body()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &HttpErrorResponse::new("Failed to read request body").with_details(e.to_string()),
                );
            }
        };

        let request: EmbeddingRequest = match serde_json::from_slice(&body_bytes) {
            Ok(req) => req,
            Err(e) => {
                debug!("Rejected request body: {}", e);
                return error_response(&EmbeddingError::InvalidInput { message: e.to_string() });
            }
        };

        let default_model = &state.config.model.served_model_name;
        match create_embeddings(&state.lifecycle, request, default_model).await {
            Ok(response) => {
                info!(
                    "Embedded {} inputs ({} tokens) in {:?}",
                    response.data.len(),
                    response.usage.total_tokens,
                    start_time.elapsed()
                );
                json_response(StatusCode::OK, &response)
            }
            Err(e) => error_response(&e),
        }
    }
    .instrument(span)
    .await
}

/// Map a request-path error to its HTTP status and body
fn error_response(error: &EmbeddingError) -> Response<Body> {
    match error {
        EmbeddingError::ModelNotReady => {
            json_response(StatusCode::SERVICE_UNAVAILABLE, &HttpErrorResponse::model_not_ready())
        }
        EmbeddingError::InvalidInput { message } => {
            json_response(StatusCode::UNPROCESSABLE_ENTITY, &HttpErrorResponse::invalid_request(message.clone()))
        }
        EmbeddingError::InferenceFailed { error } => {
            json_response(StatusCode::INTERNAL_SERVER_ERROR, &HttpErrorResponse::inference_failed(error.clone()))
        }
        other => {
            error!("Unexpected error on request path: {}", other);
            json_response(StatusCode::INTERNAL_SERVER_ERROR, &HttpErrorResponse::internal_error(other.to_string()))
        }
    }
}

/// Serialize `body` as a JSON response
fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(json) => {
            let mut response = Response::new(Body::from(json));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            let mut response = Response::new(Body::from(r#"{"error":"Internal server error"}"#));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}
