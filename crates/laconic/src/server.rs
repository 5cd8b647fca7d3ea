//! Development server.
//!
//! Mounts a [`LaconicService`] as the fallback of an axum router, with the
//! middleware stack (outermost first):
//!
//! 1. Sentry (hub per request, HTTP transaction)
//! 2. `CatchPanicLayer` (a panicking endpoint answers a JSON 500)
//! 3. `TraceLayer` (request span with the resolved endpoint, status and
//!    latency)
//! 4. Request ID (`x-request-id` on both request and response)

use std::any::Any;
use std::io;
use std::net::SocketAddr;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use laconic_core::ApiError;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::app::{Laconic, LaconicService};
use crate::context::GENERIC_ERROR;
use crate::request::{REQUEST_ID_HEADER, ensure_request_id};
use crate::response::error_reply;

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] io::Error),
}

/// Middleware that tags the request span and Sentry scope with the request ID.
///
/// The ID (kept from upstream or generated) is written back into the request
/// headers, so the lifecycle sees the same one, and echoed in the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = ensure_request_id(request.headers_mut());

    Span::current().record("request_id", &request_id);
    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Turn a caught panic into the generic JSON 500.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %message, "Endpoint panicked");

    error_reply(&ApiError::internal(GENERIC_ERROR), false).into_response()
}

/// Wrap the service in the server middleware stack.
pub fn router(service: LaconicService) -> axum::Router {
    axum::Router::new()
        .fallback_service(service)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "laconic_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        endpoint = tracing::field::Empty,
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .layer(CatchPanicLayer::custom(panic_response))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Serve `service` on `listener` until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Returns an I/O error if the server fails.
pub async fn serve(service: LaconicService, listener: TcpListener) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("{} listening on http://{}", service.name(), addr);
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

impl Laconic {
    /// Serve the application on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the server fails.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        serve(self.into_service(), listener).await
    }

    /// Bind to the configured host and port and serve the application.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding or serving fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config().socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener).await?;
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
