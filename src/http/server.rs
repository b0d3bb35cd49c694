//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the identity and echo handlers
//! - Wire up middleware (request ID, tracing, timeout, access control)
//! - Bind server to listener
//! - Drain in-flight requests on shutdown, up to a grace period

use std::collections::BTreeMap;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::identity::{LazyIdentity, SecurityIdentity};
use crate::config::GuardConfig;
use crate::error::ConfigError;
use crate::guard::AccessGuard;
use crate::http::middleware::{access_control_middleware, endpoint_access_middleware};
use crate::lifecycle::shutdown;

/// HTTP server fronted by the access guard.
pub struct HttpServer {
    router: Router,
    config: GuardConfig,
    guard: Arc<AccessGuard>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        let guard = Arc::new(AccessGuard::from_config(&config.auth)?);
        let router = Self::build_router(&config, Arc::clone(&guard));
        Ok(Self { router, config, guard })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &GuardConfig, guard: Arc<AccessGuard>) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route("/", any(echo))
            .route("/{*path}", any(echo))
            .route_layer(middleware::from_fn_with_state(Arc::clone(&guard), endpoint_access_middleware))
            .layer(middleware::from_fn_with_state(guard, access_control_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, e.g. for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn guard(&self) -> &Arc<AccessGuard> {
        &self.guard
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, then drain for up to the
    /// configured grace period.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let drain = shutdown.resubscribe();
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait_for(shutdown))
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result?,
            _ = shutdown::wait_for(drain) => {
                tracing::info!(grace_secs = grace.as_secs(), "Draining in-flight requests");
                match tokio::time::timeout(grace, &mut serve).await {
                    Ok(result) => result?,
                    Err(_) => tracing::warn!("Grace period elapsed, closing remaining connections"),
                }
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Identity of the caller, authenticating if no policy did so already.
async fn whoami(Extension(identity): Extension<LazyIdentity>) -> Response {
    match identity.get().await {
        Ok(identity) => Json(identity_json(&identity)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Identity unavailable");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// Echo the request line and, if known, the principal.
async fn echo(method: Method, uri: Uri, Extension(identity): Extension<LazyIdentity>) -> Json<Value> {
    let principal = identity
        .peek()
        .and_then(|identity| identity.principal().map(str::to_string));
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "principal": principal,
    }))
}

fn identity_json(identity: &SecurityIdentity) -> Value {
    let permissions: Vec<String> = identity.permissions().map(ToString::to_string).collect();
    let attributes: BTreeMap<&str, &str> = identity.attributes().collect();
    json!({
        "principal": identity.principal(),
        "anonymous": identity.is_anonymous(),
        "roles": identity.roles().collect::<Vec<_>>(),
        "permissions": permissions,
        "attributes": attributes,
    })
}
