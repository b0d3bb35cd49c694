//! Access Control Middleware.
//! Enforces the permission configuration on every request.
//!
//! # Data Flow
//! ```text
//! Request
//!     → RequestContext (cancelled when this future is dropped)
//!     → AccessGuard::authorize
//!         Permit           → extensions += LazyIdentity, RequestContext
//!                            (+ Arc<SecurityIdentity> if resolved) → next
//!         Deny, anonymous  → mechanism challenge (401 / 302)
//!         Deny             → 403
//!         auth failure     → mechanism challenge
//!         other failure    → 500
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::auth::identity::LazyIdentity;
use crate::authz::context::RequestContext;
use crate::error::AuthzError;
use crate::guard::{AccessGuard, Decision};
use crate::observability::metrics;

pub async fn access_control_middleware(
    State(guard): State<Arc<AccessGuard>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // 1. Snapshot the request. Dropping this future (client gone, timeout)
    //    cancels in-flight policy work.
    let ctx = RequestContext::from_request(&req);
    let _cancel_on_drop = ctx.cancellation_token().drop_guard();

    // 2. Decide
    let outcome = guard.authorize(&ctx).await;
    let identity = match enforce(&guard, &ctx, outcome).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    // 3. Attach identity and context for handlers and endpoint checks
    if let Some(resolved) = identity.peek() {
        req.extensions_mut().insert(resolved);
    }
    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(ctx.clone());
    next.run(req).await
}

/// Enforces `applies_to = "subset"` permissions on routed endpoints. Must run
/// inside [`access_control_middleware`].
pub async fn endpoint_access_middleware(
    State(guard): State<Arc<AccessGuard>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::from_request(&req));
    let identity = req
        .extensions()
        .get::<LazyIdentity>()
        .cloned()
        .unwrap_or_else(|| guard.authenticator().lazy_identity(&ctx));

    let outcome = guard.check_endpoint(&ctx, identity).await;
    let identity = match enforce(&guard, &ctx, outcome).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    if let Some(resolved) = identity.peek() {
        req.extensions_mut().insert(resolved);
    }
    req.extensions_mut().insert(identity);
    next.run(req).await
}

/// Map a decision onto the identity to continue with, or the response that
/// ends the request.
async fn enforce(
    guard: &AccessGuard,
    ctx: &RequestContext,
    outcome: Result<Decision, AuthzError>,
) -> Result<LazyIdentity, Response> {
    match outcome {
        Ok(Decision::Permit(identity)) => {
            metrics::record_decision("permit");
            Ok(identity)
        }
        Ok(Decision::Deny(identity)) if identity.is_anonymous() => Err(challenge(guard, ctx).await),
        Ok(Decision::Deny(identity)) => {
            metrics::record_decision("deny");
            warn!(
                request_id = ctx.request_id(),
                method = %ctx.method(),
                path = ctx.path(),
                principal = identity.principal().unwrap_or_default(),
                "Access denied"
            );
            Err(StatusCode::FORBIDDEN.into_response())
        }
        Err(e) if e.is_authentication() => {
            warn!(request_id = ctx.request_id(), path = ctx.path(), error = %e, "Authentication failed");
            Err(challenge(guard, ctx).await)
        }
        Err(e) => {
            metrics::record_decision("error");
            error!(request_id = ctx.request_id(), path = ctx.path(), error = %e, "Access decision failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

async fn challenge(guard: &AccessGuard, ctx: &RequestContext) -> Response {
    let challenge = guard.send_challenge(ctx).await;
    metrics::record_decision("challenge");
    metrics::record_challenge(challenge.status.as_u16());
    challenge.into_response()
}
