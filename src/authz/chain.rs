//! Policy chain evaluation.
//!
//! # Data Flow
//! ```text
//! [policy_1, policy_2, ..., policy_n], identity
//!     → policy_1.check_permission(ctx, identity)
//!         deny  → stop, Deny
//!         error → stop, Err
//!         permit(+augmented) → identity := augmented
//!     → policy_2 ...
//!     → all permitted → Permit(last augmented identity)
//! ```
//!
//! # Design Decisions
//! - Strictly sequential: a policy never runs before its predecessor permits
//! - An empty chain permits
//! - Cancellation is checked between policies

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::auth::identity::LazyIdentity;
use crate::authz::context::RequestContext;
use crate::authz::policy::{CheckResult, PolicyRef};
use crate::error::AuthzError;
use crate::observability::metrics;

/// Evaluate `policies` in order, short-circuiting on the first denial.
///
/// The returned result carries the last augmented identity, if any policy
/// produced one. Latency is recorded whatever the outcome.
pub async fn evaluate(
    policies: &[PolicyRef],
    identity: LazyIdentity,
    ctx: &RequestContext,
) -> Result<CheckResult, AuthzError> {
    let start = Instant::now();
    let result = run_chain(policies, identity, ctx).await;
    metrics::record_evaluation(start);
    result
}

async fn run_chain(
    policies: &[PolicyRef],
    identity: LazyIdentity,
    ctx: &RequestContext,
) -> Result<CheckResult, AuthzError> {
    let mut current = identity;
    let mut augmented = None;

    for policy in policies {
        if ctx.is_cancelled() {
            return Err(AuthzError::Cancelled);
        }

        let result = policy.check_permission(ctx, &current).await.inspect_err(|e| {
            tracing::warn!(policy = policy.name(), path = ctx.path(), error = %e, "Policy evaluation failed");
        })?;

        if !result.is_permitted() {
            tracing::debug!(policy = policy.name(), path = ctx.path(), "Policy denied request");
            return Ok(CheckResult::deny());
        }

        if let Some(identity) = result.into_augmented_identity() {
            current = LazyIdentity::resolved(identity.clone());
            augmented = Some(identity);
        }
    }

    Ok(match augmented {
        Some(identity) => CheckResult::permit_with(identity),
        None => CheckResult::permit(),
    })
}

/// Run synchronous policy work on the blocking pool.
///
/// The closure receives the request's cancellation token so long-running
/// work can stop early once the client has gone.
pub async fn run_blocking<F, T>(ctx: &RequestContext, work: F) -> Result<T, AuthzError>
where
    F: FnOnce(CancellationToken) -> T + Send + 'static,
    T: Send + 'static,
{
    let token = ctx.cancellation_token();
    if token.is_cancelled() {
        return Err(AuthzError::Cancelled);
    }
    tokio::task::spawn_blocking(move || work(token))
        .await
        .map_err(|e| AuthzError::Blocking(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::SecurityIdentity;
    use crate::authz::policy::{DenyPolicy, PermitPolicy, SecurityPolicy};
    use async_trait::async_trait;
    use axum::http::{HeaderMap, Method};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ctx() -> RequestContext {
        RequestContext::new(Method::GET, "/", HeaderMap::new())
    }

    /// Counts invocations; permits unless built with `denying`.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        deny: bool,
    }

    impl Counting {
        fn denying() -> Self {
            Self {
                deny: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl SecurityPolicy for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn check_permission(&self, _: &RequestContext, _: &LazyIdentity) -> Result<CheckResult, AuthzError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CheckResult::from_bool(!self.deny))
        }
    }

    /// Permits with an identity carrying the given role.
    struct Augmenting(&'static str);

    #[async_trait]
    impl SecurityPolicy for Augmenting {
        fn name(&self) -> &str {
            "augmenting"
        }

        async fn check_permission(
            &self,
            _: &RequestContext,
            identity: &LazyIdentity,
        ) -> Result<CheckResult, AuthzError> {
            let identity = identity.get().await?;
            let augmented = identity.as_ref().clone().with_roles([self.0]);
            Ok(CheckResult::permit_with(Arc::new(augmented)))
        }
    }

    /// Permits only when the identity holds the role.
    struct RequiresRole(&'static str);

    #[async_trait]
    impl SecurityPolicy for RequiresRole {
        fn name(&self) -> &str {
            "requires-role"
        }

        async fn check_permission(
            &self,
            _: &RequestContext,
            identity: &LazyIdentity,
        ) -> Result<CheckResult, AuthzError> {
            Ok(CheckResult::from_bool(identity.get().await?.has_role(self.0)))
        }
    }

    struct Failing;

    #[async_trait]
    impl SecurityPolicy for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn check_permission(&self, _: &RequestContext, _: &LazyIdentity) -> Result<CheckResult, AuthzError> {
            Err(AuthzError::policy("failing", "backend unavailable"))
        }
    }

    fn alice() -> LazyIdentity {
        LazyIdentity::resolved(Arc::new(SecurityIdentity::named("alice")))
    }

    #[tokio::test]
    async fn test_empty_chain_permits() {
        let result = evaluate(&[], alice(), &ctx()).await.unwrap();
        assert!(result.is_permitted());
        assert!(result.augmented_identity().is_none());
    }

    #[tokio::test]
    async fn test_deny_short_circuits() {
        let first = Arc::new(Counting::default());
        let third = Arc::new(Counting::default());
        let policies: Vec<PolicyRef> = vec![first.clone(), Arc::new(DenyPolicy), third.clone()];
        let result = evaluate(&policies, alice(), &ctx()).await.unwrap();
        assert!(!result.is_permitted());
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);

        let denying = Arc::new(Counting::denying());
        let after = Arc::new(Counting::default());
        let policies: Vec<PolicyRef> = vec![Arc::new(PermitPolicy), denying.clone(), after.clone()];
        assert!(!evaluate(&policies, alice(), &ctx()).await.unwrap().is_permitted());
        assert_eq!(denying.calls.load(Ordering::SeqCst), 1);
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_policies_run_when_permitting() {
        let counter = Arc::new(Counting::default());
        let policies: Vec<PolicyRef> = vec![counter.clone(), counter.clone(), counter.clone()];
        assert!(evaluate(&policies, alice(), &ctx()).await.unwrap().is_permitted());
        assert_eq!(counter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_augmented_identity_flows_forward() {
        let policies: Vec<PolicyRef> = vec![Arc::new(Augmenting("auditor")), Arc::new(RequiresRole("auditor"))];
        let result = evaluate(&policies, alice(), &ctx()).await.unwrap();
        assert!(result.is_permitted());
        assert!(result.augmented_identity().unwrap().has_role("auditor"));

        let without: Vec<PolicyRef> = vec![Arc::new(RequiresRole("auditor"))];
        assert!(!evaluate(&without, alice(), &ctx()).await.unwrap().is_permitted());
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let counter = Arc::new(Counting::default());
        let policies: Vec<PolicyRef> = vec![Arc::new(Failing), counter.clone()];
        let err = evaluate(&policies, alice(), &ctx()).await.unwrap_err();
        assert!(matches!(err, AuthzError::Policy { .. }));
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_chain_records_latency() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let policies: Vec<PolicyRef> = vec![Arc::new(Failing)];
        let result = ::metrics::with_local_recorder(&recorder, || {
            runtime.block_on(evaluate(&policies, alice(), &ctx()))
        });
        assert!(result.is_err());
        assert!(handle.render().contains("access_guard_evaluation_seconds"));
    }

    #[tokio::test]
    async fn test_cancelled_request_stops_evaluation() {
        let ctx = ctx();
        ctx.cancel();
        let policies: Vec<PolicyRef> = vec![Arc::new(PermitPolicy)];
        assert!(matches!(
            evaluate(&policies, alice(), &ctx).await,
            Err(AuthzError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let value = run_blocking(&ctx(), |token| if token.is_cancelled() { 0 } else { 42 })
            .await
            .unwrap();
        assert_eq!(value, 42);

        let panicking = run_blocking(&ctx(), |_| -> u8 { panic!("boom") }).await;
        assert!(matches!(panicking, Err(AuthzError::Blocking(_))));
    }
}
