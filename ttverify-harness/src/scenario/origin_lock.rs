//! Requests declaring a foreign `Origin` must be refused with 403.

use http::StatusCode;
use ttverify_client::RpcRequest;

use super::{OriginPolicy, Outcome, Scenario, ScenarioContext, client_error};
use crate::error::HarnessError;

const SCENARIO: Scenario = Scenario::OriginLock;

pub(super) async fn run(ctx: &ScenarioContext) -> Result<Outcome, HarnessError> {
    let origin = &ctx.config.foreign_origin;
    let response = ctx
        .rpc
        .call_with_origin(&RpcRequest::new("tt-get-capabilities"), origin)
        .await
        .map_err(client_error(SCENARIO))?;

    match (response.status, ctx.config.origin_policy) {
        (StatusCode::FORBIDDEN, _) => Ok(Outcome::Pass(vec![format!(
            "origin lock enforced for {origin}"
        )])),
        (StatusCode::OK, OriginPolicy::Permissive) => {
            tracing::warn!(origin = %origin, "origin lock bypassed");
            Ok(Outcome::Warn(format!(
                "origin lock bypassed for {origin} (likely debug build)"
            )))
        }
        (status, _) => Err(HarnessError::assertion(
            SCENARIO.name(),
            format!(
                "expected status 403 for origin {origin}, got {}",
                status.as_u16()
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioConfig;
    use crate::scenario::fake_service::{FakeService, FakeServiceConfig};

    async fn run_against(
        enforce_origin: bool,
        policy: OriginPolicy,
    ) -> Result<Outcome, HarnessError> {
        let service = FakeService::spawn(FakeServiceConfig {
            enforce_origin,
            ..Default::default()
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = ScenarioConfig::new(dir.path());
        config.origin_policy = policy;
        let ctx = ScenarioContext::new("127.0.0.1", service.port(), service.secret().clone(), config);
        run(&ctx).await
    }

    #[tokio::test]
    async fn test_forbidden_passes_in_both_modes() {
        for policy in [OriginPolicy::Strict, OriginPolicy::Permissive] {
            let outcome = run_against(true, policy).await.unwrap();
            assert_eq!(
                outcome,
                Outcome::Pass(vec!["origin lock enforced for http://evil-site.com".into()])
            );
        }
    }

    #[tokio::test]
    async fn test_bypass_warns_when_permissive() {
        let outcome = run_against(false, OriginPolicy::Permissive).await.unwrap();
        assert!(matches!(outcome, Outcome::Warn(msg) if msg.contains("bypassed")));
    }

    #[tokio::test]
    async fn test_bypass_fails_when_strict() {
        let err = run_against(false, OriginPolicy::Strict).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "origin-lock: expected status 403 for origin http://evil-site.com, got 200"
        );
    }
}
