//! `tt-get-capabilities` must name the expected product and server class.

use http::StatusCode;
use serde_json::Value;
use ttverify_client::RpcRequest;

use super::{Outcome, Scenario, ScenarioContext, client_error, expect_status};
use crate::error::HarnessError;

const SCENARIO: Scenario = Scenario::Capabilities;

pub(super) async fn run(ctx: &ScenarioContext) -> Result<Outcome, HarnessError> {
    let response = ctx
        .rpc
        .call(&RpcRequest::new("tt-get-capabilities"))
        .await
        .map_err(client_error(SCENARIO))?;
    expect_status(SCENARIO, &response, StatusCode::OK)?;

    let version = response.argument("server-version").and_then(Value::as_str);
    expect_field("server-version", version, &ctx.config.expect_version)?;
    let class = response.argument("server-class").and_then(Value::as_str);
    expect_field("server-class", class, &ctx.config.expect_class)?;

    Ok(Outcome::Pass(vec![format!(
        "capability response reports {:?} / {:?}",
        ctx.config.expect_version, ctx.config.expect_class
    )]))
}

fn expect_field(field: &str, actual: Option<&str>, expected: &str) -> Result<(), HarnessError> {
    if actual == Some(expected) {
        return Ok(());
    }
    Err(HarnessError::assertion(
        SCENARIO.name(),
        match actual {
            Some(actual) => format!("expected {field} {expected:?}, got {actual:?}"),
            None => format!("expected {field} {expected:?}, field missing"),
        },
    ))
}
