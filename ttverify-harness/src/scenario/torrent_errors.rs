//! `torrent-add` must report bad input through structured error codes.

use http::StatusCode;
use ttverify_client::{RpcRequest, RpcResponse};

use super::{Outcome, Scenario, ScenarioContext, client_error, expect_status};
use crate::error::HarnessError;

const SCENARIO: Scenario = Scenario::TorrentErrors;

/// The download path could not be parsed.
pub const CODE_INVALID_PATH: i64 = 4001;
/// The referenced metainfo file does not exist.
pub const CODE_METAINFO_MISSING: i64 = 4002;
/// The download path was refused.
pub const CODE_PATH_REJECTED: i64 = 4003;

pub(super) async fn run(ctx: &ScenarioContext) -> Result<Outcome, HarnessError> {
    let downloads = ctx.config.state_dir.join("downloads");
    std::fs::create_dir_all(&downloads)?;

    let missing_file = RpcRequest::new("torrent-add")
        .argument("metainfo-path", "nonexistent.torrent")
        .argument("download-dir", downloads.display().to_string());
    let response = call(ctx, &missing_file).await?;
    expect_code(&response, &[CODE_METAINFO_MISSING], "missing metainfo-path")?;

    let bad_path = RpcRequest::new("torrent-add")
        .argument("download-dir", "?:/InvalidPath")
        .argument("uri", "magnet:?xt=urn:btih:1234");
    let response = call(ctx, &bad_path).await?;
    expect_code(
        &response,
        &[CODE_INVALID_PATH, CODE_PATH_REJECTED],
        "invalid download-dir",
    )?;

    Ok(Outcome::Pass(vec![
        format!("metainfo-path rejection ({CODE_METAINFO_MISSING})"),
        format!("invalid download path returns {CODE_INVALID_PATH}/{CODE_PATH_REJECTED}"),
    ]))
}

async fn call(ctx: &ScenarioContext, request: &RpcRequest) -> Result<RpcResponse, HarnessError> {
    let response = ctx.rpc.call(request).await.map_err(client_error(SCENARIO))?;
    expect_status(SCENARIO, &response, StatusCode::OK)?;
    Ok(response)
}

fn expect_code(response: &RpcResponse, accepted: &[i64], case: &str) -> Result<(), HarnessError> {
    match response.app_code() {
        Some(code) if accepted.contains(&code) => Ok(()),
        code => Err(HarnessError::assertion(
            SCENARIO.name(),
            format!(
                "expected code {} for {case}, got {}",
                accepted
                    .iter()
                    .map(i64::to_string)
                    .collect::<Vec<_>>()
                    .join(" or "),
                code.map_or_else(|| "none".to_string(), |c| c.to_string())
            ),
        )),
    }
}
