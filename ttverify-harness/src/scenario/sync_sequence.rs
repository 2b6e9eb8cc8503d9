//! The push channel must deliver a `sync-patch` carrying a `sequence`.
//!
//! Frames that are not JSON objects are skipped. Every sequence number seen
//! along the way, on any message type, must be non-decreasing. The upgrade
//! and the reads share one deadline.

use serde_json::Value;
use tokio::time::Instant;
use ttverify_client::{ClientError, StreamingClient};

use super::{Outcome, Scenario, ScenarioContext, client_error};
use crate::error::HarnessError;

const SCENARIO: Scenario = Scenario::SyncSequence;

const PATCH_TYPE: &str = "sync-patch";

pub(super) async fn run(ctx: &ScenarioContext) -> Result<Outcome, HarnessError> {
    let deadline = Instant::now() + ctx.config.stream_timeout;
    let mut client =
        match tokio::time::timeout_at(deadline, StreamingClient::connect(&ctx.stream_options()))
            .await
        {
            Ok(client) => client.map_err(client_error(SCENARIO))?,
            Err(_) => {
                return Err(client_error(SCENARIO)(ClientError::Timeout(
                    ctx.config.stream_timeout,
                )));
            }
        };

    let result = watch(&mut client, deadline, ctx).await;
    if let Err(e) = client.close().await {
        tracing::debug!(error = %e, "closing stream");
    }
    result
}

async fn watch(
    client: &mut StreamingClient,
    deadline: Instant,
    ctx: &ScenarioContext,
) -> Result<Outcome, HarnessError> {
    let mut tracker = SequenceTracker::default();
    let mut skipped = 0usize;

    loop {
        let message = match tokio::time::timeout_at(deadline, client.next_message()).await {
            Ok(message) => message.map_err(client_error(SCENARIO))?,
            Err(_) => {
                return Err(HarnessError::assertion(
                    SCENARIO.name(),
                    format!(
                        "no {PATCH_TYPE} with a sequence within {:?} ({} messages seen)",
                        ctx.config.stream_timeout,
                        tracker.seen + skipped
                    ),
                ));
            }
        };

        let Ok(Value::Object(payload)) = message.json::<Value>() else {
            skipped += 1;
            continue;
        };
        tracing::debug!(kind = ?payload.get("type"), "stream message");

        if let Some(sequence) = tracker.observe(payload.get("sequence"))? {
            if payload.get("type").and_then(Value::as_str) == Some(PATCH_TYPE) {
                return Ok(Outcome::Pass(vec![format!(
                    "{PATCH_TYPE} delivered with sequence {sequence}"
                )]));
            }
        } else if payload.get("type").and_then(Value::as_str) == Some(PATCH_TYPE) {
            return Err(HarnessError::assertion(
                SCENARIO.name(),
                format!("{PATCH_TYPE} missing numeric sequence"),
            ));
        }
    }
}

#[derive(Debug, Default)]
struct SequenceTracker {
    last: Option<u64>,
    seen: usize,
}

impl SequenceTracker {
    /// Record a message's `sequence` field, if it has a numeric one.
    fn observe(&mut self, sequence: Option<&Value>) -> Result<Option<u64>, HarnessError> {
        self.seen += 1;
        let Some(sequence) = sequence.and_then(Value::as_u64) else {
            return Ok(None);
        };
        if let Some(last) = self.last
            && sequence < last
        {
            return Err(HarnessError::assertion(
                SCENARIO.name(),
                format!("sequence went backwards: {last} then {sequence}"),
            ));
        }
        self.last = Some(sequence);
        Ok(Some(sequence))
    }
}
