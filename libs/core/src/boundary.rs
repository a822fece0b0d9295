//! Error boundary wrapped around every turn.
//!
//! [`run_turn`] is the only way the transports invoke an [`ActivityHandler`].
//! Whatever the handler does (returns an error, fails a send, panics) the turn
//! completes from the transport's point of view and the failure is handed to an
//! [`ErrorBoundary`] chosen at construction time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::TurnError;
use crate::handler::ActivityHandler;
use crate::turn::TurnContext;

pub const TRACE_NAME: &str = "OnTurnError Trace";
pub const TRACE_LABEL: &str = "TurnError";
pub const ERROR_VALUE_TYPE: &str = "https://www.botframework.com/schemas/error";
pub const APOLOGY_TEXT: &str = "The bot encountered an error or bug.";
pub const REMEDIATION_TEXT: &str = "To continue to run this bot, please fix the bot source code.";

/// Policy applied when a turn fails. Implementations must not panic; sends are best-effort.
#[async_trait]
pub trait ErrorBoundary: Send + Sync {
    async fn on_turn_error(&self, ctx: &mut TurnContext, error: &TurnError);
}

pub type SharedBoundary = Arc<dyn ErrorBoundary>;

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Recovered,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Completed => "completed",
            TurnOutcome::Recovered => "recovered",
        }
    }
}

/// Logs the failure, emits a trace for developer tooling, then apologises to the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportToUser;

#[async_trait]
impl ErrorBoundary for ReportToUser {
    async fn on_turn_error(&self, ctx: &mut TurnContext, err: &TurnError) {
        error!(
            error = ?err,
            activity_type = %ctx.activity().r#type,
            conversation_id = ctx.activity().conversation_id().unwrap_or_default(),
            "[on_turn_error] unhandled error: {err}"
        );

        if let Err(send_err) = ctx
            .send_trace_activity(
                TRACE_NAME,
                Value::String(err.to_string()),
                ERROR_VALUE_TYPE,
                TRACE_LABEL,
            )
            .await
        {
            warn!(error = %send_err, "failed to send error trace");
        }
        for text in [APOLOGY_TEXT, REMEDIATION_TEXT] {
            if let Err(send_err) = ctx.send_text(text).await {
                warn!(error = %send_err, "failed to send error notice");
            }
        }
    }
}

/// Runs `handler` for the turn in `ctx`, routing any failure to `boundary`.
pub async fn run_turn(
    ctx: &mut TurnContext,
    handler: &dyn ActivityHandler,
    boundary: &dyn ErrorBoundary,
) -> TurnOutcome {
    let err = match AssertUnwindSafe(handler.on_turn(ctx)).catch_unwind().await {
        Ok(Ok(())) => return TurnOutcome::Completed,
        Ok(Err(err)) => err,
        Err(panic) => TurnError::Panicked(panic_message(panic.as_ref())),
    };

    if let Err(panic) = AssertUnwindSafe(boundary.on_turn_error(ctx, &err))
        .catch_unwind()
        .await
    {
        error!(
            panic = %panic_message(panic.as_ref()),
            "error boundary panicked while handling: {err}"
        );
    }
    TurnOutcome::Recovered
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
