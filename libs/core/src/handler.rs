//! Application logic invoked once per turn.

use async_trait::async_trait;

use crate::activity::activity_types;
use crate::error::TurnResult;
use crate::turn::TurnContext;

/// Bot logic. `on_turn` routes by activity type; override the hooks you need.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    async fn on_turn(&self, ctx: &mut TurnContext) -> TurnResult {
        let activity = ctx.activity();
        if activity.is_message() {
            self.on_message(ctx).await
        } else if activity.is_type(activity_types::CONVERSATION_UPDATE) {
            self.on_conversation_update(ctx).await
        } else if activity.is_type(activity_types::EVENT) {
            self.on_event(ctx).await
        } else {
            self.on_unrecognized_activity(ctx).await
        }
    }

    async fn on_message(&self, _ctx: &mut TurnContext) -> TurnResult {
        Ok(())
    }

    async fn on_conversation_update(&self, _ctx: &mut TurnContext) -> TurnResult {
        Ok(())
    }

    async fn on_event(&self, _ctx: &mut TurnContext) -> TurnResult {
        Ok(())
    }

    async fn on_unrecognized_activity(&self, _ctx: &mut TurnContext) -> TurnResult {
        Ok(())
    }
}

pub const ECHO_PREFIX: &str = "Echo: ";

/// Replies to every message with the same text prefixed by `Echo: `.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoBot;

#[async_trait]
impl ActivityHandler for EchoBot {
    async fn on_message(&self, ctx: &mut TurnContext) -> TurnResult {
        let text = ctx.activity().text.clone().unwrap_or_default();
        ctx.send_text(format!("{ECHO_PREFIX}{text}")).await?;
        Ok(())
    }
}
