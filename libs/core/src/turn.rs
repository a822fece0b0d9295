use serde_json::Value;

use crate::activity::{Activity, ResourceResponse};
use crate::error::SendError;
use crate::sender::SharedSender;

/// State for processing exactly one inbound activity.
///
/// The context owns the inbound activity and a sender bound to the originating
/// connection. It is created per activity and dropped when the turn ends.
pub struct TurnContext {
    activity: Activity,
    sender: SharedSender,
    responded: bool,
}

impl TurnContext {
    pub fn new(activity: Activity, sender: SharedSender) -> Self {
        Self {
            activity,
            sender,
            responded: false,
        }
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// True once at least one outbound activity was accepted by the sender.
    pub fn responded(&self) -> bool {
        self.responded
    }

    pub async fn send_activity(
        &mut self,
        mut activity: Activity,
    ) -> Result<ResourceResponse, SendError> {
        activity.apply_conversation_reference(&self.activity);
        let response = self.sender.send(activity).await?;
        self.responded = true;
        Ok(response)
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<ResourceResponse, SendError> {
        self.send_activity(Activity::message(text)).await
    }

    pub async fn send_trace_activity(
        &mut self,
        name: &str,
        value: Value,
        value_type: &str,
        label: &str,
    ) -> Result<ResourceResponse, SendError> {
        self.send_activity(Activity::trace(name, value, value_type, label))
            .await
    }
}
