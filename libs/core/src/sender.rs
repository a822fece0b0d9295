use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::activity::{Activity, ResourceResponse};
use crate::error::SendError;

/// Delivers outbound activities back to the connection a turn came from.
#[async_trait]
pub trait ActivitySender: Send + Sync {
    async fn send(&self, activity: Activity) -> Result<ResourceResponse, SendError>;
}

pub type SharedSender = Arc<dyn ActivitySender>;

/// Collects replies so they can be written into the HTTP response body.
#[derive(Clone, Default)]
pub struct BufferedSender {
    replies: Arc<Mutex<Vec<Activity>>>,
}

impl BufferedSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains everything sent so far, in send order.
    pub async fn take(&self) -> Vec<Activity> {
        let mut guard = self.replies.lock().await;
        std::mem::take(&mut *guard)
    }
}

#[async_trait]
impl ActivitySender for BufferedSender {
    async fn send(&self, mut activity: Activity) -> Result<ResourceResponse, SendError> {
        let id = activity
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        self.replies.lock().await.push(activity);
        Ok(ResourceResponse { id })
    }
}
