//! Core of the echo bot relay.
//!
//! Holds the Bot Framework activity model, the per-turn [`TurnContext`], the
//! [`ActivityHandler`] seam for bot logic, and the [`ErrorBoundary`] every turn
//! runs inside. Transports (HTTP, WebSocket) live in the `echo-bot` app and
//! only ever call [`run_turn`].
pub mod activity;
pub mod boundary;
pub mod connector;
pub mod credentials;
pub mod error;
pub mod handler;
pub mod sender;
pub mod turn;

pub use activity::{
    Activity, ChannelAccount, ConversationAccount, ExpectedReplies, ResourceResponse,
    activity_types,
};
pub use boundary::{ErrorBoundary, ReportToUser, SharedBoundary, TurnOutcome, run_turn};
pub use connector::{ConnectorClient, ConnectorSender};
pub use credentials::{AppCredentials, ChannelCloud};
pub use error::{SendError, TurnError, TurnResult};
pub use handler::{ActivityHandler, EchoBot};
pub use sender::{ActivitySender, BufferedSender, SharedSender};
pub use turn::TurnContext;
