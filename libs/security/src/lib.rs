//! Inbound authentication for the bot endpoint.
//!
//! Channels sign every request with a bearer token. [`ChannelAuthenticator`]
//! checks it against keys from a [`KeySource`], and [`authenticate`] wires the
//! check into an axum router.

pub mod jwt;
pub mod keys;
pub mod middleware;

pub use jwt::{AuthError, ChannelAuthenticator, ChannelClaims, Identity};
pub use keys::{KeyError, KeySource, OpenIdKeySource, StaticKeySource};
pub use middleware::authenticate;
