pub mod reqid;
pub mod respond;
pub mod telemetry;

pub use reqid::*;
pub use respond::*;
pub use telemetry::*;
