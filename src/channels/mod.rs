//! Message I/O: the source/sink contracts and the bridge that implements them.

pub mod bridge;
pub mod types;

pub use bridge::BridgeClient;
pub use types::{FetchQuery, InboundMessage, MessageSink, MessageSource, SendOutcome};
