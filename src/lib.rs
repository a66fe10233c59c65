//! Auto-responder: rule-driven automatic replies for a WhatsApp bridge.
//!
//! A poll scheduler pulls new messages from a [`channels::MessageSource`],
//! asks the [`rules::RuleEngine`] for a reply, and hands it to a
//! [`channels::MessageSink`].

pub mod api;
pub mod channels;
pub mod config;
pub mod error;
pub mod logging;
pub mod rules;
pub mod scheduler;
