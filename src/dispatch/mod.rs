//! Inbound message path.
//!
//! Topics are `<channel>/<clientId>`. A message is decrypted, decoded into a
//! typed [`ChannelMessage`], checked against the device directory and then
//! handed to its channel handler on a spawned task.

mod dispatcher;
mod handlers;
mod message;

pub use dispatcher::*;
pub use message::*;

#[cfg(test)]
mod message_test;
