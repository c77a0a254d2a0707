//! Fork channel: TCP loopback transport between coordinator and workers.
//!
//! Workers connect on startup and send one-way control messages
//! (hello, listening, disconnect) using length-prefixed JSON frames.

pub mod codec;
pub mod protocol;

mod client;
mod server;

pub use client::ChannelClient;
pub use protocol::ChannelMessage;
pub use server::ForkChannel;
