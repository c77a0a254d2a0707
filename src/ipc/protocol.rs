//! Fork channel messages (worker → coordinator only).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use super::codec::{MSG_DISCONNECT, MSG_HELLO, MSG_LISTENING};
use crate::types::{Error, Result, WorkerId};

/// One control message sent by a worker to its coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Hello { worker: WorkerId, pid: u32 },
    Listening { worker: WorkerId, addr: SocketAddr },
    Disconnect { worker: WorkerId },
}

#[derive(Serialize, Deserialize)]
struct HelloBody {
    worker: WorkerId,
    pid: u32,
}

#[derive(Serialize, Deserialize)]
struct ListeningBody {
    worker: WorkerId,
    addr: SocketAddr,
}

#[derive(Serialize, Deserialize)]
struct DisconnectBody {
    worker: WorkerId,
}

impl ChannelMessage {
    pub fn worker(&self) -> WorkerId {
        match self {
            ChannelMessage::Hello { worker, .. }
            | ChannelMessage::Listening { worker, .. }
            | ChannelMessage::Disconnect { worker } => *worker,
        }
    }

    /// Encode into `(msg_type, payload)`.
    pub fn encode(&self) -> Result<(u8, Vec<u8>)> {
        let encoded = match *self {
            ChannelMessage::Hello { worker, pid } => {
                (MSG_HELLO, serde_json::to_vec(&HelloBody { worker, pid })?)
            }
            ChannelMessage::Listening { worker, addr } => {
                (MSG_LISTENING, serde_json::to_vec(&ListeningBody { worker, addr })?)
            }
            ChannelMessage::Disconnect { worker } => {
                (MSG_DISCONNECT, serde_json::to_vec(&DisconnectBody { worker })?)
            }
        };
        Ok(encoded)
    }

    pub fn decode(msg_type: u8, payload: &[u8]) -> Result<Self> {
        match msg_type {
            MSG_HELLO => {
                let body: HelloBody = serde_json::from_slice(payload)?;
                Ok(ChannelMessage::Hello {
                    worker: body.worker,
                    pid: body.pid,
                })
            }
            MSG_LISTENING => {
                let body: ListeningBody = serde_json::from_slice(payload)?;
                Ok(ChannelMessage::Listening {
                    worker: body.worker,
                    addr: body.addr,
                })
            }
            MSG_DISCONNECT => {
                let body: DisconnectBody = serde_json::from_slice(payload)?;
                Ok(ChannelMessage::Disconnect {
                    worker: body.worker,
                })
            }
            other => Err(Error::channel(format!(
                "Unexpected message type: 0x{:02X}",
                other
            ))),
        }
    }
}
