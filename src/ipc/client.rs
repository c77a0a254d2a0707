//! Fork channel - worker side.

use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::ipc::codec::write_frame;
use crate::ipc::protocol::ChannelMessage;
use crate::types::{Error, Result, WorkerId};

/// Connection from a worker to its coordinator's fork channel.
#[derive(Debug)]
pub struct ChannelClient {
    worker: WorkerId,
    stream: Mutex<TcpStream>,
}

impl ChannelClient {
    /// Connect and announce this worker's pid.
    pub async fn connect(addr: SocketAddr, worker: WorkerId) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::channel(format!("connect to {} failed: {}", addr, e)))?;
        let client = Self {
            worker,
            stream: Mutex::new(stream),
        };
        client
            .send(&ChannelMessage::Hello {
                worker,
                pid: std::process::id(),
            })
            .await?;
        Ok(client)
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Report the bound listener address.
    pub async fn listening(&self, addr: SocketAddr) -> Result<()> {
        self.send(&ChannelMessage::Listening {
            worker: self.worker,
            addr,
        })
        .await
    }

    /// Send the one-way disconnect signal and close the write side.
    pub async fn disconnect(&self) -> Result<()> {
        let mut stream = self.stream.lock().await;
        let (msg_type, payload) = ChannelMessage::Disconnect {
            worker: self.worker,
        }
        .encode()?;
        write_frame(&mut *stream, msg_type, &payload).await?;
        stream.shutdown().await?;
        Ok(())
    }

    async fn send(&self, message: &ChannelMessage) -> Result<()> {
        let (msg_type, payload) = message.encode()?;
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, msg_type, &payload).await?;
        Ok(())
    }
}
