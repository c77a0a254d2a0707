//! Fork channel - coordinator-side accept loop and per-worker reader.

use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ipc::codec::{read_frame, MAX_FRAME_BYTES};
use crate::ipc::protocol::ChannelMessage;
use crate::types::{Error, Result};

/// Loopback listener that workers report to.
///
/// Messages from every worker are merged, in arrival order, into the single
/// receiver returned by [`ForkChannel::bind`]. Clones share one release state.
#[derive(Debug, Clone)]
pub struct ForkChannel {
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl ForkChannel {
    /// Bind on an ephemeral loopback port and start accepting workers.
    pub async fn bind() -> Result<(Self, mpsc::UnboundedReceiver<ChannelMessage>)> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|e| Error::channel(format!("bind failed: {}", e)))?;
        let addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(accept_loop(listener, cancel.clone(), tx));
        tracing::debug!("fork_channel_listening: {}", addr);

        Ok((Self { addr, cancel }, rx))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Tear the channel down for every worker at once.
    ///
    /// Stops accepting, drops all worker connections and, once in-flight
    /// readers finish, closes the message receiver.
    pub fn release(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("fork_channel_released: {}", self.addr);
        }
        self.cancel.cancel();
    }

    pub fn is_released(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve once the channel has been released.
    pub async fn released(&self) {
        self.cancel.cancelled().await
    }
}

async fn accept_loop(
    listener: TcpListener,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<ChannelMessage>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accept = listener.accept() => {
                match accept {
                    Ok((stream, peer)) => {
                        tracing::debug!("fork_channel_connection from {}", peer);
                        tokio::spawn(handle_connection(stream, cancel.clone(), tx.clone()));
                    }
                    Err(e) => {
                        tracing::warn!("fork_channel_accept_failed: {}", e);
                    }
                }
            }
        }
    }
}

/// Read frames from one worker until EOF, error or release.
async fn handle_connection(
    mut stream: TcpStream,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<ChannelMessage>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read_frame(&mut stream, MAX_FRAME_BYTES) => {
                let (msg_type, payload) = match frame {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        // Closing without Disconnect is not a disconnect;
                        // the exit report covers dead workers.
                        tracing::debug!("fork_channel_connection_closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("fork_channel_read_failed: {}", e);
                        break;
                    }
                };

                match ChannelMessage::decode(msg_type, &payload) {
                    Ok(message) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("fork_channel_bad_message: {}", e),
                }
            }
        }
    }
}
