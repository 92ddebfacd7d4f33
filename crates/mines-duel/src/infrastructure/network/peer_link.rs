//! TCP connection to the other player.
//!
//! # Tasks (for beginners)
//!
//! A live [`PeerLink`] runs two background tasks:
//!
//! ```text
//!   socket read half  ──▶ reader task ──▶ NetworkEvent::Frame / Closed ──▶ mpsc
//!   send() ──▶ unbounded queue ──▶ writer task ──▶ socket write half
//! ```
//!
//! The writer drains a single queue, so frames hit the wire in the order
//! `send` was called even though `send` itself never waits.  A message too
//! large for a frame is refused by `send` before it is queued; a write that
//! fails later comes back as [`NetworkEvent::SendFailed`].  Dropping the
//! queue (via [`PeerLink::close`]) lets the writer flush what is already
//! queued, then shut the socket down.
//!
//! Every link gets a fresh [`Uuid`].  Events carry it so the consumer can
//! discard anything a torn-down link emitted after the fact.
//!
//! [`PeerListener`] accepts connections on the duel port and forwards each
//! one as [`NetworkEvent::Incoming`]; deciding whether to use it is left to
//! the consumer.

use std::net::SocketAddr;

use mines_core::protocol::{check_frame_len, ProtocolError};
use mines_core::DuelMessage;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::framing::{read_frame, write_frame, FrameError};

/// Errors that can occur on the peer connection.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The message does not fit in one frame.
    #[error(transparent)]
    Frame(#[from] ProtocolError),

    /// The link has already been closed.
    #[error("peer link is closed")]
    Closed,
}

/// Something that happened on the network, delivered to the session owner.
#[derive(Debug)]
pub enum NetworkEvent {
    /// The listener accepted a connection.
    Incoming { stream: TcpStream, peer: SocketAddr },
    /// An outgoing connection attempt finished.
    Outgoing {
        peer: SocketAddr,
        result: Result<TcpStream, NetworkError>,
    },
    /// One complete frame arrived on link `link_id`.
    Frame { link_id: Uuid, text: String },
    /// Link `link_id` stopped reading.  `error` is `None` for a clean EOF.
    Closed {
        link_id: Uuid,
        error: Option<FrameError>,
    },
    /// Link `link_id` could not write a queued message; the writer has
    /// stopped and the socket is shut down.
    SendFailed { link_id: Uuid, error: FrameError },
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Accept loop on the duel port.
#[derive(Debug)]
pub struct PeerListener {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl PeerListener {
    /// Binds `addr` and starts accepting.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::BindFailed`] if the address is unavailable.
    pub async fn bind(
        addr: SocketAddr,
        events: mpsc::Sender<NetworkEvent>,
    ) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetworkError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| NetworkError::BindFailed { addr, source })?;
        info!("listening for a peer on {local_addr}");

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {peer}");
                        if events.send(NetworkEvent::Incoming { stream, peer }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("accept error: {e}"),
                }
            }
        });

        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting.  Safe to call more than once.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for PeerListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Dials `addr` in the background and reports the result as
/// [`NetworkEvent::Outgoing`].
pub fn spawn_connect(addr: SocketAddr, events: mpsc::Sender<NetworkEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = TcpStream::connect(addr)
            .await
            .map_err(|source| NetworkError::ConnectFailed { addr, source });
        let _ = events.send(NetworkEvent::Outgoing { peer: addr, result }).await;
    })
}

// ── Link ──────────────────────────────────────────────────────────────────────

/// One established connection to the peer.
#[derive(Debug)]
pub struct PeerLink {
    id: Uuid,
    peer: SocketAddr,
    max_frame_len: usize,
    outbound: Option<mpsc::UnboundedSender<(&'static str, String)>>,
    reader: JoinHandle<()>,
}

impl PeerLink {
    /// Starts the reader and writer tasks on `stream`.
    pub fn spawn(
        stream: TcpStream,
        peer: SocketAddr,
        max_frame_len: usize,
        events: mpsc::Sender<NetworkEvent>,
    ) -> Self {
        let id = Uuid::new_v4();
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle on link {id}: {e}");
        }
        let (mut read_half, mut write_half) = stream.into_split();

        let writer_events = events.clone();
        let reader = tokio::spawn(async move {
            let error = loop {
                match read_frame(&mut read_half, max_frame_len).await {
                    Ok(Some(text)) => {
                        if events
                            .send(NetworkEvent::Frame { link_id: id, text })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(None) => break None,
                    Err(e) => break Some(e),
                }
            };
            match &error {
                None => debug!("link {id}: peer closed the connection"),
                Some(e) => warn!("link {id}: receive loop stopped: {e}"),
            }
            let _ = events.send(NetworkEvent::Closed { link_id: id, error }).await;
        });

        let (outbound, mut queue) = mpsc::unbounded_channel::<(&'static str, String)>();
        tokio::spawn(async move {
            while let Some((kind, text)) = queue.recv().await {
                if let Err(error) = write_frame(&mut write_half, &text, max_frame_len).await {
                    warn!("link {id}: failed to send {kind}: {error}");
                    let _ = writer_events
                        .send(NetworkEvent::SendFailed { link_id: id, error })
                        .await;
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });

        info!("link {id} established with {peer}");
        Self {
            id,
            peer,
            max_frame_len,
            outbound: Some(outbound),
            reader,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.outbound.is_some()
    }

    /// Queues `msg` behind everything sent before it.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Frame`] when the message is larger than the
    /// link's frame limit, and [`NetworkError::Closed`] after
    /// [`close`](Self::close) or once the writer task has died.
    pub fn send(&self, msg: DuelMessage) -> Result<(), NetworkError> {
        let outbound = self.outbound.as_ref().ok_or(NetworkError::Closed)?;
        let text = msg.to_wire_text();
        check_frame_len(text.len(), self.max_frame_len)?;
        outbound
            .send((msg.kind(), text))
            .map_err(|_| NetworkError::Closed)
    }

    /// Stops reading, flushes queued sends and closes the socket.  Safe to
    /// call more than once.
    pub fn close(&mut self) {
        if self.outbound.take().is_some() {
            debug!("closing link {}", self.id);
        }
        self.reader.abort();
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.close();
    }
}
