//! [`HubConnection`]: the TCP implementation of [`Connection`].
//!
//! Calls are correlated by id. A writer task drains an unbounded queue onto
//! the socket and a reader task routes completions back to their callers, so
//! any number of invocations can be in flight at once.

use super::{codec_error, parse_url, Request, Response, PROTOCOL_VERSION};
use crate::{
    connection::{Connection, ConnectionState, Invocation},
    error::{Error, InvokeError, Result},
    invoke::Completion,
    types::Value,
};
use async_bincode::{
    tokio::{AsyncBincodeReader, AsyncBincodeWriter},
    AsyncDestination,
};
use dashmap::DashMap;
use futures::{future, SinkExt, StreamExt};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{mpsc, oneshot, watch},
    task::{self, AbortHandle},
    time,
};
use tracing::{debug, trace, warn};

/// How long [`HubConnection::start`] waits for the hub to answer the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

type HubReader = AsyncBincodeReader<OwnedReadHalf, Response>;
type HubWriter = AsyncBincodeWriter<OwnedWriteHalf, Request, AsyncDestination>;
type Pending = Arc<DashMap<u64, oneshot::Sender<std::result::Result<Value, InvokeError>>>>;

/// Configures a [`HubConnection`].
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    url: String,
    handshake_timeout: Duration,
    nodelay: bool,
}

impl ConnectionBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            nodelay: true,
        }
    }

    /// Default: 15 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets `TCP_NODELAY` on the socket. Default: true
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Validates the url. Nothing is opened until [`HubConnection::start`].
    pub fn build(self) -> Result<HubConnection> {
        let addr = parse_url(&self.url)?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(HubConnection {
            addr,
            options: self,
            state: Arc::new(state),
            link: OnceLock::new(),
        })
    }
}

/// A persistent connection to a hub.
pub struct HubConnection {
    addr: String,
    options: ConnectionBuilder,
    state: Arc<watch::Sender<ConnectionState>>,
    link: OnceLock<Link>,
}

/// What exists only once the connection has been started.
struct Link {
    outbound: mpsc::UnboundedSender<Request>,
    pending: Pending,
    next_id: AtomicU64,
    reader: AbortHandle,
    writer: AbortHandle,
}

impl HubConnection {
    pub fn builder(url: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder::new(url)
    }

    pub fn url(&self) -> &str {
        self.options.url()
    }

    /// Observes state transitions, e.g. to notice the hub going away.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connects and performs the handshake. A connection can be started once.
    pub async fn start(&self) -> Result<()> {
        let mut current = ConnectionState::Disconnected;
        let claimed = self.state.send_if_modified(|state| {
            current = *state;
            let idle = *state == ConnectionState::Disconnected && self.link.get().is_none();
            if idle {
                *state = ConnectionState::Connecting;
            }
            idle
        });
        if !claimed {
            return Err(Error::AlreadyStarted(current));
        }
        debug!(url = self.url(), old = %current, new = %ConnectionState::Connecting, "connection state");

        let (reader, writer) = match self.open().await {
            Ok(halves) => halves,
            Err(e) => {
                warn!(url = self.url(), error = %e, "connecting to hub failed");
                self.set_state(ConnectionState::Faulted);
                return Err(e);
            }
        };

        let (outbound, queue) = mpsc::unbounded_channel();
        let pending = Pending::default();
        let writer = task::spawn(write_loop(writer, queue)).abort_handle();
        let reader =
            task::spawn(read_loop(reader, pending.clone(), self.state.clone())).abort_handle();
        let link = Link {
            outbound,
            pending,
            next_id: AtomicU64::new(0),
            reader,
            writer,
        };
        if let Err(rejected) = self.link.set(link) {
            rejected.reader.abort();
            rejected.writer.abort();
            return Err(Error::AlreadyStarted(self.state()));
        }

        // The reader may already have seen the hub hang up.
        self.state.send_if_modified(|state| {
            let connecting = *state == ConnectionState::Connecting;
            if connecting {
                *state = ConnectionState::Connected;
            }
            connecting
        });
        debug!(url = self.url(), state = %self.state(), "started");
        Ok(())
    }

    async fn open(&self) -> Result<(HubReader, HubWriter)> {
        let sock = TcpStream::connect(&self.addr).await?;
        sock.set_nodelay(self.options.nodelay)?;
        let (read, write) = sock.into_split();
        let mut reader = HubReader::from(read);
        let mut writer = AsyncBincodeWriter::from(write).for_async();

        writer
            .send(Request::Handshake {
                protocol: PROTOCOL_VERSION,
            })
            .await
            .map_err(codec_error)?;

        let timeout = self.options.handshake_timeout;
        match time::timeout(timeout, reader.next()).await {
            Ok(Some(Ok(Response::HandshakeAck))) => Ok((reader, writer)),
            Ok(Some(Ok(Response::HandshakeRejected(reason)))) => Err(Error::Handshake(reason)),
            Ok(Some(Ok(other))) => Err(Error::Handshake(format!("unexpected {other:?}"))),
            Ok(Some(Err(e))) => Err(codec_error(e).into()),
            Ok(None) => Err(Error::Handshake("hub closed the connection".into())),
            Err(_) => Err(Error::Handshake(format!("no answer within {timeout:?}"))),
        }
    }

    /// Closes the connection. In-flight invocations fail with
    /// [`InvokeError::ConnectionClosed`].
    pub fn stop(&self) {
        self.set_state(ConnectionState::Disconnected);
        if let Some(link) = self.link.get() {
            link.reader.abort();
            link.writer.abort();
            link.pending.clear();
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let old = self.state.send_replace(state);
        if old != state {
            debug!(url = self.url(), %old, new = %state, "connection state");
        }
    }

    fn closed() -> Completion<Value> {
        Box::pin(future::ready(Err(InvokeError::ConnectionClosed)))
    }
}

impl Connection for HubConnection {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn send_invocation(&self, invocation: Invocation) -> Completion<Value> {
        let link = match self.link.get() {
            Some(link) if self.state() == ConnectionState::Connected => link,
            _ => return Box::pin(future::ready(Err(InvokeError::NotConnected))),
        };

        let id = link.next_id.fetch_add(1, Ordering::Relaxed);
        let (done, completion) = oneshot::channel();
        link.pending.insert(id, done);
        // The reader publishes the new state before it drops pending calls.
        if self.state() != ConnectionState::Connected {
            link.pending.remove(&id);
            return Self::closed();
        }

        let Invocation {
            method,
            args,
            cancel,
        } = invocation;
        trace!(id, %method, args = args.len(), "invoke");
        if link
            .outbound
            .send(Request::Invoke { id, method, args })
            .is_err()
        {
            link.pending.remove(&id);
            return Self::closed();
        }

        let outbound = link.outbound.clone();
        let pending = link.pending.clone();
        Box::pin(async move {
            let outcome = match cancel {
                Some(token) => tokio::select! {
                    outcome = completion => outcome,
                    _ = token.cancelled() => {
                        pending.remove(&id);
                        let _ = outbound.send(Request::Cancel { id });
                        trace!(id, "cancelled");
                        return Err(InvokeError::Cancelled);
                    }
                },
                None => completion.await,
            };
            outcome.unwrap_or(Err(InvokeError::ConnectionClosed))
        })
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        if let Some(link) = self.link.get() {
            link.reader.abort();
            link.writer.abort();
        }
    }
}

async fn write_loop(mut writer: HubWriter, mut queue: mpsc::UnboundedReceiver<Request>) {
    while let Some(request) = queue.recv().await {
        if let Err(e) = writer.send(request).await {
            warn!(error = %e, "writing to hub failed");
            break;
        }
    }
}

async fn read_loop(
    mut reader: HubReader,
    pending: Pending,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    let end = loop {
        match reader.next().await {
            Some(Ok(Response::Completion { id, result })) => match pending.remove(&id) {
                Some((_, done)) => {
                    let _ = done.send(result.map_err(InvokeError::Remote));
                }
                None => trace!(id, "completion for a call nobody awaits"),
            },
            Some(Ok(other)) => warn!(frame = ?other, "unexpected frame from hub"),
            Some(Err(e)) => {
                warn!(error = %e, "reading from hub failed");
                break ConnectionState::Faulted;
            }
            None => break ConnectionState::Disconnected,
        }
    };
    debug!(state = %end, "hub connection closed");
    state.send_replace(end);
    pending.clear();
}
