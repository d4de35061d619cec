//! Serving a [`Hub`] over TCP.
//!
//! Each client gets its own task. After the handshake, every invocation runs
//! as a separate task so slow methods never hold up the connection; a
//! `Cancel` frame aborts the matching task and suppresses its completion.

use super::{codec_error, Request, Response, PROTOCOL_VERSION};
use crate::{hub::Hub, types::Value};
use async_bincode::{
    tokio::{AsyncBincodeReader, AsyncBincodeWriter},
    AsyncDestination,
};
use futures::{FutureExt, SinkExt, StreamExt};
use std::{collections::HashMap, io, panic::AssertUnwindSafe, sync::Arc};
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream, ToSocketAddrs,
    },
    sync::mpsc,
    task::{self, AbortHandle},
};
use tracing::{debug, info, trace, warn};

type ClientReader = AsyncBincodeReader<OwnedReadHalf, Request>;
type ClientWriter = AsyncBincodeWriter<OwnedWriteHalf, Response, AsyncDestination>;

/// Calls still running for one client, aborted when the client goes away.
#[derive(Default)]
struct InFlight(HashMap<u64, AbortHandle>);

impl Drop for InFlight {
    fn drop(&mut self) {
        for handle in self.0.values() {
            handle.abort();
        }
    }
}

impl Hub {
    pub async fn serve_tcp(self, addr: impl ToSocketAddrs) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accepts clients on `listener` until accepting fails.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        let hub = Arc::new(self);
        info!(addr = ?listener.local_addr().ok(), methods = hub.methods().len(), "hub listening");
        loop {
            let (sock, peer) = listener.accept().await?;
            let hub = hub.clone();
            task::spawn(async move {
                debug!(%peer, "client connected");
                match serve_client(hub, sock).await {
                    Ok(()) => debug!(%peer, "client left"),
                    Err(e) => warn!(%peer, error = %e, "client dropped"),
                }
            });
        }
    }
}

async fn serve_client(hub: Arc<Hub>, sock: TcpStream) -> io::Result<()> {
    sock.set_nodelay(true)?;
    let (read, write) = sock.into_split();
    let mut requests = ClientReader::from(read);
    let mut responses: ClientWriter = AsyncBincodeWriter::from(write).for_async();

    match requests.next().await {
        Some(Ok(Request::Handshake { protocol })) if protocol == PROTOCOL_VERSION => {
            responses
                .send(Response::HandshakeAck)
                .await
                .map_err(codec_error)?;
        }
        Some(Ok(Request::Handshake { protocol })) => {
            let reason = format!("unsupported protocol {protocol}, hub speaks {PROTOCOL_VERSION}");
            responses
                .send(Response::HandshakeRejected(reason.clone()))
                .await
                .map_err(codec_error)?;
            return Err(codec_error(reason));
        }
        Some(Ok(other)) => return Err(codec_error(format!("expected a handshake, got {other:?}"))),
        Some(Err(e)) => return Err(codec_error(e)),
        None => return Ok(()),
    }

    let (done, mut finished) = mpsc::unbounded_channel::<(u64, Result<Value, String>)>();
    let mut in_flight = InFlight::default();

    loop {
        tokio::select! {
            request = requests.next() => match request {
                Some(Ok(Request::Invoke { id, method, args })) => {
                    trace!(id, %method, args = args.len(), "call");
                    let hub = hub.clone();
                    let done = done.clone();
                    let handle = task::spawn(async move {
                        let call = AssertUnwindSafe(hub.call(&method, args)).catch_unwind();
                        let result = match call.await {
                            Ok(outcome) => outcome.map_err(|e| e.to_string()),
                            Err(_) => {
                                warn!(id, %method, "hub method panicked");
                                Err(format!("hub method `{method}` panicked"))
                            }
                        };
                        let _ = done.send((id, result));
                    });
                    in_flight.0.insert(id, handle.abort_handle());
                }
                Some(Ok(Request::Cancel { id })) => {
                    if let Some(handle) = in_flight.0.remove(&id) {
                        handle.abort();
                        trace!(id, "cancelled");
                    }
                }
                Some(Ok(Request::Handshake { .. })) => warn!("ignoring repeated handshake"),
                Some(Err(e)) => return Err(codec_error(e)),
                None => return Ok(()),
            },
            Some((id, result)) = finished.recv() => {
                // Cancelled calls have already been forgotten.
                if in_flight.0.remove(&id).is_some() {
                    responses
                        .send(Response::Completion { id, result })
                        .await
                        .map_err(codec_error)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time;

    type RawReader = AsyncBincodeReader<OwnedReadHalf, Response>;
    type RawWriter = AsyncBincodeWriter<OwnedWriteHalf, Request, AsyncDestination>;

    async fn spawn_hub(hub: Hub) -> (RawReader, RawWriter) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(hub.serve(listener));
        let (read, write) = TcpStream::connect(addr).await.unwrap().into_split();
        (
            RawReader::from(read),
            AsyncBincodeWriter::from(write).for_async(),
        )
    }

    #[tokio::test]
    async fn rejects_other_protocol_versions() {
        let (mut reader, mut writer) = spawn_hub(Hub::new()).await;
        writer
            .send(Request::Handshake {
                protocol: PROTOCOL_VERSION + 1,
            })
            .await
            .unwrap();
        assert!(matches!(
            reader.next().await,
            Some(Ok(Response::HandshakeRejected(_)))
        ));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_calls_never_complete() {
        let hub = Hub::new()
            .method("ping", |()| async {})
            .method("nap", |(ms,): (i64,)| async move {
                time::sleep(Duration::from_millis(ms as u64)).await;
            });
        let (mut reader, mut writer) = spawn_hub(hub).await;
        writer
            .send(Request::Handshake {
                protocol: PROTOCOL_VERSION,
            })
            .await
            .unwrap();
        assert!(matches!(
            reader.next().await,
            Some(Ok(Response::HandshakeAck))
        ));

        for request in [
            Request::Invoke {
                id: 0,
                method: "nap".into(),
                args: vec![Value::Int(200)],
            },
            Request::Cancel { id: 0 },
            Request::Invoke {
                id: 1,
                method: "ping".into(),
                args: vec![],
            },
        ] {
            writer.send(request).await.unwrap();
        }

        match reader.next().await {
            Some(Ok(Response::Completion { id, result })) => {
                assert_eq!(id, 1);
                assert_eq!(result, Ok(Value::Nil));
            }
            other => panic!("unexpected {other:?}"),
        }
        let quiet = time::timeout(Duration::from_millis(400), reader.next()).await;
        assert!(quiet.is_err(), "cancelled call completed: {quiet:?}");
    }

    #[tokio::test]
    async fn hub_errors_travel_as_messages() {
        let (mut reader, mut writer) = spawn_hub(Hub::new()).await;
        writer
            .send(Request::Handshake {
                protocol: PROTOCOL_VERSION,
            })
            .await
            .unwrap();
        reader.next().await.unwrap().unwrap();
        writer
            .send(Request::Invoke {
                id: 7,
                method: "missing".into(),
                args: vec![],
            })
            .await
            .unwrap();
        match reader.next().await {
            Some(Ok(Response::Completion { id: 7, result })) => {
                assert_eq!(result, Err("no method named `missing`".to_owned()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_methods_still_complete() {
        let hub = Hub::new().method("positive", |(n,): (i64,)| async move {
            assert!(n > 0, "not positive");
            n
        });
        let (mut reader, mut writer) = spawn_hub(hub).await;
        writer
            .send(Request::Handshake {
                protocol: PROTOCOL_VERSION,
            })
            .await
            .unwrap();
        reader.next().await.unwrap().unwrap();

        for (id, n) in [(0, 0), (1, 5)] {
            writer
                .send(Request::Invoke {
                    id,
                    method: "positive".into(),
                    args: vec![Value::Int(n)],
                })
                .await
                .unwrap();
            match reader.next().await {
                Some(Ok(Response::Completion { id: 0, result })) => {
                    assert_eq!(result, Err("hub method `positive` panicked".to_owned()));
                }
                Some(Ok(Response::Completion { id: 1, result })) => {
                    assert_eq!(result, Ok(Value::Int(5)));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
