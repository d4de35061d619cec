//! TCP transport: a persistent connection speaking bincode frames.

pub mod client;
pub mod server;

use crate::{error::Error, types::Value};
use serde::{Deserialize, Serialize};
use std::{io, sync::Arc};
use url::Url;

pub(crate) const PROTOCOL_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum Request {
    Handshake {
        protocol: u32,
    },
    Invoke {
        id: u64,
        method: Arc<str>,
        args: Vec<Value>,
    },
    Cancel {
        id: u64,
    },
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum Response {
    HandshakeAck,
    HandshakeRejected(String),
    Completion {
        id: u64,
        result: Result<Value, String>,
    },
}

/// Accepts `tcp://host:port` and `host:port`, returning `host:port`.
pub(crate) fn parse_url(url: &str) -> Result<String, Error> {
    let invalid = |reason: &str| Error::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };

    // No scheme: a bare address.
    let parsed = if url.contains("://") {
        Url::parse(url)
    } else {
        Url::parse(&format!("tcp://{url}"))
    }
    .map_err(|e| invalid(&e.to_string()))?;

    if parsed.scheme() != "tcp" {
        return Err(invalid("expected `tcp://host:port` or `host:port`"));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(invalid("user info is not supported"));
    }
    if !matches!(parsed.path(), "" | "/") || parsed.query().is_some() || parsed.fragment().is_some()
    {
        return Err(invalid("a hub url has no path, query or fragment"));
    }
    let host = parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| invalid("missing host"))?;
    let port = parsed.port().ok_or_else(|| invalid("missing port"))?;
    Ok(format!("{host}:{port}"))
}

pub(crate) fn codec_error(e: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}
