//! Broker wire protocol
//!
//! The broker is a ZeroMQ PUB socket. Every published unit is one
//! multipart message of exactly two UTF-8 frames:
//!
//! ```text
//! [topic][JSON payload]
//! ```
//!
//! so any ZeroMQ SUB socket can consume it and filter on the topic
//! prefix. Addresses use the ZeroMQ grammar:
//! - `tcp://host:port` (port 0 picks a free port)
//! - `ipc:///path/to/socket` (unix only)

use std::io;
#[cfg(unix)]
use std::path::Path;

use zeromq::{Endpoint, Socket, SocketRecv, SubSocket, ZmqMessage};

use crate::error::{Result, StreamerError};

/// Parses and checks a broker address.
pub fn parse_endpoint(raw: &str) -> Result<Endpoint> {
    raw.parse::<Endpoint>()
        .map_err(|_| StreamerError::InvalidAddress(raw.to_string()))
}

/// Builds the two-frame message for one unit.
pub fn encode_unit(topic: &str, payload: &str) -> ZmqMessage {
    let mut msg = ZmqMessage::from(topic.to_string());
    msg.push_back(payload.to_string().into());
    msg
}

/// Splits a received message back into `(topic, payload)`.
///
/// Anything other than two UTF-8 frames is `InvalidData`.
pub fn decode_unit(msg: ZmqMessage) -> io::Result<(String, String)> {
    if msg.len() != 2 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected 2 frames, got {}", msg.len()),
        ));
    }

    let mut frames = msg.into_vec().into_iter();
    let mut next = || -> io::Result<String> {
        let frame = frames.next().unwrap_or_default();
        String::from_utf8(frame.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    };
    let topic = next()?;
    let payload = next()?;
    Ok((topic, payload))
}

/// Removes a socket file left behind by a crashed process.
///
/// A live socket answers and is left alone; binding over it then fails.
#[cfg(unix)]
pub(crate) fn clear_stale_ipc(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Ok(());
    }

    log::warn!("Removing stale broker socket {}", path.display());
    std::fs::remove_file(path).map_err(|e| StreamerError::Bind {
        address: format!("ipc://{}", path.display()),
        source: e.into(),
    })
}

// ------------------------------------------------------------
// Subscriber
// ------------------------------------------------------------

/// Minimal consumer of the broker stream, built on a ZeroMQ SUB socket.
///
/// The topic prefix is sent to the broker as a SUB subscription; an
/// empty prefix receives everything.
///
/// NOTE:
/// Like any SUB socket, units published before the broker has processed
/// the subscription are not delivered.
pub struct Subscriber {
    socket: SubSocket,
}

impl Subscriber {
    pub async fn connect(address: &str, prefix: &str) -> Result<Self> {
        parse_endpoint(address)?;

        let mut socket = SubSocket::new();
        socket.connect(address).await?;
        socket.subscribe(prefix).await?;

        Ok(Self { socket })
    }

    /// Next `(topic, payload)` whose topic starts with the prefix.
    ///
    /// A malformed unit is an `InvalidData` error, never a silent skip.
    pub async fn recv(&mut self) -> Result<(String, String)> {
        let msg = self.socket.recv().await?;
        Ok(decode_unit(msg)?)
    }
}
