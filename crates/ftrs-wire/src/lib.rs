//! Wire framing for the fault-tolerant replication system.
//!
//! Every peer conversation — client, LFD, replica-to-replica, GFD, RM — is
//! framed the same way: four text fields joined by a literal `"\n\n"`
//! separator, in order `identifier, number, data, state`. Missing `data`/
//! `state` encode as empty strings and decode back to `None`. An empty byte
//! sequence decodes as [`DecodeError::Empty`], which callers treat as "peer
//! closed the connection".
//!
//! One physical read is one logical frame: [`read_message`] issues a single
//! `read` of up to [`FRAME_BUF_SIZE`] bytes and decodes whatever came back.
//! Callers MUST NOT pipeline more than one frame into a single `write`.

use std::str::Utf8Error;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The literal field separator.
pub const FRAME_SEPARATOR: &str = "\n\n";

/// Size of the single read performed per frame.
pub const FRAME_BUF_SIZE: usize = 4096;

/// Role tags carried in the `data` field of a handshake frame.
pub mod role {
    pub const CLIENT: &str = "client";
    pub const LFD: &str = "lfd";
    pub const GFD: &str = "gfd";
    pub const SERVER: &str = "server";
    pub const BACKUP: &str = "backup";
    pub const ELECT: &str = "elect";
    pub const APPROVE: &str = "approve";
    pub const DISAPPROVE: &str = "disapprove";
    /// Prefix of the election-outcome tag `"primary|<hostport>"`.
    pub const PRIMARY_PREFIX: &str = "primary|";
}

/// Steady-state payload keywords carried in the `data` field.
pub mod keyword {
    pub const HEARTBEAT: &str = "heartbeat";
    pub const OK: &str = "ok";
    pub const ADD: &str = "add";
    pub const REMOVE: &str = "remove";
}

/// Builds the `"primary|<hostport>"` election-outcome tag.
pub fn primary_tag(hostport: &str) -> String {
    format!("{}{hostport}", role::PRIMARY_PREFIX)
}

/// Extracts the hostport from a `"primary|<hostport>"` tag, if it is one.
pub fn parse_primary_tag(data: &str) -> Option<&str> {
    data.strip_prefix(role::PRIMARY_PREFIX)
}

/// Reasons a byte sequence failed to become a [`Message`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The byte sequence was empty — the peer closed the connection.
    #[error("empty frame (peer closed)")]
    Empty,

    /// The frame did not split into exactly four `"\n\n"`-separated fields.
    #[error("malformed frame: expected 4 fields, got {0}")]
    Malformed(usize),

    /// The `number` field was not a valid non-negative integer.
    #[error("malformed frame: number field is not a valid integer")]
    InvalidNumber,

    /// The frame was not valid UTF-8.
    #[error("frame is not valid utf-8: {0}")]
    InvalidUtf8(#[from] Utf8Error),

    /// The underlying transport failed while reading a frame.
    #[error("i/o error reading frame: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded (or about-to-be-encoded) wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub identifier: String,
    pub number: u64,
    pub data: Option<String>,
    pub state: Option<String>,
}

impl Message {
    /// Builds a message with no payload or state.
    pub fn handshake(identifier: impl Into<String>, number: u64, data: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            number,
            data: Some(data.into()),
            state: None,
        }
    }

    /// Builds a message carrying only a `data` payload.
    pub fn with_data(identifier: impl Into<String>, number: u64, data: impl Into<String>) -> Self {
        Self::handshake(identifier, number, data)
    }

    /// Builds a message carrying a `data` payload and serialised state.
    pub fn with_state(
        identifier: impl Into<String>,
        number: u64,
        data: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            number,
            data: Some(data.into()),
            state: Some(state.into()),
        }
    }

    /// Builds a bare message with no `data` and no `state` (rarely needed).
    pub fn empty(identifier: impl Into<String>, number: u64) -> Self {
        Self {
            identifier: identifier.into(),
            number,
            data: None,
            state: None,
        }
    }

    /// Encodes this message as the four-field `"\n\n"`-joined wire frame.
    pub fn encode(&self) -> Vec<u8> {
        let data = self.data.as_deref().unwrap_or("");
        let state = self.state.as_deref().unwrap_or("");
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.identifier,
            self.number,
            data,
            state,
            sep = FRAME_SEPARATOR
        )
        .into_bytes()
    }

    /// Decodes a wire frame. An empty slice decodes to [`DecodeError::Empty`].
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let text = std::str::from_utf8(bytes)?;
        let parts: Vec<&str> = text.split(FRAME_SEPARATOR).collect();
        if parts.len() != 4 {
            return Err(DecodeError::Malformed(parts.len()));
        }
        let number = parts[1].parse::<u64>().map_err(|_| DecodeError::InvalidNumber)?;
        let data = (!parts[2].is_empty()).then(|| parts[2].to_string());
        let state = (!parts[3].is_empty()).then(|| parts[3].to_string());
        Ok(Self {
            identifier: parts[0].to_string(),
            number,
            data,
            state,
        })
    }
}

/// Reads exactly one frame from `reader` via a single bounded read.
///
/// Returns [`DecodeError::Empty`] when the peer has closed the connection
/// (a zero-length read), which callers should treat identically to any
/// other decode failure: retire the connection, never propagate as fatal.
pub async fn read_message<R>(reader: &mut R) -> Result<Message, DecodeError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; FRAME_BUF_SIZE];
    let n = reader.read(&mut buf).await?;
    Message::decode(&buf[..n])
}

/// Writes exactly one frame to `writer` via a single bounded write.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&message.encode()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_full_message() {
        let msg = Message::with_state("replica-a", 7, "12", "19");
        let encoded = msg.encode();
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_absent_fields() {
        let msg = Message::empty("replica-a", 0);
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.data, None);
        assert_eq!(decoded.state, None);
    }

    #[test]
    fn empty_input_is_invalid() {
        let err = Message::decode(&[]).unwrap_err();
        assert!(matches!(err, DecodeError::Empty));
    }

    #[test]
    fn malformed_field_count_is_rejected() {
        let err = Message::decode(b"only-one-field").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(1)));
    }

    #[test]
    fn primary_tag_round_trips() {
        let tag = primary_tag("host:9000");
        assert_eq!(tag, "primary|host:9000");
        assert_eq!(parse_primary_tag(&tag), Some("host:9000"));
        assert_eq!(parse_primary_tag("backup"), None);
    }

    #[tokio::test]
    async fn read_message_over_a_duplex_pipe() {
        let (mut client, mut server) = tokio::io::duplex(FRAME_BUF_SIZE);
        let msg = Message::with_data("c1", 3, "7");
        write_message(&mut client, &msg).await.unwrap();
        let received = read_message(&mut server).await.unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn read_message_on_closed_pipe_is_empty() {
        let (client, mut server) = tokio::io::duplex(FRAME_BUF_SIZE);
        drop(client);
        let err = read_message(&mut server).await.unwrap_err();
        assert!(matches!(err, DecodeError::Empty));
    }

    proptest::proptest! {
        #[test]
        fn frame_round_trip(id in "[a-zA-Z0-9_-]{1,16}", number in 0u64..10_000_000, data in proptest::option::of("[a-zA-Z0-9]{1,12}"), state in proptest::option::of("-?[0-9]{1,9}")) {
            let msg = Message { identifier: id, number, data, state };
            let decoded = Message::decode(&msg.encode()).unwrap();
            proptest::prop_assert_eq!(decoded, msg);
        }
    }
}
