//! # Message Framing
//!
//! The control protocol is line-delimited text: every message is one line
//! of the form `"<TYPE> <PARAMS_BLOB>\n"`, where `TYPE` is an
//! ASCII command name and `PARAMS_BLOB` is a `bincode`-encoded,
//! URL-safe-base64-without-padding blob of an ordered `params` map (empty
//! when the message carries no params, in which case the blob itself is
//! the empty string). This is the Rust analogue of the original's
//! `pickle` + `base64` framing, with `bincode` replacing `pickle` because
//! every wire type here is a statically known Rust enum rather than an
//! arbitrary Python object.

use crate::error::{ConnectionClosed, NstsError, ProtocolError};
use crate::value::Value;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::collections::BTreeMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub type Params = BTreeMap<String, Value>;

/// One control-protocol message: a command type plus an ordered params map.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub type_: String,
    pub params: Params,
}

impl Message {
    pub fn new(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(type_: impl Into<String>, params: Params) -> Self {
        Self {
            type_: type_.into(),
            params,
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Encode as the single line placed on the wire, including the
    /// trailing `\n` delimiter.
    pub fn encode_line(&self) -> Result<String, ProtocolError> {
        if self.params.is_empty() {
            return Ok(format!("{} \n", self.type_));
        }
        let bytes = bincode::serialize(&self.params)
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        let blob = URL_SAFE_NO_PAD.encode(bytes);
        Ok(format!("{} {}\n", self.type_, blob))
    }

    /// Decode a single protocol line (the trailing `\n` may or may not
    /// still be attached).
    pub fn decode_line(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (type_, blob) = line
            .split_once(' ')
            .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
        let params = if blob.is_empty() {
            Params::new()
        } else {
            let bytes = URL_SAFE_NO_PAD
                .decode(blob)
                .map_err(|e| ProtocolError::Decode(e.to_string()))?;
            bincode::deserialize(&bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?
        };
        Ok(Message {
            type_: type_.to_string(),
            params,
        })
    }
}

/// Write `msg` as one framed line, flushing afterward so it reaches the
/// peer promptly even under `Nagle`-style buffering.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> Result<(), NstsError> {
    let line = msg.encode_line()?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode the next framed line. Returns [`ConnectionClosed`] (via
/// `NstsError::ConnectionClosed`) if the peer closed the connection before
/// sending a full line.
pub async fn read_message<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Message, NstsError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ConnectionClosed.into());
    }
    Ok(Message::decode_line(&line)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Time;
    use crate::value::Value;

    #[test]
    fn round_trips_a_message_with_params() {
        let mut params = Params::new();
        params.insert("time".to_string(), Value::from(Time::from_base(10.0)));
        let msg = Message::with_params("INSTANTIATEPROFILE", params);

        let line = msg.encode_line().unwrap();
        assert!(line.ends_with('\n'));
        let decoded = Message::decode_line(&line).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_a_message_with_no_params() {
        let msg = Message::new("OK");
        let line = msg.encode_line().unwrap();
        assert_eq!(line, "OK \n");
        let decoded = Message::decode_line(&line).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn malformed_line_without_separator_is_rejected() {
        assert!(Message::decode_line("NOTRAILINGSPACE").is_err());
    }

    #[tokio::test]
    async fn write_then_read_over_a_pipe() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut client = tokio::io::BufReader::new(client);

        let msg = Message::new("CHECKPROFILE");
        write_message(&mut server, &msg).await.unwrap();

        let received = read_message(&mut client).await.unwrap();
        assert_eq!(received, msg);
    }
}
