//! Length-prefixed JSON framing for stream transports.
//!
//! Each frame is a 4-byte big-endian length followed by one JSON envelope.

use crossbeam::channel::Receiver;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

use crate::bridge::WireError;
use crate::error::{BridgeError, Result};
use crate::payload::Payload;
use crate::platform::RequestId;

pub const APP_TO_NATIVE_CAP: usize = 1_048_576;
pub const NATIVE_TO_APP_CAP: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Envelope {
    /// Request for a handler on the receiving side. Requests without an id
    /// expect no response.
    #[serde(rename = "request")]
    Request {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<RequestId>,
        path: String,
        #[serde(default)]
        payload: Payload,
    },

    #[serde(rename = "response")]
    Response {
        id: RequestId,
        #[serde(default)]
        payload: Payload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },
}

pub fn request_envelope(id: Option<RequestId>, path: impl Into<String>, payload: Payload) -> Envelope {
    Envelope::Request {
        id,
        path: path.into(),
        payload,
    }
}

pub fn response_envelope(id: RequestId, result: &Result<Payload>) -> Envelope {
    match result {
        Ok(payload) => Envelope::Response {
            id,
            payload: payload.clone(),
            error: None,
        },
        Err(err) => Envelope::Response {
            id,
            payload: Payload::empty(),
            error: Some(WireError::from(err)),
        },
    }
}

/// Result carried by a response envelope.
pub fn response_result(path: &str, payload: Payload, error: Option<WireError>) -> Result<Payload> {
    match error {
        None => Ok(payload),
        Some(error) => Err(BridgeError::Native {
            path: path.to_string(),
            message: format!("{}: {}", error.kind, error.message),
        }),
    }
}

pub fn writer_loop(mut writer: impl Write, rx: Receiver<Envelope>) -> io::Result<()> {
    for envelope in rx {
        let payload = encode_envelope(&envelope)?;
        write_frame(&mut writer, &payload, APP_TO_NATIVE_CAP)?;
        writer.flush()?;
    }

    Ok(())
}

/// Reads envelopes until the stream ends. Ending between frames is `Ok`;
/// ending inside one is `UnexpectedEof`.
pub fn reader_loop<F>(mut reader: impl Read, mut on_envelope: F) -> io::Result<()>
where
    F: FnMut(Envelope),
{
    while let Some(payload) = read_frame(&mut reader, NATIVE_TO_APP_CAP)? {
        on_envelope(decode_envelope(&payload)?);
    }
    Ok(())
}

pub fn encode_envelope(envelope: &Envelope) -> io::Result<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(json_error)
}

pub fn decode_envelope(payload: &[u8]) -> io::Result<Envelope> {
    serde_json::from_slice(payload).map_err(json_error)
}

/// Reads one frame body, or `None` when the stream ends before a new frame.
pub fn read_frame(reader: &mut impl Read, max_payload: usize) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0_u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a frame header",
                ));
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }

    let len = check_frame_len(u32::from_be_bytes(header) as usize, max_payload)?;
    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8], max_payload: usize) -> io::Result<()> {
    let len = check_frame_len(payload.len(), max_payload)?;
    let header = u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame length exceeds u32"))?
        .to_be_bytes();

    writer.write_all(&header)?;
    writer.write_all(payload)
}

fn check_frame_len(len: usize, max_payload: usize) -> io::Result<usize> {
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the {max_payload} byte cap"),
        ));
    }
    Ok(len)
}

fn json_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
