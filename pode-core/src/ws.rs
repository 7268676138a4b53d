//! WebSocket upgrade handshake (RFC 6455 §1.3) and frame encode/decode.
//!
//! The `Sec-WebSocket-Accept` computation (key + magic GUID, SHA-1, base64)
//! is the one piece of cryptographic wire format in this module; grounded
//! on the `sha1`/`base64` pairing the `paritytech-soketto` manifest in the
//! example pack reaches for to do the same thing.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::{PodeError, Result};
use crate::http::{HttpRequest, HttpResponse};

const MAGIC_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(MAGIC_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Builds the `101 Switching Protocols` response for a validated upgrade
/// request, tagging it with the client id the spec assigns on upgrade.
pub fn build_handshake_response(request: &HttpRequest, client_id: &str) -> Result<HttpResponse> {
    let key = request
        .header("sec-websocket-key")
        .ok_or_else(|| PodeError::ProtocolParse("missing Sec-WebSocket-Key".into()))?;

    let mut response = HttpResponse::default().with_status(101);
    response.set_header("Upgrade", "websocket");
    response.set_header("Connection", "Upgrade");
    response.set_header("Sec-WebSocket-Accept", accept_key(key));
    response.set_header("X-Pode-ClientId", client_id);
    Ok(response)
}

/// WebSocket frame opcodes relevant to this crate's feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_u8(v: u8) -> Option<Opcode> {
        Some(match v {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            _ => return None,
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Decodes one frame from `buf`. Returns `Ok(None)` when more bytes are
/// needed; `Ok(Some((frame, consumed)))` otherwise.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let fin = buf[0] & 0x80 != 0;
    let opcode = Opcode::from_u8(buf[0] & 0x0F)
        .ok_or_else(|| PodeError::ProtocolParse("unknown websocket opcode".into()))?;
    let masked = buf[1] & 0x80 != 0;
    let mut len = (buf[1] & 0x7F) as u64;
    let mut pos = 2usize;

    if len == 126 {
        if buf.len() < pos + 2 {
            return Ok(None);
        }
        len = u16::from_be_bytes([buf[pos], buf[pos + 1]]) as u64;
        pos += 2;
    } else if len == 127 {
        if buf.len() < pos + 8 {
            return Ok(None);
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[pos..pos + 8]);
        len = u64::from_be_bytes(bytes);
        pos += 8;
    }

    let mask_key = if masked {
        if buf.len() < pos + 4 {
            return Ok(None);
        }
        let key = [buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]];
        pos += 4;
        Some(key)
    } else {
        None
    };

    let len = len as usize;
    if buf.len() < pos + len {
        return Ok(None);
    }

    let mut payload = buf[pos..pos + len].to_vec();
    if let Some(key) = mask_key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }
    pos += len;

    Ok(Some((Frame { fin, opcode, payload }, pos)))
}

/// Encodes a server-to-client frame. Server frames are never masked per
/// RFC 6455 §5.1.
pub fn encode_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x80 | opcode.to_u8()];
    let len = payload.len();
    if len < 126 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_the_rfc6455_example_accept_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn round_trips_a_masked_client_frame() {
        let encoded = {
            let payload = b"hello";
            let mask = [0x01u8, 0x02, 0x03, 0x04];
            let mut masked = payload.to_vec();
            for (i, b) in masked.iter_mut().enumerate() {
                *b ^= mask[i % 4];
            }
            let mut out = vec![0x80 | Opcode::Text.to_u8(), 0x80 | 5];
            out.extend_from_slice(&mask);
            out.extend_from_slice(&masked);
            out
        };

        let (frame, consumed) = decode_frame(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(frame.payload, b"hello");
        assert_eq!(frame.opcode, Opcode::Text);
        assert!(frame.fin);
    }

    #[test]
    fn encode_frame_is_unmasked_with_correct_length_prefix() {
        let frame = encode_frame(Opcode::Binary, &[1, 2, 3]);
        assert_eq!(frame[0], 0x80 | 0x2);
        assert_eq!(frame[1], 3);
        assert_eq!(&frame[2..], &[1, 2, 3]);
    }

    #[test]
    fn decode_reports_incomplete_for_a_truncated_frame() {
        let full = encode_frame(Opcode::Text, b"hello world");
        assert!(decode_frame(&full[..3]).unwrap().is_none());
    }
}
