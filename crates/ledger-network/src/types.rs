//! Wire framing: one JSON [`Envelope`] per length-prefixed frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use ledger_types::Envelope;

pub use ledger_primitives::NodeId as PeerId;

/// Frames larger than this are rejected outright (spec §7 transport error).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encode an envelope as `[len: u32 BE][json bytes]`.
pub fn encode_frame(envelope: &Envelope) -> Bytes {
    let json = serde_json::to_vec(envelope).expect("envelopes always serialize");
    let mut buf = BytesMut::with_capacity(4 + json.len());
    buf.put_u32(json.len() as u32);
    buf.put_slice(&json);
    buf.freeze()
}

/// Decode a single frame's body (length prefix already consumed) into an
/// envelope. Malformed JSON is a silently-dropped malformed message (spec §7).
pub fn decode_frame(body: &[u8]) -> Option<Envelope> {
    serde_json::from_slice(body).ok()
}

/// Read the 4-byte big-endian length prefix from the front of `data`.
pub fn read_length_prefix(mut data: &[u8]) -> Option<usize> {
    if data.len() < 4 {
        return None;
    }
    Some(data.get_u32() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_decode_roundtrip() {
        let env = Envelope::command("addTransaction", json!({"transactionId": "tx-1"}));
        let frame = encode_frame(&env);
        let len = read_length_prefix(&frame).unwrap();
        let body = &frame[4..4 + len];
        let decoded = decode_frame(body).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        assert!(decode_frame(b"not json").is_none());
    }

    #[test]
    fn test_read_length_prefix_too_short() {
        assert!(read_length_prefix(&[0, 0]).is_none());
    }
}
