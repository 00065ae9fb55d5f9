use super::{ProtocolError, MAX_ARGS, MAX_MSG_SIZE};

/// The result of attempting to parse one frame out of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Not enough bytes buffered yet; call again once more have arrived.
    Incomplete,
    /// A full frame was parsed. `consumed` is the number of bytes
    /// (including the 4-byte length prefix) the caller should drop from
    /// the front of its buffer.
    Parsed { args: Vec<Vec<u8>>, consumed: usize },
}

/// Attempts to parse one length-prefixed request out of `buf`.
///
/// `buf` may contain more than one pipelined request, or a partial one;
/// only the first frame is parsed. Returns [`ProtocolError`] for framing
/// that can never become valid by reading more bytes.
pub fn try_parse(buf: &[u8]) -> Result<ParseOutcome, ProtocolError> {
    if buf.len() < 4 {
        return Ok(ParseOutcome::Incomplete);
    }
    let total_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    if total_len > MAX_MSG_SIZE {
        return Err(ProtocolError::TooBig);
    }
    if buf.len() < 4 + total_len {
        return Ok(ParseOutcome::Incomplete);
    }
    let payload = &buf[4..4 + total_len];

    if payload.len() < 4 {
        return Err(ProtocolError::Malformed);
    }
    let argc = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    if argc > MAX_ARGS {
        return Err(ProtocolError::Malformed);
    }

    let mut pos = 4;
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        if payload.len() < pos + 4 {
            return Err(ProtocolError::Malformed);
        }
        let arg_len = u32::from_le_bytes(payload[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if payload.len() < pos + arg_len {
            return Err(ProtocolError::Malformed);
        }
        args.push(payload[pos..pos + arg_len].to_vec());
        pos += arg_len;
    }
    if pos != payload.len() {
        return Err(ProtocolError::Malformed);
    }

    Ok(ParseOutcome::Parsed {
        args,
        consumed: 4 + total_len,
    })
}

/// Encodes `args` into a request frame, for use by tests and tooling that
/// speak the protocol as a client.
pub fn encode_request(args: &[&[u8]]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(args.len() as u32).to_le_bytes());
    for arg in args {
        payload.extend_from_slice(&(arg.len() as u32).to_le_bytes());
        payload.extend_from_slice(arg);
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out
}
