//! The length-prefixed binary wire protocol spoken over each connection.
//!
//! A request is a length-prefixed list of byte-string arguments; a reply is
//! a length-prefixed, tagged value that can nest arrays. Both directions
//! cap a single message at [`MAX_MSG_SIZE`] bytes so one client can't pin
//! arbitrary amounts of memory in a connection's buffers.

mod reply;
mod request;

pub use reply::{begin_array, end_array, push_dbl, push_str, Reply};
pub use request::{encode_request, try_parse, ParseOutcome};

/// Largest total message size (request or reply), not counting its own
/// 4-byte length prefix.
pub const MAX_MSG_SIZE: usize = 4096;
/// Largest number of arguments a single request may carry.
pub const MAX_ARGS: usize = 1024;

/// A request was well-formed but something about the protocol framing
/// itself was unacceptable; this closes the connection rather than
/// producing an [`ErrorCode`] reply.
#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The declared message length exceeded [`MAX_MSG_SIZE`].
    TooBig,
    /// The framing was internally inconsistent (bad argc, truncated
    /// argument, trailing bytes).
    Malformed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::TooBig => write!(f, "message exceeds maximum size"),
            ProtocolError::Malformed => write!(f, "malformed request framing"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// The error taxonomy carried in an `ERR` reply. Distinct from
/// [`ProtocolError`]: these are command-level failures that still get a
/// reply, not framing failures that close the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unknown = 1,
    TooBig = 2,
    TypeMismatch = 3,
    ArgError = 4,
}

impl ErrorCode {
    fn as_u32(self) -> u32 {
        self as u32
    }
}
