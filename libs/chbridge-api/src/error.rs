use std::fmt;

// ════════════════════════════════════════════════════════════════
//  Transport Error
// ════════════════════════════════════════════════════════════════

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Socket / HTTP level failure.
    Io,
    /// The peer sent something the client could not decode.
    Protocol,
    /// The server executed the request and reported an exception.
    Server,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Io => f.write_str("io"),
            TransportErrorKind::Protocol => f.write_str("protocol"),
            TransportErrorKind::Server => f.write_str("server"),
        }
    }
}

/// Opaque error produced by the transport collaborator.
///
/// The codec never interprets it beyond the kind; it is passed through to the
/// caller and always terminates the cursor or insert session it occurred in.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Io, message: msg.into() }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Protocol, message: msg.into() }
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Server, message: msg.into() }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefix the message with context, keeping the kind.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

// ════════════════════════════════════════════════════════════════
//  Codec Error
// ════════════════════════════════════════════════════════════════

/// Everything that can go wrong while translating between the columnar wire
/// model and the row engine's types.
///
/// `Clone` because cursors and insert sessions keep the first error and
/// report it again on every later call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Wire type without an external counterpart.
    #[error("unsupported column type {0}")]
    UnsupportedType(String),

    /// Value does not fit the target width.
    #[error("{target} overflow: {value}")]
    Overflow { target: &'static str, value: String },

    /// External value cannot go into the declared column.
    #[error("unexpected column type for {external}: {column}")]
    TypeMismatch { external: String, column: String },

    /// Structurally malformed cell or column.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("query was canceled")]
    Canceled,
}

impl CodecError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CodecError::InvalidData(msg.into())
    }

    pub fn overflow(target: &'static str, value: impl fmt::Display) -> Self {
        CodecError::Overflow { target, value: value.to_string() }
    }

    pub fn mismatch(external: impl fmt::Display, column: impl fmt::Display) -> Self {
        CodecError::TypeMismatch {
            external: external.to_string(),
            column: column.to_string(),
        }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_context_keeps_kind() {
        let e = TransportError::server("Code: 60. Table default.t does not exist")
            .with_context("select");
        assert_eq!(e.kind(), TransportErrorKind::Server);
        assert_eq!(e.message(), "select: Code: 60. Table default.t does not exist");
        assert_eq!(format!("{e:?}"), "[server] select: Code: 60. Table default.t does not exist");
    }

    #[test]
    fn io_error_converts_to_io_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let e: TransportError = io.into();
        assert_eq!(e.kind(), TransportErrorKind::Io);
    }

    #[test]
    fn codec_error_messages_name_both_types() {
        let e = CodecError::mismatch("int4", "Int64");
        assert_eq!(e.to_string(), "unexpected column type for int4: Int64");
        let e = CodecError::overflow("int8", u64::MAX);
        assert_eq!(e.to_string(), "int8 overflow: 18446744073709551615");
    }
}
