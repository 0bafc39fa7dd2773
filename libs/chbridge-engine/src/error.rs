use chbridge_api::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// Transport failures carry the context inside the `TransportError`,
    /// config messages get it prepended. Other variants are returned as is.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Codec(CodecError::Transport(e)) => {
                EngineError::Codec(CodecError::Transport(e.with_context(ctx)))
            }
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
