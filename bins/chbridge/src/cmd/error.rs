use chbridge_api::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Codec(#[from] CodecError),

    #[error("fixture: {0}")]
    Fixture(String),

    #[error("fixture json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("replay task: {0}")]
    Task(String),

    #[error("{0} of {1} types could not be mapped")]
    Unmapped(usize, usize),
}
