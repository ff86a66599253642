pub type InkpadResult<T> = Result<T, InkpadError>;

#[derive(thiserror::Error, Debug)]
pub enum InkpadError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InkpadError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }
}
