use thiserror::Error;

#[derive(Error, Debug)]
pub enum CitySenseError {
    /// An external classifier, embedder or partitioner failed or returned
    /// output that does not match its contract.
    #[error("{capability} capability failed: {message}")]
    Capability {
        capability: &'static str,
        message: String,
    },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CitySenseError {
    pub fn capability(capability: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Capability {
            capability,
            message: err.to_string(),
        }
    }
}
