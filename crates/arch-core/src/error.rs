use crate::node::ArchId;

#[derive(Debug, thiserror::Error)]
pub enum ArchError {
    #[error("unknown node {0}")]
    UnknownNode(ArchId),
    #[error("node {0} is not editable")]
    NotEditable(ArchId),
    #[error("node {0} is unbreakable")]
    Unbreakable(ArchId),
    #[error("offset {offset} is out of bounds for node {id}")]
    InvalidOffset { id: ArchId, offset: usize },
    #[error("invalid content: {0}")]
    InvalidContent(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown query: {0}")]
    UnknownQuery(String),
    #[error("invalid arguments for {command}: {message}")]
    InvalidArgs { command: String, message: String },
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),
    #[error("normalization did not converge")]
    NormalizeDidNotConverge,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ArchError {
    /// Refusals are recoverable: the batch is rolled back and only logged.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            ArchError::UnknownNode(_)
                | ArchError::NotEditable(_)
                | ArchError::Unbreakable(_)
                | ArchError::InvalidOffset { .. }
        )
    }

    pub fn invalid_args(command: &str, message: impl Into<String>) -> Self {
        ArchError::InvalidArgs {
            command: command.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = ArchError> = std::result::Result<T, E>;
