use thiserror::Error;

/// Errors produced while deriving identities, building the lookup index
/// or merging posts into the feature repository.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Missing '{0}' property")]
    MissingField(String),

    #[error("Failed to parse timestamp '{value}': no known layout matches")]
    TimestampParse { value: String },

    #[error("{context}")]
    Collaborator {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Media identity {media_id} already maps to {existing}, also claimed by {incoming}")]
    IdentityCollision {
        media_id: String,
        existing: i64,
        incoming: i64,
    },

    #[error("Invalid JSON")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to hash {path}: {reason}")]
    Hash { path: String, reason: String },

    #[error("{step} failed")]
    Step {
        step: &'static str,
        #[source]
        source: Box<PublishError>,
    },
}

pub type Result<T> = std::result::Result<T, PublishError>;

impl PublishError {
    pub fn missing(field: impl Into<String>) -> Self {
        PublishError::MissingField(field.into())
    }

    pub fn collaborator(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        PublishError::Collaborator {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Wrap an error with the name of the publish step that produced it.
    pub fn at_step(self, step: &'static str) -> Self {
        PublishError::Step {
            step,
            source: Box::new(self),
        }
    }

    /// The innermost error, with any step wrappers peeled off.
    pub fn root(&self) -> &PublishError {
        match self {
            PublishError::Step { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_missing_field(&self) -> bool {
        matches!(self.root(), PublishError::MissingField(_))
    }
}
