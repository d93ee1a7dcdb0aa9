use super::expression::ExpressionError;
use super::repository::RepositoryError;

/// Error raised by every engine operation. Each variant maps to one [`ErrorKind`].
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("attribute `{attribute}` is hidden by an unsatisfied dependency")]
    DependencyUnsatisfied { attribute: String },
    #[error("attribute `{attribute}` is read-only")]
    ReadOnlyAttribute { attribute: String },
    #[error("expression `{expression}` failed: {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: ExpressionError,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Tag callers use to map failures onto distinct status signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    DependencyUnsatisfied,
    ReadOnlyAttribute,
    Evaluation,
    Storage,
}

impl RuleError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn evaluation(expression: impl Into<String>, source: ExpressionError) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            source,
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            RuleError::NotFound { .. } => ErrorKind::NotFound,
            RuleError::Validation(_) => ErrorKind::Validation,
            RuleError::DependencyUnsatisfied { .. } => ErrorKind::DependencyUnsatisfied,
            RuleError::ReadOnlyAttribute { .. } => ErrorKind::ReadOnlyAttribute,
            RuleError::Evaluation { .. } => ErrorKind::Evaluation,
            RuleError::Repository(_) => ErrorKind::Storage,
        }
    }
}
