use thiserror::Error;

pub type MhtmlResult<T> = Result<T, MhtmlError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MhtmlError {
    #[error("Expression error in <{directive}> attribute '{attribute}': {source}")]
    Expression {
        directive: String,
        attribute: String,
        source: EvalError,
    },

    #[error("Interpolation error in <{directive}>: {source}")]
    Interpolation { directive: String, source: EvalError },

    #[error("Invalid <{directive}> directive: {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("Maximum nesting depth ({max_depth}) exceeded")]
    MaxNestingDepthExceeded { max_depth: usize },

    #[error("Markup parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_yaml::Error> for MhtmlError {
    fn from(err: serde_yaml::Error) -> Self {
        MhtmlError::Config(err.to_string())
    }
}

impl From<std::io::Error> for MhtmlError {
    fn from(err: std::io::Error) -> Self {
        MhtmlError::Io(err.to_string())
    }
}

/// Failure while parsing or evaluating a single expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Syntax error in expression '{expression}' at offset {offset}: {message}")]
    Syntax {
        expression: String,
        offset: usize,
        message: String,
    },

    #[error("'{name}' is not defined")]
    UndefinedVariable { name: String },

    #[error("Cannot read property '{property}' of {receiver}")]
    PropertyOfNothing { property: String, receiver: String },

    #[error("'{method}' is not a function on {receiver}")]
    UnknownMethod { method: String, receiver: String },

    #[error("Expression is not callable: only method calls are supported")]
    NotCallable,

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Arithmetic produced a non-finite number")]
    NonFinite,
}
