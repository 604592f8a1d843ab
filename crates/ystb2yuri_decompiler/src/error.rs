#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DecompileError {
    #[error("unbalanced control flow at command {index}: {reason}")]
    UnbalancedControl { index: usize, reason: String },
    #[error("malformed expression at command {index}: {reason}")]
    MalformedExpression { index: usize, reason: String },
    #[error("command {index} references undefined variable {var}")]
    UndefinedVariable { index: usize, var: u16 },
    #[error("command {index}: {reason}")]
    TypeMismatch { index: usize, reason: String },
    #[error("unknown command code {0}")]
    UnknownCommand(u8),
    #[error(transparent)]
    Format(#[from] ystb_core::Error),
}

pub type Result<T> = std::result::Result<T, DecompileError>;
