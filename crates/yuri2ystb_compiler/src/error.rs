use crate::syntax::SyntaxError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ErrorKind {
    #[error("duplicate declaration of `{0}`")]
    DuplicateDeclaration(String),
    #[error("scope violation: {0}")]
    ScopeViolation(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("undefined reference to `{0}`")]
    UndefinedReference(String),
    #[error("malformed expression: {0}")]
    MalformedExpression(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("command `{command}` has no argument `{arg}`")]
    UnknownArgument { command: String, arg: String },
    #[error("array index is not an integer: {0}")]
    NonIntegerIndex(String),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error(transparent)]
    Format(#[from] ystb_core::Error),
}

/// A failure compiling one source file; fatal to that file only.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{file}:{line}: {kind}")]
pub struct CompileError {
    pub file: String,
    pub line: u32,
    pub kind: ErrorKind,
}

impl CompileError {
    pub fn new(file: impl Into<String>, line: u32, kind: ErrorKind) -> Self {
        Self {
            file: file.into(),
            line,
            kind,
        }
    }

    pub fn syntax(file: impl Into<String>, err: SyntaxError) -> Self {
        Self::new(file, err.line, ErrorKind::Syntax(err.message))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("{file}: unresolved reference to `{name}`")]
    Unresolved { file: String, name: String },
    #[error("{file}: reference offset 0x{offset:X} lies outside the expression data")]
    OffsetOutOfRange { file: String, offset: usize },
    #[error("variable index space exhausted ({0} variables)")]
    IndexOverflow(usize),
    #[error(transparent)]
    Format(#[from] ystb_core::Error),
}

/// Every file that failed to compile in one build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildFailure {
    pub errors: Vec<CompileError>,
}

impl std::fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} file(s) failed to compile", self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n  {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildFailure {}
