pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("format mismatch: {0}")]
    FormatMismatch(String),
    #[error("checksum mismatch: expected=0x{expected:08X}, actual=0x{actual:08X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("unsupported format version {0} (expected 200..=500)")]
    VersionUnsupported(u32),
    #[error("truncated data at offset 0x{offset:X}: need {wanted} more byte(s)")]
    TruncatedData { offset: usize, wanted: usize },
    #[error("malformed expression at offset 0x{offset:X}: {reason}")]
    MalformedExpression { offset: usize, reason: String },
    #[error("text cannot be represented in {encoding}: {text:?}")]
    Encoding { encoding: &'static str, text: String },
}

impl Error {
    pub(crate) fn truncated(offset: usize, wanted: usize) -> Self {
        Error::TruncatedData { offset, wanted }
    }

    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedExpression {
            offset,
            reason: reason.into(),
        }
    }
}
