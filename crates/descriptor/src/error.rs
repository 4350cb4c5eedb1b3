use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unexpected byte 0x{byte:02x} at offset {offset}")]
    UnexpectedByte { byte: u8, offset: usize },

    #[error("invalid integer ending at offset {0}")]
    InvalidInteger(usize),

    #[error("invalid string length at offset {0}")]
    InvalidLength(usize),

    #[error("trailing data after offset {0}")]
    TrailingData(usize),

    #[error("nesting too deep")]
    TooDeep,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, DescriptorError>;
