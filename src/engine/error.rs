//! 存储引擎层错误

use std::io;

use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// 文件结构无法解析（magic、footer、截断等），与其它错误可区分
    #[error("{0}")]
    Parse(String),
    #[error("checksum mismatch: {0}")]
    Checksum(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    OutOfRange(String),
}

impl EngineError {
    pub fn parse(msg: impl Into<String>) -> Self { Self::Parse(msg.into()) }

    pub fn is_parse(&self) -> bool { matches!(self, Self::Parse(_)) }
}

impl From<bincode::Error> for EngineError {
    fn from(err: bincode::Error) -> Self {
        Self::Parse(format!("malformed metadata: {err}"))
    }
}
