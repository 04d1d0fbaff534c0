//! 全局基础类型与错误定义

use thiserror::Error;

use crate::engine::EngineError;

// ── ID 类型别名 ───────────────────────────────────────────────────────────────

/// 类型树中的列号（先序编号，根 struct 为 0）
pub type ColumnId = u32;

// ── 错误 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("conversion failed: {0}")]
    Conversion(String),
    #[error(transparent)]
    Engine(EngineError),
}

impl ReaderError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange(_))
    }
}

/// 引擎的格式错误统一按 InvalidArgument 上报，携带引擎原始信息
impl From<EngineError> for ReaderError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Parse(msg)           => Self::InvalidArgument(msg),
            EngineError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            EngineError::OutOfRange(msg)      => Self::OutOfRange(msg),
            other                             => Self::Engine(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_surface_as_invalid_argument() {
        let err: ReaderError = EngineError::Parse("bad magic".into()).into();
        assert!(err.is_invalid_argument());
        assert_eq!(err.to_string(), "invalid argument: bad magic");
    }

    #[test]
    fn engine_out_of_range_keeps_its_class() {
        let err: ReaderError = EngineError::OutOfRange("stripe 9".into()).into();
        assert!(err.is_out_of_range());
    }

    #[test]
    fn other_engine_errors_are_wrapped() {
        let err: ReaderError = EngineError::Checksum("page".into()).into();
        assert!(matches!(err, ReaderError::Engine(EngineError::Checksum(_))));
    }
}
