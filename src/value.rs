//! 领域值（转换后的行值）

use chrono::{DateTime, NaiveDate, Utc};

use crate::field_type::Decimal;

/// 嵌套 struct 的物化形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructRepr {
    /// 按字段顺序的元组
    #[default]
    Tuple,
    /// (字段名, 值) 的有序映射
    Dict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Decimal(Decimal),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
    Record(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

    pub fn as_i64(&self) -> Option<i64> {
        match self { Self::Int(v) => Some(*v), _ => None }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v)   => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self { Self::String(s) => Some(s), _ => None }
    }

    /// Record 按字段名取字段
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Tuple / List / Record 按下标取值
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Tuple(items) | Self::List(items) => items.get(index),
            Self::Record(fields) => fields.get(index).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<u64> for Value {
    /// 统计计数：超过 i64 上限时饱和
    fn from(v: u64) -> Self { Self::Int(i64::try_from(v).unwrap_or(i64::MAX)) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Self::String(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Self::String(v) }
}
