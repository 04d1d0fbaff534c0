//! 类型树与批内原始值
//!
//! - [`TypeKind`]        — 文件格式的完整类型枚举（19 种）
//! - [`TypeDescription`] — 类型树，节点按先序编号为列号，根 struct 为 0
//! - [`Datum`]           — 批（RowBatch）中一个槽位的原始值，尚未转换为领域值
//! - [`Decimal`]         — 定点十进制（i128 非缩放值 + scale）

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::ColumnId;

// ── TypeKind ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeKind {
    Boolean          = 0,
    Byte             = 1,
    Short            = 2,
    Int              = 3,
    Long             = 4,
    Float            = 5,
    Double           = 6,
    String           = 7,
    Binary           = 8,
    Timestamp        = 9,
    List             = 10,
    Map              = 11,
    Struct           = 12,
    Union            = 13,
    Decimal          = 14,
    Date             = 15,
    Varchar          = 16,
    Char             = 17,
    TimestampInstant = 18,
}

impl TypeKind {
    pub const ALL: [TypeKind; 19] = [
        Self::Boolean, Self::Byte, Self::Short, Self::Int, Self::Long,
        Self::Float, Self::Double, Self::String, Self::Binary, Self::Timestamp,
        Self::List, Self::Map, Self::Struct, Self::Union, Self::Decimal,
        Self::Date, Self::Varchar, Self::Char, Self::TimestampInstant,
    ];

    pub fn code(self) -> u8 { self as u8 }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn is_compound(self) -> bool {
        matches!(self, Self::List | Self::Map | Self::Struct | Self::Union)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }

    pub fn is_string_like(self) -> bool {
        matches!(self, Self::String | Self::Varchar | Self::Char)
    }

    /// 原始编码不等于领域表示、必须经过转换器的类型
    pub fn needs_converter(self) -> bool {
        matches!(self, Self::Date | Self::Timestamp | Self::TimestampInstant | Self::Decimal)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean          => "boolean",
            Self::Byte             => "tinyint",
            Self::Short            => "smallint",
            Self::Int              => "int",
            Self::Long             => "bigint",
            Self::Float            => "float",
            Self::Double           => "double",
            Self::String           => "string",
            Self::Binary           => "binary",
            Self::Timestamp        => "timestamp",
            Self::List             => "array",
            Self::Map              => "map",
            Self::Struct           => "struct",
            Self::Union            => "uniontype",
            Self::Decimal          => "decimal",
            Self::Date             => "date",
            Self::Varchar          => "varchar",
            Self::Char             => "char",
            Self::TimestampInstant => "timestamp with local time zone",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── TypeDescription ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescription {
    kind:        TypeKind,
    column_id:   ColumnId,
    children:    Vec<TypeDescription>,
    /// 仅 struct 使用，与 children 一一对应
    field_names: Vec<String>,
    precision:   u32,
    scale:       u32,
    max_length:  u32,
}

impl TypeDescription {
    /// 原始类型节点；compound 类型请用 struct_of / list_of / map_of / union_of，
    /// 传入 compound 种类时得到空 struct
    pub fn primitive(kind: TypeKind) -> Self {
        if kind.is_compound() {
            return Self::compound(TypeKind::Struct, Vec::new(), Vec::new());
        }
        let (precision, scale) = if kind == TypeKind::Decimal { (38, 10) } else { (0, 0) };
        Self {
            kind, column_id: 0,
            children: Vec::new(), field_names: Vec::new(),
            precision, scale, max_length: 0,
        }
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        Self { precision, scale, ..Self::primitive(TypeKind::Decimal) }
    }

    pub fn varchar(max_length: u32) -> Self {
        Self { max_length, ..Self::primitive(TypeKind::Varchar) }
    }

    pub fn char(max_length: u32) -> Self {
        Self { max_length, ..Self::primitive(TypeKind::Char) }
    }

    pub fn struct_of<S: Into<String>>(fields: Vec<(S, TypeDescription)>) -> Self {
        let (field_names, children) = fields.into_iter()
            .map(|(name, ty)| (name.into(), ty))
            .unzip();
        Self::compound(TypeKind::Struct, children, field_names)
    }

    pub fn list_of(element: TypeDescription) -> Self {
        Self::compound(TypeKind::List, vec![element], Vec::new())
    }

    pub fn map_of(key: TypeDescription, value: TypeDescription) -> Self {
        Self::compound(TypeKind::Map, vec![key, value], Vec::new())
    }

    pub fn union_of(alternatives: Vec<TypeDescription>) -> Self {
        Self::compound(TypeKind::Union, alternatives, Vec::new())
    }

    fn compound(kind: TypeKind, children: Vec<TypeDescription>, field_names: Vec<String>) -> Self {
        let mut ty = Self {
            kind, column_id: 0, children, field_names,
            precision: 0, scale: 0, max_length: 0,
        };
        ty.assign_ids(0);
        ty
    }

    /// 先序编号，返回子树之后的下一个可用列号
    fn assign_ids(&mut self, next: ColumnId) -> ColumnId {
        self.column_id = next;
        let mut next = next + 1;
        for child in &mut self.children {
            next = child.assign_ids(next);
        }
        next
    }

    pub fn kind(&self) -> TypeKind { self.kind }
    pub fn column_id(&self) -> ColumnId { self.column_id }
    pub fn children(&self) -> &[TypeDescription] { &self.children }
    pub fn field_names(&self) -> &[String] { &self.field_names }
    pub fn precision(&self) -> u32 { self.precision }
    pub fn scale(&self) -> u32 { self.scale }
    pub fn max_length(&self) -> u32 { self.max_length }

    /// 子树中最大的列号
    pub fn maximum_column_id(&self) -> ColumnId {
        self.children.last()
            .map(|c| c.maximum_column_id())
            .unwrap_or(self.column_id)
    }

    /// 按列号查找子树节点
    pub fn find(&self, column_id: ColumnId) -> Option<&TypeDescription> {
        if column_id == self.column_id {
            return Some(self);
        }
        if column_id < self.column_id || column_id > self.maximum_column_id() {
            return None;
        }
        self.children.iter().find_map(|c| c.find(column_id))
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|n| n == name)
    }

    /// 只保留指定的顶层字段（保持 schema 顺序与原列号）
    pub fn select_fields(&self, indices: &[usize]) -> TypeDescription {
        let mut keep: Vec<usize> = indices.to_vec();
        keep.sort_unstable();
        keep.dedup();
        let mut out = Self { children: Vec::new(), field_names: Vec::new(), ..self.clone() };
        for i in keep {
            if let Some(child) = self.children.get(i) {
                out.children.push(child.clone());
                out.field_names.push(self.field_names.get(i).cloned().unwrap_or_default());
            }
        }
        out
    }

    /// 先序遍历 (节点, 值) 对；null 值不再下钻
    pub fn visit<'a, F>(&'a self, datum: &'a Datum, f: &mut F)
    where
        F: FnMut(&'a TypeDescription, &'a Datum),
    {
        f(self, datum);
        match (self.kind, datum) {
            (TypeKind::Struct, Datum::Struct(fields)) => {
                for (child, d) in self.children.iter().zip(fields) {
                    child.visit(d, f);
                }
            }
            (TypeKind::List, Datum::List(items)) => {
                if let Some(elem) = self.children.first() {
                    for d in items { elem.visit(d, f); }
                }
            }
            (TypeKind::Map, Datum::Map(entries)) => {
                if let [key_ty, val_ty] = self.children.as_slice() {
                    for (k, v) in entries {
                        key_ty.visit(k, f);
                        val_ty.visit(v, f);
                    }
                }
            }
            (TypeKind::Union, Datum::Union { tag, value }) => {
                if let Some(alt) = self.children.get(*tag as usize) {
                    alt.visit(value, f);
                }
            }
            _ => {}
        }
    }

    /// 值是否符合该类型（写入路径校验用）
    pub fn accepts(&self, datum: &Datum) -> bool {
        use TypeKind as K;
        match (self.kind, datum) {
            (_, Datum::Null) => true,
            (K::Boolean, Datum::Boolean(_)) => true,
            (k, Datum::Long(_)) if k.is_integer() => true,
            (K::Float | K::Double, Datum::Double(_)) => true,
            (K::Binary, Datum::Bytes(_)) => true,
            (k, Datum::Bytes(b)) if k.is_string_like() => std::str::from_utf8(b).is_ok(),
            (K::Date, Datum::Date(_)) => true,
            (K::Timestamp | K::TimestampInstant, Datum::Timestamp { nanos, .. }) => *nanos < 1_000_000_000,
            (K::Decimal, Datum::Decimal(_)) => true,
            (K::List, Datum::List(items)) => match self.children.first() {
                Some(elem) => items.iter().all(|d| elem.accepts(d)),
                None => false,
            },
            (K::Map, Datum::Map(entries)) => match self.children.as_slice() {
                [kt, vt] => entries.iter().all(|(k, v)| kt.accepts(k) && vt.accepts(v)),
                _ => false,
            },
            (K::Struct, Datum::Struct(fields)) => {
                fields.len() == self.children.len()
                    && self.children.iter().zip(fields).all(|(c, d)| c.accepts(d))
            }
            (K::Union, Datum::Union { tag, value }) => {
                self.children.get(*tag as usize).map(|c| c.accepts(value)).unwrap_or(false)
            }
            _ => false,
        }
    }
}

impl fmt::Display for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Struct => {
                f.write_str("struct<")?;
                for (i, (name, child)) in self.field_names.iter().zip(&self.children).enumerate() {
                    if i > 0 { f.write_str(",")?; }
                    write!(f, "{name}:{child}")?;
                }
                f.write_str(">")
            }
            TypeKind::List => match self.children.first() {
                Some(elem) => write!(f, "array<{elem}>"),
                None => f.write_str("array<>"),
            },
            TypeKind::Map => match self.children.as_slice() {
                [key, value] => write!(f, "map<{key},{value}>"),
                _ => f.write_str("map<>"),
            },
            TypeKind::Union => {
                f.write_str("uniontype<")?;
                for (i, child) in self.children.iter().enumerate() {
                    if i > 0 { f.write_str(",")?; }
                    write!(f, "{child}")?;
                }
                f.write_str(">")
            }
            TypeKind::Decimal => write!(f, "decimal({},{})", self.precision, self.scale),
            TypeKind::Varchar | TypeKind::Char => write!(f, "{}({})", self.kind, self.max_length),
            kind => write!(f, "{kind}"),
        }
    }
}

// ── Decimal ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("invalid decimal literal: {0:?}")]
pub struct ParseDecimalError(String);

/// 定点十进制：值 = unscaled × 10^-scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decimal {
    unscaled: i128,
    scale:    u32,
}

impl Decimal {
    pub fn new(unscaled: i128, scale: u32) -> Self { Self { unscaled, scale } }
    pub fn unscaled(&self) -> i128 { self.unscaled }
    pub fn scale(&self) -> u32 { self.scale }

    /// 放大到更大的 scale；溢出返回 None
    pub fn rescaled(&self, scale: u32) -> Option<i128> {
        if scale < self.scale { return None; }
        10i128.checked_pow(scale - self.scale)
            .and_then(|m| self.unscaled.checked_mul(m))
    }

    pub fn checked_add(&self, other: &Decimal) -> Option<Decimal> {
        let scale = self.scale.max(other.scale);
        let sum = self.rescaled(scale)?.checked_add(other.rescaled(scale)?)?;
        Some(Decimal::new(sum, scale))
    }

    pub fn compare(&self, other: &Decimal) -> Ordering {
        let scale = self.scale.max(other.scale);
        match (self.rescaled(scale), other.rescaled(scale)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.to_f64().partial_cmp(&other.to_f64()).unwrap_or(Ordering::Equal),
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.unscaled as f64 / 10f64.powi(self.scale as i32)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.unsigned_abs().to_string();
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || ParseDecimalError(s.to_string());
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let digits = format!("{int_part}{frac_part}");
        let magnitude: i128 = if digits.is_empty() { 0 } else { digits.parse().map_err(|_| err())? };
        let unscaled = if negative { -magnitude } else { magnitude };
        Ok(Decimal::new(unscaled, frac_part.len() as u32))
    }
}

// ── Datum ─────────────────────────────────────────────────────────────────────

/// 批中一个槽位的原始值
///
/// 整型统一为 i64，浮点统一为 f64，字符串与二进制统一为字节；
/// Date 为距 epoch 的天数，Timestamp 为秒 + 非负纳秒。
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Boolean(bool),
    Long(i64),
    Double(f64),
    Bytes(Vec<u8>),
    Date(i64),
    Timestamp { seconds: i64, nanos: u32 },
    Decimal(Decimal),
    List(Vec<Datum>),
    Map(Vec<(Datum, Datum)>),
    Struct(Vec<Datum>),
    Union { tag: u8, value: Box<Datum> },
}

impl Datum {
    pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

    pub fn string(s: &str) -> Self { Self::Bytes(s.as_bytes().to_vec()) }

    /// 向下取整到毫秒
    pub fn timestamp_millis(&self) -> Option<i64> {
        match self {
            Self::Timestamp { seconds, nanos } => {
                Some(seconds.saturating_mul(1000).saturating_add((*nanos / 1_000_000) as i64))
            }
            _ => None,
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self { Self::Long(v) }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self { Self::Double(v) }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self { Self::Boolean(v) }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self { Self::string(v) }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Self::Null) }
}

// ── 编码 / 压缩方式 ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodingType {
    /// 逐值带标签写出
    Direct,
    /// (run, value) 对，适合低基数或大量 null 的列
    RunLength,
}

impl EncodingType {
    pub fn code(self) -> u8 {
        match self { Self::Direct => 0, Self::RunLength => 1 }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code { 0 => Some(Self::Direct), 1 => Some(Self::RunLength), _ => None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Lz4,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> TypeDescription {
        TypeDescription::struct_of(vec![
            ("id",   TypeDescription::primitive(TypeKind::Long)),
            ("tags", TypeDescription::list_of(TypeDescription::primitive(TypeKind::String))),
            ("attrs", TypeDescription::map_of(
                TypeDescription::primitive(TypeKind::String),
                TypeDescription::primitive(TypeKind::Int),
            )),
            ("price", TypeDescription::decimal(10, 2)),
        ])
    }

    #[test]
    fn column_ids_are_preorder() {
        let schema = sample_schema();
        assert_eq!(schema.column_id(), 0);
        let ids: Vec<u32> = schema.children().iter().map(|c| c.column_id()).collect();
        assert_eq!(ids, vec![1, 2, 4, 7]);
        assert_eq!(schema.maximum_column_id(), 7);
        assert_eq!(schema.find(3).map(|t| t.kind()), Some(TypeKind::String));
        assert_eq!(schema.find(6).map(|t| t.kind()), Some(TypeKind::Int));
        assert!(schema.find(8).is_none());
    }

    #[test]
    fn renders_type_string() {
        assert_eq!(
            sample_schema().to_string(),
            "struct<id:bigint,tags:array<string>,attrs:map<string,int>,price:decimal(10,2)>"
        );
    }

    #[test]
    fn select_fields_keeps_column_ids() {
        let selected = sample_schema().select_fields(&[3, 0]);
        assert_eq!(selected.field_names(), &["id".to_string(), "price".to_string()]);
        assert_eq!(selected.children()[1].column_id(), 7);
    }

    #[test]
    fn accepts_checks_shape() {
        let schema = sample_schema();
        let good = Datum::Struct(vec![
            Datum::Long(1),
            Datum::List(vec![Datum::string("a"), Datum::Null]),
            Datum::Map(vec![(Datum::string("k"), Datum::Long(2))]),
            Datum::Decimal(Decimal::new(1234, 2)),
        ]);
        assert!(schema.accepts(&good));
        let bad = Datum::Struct(vec![Datum::string("x"), Datum::Null, Datum::Null, Datum::Null]);
        assert!(!schema.accepts(&bad));
        assert!(!schema.accepts(&Datum::Struct(vec![Datum::Long(1)])));
    }

    #[test]
    fn compound_kinds_need_children() {
        let fallback = TypeDescription::primitive(TypeKind::List);
        assert_eq!(fallback.kind(), TypeKind::Struct);
        assert_eq!(fallback.to_string(), "struct<>");
        assert!(fallback.accepts(&Datum::Struct(Vec::new())));

        // 从文件读到的残缺节点
        let list = TypeDescription { kind: TypeKind::List, ..TypeDescription::primitive(TypeKind::Int) };
        assert_eq!(list.to_string(), "array<>");
        assert!(!list.accepts(&Datum::List(vec![Datum::Long(1)])));
        let map = TypeDescription { kind: TypeKind::Map, ..TypeDescription::primitive(TypeKind::Int) };
        assert_eq!(map.to_string(), "map<>");
        assert!(!map.accepts(&Datum::Map(Vec::new())));
    }

    #[test]
    fn decimal_string_forms() {
        assert_eq!(Decimal::new(-12340, 3).to_string(), "-12.340");
        assert_eq!(Decimal::new(5, 3).to_string(), "0.005");
        assert_eq!(Decimal::new(42, 0).to_string(), "42");
        let parsed: Decimal = "-0.050".parse().unwrap();
        assert_eq!(parsed, Decimal::new(-50, 3));
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("".parse::<Decimal>().is_err());
    }

    #[test]
    fn decimal_compare_and_add_across_scales() {
        let a = Decimal::new(150, 2);
        let b = Decimal::new(15, 1);
        assert_eq!(a.compare(&b), Ordering::Equal);
        assert_eq!(a.checked_add(&Decimal::new(1, 0)), Some(Decimal::new(250, 2)));
    }

    #[test]
    fn timestamp_millis_floors() {
        let ts = Datum::Timestamp { seconds: -1, nanos: 999_999_999 };
        assert_eq!(ts.timestamp_millis(), Some(-1));
    }
}
