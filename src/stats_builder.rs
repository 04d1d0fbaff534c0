//! 统计记录的统一形态
//!
//! 引擎给出的 [`ColumnStatistics`] 按类型各有字段；这里按列的类型种类查表取处理函数，
//! 产出统一的 [`StatisticsRecord`]：三个基础字段恒在，其余字段只在引擎填充时出现。
//! date / timestamp / decimal 的值经转换器表变成领域值。

use std::collections::BTreeMap;
use std::fmt;

use crate::common::Result;
use crate::convert::ConverterTable;
use crate::field_type::{Decimal, TypeDescription, TypeKind};
use crate::statistics::ColumnStatistics;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatisticsField {
    Minimum,
    Maximum,
    Sum,
    TotalLength,
    FalseCount,
    TrueCount,
    LowerBound,
    UpperBound,
}

impl StatisticsField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Minimum     => "minimum",
            Self::Maximum     => "maximum",
            Self::Sum         => "sum",
            Self::TotalLength => "total_length",
            Self::FalseCount  => "false_count",
            Self::TrueCount   => "true_count",
            Self::LowerBound  => "lower_bound",
            Self::UpperBound  => "upper_bound",
        }
    }
}

impl fmt::Display for StatisticsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRecord {
    pub kind:             TypeKind,
    pub has_null:         bool,
    pub number_of_values: u64,
    fields:               BTreeMap<StatisticsField, Value>,
}

impl StatisticsRecord {
    fn base(kind: TypeKind, stats: &ColumnStatistics) -> Self {
        let base = stats.base();
        Self {
            kind,
            has_null:         base.has_null,
            number_of_values: base.number_of_values,
            fields:           BTreeMap::new(),
        }
    }

    fn set(&mut self, field: StatisticsField, value: Option<Value>) {
        if let Some(v) = value {
            self.fields.insert(field, v);
        }
    }

    pub fn get(&self, field: StatisticsField) -> Option<&Value> { self.fields.get(&field) }
    pub fn contains(&self, field: StatisticsField) -> bool { self.fields.contains_key(&field) }

    pub fn minimum(&self) -> Option<&Value> { self.get(StatisticsField::Minimum) }
    pub fn maximum(&self) -> Option<&Value> { self.get(StatisticsField::Maximum) }
    pub fn sum(&self) -> Option<&Value> { self.get(StatisticsField::Sum) }

    /// 已填充的可选字段（按字段顺序）
    pub fn fields(&self) -> impl Iterator<Item = (StatisticsField, &Value)> + '_ {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}

// ── 按种类的处理函数 ──────────────────────────────────────────────────────────

type Handler = fn(&mut StatisticsRecord, &ColumnStatistics, &ConverterTable) -> Result<()>;

/// 按 [`TypeKind::code`] 索引；compound 类型只有基础字段
const HANDLERS: [Handler; 19] = [
    boolean_fields,   // Boolean
    integer_fields,   // Byte
    integer_fields,   // Short
    integer_fields,   // Int
    integer_fields,   // Long
    double_fields,    // Float
    double_fields,    // Double
    string_fields,    // String
    binary_fields,    // Binary
    timestamp_fields, // Timestamp
    base_only,        // List
    base_only,        // Map
    base_only,        // Struct
    base_only,        // Union
    decimal_fields,   // Decimal
    date_fields,      // Date
    string_fields,    // Varchar
    string_fields,    // Char
    timestamp_fields, // TimestampInstant
];

fn base_only(_: &mut StatisticsRecord, _: &ColumnStatistics, _: &ConverterTable) -> Result<()> {
    Ok(())
}

// 引擎记录与列类型不符时同样只保留基础字段

fn boolean_fields(rec: &mut StatisticsRecord, stats: &ColumnStatistics, _: &ConverterTable) -> Result<()> {
    let ColumnStatistics::Boolean(s) = stats else { return Ok(()) };
    rec.set(StatisticsField::FalseCount, s.false_count.map(Value::from));
    rec.set(StatisticsField::TrueCount, s.true_count.map(Value::from));
    Ok(())
}

fn integer_fields(rec: &mut StatisticsRecord, stats: &ColumnStatistics, _: &ConverterTable) -> Result<()> {
    let ColumnStatistics::Integer(s) = stats else { return Ok(()) };
    rec.set(StatisticsField::Minimum, s.minimum.map(Value::Int));
    rec.set(StatisticsField::Maximum, s.maximum.map(Value::Int));
    rec.set(StatisticsField::Sum, s.sum.map(Value::Int));
    Ok(())
}

fn double_fields(rec: &mut StatisticsRecord, stats: &ColumnStatistics, _: &ConverterTable) -> Result<()> {
    let ColumnStatistics::Double(s) = stats else { return Ok(()) };
    rec.set(StatisticsField::Minimum, s.minimum.map(Value::Float));
    rec.set(StatisticsField::Maximum, s.maximum.map(Value::Float));
    rec.set(StatisticsField::Sum, s.sum.map(Value::Float));
    Ok(())
}

fn string_fields(rec: &mut StatisticsRecord, stats: &ColumnStatistics, _: &ConverterTable) -> Result<()> {
    let ColumnStatistics::String(s) = stats else { return Ok(()) };
    rec.set(StatisticsField::Minimum, s.minimum.clone().map(Value::String));
    rec.set(StatisticsField::Maximum, s.maximum.clone().map(Value::String));
    rec.set(StatisticsField::TotalLength, s.total_length.map(Value::from));
    Ok(())
}

fn binary_fields(rec: &mut StatisticsRecord, stats: &ColumnStatistics, _: &ConverterTable) -> Result<()> {
    let ColumnStatistics::Binary(s) = stats else { return Ok(()) };
    rec.set(StatisticsField::TotalLength, s.total_length.map(Value::from));
    Ok(())
}

fn date_fields(rec: &mut StatisticsRecord, stats: &ColumnStatistics, conv: &ConverterTable) -> Result<()> {
    let ColumnStatistics::Date(s) = stats else { return Ok(()) };
    let kind = rec.kind;
    rec.set(StatisticsField::Minimum, s.minimum.map(|d| conv.convert_date(kind, d)).transpose()?);
    rec.set(StatisticsField::Maximum, s.maximum.map(|d| conv.convert_date(kind, d)).transpose()?);
    Ok(())
}

fn timestamp_fields(rec: &mut StatisticsRecord, stats: &ColumnStatistics, conv: &ConverterTable) -> Result<()> {
    let ColumnStatistics::Timestamp(s) = stats else { return Ok(()) };
    let kind = rec.kind;
    let convert = |ms: Option<i64>| ms.map(|ms| conv.convert_timestamp_millis(kind, ms)).transpose();
    rec.set(StatisticsField::Minimum, convert(s.minimum)?);
    rec.set(StatisticsField::Maximum, convert(s.maximum)?);
    rec.set(StatisticsField::LowerBound, convert(s.lower_bound)?);
    rec.set(StatisticsField::UpperBound, convert(s.upper_bound)?);
    Ok(())
}

fn decimal_fields(rec: &mut StatisticsRecord, stats: &ColumnStatistics, conv: &ConverterTable) -> Result<()> {
    let ColumnStatistics::Decimal(s) = stats else { return Ok(()) };
    let kind = rec.kind;
    let convert = |d: &Option<Decimal>| d.as_ref().map(|d| conv.convert_decimal(kind, d)).transpose();
    rec.set(StatisticsField::Minimum, convert(&s.minimum)?);
    rec.set(StatisticsField::Maximum, convert(&s.maximum)?);
    rec.set(StatisticsField::Sum, convert(&s.sum)?);
    Ok(())
}

/// 按列类型把引擎统计整理成统一记录
pub fn build_statistics(
    ty:         &TypeDescription,
    stats:      &ColumnStatistics,
    converters: &ConverterTable,
) -> Result<StatisticsRecord> {
    let mut record = StatisticsRecord::base(ty.kind(), stats);
    HANDLERS[ty.kind().code() as usize](&mut record, stats, converters)?;
    Ok(record)
}
