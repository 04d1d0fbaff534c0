//! 原始槽位 → 领域值
//!
//! [`ConverterTable`] 以类型种类为键保存 date / timestamp / decimal 的转换函数，
//! 可由调用方整体替换或逐项覆盖；[`RowConverter`] 按选中类型树把批中一行转换为 [`Value`]，
//! 每种类型的处理函数登记在按种类编号索引的表里。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::batch::RowBatch;
use crate::common::{ReaderError, Result};
use crate::field_type::{Datum, Decimal, TypeDescription, TypeKind};
use crate::value::{StructRepr, Value};

/// 1970-01-01 距公元 1 年 1 月 1 日的天数
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

// ── Converter ─────────────────────────────────────────────────────────────────

pub type DateFn      = dyn Fn(i64) -> Result<Value> + Send + Sync;
/// (seconds, nanoseconds)
pub type TimestampFn = dyn Fn(i64, i64) -> Result<Value> + Send + Sync;
/// 规范十进制字符串
pub type DecimalFn   = dyn Fn(&str) -> Result<Value> + Send + Sync;

#[derive(Clone)]
pub enum Converter {
    Date(Arc<DateFn>),
    Timestamp(Arc<TimestampFn>),
    Decimal(Arc<DecimalFn>),
}

impl Converter {
    pub fn date(f: impl Fn(i64) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self::Date(Arc::new(f))
    }

    pub fn timestamp(f: impl Fn(i64, i64) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self::Timestamp(Arc::new(f))
    }

    pub fn decimal(f: impl Fn(&str) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self::Decimal(Arc::new(f))
    }

    /// 该转换器能否登记在 `kind` 下
    pub fn serves(&self, kind: TypeKind) -> bool {
        match self {
            Self::Date(_)      => kind == TypeKind::Date,
            Self::Timestamp(_) => matches!(kind, TypeKind::Timestamp | TypeKind::TimestampInstant),
            Self::Decimal(_)   => kind == TypeKind::Decimal,
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Date(_)      => "Date",
            Self::Timestamp(_) => "Timestamp",
            Self::Decimal(_)   => "Decimal",
        };
        write!(f, "Converter::{name}(..)")
    }
}

/// 毫秒时间拆成 (秒, 纳秒)：秒向零截断，纳秒取余数的绝对值
pub fn split_timestamp_millis(millis: i64) -> (i64, i64) {
    (millis / 1000, (millis % 1000).abs() * 1_000_000)
}

fn default_date(days: i64) -> Result<Value> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(|d| i32::try_from(d).ok())
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .map(Value::Date)
        .ok_or_else(|| ReaderError::Conversion(format!("date {days} days from epoch is out of range")))
}

fn default_timestamp(seconds: i64, nanos: i64) -> Result<Value> {
    u32::try_from(nanos).ok()
        .and_then(|n| DateTime::<Utc>::from_timestamp(seconds, n))
        .map(Value::Timestamp)
        .ok_or_else(|| ReaderError::Conversion(format!("timestamp {seconds}s {nanos}ns is out of range")))
}

fn default_decimal(text: &str) -> Result<Value> {
    text.parse::<Decimal>()
        .map(Value::Decimal)
        .map_err(|e| ReaderError::Conversion(e.to_string()))
}

// ── ConverterTable ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ConverterTable {
    converters: HashMap<TypeKind, Converter>,
}

impl Default for ConverterTable {
    /// chrono 日期、UTC 时间戳与 [`Decimal`]
    fn default() -> Self {
        let mut converters = HashMap::new();
        converters.insert(TypeKind::Date, Converter::date(default_date));
        converters.insert(TypeKind::Timestamp, Converter::timestamp(default_timestamp));
        converters.insert(TypeKind::TimestampInstant, Converter::timestamp(default_timestamp));
        converters.insert(TypeKind::Decimal, Converter::decimal(default_decimal));
        Self { converters }
    }
}

impl fmt::Debug for ConverterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.converters.keys().collect();
        kinds.sort();
        f.debug_struct("ConverterTable").field("kinds", &kinds).finish()
    }
}

impl ConverterTable {
    pub fn empty() -> Self {
        Self { converters: HashMap::new() }
    }

    pub fn insert(&mut self, kind: TypeKind, converter: Converter) -> Result<()> {
        if !converter.serves(kind) {
            return Err(ReaderError::invalid_argument(format!(
                "{converter:?} cannot convert {kind} values"
            )));
        }
        self.converters.insert(kind, converter);
        Ok(())
    }

    /// 链式覆盖一项
    pub fn with(mut self, kind: TypeKind, converter: Converter) -> Result<Self> {
        self.insert(kind, converter)?;
        Ok(self)
    }

    pub fn get(&self, kind: TypeKind) -> Option<&Converter> {
        self.converters.get(&kind)
    }

    pub fn contains(&self, kind: TypeKind) -> bool {
        self.converters.contains_key(&kind)
    }

    /// 类型树中每个需要转换器的节点都必须有对应项
    pub fn validate(&self, ty: &TypeDescription) -> Result<()> {
        if ty.kind().needs_converter() && !self.contains(ty.kind()) {
            return Err(ReaderError::invalid_argument(format!(
                "no converter registered for {} (column {})", ty.kind(), ty.column_id()
            )));
        }
        ty.children().iter().try_for_each(|c| self.validate(c))
    }

    fn missing(kind: TypeKind) -> ReaderError {
        ReaderError::invalid_argument(format!("no converter registered for {kind}"))
    }

    pub fn convert_date(&self, kind: TypeKind, days: i64) -> Result<Value> {
        match self.get(kind) {
            Some(Converter::Date(f)) => f(days),
            _ => Err(Self::missing(kind)),
        }
    }

    pub fn convert_timestamp(&self, kind: TypeKind, seconds: i64, nanos: i64) -> Result<Value> {
        match self.get(kind) {
            Some(Converter::Timestamp(f)) => f(seconds, nanos),
            _ => Err(Self::missing(kind)),
        }
    }

    pub fn convert_timestamp_millis(&self, kind: TypeKind, millis: i64) -> Result<Value> {
        let (seconds, nanos) = split_timestamp_millis(millis);
        self.convert_timestamp(kind, seconds, nanos)
    }

    pub fn convert_decimal(&self, kind: TypeKind, value: &Decimal) -> Result<Value> {
        match self.get(kind) {
            Some(Converter::Decimal(f)) => f(&value.to_string()),
            _ => Err(Self::missing(kind)),
        }
    }
}

// ── RowConverter ──────────────────────────────────────────────────────────────

type Handler = fn(&RowConverter, &TypeDescription, &Datum) -> Result<Value>;

/// 按 [`TypeKind::code`] 索引
const HANDLERS: [Handler; 19] = [
    convert_boolean,   // Boolean
    convert_integer,   // Byte
    convert_integer,   // Short
    convert_integer,   // Int
    convert_integer,   // Long
    convert_float,     // Float
    convert_float,     // Double
    convert_string,    // String
    convert_binary,    // Binary
    convert_timestamp, // Timestamp
    convert_list,      // List
    convert_map,       // Map
    convert_struct,    // Struct
    convert_union,     // Union
    convert_decimal,   // Decimal
    convert_date,      // Date
    convert_string,    // Varchar
    convert_string,    // Char
    convert_timestamp, // TimestampInstant
];

fn mismatch(ty: &TypeDescription, datum: &Datum) -> ReaderError {
    ReaderError::Conversion(format!("column {} of type {ty} cannot hold {datum:?}", ty.column_id()))
}

fn convert_boolean(_: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    match d { Datum::Boolean(v) => Ok(Value::Bool(*v)), _ => Err(mismatch(ty, d)) }
}

fn convert_integer(_: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    match d { Datum::Long(v) => Ok(Value::Int(*v)), _ => Err(mismatch(ty, d)) }
}

fn convert_float(_: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    match d { Datum::Double(v) => Ok(Value::Float(*v)), _ => Err(mismatch(ty, d)) }
}

fn convert_string(_: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    match d {
        Datum::Bytes(b) => String::from_utf8(b.clone())
            .map(Value::String)
            .map_err(|e| ReaderError::Conversion(format!("column {}: {e}", ty.column_id()))),
        _ => Err(mismatch(ty, d)),
    }
}

fn convert_binary(_: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    match d { Datum::Bytes(b) => Ok(Value::Bytes(b.clone())), _ => Err(mismatch(ty, d)) }
}

fn convert_date(conv: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    match d { Datum::Date(days) => conv.table.convert_date(ty.kind(), *days), _ => Err(mismatch(ty, d)) }
}

fn convert_timestamp(conv: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    match d {
        Datum::Timestamp { seconds, nanos } => conv.table.convert_timestamp(ty.kind(), *seconds, *nanos as i64),
        _ => Err(mismatch(ty, d)),
    }
}

fn convert_decimal(conv: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    match d { Datum::Decimal(v) => conv.table.convert_decimal(ty.kind(), v), _ => Err(mismatch(ty, d)) }
}

fn convert_list(conv: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    let (Datum::List(items), Some(elem)) = (d, ty.children().first()) else {
        return Err(mismatch(ty, d));
    };
    items.iter().map(|item| conv.convert(elem, item)).collect::<Result<Vec<_>>>().map(Value::List)
}

fn convert_map(conv: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    let (Datum::Map(entries), [key_ty, val_ty]) = (d, ty.children()) else {
        return Err(mismatch(ty, d));
    };
    entries.iter()
        .map(|(k, v)| Ok((conv.convert(key_ty, k)?, conv.convert(val_ty, v)?)))
        .collect::<Result<Vec<_>>>()
        .map(Value::Map)
}

fn convert_struct(conv: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    let Datum::Struct(fields) = d else {
        return Err(mismatch(ty, d));
    };
    if fields.len() != ty.children().len() {
        return Err(mismatch(ty, d));
    }
    let values = ty.children().iter().zip(fields)
        .map(|(child, f)| conv.convert(child, f))
        .collect::<Result<Vec<_>>>()?;
    Ok(conv.shape_struct(ty, values))
}

fn convert_union(conv: &RowConverter, ty: &TypeDescription, d: &Datum) -> Result<Value> {
    match d {
        Datum::Union { tag, value } => match ty.children().get(*tag as usize) {
            Some(alt) => conv.convert(alt, value),
            None => Err(mismatch(ty, d)),
        },
        _ => Err(mismatch(ty, d)),
    }
}

/// 把批中一行转换为领域值；root 为选中的 struct 类型
#[derive(Debug, Clone)]
pub struct RowConverter {
    ty:    TypeDescription,
    table: ConverterTable,
    repr:  StructRepr,
}

impl RowConverter {
    pub fn new(ty: TypeDescription, table: ConverterTable, repr: StructRepr) -> Result<Self> {
        table.validate(&ty)?;
        Ok(Self { ty, table, repr })
    }

    pub fn type_description(&self) -> &TypeDescription { &self.ty }
    pub fn table(&self) -> &ConverterTable { &self.table }
    pub fn struct_repr(&self) -> StructRepr { self.repr }

    pub fn convert(&self, ty: &TypeDescription, datum: &Datum) -> Result<Value> {
        if datum.is_null() {
            return Ok(Value::Null);
        }
        HANDLERS[ty.kind().code() as usize](self, ty, datum)
    }

    fn shape_struct(&self, ty: &TypeDescription, values: Vec<Value>) -> Value {
        match self.repr {
            StructRepr::Tuple => Value::Tuple(values),
            StructRepr::Dict  => Value::Record(ty.field_names().iter().cloned().zip(values).collect()),
        }
    }

    /// 批中第 `row` 行；每个选中字段占一列
    pub fn convert_row(&self, batch: &RowBatch, row: usize) -> Result<Value> {
        let values = self.ty.children().iter().enumerate()
            .map(|(i, child)| {
                let slot = batch.slot(i, row).ok_or_else(|| {
                    ReaderError::Conversion(format!("batch has no slot for field {i} row {row}"))
                })?;
                self.convert(child, slot)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.shape_struct(&self.ty, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn schema() -> TypeDescription {
        TypeDescription::struct_of(vec![
            ("day",  TypeDescription::primitive(TypeKind::Date)),
            ("at",   TypeDescription::primitive(TypeKind::Timestamp)),
            ("cost", TypeDescription::decimal(10, 2)),
            ("meta", TypeDescription::struct_of(vec![
                ("ok", TypeDescription::primitive(TypeKind::Boolean)),
            ])),
        ])
    }

    fn batch() -> RowBatch {
        let mut batch = RowBatch::new(2, 4);
        let day  = [Datum::Date(19_000), Datum::Null];
        let at   = [Datum::Timestamp { seconds: 86_400, nanos: 250_000_000 }, Datum::Null];
        let cost = [Datum::Decimal(Decimal::new(1999, 2)), Datum::Null];
        let meta = [Datum::Struct(vec![Datum::Boolean(true)]), Datum::Null];
        batch.fill_from(&[&day[..], &at[..], &cost[..], &meta[..]], 2);
        batch
    }

    #[test]
    fn millis_split_keeps_remainder_magnitude() {
        assert_eq!(split_timestamp_millis(-500), (0, 500_000_000));
        assert_eq!(split_timestamp_millis(-1500), (-1, 500_000_000));
        assert_eq!(split_timestamp_millis(1_234), (1, 234_000_000));
    }

    #[test]
    fn default_converters_build_chrono_values() {
        let conv = RowConverter::new(schema(), ConverterTable::default(), StructRepr::Tuple).unwrap();
        let row = conv.convert_row(&batch(), 0).unwrap();
        let Some(Value::Date(day)) = row.get(0) else { panic!("date expected: {row:?}") };
        assert_eq!((day.year(), day.month(), day.day()), (2022, 1, 8));
        let Some(Value::Timestamp(at)) = row.get(1) else { panic!() };
        assert_eq!((at.day(), at.nanosecond()), (2, 250_000_000));
        assert_eq!(row.get(2), Some(&Value::Decimal(Decimal::new(1999, 2))));
        assert_eq!(row.get(3), Some(&Value::Tuple(vec![Value::Bool(true)])));
    }

    #[test]
    fn dict_repr_names_fields_and_nulls_pass_through() {
        let conv = RowConverter::new(schema(), ConverterTable::default(), StructRepr::Dict).unwrap();
        let row = conv.convert_row(&batch(), 1).unwrap();
        assert_eq!(row.field("day"), Some(&Value::Null));
        assert_eq!(row.field("meta"), Some(&Value::Null));
    }

    #[test]
    fn custom_decimal_converter_sees_canonical_string() {
        let table = ConverterTable::default()
            .with(TypeKind::Decimal, Converter::decimal(|s| Ok(Value::String(s.to_string()))))
            .unwrap();
        let conv = RowConverter::new(schema(), table, StructRepr::Tuple).unwrap();
        let row = conv.convert_row(&batch(), 0).unwrap();
        assert_eq!(row.get(2), Some(&Value::from("19.99")));
    }

    #[test]
    fn missing_or_misplaced_converters_fail_fast() {
        let err = RowConverter::new(schema(), ConverterTable::empty(), StructRepr::Tuple).unwrap_err();
        assert!(err.is_invalid_argument());
        let err = ConverterTable::default()
            .with(TypeKind::Date, Converter::decimal(|_| Ok(Value::Null)))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn out_of_range_dates_are_conversion_errors() {
        let table = ConverterTable::default();
        for days in [i64::MAX, i64::MIN, i64::from(i32::MAX)] {
            let err = table.convert_date(TypeKind::Date, days).unwrap_err();
            assert!(matches!(err, ReaderError::Conversion(_)), "{days}: {err}");
        }
    }

    #[test]
    fn struct_arity_must_match_type() {
        let conv = RowConverter::new(schema(), ConverterTable::default(), StructRepr::Tuple).unwrap();
        let meta = schema().children()[3].clone();
        for fields in [Vec::new(), vec![Datum::Boolean(true), Datum::Boolean(false)]] {
            let err = conv.convert(&meta, &Datum::Struct(fields)).unwrap_err();
            assert!(matches!(err, ReaderError::Conversion(_)), "{err}");
        }
        assert_eq!(
            conv.convert(&meta, &Datum::Struct(vec![Datum::Boolean(false)])).unwrap(),
            Value::Tuple(vec![Value::Bool(false)])
        );
    }
}
