//! 列统计信息（引擎侧）
//!
//! [`ColumnStatistics`] 是按类型区分的和类型，每个变体只携带该类型有意义的字段，
//! 可选字段为 `None` 即"未填充"。写入端用 [`StatisticsCollector`] 逐值累积，
//! [`TreeStatistics`] 对整棵类型树（每个列号一个 collector）做同样的事。

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::common::ColumnId;
use crate::field_type::{Datum, Decimal, TypeDescription, TypeKind};

// ── 统计记录 ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStatistics {
    pub has_null:         bool,
    /// 非 null 值个数
    pub number_of_values: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BooleanStatistics {
    pub base:        BaseStatistics,
    pub false_count: Option<u64>,
    pub true_count:  Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegerStatistics {
    pub base:    BaseStatistics,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    /// 溢出后不再填充
    pub sum:     Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoubleStatistics {
    pub base:    BaseStatistics,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub sum:     Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringStatistics {
    pub base:         BaseStatistics,
    pub minimum:      Option<String>,
    pub maximum:      Option<String>,
    pub total_length: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinaryStatistics {
    pub base:         BaseStatistics,
    pub total_length: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateStatistics {
    pub base:    BaseStatistics,
    /// 距 epoch 的天数
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
}

/// 所有时间字段均为 epoch 毫秒
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampStatistics {
    pub base:        BaseStatistics,
    pub minimum:     Option<i64>,
    pub maximum:     Option<i64>,
    pub lower_bound: Option<i64>,
    pub upper_bound: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecimalStatistics {
    pub base:    BaseStatistics,
    pub minimum: Option<Decimal>,
    pub maximum: Option<Decimal>,
    pub sum:     Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnStatistics {
    /// compound 类型只有基础字段
    Generic(BaseStatistics),
    Boolean(BooleanStatistics),
    Integer(IntegerStatistics),
    Double(DoubleStatistics),
    String(StringStatistics),
    Binary(BinaryStatistics),
    Date(DateStatistics),
    Timestamp(TimestampStatistics),
    Decimal(DecimalStatistics),
}

impl ColumnStatistics {
    pub fn base(&self) -> BaseStatistics {
        match self {
            Self::Generic(b)   => *b,
            Self::Boolean(s)   => s.base,
            Self::Integer(s)   => s.base,
            Self::Double(s)    => s.base,
            Self::String(s)    => s.base,
            Self::Binary(s)    => s.base,
            Self::Date(s)      => s.base,
            Self::Timestamp(s) => s.base,
            Self::Decimal(s)   => s.base,
        }
    }

    pub fn has_null(&self) -> bool { self.base().has_null }
    pub fn number_of_values(&self) -> u64 { self.base().number_of_values }
}

// ── StripeStatistics ──────────────────────────────────────────────────────────

/// 一个 stripe 的统计：stripe 级每列一条，row group 级每列每组一条
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeStatistics {
    pub column_statistics:    Vec<ColumnStatistics>,
    pub row_index_statistics: Vec<Vec<ColumnStatistics>>,
}

impl StripeStatistics {
    pub fn column_statistics(&self, column: ColumnId) -> Option<&ColumnStatistics> {
        self.column_statistics.get(column as usize)
    }

    pub fn number_of_row_index_stats(&self, column: ColumnId) -> usize {
        self.row_index_statistics.get(column as usize).map(Vec::len).unwrap_or(0)
    }

    pub fn row_index_statistics(&self, column: ColumnId, group: usize) -> Option<&ColumnStatistics> {
        self.row_index_statistics.get(column as usize).and_then(|g| g.get(group))
    }
}

// ── StatisticsCollector ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StatisticsCollector {
    kind:  TypeKind,
    stats: ColumnStatistics,
}

fn update_min_max<T: Clone>(min: &mut Option<T>, max: &mut Option<T>, v: &T, cmp: impl Fn(&T, &T) -> Ordering) {
    if min.as_ref().map(|m| cmp(v, m) == Ordering::Less).unwrap_or(true) {
        *min = Some(v.clone());
    }
    if max.as_ref().map(|m| cmp(v, m) == Ordering::Greater).unwrap_or(true) {
        *max = Some(v.clone());
    }
}

impl StatisticsCollector {
    pub fn new(kind: TypeKind) -> Self {
        use TypeKind as K;
        let stats = match kind {
            K::Boolean => ColumnStatistics::Boolean(BooleanStatistics {
                false_count: Some(0), true_count: Some(0), ..Default::default()
            }),
            K::Byte | K::Short | K::Int | K::Long => ColumnStatistics::Integer(IntegerStatistics {
                sum: Some(0), ..Default::default()
            }),
            K::Float | K::Double => ColumnStatistics::Double(DoubleStatistics {
                sum: Some(0.0), ..Default::default()
            }),
            K::String | K::Varchar | K::Char => ColumnStatistics::String(StringStatistics {
                total_length: Some(0), ..Default::default()
            }),
            K::Binary => ColumnStatistics::Binary(BinaryStatistics {
                total_length: Some(0), ..Default::default()
            }),
            K::Date => ColumnStatistics::Date(DateStatistics::default()),
            K::Timestamp | K::TimestampInstant => ColumnStatistics::Timestamp(TimestampStatistics::default()),
            K::Decimal => ColumnStatistics::Decimal(DecimalStatistics {
                sum: Some(Decimal::new(0, 0)), ..Default::default()
            }),
            K::List | K::Map | K::Struct | K::Union => ColumnStatistics::Generic(BaseStatistics::default()),
        };
        Self { kind, stats }
    }

    pub fn kind(&self) -> TypeKind { self.kind }

    pub fn update(&mut self, datum: &Datum) {
        if datum.is_null() {
            match &mut self.stats {
                ColumnStatistics::Generic(b) => b.has_null = true,
                ColumnStatistics::Boolean(s)   => s.base.has_null = true,
                ColumnStatistics::Integer(s)   => s.base.has_null = true,
                ColumnStatistics::Double(s)    => s.base.has_null = true,
                ColumnStatistics::String(s)    => s.base.has_null = true,
                ColumnStatistics::Binary(s)    => s.base.has_null = true,
                ColumnStatistics::Date(s)      => s.base.has_null = true,
                ColumnStatistics::Timestamp(s) => s.base.has_null = true,
                ColumnStatistics::Decimal(s)   => s.base.has_null = true,
            }
            return;
        }
        match (&mut self.stats, datum) {
            (ColumnStatistics::Generic(b), _) => b.number_of_values += 1,
            (ColumnStatistics::Boolean(s), Datum::Boolean(v)) => {
                s.base.number_of_values += 1;
                let slot = if *v { &mut s.true_count } else { &mut s.false_count };
                *slot = slot.map(|c| c + 1);
            }
            (ColumnStatistics::Integer(s), Datum::Long(v)) => {
                s.base.number_of_values += 1;
                update_min_max(&mut s.minimum, &mut s.maximum, v, |a, b| a.cmp(b));
                s.sum = s.sum.and_then(|acc| acc.checked_add(*v));
            }
            (ColumnStatistics::Double(s), Datum::Double(v)) => {
                s.base.number_of_values += 1;
                if !v.is_nan() {
                    update_min_max(&mut s.minimum, &mut s.maximum, v, |a, b| a.total_cmp(b));
                }
                s.sum = s.sum.map(|acc| acc + v);
            }
            (ColumnStatistics::String(s), Datum::Bytes(b)) => {
                s.base.number_of_values += 1;
                let text = String::from_utf8_lossy(b).into_owned();
                update_min_max(&mut s.minimum, &mut s.maximum, &text, |a, b| a.cmp(b));
                s.total_length = s.total_length.map(|t| t + b.len() as u64);
            }
            (ColumnStatistics::Binary(s), Datum::Bytes(b)) => {
                s.base.number_of_values += 1;
                s.total_length = s.total_length.map(|t| t + b.len() as u64);
            }
            (ColumnStatistics::Date(s), Datum::Date(days)) => {
                s.base.number_of_values += 1;
                update_min_max(&mut s.minimum, &mut s.maximum, days, |a, b| a.cmp(b));
            }
            (ColumnStatistics::Timestamp(s), ts @ Datum::Timestamp { nanos, .. }) => {
                s.base.number_of_values += 1;
                if let Some(millis) = ts.timestamp_millis() {
                    update_min_max(&mut s.minimum, &mut s.maximum, &millis, |a, b| a.cmp(b));
                    // 上界取毫秒向上取整，保证覆盖亚毫秒部分
                    let ceil = if nanos % 1_000_000 != 0 { millis.saturating_add(1) } else { millis };
                    s.lower_bound = s.minimum;
                    if s.upper_bound.map(|u| ceil > u).unwrap_or(true) {
                        s.upper_bound = Some(ceil);
                    }
                }
            }
            (ColumnStatistics::Decimal(s), Datum::Decimal(d)) => {
                s.base.number_of_values += 1;
                update_min_max(&mut s.minimum, &mut s.maximum, d, |a, b| a.compare(b));
                s.sum = s.sum.and_then(|acc| acc.checked_add(d));
            }
            // 类型不符的值在写入校验时已被拒绝
            _ => {}
        }
    }

    pub fn finish(&self) -> ColumnStatistics {
        let mut stats = self.stats.clone();
        // 没有任何非 null 值时，sum 一类的累积字段不算"已填充"
        if stats.number_of_values() == 0 {
            match &mut stats {
                ColumnStatistics::Integer(s) => s.sum = None,
                ColumnStatistics::Double(s)  => s.sum = None,
                ColumnStatistics::Decimal(s) => s.sum = None,
                _ => {}
            }
        }
        stats
    }
}

// ── TreeStatistics ────────────────────────────────────────────────────────────

/// 整棵类型树的统计，下标即列号
#[derive(Debug, Clone)]
pub struct TreeStatistics {
    collectors: Vec<StatisticsCollector>,
}

impl TreeStatistics {
    pub fn new(schema: &TypeDescription) -> Self {
        let mut kinds = vec![TypeKind::Struct; schema.maximum_column_id() as usize + 1];
        collect_kinds(schema, &mut kinds);
        Self { collectors: kinds.into_iter().map(StatisticsCollector::new).collect() }
    }

    pub fn update(&mut self, schema: &TypeDescription, row: &Datum) {
        let collectors = &mut self.collectors;
        schema.visit(row, &mut |ty, d| {
            if let Some(c) = collectors.get_mut(ty.column_id() as usize) {
                c.update(d);
            }
        });
    }

    pub fn finish(&self) -> Vec<ColumnStatistics> {
        self.collectors.iter().map(StatisticsCollector::finish).collect()
    }
}

fn collect_kinds(ty: &TypeDescription, kinds: &mut [TypeKind]) {
    if let Some(slot) = kinds.get_mut(ty.column_id() as usize) {
        *slot = ty.kind();
    }
    for child in ty.children() {
        collect_kinds(child, kinds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_statistics_track_min_max_sum() {
        let mut c = StatisticsCollector::new(TypeKind::Int);
        for d in [Datum::Long(5), Datum::Null, Datum::Long(-3), Datum::Long(10)] {
            c.update(&d);
        }
        let ColumnStatistics::Integer(s) = c.finish() else { panic!("integer stats expected") };
        assert!(s.base.has_null);
        assert_eq!(s.base.number_of_values, 3);
        assert_eq!((s.minimum, s.maximum, s.sum), (Some(-3), Some(10), Some(12)));
    }

    #[test]
    fn integer_sum_is_dropped_on_overflow() {
        let mut c = StatisticsCollector::new(TypeKind::Long);
        c.update(&Datum::Long(i64::MAX));
        c.update(&Datum::Long(1));
        let ColumnStatistics::Integer(s) = c.finish() else { panic!() };
        assert_eq!(s.sum, None);
        assert_eq!(s.maximum, Some(i64::MAX));
    }

    #[test]
    fn all_null_column_has_no_min_max_sum() {
        let mut c = StatisticsCollector::new(TypeKind::Double);
        c.update(&Datum::Null);
        c.update(&Datum::Null);
        let stats = c.finish();
        assert!(stats.has_null());
        assert_eq!(stats.number_of_values(), 0);
        let ColumnStatistics::Double(s) = stats else { panic!() };
        assert!(s.minimum.is_none() && s.maximum.is_none() && s.sum.is_none());
    }

    #[test]
    fn timestamp_bounds_round_outwards() {
        let mut c = StatisticsCollector::new(TypeKind::Timestamp);
        c.update(&Datum::Timestamp { seconds: 1, nanos: 500 });
        c.update(&Datum::Timestamp { seconds: 3, nanos: 2_000_001 });
        let ColumnStatistics::Timestamp(s) = c.finish() else { panic!() };
        assert_eq!(s.minimum, Some(1000));
        assert_eq!(s.maximum, Some(3002));
        assert_eq!(s.lower_bound, Some(1000));
        assert_eq!(s.upper_bound, Some(3003));
    }

    #[test]
    fn tree_statistics_cover_nested_columns() {
        let schema = TypeDescription::struct_of(vec![
            ("name", TypeDescription::primitive(TypeKind::String)),
            ("scores", TypeDescription::list_of(TypeDescription::primitive(TypeKind::Int))),
        ]);
        let mut tree = TreeStatistics::new(&schema);
        tree.update(&schema, &Datum::Struct(vec![
            Datum::string("ab"),
            Datum::List(vec![Datum::Long(1), Datum::Long(2)]),
        ]));
        tree.update(&schema, &Datum::Struct(vec![Datum::Null, Datum::Null]));
        let stats = tree.finish();
        assert_eq!(stats.len(), 4);
        assert_eq!(stats[0].number_of_values(), 2);
        assert_eq!(stats[1].number_of_values(), 1);
        assert!(stats[2].has_null());
        assert_eq!(stats[3].number_of_values(), 2);
        let ColumnStatistics::String(s) = &stats[1] else { panic!() };
        assert_eq!(s.total_length, Some(2));
    }
}
