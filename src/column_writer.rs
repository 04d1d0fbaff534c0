//! 列写入器
//!
//! 一个 stripe 内：
//!   - [`ColumnWriter`]：每个顶层字段一个，缓冲本 stripe 的值，flush 时产出一页
//!   - [`IndexBuilder`]：按 row group 累积每个列号的统计与 bloom filter，
//!     stripe 结束时产出 [`StripeIndex`]

use std::collections::BTreeMap;

use crate::common::ColumnId;
use crate::engine::{EngineResult, StripeIndex};
use crate::field_type::{CompressionType, Datum, EncodingType, TypeDescription};
use crate::index::{BloomFilter, BloomFilterIndex};
use crate::page::PageBuilder;
use crate::statistics::{ColumnStatistics, TreeStatistics};

// ── ColumnWriter ──────────────────────────────────────────────────────────────

pub struct ColumnWriter {
    /// 顶层字段下标
    pub field:   usize,
    values:      Vec<Datum>,
}

impl ColumnWriter {
    pub fn new(field: usize) -> Self {
        Self { field, values: Vec::new() }
    }

    pub fn add_value(&mut self, value: Datum) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// 把缓冲的值写成一页并清空缓冲
    pub fn flush(
        &mut self,
        first_row:   u64,
        encoding:    EncodingType,
        compression: CompressionType,
        block_size:  usize,
    ) -> EngineResult<Vec<u8>> {
        let mut page = PageBuilder::new(first_row, encoding, compression, block_size);
        page.extend(self.values.drain(..));
        page.build()
    }
}

// ── IndexBuilder ──────────────────────────────────────────────────────────────

pub struct IndexBuilder {
    stride:        usize,
    fpp:           f64,
    group_rows:    usize,
    group_stats:   TreeStatistics,
    /// 已完成的 row group，下标为列号
    groups:        Vec<Vec<ColumnStatistics>>,
    /// 开启 bloom 的列：(当前组, 已完成的组)
    blooms:        BTreeMap<ColumnId, (BloomFilter, Vec<BloomFilter>)>,
}

impl IndexBuilder {
    pub fn new(schema: &TypeDescription, stride: usize, bloom_columns: &[ColumnId], fpp: f64) -> Self {
        let blooms = bloom_columns.iter()
            .map(|&c| (c, (BloomFilter::new(stride, fpp), Vec::new())))
            .collect();
        Self {
            stride, fpp,
            group_rows:  0,
            group_stats: TreeStatistics::new(schema),
            groups:      Vec::new(),
            blooms,
        }
    }

    /// `row` 为整行的 struct 值
    pub fn add_row(&mut self, schema: &TypeDescription, row: &Datum) {
        self.group_stats.update(schema, row);
        if !self.blooms.is_empty() {
            let blooms = &mut self.blooms;
            schema.visit(row, &mut |ty, d| {
                if let Some((current, _)) = blooms.get_mut(&ty.column_id()) {
                    current.add_datum(d);
                }
            });
        }
        self.group_rows += 1;
        if self.group_rows == self.stride {
            self.close_group(schema);
        }
    }

    fn close_group(&mut self, schema: &TypeDescription) {
        let stats = std::mem::replace(&mut self.group_stats, TreeStatistics::new(schema));
        self.groups.push(stats.finish());
        for (current, done) in self.blooms.values_mut() {
            done.push(std::mem::replace(current, BloomFilter::new(self.stride, self.fpp)));
        }
        self.group_rows = 0;
    }

    /// 收尾当前 stripe（含未满的最后一组），按列号转置为索引
    pub fn finish_stripe(&mut self, schema: &TypeDescription) -> StripeIndex {
        if self.group_rows > 0 {
            self.close_group(schema);
        }
        let num_columns = schema.maximum_column_id() as usize + 1;
        let mut row_index_statistics: Vec<Vec<ColumnStatistics>> = vec![Vec::new(); num_columns];
        for group in self.groups.drain(..) {
            for (column, stats) in group.into_iter().enumerate() {
                row_index_statistics[column].push(stats);
            }
        }
        let bloom_filters = self.blooms.iter_mut()
            .map(|(&c, (_, done))| (c, BloomFilterIndex { entries: std::mem::take(done) }))
            .collect();
        StripeIndex { row_index_statistics, bloom_filters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::TypeKind;

    fn schema() -> TypeDescription {
        TypeDescription::struct_of(vec![
            ("id",   TypeDescription::primitive(TypeKind::Long)),
            ("name", TypeDescription::primitive(TypeKind::String)),
        ])
    }

    #[test]
    fn row_groups_follow_stride() {
        let schema = schema();
        let mut builder = IndexBuilder::new(&schema, 4, &[2], 0.05);
        for i in 0..10i64 {
            let row = Datum::Struct(vec![Datum::Long(i), Datum::string(&format!("n{i}"))]);
            builder.add_row(&schema, &row);
        }
        let index = builder.finish_stripe(&schema);
        assert_eq!(index.row_index_statistics.len(), 3);
        assert_eq!(index.row_index_statistics[1].len(), 3);
        assert_eq!(index.row_index_statistics[1][2].number_of_values(), 2);
        let ColumnStatistics::Integer(s) = &index.row_index_statistics[1][1] else { panic!() };
        assert_eq!((s.minimum, s.maximum), (Some(4), Some(7)));

        let bloom = &index.bloom_filters[&2];
        assert_eq!(bloom.len(), 3);
        assert!(bloom.entries[0].test_bytes(b"n3"));
        assert!(bloom.entries[2].test_bytes(b"n9"));
        assert!(!index.bloom_filters.contains_key(&1));
    }

    #[test]
    fn column_writer_flushes_into_a_page() {
        let mut col = ColumnWriter::new(0);
        col.add_value(Datum::Long(7));
        col.add_value(Datum::Null);
        let page = col.flush(100, EncodingType::RunLength, CompressionType::None, 1024).unwrap();
        assert!(col.is_empty());
        let decoded = crate::page::PageDecoder::decode(&page, CompressionType::None).unwrap();
        assert_eq!(decoded.first_row, 100);
        assert_eq!(decoded.values, vec![Datum::Long(7), Datum::Null]);
    }
}
