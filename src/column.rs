//! 单列句柄与跨 stripe 的 bloom filter 汇总

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::common::{ColumnId, ReaderError, Result};
use crate::convert::ConverterTable;
use crate::engine::ColumnarFile;
use crate::field_type::{Datum, TypeDescription};
use crate::index::BloomFilter;
use crate::stats_builder::{build_statistics, StatisticsRecord};

// ── BloomFilterSet ────────────────────────────────────────────────────────────

/// 一列的 bloom 条目，按 stripe 顺序拼接，不去重
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BloomFilterSet {
    entries: Vec<BloomFilter>,
}

impl BloomFilterSet {
    pub fn entries(&self) -> &[BloomFilter] { &self.entries }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, BloomFilter> { self.entries.iter() }

    /// 没有条目时无法排除，返回 true
    pub fn may_contain(&self, value: &Datum) -> bool {
        self.entries.is_empty() || self.entries.iter().any(|bf| bf.test_datum(value))
    }
}

impl<'a> IntoIterator for &'a BloomFilterSet {
    type Item = &'a BloomFilter;
    type IntoIter = std::slice::Iter<'a, BloomFilter>;

    fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

/// 逐个 stripe 查询 `column` 的 bloom filter 并按顺序拼接
pub fn collect_bloom_filters(
    file:    &dyn ColumnarFile,
    stripes: impl IntoIterator<Item = usize>,
    column:  ColumnId,
) -> Result<BloomFilterSet> {
    let wanted = BTreeSet::from([column]);
    let mut entries = Vec::new();
    for stripe in stripes {
        if let Some(index) = file.bloom_filters(stripe, &wanted)?.remove(&column) {
            entries.extend(index.entries);
        }
    }
    Ok(BloomFilterSet { entries })
}

// ── Column ────────────────────────────────────────────────────────────────────

/// 列句柄所属的范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnScope {
    File,
    Stripe(usize),
}

pub struct Column {
    file:          Arc<dyn ColumnarFile>,
    scope:         ColumnScope,
    index:         ColumnId,
    ty:            TypeDescription,
    converters:    ConverterTable,
    bloom_filters: BloomFilterSet,
}

impl Column {
    pub(crate) fn new(
        file:       Arc<dyn ColumnarFile>,
        scope:      ColumnScope,
        index:      ColumnId,
        converters: ConverterTable,
    ) -> Result<Self> {
        let ty = file.schema().find(index).cloned().ok_or_else(|| {
            ReaderError::out_of_range(format!(
                "column index {index} out of range (max {})", file.schema().maximum_column_id()
            ))
        })?;
        let bloom_filters = match scope {
            ColumnScope::File => collect_bloom_filters(file.as_ref(), 0..file.number_of_stripes(), index)?,
            ColumnScope::Stripe(s) => collect_bloom_filters(file.as_ref(), [s], index)?,
        };
        debug!(column = index, ?scope, entries = bloom_filters.len(), "created column handle");
        Ok(Self { file, scope, index, ty, converters, bloom_filters })
    }

    pub fn index(&self) -> ColumnId { self.index }
    pub fn scope(&self) -> ColumnScope { self.scope }
    pub fn type_description(&self) -> &TypeDescription { &self.ty }
    pub fn bloom_filters(&self) -> &BloomFilterSet { &self.bloom_filters }

    /// 文件范围为一条文件级记录；stripe 范围为每个 row group 一条
    pub fn statistics(&self) -> Result<Vec<StatisticsRecord>> {
        match self.scope {
            ColumnScope::File => {
                let stats = self.file.column_statistics(self.index)?;
                Ok(vec![build_statistics(&self.ty, &stats, &self.converters)?])
            }
            ColumnScope::Stripe(s) => {
                let stats = self.file.stripe_statistics(s)?;
                (0..stats.number_of_row_index_stats(self.index))
                    .filter_map(|g| stats.row_index_statistics(self.index, g))
                    .map(|st| build_statistics(&self.ty, st, &self.converters))
                    .collect()
            }
        }
    }

    /// 只有存在 bloom 条目且全部排除该值时返回 false
    pub fn may_contain(&self, value: &Datum) -> bool {
        self.bloom_filters.may_contain(value)
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("scope", &self.scope)
            .field("index", &self.index)
            .field("type", &self.ty.to_string())
            .field("bloom_filters", &self.bloom_filters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::engine::{
        EngineError, EngineResult, FileMetadata, RowStream, RowStreamOptions, StripeInformation,
    };
    use crate::field_type::{CompressionType, TypeKind};
    use crate::index::BloomFilterIndex;
    use crate::statistics::{BaseStatistics, ColumnStatistics, StripeStatistics};

    /// 三个 stripe，列 2 只在 stripe 0 和 2 带 bloom filter
    struct MockFile {
        schema:   TypeDescription,
        metadata: FileMetadata,
        blooms:   Vec<Option<BloomFilterIndex>>,
    }

    fn filter_with(values: &[&str]) -> BloomFilter {
        let mut bf = BloomFilter::new(16, 0.01);
        for v in values {
            bf.add_bytes(v.as_bytes());
        }
        bf
    }

    impl MockFile {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                schema: TypeDescription::struct_of(vec![
                    ("id",  TypeDescription::primitive(TypeKind::Int)),
                    ("tag", TypeDescription::primitive(TypeKind::String)),
                ]),
                metadata: FileMetadata {
                    compression: CompressionType::None,
                    compression_block_size: 0,
                    row_index_stride: 0,
                    writer: "mock".into(),
                    user_metadata: BTreeMap::new(),
                },
                blooms: vec![
                    Some(BloomFilterIndex { entries: vec![filter_with(&["a"]), filter_with(&["b"])] }),
                    None,
                    Some(BloomFilterIndex { entries: vec![filter_with(&["c"])] }),
                ],
            })
        }
    }

    impl ColumnarFile for MockFile {
        fn schema(&self) -> &TypeDescription { &self.schema }
        fn number_of_rows(&self) -> u64 { 0 }
        fn number_of_stripes(&self) -> usize { self.blooms.len() }

        fn stripe(&self, _: usize) -> EngineResult<StripeInformation> {
            Err(EngineError::InvalidArgument("no stripes in mock".into()))
        }

        fn create_row_stream(self: Arc<Self>, _: &RowStreamOptions) -> EngineResult<Box<dyn RowStream>> {
            Err(EngineError::InvalidArgument("no rows in mock".into()))
        }

        fn column_statistics(&self, _: ColumnId) -> EngineResult<ColumnStatistics> {
            Ok(ColumnStatistics::Generic(BaseStatistics { has_null: false, number_of_values: 3 }))
        }

        fn stripe_statistics(&self, _: usize) -> EngineResult<StripeStatistics> {
            Ok(StripeStatistics::default())
        }

        fn bloom_filters(
            &self,
            stripe:  usize,
            columns: &BTreeSet<ColumnId>,
        ) -> EngineResult<BTreeMap<ColumnId, BloomFilterIndex>> {
            let mut out = BTreeMap::new();
            if let Some(Some(index)) = self.blooms.get(stripe) {
                if columns.is_empty() || columns.contains(&2) {
                    out.insert(2, index.clone());
                }
            }
            Ok(out)
        }

        fn metadata(&self) -> &FileMetadata { &self.metadata }
    }

    #[test]
    fn file_scope_concatenates_stripes_in_order() {
        let file = MockFile::new();
        let set = collect_bloom_filters(file.as_ref(), 0..3, 2).unwrap();
        let expected: Vec<BloomFilter> = vec![filter_with(&["a"]), filter_with(&["b"]), filter_with(&["c"])];
        assert_eq!(set.entries(), expected.as_slice());
        assert!(collect_bloom_filters(file.as_ref(), 0..3, 1).unwrap().is_empty());
    }

    #[test]
    fn stripe_scope_reads_a_single_stripe() {
        let file: Arc<dyn ColumnarFile> = MockFile::new();
        let col = Column::new(file.clone(), ColumnScope::Stripe(2), 2, ConverterTable::default()).unwrap();
        assert_eq!(col.bloom_filters().len(), 1);
        assert!(col.may_contain(&Datum::string("c")));
        assert!(!col.may_contain(&Datum::string("a")));

        let empty = Column::new(file, ColumnScope::Stripe(1), 2, ConverterTable::default()).unwrap();
        assert!(empty.bloom_filters().is_empty());
        assert!(empty.may_contain(&Datum::string("anything")));
    }

    #[test]
    fn file_column_statistics_is_one_record() {
        let file: Arc<dyn ColumnarFile> = MockFile::new();
        let col = Column::new(file, ColumnScope::File, 1, ConverterTable::default()).unwrap();
        assert_eq!(col.bloom_filters().len(), 0);
        let stats = col.statistics().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].number_of_values, 3);
        assert_eq!(stats[0].kind, TypeKind::Int);
    }

    #[test]
    fn unknown_column_is_out_of_range() {
        let file: Arc<dyn ColumnarFile> = MockFile::new();
        let err = Column::new(file, ColumnScope::File, 3, ConverterTable::default()).unwrap_err();
        assert!(err.is_out_of_range());
    }
}
