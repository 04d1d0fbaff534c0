//! 单个 stripe 的子读取器
//!
//! 构造时继承 Reader 的批大小、列选择、struct 形态与转换器表，之后互不影响。
//! 游标的 seek 起点为本 stripe 首行。

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::column::{Column, ColumnScope};
use crate::common::{ColumnId, ReaderError, Result};
use crate::convert::ConverterTable;
use crate::cursor::{RowCursor, Whence};
use crate::engine::{ColumnSelection, ColumnarFile, StripeInformation};
use crate::field_type::TypeDescription;
use crate::reader::{open_cursor, ReaderOptions};
use crate::stats_builder::{build_statistics, StatisticsRecord};
use crate::value::Value;

pub struct Stripe {
    file:       Arc<dyn ColumnarFile>,
    index:      usize,
    info:       StripeInformation,
    converters: ConverterTable,
    cursor:     RowCursor,
}

impl Stripe {
    pub(crate) fn new(
        file:      Arc<dyn ColumnarFile>,
        index:     usize,
        options:   &ReaderOptions,
        selection: ColumnSelection,
    ) -> Result<Self> {
        if index >= file.number_of_stripes() {
            return Err(ReaderError::out_of_range(format!(
                "stripe index {index} out of range ({} stripes)", file.number_of_stripes()
            )));
        }
        let info = file.stripe(index)?;
        let cursor = open_cursor(&file, options, selection, Some((info.offset, info.length)))?;
        debug!(
            stripe = index,
            offset = info.offset,
            length = info.length,
            rows = info.number_of_rows,
            first_row = cursor.first_row(),
            "created stripe reader"
        );
        Ok(Self { file, index, info, converters: options.converters.clone(), cursor })
    }

    pub fn index(&self) -> usize { self.index }
    pub fn len(&self) -> u64 { self.info.number_of_rows }
    pub fn is_empty(&self) -> bool { self.info.number_of_rows == 0 }
    pub fn offset(&self) -> u64 { self.info.offset }
    pub fn byte_length(&self) -> u64 { self.info.length }
    pub fn writer_timezone(&self) -> &str { &self.info.writer_timezone }
    pub fn information(&self) -> &StripeInformation { &self.info }
    pub fn selected_schema(&self) -> &TypeDescription { self.cursor.selected_type() }

    /// 本 stripe 首行的文件绝对行号
    pub fn first_row(&self) -> u64 { self.cursor.first_row() }

    pub fn next_row(&mut self) -> Result<Option<Value>> { self.cursor.next_row() }
    pub fn read(&mut self, num: i64) -> Result<Vec<Value>> { self.cursor.read(num) }
    pub fn seek(&mut self, row: i64, whence: Whence) -> Result<u64> { self.cursor.seek(row, whence) }
    pub fn current_row(&self) -> u64 { self.cursor.current_row() }

    /// 本 stripe 中带 bloom filter 的列号（按引擎返回顺序）
    pub fn bloom_filter_columns(&self) -> Result<Vec<ColumnId>> {
        Ok(self.file.bloom_filters(self.index, &BTreeSet::new())?.into_keys().collect())
    }

    /// 列句柄，bloom filter 只来自本 stripe
    pub fn get_item(&self, column: ColumnId) -> Result<Column> {
        Column::new(Arc::clone(&self.file), ColumnScope::Stripe(self.index), column, self.converters.clone())
    }

    /// 每个 row group 一条统计记录
    pub fn create_statistics(&self, ty: &TypeDescription, column: ColumnId) -> Result<Vec<StatisticsRecord>> {
        let stats = self.file.stripe_statistics(self.index)?;
        (0..stats.number_of_row_index_stats(column))
            .filter_map(|g| stats.row_index_statistics(column, g))
            .map(|st| build_statistics(ty, st, &self.converters))
            .collect()
    }
}

impl Iterator for Stripe {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_row().transpose()
    }
}

impl std::fmt::Debug for Stripe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stripe")
            .field("index", &self.index)
            .field("info", &self.info)
            .field("current_row", &self.current_row())
            .finish()
    }
}
