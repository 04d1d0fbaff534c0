//! 顶层读取器
//!
//! [`Reader`] 持有打开的引擎句柄与文件级配置，游标覆盖整个文件；
//! [`Stripe`] 按需由同一配置派生，各自拥有独立游标。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::column::{Column, ColumnScope};
use crate::common::{ColumnId, ReaderError, Result};
use crate::convert::{ConverterTable, RowConverter};
use crate::cursor::{RowCursor, Whence};
use crate::engine::{
    ColumnSelection, ColumnarFile, FileInput, InputStream, RowStreamOptions, StripeFileReader,
};
use crate::field_type::{CompressionType, TypeDescription};
use crate::stats_builder::{build_statistics, StatisticsRecord};
use crate::stripe::Stripe;
use crate::value::{StructRepr, Value};

// ── ReaderOptions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub batch_size:     usize,
    /// 与 `column_names` 互斥
    pub column_indices: Option<Vec<usize>>,
    pub column_names:   Option<Vec<String>>,
    pub struct_repr:    StructRepr,
    pub converters:     ConverterTable,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            batch_size:     1024,
            column_indices: None,
            column_names:   None,
            struct_repr:    StructRepr::default(),
            converters:     ConverterTable::default(),
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self { Self::default() }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn column_indices(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.column_indices = Some(indices.into_iter().collect());
        self
    }

    pub fn column_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.column_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn struct_repr(mut self, repr: StructRepr) -> Self {
        self.struct_repr = repr;
        self
    }

    pub fn converters(mut self, converters: ConverterTable) -> Self {
        self.converters = converters;
        self
    }

    /// 校验并得到列选择
    pub fn selection(&self) -> Result<ColumnSelection> {
        if self.batch_size == 0 {
            return Err(ReaderError::invalid_argument("batch size must be positive"));
        }
        match (&self.column_indices, &self.column_names) {
            (Some(_), Some(_)) => Err(ReaderError::invalid_argument(
                "either column indices or column names can be set to select columns",
            )),
            (Some(indices), None) => Ok(ColumnSelection::Indices(indices.clone())),
            (None, Some(names))   => Ok(ColumnSelection::Names(names.clone())),
            (None, None)          => Ok(ColumnSelection::All),
        }
    }
}

/// 在 `file` 上按配置建一个游标；`range` 为 stripe 的字节范围
pub(crate) fn open_cursor(
    file:      &Arc<dyn ColumnarFile>,
    options:   &ReaderOptions,
    selection: ColumnSelection,
    range:     Option<(u64, u64)>,
) -> Result<RowCursor> {
    let stream = Arc::clone(file).create_row_stream(&RowStreamOptions { selection, range })?;
    let converter = RowConverter::new(
        stream.selected_type().clone(),
        options.converters.clone(),
        options.struct_repr,
    )?;
    Ok(RowCursor::new(stream, options.batch_size, converter))
}

// ── Reader ────────────────────────────────────────────────────────────────────

pub struct Reader {
    file:      Arc<dyn ColumnarFile>,
    options:   ReaderOptions,
    selection: ColumnSelection,
    cursor:    RowCursor,
}

impl Reader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let input = FileInput::open(path)?;
        Self::from_input(Arc::new(input), options)
    }

    pub fn from_input(input: Arc<dyn InputStream>, options: ReaderOptions) -> Result<Self> {
        let file: Arc<dyn ColumnarFile> = StripeFileReader::open(input)?;
        Self::from_file(file, options)
    }

    pub fn from_file(file: Arc<dyn ColumnarFile>, options: ReaderOptions) -> Result<Self> {
        let selection = options.selection()?;
        let cursor = open_cursor(&file, &options, selection.clone(), None)?;
        debug!(
            rows = file.number_of_rows(),
            stripes = file.number_of_stripes(),
            selected = %cursor.selected_type(),
            batch_size = options.batch_size,
            "opened reader"
        );
        Ok(Self { file, options, selection, cursor })
    }

    // ── 游标 ──────────────────────────────────────────────────────────────────

    pub fn next_row(&mut self) -> Result<Option<Value>> { self.cursor.next_row() }
    pub fn read(&mut self, num: i64) -> Result<Vec<Value>> { self.cursor.read(num) }
    pub fn seek(&mut self, row: i64, whence: Whence) -> Result<u64> { self.cursor.seek(row, whence) }
    pub fn current_row(&self) -> u64 { self.cursor.current_row() }

    // ── 文件信息 ──────────────────────────────────────────────────────────────

    pub fn file(&self) -> &Arc<dyn ColumnarFile> { &self.file }
    pub fn len(&self) -> u64 { self.file.number_of_rows() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn number_of_stripes(&self) -> usize { self.file.number_of_stripes() }
    pub fn schema(&self) -> &TypeDescription { self.file.schema() }
    pub fn selected_schema(&self) -> &TypeDescription { self.cursor.selected_type() }
    pub fn batch_size(&self) -> usize { self.options.batch_size }
    pub fn struct_repr(&self) -> StructRepr { self.options.struct_repr }
    pub fn converters(&self) -> &ConverterTable { &self.options.converters }
    pub fn compression(&self) -> CompressionType { self.file.metadata().compression }
    pub fn compression_block_size(&self) -> u64 { self.file.metadata().compression_block_size }
    pub fn row_index_stride(&self) -> u64 { self.file.metadata().row_index_stride }
    pub fn writer(&self) -> &str { &self.file.metadata().writer }
    pub fn user_metadata(&self) -> &BTreeMap<String, Vec<u8>> { &self.file.metadata().user_metadata }

    // ── stripe / 统计 / 列 ────────────────────────────────────────────────────

    pub fn read_stripe(&self, index: usize) -> Result<Stripe> {
        Stripe::new(Arc::clone(&self.file), index, &self.options, self.selection.clone())
    }

    pub fn iter_stripes(&self) -> impl Iterator<Item = Result<Stripe>> + '_ {
        (0..self.number_of_stripes()).map(move |i| self.read_stripe(i))
    }

    /// 文件级统计记录
    pub fn create_statistics(&self, ty: &TypeDescription, column: ColumnId) -> Result<StatisticsRecord> {
        let stats = self.file.column_statistics(column)?;
        build_statistics(ty, &stats, &self.options.converters)
    }

    /// 列句柄，bloom filter 覆盖所有 stripe
    pub fn get_item(&self, column: ColumnId) -> Result<Column> {
        Column::new(Arc::clone(&self.file), ColumnScope::File, column, self.options.converters.clone())
    }
}

impl Iterator for Reader {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_row().transpose()
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("rows", &self.len())
            .field("stripes", &self.number_of_stripes())
            .field("current_row", &self.current_row())
            .field("options", &self.options)
            .finish()
    }
}
