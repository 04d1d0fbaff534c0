//! 列式存储引擎
//!
//! 读取核心只通过 [`ColumnarFile`] / [`RowStream`] 两个 trait 访问引擎；
//! 本模块同时提供一个参考实现：[`StripeFileWriter`] 写、[`StripeFileReader`] 读。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::batch::RowBatch;
use crate::common::ColumnId;
use crate::field_type::TypeDescription;
use crate::index::BloomFilterIndex;
use crate::statistics::{ColumnStatistics, StripeStatistics};

mod error;
mod footer;
mod input;
mod reader;
mod writer;

pub use error::{EngineError, EngineResult};
pub use footer::{ColumnChunk, FileFooter, FileMetadata, StripeIndex, StripeInformation, MAGIC, VERSION};
pub use input::{FileInput, InputStream, MemoryInput};
pub use reader::StripeFileReader;
pub use writer::{StripeFileWriter, WriterOptions};

// ── 行流选项 ──────────────────────────────────────────────────────────────────

/// 顶层字段选择；选中后的类型保留原列号
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnSelection {
    #[default]
    All,
    Indices(Vec<usize>),
    Names(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowStreamOptions {
    pub selection: ColumnSelection,
    /// (offset, length)：只读取 offset 落在该区间内的 stripe
    pub range:     Option<(u64, u64)>,
}

impl RowStreamOptions {
    pub fn new() -> Self { Self::default() }

    pub fn selection(mut self, selection: ColumnSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn range(mut self, offset: u64, length: u64) -> Self {
        self.range = Some((offset, length));
        self
    }
}

// ── 引擎接口 ──────────────────────────────────────────────────────────────────

pub trait ColumnarFile: Send + Sync {
    fn schema(&self) -> &TypeDescription;
    fn number_of_rows(&self) -> u64;
    fn number_of_stripes(&self) -> usize;
    fn stripe(&self, index: usize) -> EngineResult<StripeInformation>;
    fn create_row_stream(self: Arc<Self>, options: &RowStreamOptions) -> EngineResult<Box<dyn RowStream>>;
    /// 文件级统计
    fn column_statistics(&self, column: ColumnId) -> EngineResult<ColumnStatistics>;
    fn stripe_statistics(&self, stripe: usize) -> EngineResult<StripeStatistics>;
    /// `columns` 为空表示所有带 bloom filter 的列
    fn bloom_filters(
        &self,
        stripe:  usize,
        columns: &BTreeSet<ColumnId>,
    ) -> EngineResult<BTreeMap<ColumnId, BloomFilterIndex>>;
    fn metadata(&self) -> &FileMetadata;
}

/// 行流：按批产出选中列，批不跨 stripe
pub trait RowStream: Send {
    fn selected_type(&self) -> &TypeDescription;
    fn create_batch(&self, capacity: usize) -> RowBatch;
    /// 填充下一批；没有更多行时返回 false
    fn next_batch(&mut self, batch: &mut RowBatch) -> EngineResult<bool>;
    fn seek_to_row(&mut self, row: u64) -> EngineResult<()>;
    /// 下一行的文件绝对行号
    fn row_number(&self) -> u64;
    /// 本流范围内的行数
    fn number_of_rows(&self) -> u64;
}
