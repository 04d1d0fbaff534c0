//! Stripe 文件读取
//!
//! [`StripeFileReader`] 打开时只读 footer；stripe 索引区与数据页按需读取。
//! [`FileRowStream`] 一次解码一个 stripe 的选中字段，再按批切片交给游标。

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use super::error::{EngineError, EngineResult};
use super::footer::{self, FileFooter, FileMetadata, StripeIndex, StripeInformation};
use super::input::{FileInput, InputStream};
use super::{ColumnSelection, ColumnarFile, RowStream, RowStreamOptions};
use crate::batch::RowBatch;
use crate::common::ColumnId;
use crate::field_type::{Datum, TypeDescription};
use crate::index::BloomFilterIndex;
use crate::page::PageDecoder;
use crate::statistics::{ColumnStatistics, StripeStatistics};

pub struct StripeFileReader {
    input:  Arc<dyn InputStream>,
    footer: FileFooter,
}

impl StripeFileReader {
    pub fn open(input: Arc<dyn InputStream>) -> EngineResult<Arc<Self>> {
        let footer = footer::read_footer(input.as_ref())?;
        debug!(
            input = input.name(),
            rows = footer.number_of_rows,
            stripes = footer.stripes.len(),
            "opened stripe file"
        );
        Ok(Arc::new(Self { input, footer }))
    }

    pub fn open_path(path: impl AsRef<Path>) -> EngineResult<Arc<Self>> {
        Self::open(Arc::new(FileInput::open(path)?))
    }

    pub fn footer(&self) -> &FileFooter { &self.footer }

    fn stripe_info(&self, index: usize) -> EngineResult<&StripeInformation> {
        self.footer.stripes.get(index).ok_or_else(|| EngineError::OutOfRange(format!(
            "stripe {index} out of range ({} stripes)", self.footer.stripes.len()
        )))
    }

    fn read_index(&self, stripe: usize) -> EngineResult<StripeIndex> {
        let info = self.stripe_info(stripe)?;
        let bytes = self.input.read_at(info.index_offset(), info.index_length as usize)?;
        footer::decode_index(&bytes)
    }

    /// 解码一个 stripe 中指定顶层字段的页
    fn read_columns(&self, stripe: usize, fields: &[usize]) -> EngineResult<Vec<Vec<Datum>>> {
        let info = self.stripe_info(stripe)?;
        fields.iter().map(|&field| {
            let chunk = info.column_chunks.get(field).ok_or_else(|| {
                EngineError::parse(format!("stripe {stripe} has no chunk for field {field}"))
            })?;
            let bytes = self.input.read_at(chunk.offset, chunk.length as usize)?;
            let page  = PageDecoder::decode(&bytes, self.footer.metadata.compression)?;
            if page.first_row != info.first_row || page.values.len() as u64 != info.number_of_rows {
                return Err(EngineError::parse(format!(
                    "stripe {stripe} field {field}: page covers {} rows from {}, expected {} from {}",
                    page.values.len(), page.first_row, info.number_of_rows, info.first_row
                )));
            }
            Ok(page.values)
        }).collect()
    }

    fn resolve_fields(&self, selection: &ColumnSelection) -> EngineResult<Vec<usize>> {
        let schema = &self.footer.schema;
        let mut fields = match selection {
            ColumnSelection::All => (0..schema.children().len()).collect(),
            ColumnSelection::Indices(indices) => {
                if let Some(i) = indices.iter().find(|&&i| i >= schema.children().len()) {
                    return Err(EngineError::InvalidArgument(format!(
                        "column index {i} out of range for {schema}"
                    )));
                }
                indices.clone()
            }
            ColumnSelection::Names(names) => names.iter()
                .map(|n| schema.field_index(n).ok_or_else(|| {
                    EngineError::InvalidArgument(format!("unknown column name {n:?}"))
                }))
                .collect::<EngineResult<Vec<_>>>()?,
        };
        fields.sort_unstable();
        fields.dedup();
        Ok(fields)
    }
}

impl ColumnarFile for StripeFileReader {
    fn schema(&self) -> &TypeDescription { &self.footer.schema }
    fn number_of_rows(&self) -> u64 { self.footer.number_of_rows }
    fn number_of_stripes(&self) -> usize { self.footer.stripes.len() }

    fn stripe(&self, index: usize) -> EngineResult<StripeInformation> {
        self.stripe_info(index).cloned()
    }

    fn create_row_stream(self: Arc<Self>, options: &RowStreamOptions) -> EngineResult<Box<dyn RowStream>> {
        let fields   = self.resolve_fields(&options.selection)?;
        let selected = self.footer.schema.select_fields(&fields);

        let stripes: Vec<usize> = match options.range {
            None => (0..self.footer.stripes.len()).collect(),
            Some((offset, length)) => {
                let end = offset.saturating_add(length);
                self.footer.stripes.iter().enumerate()
                    .filter(|(_, s)| s.offset >= offset && s.offset < end)
                    .map(|(i, _)| i)
                    .collect()
            }
        };
        let first_row = match (stripes.first(), options.range) {
            (Some(&i), _) => self.footer.stripes[i].first_row,
            (None, Some((offset, _))) => self.footer.stripes.iter()
                .find(|s| s.offset >= offset)
                .map(|s| s.first_row)
                .unwrap_or(self.footer.number_of_rows),
            (None, None) => 0,
        };
        let number_of_rows = stripes.iter().map(|&i| self.footer.stripes[i].number_of_rows).sum();

        Ok(Box::new(FileRowStream {
            file: self,
            fields, selected, stripes,
            first_row, number_of_rows,
            position: first_row,
            loaded: None,
        }))
    }

    fn column_statistics(&self, column: ColumnId) -> EngineResult<ColumnStatistics> {
        self.footer.file_statistics.get(column as usize).cloned()
            .ok_or_else(|| EngineError::OutOfRange(format!("column {column} out of range")))
    }

    fn stripe_statistics(&self, stripe: usize) -> EngineResult<StripeStatistics> {
        let index = self.read_index(stripe)?;
        Ok(StripeStatistics {
            column_statistics:    self.footer.stripe_statistics.get(stripe).cloned().unwrap_or_default(),
            row_index_statistics: index.row_index_statistics,
        })
    }

    fn bloom_filters(
        &self,
        stripe:  usize,
        columns: &BTreeSet<ColumnId>,
    ) -> EngineResult<BTreeMap<ColumnId, BloomFilterIndex>> {
        let mut filters = self.read_index(stripe)?.bloom_filters;
        if !columns.is_empty() {
            filters.retain(|c, _| columns.contains(c));
        }
        Ok(filters)
    }

    fn metadata(&self) -> &FileMetadata { &self.footer.metadata }
}

// ── FileRowStream ─────────────────────────────────────────────────────────────

struct LoadedStripe {
    index:     usize,
    first_row: u64,
    rows:      u64,
    columns:   Vec<Vec<Datum>>,
}

pub struct FileRowStream {
    file:           Arc<StripeFileReader>,
    fields:         Vec<usize>,
    selected:       TypeDescription,
    /// 范围内的 stripe（文件顺序、连续）
    stripes:        Vec<usize>,
    first_row:      u64,
    number_of_rows: u64,
    position:       u64,
    loaded:         Option<LoadedStripe>,
}

impl FileRowStream {
    fn end_row(&self) -> u64 { self.first_row + self.number_of_rows }

    fn ensure_loaded(&mut self) -> EngineResult<()> {
        let position = self.position;
        if self.loaded.as_ref().is_some_and(|l| position >= l.first_row && position < l.first_row + l.rows) {
            return Ok(());
        }
        let stripes = &self.file.footer.stripes;
        let index = self.stripes.iter().copied()
            .find(|&i| position >= stripes[i].first_row && position < stripes[i].first_row + stripes[i].number_of_rows)
            .ok_or_else(|| EngineError::OutOfRange(format!("row {position} is not in any stripe")))?;
        let columns = self.file.read_columns(index, &self.fields)?;
        trace!(stripe = index, columns = columns.len(), "loaded stripe columns");
        self.loaded = Some(LoadedStripe {
            index,
            first_row: stripes[index].first_row,
            rows:      stripes[index].number_of_rows,
            columns,
        });
        Ok(())
    }
}

impl RowStream for FileRowStream {
    fn selected_type(&self) -> &TypeDescription { &self.selected }

    fn create_batch(&self, capacity: usize) -> RowBatch {
        RowBatch::new(capacity, self.fields.len())
    }

    fn next_batch(&mut self, batch: &mut RowBatch) -> EngineResult<bool> {
        if self.position >= self.end_row() {
            batch.clear();
            return Ok(false);
        }
        if batch.capacity() == 0 {
            return Err(EngineError::InvalidArgument("batch capacity must be positive".into()));
        }
        self.ensure_loaded()?;
        let Some(loaded) = self.loaded.as_ref() else {
            return Ok(false);
        };
        let start = (self.position - loaded.first_row) as usize;
        let rows  = (loaded.rows as usize - start).min(batch.capacity());
        let slices: Vec<&[Datum]> = loaded.columns.iter().map(|c| &c[start..start + rows]).collect();
        batch.fill_from(&slices, rows);
        trace!(stripe = loaded.index, row = self.position, rows, "fetched batch");
        self.position += rows as u64;
        Ok(true)
    }

    fn seek_to_row(&mut self, row: u64) -> EngineResult<()> {
        if row < self.first_row || row > self.end_row() {
            return Err(EngineError::OutOfRange(format!(
                "row {row} outside [{}, {}]", self.first_row, self.end_row()
            )));
        }
        self.position = row;
        Ok(())
    }

    fn row_number(&self) -> u64 { self.position }
    fn number_of_rows(&self) -> u64 { self.number_of_rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryInput, StripeFileWriter, WriterOptions};
    use crate::field_type::TypeKind;

    fn open_sample() -> Arc<StripeFileReader> {
        let schema = TypeDescription::struct_of(vec![
            ("id",  TypeDescription::primitive(TypeKind::Long)),
            ("tag", TypeDescription::primitive(TypeKind::String)),
        ]);
        let opts = WriterOptions::new().stripe_rows(5).row_index_stride(2).bloom_filter_columns([2]);
        let mut w = StripeFileWriter::new(Vec::new(), schema, opts).unwrap();
        for i in 0..12i64 {
            w.write_row(vec![Datum::Long(i), Datum::string(&format!("t{}", i % 3))]).unwrap();
        }
        StripeFileReader::open(Arc::new(MemoryInput::new(w.finish().unwrap()))).unwrap()
    }

    fn drain(stream: &mut dyn RowStream, capacity: usize) -> Vec<Vec<Datum>> {
        let mut batch = stream.create_batch(capacity);
        let mut out = Vec::new();
        while stream.next_batch(&mut batch).unwrap() {
            out.push((0..batch.num_elements()).map(|r| batch.slot(0, r).cloned().unwrap()).collect());
        }
        out
    }

    #[test]
    fn batches_do_not_cross_stripes() {
        let file = open_sample();
        let mut stream = file.create_row_stream(&RowStreamOptions::new()).unwrap();
        let sizes: Vec<usize> = drain(stream.as_mut(), 4).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 1, 4, 1, 2]);
        assert_eq!(stream.row_number(), 12);
    }

    #[test]
    fn byte_range_selects_one_stripe() {
        let file = open_sample();
        let info = file.stripe(1).unwrap();
        let opts = RowStreamOptions::new().range(info.offset, info.length);
        let mut stream = file.clone().create_row_stream(&opts).unwrap();
        assert_eq!(stream.row_number(), 5);
        assert_eq!(stream.number_of_rows(), 5);
        let rows: Vec<Datum> = drain(stream.as_mut(), 100).concat();
        assert_eq!(rows, (5..10).map(Datum::Long).collect::<Vec<_>>());
    }

    #[test]
    fn selection_by_name_keeps_column_ids() {
        let file = open_sample();
        let opts = RowStreamOptions::new().selection(ColumnSelection::Names(vec!["tag".into()]));
        let stream = file.clone().create_row_stream(&opts).unwrap();
        assert_eq!(stream.selected_type().children()[0].column_id(), 2);
        let bad = RowStreamOptions::new().selection(ColumnSelection::Names(vec!["nope".into()]));
        assert!(matches!(file.create_row_stream(&bad).err(), Some(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn seek_is_bounded_by_stream_range() {
        let file = open_sample();
        let mut stream = file.create_row_stream(&RowStreamOptions::new()).unwrap();
        stream.seek_to_row(7).unwrap();
        assert_eq!(drain(stream.as_mut(), 100).concat()[0], Datum::Long(7));
        assert!(stream.seek_to_row(12).is_ok());
        assert!(matches!(stream.seek_to_row(13), Err(EngineError::OutOfRange(_))));
    }

    #[test]
    fn index_region_serves_statistics_and_blooms() {
        let file = open_sample();
        let stats = file.stripe_statistics(0).unwrap();
        assert_eq!(stats.number_of_row_index_stats(1), 3);
        assert_eq!(stats.column_statistics(1).map(|s| s.number_of_values()), Some(5));
        let all = file.bloom_filters(0, &BTreeSet::new()).unwrap();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert!(file.bloom_filters(0, &BTreeSet::from([1])).unwrap().is_empty());
        assert!(matches!(file.stripe(3), Err(EngineError::OutOfRange(_))));
    }
}
