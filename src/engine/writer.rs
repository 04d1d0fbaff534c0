//! Stripe 文件写入
//!
//! 行先按顶层字段拆分缓冲，满 `stripe_rows` 行或显式 flush 时落成一个 stripe：
//! 每字段一页的数据区，紧跟 bincode 编码的索引区。`finish` 写出 footer。

use std::collections::BTreeMap;
use std::io::Write;

use tracing::debug;

use super::error::{EngineError, EngineResult};
use super::footer::{self, ColumnChunk, FileFooter, FileMetadata, StripeInformation};
use crate::column_writer::{ColumnWriter, IndexBuilder};
use crate::common::ColumnId;
use crate::field_type::{CompressionType, Datum, EncodingType, TypeDescription, TypeKind};
use crate::statistics::{ColumnStatistics, TreeStatistics};

// ── WriterOptions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub stripe_rows:            u64,
    pub row_index_stride:       u64,
    pub compression:            CompressionType,
    pub compression_block_size: usize,
    pub encoding:               EncodingType,
    pub bloom_filter_columns:   Vec<ColumnId>,
    pub bloom_filter_fpp:       f64,
    pub writer_timezone:        String,
    pub user_metadata:          BTreeMap<String, Vec<u8>>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            stripe_rows:            10_000,
            row_index_stride:       1_000,
            compression:            CompressionType::Lz4,
            compression_block_size: 64 * 1024,
            encoding:               EncodingType::Direct,
            bloom_filter_columns:   Vec::new(),
            bloom_filter_fpp:       0.05,
            writer_timezone:        "UTC".into(),
            user_metadata:          BTreeMap::new(),
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self { Self::default() }

    pub fn stripe_rows(mut self, rows: u64) -> Self { self.stripe_rows = rows; self }
    pub fn row_index_stride(mut self, rows: u64) -> Self { self.row_index_stride = rows; self }
    pub fn compression(mut self, c: CompressionType) -> Self { self.compression = c; self }
    pub fn compression_block_size(mut self, bytes: usize) -> Self { self.compression_block_size = bytes; self }
    pub fn encoding(mut self, e: EncodingType) -> Self { self.encoding = e; self }
    pub fn bloom_filter_fpp(mut self, fpp: f64) -> Self { self.bloom_filter_fpp = fpp; self }

    pub fn bloom_filter_columns(mut self, columns: impl IntoIterator<Item = ColumnId>) -> Self {
        self.bloom_filter_columns = columns.into_iter().collect();
        self
    }

    pub fn writer_timezone(mut self, tz: impl Into<String>) -> Self {
        self.writer_timezone = tz.into();
        self
    }

    pub fn user_metadata(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }

    fn validate(&self, schema: &TypeDescription) -> EngineResult<()> {
        if self.stripe_rows == 0 || self.row_index_stride == 0 || self.compression_block_size == 0 {
            return Err(EngineError::InvalidArgument(
                "stripe_rows, row_index_stride and compression_block_size must be positive".into(),
            ));
        }
        if !(self.bloom_filter_fpp > 0.0 && self.bloom_filter_fpp < 1.0) {
            return Err(EngineError::InvalidArgument(format!(
                "bloom filter fpp must lie in (0, 1), got {}", self.bloom_filter_fpp
            )));
        }
        if let Some(c) = self.bloom_filter_columns.iter().find(|&&c| c > schema.maximum_column_id()) {
            return Err(EngineError::InvalidArgument(format!("bloom filter column {c} not in schema")));
        }
        Ok(())
    }
}

// ── StripeFileWriter ──────────────────────────────────────────────────────────

pub struct StripeFileWriter<W: Write> {
    out:               W,
    pos:               u64,
    schema:            TypeDescription,
    options:           WriterOptions,
    columns:           Vec<ColumnWriter>,
    index:             IndexBuilder,
    stripe_stats:      TreeStatistics,
    file_stats:        TreeStatistics,
    stripe_rows:       u64,
    total_rows:        u64,
    stripes:           Vec<StripeInformation>,
    stripe_statistics: Vec<Vec<ColumnStatistics>>,
}

impl<W: Write> StripeFileWriter<W> {
    pub fn new(mut out: W, schema: TypeDescription, options: WriterOptions) -> EngineResult<Self> {
        if schema.kind() != TypeKind::Struct {
            return Err(EngineError::SchemaMismatch(format!("root type must be a struct, got {schema}")));
        }
        options.validate(&schema)?;

        out.write_all(&footer::header())?;
        let columns = (0..schema.children().len()).map(ColumnWriter::new).collect();
        let index = IndexBuilder::new(
            &schema,
            options.row_index_stride as usize,
            &options.bloom_filter_columns,
            options.bloom_filter_fpp,
        );
        Ok(Self {
            out,
            pos:               footer::HEADER_LEN,
            stripe_stats:      TreeStatistics::new(&schema),
            file_stats:        TreeStatistics::new(&schema),
            schema, options, columns, index,
            stripe_rows:       0,
            total_rows:        0,
            stripes:           Vec::new(),
            stripe_statistics: Vec::new(),
        })
    }

    pub fn schema(&self) -> &TypeDescription { &self.schema }
    pub fn number_of_rows(&self) -> u64 { self.total_rows + self.stripe_rows }

    /// 追加一行，每个顶层字段一个值
    pub fn write_row(&mut self, row: Vec<Datum>) -> EngineResult<()> {
        if row.len() != self.columns.len() {
            return Err(EngineError::SchemaMismatch(format!(
                "row has {} values, schema has {} fields", row.len(), self.columns.len()
            )));
        }
        let row = Datum::Struct(row);
        if !self.schema.accepts(&row) {
            return Err(EngineError::SchemaMismatch(format!(
                "row {} does not match {}", self.number_of_rows(), self.schema
            )));
        }

        self.stripe_stats.update(&self.schema, &row);
        self.file_stats.update(&self.schema, &row);
        self.index.add_row(&self.schema, &row);
        if let Datum::Struct(fields) = row {
            for (col, value) in self.columns.iter_mut().zip(fields) {
                col.add_value(value);
            }
        }
        self.stripe_rows += 1;

        if self.stripe_rows >= self.options.stripe_rows {
            self.flush_stripe()?;
        }
        Ok(())
    }

    /// 把缓冲的行落成一个 stripe；没有缓冲行时什么也不做
    pub fn flush_stripe(&mut self) -> EngineResult<()> {
        if self.stripe_rows == 0 {
            return Ok(());
        }
        let offset = self.pos;

        // ── DATA ──────────────────────────────────────────────────────────────
        let mut column_chunks = Vec::with_capacity(self.columns.len());
        for col in &mut self.columns {
            let page = col.flush(
                self.total_rows,
                self.options.encoding,
                self.options.compression,
                self.options.compression_block_size,
            )?;
            self.out.write_all(&page)?;
            column_chunks.push(ColumnChunk { offset: self.pos, length: page.len() as u64 });
            self.pos += page.len() as u64;
        }
        let data_length = self.pos - offset;

        // ── INDEX ─────────────────────────────────────────────────────────────
        let index_bytes = footer::encode_index(&self.index.finish_stripe(&self.schema))?;
        self.out.write_all(&index_bytes)?;
        self.pos += index_bytes.len() as u64;

        let stats = std::mem::replace(&mut self.stripe_stats, TreeStatistics::new(&self.schema));
        self.stripe_statistics.push(stats.finish());
        self.stripes.push(StripeInformation {
            offset,
            length:          self.pos - offset,
            data_length,
            index_length:    index_bytes.len() as u64,
            number_of_rows:  self.stripe_rows,
            first_row:       self.total_rows,
            writer_timezone: self.options.writer_timezone.clone(),
            column_chunks,
        });
        debug!(
            stripe = self.stripes.len() - 1,
            offset,
            rows = self.stripe_rows,
            bytes = self.pos - offset,
            "flushed stripe"
        );

        self.total_rows += self.stripe_rows;
        self.stripe_rows = 0;
        Ok(())
    }

    /// 写出剩余行与 footer，返回底层输出
    pub fn finish(mut self) -> EngineResult<W> {
        self.flush_stripe()?;
        let footer = FileFooter {
            number_of_rows:    self.total_rows,
            stripes:           self.stripes,
            stripe_statistics: self.stripe_statistics,
            file_statistics:   self.file_stats.finish(),
            metadata: FileMetadata {
                compression:            self.options.compression,
                compression_block_size: self.options.compression_block_size as u64,
                row_index_stride:       self.options.row_index_stride,
                writer:                 concat!("stripe-reader ", env!("CARGO_PKG_VERSION")).to_string(),
                user_metadata:          self.options.user_metadata,
            },
            schema: self.schema,
        };
        self.out.write_all(&footer::encode_footer(&footer)?)?;
        self.out.flush()?;
        debug!(rows = footer.number_of_rows, stripes = footer.stripes.len(), "finished stripe file");
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryInput;

    fn schema() -> TypeDescription {
        TypeDescription::struct_of(vec![
            ("id",   TypeDescription::primitive(TypeKind::Long)),
            ("name", TypeDescription::primitive(TypeKind::String)),
        ])
    }

    #[test]
    fn stripes_split_on_row_count() {
        let opts = WriterOptions::new().stripe_rows(4).row_index_stride(2);
        let mut w = StripeFileWriter::new(Vec::new(), schema(), opts).unwrap();
        for i in 0..10 {
            w.write_row(vec![Datum::Long(i), Datum::string("x")]).unwrap();
        }
        let bytes = w.finish().unwrap();
        let footer = footer::read_footer(&MemoryInput::new(bytes)).unwrap();
        assert_eq!(footer.number_of_rows, 10);
        let rows: Vec<u64> = footer.stripes.iter().map(|s| s.number_of_rows).collect();
        assert_eq!(rows, vec![4, 4, 2]);
        assert_eq!(footer.stripes[1].first_row, 4);
        assert_eq!(footer.stripes[1].offset, footer.stripes[0].offset + footer.stripes[0].length);
        assert_eq!(footer.file_statistics[1].number_of_values(), 10);
        assert_eq!(footer.stripe_statistics[2][1].number_of_values(), 2);
    }

    #[test]
    fn mismatched_rows_are_rejected() {
        let mut w = StripeFileWriter::new(Vec::new(), schema(), WriterOptions::default()).unwrap();
        assert!(matches!(w.write_row(vec![Datum::Long(1)]), Err(EngineError::SchemaMismatch(_))));
        assert!(matches!(
            w.write_row(vec![Datum::string("1"), Datum::string("x")]),
            Err(EngineError::SchemaMismatch(_))
        ));
        assert_eq!(w.number_of_rows(), 0);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let bad = WriterOptions::new().bloom_filter_columns([9]);
        assert!(matches!(
            StripeFileWriter::new(Vec::new(), schema(), bad),
            Err(EngineError::InvalidArgument(_))
        ));
        let not_struct = TypeDescription::primitive(TypeKind::Int);
        assert!(StripeFileWriter::new(Vec::new(), not_struct, WriterOptions::default()).is_err());
    }
}
