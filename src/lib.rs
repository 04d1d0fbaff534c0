//! # stripe-reader
//!
//! 面向行的 stripe 列存文件读取层：把按批、按列解码的存储引擎
//! 呈现为可顺序迭代、可随机 seek 的逻辑行序列，并提供列统计与 bloom filter。
//!
//! ## 整体架构
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Reader ──read_stripe()──▶ Stripe                       │
//! │    │  ReaderOptions            │  (字节范围受限的子读取器) │
//! │    ▼                           ▼                         │
//! │  RowCursor  ◀── 共用 ──▶  RowCursor                      │
//! │    ├─ RowConverter  (TypeKind → 处理函数表)              │
//! │    └─ next / read / seek (Start | Current | End)         │
//! │                                                          │
//! │  get_item() ──▶ Column  (BloomFilterSet + 统计)          │
//! │  create_statistics() ──▶ StatisticsRecord                │
//! ├──────────────────── ColumnarFile / RowStream ────────────┤
//! │  engine: StripeFileReader / StripeFileWriter             │
//! │   ├─ footer       (bincode + CRC32)                      │
//! │   ├─ page         (每 stripe 每字段一页，CRC32)           │
//! │   ├─ encoding     (Direct / RunLength)                   │
//! │   ├─ compression  (分块 LZ4 / None)                      │
//! │   ├─ statistics   (row group / stripe / 文件三级)        │
//! │   └─ index        (BloomFilter)                          │
//! └─────────────────────────────────────────────────────────┘
//! ```

// ── 读取核心 ──────────────────────────────────────────────────────────────────
pub mod common;
pub mod field_type;
pub mod value;
pub mod batch;
pub mod convert;
pub mod cursor;
pub mod stats_builder;
pub mod column;
pub mod reader;
pub mod stripe;

// ── 存储引擎 ──────────────────────────────────────────────────────────────────
pub mod engine;
pub mod encoding;
pub mod compression;
pub mod page;
pub mod index;
pub mod statistics;
pub mod column_writer;

pub use column::{BloomFilterSet, Column, ColumnScope};
pub use common::{ColumnId, ReaderError, Result};
pub use convert::{Converter, ConverterTable};
pub use cursor::Whence;
pub use field_type::{Datum, Decimal, TypeDescription, TypeKind};
pub use reader::{Reader, ReaderOptions};
pub use stats_builder::{StatisticsField, StatisticsRecord};
pub use stripe::Stripe;
pub use value::{StructRepr, Value};
