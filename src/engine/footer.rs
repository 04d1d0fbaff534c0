//! 文件元数据：header、stripe 索引区与 footer
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  MAGIC  (8 bytes) "STRIPES\0"        │
//! │  Version(4 bytes)                    │
//! ├──────────────────────────────────────┤
//! │  STRIPE 0                            │
//! │    DATA   每个顶层字段一页            │
//! │    INDEX  bincode(StripeIndex)+CRC32 │
//! │  STRIPE 1 ...                        │
//! ├──────────────────────────────────────┤
//! │  FOOTER                              │
//! │    bincode(FileFooter)               │
//! │    Footer CRC32  (4 bytes)           │
//! │    Footer length (4 bytes)           │
//! │    MAGIC         (8 bytes)           │
//! └──────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::input::InputStream;
use crate::common::ColumnId;
use crate::field_type::{CompressionType, TypeDescription};
use crate::index::BloomFilterIndex;
use crate::statistics::ColumnStatistics;

pub const MAGIC: &[u8; 8] = b"STRIPES\0";
pub const VERSION: u32     = 1;
pub const HEADER_LEN: u64  = 12;
const TRAILER_LEN: u64     = 16;

// ── 元数据结构 ────────────────────────────────────────────────────────────────

/// 一个顶层字段在 stripe 数据区中的页（绝对偏移）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChunk {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeInformation {
    pub offset:          u64,
    /// data + index
    pub length:          u64,
    pub data_length:     u64,
    pub index_length:    u64,
    pub number_of_rows:  u64,
    /// 本 stripe 首行的文件绝对行号
    pub first_row:       u64,
    pub writer_timezone: String,
    pub column_chunks:   Vec<ColumnChunk>,
}

impl StripeInformation {
    pub fn index_offset(&self) -> u64 { self.offset + self.data_length }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub compression:            CompressionType,
    pub compression_block_size: u64,
    pub row_index_stride:       u64,
    pub writer:                 String,
    pub user_metadata:          BTreeMap<String, Vec<u8>>,
}

/// stripe 索引区：row group 级统计（按列号）与 bloom filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeIndex {
    pub row_index_statistics: Vec<Vec<ColumnStatistics>>,
    pub bloom_filters:        BTreeMap<ColumnId, BloomFilterIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFooter {
    pub schema:            TypeDescription,
    pub number_of_rows:    u64,
    pub stripes:           Vec<StripeInformation>,
    /// 每个 stripe 一组，下标为列号
    pub stripe_statistics: Vec<Vec<ColumnStatistics>>,
    pub file_statistics:   Vec<ColumnStatistics>,
    pub metadata:          FileMetadata,
}

// ── 编解码 ────────────────────────────────────────────────────────────────────

pub fn header() -> [u8; HEADER_LEN as usize] {
    let mut out = [0u8; HEADER_LEN as usize];
    out[..8].copy_from_slice(MAGIC);
    LittleEndian::write_u32(&mut out[8..], VERSION);
    out
}

pub fn encode_index(index: &StripeIndex) -> EngineResult<Vec<u8>> {
    let mut out = bincode::serialize(index)?;
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

pub fn decode_index(data: &[u8]) -> EngineResult<StripeIndex> {
    if data.len() < 4 {
        return Err(EngineError::Checksum("stripe index too short".into()));
    }
    let body = &data[..data.len() - 4];
    if crc32fast::hash(body) != LittleEndian::read_u32(&data[body.len()..]) {
        return Err(EngineError::Checksum("stripe index".into()));
    }
    let index: StripeIndex = bincode::deserialize(body)?;
    for (column, blooms) in &index.bloom_filters {
        if let Some(g) = blooms.entries.iter().position(|bf| !bf.is_well_formed()) {
            return Err(EngineError::Parse(format!(
                "malformed bloom filter for column {column} row group {g}"
            )));
        }
    }
    Ok(index)
}

/// footer 字节 + CRC + 长度 + MAGIC
pub fn encode_footer(footer: &FileFooter) -> EngineResult<Vec<u8>> {
    let mut out = bincode::serialize(footer)?;
    let len = u32::try_from(out.len())
        .map_err(|_| EngineError::Encoding("footer exceeds 4 GiB".into()))?;
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(MAGIC);
    Ok(out)
}

pub fn read_footer(input: &dyn InputStream) -> EngineResult<FileFooter> {
    let total = input.length();
    let name  = input.name();
    if total < HEADER_LEN + TRAILER_LEN {
        return Err(EngineError::parse(format!("{name}: file too short ({total} bytes)")));
    }

    let head = input.read_at(0, HEADER_LEN as usize)?;
    if &head[..8] != MAGIC {
        return Err(EngineError::parse(format!("{name}: not a stripe file (bad magic)")));
    }
    let version = LittleEndian::read_u32(&head[8..]);
    if version != VERSION {
        return Err(EngineError::parse(format!("{name}: unsupported format version {version}")));
    }

    let trailer = input.read_at(total - TRAILER_LEN, TRAILER_LEN as usize)?;
    if &trailer[8..] != MAGIC {
        return Err(EngineError::parse(format!("{name}: bad trailing magic")));
    }
    let footer_crc = LittleEndian::read_u32(&trailer[0..4]);
    let footer_len = LittleEndian::read_u32(&trailer[4..8]) as u64;
    if footer_len > total - HEADER_LEN - TRAILER_LEN {
        return Err(EngineError::parse(format!("{name}: footer length {footer_len} exceeds file")));
    }

    let bytes = input.read_at(total - TRAILER_LEN - footer_len, footer_len as usize)?;
    if crc32fast::hash(&bytes) != footer_crc {
        return Err(EngineError::parse(format!("{name}: footer checksum mismatch")));
    }
    Ok(bincode::deserialize(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryInput;
    use crate::field_type::TypeKind;
    use crate::index::BloomFilter;
    use crate::statistics::BaseStatistics;

    fn footer() -> FileFooter {
        FileFooter {
            schema: TypeDescription::struct_of(vec![("x", TypeDescription::primitive(TypeKind::Int))]),
            number_of_rows: 0,
            stripes: Vec::new(),
            stripe_statistics: Vec::new(),
            file_statistics: vec![ColumnStatistics::Generic(BaseStatistics::default())],
            metadata: FileMetadata {
                compression: CompressionType::None,
                compression_block_size: 1024,
                row_index_stride: 100,
                writer: "test".into(),
                user_metadata: BTreeMap::new(),
            },
        }
    }

    fn file_bytes() -> Vec<u8> {
        let mut bytes = header().to_vec();
        bytes.extend(encode_footer(&footer()).unwrap());
        bytes
    }

    #[test]
    fn footer_is_read_back() {
        let input = MemoryInput::new(file_bytes());
        assert_eq!(read_footer(&input).unwrap(), footer());
    }

    #[test]
    fn bad_magic_is_a_parse_error() {
        let mut bytes = file_bytes();
        bytes[0] = b'X';
        assert!(read_footer(&MemoryInput::new(bytes)).unwrap_err().is_parse());
        assert!(read_footer(&MemoryInput::new(b"tiny".to_vec())).unwrap_err().is_parse());
    }

    #[test]
    fn corrupted_footer_is_a_parse_error() {
        let mut bytes = file_bytes();
        bytes[HEADER_LEN as usize + 2] ^= 0xff;
        assert!(read_footer(&MemoryInput::new(bytes)).unwrap_err().is_parse());
    }

    #[test]
    fn corrupted_index_fails_checksum() {
        let mut bytes = encode_index(&StripeIndex::default()).unwrap();
        bytes[0] ^= 1;
        assert!(matches!(decode_index(&bytes), Err(EngineError::Checksum(_))));
    }

    /// 与 BloomFilter 相同的 bincode 布局，用来构造位数组不足的条目
    #[derive(Serialize)]
    struct RawBloom {
        bits:          Vec<u64>,
        num_bits:      u64,
        num_functions: u32,
    }

    fn bloom_from(raw: RawBloom) -> BloomFilter {
        bincode::deserialize(&bincode::serialize(&raw).unwrap()).unwrap()
    }

    #[test]
    fn malformed_bloom_filter_is_a_parse_error() {
        for raw in [
            RawBloom { bits: Vec::new(), num_bits: 0, num_functions: 2 },
            RawBloom { bits: vec![0; 1], num_bits: 4096, num_functions: 2 },
        ] {
            let mut index = StripeIndex::default();
            index.bloom_filters.insert(1, BloomFilterIndex {
                entries: vec![BloomFilter::new(4, 0.05), bloom_from(raw)],
            });
            let err = decode_index(&encode_index(&index).unwrap()).unwrap_err();
            assert!(err.is_parse(), "{err}");
        }

        let mut ok = StripeIndex::default();
        ok.bloom_filters.insert(1, BloomFilterIndex { entries: vec![BloomFilter::new(4, 0.05)] });
        assert_eq!(decode_index(&encode_index(&ok).unwrap()).unwrap(), ok);
    }
}
