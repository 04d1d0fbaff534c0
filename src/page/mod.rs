//! 列块（Column Page）读写
//!
//! 每个 stripe 中每个顶层列一页：
//! ```text
//! ┌──────────────────────────────────┐
//! │ value_count  (u32 LE)            │
//! │ first_row    (u64 LE)            │  页首行的文件绝对行号
//! │ uncomp_size  (u32 LE)            │
//! │ encoding     (u8)                │
//! │ payload      (encoded+compressed)│
//! │ CRC32        (u32 LE)            │
//! └──────────────────────────────────┘
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::compression;
use crate::encoding;
use crate::engine::{EngineError, EngineResult};
use crate::field_type::{CompressionType, Datum, EncodingType};

const PAGE_HEADER_LEN: usize = 17;

// ── PageBuilder ───────────────────────────────────────────────────────────────

pub struct PageBuilder {
    pub first_row: u64,
    encoding:      EncodingType,
    compression:   CompressionType,
    block_size:    usize,
    values:        Vec<Datum>,
}

impl PageBuilder {
    pub fn new(
        first_row:   u64,
        encoding:    EncodingType,
        compression: CompressionType,
        block_size:  usize,
    ) -> Self {
        Self { first_row, encoding, compression, block_size, values: Vec::new() }
    }

    pub fn add(&mut self, v: Datum) {
        self.values.push(v);
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = Datum>) {
        self.values.extend(values);
    }

    pub fn len(&self)      -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool  { self.values.is_empty() }

    /// 序列化为页字节（encode → compress → 加 header+CRC）
    pub fn build(self) -> EngineResult<Vec<u8>> {
        let count       = self.values.len() as u32;
        let encoded     = encoding::encode(&self.values, self.encoding)?;
        let uncomp_size = u32::try_from(encoded.len())
            .map_err(|_| EngineError::Encoding("column page exceeds 4 GiB".into()))?;
        let compressed  = compression::compress(&encoded, self.compression, self.block_size)?;

        let mut page = vec![0u8; PAGE_HEADER_LEN];
        LittleEndian::write_u32(&mut page[0..4], count);
        LittleEndian::write_u64(&mut page[4..12], self.first_row);
        LittleEndian::write_u32(&mut page[12..16], uncomp_size);
        page[16] = self.encoding.code();
        page.extend_from_slice(&compressed);

        let crc = crc32fast::hash(&page);
        page.extend_from_slice(&crc.to_le_bytes());
        Ok(page)
    }
}

// ── PageDecoder ───────────────────────────────────────────────────────────────

pub struct PageDecoder {
    pub first_row: u64,
    pub values:    Vec<Datum>,
}

impl PageDecoder {
    pub fn decode(data: &[u8], compression: CompressionType) -> EngineResult<Self> {
        if data.len() < PAGE_HEADER_LEN + 4 {
            return Err(EngineError::Checksum("column page too short".into()));
        }
        let payload_end = data.len() - 4;
        let stored_crc  = LittleEndian::read_u32(&data[payload_end..]);
        if crc32fast::hash(&data[..payload_end]) != stored_crc {
            return Err(EngineError::Checksum("column page".into()));
        }

        let value_count = LittleEndian::read_u32(&data[0..4]) as usize;
        let first_row   = LittleEndian::read_u64(&data[4..12]);
        let uncomp_size = LittleEndian::read_u32(&data[12..16]) as usize;
        let encoding    = EncodingType::from_code(data[16])
            .ok_or_else(|| EngineError::Encoding(format!("unknown encoding {}", data[16])))?;

        let raw    = compression::decompress(&data[PAGE_HEADER_LEN..payload_end], compression, uncomp_size)?;
        let values = encoding::decode(&raw, encoding, value_count)?;

        Ok(Self { first_row, values })
    }
}
