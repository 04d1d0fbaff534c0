//! 分块压缩/解压（LZ4 / None）
//!
//! LZ4 时按 `block_size` 切块，每块一个 8 字节头：
//! ```text
//! ┌──────────────────────────────────────┐
//! │ stored_len << 1 | original  (u32 LE) │  original=1 表示该块未压缩
//! │ raw_len                     (u32 LE) │
//! │ payload                              │
//! └──────────────────────────────────────┘
//! ```
//! 压缩后不变小的块原样存放。

use byteorder::{ByteOrder, LittleEndian};

use crate::engine::{EngineError, EngineResult};
use crate::field_type::CompressionType;

const CHUNK_HEADER_LEN: usize = 8;

pub fn compress(data: &[u8], codec: CompressionType, block_size: usize) -> EngineResult<Vec<u8>> {
    match codec {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4  => {
            let mut out = Vec::with_capacity(data.len() / 2 + CHUNK_HEADER_LEN);
            for chunk in data.chunks(block_size.max(1)) {
                let packed = lz4::block::compress(chunk, None, false)
                    .map_err(|e| EngineError::Compression(e.to_string()))?;
                let (payload, original) = if packed.len() < chunk.len() {
                    (packed.as_slice(), 0u32)
                } else {
                    (chunk, 1u32)
                };
                let mut header = [0u8; CHUNK_HEADER_LEN];
                LittleEndian::write_u32(&mut header[0..4], (payload.len() as u32) << 1 | original);
                LittleEndian::write_u32(&mut header[4..8], chunk.len() as u32);
                out.extend_from_slice(&header);
                out.extend_from_slice(payload);
            }
            Ok(out)
        }
    }
}

pub fn decompress(
    data:             &[u8],
    codec:            CompressionType,
    uncompressed_len: usize,
) -> EngineResult<Vec<u8>> {
    let out = match codec {
        CompressionType::None => data.to_vec(),
        CompressionType::Lz4  => {
            let mut out = Vec::with_capacity(uncompressed_len);
            let mut pos = 0usize;
            while pos < data.len() {
                if pos + CHUNK_HEADER_LEN > data.len() {
                    return Err(EngineError::Compression("truncated chunk header".into()));
                }
                let word     = LittleEndian::read_u32(&data[pos..pos + 4]);
                let raw_len  = LittleEndian::read_u32(&data[pos + 4..pos + 8]) as usize;
                let stored   = (word >> 1) as usize;
                let original = word & 1 == 1;
                pos += CHUNK_HEADER_LEN;
                if pos + stored > data.len() {
                    return Err(EngineError::Compression("truncated chunk payload".into()));
                }
                let payload = &data[pos..pos + stored];
                if original {
                    out.extend_from_slice(payload);
                } else {
                    let raw = lz4::block::decompress(payload, Some(raw_len as i32))
                        .map_err(|e| EngineError::Compression(e.to_string()))?;
                    out.extend_from_slice(&raw);
                }
                pos += stored;
            }
            out
        }
    };
    if out.len() != uncompressed_len {
        return Err(EngineError::Compression(format!(
            "expected {uncompressed_len} bytes after decompression, got {}", out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_chunks_restore_input() {
        let data: Vec<u8> = (0..10_000u32).flat_map(|i| (i % 17).to_le_bytes()).collect();
        let packed = compress(&data, CompressionType::Lz4, 4096).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed, CompressionType::Lz4, data.len()).unwrap(), data);
    }

    #[test]
    fn incompressible_chunks_are_stored_raw() {
        let data: Vec<u8> = (0..64u8).map(|b| b.wrapping_mul(151).wrapping_add(7)).collect();
        let packed = compress(&data, CompressionType::Lz4, 16).unwrap();
        assert_eq!(packed.len(), data.len() + 4 * CHUNK_HEADER_LEN);
        assert_eq!(decompress(&packed, CompressionType::Lz4, 64).unwrap(), data);
    }

    #[test]
    fn length_mismatch_is_reported() {
        let packed = compress(b"abcabcabcabc", CompressionType::None, 4).unwrap();
        assert!(decompress(&packed, CompressionType::None, 5).is_err());
    }
}
