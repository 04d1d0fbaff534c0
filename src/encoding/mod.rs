//! 列值编码
//!
//! 两种编码：
//! - **Direct**    — 每个值一个类型标签 + 小端负载
//! - **RunLength** — (run, value) 对，适合低基数或大量 null 的列
//!
//! 值的标签自描述，解码不依赖类型信息；嵌套值递归编码。

use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::engine::{EngineError, EngineResult};
use crate::field_type::{Datum, Decimal, EncodingType};

// ── 统一编/解码入口 ───────────────────────────────────────────────────────────

pub fn encode(values: &[Datum], enc: EncodingType) -> EngineResult<Vec<u8>> {
    let mut out = Vec::new();
    let written = match enc {
        EncodingType::Direct    => direct::encode(values, &mut out),
        EncodingType::RunLength => rle::encode(values, &mut out),
    };
    written.map_err(|e| EngineError::Encoding(e.to_string()))?;
    Ok(out)
}

pub fn decode(data: &[u8], enc: EncodingType, count: usize) -> EngineResult<Vec<Datum>> {
    let mut cur = Cursor::new(data);
    let values = match enc {
        EncodingType::Direct    => direct::decode(&mut cur, count),
        EncodingType::RunLength => rle::decode(&mut cur, count),
    }
    .map_err(|e| EngineError::Encoding(format!("truncated or malformed column data: {e}")))?;
    if values.len() != count {
        return Err(EngineError::Encoding(format!(
            "expected {count} values, decoded {}", values.len()
        )));
    }
    Ok(values)
}

// ── 单值编解码 ────────────────────────────────────────────────────────────────

const TAG_NULL:      u8 = 0;
const TAG_BOOLEAN:   u8 = 1;
const TAG_LONG:      u8 = 2;
const TAG_DOUBLE:    u8 = 3;
const TAG_BYTES:     u8 = 4;
const TAG_DATE:      u8 = 5;
const TAG_TIMESTAMP: u8 = 6;
const TAG_DECIMAL:   u8 = 7;
const TAG_LIST:      u8 = 8;
const TAG_MAP:       u8 = 9;
const TAG_STRUCT:    u8 = 10;
const TAG_UNION:     u8 = 11;

fn write_len(out: &mut Vec<u8>, len: usize) -> io::Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "value too large"))?;
    out.write_u32::<LittleEndian>(len)
}

fn write_datum(out: &mut Vec<u8>, d: &Datum) -> io::Result<()> {
    match d {
        Datum::Null => out.write_u8(TAG_NULL),
        Datum::Boolean(b) => {
            out.write_u8(TAG_BOOLEAN)?;
            out.write_u8(*b as u8)
        }
        Datum::Long(v) => {
            out.write_u8(TAG_LONG)?;
            out.write_i64::<LittleEndian>(*v)
        }
        Datum::Double(v) => {
            out.write_u8(TAG_DOUBLE)?;
            out.write_f64::<LittleEndian>(*v)
        }
        Datum::Bytes(b) => {
            out.write_u8(TAG_BYTES)?;
            write_len(out, b.len())?;
            out.extend_from_slice(b);
            Ok(())
        }
        Datum::Date(days) => {
            out.write_u8(TAG_DATE)?;
            out.write_i64::<LittleEndian>(*days)
        }
        Datum::Timestamp { seconds, nanos } => {
            out.write_u8(TAG_TIMESTAMP)?;
            out.write_i64::<LittleEndian>(*seconds)?;
            out.write_u32::<LittleEndian>(*nanos)
        }
        Datum::Decimal(dec) => {
            out.write_u8(TAG_DECIMAL)?;
            out.write_i128::<LittleEndian>(dec.unscaled())?;
            out.write_u32::<LittleEndian>(dec.scale())
        }
        Datum::List(items) => {
            out.write_u8(TAG_LIST)?;
            write_len(out, items.len())?;
            items.iter().try_for_each(|i| write_datum(out, i))
        }
        Datum::Map(entries) => {
            out.write_u8(TAG_MAP)?;
            write_len(out, entries.len())?;
            for (k, v) in entries {
                write_datum(out, k)?;
                write_datum(out, v)?;
            }
            Ok(())
        }
        Datum::Struct(fields) => {
            out.write_u8(TAG_STRUCT)?;
            write_len(out, fields.len())?;
            fields.iter().try_for_each(|f| write_datum(out, f))
        }
        Datum::Union { tag, value } => {
            out.write_u8(TAG_UNION)?;
            out.write_u8(*tag)?;
            write_datum(out, value)
        }
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn read_len(cur: &mut Cursor<&[u8]>) -> io::Result<usize> {
    let len = cur.read_u32::<LittleEndian>()? as usize;
    let remaining = cur.get_ref().len() as u64 - cur.position();
    // 每个元素至少 1 字节，长度不可能超过剩余字节
    if len as u64 > remaining {
        return Err(invalid(format!("length {len} exceeds remaining {remaining} bytes")));
    }
    Ok(len)
}

fn read_datum(cur: &mut Cursor<&[u8]>) -> io::Result<Datum> {
    let tag = cur.read_u8()?;
    let d = match tag {
        TAG_NULL    => Datum::Null,
        TAG_BOOLEAN => Datum::Boolean(cur.read_u8()? != 0),
        TAG_LONG    => Datum::Long(cur.read_i64::<LittleEndian>()?),
        TAG_DOUBLE  => Datum::Double(cur.read_f64::<LittleEndian>()?),
        TAG_BYTES   => {
            let len = read_len(cur)?;
            let mut buf = vec![0u8; len];
            cur.read_exact(&mut buf)?;
            Datum::Bytes(buf)
        }
        TAG_DATE => Datum::Date(cur.read_i64::<LittleEndian>()?),
        TAG_TIMESTAMP => {
            let seconds = cur.read_i64::<LittleEndian>()?;
            let nanos = cur.read_u32::<LittleEndian>()?;
            Datum::Timestamp { seconds, nanos }
        }
        TAG_DECIMAL => {
            let unscaled = cur.read_i128::<LittleEndian>()?;
            let scale = cur.read_u32::<LittleEndian>()?;
            Datum::Decimal(Decimal::new(unscaled, scale))
        }
        TAG_LIST => {
            let len = read_len(cur)?;
            Datum::List((0..len).map(|_| read_datum(cur)).collect::<io::Result<_>>()?)
        }
        TAG_MAP => {
            let len = read_len(cur)?;
            let mut entries = Vec::with_capacity(len);
            for _ in 0..len {
                let k = read_datum(cur)?;
                let v = read_datum(cur)?;
                entries.push((k, v));
            }
            Datum::Map(entries)
        }
        TAG_STRUCT => {
            let len = read_len(cur)?;
            Datum::Struct((0..len).map(|_| read_datum(cur)).collect::<io::Result<_>>()?)
        }
        TAG_UNION => {
            let tag = cur.read_u8()?;
            Datum::Union { tag, value: Box::new(read_datum(cur)?) }
        }
        other => return Err(invalid(format!("unknown value tag {other}"))),
    };
    Ok(d)
}

// ── Direct ────────────────────────────────────────────────────────────────────
mod direct {
    use super::*;

    pub fn encode(values: &[Datum], out: &mut Vec<u8>) -> io::Result<()> {
        values.iter().try_for_each(|v| write_datum(out, v))
    }

    pub fn decode(cur: &mut Cursor<&[u8]>, count: usize) -> io::Result<Vec<Datum>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(read_datum(cur)?);
        }
        Ok(out)
    }
}

// ── Run-Length Encoding ───────────────────────────────────────────────────────
mod rle {
    use super::*;

    pub fn encode(values: &[Datum], out: &mut Vec<u8>) -> io::Result<()> {
        let Some(first) = values.first() else { return Ok(()) };
        let mut cur = first;
        let mut run: u32 = 1;

        for v in &values[1..] {
            if v == cur && run < u32::MAX {
                run += 1;
            } else {
                write_run(out, run, cur)?;
                cur = v;
                run = 1;
            }
        }
        write_run(out, run, cur)
    }

    fn write_run(out: &mut Vec<u8>, run: u32, v: &Datum) -> io::Result<()> {
        out.write_u32::<LittleEndian>(run)?;
        write_datum(out, v)
    }

    pub fn decode(cur: &mut Cursor<&[u8]>, count: usize) -> io::Result<Vec<Datum>> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let run = cur.read_u32::<LittleEndian>()? as usize;
            if run == 0 || out.len() + run > count {
                return Err(invalid(format!("run of {run} overflows {count} values")));
            }
            let v = read_datum(cur)?;
            out.extend(std::iter::repeat(v).take(run));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_values() -> Vec<Datum> {
        vec![
            Datum::Long(-7),
            Datum::Null,
            Datum::Map(vec![(Datum::string("k"), Datum::List(vec![Datum::Double(1.5)]))]),
            Datum::Union { tag: 1, value: Box::new(Datum::Decimal(Decimal::new(-125, 2))) },
            Datum::Timestamp { seconds: -3, nanos: 7 },
        ]
    }

    #[test]
    fn direct_preserves_nested_values() {
        let values = nested_values();
        let bytes = encode(&values, EncodingType::Direct).unwrap();
        assert_eq!(decode(&bytes, EncodingType::Direct, values.len()).unwrap(), values);
    }

    #[test]
    fn run_length_collapses_repeats() {
        let mut values = vec![Datum::Null; 500];
        values.extend(vec![Datum::Long(3); 500]);
        let bytes = encode(&values, EncodingType::RunLength).unwrap();
        assert!(bytes.len() < 32);
        assert_eq!(decode(&bytes, EncodingType::RunLength, 1000).unwrap(), values);
    }

    #[test]
    fn truncated_data_is_an_encoding_error() {
        let bytes = encode(&nested_values(), EncodingType::Direct).unwrap();
        let err = decode(&bytes[..bytes.len() - 3], EncodingType::Direct, 5).unwrap_err();
        assert!(matches!(err, EngineError::Encoding(_)));
    }

    #[test]
    fn run_overflowing_count_is_rejected() {
        let bytes = encode(&vec![Datum::Long(1); 10], EncodingType::RunLength).unwrap();
        assert!(decode(&bytes, EncodingType::RunLength, 4).is_err());
    }
}
