//! Bloom Filter 索引
//!
//! 每个 stripe 内、每个开启 bloom 的列，按 row group 各一个 [`BloomFilter`]，
//! 组成该列在该 stripe 的 [`BloomFilterIndex`]。
//!
//! 哈希：整数（含 date、timestamp 毫秒）走 64 位整数混洗，浮点按位模式，
//! 字符串 / 二进制 / decimal 按字节 FNV-1a；再以双哈希 h1 + i·h2 定位 k 个比特。

use serde::{Deserialize, Serialize};

use crate::field_type::Datum;

// ── Bloom Filter ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    bits:          Vec<u64>,
    num_bits:      u64,
    num_functions: u32,
}

impl BloomFilter {
    /// 按期望元素数与误判率建表：m = -n·ln(p) / ln²2，k = round(m/n · ln2)
    pub fn new(expected_entries: usize, fpp: f64) -> Self {
        let n = expected_entries.max(1) as f64;
        let p = fpp.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;
        let num_bits = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_bits = num_bits.div_ceil(64) * 64;
        let num_functions = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 16.0) as u32;
        Self {
            bits: vec![0u64; (num_bits / 64) as usize],
            num_bits,
            num_functions,
        }
    }

    pub fn num_bits(&self) -> u64 { self.num_bits }
    pub fn num_functions(&self) -> u32 { self.num_functions }

    /// 反序列化得到的过滤器须满足：num_bits > 0 且位数组足够容纳 num_bits
    pub fn is_well_formed(&self) -> bool {
        self.num_bits > 0 && (self.bits.len() as u64).saturating_mul(64) >= self.num_bits
    }

    fn probe_bits(&self, hash: u64) -> impl Iterator<Item = u64> + '_ {
        let h1 = hash as u32 as i32;
        let h2 = (hash >> 32) as u32 as i32;
        (1..=self.num_functions as i32).map(move |i| {
            let mut combined = h1.wrapping_add(i.wrapping_mul(h2));
            if combined < 0 {
                combined = !combined;
            }
            combined as u64 % self.num_bits
        })
    }

    fn add_hash(&mut self, hash: u64) {
        let positions: Vec<u64> = self.probe_bits(hash).collect();
        for bit in positions {
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    fn test_hash(&self, hash: u64) -> bool {
        self.probe_bits(hash)
            .all(|bit| self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0)
    }

    pub fn add_long(&mut self, v: i64)     { self.add_hash(hash_long(v)) }
    pub fn add_double(&mut self, v: f64)   { self.add_hash(hash_long(v.to_bits() as i64)) }
    pub fn add_bytes(&mut self, v: &[u8])  { self.add_hash(hash_bytes(v)) }

    pub fn test_long(&self, v: i64) -> bool    { self.test_hash(hash_long(v)) }
    pub fn test_double(&self, v: f64) -> bool  { self.test_hash(hash_long(v.to_bits() as i64)) }
    pub fn test_bytes(&self, v: &[u8]) -> bool { self.test_hash(hash_bytes(v)) }

    /// 写入一个原始值；null 与 compound 值不参与
    pub fn add_datum(&mut self, d: &Datum) {
        if let Some(hash) = datum_hash(d) {
            self.add_hash(hash);
        }
    }

    /// 可能包含返回 true；null 与 compound 值无法判定，按可能包含处理
    pub fn test_datum(&self, d: &Datum) -> bool {
        datum_hash(d).map(|h| self.test_hash(h)).unwrap_or(true)
    }
}

/// Thomas Wang 64 位整数混洗
fn hash_long(key: i64) -> u64 {
    let mut key = key as u64;
    key = (!key).wrapping_add(key << 21);
    key ^= key >> 24;
    key = key.wrapping_add(key << 3).wrapping_add(key << 8);
    key ^= key >> 14;
    key = key.wrapping_add(key << 2).wrapping_add(key << 4);
    key ^= key >> 28;
    key.wrapping_add(key << 31)
}

fn hash_bytes(value: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in value {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn datum_hash(d: &Datum) -> Option<u64> {
    match d {
        Datum::Long(v) | Datum::Date(v) => Some(hash_long(*v)),
        Datum::Double(v)  => Some(hash_long(v.to_bits() as i64)),
        Datum::Bytes(b)   => Some(hash_bytes(b)),
        Datum::Decimal(x) => Some(hash_bytes(x.to_string().as_bytes())),
        Datum::Timestamp { .. } => d.timestamp_millis().map(hash_long),
        _ => None,
    }
}

// ── Bloom Filter Index ────────────────────────────────────────────────────────

/// 一个 stripe 内一列的 bloom 条目，每个 row group 一个
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilterIndex {
    pub entries: Vec<BloomFilter>,
}

impl BloomFilterIndex {
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
