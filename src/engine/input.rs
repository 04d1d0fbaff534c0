//! 随机读输入源

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use super::error::{EngineError, EngineResult};

/// 引擎读取文件所需的最小接口：总长度 + 定位读
pub trait InputStream: Send + Sync {
    fn length(&self) -> u64;
    fn read_at(&self, offset: u64, len: usize) -> EngineResult<Vec<u8>>;
    fn name(&self) -> &str;
}

fn check_range(name: &str, total: u64, offset: u64, len: usize) -> EngineResult<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= total => Ok(()),
        _ => Err(EngineError::parse(format!(
            "{name}: read of {len} bytes at {offset} past end of input ({total} bytes)"
        ))),
    }
}

// ── MemoryInput ───────────────────────────────────────────────────────────────

pub struct MemoryInput {
    name: String,
    data: Vec<u8>,
}

impl MemoryInput {
    pub fn new(data: Vec<u8>) -> Self {
        Self { name: "memory".into(), data }
    }

    pub fn named(name: &str, data: Vec<u8>) -> Self {
        Self { name: name.into(), data }
    }
}

impl InputStream for MemoryInput {
    fn length(&self) -> u64 { self.data.len() as u64 }

    fn read_at(&self, offset: u64, len: usize) -> EngineResult<Vec<u8>> {
        check_range(&self.name, self.length(), offset, len)?;
        let start = offset as usize;
        Ok(self.data[start..start + len].to_vec())
    }

    fn name(&self) -> &str { &self.name }
}

// ── FileInput ─────────────────────────────────────────────────────────────────

pub struct FileInput {
    name:   String,
    length: u64,
    file:   Mutex<File>,
}

impl FileInput {
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self {
            name: path.display().to_string(),
            length,
            file: Mutex::new(file),
        })
    }
}

impl InputStream for FileInput {
    fn length(&self) -> u64 { self.length }

    fn read_at(&self, offset: u64, len: usize) -> EngineResult<Vec<u8>> {
        check_range(&self.name, self.length, offset, len)?;
        let mut file = self.file.lock()
            .map_err(|_| EngineError::Io(std::io::Error::other("input file lock poisoned")))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn name(&self) -> &str { &self.name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn memory_input_rejects_reads_past_end() {
        let input = MemoryInput::new(vec![1, 2, 3, 4]);
        assert_eq!(input.read_at(1, 2).unwrap(), vec![2, 3]);
        assert!(input.read_at(3, 2).unwrap_err().is_parse());
    }

    #[test]
    fn file_input_reads_ranges() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello stripes").unwrap();
        tmp.flush().unwrap();
        let input = FileInput::open(tmp.path()).unwrap();
        assert_eq!(input.length(), 13);
        assert_eq!(input.read_at(6, 7).unwrap(), b"stripes".to_vec());
    }
}
