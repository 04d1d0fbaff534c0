//! 行游标
//!
//! [`RowCursor`] 在一个 [`RowStream`] 之上维护 {当前批, 批内下标, 逻辑行号, 流首行}，
//! 整个文件和单个 stripe 共用同一实现。`batch_item == 0` 表示当前批需要重新拉取。

use tracing::{debug, trace};

use crate::batch::RowBatch;
use crate::common::{ReaderError, Result};
use crate::convert::RowConverter;
use crate::engine::RowStream;
use crate::field_type::TypeDescription;
use crate::value::Value;

/// seek 的起点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// 流首行
    Start   = 0,
    /// 当前逻辑行
    Current = 1,
    /// 流末尾
    End     = 2,
}

impl TryFrom<i64> for Whence {
    type Error = ReaderError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Start),
            1 => Ok(Self::Current),
            2 => Ok(Self::End),
            _ => Err(ReaderError::invalid_argument("invalid value for whence")),
        }
    }
}

pub struct RowCursor {
    stream:      Box<dyn RowStream>,
    batch:       RowBatch,
    batch_item:  usize,
    /// 相对流首行
    current_row: u64,
    /// 流首行的文件绝对行号
    first_row:   u64,
    converter:   RowConverter,
}

impl RowCursor {
    pub fn new(stream: Box<dyn RowStream>, batch_size: usize, converter: RowConverter) -> Self {
        let batch = stream.create_batch(batch_size);
        let first_row = stream.row_number();
        Self { stream, batch, batch_item: 0, current_row: 0, first_row, converter }
    }

    pub fn current_row(&self) -> u64 { self.current_row }
    pub fn first_row(&self) -> u64 { self.first_row }
    pub fn len(&self) -> u64 { self.stream.number_of_rows() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn batch_size(&self) -> usize { self.batch.capacity() }
    pub fn selected_type(&self) -> &TypeDescription { self.stream.selected_type() }
    pub fn converter(&self) -> &RowConverter { &self.converter }

    /// 下一行；`Ok(None)` 表示已到末尾
    pub fn next_row(&mut self) -> Result<Option<Value>> {
        loop {
            if self.batch_item == 0 {
                if !self.stream.next_batch(&mut self.batch)? {
                    return Ok(None);
                }
                trace!(
                    row = self.first_row + self.current_row,
                    rows = self.batch.num_elements(),
                    "refilled batch"
                );
            }
            if self.batch_item < self.batch.num_elements() {
                let value = self.converter.convert_row(&self.batch, self.batch_item)?;
                self.batch_item += 1;
                self.current_row += 1;
                return Ok(Some(value));
            }
            self.batch_item = 0;
        }
    }

    /// 读取至多 `num` 行；-1 读到末尾
    pub fn read(&mut self, num: i64) -> Result<Vec<Value>> {
        if num < -1 {
            return Err(ReaderError::invalid_argument("read length must be positive or -1"));
        }
        let mut rows = Vec::new();
        while num == -1 || (rows.len() as i64) < num {
            match self.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// 重新定位，返回新的逻辑行号；目标须落在 `[0, len]` 内
    pub fn seek(&mut self, row: i64, whence: Whence) -> Result<u64> {
        let start = match whence {
            Whence::Start => {
                if row < 0 {
                    return Err(ReaderError::invalid_argument("invalid value for row"));
                }
                self.first_row
            }
            Whence::Current => self.current_row + self.first_row,
            Whence::End     => self.len() + self.first_row,
        };
        let target = start as i128 + row as i128;
        let end = (self.first_row + self.len()) as i128;
        if target < self.first_row as i128 || target > end {
            return Err(ReaderError::invalid_argument(format!(
                "cannot seek to row {target}, stream covers rows {} to {end}", self.first_row
            )));
        }
        self.stream.seek_to_row(target as u64)?;
        self.batch_item = 0;
        self.current_row = self.stream.row_number() - self.first_row;
        debug!(?whence, row, position = self.current_row, "seek");
        Ok(self.current_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConverterTable;
    use crate::engine::EngineResult;
    use crate::field_type::{Datum, TypeKind};
    use crate::value::StructRepr;

    /// 内存行流：`stripes` 给出每段的行数，批不跨段
    struct VecStream {
        ty:       TypeDescription,
        values:   Vec<i64>,
        stripes:  Vec<u64>,
        first:    u64,
        position: u64,
    }

    impl VecStream {
        fn new(first: u64, stripes: Vec<u64>) -> Self {
            let total: u64 = stripes.iter().sum();
            Self {
                ty: TypeDescription::struct_of(vec![("v", TypeDescription::primitive(TypeKind::Long))]),
                values: (0..total as i64).map(|i| i * 10).collect(),
                stripes, first, position: first,
            }
        }

        fn stripe_end(&self, pos: u64) -> u64 {
            let mut end = self.first;
            for rows in &self.stripes {
                end += rows;
                if pos < end { return end; }
            }
            end
        }
    }

    impl RowStream for VecStream {
        fn selected_type(&self) -> &TypeDescription { &self.ty }
        fn create_batch(&self, capacity: usize) -> RowBatch { RowBatch::new(capacity, 1) }

        fn next_batch(&mut self, batch: &mut RowBatch) -> EngineResult<bool> {
            if self.position >= self.first + self.number_of_rows() {
                return Ok(false);
            }
            let n = (self.stripe_end(self.position) - self.position).min(batch.capacity() as u64);
            let start = (self.position - self.first) as usize;
            let slice: Vec<Datum> = self.values[start..start + n as usize].iter().map(|&v| Datum::Long(v)).collect();
            batch.fill_from(&[&slice[..]], n as usize);
            self.position += n;
            Ok(true)
        }

        fn seek_to_row(&mut self, row: u64) -> EngineResult<()> {
            self.position = row;
            Ok(())
        }

        fn row_number(&self) -> u64 { self.position }
        fn number_of_rows(&self) -> u64 { self.stripes.iter().sum() }
    }

    fn cursor(first: u64, stripes: Vec<u64>, batch: usize) -> RowCursor {
        let stream = VecStream::new(first, stripes);
        let conv = RowConverter::new(stream.ty.clone(), ConverterTable::default(), StructRepr::Tuple).unwrap();
        RowCursor::new(Box::new(stream), batch, conv)
    }

    fn ints(rows: &[Value]) -> Vec<i64> {
        rows.iter().map(|r| r.get(0).and_then(Value::as_i64).unwrap()).collect()
    }

    #[test]
    fn next_crosses_batch_and_stripe_boundaries() {
        let mut c = cursor(0, vec![5, 3], 2);
        let mut seen = Vec::new();
        while let Some(row) = c.next_row().unwrap() {
            seen.push(row);
        }
        assert_eq!(ints(&seen), (0..8).map(|i| i * 10).collect::<Vec<_>>());
        assert_eq!(c.current_row(), 8);
        assert!(c.next_row().unwrap().is_none());
    }

    #[test]
    fn read_counts_and_drains() {
        let mut c = cursor(0, vec![6], 4);
        assert_eq!(ints(&c.read(0).unwrap()), Vec::<i64>::new());
        assert_eq!(ints(&c.read(3).unwrap()), vec![0, 10, 20]);
        assert_eq!(c.current_row(), 3);
        assert_eq!(ints(&c.read(-1).unwrap()), vec![30, 40, 50]);
        assert!(c.read(10).unwrap().is_empty());
        assert!(c.read(-2).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn seek_origins_are_relative_to_stream_start() {
        let mut c = cursor(100, vec![10], 3);
        assert_eq!(c.first_row(), 100);
        c.read(4).unwrap();
        assert_eq!(c.seek(-1, Whence::Current).unwrap(), 3);
        assert_eq!(ints(&c.read(1).unwrap()), vec![30]);
        assert_eq!(c.seek(-2, Whence::End).unwrap(), 8);
        assert_eq!(ints(&c.read(-1).unwrap()), vec![80, 90]);
        assert_eq!(c.seek(0, Whence::Start).unwrap(), 0);
        assert_eq!(ints(&c.read(1).unwrap()), vec![0]);
    }

    #[test]
    fn seek_to_end_then_next_is_exhausted() {
        let mut c = cursor(0, vec![4], 2);
        assert_eq!(c.seek(0, Whence::End).unwrap(), 4);
        assert!(c.next_row().unwrap().is_none());
    }

    #[test]
    fn invalid_seeks_leave_cursor_untouched() {
        let mut c = cursor(0, vec![4], 2);
        c.read(2).unwrap();
        assert!(c.seek(-1, Whence::Start).unwrap_err().is_invalid_argument());
        assert!(c.seek(5, Whence::Start).unwrap_err().is_invalid_argument());
        assert!(c.seek(1, Whence::End).unwrap_err().is_invalid_argument());
        assert_eq!(c.current_row(), 2);
        assert_eq!(ints(&c.read(1).unwrap()), vec![20]);
        assert!(Whence::try_from(3i64).unwrap_err().is_invalid_argument());
        assert_eq!(Whence::try_from(2i64).unwrap(), Whence::End);
    }
}
