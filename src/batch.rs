//! 列式行批（RowBatch）
//!
//! 每个选中的顶层字段一列，`num_elements` 为本批有效行数。
//! 批由拉取它的游标独占，下一次拉取会覆盖其内容。

use crate::field_type::Datum;

#[derive(Debug, Clone)]
pub struct RowBatch {
    capacity:     usize,
    num_elements: usize,
    columns:      Vec<Vec<Datum>>,
}

impl RowBatch {
    pub fn new(capacity: usize, num_columns: usize) -> Self {
        Self {
            capacity,
            num_elements: 0,
            columns: (0..num_columns).map(|_| Vec::with_capacity(capacity)).collect(),
        }
    }

    pub fn capacity(&self) -> usize { self.capacity }
    pub fn num_elements(&self) -> usize { self.num_elements }
    pub fn num_columns(&self) -> usize { self.columns.len() }
    pub fn is_empty(&self) -> bool { self.num_elements == 0 }

    pub fn column(&self, index: usize) -> Option<&[Datum]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    pub fn slot(&self, column: usize, row: usize) -> Option<&Datum> {
        if row >= self.num_elements { return None; }
        self.columns.get(column).and_then(|c| c.get(row))
    }

    pub fn clear(&mut self) {
        for col in &mut self.columns { col.clear(); }
        self.num_elements = 0;
    }

    /// 用各列同一区间的切片重新填充本批；`rows` 单独给出以支持零列选择
    pub fn fill_from(&mut self, sources: &[&[Datum]], rows: usize) {
        self.clear();
        debug_assert!(rows <= self.capacity);
        debug_assert!(sources.iter().all(|s| s.len() == rows));
        self.columns.resize_with(sources.len(), Vec::new);
        for (col, src) in self.columns.iter_mut().zip(sources) {
            col.extend_from_slice(src);
        }
        self.num_elements = rows;
    }
}
