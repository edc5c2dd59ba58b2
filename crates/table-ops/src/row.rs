//! Row view over a record batch with typed accessors, used by selection
//! predicates.

use arrow::array::*;
use arrow::record_batch::RecordBatch;

/// A borrowed view of one row. Accessors return `None` on nulls and on
/// column type mismatches.
pub struct Row<'a> {
    batch: &'a RecordBatch,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn new(batch: &'a RecordBatch, index: usize) -> Self {
        Self { batch, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_null(&self, column: usize) -> bool {
        self.batch
            .columns()
            .get(column)
            .map(|c| c.is_null(self.index))
            .unwrap_or(true)
    }

    fn value<A: Array + 'static, T>(&self, column: usize, get: impl Fn(&A, usize) -> T) -> Option<T> {
        let array = self.batch.columns().get(column)?;
        if array.is_null(self.index) {
            return None;
        }
        array
            .as_any()
            .downcast_ref::<A>()
            .map(|a| get(a, self.index))
    }

    pub fn i64(&self, column: usize) -> Option<i64> {
        self.value::<Int64Array, _>(column, |a, i| a.value(i))
    }

    pub fn i32(&self, column: usize) -> Option<i32> {
        self.value::<Int32Array, _>(column, |a, i| a.value(i))
    }

    pub fn f64(&self, column: usize) -> Option<f64> {
        self.value::<Float64Array, _>(column, |a, i| a.value(i))
    }

    pub fn f32(&self, column: usize) -> Option<f32> {
        self.value::<Float32Array, _>(column, |a, i| a.value(i))
    }

    pub fn bool(&self, column: usize) -> Option<bool> {
        self.value::<BooleanArray, _>(column, |a, i| a.value(i))
    }

    pub fn str(&self, column: usize) -> Option<&'a str> {
        let array = self.batch.columns().get(column)?;
        if array.is_null(self.index) {
            return None;
        }
        array
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.value(self.index))
    }
}
