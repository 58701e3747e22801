/// Columnar storage primitives: values, ref-counted column views, partition
/// tuples, and tables with lazily-populated partition/hash-table side arrays.
use std::cell::OnceCell;
use std::sync::Arc;

use crate::storage::hash_table::FoilHashTable;

/// All tuple fields are fixed-width integer identifiers; richer domains are
/// pre-mapped to values by the loader.
pub type Value = i32;

/// Row position within a table.
pub type TupleId = u32;

/// A contiguous immutable run of values, possibly a view into a shared parent
/// buffer. Cloning shares the underlying buffer.
#[derive(Clone, Debug)]
pub struct Column {
    data: Arc<Vec<Value>>,
    offset: usize,
    len: usize,
}

impl Column {
    pub fn from_values(values: Vec<Value>) -> Self {
        let len = values.len();
        Self {
            data: Arc::new(values),
            offset: 0,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.data[self.offset..self.offset + self.len]
    }

    pub fn value_at(&self, tid: usize) -> Value {
        self.as_slice()[tid]
    }

    /// Zero-copy sub-view sharing the underlying buffer.
    pub fn slice(&self, offset: usize, len: usize) -> Column {
        debug_assert!(offset + len <= self.len);
        Column {
            data: Arc::clone(&self.data),
            offset: self.offset + offset,
            len,
        }
    }
}

/// A `(value, original tuple id)` pair; partition arrays are runs of these.
/// Eight tuples pack one 64-byte cache line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct PartitionTuple {
    pub value: Value,
    pub tuple_id: TupleId,
}

/// The radix-partitioned form of one column: a single permuted tuple array
/// plus partition boundaries. Partition `p` holds exactly the tuples whose
/// value hashes to `p` under the configured radix mask.
#[derive(Clone, Debug)]
pub struct ColumnPartitions {
    tuples: Vec<PartitionTuple>,
    offsets: Vec<usize>,
}

impl ColumnPartitions {
    pub fn new(tuples: Vec<PartitionTuple>, offsets: Vec<usize>) -> Self {
        debug_assert!(!offsets.is_empty());
        debug_assert_eq!(*offsets.last().unwrap_or(&0), tuples.len());
        Self { tuples, offsets }
    }

    pub fn num_partitions(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn partition(&self, partition_id: usize) -> &[PartitionTuple] {
        &self.tuples[self.offsets[partition_id]..self.offsets[partition_id + 1]]
    }

    pub fn num_tuples(&self) -> usize {
        self.tuples.len()
    }
}

/// An ordered sequence of equal-length columns. A table additionally owns,
/// per column, an optional partition array and an optional hash-table array,
/// each populated at most once and never mutated afterwards.
#[derive(Debug)]
pub struct Table {
    columns: Vec<Column>,
    partitions: Vec<OnceCell<ColumnPartitions>>,
    hash_tables: Vec<OnceCell<Vec<FoilHashTable>>>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        debug_assert!(!columns.is_empty());
        debug_assert!(columns.windows(2).all(|w| w[0].len() == w[1].len()));
        let num_columns = columns.len();
        Self {
            columns,
            partitions: (0..num_columns).map(|_| OnceCell::new()).collect(),
            hash_tables: (0..num_columns).map(|_| OnceCell::new()).collect(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_at(&self, column_id: usize) -> &Column {
        &self.columns[column_id]
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_tuples(&self) -> usize {
        self.columns[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_tuples() == 0
    }

    /// A new table sharing this table's column buffers, without the side arrays.
    pub fn clone_view(&self) -> Table {
        Table::new(self.columns.clone())
    }

    pub fn partitions_at(&self, column_id: usize) -> Option<&ColumnPartitions> {
        self.partitions[column_id].get()
    }

    /// Populate the partition array for a column. The array may be set at most
    /// once per column; a second set is ignored.
    pub fn set_partitions_at(&self, column_id: usize, partitions: ColumnPartitions) {
        let _ = self.partitions[column_id].set(partitions);
    }

    pub fn hash_tables_at(&self, column_id: usize) -> Option<&[FoilHashTable]> {
        self.hash_tables[column_id].get().map(|v| v.as_slice())
    }

    pub fn set_hash_tables_at(&self, column_id: usize, hash_tables: Vec<FoilHashTable>) {
        let _ = self.hash_tables[column_id].set(hash_tables);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_slice_shares_buffer() {
        let column = Column::from_values(vec![1, 2, 3, 4, 5]);
        let view = column.slice(1, 3);
        assert_eq!(view.as_slice(), &[2, 3, 4]);
        assert_eq!(view.slice(1, 1).as_slice(), &[3]);
        assert_eq!(column.len(), 5);
    }

    #[test]
    fn test_table_side_arrays_set_once() {
        let table = Table::new(vec![Column::from_values(vec![1, 2, 3])]);
        assert!(table.partitions_at(0).is_none());
        let parts = ColumnPartitions::new(
            vec![
                PartitionTuple { value: 1, tuple_id: 0 },
                PartitionTuple { value: 2, tuple_id: 1 },
                PartitionTuple { value: 3, tuple_id: 2 },
            ],
            vec![0, 3],
        );
        table.set_partitions_at(0, parts);
        assert_eq!(table.partitions_at(0).map(|p| p.num_tuples()), Some(3));
    }
}
