/// Chained hash tables over partitions or whole tables.
///
/// A table is two integer arrays: `buckets` holds 1-based row indices
/// (0 = empty) and `next` chains rows that share a bucket. `num_buckets` is
/// the smallest power of two >= the row count; the mask is pre-shifted by the
/// radix-bit count so the same hash drives partition choice and bucket choice.
use crate::storage::columnar::{Column, ColumnPartitions, Value};

/// Hash used for partitioning, bucketing, and multi-key joins.
pub type HashValue = u32;

pub fn hash_value(value: Value) -> HashValue {
    fxhash::hash32(&value)
}

pub fn hash_combine(seed: HashValue, value: Value) -> HashValue {
    seed ^ hash_value(value)
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Multi-key hash combining the key columns in order.
#[inline]
pub fn hash_row(key_columns: &[&[Value]], tid: usize) -> HashValue {
    let mut seed = hash_value(key_columns[0][tid]);
    for column in &key_columns[1..] {
        seed = hash_combine(seed, column[tid]);
    }
    seed
}

#[inline]
pub fn rows_equal(
    left_columns: &[&[Value]],
    right_columns: &[&[Value]],
    left_tid: usize,
    right_tid: usize,
) -> bool {
    left_columns
        .iter()
        .zip(right_columns.iter())
        .all(|(l, r)| l[left_tid] == r[right_tid])
}

#[derive(Debug, Default)]
pub struct FoilHashTable {
    mask: u32,
    buckets: Vec<u32>,
    next: Vec<u32>,
}

impl FoilHashTable {
    /// Sentinel for empty partitions.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(num_rows: usize, radix_bits: u32) -> Self {
        let num_buckets = num_rows.max(1).next_power_of_two();
        Self {
            mask: ((num_buckets - 1) << radix_bits) as u32,
            buckets: vec![0; num_buckets],
            next: vec![0; num_rows],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    pub fn bucket_index(&self, hash: HashValue, radix_bits: u32) -> usize {
        ((hash & self.mask) >> radix_bits) as usize
    }

    #[inline]
    pub fn insert(&mut self, row: usize, bucket_id: usize) {
        self.next[row] = self.buckets[bucket_id];
        self.buckets[bucket_id] = row as u32 + 1;
    }

    /// Walk the chain of rows hashed to `bucket_id`, most recently inserted first.
    #[inline]
    pub fn chain(&self, bucket_id: usize) -> ChainIter<'_> {
        ChainIter {
            next: &self.next,
            current: self.buckets[bucket_id],
        }
    }
}

pub struct ChainIter<'a> {
    next: &'a [u32],
    current: u32,
}

impl Iterator for ChainIter<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.current == 0 {
            return None;
        }
        let row = (self.current - 1) as usize;
        self.current = self.next[row];
        Some(row)
    }
}

/// One hash table per partition, indexed by `(hash & mask) >> radix_bits`.
/// Empty partitions get the empty-table sentinel.
pub fn build_hash_tables_on_partitions(
    partitions: &ColumnPartitions,
    radix_bits: u32,
) -> Vec<FoilHashTable> {
    let mut hash_tables = Vec::with_capacity(partitions.num_partitions());
    for partition_id in 0..partitions.num_partitions() {
        let tuples = partitions.partition(partition_id);
        if tuples.is_empty() {
            hash_tables.push(FoilHashTable::empty());
            continue;
        }
        let mut hash_table = FoilHashTable::new(tuples.len(), radix_bits);
        for (index, tuple) in tuples.iter().enumerate() {
            let bucket_id = hash_table.bucket_index(hash_value(tuple.value), radix_bits);
            hash_table.insert(index, bucket_id);
        }
        hash_tables.push(hash_table);
    }
    hash_tables
}

/// Hash table over a whole (unpartitioned) table keyed by `key_columns`.
/// Duplicate keys are allowed; every tuple is chained.
pub fn build_hash_table_on_table(key_columns: &[Column], num_tuples: usize) -> FoilHashTable {
    debug_assert!(!key_columns.is_empty());
    let key_slices: Vec<&[Value]> = key_columns.iter().map(|c| c.as_slice()).collect();
    let mut hash_table = FoilHashTable::new(num_tuples, 0);
    for tid in 0..num_tuples {
        let bucket_id = hash_table.bucket_index(hash_row(&key_slices, tid), 0);
        hash_table.insert(tid, bucket_id);
    }
    hash_table
}

/// Deduplicated build from a semi-join result stream: each marked row is
/// inserted only when its key is not already present in its chain. Used to
/// index the distinct examples currently covered by a partial clause.
pub fn build_hash_table_after_semi_join(
    num_rows: usize,
    key_columns: &[Column],
    marked_tids: impl Iterator<Item = usize>,
) -> FoilHashTable {
    let key_slices: Vec<&[Value]> = key_columns.iter().map(|c| c.as_slice()).collect();
    let mut hash_table = FoilHashTable::new(num_rows.max(1), 0);
    for tid in marked_tids {
        let bucket_id = hash_table.bucket_index(hash_row(&key_slices, tid), 0);
        let exists = hash_table
            .chain(bucket_id)
            .any(|row| rows_equal(&key_slices, &key_slices, tid, row));
        if !exists {
            hash_table.insert(tid, bucket_id);
        }
    }
    hash_table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::columnar::PartitionTuple;

    #[test]
    fn test_chain_visits_every_equal_key() {
        let keys = vec![Column::from_values(vec![7, 3, 7, 7, 1])];
        let hash_table = build_hash_table_on_table(&keys, 5);
        let key_slices: Vec<&[Value]> = keys.iter().map(|c| c.as_slice()).collect();
        let bucket = hash_table.bucket_index(hash_row(&key_slices, 0), 0);
        let found: Vec<usize> = hash_table
            .chain(bucket)
            .filter(|&row| key_slices[0][row] == 7)
            .collect();
        assert_eq!(found.len(), 3);
        assert!(found.contains(&0) && found.contains(&2) && found.contains(&3));
    }

    #[test]
    fn test_build_on_partitions_indexes_all_tuples() {
        let radix_bits = 2;
        let tuples: Vec<PartitionTuple> = (0..16)
            .map(|i| PartitionTuple {
                value: i,
                tuple_id: i as u32,
            })
            .collect();
        // One partition holding everything; the others empty.
        let partitions = ColumnPartitions::new(tuples, vec![0, 16, 16, 16, 16]);
        let hash_tables = build_hash_tables_on_partitions(&partitions, radix_bits);
        assert_eq!(hash_tables.len(), 4);
        assert!(hash_tables[1].is_empty());
        let table = &hash_tables[0];
        for (index, tuple) in partitions.partition(0).iter().enumerate() {
            let bucket = table.bucket_index(hash_value(tuple.value), radix_bits);
            assert!(table.chain(bucket).any(|row| row == index));
        }
    }

    #[test]
    fn test_dedup_build_after_semi_join() {
        let keys = vec![Column::from_values(vec![1, 1, 2, 2, 3])];
        let hash_table = build_hash_table_after_semi_join(5, &keys, [0, 1, 2, 4].into_iter());
        let key_slices: Vec<&[Value]> = keys.iter().map(|c| c.as_slice()).collect();
        let mut distinct = 0;
        for value in [1, 2, 3] {
            let probe = vec![Column::from_values(vec![value])];
            let probe_slices: Vec<&[Value]> = probe.iter().map(|c| c.as_slice()).collect();
            let bucket = hash_table.bucket_index(hash_row(&probe_slices, 0), 0);
            let matches: Vec<usize> = hash_table
                .chain(bucket)
                .filter(|&row| rows_equal(&probe_slices, &key_slices, 0, row))
                .collect();
            distinct += matches.len();
        }
        // 1 and 2 deduplicated to one entry each; 3 present once.
        assert_eq!(distinct, 3);
    }

    #[test]
    fn test_bucket_count_is_power_of_two() {
        let table = FoilHashTable::new(5, 3);
        // 8 buckets, mask shifted by the radix bits.
        assert_eq!(table.mask(), (7 << 3) as u32);
    }
}
