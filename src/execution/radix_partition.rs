/// Radix partitioning with a software write-combining buffer.
///
/// Two passes over the column: a histogram pass fixes every partition's base
/// offset, then tuples are staged in one cache-line-sized buffer per
/// partition and streamed to the output a whole 64-byte line at a time. No
/// partial line is written until the final flush. A line that straddles two
/// partitions may transiently carry stale leading slots after the later
/// partition streams it; the earlier partition's final flush rewrites exactly
/// those slots.
use std::mem;

use crate::storage::columnar::{Column, ColumnPartitions, PartitionTuple, Table};
use crate::storage::hash_table::hash_value;

pub const CACHE_LINE_BYTES: usize = 64;

/// Tuples per cache line; the tuple size divides the line size exactly.
pub const LINE_CAPACITY: usize = CACHE_LINE_BYTES / mem::size_of::<PartitionTuple>();

#[derive(Clone, Copy)]
#[repr(C, align(64))]
struct WriteCombiningLine {
    tuples: [PartitionTuple; LINE_CAPACITY],
}

impl Default for WriteCombiningLine {
    fn default() -> Self {
        Self {
            tuples: [PartitionTuple::default(); LINE_CAPACITY],
        }
    }
}

/// Partition a column into `2^radix_bits` tuple runs; their concatenation
/// permutes the input and tuple `t` lands in partition
/// `hash(t.value) & ((1 << radix_bits) - 1)`.
pub fn radix_partition_column(column: &Column, radix_bits: u32) -> ColumnPartitions {
    debug_assert!(radix_bits > 0);
    let num_partitions = 1usize << radix_bits;
    let mask = (num_partitions - 1) as u32;
    let values = column.as_slice();
    let total_num_tuples = values.len();

    let mut histogram = vec![0usize; num_partitions];
    for &value in values {
        histogram[(hash_value(value) & mask) as usize] += 1;
    }

    let mut offsets = Vec::with_capacity(num_partitions + 1);
    offsets.push(0);
    for &count in &histogram {
        offsets.push(offsets[offsets.len() - 1] + count);
    }

    if total_num_tuples == 0 {
        return ColumnPartitions::new(Vec::new(), offsets);
    }

    let num_lines = total_num_tuples.div_ceil(LINE_CAPACITY);
    let mut output = vec![PartitionTuple::default(); num_lines * LINE_CAPACITY];

    let mut write_buffer = vec![WriteCombiningLine::default(); num_partitions];
    let mut line_slots = vec![0u32; num_partitions];
    let mut fill_slots = vec![0u8; num_partitions];
    let mut original_line_slots = vec![0u32; num_partitions];
    let mut original_fill_slots = vec![0u8; num_partitions];
    for partition_id in 0..num_partitions {
        let base = offsets[partition_id];
        line_slots[partition_id] = (base / LINE_CAPACITY) as u32;
        fill_slots[partition_id] = (base % LINE_CAPACITY) as u8;
        original_line_slots[partition_id] = line_slots[partition_id];
        original_fill_slots[partition_id] = fill_slots[partition_id];
    }

    for (tuple_id, &value) in values.iter().enumerate() {
        let partition_id = (hash_value(value) & mask) as usize;
        let slot = fill_slots[partition_id] as usize;
        write_buffer[partition_id].tuples[slot] = PartitionTuple {
            value,
            tuple_id: tuple_id as u32,
        };
        if slot == LINE_CAPACITY - 1 {
            let line = line_slots[partition_id] as usize;
            output[line * LINE_CAPACITY..(line + 1) * LINE_CAPACITY]
                .copy_from_slice(&write_buffer[partition_id].tuples);
            line_slots[partition_id] += 1;
            fill_slots[partition_id] = 0;
        } else {
            fill_slots[partition_id] += 1;
        }
    }

    // Flush residual tuples. A partition that streamed at least one full line
    // owns every leading slot of its last line; one that never streamed must
    // leave its neighbours' slots untouched.
    for partition_id in 0..num_partitions {
        let line = line_slots[partition_id] as usize;
        let filled = fill_slots[partition_id] as usize;
        let base = line * LINE_CAPACITY;
        if line_slots[partition_id] != original_line_slots[partition_id] {
            output[base..base + filled].copy_from_slice(&write_buffer[partition_id].tuples[..filled]);
        } else {
            let start = original_fill_slots[partition_id] as usize;
            output[base + start..base + filled]
                .copy_from_slice(&write_buffer[partition_id].tuples[start..filled]);
        }
    }

    output.truncate(total_num_tuples);
    ColumnPartitions::new(output, offsets)
}

/// Populate a table's partition array for one column.
pub fn radix_partition(table: &Table, column_id: usize, radix_bits: u32) {
    debug_assert!(table.partitions_at(column_id).is_none());
    let partitions = radix_partition_column(table.column_at(column_id), radix_bits);
    table.set_partitions_at(column_id, partitions);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn check_permutation(values: &[i32], radix_bits: u32) {
        let column = Column::from_values(values.to_vec());
        let partitions = radix_partition_column(&column, radix_bits);
        let mask = ((1usize << radix_bits) - 1) as u32;

        assert_eq!(partitions.num_partitions(), 1 << radix_bits);
        assert_eq!(partitions.num_tuples(), values.len());

        // Histogram prediction: each partition has exactly the tuples whose
        // hash maps to it.
        let mut expected_sizes = vec![0usize; 1 << radix_bits];
        for &v in values {
            expected_sizes[(hash_value(v) & mask) as usize] += 1;
        }

        let mut seen_tids = HashMap::new();
        for partition_id in 0..partitions.num_partitions() {
            let tuples = partitions.partition(partition_id);
            assert_eq!(tuples.len(), expected_sizes[partition_id]);
            for tuple in tuples {
                assert_eq!((hash_value(tuple.value) & mask) as usize, partition_id);
                assert_eq!(values[tuple.tuple_id as usize], tuple.value);
                *seen_tids.entry(tuple.tuple_id).or_insert(0) += 1;
            }
        }
        // Every tuple appears exactly once: the output is a permutation.
        assert_eq!(seen_tids.len(), values.len());
        assert!(seen_tids.values().all(|&count| count == 1));
    }

    #[test]
    fn test_permutation_across_sizes_and_radix_bits() {
        for &n in &[10usize, 20, 40, 100, 1000, 100000] {
            let values: Vec<i32> = (0..n as i32).collect();
            for &radix_bits in &[1u32, 3, 7, 12] {
                check_permutation(&values, radix_bits);
            }
        }
    }

    #[test]
    fn test_constant_column_lands_in_one_partition() {
        let values = vec![0i32; 1000];
        let radix_bits = 5;
        let column = Column::from_values(values.clone());
        let partitions = radix_partition_column(&column, radix_bits);
        let expected = (hash_value(0) & ((1 << radix_bits) - 1)) as usize;
        for partition_id in 0..partitions.num_partitions() {
            let len = partitions.partition(partition_id).len();
            if partition_id == expected {
                assert_eq!(len, 1000);
            } else {
                assert_eq!(len, 0);
            }
        }
    }

    #[test]
    fn test_empty_column() {
        let column = Column::from_values(Vec::new());
        let partitions = radix_partition_column(&column, 3);
        assert_eq!(partitions.num_partitions(), 8);
        assert_eq!(partitions.num_tuples(), 0);
    }

    #[test]
    fn test_skewed_values() {
        let mut values = vec![42i32; 500];
        values.extend(0..500);
        check_permutation(&values, 4);
    }

    #[test]
    fn test_tuples_pack_cache_lines() {
        assert_eq!(CACHE_LINE_BYTES % mem::size_of::<PartitionTuple>(), 0);
        assert_eq!(LINE_CAPACITY * mem::size_of::<PartitionTuple>(), CACHE_LINE_BYTES);
    }
}
