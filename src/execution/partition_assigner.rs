/// Deterministic generator of probe chunks across (table, join group,
/// partition) in the fixed nested order partition -> table -> group -> chunk
/// offset. The count aggregator relies on exactly this order to detect
/// partition boundaries and reset per-partition coverage state.
use crate::error::{FoilError, FoilResult};
use crate::storage::columnar::{Column, ColumnPartitions, PartitionTuple, Table};

pub struct PartitionChunk<'a> {
    pub table_id: usize,
    pub join_group_id: usize,
    pub partition_id: usize,
    pub tuples: &'a [PartitionTuple],
    pub columns: &'a [Column],
}

pub struct PartitionAssigner<'a> {
    tables: Vec<&'a Table>,
    partitions: Vec<Vec<&'a ColumnPartitions>>,
    chunk_size: usize,
    num_partitions: usize,
    cur_table_id: usize,
    cur_join_group_id: usize,
    cur_partition_id: usize,
    cur_partition_offset: usize,
}

impl<'a> PartitionAssigner<'a> {
    /// `partition_column_ids[t]` lists the join-key columns of table `t`, one
    /// per join group. Every referenced column must already be partitioned.
    pub fn new(
        tables: Vec<&'a Table>,
        partition_column_ids: &[Vec<usize>],
        chunk_size: usize,
    ) -> FoilResult<Self> {
        debug_assert_eq!(tables.len(), partition_column_ids.len());
        let mut partitions = Vec::with_capacity(tables.len());
        for (table, column_ids) in tables.iter().zip(partition_column_ids) {
            let mut table_partitions = Vec::with_capacity(column_ids.len());
            for &column_id in column_ids {
                let column_partitions = table.partitions_at(column_id).ok_or_else(|| {
                    FoilError::logic(format!("column {column_id} is not partitioned"))
                })?;
                table_partitions.push(column_partitions);
            }
            partitions.push(table_partitions);
        }
        let num_partitions = partitions
            .first()
            .and_then(|t| t.first())
            .map(|p| p.num_partitions())
            .unwrap_or(0);
        debug_assert!(partitions
            .iter()
            .flatten()
            .all(|p| p.num_partitions() == num_partitions));
        Ok(Self {
            tables,
            partitions,
            chunk_size,
            num_partitions,
            cur_table_id: 0,
            cur_join_group_id: 0,
            cur_partition_id: 0,
            cur_partition_offset: 0,
        })
    }

    pub fn next(&mut self) -> Option<PartitionChunk<'a>> {
        if self.cur_partition_id >= self.num_partitions {
            return None;
        }
        loop {
            let partition = self.partitions[self.cur_table_id][self.cur_join_group_id]
                .partition(self.cur_partition_id);
            if self.cur_partition_offset >= partition.len() {
                if self.advance_join_group() {
                    return None;
                }
                continue;
            }
            let num_tuples = self
                .chunk_size
                .min(partition.len() - self.cur_partition_offset);
            let chunk =
                &partition[self.cur_partition_offset..self.cur_partition_offset + num_tuples];
            self.cur_partition_offset += num_tuples;
            return Some(PartitionChunk {
                table_id: self.cur_table_id,
                join_group_id: self.cur_join_group_id,
                partition_id: self.cur_partition_id,
                tuples: chunk,
                columns: self.tables[self.cur_table_id].columns(),
            });
        }
    }

    fn advance_join_group(&mut self) -> bool {
        self.cur_join_group_id += 1;
        self.cur_partition_offset = 0;
        if self.cur_join_group_id == self.partitions[self.cur_table_id].len() {
            return self.advance_table();
        }
        false
    }

    fn advance_table(&mut self) -> bool {
        self.cur_table_id += 1;
        self.cur_join_group_id = 0;
        if self.cur_table_id == self.tables.len() {
            return self.advance_partition();
        }
        false
    }

    fn advance_partition(&mut self) -> bool {
        self.cur_partition_id += 1;
        self.cur_table_id = 0;
        self.cur_join_group_id = 0;
        self.cur_partition_id == self.num_partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::radix_partition::radix_partition;
    use crate::storage::columnar::Column;

    fn partitioned_table(values: Vec<Vec<i32>>, key_columns: &[usize], radix_bits: u32) -> Table {
        let table = Table::new(values.into_iter().map(Column::from_values).collect());
        for &column_id in key_columns {
            radix_partition(&table, column_id, radix_bits);
        }
        table
    }

    #[test]
    fn test_nested_emission_order() {
        let radix_bits = 2;
        let table_a = partitioned_table(
            vec![(0..40).collect(), (100..140).collect()],
            &[0, 1],
            radix_bits,
        );
        let table_b = partitioned_table(vec![(0..30).collect()], &[0], radix_bits);

        let mut assigner = PartitionAssigner::new(
            vec![&table_a, &table_b],
            &[vec![0, 1], vec![0]],
            8,
        )
        .unwrap();

        let mut emitted = Vec::new();
        let mut total_tuples = 0;
        while let Some(chunk) = assigner.next() {
            emitted.push((chunk.partition_id, chunk.table_id, chunk.join_group_id));
            total_tuples += chunk.tuples.len();
        }
        // Partition outermost, then table, then group; order is
        // non-decreasing lexicographically.
        assert!(emitted.windows(2).all(|w| w[0] <= w[1]));
        // Every (partition, table, group) combination with tuples shows up.
        assert_eq!(total_tuples, 40 + 40 + 30);
    }

    #[test]
    fn test_chunks_respect_chunk_size() {
        let table = partitioned_table(vec![(0..100).collect()], &[0], 1);
        let mut assigner = PartitionAssigner::new(vec![&table], &[vec![0]], 16).unwrap();
        let mut total = 0;
        while let Some(chunk) = assigner.next() {
            assert!(chunk.tuples.len() <= 16);
            total += chunk.tuples.len();
        }
        assert_eq!(total, 100);
    }

    #[test]
    fn test_unpartitioned_column_is_a_logic_error() {
        let table = Table::new(vec![Column::from_values(vec![1, 2, 3])]);
        assert!(PartitionAssigner::new(vec![&table], &[vec![0]], 8).is_err());
    }
}
