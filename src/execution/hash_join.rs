/// Partitioned probe against the binding table's per-partition hash tables.
/// Each emitted chunk carries the matched (probe tid, build tid, build
/// position within the partition) triples; empty chunks are skipped.
use crate::error::{FoilError, FoilResult};
use crate::execution::partition_assigner::PartitionAssigner;
use crate::storage::columnar::{Column, ColumnPartitions, Table, TupleId};
use crate::storage::hash_table::{hash_value, FoilHashTable};

pub struct HashJoinChunk<'a> {
    pub table_id: usize,
    pub join_group_id: usize,
    pub partition_id: usize,
    /// Row count of the build partition, for sizing coverage bitvectors.
    pub binding_partition_size: usize,
    pub probe_columns: &'a [Column],
    pub build_columns: &'a [Column],
    pub probe_tids: Vec<TupleId>,
    pub build_tids: Vec<TupleId>,
    pub build_relative_tids: Vec<TupleId>,
}

pub struct HashJoin<'a> {
    assigner: PartitionAssigner<'a>,
    build_columns: &'a [Column],
    build_partitions: &'a ColumnPartitions,
    build_hash_tables: &'a [FoilHashTable],
    radix_bits: u32,
}

impl<'a> HashJoin<'a> {
    pub fn new(
        build_table: &'a Table,
        build_column_id: usize,
        assigner: PartitionAssigner<'a>,
        radix_bits: u32,
    ) -> FoilResult<Self> {
        let build_partitions = build_table.partitions_at(build_column_id).ok_or_else(|| {
            FoilError::logic(format!("build column {build_column_id} is not partitioned"))
        })?;
        let build_hash_tables = build_table.hash_tables_at(build_column_id).ok_or_else(|| {
            FoilError::logic(format!("build column {build_column_id} has no hash tables"))
        })?;
        Ok(Self {
            assigner,
            build_columns: build_table.columns(),
            build_partitions,
            build_hash_tables,
            radix_bits,
        })
    }

    pub fn next(&mut self) -> Option<HashJoinChunk<'a>> {
        loop {
            let chunk = self.assigner.next()?;
            let build_partition = self.build_partitions.partition(chunk.partition_id);
            if build_partition.is_empty() {
                continue;
            }
            let hash_table = &self.build_hash_tables[chunk.partition_id];

            let mut probe_tids = Vec::with_capacity(chunk.tuples.len());
            let mut build_tids = Vec::with_capacity(chunk.tuples.len());
            let mut build_relative_tids = Vec::with_capacity(chunk.tuples.len());
            for probe_tuple in chunk.tuples {
                let bucket_id =
                    hash_table.bucket_index(hash_value(probe_tuple.value), self.radix_bits);
                for build_position in hash_table.chain(bucket_id) {
                    if build_partition[build_position].value == probe_tuple.value {
                        probe_tids.push(probe_tuple.tuple_id);
                        build_tids.push(build_partition[build_position].tuple_id);
                        build_relative_tids.push(build_position as TupleId);
                    }
                }
            }
            if build_tids.is_empty() {
                continue;
            }
            return Some(HashJoinChunk {
                table_id: chunk.table_id,
                join_group_id: chunk.join_group_id,
                partition_id: chunk.partition_id,
                binding_partition_size: build_partition.len(),
                probe_columns: chunk.columns,
                build_columns: self.build_columns,
                probe_tids,
                build_tids,
                build_relative_tids,
            });
        }
    }
}
