/// Left and right semi-joins over a prebuilt chained hash table.
///
/// The left variant is chunked and lazily yields one bitmask per probe chunk;
/// the right variant marks matched build rows in a single set-once pass. The
/// factory hashes on the smaller side and probes with the other.
use crate::storage::bitset::{BitVector, BITS_PER_BLOCK};
use crate::storage::columnar::{Column, Table, Value};
use crate::storage::hash_table::{
    build_hash_table_on_table, hash_row, rows_equal, FoilHashTable,
};
use crate::execution::expression::AttributeReference;

/// One semi-join output block. `bitvector` marks surviving rows of the chunk;
/// `base_offset` is the chunk's first row id on the marked side, so
/// `base_offset + bit` addresses the full table.
pub struct SemiJoinChunk {
    pub output_columns: Vec<Column>,
    pub bitvector: BitVector,
    pub num_ones: usize,
    pub base_offset: usize,
}

pub trait SemiJoin {
    fn next(&mut self) -> Option<SemiJoinChunk>;
}

/// Chunked probe-side semi-join: bit `t` of a chunk marks probe rows with at
/// least one build match.
pub struct LeftSemiJoin<'a> {
    probe_table: &'a Table,
    build_hash_table: &'a FoilHashTable,
    probe_keys: Vec<Column>,
    build_keys: Vec<Column>,
    project_column_ids: Vec<usize>,
    chunk_size: usize,
    offset: usize,
}

impl<'a> LeftSemiJoin<'a> {
    pub fn new(
        probe_table: &'a Table,
        build_table: &'a Table,
        build_hash_table: &'a FoilHashTable,
        probe_keys: &[AttributeReference],
        build_keys: &[AttributeReference],
        project_column_ids: Vec<usize>,
        chunk_size: usize,
    ) -> Self {
        Self {
            probe_table,
            build_hash_table,
            probe_keys: probe_keys
                .iter()
                .map(|key| key.evaluate(probe_table.columns()).clone())
                .collect(),
            build_keys: build_keys
                .iter()
                .map(|key| key.evaluate(build_table.columns()).clone())
                .collect(),
            project_column_ids,
            chunk_size,
            offset: 0,
        }
    }

    fn probe_chunk(&self, chunk_offset: usize, num_tuples: usize, bitvector: &mut BitVector) {
        let probe_slices: Vec<&[Value]> = self.probe_keys.iter().map(|c| c.as_slice()).collect();
        let build_slices: Vec<&[Value]> = self.build_keys.iter().map(|c| c.as_slice()).collect();
        let mask_bucket = |tid: usize| {
            self.build_hash_table
                .bucket_index(hash_row(&probe_slices, tid), 0)
        };

        let full_blocks = bitvector.full_blocks();
        let extra_bits = bitvector.extra_bits();
        let blocks = bitvector.blocks_mut();
        let mut probe_tid = chunk_offset;
        let mut write_bits = |count: usize, probe_tid: &mut usize| -> u64 {
            let mut word = 0u64;
            for bit in 0..count {
                let bucket_id = mask_bucket(*probe_tid);
                let has_match = self
                    .build_hash_table
                    .chain(bucket_id)
                    .any(|build_position| {
                        rows_equal(&probe_slices, &build_slices, *probe_tid, build_position)
                    });
                word |= (has_match as u64) << bit;
                *probe_tid += 1;
            }
            word
        };
        for block in blocks.iter_mut().take(full_blocks) {
            *block = write_bits(BITS_PER_BLOCK, &mut probe_tid);
        }
        if extra_bits > 0 {
            blocks[full_blocks] = write_bits(extra_bits, &mut probe_tid);
        }
        debug_assert_eq!(probe_tid, chunk_offset + num_tuples);
    }
}

impl SemiJoin for LeftSemiJoin<'_> {
    fn next(&mut self) -> Option<SemiJoinChunk> {
        let total = self.probe_table.num_tuples();
        if self.offset >= total {
            return None;
        }
        let num_tuples = self.chunk_size.min(total - self.offset);
        let mut bitvector = BitVector::new(num_tuples);
        self.probe_chunk(self.offset, num_tuples, &mut bitvector);

        let output_columns = self
            .project_column_ids
            .iter()
            .map(|&column_id| self.probe_table.column_at(column_id).slice(self.offset, num_tuples))
            .collect();
        let base_offset = self.offset;
        self.offset += num_tuples;
        let num_ones = bitvector.count();
        Some(SemiJoinChunk {
            output_columns,
            bitvector,
            num_ones,
            base_offset,
        })
    }
}

/// Single-shot build-side semi-join: the bitmask marks distinct build rows
/// with at least one probe match.
pub struct RightSemiJoin<'a> {
    probe_table: &'a Table,
    build_table: &'a Table,
    build_hash_table: &'a FoilHashTable,
    probe_keys: Vec<Column>,
    build_keys: Vec<Column>,
    project_column_ids: Vec<usize>,
    finished: bool,
}

impl<'a> RightSemiJoin<'a> {
    pub fn new(
        probe_table: &'a Table,
        build_table: &'a Table,
        build_hash_table: &'a FoilHashTable,
        probe_keys: &[AttributeReference],
        build_keys: &[AttributeReference],
        project_column_ids: Vec<usize>,
    ) -> Self {
        Self {
            probe_table,
            build_table,
            build_hash_table,
            probe_keys: probe_keys
                .iter()
                .map(|key| key.evaluate(probe_table.columns()).clone())
                .collect(),
            build_keys: build_keys
                .iter()
                .map(|key| key.evaluate(build_table.columns()).clone())
                .collect(),
            project_column_ids,
            finished: false,
        }
    }
}

impl SemiJoin for RightSemiJoin<'_> {
    fn next(&mut self) -> Option<SemiJoinChunk> {
        if self.finished {
            return None;
        }
        self.finished = true;

        let probe_slices: Vec<&[Value]> = self.probe_keys.iter().map(|c| c.as_slice()).collect();
        let build_slices: Vec<&[Value]> = self.build_keys.iter().map(|c| c.as_slice()).collect();
        let mut bitvector = BitVector::new(self.build_table.num_tuples());
        for probe_tid in 0..self.probe_table.num_tuples() {
            let bucket_id = self
                .build_hash_table
                .bucket_index(hash_row(&probe_slices, probe_tid), 0);
            for build_position in self.build_hash_table.chain(bucket_id) {
                if rows_equal(&probe_slices, &build_slices, probe_tid, build_position) {
                    bitvector.set(build_position);
                }
            }
        }

        let output_columns = self
            .project_column_ids
            .iter()
            .map(|&column_id| self.build_table.column_at(column_id).clone())
            .collect();
        let num_ones = bitvector.count();
        Some(SemiJoinChunk {
            output_columns,
            bitvector,
            num_ones,
            base_offset: 0,
        })
    }
}

pub fn create_semi_join<'a>(
    left_semijoin: bool,
    probe_table: &'a Table,
    build_table: &'a Table,
    build_hash_table: &'a FoilHashTable,
    probe_keys: &[AttributeReference],
    build_keys: &[AttributeReference],
    project_column_ids: Vec<usize>,
    chunk_size: usize,
) -> Box<dyn SemiJoin + 'a> {
    debug_assert_eq!(probe_keys.len(), build_keys.len());
    if left_semijoin {
        Box::new(LeftSemiJoin::new(
            probe_table,
            build_table,
            build_hash_table,
            probe_keys,
            build_keys,
            project_column_ids,
            chunk_size,
        ))
    } else {
        Box::new(RightSemiJoin::new(
            probe_table,
            build_table,
            build_hash_table,
            probe_keys,
            build_keys,
            project_column_ids,
        ))
    }
}

/// Choose the smaller side as the build. The surviving-row bitmask always
/// marks rows of `output_table`, whichever side it ends up on; hash tables
/// built along the way are cached in the caller-provided slots.
#[allow(clippy::too_many_arguments)]
pub fn select_and_create_semi_join<'a>(
    output_table: &'a Table,
    other_table: &'a Table,
    output_hash_table: &'a mut Option<FoilHashTable>,
    other_hash_table: &'a mut Option<FoilHashTable>,
    output_join_keys: &[AttributeReference],
    other_join_keys: &[AttributeReference],
    project_column_ids: Vec<usize>,
    chunk_size: usize,
) -> Box<dyn SemiJoin + 'a> {
    if output_table.num_tuples() < other_table.num_tuples() {
        let hash_table: &FoilHashTable = output_hash_table.get_or_insert_with(|| {
            let keys: Vec<Column> = output_join_keys
                .iter()
                .map(|key| key.evaluate(output_table.columns()).clone())
                .collect();
            build_hash_table_on_table(&keys, output_table.num_tuples())
        });
        create_semi_join(
            false,
            other_table,
            output_table,
            hash_table,
            other_join_keys,
            output_join_keys,
            project_column_ids,
            chunk_size,
        )
    } else {
        let hash_table: &FoilHashTable = other_hash_table.get_or_insert_with(|| {
            let keys: Vec<Column> = other_join_keys
                .iter()
                .map(|key| key.evaluate(other_table.columns()).clone())
                .collect();
            build_hash_table_on_table(&keys, other_table.num_tuples())
        });
        create_semi_join(
            true,
            output_table,
            other_table,
            hash_table,
            output_join_keys,
            other_join_keys,
            project_column_ids,
            chunk_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: Vec<Vec<Value>>) -> Table {
        Table::new(columns.into_iter().map(Column::from_values).collect())
    }

    fn keys(ids: &[usize]) -> Vec<AttributeReference> {
        ids.iter().map(|&i| AttributeReference::new(i)).collect()
    }

    fn drain_marked(join: &mut dyn SemiJoin) -> Vec<usize> {
        let mut marked = Vec::new();
        while let Some(chunk) = join.next() {
            assert_eq!(chunk.num_ones, chunk.bitvector.count());
            marked.extend(chunk.bitvector.ones().map(|bit| chunk.base_offset + bit));
        }
        marked
    }

    #[test]
    fn test_left_semi_join_marks_matching_probe_rows() {
        let probe = table(vec![vec![1, 2, 3, 4, 5], vec![10, 20, 30, 40, 50]]);
        let build = table(vec![vec![2, 4, 4]]);
        let build_keys = keys(&[0]);
        let build_key_columns: Vec<Column> = vec![build.column_at(0).clone()];
        let hash_table = build_hash_table_on_table(&build_key_columns, build.num_tuples());

        let mut join = LeftSemiJoin::new(
            &probe,
            &build,
            &hash_table,
            &keys(&[0]),
            &build_keys,
            vec![0, 1],
            2, // force multiple chunks
        );
        let marked = drain_marked(&mut join);
        assert_eq!(marked, vec![1, 3]);
    }

    #[test]
    fn test_left_semi_join_idempotent_on_probe_side() {
        let probe = table(vec![vec![1, 2, 2, 3, 7, 8, 9]]);
        let build = table(vec![vec![2, 3, 9]]);
        let build_key_columns: Vec<Column> = vec![build.column_at(0).clone()];
        let hash_table = build_hash_table_on_table(&build_key_columns, build.num_tuples());

        let mut first = LeftSemiJoin::new(
            &probe, &build, &hash_table, &keys(&[0]), &keys(&[0]), vec![0], 4,
        );
        let mut surviving = Vec::new();
        while let Some(chunk) = first.next() {
            let values = chunk.output_columns[0].as_slice();
            surviving.extend(chunk.bitvector.ones().map(|bit| values[bit]));
        }
        let reduced = table(vec![surviving.clone()]);
        let mut second = LeftSemiJoin::new(
            &reduced, &build, &hash_table, &keys(&[0]), &keys(&[0]), vec![0], 4,
        );
        let mut surviving_again = Vec::new();
        while let Some(chunk) = second.next() {
            let values = chunk.output_columns[0].as_slice();
            surviving_again.extend(chunk.bitvector.ones().map(|bit| values[bit]));
        }
        assert_eq!(surviving, surviving_again);
    }

    #[test]
    fn test_right_semi_join_marks_distinct_build_rows() {
        let probe = table(vec![vec![5, 5, 6, 6, 6]]);
        let build = table(vec![vec![4, 5, 6, 7]]);
        let build_key_columns: Vec<Column> = vec![build.column_at(0).clone()];
        let hash_table = build_hash_table_on_table(&build_key_columns, build.num_tuples());

        let mut join = RightSemiJoin::new(
            &probe,
            &build,
            &hash_table,
            &keys(&[0]),
            &keys(&[0]),
            vec![0],
        );
        let marked = drain_marked(&mut join);
        assert_eq!(marked, vec![1, 2]);
        assert!(join.next().is_none());
    }

    #[test]
    fn test_factory_builds_on_smaller_side() {
        let small = table(vec![vec![1, 2]]);
        let large = table(vec![vec![1, 2, 3, 4, 5, 6]]);
        let mut small_hash_table = None;
        let mut large_hash_table = None;
        let mut join = select_and_create_semi_join(
            &small,
            &large,
            &mut small_hash_table,
            &mut large_hash_table,
            &keys(&[0]),
            &keys(&[0]),
            vec![0],
            1024,
        );
        // Right semi-join: chunks mark rows of the output (small) table.
        let chunk = join.next().unwrap();
        assert_eq!(chunk.bitvector.len(), 2);
        assert_eq!(chunk.num_ones, 2);
        drop(join);
        assert!(small_hash_table.is_some());
        assert!(large_hash_table.is_none());
    }

    #[test]
    fn test_multi_key_semi_join() {
        let probe = table(vec![vec![1, 1, 2], vec![10, 11, 10]]);
        let build = table(vec![vec![1, 2], vec![11, 10]]);
        let build_key_columns: Vec<Column> =
            vec![build.column_at(0).clone(), build.column_at(1).clone()];
        let hash_table = build_hash_table_on_table(&build_key_columns, build.num_tuples());
        let mut join = LeftSemiJoin::new(
            &probe,
            &build,
            &hash_table,
            &keys(&[0, 1]),
            &keys(&[0, 1]),
            vec![0],
            64,
        );
        let marked = drain_marked(&mut join);
        assert_eq!(marked, vec![1, 2]);
    }
}
