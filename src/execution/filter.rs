/// Evaluates each candidate group's equality predicates over hash-join match
/// chunks, producing one bitvector per atom.
use crate::execution::expression::FilterPredicate;
use crate::execution::hash_join::{HashJoin, HashJoinChunk};
use crate::storage::bitset::BitVector;

pub struct FilterChunk<'a> {
    pub join_chunk: HashJoinChunk<'a>,
    pub bit_vectors: Vec<BitVector>,
}

pub struct Filter<'a> {
    /// Indexed by [table_id][join_group_id].
    predicate_groups: Vec<Vec<Vec<FilterPredicate>>>,
    hash_join: HashJoin<'a>,
}

impl<'a> Filter<'a> {
    pub fn new(
        predicate_groups: Vec<Vec<Vec<FilterPredicate>>>,
        hash_join: HashJoin<'a>,
    ) -> Self {
        Self {
            predicate_groups,
            hash_join,
        }
    }

    pub fn next(&mut self) -> Option<FilterChunk<'a>> {
        let join_chunk = self.hash_join.next()?;
        let predicates =
            &self.predicate_groups[join_chunk.table_id][join_chunk.join_group_id];
        let mut bit_vectors = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            let mut bit_vector = BitVector::default();
            predicate.evaluate_for_join(
                join_chunk.probe_columns,
                join_chunk.build_columns,
                &join_chunk.probe_tids,
                &join_chunk.build_tids,
                &mut bit_vector,
            );
            bit_vectors.push(bit_vector);
        }
        Some(FilterChunk {
            join_chunk,
            bit_vectors,
        })
    }
}
