/// Drains the filter stream, maintaining per-candidate binding counters and
/// per-partition coverage bitvectors for every plan node that carries a
/// candidate. Partition transitions are detected from the assigner's stable
/// emission order.
use crate::execution::filter::{Filter, FilterChunk};
use crate::learner::candidate_info::CandidateLiteralInfo;
use crate::learner::evaluation_plan::PredicateEvaluationPlan;
use crate::storage::bitset::{BitVector, BITS_PER_BLOCK};
use crate::storage::columnar::TupleId;

pub struct CountAggregator<'a, 'r> {
    filter: Filter<'a>,
    /// Indexed by [table_id][join_group_id].
    plans: Vec<Vec<PredicateEvaluationPlan>>,
    results: &'r mut [CandidateLiteralInfo],
}

impl<'a, 'r> CountAggregator<'a, 'r> {
    pub fn new(
        filter: Filter<'a>,
        plans: Vec<Vec<PredicateEvaluationPlan>>,
        results: &'r mut [CandidateLiteralInfo],
    ) -> Self {
        Self {
            filter,
            plans,
            results,
        }
    }

    /// Integral binding data: labels split by tuple-id range, positive iff
    /// `build_tid < num_positive`.
    pub fn execute(&mut self, num_positive: usize) {
        while let Some(chunk) = self.filter.next() {
            let plan = &mut self.plans[chunk.join_chunk.table_id][chunk.join_chunk.join_group_id];
            if plan.saved_partition_id != Some(chunk.join_chunk.partition_id) {
                plan.reset_coverage(chunk.join_chunk.binding_partition_size, true, true);
                plan.saved_partition_id = Some(chunk.join_chunk.partition_id);
            }

            let relative_tids = &chunk.join_chunk.build_relative_tids;
            if plan.num_atom_nodes == 0 {
                // Fast path: a single candidate matching every joined tuple.
                let Some(literal_index) = plan.root_literal else {
                    continue;
                };
                let info = &mut self.results[literal_index];
                for (i, &build_tid) in chunk.join_chunk.build_tids.iter().enumerate() {
                    if (build_tid as usize) < num_positive {
                        info.num_binding_positive += 1;
                        if !plan
                            .root_positive_coverage
                            .test_set(relative_tids[i] as usize)
                        {
                            info.num_covered_positive += 1;
                        }
                    } else {
                        info.num_binding_negative += 1;
                        if !plan
                            .root_negative_coverage
                            .test_set(relative_tids[i] as usize)
                        {
                            info.num_covered_negative += 1;
                        }
                    }
                }
                continue;
            }

            let positive_labels =
                label_bit_vector(num_positive, &chunk.join_chunk.build_tids);
            let mut negative_labels = positive_labels.clone();
            negative_labels.flip();

            if let Some(literal_index) = plan.root_literal {
                let num_positives = positive_labels.count();
                let num_negatives = chunk.join_chunk.build_tids.len() - num_positives;
                let info = &mut self.results[literal_index];
                info.num_binding_positive += num_positives;
                info.num_binding_negative += num_negatives;
                update_coverage(
                    relative_tids,
                    &positive_labels,
                    &mut info.num_covered_positive,
                    &mut plan.root_positive_coverage,
                );
                update_coverage(
                    relative_tids,
                    &negative_labels,
                    &mut info.num_covered_negative,
                    &mut plan.root_negative_coverage,
                );
            }

            Self::assign_node_bitvectors(plan, &chunk);
            for node_id in 0..plan.nodes.len() {
                let Some(literal_index) = plan.nodes[node_id].literal else {
                    continue;
                };
                let positive_hits = &plan.nodes[node_id].bit_vector & &positive_labels;
                let negative_hits = &plan.nodes[node_id].bit_vector & &negative_labels;
                let info = &mut self.results[literal_index];
                info.num_binding_positive += positive_hits.count();
                info.num_binding_negative += negative_hits.count();
                let node = &mut plan.nodes[node_id];
                update_coverage(
                    relative_tids,
                    &positive_hits,
                    &mut info.num_covered_positive,
                    &mut node.positive_coverage,
                );
                update_coverage(
                    relative_tids,
                    &negative_hits,
                    &mut info.num_covered_negative,
                    &mut node.negative_coverage,
                );
            }
        }
    }

    pub fn execute_on_positives(&mut self) {
        self.execute_on_one_label(true);
    }

    pub fn execute_on_negatives(&mut self) {
        self.execute_on_one_label(false);
    }

    /// Split binding data: every joined tuple carries the run's label, so the
    /// label split is skipped and only one side is updated.
    fn execute_on_one_label(&mut self, positive: bool) {
        while let Some(chunk) = self.filter.next() {
            let plan = &mut self.plans[chunk.join_chunk.table_id][chunk.join_chunk.join_group_id];
            if plan.saved_partition_id != Some(chunk.join_chunk.partition_id) {
                plan.reset_coverage(
                    chunk.join_chunk.binding_partition_size,
                    positive,
                    !positive,
                );
                plan.saved_partition_id = Some(chunk.join_chunk.partition_id);
            }

            let relative_tids = &chunk.join_chunk.build_relative_tids;
            if plan.num_atom_nodes == 0 {
                let Some(literal_index) = plan.root_literal else {
                    continue;
                };
                let info = &mut self.results[literal_index];
                let (binding, covered, coverage) = if positive {
                    (
                        &mut info.num_binding_positive,
                        &mut info.num_covered_positive,
                        &mut plan.root_positive_coverage,
                    )
                } else {
                    (
                        &mut info.num_binding_negative,
                        &mut info.num_covered_negative,
                        &mut plan.root_negative_coverage,
                    )
                };
                *binding += relative_tids.len();
                for &relative_tid in relative_tids {
                    if !coverage.test_set(relative_tid as usize) {
                        *covered += 1;
                    }
                }
                continue;
            }

            if let Some(literal_index) = plan.root_literal {
                let info = &mut self.results[literal_index];
                if positive {
                    info.num_binding_positive += relative_tids.len();
                    for &relative_tid in relative_tids {
                        if !plan.root_positive_coverage.test_set(relative_tid as usize) {
                            info.num_covered_positive += 1;
                        }
                    }
                } else {
                    info.num_binding_negative += relative_tids.len();
                    for &relative_tid in relative_tids {
                        if !plan.root_negative_coverage.test_set(relative_tid as usize) {
                            info.num_covered_negative += 1;
                        }
                    }
                }
            }

            Self::assign_node_bitvectors(plan, &chunk);
            for node_id in 0..plan.nodes.len() {
                let Some(literal_index) = plan.nodes[node_id].literal else {
                    continue;
                };
                let hits = plan.nodes[node_id].bit_vector.clone();
                let info = &mut self.results[literal_index];
                let node = &mut plan.nodes[node_id];
                if positive {
                    info.num_binding_positive += hits.count();
                    update_coverage(
                        relative_tids,
                        &hits,
                        &mut info.num_covered_positive,
                        &mut node.positive_coverage,
                    );
                } else {
                    info.num_binding_negative += hits.count();
                    update_coverage(
                        relative_tids,
                        &hits,
                        &mut info.num_covered_negative,
                        &mut node.negative_coverage,
                    );
                }
            }
        }
    }

    /// Atom nodes take the filter-produced bitvectors; conjunction nodes AND
    /// their children, which always precede them in the arena.
    fn assign_node_bitvectors(plan: &mut PredicateEvaluationPlan, chunk: &FilterChunk<'_>) {
        for (node_id, bit_vector) in chunk.bit_vectors.iter().enumerate() {
            plan.nodes[node_id].bit_vector = bit_vector.clone();
        }
        for node_id in plan.num_atom_nodes..plan.nodes.len() {
            if let Some((left, right)) = plan.nodes[node_id].children {
                let combined = &plan.nodes[left].bit_vector & &plan.nodes[right].bit_vector;
                plan.nodes[node_id].bit_vector = combined;
            }
        }
    }
}

/// Bit `t` is set iff joined tuple `t` has a positive build row, packed over
/// 64-bit blocks.
fn label_bit_vector(num_positive: usize, build_tids: &[TupleId]) -> BitVector {
    let mut labels = BitVector::new(build_tids.len());
    let full_blocks = labels.full_blocks();
    let extra_bits = labels.extra_bits();
    let blocks = labels.blocks_mut();
    let mut tuple = 0;
    for block in blocks.iter_mut().take(full_blocks) {
        let mut word = 0u64;
        for bit in 0..BITS_PER_BLOCK {
            word |= (((build_tids[tuple] as usize) < num_positive) as u64) << bit;
            tuple += 1;
        }
        *block = word;
    }
    if extra_bits > 0 {
        let mut word = 0u64;
        for bit in 0..extra_bits {
            word |= (((build_tids[tuple] as usize) < num_positive) as u64) << bit;
            tuple += 1;
        }
        blocks[full_blocks] = word;
    }
    labels
}

/// Count 0->1 transitions of the coverage bitvector at the build-relative
/// positions selected by `hits`.
fn update_coverage(
    build_relative_tids: &[TupleId],
    hits: &BitVector,
    count: &mut usize,
    coverage: &mut BitVector,
) {
    for position in hits.ones() {
        if !coverage.test_set(build_relative_tids[position] as usize) {
            *count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_bit_vector_split() {
        let build_tids: Vec<TupleId> = (0..100).collect();
        let labels = label_bit_vector(37, &build_tids);
        assert_eq!(labels.count(), 37);
        assert!(labels.get(36));
        assert!(!labels.get(37));
    }

    #[test]
    fn test_update_coverage_counts_transitions_once() {
        let mut coverage = BitVector::new(8);
        let mut count = 0;
        let relative_tids: Vec<TupleId> = vec![3, 3, 5, 3];
        let mut hits = BitVector::new(4);
        for i in 0..4 {
            hits.set(i);
        }
        update_coverage(&relative_tids, &hits, &mut count, &mut coverage);
        assert_eq!(count, 2);
    }
}
