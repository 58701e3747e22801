/// The shared-atom evaluation plan for one candidate group.
///
/// Within a group (one predicate, one background join key), every candidate
/// imposes a set of equality atoms between a background argument position and
/// a clause variable. The plan is a DAG of atom nodes and conjunction nodes
/// that shares repeated atoms across candidates, so one pipeline pass scores
/// the whole group. Nodes live in an index arena with children preceding
/// parents; cloning the arena is the deep clone used for the second label
/// pass.
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::execution::expression::FilterPredicate;
use crate::learner::candidate_info::CandidateLiteralInfo;
use crate::storage::bitset::BitVector;

#[derive(Clone, Debug)]
pub struct PlanNode {
    /// Candidate (index into the evaluation results) whose atom set equals
    /// this node's atom set, if any.
    pub literal: Option<usize>,
    /// `None` for atom nodes; conjunction nodes AND their two children.
    pub children: Option<(usize, usize)>,
    /// Scratch: this node's bitvector for the chunk being aggregated.
    pub bit_vector: BitVector,
    pub positive_coverage: BitVector,
    pub negative_coverage: BitVector,
}

impl PlanNode {
    fn new(literal: Option<usize>, children: Option<(usize, usize)>) -> Self {
        Self {
            literal,
            children,
            bit_vector: BitVector::default(),
            positive_coverage: BitVector::default(),
            negative_coverage: BitVector::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PredicateEvaluationPlan {
    /// Candidate with an empty atom set; matches unconditionally.
    pub root_literal: Option<usize>,
    pub root_positive_coverage: BitVector,
    pub root_negative_coverage: BitVector,
    /// Atom nodes first (aligned with the group's filter predicates), then
    /// conjunction nodes with children always at lower indices.
    pub nodes: Vec<PlanNode>,
    pub num_atom_nodes: usize,
    pub saved_partition_id: Option<usize>,
}

impl PredicateEvaluationPlan {
    /// Reset the per-partition coverage bitvectors of every counting node.
    pub fn reset_coverage(&mut self, num_binding_tuples: usize, positive: bool, negative: bool) {
        if self.root_literal.is_some() {
            if positive {
                self.root_positive_coverage.resize_and_clear(num_binding_tuples);
            }
            if negative {
                self.root_negative_coverage.resize_and_clear(num_binding_tuples);
            }
        }
        for node in &mut self.nodes {
            if node.literal.is_some() {
                if positive {
                    node.positive_coverage.resize_and_clear(num_binding_tuples);
                }
                if negative {
                    node.negative_coverage.resize_and_clear(num_binding_tuples);
                }
            }
        }
    }
}

struct BuildNode {
    atoms: BTreeSet<usize>,
    literal_ids: HashSet<usize>,
    mergeable: BTreeSet<usize>,
    children: Option<(usize, usize)>,
    literal: Option<usize>,
    reference_count: usize,
}

/// Build the plan for one candidate group. `candidates` pairs each group
/// member's result index with its literal's equality atoms, expressed as
/// `(background_position, clause_variable_id)` pairs excluding the join key.
pub fn build_predicate_evaluation_plan(
    results: &[CandidateLiteralInfo],
    candidate_indices: &[usize],
    join_key: usize,
) -> (Vec<FilterPredicate>, PredicateEvaluationPlan) {
    debug_assert!(!candidate_indices.is_empty());

    let mut plan = PredicateEvaluationPlan::default();
    let mut predicates = Vec::new();
    let mut atom_ids: BTreeMap<(usize, i32), usize> = BTreeMap::new();
    let mut build_nodes: Vec<BuildNode> = Vec::new();
    let mut literal_atoms: Vec<BTreeSet<usize>> = Vec::with_capacity(candidate_indices.len());
    let mut remaining: BTreeSet<usize> = BTreeSet::new();

    for (literal_id, &result_index) in candidate_indices.iter().enumerate() {
        let literal = &results[result_index].literal;
        let mut atoms = BTreeSet::new();
        for (position, variable) in literal.variables().iter().enumerate() {
            if !variable.is_bound() || position == join_key {
                continue;
            }
            let key = (position, variable.variable_id());
            let atom_id = *atom_ids.entry(key).or_insert_with(|| {
                let atom_id = build_nodes.len();
                build_nodes.push(BuildNode {
                    atoms: BTreeSet::from([atom_id]),
                    literal_ids: HashSet::new(),
                    mergeable: BTreeSet::new(),
                    children: None,
                    literal: None,
                    reference_count: 0,
                });
                predicates.push(FilterPredicate::new(position, variable.variable_id() as usize));
                atom_id
            });
            build_nodes[atom_id].literal_ids.insert(literal_id);
            atoms.insert(atom_id);
        }

        match atoms.len() {
            0 => {
                debug_assert!(plan.root_literal.is_none());
                plan.root_literal = Some(result_index);
            }
            1 => {
                let atom_id = *atoms.iter().next().unwrap_or(&0);
                debug_assert!(build_nodes[atom_id].literal.is_none());
                build_nodes[atom_id].literal = Some(result_index);
                build_nodes[atom_id].literal_ids.remove(&literal_id);
            }
            _ => {
                remaining.insert(literal_id);
            }
        }
        literal_atoms.push(atoms);
    }

    let num_atoms = build_nodes.len();
    for node_id in 0..num_atoms {
        for other in 0..num_atoms {
            if other != node_id {
                build_nodes[node_id].mergeable.insert(other);
            }
        }
    }

    // Greedy pairing: merge the atom-disjoint pair sharing the most
    // candidates, attach any candidate whose atom set now matches exactly.
    while !remaining.is_empty() {
        let mut best: Option<(usize, usize, usize)> = None;
        for first in 0..build_nodes.len() {
            for &second in &build_nodes[first].mergeable {
                let intersection = build_nodes[second]
                    .literal_ids
                    .iter()
                    .filter(|id| build_nodes[first].literal_ids.contains(id))
                    .count();
                if intersection > best.map(|(_, _, size)| size).unwrap_or(0) {
                    best = Some((first, second, intersection));
                }
            }
        }
        let Some((left, right, _)) = best else {
            debug_assert!(false, "unattachable candidates remain");
            break;
        };

        // Each pair is merged at most once, and every atom set gets exactly
        // one node; a pair whose union already exists is just consumed.
        build_nodes[left].mergeable.remove(&right);
        build_nodes[right].mergeable.remove(&left);
        let atoms: BTreeSet<usize> = build_nodes[left]
            .atoms
            .union(&build_nodes[right].atoms)
            .copied()
            .collect();
        if build_nodes.iter().any(|node| node.atoms == atoms) {
            continue;
        }

        build_nodes[left].reference_count += 1;
        build_nodes[right].reference_count += 1;
        let new_node_id = build_nodes.len();
        let literal_ids: HashSet<usize> = build_nodes[left]
            .literal_ids
            .intersection(&build_nodes[right].literal_ids)
            .copied()
            .collect();
        let mut node = BuildNode {
            atoms,
            literal_ids,
            mergeable: BTreeSet::new(),
            children: Some((left, right)),
            literal: None,
            reference_count: 0,
        };

        let matching: Vec<usize> = node
            .literal_ids
            .iter()
            .copied()
            .filter(|&id| literal_atoms[id] == node.atoms)
            .collect();
        for literal_id in matching {
            debug_assert!(node.literal.is_none());
            node.literal = Some(candidate_indices[literal_id]);
            node.literal_ids.remove(&literal_id);
            remaining.remove(&literal_id);
            for other in build_nodes.iter_mut() {
                other.literal_ids.remove(&literal_id);
            }
        }

        for (node_id, other) in build_nodes.iter_mut().enumerate() {
            if node_id != left
                && node_id != right
                && node.atoms.is_disjoint(&other.atoms)
            {
                other.mergeable.insert(new_node_id);
            }
        }
        build_nodes.push(node);
    }

    // Reference-count sweep: conjunction nodes with no candidate and no
    // consumer are dropped, releasing their children.
    for node_id in (num_atoms..build_nodes.len()).rev() {
        if build_nodes[node_id].literal.is_none() && build_nodes[node_id].reference_count == 0 {
            if let Some((left, right)) = build_nodes[node_id].children {
                build_nodes[left].reference_count -= 1;
                build_nodes[right].reference_count -= 1;
            }
        }
    }

    let mut final_index = vec![usize::MAX; build_nodes.len()];
    for node_id in 0..num_atoms {
        final_index[node_id] = plan.nodes.len();
        plan.nodes
            .push(PlanNode::new(build_nodes[node_id].literal, None));
    }
    plan.num_atom_nodes = num_atoms;
    for node_id in num_atoms..build_nodes.len() {
        let node = &build_nodes[node_id];
        if node.literal.is_some() || node.reference_count > 0 {
            let (left, right) = node.children.unwrap_or((0, 0));
            debug_assert!(final_index[left] != usize::MAX && final_index[right] != usize::MAX);
            final_index[node_id] = plan.nodes.len();
            plan.nodes.push(PlanNode::new(
                node.literal,
                Some((final_index[left], final_index[right])),
            ));
        }
    }

    (predicates, plan)
}
