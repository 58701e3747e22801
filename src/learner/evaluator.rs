/// Candidate literal evaluation: one pipeline pass scores every candidate
/// sharing a binding-side join variable.
///
/// Background fact tables are partitioned lazily (once per column); the
/// binding table is partitioned and hashed per call. Integral binding data
/// runs the pipeline once with labels split by tuple-id range; split binding
/// data runs it twice with deep-cloned plans, because plan counters are
/// stateful.
use std::collections::BTreeMap;

use tracing::debug;

use crate::config::FoilConfig;
use crate::error::FoilResult;
use crate::execution::count_aggregator::CountAggregator;
use crate::execution::expression::FilterPredicate;
use crate::execution::filter::Filter;
use crate::execution::hash_join::HashJoin;
use crate::execution::partition_assigner::PartitionAssigner;
use crate::execution::radix_partition::radix_partition;
use crate::learner::candidate_info::CandidateLiteralInfo;
use crate::learner::evaluation_plan::{build_predicate_evaluation_plan, PredicateEvaluationPlan};
use crate::schema::clause::{BindingStorage, FoilClause};
use crate::schema::literal::FoilLiteral;
use crate::storage::columnar::Table;
use crate::storage::hash_table::build_hash_tables_on_partitions;

pub struct CandidateLiteralEvaluator<'c> {
    building_clause: &'c FoilClause,
    config: &'c FoilConfig,
}

impl<'c> CandidateLiteralEvaluator<'c> {
    pub fn new(building_clause: &'c FoilClause, config: &'c FoilConfig) -> Self {
        Self {
            building_clause,
            config,
        }
    }

    /// Score all candidates whose binding-side join key is the clause
    /// variable `clause_join_key`. `literal_groups` maps predicate ids to
    /// that predicate's candidates.
    pub fn evaluate(
        &self,
        clause_join_key: usize,
        literal_groups: &BTreeMap<i32, Vec<FoilLiteral>>,
    ) -> FoilResult<Vec<CandidateLiteralInfo>> {
        let radix_bits = self.config.num_radix_bits;

        let mut results: Vec<CandidateLiteralInfo> = Vec::new();
        let mut background_tables: Vec<&Table> = Vec::new();
        let mut literal_join_keys: Vec<Vec<usize>> = Vec::new();
        let mut predicate_groups: Vec<Vec<Vec<FilterPredicate>>> = Vec::new();
        let mut plan_groups: Vec<Vec<PredicateEvaluationPlan>> = Vec::new();

        for literals in literal_groups.values() {
            debug_assert!(!literals.is_empty());
            let fact_table = literals[0].predicate().fact_table();
            background_tables.push(fact_table);

            // Sub-group by the background-side join key column.
            let mut by_join_key: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for literal in literals {
                let join_key = literal.join_key().ok_or_else(|| {
                    crate::error::FoilError::logic(format!(
                        "candidate literal {literal} has no bound join key"
                    ))
                })?;
                let result_index = results.len();
                results.push(CandidateLiteralInfo::new(literal.clone()));
                by_join_key.entry(join_key).or_default().push(result_index);
            }

            let mut table_join_keys = Vec::with_capacity(by_join_key.len());
            let mut table_predicates = Vec::with_capacity(by_join_key.len());
            let mut table_plans = Vec::with_capacity(by_join_key.len());
            for (join_key, candidate_indices) in by_join_key {
                if fact_table.partitions_at(join_key).is_none() {
                    radix_partition(fact_table, join_key, radix_bits);
                }
                let (predicates, plan) =
                    build_predicate_evaluation_plan(&results, &candidate_indices, join_key);
                debug!(
                    join_key,
                    num_candidates = candidate_indices.len(),
                    num_atoms = plan.num_atom_nodes,
                    num_nodes = plan.nodes.len(),
                    "built evaluation plan"
                );
                table_join_keys.push(join_key);
                table_predicates.push(predicates);
                table_plans.push(plan);
            }
            literal_join_keys.push(table_join_keys);
            predicate_groups.push(table_predicates);
            plan_groups.push(table_plans);
        }

        match self.building_clause.bindings() {
            BindingStorage::Integral {
                columns,
                num_positive,
                ..
            } => {
                let binding_table = Table::new(columns.clone());
                self.partition_and_build(&binding_table, clause_join_key);
                self.run_pipeline(
                    &binding_table,
                    clause_join_key,
                    &background_tables,
                    &literal_join_keys,
                    predicate_groups,
                    plan_groups,
                    &mut results,
                    LabelMode::Integral {
                        num_positive: *num_positive,
                    },
                )?;
            }
            BindingStorage::Split { positive, negative } => {
                let positive_table = Table::new(positive.clone());
                self.partition_and_build(&positive_table, clause_join_key);
                // Counters inside plans are stateful; the first pass runs on a
                // deep clone and the second consumes the originals.
                let plan_groups_clone = plan_groups.clone();
                self.run_pipeline(
                    &positive_table,
                    clause_join_key,
                    &background_tables,
                    &literal_join_keys,
                    predicate_groups.clone(),
                    plan_groups_clone,
                    &mut results,
                    LabelMode::PositiveOnly,
                )?;

                let negative_table = Table::new(negative.clone());
                self.partition_and_build(&negative_table, clause_join_key);
                self.run_pipeline(
                    &negative_table,
                    clause_join_key,
                    &background_tables,
                    &literal_join_keys,
                    predicate_groups,
                    plan_groups,
                    &mut results,
                    LabelMode::NegativeOnly,
                )?;
            }
            BindingStorage::Detached => {
                return Err(crate::error::FoilError::logic(
                    "cannot evaluate candidates for a clause without binding data",
                ));
            }
        }

        Ok(results)
    }

    fn partition_and_build(&self, binding_table: &Table, column_id: usize) {
        let radix_bits = self.config.num_radix_bits;
        radix_partition(binding_table, column_id, radix_bits);
        if let Some(partitions) = binding_table.partitions_at(column_id) {
            binding_table
                .set_hash_tables_at(column_id, build_hash_tables_on_partitions(partitions, radix_bits));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pipeline(
        &self,
        binding_table: &Table,
        clause_join_key: usize,
        background_tables: &[&Table],
        literal_join_keys: &[Vec<usize>],
        predicate_groups: Vec<Vec<Vec<FilterPredicate>>>,
        plan_groups: Vec<Vec<PredicateEvaluationPlan>>,
        results: &mut [CandidateLiteralInfo],
        label_mode: LabelMode,
    ) -> FoilResult<()> {
        let assigner = PartitionAssigner::new(
            background_tables.to_vec(),
            literal_join_keys,
            self.config.partition_chunk_size,
        )?;
        let hash_join = HashJoin::new(
            binding_table,
            clause_join_key,
            assigner,
            self.config.num_radix_bits,
        )?;
        let filter = Filter::new(predicate_groups, hash_join);
        let mut aggregator = CountAggregator::new(filter, plan_groups, results);
        match label_mode {
            LabelMode::Integral { num_positive } => aggregator.execute(num_positive),
            LabelMode::PositiveOnly => aggregator.execute_on_positives(),
            LabelMode::NegativeOnly => aggregator.execute_on_negatives(),
        }
        Ok(())
    }
}

enum LabelMode {
    Integral { num_positive: usize },
    PositiveOnly,
    NegativeOnly,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::predicate::{FoilPredicate, FoilPredicateRef};
    use crate::schema::variable::FoilVariable;
    use crate::storage::columnar::Column;
    use std::sync::Arc;

    fn background_predicate(id: i32, columns: Vec<Vec<i32>>, types: Vec<i32>) -> FoilPredicateRef {
        Arc::new(FoilPredicate::new(
            id,
            format!("q_{id}"),
            None,
            types,
            Table::new(columns.into_iter().map(Column::from_values).collect()),
        ))
    }

    fn head_clause(
        predicate: &FoilPredicateRef,
        columns: Vec<Vec<i32>>,
        num_positive: usize,
        num_negative: usize,
    ) -> crate::schema::clause::FoilClauseRef {
        let mut head = FoilLiteral::new(Arc::clone(predicate));
        for i in 0..predicate.num_arguments() {
            head.add_variable(FoilVariable::new(i as i32, predicate.argument_type_at(i)));
        }
        FoilClause::with_integral_bindings(
            head,
            num_positive,
            num_negative,
            columns.into_iter().map(Column::from_values).collect(),
        )
    }

    /// Binding table with 3 positive and 3 negative rows, all matching the
    /// candidate exactly once: binding and covered counters all equal 3.
    #[test]
    fn test_coverage_split_counts() {
        let target = background_predicate(0, vec![vec![], vec![]], vec![0, 0]);
        let background =
            background_predicate(1, vec![vec![1, 2, 3, 4, 5, 6], vec![1, 2, 3, 4, 5, 6]], vec![0, 0]);

        // Bindings: positives (1,1),(2,2),(3,3); negatives (4,4),(5,5),(6,6).
        let clause = head_clause(
            &target,
            vec![vec![1, 2, 3, 4, 5, 6], vec![1, 2, 3, 4, 5, 6]],
            3,
            3,
        );

        // Candidate q_1(0, 1): both positions bound, join key at position 1
        // (tie on type keeps position 0 .. both type 0, so position 0 wins).
        let candidate = FoilLiteral::with_variables(
            Arc::clone(&background),
            vec![FoilVariable::new(0, 0), FoilVariable::new(1, 0)],
        );
        let join_key_variable = candidate.join_key().unwrap();
        let group_variable =
            candidate.variable_at(join_key_variable).variable_id() as usize;
        let mut groups: BTreeMap<i32, Vec<FoilLiteral>> = BTreeMap::new();
        groups.insert(background.id(), vec![candidate]);

        let config = FoilConfig::default();
        let evaluator = CandidateLiteralEvaluator::new(&clause, &config);
        let results = evaluator.evaluate(group_variable, &groups).unwrap();
        assert_eq!(results.len(), 1);
        let info = &results[0];
        assert_eq!(info.num_binding_positive, 3);
        assert_eq!(info.num_binding_negative, 3);
        assert_eq!(info.num_covered_positive, 3);
        assert_eq!(info.num_covered_negative, 3);
    }

    /// Evaluating the same literal twice yields identical counters, and
    /// covered counts never exceed binding counts.
    #[test]
    fn test_identical_literals_identical_counters() {
        let target = background_predicate(0, vec![vec![], vec![]], vec![0, 0]);
        let background = background_predicate(
            1,
            vec![vec![1, 1, 2, 3, 3, 3], vec![7, 8, 7, 7, 8, 9]],
            vec![0, 0],
        );
        let clause = head_clause(
            &target,
            vec![vec![1, 2, 3, 1, 9], vec![7, 7, 9, 8, 9]],
            3,
            2,
        );

        let candidate = FoilLiteral::with_variables(
            Arc::clone(&background),
            vec![FoilVariable::new(0, 0), FoilVariable::new(1, 0)],
        );
        let mut groups: BTreeMap<i32, Vec<FoilLiteral>> = BTreeMap::new();
        groups.insert(background.id(), vec![candidate]);

        let config = FoilConfig::default();
        let first = CandidateLiteralEvaluator::new(&clause, &config)
            .evaluate(0, &groups)
            .unwrap();
        let second = CandidateLiteralEvaluator::new(&clause, &config)
            .evaluate(0, &groups)
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].num_binding_positive, second[0].num_binding_positive);
        assert_eq!(first[0].num_binding_negative, second[0].num_binding_negative);
        assert_eq!(first[0].num_covered_positive, second[0].num_covered_positive);
        assert_eq!(first[0].num_covered_negative, second[0].num_covered_negative);
        for info in &first {
            assert!(info.num_covered_positive <= info.num_binding_positive);
            assert!(info.num_covered_negative <= info.num_binding_negative);
        }
    }

    /// The split representation (separate positive/negative blocks) produces
    /// the same counters as the integral one.
    #[test]
    fn test_split_and_integral_agree() {
        let target = background_predicate(0, vec![vec![], vec![]], vec![0, 0]);
        let background = background_predicate(
            1,
            vec![vec![1, 2, 2, 5, 6], vec![4, 4, 5, 5, 6]],
            vec![0, 0],
        );
        let positive_rows = (vec![1, 2, 2], vec![4, 4, 5]);
        let negative_rows = (vec![5, 6], vec![9, 6]);

        let integral_clause = head_clause(
            &target,
            vec![
                [positive_rows.0.clone(), negative_rows.0.clone()].concat(),
                [positive_rows.1.clone(), negative_rows.1.clone()].concat(),
            ],
            3,
            2,
        );
        let mut head = FoilLiteral::new(Arc::clone(&target));
        head.add_variable(FoilVariable::new(0, 0));
        head.add_variable(FoilVariable::new(1, 0));
        let split_clause = FoilClause::with_split_bindings(
            head,
            vec![
                Column::from_values(positive_rows.0),
                Column::from_values(positive_rows.1),
            ],
            vec![
                Column::from_values(negative_rows.0),
                Column::from_values(negative_rows.1),
            ],
        );

        let candidate = FoilLiteral::with_variables(
            Arc::clone(&background),
            vec![FoilVariable::new(0, 0), FoilVariable::new(1, 0)],
        );
        let mut groups: BTreeMap<i32, Vec<FoilLiteral>> = BTreeMap::new();
        groups.insert(background.id(), vec![candidate]);

        let config = FoilConfig::default();
        let integral_results = CandidateLiteralEvaluator::new(&integral_clause, &config)
            .evaluate(0, &groups)
            .unwrap();
        let split_results = CandidateLiteralEvaluator::new(&split_clause, &config)
            .evaluate(0, &groups)
            .unwrap();
        assert_eq!(
            integral_results[0].num_binding_positive,
            split_results[0].num_binding_positive
        );
        assert_eq!(
            integral_results[0].num_binding_negative,
            split_results[0].num_binding_negative
        );
        assert_eq!(
            integral_results[0].num_covered_positive,
            split_results[0].num_covered_positive
        );
        assert_eq!(
            integral_results[0].num_covered_negative,
            split_results[0].num_covered_negative
        );
    }
}
