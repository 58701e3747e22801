/// The rule learner: grow a clause literal by literal, accept it once its
/// coverage re-check clears the precision/F thresholds, shrink the global
/// uncovered-positive set, and repeat. Tied literals are retained with their
/// originating state for backtracking; random literals keep a back-chain to
/// the state they extended so they can be dropped and regrown.
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::FoilConfig;
use crate::error::{FoilError, FoilResult};
use crate::execution::expression::AttributeReference;
use crate::execution::multi_column_join::create_label_aware_binding_tables;
use crate::execution::semi_join::{create_semi_join, select_and_create_semi_join, SemiJoinChunk};
use crate::learner::enumerator::CandidateLiteralEnumerator;
use crate::learner::evaluator::CandidateLiteralEvaluator;
use crate::learner::search_stats::LiteralSearchStats;
use crate::learner::selector::{need_regrow_for_info, EvaluatedLiteralInfo, LiteralSelector};
use crate::learner::state::QuickFoilState;
use crate::schema::clause::FoilClause;
use crate::schema::literal::{FoilLiteral, FoilLiteralSet};
use crate::schema::predicate::FoilPredicateRef;
use crate::schema::variable::FoilVariable;
use crate::storage::columnar::{Column, Table, Value};
use crate::storage::hash_table::{build_hash_table_after_semi_join, FoilHashTable};

struct TiedLiteralInfo {
    literal_info: EvaluatedLiteralInfo,
    building_state: Arc<QuickFoilState>,
    literal_search_stats: Arc<LiteralSearchStats>,
}

pub struct QuickFoil {
    config: Arc<FoilConfig>,
    target_predicate: FoilPredicateRef,
    building_state: Option<Arc<QuickFoilState>>,
    learned_clauses: Vec<FoilClause>,
    global_uncovered_positive: Arc<Table>,
    original_negative: Arc<Table>,
    maximum_uncovered_positive: usize,
    current_outer_iterations: usize,
    search_stats_for_first_iteration: Arc<LiteralSearchStats>,
    enumerator: CandidateLiteralEnumerator,
    tied_literal_infos: Vec<TiedLiteralInfo>,
}

impl QuickFoil {
    pub fn new(
        num_true_facts: usize,
        num_false_facts: usize,
        target_predicate: FoilPredicateRef,
        background_predicates: Vec<FoilPredicateRef>,
        config: Arc<FoilConfig>,
    ) -> FoilResult<Self> {
        if num_false_facts == 0 {
            return Err(FoilError::logic("positive-only data is not supported"));
        }

        let head_literal = Self::make_head_literal(&target_predicate);
        let initial_clause = FoilClause::with_integral_bindings(
            head_literal,
            num_true_facts,
            num_false_facts,
            target_predicate.fact_table().columns().to_vec(),
        );

        let global_uncovered_positive = Arc::new(Table::new(initial_clause.positive_columns()));
        let original_negative = Arc::new(Table::new(initial_clause.negative_columns()));
        let maximum_uncovered_positive =
            (num_true_facts as f64 * (1.0 - config.positive_threshold)) as usize;
        let search_stats_for_first_iteration = Arc::new(LiteralSearchStats::default());

        let building_state = Arc::new(QuickFoilState::new(
            false,
            initial_clause,
            Arc::clone(&search_stats_for_first_iteration),
            FoilLiteralSet::new(),
            Arc::clone(&global_uncovered_positive),
        ));

        Ok(Self {
            config,
            target_predicate,
            building_state: Some(building_state),
            learned_clauses: Vec::new(),
            global_uncovered_positive,
            original_negative,
            maximum_uncovered_positive,
            current_outer_iterations: 0,
            search_stats_for_first_iteration,
            enumerator: CandidateLiteralEnumerator::new(background_predicates),
            tied_literal_infos: Vec::new(),
        })
    }

    pub fn learned_clauses(&self) -> &[FoilClause] {
        &self.learned_clauses
    }

    pub fn num_uncovered_positive(&self) -> usize {
        self.global_uncovered_positive.num_tuples()
    }

    pub fn target_predicate(&self) -> &FoilPredicateRef {
        &self.target_predicate
    }

    pub fn learn(&mut self) -> FoilResult<()> {
        loop {
            info!(
                iteration = self.current_outer_iterations,
                global_uncovered = self.global_uncovered_positive.num_tuples(),
                "rule search iteration"
            );

            self.literal_search_loop()?;

            self.current_outer_iterations += 1;
            if !self.continue_rule_search() {
                break;
            }

            self.building_state = None;
            while let Some(tied) = self.tied_literal_infos.pop() {
                debug!(
                    literal = %tied.literal_info.literal,
                    clause = %tied.building_state.building_clause,
                    "resuming from tied literal"
                );
                self.building_state = Some(Arc::clone(&tied.building_state));
                if need_regrow_for_info(&tied.building_state.building_clause, &tied.literal_info) {
                    debug!("tied literal would need regrowing; skipped");
                    self.building_state = None;
                    continue;
                }
                if !self.add_best_candidate_literal(
                    true,
                    false,
                    tied.literal_info,
                    &tied.literal_search_stats,
                    None,
                )? {
                    break;
                }
            }

            if self.building_state.is_none() {
                self.create_most_general_building_clause();
            }
        }
        Ok(())
    }

    fn continue_rule_search(&self) -> bool {
        self.global_uncovered_positive.num_tuples() > self.maximum_uncovered_positive
            && self.current_outer_iterations < self.config.max_iterations
    }

    fn make_head_literal(target_predicate: &FoilPredicateRef) -> FoilLiteral {
        let mut head = FoilLiteral::new(Arc::clone(target_predicate));
        for i in 0..target_predicate.num_arguments() {
            head.add_variable(FoilVariable::new(
                i as i32,
                target_predicate.argument_type_at(i),
            ));
        }
        head
    }

    fn create_most_general_building_clause(&mut self) {
        let head = Self::make_head_literal(&self.target_predicate);
        let clause = FoilClause::with_split_bindings(
            head,
            self.global_uncovered_positive.columns().to_vec(),
            self.original_negative.columns().to_vec(),
        );
        self.building_state = Some(Arc::new(QuickFoilState::new(
            false,
            clause,
            Arc::clone(&self.search_stats_for_first_iteration),
            FoilLiteralSet::new(),
            Arc::clone(&self.global_uncovered_positive),
        )));
    }

    /// Group the surviving candidates by the clause variable at each
    /// literal's join key; one evaluator pipeline runs per group.
    fn group_candidates_by_join_variable(
        clause: &FoilClause,
        pruned: &BTreeMap<i32, Vec<FoilLiteral>>,
    ) -> Vec<BTreeMap<i32, Vec<FoilLiteral>>> {
        let mut groups: Vec<BTreeMap<i32, Vec<FoilLiteral>>> =
            vec![BTreeMap::new(); clause.num_variables()];
        for (&predicate_id, literals) in pruned {
            for literal in literals {
                let Some(join_key) = literal.join_key() else {
                    debug_assert!(false, "candidate without bound join key: {literal}");
                    continue;
                };
                let variable_id = literal.variable_at(join_key).variable_id() as usize;
                groups[variable_id]
                    .entry(predicate_id)
                    .or_default()
                    .push(literal.clone());
            }
        }
        groups
    }

    /// One clause-extension loop: enumerate, evaluate, select, extend, until
    /// a literal closes the clause or the alternatives are exhausted.
    fn literal_search_loop(&mut self) -> FoilResult<()> {
        loop {
            let Some(state) = self.building_state.clone() else {
                return Ok(());
            };
            let clause = Arc::clone(&state.building_clause);
            info!(
                clause = %clause,
                num_positive_bindings = clause.num_positive_bindings(),
                num_negative_bindings = clause.num_negative_bindings(),
                "literal search iteration"
            );

            let enumerated = self
                .enumerator
                .enumerate_candidate_literals(&clause, &state.literal_search_stats);

            let local_num_uncovered = state.uncovered_positive_data.num_tuples();
            let mut selector = LiteralSelector::new(
                local_num_uncovered,
                Arc::clone(&clause),
                state.black_random_literals.borrow().clone(),
                Arc::clone(&self.config),
            );
            let mut pruned_by_coverage = FoilLiteralSet::new();

            let groups = Self::group_candidates_by_join_variable(&clause, &enumerated.pruned);
            let consider_random = clause.num_random_literals() < self.config.maximum_random_literals
                && state.black_random_literals.borrow().len() < self.config.maximum_random_trials
                && local_num_uncovered > 0
                && clause.num_positive_bindings() / local_num_uncovered < 50;

            {
                let evaluator = CandidateLiteralEvaluator::new(&clause, &self.config);
                for (variable_id, group) in groups.iter().enumerate() {
                    if group.is_empty() {
                        continue;
                    }
                    let results = evaluator.evaluate(variable_id, group)?;
                    for candidate in &results {
                        selector.insert(candidate, consider_random);
                        if candidate.num_covered_positive == 0 {
                            pruned_by_coverage.insert(candidate.literal.clone());
                        }
                    }
                }
            }

            let mut literal_search_stats = Arc::new(LiteralSearchStats::new(
                Arc::new(enumerated.entire),
                pruned_by_coverage,
            ));

            let (mut best_vec, mut is_random) =
                selector.best_literals(&state.uncovered_positive_data);
            if best_vec.is_empty() {
                warn!(clause = %clause, "no valid candidate literal found");
                return Ok(());
            }
            let mut best = best_vec.pop();
            let mut current_state = Arc::clone(&state);
            let mut local_selector = Some(selector);

            let needs_regrow = best
                .as_ref()
                .map(|candidate| need_regrow_for_info(&current_state.building_clause, candidate))
                .unwrap_or(false);
            if needs_regrow {
                info!(
                    literal = %best.as_ref().map(|b| b.literal.to_string()).unwrap_or_default(),
                    clause = %current_state.building_clause,
                    "literal does not use the last random literal's variables; choosing another"
                );
                is_random = false;
                best = None;
                loop {
                    while let Some(candidate) = best_vec.pop() {
                        if !need_regrow_for_info(&current_state.building_clause, &candidate) {
                            best = Some(candidate);
                            break;
                        }
                    }
                    if best.is_some() {
                        break;
                    }
                    best_vec = Self::next_best_from(&mut local_selector, &current_state);
                    if best_vec.is_empty() {
                        let Some(previous) = current_state.previous_state.clone() else {
                            break;
                        };
                        previous.black_random_literals.borrow_mut().insert(
                            current_state.building_clause.create_unbound_last_literal(),
                        );
                        // The stats stay those of the dropped clause, not the
                        // one being regrown.
                        literal_search_stats = Arc::clone(&current_state.literal_search_stats);
                        info!(
                            clause = %previous.building_clause,
                            "dropping the last random literal and regrowing"
                        );
                        self.building_state = Some(Arc::clone(&previous));
                        current_state = previous;
                        local_selector = None;
                        best_vec = Self::next_best_from(&mut local_selector, &current_state);
                    }
                }
            }

            let Some(best) = best else {
                warn!(clause = %current_state.building_clause, "cannot expand the building clause");
                return Ok(());
            };
            debug_assert!(best.num_binding_positive > 0);

            for candidate in best_vec.drain(..) {
                if candidate.num_covered_positive as f64
                    > self.config.minimum_coverage_for_tied_literal * local_num_uncovered as f64
                {
                    self.tied_literal_infos.push(TiedLiteralInfo {
                        literal_info: candidate,
                        building_state: Arc::clone(&current_state),
                        literal_search_stats: Arc::clone(&literal_search_stats),
                    });
                }
            }

            if self.add_best_candidate_literal(
                false,
                is_random,
                best,
                &literal_search_stats,
                local_selector,
            )? {
                return Ok(());
            }
        }
    }

    fn next_best_from(
        local_selector: &mut Option<LiteralSelector>,
        state: &Arc<QuickFoilState>,
    ) -> Vec<EvaluatedLiteralInfo> {
        match local_selector {
            Some(selector) => selector.next_best_literals(),
            None => state
                .literal_selector
                .borrow_mut()
                .as_mut()
                .map(|selector| selector.next_best_literals())
                .unwrap_or_default(),
        }
    }

    /// Returns true when the building clause is finished (accepted or
    /// abandoned) and a fresh one should be started.
    fn add_best_candidate_literal(
        &mut self,
        is_tied_literal: bool,
        is_random_literal: bool,
        best: EvaluatedLiteralInfo,
        literal_search_stats: &Arc<LiteralSearchStats>,
        selector: Option<LiteralSelector>,
    ) -> FoilResult<bool> {
        let state = self
            .building_state
            .clone()
            .ok_or_else(|| FoilError::logic("no building state to extend"))?;
        info!(
            literal = %best.literal,
            is_random = is_random_literal,
            num_covered_positive = best.num_covered_positive,
            num_covered_negative = best.num_covered_negative,
            num_binding_positive = best.num_binding_positive,
            num_binding_negative = best.num_binding_negative,
            precision = best.precision(),
            score = best.score,
            clause = %state.building_clause,
            "adding literal"
        );

        if !is_random_literal && self.should_consider_as_last_literal(&state, &best) {
            if self.try_accept_clause(&state, &best)? {
                self.building_state = None;
                return Ok(true);
            } else if is_tied_literal
                || state.is_extended_from_tied_literal
                || state.building_clause.num_body_literals() >= self.config.maximum_clause_length
            {
                info!(
                    clause = %state.building_clause,
                    literal = %best.literal,
                    "abandoning the building clause"
                );
                self.building_state = None;
                return Ok(true);
            }
        }

        let binding_columns = create_label_aware_binding_tables(
            &state.building_clause,
            &best.literal,
            best.num_binding_positive,
            best.num_binding_negative,
            self.config.join_chunk_size,
        );
        let new_clause = state.building_clause.copy_with_additional_unbound_body_literal(
            &best.literal,
            is_random_literal,
            best.num_binding_positive,
            best.num_binding_negative,
            binding_columns,
        );
        debug!(
            clause = %new_clause,
            num_positive = new_clause.num_positive_bindings(),
            num_negative = new_clause.num_negative_bindings(),
            num_random_literals = new_clause.num_random_literals(),
            "new building clause"
        );

        let extended_from_tied = is_tied_literal || state.is_extended_from_tied_literal;
        let new_state = if is_random_literal {
            let selector = selector
                .ok_or_else(|| FoilError::logic("random literal chosen without a selector"))?;
            state.literal_selector.replace(Some(selector));
            QuickFoilState::with_previous(
                extended_from_tied,
                Arc::clone(&new_clause),
                Arc::clone(&state),
                Arc::clone(literal_search_stats),
                state.black_random_literals.borrow().clone(),
                Arc::clone(&state.uncovered_positive_data),
            )
        } else {
            QuickFoilState::new(
                extended_from_tied,
                Arc::clone(&new_clause),
                Arc::clone(literal_search_stats),
                state.black_random_literals.borrow().clone(),
                Arc::clone(&state.uncovered_positive_data),
            )
        };
        self.building_state = Some(Arc::new(new_state));

        if new_clause.num_body_literals() == 1 {
            self.search_stats_for_first_iteration = Arc::clone(literal_search_stats);
        }
        Ok(false)
    }

    fn should_consider_as_last_literal(
        &self,
        state: &QuickFoilState,
        best: &EvaluatedLiteralInfo,
    ) -> bool {
        best.precision() >= self.config.minimum_inflated_precision
            || state.building_clause.num_body_literals() >= self.config.maximum_clause_length
    }

    /// Re-check the literal's coverage against the uncovered examples; on a
    /// pass, commit the clause and shrink the global uncovered-positive set
    /// to the remainder.
    fn try_accept_clause(
        &mut self,
        state: &Arc<QuickFoilState>,
        best: &EvaluatedLiteralInfo,
    ) -> FoilResult<bool> {
        let literal = &best.literal;
        let (positive_coverage_hash_table, num_covered_positive, num_covered_negative, coverage_chunks) =
            self.compute_coverage_on_uncovered_data(state, literal)?;

        if num_covered_positive == 0 {
            return Ok(false);
        }
        let local_precision = num_covered_positive as f64
            / (num_covered_positive + num_covered_negative) as f64;
        let local_recall =
            num_covered_positive as f64 / state.uncovered_positive_data.num_tuples() as f64;
        let local_f_score = 2.0 * local_precision * local_recall / (local_precision + local_recall);
        info!(
            literal = %literal,
            num_covered_positive,
            num_covered_negative,
            local_precision,
            local_recall,
            local_f_score,
            "coverage re-check"
        );
        if local_precision < self.config.minimum_true_precision
            && local_f_score < self.config.minimum_f_score
        {
            return Ok(false);
        }

        let num_head_columns = self.target_predicate.num_arguments();
        let coverage_keys: Vec<AttributeReference> =
            (0..num_head_columns).map(AttributeReference::new).collect();
        let mut output_buffers: Vec<Vec<Value>> = vec![Vec::new(); num_head_columns];

        let gather_uncovered = |chunk: &mut SemiJoinChunk, buffers: &mut Vec<Vec<Value>>| {
            chunk.bitvector.flip();
            chunk.num_ones = chunk.bitvector.len() - chunk.num_ones;
            if chunk.num_ones > 0 {
                for (i, key) in coverage_keys.iter().enumerate() {
                    key.evaluate_with_filter(&chunk.output_columns, &chunk.bitvector, &mut buffers[i]);
                }
            }
        };

        if !Arc::ptr_eq(&state.uncovered_positive_data, &self.global_uncovered_positive) {
            // The clause was grown against an older uncovered snapshot; run a
            // fresh coverage pass over the current global set.
            let positive_table = Table::new(state.building_clause.positive_columns());
            let mut semi_join = create_semi_join(
                true,
                &self.global_uncovered_positive,
                &positive_table,
                &positive_coverage_hash_table,
                &coverage_keys,
                &coverage_keys,
                (0..num_head_columns).collect(),
                self.config.semijoin_chunk_size,
            );
            while let Some(mut chunk) = semi_join.next() {
                gather_uncovered(&mut chunk, &mut output_buffers);
            }
        } else {
            for mut chunk in coverage_chunks {
                gather_uncovered(&mut chunk, &mut output_buffers);
            }
        }

        self.global_uncovered_positive = Arc::new(Table::new(
            output_buffers.into_iter().map(Column::from_values).collect(),
        ));

        let mut new_clause = state.building_clause.copy_without_data();
        new_clause.add_unbound_body_literal(literal, false);
        info!(
            rule = %new_clause,
            uncovered_positive = self.global_uncovered_positive.num_tuples(),
            "new rule"
        );
        self.learned_clauses.push(new_clause);
        Ok(true)
    }

    /// Coverage of a candidate last literal over the uncovered positives and
    /// the original negatives, with the deduplicated positive coverage hash
    /// table and the positive coverage chunks handed back for reuse.
    #[allow(clippy::type_complexity)]
    fn compute_coverage_on_uncovered_data(
        &self,
        state: &Arc<QuickFoilState>,
        literal: &FoilLiteral,
    ) -> FoilResult<(FoilHashTable, usize, usize, Vec<SemiJoinChunk>)> {
        let positive_table = Table::new(state.building_clause.positive_columns());
        let negative_table = Table::new(state.building_clause.negative_columns());

        let mut background_join_keys = Vec::new();
        let mut clause_join_keys = Vec::new();
        for (position, variable) in literal.variables().iter().enumerate() {
            if variable.is_bound() {
                background_join_keys.push(AttributeReference::new(position));
                clause_join_keys.push(AttributeReference::new(variable.variable_id() as usize));
            }
        }

        let num_head_columns = self.target_predicate.num_arguments();
        let project_column_ids: Vec<usize> = (0..num_head_columns).collect();
        let coverage_keys: Vec<AttributeReference> =
            (0..num_head_columns).map(AttributeReference::new).collect();

        let background_table = literal.predicate().fact_table();
        let mut background_hash_table: Option<FoilHashTable> = None;

        // Positive side: distinct covered positive bindings, then coverage of
        // the uncovered examples.
        let positive_coverage_hash_table = {
            let mut binding_hash_table = None;
            let mut binding_semi_join = select_and_create_semi_join(
                &positive_table,
                background_table,
                &mut binding_hash_table,
                &mut background_hash_table,
                &clause_join_keys,
                &background_join_keys,
                project_column_ids.clone(),
                self.config.semijoin_chunk_size,
            );
            let mut marked = Vec::new();
            while let Some(chunk) = binding_semi_join.next() {
                marked.extend(chunk.bitvector.ones().map(|bit| chunk.base_offset + bit));
            }
            drop(binding_semi_join);
            let head_columns: Vec<Column> = (0..num_head_columns)
                .map(|i| positive_table.column_at(i).clone())
                .collect();
            build_hash_table_after_semi_join(
                positive_table.num_tuples(),
                &head_columns,
                marked.into_iter(),
            )
        };

        let mut num_covered_positive = 0;
        let mut coverage_chunks = Vec::new();
        {
            let mut coverage_semi_join = create_semi_join(
                true,
                &state.uncovered_positive_data,
                &positive_table,
                &positive_coverage_hash_table,
                &coverage_keys,
                &coverage_keys,
                project_column_ids.clone(),
                self.config.semijoin_chunk_size,
            );
            while let Some(chunk) = coverage_semi_join.next() {
                num_covered_positive += chunk.num_ones;
                coverage_chunks.push(chunk);
            }
        }

        // Negative side: same shape against the original negatives.
        let negative_coverage_hash_table = {
            let mut binding_hash_table = None;
            let mut binding_semi_join = select_and_create_semi_join(
                &negative_table,
                background_table,
                &mut binding_hash_table,
                &mut background_hash_table,
                &clause_join_keys,
                &background_join_keys,
                project_column_ids.clone(),
                self.config.semijoin_chunk_size,
            );
            let mut marked = Vec::new();
            while let Some(chunk) = binding_semi_join.next() {
                marked.extend(chunk.bitvector.ones().map(|bit| chunk.base_offset + bit));
            }
            drop(binding_semi_join);
            let head_columns: Vec<Column> = (0..num_head_columns)
                .map(|i| negative_table.column_at(i).clone())
                .collect();
            build_hash_table_after_semi_join(
                negative_table.num_tuples(),
                &head_columns,
                marked.into_iter(),
            )
        };

        let mut num_covered_negative = 0;
        let mut coverage_semi_join = create_semi_join(
            true,
            &self.original_negative,
            &negative_table,
            &negative_coverage_hash_table,
            &coverage_keys,
            &coverage_keys,
            project_column_ids,
            self.config.semijoin_chunk_size,
        );
        while let Some(chunk) = coverage_semi_join.next() {
            num_covered_negative += chunk.num_ones;
        }

        Ok((
            positive_coverage_hash_table,
            num_covered_positive,
            num_covered_negative,
            coverage_chunks,
        ))
    }
}
