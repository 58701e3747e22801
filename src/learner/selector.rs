/// Literal selection: MCC + area-under-entropy-curve scoring into a bounded
/// min-heap, with an exploration branch that may pick a near-zero-MCC
/// "random" literal by F-score when it buys enough extra positive coverage.
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::config::FoilConfig;
use crate::execution::expression::AttributeReference;
use crate::execution::semi_join::select_and_create_semi_join;
use crate::learner::candidate_info::CandidateLiteralInfo;
use crate::schema::clause::{FoilClause, FoilClauseRef};
use crate::schema::literal::{FoilLiteral, FoilLiteralSet};
use crate::storage::columnar::Table;
use crate::storage::hash_table::build_hash_table_after_semi_join;

const SCORE_TIE_EPSILON: f64 = 0.00001;

#[derive(Clone, Debug)]
pub struct EvaluatedLiteralInfo {
    pub literal: FoilLiteral,
    pub num_covered_positive: usize,
    pub num_covered_negative: usize,
    pub num_binding_positive: usize,
    pub num_binding_negative: usize,
    pub score: f64,
}

impl EvaluatedLiteralInfo {
    fn new(info: &CandidateLiteralInfo, score: f64) -> Self {
        debug_assert!(info.num_covered_positive <= info.num_binding_positive);
        debug_assert!(info.num_covered_negative <= info.num_binding_negative);
        Self {
            literal: info.literal.clone(),
            num_covered_positive: info.num_covered_positive,
            num_covered_negative: info.num_covered_negative,
            num_binding_positive: info.num_binding_positive,
            num_binding_negative: info.num_binding_negative,
            score,
        }
    }

    /// Precision over bindings.
    pub fn precision(&self) -> f64 {
        self.num_binding_positive as f64
            / (self.num_binding_positive + self.num_binding_negative) as f64
    }
}

struct HeapEntry(EvaluatedLiteralInfo);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.score == other.0.score
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we keep the worst on top.
        OrderedFloat(other.0.score).cmp(&OrderedFloat(self.0.score))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct LiteralSelector {
    total_uncovered_positive: usize,
    clause: FoilClauseRef,
    clause_entropy_area: f64,
    black_random_literals: FoilLiteralSet,
    config: Arc<FoilConfig>,

    top_literal_heap: BinaryHeap<HeapEntry>,
    saved_literal_infos: Vec<EvaluatedLiteralInfo>,

    maximum_random_f_score: f64,
    best_random_literal: Option<EvaluatedLiteralInfo>,
}

impl LiteralSelector {
    pub fn new(
        total_uncovered_positive: usize,
        clause: FoilClauseRef,
        black_random_literals: FoilLiteralSet,
        config: Arc<FoilConfig>,
    ) -> Self {
        let clause_entropy_area = area_under_entropy_curve(
            clause.num_positive_bindings(),
            clause.num_negative_bindings(),
        );
        Self {
            total_uncovered_positive,
            clause,
            clause_entropy_area,
            black_random_literals,
            config,
            top_literal_heap: BinaryHeap::new(),
            saved_literal_infos: Vec::new(),
            maximum_random_f_score: -1.0,
            best_random_literal: None,
        }
    }

    pub fn insert(&mut self, info: &CandidateLiteralInfo, consider_random_literal: bool) {
        let raw_mcc = self.compute_mcc_score(info.num_covered_positive, info.num_covered_negative);
        let mcc = 1.0 + raw_mcc;
        let auec = 1.0 + self.compute_entropy_score(info.num_binding_positive, info.num_binding_negative);
        if mcc == 0.0 || auec == 0.0 {
            debug!(literal = %info.literal, mcc, auec, "candidate excluded by zero factor");
            return;
        }
        let score = 5.0 * auec * mcc / (mcc + 4.0 * auec);

        if consider_random_literal {
            self.consider_random(info, raw_mcc, score);
        }

        if self.top_literal_heap.len() < self.config.num_saved_literals {
            self.top_literal_heap
                .push(HeapEntry(EvaluatedLiteralInfo::new(info, score)));
            return;
        }
        let min_score = match self.top_literal_heap.peek() {
            Some(entry) => entry.0.score,
            None => return,
        };
        if score < min_score {
            return;
        }
        // Evict the whole minimum-score tier before inserting.
        while let Some(entry) = self.top_literal_heap.peek() {
            if entry.0.score == min_score {
                self.top_literal_heap.pop();
            } else {
                break;
            }
        }
        self.top_literal_heap
            .push(HeapEntry(EvaluatedLiteralInfo::new(info, score)));
    }

    fn consider_random(&mut self, info: &CandidateLiteralInfo, raw_mcc: f64, score: f64) {
        let covered_everything = raw_mcc == 0.0
            && info.num_binding_positive == info.num_covered_positive
            && info.num_binding_negative == info.num_covered_negative;
        if info.literal.num_unbound_variables() == 0
            || covered_everything
            || raw_mcc >= self.config.random_margin
            || raw_mcc <= -self.config.random_margin
            || self.black_random_literals.contains(&info.literal)
            || need_regrow(&self.clause, info.num_covered_negative, &info.literal)
        {
            return;
        }

        let precision = info.num_covered_positive as f64
            / (info.num_covered_positive + info.num_covered_negative) as f64;
        let recall = info.num_covered_positive as f64 / self.clause.num_positive_bindings() as f64;
        let f_score = 2.0 * precision * recall / (precision + recall);

        let replace = match &self.best_random_literal {
            None => true,
            Some(best) => {
                f_score > self.maximum_random_f_score
                    || (f_score == self.maximum_random_f_score
                        && info.num_covered_positive < self.total_uncovered_positive
                        && info.num_covered_positive > 0
                        && info.num_binding_positive / info.num_covered_positive <= 2
                        && info.num_binding_positive > best.num_binding_positive)
            }
        };
        if replace {
            debug!(literal = %info.literal, f_score, "new best random candidate");
            self.maximum_random_f_score = f_score;
            self.best_random_literal = Some(EvaluatedLiteralInfo::new(info, score));
        }
    }

    /// Pop the best literals: the winner last, score-tied runners-up before
    /// it. Returns whether the winner is a random-exploration literal.
    /// Lower-ranked candidates are retained for `next_best_literals`.
    pub fn best_literals(
        &mut self,
        uncovered_positive_data: &Table,
    ) -> (Vec<EvaluatedLiteralInfo>, bool) {
        if self.top_literal_heap.is_empty() {
            return (Vec::new(), false);
        }
        let mut sorted: Vec<EvaluatedLiteralInfo> = self
            .top_literal_heap
            .drain()
            .map(|entry| entry.0)
            .collect();
        sorted.sort_by(|a, b| OrderedFloat(a.score).cmp(&OrderedFloat(b.score)));

        let max_score = sorted[sorted.len() - 1].score;
        let mut best = Vec::new();
        let mut use_random_literal = false;

        if let Some(random) = self.best_random_literal.take() {
            let regular = &sorted[sorted.len() - 1];
            let coverage_ratio =
                regular.num_covered_positive as f64 / self.clause.num_positive_bindings() as f64;
            if random.score > max_score
                && random.num_covered_positive > regular.num_covered_positive
                && (random.num_binding_positive / random.num_covered_positive.max(1) < 50
                    || coverage_ratio < 0.1)
                && self.within_memory_quota(&random)
                && self.choose_random_literal(
                    &random.literal,
                    &regular.literal,
                    uncovered_positive_data,
                )
            {
                best.push(random);
                use_random_literal = true;
            }
        }

        if !use_random_literal {
            // Carry score ties along with the winner; the winner stays last.
            let mut first_tied = sorted.len() - 1;
            while first_tied > 0 && (sorted[first_tied - 1].score - max_score).abs() < SCORE_TIE_EPSILON
            {
                first_tied -= 1;
            }
            best.extend(sorted.drain(first_tied..));
        }

        self.saved_literal_infos.extend(sorted);
        self.saved_literal_infos
            .sort_by(|a, b| OrderedFloat(a.score).cmp(&OrderedFloat(b.score)));
        (best, use_random_literal)
    }

    /// Pop the next score tier of saved literals, best tier first.
    pub fn next_best_literals(&mut self) -> Vec<EvaluatedLiteralInfo> {
        let mut best = Vec::new();
        let Some(max_score) = self.saved_literal_infos.last().map(|info| info.score) else {
            return best;
        };
        while let Some(score) = self.saved_literal_infos.last().map(|info| info.score) {
            if (score - max_score).abs() >= SCORE_TIE_EPSILON {
                break;
            }
            if let Some(info) = self.saved_literal_infos.pop() {
                best.push(info);
            }
        }
        best
    }

    pub fn is_exhausted(&self) -> bool {
        self.saved_literal_infos.is_empty()
    }

    /// Matthews correlation of the covered counters against the clause's
    /// binding totals. No covered positives pins the score to -1; covering
    /// everything pins it to 0.
    fn compute_mcc_score(&self, num_covered_positive: usize, num_covered_negative: usize) -> f64 {
        if num_covered_positive == 0 {
            return -1.0;
        }
        let clause_positive = self.clause.num_positive_bindings();
        let clause_negative = self.clause.num_negative_bindings();
        if num_covered_positive == clause_positive && num_covered_negative == clause_negative {
            return 0.0;
        }
        let true_negatives = (clause_negative - num_covered_negative) as f64;
        let false_negatives = (clause_positive - num_covered_positive) as f64;
        let num_total_covered = (num_covered_positive + num_covered_negative) as f64;
        (num_covered_positive as f64 * true_negatives
            - num_covered_negative as f64 * false_negatives)
            / (num_total_covered
                * (self.clause.num_total_bindings() as f64 - num_total_covered)
                * clause_negative as f64
                * clause_positive as f64)
                .sqrt()
    }

    fn compute_entropy_score(&self, num_positive: usize, num_negative: usize) -> f64 {
        area_under_entropy_curve(num_positive, num_negative) - self.clause_entropy_area
    }

    fn within_memory_quota(&self, info: &EvaluatedLiteralInfo) -> bool {
        let Some(quota) = self.config.memory_quota else {
            return true;
        };
        // Times 3 to account for the partitions and hash tables built over
        // the new binding set.
        let new_binding_bytes = (info.literal.num_unbound_variables()
            + self.clause.num_variables())
            * (info.num_binding_positive + info.num_binding_negative)
            * std::mem::size_of::<crate::storage::columnar::Value>()
            * 3;
        if new_binding_bytes > quota {
            debug!(
                literal = %info.literal,
                new_binding_bytes,
                quota,
                "random candidate skipped by memory quota"
            );
            return false;
        }
        true
    }

    /// Accept the random literal only when the regular winner leaves at least
    /// 20% of the uncovered positives on the table and the random literal
    /// covers at least 1.2x as many of them.
    fn choose_random_literal(
        &self,
        random_literal: &FoilLiteral,
        regular_literal: &FoilLiteral,
        uncovered_positive_data: &Table,
    ) -> bool {
        let covered_by_regular =
            self.compute_covered_positives(regular_literal, uncovered_positive_data);
        let original_uncovered = uncovered_positive_data.num_tuples();
        debug!(
            regular = %regular_literal,
            covered_by_regular,
            original_uncovered,
            "random-literal lift check"
        );
        if covered_by_regular as f64 >= 0.8 * original_uncovered as f64 {
            return false;
        }
        let covered_by_random =
            self.compute_covered_positives(random_literal, uncovered_positive_data);
        debug!(random = %random_literal, covered_by_random, "random-literal lift check");
        covered_by_random as f64 >= 1.2 * covered_by_regular as f64
    }

    /// Count uncovered positive examples the literal would cover, via a
    /// semi-join of the positive bindings against the literal's fact table
    /// followed by a coverage semi-join on the head columns.
    fn compute_covered_positives(
        &self,
        literal: &FoilLiteral,
        uncovered_positive_data: &Table,
    ) -> usize {
        let positive_table = Table::new(self.clause.positive_columns());

        let mut background_join_keys = Vec::new();
        let mut clause_join_keys = Vec::new();
        for (position, variable) in literal.variables().iter().enumerate() {
            if variable.is_bound() {
                background_join_keys.push(AttributeReference::new(position));
                clause_join_keys.push(AttributeReference::new(variable.variable_id() as usize));
            }
        }

        let num_head_columns = self.clause.head_literal().num_variables();
        let project_column_ids: Vec<usize> = (0..num_head_columns).collect();
        let coverage_join_keys: Vec<AttributeReference> = (0..num_head_columns)
            .map(AttributeReference::new)
            .collect();

        let background_table = literal.predicate().fact_table();
        let mut binding_hash_table = None;
        let mut background_hash_table = None;
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
        let head_key_columns: Vec<_> = (0..num_head_columns)
            .map(|i| positive_table.column_at(i).clone())
            .collect();
        let coverage_hash_table = build_hash_table_after_semi_join(
            positive_table.num_tuples(),
            &head_key_columns,
            marked.into_iter(),
        );

        let mut coverage_semi_join = crate::execution::semi_join::create_semi_join(
            true,
            uncovered_positive_data,
            &positive_table,
            &coverage_hash_table,
            &coverage_join_keys,
            &coverage_join_keys,
            project_column_ids,
            self.config.semijoin_chunk_size,
        );
        let mut num_covered = 0;
        while let Some(chunk) = coverage_semi_join.next() {
            num_covered += chunk.num_ones;
        }
        num_covered
    }
}

/// `((1-p)^2 log2(1-p) - p^2 log2 p) * ln 2 + p` with `p = pos/(pos+neg)`;
/// degenerate inputs pin the area to 0 (no positives) or 1 (no negatives).
pub fn area_under_entropy_curve(num_positive: usize, num_negative: usize) -> f64 {
    if num_positive == 0 {
        return 0.0;
    }
    if num_negative == 0 {
        return 1.0;
    }
    let precision = num_positive as f64 / (num_positive + num_negative) as f64;
    ((1.0 - precision) * (1.0 - precision) * (1.0 - precision).log2()
        - precision * precision * precision.log2())
        * 2f64.ln()
        + precision
}

/// A literal needs regrow iff the clause's last body literal was random and
/// this literal binds none of that literal's new variables outside the
/// predicate's key position.
pub fn need_regrow(clause: &FoilClause, num_covered_negative: usize, literal: &FoilLiteral) -> bool {
    if clause.body_literals().is_empty() || num_covered_negative == 0 {
        return false;
    }
    if !clause.random_flags().last().copied().unwrap_or(false) {
        return false;
    }
    let new_variable_start = clause.num_variables_without_last_body_literal() as i32;
    for (position, variable) in literal.variables().iter().enumerate() {
        if variable.variable_id() >= new_variable_start && Some(position) != literal.predicate().key()
        {
            return false;
        }
    }
    true
}

pub fn need_regrow_for_info(clause: &FoilClause, info: &EvaluatedLiteralInfo) -> bool {
    need_regrow(clause, info.num_covered_negative, &info.literal)
}
