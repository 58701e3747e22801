/// Candidate literal enumeration.
///
/// For the most general clause the candidate set is the type-compatible
/// cartesian product per background predicate, reused from the previous run
/// minus coverage-pruned literals when available. For longer clauses only the
/// newly-introduced variables spawn fresh combinations; retained literals
/// from the previous iteration are extended with the new variables, keyed
/// predicates drop variables already used at the key position, and
/// replaceable duplicates are pruned with a canonical-database join check.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::learner::search_stats::LiteralSearchStats;
use crate::schema::clause::FoilClause;
use crate::schema::literal::FoilLiteral;
use crate::schema::predicate::{FoilPredicate, FoilPredicateRef};
use crate::schema::variable::{FoilVariable, FoilVariableSet};

/// Candidate literals per predicate id: the entire generated set and the
/// subset surviving pruning, which is what gets evaluated.
pub struct EnumeratedLiterals {
    pub entire: BTreeMap<i32, Vec<FoilLiteral>>,
    pub pruned: BTreeMap<i32, Vec<FoilLiteral>>,
}

pub struct CandidateLiteralEnumerator {
    background_predicates: Vec<FoilPredicateRef>,
    /// Canonical databases cached per predicate id for one enumeration.
    canonical_databases: HashMap<i32, Vec<Vec<i32>>>,
}

impl CandidateLiteralEnumerator {
    pub fn new(background_predicates: Vec<FoilPredicateRef>) -> Self {
        Self {
            background_predicates,
            canonical_databases: HashMap::new(),
        }
    }

    pub fn enumerate_candidate_literals(
        &mut self,
        building_clause: &FoilClause,
        last_run_stats: &LiteralSearchStats,
    ) -> EnumeratedLiterals {
        if building_clause.body_literals().is_empty() {
            self.enumerate_for_most_general_clause(building_clause, last_run_stats)
        } else {
            self.enumerate_for_non_most_general_clause(building_clause, last_run_stats)
        }
    }

    fn enumerate_for_most_general_clause(
        &mut self,
        building_clause: &FoilClause,
        last_run_stats: &LiteralSearchStats,
    ) -> EnumeratedLiterals {
        let Some(generated) = &last_run_stats.generated_candidate_literals else {
            return self.enumerate_for_most_general_clause_from_scratch(building_clause);
        };

        let mut entire: BTreeMap<i32, Vec<FoilLiteral>> = BTreeMap::new();
        for (&predicate_id, literals) in generated.iter() {
            let kept: Vec<FoilLiteral> = literals
                .iter()
                .filter(|literal| {
                    !last_run_stats
                        .pruned_literals_by_covered_results
                        .contains(literal)
                })
                .cloned()
                .collect();
            entire.insert(predicate_id, kept);
        }
        let pruned = entire.clone();
        EnumeratedLiterals { entire, pruned }
    }

    fn enumerate_for_most_general_clause_from_scratch(
        &mut self,
        building_clause: &FoilClause,
    ) -> EnumeratedLiterals {
        debug_assert!(building_clause.body_literals().is_empty());

        let mut variables_by_type: HashMap<i32, Vec<FoilVariable>> = HashMap::new();
        for variable in building_clause.variables() {
            variables_by_type
                .entry(variable.variable_type_id())
                .or_default()
                .push(*variable);
        }

        let mut entire: BTreeMap<i32, Vec<FoilLiteral>> = BTreeMap::new();
        let head_literal = building_clause.head_literal();
        for predicate in &self.background_predicates {
            let variables_per_argument = Self::generate_variable_vector_for_predicate(
                &variables_by_type,
                predicate,
                &FoilVariableSet::new(),
            );
            let literals = Self::generate_candidate_literals(predicate, &variables_per_argument);
            if literals.is_empty() {
                continue;
            }
            if predicate.id() != head_literal.predicate().id() {
                entire.insert(predicate.id(), literals);
            } else {
                entire.insert(
                    predicate.id(),
                    literals
                        .into_iter()
                        .filter(|literal| literal != head_literal)
                        .collect(),
                );
            }
        }
        let pruned = entire.clone();
        EnumeratedLiterals { entire, pruned }
    }

    fn enumerate_for_non_most_general_clause(
        &mut self,
        building_clause: &FoilClause,
        last_run_stats: &LiteralSearchStats,
    ) -> EnumeratedLiterals {
        debug_assert!(!building_clause.body_literals().is_empty());

        // Only the variables introduced by the just-added body literal spawn
        // fresh combinations; older combinations come from the retained set.
        let new_variable_start = building_clause.num_variables_without_last_body_literal() as i32;
        let mut new_variables_by_type: HashMap<i32, Vec<FoilVariable>> = HashMap::new();
        for variable in building_clause.variables() {
            if variable.variable_id() >= new_variable_start {
                new_variables_by_type
                    .entry(variable.variable_type_id())
                    .or_default()
                    .push(*variable);
            }
        }

        let mut body_literals_by_predicate: BTreeMap<i32, Vec<&FoilLiteral>> = BTreeMap::new();
        for body_literal in building_clause.body_literals() {
            body_literals_by_predicate
                .entry(body_literal.predicate().id())
                .or_default()
                .push(body_literal);
        }

        let mut entire: BTreeMap<i32, Vec<FoilLiteral>> = BTreeMap::new();
        let mut pruned: BTreeMap<i32, Vec<FoilLiteral>> = BTreeMap::new();
        let background_predicates = self.background_predicates.clone();
        for predicate in &background_predicates {
            self.generate_and_prune_for_predicate(
                building_clause,
                last_run_stats,
                predicate,
                &new_variables_by_type,
                &body_literals_by_predicate,
                &mut entire,
                &mut pruned,
            );
        }

        self.canonical_databases.clear();
        EnumeratedLiterals { entire, pruned }
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_and_prune_for_predicate(
        &mut self,
        building_clause: &FoilClause,
        last_run_stats: &LiteralSearchStats,
        predicate: &FoilPredicateRef,
        new_variables_by_type: &HashMap<i32, Vec<FoilVariable>>,
        body_literals_by_predicate: &BTreeMap<i32, Vec<&FoilLiteral>>,
        entire: &mut BTreeMap<i32, Vec<FoilLiteral>>,
        pruned: &mut BTreeMap<i32, Vec<FoilLiteral>>,
    ) {
        let body_literals = body_literals_by_predicate.get(&predicate.id());

        let mut key_variables = FoilVariableSet::new();
        if let (Some(key), Some(body_literals)) = (predicate.key(), body_literals) {
            for body_literal in body_literals {
                key_variables.insert(body_literal.variable_at(key));
            }
        }

        let variables_per_argument = Self::generate_variable_vector_for_predicate(
            new_variables_by_type,
            predicate,
            &key_variables,
        );
        let mut candidate_literals =
            Self::generate_candidate_literals(predicate, &variables_per_argument);

        if let Some(generated) = &last_run_stats.generated_candidate_literals {
            if let Some(old_literals) = generated.get(&predicate.id()) {
                let last_body_literal = building_clause.body_literals().last().cloned();
                for old_literal in old_literals {
                    if last_run_stats
                        .pruned_literals_by_covered_results
                        .contains(old_literal)
                    {
                        continue;
                    }
                    candidate_literals.extend(Self::generate_candidate_literals_from_another(
                        predicate,
                        old_literal,
                        &variables_per_argument,
                    ));
                    if last_body_literal.as_ref() != Some(old_literal) {
                        candidate_literals.push(old_literal.clone());
                    }
                }
            }
        }

        let pruned_literals: Vec<FoilLiteral> = match body_literals {
            None => candidate_literals.clone(),
            Some(_) => candidate_literals
                .iter()
                .filter(|literal| {
                    !self.check_replaceable_duplicate(
                        building_clause,
                        literal,
                        body_literals_by_predicate,
                    )
                })
                .cloned()
                .collect(),
        };

        entire.insert(predicate.id(), candidate_literals);
        pruned.insert(predicate.id(), pruned_literals);
    }

    /// Candidate variables per argument position: clause variables of the
    /// argument's type plus a fresh unbound marker, which always comes last.
    /// Variables already used at a keyed predicate's key position are
    /// excluded at that position.
    fn generate_variable_vector_for_predicate(
        variables_by_type: &HashMap<i32, Vec<FoilVariable>>,
        predicate: &FoilPredicate,
        key_variables: &FoilVariableSet,
    ) -> Vec<Vec<FoilVariable>> {
        let mut variables_per_argument = Vec::with_capacity(predicate.num_arguments());
        for position in 0..predicate.num_arguments() {
            let argument_type = predicate.argument_type_at(position);
            let mut candidates: Vec<FoilVariable> = variables_by_type
                .get(&argument_type)
                .cloned()
                .unwrap_or_default();
            if predicate.key() == Some(position) && !key_variables.is_empty() {
                candidates.retain(|variable| !key_variables.contains(variable));
            }
            candidates.push(FoilVariable::unbound(argument_type));
            variables_per_argument.push(candidates);
        }
        variables_per_argument
    }

    /// Cartesian product over the per-argument candidate lists, excluding the
    /// all-unbound literal (which the construction leaves last).
    fn generate_candidate_literals(
        predicate: &FoilPredicateRef,
        variables_per_argument: &[Vec<FoilVariable>],
    ) -> Vec<FoilLiteral> {
        let mut literals = vec![FoilLiteral::new(Arc::clone(predicate))];
        for candidates in variables_per_argument {
            debug_assert!(!candidates.is_empty());
            let mut extended = Vec::new();
            for literal in literals.iter_mut() {
                for candidate in &candidates[1..] {
                    let mut copy = literal.clone();
                    copy.add_variable(*candidate);
                    extended.push(copy);
                }
                literal.add_variable(candidates[0]);
            }
            literals.append(&mut extended);
        }
        debug_assert!(literals
            .last()
            .map(|l| l.all_variables_unbound())
            .unwrap_or(true));
        literals.pop();
        literals
    }

    /// Extensions of a retained literal: bound positions are kept, each
    /// unbound position branches over the new candidates. The trailing
    /// duplicate of the base literal itself is dropped.
    fn generate_candidate_literals_from_another(
        predicate: &FoilPredicateRef,
        base_literal: &FoilLiteral,
        variables_per_argument: &[Vec<FoilVariable>],
    ) -> Vec<FoilLiteral> {
        let mut literals = vec![FoilLiteral::new(Arc::clone(predicate))];
        for (position, candidates) in variables_per_argument.iter().enumerate() {
            let base_variable = base_literal.variable_at(position);
            if base_variable.is_bound() {
                for literal in literals.iter_mut() {
                    literal.add_variable(base_variable);
                }
            } else {
                let mut extended = Vec::new();
                for literal in literals.iter_mut() {
                    for candidate in &candidates[1..] {
                        let mut copy = literal.clone();
                        copy.add_variable(*candidate);
                        extended.push(copy);
                    }
                    literal.add_variable(candidates[0]);
                }
                literals.append(&mut extended);
            }
        }
        debug_assert!(literals.last().map(|l| l == base_literal).unwrap_or(true));
        literals.pop();
        literals
    }

    /// A candidate is a replaceable duplicate when swapping it for one of the
    /// clause's existing literals on the same predicate yields a clause whose
    /// canonical database still satisfies the original clause.
    pub(crate) fn check_replaceable_duplicate(
        &mut self,
        clause: &FoilClause,
        literal: &FoilLiteral,
        body_literals_by_predicate: &BTreeMap<i32, Vec<&FoilLiteral>>,
    ) -> bool {
        let Some(body_literals) = body_literals_by_predicate.get(&literal.predicate().id()) else {
            return false;
        };
        if body_literals.is_empty() {
            return false;
        }

        let canonical_db = self.canonical_database(clause, literal.predicate().id(), body_literals_by_predicate);

        let mut relation_without_new: Vec<Vec<i32>> = Vec::with_capacity(body_literals.len());
        for body_literal in body_literals {
            relation_without_new.push(existing_literal_row(body_literal));
        }

        for replaced_index in 0..body_literals.len() {
            let mut joined = canonical_db.clone();
            for (i, body_literal) in body_literals.iter().enumerate() {
                if i != replaced_index {
                    nested_loops_join(body_literal, &relation_without_new, &mut joined, false, false);
                }
            }
            if !nested_loops_join(literal, &relation_without_new, &mut joined, true, true) {
                continue;
            }

            let mut relation_with_new: Vec<Vec<i32>> = relation_without_new
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != replaced_index)
                .map(|(_, row)| row.clone())
                .collect();
            relation_with_new.push(new_literal_row(literal, clause.num_variables() as i32));

            let mut joined = canonical_db.clone();
            for body_literal in &body_literals[..body_literals.len() - 1] {
                nested_loops_join(body_literal, &relation_with_new, &mut joined, false, false);
            }
            if nested_loops_join(
                body_literals[body_literals.len() - 1],
                &relation_with_new,
                &mut joined,
                false,
                true,
            ) {
                return true;
            }
        }
        false
    }

    /// The clause's canonical database with every literal on `predicate_id`
    /// removed: variables become constants equal to their ids, body literals
    /// natural-join on shared variables, `-1` means unrestricted.
    fn canonical_database(
        &mut self,
        clause: &FoilClause,
        predicate_id: i32,
        body_literals_by_predicate: &BTreeMap<i32, Vec<&FoilLiteral>>,
    ) -> Vec<Vec<i32>> {
        if let Some(cached) = self.canonical_databases.get(&predicate_id) {
            return cached.clone();
        }

        let num_variables = clause.num_variables();
        let head_literal = clause.head_literal();
        let mut joined: Vec<Vec<i32>> = Vec::new();
        let mut has_joined_head = false;

        for (&other_predicate_id, body_literals) in body_literals_by_predicate {
            if other_predicate_id == predicate_id {
                continue;
            }
            let mut relation: Vec<Vec<i32>> =
                body_literals.iter().map(|l| existing_literal_row(l)).collect();
            if !has_joined_head && head_literal.predicate().id() == other_predicate_id {
                has_joined_head = true;
                relation.push(existing_literal_row(head_literal));
            }
            debug_assert!(!relation.is_empty());
            if joined.is_empty() {
                let first_literal = body_literals[0];
                for row in &relation {
                    let mut seeded = vec![-1; num_variables];
                    for (position, &constant) in row.iter().enumerate() {
                        seeded[first_literal.variable_at(position).variable_id() as usize] =
                            constant;
                    }
                    joined.push(seeded);
                }
                for body_literal in &body_literals[1..] {
                    nested_loops_join(body_literal, &relation, &mut joined, false, false);
                }
            } else {
                for body_literal in body_literals {
                    nested_loops_join(body_literal, &relation, &mut joined, false, false);
                }
            }
        }

        if !has_joined_head {
            if joined.is_empty() {
                let mut row = vec![-1; num_variables];
                for variable in head_literal.variables() {
                    let variable_id = variable.variable_id();
                    row[variable_id as usize] = variable_id;
                }
                joined.push(row);
            } else {
                let relation = vec![existing_literal_row(head_literal)];
                nested_loops_join(head_literal, &relation, &mut joined, false, false);
            }
        }

        self.canonical_databases.insert(predicate_id, joined.clone());
        joined
    }
}

fn existing_literal_row(literal: &FoilLiteral) -> Vec<i32> {
    literal
        .variables()
        .iter()
        .map(|variable| variable.variable_id())
        .collect()
}

fn new_literal_row(literal: &FoilLiteral, new_variable_start_id: i32) -> Vec<i32> {
    let mut next_id = new_variable_start_id;
    literal
        .variables()
        .iter()
        .map(|variable| {
            if variable.is_bound() {
                variable.variable_id()
            } else {
                let id = next_id;
                next_id += 1;
                id
            }
        })
        .collect()
}

/// Join the literal's pattern rows against the accumulated canonical
/// relation. With `check_bound_only`, unbound positions of the tested literal
/// are ignored; with `short_circuit`, return on the first match without
/// materialising results.
fn nested_loops_join(
    literal: &FoilLiteral,
    predicate_relation: &[Vec<i32>],
    joined_relation: &mut Vec<Vec<i32>>,
    check_bound_only: bool,
    short_circuit: bool,
) -> bool {
    let mut result: Vec<Vec<i32>> = Vec::new();
    for predicate_row in predicate_relation {
        for joined_row in joined_relation.iter() {
            let mut matched = true;
            for (position, &constant) in predicate_row.iter().enumerate() {
                let variable = literal.variable_at(position);
                if check_bound_only && !variable.is_bound() {
                    continue;
                }
                let bound = joined_row[variable.variable_id() as usize];
                if bound != -1 && bound != constant {
                    matched = false;
                    break;
                }
            }
            if matched {
                if short_circuit {
                    return true;
                }
                let mut new_row = joined_row.clone();
                for (position, &constant) in predicate_row.iter().enumerate() {
                    let variable = literal.variable_at(position);
                    if !variable.is_bound() {
                        continue;
                    }
                    let slot = &mut new_row[variable.variable_id() as usize];
                    if *slot == -1 {
                        *slot = constant;
                    }
                }
                result.push(new_row);
            }
        }
    }
    *joined_relation = result;
    !joined_relation.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::literal::FoilLiteralSet;
    use crate::schema::parser::{FoilParser, PredicateCatalog};
    use crate::storage::columnar::{Column, Table};
    use std::collections::HashSet;

    fn make_predicate(id: i32, types: Vec<i32>, key: Option<usize>) -> FoilPredicateRef {
        let columns = types
            .iter()
            .map(|_| Column::from_values(Vec::new()))
            .collect();
        Arc::new(FoilPredicate::new(
            id,
            format!("p_{id}"),
            key,
            types,
            Table::new(columns),
        ))
    }

    struct Fixture {
        catalog: PredicateCatalog,
        background: Vec<FoilPredicateRef>,
    }

    impl Fixture {
        fn new() -> Self {
            let predicates = vec![
                make_predicate(0, vec![0], None),
                make_predicate(1, vec![0, 1], None),
                make_predicate(2, vec![1, 0, 2], None),
                make_predicate(3, vec![0, 0, 1], None),
                make_predicate(4, vec![1, 0, 1], None),
                make_predicate(5, vec![0, 0], None),
            ];
            let mut catalog = PredicateCatalog::new();
            for predicate in &predicates {
                catalog.insert(predicate.name().to_string(), Arc::clone(predicate));
            }
            Self {
                catalog,
                background: predicates,
            }
        }

        fn enumerator(&self) -> CandidateLiteralEnumerator {
            CandidateLiteralEnumerator::new(self.background.clone())
        }

        fn literals(&self, texts: &[&str]) -> Vec<FoilLiteral> {
            texts
                .iter()
                .map(|text| FoilParser::parse_literal(&self.catalog, text).unwrap())
                .collect()
        }

        fn clause(&self, text: &str) -> FoilClause {
            FoilParser::parse_clause(&self.catalog, text).unwrap()
        }
    }

    fn flatten(map: &BTreeMap<i32, Vec<FoilLiteral>>) -> Vec<FoilLiteral> {
        map.values().flatten().cloned().collect()
    }

    fn assert_same_literal_sets(expected: &[FoilLiteral], actual: &[FoilLiteral]) {
        let expected_set: HashSet<&FoilLiteral> = expected.iter().collect();
        let actual_set: HashSet<&FoilLiteral> = actual.iter().collect();
        assert_eq!(expected_set.len(), expected.len(), "duplicate in expected");
        assert_eq!(actual_set.len(), actual.len(), "duplicate in actual");
        let missing: Vec<_> = expected_set.difference(&actual_set).collect();
        let unexpected: Vec<_> = actual_set.difference(&expected_set).collect();
        assert!(
            missing.is_empty() && unexpected.is_empty(),
            "missing: {missing:?}\nunexpected: {unexpected:?}"
        );
    }

    #[test]
    fn test_generate_all_candidate_literals() {
        let fixture = Fixture::new();
        let variables_by_type: HashMap<i32, Vec<FoilVariable>> = HashMap::from([
            (0, vec![FoilVariable::new(0, 0), FoilVariable::new(1, 0)]),
            (1, vec![FoilVariable::new(2, 1), FoilVariable::new(3, 1)]),
            (
                2,
                vec![
                    FoilVariable::new(4, 2),
                    FoilVariable::new(5, 2),
                    FoilVariable::new(6, 2),
                ],
            ),
        ]);

        let unary = &fixture.background[0];
        let per_argument = CandidateLiteralEnumerator::generate_variable_vector_for_predicate(
            &variables_by_type,
            unary,
            &FoilVariableSet::new(),
        );
        let mut actual = CandidateLiteralEnumerator::generate_candidate_literals(unary, &per_argument);
        // The all-unbound literal is popped by generation; the original test
        // includes it, so restore it for the comparison.
        actual.push(FoilLiteral::with_variables(
            Arc::clone(unary),
            vec![FoilVariable::unbound(0)],
        ));
        assert_same_literal_sets(&fixture.literals(&["p_0(0)", "p_0(1)", "p_0(-1)"]), &actual);

        let ternary = &fixture.background[2];
        let per_argument = CandidateLiteralEnumerator::generate_variable_vector_for_predicate(
            &variables_by_type,
            ternary,
            &FoilVariableSet::new(),
        );
        let mut actual =
            CandidateLiteralEnumerator::generate_candidate_literals(ternary, &per_argument);
        actual.push(FoilLiteral::with_variables(
            Arc::clone(ternary),
            vec![
                FoilVariable::unbound(1),
                FoilVariable::unbound(0),
                FoilVariable::unbound(2),
            ],
        ));
        let expected = fixture.literals(&[
            "p_2(2, 0, 4)", "p_2(2, 0, 5)", "p_2(2, 0, 6)", "p_2(2, 0, -1)",
            "p_2(2, 1, 4)", "p_2(2, 1, 5)", "p_2(2, 1, 6)", "p_2(2, 1, -1)",
            "p_2(2, -1, 4)", "p_2(2, -1, 5)", "p_2(2, -1, 6)", "p_2(2, -1, -1)",
            "p_2(3, 0, 4)", "p_2(3, 0, 5)", "p_2(3, 0, 6)", "p_2(3, 0, -1)",
            "p_2(3, 1, 4)", "p_2(3, 1, 5)", "p_2(3, 1, 6)", "p_2(3, 1, -1)",
            "p_2(3, -1, 4)", "p_2(3, -1, 5)", "p_2(3, -1, 6)", "p_2(3, -1, -1)",
            "p_2(-1, 0, 4)", "p_2(-1, 0, 5)", "p_2(-1, 0, 6)", "p_2(-1, 0, -1)",
            "p_2(-1, 1, 4)", "p_2(-1, 1, 5)", "p_2(-1, 1, 6)", "p_2(-1, 1, -1)",
            "p_2(-1, -1, 4)", "p_2(-1, -1, 5)", "p_2(-1, -1, 6)", "p_2(-1, -1, -1)",
        ]);
        assert_same_literal_sets(&expected, &actual);
    }

    fn is_duplicate(fixture: &Fixture, clause_text: &str, literal_text: &str) -> bool {
        let clause = fixture.clause(clause_text);
        let literal = FoilParser::parse_literal(&fixture.catalog, literal_text).unwrap();
        let mut body_map: BTreeMap<i32, Vec<&FoilLiteral>> = BTreeMap::new();
        for body_literal in clause.body_literals() {
            body_map
                .entry(body_literal.predicate().id())
                .or_default()
                .push(body_literal);
        }
        let mut enumerator = fixture.enumerator();
        enumerator.check_replaceable_duplicate(&clause, &literal, &body_map)
    }

    #[test]
    fn test_replaceable_duplicates() {
        let fixture = Fixture::new();

        assert!(is_duplicate(&fixture, "p_0(0) :- p_1(0, 1)", "p_1(0, -1)"));
        assert!(!is_duplicate(&fixture, "p_0(0) :- p_1(0, 1)", "p_1(-1, 1)"));

        let clause = "p_0(0) :- p_1(0, 1), p_2(1, 0, 2)";
        assert!(!is_duplicate(&fixture, clause, "p_2(1, -1, 2)"));
        assert!(!is_duplicate(&fixture, clause, "p_1(0, -1)"));
        assert!(is_duplicate(&fixture, clause, "p_2(1, 0, -1)"));

        let clause = "p_5(0, 1) :- p_5(0, 2), p_5(2, 1), p_5(0, 3)";
        assert!(is_duplicate(&fixture, clause, "p_5(0, -1)"));
        assert!(is_duplicate(&fixture, clause, "p_5(3, 1)"));
        assert!(is_duplicate(&fixture, clause, "p_5(3, -1)"));
        assert!(!is_duplicate(&fixture, clause, "p_5(1, 2)"));
    }

    #[test]
    fn test_enumeration_without_dynamic_pruning() {
        let fixture = Fixture::new();
        let clause_texts = [
            "p_5(0, 1) :-",
            "p_5(0, 1) :- p_5(0, 2)",
            "p_5(0, 1) :- p_5(0, 2), p_5(2, 1)",
            "p_5(0, 1) :- p_5(0, 2), p_5(2, 1), p_5(0, 3)",
        ];

        let mut enumerator = fixture.enumerator();
        let mut stats = LiteralSearchStats::default();
        let mut last = None;
        for clause_text in clause_texts {
            let clause = fixture.clause(clause_text);
            let enumerated = enumerator.enumerate_candidate_literals(&clause, &stats);
            stats = LiteralSearchStats::new(
                Arc::new(enumerated.entire.clone()),
                FoilLiteralSet::new(),
            );
            last = Some(enumerated);
        }
        let enumerated = last.unwrap();

        let expected_entire = fixture.literals(&[
            "p_0(0)", "p_0(1)", "p_0(2)", "p_0(3)",
            "p_1(0, -1)", "p_1(1, -1)", "p_1(2, -1)", "p_1(3, -1)",
            "p_2(-1, 0, -1)", "p_2(-1, 1, -1)", "p_2(-1, 2, -1)", "p_2(-1, 3, -1)",
            "p_3(-1, 0, -1)", "p_3(-1, 1, -1)", "p_3(-1, 2, -1)", "p_3(-1, 3, -1)",
            "p_3(0, -1, -1)", "p_3(0, 0, -1)", "p_3(0, 1, -1)", "p_3(0, 2, -1)", "p_3(0, 3, -1)",
            "p_3(1, -1, -1)", "p_3(1, 0, -1)", "p_3(1, 1, -1)", "p_3(1, 2, -1)", "p_3(1, 3, -1)",
            "p_3(2, -1, -1)", "p_3(2, 0, -1)", "p_3(2, 1, -1)", "p_3(2, 2, -1)", "p_3(2, 3, -1)",
            "p_3(3, -1, -1)", "p_3(3, 0, -1)", "p_3(3, 1, -1)", "p_3(3, 2, -1)", "p_3(3, 3, -1)",
            "p_4(-1, 0, -1)", "p_4(-1, 1, -1)", "p_4(-1, 2, -1)", "p_4(-1, 3, -1)",
            "p_5(-1, 0)", "p_5(-1, 1)", "p_5(-1, 2)", "p_5(-1, 3)",
            "p_5(0, -1)", "p_5(0, 0)", "p_5(0, 2)", "p_5(0, 3)",
            "p_5(1, -1)", "p_5(1, 0)", "p_5(1, 1)", "p_5(1, 2)", "p_5(1, 3)",
            "p_5(2, -1)", "p_5(2, 0)", "p_5(2, 2)", "p_5(2, 3)",
            "p_5(3, -1)", "p_5(3, 0)", "p_5(3, 1)", "p_5(3, 2)", "p_5(3, 3)",
        ]);
        let expected_pruned = fixture.literals(&[
            "p_0(0)", "p_1(0, -1)", "p_2(-1, 0, -1)", "p_3(-1, 0, -1)", "p_3(0, -1, -1)",
            "p_3(0, 3, -1)", "p_3(0, 2, -1)", "p_3(0, 1, -1)", "p_3(0, 0, -1)",
            "p_4(-1, 0, -1)", "p_5(-1, 0)", "p_5(0, 0)",
            "p_0(1)", "p_1(1, -1)", "p_2(-1, 1, -1)", "p_3(-1, 1, -1)", "p_3(1, -1, -1)",
            "p_3(1, 3, -1)", "p_3(1, 2, -1)", "p_3(1, 1, -1)", "p_3(1, 0, -1)",
            "p_4(-1, 1, -1)", "p_5(1, -1)", "p_5(1, 3)", "p_5(1, 2)", "p_5(1, 1)", "p_5(1, 0)",
            "p_0(2)", "p_1(2, -1)", "p_2(-1, 2, -1)", "p_3(-1, 2, -1)", "p_3(2, -1, -1)",
            "p_3(2, 3, -1)", "p_3(2, 2, -1)", "p_3(2, 1, -1)", "p_3(2, 0, -1)",
            "p_4(-1, 2, -1)", "p_5(2, 2)", "p_5(2, 0)",
            "p_0(3)", "p_1(3, -1)", "p_2(-1, 3, -1)", "p_3(-1, 3, -1)", "p_3(3, -1, -1)",
            "p_3(3, 3, -1)", "p_3(3, 2, -1)", "p_3(3, 1, -1)", "p_3(3, 0, -1)",
            "p_4(-1, 3, -1)", "p_5(3, 0)",
        ]);

        assert_same_literal_sets(&expected_entire, &flatten(&enumerated.entire));
        assert_same_literal_sets(&expected_pruned, &flatten(&enumerated.pruned));
    }

    #[test]
    fn test_enumeration_with_dynamic_pruning() {
        let fixture = Fixture::new();
        let clause_texts = [
            "p_5(0, 1) :-",
            "p_5(0, 1) :- p_5(0, 2)",
            "p_5(0, 1) :- p_5(0, 2), p_5(2, 1)",
            "p_5(0, 1) :- p_5(0, 2), p_5(2, 1), p_5(0, 3)",
        ];
        let removed_in_iteration_0 =
            fixture.literals(&["p_1(0, -1)", "p_3(-1, 0, -1)", "p_3(0, -1, -1)"]);
        let removed_in_iteration_1 = fixture.literals(&["p_3(2, -1, -1)", "p_5(2, -1)"]);

        let mut enumerator = fixture.enumerator();
        let mut stats = LiteralSearchStats::default();
        let mut last = None;
        for (iteration, clause_text) in clause_texts.iter().enumerate() {
            let clause = fixture.clause(clause_text);
            let enumerated = enumerator.enumerate_candidate_literals(&clause, &stats);
            let mut removed = FoilLiteralSet::new();
            let removal_targets = match iteration {
                0 => removed_in_iteration_0.as_slice(),
                1 => removed_in_iteration_1.as_slice(),
                _ => &[],
            };
            for target in removal_targets {
                if flatten(&enumerated.entire).contains(target) {
                    removed.insert(target.clone());
                }
            }
            stats = LiteralSearchStats::new(Arc::new(enumerated.entire.clone()), removed);
            last = Some(enumerated);
        }
        let enumerated = last.unwrap();

        let expected_entire = fixture.literals(&[
            "p_0(0)", "p_0(1)", "p_0(2)", "p_0(3)",
            "p_1(1, -1)", "p_1(2, -1)", "p_1(3, -1)",
            "p_2(-1, 0, -1)", "p_2(-1, 1, -1)", "p_2(-1, 2, -1)", "p_2(-1, 3, -1)",
            "p_3(-1, 1, -1)", "p_3(-1, 2, -1)", "p_3(-1, 3, -1)",
            "p_3(0, 0, -1)", "p_3(0, 1, -1)",
            "p_3(1, -1, -1)", "p_3(1, 0, -1)", "p_3(1, 1, -1)", "p_3(1, 2, -1)", "p_3(1, 3, -1)",
            "p_3(2, 1, -1)", "p_3(2, 2, -1)",
            "p_3(3, -1, -1)", "p_3(3, 1, -1)", "p_3(3, 2, -1)", "p_3(3, 3, -1)",
            "p_4(-1, 0, -1)", "p_4(-1, 1, -1)", "p_4(-1, 2, -1)", "p_4(-1, 3, -1)",
            "p_5(-1, 0)", "p_5(-1, 1)", "p_5(-1, 2)", "p_5(-1, 3)",
            "p_5(0, -1)", "p_5(0, 0)", "p_5(0, 2)", "p_5(0, 3)",
            "p_5(1, -1)", "p_5(1, 0)", "p_5(1, 1)", "p_5(1, 2)", "p_5(1, 3)",
            "p_5(2, 0)", "p_5(2, 2)",
            "p_5(3, -1)", "p_5(3, 0)", "p_5(3, 1)", "p_5(3, 2)", "p_5(3, 3)",
        ]);
        let expected_pruned = fixture.literals(&[
            "p_0(0)", "p_0(1)", "p_0(2)", "p_0(3)",
            "p_1(1, -1)", "p_1(2, -1)", "p_1(3, -1)",
            "p_2(-1, 0, -1)", "p_2(-1, 1, -1)", "p_2(-1, 2, -1)", "p_2(-1, 3, -1)",
            "p_3(-1, 1, -1)", "p_3(-1, 2, -1)", "p_3(-1, 3, -1)",
            "p_3(0, 0, -1)", "p_3(0, 1, -1)",
            "p_3(1, -1, -1)", "p_3(1, 0, -1)", "p_3(1, 1, -1)", "p_3(1, 2, -1)", "p_3(1, 3, -1)",
            "p_3(2, 1, -1)", "p_3(2, 2, -1)",
            "p_3(3, -1, -1)", "p_3(3, 1, -1)", "p_3(3, 2, -1)", "p_3(3, 3, -1)",
            "p_4(-1, 0, -1)", "p_4(-1, 1, -1)", "p_4(-1, 2, -1)", "p_4(-1, 3, -1)",
            "p_5(-1, 0)", "p_5(0, 0)",
            "p_5(1, -1)", "p_5(1, 0)", "p_5(1, 1)", "p_5(1, 2)", "p_5(1, 3)",
            "p_5(2, 0)", "p_5(2, 2)", "p_5(3, 0)",
        ]);

        assert_same_literal_sets(&expected_entire, &flatten(&enumerated.entire));
        assert_same_literal_sets(&expected_pruned, &flatten(&enumerated.pruned));
    }

    #[test]
    fn test_most_general_enumeration_is_pure() {
        let fixture = Fixture::new();
        let clause = fixture.clause("p_5(0, 1) :-");
        let mut first_enumerator = fixture.enumerator();
        let first =
            first_enumerator.enumerate_candidate_literals(&clause, &LiteralSearchStats::default());
        let mut second_enumerator = fixture.enumerator();
        let second =
            second_enumerator.enumerate_candidate_literals(&clause, &LiteralSearchStats::default());
        assert_same_literal_sets(&flatten(&first.entire), &flatten(&second.entire));
        // The head itself is never a candidate.
        let head = FoilParser::parse_literal(&fixture.catalog, "p_5(0, 1)").unwrap();
        assert!(!flatten(&first.entire).contains(&head));
    }

    #[test]
    fn test_key_pruning_excludes_used_key_variables() {
        let mut fixture = Fixture::new();
        // A keyed binary predicate on position 0.
        let keyed = make_predicate(6, vec![0, 0], Some(0));
        fixture
            .catalog
            .insert(keyed.name().to_string(), Arc::clone(&keyed));
        fixture.background.push(Arc::clone(&keyed));

        let mut enumerator = fixture.enumerator();
        let mut clause = fixture.clause("p_5(0, 1) :-");
        // The key position holds the newly-introduced variable 2.
        let body = FoilParser::parse_literal(&fixture.catalog, "p_6(2, 0)").unwrap();
        clause.add_bound_body_literal(body, false);

        let enumerated =
            enumerator.enumerate_candidate_literals(&clause, &LiteralSearchStats::default());
        let keyed_literals = enumerated.entire.get(&6).cloned().unwrap_or_default();
        // Variable 2 already appears at the key position, so no candidate may
        // bind it there again; it remains usable at the other position.
        assert!(keyed_literals
            .iter()
            .all(|literal| literal.variable_at(0).variable_id() != 2));
        assert!(keyed_literals
            .iter()
            .any(|literal| literal.variable_at(1).variable_id() == 2));
    }
}
