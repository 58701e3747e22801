/// Carry-over state between literal-search iterations: the full generated
/// candidate set and the literals pruned because they covered nothing.
/// Shared between the evaluator input and the next iteration's enumeration.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema::literal::{FoilLiteral, FoilLiteralSet};

#[derive(Default)]
pub struct LiteralSearchStats {
    /// Candidate literals generated last iteration, keyed by predicate id.
    pub generated_candidate_literals: Option<Arc<BTreeMap<i32, Vec<FoilLiteral>>>>,
    /// Literals whose evaluation covered no positive binding.
    pub pruned_literals_by_covered_results: FoilLiteralSet,
}

impl LiteralSearchStats {
    pub fn new(
        generated_candidate_literals: Arc<BTreeMap<i32, Vec<FoilLiteral>>>,
        pruned_literals_by_covered_results: FoilLiteralSet,
    ) -> Self {
        Self {
            generated_candidate_literals: Some(generated_candidate_literals),
            pruned_literals_by_covered_results,
        }
    }
}
