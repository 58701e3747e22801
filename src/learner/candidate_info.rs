/// Per-candidate evaluation counters.
///
/// Binding counters count join matches by label; covered counters count
/// distinct build rows matched, deduplicated per partition by the plan's
/// coverage bitvectors.
use crate::schema::literal::FoilLiteral;

#[derive(Clone, Debug)]
pub struct CandidateLiteralInfo {
    pub literal: FoilLiteral,
    pub num_covered_positive: usize,
    pub num_covered_negative: usize,
    pub num_binding_positive: usize,
    pub num_binding_negative: usize,
}

impl CandidateLiteralInfo {
    pub fn new(literal: FoilLiteral) -> Self {
        Self {
            literal,
            num_covered_positive: 0,
            num_covered_negative: 0,
            num_binding_positive: 0,
            num_binding_negative: 0,
        }
    }
}
