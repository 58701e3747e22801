/// One node of the clause-building back-chain. States extended by a random
/// literal keep a shared pointer to their predecessor so the driver can drop
/// the random literal and regrow; the chain is acyclic by construction.
use std::cell::RefCell;
use std::sync::Arc;

use crate::learner::search_stats::LiteralSearchStats;
use crate::learner::selector::LiteralSelector;
use crate::schema::clause::FoilClauseRef;
use crate::schema::literal::FoilLiteralSet;
use crate::storage::columnar::Table;

pub struct QuickFoilState {
    pub is_extended_from_tied_literal: bool,
    pub building_clause: FoilClauseRef,
    /// Set only when the last added literal was random.
    pub previous_state: Option<Arc<QuickFoilState>>,
    /// The selector that chose the last literal, retained for backtracking.
    pub literal_selector: RefCell<Option<LiteralSelector>>,
    pub literal_search_stats: Arc<LiteralSearchStats>,
    /// Random literals tried from this state and rejected.
    pub black_random_literals: RefCell<FoilLiteralSet>,
    pub uncovered_positive_data: Arc<Table>,
}

impl QuickFoilState {
    pub fn new(
        is_extended_from_tied_literal: bool,
        building_clause: FoilClauseRef,
        literal_search_stats: Arc<LiteralSearchStats>,
        black_random_literals: FoilLiteralSet,
        uncovered_positive_data: Arc<Table>,
    ) -> Self {
        debug_assert!(!building_clause.random_flags().last().copied().unwrap_or(false));
        Self {
            is_extended_from_tied_literal,
            building_clause,
            previous_state: None,
            literal_selector: RefCell::new(None),
            literal_search_stats,
            black_random_literals: RefCell::new(black_random_literals),
            uncovered_positive_data,
        }
    }

    pub fn with_previous(
        is_extended_from_tied_literal: bool,
        building_clause: FoilClauseRef,
        previous_state: Arc<QuickFoilState>,
        literal_search_stats: Arc<LiteralSearchStats>,
        black_random_literals: FoilLiteralSet,
        uncovered_positive_data: Arc<Table>,
    ) -> Self {
        debug_assert!(building_clause.random_flags().last().copied().unwrap_or(false));
        Self {
            is_extended_from_tied_literal,
            building_clause,
            previous_state: Some(previous_state),
            literal_selector: RefCell::new(None),
            literal_search_stats,
            black_random_literals: RefCell::new(black_random_literals),
            uncovered_positive_data,
        }
    }
}
