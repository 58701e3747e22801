/// A predicate: a name, typed argument positions, an optional key position,
/// and the read-only columnar fact table backing it.
use std::sync::Arc;

use crate::storage::columnar::Table;

pub struct FoilPredicate {
    id: i32,
    name: String,
    /// Key argument position: for any value at that position there is at most
    /// one fact.
    key: Option<usize>,
    argument_types: Vec<i32>,
    fact_table: Table,
}

pub type FoilPredicateRef = Arc<FoilPredicate>;

impl FoilPredicate {
    pub fn new(
        id: i32,
        name: impl Into<String>,
        key: Option<usize>,
        argument_types: Vec<i32>,
        fact_table: Table,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            key,
            argument_types,
            fact_table,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> Option<usize> {
        self.key
    }

    pub fn argument_types(&self) -> &[i32] {
        &self.argument_types
    }

    pub fn argument_type_at(&self, index: usize) -> i32 {
        self.argument_types[index]
    }

    pub fn num_arguments(&self) -> usize {
        self.argument_types.len()
    }

    pub fn fact_table(&self) -> &Table {
        &self.fact_table
    }

    pub fn num_total_facts(&self) -> usize {
        self.fact_table.num_tuples()
    }
}

impl std::fmt::Debug for FoilPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoilPredicate")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("key", &self.key)
            .field("argument_types", &self.argument_types)
            .field("num_facts", &self.fact_table.num_tuples())
            .finish()
    }
}
