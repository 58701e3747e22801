/// Replays learned clauses against a held-out example table, reporting how
/// many examples stay uncovered. Built entirely from the engine primitives:
/// binding tables via the multi-column join, coverage via semi-joins and a
/// deduplicated hash-table build.
use tracing::info;

use crate::config::FoilConfig;
use crate::error::FoilResult;
use crate::execution::expression::AttributeReference;
use crate::execution::multi_column_join::create_binding_table;
use crate::execution::semi_join::{create_semi_join, select_and_create_semi_join};
use crate::schema::clause::FoilClause;
use crate::schema::literal::FoilLiteral;
use crate::schema::predicate::FoilPredicate;
use crate::storage::columnar::{Column, Table, Value};
use crate::storage::hash_table::{build_hash_table_after_semi_join, FoilHashTable};

pub struct QuickFoilTestRunner<'a> {
    target_predicate: &'a FoilPredicate,
    clauses: &'a [FoilClause],
    config: &'a FoilConfig,
}

impl<'a> QuickFoilTestRunner<'a> {
    pub fn new(
        target_predicate: &'a FoilPredicate,
        clauses: &'a [FoilClause],
        config: &'a FoilConfig,
    ) -> Self {
        Self {
            target_predicate,
            clauses,
            config,
        }
    }

    /// Number of rows of `test_data` not covered by any learned clause.
    pub fn run_test(&self, test_data: &Table) -> FoilResult<usize> {
        let mut uncovered_data = test_data.clone_view();
        for clause in self.clauses {
            debug_assert!(clause.num_body_literals() > 0);

            let mut binding_table = test_data.clone_view();
            let mut empty_bindings = false;
            for body_literal in
                &clause.body_literals()[..clause.num_body_literals().saturating_sub(1)]
            {
                let columns = create_binding_table(
                    body_literal,
                    &binding_table,
                    self.config.join_chunk_size,
                );
                binding_table = Table::new(columns);
                if binding_table.is_empty() {
                    empty_bindings = true;
                    break;
                }
            }
            if empty_bindings {
                info!(clause = %clause, "clause covers no test data");
                continue;
            }

            let Some(last_literal) = clause.body_literals().last() else {
                continue;
            };
            uncovered_data =
                self.compute_uncovered_data(&uncovered_data, &binding_table, last_literal)?;
            info!(
                clause = %clause,
                uncovered = uncovered_data.num_tuples(),
                "test replay"
            );
            if uncovered_data.is_empty() {
                return Ok(0);
            }
        }
        Ok(uncovered_data.num_tuples())
    }

    fn compute_uncovered_data(
        &self,
        current_uncovered: &Table,
        binding_table: &Table,
        literal: &FoilLiteral,
    ) -> FoilResult<Table> {
        let mut binding_join_keys = Vec::new();
        let mut literal_join_keys = Vec::new();
        for (position, variable) in literal.variables().iter().enumerate() {
            let variable_id = variable.variable_id();
            if variable_id >= 0 && (variable_id as usize) < binding_table.num_columns() {
                literal_join_keys.push(AttributeReference::new(position));
                binding_join_keys.push(AttributeReference::new(variable_id as usize));
            }
        }

        let num_head_columns = self.target_predicate.num_arguments();
        let project_column_ids: Vec<usize> = (0..num_head_columns).collect();
        let coverage_keys: Vec<AttributeReference> =
            (0..num_head_columns).map(AttributeReference::new).collect();

        let background_table = literal.predicate().fact_table();
        let mut binding_hash_table: Option<FoilHashTable> = None;
        let mut background_hash_table: Option<FoilHashTable> = None;
        let mut binding_semi_join = select_and_create_semi_join(
            binding_table,
            background_table,
            &mut binding_hash_table,
            &mut background_hash_table,
            &binding_join_keys,
            &literal_join_keys,
            project_column_ids.clone(),
            self.config.semijoin_chunk_size,
        );
        let mut marked = Vec::new();
        while let Some(chunk) = binding_semi_join.next() {
            marked.extend(chunk.bitvector.ones().map(|bit| chunk.base_offset + bit));
        }
        drop(binding_semi_join);

        let head_columns: Vec<Column> = (0..num_head_columns)
            .map(|i| binding_table.column_at(i).clone())
            .collect();
        let coverage_hash_table = build_hash_table_after_semi_join(
            binding_table.num_tuples(),
            &head_columns,
            marked.into_iter(),
        );

        let mut output_buffers: Vec<Vec<Value>> = vec![Vec::new(); num_head_columns];
        let mut coverage_semi_join = create_semi_join(
            true,
            current_uncovered,
            binding_table,
            &coverage_hash_table,
            &coverage_keys,
            &coverage_keys,
            project_column_ids,
            self.config.semijoin_chunk_size,
        );
        while let Some(mut chunk) = coverage_semi_join.next() {
            chunk.bitvector.flip();
            chunk.num_ones = chunk.bitvector.len() - chunk.num_ones;
            if chunk.num_ones > 0 {
                for (i, key) in coverage_keys.iter().enumerate() {
                    key.evaluate_with_filter(
                        &chunk.output_columns,
                        &chunk.bitvector,
                        &mut output_buffers[i],
                    );
                }
            }
        }
        drop(coverage_semi_join);

        Ok(Table::new(
            output_buffers.into_iter().map(Column::from_values).collect(),
        ))
    }
}
