/// Multi-column inner hash join producing projected output buffers, plus the
/// binding-table constructors built on top of it.
///
/// Projections address the concatenated (probe, build) column space. The
/// collaborative variant probes a positive and a negative build table in one
/// probe-column walk, which is how label-split binding tables for a clause
/// extension are produced.
use crate::execution::expression::AttributeReference;
use crate::schema::clause::FoilClause;
use crate::schema::literal::FoilLiteral;
use crate::storage::columnar::{Column, Table, TupleId, Value};
use crate::storage::hash_table::{
    build_hash_table_on_table, hash_row, rows_equal, FoilHashTable,
};

pub struct MultiColumnHashJoin<'a> {
    probe_table: &'a Table,
    probe_keys: Vec<Column>,
    project_expressions: Vec<AttributeReference>,
    chunk_size: usize,
}

impl<'a> MultiColumnHashJoin<'a> {
    pub fn new(
        probe_table: &'a Table,
        probe_keys: &[AttributeReference],
        project_expressions: Vec<AttributeReference>,
        chunk_size: usize,
    ) -> Self {
        Self {
            probe_table,
            probe_keys: probe_keys
                .iter()
                .map(|key| key.evaluate(probe_table.columns()).clone())
                .collect(),
            project_expressions,
            chunk_size,
        }
    }

    /// Inner equi-join against one build table, appending projected values to
    /// `output_buffers` (one buffer per projection expression).
    pub fn join(
        &self,
        build_table: &Table,
        hash_table: &FoilHashTable,
        build_keys: &[AttributeReference],
        output_buffers: &mut [Vec<Value>],
    ) {
        debug_assert_eq!(self.project_expressions.len(), output_buffers.len());
        let build_key_columns: Vec<Column> = build_keys
            .iter()
            .map(|key| key.evaluate(build_table.columns()).clone())
            .collect();
        let build_key_slices: Vec<&[Value]> =
            build_key_columns.iter().map(|c| c.as_slice()).collect();
        let probe_key_slices: Vec<&[Value]> =
            self.probe_keys.iter().map(|c| c.as_slice()).collect();

        let total = self.probe_table.num_tuples();
        let mut probe_tids: Vec<TupleId> = Vec::with_capacity(self.chunk_size);
        let mut build_tids: Vec<TupleId> = Vec::with_capacity(self.chunk_size);
        let mut offset = 0;
        while offset < total {
            let chunk_len = self.chunk_size.min(total - offset);
            probe_tids.clear();
            build_tids.clear();
            do_block_join(
                offset,
                chunk_len,
                &probe_key_slices,
                &build_key_slices,
                hash_table,
                &mut probe_tids,
                &mut build_tids,
            );
            grow_buffers(output_buffers, probe_tids.len());
            for (expression, buffer) in self.project_expressions.iter().zip(output_buffers.iter_mut())
            {
                expression.evaluate_for_join(
                    self.probe_table.columns(),
                    build_table.columns(),
                    &probe_tids,
                    &build_tids,
                    buffer,
                );
            }
            offset += chunk_len;
        }
    }

    /// Probe two build tables sharing this probe and projection list, so the
    /// probe column walk is amortised over both label sides.
    #[allow(clippy::too_many_arguments)]
    pub fn collaborate_join(
        &self,
        left_build_table: &Table,
        right_build_table: &Table,
        left_hash_table: &FoilHashTable,
        right_hash_table: &FoilHashTable,
        build_keys: &[AttributeReference],
        left_output_buffers: &mut [Vec<Value>],
        right_output_buffers: &mut [Vec<Value>],
    ) {
        debug_assert_eq!(self.project_expressions.len(), left_output_buffers.len());
        debug_assert_eq!(self.project_expressions.len(), right_output_buffers.len());
        let left_keys: Vec<Column> = build_keys
            .iter()
            .map(|key| key.evaluate(left_build_table.columns()).clone())
            .collect();
        let right_keys: Vec<Column> = build_keys
            .iter()
            .map(|key| key.evaluate(right_build_table.columns()).clone())
            .collect();
        let left_key_slices: Vec<&[Value]> = left_keys.iter().map(|c| c.as_slice()).collect();
        let right_key_slices: Vec<&[Value]> = right_keys.iter().map(|c| c.as_slice()).collect();
        let probe_key_slices: Vec<&[Value]> =
            self.probe_keys.iter().map(|c| c.as_slice()).collect();

        let total = self.probe_table.num_tuples();
        let mut left_probe_tids: Vec<TupleId> = Vec::with_capacity(self.chunk_size);
        let mut left_build_tids: Vec<TupleId> = Vec::with_capacity(self.chunk_size);
        let mut right_probe_tids: Vec<TupleId> = Vec::with_capacity(self.chunk_size);
        let mut right_build_tids: Vec<TupleId> = Vec::with_capacity(self.chunk_size);
        let mut offset = 0;
        while offset < total {
            let chunk_len = self.chunk_size.min(total - offset);
            left_probe_tids.clear();
            left_build_tids.clear();
            right_probe_tids.clear();
            right_build_tids.clear();
            do_block_join(
                offset,
                chunk_len,
                &probe_key_slices,
                &left_key_slices,
                left_hash_table,
                &mut left_probe_tids,
                &mut left_build_tids,
            );
            do_block_join(
                offset,
                chunk_len,
                &probe_key_slices,
                &right_key_slices,
                right_hash_table,
                &mut right_probe_tids,
                &mut right_build_tids,
            );
            grow_buffers(left_output_buffers, left_probe_tids.len());
            grow_buffers(right_output_buffers, right_probe_tids.len());
            for (i, expression) in self.project_expressions.iter().enumerate() {
                expression.evaluate_for_join(
                    self.probe_table.columns(),
                    left_build_table.columns(),
                    &left_probe_tids,
                    &left_build_tids,
                    &mut left_output_buffers[i],
                );
                expression.evaluate_for_join(
                    self.probe_table.columns(),
                    right_build_table.columns(),
                    &right_probe_tids,
                    &right_build_tids,
                    &mut right_output_buffers[i],
                );
            }
            offset += chunk_len;
        }
    }
}

fn do_block_join(
    chunk_offset: usize,
    chunk_len: usize,
    probe_keys: &[&[Value]],
    build_keys: &[&[Value]],
    hash_table: &FoilHashTable,
    probe_tids: &mut Vec<TupleId>,
    build_tids: &mut Vec<TupleId>,
) {
    for probe_tid in chunk_offset..chunk_offset + chunk_len {
        let bucket_id = hash_table.bucket_index(hash_row(probe_keys, probe_tid), 0);
        for build_position in hash_table.chain(bucket_id) {
            if rows_equal(probe_keys, build_keys, probe_tid, build_position) {
                probe_tids.push(probe_tid as TupleId);
                build_tids.push(build_position as TupleId);
            }
        }
    }
}

/// Grow-by-1.5x reservation schedule, trimmed implicitly by the final freeze.
fn grow_buffers(buffers: &mut [Vec<Value>], additional: usize) {
    for buffer in buffers.iter_mut() {
        if buffer.capacity() < buffer.len() + additional {
            let grown = (buffer.capacity() * 3 / 2).max(buffer.len() + additional);
            buffer.reserve_exact(grown - buffer.len());
        }
    }
}

fn freeze(buffers: Vec<Vec<Value>>) -> Vec<Column> {
    buffers.into_iter().map(Column::from_values).collect()
}

/// Join the current binding table with a new body literal's fact table,
/// producing the next binding table: bound-variable columns carried over plus
/// one column per newly-bound variable. The hash is built on the smaller side.
pub fn create_binding_table(
    new_literal: &FoilLiteral,
    cur_binding_table: &Table,
    chunk_size: usize,
) -> Vec<Column> {
    let mut literal_join_keys = Vec::new();
    let mut binding_join_keys = Vec::new();
    let mut unbound_positions = Vec::new();
    for (position, variable) in new_literal.variables().iter().enumerate() {
        let variable_id = variable.variable_id();
        if variable_id >= 0 && (variable_id as usize) < cur_binding_table.num_columns() {
            literal_join_keys.push(AttributeReference::new(position));
            binding_join_keys.push(AttributeReference::new(variable_id as usize));
        } else {
            unbound_positions.push(position);
        }
    }

    let literal_table = new_literal.predicate().fact_table();
    let num_binding_columns = cur_binding_table.num_columns();
    let num_output_columns = num_binding_columns + unbound_positions.len();
    let mut output_buffers: Vec<Vec<Value>> = vec![Vec::new(); num_output_columns];

    if literal_table.num_tuples() < cur_binding_table.num_tuples() {
        let literal_keys: Vec<Column> = literal_join_keys
            .iter()
            .map(|key| key.evaluate(literal_table.columns()).clone())
            .collect();
        let hash_table = build_hash_table_on_table(&literal_keys, literal_table.num_tuples());

        let mut project_expressions = Vec::with_capacity(num_output_columns);
        for i in 0..num_binding_columns {
            project_expressions.push(AttributeReference::new(i));
        }
        for &position in &unbound_positions {
            project_expressions.push(AttributeReference::new(position + num_binding_columns));
        }
        let hash_join = MultiColumnHashJoin::new(
            cur_binding_table,
            &binding_join_keys,
            project_expressions,
            chunk_size,
        );
        hash_join.join(
            literal_table,
            &hash_table,
            &literal_join_keys,
            &mut output_buffers,
        );
    } else {
        let binding_keys: Vec<Column> = binding_join_keys
            .iter()
            .map(|key| key.evaluate(cur_binding_table.columns()).clone())
            .collect();
        let hash_table =
            build_hash_table_on_table(&binding_keys, cur_binding_table.num_tuples());

        let mut project_expressions = Vec::with_capacity(num_output_columns);
        for i in 0..num_binding_columns {
            project_expressions.push(AttributeReference::new(i + literal_table.num_columns()));
        }
        for &position in &unbound_positions {
            project_expressions.push(AttributeReference::new(position));
        }
        let hash_join = MultiColumnHashJoin::new(
            literal_table,
            &literal_join_keys,
            project_expressions,
            chunk_size,
        );
        hash_join.join(
            cur_binding_table,
            &hash_table,
            &binding_join_keys,
            &mut output_buffers,
        );
    }

    freeze(output_buffers)
}

/// Build the label-split binding table for extending `clause` with
/// `new_literal`: one integral column set per clause variable plus the new
/// literal's unbound arguments, positive rows first. The background table
/// probes when both label sides are smaller than it; otherwise the background
/// is the build side and each label side probes it.
pub fn create_label_aware_binding_tables(
    clause: &FoilClause,
    new_literal: &FoilLiteral,
    num_binding_positives: usize,
    num_binding_negatives: usize,
    chunk_size: usize,
) -> Vec<Column> {
    let positive_binding_size = clause.num_positive_bindings();
    let negative_binding_size = clause.num_negative_bindings();
    let background_table = new_literal.predicate().fact_table();
    let background_table_size = background_table.num_tuples();

    let mut background_keys = Vec::new();
    let mut clause_keys = Vec::new();
    let mut unbound_positions = Vec::new();
    for (position, variable) in new_literal.variables().iter().enumerate() {
        if variable.is_bound() {
            background_keys.push(AttributeReference::new(position));
            clause_keys.push(AttributeReference::new(variable.variable_id() as usize));
        } else {
            unbound_positions.push(position);
        }
    }

    let num_background_columns = new_literal.num_variables();
    let num_clause_columns = clause.num_variables();
    let num_output_columns = num_clause_columns + unbound_positions.len();
    let mut positive_buffers: Vec<Vec<Value>> = vec![Vec::new(); num_output_columns];
    let mut negative_buffers: Vec<Vec<Value>> = vec![Vec::new(); num_output_columns];

    let positive_table = Table::new(clause.positive_columns());
    let negative_table = Table::new(clause.negative_columns());

    if positive_binding_size < background_table_size
        && negative_binding_size < background_table_size
    {
        // The background table is the probe side.
        let positive_keys: Vec<Column> = clause_keys
            .iter()
            .map(|key| key.evaluate(positive_table.columns()).clone())
            .collect();
        let negative_keys: Vec<Column> = clause_keys
            .iter()
            .map(|key| key.evaluate(negative_table.columns()).clone())
            .collect();
        let positive_hash_table =
            build_hash_table_on_table(&positive_keys, positive_table.num_tuples());
        let negative_hash_table =
            build_hash_table_on_table(&negative_keys, negative_table.num_tuples());

        let mut project_expressions = Vec::with_capacity(num_output_columns);
        for i in 0..num_clause_columns {
            project_expressions.push(AttributeReference::new(i + num_background_columns));
        }
        for &position in &unbound_positions {
            project_expressions.push(AttributeReference::new(position));
        }
        let hash_join = MultiColumnHashJoin::new(
            background_table,
            &background_keys,
            project_expressions,
            chunk_size,
        );
        hash_join.collaborate_join(
            &positive_table,
            &negative_table,
            &positive_hash_table,
            &negative_hash_table,
            &clause_keys,
            &mut positive_buffers,
            &mut negative_buffers,
        );
    } else {
        let background_key_columns: Vec<Column> = background_keys
            .iter()
            .map(|key| key.evaluate(background_table.columns()).clone())
            .collect();
        let hash_table =
            build_hash_table_on_table(&background_key_columns, background_table_size);

        let mut project_expressions = Vec::with_capacity(num_output_columns);
        for i in 0..num_clause_columns {
            project_expressions.push(AttributeReference::new(i));
        }
        for &position in &unbound_positions {
            project_expressions.push(AttributeReference::new(position + num_clause_columns));
        }

        let positive_join = MultiColumnHashJoin::new(
            &positive_table,
            &clause_keys,
            project_expressions.clone(),
            chunk_size,
        );
        positive_join.join(
            background_table,
            &hash_table,
            &background_keys,
            &mut positive_buffers,
        );

        let negative_join = MultiColumnHashJoin::new(
            &negative_table,
            &clause_keys,
            project_expressions,
            chunk_size,
        );
        negative_join.join(
            background_table,
            &hash_table,
            &background_keys,
            &mut negative_buffers,
        );
    }

    debug_assert!(positive_buffers
        .iter()
        .all(|b| b.len() == num_binding_positives));
    debug_assert!(negative_buffers
        .iter()
        .all(|b| b.len() == num_binding_negatives));

    let mut integral = Vec::with_capacity(num_output_columns);
    for (mut positive, negative) in positive_buffers.into_iter().zip(negative_buffers) {
        positive.extend(negative);
        integral.push(Column::from_values(positive));
    }
    integral
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: Vec<Vec<Value>>) -> Table {
        Table::new(columns.into_iter().map(Column::from_values).collect())
    }

    fn keys(ids: &[usize]) -> Vec<AttributeReference> {
        ids.iter().map(|&i| AttributeReference::new(i)).collect()
    }

    /// Reference nested-loops join for the correctness law: output row count
    /// equals the sum over probe rows of matching build rows, modulo order.
    fn nested_loops(
        probe: &Table,
        build: &Table,
        probe_key_ids: &[usize],
        build_key_ids: &[usize],
    ) -> Vec<(usize, usize)> {
        let mut expected = Vec::new();
        for p in 0..probe.num_tuples() {
            for b in 0..build.num_tuples() {
                let matched = probe_key_ids.iter().zip(build_key_ids).all(|(&pk, &bk)| {
                    probe.column_at(pk).value_at(p) == build.column_at(bk).value_at(b)
                });
                if matched {
                    expected.push((p, b));
                }
            }
        }
        expected
    }

    #[test]
    fn test_join_matches_nested_loops_bag_semantics() {
        let probe = table(vec![vec![1, 2, 2, 3, 4, 2], vec![9, 8, 7, 6, 5, 4]]);
        let build = table(vec![vec![2, 2, 3, 5], vec![100, 200, 300, 400]]);
        let build_key_columns = vec![build.column_at(0).clone()];
        let hash_table = build_hash_table_on_table(&build_key_columns, build.num_tuples());

        // Project the probe's second column and the build's second column.
        let join = MultiColumnHashJoin::new(
            &probe,
            &keys(&[0]),
            vec![AttributeReference::new(1), AttributeReference::new(3)],
            2,
        );
        let mut outputs = vec![Vec::new(), Vec::new()];
        join.join(&build, &hash_table, &keys(&[0]), &mut outputs);

        let expected = nested_loops(&probe, &build, &[0], &[0]);
        assert_eq!(outputs[0].len(), expected.len());
        let mut actual: Vec<(Value, Value)> = outputs[0]
            .iter()
            .zip(outputs[1].iter())
            .map(|(&a, &b)| (a, b))
            .collect();
        let mut expected_values: Vec<(Value, Value)> = expected
            .iter()
            .map(|&(p, b)| (probe.column_at(1).value_at(p), build.column_at(1).value_at(b)))
            .collect();
        actual.sort_unstable();
        expected_values.sort_unstable();
        assert_eq!(actual, expected_values);
    }

    #[test]
    fn test_multi_key_join() {
        let probe = table(vec![vec![1, 1, 2], vec![5, 6, 5]]);
        let build = table(vec![vec![1, 2, 1], vec![5, 5, 6]]);
        let build_key_columns = vec![build.column_at(0).clone(), build.column_at(1).clone()];
        let hash_table = build_hash_table_on_table(&build_key_columns, build.num_tuples());

        let join = MultiColumnHashJoin::new(
            &probe,
            &keys(&[0, 1]),
            vec![AttributeReference::new(0), AttributeReference::new(1)],
            1024,
        );
        let mut outputs = vec![Vec::new(), Vec::new()];
        join.join(&build, &hash_table, &keys(&[0, 1]), &mut outputs);
        let expected = nested_loops(&probe, &build, &[0, 1], &[0, 1]);
        assert_eq!(outputs[0].len(), expected.len());
    }

    #[test]
    fn test_collaborate_join_splits_labels() {
        let probe = table(vec![vec![1, 2, 3, 4]]);
        let positive = table(vec![vec![1, 3]]);
        let negative = table(vec![vec![2, 2]]);
        let positive_keys = vec![positive.column_at(0).clone()];
        let negative_keys = vec![negative.column_at(0).clone()];
        let positive_hash_table =
            build_hash_table_on_table(&positive_keys, positive.num_tuples());
        let negative_hash_table =
            build_hash_table_on_table(&negative_keys, negative.num_tuples());

        let join = MultiColumnHashJoin::new(
            &probe,
            &keys(&[0]),
            vec![AttributeReference::new(0)],
            2,
        );
        let mut positive_out = vec![Vec::new()];
        let mut negative_out = vec![Vec::new()];
        join.collaborate_join(
            &positive,
            &negative,
            &positive_hash_table,
            &negative_hash_table,
            &keys(&[0]),
            &mut positive_out,
            &mut negative_out,
        );
        assert_eq!(positive_out[0], vec![1, 3]);
        assert_eq!(negative_out[0], vec![2, 2]);
    }
}
