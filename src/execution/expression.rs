/// Scalar expressions over columnar data: attribute references addressed
/// against a concatenated (probe, build) column space, and the comparison
/// functors used by filter predicates.
use crate::storage::bitset::{BitVector, BITS_PER_BLOCK};
use crate::storage::columnar::{Column, TupleId, Value};

/// Comparison functor interface. All six operators are exposed for
/// uniformity; the engine currently drives only equality.
pub trait ComparisonOperator {
    fn compare(lhs: Value, rhs: Value) -> bool;
}

macro_rules! comparison_operator {
    ($name:ident, $op:tt) => {
        pub struct $name;

        impl ComparisonOperator for $name {
            #[inline]
            fn compare(lhs: Value, rhs: Value) -> bool {
                lhs $op rhs
            }
        }
    };
}

comparison_operator!(Equal, ==);
comparison_operator!(NotEqual, !=);
comparison_operator!(Less, <);
comparison_operator!(LessOrEqual, <=);
comparison_operator!(Greater, >);
comparison_operator!(GreaterOrEqual, >=);

/// A reference to a column by index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeReference {
    column_id: usize,
}

impl AttributeReference {
    pub fn new(column_id: usize) -> Self {
        Self { column_id }
    }

    pub fn column_id(&self) -> usize {
        self.column_id
    }

    pub fn evaluate<'a>(&self, columns: &'a [Column]) -> &'a Column {
        &columns[self.column_id]
    }

    /// Append the values of rows whose filter bit is set.
    pub fn evaluate_with_filter(
        &self,
        input_columns: &[Column],
        filter: &BitVector,
        output: &mut Vec<Value>,
    ) {
        let values = input_columns[self.column_id].as_slice();
        output.extend(filter.ones().map(|tid| values[tid]));
    }

    /// Gather for join output: column ids below the probe width address the
    /// probe side; the rest address the build side.
    pub fn evaluate_for_join(
        &self,
        probe_columns: &[Column],
        build_columns: &[Column],
        probe_tids: &[TupleId],
        build_tids: &[TupleId],
        output: &mut Vec<Value>,
    ) {
        if self.column_id < probe_columns.len() {
            let values = probe_columns[self.column_id].as_slice();
            output.extend(probe_tids.iter().map(|&tid| values[tid as usize]));
        } else {
            let values = build_columns[self.column_id - probe_columns.len()].as_slice();
            output.extend(build_tids.iter().map(|&tid| values[tid as usize]));
        }
    }
}

/// One equality atom between a probe-side column and a build-side column,
/// evaluated over a hash-join match stream into a packed bitvector.
#[derive(Clone, Copy, Debug)]
pub struct FilterPredicate {
    probe_attribute: AttributeReference,
    build_attribute: AttributeReference,
}

impl FilterPredicate {
    pub fn new(probe_column_id: usize, build_column_id: usize) -> Self {
        Self {
            probe_attribute: AttributeReference::new(probe_column_id),
            build_attribute: AttributeReference::new(build_column_id),
        }
    }

    pub fn probe_attribute(&self) -> AttributeReference {
        self.probe_attribute
    }

    pub fn build_attribute(&self) -> AttributeReference {
        self.build_attribute
    }

    /// Bit `t` is set iff the joined tuple `t` satisfies
    /// `probe[probe_tids[t]] == build[build_tids[t]]`. The loop is written
    /// bit-packed over 64-bit blocks.
    pub fn evaluate_for_join(
        &self,
        probe_columns: &[Column],
        build_columns: &[Column],
        probe_tids: &[TupleId],
        build_tids: &[TupleId],
        result: &mut BitVector,
    ) {
        self.evaluate_for_join_with::<Equal>(
            probe_columns,
            build_columns,
            probe_tids,
            build_tids,
            result,
        )
    }

    pub fn evaluate_for_join_with<Op: ComparisonOperator>(
        &self,
        probe_columns: &[Column],
        build_columns: &[Column],
        probe_tids: &[TupleId],
        build_tids: &[TupleId],
        result: &mut BitVector,
    ) {
        debug_assert_eq!(probe_tids.len(), build_tids.len());
        let num_tuples = probe_tids.len();
        result.resize_and_clear(num_tuples);

        let probe_values = probe_columns[self.probe_attribute.column_id()].as_slice();
        let build_values = build_columns[self.build_attribute.column_id()].as_slice();

        let full_blocks = result.full_blocks();
        let extra_bits = result.extra_bits();
        let blocks = result.blocks_mut();
        let mut tuple = 0;
        for block in blocks.iter_mut().take(full_blocks) {
            let mut word = 0u64;
            for bit in 0..BITS_PER_BLOCK {
                let hit = Op::compare(
                    probe_values[probe_tids[tuple] as usize],
                    build_values[build_tids[tuple] as usize],
                );
                word |= (hit as u64) << bit;
                tuple += 1;
            }
            *block = word;
        }
        if extra_bits > 0 {
            let mut word = 0u64;
            for bit in 0..extra_bits {
                let hit = Op::compare(
                    probe_values[probe_tids[tuple] as usize],
                    build_values[build_tids[tuple] as usize],
                );
                word |= (hit as u64) << bit;
                tuple += 1;
            }
            blocks[full_blocks] = word;
        }
    }
}
