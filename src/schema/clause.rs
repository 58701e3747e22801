/// A Horn clause under construction or learned: a fully-bound head, body
/// literals whose new variables extend the clause variable list, and the
/// current binding table in one of two representations.
use std::fmt;
use std::sync::Arc;

use crate::schema::literal::FoilLiteral;
use crate::schema::variable::FoilVariable;
use crate::storage::columnar::Column;

/// The clause's binding columns. `Integral` keeps one column per variable in
/// positive-then-negative row order; `Split` keeps separately owned label
/// sides. Exactly one representation is active per clause instance.
#[derive(Clone, Debug)]
pub enum BindingStorage {
    Integral {
        columns: Vec<Column>,
        num_positive: usize,
        num_negative: usize,
    },
    Split {
        positive: Vec<Column>,
        negative: Vec<Column>,
    },
    /// Learned clauses carry no binding data.
    Detached,
}

#[derive(Clone)]
pub struct FoilClause {
    head_literal: FoilLiteral,
    body_literals: Vec<FoilLiteral>,
    variables: Vec<FoilVariable>,
    bindings: BindingStorage,
    num_variables_without_last_body_literal: usize,
    random_flags: Vec<bool>,
}

pub type FoilClauseRef = Arc<FoilClause>;

impl FoilClause {
    pub fn new(head_literal: FoilLiteral) -> Self {
        let mut variables = Vec::new();
        for variable in head_literal.variables() {
            debug_assert!(variable.is_bound());
            debug_assert!(variable.variable_id() as usize <= variables.len());
            if variable.variable_id() as usize == variables.len() {
                variables.push(*variable);
            }
        }
        let num_variables = variables.len();
        Self {
            head_literal,
            body_literals: Vec::new(),
            variables,
            bindings: BindingStorage::Detached,
            num_variables_without_last_body_literal: num_variables,
            random_flags: Vec::new(),
        }
    }

    pub fn with_integral_bindings(
        head_literal: FoilLiteral,
        num_positive: usize,
        num_negative: usize,
        columns: Vec<Column>,
    ) -> FoilClauseRef {
        let mut clause = Self::new(head_literal);
        clause.bindings = BindingStorage::Integral {
            columns,
            num_positive,
            num_negative,
        };
        Arc::new(clause)
    }

    pub fn with_split_bindings(
        head_literal: FoilLiteral,
        positive: Vec<Column>,
        negative: Vec<Column>,
    ) -> FoilClauseRef {
        let mut clause = Self::new(head_literal);
        clause.bindings = BindingStorage::Split { positive, negative };
        Arc::new(clause)
    }

    pub fn head_literal(&self) -> &FoilLiteral {
        &self.head_literal
    }

    pub fn body_literals(&self) -> &[FoilLiteral] {
        &self.body_literals
    }

    pub fn num_body_literals(&self) -> usize {
        self.body_literals.len()
    }

    pub fn variables(&self) -> &[FoilVariable] {
        &self.variables
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_variables_without_last_body_literal(&self) -> usize {
        self.num_variables_without_last_body_literal
    }

    pub fn bindings(&self) -> &BindingStorage {
        &self.bindings
    }

    pub fn is_binding_data_integral(&self) -> bool {
        matches!(self.bindings, BindingStorage::Integral { .. })
    }

    pub fn num_positive_bindings(&self) -> usize {
        match &self.bindings {
            BindingStorage::Integral { num_positive, .. } => *num_positive,
            BindingStorage::Split { positive, .. } => {
                positive.first().map(|c| c.len()).unwrap_or(0)
            }
            BindingStorage::Detached => 0,
        }
    }

    pub fn num_negative_bindings(&self) -> usize {
        match &self.bindings {
            BindingStorage::Integral { num_negative, .. } => *num_negative,
            BindingStorage::Split { negative, .. } => {
                negative.first().map(|c| c.len()).unwrap_or(0)
            }
            BindingStorage::Detached => 0,
        }
    }

    pub fn num_total_bindings(&self) -> usize {
        self.num_positive_bindings() + self.num_negative_bindings()
    }

    /// The positive binding columns, as views for the integral representation
    /// or shared buffers for the split one.
    pub fn positive_columns(&self) -> Vec<Column> {
        match &self.bindings {
            BindingStorage::Integral {
                columns,
                num_positive,
                ..
            } => columns.iter().map(|c| c.slice(0, *num_positive)).collect(),
            BindingStorage::Split { positive, .. } => positive.clone(),
            BindingStorage::Detached => Vec::new(),
        }
    }

    pub fn negative_columns(&self) -> Vec<Column> {
        match &self.bindings {
            BindingStorage::Integral {
                columns,
                num_positive,
                num_negative,
            } => columns
                .iter()
                .map(|c| c.slice(*num_positive, *num_negative))
                .collect(),
            BindingStorage::Split { negative, .. } => negative.clone(),
            BindingStorage::Detached => Vec::new(),
        }
    }

    pub fn integral_columns(&self) -> Option<&[Column]> {
        match &self.bindings {
            BindingStorage::Integral { columns, .. } => Some(columns),
            _ => None,
        }
    }

    pub fn random_flags(&self) -> &[bool] {
        debug_assert_eq!(self.random_flags.len(), self.body_literals.len());
        &self.random_flags
    }

    pub fn num_random_literals(&self) -> usize {
        self.random_flags.iter().filter(|&&flag| flag).count()
    }

    /// The last body literal with its newly-introduced variables made unbound
    /// again; this is the form recorded on a random black list.
    pub fn create_unbound_last_literal(&self) -> FoilLiteral {
        debug_assert!(!self.body_literals.is_empty());
        self.body_literals[self.body_literals.len() - 1]
            .create_unbound_literal(self.num_variables_without_last_body_literal as i32)
    }

    /// Append a body literal whose unbound variables receive fresh ids.
    pub fn add_unbound_body_literal(&mut self, body_literal: &FoilLiteral, is_random: bool) {
        self.num_variables_without_last_body_literal = self.variables.len();

        let mut literal_variables = Vec::with_capacity(body_literal.num_variables());
        for variable in body_literal.variables() {
            if !variable.is_bound() {
                let bound =
                    FoilVariable::new(self.variables.len() as i32, variable.variable_type_id());
                self.variables.push(bound);
                literal_variables.push(bound);
            } else {
                debug_assert!((variable.variable_id() as usize) < self.variables.len());
                literal_variables.push(*variable);
            }
        }
        self.body_literals.push(FoilLiteral::with_variables(
            Arc::clone(body_literal.predicate_ref()),
            literal_variables,
        ));
        self.random_flags.push(is_random);
    }

    /// Append an already-bound body literal, extending the variable list as
    /// needed. Used by the clause parser.
    pub fn add_bound_body_literal(&mut self, body_literal: FoilLiteral, is_random: bool) {
        self.num_variables_without_last_body_literal = self.variables.len();

        for variable in body_literal.variables() {
            let id = variable.variable_id() as usize;
            if id >= self.variables.len() {
                while self.variables.len() < id {
                    self.variables.push(FoilVariable::default());
                }
                self.variables.push(*variable);
            } else if !self.variables[id].is_bound() {
                self.variables[id] = *variable;
            }
        }
        self.body_literals.push(body_literal);
        self.random_flags.push(is_random);
    }

    /// Extend with a new body literal and the binding table that joining it
    /// produced; shares ownership of the parent's bound-variable columns.
    pub fn copy_with_additional_unbound_body_literal(
        &self,
        new_body_literal: &FoilLiteral,
        is_random: bool,
        num_positive: usize,
        num_negative: usize,
        columns: Vec<Column>,
    ) -> FoilClauseRef {
        let mut copy = self.copy_without_data();
        copy.add_unbound_body_literal(new_body_literal, is_random);
        copy.bindings = BindingStorage::Integral {
            columns,
            num_positive,
            num_negative,
        };
        Arc::new(copy)
    }

    /// A structural copy without binding data.
    pub fn copy_without_data(&self) -> FoilClause {
        FoilClause {
            head_literal: self.head_literal.clone(),
            body_literals: self.body_literals.clone(),
            variables: self.variables.clone(),
            bindings: BindingStorage::Detached,
            num_variables_without_last_body_literal: self.num_variables_without_last_body_literal,
            random_flags: self.random_flags.clone(),
        }
    }
}

impl fmt::Display for FoilClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :- ", self.head_literal)?;
        for (i, literal) in self.body_literals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{literal}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FoilClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::predicate::{FoilPredicate, FoilPredicateRef};
    use crate::storage::columnar::Table;

    fn predicate(id: i32, types: Vec<i32>) -> FoilPredicateRef {
        let columns = types
            .iter()
            .map(|_| Column::from_values(Vec::new()))
            .collect();
        Arc::new(FoilPredicate::new(
            id,
            format!("p_{id}"),
            None,
            types,
            Table::new(columns),
        ))
    }

    fn head(pred: &FoilPredicateRef) -> FoilLiteral {
        let mut literal = FoilLiteral::new(Arc::clone(pred));
        for i in 0..pred.num_arguments() {
            literal.add_variable(FoilVariable::new(i as i32, pred.argument_type_at(i)));
        }
        literal
    }

    #[test]
    fn test_add_unbound_body_literal_assigns_fresh_ids() {
        let p = predicate(0, vec![0, 0]);
        let q = predicate(1, vec![0, 0]);
        let mut clause = FoilClause::new(head(&p));
        assert_eq!(clause.num_variables(), 2);

        let body = FoilLiteral::with_variables(
            q,
            vec![FoilVariable::new(0, 0), FoilVariable::unbound(0)],
        );
        clause.add_unbound_body_literal(&body, false);
        assert_eq!(clause.num_variables(), 3);
        assert_eq!(clause.num_variables_without_last_body_literal(), 2);
        assert_eq!(clause.body_literals()[0].variable_at(1).variable_id(), 2);
        assert_eq!(clause.to_string(), "p_0(0, 1) :- p_1(0, 2)");
        assert_eq!(clause.create_unbound_last_literal().to_string(), "p_1(0, -1)");
    }

    #[test]
    fn test_binding_representations() {
        let p = predicate(0, vec![0, 0]);
        let columns = vec![
            Column::from_values(vec![1, 2, 3, 4, 5]),
            Column::from_values(vec![6, 7, 8, 9, 10]),
        ];
        let clause = FoilClause::with_integral_bindings(head(&p), 3, 2, columns);
        assert!(clause.is_binding_data_integral());
        assert_eq!(clause.num_positive_bindings(), 3);
        assert_eq!(clause.num_negative_bindings(), 2);
        assert_eq!(clause.positive_columns()[0].as_slice(), &[1, 2, 3]);
        assert_eq!(clause.negative_columns()[1].as_slice(), &[9, 10]);

        let split = FoilClause::with_split_bindings(
            head(&p),
            vec![Column::from_values(vec![1]), Column::from_values(vec![2])],
            vec![Column::from_values(vec![3]), Column::from_values(vec![4])],
        );
        assert!(!split.is_binding_data_integral());
        assert_eq!(split.num_positive_bindings(), 1);
        assert_eq!(split.num_negative_bindings(), 1);
    }

    #[test]
    fn test_random_literal_counters() {
        let p = predicate(0, vec![0]);
        let q = predicate(1, vec![0, 0]);
        let mut clause = FoilClause::new(head(&p));
        let body = FoilLiteral::with_variables(
            q,
            vec![FoilVariable::new(0, 0), FoilVariable::unbound(0)],
        );
        clause.add_unbound_body_literal(&body, true);
        assert_eq!(clause.num_random_literals(), 1);
        assert_eq!(clause.random_flags(), &[true]);
    }
}
