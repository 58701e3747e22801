/// A literal: a predicate applied to a vector of variables.
///
/// The join key is the bound argument position whose variable type has the
/// largest type id (ties keep the earlier position); it selects the column
/// the background table is partitioned on for this literal.
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::schema::predicate::{FoilPredicate, FoilPredicateRef};
use crate::schema::variable::FoilVariable;

#[derive(Clone)]
pub struct FoilLiteral {
    predicate: FoilPredicateRef,
    variables: Vec<FoilVariable>,
    join_key: Option<usize>,
}

impl FoilLiteral {
    pub fn new(predicate: FoilPredicateRef) -> Self {
        let capacity = predicate.num_arguments();
        Self {
            predicate,
            variables: Vec::with_capacity(capacity),
            join_key: None,
        }
    }

    pub fn with_variables(predicate: FoilPredicateRef, variables: Vec<FoilVariable>) -> Self {
        debug_assert_eq!(predicate.num_arguments(), variables.len());
        let mut literal = Self {
            predicate,
            variables,
            join_key: None,
        };
        for position in 0..literal.variables.len() {
            literal.update_join_key(position);
        }
        literal
    }

    pub fn predicate(&self) -> &FoilPredicate {
        &self.predicate
    }

    pub fn predicate_ref(&self) -> &FoilPredicateRef {
        &self.predicate
    }

    pub fn variables(&self) -> &[FoilVariable] {
        &self.variables
    }

    pub fn variable_at(&self, index: usize) -> FoilVariable {
        self.variables[index]
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn add_variable(&mut self, variable: FoilVariable) {
        debug_assert!(self.variables.len() < self.predicate.num_arguments());
        debug_assert_eq!(
            self.predicate.argument_type_at(self.variables.len()),
            variable.variable_type_id()
        );
        self.variables.push(variable);
        self.update_join_key(self.variables.len() - 1);
    }

    pub fn num_unbound_variables(&self) -> usize {
        self.variables.iter().filter(|v| !v.is_bound()).count()
    }

    pub fn is_bound(&self) -> bool {
        self.variables.iter().all(|v| v.is_bound())
    }

    pub fn all_variables_unbound(&self) -> bool {
        self.variables.iter().all(|v| !v.is_bound())
    }

    pub fn join_key(&self) -> Option<usize> {
        self.join_key
    }

    /// A literal is well formed when it is fully populated and every
    /// variable's type agrees with its argument position.
    pub fn validate(&self) -> crate::error::FoilResult<()> {
        if self.variables.len() != self.predicate.num_arguments() {
            return Err(crate::error::FoilError::logic(format!(
                "literal {self} has {} variables for {} arguments",
                self.variables.len(),
                self.predicate.num_arguments()
            )));
        }
        for (position, variable) in self.variables.iter().enumerate() {
            if variable.variable_type_id() != self.predicate.argument_type_at(position) {
                return Err(crate::error::FoilError::logic(format!(
                    "literal {self}: variable at position {position} has type {} but the argument type is {}",
                    variable.variable_type_id(),
                    self.predicate.argument_type_at(position)
                )));
            }
        }
        Ok(())
    }

    /// A copy with every variable at or past `start_unbound_var_id` replaced
    /// by an unbound marker of the same type.
    pub fn create_unbound_literal(&self, start_unbound_var_id: i32) -> FoilLiteral {
        let mut literal = FoilLiteral::new(Arc::clone(&self.predicate));
        for variable in &self.variables {
            if variable.variable_id() < start_unbound_var_id && variable.is_bound() {
                literal.add_variable(*variable);
            } else {
                literal.add_variable(FoilVariable::unbound(variable.variable_type_id()));
            }
        }
        literal
    }

    fn update_join_key(&mut self, position: usize) {
        if !self.variables[position].is_bound() {
            return;
        }
        match self.join_key {
            None => self.join_key = Some(position),
            Some(current) => {
                if self.variables[current].variable_type_id()
                    < self.variables[position].variable_type_id()
                {
                    self.join_key = Some(position);
                }
            }
        }
    }
}

impl PartialEq for FoilLiteral {
    fn eq(&self, other: &Self) -> bool {
        if self.predicate.id() != other.predicate.id()
            || self.variables.len() != other.variables.len()
        {
            return false;
        }
        self.variables
            .iter()
            .zip(other.variables.iter())
            .all(|(l, r)| l == r)
    }
}

impl Eq for FoilLiteral {}

impl Hash for FoilLiteral {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.predicate.id().hash(state);
        for variable in &self.variables {
            variable.variable_id().hash(state);
        }
    }
}

impl fmt::Display for FoilLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate.name())?;
        for (i, variable) in self.variables.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{variable}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for FoilLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

pub type FoilLiteralSet = HashSet<FoilLiteral>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::columnar::{Column, Table};

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

    #[test]
    fn test_join_key_prefers_largest_type_then_earliest_position() {
        let pred = predicate(0, vec![0, 1, 1]);
        let literal = FoilLiteral::with_variables(
            Arc::clone(&pred),
            vec![
                FoilVariable::new(0, 0),
                FoilVariable::new(1, 1),
                FoilVariable::new(2, 1),
            ],
        );
        assert_eq!(literal.join_key(), Some(1));

        let unbound_middle = FoilLiteral::with_variables(
            pred,
            vec![
                FoilVariable::new(0, 0),
                FoilVariable::unbound(1),
                FoilVariable::new(2, 1),
            ],
        );
        assert_eq!(unbound_middle.join_key(), Some(2));
    }

    #[test]
    fn test_equality_and_display() {
        let pred = predicate(5, vec![0, 0]);
        let a = FoilLiteral::with_variables(
            Arc::clone(&pred),
            vec![FoilVariable::new(0, 0), FoilVariable::unbound(0)],
        );
        let b = FoilLiteral::with_variables(
            Arc::clone(&pred),
            vec![FoilVariable::new(0, 0), FoilVariable::unbound(0)],
        );
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "p_5(0, -1)");
        assert_eq!(a.num_unbound_variables(), 1);
    }

    #[test]
    fn test_create_unbound_literal() {
        let pred = predicate(1, vec![0, 0]);
        let literal = FoilLiteral::with_variables(
            pred,
            vec![FoilVariable::new(0, 0), FoilVariable::new(4, 0)],
        );
        let unbound = literal.create_unbound_literal(2);
        assert_eq!(unbound.to_string(), "p_1(0, -1)");
    }
}
