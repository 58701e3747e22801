/// Text form of literals and clauses, `p_1(0, -1)` and
/// `p_0(0) :- p_1(0, 1), p_2(1, 0, 2)`, resolved against a predicate catalog.
/// Used by tests and diagnostics.
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{FoilError, FoilResult};
use crate::schema::clause::FoilClause;
use crate::schema::literal::FoilLiteral;
use crate::schema::predicate::FoilPredicateRef;
use crate::schema::variable::FoilVariable;

pub type PredicateCatalog = HashMap<String, FoilPredicateRef>;

pub struct FoilParser;

impl FoilParser {
    pub fn parse_literal(catalog: &PredicateCatalog, text: &str) -> FoilResult<FoilLiteral> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let open = compact
            .find('(')
            .ok_or_else(|| FoilError::data_invalid(format!("missing '(' in literal: {text}")))?;
        let close = compact
            .rfind(')')
            .ok_or_else(|| FoilError::data_invalid(format!("missing ')' in literal: {text}")))?;
        let name = &compact[..open];
        let predicate = catalog
            .get(name)
            .ok_or_else(|| FoilError::data_invalid(format!("unknown predicate: {name}")))?;

        let mut literal = FoilLiteral::new(Arc::clone(predicate));
        for (position, field) in compact[open + 1..close].split(',').enumerate() {
            if position >= predicate.num_arguments() {
                return Err(FoilError::data_invalid(format!(
                    "too many arguments for {name}: {text}"
                )));
            }
            let variable_id: i32 = field.parse().map_err(|_| {
                FoilError::data_invalid(format!("bad variable id '{field}' in literal: {text}"))
            })?;
            literal.add_variable(FoilVariable::new(
                variable_id,
                predicate.argument_type_at(position),
            ));
        }
        literal.validate()?;
        Ok(literal)
    }

    pub fn parse_clause(catalog: &PredicateCatalog, text: &str) -> FoilResult<FoilClause> {
        let (head_text, body_text) = text
            .split_once(":-")
            .ok_or_else(|| FoilError::data_invalid(format!("missing ':-' in clause: {text}")))?;
        let head = Self::parse_literal(catalog, head_text)?;
        let mut clause = FoilClause::new(head);

        let body_text = body_text.trim();
        if body_text.is_empty() {
            return Ok(clause);
        }
        let mut rest = body_text;
        while let Some(end) = rest.find(')') {
            let literal_text = &rest[..=end];
            clause.add_bound_body_literal(Self::parse_literal(catalog, literal_text)?, false);
            rest = match rest[end + 1..].find(',') {
                Some(comma) => &rest[end + 1 + comma + 1..],
                None => "",
            };
            if rest.trim().is_empty() {
                break;
            }
        }
        Ok(clause)
    }
}
