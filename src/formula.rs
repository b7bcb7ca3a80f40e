/*!
A module to represent conjunctive normal form formula.
*/

use std::{convert::TryInto, fmt::Display, num::NonZeroU32, str::FromStr};

use crate::prelude::*;

#[derive(Debug, Snafu)]
pub enum VariableParseError {
    #[snafu(display("Failed to parse Variable ID"))]
    ParseIntError { source: std::num::ParseIntError },
    #[snafu(display(
        "Variable ID {} is out of range (must be within 1 to {})",
        num,
        Variable::MAX_VARIABLE_ID
    ))]
    RangeError { num: usize },
}

/// Newtype wrapper for variable ID.
/// Invariant: 0 < ID <= MAX_VARIABLE_ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable(NonZeroU32);

impl Variable {
    pub const MAX_VARIABLE_ID: usize = std::u32::MAX as usize;

    pub fn as_index(&self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// Creates a variable from a raw index.
    /// Returns `None` if the index is invalid.
    pub fn from_index(index: usize) -> Option<Self> {
        let id = index.checked_add(1)?;
        if id > Variable::MAX_VARIABLE_ID {
            return None;
        }
        Some(Variable(NonZeroU32::new(id.try_into().ok()?)?))
    }
}

/// Parses a DIMACS variable ID, which starts from 1.
impl FromStr for Variable {
    type Err = VariableParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let num = s.parse::<usize>().context(ParseIntError)?;
        ensure!(num > 0, RangeError { num });
        Variable::from_index(num - 1).context(RangeError { num })
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    id: Variable,
    positive: bool,
}

impl Literal {
    pub fn new(id: Variable, positive: bool) -> Self {
        Literal { id, positive }
    }

    pub fn variable(&self) -> Variable {
        self.id
    }

    pub fn positive(&self) -> bool {
        self.positive
    }

    /// Value of the literal under a complete assignment.
    pub fn evaluate(&self, assignment: &[bool]) -> bool {
        assignment[self.id.as_index()] == self.positive
    }
}

impl FromStr for Literal {
    type Err = VariableParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (positive, id) = match s.strip_prefix('-') {
            Some(rest) => (false, rest.parse()?),
            None => (true, s.parse()?),
        };

        Ok(Literal { id, positive })
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", if self.positive { "" } else { "¬" }, self.id)
    }
}

impl std::ops::Not for Literal {
    type Output = Literal;

    fn not(self) -> Self::Output {
        Literal {
            id: self.id,
            positive: !self.positive,
        }
    }
}

/// Disjunction of literals
#[derive(Debug, Clone)]
pub struct Clause {
    literals: Vec<Literal>,
}

impl Clause {
    pub fn new(literals: Vec<Literal>) -> Self {
        Self { literals }
    }

    pub fn num_literals(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Literal> + '_ {
        self.literals.iter().copied()
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;

        let mut iter = self.literals.iter();
        if let Some(first) = iter.next() {
            write!(f, "{}", first)?;
        }
        for variable in iter {
            write!(f, " ∨ {}", variable)?;
        }

        write!(f, ")")?;

        Ok(())
    }
}

/// Formula representation in Conjunctive Normal Form
#[derive(Debug, Clone)]
pub struct Cnf {
    num_variables: usize,
    clauses: Vec<Clause>,
    /// Empty clauses are counted, not stored. Any of them makes the formula unsatisfiable.
    empty_clauses: usize,
}

#[derive(Debug, Snafu)]
pub enum ClauseError {
    #[snafu(display(
        "Literal {} refers to a variable outside of the declared {} variables",
        literal,
        num_variables
    ))]
    VariableOutOfRange {
        literal: Literal,
        num_variables: usize,
    },
}

impl Cnf {
    pub fn new(num_variables: usize) -> Self {
        assert!(num_variables <= Variable::MAX_VARIABLE_ID);

        Cnf {
            num_variables,
            clauses: Vec::new(),
            empty_clauses: 0,
        }
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn empty_clause_count(&self) -> usize {
        self.empty_clauses
    }

    /// Number of clauses including the empty ones.
    pub fn num_clauses(&self) -> usize {
        self.clauses.len() + self.empty_clauses
    }

    pub fn add_clause(&mut self, clause: Clause) -> Result<(), ClauseError> {
        if let Some(literal) = clause
            .iter()
            .find(|literal| literal.variable().as_index() >= self.num_variables)
        {
            return VariableOutOfRange {
                literal,
                num_variables: self.num_variables,
            }
            .fail();
        }

        if clause.is_empty() {
            self.empty_clauses += 1;
        } else {
            self.clauses.push(clause);
        }

        Ok(())
    }

    /// Checks whether a complete assignment satisfies every clause.
    pub fn is_satisfied_by(&self, assignment: &[bool]) -> bool {
        assignment.len() == self.num_variables
            && self.empty_clauses == 0
            && self
                .clauses
                .iter()
                .all(|clause| clause.iter().any(|literal| literal.evaluate(assignment)))
    }
}

impl Display for Cnf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CNF with {} variables (", self.num_variables)?;

        let mut iter = self.clauses.iter();
        if let Some(first) = iter.next() {
            write!(f, "{}", first)?;
        }
        for variable in iter {
            write!(f, " ∧ {}", variable)?;
        }
        for _ in 0..self.empty_clauses {
            write!(f, " ∧ ()")?;
        }

        write!(f, ")")?;

        Ok(())
    }
}

/// Represents a satisfying assignment for a formula.
#[derive(Debug)]
pub struct Model {
    formula: Cnf,
    assignment: Vec<bool>,
}

impl Model {
    /// Creates a new model from a formula and an assignment.
    ///
    /// # Panics
    ///
    /// Panics when `assignment` does not satisfy `formula`.
    pub fn new(formula: Cnf, assignment: Vec<bool>) -> Self {
        assert!(
            formula.is_satisfied_by(&assignment),
            "assignment does not satisfy the formula"
        );

        Model {
            formula,
            assignment,
        }
    }

    pub fn formula(&self) -> &Cnf {
        &self.formula
    }

    pub fn assignment(&self) -> &[bool] {
        &self.assignment
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Assignment:")?;
        for (idx, &val) in self.assignment.iter().enumerate() {
            if let Some(variable) = Variable::from_index(idx) {
                write!(f, "\n  {}: {}", variable, val)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Literal {
        s.parse().unwrap()
    }

    #[test]
    fn parse_dimacs_literals() {
        let positive = lit("3");
        assert!(positive.positive());
        assert_eq!(positive.variable().as_index(), 2);

        let negative = lit("-3");
        assert!(!negative.positive());
        assert_eq!(negative, !positive);

        assert!("0".parse::<Literal>().is_err());
        assert!("x".parse::<Literal>().is_err());
        assert!("--1".parse::<Literal>().is_err());
    }

    #[test]
    fn empty_clauses_are_counted() {
        let mut cnf = Cnf::new(2);
        cnf.add_clause(Clause::new(vec![lit("1"), lit("-2")])).unwrap();
        cnf.add_clause(Clause::new(vec![])).unwrap();

        assert_eq!(cnf.clauses().len(), 1);
        assert_eq!(cnf.empty_clause_count(), 1);
        assert_eq!(cnf.num_clauses(), 2);
        assert!(!cnf.is_satisfied_by(&[true, true]));
    }

    #[test]
    fn out_of_range_literal_is_rejected() {
        let mut cnf = Cnf::new(2);
        assert!(cnf.add_clause(Clause::new(vec![lit("3")])).is_err());
        assert_eq!(cnf.num_clauses(), 0);
    }

    #[test]
    fn evaluate_assignment() {
        let mut cnf = Cnf::new(2);
        cnf.add_clause(Clause::new(vec![lit("1"), lit("2")])).unwrap();
        cnf.add_clause(Clause::new(vec![lit("-1")])).unwrap();

        assert!(cnf.is_satisfied_by(&[false, true]));
        assert!(!cnf.is_satisfied_by(&[true, true]));
        assert!(!cnf.is_satisfied_by(&[false, false]));
        assert!(!cnf.is_satisfied_by(&[false]));
    }
}
