use crate::formula::{Cnf, Literal, Model, Variable};

use self::inner::Watch;

use super::Solver;

/// Internal modules whose implementation details are hidden from the solver.
mod inner {
    use std::ops::{Index, IndexMut};

    use crate::formula::{Clause, Literal};

    #[derive(Debug)]
    pub struct Watch {
        positive: Vec<Vec<usize>>,
        negative: Vec<Vec<usize>>,
    }

    impl Watch {
        pub fn new(num_variables: usize, clauses: &[Clause]) -> Self {
            let mut watch = Self {
                positive: vec![Vec::new(); num_variables],
                negative: vec![Vec::new(); num_variables],
            };

            for (idx, clause) in clauses.iter().enumerate() {
                for literal in clause.iter() {
                    watch[literal].push(idx);
                }
            }

            watch
        }
    }

    impl Index<Literal> for Watch {
        type Output = Vec<usize>;

        fn index(&self, literal: Literal) -> &Self::Output {
            if literal.positive() {
                &self.positive[literal.variable().as_index()]
            } else {
                &self.negative[literal.variable().as_index()]
            }
        }
    }

    impl IndexMut<Literal> for Watch {
        fn index_mut(&mut self, literal: Literal) -> &mut Self::Output {
            if literal.positive() {
                &mut self.positive[literal.variable().as_index()]
            } else {
                &mut self.negative[literal.variable().as_index()]
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
struct ClauseStat {
    /// Satisfied literal count in the clause.
    satisfied: usize,
    /// Unsatisfied literal count in the clause.
    unsatisfied: usize,
}

/// A branching point on the trail.
#[derive(Clone, Copy, Debug)]
struct Decision {
    /// Trail length before the decision literal was assigned.
    trail_len: usize,
    literal: Literal,
    /// Whether the opposite polarity has already been tried.
    flipped: bool,
}

#[derive(Debug)]
pub struct DpllSolver {
    formula: Cnf,
    watch: Watch,
    /// Variable index -> assigned status
    assignment: Vec<Option<bool>>,
    /// Clause index -> clause stat
    clause_stats: Vec<ClauseStat>,
    /// Cache for `clauses.count(satisfied_literals > 0)`
    satisfied_clauses: usize,
    /// Cache for `clauses.count(unsatisfied_literals == clause.num_literals)`
    unsatisfied_clauses: usize,
    trail: Vec<Literal>,
    decisions: Vec<Decision>,
    /// Literals forced by clauses that became unit since the last propagation.
    pending: Vec<Literal>,
    /// Every variable below this index is assigned.
    next_variable: usize,
    stats: SearchStats,
}

/// Counters logged after a search.
#[derive(Clone, Copy, Debug, Default)]
struct SearchStats {
    decisions: u64,
    propagations: u64,
    backtracks: u64,
}

impl DpllSolver {
    fn assigned_value(&self, literal: Literal) -> Option<bool> {
        let raw_assignment = self.assignment[literal.variable().as_index()];
        raw_assignment.map(|val| val ^ !literal.positive())
    }

    /// Returns a forced literal in a unit clause.
    fn forced_assignment(&self, clause_index: usize) -> Option<Literal> {
        let clause = &self.formula.clauses()[clause_index];
        let stat = &self.clause_stats[clause_index];
        if stat.satisfied == 0 && stat.unsatisfied + 1 == clause.num_literals() {
            clause
                .iter()
                .find(|&literal| self.assigned_value(literal).is_none())
        } else {
            None
        }
    }

    fn next_unassigned(&mut self) -> Option<Variable> {
        while self.next_variable < self.assignment.len() {
            if self.assignment[self.next_variable].is_none() {
                return Variable::from_index(self.next_variable);
            }
            self.next_variable += 1;
        }
        None
    }

    fn assign_literal(&mut self, literal: Literal) {
        self.trail.push(literal);
        self.assignment[literal.variable().as_index()] = Some(literal.positive());

        for &clause_index in &self.watch[literal] {
            let stat = &mut self.clause_stats[clause_index];

            if stat.satisfied == 0 {
                self.satisfied_clauses += 1;
            }
            stat.satisfied += 1;
        }

        // Only clauses containing the falsified literal can turn unit or empty.
        for i in 0..self.watch[!literal].len() {
            let clause_index = self.watch[!literal][i];
            let num_literals = self.formula.clauses()[clause_index].num_literals();
            let stat = &mut self.clause_stats[clause_index];

            stat.unsatisfied += 1;
            if stat.unsatisfied == num_literals {
                self.unsatisfied_clauses += 1;
            } else if let Some(forced) = self.forced_assignment(clause_index) {
                self.pending.push(forced);
            }
        }
    }

    fn pop_assignment(&mut self) -> Option<Literal> {
        let literal = self.trail.pop()?;
        let index = literal.variable().as_index();
        self.assignment[index] = None;
        self.next_variable = self.next_variable.min(index);

        for &clause_index in &self.watch[literal] {
            let stat = &mut self.clause_stats[clause_index];

            if stat.satisfied == 1 {
                self.satisfied_clauses -= 1;
            }
            stat.satisfied -= 1;
        }

        for &clause_index in &self.watch[!literal] {
            let clause = &self.formula.clauses()[clause_index];
            let stat = &mut self.clause_stats[clause_index];

            if stat.unsatisfied == clause.num_literals() {
                self.unsatisfied_clauses -= 1;
            }
            stat.unsatisfied -= 1;
        }

        Some(literal)
    }

    /// Assigns pending forced literals until none is left.
    /// Returns `false` on a conflict.
    fn propagate(&mut self) -> bool {
        while self.unsatisfied_clauses == 0 {
            let literal = match self.pending.pop() {
                Some(literal) => literal,
                None => return true,
            };

            match self.assigned_value(literal) {
                Some(true) => (),
                Some(false) => return false,
                None => {
                    self.stats.propagations += 1;
                    self.assign_literal(literal);
                }
            }
        }

        false
    }

    /// Undoes the latest decision that still has an untried polarity and tries it.
    /// Returns `false` when every decision is exhausted.
    fn backtrack(&mut self) -> bool {
        self.pending.clear();

        while let Some(decision) = self.decisions.pop() {
            while self.trail.len() > decision.trail_len {
                self.pop_assignment();
            }

            if !decision.flipped {
                self.stats.backtracks += 1;
                let literal = !decision.literal;
                self.decisions.push(Decision {
                    literal,
                    flipped: true,
                    ..decision
                });
                self.assign_literal(literal);
                return true;
            }
        }

        false
    }

    /// Iterative DPLL over the trail, so search depth never grows the call stack.
    fn search(&mut self) -> bool {
        if self.formula.empty_clause_count() > 0 {
            return false;
        }

        for clause_index in 0..self.formula.clauses().len() {
            if let Some(literal) = self.forced_assignment(clause_index) {
                self.pending.push(literal);
            }
        }

        loop {
            if !self.propagate() {
                if !self.backtrack() {
                    return false;
                }
                continue;
            }

            if self.satisfied_clauses == self.formula.clauses().len() {
                return true;
            }

            // Try the first unassigned variable, positive polarity first.
            let variable = match self.next_unassigned() {
                Some(variable) => variable,
                None => return true,
            };
            let literal = Literal::new(variable, true);

            self.stats.decisions += 1;
            self.decisions.push(Decision {
                trail_len: self.trail.len(),
                literal,
                flipped: false,
            });
            self.assign_literal(literal);
        }
    }
}

impl Solver for DpllSolver {
    fn new(formula: Cnf) -> Self {
        let num_variables = formula.num_variables();
        let num_clauses = formula.clauses().len();

        let watch = Watch::new(num_variables, formula.clauses());
        let assignment = vec![None; num_variables];
        let clause_stats = vec![Default::default(); num_clauses];

        DpllSolver {
            formula,
            watch,
            assignment,
            clause_stats,
            satisfied_clauses: 0,
            unsatisfied_clauses: 0,
            trail: Vec::with_capacity(num_variables),
            decisions: Vec::new(),
            pending: Vec::new(),
            next_variable: 0,
            stats: SearchStats::default(),
        }
    }

    fn solve(mut self) -> Option<Model> {
        let satisfiable = self.search();
        debug!(
            "DPLL finished with {} decisions, {} propagations, {} backtracks",
            self.stats.decisions, self.stats.propagations, self.stats.backtracks
        );

        if satisfiable {
            // Variables left open by an early finish take `true`.
            let assignment = self
                .assignment
                .iter()
                .map(|assign| assign.unwrap_or(true))
                .collect();
            Some(Model::new(self.formula, assignment))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Clause;

    fn cnf(num_variables: usize, clauses: &[&[&str]]) -> Cnf {
        let mut cnf = Cnf::new(num_variables);
        for clause in clauses {
            let literals = clause.iter().map(|s| s.parse().unwrap()).collect();
            cnf.add_clause(Clause::new(literals)).unwrap();
        }
        cnf
    }

    #[test]
    fn satisfiable_formula_yields_a_model() {
        let formula = cnf(
            4,
            &[&["-1"], &["1", "-2", "-3"], &["2", "-3", "-4"], &["4"]],
        );
        let model = DpllSolver::new(formula).solve().unwrap();
        assert_eq!(&model.assignment()[..1], &[false]);
        assert!(model.assignment()[3]);
        assert!(!model.assignment()[2]);
    }

    #[test]
    fn more_variables_than_clauses() {
        let formula = cnf(10, &[&["10", "-9"]]);
        assert!(DpllSolver::new(formula).solve().is_some());
    }

    #[test]
    fn unsatisfiable_formulas() {
        let contradiction = cnf(1, &[&["1"], &["-1"]]);
        assert!(DpllSolver::new(contradiction).solve().is_none());

        let all_pairs = cnf(
            2,
            &[&["1", "2"], &["1", "-2"], &["-1", "2"], &["-1", "-2"]],
        );
        assert!(DpllSolver::new(all_pairs).solve().is_none());

        let with_empty_clause = cnf(1, &[&["1"], &[]]);
        assert!(DpllSolver::new(with_empty_clause).solve().is_none());
    }

    #[test]
    fn empty_formula_is_satisfiable() {
        let model = DpllSolver::new(Cnf::new(2)).solve().unwrap();
        assert_eq!(model.assignment(), &[true, true]);
    }

    #[test]
    fn wide_formula_does_not_recurse() {
        // (x1 ∨ x2) ∧ (x3 ∨ x4) ∧ ... over 400,000 variables
        let num_variables = 400_000;
        let mut formula = Cnf::new(num_variables);
        for i in (1..num_variables).step_by(2) {
            let literals: Vec<Literal> = vec![
                i.to_string().parse().unwrap(),
                (i + 1).to_string().parse().unwrap(),
            ];
            formula.add_clause(Clause::new(literals)).unwrap();
        }

        let model = DpllSolver::new(formula).solve().unwrap();
        assert_eq!(model.assignment().len(), num_variables);
    }

    #[test]
    fn long_implication_chain_is_refuted() {
        // x1 ∧ (x1 → x2) ∧ ... ∧ (x{n-1} → xn) ∧ ¬xn
        let num_variables = 200_000;
        let mut formula = Cnf::new(num_variables);
        let literal = |id: usize, positive: bool| -> Literal {
            let sign = if positive { "" } else { "-" };
            format!("{}{}", sign, id).parse().unwrap()
        };

        formula
            .add_clause(Clause::new(vec![literal(1, true)]))
            .unwrap();
        for i in 1..num_variables {
            formula
                .add_clause(Clause::new(vec![literal(i, false), literal(i + 1, true)]))
                .unwrap();
        }
        formula
            .add_clause(Clause::new(vec![literal(num_variables, false)]))
            .unwrap();

        assert!(DpllSolver::new(formula).solve().is_none());
    }

    #[test]
    fn backtracks_over_several_decisions() {
        // Forces x1 = false only after the positive branch fails.
        let formula = cnf(
            3,
            &[&["-1", "2"], &["-1", "-2"], &["1", "3"], &["1", "-3", "2"]],
        );
        let model = DpllSolver::new(formula).solve().unwrap();
        assert_eq!(model.assignment(), &[false, true, true]);
    }
}
