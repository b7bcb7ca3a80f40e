/*!
Reference verdicts computed in-process with the DPLL solver.

Besides DIMACS, the oracle reads clause-line files (`.mycnf`): one clause per
line, literals written as `name` or `-name`, and a trailing terminator token
that is ignored. Names are case-sensitive and otherwise opaque.
*/

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use typed_index_collections::TiVec;

use crate::{
    corpus::{CorpusDescriptor, InstanceLabel},
    formula::{Clause, Cnf, Literal, Variable},
    parser,
    prelude::*,
    runner::{InstanceResult, Outcome, SAT_LINE, UNSAT_LINE},
    solver::{DpllSolver, Solver},
    verify::{verify, BenchmarkFailure},
};

/// Extension of clause-line files.
pub const CLAUSE_LINES_EXTENSION: &str = "mycnf";

#[derive(Debug, Snafu)]
pub enum TokenError {
    #[snafu(display("Literal '{}' has no variable name", token))]
    MissingIdentifier { token: String },
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to read clause lines from '{}'", path.display()))]
    ReadClauses {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Malformed clause on line {} of '{}'", line, path.display()))]
    MalformedLine {
        path: PathBuf,
        line: usize,
        source: TokenError,
    },
    #[snafu(display("Failed to load DIMACS file"))]
    Dimacs { source: parser::Error },
    #[snafu(display("Too many distinct variables in '{}'", path.display()))]
    TooManyVariables { path: PathBuf },
    #[snafu(display("Instance file '{}' for {} does not exist", path.display(), label))]
    MissingInstance { label: InstanceLabel, path: PathBuf },
    #[snafu(display("Oracle disagrees with the expected verdict"))]
    Disagreement { source: BenchmarkFailure },
    #[snafu(display("Failed to write timing output"))]
    TimingOutput { source: std::io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralToken<'a> {
    pub name: &'a str,
    pub positive: bool,
}

/// Parses `name` or `-name`.
pub fn parse_token(token: &str) -> Result<LiteralToken<'_>, TokenError> {
    let (positive, name) = match token.strip_prefix('-') {
        Some(name) => (false, name),
        None => (true, token),
    };
    ensure!(!name.is_empty(), MissingIdentifier { token });

    Ok(LiteralToken { name, positive })
}

/// Parses the literals of one clause line, dropping the terminator token.
pub fn parse_clause_line(line: &str) -> Result<Vec<LiteralToken<'_>>, TokenError> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    let literals = tokens
        .split_last()
        .map(|(_terminator, literals)| literals)
        .unwrap_or_default();

    literals.iter().map(|&token| parse_token(token)).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VariableIdx(usize);

impl From<usize> for VariableIdx {
    fn from(index: usize) -> Self {
        VariableIdx(index)
    }
}

impl From<VariableIdx> for usize {
    fn from(index: VariableIdx) -> Self {
        index.0
    }
}

/// Clause lines with variable names interned in first-seen order.
#[derive(Debug, Default)]
pub struct ClauseLines {
    names: TiVec<VariableIdx, String>,
    lookup: HashMap<String, VariableIdx>,
    clauses: Vec<Vec<(VariableIdx, bool)>>,
}

impl ClauseLines {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push_line(&mut self, line: &str) -> Result<(), TokenError> {
        let clause = parse_clause_line(line)?
            .into_iter()
            .map(|token| (self.intern(token.name), token.positive))
            .collect();
        self.clauses.push(clause);

        Ok(())
    }

    fn intern(&mut self, name: &str) -> VariableIdx {
        if let Some(&idx) = self.lookup.get(name) {
            return idx;
        }

        let idx = self.names.push_and_get_key(name.to_owned());
        self.lookup.insert(name.to_owned(), idx);
        idx
    }

    pub fn name(&self, idx: VariableIdx) -> &str {
        &self.names[idx]
    }

    pub fn variable(&self, name: &str) -> Option<VariableIdx> {
        self.lookup.get(name).copied()
    }

    pub fn num_variables(&self) -> usize {
        self.names.len()
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    /// Returns `None` if there are more names than the formula can index.
    pub fn to_cnf(&self) -> Option<Cnf> {
        if self.num_variables() > Variable::MAX_VARIABLE_ID {
            return None;
        }

        let mut cnf = Cnf::new(self.num_variables());
        for clause in &self.clauses {
            let literals = clause
                .iter()
                .map(|&(idx, positive)| {
                    Variable::from_index(idx.into()).map(|variable| Literal::new(variable, positive))
                })
                .collect::<Option<Vec<_>>>()?;
            cnf.add_clause(Clause::new(literals)).ok()?;
        }

        Some(cnf)
    }
}

/// Reads a clause-line file. Blank lines are skipped.
pub fn read_clause_lines(path: impl AsRef<Path>) -> Result<ClauseLines, Error> {
    let path = path.as_ref();
    let file = File::open(path).context(ReadClauses { path })?;

    let mut clause_lines = ClauseLines::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context(ReadClauses { path })?;
        if line.trim().is_empty() {
            continue;
        }
        clause_lines
            .push_line(&line)
            .context(MalformedLine {
                path,
                line: line_no + 1,
            })?;
    }

    Ok(clause_lines)
}

/// Loads `.mycnf` files as clause lines and anything else as DIMACS.
pub fn load(path: impl AsRef<Path>) -> Result<Cnf, Error> {
    let path = path.as_ref();
    if path.extension().map_or(false, |ext| ext == CLAUSE_LINES_EXTENSION) {
        read_clause_lines(path)?
            .to_cnf()
            .context(TooManyVariables { path })
    } else {
        parser::parse_file(path).context(Dimacs)
    }
}

/// Solves `formula`, timing only the search.
pub fn solve(formula: Cnf) -> InstanceResult {
    let start = Instant::now();
    let satisfiable = DpllSolver::new(formula).solve().is_some();
    let elapsed = start.elapsed();

    let raw_output = if satisfiable { SAT_LINE } else { UNSAT_LINE };
    InstanceResult {
        raw_output: raw_output.to_vec(),
        outcome: Outcome::from_verdict(satisfiable),
        elapsed: Some(elapsed),
    }
}

pub fn solve_file(path: impl AsRef<Path>) -> Result<InstanceResult, Error> {
    Ok(solve(load(path)?))
}

/// Solves every instance of `descriptors` in order, checks each verdict
/// against the expected one and writes the solving time in microseconds,
/// one line per file.
pub fn time_corpus<W: Write>(
    descriptors: &[CorpusDescriptor],
    mut out: W,
) -> Result<Vec<Duration>, Error> {
    let mut samples = Vec::new();

    for descriptor in descriptors {
        info!("Oracle timing '{}'", descriptor.name());

        for (index, path) in descriptor.instances() {
            ensure!(
                path.is_file(),
                MissingInstance {
                    label: descriptor.label(index),
                    path,
                }
            );

            let result = solve_file(&path)?;
            verify(&result, descriptor.expected(), descriptor.label(index)).context(Disagreement)?;

            let elapsed = result.elapsed.unwrap_or_default();
            writeln!(out, "{}", elapsed.as_micros()).context(TimingOutput)?;
            samples.push(elapsed);
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::corpus::IndexRange;

    #[test]
    fn tokens() {
        assert_eq!(
            parse_token("x1").unwrap(),
            LiteralToken {
                name: "x1",
                positive: true
            }
        );
        assert_eq!(
            parse_token("-x1").unwrap(),
            LiteralToken {
                name: "x1",
                positive: false
            }
        );
        assert!(parse_token("-").is_err());
    }

    #[test]
    fn clause_line_drops_terminator() {
        let literals = parse_clause_line("a -b c 0").unwrap();
        let names: Vec<_> = literals.iter().map(|l| (l.name, l.positive)).collect();
        assert_eq!(names, vec![("a", true), ("b", false), ("c", true)]);

        assert!(parse_clause_line("a").unwrap().is_empty());
        assert!(parse_clause_line("").unwrap().is_empty());
    }

    #[test]
    fn names_are_interned_case_sensitively() {
        let mut lines = ClauseLines::new();
        lines.push_line("foo -Foo 0").unwrap();
        lines.push_line("-foo bar 0").unwrap();

        assert_eq!(lines.num_variables(), 3);
        assert_eq!(lines.num_clauses(), 2);
        let foo = lines.variable("foo").unwrap();
        assert_eq!(usize::from(foo), 0);
        assert_eq!(lines.name(foo), "foo");
        assert_eq!(usize::from(lines.variable("Foo").unwrap()), 1);
        assert_eq!(lines.variable("FOO"), None);

        let cnf = lines.to_cnf().unwrap();
        assert_eq!(cnf.num_variables(), 3);
        assert_eq!(cnf.num_clauses(), 2);
    }

    #[test]
    fn solves_clause_line_files() {
        let dir = tempfile::tempdir().unwrap();

        let sat = dir.path().join("sat.mycnf");
        fs::write(&sat, "1 -2 0\n\n2 3 0\n-1 0\n").unwrap();
        let result = solve_file(&sat).unwrap();
        assert_eq!(result.outcome, Outcome::Sat);
        assert_eq!(result.raw_output, b"SAT\n");
        assert!(result.elapsed.is_some());

        let unsat = dir.path().join("unsat.mycnf");
        fs::write(&unsat, "p 0\n-p 0\n").unwrap();
        assert_eq!(solve_file(&unsat).unwrap().outcome, Outcome::Unsat);
    }

    #[test]
    fn solves_dimacs_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contradiction.cnf");
        fs::write(&path, "p cnf 1 2\n1 0\n-1 0\n").unwrap();

        assert_eq!(solve_file(&path).unwrap().outcome, Outcome::Unsat);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mycnf");
        fs::write(&path, "a 0\na - 0\n").unwrap();

        assert!(matches!(
            solve_file(&path),
            Err(Error::MalformedLine { line: 2, .. })
        ));
    }

    #[test]
    fn time_corpus_checks_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        for index in 1..=3 {
            fs::write(
                dir.path().join(format!("toy-{}.mycnf", index)),
                "a b 0\n-a 0\n",
            )
            .unwrap();
        }
        let template = dir.path().join("toy-{}.mycnf");
        let template = template.to_str().unwrap();

        let sat = CorpusDescriptor::new("toy", template, IndexRange::inclusive(1, 3), true);
        let mut out = Vec::new();
        let samples = time_corpus(&[sat], &mut out).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 3);

        let unsat = CorpusDescriptor::new("toy", template, IndexRange::inclusive(1, 3), false);
        let err = time_corpus(&[unsat], Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Disagreement { ref source } if source.label == InstanceLabel::new("toy", 1)
        ));
    }
}
