/*!
DIMACS CNF reader for the oracle.
*/

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::formula::{Clause, ClauseError, Cnf, Literal, VariableParseError};
use crate::prelude::*;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("I/O error occurred while parsing CNF file '{}'", path.display()))]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to parse line '{}' as clause", clause))]
    MalformedClause { clause: String },
    #[snafu(display("Invalid variable found in clause '{}'", clause))]
    MalformedVariable {
        clause: String,
        source: VariableParseError,
    },
    #[snafu(display("Clause '{}' does not fit the problem definition", clause))]
    ClauseOutOfRange { clause: String, source: ClauseError },
    #[snafu(display("Problem line 'p cnf <num_variables> <num_clauses>' is not found"))]
    MalformedProblemDefinition,
    #[snafu(display(
        "The number of clauses ({}) does not match the clauses number in the problem definition ({})",
        found,
        expected,
    ))]
    ClauseCountMismatch { expected: usize, found: usize },
}

/// Parse a line to a clause
fn parse_line(line: &str) -> Result<Clause, Error> {
    let splitted = line.split_whitespace().collect::<Vec<_>>();

    ensure!(
        splitted.last() == Some(&"0"),
        MalformedClause {
            clause: line.to_owned(),
        }
    );

    let mut literals = Vec::with_capacity(splitted.len() - 1);
    for s in &splitted[..splitted.len() - 1] {
        literals.push(s.parse::<Literal>().with_context(|| MalformedVariable {
            clause: line.to_owned(),
        })?);
    }

    Ok(Clause::new(literals))
}

fn parse_problem_line(line: &str) -> Result<(usize, usize), Error> {
    let splitted = line.split_whitespace().collect::<Vec<_>>();

    // We only support CNF DIMACS format
    match splitted.as_slice() {
        ["p", "cnf", num_variables, num_clauses] => {
            match (num_variables.parse(), num_clauses.parse()) {
                (Ok(num_variables), Ok(num_clauses)) => Ok((num_variables, num_clauses)),
                _ => MalformedProblemDefinition.fail(),
            }
        }
        _ => MalformedProblemDefinition.fail(),
    }
}

/// Parses a CNF formula from DIMACS text.
///
/// Reading stops at a `%` line, the end marker used by the SATLIB benchmark files.
pub fn parse_reader(reader: impl BufRead, path: &Path) -> Result<Cnf, Error> {
    let mut lines = reader.lines();

    // skip until we find the problem definition
    let prob_line = loop {
        match lines.next() {
            Some(line) => {
                let line = line.context(IoError { path })?;
                if line.starts_with('p') {
                    break line;
                }
            }
            None => return MalformedProblemDefinition.fail(),
        }
    };

    let (num_variables, num_clauses) = parse_problem_line(&prob_line)?;
    let mut cnf = Cnf::new(num_variables);

    for line in lines {
        let line = line.context(IoError { path })?;
        let trimmed = line.trim();
        if trimmed.starts_with('%') {
            break;
        }
        if trimmed.is_empty() || trimmed.starts_with('c') {
            // empty line, comment
            continue;
        }
        cnf.add_clause(parse_line(trimmed)?)
            .with_context(|| ClauseOutOfRange {
                clause: trimmed.to_owned(),
            })?;
    }

    ensure!(
        cnf.num_clauses() == num_clauses,
        ClauseCountMismatch {
            found: cnf.num_clauses(),
            expected: num_clauses,
        }
    );

    Ok(cnf)
}

/// Parses CNF formula from a file
pub fn parse_file(path: impl AsRef<Path>) -> Result<Cnf, Error> {
    let path = path.as_ref();
    let file = File::open(path).context(IoError { path })?;
    parse_reader(BufReader::new(file), path)
}
