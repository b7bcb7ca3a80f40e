use std::fmt::Display;

use crate::{
    corpus::InstanceLabel,
    runner::{InstanceResult, Outcome},
};

/// The solver's verdict for an instance disagrees with the known answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkFailure {
    pub label: InstanceLabel,
    pub expected: Outcome,
    pub found: Outcome,
    pub raw_output: Vec<u8>,
}

impl Display for BenchmarkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Assertion failed on {}: expected {}, solver reported {}",
            self.label, self.expected, self.found
        )?;
        if self.found == Outcome::Malformed {
            write!(
                f,
                " {:?}",
                String::from_utf8_lossy(&self.raw_output).as_ref()
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for BenchmarkFailure {}

/// Checks `result` against the expected verdict (`true` = satisfiable).
pub fn verify(
    result: &InstanceResult,
    expected: bool,
    label: InstanceLabel,
) -> Result<(), BenchmarkFailure> {
    let expected = Outcome::from_verdict(expected);
    if result.outcome == expected {
        return Ok(());
    }

    Err(BenchmarkFailure {
        label,
        expected,
        found: result.outcome,
        raw_output: result.raw_output.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(raw: &[u8]) -> InstanceResult {
        InstanceResult::from_output(raw.to_vec())
    }

    fn label() -> InstanceLabel {
        InstanceLabel::new("toy", 2)
    }

    #[test]
    fn matching_verdicts_pass() {
        assert!(verify(&result(b"SAT\n"), true, label()).is_ok());
        assert!(verify(&result(b"UNSAT\n"), false, label()).is_ok());
    }

    #[test]
    fn every_other_combination_fails() {
        let cases: &[(&[u8], bool)] = &[
            (b"SAT\n", false),
            (b"UNSAT\n", true),
            (b"maybe\n", true),
            (b"maybe\n", false),
            (b"", true),
            (b"SAT", true),
            (b"UNSAT", false),
            (b"SAT\nUNSAT\n", true),
        ];

        for &(raw, expected) in cases {
            let failure = verify(&result(raw), expected, label()).unwrap_err();
            assert_eq!(failure.label, label());
            assert_eq!(failure.expected, Outcome::from_verdict(expected));
            assert_eq!(failure.raw_output, raw);
        }
    }

    #[test]
    fn timeout_is_a_failure() {
        let failure = verify(&InstanceResult::timed_out(Vec::new()), true, label()).unwrap_err();
        assert_eq!(failure.found, Outcome::TimedOut);
    }

    #[test]
    fn failure_message_names_the_instance() {
        let failure = verify(&result(b"UNSAT\n"), true, label()).unwrap_err();
        assert_eq!(
            failure.to_string(),
            "Assertion failed on toy #2: expected SAT, solver reported UNSAT"
        );

        let failure = verify(&result(b"maybe\n"), true, label()).unwrap_err();
        assert_eq!(
            failure.to_string(),
            "Assertion failed on toy #2: expected SAT, solver reported malformed output \"maybe\\n\""
        );
    }
}
