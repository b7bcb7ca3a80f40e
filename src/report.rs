/*!
Custom Snafu error printer, used as the error type of `main`
*/

use std::error::Error as StdError;

/// Exit status for a solver that got an instance wrong.
pub const EXIT_BENCHMARK_FAILURE: i32 = 1;
/// Exit status for a broken setup: manifest, corpus files, solver executable.
pub const EXIT_CONFIGURATION_ERROR: i32 = 2;

pub struct Report {
    error: Box<dyn StdError>,
    exit_code: i32,
}

impl Report {
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Prints the error chain to stderr and terminates the process.
    pub fn exit(self) -> ! {
        eprint!("{:?}", self);
        std::process::exit(self.exit_code)
    }
}

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.error)?;

        if let Some(source) = self.error.source() {
            writeln!(f, "\nCaused by:")?;
            for (i, e) in std::iter::successors(Some(source), |e: &&dyn StdError| (*e).source()).enumerate() {
                writeln!(f, "  {}: {}", i, e)?;
            }
        }

        Ok(())
    }
}

impl<E: Into<Box<dyn StdError>>> From<E> for Report {
    fn from(e: E) -> Self {
        Report {
            error: e.into(),
            exit_code: EXIT_CONFIGURATION_ERROR,
        }
    }
}
