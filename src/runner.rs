/*!
Runs the solver under test on a single instance and classifies what it printed.
*/

use std::{
    fmt::Display,
    io::{self, Read},
    mem,
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use wait_timeout::ChildExt;

use crate::prelude::*;

pub const SAT_LINE: &[u8] = b"SAT\n";
pub const UNSAT_LINE: &[u8] = b"UNSAT\n";

/// How long stdout may stay open past the deadline before the run counts as timed out.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to spawn solver '{}'", executable.display()))]
    Spawn {
        executable: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("I/O error while running solver on '{}'", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Solver stdout for '{}' is not captured", path.display()))]
    NoStdout { path: PathBuf },
    #[snafu(display("Solver stdout reader for '{}' panicked", path.display()))]
    ReaderPanicked { path: PathBuf },
}

/// What the solver reported for one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Sat,
    Unsat,
    /// Output was neither `SAT\n` nor `UNSAT\n`.
    Malformed,
    /// The solver was killed at the deadline.
    TimedOut,
}

impl Outcome {
    pub fn from_verdict(satisfiable: bool) -> Self {
        if satisfiable {
            Outcome::Sat
        } else {
            Outcome::Unsat
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Sat => "SAT",
            Outcome::Unsat => "UNSAT",
            Outcome::Malformed => "malformed output",
            Outcome::TimedOut => "timeout",
        };
        f.write_str(s)
    }
}

/// Exact byte comparison, no trimming or case folding.
pub fn classify(raw_output: &[u8]) -> Outcome {
    match raw_output {
        SAT_LINE => Outcome::Sat,
        UNSAT_LINE => Outcome::Unsat,
        _ => Outcome::Malformed,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceResult {
    pub raw_output: Vec<u8>,
    pub outcome: Outcome,
    /// Only measured on the oracle path.
    pub elapsed: Option<Duration>,
}

impl InstanceResult {
    pub fn from_output(raw_output: Vec<u8>) -> Self {
        let outcome = classify(&raw_output);
        InstanceResult {
            raw_output,
            outcome,
            elapsed: None,
        }
    }

    pub fn timed_out(raw_output: Vec<u8>) -> Self {
        InstanceResult {
            raw_output,
            outcome: Outcome::TimedOut,
            elapsed: None,
        }
    }
}

pub trait Runner {
    /// Runs the solver on the instance at `path` and blocks until it is done.
    fn run(&self, path: &Path) -> Result<InstanceResult, Error>;
}

/// The solver under test, invoked as `<executable> [args...] <cnf_file_path>`.
#[derive(Debug, Clone)]
pub struct SolverProcess {
    executable: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl SolverProcess {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        SolverProcess {
            executable: executable.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Fixed arguments passed before the instance path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn spawn(&self, path: &Path) -> Result<Child, Error> {
        let mut command = Command::new(&self.executable);
        command
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        // The solver leads its own process group, so a timeout reaches every
        // process it started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command.spawn().context(Spawn {
            executable: &self.executable,
        })
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

/// Drains solver stdout on a helper thread; the pipe buffer is bounded.
struct OutputReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<io::Result<()>>,
}

impl OutputReader {
    fn spawn(mut stdout: ChildStdout) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (sender, done) = mpsc::channel();

        let shared = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut chunk = [0; 4096];
            let result = loop {
                match stdout.read(&mut chunk) {
                    Ok(0) => break Ok(()),
                    Ok(n) => match shared.lock() {
                        Ok(mut buffer) => buffer.extend_from_slice(&chunk[..n]),
                        Err(_) => break Ok(()),
                    },
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => break Err(e),
                }
            };
            let _ = sender.send(result);
        });

        OutputReader { buffer, done }
    }

    /// Waits for end of file on stdout, at most `limit` if given.
    /// Returns `false` if the limit passed first.
    fn finish(&self, limit: Option<Duration>, path: &Path) -> Result<bool, Error> {
        let result = match limit {
            Some(limit) => match self.done.recv_timeout(limit) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => return ReaderPanicked { path }.fail(),
            },
            None => self.done.recv().ok().context(ReaderPanicked { path })?,
        };

        result.context(Io { path })?;
        Ok(true)
    }

    /// Everything read so far.
    fn take(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .map(|mut buffer| mem::take(&mut *buffer))
            .unwrap_or_default()
    }
}

impl Runner for SolverProcess {
    fn run(&self, path: &Path) -> Result<InstanceResult, Error> {
        let mut child = self.spawn(path)?;
        let stdout = child.stdout.take().context(NoStdout { path })?;
        let reader = OutputReader::spawn(stdout);

        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => {
                let status = child.wait().context(Io { path })?;
                reader.finish(None, path)?;
                debug!("Solver exited with {} on '{}'", status, path.display());
                return Ok(InstanceResult::from_output(reader.take()));
            }
        };

        let deadline = Instant::now() + timeout;
        let status = child.wait_timeout(timeout).context(Io { path })?;

        // Processes started by the solver may hold stdout open after it exits.
        if let Some(status) = status {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if reader.finish(Some(remaining + OUTPUT_GRACE), path)? {
                debug!("Solver exited with {} on '{}'", status, path.display());
                return Ok(InstanceResult::from_output(reader.take()));
            }
        }

        warn!(
            "Solver did not finish on '{}' within {:?}, killing it",
            path.display(),
            timeout
        );
        kill_process_group(&mut child);
        // It may have exited between the deadline and the kill.
        let _ = child.kill();
        child.wait().context(Io { path })?;
        if !reader.finish(Some(OUTPUT_GRACE), path).unwrap_or(false) {
            warn!("Solver output for '{}' is still open, giving up on it", path.display());
        }

        Ok(InstanceResult::timed_out(reader.take()))
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    #[test]
    fn classify_exact_lines() {
        assert_eq!(classify(b"SAT\n"), Outcome::Sat);
        assert_eq!(classify(b"UNSAT\n"), Outcome::Unsat);
    }

    #[test]
    fn classify_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(0x5a7);
        for _ in 0..1000 {
            let len = rng.gen_range(0..8);
            let bytes: Vec<u8> = (0..len)
                .map(|_| *b"SATUN\n sa".get(rng.gen_range(0..9)).unwrap())
                .collect();

            let first = classify(&bytes);
            assert_eq!(first, classify(&bytes));

            let expected = if bytes == SAT_LINE {
                Outcome::Sat
            } else if bytes == UNSAT_LINE {
                Outcome::Unsat
            } else {
                Outcome::Malformed
            };
            assert_eq!(first, expected, "input {:?}", bytes);
        }
    }

    #[test]
    fn result_from_output() {
        let result = InstanceResult::from_output(b"UNSAT\n".to_vec());
        assert_eq!(result.outcome, Outcome::Unsat);
        assert_eq!(result.elapsed, None);
        assert_eq!(
            InstanceResult::timed_out(Vec::new()).outcome,
            Outcome::TimedOut
        );
    }

    #[test]
    fn missing_executable_fails_to_spawn() {
        let solver = SolverProcess::new("/nonexistent/satbench-solver");
        let err = solver.run(Path::new("whatever.cnf")).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
