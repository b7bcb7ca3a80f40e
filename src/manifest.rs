/*!
Benchmark manifest: which solver to run and which corpora to feed it.

```toml
solver = "./build/sat_solver"
solver_args = []
root = "tests/testcases"
timeout_secs = 60
jobs = 1

[[benchmark]]
name = "uf50-218"
pattern = "uf50-0{}.cnf"
range = [1, 1000]
expected = "sat"
```
*/

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde_derive::Deserialize;

use crate::{
    corpus::{self, CorpusDescriptor, IndexRange},
    prelude::*,
    runner::SolverProcess,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to read manifest '{}'", path.display()))]
    ReadManifest {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to parse manifest"))]
    Syntax { source: toml::de::Error },
    #[snafu(display("Benchmark '{}' needs exactly one of 'range' or 'indices'", name))]
    IndexSource { name: String },
    #[snafu(display("Benchmark '{}' has an inverted range [{}, {}]", name, start, end))]
    InvertedRange { name: String, start: u64, end: u64 },
    #[snafu(display("Invalid benchmark definition"))]
    InvalidBenchmark { source: corpus::Error },
    #[snafu(display("timeout_secs must be a positive number, got {}", value))]
    InvalidTimeout { value: f64 },
    #[snafu(display("jobs must be at least 1"))]
    ZeroJobs,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    solver: PathBuf,
    #[serde(default)]
    solver_args: Vec<String>,
    root: Option<PathBuf>,
    timeout_secs: Option<f64>,
    jobs: Option<usize>,
    #[serde(default, rename = "benchmark")]
    benchmarks: Vec<RawBenchmark>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBenchmark {
    name: String,
    dir: Option<String>,
    pattern: String,
    range: Option<(u64, u64)>,
    indices: Option<Vec<u64>>,
    expected: Expected,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Expected {
    Sat,
    Unsat,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub solver: PathBuf,
    pub solver_args: Vec<String>,
    pub timeout: Option<Duration>,
    pub jobs: usize,
    /// Enabled benchmarks in manifest order.
    pub benchmarks: Vec<CorpusDescriptor>,
}

impl Manifest {
    /// Loads a manifest file. Relative paths inside it are relative to its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).context(ReadManifest { path })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Manifest::parse(&text, base_dir)
    }

    pub fn parse(text: &str, base_dir: &Path) -> Result<Self, Error> {
        let raw: RawManifest = toml::from_str(text).context(Syntax)?;

        let timeout = match raw.timeout_secs {
            Some(value) => {
                ensure!(value.is_finite() && value > 0.0, InvalidTimeout { value });
                Some(Duration::from_secs_f64(value))
            }
            None => None,
        };

        let jobs = raw.jobs.unwrap_or(1);
        ensure!(jobs > 0, ZeroJobs);

        let root = match raw.root {
            Some(root) => base_dir.join(root),
            None => base_dir.to_owned(),
        };
        let mut benchmarks = Vec::new();
        for benchmark in raw.benchmarks {
            if !benchmark.enabled {
                debug!("Skipping disabled benchmark '{}'", benchmark.name);
                continue;
            }
            benchmarks.push(benchmark.into_descriptor(&root)?);
        }

        Ok(Manifest {
            solver: resolve_executable(base_dir, raw.solver),
            solver_args: raw.solver_args,
            timeout,
            jobs,
            benchmarks,
        })
    }

    pub fn solver_process(&self) -> SolverProcess {
        SolverProcess::new(&self.solver)
            .with_args(self.solver_args.clone())
            .with_timeout(self.timeout)
    }
}

impl RawBenchmark {
    fn into_descriptor(self, root: &Path) -> Result<CorpusDescriptor, Error> {
        let indices = match (self.range, self.indices) {
            (Some((start, end)), None) => {
                ensure!(
                    start <= end,
                    InvertedRange {
                        name: &self.name,
                        start,
                        end,
                    }
                );
                IndexRange::inclusive(start, end)
            }
            (None, Some(indices)) => IndexRange::list(indices),
            _ => return IndexSource { name: self.name }.fail(),
        };

        let dir = self.dir.as_deref().unwrap_or(&self.name);
        let template = root.join(dir).join(&self.pattern);
        let expected = match self.expected {
            Expected::Sat => true,
            Expected::Unsat => false,
        };

        let descriptor = CorpusDescriptor::new(
            self.name,
            template.to_string_lossy(),
            indices,
            expected,
        );
        descriptor.validate().context(InvalidBenchmark)?;

        Ok(descriptor)
    }
}

/// A bare command name such as `minisat` is left for `PATH` lookup.
fn resolve_executable(base_dir: &Path, solver: PathBuf) -> PathBuf {
    if solver.components().count() > 1 {
        base_dir.join(solver)
    } else {
        solver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
solver = "./build/sat_solver"
solver_args = ["--quiet"]
root = "testcases"
timeout_secs = 2.5
jobs = 4

[[benchmark]]
name = "uf50-218"
pattern = "uf50-0{}.cnf"
range = [1, 1000]
expected = "sat"

[[benchmark]]
name = "uuf100"
dir = "uuf100-430"
pattern = "uuf100-0{}.cnf"
indices = [9, 3, 3]
expected = "unsat"

[[benchmark]]
name = "uf20-91"
pattern = "uf20-0{}.cnf"
range = [1, 1000]
expected = "sat"
enabled = false
"#;

    #[test]
    fn parse_sample() {
        let manifest = Manifest::parse(SAMPLE, Path::new("/bench")).unwrap();

        assert_eq!(manifest.solver, PathBuf::from("/bench/./build/sat_solver"));
        assert_eq!(manifest.solver_args, vec!["--quiet"]);
        assert_eq!(manifest.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(manifest.jobs, 4);
        assert_eq!(manifest.benchmarks.len(), 2);

        let uf50 = &manifest.benchmarks[0];
        assert_eq!(uf50.name(), "uf50-218");
        assert!(uf50.expected());
        assert_eq!(uf50.indices(), &IndexRange::inclusive(1, 1000));
        assert_eq!(
            uf50.resolve(7),
            PathBuf::from("/bench/testcases/uf50-218/uf50-07.cnf")
        );

        let uuf100 = &manifest.benchmarks[1];
        assert!(!uuf100.expected());
        assert_eq!(uuf100.indices().iter().collect::<Vec<_>>(), vec![3, 9]);
        assert_eq!(
            uuf100.resolve(3),
            PathBuf::from("/bench/testcases/uuf100-430/uuf100-03.cnf")
        );
    }

    #[test]
    fn defaults() {
        let manifest = Manifest::parse("solver = \"minisat\"", Path::new("/bench")).unwrap();
        assert_eq!(manifest.solver, PathBuf::from("minisat"));
        assert!(manifest.solver_args.is_empty());
        assert_eq!(manifest.timeout, None);
        assert_eq!(manifest.jobs, 1);
        assert!(manifest.benchmarks.is_empty());
    }

    fn parse_benchmark(body: &str) -> Result<Manifest, Error> {
        let text = format!("solver = \"s\"\n[[benchmark]]\nname = \"b\"\n{}", body);
        Manifest::parse(&text, Path::new(""))
    }

    #[test]
    fn rejects_bad_benchmarks() {
        assert!(matches!(
            parse_benchmark("pattern = \"b-{}.cnf\"\nexpected = \"sat\""),
            Err(Error::IndexSource { .. })
        ));
        assert!(matches!(
            parse_benchmark("pattern = \"b-{}.cnf\"\nrange = [1, 2]\nindices = [1]\nexpected = \"sat\""),
            Err(Error::IndexSource { .. })
        ));
        assert!(matches!(
            parse_benchmark("pattern = \"b-{}.cnf\"\nrange = [5, 2]\nexpected = \"sat\""),
            Err(Error::InvertedRange { start: 5, end: 2, .. })
        ));
        assert!(matches!(
            parse_benchmark("pattern = \"b.cnf\"\nrange = [1, 2]\nexpected = \"sat\""),
            Err(Error::InvalidBenchmark { .. })
        ));
        assert!(matches!(
            parse_benchmark("pattern = \"b-{}.cnf\"\nrange = [1, 2]\nexpected = \"maybe\""),
            Err(Error::Syntax { .. })
        ));
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            Manifest::parse("solver = \"s\"\njobs = 0", Path::new("")),
            Err(Error::ZeroJobs)
        ));
        assert!(matches!(
            Manifest::parse("solver = \"s\"\ntimeout_secs = -1.0", Path::new("")),
            Err(Error::InvalidTimeout { .. })
        ));
        assert!(matches!(
            Manifest::parse("solver = \"s\"\ncolor = true", Path::new("")),
            Err(Error::Syntax { .. })
        ));
    }

    #[test]
    fn load_missing_file() {
        assert!(matches!(
            Manifest::load("/nonexistent/benchmarks.toml"),
            Err(Error::ReadManifest { .. })
        ));
    }
}
