/*!
Runs every instance of every benchmark set through a [`Runner`] and
verifies the verdicts, stopping at the first mismatch.
*/

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::{self, Receiver},
    },
    thread,
};

use crate::{
    corpus::{CorpusDescriptor, InstanceLabel},
    prelude::*,
    runner::{self, InstanceResult, Runner},
    verify::{verify, BenchmarkFailure},
};

/// A progress line is written for every index divisible by this.
pub const PROGRESS_INTERVAL: u64 = 100;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Instance file '{}' for {} does not exist", path.display(), label))]
    MissingInstance { label: InstanceLabel, path: PathBuf },
    #[snafu(display("Failed to run the solver on {}", label))]
    RunnerError {
        label: InstanceLabel,
        source: runner::Error,
    },
    #[snafu(display("Benchmark run halted"))]
    Benchmark { source: BenchmarkFailure },
    #[snafu(display("Failed to write progress output"))]
    ProgressOutput { source: std::io::Error },
}

impl Error {
    /// The failure if the solver got an instance wrong, as opposed to a broken setup.
    pub fn benchmark_failure(&self) -> Option<&BenchmarkFailure> {
        match self {
            Error::Benchmark { source } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    /// Also where the state stays when a configuration error aborts the run.
    Running { descriptor: String, index: u64 },
    Completed { instances: u64 },
    Halted(BenchmarkFailure),
}

/// Run state and progress output, owned by the driver.
struct Tracker<W> {
    out: W,
    state: RunState,
    verified: u64,
}

impl<W: Write> Tracker<W> {
    fn begin_descriptor(&mut self, descriptor: &CorpusDescriptor) -> Result<(), Error> {
        info!(
            "Benchmark '{}': {} instances, expecting {}",
            descriptor.name(),
            descriptor.indices().len(),
            if descriptor.expected() { "SAT" } else { "UNSAT" }
        );
        writeln!(self.out, "{}", descriptor.name()).context(ProgressOutput)
    }

    fn enter(&mut self, descriptor: &CorpusDescriptor, index: u64) {
        self.state = RunState::Running {
            descriptor: descriptor.name().to_owned(),
            index,
        };
    }

    fn check(
        &mut self,
        descriptor: &CorpusDescriptor,
        index: u64,
        result: &InstanceResult,
    ) -> Result<(), Error> {
        if let Err(failure) = verify(result, descriptor.expected(), descriptor.label(index)) {
            error!("{}", failure);
            self.state = RunState::Halted(failure.clone());
            return Err(failure).context(Benchmark);
        }

        self.verified += 1;
        trace!("{} verified", descriptor.label(index));

        if index % PROGRESS_INTERVAL == 0 {
            writeln!(self.out, "{}", index).context(ProgressOutput)?;
        }

        Ok(())
    }
}

pub struct BenchmarkDriver<R, W> {
    runner: R,
    jobs: usize,
    tracker: Tracker<W>,
}

impl<R: Runner + Sync, W: Write> BenchmarkDriver<R, W> {
    /// Creates an idle driver that writes progress lines to `out`.
    pub fn new(runner: R, out: W) -> Self {
        BenchmarkDriver {
            runner,
            jobs: 1,
            tracker: Tracker {
                out,
                state: RunState::Idle,
                verified: 0,
            },
        }
    }

    /// Number of instances run at the same time. `1` runs strictly one after another.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.tracker.state
    }

    pub fn into_output(self) -> W {
        self.tracker.out
    }

    /// Verifies every instance of `descriptors`, in order, and returns how
    /// many were verified. Nothing is attempted after the first failure.
    pub fn run(&mut self, descriptors: &[CorpusDescriptor]) -> Result<u64, Error> {
        self.tracker.state = RunState::Idle;
        self.tracker.verified = 0;

        for descriptor in descriptors {
            self.tracker.begin_descriptor(descriptor)?;
            if self.jobs > 1 {
                self.run_pooled(descriptor)?;
            } else {
                self.run_sequential(descriptor)?;
            }
        }

        let instances = self.tracker.verified;
        info!("All {} instances verified", instances);
        self.tracker.state = RunState::Completed { instances };

        Ok(instances)
    }

    fn run_sequential(&mut self, descriptor: &CorpusDescriptor) -> Result<(), Error> {
        for (index, path) in descriptor.instances() {
            self.tracker.enter(descriptor, index);
            let result = run_instance(&self.runner, descriptor, index, &path)?;
            self.tracker.check(descriptor, index, &result)?;
        }

        Ok(())
    }

    /// Workers claim indices from a shared counter; results are verified in
    /// ascending index order so the outcome matches a sequential run.
    fn run_pooled(&mut self, descriptor: &CorpusDescriptor) -> Result<(), Error> {
        let runner = &self.runner;
        let tracker = &mut self.tracker;
        let workers = self.jobs.min(descriptor.indices().len());

        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let (sender, receiver) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..workers {
                let sender = sender.clone();
                let next = &next;
                let stop = &stop;
                scope.spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let position = next.fetch_add(1, Ordering::Relaxed);
                        let index = match descriptor.indices().nth(position) {
                            Some(index) => index,
                            None => break,
                        };
                        let path = descriptor.resolve(index);
                        let result = run_instance(runner, descriptor, index, &path);
                        if sender.send((position, index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(sender);

            let outcome = verify_in_order(tracker, descriptor, receiver);
            stop.store(true, Ordering::Relaxed);
            outcome
        })
    }
}

fn verify_in_order<W: Write>(
    tracker: &mut Tracker<W>,
    descriptor: &CorpusDescriptor,
    receiver: Receiver<(usize, u64, Result<InstanceResult, Error>)>,
) -> Result<(), Error> {
    let mut pending = BTreeMap::new();
    let mut position = 0;

    for (received, index, result) in receiver {
        pending.insert(received, (index, result));

        while let Some((index, result)) = pending.remove(&position) {
            tracker.enter(descriptor, index);
            tracker.check(descriptor, index, &result?)?;
            position += 1;
        }
    }

    Ok(())
}

fn run_instance<R: Runner>(
    runner: &R,
    descriptor: &CorpusDescriptor,
    index: u64,
    path: &Path,
) -> Result<InstanceResult, Error> {
    ensure!(
        path.is_file(),
        MissingInstance {
            label: descriptor.label(index),
            path,
        }
    );

    debug!("Running {} ({})", descriptor.label(index), path.display());
    runner.run(path).context(RunnerError {
        label: descriptor.label(index),
    })
}
