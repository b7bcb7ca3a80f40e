#[macro_use]
extern crate log;

use std::{env::args, io, path::Path};

use pretty_env_logger::formatted_builder;
use satbench::{
    driver::{self, BenchmarkDriver},
    manifest::{self, Manifest},
    oracle,
    prelude::*,
    report::{Report, EXIT_BENCHMARK_FAILURE},
};

fn usage_string() -> String {
    format!(
        "Usage: {} <command> <manifest>

command:
    run <manifest>    - verify the solver against every benchmark in the manifest
    check <manifest>  - validate the manifest and list missing corpus files
    oracle <manifest> - solve the corpus with the built-in solver and print microseconds per file",
        args().next().unwrap_or_else(|| "satbench".to_owned())
    )
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unknown command '{}'\n\n{}", name, usage_string()))]
    UnknownCommand { name: String },
    #[snafu(display("Required argument does not exist\n\n{}", usage_string()))]
    MissingArgument,
    #[snafu(display("Failed to load manifest"))]
    ManifestError { source: manifest::Error },
    #[snafu(display("{} corpus files are missing", count))]
    MissingFiles { count: usize },
}

fn load_manifest(args: &[String]) -> Result<Manifest, Error> {
    let path = args.get(0).context(MissingArgument)?;
    let manifest = Manifest::load(Path::new(path)).context(ManifestError)?;
    info!(
        "Loaded {} benchmarks from '{}', solver '{}'",
        manifest.benchmarks.len(),
        path,
        manifest.solver.display()
    );
    Ok(manifest)
}

fn run_benchmarks(manifest: &Manifest) -> Result<(), Report> {
    let stdout = io::stdout();
    let mut driver =
        BenchmarkDriver::new(manifest.solver_process(), stdout.lock()).jobs(manifest.jobs);

    match driver.run(&manifest.benchmarks) {
        Ok(instances) => {
            println!("{} instances verified", instances);
            Ok(())
        }
        Err(e @ driver::Error::Benchmark { .. }) => {
            Err(Report::from(e).with_exit_code(EXIT_BENCHMARK_FAILURE))
        }
        Err(e) => Err(e.into()),
    }
}

fn check_corpus(manifest: &Manifest) -> Result<(), Error> {
    let mut count = 0;
    for descriptor in &manifest.benchmarks {
        let missing = descriptor.missing_files();
        println!(
            "{}: {} instances, {} missing",
            descriptor.name(),
            descriptor.indices().len(),
            missing.len()
        );
        for path in &missing {
            println!("  {}", path.display());
        }
        count += missing.len();
    }

    ensure!(count == 0, MissingFiles { count });
    Ok(())
}

fn time_oracle(manifest: &Manifest) -> Result<(), Report> {
    let stdout = io::stdout();
    match oracle::time_corpus(&manifest.benchmarks, stdout.lock()) {
        Ok(samples) => {
            info!("Oracle solved {} instances", samples.len());
            Ok(())
        }
        Err(e @ oracle::Error::Disagreement { .. }) => {
            Err(Report::from(e).with_exit_code(EXIT_BENCHMARK_FAILURE))
        }
        Err(e) => Err(e.into()),
    }
}

fn dispatch_command(args: Vec<String>) -> Result<(), Report> {
    match args.get(0).map(|s| s.as_str()) {
        Some("run") => run_benchmarks(&load_manifest(&args[1..])?)?,
        Some("check") => check_corpus(&load_manifest(&args[1..])?)?,
        Some("oracle") => time_oracle(&load_manifest(&args[1..])?)?,
        Some(name) => UnknownCommand {
            name: name.to_owned(),
        }
        .fail()?,
        None => {
            println!("{}", usage_string());
        }
    }

    Ok(())
}

fn init_logger() {
    let mut builder = formatted_builder();

    if let Ok(s) = ::std::env::var("RUST_LOG") {
        builder.parse_filters(&s);
    } else if cfg!(debug_assertions) {
        builder.parse_filters("satbench=debug");
    } else {
        builder.parse_filters("satbench=warn");
    }

    if builder.try_init().is_err() {
        eprintln!("Failed to initialize the logger");
    }
}

fn main() {
    init_logger();

    // drop arg[0]
    let remaining: Vec<_> = args().skip(1).collect();

    if let Err(report) = dispatch_command(remaining) {
        report.exit();
    }
}
