mod comm;
mod config;
mod error;
mod grid;
mod merge;
mod offset;
mod output;
mod partition;
mod provider;
mod sieve;
mod stats;

use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::comm::{WorkerContext, run_cohort};
use crate::config::Config;
use crate::error::{Result, SieveError};
use crate::provider::{SieveParams, Strategy, sieve_local};
use crate::stats::{RunSummary, WorkerReport};

fn main() -> ExitCode {
    let config = Config::parse();
    init_tracing();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .with_thread_names(true)
        .init();
}

fn run(config: &Config) -> Result<()> {
    config.validate()?;

    let params = config.sieve_params();
    let workers = config.worker_count();
    info!(limit = params.limit, workers, strategy = ?params.strategy, "starting cohort");

    let summary = sieve_with_cohort(workers, &params, config.progress)?;

    if params.strategy != Strategy::Broadcast {
        println!(
            "The number of primes in the set from 2 to {} (inclusive) is {}",
            params.limit.isqrt(),
            summary.base_count
        );
    }
    // Round-robin workers each hold a partial marking of the same range, so
    // its count only exists once the grids are merged.
    if let (Strategy::RoundRobin, Some(range)) = (params.strategy, summary.reports.first()) {
        println!(
            "The number of primes in the set from {} to {} (inclusive) is {}",
            range.low,
            range.high,
            summary.segment_count()
        );
    }
    println!(
        "{} primes are less than or equal to {}",
        summary.total_primes, summary.limit
    );
    println!("Total elapsed time: {:10.6}", summary.elapsed_secs);

    if config.verify {
        let reference = sieve::reference_count(params.limit);
        if reference != summary.total_primes {
            return Err(SieveError::VerificationMismatch {
                cohort: summary.total_primes,
                reference,
            });
        }
        println!("Verified against a sequential sieve.");
    }

    if let Some(output_dir) = &config.output_dir {
        output::write_results(&summary, Path::new(output_dir))?;
        println!("Results written to {output_dir}");
    }

    Ok(())
}

/// Runs one cohort to completion and returns the root's summary, or the one
/// error that brought the cohort down.
fn sieve_with_cohort(workers: usize, params: &SieveParams, progress: bool) -> Result<RunSummary> {
    let results = run_cohort(workers, |ctx| run_worker(ctx, params, progress))?;

    let mut summary = None;
    let mut aborted = false;
    let mut failure = None;
    for result in results {
        match result {
            Ok(Some(root_summary)) => summary = Some(root_summary),
            Ok(None) => {}
            // Peers that were torn down stay quiet; the detecting worker speaks.
            Err(err) if err.is_abort() => aborted = true,
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    match summary {
        Some(summary) if !aborted => Ok(summary),
        _ => Err(SieveError::Aborted),
    }
}

fn run_worker(
    ctx: WorkerContext,
    params: &SieveParams,
    progress: bool,
) -> Result<Option<RunSummary>> {
    // Elapsed time starts once the slowest worker is ready.
    ctx.comm.barrier();
    let started = Instant::now();

    let outcome = sieve_local(&ctx, params)?;
    let report = WorkerReport::new(
        ctx.rank,
        &outcome.segment,
        outcome.grid.count_unmarked(),
        outcome.sieving_primes,
    );
    print_local(&report, params.strategy);

    let summary = merge::reduce(&ctx, outcome, report, params.limit, params.strategy, progress)?;
    Ok(summary.map(|mut summary| {
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        summary
    }))
}

fn print_local(report: &WorkerReport, strategy: Strategy) {
    match strategy {
        Strategy::RoundRobin => println!(
            "Worker {} sieved the set from {} to {} (inclusive) with {} base primes, leaving {} unmarked",
            report.rank, report.low, report.high, report.sieving_primes, report.local_count
        ),
        Strategy::Broadcast | Strategy::Replicated => println!(
            "The number of primes in the set from {} to {} (inclusive) is {}",
            report.low, report.high, report.local_count
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Segment;
    use crate::sieve::reference_count;

    fn count(limit: u64, workers: usize, strategy: Strategy) -> Result<u64> {
        let params = SieveParams {
            limit,
            strategy,
            block_len: None,
        };
        sieve_with_cohort(workers, &params, false).map(|summary| summary.total_primes)
    }

    #[test]
    fn test_known_counts() {
        for strategy in [Strategy::Broadcast, Strategy::Replicated, Strategy::RoundRobin] {
            assert_eq!(count(100, 3, strategy).unwrap(), 25, "{strategy:?}");
            assert_eq!(count(1_000, 4, strategy).unwrap(), 168, "{strategy:?}");
            assert_eq!(count(1_000_000, 6, strategy).unwrap(), 78_498, "{strategy:?}");
        }
    }

    #[test]
    fn test_boundary_limits() {
        for strategy in [Strategy::Broadcast, Strategy::Replicated, Strategy::RoundRobin] {
            assert_eq!(count(2, 1, strategy).unwrap(), 1, "{strategy:?}");
            assert_eq!(count(3, 1, strategy).unwrap(), 2, "{strategy:?}");
            assert_eq!(count(4, 1, strategy).unwrap(), 2, "{strategy:?}");
        }
    }

    /// Whether the root rejects this run before any grid is allocated.
    fn rejects(limit: u64, workers: usize, strategy: Strategy) -> bool {
        let root_n = limit.isqrt();
        match strategy {
            Strategy::Broadcast => {
                let root = Segment::for_rank(1, limit, 0, workers);
                root.is_empty() || root.high_value < root_n
            }
            Strategy::Replicated => workers > 1 && limit - root_n < 2 * workers as u64,
            Strategy::RoundRobin => false,
        }
    }

    #[test]
    fn test_strategies_agree_with_reference() {
        let mut rejected = 0;
        for limit in (2..=400).chain([997, 1_024, 4_096, 10_007, 65_536]) {
            let reference = reference_count(limit);
            for workers in 1..=5 {
                for strategy in [Strategy::Broadcast, Strategy::Replicated, Strategy::RoundRobin] {
                    let context = format!("limit={limit} workers={workers} {strategy:?}");
                    match count(limit, workers, strategy) {
                        Ok(total) => {
                            assert!(!rejects(limit, workers, strategy), "{context} ran");
                            assert_eq!(total, reference, "{context}");
                        }
                        Err(SieveError::PartitionPrecondition(_)) => {
                            assert!(rejects(limit, workers, strategy), "{context} rejected");
                            rejected += 1;
                        }
                        Err(err) => panic!("{context}: {err}"),
                    }
                }
            }
        }
        // Only the smallest limits with several workers are turned away.
        assert!(rejected > 0);
        assert!(!rejects(400, 5, Strategy::Broadcast));
        assert!(!rejects(400, 5, Strategy::Replicated));
    }

    #[test]
    fn test_round_robin_accepts_more_workers_than_primes() {
        assert_eq!(count(50, 8, Strategy::RoundRobin).unwrap(), 15);
    }

    #[test]
    fn test_precondition_reported_once() {
        let params = SieveParams {
            limit: 100,
            strategy: Strategy::Broadcast,
            block_len: None,
        };
        let err = sieve_with_cohort(12, &params, false).unwrap_err();
        assert!(matches!(err, SieveError::PartitionPrecondition(_)));
    }
}
