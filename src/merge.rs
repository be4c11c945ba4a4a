use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::comm::{Contribution, WorkerContext};
use crate::error::Result;
use crate::provider::{LocalOutcome, MergePolicy, Strategy};
use crate::stats::{RunSummary, WorkerReport};

/// Combines every worker's outcome on the root. Returns the summary on the
/// root and `None` on followers.
pub fn reduce(
    ctx: &WorkerContext,
    outcome: LocalOutcome,
    report: WorkerReport,
    limit: u64,
    strategy: Strategy,
    show_progress: bool,
) -> Result<Option<RunSummary>> {
    let policy = strategy.merge_policy();
    let own = Contribution {
        report,
        grid: match policy {
            MergePolicy::CountSum => None,
            MergePolicy::BitmapOr => Some(outcome.grid),
        },
    };

    let bar = if show_progress && ctx.is_root() {
        let bar = ProgressBar::new(ctx.size.saturating_sub(1) as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} workers merged")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let Some(contributions) = ctx.comm.gather(own, |_| bar.inc(1))? else {
        return Ok(None);
    };
    bar.finish_and_clear();

    let mut summary = RunSummary::new(limit, ctx.size, strategy);
    summary.add_base_count(outcome.base_count);

    match policy {
        MergePolicy::CountSum => sum_counts(&mut summary, contributions),
        MergePolicy::BitmapOr => or_grids(&mut summary, contributions),
    }

    debug!(total = summary.total_primes, ?policy, "reduction complete");
    Ok(Some(summary))
}

fn sum_counts(summary: &mut RunSummary, contributions: Vec<Contribution>) {
    for contribution in contributions {
        summary.add_count(contribution.report.local_count);
        summary.reports.push(contribution.report);
    }
}

/// ORs every grid into the root's, then counts the merged grid once.
fn or_grids(summary: &mut RunSummary, contributions: Vec<Contribution>) {
    let mut merged = None;
    for contribution in contributions {
        if let Some(grid) = contribution.grid {
            match merged.as_mut() {
                None => merged = Some(grid),
                Some(target) => target.or_assign(&grid),
            }
        }
        summary.reports.push(contribution.report);
    }

    if let Some(merged) = merged {
        summary.add_count(merged.count_unmarked());
    }
}
