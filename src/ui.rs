//! Terminal output: a spinner while enumerating and a styled summary.
//!
//! Uses `indicatif` for the spinner and `console` for colors. Everything
//! goes to stderr through the progress bar so that log lines and the
//! spinner do not tear each other.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use console::Style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::enumerator::EnumStats;
use crate::queue::MasterStats;

pub struct SearchProgress {
    pb: ProgressBar,
    started: Instant,
    /// Latest counters and queue length per cluster worker, by rank.
    workers: Mutex<Vec<(EnumStats, usize)>>,
    green: Style,
    cyan: Style,
    dim: Style,
}

impl SearchProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.cyan} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(label.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self::with_bar(pb)
    }

    /// Draws nothing, for tests and non-interactive runs.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(pb: ProgressBar) -> Self {
        Self {
            pb,
            started: Instant::now(),
            workers: Mutex::new(Vec::new()),
            green: Style::new().green().bold(),
            cyan: Style::new().cyan(),
            dim: Style::new().dim(),
        }
    }

    pub fn update(&self, stats: &EnumStats, queued: usize) {
        self.pb.set_message(format!(
            "{} machines | {} halt | {} infinite | {} unknown | queue {}",
            stats.tm_num, stats.num_halt, stats.num_infinite, stats.num_unresolved, queued
        ));
    }

    /// Stores one cluster worker's counters and shows the sum over all workers.
    pub fn update_worker(&self, rank: usize, stats: &EnumStats, queued: usize) {
        let (total, queued) = {
            let mut workers = self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if workers.len() <= rank {
                workers.resize_with(rank + 1, Default::default);
            }
            workers[rank] = (stats.clone(), queued);
            sum_workers(&workers)
        };
        self.update(&total, queued);
    }

    /// Totals of everything passed to [`SearchProgress::update_worker`].
    pub fn cluster_totals(&self) -> (EnumStats, usize) {
        let workers = self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sum_workers(&workers)
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    pub fn print_summary(&self, title: &str, stats: &EnumStats) {
        self.finish();
        let elapsed = self.started.elapsed();
        println!();
        println!("{}", self.green.apply_to(format!("─── {title} ───")));
        for line in summary_lines(stats) {
            println!("  {line}");
        }
        println!(
            "  {}",
            self.dim.apply_to(format!("elapsed {:.1}s", elapsed.as_secs_f64()))
        );
    }

    pub fn print_master_summary(&self, stats: &MasterStats) {
        self.finish();
        println!();
        println!("{}", self.green.apply_to("─── Master ───"));
        println!(
            "  {} batches, {} jobs sent, {} jobs received, {} broadcasts, peak buffer {}",
            self.cyan.apply_to(stats.batches_sent),
            stats.jobs_sent,
            stats.jobs_received,
            stats.broadcasts,
            stats.peak_global
        );
    }
}

fn sum_workers(workers: &[(EnumStats, usize)]) -> (EnumStats, usize) {
    let mut total = EnumStats::default();
    let mut queued = 0;
    for (stats, len) in workers {
        total.merge(stats);
        queued += len;
    }
    (total, queued)
}

/// Plain-text summary, one fact per line.
pub fn summary_lines(stats: &EnumStats) -> Vec<String> {
    let mut lines = vec![
        format!("machines evaluated  {}", stats.tm_num),
        format!("halting             {}", stats.num_halt),
        format!("infinite            {}", stats.num_infinite),
        format!("unknown             {}", stats.num_unresolved),
        format!("branched            {}", stats.num_branched),
    ];
    if stats.num_not_run > 0 {
        lines.push(format!("not run             {}", stats.num_not_run));
    }
    if let Some(table) = &stats.best_steps_table {
        lines.push(format!("best steps          {} ({table})", stats.best_steps));
    }
    if let Some(table) = &stats.best_score_table {
        lines.push(format!("best score          {} ({table})", stats.best_score));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_mentions_champions() {
        let stats = EnumStats {
            tm_num: 72,
            num_halt: 11,
            best_steps: 6,
            best_steps_table: Some("1RB1LB_1LA1RZ".parse().unwrap()),
            ..EnumStats::default()
        };
        let lines = summary_lines(&stats);
        assert!(lines.iter().any(|l| l.contains("1RB1LB_1LA1RZ") && l.contains('6')));
        assert!(!lines.iter().any(|l| l.starts_with("not run")));
    }

    #[test]
    fn hidden_progress_accepts_updates() {
        let progress = SearchProgress::hidden();
        progress.update(&EnumStats::default(), 3);
        progress.finish();
    }

    #[test]
    fn cluster_progress_sums_the_latest_per_worker() {
        let progress = SearchProgress::hidden();
        let stats = |tm_num, num_halt| EnumStats {
            tm_num,
            num_halt,
            ..EnumStats::default()
        };
        progress.update_worker(1, &stats(7, 2), 4);
        progress.update_worker(0, &stats(5, 1), 3);
        // A newer report from worker 0 replaces its older one.
        progress.update_worker(0, &stats(6, 1), 2);

        let (total, queued) = progress.cluster_totals();
        assert_eq!(total.tm_num, 13);
        assert_eq!(total.num_halt, 3);
        assert_eq!(queued, 6);
    }
}
