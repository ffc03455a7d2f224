use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tnfsearch::checkpoint::Checkpoint;
use tnfsearch::config::{LOG_ENV, SearchConfig};
use tnfsearch::enumerator::{EnumSettings, SearchParams};
use tnfsearch::queue::Discipline;
use tnfsearch::record::{JsonLinesSink, NullSink, RecordSink};
use tnfsearch::runner;
use tnfsearch::ui::SearchProgress;

mod cli;

use cli::{Cli, Command, SearchArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let search = cli.command.search().clone();
    setup_logging(search.verbose);

    let mut config = SearchConfig::load(search.config.as_deref()).context("loading configuration")?;
    if let Some(step_limit) = search.step_limit {
        config.step_limit = step_limit;
    }
    config.validate()?;
    let params = search_params(&search);

    match cli.command {
        Command::Run {
            breadth_first,
            num_enum,
            save_freq,
            checkpoint,
            infile,
            ..
        } => {
            let resume = infile
                .as_deref()
                .map(Checkpoint::load)
                .transpose()
                .context("loading checkpoint")?;
            let sink = open_sink(&search, resume.is_some())?;
            let settings = EnumSettings {
                limits: config.limits(),
                num_enum,
                save_freq,
                checkpoint,
                progress_interval: config.progress_interval,
            };
            let discipline = if breadth_first {
                Discipline::BreadthFirst
            } else {
                Discipline::DepthFirst
            };
            let progress = SearchProgress::start("enumerating");
            let stats =
                runner::run_single(&params, settings, discipline, resume, sink, Some(&progress))?;
            progress.print_summary("Search complete", &stats);
        }
        Command::Cluster { workers, .. } => {
            let sink = open_sink(&search, false)?;
            let progress = SearchProgress::start("enumerating");
            let summary =
                runner::run_cluster(&params, &config, workers as usize, sink, Some(&progress))?;
            progress.print_summary("Search complete", &summary.stats);
            progress.print_master_summary(&summary.master);
        }
        Command::Master { listen, workers, .. } => {
            let progress = SearchProgress::start("distributing");
            let stats = runner::run_master(&params, &config, listen.as_str(), workers as usize)?;
            progress.print_master_summary(&stats);
        }
        Command::Worker { connect, .. } => {
            let sink = open_sink(&search, false)?;
            let progress = SearchProgress::start("enumerating");
            let stats =
                runner::run_worker(&params, &config, connect.as_str(), sink, Some(&progress))?;
            progress.print_summary("Worker finished", &stats);
        }
    }
    Ok(())
}

fn search_params(search: &SearchArgs) -> SearchParams {
    SearchParams {
        max_transitions: search.max_transitions,
        first_1rb: search.first_1rb,
        randomize: search.randomize,
        seed: search.seed,
        ..SearchParams::new(search.states, search.symbols)
    }
}

/// A resumed run appends to its earlier output instead of refusing it.
fn open_sink(search: &SearchArgs, resuming: bool) -> Result<Box<dyn RecordSink + Send>> {
    let Some(path) = search.outfile.as_deref() else {
        return Ok(Box::new(NullSink));
    };
    let sink = if resuming {
        JsonLinesSink::append(path)?
    } else {
        JsonLinesSink::create(path, search.force)?
    };
    info!(path = %path.display(), "writing records");
    Ok(Box::new(sink))
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("tnfsearch=debug,warn")
        } else {
            EnvFilter::new("tnfsearch=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
