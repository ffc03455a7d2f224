//! Command-line interface built on clap.
//!
//! Four subcommands share one set of search options: [`Command::Run`] for a
//! single process, [`Command::Cluster`] for worker threads, and
//! [`Command::Master`] / [`Command::Worker`] for one process per node.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Exhaustive Busy Beaver search in tree normal form.
#[derive(Debug, Parser)]
#[command(name = "tnfsearch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Number of states.
    #[arg(long, default_value_t = 2)]
    pub states: usize,

    /// Number of symbols, blank included.
    #[arg(long, default_value_t = 2)]
    pub symbols: usize,

    /// Defined cells allowed before the next one is forced to halt.
    #[arg(long)]
    pub max_transitions: Option<usize>,

    /// Start from `A0 -> 1RB` instead of the empty table.
    #[arg(long = "first-1rb")]
    pub first_1rb: bool,

    /// Shuffle children before pushing them.
    #[arg(long)]
    pub randomize: bool,

    /// Seed for `--randomize`.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// JSON-lines file receiving one record per classified machine.
    #[arg(long)]
    pub outfile: Option<PathBuf>,

    /// Overwrite an existing outfile.
    #[arg(long)]
    pub force: bool,

    /// Config file (default: ./tnfsearch.toml when present).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides `step_limit` from the config file.
    #[arg(long)]
    pub step_limit: Option<u64>,

    /// Log at debug level.
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enumerate in this process.
    Run {
        #[command(flatten)]
        search: SearchArgs,

        /// Use a FIFO queue instead of the default stack.
        #[arg(long)]
        breadth_first: bool,

        /// Stop after this many machines and record the rest as not run.
        #[arg(long)]
        num_enum: Option<u64>,

        /// Checkpoint every this many machines.
        #[arg(long, requires = "checkpoint")]
        save_freq: Option<u64>,

        /// Checkpoint file; the previous one is kept as `<file>.bak`.
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Resume from this checkpoint instead of the root.
        #[arg(long)]
        infile: Option<PathBuf>,
    },

    /// Master plus worker threads in this process.
    Cluster {
        #[command(flatten)]
        search: SearchArgs,

        #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u64).range(1..))]
        workers: u64,
    },

    /// Distribute work to `--workers` TCP workers.
    Master {
        #[command(flatten)]
        search: SearchArgs,

        /// Address to listen on, e.g. 0.0.0.0:7878.
        #[arg(long)]
        listen: String,

        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        workers: u64,
    },

    /// Enumerate jobs handed out by a master.
    Worker {
        #[command(flatten)]
        search: SearchArgs,

        /// Master address, e.g. 10.0.0.1:7878.
        #[arg(long)]
        connect: String,
    },
}

impl Command {
    pub fn search(&self) -> &SearchArgs {
        match self {
            Command::Run { search, .. }
            | Command::Cluster { search, .. }
            | Command::Master { search, .. }
            | Command::Worker { search, .. } => search,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from([
            "tnfsearch",
            "run",
            "--states",
            "3",
            "--num-enum",
            "100",
            "--checkpoint",
            "search.ckpt",
            "--save-freq",
            "50",
        ]);
        match cli.command {
            Command::Run {
                search,
                num_enum,
                save_freq,
                checkpoint,
                breadth_first,
                infile,
            } => {
                assert_eq!(search.states, 3);
                assert_eq!(search.symbols, 2);
                assert_eq!(num_enum, Some(100));
                assert_eq!(save_freq, Some(50));
                assert_eq!(checkpoint, Some(PathBuf::from("search.ckpt")));
                assert!(!breadth_first);
                assert!(infile.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_shared_flags() {
        let cli = Cli::parse_from([
            "tnfsearch",
            "cluster",
            "--workers",
            "3",
            "--first-1rb",
            "--randomize",
            "--seed",
            "9",
            "--outfile",
            "out.jsonl",
            "--force",
            "-v",
        ]);
        let search = cli.command.search();
        assert!(search.first_1rb);
        assert!(search.randomize);
        assert_eq!(search.seed, 9);
        assert!(search.force);
        assert!(search.verbose);
        assert!(matches!(cli.command, Command::Cluster { workers: 3, .. }));
    }

    #[test]
    fn cli_parses_master_and_worker() {
        let cli = Cli::parse_from([
            "tnfsearch",
            "master",
            "--listen",
            "0.0.0.0:7878",
            "--workers",
            "8",
        ]);
        assert!(matches!(
            cli.command,
            Command::Master { workers: 8, ref listen, .. } if listen == "0.0.0.0:7878"
        ));
        let cli = Cli::parse_from(["tnfsearch", "worker", "--connect", "10.0.0.1:7878"]);
        assert!(matches!(
            cli.command,
            Command::Worker { ref connect, .. } if connect == "10.0.0.1:7878"
        ));
    }

    #[test]
    fn save_freq_needs_a_checkpoint() {
        assert!(Cli::try_parse_from(["tnfsearch", "run", "--save-freq", "10"]).is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(Cli::try_parse_from(["tnfsearch", "cluster", "--workers", "0"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
