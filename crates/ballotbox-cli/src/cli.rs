use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// CLI surface definition. A thin shell over the ballot store.
#[derive(Parser, Debug)]
#[command(
    name = "ballotbox",
    about = "Register voters, cast sealed ballots, and tally the results",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register a voter. Blank fields are reported back, not guessed.
    Register {
        #[arg(long)]
        voter_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Date of birth as YYYY-MM-DD.
        #[arg(long)]
        dob: Option<NaiveDate>,
        /// Photo (jpg or png) copied into the data directory.
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Cast a ballot.
    Vote {
        #[arg(long)]
        voter_id: String,
        #[arg(long)]
        candidate: String,
    },
    /// Show whether a voter id has already voted.
    Status {
        #[arg(long)]
        voter_id: String,
    },
    /// Decrypt all ballots and print the count per candidate.
    Tally,
    /// List the configured candidates.
    Candidates,
    /// List registered voters.
    Voters,
    /// Check key access, ballot sealing and collection readability.
    Health,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
