use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "edfsleep",
    version,
    about = "Sleep-stage band power features from EDF recordings",
    long_about = "Extract per-epoch EEG band power features from Sleep-EDF style\n\
                  recordings and label them from their hypnogram files."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Extract features and labels from a corpus
    Run(RunArgs),
    /// Print the header, signals and annotations of an EDF file
    Inspect(InspectArgs),
    /// Write a synthetic corpus
    Synth(SynthArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Directories holding *-PSG.edf and *-Hypnogram.edf files
    #[arg(long = "data-dir", required = true, num_args = 1..)]
    pub data_dirs: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the feature table to this CSV file
    #[arg(long)]
    pub features_out: Option<PathBuf>,

    /// Write the labelled feature table to this CSV file
    #[arg(long)]
    pub labelled_out: Option<PathBuf>,

    /// Read the feature table from the configured CSV instead of recomputing
    #[arg(long)]
    pub load_features: bool,

    /// Read the labelled table from the configured CSV instead of joining
    #[arg(long)]
    pub load_labelled: bool,

    /// Abort on the first unreadable file
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    /// EDF or EDF+ file
    pub file: PathBuf,
}

#[derive(Args)]
pub struct SynthArgs {
    /// Output directory
    #[arg(long)]
    pub out: PathBuf,

    /// Number of subjects
    #[arg(long, default_value_t = 2)]
    pub subjects: u8,

    /// Scored epochs per recording
    #[arg(long, default_value_t = 120)]
    pub epochs: usize,

    /// Write telemetry (ST7...) instead of cassette (SC4...) names
    #[arg(long)]
    pub telemetry: bool,
}
