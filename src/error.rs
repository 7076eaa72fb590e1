use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Signal index {0} out of range")]
    InvalidSignalIndex(usize),

    #[error("Invalid header size")]
    InvalidHeader,

    #[error("Invalid number of signals: {0}")]
    InvalidSignalCount(i32),

    #[error("Physical min equals physical max")]
    PhysicalMinEqualsMax,

    #[error("Digital min equals digital max")]
    DigitalMinEqualsMax,

    #[error("Channel '{label}' not found in {file}")]
    MissingChannel { file: String, label: String },

    #[error("Selected channels in {file} disagree on sampling rate: {rates:?}")]
    SamplingRateMismatch { file: String, rates: Vec<f64> },

    #[error("Expected data file is missing: {}", .0.display())]
    MissingData(PathBuf),

    #[error("Recording {identity} already read from {}", .first.display())]
    DuplicateIdentity { identity: String, first: PathBuf },

    #[error("Zero total spectral power in epoch {epoch}, channel {channel}")]
    DegenerateSignal { epoch: String, channel: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
