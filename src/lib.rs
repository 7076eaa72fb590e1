//! # edfsleep
//!
//! Sleep-stage feature extraction for EEG recordings stored as EDF/EDF+
//! files in the Sleep-EDF layout.
//!
//! Every recording is cut into 30 second epochs. For each epoch and each
//! configured EEG channel the power of six frequency bands (subdelta,
//! delta, theta, alpha, beta, gamma) and their share of the total power
//! are computed. Separately, the hypnogram sidecar of each recording is
//! turned into one sleep-stage label per epoch, and the labels are joined
//! onto the features by epoch identifier (`C-00-1-0042`).
//!
//! ## Quick Start
//!
//! ### Running the pipeline
//!
//! ```rust
//! use edfsleep::synth::{write_corpus, SynthSpec};
//! use edfsleep::{Pipeline, PipelineConfig, Result, SleepStage};
//!
//! fn main() -> Result<()> {
//!     let dir = tempfile::tempdir()?;
//!     let manifest = write_corpus(dir.path(), &SynthSpec::default())?;
//!
//!     let pipeline = Pipeline::new(PipelineConfig::default())?;
//!     let output = pipeline.run(&manifest)?;
//!
//!     println!("{} epochs", output.features.len());
//!     for (stage, count) in output.labelled.stage_counts() {
//!         println!("{}: {}", stage, count);
//!     }
//!     assert!(output.labelled.stage_counts().contains_key(&SleepStage::Wake));
//!     Ok(())
//! }
//! ```
//!
//! ### Reading an EDF file
//!
//! ```rust
//! use edfsleep::synth::{write_corpus, SynthSpec};
//! use edfsleep::{EdfReader, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir()?;
//!     # let manifest = write_corpus(dir.path(), &SynthSpec::default())?;
//!     # let path = &manifest.entries()[0].recording;
//!     let mut reader = EdfReader::open(path)?;
//!
//!     let header = reader.header();
//!     println!("Number of signals: {}", header.signals.len());
//!     println!("File duration: {:.2} seconds", header.duration_seconds());
//!
//!     let index = header.signal_index("EEG Fpz-Cz").unwrap();
//!     let samples = reader.read_physical_samples(index, 1000)?;
//!     assert_eq!(samples.len(), 1000);
//!     Ok(())
//! }
//! ```
//!
//! ## Working with Signal Data
//!
//! ### Physical vs Digital Values
//!
//! EDF stores data as 16-bit integers but represents real-world measurements.
//! Conversion between digital and physical values uses the linear
//! calibration of each signal:
//!
//! ```rust
//! use edfsleep::SignalParam;
//!
//! let signal = SignalParam {
//!     label: "EEG Fpz-Cz".to_string(),
//!     samples_in_file: 0,
//!     physical_max: 100.0,   // +100 µV
//!     physical_min: -100.0,  // -100 µV
//!     digital_max: 32767,
//!     digital_min: -32768,
//!     samples_per_record: 3000,
//!     physical_dimension: "uV".to_string(),
//!     prefilter: "".to_string(),
//!     transducer: "".to_string(),
//! };
//!
//! let physical_value = signal.to_physical(16384);
//! assert!((physical_value - 50.0).abs() < 0.1);
//!
//! let digital_output = signal.to_digital(25.0);
//! assert!((digital_output - 8192).abs() <= 1);
//! ```

pub mod error;
pub mod types;
pub mod utils;
pub mod reader;
pub mod writer;

pub mod identity;
pub mod config;
pub mod loader;
pub mod framer;
pub mod spectral;
pub mod annotations;
pub mod labels;
pub mod table;
pub mod dataset;
pub mod pipeline;
pub mod synth;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use types::{Annotation, Band, EdfHeader, FileType, PowerBandFeatures, SignalParam, SleepStage};
pub use reader::EdfReader;
pub use writer::EdfWriter;
pub use identity::{EpochId, RecordingIdentity, RecordingKind};
pub use config::{ChannelSpec, DegeneratePolicy, PipelineConfig};
pub use table::{FeatureTable, LabelSet, LabelledFeatureTable};
pub use dataset::{TargetSpec, TrainingSet};
pub use pipeline::{CorpusEntry, CorpusManifest, CorpusSource, EdfCorpus, Pipeline, PipelineOutput};

// Important constants
pub const EDFLIB_TIME_DIMENSION: i64 = 10_000_000; // 100 nanoseconds unit
pub const EDFLIB_MAXSIGNALS: usize = 4096;
pub const EDFLIB_MAX_ANNOTATION_LEN: usize = 512;

/// Library version
///
/// ```rust
/// let version = edfsleep::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
