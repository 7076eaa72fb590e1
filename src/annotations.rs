//! Annotation Extractor: hypnogram sidecar files to stage intervals.

use std::path::Path;

use crate::error::Result;
use crate::identity::RecordingIdentity;
use crate::reader::EdfReader;
use crate::types::{Annotation, SleepStage};

/// A scored interval `[onset, onset + duration)` in seconds from the
/// recording start.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationInterval {
    pub onset: f64,
    pub duration: f64,
    pub sleep_stage: SleepStage,
}

impl AnnotationInterval {
    pub fn new(onset: f64, duration: f64, sleep_stage: SleepStage) -> Self {
        Self { onset, duration, sleep_stage }
    }

    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }

    /// Strict overlap with `[start, end)`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.onset < end && self.end() > start
    }
}

/// Scored intervals of one recording.
#[derive(Debug, Clone)]
pub struct Hypnogram {
    pub identity: RecordingIdentity,
    pub intervals: Vec<AnnotationInterval>,
}

/// Maps a raw annotation description to a stage code: `"Movement time"`
/// becomes `M`, anything else keeps its last whitespace-separated token
/// (`"Sleep stage 2"` → `2`, `"Sleep stage ?"` → `?`).
pub fn normalize_stage(description: &str) -> SleepStage {
    let description = description.trim();
    if description == "Movement time" {
        return SleepStage::Movement;
    }
    SleepStage::from_code(description.split_whitespace().last().unwrap_or(""))
}

impl Hypnogram {
    pub fn from_annotations(identity: RecordingIdentity, annotations: &[Annotation]) -> Self {
        let intervals = annotations
            .iter()
            .map(|a| AnnotationInterval {
                onset: a.onset_seconds(),
                duration: a.duration_seconds(),
                sleep_stage: normalize_stage(&a.description),
            })
            .collect();

        Self { identity, intervals }
    }

    /// End of the latest interval, or 0 without intervals.
    pub fn scored_until(&self) -> f64 {
        self.intervals.iter().map(|i| i.end()).fold(0.0, f64::max)
    }
}

/// Reads an annotation-only EDF+ file. The identity comes from its file
/// name, parsed the same way as for recordings.
pub fn extract_annotations(path: &Path) -> Result<Hypnogram> {
    let identity = RecordingIdentity::from_path(path)?;
    let reader = EdfReader::open(path)?;
    Ok(Hypnogram::from_annotations(identity, reader.annotations()))
}
