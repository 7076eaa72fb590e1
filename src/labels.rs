//! Label Generator: one stage per epoch from overlapping intervals.
//!
//! Resolution is a deliberate lossy simplification, independent of the
//! order of the intervals:
//!
//! * no overlapping interval → `N` (no label available)
//! * exactly one → that interval's stage
//! * two or more → `T` (transition epoch); the individual stages are dropped

use crate::annotations::{AnnotationInterval, Hypnogram};
use crate::error::{Error, Result};
use crate::identity::{EpochId, RecordingIdentity};
use crate::types::SleepStage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochLabel {
    pub id: EpochId,
    pub sleep_stage: SleepStage,
}

/// Longest span a hypnogram may score: one week.
pub const MAX_SCORED_SECONDS: f64 = 7.0 * 24.0 * 3600.0;

/// Number of whole epochs covered by the scored intervals:
/// `floor(max_end / epoch_seconds)`.
///
/// # Errors
///
/// * `Error::InvalidFormat` - an interval ends after [`MAX_SCORED_SECONDS`]
pub fn scored_epoch_count(intervals: &[AnnotationInterval], epoch_seconds: f64) -> Result<usize> {
    let end = intervals.iter().map(|i| i.end()).fold(0.0, f64::max);
    if !(end <= MAX_SCORED_SECONDS) {
        return Err(Error::InvalidFormat(format!(
            "Hypnogram scores until {} s, limit is {} s",
            end, MAX_SCORED_SECONDS
        )));
    }
    Ok((end / epoch_seconds).floor().max(0.0) as usize)
}

/// Resolves the stage of the epoch `[start, end)`.
pub fn resolve_stage(intervals: &[AnnotationInterval], start: f64, end: f64) -> SleepStage {
    let mut overlapping = intervals.iter().filter(|i| i.overlaps(start, end));
    match (overlapping.next(), overlapping.next()) {
        (None, _) => SleepStage::NoLabel,
        (Some(only), None) => only.sleep_stage.clone(),
        (Some(_), Some(_)) => SleepStage::Transition,
    }
}

/// Labels epochs `0..epoch_count` of `identity`.
pub fn label_epochs(
    identity: RecordingIdentity,
    intervals: &[AnnotationInterval],
    epoch_count: usize,
    epoch_seconds: f64,
) -> Vec<EpochLabel> {
    (0..epoch_count)
        .map(|epoch| {
            let start = epoch as f64 * epoch_seconds;
            let end = (epoch + 1) as f64 * epoch_seconds;
            EpochLabel {
                id: identity.epoch_id(epoch),
                sleep_stage: resolve_stage(intervals, start, end),
            }
        })
        .collect()
}

/// Labels every epoch a hypnogram scores.
pub fn label_hypnogram(hypnogram: &Hypnogram, epoch_seconds: f64) -> Result<Vec<EpochLabel>> {
    let count = scored_epoch_count(&hypnogram.intervals, epoch_seconds)?;
    Ok(label_epochs(hypnogram.identity, &hypnogram.intervals, count, epoch_seconds))
}
