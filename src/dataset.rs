//! Binary training sets derived from a labelled feature table.
//!
//! Rows with an unusable stage are dropped, the remaining stages are mapped
//! to a 0/1 target and a subset of feature columns is selected. Each row
//! keeps its subject code so that splits can be made per person.

use std::collections::BTreeSet;
use std::path::Path;

use csv::Writer;

use crate::error::{Error, Result};
use crate::identity::EpochId;
use crate::table::{LabelledFeatureTable, EPOCH_ID_COLUMN};
use crate::types::{Band, SleepStage};

/// How to turn stages into a binary target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    /// Stages whose rows are dropped.
    pub excluded: Vec<SleepStage>,
    /// Stage mapped to target 1; every other kept stage maps to 0.
    pub positive: SleepStage,
    /// Feature columns to keep. Empty selects the band powers of the first
    /// channel.
    pub features: Vec<String>,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            excluded: vec![SleepStage::NoLabel, SleepStage::Unscored, SleepStage::Movement],
            positive: SleepStage::Stage1,
            features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub id: EpochId,
    pub subject: u8,
    pub features: Vec<f64>,
    pub target: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub columns: Vec<String>,
    pub rows: Vec<TrainingRow>,
}

impl TrainingSet {
    pub fn from_labelled(table: &LabelledFeatureTable, spec: &TargetSpec) -> Result<Self> {
        let features = table.features();
        let columns = if spec.features.is_empty() {
            let prefix = features
                .prefixes()
                .first()
                .ok_or_else(|| Error::Config("feature table has no channels".to_string()))?;
            Band::ALL.iter().map(|b| format!("{}_{}", prefix, b)).collect()
        } else {
            spec.features.clone()
        };

        let available = features.feature_columns();
        let positions = columns
            .iter()
            .map(|c| {
                available
                    .iter()
                    .position(|a| a == c)
                    .ok_or_else(|| Error::Config(format!("unknown feature column '{}'", c)))
            })
            .collect::<Result<Vec<usize>>>()?;

        let rows = table
            .iter()
            .filter(|(_, _, stage)| !spec.excluded.contains(stage))
            .map(|(id, row, stage)| {
                let values: Vec<f64> = row
                    .iter()
                    .flat_map(|f| f.powers().iter().chain(f.ratios().iter()).copied())
                    .collect();
                TrainingRow {
                    id: *id,
                    subject: id.subject(),
                    features: positions.iter().map(|&p| values[p]).collect(),
                    target: u8::from(*stage == spec.positive),
                }
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.rows.iter().filter(|r| r.target == 1).count()
    }

    pub fn subjects(&self) -> BTreeSet<u8> {
        self.rows.iter().map(|r| r.subject).collect()
    }

    /// Splits into (rest, held-out) with every row of `held_out` subjects
    /// in the second set.
    pub fn split_by_subject(&self, held_out: &[u8]) -> (TrainingSet, TrainingSet) {
        let (test, train): (Vec<_>, Vec<_>) = self
            .rows
            .iter()
            .cloned()
            .partition(|r| held_out.contains(&r.subject));
        (
            TrainingSet { columns: self.columns.clone(), rows: train },
            TrainingSet { columns: self.columns.clone(), rows: test },
        )
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = Writer::from_path(path)?;
        let mut header = vec![EPOCH_ID_COLUMN.to_string(), "person".to_string()];
        header.extend(self.columns.iter().cloned());
        header.push("target".to_string());
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.id.to_string(), format!("{:02}", row.subject)];
            record.extend(row.features.iter().map(|v| v.to_string()));
            record.push(row.target.to_string());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}
