//! Feature and labelled-feature tables.
//!
//! Tables are keyed and ordered by [`EpochId`]. Each row holds one
//! [`PowerBandFeatures`] per channel; on disk a row is flattened into
//! `{prefix}_{band}` and `{prefix}_{band}_ratio` columns after the
//! `epochId` column.

use std::collections::BTreeMap;
use std::path::Path;

use csv::{Reader, StringRecord, Writer};

use crate::error::{Error, Result};
use crate::identity::EpochId;
use crate::labels::EpochLabel;
use crate::types::{Band, PowerBandFeatures, SleepStage};

pub const EPOCH_ID_COLUMN: &str = "epochId";
pub const SLEEP_STAGE_COLUMN: &str = "sleep_stage";

/// Labels keyed by epoch.
pub type LabelSet = BTreeMap<EpochId, SleepStage>;

pub fn label_set<I: IntoIterator<Item = EpochLabel>>(labels: I) -> LabelSet {
    labels.into_iter().map(|l| (l.id, l.sleep_stage)).collect()
}

/// Wide feature table, one row per epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    prefixes: Vec<String>,
    rows: BTreeMap<EpochId, Vec<PowerBandFeatures>>,
}

impl FeatureTable {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self {
            prefixes,
            rows: BTreeMap::new(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Inserts or replaces a row. `features` must hold one entry per prefix.
    pub fn insert(&mut self, id: EpochId, features: Vec<PowerBandFeatures>) -> Result<()> {
        if features.len() != self.prefixes.len() {
            return Err(Error::InvalidFormat(format!(
                "{}: {} channel features for {} column groups",
                id,
                features.len(),
                self.prefixes.len()
            )));
        }
        self.rows.insert(id, features);
        Ok(())
    }

    /// Moves every row of `other` into this table.
    pub fn append(&mut self, other: FeatureTable) -> Result<()> {
        if other.prefixes != self.prefixes {
            return Err(Error::InvalidFormat(format!(
                "Cannot merge tables with columns {:?} and {:?}",
                self.prefixes, other.prefixes
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    pub fn get(&self, id: &EpochId) -> Option<&[PowerBandFeatures]> {
        self.rows.get(id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EpochId, &[PowerBandFeatures])> {
        self.rows.iter().map(|(id, f)| (id, f.as_slice()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &EpochId> {
        self.rows.keys()
    }

    /// Column names, `epochId` first.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![EPOCH_ID_COLUMN.to_string()];
        columns.extend(self.feature_columns());
        columns
    }

    /// Feature column names without the key column.
    pub fn feature_columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.prefixes.len() * 12);
        for prefix in &self.prefixes {
            columns.extend(Band::ALL.iter().map(|b| format!("{}_{}", prefix, b)));
            columns.extend(Band::ALL.iter().map(|b| format!("{}_{}_ratio", prefix, b)));
        }
        columns
    }

    /// Value of a named feature column for one row.
    pub fn value(&self, id: &EpochId, column: &str) -> Option<f64> {
        let position = self.feature_columns().iter().position(|c| c == column)?;
        let features = self.rows.get(id)?;
        flatten(features).get(position).copied()
    }

    /// Left join with `labels`: every row keeps its features, rows without
    /// a label get `N`. Labels without a feature row are dropped.
    pub fn join(self, labels: &LabelSet) -> LabelledFeatureTable {
        let stages = self
            .rows
            .keys()
            .map(|id| (*id, labels.get(id).cloned().unwrap_or(SleepStage::NoLabel)))
            .collect();
        LabelledFeatureTable { features: self, stages }
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = Writer::from_path(path)?;
        writer.write_record(self.columns())?;
        for (id, features) in &self.rows {
            writer.write_record(row_record(id, features))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let (prefixes, rows) = read_rows(path, false)?;
        let mut table = FeatureTable::new(prefixes);
        for (id, features, _) in rows {
            table.insert(id, features)?;
        }
        Ok(table)
    }
}

/// Feature table joined with one stage per row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledFeatureTable {
    features: FeatureTable,
    stages: BTreeMap<EpochId, SleepStage>,
}

impl LabelledFeatureTable {
    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn stage(&self, id: &EpochId) -> Option<&SleepStage> {
        self.stages.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EpochId, &[PowerBandFeatures], &SleepStage)> {
        self.features
            .iter()
            .filter_map(|(id, f)| self.stages.get(id).map(|s| (id, f, s)))
    }

    pub fn stage_counts(&self) -> BTreeMap<SleepStage, usize> {
        let mut counts = BTreeMap::new();
        for stage in self.stages.values() {
            *counts.entry(stage.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = Writer::from_path(path)?;
        let mut header = self.features.columns();
        header.push(SLEEP_STAGE_COLUMN.to_string());
        writer.write_record(header)?;

        for (id, features, stage) in self.iter() {
            let mut record = row_record(id, features);
            record.push(stage.code().to_string());
            writer.write_record(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let (prefixes, rows) = read_rows(path, true)?;
        let mut features = FeatureTable::new(prefixes);
        let mut stages = BTreeMap::new();
        for (id, row, stage) in rows {
            features.insert(id, row)?;
            stages.insert(id, stage.unwrap_or(SleepStage::NoLabel));
        }
        Ok(LabelledFeatureTable { features, stages })
    }
}

fn flatten(features: &[PowerBandFeatures]) -> Vec<f64> {
    features
        .iter()
        .flat_map(|f| f.powers().iter().chain(f.ratios().iter()).copied())
        .collect()
}

fn row_record(id: &EpochId, features: &[PowerBandFeatures]) -> Vec<String> {
    let mut record = vec![id.to_string()];
    record.extend(flatten(features).iter().map(|v| v.to_string()));
    record
}

type Row = (EpochId, Vec<PowerBandFeatures>, Option<SleepStage>);

/// 读取CSV并校验列名，返回通道前缀和所有行
fn read_rows(path: &Path, labelled: bool) -> Result<(Vec<String>, Vec<Row>)> {
    if !path.exists() {
        return Err(Error::MissingData(path.to_path_buf()));
    }

    let mut reader = Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let prefixes = parse_header(&headers, labelled)
        .map_err(|msg| Error::InvalidFormat(format!("{}: {}", path.display(), msg)))?;
    let width = 1 + prefixes.len() * 12 + usize::from(labelled);

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != width {
            return Err(Error::InvalidFormat(format!(
                "{}: row {} has {} fields, expected {}",
                path.display(),
                line + 1,
                record.len(),
                width
            )));
        }

        let id: EpochId = record[0].parse()?;
        let mut features = Vec::with_capacity(prefixes.len());
        for group in 0..prefixes.len() {
            let base = 1 + group * 12;
            let mut values = [0.0; 12];
            for (offset, value) in values.iter_mut().enumerate() {
                let field = &record[base + offset];
                *value = field.parse().map_err(|_| {
                    Error::InvalidFormat(format!("{}: '{}' is not a number", path.display(), field))
                })?;
            }
            let mut powers = [0.0; 6];
            let mut ratios = [0.0; 6];
            powers.copy_from_slice(&values[..6]);
            ratios.copy_from_slice(&values[6..]);
            features.push(PowerBandFeatures::new(powers, ratios));
        }

        let stage = labelled.then(|| SleepStage::from_code(&record[width - 1]));
        rows.push((id, features, stage));
    }

    Ok((prefixes, rows))
}

fn parse_header(headers: &StringRecord, labelled: bool) -> std::result::Result<Vec<String>, String> {
    let columns: Vec<&str> = headers.iter().collect();
    if columns.first() != Some(&EPOCH_ID_COLUMN) {
        return Err(format!("first column must be '{}'", EPOCH_ID_COLUMN));
    }

    let mut feature_columns = &columns[1..];
    if labelled {
        match feature_columns.split_last() {
            Some((&last, rest)) if last == SLEEP_STAGE_COLUMN => feature_columns = rest,
            _ => return Err(format!("last column must be '{}'", SLEEP_STAGE_COLUMN)),
        }
    }

    if feature_columns.len() % 12 != 0 {
        return Err(format!("{} feature columns is not a whole number of channels", feature_columns.len()));
    }

    let mut prefixes = Vec::new();
    for group in feature_columns.chunks(12) {
        let prefix = group[0]
            .strip_suffix("_subdelta")
            .ok_or_else(|| format!("unexpected column '{}'", group[0]))?;
        let expected = FeatureTable::new(vec![prefix.to_string()]).feature_columns();
        if group.iter().zip(&expected).any(|(actual, wanted)| actual != wanted) {
            return Err(format!("columns for '{}' are out of order", prefix));
        }
        prefixes.push(prefix.to_string());
    }

    Ok(prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{RecordingIdentity, RecordingKind};

    fn features(seed: f64) -> PowerBandFeatures {
        let powers = [seed, seed * 2.0, seed * 3.0, 0.5, 0.25, 0.125];
        let total: f64 = powers.iter().sum();
        PowerBandFeatures::new(powers, powers.map(|p| p / total))
    }

    fn table() -> FeatureTable {
        let id = RecordingIdentity::new(RecordingKind::Cassette, 1, 2);
        let mut table = FeatureTable::new(vec!["anterior".to_string(), "posterior".to_string()]);
        for epoch in 0..3 {
            let seed = epoch as f64 + 0.1;
            table.insert(id.epoch_id(epoch), vec![features(seed), features(seed * 7.0)]).unwrap();
        }
        table
    }

    #[test]
    fn test_columns() {
        let columns = table().columns();
        assert_eq!(columns.len(), 25);
        assert_eq!(columns[0], "epochId");
        assert_eq!(columns[1], "anterior_subdelta");
        assert_eq!(columns[6], "anterior_gamma");
        assert_eq!(columns[7], "anterior_subdelta_ratio");
        assert_eq!(columns[13], "posterior_subdelta");
    }

    #[test]
    fn test_insert_checks_width() {
        let mut table = table();
        let id = RecordingIdentity::new(RecordingKind::Telemetry, 1, 1).epoch_id(0);
        assert!(table.insert(id, vec![features(1.0)]).is_err());
    }

    #[test]
    fn test_left_join_fills_no_label() {
        let table = table();
        let id = RecordingIdentity::new(RecordingKind::Cassette, 1, 2);
        let mut labels = LabelSet::new();
        labels.insert(id.epoch_id(0), SleepStage::Wake);
        labels.insert(id.epoch_id(1), SleepStage::Stage2);
        labels.insert(id.epoch_id(40), SleepStage::Stage3);

        let labelled = table.join(&labels);
        assert_eq!(labelled.len(), 3);
        assert_eq!(labelled.stage(&id.epoch_id(0)), Some(&SleepStage::Wake));
        assert_eq!(labelled.stage(&id.epoch_id(2)), Some(&SleepStage::NoLabel));
        assert_eq!(labelled.stage(&id.epoch_id(40)), None);
        assert_eq!(labelled.stage_counts()[&SleepStage::NoLabel], 1);
    }

    #[test]
    fn test_value_lookup() {
        let table = table();
        let id = RecordingIdentity::new(RecordingKind::Cassette, 1, 2).epoch_id(1);
        assert!((table.value(&id, "anterior_delta").unwrap() - 2.2).abs() < 1e-12);
        assert_eq!(table.value(&id, "posterior_gamma"), Some(0.125));
        assert_eq!(table.value(&id, "frontal_delta"), None);
    }

    #[test]
    fn test_csv_persistence_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let table = table();

        let path = dir.path().join("features.csv");
        table.write_csv(&path).unwrap();
        assert_eq!(FeatureTable::read_csv(&path).unwrap(), table);

        let mut labels = LabelSet::new();
        labels.insert(RecordingIdentity::new(RecordingKind::Cassette, 1, 2).epoch_id(1), SleepStage::Transition);
        let labelled = table.join(&labels);
        let labelled_path = dir.path().join("labelled.csv");
        labelled.write_csv(&labelled_path).unwrap();
        assert_eq!(LabelledFeatureTable::read_csv(&labelled_path).unwrap(), labelled);

        // 不带标签列的文件不能当作带标签的表读取
        assert!(LabelledFeatureTable::read_csv(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_missing_data() {
        let dir = tempfile::tempdir().unwrap();
        match FeatureTable::read_csv(&dir.path().join("absent.csv")) {
            Err(Error::MissingData(path)) => assert!(path.ends_with("absent.csv")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
