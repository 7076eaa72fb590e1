use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::EDFLIB_TIME_DIMENSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 普通EDF（无注释通道，例如Sleep-EDF的PSG文件）
    Edf,
    /// EDF+C 连续记录
    EdfPlusContinuous,
    /// EDF+D 非连续记录
    EdfPlusDiscontinuous,
}

impl FileType {
    pub fn is_edfplus(&self) -> bool {
        !matches!(self, FileType::Edf)
    }
}

#[derive(Debug, Clone)]
pub struct SignalParam {
    pub label: String,
    pub samples_in_file: i64,
    pub physical_max: f64,
    pub physical_min: f64,
    pub digital_max: i32,
    pub digital_min: i32,
    pub samples_per_record: i32,
    pub physical_dimension: String,
    pub prefilter: String,
    pub transducer: String,
}

impl SignalParam {
    /// 计算物理值转换参数
    pub fn bit_value(&self) -> f64 {
        (self.physical_max - self.physical_min) /
        (self.digital_max - self.digital_min) as f64
    }

    /// 计算偏移量
    pub fn offset(&self) -> f64 {
        self.physical_max / self.bit_value() - self.digital_max as f64
    }

    /// 将数字值转换为物理值
    pub fn to_physical(&self, digital_value: i32) -> f64 {
        self.bit_value() * (self.offset() + digital_value as f64)
    }

    /// 将物理值转换为数字值
    pub fn to_digital(&self, physical_value: f64) -> i32 {
        let digital = (physical_value / self.bit_value()) - self.offset();
        digital.round() as i32
    }

    /// Sampling rate in Hz for a data record of `datarecord_duration`
    /// (100 ns units). Returns `None` for zero-length records.
    pub fn sampling_rate(&self, datarecord_duration: i64) -> Option<f64> {
        if datarecord_duration <= 0 {
            return None;
        }
        let seconds = datarecord_duration as f64 / EDFLIB_TIME_DIMENSION as f64;
        Some(self.samples_per_record as f64 / seconds)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub onset: i64,           // 开始时间（100纳秒为单位）
    pub duration: i64,        // 持续时间（100纳秒为单位，-1表示未知）
    pub description: String,  // UTF-8描述
}

impl Annotation {
    pub fn onset_seconds(&self) -> f64 {
        self.onset as f64 / EDFLIB_TIME_DIMENSION as f64
    }

    /// Duration in seconds; unknown durations count as instantaneous.
    pub fn duration_seconds(&self) -> f64 {
        if self.duration < 0 {
            0.0
        } else {
            self.duration as f64 / EDFLIB_TIME_DIMENSION as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub file_type: FileType,
    /// 仅包含普通信号，注释通道不在此列表中
    pub signals: Vec<SignalParam>,
    pub file_duration: i64,           // 文件持续时间（100纳秒为单位）
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub datarecords_in_file: i64,
    pub datarecord_duration: i64,     // 数据记录持续时间（100纳秒为单位）
    pub annotations_in_file: i64,
    pub patient: String,
    pub recording: String,
}

impl EdfHeader {
    pub fn start_datetime(&self) -> NaiveDateTime {
        self.start_date.and_time(self.start_time)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.file_duration as f64 / EDFLIB_TIME_DIMENSION as f64
    }

    /// Index of the ordinary signal whose label matches `label` exactly
    /// (after trimming).
    pub fn signal_index(&self, label: &str) -> Option<usize> {
        let label = label.trim();
        self.signals.iter().position(|s| s.label == label)
    }

    pub fn sampling_rate(&self, signal: usize) -> Option<f64> {
        self.signals
            .get(signal)
            .and_then(|s| s.sampling_rate(self.datarecord_duration))
    }
}

/// Spectral band used for power features. Ranges are half-open
/// `[low, high)`; gamma has no upper edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Band {
    Subdelta,
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl Band {
    pub const ALL: [Band; 6] = [
        Band::Subdelta,
        Band::Delta,
        Band::Theta,
        Band::Alpha,
        Band::Beta,
        Band::Gamma,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Band::Subdelta => "subdelta",
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
        }
    }

    pub fn range_hz(&self) -> (f64, f64) {
        match self {
            Band::Subdelta => (0.0, 0.5),
            Band::Delta => (0.5, 4.0),
            Band::Theta => (4.0, 8.0),
            Band::Alpha => (8.0, 12.0),
            Band::Beta => (12.0, 30.0),
            Band::Gamma => (30.0, f64::INFINITY),
        }
    }

    pub fn contains(&self, frequency: f64) -> bool {
        let (low, high) = self.range_hz();
        frequency >= low && frequency < high
    }

    /// Band owning `frequency`. Negative frequencies never occur in a
    /// one-sided spectrum and fold into subdelta.
    pub fn for_frequency(frequency: f64) -> Band {
        Band::ALL
            .iter()
            .rev()
            .copied()
            .find(|band| frequency >= band.range_hz().0)
            .unwrap_or(Band::Subdelta)
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Band powers and power ratios of one channel over one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerBandFeatures {
    powers: [f64; 6],
    ratios: [f64; 6],
}

impl PowerBandFeatures {
    pub fn new(powers: [f64; 6], ratios: [f64; 6]) -> Self {
        Self { powers, ratios }
    }

    pub fn power(&self, band: Band) -> f64 {
        self.powers[band.index()]
    }

    pub fn ratio(&self, band: Band) -> f64 {
        self.ratios[band.index()]
    }

    pub fn powers(&self) -> &[f64; 6] {
        &self.powers
    }

    pub fn ratios(&self) -> &[f64; 6] {
        &self.ratios
    }

    pub fn total_power(&self) -> f64 {
        self.powers.iter().sum()
    }

    pub fn is_degenerate(&self) -> bool {
        self.total_power() == 0.0
    }

    pub fn dominant_band(&self) -> Band {
        Band::ALL
            .iter()
            .copied()
            .fold(Band::Subdelta, |best, band| {
                if self.ratio(band) > self.ratio(best) { band } else { best }
            })
    }
}

/// Categorical sleep stage code. `NoLabel` and `Transition` are the
/// sentinels produced by epoch labelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SleepStage {
    Wake,
    Stage1,
    Stage2,
    Stage3,
    Stage4,
    Rem,
    Unscored,
    Movement,
    NoLabel,
    Transition,
    Other(String),
}

impl SleepStage {
    pub fn code(&self) -> &str {
        match self {
            SleepStage::Wake => "W",
            SleepStage::Stage1 => "1",
            SleepStage::Stage2 => "2",
            SleepStage::Stage3 => "3",
            SleepStage::Stage4 => "4",
            SleepStage::Rem => "R",
            SleepStage::Unscored => "?",
            SleepStage::Movement => "M",
            SleepStage::NoLabel => "N",
            SleepStage::Transition => "T",
            SleepStage::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "W" => SleepStage::Wake,
            "1" => SleepStage::Stage1,
            "2" => SleepStage::Stage2,
            "3" => SleepStage::Stage3,
            "4" => SleepStage::Stage4,
            "R" => SleepStage::Rem,
            "?" => SleepStage::Unscored,
            "M" => SleepStage::Movement,
            "N" => SleepStage::NoLabel,
            "T" => SleepStage::Transition,
            other => SleepStage::Other(other.to_string()),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, SleepStage::NoLabel | SleepStage::Transition)
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
