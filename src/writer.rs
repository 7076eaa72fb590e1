use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::error::{Error, Result};
use crate::reader::ANNOTATION_LABEL;
use crate::types::{Annotation, SignalParam};
use crate::utils::{format_edf_time, pad_field};
use crate::EDFLIB_TIME_DIMENSION;

/// 默认每条记录注释通道的字节数（与edflib一致）
const EDFLIB_ANNOTATION_BYTES: usize = 120;

/// Sequential writer for EDF and EDF+ files.
///
/// Data is written one data record at a time with [`EdfWriter::write_samples`].
/// In EDF+ mode every record also carries one `EDF Annotations` channel
/// holding the timekeeping TAL plus every annotation whose onset falls in
/// that record; annotations must therefore be added before the record that
/// covers their onset is written. Plain EDF mode (see
/// [`EdfWriter::set_edf_plus`]) writes no annotation channel at all.
///
/// A writer with no ordinary signals produces an annotation-only EDF+ file,
/// which is how hypnograms are stored.
///
/// # Examples
///
/// ```rust,no_run
/// use edfsleep::{EdfWriter, SignalParam};
///
/// let mut writer = EdfWriter::create("SC4001EC-Hypnogram.edf")?;
/// writer.set_datarecord_duration(30.0)?;
/// writer.add_annotation(0.0, Some(60.0), "Sleep stage W")?;
/// writer.add_annotation(60.0, Some(30.0), "Sleep stage 1")?;
/// for _ in 0..3 {
///     writer.write_samples(&[])?;
/// }
/// writer.finalize()?;
/// # Ok::<(), edfsleep::Error>(())
/// ```
pub struct EdfWriter {
    file: BufWriter<File>,
    signals: Vec<SignalParam>,
    start_date: NaiveDate,
    start_time: NaiveTime,
    datarecord_duration: i64,
    records_written: usize,
    header_written: bool,
    edf_plus: bool,
    annotation_bytes: usize,

    patient_code: String,
    sex: String,
    birthdate: String,
    patient_name: String,
    equipment: String,

    // 注释存储
    annotations: Vec<Annotation>,
}

impl EdfWriter {
    /// Creates a new writer; the file is created (or truncated) immediately.
    ///
    /// Defaults: EDF+ mode, start 1985-01-01 00:00:00, one-second data
    /// records, anonymised patient fields.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(&path)
            .map_err(|e| Error::FileNotFound(format!("{}: {}", path.as_ref().display(), e)))?;

        let start_date = NaiveDate::from_ymd_opt(1985, 1, 1)
            .ok_or_else(|| Error::InvalidFormat("Invalid default start date".to_string()))?;
        let start_time = NaiveTime::from_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::InvalidFormat("Invalid default start time".to_string()))?;

        Ok(EdfWriter {
            file: BufWriter::new(file),
            signals: Vec::new(),
            start_date,
            start_time,
            datarecord_duration: EDFLIB_TIME_DIMENSION,
            records_written: 0,
            header_written: false,
            edf_plus: true,
            annotation_bytes: EDFLIB_ANNOTATION_BYTES,
            patient_code: "X".to_string(),
            sex: "X".to_string(),
            birthdate: "X".to_string(),
            patient_name: "X".to_string(),
            equipment: "X".to_string(),
            annotations: Vec::new(),
        })
    }

    fn ensure_not_started(&self, what: &str) -> Result<()> {
        if self.header_written {
            return Err(Error::InvalidFormat(format!(
                "Cannot modify {} after writing header",
                what
            )));
        }
        Ok(())
    }

    pub fn add_signal(&mut self, signal: SignalParam) -> Result<()> {
        self.ensure_not_started("signals")?;

        if signal.physical_min == signal.physical_max {
            return Err(Error::PhysicalMinEqualsMax);
        }
        if signal.digital_min == signal.digital_max {
            return Err(Error::DigitalMinEqualsMax);
        }
        if signal.samples_per_record < 1 {
            return Err(Error::InvalidFormat(format!(
                "Signal '{}' needs at least one sample per record",
                signal.label
            )));
        }
        if self.signals.len() + 1 >= crate::EDFLIB_MAXSIGNALS {
            return Err(Error::InvalidSignalCount(self.signals.len() as i32 + 1));
        }

        self.signals.push(signal);
        Ok(())
    }

    pub fn set_patient_info(&mut self, code: &str, sex: &str, birthdate: &str, name: &str) -> Result<()> {
        self.ensure_not_started("patient info")?;

        // EDF+ 子字段内不允许空格
        self.patient_code = code.replace(' ', "_");
        self.sex = sex.replace(' ', "_");
        self.birthdate = birthdate.replace(' ', "_");
        self.patient_name = name.replace(' ', "_");
        Ok(())
    }

    pub fn set_equipment(&mut self, equipment: &str) -> Result<()> {
        self.ensure_not_started("equipment")?;
        self.equipment = equipment.replace(' ', "_");
        Ok(())
    }

    pub fn set_start_datetime(&mut self, date: NaiveDate, time: NaiveTime) -> Result<()> {
        self.ensure_not_started("start time")?;
        self.start_date = date;
        self.start_time = time;
        Ok(())
    }

    pub fn set_datarecord_duration(&mut self, duration_seconds: f64) -> Result<()> {
        self.ensure_not_started("data record duration")?;

        if duration_seconds <= 0.0 || duration_seconds > 3600.0 {
            return Err(Error::InvalidFormat(
                "Data record duration must be between 0 and 3600 seconds".to_string(),
            ));
        }

        self.datarecord_duration = (duration_seconds * EDFLIB_TIME_DIMENSION as f64).round() as i64;
        Ok(())
    }

    /// Switches between EDF+ (annotation channel, `EDF+C` marker) and plain
    /// EDF output.
    pub fn set_edf_plus(&mut self, edf_plus: bool) -> Result<()> {
        self.ensure_not_started("file type")?;
        self.edf_plus = edf_plus;
        Ok(())
    }

    /// Bytes reserved per record for the annotation channel. Rounded up to
    /// an even number.
    pub fn set_annotation_bytes(&mut self, bytes: usize) -> Result<()> {
        self.ensure_not_started("annotation channel size")?;
        if bytes < 16 {
            return Err(Error::InvalidFormat("Annotation channel needs at least 16 bytes".to_string()));
        }
        self.annotation_bytes = bytes + bytes % 2;
        Ok(())
    }

    /// Adds an annotation. Its onset must lie in a data record that has not
    /// been written yet.
    pub fn add_annotation(&mut self, onset_seconds: f64, duration_seconds: Option<f64>, description: &str) -> Result<()> {
        if !self.edf_plus {
            return Err(Error::InvalidFormat("Plain EDF files cannot hold annotations".to_string()));
        }
        if onset_seconds < 0.0 {
            return Err(Error::InvalidFormat("Annotation onset cannot be negative".to_string()));
        }
        if matches!(duration_seconds, Some(d) if d < 0.0) {
            return Err(Error::InvalidFormat("Annotation duration cannot be negative".to_string()));
        }
        if description.is_empty() {
            return Err(Error::InvalidFormat("Annotation description cannot be empty".to_string()));
        }
        if description.len() > crate::EDFLIB_MAX_ANNOTATION_LEN {
            return Err(Error::InvalidFormat(format!(
                "Annotation description too long (max {} bytes)",
                crate::EDFLIB_MAX_ANNOTATION_LEN
            )));
        }

        let onset = (onset_seconds * EDFLIB_TIME_DIMENSION as f64).round() as i64;
        let written_until = self.records_written as i64 * self.datarecord_duration;
        if self.records_written > 0 && onset < written_until {
            return Err(Error::InvalidFormat(format!(
                "Annotation at {}s falls in an already written data record",
                onset_seconds
            )));
        }

        self.annotations.push(Annotation {
            onset,
            duration: duration_seconds
                .map(|d| (d * EDFLIB_TIME_DIMENSION as f64).round() as i64)
                .unwrap_or(-1),
            description: description.to_string(),
        });
        Ok(())
    }

    /// Writes one data record: one vector of physical values per signal,
    /// each exactly `samples_per_record` long.
    pub fn write_samples(&mut self, samples: &[Vec<f64>]) -> Result<()> {
        if samples.len() != self.signals.len() {
            return Err(Error::InvalidFormat("Sample count must match signal count".to_string()));
        }
        if self.signals.is_empty() && !self.edf_plus {
            return Err(Error::InvalidFormat("Plain EDF file needs at least one signal".to_string()));
        }

        for (i, signal_samples) in samples.iter().enumerate() {
            let expected = self.signals[i].samples_per_record as usize;
            if signal_samples.len() != expected {
                return Err(Error::InvalidFormat(format!(
                    "Signal {} expected {} samples per record, got {}",
                    i, expected, signal_samples.len()
                )));
            }
        }

        // 先生成TAL，空间不足时不写入任何数据
        let tal = if self.edf_plus {
            Some(self.generate_annotation_tal(self.records_written)?)
        } else {
            None
        };

        if !self.header_written {
            self.write_header(-1)?; // finalize时更新记录数
        }

        for (signal, signal_samples) in self.signals.iter().zip(samples) {
            for &physical_value in signal_samples {
                let clamped_value = signal
                    .to_digital(physical_value)
                    .max(signal.digital_min)
                    .min(signal.digital_max);

                // 写入为16位小端序
                self.file.write_all(&(clamped_value as i16).to_le_bytes())?;
            }
        }

        if let Some(tal) = tal {
            self.file.write_all(&tal)?;
        }

        self.records_written += 1;
        Ok(())
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    /// Flushes the file and patches the data record count into the header.
    pub fn finalize(mut self) -> Result<()> {
        if !self.header_written {
            self.write_header(0)?;
        }

        let unplaced = self
            .annotations
            .iter()
            .filter(|a| a.onset >= self.records_written as i64 * self.datarecord_duration)
            .count();
        if unplaced > 0 {
            log::warn!("{} annotations fall after the last data record and were not written", unplaced);
        }

        self.file.flush()?;
        self.file.seek(SeekFrom::Start(236))?;
        self.file.write_all(&pad_field(&self.records_written.to_string(), 8))?;
        self.file.flush()?;
        Ok(())
    }

    fn generate_annotation_tal(&self, record_index: usize) -> Result<Vec<u8>> {
        let mut tal_data = Vec::with_capacity(self.annotation_bytes);

        let record_start = record_index as i64 * self.datarecord_duration;
        let record_end = record_start + self.datarecord_duration;

        // 时间戳注释，格式: "+<onset>\x14\x14\x00"
        tal_data.push(b'+');
        tal_data.extend_from_slice(format_edf_time(record_start).as_bytes());
        tal_data.extend_from_slice(&[0x14, 0x14, 0x00]);

        for annotation in self
            .annotations
            .iter()
            .filter(|a| a.onset >= record_start && a.onset < record_end)
        {
            // 格式: "+<onset>[\x15<duration>]\x14<description>\x14\x00"
            tal_data.push(b'+');
            tal_data.extend_from_slice(format_edf_time(annotation.onset).as_bytes());
            if annotation.duration >= 0 {
                tal_data.push(0x15);
                tal_data.extend_from_slice(format_edf_time(annotation.duration).as_bytes());
            }
            tal_data.push(0x14);
            tal_data.extend_from_slice(annotation.description.as_bytes());
            tal_data.extend_from_slice(&[0x14, 0x00]);
        }

        if tal_data.len() > self.annotation_bytes {
            return Err(Error::InvalidFormat(format!(
                "Annotations of data record {} need {} bytes, channel holds {}",
                record_index,
                tal_data.len(),
                self.annotation_bytes
            )));
        }

        // 用零填充到固定长度
        tal_data.resize(self.annotation_bytes, 0x00);
        Ok(tal_data)
    }

    /// 写入头部
    fn write_header(&mut self, total_datarecords: i64) -> Result<()> {
        let mut all_signals = self.signals.clone();
        if self.edf_plus {
            all_signals.push(SignalParam {
                label: ANNOTATION_LABEL.to_string(),
                samples_in_file: 0,
                physical_max: 1.0,
                physical_min: -1.0,
                digital_max: 32767,
                digital_min: -32768,
                samples_per_record: (self.annotation_bytes / 2) as i32,
                physical_dimension: String::new(),
                prefilter: String::new(),
                transducer: String::new(),
            });
        }

        let total_signals = all_signals.len();
        let header_size = (total_signals + 1) * 256;

        let mut main_header = Vec::with_capacity(header_size);

        // 版本 (8字节)
        main_header.extend_from_slice(&pad_field("0", 8));

        let (patient_field, recording_field) = if self.edf_plus {
            (
                format!("{} {} {} {}", self.patient_code, self.sex, self.birthdate, self.patient_name),
                format!(
                    "Startdate {} X X {}",
                    self.start_date.format("%d-%b-%Y").to_string().to_uppercase(),
                    self.equipment
                ),
            )
        } else {
            (self.patient_name.clone(), format!("Equipment {}", self.equipment))
        };
        main_header.extend_from_slice(&pad_field(&patient_field, 80));
        main_header.extend_from_slice(&pad_field(&recording_field, 80));

        // 开始日期 "dd.mm.yy" 和时间 "hh.mm.ss"
        let date_str = format!(
            "{:02}.{:02}.{:02}",
            self.start_date.day(), self.start_date.month(), self.start_date.year() % 100
        );
        let time_str = format!(
            "{:02}.{:02}.{:02}",
            self.start_time.hour(), self.start_time.minute(), self.start_time.second()
        );
        main_header.extend_from_slice(&pad_field(&date_str, 8));
        main_header.extend_from_slice(&pad_field(&time_str, 8));

        main_header.extend_from_slice(&pad_field(&header_size.to_string(), 8));
        main_header.extend_from_slice(&pad_field(if self.edf_plus { "EDF+C" } else { "" }, 44));
        main_header.extend_from_slice(&pad_field(&total_datarecords.to_string(), 8));
        main_header.extend_from_slice(&pad_field(&format_edf_time(self.datarecord_duration), 8));
        main_header.extend_from_slice(&pad_field(&total_signals.to_string(), 4));

        // 信号头部：每个字段对所有信号连续写入
        for s in &all_signals {
            main_header.extend_from_slice(&pad_field(&s.label, 16));
        }
        for s in &all_signals {
            main_header.extend_from_slice(&pad_field(&s.transducer, 80));
        }
        for s in &all_signals {
            main_header.extend_from_slice(&pad_field(&s.physical_dimension, 8));
        }
        for s in &all_signals {
            main_header.extend_from_slice(&pad_field(&s.physical_min.to_string(), 8));
        }
        for s in &all_signals {
            main_header.extend_from_slice(&pad_field(&s.physical_max.to_string(), 8));
        }
        for s in &all_signals {
            main_header.extend_from_slice(&pad_field(&s.digital_min.to_string(), 8));
        }
        for s in &all_signals {
            main_header.extend_from_slice(&pad_field(&s.digital_max.to_string(), 8));
        }
        for s in &all_signals {
            main_header.extend_from_slice(&pad_field(&s.prefilter, 80));
        }
        for s in &all_signals {
            main_header.extend_from_slice(&pad_field(&s.samples_per_record.to_string(), 8));
        }
        for _ in &all_signals {
            main_header.extend_from_slice(&pad_field("", 32));
        }

        debug_assert_eq!(main_header.len(), header_size);
        self.file.write_all(&main_header)?;
        self.header_written = true;
        Ok(())
    }
}
