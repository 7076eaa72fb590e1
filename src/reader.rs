use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use log::debug;

use crate::error::{Error, Result};
use crate::types::{Annotation, EdfHeader, FileType, SignalParam};
use crate::utils::{ascii_field, atof_nonlocalized, atoi_nonlocalized, parse_edf_time};

/// Label reserved by EDF+ for annotation (TAL) channels.
pub const ANNOTATION_LABEL: &str = "EDF Annotations";

/// Reader for EDF and EDF+ files.
///
/// Plain EDF files (such as Sleep-EDF `*-PSG.edf` recordings) expose only
/// ordinary signals. EDF+ files additionally carry one or more
/// `EDF Annotations` channels; these are decoded eagerly on open and are
/// available through [`EdfReader::annotations`].
///
/// # Examples
///
/// ```rust,no_run
/// use edfsleep::EdfReader;
///
/// let mut reader = EdfReader::open("SC4001E0-PSG.edf")?;
/// let header = reader.header();
/// println!("Duration: {:.1} seconds", header.duration_seconds());
///
/// if let Some(idx) = header.signal_index("EEG Fpz-Cz") {
///     let rate = header.sampling_rate(idx).unwrap_or(0.0);
///     let samples = reader.read_all_physical_samples(idx)?;
///     println!("{} samples at {} Hz", samples.len(), rate);
/// }
/// # Ok::<(), edfsleep::Error>(())
/// ```
pub struct EdfReader {
    file: BufReader<File>,
    header: EdfHeader,
    /// 每个普通信号在数据记录中的位置信息
    signal_info: Vec<SignalInfo>,
    /// 注释通道在数据记录中的位置信息
    annotation_info: Vec<SignalInfo>,
    /// 当前每个信号的样本位置指针
    sample_positions: Vec<i64>,
    /// 文件的头部大小
    header_size: usize,
    /// 每个数据记录的大小（字节）
    record_size: usize,
    annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
struct SignalInfo {
    /// 信号在数据记录中的字节偏移
    buffer_offset: usize,
    /// 每个数据记录中的样本数
    samples_per_record: i32,
}

impl EdfReader {
    /// Opens an EDF or EDF+ file for reading.
    ///
    /// The header is validated and, for EDF+ files, every TAL in every data
    /// record is decoded into [`Annotation`]s.
    ///
    /// # Errors
    ///
    /// * `Error::FileNotFound` - File doesn't exist or can't be opened
    /// * `Error::UnsupportedFileType` - Version field is not `0`
    /// * `Error::InvalidHeader` - Header size field disagrees with signal count
    /// * `Error::InvalidSignalCount` - Invalid number of signals
    /// * `Error::InvalidFormat` - Malformed date, time, duration or TAL bytes
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)
            .map_err(|e| Error::FileNotFound(format!("{}: {}", path.as_ref().display(), e)))?;
        let file_len = file.metadata()?.len();

        let mut reader = BufReader::new(file);

        // 读取并解析头部
        let parsed = Self::parse_header(&mut reader, file_len)?;

        let sample_positions = vec![0i64; parsed.header.signals.len()];

        let mut edf = EdfReader {
            file: reader,
            header: parsed.header,
            signal_info: parsed.signal_info,
            annotation_info: parsed.annotation_info,
            sample_positions,
            header_size: parsed.header_size,
            record_size: parsed.record_size,
            annotations: Vec::new(),
        };

        if !edf.annotation_info.is_empty() {
            edf.annotations = edf.read_annotations()?;
            edf.header.annotations_in_file = edf.annotations.len() as i64;
        }

        debug!(
            "opened {}: {:?}, {} signals, {} records of {:.3}s, {} annotations",
            path.as_ref().display(),
            edf.header.file_type,
            edf.header.signals.len(),
            edf.header.datarecords_in_file,
            edf.header.datarecord_duration as f64 / crate::EDFLIB_TIME_DIMENSION as f64,
            edf.annotations.len(),
        );

        Ok(edf)
    }

    /// Gets a reference to the file header information
    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    /// Annotations decoded from every `EDF Annotations` channel, in file
    /// order. Empty for plain EDF files.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Reads up to `count` physical value samples from the specified signal,
    /// starting at the signal's current position.
    ///
    /// # Errors
    ///
    /// * `Error::InvalidSignalIndex` - Signal index is out of bounds
    /// * `Error::Io` - I/O error reading from file
    pub fn read_physical_samples(&mut self, signal: usize, count: usize) -> Result<Vec<f64>> {
        let digital_samples = self.read_digital_samples(signal, count)?;

        let signal_param = &self.header.signals[signal];
        let physical_samples = digital_samples
            .into_iter()
            .map(|d| signal_param.to_physical(d))
            .collect();

        Ok(physical_samples)
    }

    /// Reads the complete signal from the first sample, in physical units.
    pub fn read_all_physical_samples(&mut self, signal: usize) -> Result<Vec<f64>> {
        self.rewind(signal)?;
        let total = self.header.signals[signal].samples_in_file.max(0) as usize;
        self.read_physical_samples(signal, total)
    }

    /// Reads up to `count` raw digital samples from the specified signal.
    pub fn read_digital_samples(&mut self, signal: usize, count: usize) -> Result<Vec<i32>> {
        if signal >= self.header.signals.len() {
            return Err(Error::InvalidSignalIndex(signal));
        }

        if count == 0 {
            return Ok(Vec::new());
        }

        let signal_info = &self.signal_info[signal];
        let signal_param = &self.header.signals[signal];
        let samples_per_record = signal_info.samples_per_record as i64;

        // 计算可读取的最大样本数
        let samples_in_file = samples_per_record * self.header.datarecords_in_file;
        let available_samples = (samples_in_file - self.sample_positions[signal]).max(0) as usize;
        let actual_count = count.min(available_samples);

        if actual_count == 0 {
            return Ok(Vec::new());
        }

        let mut samples = Vec::with_capacity(actual_count);
        let mut buf = Vec::new();

        while samples.len() < actual_count {
            let current_pos = self.sample_positions[signal];
            let record_index = current_pos / samples_per_record;
            let sample_in_record = current_pos % samples_per_record;

            // 计算文件偏移量
            let file_offset = self.header_size as u64
                + record_index as u64 * self.record_size as u64
                + signal_info.buffer_offset as u64
                + sample_in_record as u64 * 2; // EDF每个样本2字节

            self.file.seek(SeekFrom::Start(file_offset))?;

            // 一次读取当前记录中剩余的样本
            let samples_in_current_record = (samples_per_record - sample_in_record) as usize;
            let samples_to_read = (actual_count - samples.len()).min(samples_in_current_record);

            buf.resize(samples_to_read * 2, 0);
            self.file.read_exact(&mut buf)?;

            for pair in buf.chunks_exact(2) {
                // 转换为有符号16位整数（小端序）
                let digital_value = i16::from_le_bytes([pair[0], pair[1]]) as i32;

                // 应用数字范围限制
                let clamped_value = digital_value
                    .max(signal_param.digital_min)
                    .min(signal_param.digital_max);

                samples.push(clamped_value);
            }

            self.sample_positions[signal] = current_pos + samples_to_read as i64;
        }

        Ok(samples)
    }

    /// 设置指定信号的样本位置
    pub fn seek(&mut self, signal: usize, position: i64) -> Result<i64> {
        if signal >= self.header.signals.len() {
            return Err(Error::InvalidSignalIndex(signal));
        }

        let max_position = self.header.signals[signal].samples_per_record as i64
            * self.header.datarecords_in_file;

        let new_position = position.max(0).min(max_position);
        self.sample_positions[signal] = new_position;

        Ok(new_position)
    }

    /// 获取指定信号的当前样本位置
    pub fn tell(&self, signal: usize) -> Result<i64> {
        if signal >= self.header.signals.len() {
            return Err(Error::InvalidSignalIndex(signal));
        }

        Ok(self.sample_positions[signal])
    }

    /// 将指定信号的位置重置到开头
    pub fn rewind(&mut self, signal: usize) -> Result<()> {
        self.seek(signal, 0)?;
        Ok(())
    }

    /// 逐个数据记录读取所有注释通道并解析TAL
    fn read_annotations(&mut self) -> Result<Vec<Annotation>> {
        let mut annotations = Vec::new();
        let mut block = Vec::new();

        for record in 0..self.header.datarecords_in_file.max(0) as u64 {
            for info in &self.annotation_info {
                let file_offset = self.header_size as u64
                    + record * self.record_size as u64
                    + info.buffer_offset as u64;
                self.file.seek(SeekFrom::Start(file_offset))?;

                block.resize(info.samples_per_record.max(0) as usize * 2, 0);
                self.file.read_exact(&mut block)?;

                annotations.extend(parse_tal_block(&block)?);
            }
        }

        Ok(annotations)
    }

    /// 解析EDF/EDF+文件头部
    fn parse_header(reader: &mut BufReader<File>, file_len: u64) -> Result<ParsedHeader> {
        // 读取主头部（256字节）
        reader.seek(SeekFrom::Start(0))?;
        let mut main_header = vec![0u8; 256];
        reader.read_exact(&mut main_header)?;

        // 验证EDF标识
        let version = String::from_utf8_lossy(&main_header[0..8]);
        if !version.trim().starts_with('0') {
            return Err(Error::UnsupportedFileType(format!("Not an EDF file: {}", version)));
        }

        // 解析信号数量
        let total_signal_count = atoi_nonlocalized(&String::from_utf8_lossy(&main_header[252..256]));
        if total_signal_count < 1 || total_signal_count > crate::EDFLIB_MAXSIGNALS as i32 {
            return Err(Error::InvalidSignalCount(total_signal_count));
        }

        // 验证头部大小
        let expected_header_size = (total_signal_count + 1) * 256;
        let actual_header_size = atoi_nonlocalized(&String::from_utf8_lossy(&main_header[184..192]));
        if actual_header_size != expected_header_size {
            return Err(Error::InvalidHeader);
        }

        // 检查EDF+标识，空白保留字段表示普通EDF
        let reserved = String::from_utf8_lossy(&main_header[192..236]);
        let file_type = if reserved.starts_with("EDF+C") {
            FileType::EdfPlusContinuous
        } else if reserved.starts_with("EDF+D") {
            FileType::EdfPlusDiscontinuous
        } else {
            FileType::Edf
        };

        let patient = ascii_field(&main_header[8..88]);
        let recording = ascii_field(&main_header[88..168]);

        let date_str = String::from_utf8_lossy(&main_header[168..176]);
        let time_str = String::from_utf8_lossy(&main_header[176..184]);
        let (start_date, start_time) = parse_datetime(&date_str, &time_str)?;

        let datarecord_duration = parse_edf_time(&String::from_utf8_lossy(&main_header[244..252]))?;
        if datarecord_duration < 0 {
            return Err(Error::InvalidFormat("Negative data record duration".to_string()));
        }

        // 读取信号头部信息
        let signal_header_size = total_signal_count as usize * 256;
        let mut signal_header = vec![0u8; signal_header_size];
        reader.read_exact(&mut signal_header)?;

        let layout = parse_signals(&signal_header, total_signal_count as usize)?;

        if !layout.signals.is_empty() && datarecord_duration == 0 {
            return Err(Error::InvalidFormat(
                "Zero data record duration with ordinary signals".to_string(),
            ));
        }

        // 数据记录数为-1时根据文件长度推算
        let mut datarecords = atoi_nonlocalized(&String::from_utf8_lossy(&main_header[236..244])) as i64;
        if datarecords < 0 {
            datarecords = if layout.record_size == 0 {
                0
            } else {
                file_len.saturating_sub(expected_header_size as u64) as i64 / layout.record_size as i64
            };
        }

        let impossible = || Error::InvalidFormat("Header declares an impossible size".to_string());
        let required_len = (datarecords as u64)
            .checked_mul(layout.record_size as u64)
            .and_then(|data| data.checked_add(expected_header_size as u64))
            .ok_or_else(impossible)?;
        let file_duration = datarecord_duration.checked_mul(datarecords).ok_or_else(impossible)?;
        if file_len < required_len {
            return Err(Error::InvalidFormat(format!(
                "File is truncated: {} bytes, header declares {}",
                file_len, required_len
            )));
        }

        let signals = layout
            .signals
            .into_iter()
            .map(|mut s| {
                s.samples_in_file = s.samples_per_record as i64 * datarecords;
                s
            })
            .collect();

        let header = EdfHeader {
            file_type,
            signals,
            file_duration,
            start_date,
            start_time,
            datarecords_in_file: datarecords,
            datarecord_duration,
            annotations_in_file: 0,
            patient,
            recording,
        };

        Ok(ParsedHeader {
            header,
            signal_info: layout.signal_info,
            annotation_info: layout.annotation_info,
            header_size: expected_header_size as usize,
            record_size: layout.record_size,
        })
    }
}

struct ParsedHeader {
    header: EdfHeader,
    signal_info: Vec<SignalInfo>,
    annotation_info: Vec<SignalInfo>,
    header_size: usize,
    record_size: usize,
}

struct SignalLayout {
    signals: Vec<SignalParam>,
    signal_info: Vec<SignalInfo>,
    annotation_info: Vec<SignalInfo>,
    record_size: usize,
}

/// 解析日期时间 "dd.mm.yy" / "hh.mm.ss"
fn parse_datetime(date_str: &str, time_str: &str) -> Result<(NaiveDate, NaiveTime)> {
    let date_parts: Vec<&str> = date_str.trim().split('.').collect();
    if date_parts.len() != 3 {
        return Err(Error::InvalidFormat(format!("Invalid start date '{}'", date_str)));
    }

    let day = atoi_nonlocalized(date_parts[0]);
    let month = atoi_nonlocalized(date_parts[1]);
    let year = {
        let yy = atoi_nonlocalized(date_parts[2]);
        if yy > 84 { 1900 + yy } else { 2000 + yy }
    };

    let start_date = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .ok_or_else(|| Error::InvalidFormat(format!("Invalid start date '{}'", date_str)))?;

    let time_parts: Vec<&str> = time_str.trim().split('.').collect();
    if time_parts.len() != 3 {
        return Err(Error::InvalidFormat(format!("Invalid start time '{}'", time_str)));
    }

    let hour = atoi_nonlocalized(time_parts[0]);
    let minute = atoi_nonlocalized(time_parts[1]);
    let second = atoi_nonlocalized(time_parts[2]);

    let start_time = NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)
        .ok_or_else(|| Error::InvalidFormat(format!("Invalid start time '{}'", time_str)))?;

    Ok((start_date, start_time))
}

/// 解析信号参数，注释通道单独记录
fn parse_signals(signal_header: &[u8], total_signal_count: usize) -> Result<SignalLayout> {
    let mut signals = Vec::new();
    let mut signal_info = Vec::new();
    let mut annotation_info = Vec::new();
    let mut buffer_offset = 0;

    // 每个字段对所有信号连续存放
    let field = |base: usize, width: usize, i: usize| {
        header_field(signal_header, total_signal_count, base, width, i)
    };

    for i in 0..total_signal_count {
        let label = ascii_field(field(0, 16, i));
        let transducer = ascii_field(field(16, 80, i));
        let physical_dimension = ascii_field(field(96, 8, i));
        let physical_min = atof_nonlocalized(&String::from_utf8_lossy(field(104, 8, i)));
        let physical_max = atof_nonlocalized(&String::from_utf8_lossy(field(112, 8, i)));
        let digital_min = atoi_nonlocalized(&String::from_utf8_lossy(field(120, 8, i)));
        let digital_max = atoi_nonlocalized(&String::from_utf8_lossy(field(128, 8, i)));
        let prefilter = ascii_field(field(136, 80, i));
        let samples_per_record = atoi_nonlocalized(&String::from_utf8_lossy(field(216, 8, i)));

        if samples_per_record < 1 {
            return Err(Error::InvalidFormat(format!(
                "Signal '{}' has {} samples per record",
                label, samples_per_record
            )));
        }

        let info = SignalInfo {
            buffer_offset,
            samples_per_record,
        };

        if label == ANNOTATION_LABEL {
            annotation_info.push(info);
        } else {
            if physical_min == physical_max {
                return Err(Error::PhysicalMinEqualsMax);
            }
            if digital_min == digital_max {
                return Err(Error::DigitalMinEqualsMax);
            }

            signals.push(SignalParam {
                label,
                samples_in_file: 0,
                physical_max,
                physical_min,
                digital_max,
                digital_min,
                samples_per_record,
                physical_dimension,
                prefilter,
                transducer,
            });
            signal_info.push(info);
        }

        // 更新缓冲区偏移（每个样本2字节）
        buffer_offset += samples_per_record as usize * 2;
    }

    Ok(SignalLayout {
        signals,
        signal_info,
        annotation_info,
        record_size: buffer_offset,
    })
}

fn header_field(header: &[u8], count: usize, base: usize, width: usize, i: usize) -> &[u8] {
    let start = count * base + i * width;
    &header[start..start + width]
}

/// Decodes one data record's worth of an `EDF Annotations` channel.
///
/// Each TAL has the form `+onset[\x15duration]\x14desc\x14[desc\x14...]\x00`.
/// TALs without a description (the per-record timekeeping entry) yield
/// nothing; a missing duration is reported as `-1`.
pub fn parse_tal_block(block: &[u8]) -> Result<Vec<Annotation>> {
    let mut annotations = Vec::new();

    for tal in block.split(|&b| b == 0x00) {
        if tal.is_empty() {
            continue;
        }

        let mut fields = tal.split(|&b| b == 0x14);
        let Some(time_field) = fields.next() else {
            continue;
        };

        let (onset_bytes, duration_bytes) = match time_field.iter().position(|&b| b == 0x15) {
            Some(pos) => (&time_field[..pos], Some(&time_field[pos + 1..])),
            None => (time_field, None),
        };

        let onset_str = String::from_utf8_lossy(onset_bytes);
        if !(onset_str.starts_with('+') || onset_str.starts_with('-')) {
            return Err(Error::InvalidFormat(format!("TAL onset without sign: '{}'", onset_str)));
        }
        let onset = parse_edf_time(&onset_str)?;

        let duration = match duration_bytes {
            Some(bytes) if !bytes.is_empty() => parse_edf_time(&String::from_utf8_lossy(bytes))?,
            _ => -1,
        };

        for description in fields.filter(|d| !d.is_empty()) {
            annotations.push(Annotation {
                onset,
                duration,
                description: String::from_utf8_lossy(description).trim().to_string(),
            });
        }
    }

    Ok(annotations)
}
