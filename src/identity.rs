//! Recording identity and epoch identifiers.
//!
//! Sleep-EDF file names carry their identity at fixed positions:
//! `SC4001E0-PSG.edf` is a cassette (`C`) recording of subject `00`,
//! night `1`. The annotation sidecar `SC4001EC-Hypnogram.edf` shares the
//! same six-character prefix.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Storage category, encoded by the second character of the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordingKind {
    Cassette,
    Telemetry,
}

impl RecordingKind {
    pub fn marker(&self) -> char {
        match self {
            RecordingKind::Cassette => 'C',
            RecordingKind::Telemetry => 'T',
        }
    }

    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            'C' => Some(RecordingKind::Cassette),
            'T' => Some(RecordingKind::Telemetry),
            _ => None,
        }
    }
}

/// Who and when a recording belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordingIdentity {
    pub kind: RecordingKind,
    pub subject: u8,
    pub night: u8,
}

impl RecordingIdentity {
    pub fn new(kind: RecordingKind, subject: u8, night: u8) -> Self {
        Self { kind, subject, night }
    }

    /// Parses a Sleep-EDF style file name.
    ///
    /// Position 1 holds the category marker (`C` or `T`), positions 3-4 the
    /// subject code and position 5 the night code.
    ///
    /// ```rust
    /// use edfsleep::{RecordingIdentity, RecordingKind};
    ///
    /// let id = RecordingIdentity::parse("ST7022J0-PSG.edf")?;
    /// assert_eq!(id.kind, RecordingKind::Telemetry);
    /// assert_eq!(id.subject, 2);
    /// assert_eq!(id.night, 2);
    /// assert!(RecordingIdentity::parse("SX4001E0-PSG.edf").is_err());
    /// # Ok::<(), edfsleep::Error>(())
    /// ```
    pub fn parse(file_name: &str) -> Result<Self> {
        let bytes = file_name.as_bytes();
        if bytes.len() < 6 || !bytes[..6].is_ascii() {
            return Err(Error::InvalidFormat(format!(
                "'{}' is too short for a recording identifier",
                file_name
            )));
        }

        let kind = RecordingKind::from_marker(bytes[1] as char).ok_or_else(|| {
            Error::InvalidFormat(format!(
                "'{}' has unknown category marker '{}'",
                file_name, bytes[1] as char
            ))
        })?;

        let digits = |range: std::ops::Range<usize>| -> Result<u8> {
            let text = &file_name[range];
            if !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidFormat(format!(
                    "'{}' has non-numeric code '{}'",
                    file_name, text
                )));
            }
            text.parse::<u8>()
                .map_err(|_| Error::InvalidFormat(format!("'{}' has invalid code '{}'", file_name, text)))
        };

        let subject = digits(3..5)?;
        let night = digits(5..6)?;

        Ok(Self { kind, subject, night })
    }

    /// Parses the identity from the file name component of `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidFormat(format!("'{}' has no file name", path.display())))?;
        Self::parse(name)
    }

    pub fn epoch_id(&self, epoch_index: usize) -> EpochId {
        EpochId {
            recording: *self,
            index: epoch_index,
        }
    }
}

impl fmt::Display for RecordingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}-{}", self.kind.marker(), self.subject, self.night)
    }
}

/// Join key between feature rows and label rows:
/// `"{type}-{subject}-{night}-{epoch:04}"`.
///
/// Ordering follows the numeric fields, which for four-digit epoch indices
/// is the same as the lexical order of the rendered key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpochId {
    recording: RecordingIdentity,
    index: usize,
}

impl EpochId {
    pub fn recording(&self) -> RecordingIdentity {
        self.recording
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn subject(&self) -> u8 {
        self.recording.subject
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}", self.recording, self.index)
    }
}

impl FromStr for EpochId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidFormat(format!("'{}' is not an epoch identifier", s));

        let parts: Vec<&str> = s.trim().split('-').collect();
        if parts.len() != 4 || parts[0].chars().count() != 1 {
            return Err(invalid());
        }

        let kind = parts[0]
            .chars()
            .next()
            .and_then(RecordingKind::from_marker)
            .ok_or_else(invalid)?;
        let subject = parts[1].parse::<u8>().map_err(|_| invalid())?;
        let night = parts[2].parse::<u8>().map_err(|_| invalid())?;
        let index = parts[3].parse::<usize>().map_err(|_| invalid())?;

        Ok(RecordingIdentity::new(kind, subject, night).epoch_id(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cassette_and_telemetry() {
        let id = RecordingIdentity::parse("SC4001E0-PSG.edf").unwrap();
        assert_eq!(id, RecordingIdentity::new(RecordingKind::Cassette, 0, 1));

        let id = RecordingIdentity::parse("SC4001EC-Hypnogram.edf").unwrap();
        assert_eq!(id, RecordingIdentity::new(RecordingKind::Cassette, 0, 1));

        let id = RecordingIdentity::parse("ST7242J0-PSG.edf").unwrap();
        assert_eq!(id, RecordingIdentity::new(RecordingKind::Telemetry, 24, 2));
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        for name in ["SX4001E0-PSG.edf", "SC4", "SC4a01E0-PSG.edf", "SC400xE0.edf", "séance.edf"] {
            match RecordingIdentity::parse(name) {
                Err(Error::InvalidFormat(_)) => {}
                other => panic!("{} parsed as {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_epoch_id_is_stable_and_padded() {
        let id = RecordingIdentity::new(RecordingKind::Cassette, 7, 2);
        assert_eq!(id.epoch_id(3).to_string(), "C-07-2-0003");
        assert_eq!(id.epoch_id(3).to_string(), id.epoch_id(3).to_string());
        assert_eq!(id.epoch_id(1234).to_string(), "C-07-2-1234");
    }

    #[test]
    fn test_lexical_order_matches_numeric_order() {
        let id = RecordingIdentity::new(RecordingKind::Telemetry, 12, 1);
        let ids: Vec<EpochId> = [0usize, 2, 9, 10, 99, 100, 999, 1000, 9999]
            .iter()
            .map(|&i| id.epoch_id(i))
            .collect();

        let mut keys: Vec<String> = ids.iter().map(|e| e.to_string()).collect();
        keys.sort();
        let numeric: Vec<String> = ids.iter().map(|e| e.to_string()).collect();
        assert_eq!(keys, numeric);

        let mut shuffled = ids.clone();
        shuffled.reverse();
        shuffled.sort();
        assert_eq!(shuffled, ids);
    }

    #[test]
    fn test_epoch_id_round_trip_through_text() {
        let id = RecordingIdentity::new(RecordingKind::Telemetry, 4, 1).epoch_id(42);
        assert_eq!("T-04-1-0042".parse::<EpochId>().unwrap(), id);
        assert!("Q-04-1-0042".parse::<EpochId>().is_err());
        assert!("T-04-0042".parse::<EpochId>().is_err());
    }
}
