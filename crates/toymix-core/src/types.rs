//! Common types for Toymix
//!
//! Requests, quantities and SNR targets shared by the allocator, the mixer
//! and the application that decodes recipes into them.

use std::fmt;
use std::str::FromStr;

/// Sample rate of every rendered file (Hz)
pub const FINAL_SAMPLE_RATE: u32 = 16000;

/// Full scale used when converting float samples to 16-bit PCM
pub const PCM16_SCALE: f32 = 32767.0;

/// Microphone index as used in recording ids (`..._mic3_...`)
pub type MicIndex = u8;

/// Number of files a request asks for, and whether consumed recordings may be reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    /// Only recordings never handed out before are eligible
    Exclusive(usize),
    /// Every matching recording is eligible, consumed or not
    Replaceable(usize),
}

impl Quantity {
    /// Number of files requested
    pub fn count(&self) -> usize {
        match self {
            Quantity::Exclusive(n) | Quantity::Replaceable(n) => *n,
        }
    }

    pub fn is_replaceable(&self) -> bool {
        matches!(self, Quantity::Replaceable(_))
    }

    /// Same kind with a different count
    pub fn with_count(&self, count: usize) -> Self {
        match self {
            Quantity::Exclusive(_) => Quantity::Exclusive(count),
            Quantity::Replaceable(_) => Quantity::Replaceable(count),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Exclusive(n) => write!(f, "{}", n),
            Quantity::Replaceable(n) => write!(f, "R{}", n),
        }
    }
}

/// Target signal-to-noise ratio of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Snr {
    /// No noise is mixed in; output is the signal alone
    Clean,
    /// Ratio in decibels between signal baseline and noise baseline
    Db(f64),
}

impl fmt::Display for Snr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snr::Clean => write!(f, "clean"),
            Snr::Db(db) => write!(f, "{}dB", db),
        }
    }
}

impl FromStr for Snr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("clean") {
            return Ok(Snr::Clean);
        }
        let trimmed = s.strip_suffix("dB").or_else(|| s.strip_suffix("db")).unwrap_or(s);
        match trimmed.trim().parse::<f64>() {
            Ok(db) if db.is_finite() => Ok(Snr::Db(db)),
            _ => Err(format!("invalid SNR '{}': expected a number in dB or 'clean'", s)),
        }
    }
}

/// One decoded recipe request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Folder holding the source recordings, relative to the source root
    /// (e.g. `ToyCar/car_A1`)
    pub source_folder: String,
    /// Logical unit the signal must come from (e.g. `CA1`); its first
    /// character selects the RMS baseline class
    pub source_id: String,
    /// Microphone lanes, in allocation order
    pub microphones: Vec<MicIndex>,
    /// Noise class number (`N<noise_class>` in noise ids)
    pub noise_class: u32,
    pub quantity: Quantity,
    /// Destination path relative to the destination root; the file name holds
    /// a run of `?` where the sequence number goes
    pub destination_pattern: String,
}

impl Request {
    /// Machine type, i.e. the first component of the source folder
    pub fn machine(&self) -> &str {
        self.source_folder
            .split(|c| c == '/' || c == '\\')
            .find(|part| !part.is_empty())
            .unwrap_or("")
    }

    /// Class letter whose baseline RMS applies to this request's signals
    pub fn source_class(&self) -> Option<char> {
        self.source_id.chars().next()
    }

    /// Substring identifying signal recordings of one lane
    pub fn signal_key(&self, mic: MicIndex) -> String {
        format!("{}_mic{}", self.source_id, mic)
    }

    /// Substring identifying noise recordings of one lane
    pub fn noise_key(&self, mic: MicIndex) -> String {
        format!("{}_N{}_mic{}", self.machine(), self.noise_class, mic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request {
            source_folder: "ToyCar/car_A1".to_string(),
            source_id: "CA1".to_string(),
            microphones: vec![1, 2],
            noise_class: 3,
            quantity: Quantity::Exclusive(4),
            destination_pattern: "ToyCar/train/section_00_source_0_normal_????.wav".to_string(),
        }
    }

    #[test]
    fn test_snr_parsing() {
        assert_eq!("clean".parse::<Snr>().unwrap(), Snr::Clean);
        assert_eq!("CLEAN".parse::<Snr>().unwrap(), Snr::Clean);
        assert_eq!("-6".parse::<Snr>().unwrap(), Snr::Db(-6.0));
        assert_eq!("6dB".parse::<Snr>().unwrap(), Snr::Db(6.0));
        assert!("loud".parse::<Snr>().is_err());
        assert!("NaN".parse::<Snr>().is_err());
    }

    #[test]
    fn test_request_keys() {
        let req = request();
        assert_eq!(req.machine(), "ToyCar");
        assert_eq!(req.source_class(), Some('C'));
        assert_eq!(req.signal_key(2), "CA1_mic2");
        assert_eq!(req.noise_key(2), "ToyCar_N3_mic2");
    }

    #[test]
    fn test_quantity() {
        let q = Quantity::Replaceable(7);
        assert_eq!(q.count(), 7);
        assert!(q.is_replaceable());
        assert_eq!(q.with_count(3), Quantity::Replaceable(3));
        assert_eq!(q.to_string(), "R7");
        assert_eq!(Quantity::Exclusive(2).to_string(), "2");
    }
}
