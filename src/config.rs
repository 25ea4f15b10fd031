use std::path::PathBuf;

/// What to do when a tone lands at or above nyquist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NyquistPolicy {
    /// Log it and render the aliased tone anyway.
    Warn,
    Reject,
}

/// What the sweep does with a combination that fails to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    Skip,
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub sample_rate: u32,
    pub base_frequency: f64,
    pub harmonics: Vec<i32>,
    pub decay_rates: Vec<f64>,
    /// Divisor applied before playback and plotting.
    pub headroom: f64,
    /// Plot y range is `-y_limit..y_limit`.
    pub y_limit: f64,
    pub output_dir: PathBuf,
    pub nyquist: NyquistPolicy,
    pub on_error: ErrorPolicy,
    /// Also derive and plot zeros and poles.
    pub zero_pole: bool,
}

impl SweepConfig {
    /// A single note (A + 4 semitones) rung at increasingly slow decay rates.
    pub fn decay_sweep() -> Self {
        Self {
            sample_rate: 44100,
            base_frequency: 110.0,
            harmonics: vec![4],
            decay_rates: vec![0.1, 0.5, 0.8, 0.9, 0.99, 0.999, 0.9998],
            headroom: 30.0,
            y_limit: 1.8,
            output_dir: PathBuf::from("./output"),
            nyquist: NyquistPolicy::Warn,
            on_error: ErrorPolicy::Abort,
            zero_pole: false,
        }
    }

    /// Two octaves of semitones above A1 at one long decay, with zero/pole plots.
    pub fn harmonic_sweep() -> Self {
        Self {
            base_frequency: 55.0,
            harmonics: (3..27).collect(),
            decay_rates: vec![0.9998555],
            y_limit: 4.0,
            zero_pole: true,
            ..Self::decay_sweep()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.harmonics.is_empty() {
            return Err("no harmonics to sweep".to_string());
        }
        if self.decay_rates.is_empty() {
            return Err("no decay rates to sweep".to_string());
        }
        if !(self.headroom.is_finite() && self.headroom > 0.0) {
            return Err(format!("headroom must be positive, got {}", self.headroom));
        }
        if !(self.y_limit.is_finite() && self.y_limit > 0.0) {
            return Err(format!("y limit must be positive, got {}", self.y_limit));
        }
        Ok(())
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::decay_sweep()
    }
}

/// Parses `"3..27"` (end exclusive), `"3..=26"` or a comma separated list such as `"-2,0,4"`.
pub fn parse_harmonics(s: &str) -> Result<Vec<i32>, String> {
    let s = s.trim();
    let parse = |v: &str| {
        v.trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid harmonic '{}': {}", v.trim(), e))
    };
    if let Some((start, end)) = s.split_once("..=") {
        return Ok((parse(start)?..=parse(end)?).collect());
    }
    if let Some((start, end)) = s.split_once("..") {
        return Ok((parse(start)?..parse(end)?).collect());
    }
    s.split(',').filter(|v| !v.trim().is_empty()).map(parse).collect()
}

#[test]
fn test_presets() {
    let decay = SweepConfig::decay_sweep();
    assert_eq!(decay.harmonics, vec![4]);
    assert_eq!(decay.decay_rates.len(), 7);
    assert_eq!(decay.headroom, 30.0);
    assert!(decay.validate().is_ok());

    let harmonic = SweepConfig::harmonic_sweep();
    assert_eq!(harmonic.harmonics.first(), Some(&3));
    assert_eq!(harmonic.harmonics.last(), Some(&26));
    assert_eq!(harmonic.decay_rates, vec![0.9998555]);
    assert_eq!(harmonic.base_frequency, 55.0);
    assert!(harmonic.zero_pole);
    assert!(harmonic.validate().is_ok());
}

#[test]
fn test_validate() {
    let mut config = SweepConfig::decay_sweep();
    config.harmonics.clear();
    assert!(config.validate().is_err());

    let mut config = SweepConfig::decay_sweep();
    config.headroom = 0.0;
    assert!(config.validate().is_err());
}

#[test]
fn test_parse_harmonics() {
    assert_eq!(parse_harmonics("3..6"), Ok(vec![3, 4, 5]));
    assert_eq!(parse_harmonics("3..=6"), Ok(vec![3, 4, 5, 6]));
    assert_eq!(parse_harmonics("-2, 0,4"), Ok(vec![-2, 0, 4]));
    assert_eq!(parse_harmonics("-3..-1"), Ok(vec![-3, -2]));
    assert!(parse_harmonics("a,b").is_err());
}
