//! Decaying tones from a two-pole resonator excited by a unit impulse.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use crate::error::SynthesisError;

/// Per-call inputs of the resonator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisParameters {
    pub sample_rate: u32,
    pub base_frequency: f64,
    /// Semitones above (or below) `base_frequency`.
    pub harmonic_index: i32,
    /// Pole radius R. Below 1 the tone decays, at 1 it rings forever, above 1 it grows.
    pub decay_rate: f64,
}

impl SynthesisParameters {
    pub fn new(sample_rate: u32, base_frequency: f64, harmonic_index: i32, decay_rate: f64) -> Self {
        Self {
            sample_rate,
            base_frequency,
            harmonic_index,
            decay_rate,
        }
    }

    /// Equal-tempered frequency of the harmonic index.
    pub fn frequency(&self) -> f64 {
        self.base_frequency * 2.0f64.powf(self.harmonic_index as f64 / 12.0)
    }

    fn validate(&self) -> Result<(), SynthesisError> {
        if self.sample_rate == 0 {
            return Err(SynthesisError::InvalidSampleRate(self.sample_rate));
        }
        if !self.base_frequency.is_finite() || self.base_frequency <= 0.0 {
            return Err(SynthesisError::InvalidBaseFrequency(self.base_frequency));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(SynthesisError::InvalidDecayRate(self.decay_rate));
        }
        if !self.frequency().is_finite() {
            return Err(SynthesisError::FrequencyOutOfRange {
                harmonic: self.harmonic_index,
            });
        }
        Ok(())
    }
}

/// Second-order all-pole filter `1 / (1 - 2R cos(theta) z^-1 + R^2 z^-2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResonantFilter {
    angular_position: f64,
    feedback: [f64; 3],
    feedforward: [f64; 1],
    frequency: f64,
    sample_rate: u32,
    decay_rate: f64,
}

impl ResonantFilter {
    /// Pole angle theta in radians per sample.
    pub fn angular_position(&self) -> f64 {
        self.angular_position
    }

    /// Denominator `[1, -2R cos(theta), R^2]`.
    pub fn feedback(&self) -> [f64; 3] {
        self.feedback
    }

    /// Numerator, always `[1]`.
    pub fn feedforward(&self) -> [f64; 1] {
        self.feedforward
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    /// Advisory: `Some` when the tuned frequency aliases. Strict callers can return it as an error.
    pub fn nyquist_violation(&self) -> Option<SynthesisError> {
        if self.frequency >= self.nyquist() {
            Some(SynthesisError::NyquistViolation {
                frequency: self.frequency,
                nyquist: self.nyquist(),
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stability {
    Decaying,
    Sustained,
    /// `overflow_at` is the first sample that is no longer finite, if the growth got that far.
    Diverging { overflow_at: Option<usize> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f64>,
    sample_rate: u32,
    stability: Stability,
}

impl Waveform {
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }

    /// Samples up to (excluding) the first non-finite one.
    pub fn finite_prefix(&self) -> &[f64] {
        match self.stability {
            Stability::Diverging {
                overflow_at: Some(index),
            } => &self.samples[..index],
            _ => &self.samples,
        }
    }
}

/// Zeros and poles of a [`ResonantFilter`] in the z-plane.
#[derive(Debug, Clone, PartialEq)]
pub struct ZeroPolePair {
    /// Empty: the numerator is a constant.
    pub zeros: Vec<Complex<f64>>,
    /// `R e^{+i theta}` then `R e^{-i theta}`.
    pub poles: [Complex<f64>; 2],
}

/// Tunes a resonator to the harmonic described by `params`.
///
/// A frequency at or above nyquist is logged and reported through
/// [`ResonantFilter::nyquist_violation`], not rejected.
pub fn derive_filter(params: &SynthesisParameters) -> Result<ResonantFilter, SynthesisError> {
    params.validate()?;
    let frequency = params.frequency();
    let theta = frequency * PI / (params.sample_rate as f64 / 2.0);
    let r = params.decay_rate;

    let filter = ResonantFilter {
        angular_position: theta,
        feedback: [1.0, -2.0 * r * theta.cos(), r * r],
        feedforward: [1.0],
        frequency,
        sample_rate: params.sample_rate,
        decay_rate: r,
    };
    if let Some(violation) = filter.nyquist_violation() {
        log::warn!("k={} :: {}, tone will alias", params.harmonic_index, violation);
    }
    Ok(filter)
}

/// Impulse response of `filter` over `duration_samples` samples.
///
/// Runs `y[n] = b0 x[n] - a1 y[n-1] - a2 y[n-2]` with zero initial state.
/// Nothing is clamped or normalized; growing responses are labelled
/// [`Stability::Diverging`] instead.
pub fn synthesize(filter: &ResonantFilter, duration_samples: usize) -> Result<Waveform, SynthesisError> {
    if duration_samples == 0 {
        return Err(SynthesisError::EmptyDuration);
    }
    let b0 = filter.feedforward[0];
    let a1 = filter.feedback[1];
    let a2 = filter.feedback[2];

    let impulse = std::iter::once(1.0f64).chain(std::iter::repeat(0.0)).take(duration_samples);
    let mut samples = Vec::with_capacity(duration_samples);
    let (mut y1, mut y2) = (0.0f64, 0.0f64);
    let mut overflow_at = None;
    for (n, x) in impulse.enumerate() {
        let y = b0 * x - a1 * y1 - a2 * y2;
        if overflow_at.is_none() && !y.is_finite() {
            overflow_at = Some(n);
        }
        samples.push(y);
        y2 = y1;
        y1 = y;
    }

    let stability = if filter.decay_rate < 1.0 {
        Stability::Decaying
    } else if filter.decay_rate == 1.0 {
        Stability::Sustained
    } else {
        match overflow_at {
            Some(index) => log::warn!(
                "R={:.7} :: response overflows at sample {} of {}",
                filter.decay_rate,
                index,
                duration_samples
            ),
            None => log::debug!("R={:.7} :: response grows without overflowing", filter.decay_rate),
        }
        Stability::Diverging { overflow_at }
    };

    Ok(Waveform {
        samples,
        sample_rate: filter.sample_rate,
        stability,
    })
}

/// Closed-form zeros and poles; the gain term is not needed and is dropped.
pub fn derive_poles_zeros(filter: &ResonantFilter) -> ZeroPolePair {
    let r = filter.decay_rate;
    let theta = filter.angular_position;
    ZeroPolePair {
        zeros: Vec::new(),
        poles: [Complex::from_polar(r, theta), Complex::from_polar(r, -theta)],
    }
}

/// One second of the tone described by `params`.
pub fn generate_tone(params: &SynthesisParameters) -> Result<Waveform, SynthesisError> {
    let filter = derive_filter(params)?;
    synthesize(&filter, params.sample_rate as usize)
}

#[cfg(test)]
fn params(harmonic_index: i32, decay_rate: f64) -> SynthesisParameters {
    SynthesisParameters::new(44100, 110.0, harmonic_index, decay_rate)
}

#[cfg(test)]
fn peak(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
}

#[test]
fn test_frequency_scales_by_semitones() {
    assert!((params(12, 0.5).frequency() - 220.0).abs() < 1e-9);
    assert!((params(-12, 0.5).frequency() - 55.0).abs() < 1e-9);
    assert!((params(4, 0.5).frequency() - 138.591_315_488_436_4).abs() < 1e-9);
}

#[test]
fn test_filter_coefficients() {
    let filter = derive_filter(&params(0, 0.5)).unwrap();
    let theta = 110.0 * PI / 22050.0;
    assert_eq!(filter.angular_position(), theta);
    assert_eq!(filter.feedback(), [1.0, -theta.cos(), 0.25]);
    assert_eq!(filter.feedforward(), [1.0]);
}

#[test]
fn test_derivation_is_idempotent() {
    let p = params(7, 0.9998);
    assert_eq!(derive_filter(&p).unwrap(), derive_filter(&p).unwrap());
}

#[test]
fn test_synthesis_is_deterministic() {
    let filter = derive_filter(&params(4, 0.999)).unwrap();
    let one = synthesize(&filter, 44100).unwrap();
    let other = synthesize(&filter, 44100).unwrap();
    assert_eq!(one.samples(), other.samples());
}

#[test]
fn test_impulse_response_matches_closed_form() {
    // y[n] = R^n sin((n + 1) theta) / sin(theta)
    let r = 0.999;
    let filter = derive_filter(&params(0, r)).unwrap();
    let theta = filter.angular_position();
    let tone = synthesize(&filter, 44100).unwrap();
    for n in (0..tone.len()).step_by(97) {
        let expected = r.powi(n as i32) * ((n + 1) as f64 * theta).sin() / theta.sin();
        let scale = r.powi(n as i32) / theta.sin();
        assert!((tone.samples()[n] - expected).abs() <= 1e-7 * scale, "sample {}", n);
    }
}

#[test]
fn test_peaks_decay_geometrically_per_period() {
    let r = 0.999;
    let filter = derive_filter(&params(0, r)).unwrap();
    let tone = synthesize(&filter, 44100).unwrap();
    let period = 44100.0 / filter.frequency();
    let window = period.round() as usize;
    let peaks: Vec<f64> = tone.samples().chunks(window).take(9).map(peak).collect();
    let expected = r.powf(period);
    for pair in peaks.windows(2) {
        let ratio = pair[1] / pair[0];
        assert!((ratio - expected).abs() / expected < 5e-3, "ratio {} vs {}", ratio, expected);
    }
}

#[test]
fn test_pole_geometry() {
    let r = 0.999;
    let filter = derive_filter(&params(0, r)).unwrap();
    let theta = 110.0 * PI / 22050.0;
    let zp = derive_poles_zeros(&filter);
    assert!(zp.zeros.is_empty());
    assert_eq!(zp.poles.len(), 2);
    for pole in zp.poles.iter() {
        assert!((pole.norm() - r).abs() < 1e-9);
    }
    assert!((zp.poles[0].arg() - theta).abs() < 1e-9);
    assert!((zp.poles[1].arg() + theta).abs() < 1e-9);
}

#[test]
fn test_closed_form_poles_match_quadratic_solve() {
    for &(k, r) in &[(0, 0.999), (4, 0.5), (20, 0.9998555), (-7, 0.1)] {
        let filter = derive_filter(&params(k, r)).unwrap();
        let [_, a1, a2] = filter.feedback();
        // z^2 + a1 z + a2 = 0
        let root = Complex::new(a1 * a1 - 4.0 * a2, 0.0).sqrt();
        let upper = (-a1 + root) / 2.0;
        let lower = (-a1 - root) / 2.0;
        let zp = derive_poles_zeros(&filter);
        assert!((zp.poles[0] - upper).norm() < 1e-9);
        assert!((zp.poles[1] - lower).norm() < 1e-9);
    }
}

#[test]
fn test_zero_decay_is_bare_impulse() {
    let tone = generate_tone(&params(4, 0.0)).unwrap();
    assert_eq!(tone.len(), 44100);
    assert_eq!(tone.samples()[0], 1.0);
    assert!(tone.samples()[1..].iter().all(|v| *v == 0.0));
    assert_eq!(tone.stability(), Stability::Decaying);
}

#[test]
fn test_near_unity_decay_spans_the_second() {
    let r = 0.9998;
    let tone = generate_tone(&params(4, r)).unwrap();
    assert_eq!(tone.len(), 44100);
    let window = (44100.0 / params(4, r).frequency()).ceil() as usize;
    let head = peak(&tone.samples()[..window]);
    let tail = peak(&tone.samples()[44100 - window..]);
    let ratio = tail / head;
    // 0.9998^44099 ~ 1.5e-4, give or take a period of envelope
    assert!(ratio > 1.4e-4 && ratio < 1.7e-4, "tail/head ratio {}", ratio);
}

#[test]
fn test_nyquist_flag() {
    assert!(derive_filter(&params(60, 0.9)).unwrap().nyquist_violation().is_none());
    // 110 * 2^8 = 28160 Hz
    let filter = derive_filter(&params(96, 0.9)).unwrap();
    match filter.nyquist_violation() {
        Some(SynthesisError::NyquistViolation { frequency, nyquist }) => {
            assert!((frequency - 28160.0).abs() < 1e-6);
            assert_eq!(nyquist, 22050.0);
        }
        other => panic!("expected a nyquist violation, got {:?}", other),
    }
    // still synthesized
    assert_eq!(synthesize(&filter, 128).unwrap().len(), 128);
}

#[test]
fn test_unit_decay_is_sustained() {
    let tone = generate_tone(&params(0, 1.0)).unwrap();
    assert_eq!(tone.stability(), Stability::Sustained);
    let theta = 110.0 * PI / 22050.0;
    let tail = peak(&tone.samples()[43000..]);
    assert!((tail * theta.sin() - 1.0).abs() < 1e-3);
}

#[test]
fn test_growing_decay_is_labelled() {
    let tone = generate_tone(&params(0, 1.0001)).unwrap();
    assert_eq!(tone.stability(), Stability::Diverging { overflow_at: None });
    assert_eq!(tone.finite_prefix().len(), 44100);

    let tone = generate_tone(&params(0, 1.02)).unwrap();
    match tone.stability() {
        Stability::Diverging {
            overflow_at: Some(index),
        } => {
            assert!(index > 30_000 && index < 44100);
            assert!(tone.samples()[..index].iter().all(|v| v.is_finite()));
            assert!(!tone.samples()[index].is_finite());
            assert_eq!(tone.finite_prefix().len(), index);
        }
        other => panic!("expected overflow, got {:?}", other),
    }
}

#[test]
fn test_invalid_parameters_are_rejected() {
    assert_eq!(derive_filter(&params(0, -0.1)), Err(SynthesisError::InvalidDecayRate(-0.1)));
    assert!(matches!(
        derive_filter(&params(0, f64::NAN)),
        Err(SynthesisError::InvalidDecayRate(_))
    ));
    assert_eq!(
        derive_filter(&SynthesisParameters::new(0, 110.0, 0, 0.5)),
        Err(SynthesisError::InvalidSampleRate(0))
    );
    assert_eq!(
        derive_filter(&SynthesisParameters::new(44100, 0.0, 0, 0.5)),
        Err(SynthesisError::InvalidBaseFrequency(0.0))
    );
    assert_eq!(
        derive_filter(&params(i32::MAX, 0.5)),
        Err(SynthesisError::FrequencyOutOfRange { harmonic: i32::MAX })
    );
    let filter = derive_filter(&params(0, 0.5)).unwrap();
    assert_eq!(synthesize(&filter, 0), Err(SynthesisError::EmptyDuration));
}
