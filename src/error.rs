//! Errors raised by the resonator before any sample is computed.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    #[error("decay rate must be finite and non-negative, got {0}")]
    InvalidDecayRate(f64),

    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("base frequency must be finite and positive, got {0}")]
    InvalidBaseFrequency(f64),

    #[error("harmonic index {harmonic} scales the base frequency out of range")]
    FrequencyOutOfRange { harmonic: i32 },

    #[error("duration must be at least one sample")]
    EmptyDuration,

    /// Only raised by callers that treat aliasing as fatal.
    #[error("frequency {frequency:.3} Hz is at or above nyquist ({nyquist:.1} Hz)")]
    NyquistViolation { frequency: f64, nyquist: f64 },
}
