pub mod config;
pub mod error;
#[cfg(feature = "playback")]
pub mod playback;
pub mod plot;
pub mod resonator;
pub mod spectrum;
pub mod sweep;
pub mod wav_sink;

pub use error::SynthesisError;
pub use resonator::{
    derive_filter, derive_poles_zeros, generate_tone, synthesize, ResonantFilter, Stability, SynthesisParameters,
    Waveform, ZeroPolePair,
};
