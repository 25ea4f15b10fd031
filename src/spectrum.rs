use rustfft::{num_complex::Complex, FftPlanner};

/// Magnitudes of bins `0..=N/2` of the forward FFT. Non-finite samples count as silence.
pub fn magnitude_spectrum(samples: &[f64]) -> Vec<f64> {
    let mut buffer = samples
        .iter()
        .map(|v| if v.is_finite() { *v } else { 0.0 })
        .map(|v| Complex { re: v, im: 0.0f64 })
        .collect::<Vec<_>>();
    transform(&mut buffer);
    buffer
        .into_iter()
        .take(samples.len() / 2 + 1)
        .map(|c| c.norm())
        .collect()
}

fn transform(buffer: &mut [Complex<f64>]) {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(buffer.len());
    fft.process(buffer);
}

/// Frequency of the loudest non-DC bin, or `None` for silence.
///
/// The signal is scaled to unit peak first, so growing tones near overflow still transform.
pub fn dominant_frequency(samples: &[f64], sample_rate: u32) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let peak = samples
        .iter()
        .filter(|v| v.is_finite())
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    if peak == 0.0 {
        return None;
    }
    let normalized = samples.iter().map(|v| v / peak).collect::<Vec<_>>();
    let spectrum = magnitude_spectrum(&normalized);
    let (bin, magnitude) = spectrum
        .iter()
        .enumerate()
        .skip(1)
        .fold((0, 0.0f64), |best, (bin, m)| if *m > best.1 { (bin, *m) } else { best });
    if bin == 0 || magnitude == 0.0 {
        return None;
    }
    Some(bin as f64 * sample_rate as f64 / samples.len() as f64)
}

#[test]
fn test_magnitude_spectrum_of_a_cosine() {
    let samples = (0..64)
        .map(|n| (2.0 * std::f64::consts::PI * 8.0 * n as f64 / 64.0).cos())
        .collect::<Vec<_>>();
    let spectrum = magnitude_spectrum(&samples);
    assert_eq!(spectrum.len(), 33);
    assert!((spectrum[8] - 32.0).abs() < 1e-9);
    assert!(spectrum.iter().enumerate().filter(|(bin, _)| *bin != 8).all(|(_, m)| *m < 1e-9));
}

#[test]
fn test_dominant_frequency_of_a_tone() {
    use crate::resonator::{generate_tone, SynthesisParameters};
    for &harmonic in &[0, 4, 12, 19] {
        let params = SynthesisParameters::new(44100, 110.0, harmonic, 0.999);
        let tone = generate_tone(&params).unwrap();
        let measured = dominant_frequency(tone.samples(), 44100).unwrap();
        assert!((measured - params.frequency()).abs() <= 1.0, "k={} measured {}", harmonic, measured);
    }
}

#[test]
fn test_dominant_frequency_of_silence() {
    assert_eq!(dominant_frequency(&[0.0; 32], 44100), None);
    assert_eq!(dominant_frequency(&[1.0], 44100), None);
}

#[test]
fn test_dominant_frequency_of_a_growing_tone() {
    use crate::resonator::{generate_tone, Stability, SynthesisParameters};
    // 880 Hz: the growth widens the peak too much to resolve 110 Hz precisely
    let tone = generate_tone(&SynthesisParameters::new(44100, 110.0, 36, 1.02)).unwrap();
    assert!(matches!(tone.stability(), Stability::Diverging { overflow_at: Some(_) }));
    let measured = dominant_frequency(tone.finite_prefix(), 44100).unwrap();
    assert!((measured - 880.0).abs() / 880.0 < 0.02, "measured {}", measured);

    let tone = generate_tone(&SynthesisParameters::new(44100, 110.0, 0, 1.02)).unwrap();
    assert!(dominant_frequency(tone.finite_prefix(), 44100).is_some());
}
