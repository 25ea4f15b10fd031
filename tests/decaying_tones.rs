use resonator_tones::config::SweepConfig;
use resonator_tones::sweep::{self, ToneSink};
use resonator_tones::wav_sink::WavSink;
use resonator_tones::{derive_filter, derive_poles_zeros, generate_tone, synthesize, Stability, SynthesisParameters};

#[test]
fn harmonic_sweep_poles_sit_on_the_decay_radius() {
    let config = SweepConfig::harmonic_sweep();
    for &harmonic in &config.harmonics {
        let params = SynthesisParameters::new(config.sample_rate, config.base_frequency, harmonic, 0.9998555);
        let filter = derive_filter(&params).unwrap();
        assert!(filter.nyquist_violation().is_none());
        let zp = derive_poles_zeros(&filter);
        assert!(zp.zeros.is_empty());
        assert!((zp.poles[0] - zp.poles[1].conj()).norm() < 1e-15);
        assert!((zp.poles[0].norm() - 0.9998555).abs() < 1e-9);
        assert!((zp.poles[0].arg() - filter.angular_position()).abs() < 1e-9);
    }
}

#[test]
fn slower_decay_rings_longer() {
    let config = SweepConfig::decay_sweep();
    let tails = config
        .decay_rates
        .iter()
        .map(|r| {
            let tone = generate_tone(&SynthesisParameters::new(44100, 110.0, 4, *r)).unwrap();
            assert_eq!(tone.stability(), Stability::Decaying);
            tone.samples()[22050..].iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
        })
        .collect::<Vec<_>>();
    assert!(tails.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", tails);
}

#[test]
fn synthesize_honours_requested_duration() {
    let filter = derive_filter(&SynthesisParameters::new(8000, 440.0, 0, 0.99)).unwrap();
    assert_eq!(synthesize(&filter, 1).unwrap().samples(), &[1.0]);
    assert_eq!(synthesize(&filter, 300).unwrap().len(), 300);
}

#[test]
fn sweep_writes_one_wav_per_combination() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SweepConfig::decay_sweep();
    config.output_dir = dir.path().join("out");
    config.harmonics = vec![0, 12];
    config.decay_rates = vec![0.9, 0.999];

    let mut sinks: Vec<Box<dyn ToneSink>> = vec![Box::new(WavSink::new())];
    let report = sweep::run(&config, &mut sinks).unwrap();
    assert_eq!(report.rendered, 4);

    for name in &[
        "plot-k-0-r-0.9000000.wav",
        "plot-k-0-r-0.9990000.wav",
        "plot-k-12-r-0.9000000.wav",
        "plot-k-12-r-0.9990000.wav",
    ] {
        let reader = hound::WavReader::open(config.output_dir.join(name)).unwrap();
        assert_eq!(reader.duration(), 44100);
    }
}
