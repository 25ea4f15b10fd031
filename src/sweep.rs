//! Driver loop: render every (harmonic, decay rate) combination and hand the
//! tones to the sinks one after another.

use itertools::Itertools;
use rayon::prelude::*;

use crate::config::{ErrorPolicy, NyquistPolicy, SweepConfig};
use crate::error::SynthesisError;
use crate::resonator::{
    derive_filter, derive_poles_zeros, synthesize, ResonantFilter, Stability, SynthesisParameters, Waveform,
    ZeroPolePair,
};
use crate::spectrum::dominant_frequency;

#[derive(Debug, Clone)]
pub struct RenderedTone {
    pub harmonic: i32,
    pub decay_rate: f64,
    pub filter: ResonantFilter,
    pub waveform: Waveform,
    pub zeros_poles: Option<ZeroPolePair>,
    pub measured_frequency: Option<f64>,
}

impl RenderedTone {
    /// File stem shared by every sink.
    pub fn label(&self) -> String {
        format!("plot-k-{}-r-{:.7}", self.harmonic, self.decay_rate)
    }

    pub fn title(&self) -> String {
        format!("Plot for k={}, R={:.7}", self.harmonic, self.decay_rate)
    }

    pub fn is_aliased(&self) -> bool {
        self.filter.nyquist_violation().is_some()
    }

    pub fn is_diverging(&self) -> bool {
        matches!(self.waveform.stability(), Stability::Diverging { .. })
    }

    /// Samples divided by `headroom`, as sent to playback and plots.
    pub fn scaled(&self, headroom: f64) -> impl Iterator<Item = f64> + '_ {
        self.waveform.finite_prefix().iter().map(move |v| v / headroom)
    }
}

/// Consumer of rendered tones (playback, plots, files).
pub trait ToneSink {
    fn accept(&mut self, tone: &RenderedTone, config: &SweepConfig) -> Result<(), Box<dyn std::error::Error>>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub rendered: usize,
    pub skipped: usize,
    pub aliased: usize,
    pub diverging: usize,
}

pub fn combinations(config: &SweepConfig) -> Vec<(i32, f64)> {
    config
        .harmonics
        .iter()
        .cloned()
        .cartesian_product(config.decay_rates.iter().cloned())
        .collect()
}

/// Renders one second of a single combination.
pub fn render(config: &SweepConfig, harmonic: i32, decay_rate: f64) -> Result<RenderedTone, SynthesisError> {
    let params = SynthesisParameters::new(config.sample_rate, config.base_frequency, harmonic, decay_rate);
    let filter = derive_filter(&params)?;
    if config.nyquist == NyquistPolicy::Reject {
        if let Some(violation) = filter.nyquist_violation() {
            return Err(violation);
        }
    }
    let waveform = synthesize(&filter, config.sample_rate as usize)?;
    let zeros_poles = if config.zero_pole {
        Some(derive_poles_zeros(&filter))
    } else {
        None
    };
    let measured_frequency = dominant_frequency(waveform.finite_prefix(), config.sample_rate);
    Ok(RenderedTone {
        harmonic,
        decay_rate,
        filter,
        waveform,
        zeros_poles,
        measured_frequency,
    })
}

/// Renders `batch` in parallel, keeping its order.
pub fn render_batch(config: &SweepConfig, batch: &[(i32, f64)]) -> Vec<((i32, f64), Result<RenderedTone, SynthesisError>)> {
    batch
        .par_iter()
        .map(|&(harmonic, decay_rate)| ((harmonic, decay_rate), render(config, harmonic, decay_rate)))
        .collect()
}

/// Renders every combination in parallel, in `combinations` order.
pub fn render_all(config: &SweepConfig) -> Vec<((i32, f64), Result<RenderedTone, SynthesisError>)> {
    render_batch(config, &combinations(config))
}

/// Renders one batch per rayon pool width and drains it into the sinks before the next,
/// so at most a pool's worth of waveforms is alive at once.
pub fn run(config: &SweepConfig, sinks: &mut [Box<dyn ToneSink>]) -> Result<SweepReport, Box<dyn std::error::Error>> {
    config.validate()?;
    log::info!(
        "sweep :: {} harmonics x {} decay rates at {} Hz",
        config.harmonics.len(),
        config.decay_rates.len(),
        config.sample_rate
    );
    let mut report = SweepReport::default();
    let pending = combinations(config);
    let batch_size = rayon::current_num_threads().max(1);
    for ((harmonic, decay_rate), rendered) in pending
        .chunks(batch_size)
        .flat_map(|batch| render_batch(config, batch))
    {
        let tone = match rendered {
            Ok(tone) => tone,
            Err(e) if config.on_error == ErrorPolicy::Skip => {
                log::warn!("k={} R={:.7} :: skipped: {}", harmonic, decay_rate, e);
                report.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        log::info!(
            "{} :: {:.3} Hz, measured {}",
            tone.label(),
            tone.filter.frequency(),
            tone.measured_frequency
                .map(|f| format!("{:.1} Hz", f))
                .unwrap_or_else(|| "nothing".to_string())
        );
        for sink in sinks.iter_mut() {
            sink.accept(&tone, config)?;
        }
        report.rendered += 1;
        if tone.is_aliased() {
            report.aliased += 1;
        }
        if tone.is_diverging() {
            report.diverging += 1;
        }
    }
    log::info!("sweep :: done, {:?}", report);
    Ok(report)
}

#[cfg(test)]
struct Recorder(std::rc::Rc<std::cell::RefCell<Vec<String>>>);

#[cfg(test)]
impl ToneSink for Recorder {
    fn accept(&mut self, tone: &RenderedTone, _config: &SweepConfig) -> Result<(), Box<dyn std::error::Error>> {
        self.0.borrow_mut().push(tone.label());
        Ok(())
    }
}

#[test]
fn test_combinations_are_harmonic_major() {
    let mut config = SweepConfig::decay_sweep();
    config.harmonics = vec![1, 2];
    config.decay_rates = vec![0.5, 0.9];
    assert_eq!(combinations(&config), vec![(1, 0.5), (1, 0.9), (2, 0.5), (2, 0.9)]);
}

#[test]
fn test_label_and_title() {
    let tone = render(&SweepConfig::decay_sweep(), 4, 0.9998).unwrap();
    assert_eq!(tone.label(), "plot-k-4-r-0.9998000");
    assert_eq!(tone.title(), "Plot for k=4, R=0.9998000");
    assert!(tone.zeros_poles.is_none());
    assert_eq!(tone.waveform.len(), 44100);
}

#[test]
fn test_render_with_zero_pole() {
    let tone = render(&SweepConfig::harmonic_sweep(), 3, 0.9998555).unwrap();
    let zp = tone.zeros_poles.unwrap();
    assert!((zp.poles[0].norm() - 0.9998555).abs() < 1e-9);
}

#[test]
fn test_strict_nyquist_rejects() {
    let mut config = SweepConfig::decay_sweep();
    assert!(render(&config, 96, 0.5).unwrap().is_aliased());
    config.nyquist = NyquistPolicy::Reject;
    assert!(matches!(
        render(&config, 96, 0.5),
        Err(SynthesisError::NyquistViolation { .. })
    ));
}

#[test]
fn test_run_feeds_sinks_in_order() {
    let config = SweepConfig::decay_sweep();
    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut sinks: Vec<Box<dyn ToneSink>> = vec![Box::new(Recorder(seen.clone()))];
    let report = run(&config, &mut sinks).unwrap();
    assert_eq!(report.rendered, 7);
    assert_eq!(seen.borrow().first().map(String::as_str), Some("plot-k-4-r-0.1000000"));
    assert_eq!(seen.borrow().last().map(String::as_str), Some("plot-k-4-r-0.9998000"));
    assert_eq!(report.skipped, 0);
    assert_eq!(report.diverging, 0);
}

#[test]
fn test_run_keeps_order_across_batches() {
    let mut config = SweepConfig::harmonic_sweep();
    config.decay_rates = vec![0.5, 0.9];
    let expected = combinations(&config)
        .into_iter()
        .map(|(k, r)| format!("plot-k-{}-r-{:.7}", k, r))
        .collect::<Vec<_>>();

    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut sinks: Vec<Box<dyn ToneSink>> = vec![Box::new(Recorder(seen.clone()))];
    let report = run(&config, &mut sinks).unwrap();
    assert_eq!(report.rendered, expected.len());
    assert_eq!(*seen.borrow(), expected);
    assert_eq!(render_all(&config).len(), expected.len());
}

#[test]
fn test_skip_and_abort_policies() {
    let mut config = SweepConfig::decay_sweep();
    config.decay_rates = vec![0.5, -1.0, 1.0001];

    let mut sinks: Vec<Box<dyn ToneSink>> = Vec::new();
    assert!(run(&config, &mut sinks).is_err());

    config.on_error = ErrorPolicy::Skip;
    let report = run(&config, &mut sinks).unwrap();
    assert_eq!(
        report,
        SweepReport {
            rendered: 2,
            skipped: 1,
            aliased: 0,
            diverging: 1,
        }
    );
}
