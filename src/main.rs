use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use simple_logger::SimpleLogger;

use resonator_tones::config::{parse_harmonics, ErrorPolicy, NyquistPolicy, SweepConfig};
use resonator_tones::plot::PlotSink;
use resonator_tones::sweep::{self, ToneSink};
use resonator_tones::wav_sink::WavSink;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Preset {
    /// One note, seven decay rates
    DecaySweep,
    /// Semitones 3..27 over A1 at R=0.9998555, with zero/pole plots
    HarmonicSweep,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Decaying resonator tones: render, play and plot")]
struct Args {
    #[arg(long, value_enum, default_value = "decay-sweep")]
    preset: Preset,

    #[arg(long, value_name = "HZ")]
    sample_rate: Option<u32>,

    #[arg(long, value_name = "HZ")]
    base_frequency: Option<f64>,

    /// Semitone offsets, e.g. "3..27" or "-2,0,4"
    // the qualified path stops clap from treating this as a repeated argument,
    // parse_harmonics receives the whole string
    #[arg(long, allow_hyphen_values = true, value_parser = parse_harmonics)]
    harmonics: Option<::std::vec::Vec<i32>>,

    /// Comma separated pole radii, e.g. "0.5,0.99,0.9998"
    #[arg(long, value_delimiter = ',')]
    decay_rates: Option<Vec<f64>>,

    /// Divisor applied before playback and plotting
    #[arg(long)]
    headroom: Option<f64>,

    /// Plot y range (symmetric)
    #[arg(long)]
    y_limit: Option<f64>,

    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Also plot zeros and poles
    #[arg(long, default_value_t = false)]
    zero_pole: bool,

    /// Treat tones at or above nyquist as errors
    #[arg(long, default_value_t = false)]
    strict_nyquist: bool,

    /// Skip combinations that fail instead of aborting the sweep
    #[arg(long, default_value_t = false)]
    skip_invalid: bool,

    #[arg(long, default_value_t = false)]
    no_wav: bool,

    #[arg(long, default_value_t = false)]
    no_plot: bool,

    /// Play each tone on the default output device (needs the `playback` feature)
    #[arg(long, default_value_t = false)]
    play: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn sweep_config(&self) -> SweepConfig {
        let mut config = match self.preset {
            Preset::DecaySweep => SweepConfig::decay_sweep(),
            Preset::HarmonicSweep => SweepConfig::harmonic_sweep(),
        };
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(base_frequency) = self.base_frequency {
            config.base_frequency = base_frequency;
        }
        if let Some(harmonics) = &self.harmonics {
            config.harmonics = harmonics.clone();
        }
        if let Some(decay_rates) = &self.decay_rates {
            config.decay_rates = decay_rates.clone();
        }
        if let Some(headroom) = self.headroom {
            config.headroom = headroom;
        }
        if let Some(y_limit) = self.y_limit {
            config.y_limit = y_limit;
        }
        if let Some(out_dir) = &self.out_dir {
            config.output_dir = out_dir.clone();
        }
        config.zero_pole |= self.zero_pole;
        if self.strict_nyquist {
            config.nyquist = NyquistPolicy::Reject;
        }
        if self.skip_invalid {
            config.on_error = ErrorPolicy::Skip;
        }
        config
    }

    fn sinks(&self) -> Vec<Box<dyn ToneSink>> {
        let mut sinks: Vec<Box<dyn ToneSink>> = Vec::new();
        if self.play {
            #[cfg(feature = "playback")]
            sinks.push(Box::new(resonator_tones::playback::PlaybackSink));
            #[cfg(not(feature = "playback"))]
            log::warn!("play :: built without the playback feature, not playing");
        }
        if !self.no_wav {
            sinks.push(Box::new(WavSink::new()));
        }
        if !self.no_plot {
            sinks.push(Box::new(PlotSink));
        }
        sinks
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    SimpleLogger::new()
        .with_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init()?;

    let config = args.sweep_config();
    let mut sinks = args.sinks();
    let report = sweep::run(&config, &mut sinks)?;
    if report.aliased > 0 {
        log::warn!("{} tone(s) at or above nyquist", report.aliased);
    }
    if report.diverging > 0 {
        log::warn!("{} tone(s) grow instead of decaying", report.diverging);
    }
    Ok(())
}

#[test]
fn test_args_override_preset() {
    let args = Args::try_parse_from(&[
        "resonator-tones",
        "--preset",
        "harmonic-sweep",
        "--harmonics",
        "-2..1",
        "--decay-rates",
        "0.5,0.9",
        "--skip-invalid",
        "--strict-nyquist",
    ])
    .unwrap();
    let config = args.sweep_config();
    assert_eq!(config.base_frequency, 55.0);
    assert_eq!(config.harmonics, vec![-2, -1, 0]);
    assert_eq!(config.decay_rates, vec![0.5, 0.9]);
    assert_eq!(config.on_error, ErrorPolicy::Skip);
    assert_eq!(config.nyquist, NyquistPolicy::Reject);
    assert!(config.zero_pole);
}

#[test]
fn test_default_args_use_decay_sweep() {
    let args = Args::try_parse_from(&["resonator-tones", "--no-plot"]).unwrap();
    assert_eq!(args.sweep_config(), SweepConfig::decay_sweep());
    assert_eq!(args.sinks().len(), 1);
}

#[test]
fn test_harmonics_list_is_one_value() {
    let args = Args::try_parse_from(&["resonator-tones", "--harmonics", "-2,0,4"]).unwrap();
    assert_eq!(args.harmonics, Some(vec![-2, 0, 4]));
    assert!(Args::try_parse_from(&["resonator-tones", "--harmonics", "-2", "0"]).is_err());
}
