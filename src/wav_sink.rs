use std::path::{Path, PathBuf};

use crate::config::SweepConfig;
use crate::sweep::{RenderedTone, ToneSink};

/// Writes each tone to `<output_dir>/<label>.wav`, 16 bit mono.
pub struct WavSink {
    written: Vec<PathBuf>,
}

impl WavSink {
    pub fn new() -> Self {
        Self { written: Vec::new() }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl Default for WavSink {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn to_i16(sample: f64) -> i16 {
    let amplitude = std::i16::MAX as f64;
    if sample.is_finite() {
        (sample.max(-1.0).min(1.0) * amplitude) as i16
    } else {
        0
    }
}

pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[f64],
    sample_rate: u32,
    headroom: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = hound::WavSpec {
        channels: 1, // mono
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in samples {
        writer.write_sample(to_i16(sample / headroom))?;
    }
    writer.finalize()?;
    Ok(())
}

impl ToneSink for WavSink {
    fn accept(&mut self, tone: &RenderedTone, config: &SweepConfig) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&config.output_dir)?;
        let path = config.output_dir.join(format!("{}.wav", tone.label()));
        // a diverging tone keeps its full length; overflowed samples become silence
        write_wav(&path, tone.waveform.samples(), tone.waveform.sample_rate(), config.headroom)?;
        log::debug!("wav :: wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

#[test]
fn test_to_i16_clamps_and_silences() {
    assert_eq!(to_i16(0.0), 0);
    assert_eq!(to_i16(1.0), i16::MAX);
    assert_eq!(to_i16(2.5), i16::MAX);
    assert_eq!(to_i16(-3.0), -i16::MAX);
    assert_eq!(to_i16(f64::NAN), 0);
    assert_eq!(to_i16(f64::INFINITY), 0);
}

#[test]
fn test_wav_sink_writes_scaled_tone() {
    use crate::sweep::render;

    let dir = tempfile::tempdir().unwrap();
    let mut config = SweepConfig::decay_sweep();
    config.output_dir = dir.path().to_path_buf();
    let tone = render(&config, 4, 0.0).unwrap();

    let mut sink = WavSink::new();
    sink.accept(&tone, &config).unwrap();
    let path = dir.path().join("plot-k-4-r-0.0000000.wav");
    assert_eq!(sink.written(), &[path.clone()][..]);

    let mut reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, 44100);
    let samples = reader.samples::<i16>().collect::<Result<Vec<i16>, _>>().unwrap();
    assert_eq!(samples.len(), 44100);
    assert_eq!(samples[0], (i16::MAX as f64 / 30.0) as i16);
    assert!(samples[1..].iter().all(|v| *v == 0));
}
