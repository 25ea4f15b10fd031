use std::sync::mpsc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};
use ringbuf::RingBuffer;

use crate::config::SweepConfig;
use crate::sweep::{RenderedTone, ToneSink};

/// Picks an f32 stream at exactly `sample_rate`, preferring `preferred_channels`, else the fewest channels.
pub fn pick_output_config(
    supported: &[SupportedStreamConfigRange],
    sample_rate: u32,
    preferred_channels: u16,
) -> Option<StreamConfig> {
    let rate = SampleRate(sample_rate);
    supported
        .iter()
        .filter(|range| range.sample_format() == SampleFormat::F32)
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .min_by_key(|range| (range.channels() != preferred_channels, range.channels()))
        .map(|range| StreamConfig {
            channels: range.channels(),
            sample_rate: rate,
            buffer_size: BufferSize::Default,
        })
}

/// Plays `samples` on the default output device and blocks until they have drained.
pub fn play_blocking(samples: &[f32], sample_rate: u32) -> Result<(), Box<dyn std::error::Error>> {
    if samples.is_empty() {
        return Ok(());
    }
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or("no output device")?;
    let preferred_channels = device.default_output_config()?.channels();
    let supported = device.supported_output_configs()?.collect::<Vec<_>>();
    let config = pick_output_config(&supported, sample_rate, preferred_channels).ok_or_else(|| {
        format!(
            "output device does not accept {} Hz f32 samples, render at one of its rates with --sample-rate",
            sample_rate
        )
    })?;
    let channels = config.channels;

    let (mut producer, mut consumer) = RingBuffer::<f32>::new(samples.len()).split();
    producer.push_iter(&mut samples.iter().cloned());

    let (done_tx, done_rx) = mpsc::channel();
    let mut done_tx = Some(done_tx);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels as usize) {
                let sample = consumer.pop().unwrap_or(0.0);
                for out in frame.iter_mut() {
                    *out = sample;
                }
            }
            if consumer.is_empty() {
                if let Some(tx) = done_tx.take() {
                    let _ = tx.send(());
                }
            }
        },
        |err| log::error!("playback :: stream error: {}", err),
        None,
    )?;
    stream.play()?;

    let duration = Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);
    done_rx.recv_timeout(duration + Duration::from_secs(2))?;
    // let the device flush its last buffer
    std::thread::sleep(Duration::from_millis(100));
    Ok(())
}

#[derive(Default)]
pub struct PlaybackSink;

impl ToneSink for PlaybackSink {
    fn accept(&mut self, tone: &RenderedTone, config: &SweepConfig) -> Result<(), Box<dyn std::error::Error>> {
        let samples = tone.scaled(config.headroom).map(|v| v as f32).collect::<Vec<_>>();
        log::info!("play :: {}", tone.label());
        play_blocking(&samples, tone.waveform.sample_rate())
    }
}

#[cfg(test)]
fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
    SupportedStreamConfigRange::new(
        channels,
        SampleRate(min),
        SampleRate(max),
        cpal::SupportedBufferSize::Unknown,
        format,
    )
}

#[test]
fn test_pick_output_config_matches_rate_and_format() {
    let supported = vec![
        range(2, 48000, 48000, SampleFormat::F32),
        range(2, 44100, 96000, SampleFormat::I16),
        range(1, 8000, 192000, SampleFormat::F32),
        range(2, 8000, 192000, SampleFormat::F32),
    ];
    let config = pick_output_config(&supported, 44100, 2).unwrap();
    assert_eq!(config.channels, 2);
    assert_eq!(config.sample_rate, SampleRate(44100));

    let config = pick_output_config(&supported, 44100, 6).unwrap();
    assert_eq!(config.channels, 1);
}

#[test]
fn test_pick_output_config_rejects_unsupported_rate() {
    let mix_rate_only = vec![
        range(2, 48000, 48000, SampleFormat::F32),
        range(2, 44100, 44100, SampleFormat::I16),
    ];
    assert!(pick_output_config(&mix_rate_only, 44100, 2).is_none());
    assert!(pick_output_config(&mix_rate_only, 48000, 2).is_some());
    assert!(pick_output_config(&[], 44100, 2).is_none());
}
