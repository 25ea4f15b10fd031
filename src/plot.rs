use std::path::PathBuf;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::config::SweepConfig;
use crate::resonator::ZeroPolePair;
use crate::sweep::{RenderedTone, ToneSink};

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

fn draw_waveform(area: &Area<'_>, title: &str, samples: &[f64], y_limit: f64) -> Result<(), Box<dyn std::error::Error>> {
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..samples.len().max(1) as f64, -y_limit..y_limit)?;

    chart
        .configure_mesh()
        .x_desc("Time (samples)")
        .y_desc("Amplitude")
        .draw()?;
    chart.draw_series(LineSeries::new(
        samples.iter().enumerate().map(|(n, v)| (n as f64, v.max(-y_limit).min(y_limit))),
        &BLUE,
    ))?;
    Ok(())
}

fn draw_zeros_poles(area: &Area<'_>, zp: &ZeroPolePair) -> Result<(), Box<dyn std::error::Error>> {
    // keep the unit circle in view even for poles outside it
    let radius = zp
        .poles
        .iter()
        .chain(zp.zeros.iter())
        .map(|c| c.norm())
        .fold(1.0f64, f64::max)
        * 1.2;

    let mut chart = ChartBuilder::on(area)
        .caption("Zeros and Poles", ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-radius..radius, -radius..radius)?;

    chart
        .configure_mesh()
        .x_desc("Real Part")
        .y_desc("Imaginary Part")
        .draw()?;
    chart.draw_series(LineSeries::new(
        (0..=256).map(|i| {
            let phi = i as f64 / 256.0 * 2.0 * std::f64::consts::PI;
            (phi.cos(), phi.sin())
        }),
        &BLACK.mix(0.3),
    ))?;
    chart
        .draw_series(zp.zeros.iter().map(|z| Circle::new((z.re, z.im), 6, &BLUE)))?
        .label("Zeros")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .draw_series(zp.poles.iter().map(|p| Cross::new((p.re, p.im), 6, &RED)))?
        .label("Poles")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    Ok(())
}

/// Renders the scaled waveform, plus a zero/pole panel when the tone has one.
pub fn plot_tone(tone: &RenderedTone, config: &SweepConfig) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = config.output_dir.join(format!("{}.png", tone.label()));
    let samples = tone.scaled(config.headroom).collect::<Vec<_>>();
    {
        let root = BitMapBackend::new(&path, (1280, 960)).into_drawing_area();
        root.fill(&WHITE)?;
        match &tone.zeros_poles {
            Some(zp) => {
                let areas = root.split_evenly((2, 1));
                draw_waveform(&areas[0], &tone.title(), &samples, config.y_limit)?;
                draw_zeros_poles(&areas[1], zp)?;
            }
            None => {
                let title = format!("R={:.7}", tone.decay_rate);
                draw_waveform(&root, &title, &samples, config.y_limit)?;
            }
        }
        root.present()?;
    }
    Ok(path)
}

#[derive(Default)]
pub struct PlotSink;

impl ToneSink for PlotSink {
    fn accept(&mut self, tone: &RenderedTone, config: &SweepConfig) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&config.output_dir)?;
        let path = plot_tone(tone, config)?;
        log::debug!("plot :: saved {}", path.display());
        Ok(())
    }
}

#[test]
fn test_plot_sink_writes_pngs() {
    use crate::resonator::Stability;
    use crate::sweep::render;

    let dir = tempfile::tempdir().unwrap();
    let mut decay = SweepConfig::decay_sweep();
    decay.output_dir = dir.path().join("plots");
    let mut harmonic = SweepConfig::harmonic_sweep();
    harmonic.output_dir = decay.output_dir.clone();

    let waveform_only = render(&decay, 4, 0.9).unwrap();
    let with_zero_pole = render(&harmonic, 3, 0.9998555).unwrap();
    let diverging = render(&harmonic, 3, 1.02).unwrap();
    assert!(waveform_only.zeros_poles.is_none());
    assert!(with_zero_pole.zeros_poles.is_some());
    assert!(matches!(
        diverging.waveform.stability(),
        Stability::Diverging { overflow_at: Some(_) }
    ));

    let mut sink = PlotSink;
    sink.accept(&waveform_only, &decay).unwrap();
    sink.accept(&with_zero_pole, &harmonic).unwrap();
    sink.accept(&diverging, &harmonic).unwrap();

    for name in &[
        "plot-k-4-r-0.9000000.png",
        "plot-k-3-r-0.9998555.png",
        "plot-k-3-r-1.0200000.png",
    ] {
        let meta = std::fs::metadata(decay.output_dir.join(name)).unwrap();
        assert!(meta.len() > 0, "{} is empty", name);
    }
}
