//! Statistical behavior of the drawing pass: Poisson draws conserve the
//! expected count and calibration hits the requested total.

use skygen_backends::HostSequentialHarness;
use skygen_core::{
    Footprint, HistogramConfig, Homogeneous, LambertProjection, NoExtinction, PencilBeam, SkyGenerator, SkygenConfig,
    StarSink, StarTable,
};

type Generator = SkyGenerator<Homogeneous, NoExtinction, HostSequentialHarness>;

/// One pixel and one (apparent, absolute) cell, calibrated so the cell
/// expects `mu` stars.
fn single_cell(mu: f64) -> Generator {
    let config = SkygenConfig {
        m0: 16.0,
        m1: 16.0,
        abs_mag_bright: 5.0,
        abs_mag_faint: 5.0,
        lanes: 1,
        streams: 1,
        seed: 2024,
        target_count: Some(mu),
        ..SkygenConfig::default()
    };
    let beam = PencilBeam::new(&LambertProjection::north(), 0, 0.3, -0.2, 0.01, 1.0, 0);
    let footprint = Footprint::new(&[beam], None).unwrap();
    SkyGenerator::new(config, Homogeneous::new(1e-3), footprint, NoExtinction, HostSequentialHarness::new()).unwrap()
}

/// Star counts of `passes` independent drawing passes.
fn repeated_draws(generator: &mut Generator, passes: usize) -> Vec<f64> {
    let sink = StarTable::with_capacity(1000);
    (0..passes)
        .map(|_| {
            let mut stars = 0;
            generator
                .draw(&sink, |sink| {
                    stars += sink.drain().len();
                    Ok(())
                })
                .unwrap();
            stars as f64
        })
        .collect()
}

fn mean_and_variance(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

#[test]
fn test_small_mean_draws_are_poisson() {
    let mu = 3.7;
    let mut generator = single_cell(mu);
    let counts = generator.integrate_counts().unwrap();
    assert_eq!(counts.cells, 1);
    assert!((counts.count * counts.norm / generator.config().norm - mu).abs() < 1e-9);

    let n = 2000;
    let (mean, var) = mean_and_variance(&repeated_draws(&mut generator, n));
    assert!((mean - mu).abs() < 5.0 * (mu / n as f64).sqrt(), "mean {mean}");
    assert!((var - mu).abs() < 0.7, "variance {var}");
}

#[test]
fn test_large_mean_draws_are_poisson() {
    let mu = 42.0;
    let mut generator = single_cell(mu);
    generator.integrate_counts().unwrap();

    let n = 1000;
    let (mean, var) = mean_and_variance(&repeated_draws(&mut generator, n));
    assert!((mean - mu).abs() < 5.0 * (mu / n as f64).sqrt(), "mean {mean}");
    assert!((var - mu).abs() / mu < 0.2, "variance {var}");
}

#[test]
fn test_streams_advance_between_passes() {
    let mut generator = single_cell(20.0);
    generator.integrate_counts().unwrap();
    let before = generator.streams().to_words().unwrap();
    let draws = repeated_draws(&mut generator, 10);
    assert_ne!(generator.streams().to_words().unwrap(), before);
    assert!(draws.windows(2).any(|w| w[0] != w[1]));
}

#[test]
fn test_calibration_hits_target_count() {
    let target = 300.0;
    let config = SkygenConfig {
        m0: 16.0,
        m1: 19.0,
        abs_mag_faint: 10.0,
        lanes: 64,
        streams: 64,
        target_count: Some(target),
        histogram: Some(HistogramConfig {
            lrho0: -6.0,
            dlrho: 0.25,
            nbins: 40,
        }),
        ..SkygenConfig::default()
    };
    let footprint = Footprint::polar_cap(1, 0.06, 0.02, None).unwrap();
    let mut generator =
        SkyGenerator::new(config, Homogeneous::new(1e-3), footprint, NoExtinction, HostSequentialHarness::new())
            .unwrap();
    let counts = generator.integrate_counts().unwrap();

    let cells_per_pixel = generator.params().shape.cells();
    assert_eq!(counts.cells, cells_per_pixel * generator.footprint().len() as u64);
    assert_eq!(counts.histogram.iter().sum::<u64>(), counts.cells);
    assert!((counts.per_pixel.iter().sum::<f64>() - counts.covered).abs() / counts.covered < 1e-9);
    assert!((counts.norm - target / counts.covered).abs() / counts.norm < 1e-12);

    // whole pixels are drawn, so the catalog overshoots the footprint target
    // by the uncovered fraction
    let expected = target * counts.count / counts.covered;
    let n = 20;
    let (mean, _) = mean_and_variance(&{
        let sink = StarTable::with_capacity(10_000);
        (0..n)
            .map(|_| {
                generator.draw(&sink, |_| Ok(())).unwrap();
                let drawn = sink.len() as f64;
                sink.reset();
                drawn
            })
            .collect::<Vec<_>>()
    });
    assert!((mean - expected).abs() < 5.0 * (expected / n as f64).sqrt(), "mean {mean} expected {expected}");

    // a second counting pass starts over from the configured norm
    let again = generator.integrate_counts().unwrap();
    assert_eq!(again.norm, counts.norm);
}
