//! pathopt command-line demonstration.
//!
//! Runs the optimizer core on the built-in analytic 2D test surface: first a
//! single-geometry minimization, then a nudged-elastic-band chain spanning
//! the two minima of the surface.
//!
//! # Usage
//!
//! ```bash
//! # Run with the built-in defaults (raised cycle budget)
//! pathopt
//!
//! # Run with optimizer settings from an INI file
//! pathopt my_settings.ini
//! ```
//!
//! Per-cycle progress is emitted through the `log` facade; set `RUST_LOG`
//! (e.g. `RUST_LOG=info`) to see it.

use nalgebra::DVector;
use pathopt::calculator::AnaPot;
use pathopt::config::OptSettings;
use pathopt::cos::ChainOfStates;
use pathopt::geometry::Geometry;
use pathopt::optimizer::{Optimizer, SteepestDescent, Target};
use std::env;
use std::path::Path;
use std::process;

/// Left minimum of the analytic test surface.
const LEFT_MINIMUM: [f64; 3] = [-1.05274, 1.02776, 0.0];
/// Right minimum of the analytic test surface.
const RIGHT_MINIMUM: [f64; 3] = [1.94101, 3.85427, 0.0];

fn anapot_geom(coords: [f64; 3]) -> Geometry {
    Geometry::new(
        vec!["X".to_string()],
        coords.to_vec(),
        Box::new(AnaPot::new()),
    )
}

/// Linearly interpolated chain between the two surface minima.
fn interpolated_chain(between: usize, k: f64) -> ChainOfStates {
    let start = DVector::from_vec(LEFT_MINIMUM.to_vec());
    let end = DVector::from_vec(RIGHT_MINIMUM.to_vec());
    let total = between + 1;
    let images = (0..=total)
        .map(|i| {
            let fraction = i as f64 / total as f64;
            let coords = &start + (&end - &start) * fraction;
            anapot_geom([coords[0], coords[1], coords[2]])
        })
        .collect();
    ChainOfStates::new(images, k, true)
}

fn run_minimization(settings: &OptSettings) -> Result<(), Box<dyn std::error::Error>> {
    println!("**** Single-geometry minimization on the analytic surface ****");
    let mut geom = anapot_geom([-0.7, 1.5, 0.0]);

    let sd = SteepestDescent::new(settings);
    let mut opt = Optimizer::new(settings.clone(), Box::new(sd))?;
    let outcome = opt.run(&mut geom)?;

    let coords = geom.coords();
    println!(
        "  converged: {}  cycles: {}  final point: ({:.5}, {:.5})",
        outcome.converged(),
        opt.cur_cycle(),
        coords[0],
        coords[1]
    );
    println!("  final energy: {:.6}", geom.energy()?);
    Ok(())
}

fn run_neb(settings: &OptSettings) -> Result<(), Box<dyn std::error::Error>> {
    println!("**** NEB chain between the two surface minima ****");
    let mut chain = interpolated_chain(5, 0.01);

    let sd = SteepestDescent::new(settings);
    let mut opt = Optimizer::new(settings.clone(), Box::new(sd))?;
    let outcome = opt.run(&mut chain)?;

    println!(
        "  converged: {}  cycles: {}",
        outcome.converged(),
        opt.cur_cycle()
    );
    let energies = chain.energies()?;
    let barrier = energies
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    for (i, energy) in energies.iter().enumerate() {
        println!("  image {:02}: E = {:+.6}", i, energy);
    }
    println!("  highest image energy: {:+.6}", barrier);
    Ok(())
}

fn load_settings() -> Result<OptSettings, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => {
            // The library default of 15 cycles is too tight for a cold-start
            // demo run; raise the budget.
            let mut settings = OptSettings::default();
            settings.max_cycles = 200;
            Ok(settings)
        }
        2 => Ok(OptSettings::from_ini_file(Path::new(&args[1]))?),
        _ => {
            eprintln!("usage: pathopt [settings.ini]");
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stdout)
        .init();

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Error loading settings: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = run_minimization(&settings) {
        eprintln!("Minimization failed: {}", err);
        process::exit(1);
    }
    if let Err(err) = run_neb(&settings) {
        eprintln!("NEB optimization failed: {}", err);
        process::exit(1);
    }
}
