use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use diffraction_analysis::config::{Config, ConfigFormat};
use diffraction_analysis::logging::{init_logging, new_correlation_id};
use diffraction_analysis::*;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "diffract")]
#[command(about = "Registration, symmetrization and azimuthal averaging of diffraction images")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a displaced block against its reference
    Register {
        /// Image side length in pixels
        #[arg(short, long, default_value = "64")]
        size: usize,

        /// Row displacement of the moving block
        #[arg(long, default_value = "2", allow_hyphen_values = true)]
        shift_row: isize,

        /// Column displacement of the moving block
        #[arg(long, default_value = "1", allow_hyphen_values = true)]
        shift_col: isize,
    },

    /// Track a drifting Bragg peak through a sequence and correct the drift
    Track {
        /// Number of frames in the sequence
        #[arg(short = 'n', long, default_value = "10")]
        frames: usize,

        /// Image side length in pixels
        #[arg(short, long, default_value = "64")]
        size: usize,

        /// Per-frame drift along rows
        #[arg(long, default_value = "0.5", allow_hyphen_values = true)]
        drift_row: f64,

        /// Per-frame drift along columns
        #[arg(long, default_value = "-0.25", allow_hyphen_values = true)]
        drift_col: f64,
    },

    /// Symmetrize a synthetic pattern with a slightly broken symmetry
    Symmetrize {
        /// Image side length in pixels
        #[arg(short, long, default_value = "65")]
        size: usize,

        /// Rotational order; ignored when --axis is given
        #[arg(short, long, default_value = "6")]
        fold: usize,

        /// Mirror axis angle in degrees
        #[arg(short, long, allow_hyphen_values = true)]
        axis: Option<f64>,
    },

    /// Azimuthally average a synthetic ring pattern
    Reduce {
        /// Image side length in pixels
        #[arg(short, long, default_value = "128")]
        size: usize,

        /// Scattering-vector magnitude per pixel of radius
        #[arg(short, long, default_value = "0.01")]
        q_per_pixel: f64,

        /// Bin width in q units; derived from the image when omitted
        #[arg(short, long)]
        bin_width: Option<f64>,
    },

    /// Print the effective configuration
    Config {
        #[arg(short, long, value_enum, default_value = "toml")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Toml,
    Json,
}

impl From<OutputFormat> for ConfigFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Toml => ConfigFormat::Toml,
            OutputFormat::Json => ConfigFormat::Json,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Err(errors) = config.validate() {
        bail!("invalid configuration: {}", errors.join("; "));
    }

    let level = match cli.verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    };
    if let Some(level) = level {
        let logging = &mut config.logging;
        for field in [
            &mut logging.global_level,
            &mut logging.algorithm_level,
            &mut logging.pipeline_level,
            &mut logging.analysis_level,
        ] {
            *field = level.to_string();
        }
    }
    let _guard = init_logging(&config.logging)?;
    new_correlation_id();

    match cli.command {
        Commands::Register { size, shift_row, shift_col } => {
            handle_register(&config, size, shift_row, shift_col)?;
        }
        Commands::Track { frames, size, drift_row, drift_col } => {
            handle_track(&config, frames, size, drift_row, drift_col)?;
        }
        Commands::Symmetrize { size, fold, axis } => {
            handle_symmetrize(&config, size, fold, axis)?;
        }
        Commands::Reduce { size, q_per_pixel, bin_width } => {
            handle_reduce(&config, size, q_per_pixel, bin_width)?;
        }
        Commands::Config { format } => {
            println!("{}", config.render(format.into())?);
        }
    }

    Ok(())
}

fn handle_register(config: &Config, size: usize, shift_row: isize, shift_col: isize) -> anyhow::Result<()> {
    if size < 8 {
        bail!("image size must be at least 8 pixels, got {size}");
    }
    let anchor = (size / 2 - 2) as isize;
    let reference = block_image(size, anchor, anchor);
    let moving = block_image(size, anchor + shift_row, anchor + shift_col);
    let mask = Mask::from_elem((size, size), true);

    let aligner = MaskedCorrelationAligner::new(config.registration.clone());
    let result = aligner.register_detailed(&reference, &mask, &moving, &mask)?;

    let report = json!({
        "expected": { "row": shift_row, "col": shift_col },
        "result": result,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_track(config: &Config, frames: usize, size: usize, drift_row: f64, drift_col: f64) -> anyhow::Result<()> {
    if size < 16 {
        bail!("image size must be at least 16 pixels, got {size}");
    }
    let center = Center::of_shape((size, size));
    let sequence = (0..frames).map(|index| {
        let peak = Center::new(
            center.row + drift_row * index as f64,
            center.col + drift_col * index as f64,
        );
        Frame::unmasked(gaussian_spot((size, size), peak, 2.5))
    });

    let region = BoundingBox::new(size / 4, size / 4, size / 2, size / 2);
    let aligner = StackAligner::from_config(config);

    let mut stream = aligner.track_and_align(sequence, region);
    let run_id = stream.run_id();

    let mut aligned_frames = Vec::with_capacity(frames);
    for aligned in stream.by_ref() {
        let aligned = aligned?;
        aligned_frames.push(json!({
            "index": aligned.index,
            "offset": aligned.offset,
            "cumulative_offset": aligned.cumulative_offset,
            "skipped": aligned.is_skipped(),
        }));
    }

    let report = json!({
        "run_id": run_id.to_string(),
        "drift": stream.cumulative_offset(),
        "frames": aligned_frames,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_symmetrize(config: &Config, size: usize, fold: usize, axis: Option<f64>) -> anyhow::Result<()> {
    let shape = (size, size);
    let center = Center::of_shape(shape);
    let image = lattice_pattern(shape, center, fold.max(1));
    let mut mask = Mask::from_elem(shape, true);
    // Beam block covering one quadrant's edge
    for row in 0..size / 2 {
        for col in 0..size / 8 {
            mask[[row, col]] = false;
        }
    }

    let symmetrizer = Symmetrizer::new(config.symmetry.clone());
    let result = match axis {
        Some(angle) => symmetrizer.reflection(&image, &mask, center, angle)?,
        None => symmetrizer.nfold(&image, &mask, center, fold)?,
    };

    let changed = image
        .iter()
        .zip(result.image.iter())
        .map(|(before, after)| (before - after).abs())
        .fold(0.0, f64::max);

    let operation = if axis.is_some() { "reflection" } else { "nfold" };
    let report = json!({
        "shape": [size, size],
        "operation": operation,
        "valid_input_pixels": mask.iter().filter(|valid| **valid).count(),
        "valid_output_pixels": result.mask.iter().filter(|valid| **valid).count(),
        "max_abs_change": changed,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_reduce(config: &Config, size: usize, q_per_pixel: f64, bin_width: Option<f64>) -> anyhow::Result<()> {
    let shape = (size, size);
    let center = Center::of_shape(shape);
    let field = radial_scattering_field(shape, center, q_per_pixel);
    let image = field.mapv(|q| {
        let ring = |q0: f64| (-(q - q0).powi(2) / (2.0 * (2.0 * q_per_pixel).powi(2))).exp();
        100.0 * ring(0.2 * size as f64 * q_per_pixel) + 40.0 * ring(0.35 * size as f64 * q_per_pixel)
    });
    let mask = Mask::from_elem(shape, true);

    let reducer = RadialReducer::new(config.radial.clone());
    let profile = match bin_width {
        Some(width) => reducer.reduce_with_width(&image, &field, &mask, center, Some(width))?,
        None => reducer.reduce(&image, &field, &mask, center)?,
    };

    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn block_image(size: usize, top: isize, left: isize) -> Image {
    Image::from_shape_fn((size, size), |(row, col)| {
        let (row, col) = (row as isize, col as isize);
        if (top..top + 3).contains(&row) && (left..left + 3).contains(&col) {
            10.0
        } else {
            0.0
        }
    })
}

fn gaussian_spot(shape: (usize, usize), peak: Center, sigma: f64) -> Image {
    Image::from_shape_fn(shape, |(row, col)| {
        let d = peak.distance_to(row as f64, col as f64);
        (-d * d / (2.0 * sigma * sigma)).exp()
    })
}

/// Ring of `fold` Bragg peaks, with a small symmetry-breaking distortion.
fn lattice_pattern(shape: (usize, usize), center: Center, fold: usize) -> Image {
    let radius = shape.0.min(shape.1) as f64 / 4.0;
    Image::from_shape_fn(shape, |(row, col)| {
        (0..fold)
            .map(|k| {
                let angle = (k as f64 * 360.0 / fold as f64).to_radians();
                let strength = 1.0 + 0.1 * k as f64;
                let peak = Center::new(center.row - radius * angle.sin(), center.col + radius * angle.cos());
                let d = peak.distance_to(row as f64, col as f64);
                strength * (-d * d / 4.0).exp()
            })
            .sum()
    })
}
