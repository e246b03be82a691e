//! SPE 3.0 decoder CLI application.
//!
//! Decodes Princeton Instruments LightField SPE files, prints a summary and
//! optionally exports the frames.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use spe_core::output::{self, OutputFormat};
use spe_core::{load_file, SpeFile};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// SPE 3.0 file decoder for Princeton Instruments LightField data.
///
/// Loads a .spe file, reports its capture geometry and exports frames to CSV
/// or a packed binary format.
#[derive(Parser, Debug)]
#[command(name = "spe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input .spe file path
    ///
    /// When omitted, the path is read interactively from standard input.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Output file path (.csv, .bin)
    ///
    /// The output format is determined by the file extension:
    /// - .csv: one row per sample: frame,region,y,x,value
    /// - .bin: packed little-endian samples behind a small header
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print the XML footer as an indented tree
    #[arg(long)]
    footer: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Asks for a file path on the terminal.
fn prompt_for_path() -> Result<PathBuf> {
    eprint!("SPE file to load: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read file path from stdin")?;

    let path = line.trim();
    if path.is_empty() {
        anyhow::bail!("No input file given");
    }
    Ok(PathBuf::from(path))
}

fn print_summary(spe: &SpeFile, input: &Path, seconds: f64) {
    eprintln!();
    eprintln!("Summary:");
    eprintln!("  Input:        {:?}", input);
    eprintln!("  Frames:       {}", spe.frame_count());
    eprintln!("  Data type:    {}", spe.element_type());
    eprintln!("  Regions:      {}", spe.region_count());
    for (i, (region, coords)) in spe.regions.iter().zip(&spe.coordinates).enumerate() {
        eprintln!(
            "    [{}] x={} y={} {}x{} binning {}x{} -> {} rows x {} cols",
            i,
            region.x,
            region.y,
            region.width,
            region.height,
            region.x_binning,
            region.y_binning,
            coords.ydim(),
            coords.xdim()
        );
    }
    match &spe.wavelength {
        Some(wl) => match wl.values() {
            Ok(values) if !values.is_empty() => eprintln!(
                "  Wavelength:   {} points, {:.3} .. {:.3}",
                values.len(),
                values[0],
                values[values.len() - 1]
            ),
            Ok(_) => eprintln!("  Wavelength:   empty"),
            Err(e) => eprintln!("  Wavelength:   unreadable ({})", e),
        },
        None => eprintln!("  Wavelength:   not present"),
    }
    eprintln!("  Duration:     {:.3}s", seconds);
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let input = match args.input {
        Some(path) => path,
        None => prompt_for_path()?,
    };

    // Validate the export target before decoding
    let output_format = args
        .output
        .as_ref()
        .map(OutputFormat::from_path)
        .transpose()
        .context("Invalid output path")?;

    // Setup progress bar
    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb
    };

    let start_time = Instant::now();

    progress.set_message(format!(
        "Decoding {:?}...",
        input.file_name().unwrap_or_default()
    ));

    let spe = load_file(&input).with_context(|| format!("Failed to decode {:?}", input))?;

    if args.footer {
        progress.suspend(|| -> Result<()> {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            spe.footer
                .write_tree(&mut handle)
                .context("Failed to print footer")?;
            handle.flush()?;
            Ok(())
        })?;
    }

    if let (Some(output_path), Some(format)) = (&args.output, output_format) {
        progress.set_message(format!(
            "Writing to {:?}...",
            output_path.file_name().unwrap_or_default()
        ));

        match format {
            OutputFormat::Csv => output::write_csv(output_path, &spe.frames, &spe.coordinates)
                .context("Failed to write CSV output")?,
            OutputFormat::Binary => {
                output::write_binary(output_path, &spe.frames, &spe.coordinates)
                    .context("Failed to write binary output")?
            }
        }
    }

    let total_duration = start_time.elapsed();

    progress.finish_with_message(format!(
        "Done! Decoded {} frames x {} regions in {:.2}s",
        spe.frame_count(),
        spe.region_count(),
        total_duration.as_secs_f64()
    ));

    if !args.quiet {
        print_summary(&spe, &input, total_duration.as_secs_f64());
        if let Some(output_path) = &args.output {
            eprintln!("  Output:       {:?}", output_path);
        }
    }

    Ok(())
}
