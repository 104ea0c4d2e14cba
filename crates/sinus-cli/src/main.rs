use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use sinus_lib::detector::{Detector, DetectorConfig};
use sinus_lib::io::text as text_io;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(name = "sinus", version, about = "Single-lead real-time QRS monitor tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect beats in newline-delimited ADC samples from stdin or --input
    FindBeats {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Rescan with the half thresholds after a missed-beat timeout
        #[arg(long, default_value_t = false)]
        back_search: bool,
    },
    /// Emit one JSON line per detected beat with the running rhythm summary
    Stream {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        back_search: bool,
    },
    /// Emit the filtered rendering trace, one value per line
    Trace {
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::FindBeats { input, back_search } => {
            cmd_find_beats(input.as_deref(), back_search)?
        }
        Commands::Stream { input, back_search } => cmd_stream(input.as_deref(), back_search)?,
        Commands::Trace { input } => cmd_trace(input.as_deref())?,
    }
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<u16>> {
    match input {
        Some(path) => text_io::read_sample_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_sample_series(&buf)
        }
    }
}

fn detector(back_search: bool) -> Detector {
    Detector::new(DetectorConfig { back_search })
}

#[derive(Serialize)]
struct Beats {
    indices: Vec<i64>,
}

fn cmd_find_beats(input: Option<&Path>, back_search: bool) -> Result<()> {
    let samples = read_samples(input)?;
    let mut det = detector(back_search);
    let mut indices = Vec::new();
    for &sample in &samples {
        let record = det.push(sample);
        if record.is_qrs {
            indices.push(record.sample_index);
        }
    }
    info!("{} beats in {} samples", indices.len(), samples.len());
    println!("{}", serde_json::to_string(&Beats { indices })?);
    Ok(())
}

#[derive(Serialize)]
struct BeatLine {
    sample: i64,
    rr_average: f32,
    bpm: f32,
    is_regular: bool,
    evaluation: u8,
}

fn cmd_stream(input: Option<&Path>, back_search: bool) -> Result<()> {
    let samples = read_samples(input)?;
    let mut det = detector(back_search);
    for &sample in &samples {
        let record = det.push(sample);
        if record.is_qrs {
            let line = BeatLine {
                sample: record.sample_index,
                rr_average: record.rr_average,
                bpm: record.heart_rate_bpm(),
                is_regular: record.is_regular,
                evaluation: record.evaluation,
            };
            println!("{}", serde_json::to_string(&line)?);
        }
    }
    Ok(())
}

fn cmd_trace(input: Option<&Path>) -> Result<()> {
    let samples = read_samples(input)?;
    let mut det = Detector::default();
    for &sample in &samples {
        let record = det.push(sample);
        println!("{}", record.filtered);
    }
    Ok(())
}
