// Channel data extraction
//
// This example loads the data block of an LCONF file and prints a summary
// of every analog input, or writes a window of the samples as a table.

use clap::Parser;
use lconf_rs::{ChannelKind, LConf, LoadOptions, Window};
use polars::prelude::*;

#[derive(Parser)]
#[command(name = "channel_data")]
#[command(version = "1.0")]
#[command(about = "Summarize or print the samples in an LCONF data file")]
struct Args {
    /// LCONF data file
    file: String,

    #[arg(long, help = "Start time in seconds")]
    start: Option<f64>,

    #[arg(long, help = "Stop time in seconds")]
    stop: Option<f64>,

    #[arg(short, long, help = "Samples to skip between returned samples")]
    downsample: Option<usize>,

    #[arg(long, help = "Do not apply the analog input calibration")]
    raw: bool,

    #[arg(long, help = "Expand the digital input stream into one column per bit")]
    dibits: bool,

    #[arg(short, long, help = "Print the samples as a table")]
    table: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let options = LoadOptions::default()
        .with_data(true)
        .with_calibration(!args.raw)
        .with_dibits(args.dibits);
    let lconf = LConf::open(&args.file, options)?;

    let window = Window {
        start: args.start,
        stop: args.stop,
        downsample: args.downsample,
    };

    println!("Recorded: {}", lconf.timestamp()?.trim_end());
    println!(
        "{} samples at {} Hz{}",
        lconf.ndata()?,
        lconf.samples()?.samplehz(),
        if lconf.calibrated() { " (calibrated)" } else { "" }
    );

    if args.table {
        let df = lconf.to_dataframe(&window)?;
        println!("{df}");
        return Ok(());
    }

    let time = lconf.get_time(&window)?;
    println!("Window: {} samples", time.len());
    for (index, label) in lconf.get_labels(0, ChannelKind::AnalogInput)?.iter().enumerate() {
        let values = lconf.get_channel(index, &window)?;
        print_channel_summary(index, label, &values);
    }

    let stats = lconf
        .lazy_frame(&window)?
        .select([col("time").min().alias("first"), col("time").max().alias("last")])
        .collect()?;
    println!("\nTime span:\n{stats}");

    Ok(())
}

fn print_channel_summary(index: usize, label: &str, values: &[f64]) {
    if values.is_empty() {
        println!("  AI{index} {label:?}: no samples");
        return;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    println!("  AI{index} {label:?}: min={min:.4} max={max:.4} mean={mean:.4}");
}
