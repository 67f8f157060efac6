// Edge detection
//
// This example finds debounced level crossings on an analog input or on the
// digital input stream of an LCONF data file.

use clap::Parser;
use lconf_rs::{ChannelRef, Edge, EventOptions, LConf, LoadOptions, Window};

#[derive(Parser)]
#[command(name = "find_events")]
#[command(version = "1.0")]
#[command(about = "Find edge crossings in an LCONF data file")]
struct Args {
    /// LCONF data file
    file: String,

    /// Analog input index or label
    #[arg(short, long, default_value = "0")]
    channel: String,

    /// Scan a bit of the digital input stream instead of an analog input
    #[arg(long, conflicts_with = "channel")]
    dibit: Option<usize>,

    #[arg(short, long, default_value_t = 0.0, help = "Crossing level")]
    level: f64,

    #[arg(short, long, default_value = "any", value_parser = ["any", "rising", "falling"])]
    edge: String,

    #[arg(long, default_value_t = 1, help = "Samples a new level must persist")]
    debounce: usize,

    #[arg(long, default_value_t = 0, help = "Derivatives to take before scanning")]
    diff: usize,

    #[arg(short = 'n', long, help = "Maximum number of events")]
    count: Option<usize>,

    #[arg(long, help = "Start time in seconds")]
    start: Option<f64>,

    #[arg(long, help = "Stop time in seconds")]
    stop: Option<f64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let lconf = LConf::open(&args.file, LoadOptions::default().with_data(true))?;

    let options = EventOptions {
        level: args.level,
        edge: args.edge.parse::<Edge>()?,
        start: args.start,
        stop: args.stop,
        count: args.count,
        debounce: args.debounce,
        diff: args.diff,
    };

    let events = match args.dibit {
        Some(bit) => lconf.get_dievents(Some(bit), &options)?,
        None => {
            let channel = match args.channel.parse::<usize>() {
                Ok(index) => ChannelRef::Index(index),
                Err(_) => ChannelRef::Label(args.channel.clone()),
            };
            lconf.get_events(channel, &options)?
        }
    };

    let time = lconf.get_time(&Window::all())?;
    println!("Found {} event(s)", events.len());
    for index in events {
        println!("  sample {index:>8}  t = {:.6} s", time[index]);
    }

    Ok(())
}
