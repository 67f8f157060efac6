// Configuration report
//
// This example loads the configuration section of an LCONF file and prints
// every device and channel with its effective parameters.

use clap::Parser;
use lconf_rs::{ChannelKind, LConf, LoadOptions};

#[derive(Parser)]
#[command(name = "dump_config")]
#[command(version = "1.0")]
#[command(about = "Print the configuration stored in an LCONF file")]
struct Args {
    /// LCONF configuration or data file
    file: String,

    /// Only list devices, channel counts and labels
    #[arg(short, long, help = "Print a summary instead of every parameter")]
    summary: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let lconf = LConf::open(&args.file, LoadOptions::default())?;
    if let Some(path) = lconf.filename() {
        println!("File: {}", path.display());
    }

    if !args.summary {
        print!("{lconf}");
        return Ok(());
    }

    println!("{} device(s)", lconf.ndev());
    for dev in 0..lconf.ndev() {
        println!("\nDevice {dev}");
        println!("  connection: {}", lconf.device(dev)?.params.connection());
        println!("  input streams: {}", lconf.nistream(dev)?);
        for kind in ChannelKind::ALL {
            let labels = lconf.get_labels(dev, kind)?;
            println!("  {kind}: {} {:?}", labels.len(), labels);
        }
        for (name, value) in lconf.meta(dev)?.iter() {
            println!("  meta {name} = {value}");
        }
    }

    Ok(())
}
