use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gear_optimizer::config::DrivetrainConfig;
use gear_optimizer::ride_processor;

/// Recommend the front chainring that minimizes drivetrain loss over a recorded ride.
#[derive(Debug, Parser)]
#[command(name = "gear-optimizer", version, about)]
struct Args {
    /// A .gpx ride file, or a folder of them
    input: PathBuf,

    /// Drivetrain config (TOML). Built-in road setup when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where CSV reports are written
    #[arg(short, long, default_value = "gear_analysis")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            println!("📄 Loading drivetrain config from: {}", path.display());
            DrivetrainConfig::load(path)?
        }
        None => {
            println!("ℹ️  No config given, using built-in drivetrain defaults");
            DrivetrainConfig::default()
        }
    };
    let drivetrain = config.build()?;

    println!("\n⚙️  CHAINRING OPTIMIZER");
    println!("======================");
    println!(
        "• Candidates: {}T - {}T ({} chainrings)",
        drivetrain.candidate_chainrings.iter().min().copied().unwrap_or_default(),
        drivetrain.candidate_chainrings.iter().max().copied().unwrap_or_default(),
        drivetrain.candidate_chainrings.len()
    );
    println!("• Cassette: {:?}", drivetrain.cassette);
    println!("• Tire circumference: {:.0} mm", drivetrain.tire_circumference_mm);
    println!("• Training zones:");
    for zone in drivetrain.zones.iter() {
        println!("  - {:<20} {:>5.0}-{:<5.0} W  x{}", zone.name, zone.min_w, zone.max_w, zone.coefficient);
    }
    println!("• Preferred cogs: {:?} (reward weight {})", drivetrain.preferred_cogs, drivetrain.reward_weight);
    println!("⚡ Scoring chainrings in parallel on {} cores\n", num_cpus::get());

    if args.input.is_dir() {
        ride_processor::process_ride_folder(&args.input, &args.output, &drivetrain)?;
    } else {
        ride_processor::process_ride_file(&args.input, &args.output, &drivetrain)?;
    }

    Ok(())
}
