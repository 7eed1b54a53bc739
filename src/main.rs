use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mecanum_station::config::{CONFIG_PATH, LOOP_HZ, SUMMARY_DIR};
use mecanum_station::runtime::{self, DriveOptions, TuneOptions};

#[derive(Parser)]
#[command(name = "mecanum-station")]
#[command(about = "Driver station for a mecanum robot with an arm, on simulated hardware")]
struct Args {
    /// JSON file with runtime overrides (gains, thresholds, multipliers)
    #[arg(short, long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Control loop frequency
    #[arg(long, default_value_t = LOOP_HZ)]
    loop_hz: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive from OperatorCommand JSON lines on stdin, actuation JSON on stdout
    Drive {
        /// Start in robot-relative mode instead of field-relative
        #[arg(long)]
        robot_relative: bool,

        /// Directory for the end-of-match log
        #[arg(long, default_value = SUMMARY_DIR)]
        summary_dir: PathBuf,
    },
    /// Run the arm through setpoints and report overshoot and settle time
    Tune {
        /// Setpoints in encoder ticks (default: lift/intake, carry/intake)
        #[arg(short, long, value_delimiter = ',')]
        targets: Vec<i32>,

        #[arg(long)]
        p: Option<f64>,
        #[arg(long)]
        i: Option<f64>,
        #[arg(long)]
        d: Option<f64>,
        #[arg(long)]
        f: Option<f64>,

        /// Write the gains back to the config file after the runs
        #[arg(long)]
        save: bool,

        /// Give up on a run after this many simulated seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug); stdout carries data
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Drive {
            robot_relative,
            summary_dir,
        } => {
            runtime::run(DriveOptions {
                config_path: args.config,
                summary_dir,
                loop_hz: args.loop_hz,
                field_relative: !robot_relative,
            })
            .await
        }
        Commands::Tune {
            targets,
            p,
            i,
            d,
            f,
            save,
            timeout_secs,
        } => runtime::tune(TuneOptions {
            config_path: args.config,
            targets,
            p,
            i,
            d,
            f,
            save,
            loop_hz: args.loop_hz,
            run_timeout_secs: timeout_secs,
        })
        .and_then(|runs| {
            for stats in runs {
                println!("{}", serde_json::to_string(&stats)?);
            }
            Ok(())
        }),
    };

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
