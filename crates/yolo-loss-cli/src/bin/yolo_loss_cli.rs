use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use yolo_loss_cli::{
    backend::{default_device, LossBackend, BACKEND_NAME},
    config::{load_config, render_config, save_config},
    loss::YoloLossConfig,
    self_test::{run_self_test, SelfTestConfig},
};

#[derive(Parser, Debug)]
#[command(name = "yolo-loss-cli")]
#[command(about = "YOLO v1 detection loss: self-test and configuration tools")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate the loss on random predictions and an all-object target
    SelfTest {
        /// Number of synthetic images
        #[arg(short, long, default_value_t = 13)]
        batch_size: usize,

        /// Seed for the backend RNG
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        grid: GridArgs,
    },

    /// Write the loss configuration as JSON
    Config {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        grid: GridArgs,
    },

    /// Show backend information
    Info,
}

#[derive(Args, Debug)]
struct GridArgs {
    /// Loss configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the grid resolution S
    #[arg(long)]
    grid_size: Option<usize>,

    /// Override the number of boxes per cell B
    #[arg(long)]
    num_boxes: Option<usize>,
}

impl GridArgs {
    fn resolve(&self) -> Result<YoloLossConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!(config = %path.display(), "loading loss configuration");
                load_config(path)?
            }
            None => YoloLossConfig::new(),
        };
        if let Some(grid_size) = self.grid_size {
            config.grid_size = grid_size;
        }
        if let Some(num_boxes) = self.num_boxes {
            config.num_boxes = num_boxes;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::SelfTest {
            batch_size,
            seed,
            grid,
        } => {
            let loss_config = grid.resolve()?;
            tracing::info!(
                backend = BACKEND_NAME,
                grid_size = loss_config.grid_size,
                num_boxes = loss_config.num_boxes,
                batch_size,
                "running loss self-test",
            );

            let config = SelfTestConfig::new(loss_config, batch_size, seed);
            let report = run_self_test::<LossBackend>(&config, &default_device())?;

            println!("target: {:?}", report.target_shape);
            println!("predictions: {:?}", report.prediction_shape);
            println!("loss: {}", report.loss);
            tracing::info!(
                box_loss = report.terms["box"],
                object_loss = report.terms["object"],
                no_object_loss = report.terms["no_object"],
                "self-test completed",
            );
            Ok(())
        }

        Commands::Config { output, grid } => {
            let loss_config = grid.resolve()?;
            match output {
                Some(path) => {
                    save_config(&loss_config, &path)?;
                    tracing::info!(path = %path.display(), "saved loss configuration");
                }
                None => println!("{}", render_config(&loss_config)?),
            }
            Ok(())
        }

        Commands::Info => {
            println!("YOLO loss information:");
            println!("  Backend: {BACKEND_NAME}");
            println!("  Device: {:?}", default_device());
            println!("  Default loss: {}", YoloLossConfig::new().init());
            Ok(())
        }
    }
}
