//! CLI entry point for BCAM.
//!
//! ```bash
//! bcam serve --bind 0.0.0.0:8080
//! bcam --simulate expose --exposure 2.0 --xbin 8 --ybin 8
//! bcam focus goto 4200
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bcam::config::BcamConfig;
use bcam::hardware::acquisition::RoiRequest;
use bcam::hardware::capabilities::CameraDriver;
use bcam::hardware::discovery::parse_device_str;
use bcam::hardware::simulated::SimulatedCamera;
use bcam::hardware::MotionMode;
use bcam::server::{self, AppState};
use bcam::session::Session;
use bcam::{fits, logging};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "bcam")]
#[command(about = "CCD camera and focuser control", long_about = None)]
struct Cli {
    /// Configuration file (default: config/bcam.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use simulated devices regardless of configuration
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web front-end
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Print camera and focuser status as JSON
    Status,

    /// Print camera discovery records
    Discover,

    /// Print the effective configuration as TOML
    Config,

    /// Take one exposure and write it as FITS
    Expose {
        /// Exposure time in seconds
        #[arg(long)]
        exposure: Option<f64>,

        /// Column binning
        #[arg(long)]
        xbin: Option<u32>,

        /// Row binning
        #[arg(long)]
        ybin: Option<u32>,

        /// Keep the shutter closed
        #[arg(long)]
        dark: bool,

        /// Region in unbinned pixels: x0,y0,x1,y1
        #[arg(long, value_parser = parse_roi)]
        roi: Option<(u32, u32, u32, u32)>,

        /// Output file (default: <output.directory>/<prefix>_<UTC time>.fits)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Focuser control
    Focus {
        #[command(subcommand)]
        action: FocusAction,
    },
}

#[derive(Subcommand)]
enum FocusAction {
    /// Print position, limits and temperature
    Position,
    /// Seek the home position
    Home,
    /// Move to an absolute position
    Goto {
        position: i64,
        /// Return once the move is accepted
        #[arg(long)]
        no_wait: bool,
    },
    /// Move by a relative number of steps
    Step {
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        /// Return once the move is accepted
        #[arg(long)]
        no_wait: bool,
    },
}

fn parse_roi(raw: &str) -> Result<(u32, u32, u32, u32), String> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid ROI '{}': {}", raw, e))?;
    match values.as_slice() {
        [x0, y0, x1, y1] => Ok((*x0, *y0, *x1, *y1)),
        _ => Err(format!("ROI needs four values x0,y0,x1,y1, got '{}'", raw)),
    }
}

fn mode(no_wait: bool) -> MotionMode {
    if no_wait {
        MotionMode::Async
    } else {
        MotionMode::Blocking
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BcamConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BcamConfig::load()?,
    };
    config.validate()?;
    logging::init_from_config(&config)?;
    info!(name = %config.application.name, simulate = cli.simulate, "Starting");

    match cli.command {
        Commands::Discover => return discover(&config).await,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            return Ok(());
        }
        _ => {}
    }

    let session = Arc::new(Session::from_config(&config, cli.simulate).await?);
    let result = run(cli.command, &config, Arc::clone(&session)).await;
    session.close().await?;
    result
}

/// Discovery does not need an open session.
async fn discover(config: &BcamConfig) -> Result<()> {
    let driver = SimulatedCamera::from_config(&config.camera.simulated);
    let raw = driver.discover().await?;
    let records = parse_device_str(&raw);
    if records.is_empty() {
        println!("No cameras found");
    }
    for record in records {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}

async fn run(command: Commands, config: &BcamConfig, session: Arc<Session>) -> Result<()> {
    match command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or(config.server.bind);
            let state = Arc::new(AppState::new(session, config.exposure.clone()));
            server::serve(state, bind).await?;
        }
        Commands::Status => {
            let status = session.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Discover => discover(config).await?,
        Commands::Config => print!("{}", config.to_toml()?),
        Commands::Expose {
            exposure,
            xbin,
            ybin,
            dark,
            roi,
            output,
        } => {
            let defaults = &config.exposure;
            let shutter_open = if dark { false } else { defaults.shutter_open };
            let mut request = RoiRequest::new(
                exposure.unwrap_or(defaults.exposure_seconds),
                shutter_open,
            )
            .with_binning(xbin.unwrap_or(defaults.x_bin), ybin.unwrap_or(defaults.y_bin));
            if let Some((x0, y0, x1, y1)) = roi {
                request = request.with_region(x0, y0, x1, y1);
            }

            let exposure = session.expose(&request).await?;
            let path = match output {
                Some(path) => path,
                None => {
                    tokio::fs::create_dir_all(&config.output.directory).await?;
                    config.output.directory.join(format!(
                        "{}_{}.fits",
                        config.output.prefix,
                        chrono::Utc::now().format("%Y%m%dT%H%M%S")
                    ))
                }
            };
            fits::write(&path, &exposure.frame, &exposure.header)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!(
                "Wrote {} ({} x {}, {})",
                path.display(),
                exposure.frame.cols,
                exposure.frame.rows,
                exposure.image_type.as_str()
            );
        }
        Commands::Focus { action } => {
            let focuser = session.focuser().lock().await;
            if !focuser.is_attached() {
                return Err(anyhow!("no focuser attached"));
            }
            match action {
                FocusAction::Position => {
                    println!("{}", serde_json::to_string_pretty(&focuser.status().await)?);
                }
                FocusAction::Home => {
                    focuser.home().await?;
                    println!("Homing started");
                }
                FocusAction::Goto { position, no_wait } => {
                    focuser.goto(position, mode(no_wait)).await?;
                    println!("Position {}", focuser.position().await?);
                }
                FocusAction::Step { delta, no_wait } => {
                    focuser.step(delta, mode(no_wait)).await?;
                    println!("Position {}", focuser.position().await?);
                }
            }
        }
    }
    Ok(())
}
