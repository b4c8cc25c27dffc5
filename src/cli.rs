//! Command line interface of the `chargeflow` binary

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::api::{BackendClient, HttpPortLock, HttpSessionStore};
use crate::clock::{ClockPhase, SessionClock, StopOutcome};
use crate::config::Config;
use crate::controller::SessionController;
use crate::error::{ChargeflowError, Result};
use crate::logging::get_logger;
use crate::models::ChargeMode;
use crate::store::SessionStore;

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    /// YAML configuration file; default locations are searched when omitted.
    #[clap(long, short = 'c', env = "CHARGEFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Charging backend base URL.
    #[clap(long = "api-url")]
    pub api_url: Option<String>,

    /// Bearer token for the charging backend.
    #[clap(long = "token", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start charging and follow the session until it ends.
    #[clap(name = "start")]
    Start(StartArgs),

    /// Reattach to the session in progress and follow it.
    #[clap(name = "resume")]
    Resume(TargetArgs),

    /// Stop the session in progress.
    #[clap(name = "stop")]
    Stop(TargetArgs),

    /// Show the session in progress, if any.
    #[clap(name = "status")]
    Status,

    /// Plan a charge without starting it.
    #[clap(name = "estimate")]
    Estimate(EstimateArgs),
}

#[derive(Copy, Clone, ClapArgs)]
pub struct TargetArgs {
    /// Vehicle ID.
    #[clap(long)]
    pub vehicle: i64,

    /// Port ID.
    #[clap(long)]
    pub port: i64,
}

#[derive(Copy, Clone, ClapArgs)]
#[group(required = true, multiple = false)]
pub struct ModeArgs {
    /// Charge for this many minutes.
    #[clap(long)]
    pub minutes: Option<u32>,

    /// Charge until this amount is spent.
    #[clap(long)]
    pub cost: Option<f64>,

    /// Charge until the battery reaches this percentage.
    #[clap(long)]
    pub percentage: Option<f64>,
}

impl ModeArgs {
    pub fn charge_mode(&self) -> Result<ChargeMode> {
        match (self.minutes, self.cost, self.percentage) {
            (Some(minutes), None, None) => Ok(ChargeMode::Time { minutes }),
            (None, Some(amount), None) => Ok(ChargeMode::Cost { amount }),
            (None, None, Some(target)) => Ok(ChargeMode::Percentage { target }),
            _ => Err(ChargeflowError::validation(
                "mode",
                "Pick exactly one of --minutes, --cost or --percentage",
            )),
        }
    }
}

#[derive(Copy, Clone, ClapArgs)]
pub struct StartArgs {
    #[clap(flatten)]
    pub target: TargetArgs,

    #[clap(flatten)]
    pub mode: ModeArgs,

    /// Return right after the session started instead of following it.
    #[clap(long)]
    pub detach: bool,
}

#[derive(Copy, Clone, ClapArgs)]
pub struct EstimateArgs {
    #[clap(flatten)]
    pub target: TargetArgs,

    #[clap(flatten)]
    pub mode: ModeArgs,
}

impl Args {
    /// Resolve the configuration: file, then environment, then flags
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::load()?,
        };
        if let Some(url) = &self.api_url {
            config.api.base_url.clone_from(url);
        }
        if let Some(token) = &self.token {
            config.api.token = Some(token.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Execute a parsed command against the configured backend
pub async fn run(command: Command, config: &Config) -> Result<()> {
    let client = BackendClient::new(&config.api)?;
    let store = Arc::new(HttpSessionStore::new(client.clone()));
    let ports = Arc::new(HttpPortLock::new(client.clone()));
    let mut controller = SessionController::new(store.clone(), ports, config);
    let symbol = &config.pricing.currency_symbol;

    match command {
        Command::Start(args) => {
            let vehicle = client.fetch_vehicle(args.target.vehicle).await?;
            let port = client.fetch_port(args.target.port).await?;
            let clock = controller
                .start_session(&vehicle, &port, args.mode.charge_mode()?)
                .await?;
            println!("Session {} started", clock.session_id());
            if args.detach {
                controller.detach();
                return Ok(());
            }
            follow(&mut controller, &clock, symbol).await
        }
        Command::Resume(target) => {
            let vehicle = client.fetch_vehicle(target.vehicle).await?;
            let port = client.fetch_port(target.port).await?;
            match controller.resume(&vehicle, &port).await? {
                Some(clock) => follow(&mut controller, &clock, symbol).await,
                None => {
                    println!("No session in progress");
                    Ok(())
                }
            }
        }
        Command::Stop(target) => {
            let vehicle = client.fetch_vehicle(target.vehicle).await?;
            let port = client.fetch_port(target.port).await?;
            if controller.resume(&vehicle, &port).await?.is_none() {
                println!("No session in progress");
                return Ok(());
            }
            let outcome = controller.stop_session().await?;
            print_receipt(&outcome, symbol);
            Ok(())
        }
        Command::Status => {
            match store.get_active().await? {
                Some(s) => println!(
                    "Session {} on port {}: {:.3} kWh, {:.2} {symbol}, started {}",
                    s.id, s.port_id, s.energy_used_kwh, s.total_cost, s.start_time
                ),
                None => println!("No session in progress"),
            }
            Ok(())
        }
        Command::Estimate(args) => {
            let vehicle = client.fetch_vehicle(args.target.vehicle).await?;
            let port = client.fetch_port(args.target.port).await?;
            let plan = controller.estimate(&vehicle, &port, args.mode.charge_mode()?)?;
            println!(
                "{:.1} kW for {} min: {:.2} kWh, {:.2} {symbol}, battery at {:.0}%",
                plan.power_kw,
                plan.duration_minutes,
                plan.energy_kwh,
                plan.cost,
                plan.target_percentage
            );
            Ok(())
        }
    }
}

/// Print progress until the session ends; Ctrl-C detaches and leaves it running
async fn follow(controller: &mut SessionController, clock: &SessionClock, symbol: &str) -> Result<()> {
    let logger = get_logger("cli");
    let mut progress = tokio::time::interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if clock.phase() == ClockPhase::Completing {
                    // Exiting now would cut the finalize or port release short
                    logger.info("Interrupted while the session is being settled; waiting for it");
                    return report(clock.wait_stopped().await, symbol);
                }
                controller.detach();
                logger.info("Interrupted; session keeps charging and can be resumed");
                return Ok(());
            }
            outcome = clock.wait_stopped() => return report(outcome, symbol),
            _ = progress.tick() => {
                let s = clock.snapshot();
                println!(
                    "{:>5.1}% | {:.3} kWh | {:.2} {symbol} | {} s left",
                    s.battery_percentage, s.energy_used_kwh, s.total_cost, s.remaining_seconds
                );
            }
        }
    }
}

fn report(outcome: Option<Result<StopOutcome>>, symbol: &str) -> Result<()> {
    match outcome {
        Some(Ok(outcome)) => {
            print_receipt(&outcome, symbol);
            Ok(())
        }
        Some(Err(e)) => Err(e),
        None => Ok(()),
    }
}

fn print_receipt(outcome: &StopOutcome, symbol: &str) {
    let s = &outcome.session;
    println!(
        "Session {} completed ({:?}): {:.3} kWh, {:.2} {symbol}, payment {:?}",
        s.id, outcome.reason, s.energy_used_kwh, s.total_cost, s.payment_status
    );
    if !outcome.port_released {
        println!("Port {} could not be freed; please report it to support", s.port_id);
    }
}
