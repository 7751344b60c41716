//! Command-line front end for planning disaster-waste clean-up campaigns.

mod output;
mod scenario;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use debrisplan_core::board::PointBoard;
use debrisplan_core::extract::UsageMap;
use debrisplan_core::{Coordinate, DistanceProvider, Plan, Planner, ProviderError};
use debrisplan_provider_osrm::{self as osrm, OsrmProvider};
use debrisplan_solver_microlp::MicrolpSolver;

use crate::output::{next_run, numbered, write_new};
use crate::scenario::Scenario;

const REPORT_STEM: &str = "plan_report";
const USAGE_STEM: &str = "plan_usage";
const ROUTES_STEM: &str = "plan_routes";

#[derive(Parser, Debug)]
#[command(name = "debrisplan", version, about = "Disaster-waste clean-up logistics planner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Computes a two-stage plan and writes the report and arc usage.
    Plan(PlanArgs),
    /// Fetches road geometry for every arc of a saved usage map.
    Routes(RoutesArgs),
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Scenario file (TOML).
    #[arg(long)]
    scenario: PathBuf,
    /// Directory receiving `plan_report_<n>.txt` and `plan_usage_<n>.json`.
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// OSRM base URL.
    #[arg(long, default_value = osrm::DEFAULT_BASE_URL)]
    osrm_url: String,
    /// Per-stage solver budget in seconds, overriding the scenario file.
    #[arg(long)]
    time_limit: Option<u64>,
}

#[derive(Parser, Debug)]
struct RoutesArgs {
    /// Scenario file the usage map was computed for.
    #[arg(long)]
    scenario: PathBuf,
    /// Usage map written by `plan`.
    #[arg(long)]
    usage: PathBuf,
    /// Directory receiving `plan_routes_<n>.json`.
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// OSRM base URL.
    #[arg(long, default_value = osrm::DEFAULT_BASE_URL)]
    osrm_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan(args) => plan(args).await,
        Commands::Routes(args) => routes(args).await,
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debrisplan=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn plan(args: PlanArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;

    let mut board = PointBoard::new();
    scenario
        .place_on(&mut board)
        .context("placing scenario points")?;

    let client: Client = osrm::client()?;
    let planner = Planner::new(
        Arc::new(OsrmProvider::new(client, args.osrm_url.as_str())),
        Arc::new(MicrolpSolver::new()),
        scenario.solver.settings(args.time_limit),
    );

    let plan = match planner.plan(board.node_set(), &scenario.parameters).await {
        Ok(plan) => plan,
        Err(err) => {
            if err.requires_reset() {
                board.reset();
                error!("Distance lookup failed, all placed points were discarded");
            }
            return Err(err).context("planning failed");
        }
    };

    let names = [(REPORT_STEM, "txt"), (USAGE_STEM, "json")];
    let run = next_run(&args.out, &names)?;
    let report_path = numbered(&args.out, REPORT_STEM, run, "txt");
    let usage_path = numbered(&args.out, USAGE_STEM, run, "json");

    let report = format!(
        "Generated {}\n\n{}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        plan.report
    );
    write_new(&report_path, report.as_bytes())?;
    write_new(&usage_path, &serde_json::to_vec_pretty(&plan.usage)?)?;
    info!(report = %report_path.display(), usage = %usage_path.display(), "Plan written");

    print_summary(&plan, &report_path);
    Ok(())
}

#[expect(clippy::print_stdout, reason = "command result goes to stdout")]
fn print_summary(plan: &Plan, report_path: &Path) {
    let flag = |optimal: bool| if optimal { "" } else { " (best found)" };
    println!(
        "Optimal time: {}{}",
        plan.time.objective,
        flag(plan.time.proven_optimal)
    );
    println!(
        "Optimal cost: {}{}",
        plan.cost.objective,
        flag(plan.cost.proven_optimal)
    );
    println!("Used arcs: {}", plan.usage.len());
    println!("Report: {}", report_path.display());
}

async fn routes(args: RoutesArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let layout = scenario.points.validate()?;
    let points = scenario.points.ordered();

    let raw = fs::read_to_string(&args.usage)
        .with_context(|| format!("reading usage map {}", args.usage.display()))?;
    let usage: UsageMap = serde_json::from_str(&raw)
        .with_context(|| format!("parsing usage map {}", args.usage.display()))?;

    let provider = OsrmProvider::new(osrm::client()?, args.osrm_url.as_str());

    let mut features = Vec::with_capacity(usage.len());
    for (from, to, arc) in usage.iter() {
        let (Some(&origin), Some(&destination)) = (points.get(from.get()), points.get(to.get()))
        else {
            bail!("usage map refers to node {from} -> {to} outside the scenario");
        };
        let path = match provider.route(origin, destination).await {
            Ok(path) => path,
            Err(ProviderError::NoRoute) => {
                warn!(%from, %to, "No road path, arc skipped");
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("fetching route {from} -> {to}"));
            }
        };
        features.push(json!({
            "type": "Feature",
            "properties": {
                "from": from,
                "to": to,
                "from_kind": layout.kind_of(from),
                "to_kind": layout.kind_of(to),
                "collection": arc.collection,
                "transport": arc.transport,
            },
            "geometry": line_string(&path),
        }));
    }

    let collection = json!({ "type": "FeatureCollection", "features": features });
    let run = next_run(&args.out, &[(ROUTES_STEM, "json")])?;
    let path = numbered(&args.out, ROUTES_STEM, run, "json");
    write_new(&path, &serde_json::to_vec_pretty(&collection)?)?;
    info!(routes = %path.display(), arcs = usage.len(), "Routes written");
    Ok(())
}

fn line_string(path: &[Coordinate]) -> Value {
    let coordinates: Vec<[f64; 2]> = path.iter().map(|point| [point.lon, point.lat]).collect();
    json!({ "type": "LineString", "coordinates": coordinates })
}
