// Road network topology audit.
//
// Imports an OSM extract (or reuses a previous import), drops small
// disconnected subnetworks and reports dead ends that are probably missing a
// connection, plus duplicated edges, as GeoJSON.

use anyhow::{Context, Result, bail};
use catenary::config::AuditConfig;
use catenary::geojson_writer::GeoJsonWriter;
use catenary::osm_import::snapshot::{RoadNetworkData, import_or_load};
use catenary::topology::detector::AuditContext;
use catenary::topology::pipeline::audit;
use catenary::topology::subnetworks::remove_small_subnetworks;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

const FINDINGS_FILE: &str = "unconnected_ways.json";
const SUBNETWORKS_FILE: &str = "subnetworks_all_roads.json";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OSM extract to analyse (.osm.pbf)
    input_file: PathBuf,

    /// Where the imported graph is stored. An existing import is reused.
    graph_directory: PathBuf,

    /// Receives unconnected_ways.json and subnetworks_all_roads.json
    output_directory: PathBuf,

    /// Compare network and beeline distance for footways, paths and steps
    #[arg(short = 'd', long, env = "THISTLE_DO_ROUTING")]
    do_routing: bool,

    /// Search radius around dead ends in meters
    #[arg(short, long, default_value_t = 15.0, env = "THISTLE_RADIUS")]
    radius: f64,

    #[arg(short, long, default_value_t = 2, env = "THISTLE_WORKER_THREADS")]
    worker_threads: usize,

    /// Nodes per job
    #[arg(long, default_value_t = 1000)]
    batch_size: u32,

    /// Subnetworks with fewer nodes are removed before the analysis, 0 keeps all
    #[arg(long, default_value_t = 200)]
    min_network_size: usize,

    /// RON file with priority table overrides per road class
    #[arg(long, env = "THISTLE_PRIORITIES")]
    priorities: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> Result<AuditConfig> {
    if args.radius.is_nan() || args.radius <= 0.0 {
        bail!("Search radius must be positive, got {}", args.radius);
    }
    let mut config = AuditConfig {
        radius: args.radius,
        do_routing: args.do_routing,
        worker_threads: args.worker_threads,
        batch_size: args.batch_size,
        min_network_size: args.min_network_size,
        ..AuditConfig::default()
    };
    if let Some(path) = &args.priorities {
        config
            .priorities
            .load_overrides(path)
            .with_context(|| format!("Failed to load priority overrides from {}", path.display()))?;
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let started = Instant::now();
    let config = build_config(&args)?;
    fs::create_dir_all(&args.output_directory).with_context(|| {
        format!(
            "Cannot create output directory {}",
            args.output_directory.display()
        )
    })?;

    let RoadNetworkData {
        mut graph,
        node_ids,
        way_ids,
        barriers,
    } = import_or_load(&args.input_file, &args.graph_directory).with_context(|| {
        format!(
            "Failed to import {} into {}",
            args.input_file.display(),
            args.graph_directory.display()
        )
    })?;

    let mut islands = GeoJsonWriter::create(args.output_directory.join(SUBNETWORKS_FILE))
        .context("Cannot create subnetwork output")?;
    remove_small_subnetworks(&mut graph, &way_ids, config.min_network_size, &mut islands)?;
    islands.finish().context("Failed to finish subnetwork output")?;

    let mut findings = GeoJsonWriter::create(args.output_directory.join(FINDINGS_FILE))
        .context("Cannot create findings output")?;
    info!(
        "Searching dead ends within {} m, routing checks {}",
        config.radius,
        if config.do_routing { "on" } else { "off" }
    );
    let ctx = Arc::new(AuditContext {
        node_ids,
        way_ids,
        barriers,
        config,
        graph,
    });
    let summary = audit(ctx, &mut findings)?;
    let path = findings.finish().context("Failed to finish findings output")?;

    info!(
        "Wrote {} missing connections and {} duplicated edges to {} in {:.1}s",
        summary.missing_connections,
        summary.duplicated_edges,
        path.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
