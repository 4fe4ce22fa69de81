//! pgraph CLI
//!
//! - `load`: run one worker of a multi-process load over TCP
//! - `local`: run every worker of a load as threads of this process
//! - `inspect`: summarize a sealed fragment group, fragment or vertex map

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use pgraph_comm::{Communicator, LocalCluster, TcpComm};
use pgraph_loader::{Fragment, FragmentGroup, FragmentLoader, LoaderConfig, PartitionStrategy, VertexMap};
use pgraph_store::{envelope, FsStore, ObjectId, ObjectStore};

#[derive(Parser)]
#[command(name = "pgraph")]
#[command(author, version, about = "pgraph: distributed property-graph fragment loader")]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one worker of a load; start one process per worker.
    ///
    /// Worker 0 listens on `--coordinator`, every other worker connects to it.
    Load {
        #[command(flatten)]
        load: LoadArgs,
        /// This worker's id, `0..worker-num`
        #[arg(long)]
        worker_id: usize,
        /// Number of workers (= number of partitions)
        #[arg(long)]
        worker_num: usize,
        /// Address of worker 0
        #[arg(long, default_value = "127.0.0.1:7070")]
        coordinator: String,
        /// Seconds to keep retrying the connection to worker 0
        #[arg(long, default_value_t = 30)]
        connect_timeout: u64,
    },

    /// Run every worker of a load as a thread of this process.
    Local {
        #[command(flatten)]
        load: LoadArgs,
        /// Number of workers (= number of partitions)
        #[arg(long, default_value_t = 2)]
        workers: usize,
    },

    /// Print a summary of a sealed object.
    Inspect {
        /// Store directory
        #[arg(long)]
        store_dir: PathBuf,
        /// Object id as printed by `load` (`o<hex>`)
        id: String,
    },
}

#[derive(Args, Clone)]
struct LoadArgs {
    /// Loader configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,
    /// Store directory shared by all workers
    #[arg(long)]
    store_dir: PathBuf,
    /// Stop after sealing the fragments and print their ids
    #[arg(long)]
    fragment_only: bool,
    /// Override `vertex_files` (semicolon-separated prefixes)
    #[arg(long)]
    vertex_files: Option<String>,
    /// Override `edge_files` (semicolon-separated prefixes)
    #[arg(long)]
    edge_files: Option<String>,
    /// Override `vertex_label_num`
    #[arg(long)]
    vertex_label_num: Option<usize>,
    /// Override `edge_label_num`
    #[arg(long)]
    edge_label_num: Option<usize>,
    /// Override the partitioner (hash or segmented)
    #[arg(long)]
    partitioner: Option<PartitionStrategy>,
}

impl LoadArgs {
    fn config(&self) -> Result<LoaderConfig> {
        let path = &self.config;
        let mut config =
            LoaderConfig::from_json_file(path).with_context(|| format!("reading loader config {}", path.display()))?;
        if let Some(files) = &self.vertex_files {
            config.vertex_files = files.clone();
        }
        if let Some(files) = &self.edge_files {
            config.edge_files = files.clone();
        }
        if let Some(num) = self.vertex_label_num {
            config.vertex_label_num = num;
        }
        if let Some(num) = self.edge_label_num {
            config.edge_label_num = num;
        }
        if let Some(strategy) = self.partitioner {
            config.partitioner = strategy;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Load {
            load,
            worker_id,
            worker_num,
            coordinator,
            connect_timeout,
        } => {
            let id = cmd_load(&load, worker_id, worker_num, &coordinator, Duration::from_secs(connect_timeout))?;
            eprintln!(
                "{} worker {worker_id}: {} {}",
                "ok".green().bold(),
                if load.fragment_only { "fragment" } else { "group" },
                id.to_string().bold()
            );
            println!("{id}");
        }
        Commands::Local { load, workers } => {
            let ids = cmd_local(&load, workers)?;
            for (worker, id) in ids.iter().enumerate() {
                eprintln!("{} worker {worker}: {}", "ok".green().bold(), id.to_string().bold());
            }
            if load.fragment_only {
                for id in &ids {
                    println!("{id}");
                }
            } else if let Some(id) = ids.first() {
                println!("{id}");
            }
        }
        Commands::Inspect { store_dir, id } => {
            let id: ObjectId = id.parse().with_context(|| format!("parsing object id '{id}'"))?;
            print!("{}", cmd_inspect(&store_dir, id)?);
        }
    }
    Ok(())
}

// ============================================================================
// Loading
// ============================================================================

fn cmd_load(
    args: &LoadArgs,
    worker_id: usize,
    worker_num: usize,
    coordinator: &str,
    timeout: Duration,
) -> Result<ObjectId> {
    let config = args.config()?;
    let spec = config.comm_spec(worker_id, worker_num)?;
    let store = FsStore::open(&args.store_dir, worker_id as u32)
        .with_context(|| format!("opening store {}", args.store_dir.display()))?;
    let comm = TcpComm::establish(coordinator, spec, timeout)
        .with_context(|| format!("connecting worker {worker_id} via {coordinator}"))?;
    run_worker(comm, store, config, args.fragment_only)
}

fn cmd_local(args: &LoadArgs, workers: usize) -> Result<Vec<ObjectId>> {
    if workers == 0 {
        bail!("at least one worker is required");
    }
    let config = args.config()?;
    let endpoints = match &config.assignment {
        Some(assignment) => LocalCluster::with_assignment(assignment.clone())?,
        None => LocalCluster::new(workers)?,
    };
    if endpoints.len() != workers {
        bail!(
            "config assigns {} partitions but {workers} workers were requested",
            endpoints.len()
        );
    }

    let handles: Vec<_> = endpoints
        .into_iter()
        .map(|comm| {
            let worker = comm.spec().worker_id();
            let config = config.clone();
            let root = args.store_dir.clone();
            let fragment_only = args.fragment_only;
            thread::spawn(move || -> Result<ObjectId> {
                let store = FsStore::open(&root, worker as u32)?;
                run_worker(comm, store, config, fragment_only)
            })
        })
        .collect();

    let mut ids = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for (worker, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(id)) => ids.push(id),
            Ok(Err(e)) => {
                first_error.get_or_insert(e.context(format!("worker {worker}")));
            }
            Err(_) => {
                first_error.get_or_insert(anyhow!("worker {worker} panicked"));
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(ids),
    }
}

fn run_worker<C: Communicator>(comm: C, store: FsStore, config: LoaderConfig, fragment_only: bool) -> Result<ObjectId> {
    let mut loader = FragmentLoader::new(comm, store, config)?;
    let id = if fragment_only {
        loader.load_fragment()?
    } else {
        loader.load_fragment_as_fragment_group()?
    };
    Ok(id)
}

// ============================================================================
// Inspection
// ============================================================================

fn cmd_inspect(root: &Path, id: ObjectId) -> Result<String> {
    let store = FsStore::open(root, id.instance()).with_context(|| format!("opening store {}", root.display()))?;
    let bytes = store.resolve(id)?;
    let (header, _) = envelope::decode(&bytes)?;

    let mut out = String::new();
    match header.type_name.as_str() {
        "pgraph::FragmentGroup" => {
            let group = FragmentGroup::resolve(&store, id)?;
            out.push_str(&format!(
                "{} {id}: {} partitions, {} vertex / {} edge labels\n",
                "fragment group".cyan().bold(),
                group.fnum(),
                group.vertex_label_num(),
                group.edge_label_num()
            ));
            for (fid, location) in group.iter() {
                let fragment = Fragment::resolve(&store, location.fragment)?;
                let inner: usize = (0..fragment.vertex_label_num()).map(|l| fragment.inner_vertex_num(l)).sum();
                out.push_str(&format!(
                    "  fid {fid}: fragment {} on instance {}, {inner} vertices, {} edges\n",
                    location.fragment,
                    location.instance,
                    fragment.edge_num()
                ));
            }
        }
        "pgraph::Fragment" => {
            let fragment = Fragment::resolve(&store, id)?;
            out.push_str(&format!(
                "{} {id}: fid {}/{} ({}), vertex map {}\n",
                "fragment".cyan().bold(),
                fragment.fid(),
                fragment.fnum(),
                if fragment.directed() { "directed" } else { "undirected" },
                fragment.vertex_map_id()
            ));
            for entry in &fragment.schema().vertex_entries {
                out.push_str(&format!(
                    "  vertex {} '{}': {} inner, {} outer\n",
                    entry.label_index,
                    entry.label,
                    fragment.inner_vertex_num(entry.label_index),
                    fragment.outer_vertices(entry.label_index).map_or(0, |o| o.len())
                ));
            }
            for entry in &fragment.schema().edge_entries {
                out.push_str(&format!(
                    "  edge {} '{}': {} rows, relations {:?}\n",
                    entry.label_index,
                    entry.label,
                    fragment.edge_table(entry.label_index).map_or(0, |t| t.num_rows()),
                    entry.relations
                ));
            }
            out.push_str(&fragment.schema().to_json()?);
            out.push('\n');
        }
        "pgraph::VertexMap" => {
            let map = VertexMap::resolve(&store, id)?;
            out.push_str(&format!(
                "{} {id}: {} vertices over {} partitions, {} labels\n",
                "vertex map".cyan().bold(),
                map.total_vertex_num(),
                map.fnum(),
                map.label_num()
            ));
            for fid in 0..map.fnum() {
                let counts: Vec<usize> = (0..map.label_num()).map(|l| map.inner_vertex_num(fid, l)).collect();
                out.push_str(&format!("  fid {fid}: {counts:?}\n"));
            }
        }
        other => bail!("object {id} holds an unknown type '{other}'"),
    }
    Ok(out)
}
