//! `whiteboard`: offline tools for whiteboard snapshots.
//!
//! Usage:
//!   # Apply recorded push frames (one per line) and print the result
//!   whiteboard replay --snapshot board.json --frames events.log
//!
//!   # SVG path per edge
//!   whiteboard route --snapshot board.json
//!
//!   # Check ids, edge endpoints, parent links and acyclicity
//!   whiteboard validate --snapshot board.json
//!
//!   # Run a generation round trip against in-memory services
//!   whiteboard generate --snapshot board.json --parent n1 --kind topic --result "a\nb"

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use whiteboard_client::mock::{MockContentService, MockGenerationService};
use whiteboard_client::{GenerationReconciler, PushEvent, ReconcileOutcome, Whiteboard, WhiteboardConfig, parse_frame};
use whiteboard_graph::geometry::DEFAULT_CURVATURE;
use whiteboard_graph::{HistoryManager, Unbound, route_all, validate_snapshot};
use whiteboard_types::{GraphSnapshot, NodeId, NodeKind, WhiteboardId};

#[derive(Parser, Debug)]
#[command(name = "whiteboard")]
#[command(about = "Offline tools for whiteboard graph snapshots")]
struct Args {
    /// Config file (RON). Defaults to the user config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply push frames through the generation reconciler
    Replay {
        #[arg(long)]
        snapshot: PathBuf,
        /// One frame per line (`data:` prefixes and keep-alives accepted)
        #[arg(long)]
        frames: PathBuf,
        /// Whiteboard the frames belong to (default: the first event's)
        #[arg(long)]
        whiteboard: Option<String>,
    },
    /// Print an SVG path for every edge
    Route {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CURVATURE)]
        curvature: f64,
    },
    /// Report snapshot invariant violations
    Validate {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Create a generating child and complete it with the given text
    Generate {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        parent: String,
        /// idea, topic or note
        #[arg(long, default_value = "idea")]
        kind: String,
        #[arg(long)]
        result: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _telemetry = whiteboard_telemetry::init_tracing("whiteboard");
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Replay { snapshot, frames, whiteboard } => {
            let snapshot = load_snapshot(&snapshot)?;
            let frames = std::fs::read_to_string(&frames).with_context(|| format!("reading {}", frames.display()))?;
            let (result, summary) = replay(snapshot, &frames, whiteboard.map(WhiteboardId::from), &config)?;
            info!(?summary, "replay finished");
            println!("{}", serde_json::to_string_pretty(&*result)?);
        }
        Command::Route { snapshot, curvature } => {
            let snapshot = load_snapshot(&snapshot)?;
            for line in route(&snapshot, curvature)? {
                println!("{line}");
            }
        }
        Command::Validate { snapshot } => {
            let snapshot = load_snapshot(&snapshot)?;
            if let Err(e) = validate_snapshot(&snapshot) {
                println!("invalid: {e}");
                return Ok(ExitCode::FAILURE);
            }
            println!(
                "ok: {} nodes, {} edges, {} generating",
                snapshot.node_count(),
                snapshot.edge_count(),
                snapshot.generating_nodes().count()
            );
        }
        Command::Generate { snapshot, parent, kind, result } => {
            let kind = NodeKind::from_str(&kind).with_context(|| format!("unknown node kind {kind:?}"))?;
            let snapshot = load_snapshot(&snapshot)?;
            let text = result.replace("\\n", "\n");
            let result = generate(snapshot, &parent.into(), kind, &text, config).await?;
            println!("{}", serde_json::to_string_pretty(&*result)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&Path>) -> Result<WhiteboardConfig> {
    let config = match path {
        Some(path) => WhiteboardConfig::load(path)?,
        None => match WhiteboardConfig::default_path() {
            Some(path) => WhiteboardConfig::load_or_default(&path)?,
            None => WhiteboardConfig::default(),
        },
    };
    config.validate()?;
    Ok(config)
}

fn load_snapshot(path: &Path) -> Result<GraphSnapshot> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", path.display()))
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct ReplaySummary {
    completed: usize,
    errored: usize,
    shelved: usize,
    orphaned: usize,
    skipped: usize,
    malformed: usize,
}

fn replay(
    snapshot: GraphSnapshot,
    frames: &str,
    whiteboard: Option<WhiteboardId>,
    config: &WhiteboardConfig,
) -> Result<(Arc<GraphSnapshot>, ReplaySummary)> {
    let mut history = HistoryManager::with_snapshot(Unbound, snapshot, config.history.limit)?;
    let mut summary = ReplaySummary::default();

    let mut events: Vec<PushEvent> = Vec::new();
    for (line_no, line) in frames.lines().enumerate() {
        match parse_frame(line) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed frame");
                summary.malformed += 1;
            }
        }
    }

    let Some(whiteboard) = whiteboard.or_else(|| events.first().map(|e| e.whiteboard_id().clone())) else {
        return Ok((history.snapshot(), summary));
    };
    let mut reconciler =
        GenerationReconciler::with_limits(whiteboard, config.generation.timeout, config.generation.topic_max_items);

    for event in &events {
        match reconciler.apply_event(&mut history, event) {
            ReconcileOutcome::Completed { .. } => summary.completed += 1,
            ReconcileOutcome::Errored { .. } => summary.errored += 1,
            ReconcileOutcome::Shelved { .. } => summary.shelved += 1,
            ReconcileOutcome::Orphaned { .. } => summary.orphaned += 1,
            ReconcileOutcome::Skipped { .. } => summary.skipped += 1,
        }
    }
    Ok((history.snapshot(), summary))
}

fn route(snapshot: &GraphSnapshot, curvature: f64) -> Result<Vec<String>> {
    Ok(route_all(snapshot)?
        .into_iter()
        .map(|(id, edge)| {
            format!(
                "{id}\t{:?}->{:?}\t{}",
                edge.source_side,
                edge.target_side,
                edge.to_svg(curvature)
            )
        })
        .collect())
}

async fn generate(
    snapshot: GraphSnapshot,
    parent: &NodeId,
    kind: NodeKind,
    text: &str,
    config: WhiteboardConfig,
) -> Result<Arc<GraphSnapshot>> {
    let id = WhiteboardId::from("local");
    let content = Arc::new(MockContentService::new().with_graph(&id, snapshot.clone()));
    let generation = Arc::new(MockGenerationService::new());
    let mut board = Whiteboard::open(id.clone(), snapshot, content, generation, config)?;

    let node = board.request_generation(parent, kind).await?;
    let outcome = board.apply_push(&PushEvent::GenerationComplete {
        whiteboard_id: id,
        node_id: node.clone(),
        generated_content: text.to_string(),
    });
    if outcome != (ReconcileOutcome::Completed { node }) {
        bail!("generation did not complete: {outcome:?}");
    }
    board.flush().await?;
    Ok(board.snapshot())
}
