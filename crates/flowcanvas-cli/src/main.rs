use anyhow::{Context, Result};
use clap::Parser;
use flowcanvas_core::{EngineConfig, LayoutDirection};
use flowcanvas_events::{Event, EventBus};
use flowcanvas_graph::{CanvasEngine, GraphModel, GraphSnapshot, LayoutModel, PreviewLine};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Graph snapshot JSON (`{"nodes": [...], "edges": [...]}`); stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Layout direction: TB or LR
    #[arg(short, long, default_value = "TB")]
    direction: LayoutDirection,

    /// Distance between layers along the primary axis
    #[arg(long)]
    layer_spacing: Option<f64>,

    /// Primary-axis coordinate of layer 0
    #[arg(long)]
    base_y: Option<f64>,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Output<'a> {
    layout: &'a LayoutModel,
    preview_lines: Vec<&'a PreviewLine>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    // 1. Load the snapshot
    let raw = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let snapshot: GraphSnapshot = serde_json::from_str(&raw).context("parsing graph snapshot")?;
    let mut graph = GraphModel::from_snapshot(snapshot);

    // 2. Build the engine from the command-line overrides
    let mut config = EngineConfig::default().with_direction(args.direction);
    if let Some(spacing) = args.layer_spacing {
        config = config.with_layer_spacing(spacing);
    }
    if let Some(base_y) = args.base_y {
        config = config.with_base_y(base_y);
    }
    let bus = EventBus::new();
    let mut engine = CanvasEngine::new(config)?.with_event_bus(bus.clone());

    // 3. Lay out and sync preview lines
    let layout = engine.recompute(&mut graph)?;
    for event in bus.drain() {
        if let Event::Warning(warning) = event {
            tracing::warn!(?warning, "layout warning");
        }
    }
    tracing::info!(
        nodes = graph.node_count(),
        layers = layout.layer_count(),
        preview_lines = graph.preview_line_count(),
        "layout complete"
    );

    // 4. Print
    let output = Output {
        layout: &layout,
        preview_lines: engine.preview_lines().collect(),
    };
    let json = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{json}");

    Ok(())
}
