use anyhow::{Context, Result, bail};
use callscope_app::{Session, Settings};
use callscope_core::{IdRange, NodeId};
use callscope_explain::KntNode;
use callscope_graph::style::get_pattern_label;
use callscope_graph::{ClassvizSnapshot, DiagramNode};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Trace file: `{"threads": {...}}` or a bare map of thread roots
    trace: PathBuf,

    /// Settings file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Thread to activate before selecting
    #[arg(short, long)]
    thread: Option<String>,

    /// Node ids to select
    #[arg(long, num_args = 1..)]
    select: Vec<i64>,

    /// Node ids to select together with their descendants
    #[arg(long, num_args = 1..)]
    select_subtree: Vec<i64>,

    /// Packages whose nodes are selected
    #[arg(long, num_args = 1..)]
    select_package: Vec<String>,

    /// Draw sequential edges in call order instead of call-tree edges
    #[arg(long)]
    trace_mode: bool,

    /// Number edges by call order
    #[arg(long)]
    numbered: bool,

    /// Replace method edges between classes with one counted class edge
    #[arg(long)]
    lift: bool,

    /// Request explanations from the configured provider
    #[arg(long, value_enum)]
    explain: Option<ExplainMode>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ExplainMode {
    Quick,
    Detailed,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSummary {
    name: String,
    nodes: usize,
    id_range: Option<IdRange>,
    current: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TreeReport {
    root: NodeId,
    thread: String,
    knt: KntNode,
    explanation: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegionReport {
    id: NodeId,
    tree_root: NodeId,
    label: String,
    nodes: usize,
    brief_summary: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    threads: Vec<ThreadSummary>,
    selection: Vec<NodeId>,
    diagram: ClassvizSnapshot,
    trees: Vec<TreeReport>,
    regions: Vec<RegionReport>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut settings = Settings::load_or_default(args.config.as_deref())?;
    settings.classviz.trace_mode |= args.trace_mode;
    settings.classviz.numbered_edges |= args.numbered;
    settings.classviz.lift_edges |= args.lift;
    if let Some(mode) = args.explain {
        settings.explainer.detailed = mode == ExplainMode::Detailed;
    }

    let session = Session::open(&args.trace, settings)
        .with_context(|| format!("loading {}", args.trace.display()))?;
    apply_selection(&session, &args)?;

    if args.explain.is_some() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let applied = runtime
            .block_on(session.explain())
            .context("explanation provider")?;
        tracing::info!(applied, "Explanations received");
    }

    let report = build_report(&session);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn apply_selection(session: &Session, args: &Args) -> Result<()> {
    let store = session.store();
    if let Some(thread) = &args.thread
        && store.current_thread().as_deref() != Some(thread.as_str())
        && !store.switch_thread(thread)
    {
        bail!(
            "unknown thread {thread:?}; available: {}",
            store.thread_names().join(", ")
        );
    }

    for &id in &args.select {
        if !store.contains(NodeId(id)) {
            tracing::warn!(node_id = id, "Not in the active thread");
        }
        store.select(NodeId(id), true, false);
    }
    for &id in &args.select_subtree {
        let changed = store.select_all_children(NodeId(id));
        tracing::debug!(node_id = id, changed = changed.len(), "Subtree selected");
    }
    for package in &args.select_package {
        let changed = store.select_by_package(package, true);
        if changed.is_empty() {
            tracing::warn!(package = %package, "No unselected nodes in package");
        }
    }
    Ok(())
}

fn build_report(session: &Session) -> Report {
    let store = session.store();
    let current = store.current_thread();
    let threads = store
        .thread_names()
        .into_iter()
        .map(|name| ThreadSummary {
            nodes: store
                .with_thread_tree(&name, |root| root.node_count())
                .unwrap_or_default(),
            id_range: store.id_range(&name),
            current: current.as_deref() == Some(name.as_str()),
            name,
        })
        .collect();

    let explainer = session.explainer().borrow();
    let trees = explainer
        .selected_trees()
        .map(|tree| TreeReport {
            root: tree.root,
            thread: tree.thread.clone(),
            knt: tree.knt.clone(),
            explanation: tree.explanation.clone(),
            error: tree.error.clone(),
        })
        .collect();
    let regions = explainer
        .regions()
        .map(|region| RegionReport {
            id: region.id,
            tree_root: region.tree_root,
            label: region.data.label.clone(),
            nodes: region.data.node_count(),
            brief_summary: region.brief_summary.clone(),
            error: region.error.clone(),
        })
        .collect();

    Report {
        threads,
        selection: store.selected_ids(),
        diagram: session.classviz().borrow().snapshot(),
        trees,
        regions,
    }
}

fn print_report(report: &Report) {
    println!("Threads:");
    for thread in &report.threads {
        let marker = if thread.current { "*" } else { " " };
        let range = thread
            .id_range
            .map(|range| format!("[{}, {}]", range.min, range.max))
            .unwrap_or_default();
        println!("  {marker} {} ({} nodes) {range}", thread.name, thread.nodes);
    }

    let selection: Vec<String> = report.selection.iter().map(NodeId::to_string).collect();
    println!("Selected: {}", selection.join(" "));

    let diagram = &report.diagram;
    println!(
        "Diagram: {} classes, {} methods, {} edges",
        diagram.classes.len(),
        diagram.methods.len(),
        diagram.edges.len() + diagram.lifted_edges.len()
    );
    for class in &diagram.classes {
        println!("  {}", class.label);
        for method in class.children.iter().filter_map(|id| diagram.method(id)) {
            println!("    {}", method_line(method));
        }
    }
    for method in diagram.methods.iter().filter(|method| method.parent.is_none()) {
        println!("  {} (library)", method_line(method));
    }
    for edge in &diagram.edges {
        let label = edge.label.as_deref().unwrap_or_default();
        println!("  {} -> {} {label}", edge.source_node, edge.target_node);
    }
    for edge in &diagram.lifted_edges {
        println!(
            "  {} => {} {}",
            edge.source_node, edge.target_node, edge.label
        );
    }

    for tree in &report.trees {
        println!("Tree {} ({}):", tree.root, tree.thread);
        print_knt(&tree.knt, 1);
        if let Some(text) = &tree.explanation {
            println!("  Explanation: {text}");
        }
    }
    for region in &report.regions {
        let summary = region.brief_summary.as_deref().unwrap_or("-");
        println!(
            "Region {} in tree {}: {} ({} nodes) {summary}",
            region.id, region.tree_root, region.label, region.nodes
        );
    }
}

fn method_line(method: &DiagramNode) -> String {
    match method.pattern {
        Some(pattern) => format!("{} [{}]", method.label, get_pattern_label(pattern)),
        None => method.label.clone(),
    }
}

fn print_knt(root: &KntNode, depth: usize) {
    let mut stack = vec![(root, depth)];
    while let Some((node, depth)) = stack.pop() {
        println!("{}{} {}", "  ".repeat(depth), node.id, node.label);
        stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
    }
}
