use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ado_anchors::anchor::{self, AnchorTarget};
use ado_anchors::client::{HttpTransport, WorkItemClient};
use ado_anchors::config::Settings;
use ado_anchors::markdown;
use ado_anchors::present::{
    DetailView, ItemsView, MemoryHost, Presentation, PresentationController, QueryView, Tab, View,
};
use ado_anchors::render::live::{line_range, TextSurface};
use ado_anchors::render::read::PassContext;
use ado_anchors::render::{
    Expansion, LiveModeRenderer, ReadModeRenderer, RenderContext, TracingNotifier,
};

#[derive(Parser)]
#[command(name = "ado-anchors")]
#[command(about = "Resolve inline Azure DevOps anchors in plain-text documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the anchors in a file
    Parse { file: PathBuf },
    /// Show one work item
    Show {
        id: i64,
        /// description, contacts, children, or a configured group name
        #[arg(short, long)]
        tab: Option<String>,
    },
    /// List the child items of a work item
    Children { id: i64 },
    /// Run a saved query by id or path
    Query {
        query: String,
        /// Request the comprehensive field set
        #[arg(long)]
        full: bool,
    },
    /// Re-run a saved query on the refresh interval
    Watch {
        query: String,
        #[arg(long)]
        full: bool,
        /// Minutes between runs (defaults to the configured interval)
        #[arg(short, long)]
        interval: Option<u32>,
    },
    /// Render a markdown file with anchors replaced by controls
    Render {
        file: PathBuf,
        /// Expand every control, fetching its data
        #[arg(short, long)]
        expand: bool,
        /// Also open the children of expanded work items
        #[arg(long, requires = "expand")]
        children: bool,
    },
    /// Print live-mode decorations for visible line ranges
    Live {
        file: PathBuf,
        /// Visible zero-based line range `a..b`; repeatable. Whole file if omitted.
        #[arg(short, long = "lines")]
        lines: Vec<String>,
        /// Click the overlay at this byte offset and print its view
        #[arg(long)]
        click: Option<usize>,
    },
    /// Replace a byte range of a file with an anchor
    #[command(group(ArgGroup::new("target").required(true).args(["item", "query"])))]
    Insert {
        file: PathBuf,
        #[arg(long)]
        at: usize,
        /// End of the replaced selection (defaults to `--at`)
        #[arg(long)]
        to: Option<usize>,
        #[arg(long)]
        item: Option<u64>,
        #[arg(long)]
        query: Option<String>,
    },
}

/// Initialize tracing on stderr; stdout carries rendered output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "ado_anchors=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// A client over HTTP. Missing settings surface per operation as
/// `NotConfigured`, so offline commands still work.
fn build_client() -> anyhow::Result<WorkItemClient> {
    let settings = Settings::load()?;
    let base_url = settings.organization_url.clone().unwrap_or_default();
    let transport = HttpTransport::new(base_url, settings.personal_access_token.clone())
        .context("Failed to build HTTP client")?;
    Ok(WorkItemClient::new(Arc::new(transport), Arc::new(settings)))
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_tab(name: &str, view: &DetailView) -> anyhow::Result<Tab> {
    match view
        .tabs()
        .into_iter()
        .find(|(_, label)| label.eq_ignore_ascii_case(name))
    {
        Some((tab, _)) => Ok(tab),
        None => {
            let known: Vec<String> = view.tabs().into_iter().map(|(_, l)| l).collect();
            bail!("Unknown tab '{}' (expected one of: {})", name, known.join(", "))
        }
    }
}

fn parse_lines(spec: &str) -> anyhow::Result<Range<usize>> {
    let (start, end) = spec
        .split_once("..")
        .with_context(|| format!("Expected a line range like 3..10, got '{}'", spec))?;
    let start: usize = start.trim().parse().context("Invalid range start")?;
    let end: usize = end.trim().parse().context("Invalid range end")?;
    Ok(start..end)
}

fn print_expansion(label: &str, expansion: &Expansion) {
    match expansion {
        Expansion::Failed(message) => tracing::warn!(anchor = label, "{}", message),
        Expansion::Loaded(resolved) if resolved.is_empty() => {
            tracing::info!(anchor = label, "nothing found")
        }
        _ => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Parse { file } => {
            let text = read_file(&file)?;
            for found in anchor::parse(&text) {
                println!(
                    "{}\t{}\t{}..{}",
                    found.kind().as_str(),
                    found.identifier(),
                    found.span.start,
                    found.span.end
                );
            }
        }
        Commands::Show { id, tab } => {
            let client = build_client()?;
            let item = client.fetch_container_by_id(id).await?;
            let detail = DetailView::new(item, client.clone());
            let tab = tab.map(|name| parse_tab(&name, &detail)).transpose()?;

            let mut controller =
                PresentationController::with_presentation(MemoryHost::new(), Presentation::Modal);
            controller.open(View::Detail(detail));
            if let Some(tab) = tab {
                controller.select_tab(tab).await;
            }
            if let Some(view) = controller.active_view() {
                print!("{}", view.render());
            }
        }
        Commands::Children { id } => {
            let client = build_client()?;
            let items = client.fetch_items_by_parent(id).await?;
            let view = View::Items(ItemsView {
                parent_id: Some(id),
                items,
            });
            print!("{}", view.render());
        }
        Commands::Query { query, full } => {
            let client = build_client()?;
            let rows = client.execute_saved_query(&query, full).await?;
            let view = View::Query(QueryView {
                identifier: query,
                rows,
            });
            print!("{}", view.render());
        }
        Commands::Watch {
            query,
            full,
            interval,
        } => {
            let client = build_client()?;
            let minutes = interval
                .filter(|m| *m > 0)
                .unwrap_or_else(|| client.settings().refresh_interval_minutes());
            tracing::info!(query = %query, minutes, "watching saved query");

            let mut ticker = tokio::time::interval(Duration::from_secs(u64::from(minutes) * 60));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match client.execute_saved_query(&query, full).await {
                            Ok(rows) => {
                                let view = View::Query(QueryView { identifier: query.clone(), rows });
                                print!("{}", view.render());
                            }
                            Err(err) => tracing::warn!(error = %err, "refresh failed"),
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("stopping");
                        break;
                    }
                }
            }
        }
        Commands::Render {
            file,
            expand,
            children,
        } => {
            let source = read_file(&file)?;
            let ctx = RenderContext::new(build_client()?, Arc::new(TracingNotifier));
            let renderer = ReadModeRenderer::new(ctx);

            let mut root = markdown::compile(&source);
            let cx = PassContext {
                source_path: Some(file.display().to_string()),
            };
            let created = renderer.process(&mut root, &cx);

            if expand {
                for id in created {
                    let label = id.to_string();
                    if let Some(expansion) = renderer.expand(id).await {
                        print_expansion(&label, &expansion);
                    }
                    if children {
                        if let Some(expansion) = renderer.open_children(id).await {
                            print_expansion(&label, &expansion);
                        }
                    }
                }
            }
            renderer.sync(&mut root);
            println!("{}", root.to_html());
            renderer.teardown();
        }
        Commands::Live { file, lines, click } => {
            let text = read_file(&file)?;
            let visible = if lines.is_empty() {
                vec![0..text.len()]
            } else {
                lines
                    .iter()
                    .map(|spec| parse_lines(spec).map(|r| line_range(&text, r)))
                    .collect::<anyhow::Result<Vec<_>>>()?
            };
            let surface = TextSurface::new(text, visible);

            let ctx = RenderContext::new(build_client()?, Arc::new(TracingNotifier));
            let renderer = LiveModeRenderer::new(ctx);
            for decoration in renderer.recompute(&surface) {
                println!(
                    "{}..{}\t{}",
                    decoration.range.start, decoration.range.end, decoration.overlay.label
                );
            }

            if let Some(position) = click {
                let mut controller = PresentationController::new(MemoryHost::new());
                match renderer.activate(position, &mut controller).await {
                    None => bail!("No anchor overlay at offset {}", position),
                    Some(Expansion::Failed(message)) => bail!(message),
                    Some(_) => {
                        if let Some(view) = controller.active_view() {
                            print!("{}", view.render());
                        }
                    }
                }
            }
            renderer.teardown();
        }
        Commands::Insert {
            file,
            at,
            to,
            item,
            query,
        } => {
            let target = match (item, query) {
                (Some(id), _) => AnchorTarget::container(id),
                (None, Some(query)) => AnchorTarget::saved_query(query)?,
                (None, None) => bail!("Either --item or --query is required"),
            };
            let mut text = read_file(&file)?;
            let span = anchor::insert_anchor(&mut text, at..to.unwrap_or(at), &target);
            std::fs::write(&file, &text)
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!("{}\t{}..{}", target, span.start, span.end);
        }
    }

    Ok(())
}
