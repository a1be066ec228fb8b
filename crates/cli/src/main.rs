use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use logview_api::{InProcSource, LogSource, PageRequest};
use logview_core::{Cursor, Direction, LogEntry, LogLevel, QueryModel, TimeRange};
use logview_fs::FsLogBackend;
use logview_viewer::{ScrollEvent, ScrollSnapshot, TailInterval, Viewer, ViewerConfig};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "logviewctl", version, about = "Browse and tail service logs")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Log root directory (one sub-directory per service)
    #[arg(long = "root", env = "LOGVIEW_ROOT", global = true)]
    root: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum DirectionArg { Backward, Forward }

/// Filter flags shared by every log-reading command.
#[derive(clap::Args, Debug, Clone)]
struct FilterArgs {
    /// Service id; repeat for several
    #[arg(short = 's', long = "service", required = true)]
    services: Vec<String>,
    /// Only this level (info, warning, error)
    #[arg(long = "level")]
    level: Option<String>,
    /// Case-insensitive substring
    #[arg(long = "keyword")]
    keyword: Option<String>,
    /// Relative time range: 15m, 1h or 24h
    #[arg(long = "range")]
    range: Option<String>,
}

impl FilterArgs {
    fn to_query(&self) -> Result<QueryModel> {
        let level = self.level.as_deref().map(LogLevel::from_str).transpose().map_err(anyhow::Error::msg)?;
        let since = match self.range.as_deref() {
            Some(r) => Some(TimeRange::from_str(r).map_err(anyhow::Error::msg)?.since(chrono::Utc::now())),
            None => None,
        };
        Ok(QueryModel::for_services(self.services.iter().cloned())
            .with_level(level)
            .with_keyword(self.keyword.as_deref())
            .with_since(since))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List log services under the root
    Services,
    /// Fetch one page of entries
    Query {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long = "direction", value_enum, default_value_t = DirectionArg::Backward)]
        direction: DirectionArg,
        /// Page size
        #[arg(long = "limit", default_value_t = 100)]
        limit: usize,
        /// Continuation token from a previous page
        #[arg(long = "cursor")]
        cursor: Option<String>,
    },
    /// Follow one service and print new entries until Ctrl-C
    Tail {
        #[command(flatten)]
        filter: FilterArgs,
        /// Poll interval in seconds (3, 5 or 10)
        #[arg(long = "interval", default_value = "3")]
        interval: TailInterval,
    },
    /// Load the viewer, page back through history and print the rendered window
    View {
        #[command(flatten)]
        filter: FilterArgs,
        /// Number of scroll-to-top gestures
        #[arg(long = "pages", default_value_t = 0)]
        pages: usize,
        /// Viewport height in pixels
        #[arg(long = "height")]
        height: Option<f64>,
        /// Print every entry in the window instead of a summary
        #[arg(long = "rows", action = ArgAction::SetTrue)]
        rows: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("LOGVIEW_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("LOGVIEW_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid LOGVIEW_METRICS_ADDR; expected host:port");
        }
    }
}

fn print_entry(e: &LogEntry) {
    let ts = if e.timestamp.is_empty() { "-" } else { e.timestamp.as_str() };
    println!("{} {:<7} {:<14} {}", ts, e.level.as_str().to_uppercase(), e.service, e.display_text());
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let backend = match cli.root.as_deref() {
        Some(root) => FsLogBackend::new(root),
        None => FsLogBackend::from_env(),
    };
    info!(root = %backend.root().display(), "log root");
    let source: Arc<dyn LogSource> = Arc::new(InProcSource::new(backend));

    match cli.command {
        Commands::Services => {
            let services = source.services().await.context("listing services")?;
            match cli.output {
                Output::Human => {
                    for s in services {
                        println!("{:<24} {}", s.id, s.label);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&services)?),
            }
        }
        Commands::Query { filter, direction, limit, cursor } => {
            let query = filter.to_query()?;
            let req = PageRequest {
                query,
                cursor: cursor.map(Cursor::new),
                direction: match direction {
                    DirectionArg::Backward => Direction::Backward,
                    DirectionArg::Forward => Direction::Forward,
                },
                limit,
            };
            let page = source.query_page(req).await.context("querying logs")?;
            match cli.output {
                Output::Human => {
                    for e in &page.entries {
                        print_entry(e);
                    }
                    match &page.next_cursor {
                        Some(c) => eprintln!("next cursor: {}", c),
                        None => eprintln!("(no more entries)"),
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&page)?),
            }
        }
        Commands::Tail { filter, interval } => {
            let query = filter.to_query()?;
            if query.single_service().is_none() {
                bail!("tail follows exactly one service");
            }
            let config = ViewerConfig { tail_interval: interval, ..ViewerConfig::from_env() };
            let mut viewer = Viewer::new(Arc::clone(&source), config);
            viewer.set_live(true);
            viewer.set_query(query);
            info!(interval = ?interval, "tail started");

            let mut last_key: Option<String> = None;
            let mut last_error: Option<String> = None;
            loop {
                tokio::select! {
                    _ = viewer.next_update() => {
                        viewer.process_updates();
                        let entries = viewer.store().as_slice();
                        let from = last_key
                            .as_deref()
                            .and_then(|k| entries.iter().rposition(|e| e.key().to_string() == k))
                            .map(|i| i + 1)
                            .unwrap_or(0);
                        for e in &entries[from..] {
                            match cli.output {
                                Output::Human => print_entry(e),
                                Output::Json => println!("{}", serde_json::to_string(e)?),
                            }
                        }
                        if let Some(e) = entries.last() {
                            last_key = Some(e.key().to_string());
                        }
                        let err = viewer.last_error().map(str::to_string);
                        if err.is_some() && err != last_error {
                            eprintln!("tail error: {}", err.as_deref().unwrap_or_default());
                        }
                        last_error = err;
                    }
                    _ = signal::ctrl_c() => {
                        info!("Ctrl-C received; stopping tail");
                        break;
                    }
                }
            }
            viewer.unmount();
        }
        Commands::View { filter, pages, height, rows } => {
            let query = filter.to_query()?;
            let config = ViewerConfig::from_env();
            let viewport_height = height.unwrap_or(config.default_viewport_height);
            let pause = config.load_more_interval + Duration::from_millis(1);
            let mut viewer = Viewer::new(Arc::clone(&source), config);
            viewer.set_query(query);
            viewer.next_update().await;
            let h = viewer.content_height();
            if let Some(offset) = viewer.layout_settled(ScrollSnapshot { scroll_offset: 0.0, scroll_height: h }) {
                viewer.on_scroll(ScrollEvent { scroll_offset: offset, viewport_height, scroll_height: h });
            }

            for page in 0..pages {
                if !viewer.window().has_more {
                    info!(page, "oldest entry reached");
                    break;
                }
                tokio::time::sleep(pause).await;
                let before = viewer.content_height();
                if !viewer.on_scroll(ScrollEvent { scroll_offset: 0.0, viewport_height, scroll_height: before }) {
                    break;
                }
                viewer.next_update().await;
                let after = viewer.content_height();
                let target = viewer.layout_settled(ScrollSnapshot { scroll_offset: 0.0, scroll_height: after }).unwrap_or(0.0);
                viewer.on_scroll(ScrollEvent { scroll_offset: target, viewport_height, scroll_height: after });
            }

            let w = viewer.window();
            match cli.output {
                Output::Human => {
                    println!(
                        "entries={} warning={} error={} window={}..{} top={}px bottom={}px has_more={}",
                        w.totals.total,
                        w.totals.warning,
                        w.totals.error,
                        w.start_index,
                        w.start_index + w.visible_entries.len(),
                        w.top_spacer_height,
                        w.bottom_spacer_height,
                        w.has_more,
                    );
                    if let Some(err) = w.last_error {
                        eprintln!("error: {}", err);
                    }
                    if rows {
                        for e in w.visible_entries {
                            print_entry(e);
                        }
                    }
                }
                Output::Json => {
                    #[derive(serde::Serialize)]
                    struct Window<'a> {
                        start_index: usize,
                        top_spacer_height: f64,
                        bottom_spacer_height: f64,
                        has_more: bool,
                        last_error: Option<&'a str>,
                        totals: logview_store::LevelTotals,
                        entries: &'a [LogEntry],
                    }
                    let out = Window {
                        start_index: w.start_index,
                        top_spacer_height: w.top_spacer_height,
                        bottom_spacer_height: w.bottom_spacer_height,
                        has_more: w.has_more,
                        last_error: w.last_error,
                        totals: w.totals,
                        entries: w.visible_entries,
                    };
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
            }
        }
    }

    Ok(())
}
