//! SkypyDB Monitor — terminal dashboard for a SkypyDB API server.
//!
//! Polls the API every couple of seconds and redraws on every state
//! change. Commands on stdin:
//! - `r` refresh now
//! - `h` toggle between the dashboard and health pages
//! - `q` quit (so does end of input)

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use skypydb_monitor::config::MonitorConfig;
use skypydb_monitor::{view, HttpDashboardApi, Poller, PollerOptions, PollerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Dashboard,
    Health,
}

impl Page {
    fn toggle(self) -> Self {
        match self {
            Page::Dashboard => Page::Health,
            Page::Health => Page::Dashboard,
        }
    }
}

/// One line of stdin, or end of input (`None`).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Refresh,
    TogglePage,
    Quit,
    Nothing,
    Unknown(String),
}

impl Command {
    fn parse(line: Option<&str>) -> Self {
        match line.map(str::trim) {
            None | Some("q") => Command::Quit,
            Some("r") => Command::Refresh,
            Some("h") => Command::TogglePage,
            Some("") => Command::Nothing,
            Some(other) => Command::Unknown(other.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the rendered pages.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skypydb_monitor=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("📊 SkypyDB Monitor v{}", env!("CARGO_PKG_VERSION"));

    let config = MonitorConfig::load().context("Failed to load monitor configuration")?;
    let api = HttpDashboardApi::from_config(&config).context("Failed to build API client")?;

    info!(
        api_url = %api.base_url(),
        poll_interval_ms = config.poll_interval_ms,
        "Watching SkypyDB API"
    );

    let poller = Poller::mount(Arc::new(api), PollerOptions::from_config(&config));
    let mut updates = poller.subscribe();
    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut page = Page::Dashboard;

    render(page, &updates.borrow_and_update().clone());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                render(page, &state);
            }
            line = commands.next_line() => {
                let line = line.context("Failed to read stdin")?;
                if line.is_none() {
                    info!("End of input");
                }
                match Command::parse(line.as_deref()) {
                    Command::Refresh => {
                        info!("Manual refresh requested");
                        poller.refresh();
                    }
                    Command::TogglePage => {
                        page = page.toggle();
                        render(page, &poller.state());
                    }
                    Command::Quit => break,
                    Command::Nothing => {}
                    Command::Unknown(other) => {
                        warn!(command = %other, "Unknown command (r = refresh, h = health page, q = quit)")
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    poller.shutdown();
    info!("SkypyDB Monitor stopped");
    Ok(())
}

fn render(page: Page, state: &PollerState) {
    let body = match page {
        Page::Dashboard => view::render_dashboard(state),
        Page::Health => view::render_health(state),
    };
    let title = match page {
        Page::Dashboard => "Dashboard",
        Page::Health => "Health Monitoring",
    };
    println!("━━━━ {} ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━", title);
    print!("{}", body);
}
