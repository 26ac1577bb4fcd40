// inertia-headless: load a protocol app from a URL, optionally perform one visit, print
// the lifecycle events and the final page.

use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Context;
use clap::Parser;
use inertia_core::{form_map, Event, EventKind, FormMap, Method, NavigationType, Router, VisitOptions};
use inertia_headless::{
    config, Config, HeadlessBrowser, HttpTransport, NameResolver, Navigator, RecordingView,
    SessionStorage, VisitOutcome,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;
use url::Url;

type CliNavigator = Navigator<NameResolver, RecordingView>;
type EventLog = Arc<StdMutex<Vec<String>>>;

#[derive(Debug, Parser)]
#[command(name = "inertia-headless", version, about = "Drive an Inertia app without a browser")]
struct Cli {
    /// Page to load first.
    url: Url,
    /// Visit this URL after the initial load.
    #[arg(long)]
    visit: Option<String>,
    #[arg(long, default_value = "get")]
    method: Method,
    /// Visit payload as a JSON object.
    #[arg(long)]
    data: Option<String>,
    /// Prop keys for a partial reload, comma separated.
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,
    #[arg(long)]
    error_bag: Option<String>,
    /// Extra request header as `Name: value`. Repeatable.
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
    /// Replace the current history entry instead of pushing one.
    #[arg(long)]
    replace: bool,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got {s:?}"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let cli = Cli::parse();
    tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted");
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable. Level from RUST_LOG (default warn).
fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load();
    let transport = HttpTransport::new(&cfg).context("building http client")?;
    let session = match &cfg.session_file {
        Some(path) => SessionStorage::open(path)?,
        None => SessionStorage::in_memory(),
    };
    let browser = Arc::new(Mutex::new(HeadlessBrowser::with_session(cli.url.clone(), session)));
    let log: EventLog = Arc::default();

    let mut navigator = open(&cfg, &transport, &browser, &log, NavigationType::Navigate).await?;

    if let Some(href) = &cli.visit {
        let data = match &cli.data {
            Some(raw) => form_map(serde_json::from_str(raw).context("--data must be a JSON object")?),
            None => FormMap::new(),
        };
        let mut options = VisitOptions::new()
            .method(cli.method)
            .data(data)
            .replace(cli.replace)
            .only(cli.only.clone());
        if let Some(bag) = &cli.error_bag {
            options = options.error_bag(bag.clone());
        }
        for (name, value) in &cli.headers {
            options = options.header(name.clone(), value.clone());
        }
        match navigator.visit(href, options).await? {
            VisitOutcome::Location(url) => {
                let reload = browser
                    .lock()
                    .await
                    .hard_navigations()
                    .last()
                    .is_some_and(|h| h.reload);
                record(&log, format!("location {url}"));
                let navigation = if reload {
                    NavigationType::Reload
                } else {
                    NavigationType::Navigate
                };
                navigator = open(&cfg, &transport, &browser, &log, navigation).await?;
            }
            VisitOutcome::Invalid(overlay) => {
                record(&log, format!("overlay status {}", overlay.status));
                eprintln!("{}", overlay.frame_document());
            }
            outcome => tracing::debug!(?outcome, "visit done"),
        }
    }

    for line in log.lock().map(|l| l.clone()).unwrap_or_default() {
        println!("{line}");
    }
    let page = navigator.page().await;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

/// Load the browser's current document into a fresh engine.
async fn open(
    cfg: &Config,
    transport: &HttpTransport,
    browser: &Arc<Mutex<HeadlessBrowser>>,
    log: &EventLog,
    navigation: NavigationType,
) -> anyhow::Result<CliNavigator> {
    let navigator = Navigator::new(
        Router::with_config(cfg.router_config()),
        browser.clone(),
        transport.clone(),
        NameResolver::any(),
        RecordingView::new(),
    );
    for kind in EventKind::ALL {
        let log = log.clone();
        navigator
            .on(kind, move |event: &Event<'_>| record(&log, describe(event)))
            .await;
    }
    let location = browser.lock().await.location().clone();
    navigator
        .boot(navigation)
        .await
        .with_context(|| format!("loading {location}"))?;
    Ok(navigator)
}

fn record(log: &EventLog, line: String) {
    if let Ok(mut log) = log.lock() {
        log.push(line);
    }
}

fn describe(event: &Event<'_>) -> String {
    let kind = event.kind();
    match event {
        Event::Before(v) | Event::Start(v) => format!("{kind} {} {}", v.method, v.url),
        Event::Cancel(v) | Event::Finish(v) => format!("{kind} {:?}", v.state()),
        Event::CancelToken(_) => kind.to_string(),
        Event::Progress(p) => match p.percentage {
            Some(pct) => format!("{kind} {}% ({} bytes)", pct, p.loaded),
            None => format!("{kind} {} bytes", p.loaded),
        },
        Event::Error(errors) => format!("{kind} {}", Value::Object((**errors).clone())),
        Event::Success(page) | Event::Navigate(page) => format!("{kind} {} {}", page.component, page.url),
        Event::Invalid(response) => format!("{kind} status {}", response.status),
        Event::Exception(error) => format!("{kind} {error}"),
    }
}
