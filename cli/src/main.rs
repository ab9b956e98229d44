use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand};
use polling::{DomainError, FetchOutcome, PollEvent, PollPolicy, Poller, Scheduler, TransportFailure};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("invalid query pair `{0}` (expected key=value)")]
    InvalidQuery(String),
    #[error("{0}")]
    Transport(#[from] TransportFailure),
    #[error("node rejected the request: {0}")]
    Rejected(String),
    #[error("not authenticated; run `login` and pass the cookie with --cookie or NODE_UI_COOKIE")]
    Unauthenticated,
    #[error("health check failed: HTTP {0}")]
    Unhealthy(u16),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<DomainError> for CliError {
    fn from(err: DomainError) -> Self {
        match err.kind {
            polling::DomainErrorKind::Unauthenticated => Self::Unauthenticated,
            polling::DomainErrorKind::Other(_) => Self::Rejected(err.message()),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "node-ui-cli", about = "Node admin API CLI (through the node-ui host or directly)")]
struct Cli {
    #[arg(long, env = "NODE_UI_BASE_URL", default_value = "http://127.0.0.1:3333")]
    base_url: String,

    /// Raw `Cookie` header sent with every request.
    #[arg(long, env = "NODE_UI_COOKIE")]
    cookie: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the host's `/healthz`.
    Ping,
    /// Fetch an endpoint once and print its `data`.
    Get(GetArgs),
    /// Poll an endpoint and print every fresh snapshot until Ctrl-C.
    Watch(WatchArgs),
    /// Sign in and print the session cookie.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "NODE_UI_PASSWORD")]
        password: String,
    },
}

#[derive(Args, Debug)]
struct GetArgs {
    /// Endpoint path, e.g. `node-info` or `/schain-config`.
    endpoint: String,

    /// Query parameters as key=value.
    #[arg(long = "query", short = 'q')]
    query: Vec<String>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    endpoint: String,

    #[arg(long, default_value_t = 6000)]
    interval_ms: u64,

    /// Stop after this many snapshots.
    #[arg(long)]
    count: Option<u64>,
}

#[derive(Debug, Clone)]
struct CliContext {
    base_url: String,
    client: reqwest::Client,
}

impl CliContext {
    fn new(base_url: &str, cookie: Option<&str>) -> Result<Self, CliError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            headers.insert(COOKIE, HeaderValue::from_str(cookie)?);
        }
        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_owned(), client })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, normalize_endpoint(endpoint))
    }
}

/// Tokio timer and wall clock for the polling driver.
struct TokioScheduler;

impl Scheduler for TokioScheduler {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now_ms(&self) -> i64 {
        now_ms()
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let ctx = CliContext::new(&cli.base_url, cli.cookie.as_deref())?;

    match cli.command {
        Command::Ping => run_ping(&ctx).await,
        Command::Get(args) => run_get(&ctx, args).await,
        Command::Watch(args) => run_watch(&ctx, args).await,
        Command::Login { username, password } => run_login(&ctx, &username, &password).await,
    }
}

async fn run_ping(ctx: &CliContext) -> Result<(), CliError> {
    let response = ctx.client.get(ctx.url("/healthz")).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::Unhealthy(status.as_u16()));
    }
    println!("ok");
    Ok(())
}

async fn run_get(ctx: &CliContext, args: GetArgs) -> Result<(), CliError> {
    let query = parse_query(&args.query)?;
    let request = ctx.client.get(ctx.url(&args.endpoint)).query(&query);
    let data = into_result(fetch(request).await)?;
    print_json(&data)
}

async fn run_watch(ctx: &CliContext, args: WatchArgs) -> Result<(), CliError> {
    let poller: Poller<Value> = Poller::new(
        normalize_endpoint(&args.endpoint),
        Duration::from_millis(args.interval_ms.max(1)),
        PollPolicy::new().redirect_unauthenticated("/login"),
    );
    let url = ctx.url(&args.endpoint);
    let mut printed = 0_u64;
    let mut outcome: Result<(), CliError> = Ok(());

    let fetch_once = || fetch(ctx.client.get(&url));
    let on_event = |event: PollEvent<Value>| match event {
        PollEvent::Updated(snapshot) => {
            eprintln!("[{}] {}", snapshot.loaded_at.unwrap_or_default(), poller.endpoint());
            if let Err(e) = print_json(snapshot.data.as_ref().unwrap_or(&Value::Null)) {
                outcome = Err(e);
                poller.stop();
            }
            printed += 1;
            if args.count.is_some_and(|limit| printed >= limit) {
                poller.stop();
            }
        }
        PollEvent::Redirect(_) => outcome = Err(CliError::Unauthenticated),
        PollEvent::DomainError(err) => eprintln!("rejected: {}", err.message()),
        PollEvent::Failed(err) => eprintln!("fetch failed: {err}"),
        PollEvent::Discarded => {}
    };

    tokio::select! {
        () = polling::drive(&poller, &TokioScheduler, fetch_once, on_event) => {}
        _ = tokio::signal::ctrl_c() => poller.stop(),
    }
    outcome
}

async fn run_login(ctx: &CliContext, username: &str, password: &str) -> Result<(), CliError> {
    let response = ctx
        .client
        .post(ctx.url("/login"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await?;
    let cookies = session_cookies(response.headers());
    let body = response.text().await?;
    into_result(polling::classify::<Value>(&body))?;

    if cookies.is_empty() {
        eprintln!("signed in, but the node set no cookie");
    } else {
        println!("{cookies}");
    }
    Ok(())
}

async fn fetch(request: reqwest::RequestBuilder) -> FetchOutcome<Value> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return TransportFailure::Network(e.to_string()).into(),
    };
    match response.text().await {
        Ok(body) => polling::classify(&body),
        Err(e) => TransportFailure::Network(e.to_string()).into(),
    }
}

fn into_result<T>(outcome: FetchOutcome<T>) -> Result<T, CliError> {
    match outcome {
        FetchOutcome::Ok(data) => Ok(data),
        FetchOutcome::DomainError(err) => Err(err.into()),
        FetchOutcome::TransportFailure(err) => Err(err.into()),
    }
}

/// `node-info` and `/node-info` name the same endpoint.
fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.starts_with('/') { trimmed.to_owned() } else { format!("/{trimmed}") }
}

fn parse_query(pairs: &[String]) -> Result<Vec<(String, String)>, CliError> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
            _ => Err(CliError::InvalidQuery(pair.clone())),
        })
        .collect()
}

/// `name=value` pairs from every `Set-Cookie`, joined as a `Cookie` header.
fn session_cookies(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;
