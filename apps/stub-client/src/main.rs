use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use http::Method;
use std::path::PathBuf;
use stub_http_client::{ClientConfig, MultiValueMap, TestClient, config};
use tracing_subscriber::EnvFilter;

/// Stub client - call a stub server with the configured HTTP client
#[derive(Parser)]
#[command(name = "stub-client")]
#[command(about = "Call a stub server with the configured HTTP client")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL override (overrides config and environment)
    #[arg(long)]
    url: Option<String>,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform one call against the stub server
    Call(CallArgs),
}

#[derive(Args)]
struct CallArgs {
    /// HTTP method, e.g. GET or POST
    #[arg(value_parser = parse_method)]
    method: Method,

    /// Path appended to the base URL
    path: String,

    /// Query parameter; repeat for multiple values
    #[arg(short = 'q', long = "query", value_name = "KEY=VALUE", value_parser = parse_pair)]
    query: Vec<(String, String)>,

    /// Request header; repeat for multiple values
    #[arg(short = 'H', long = "header", value_name = "KEY=VALUE", value_parser = parse_pair)]
    header: Vec<(String, String)>,

    /// JSON payload
    #[arg(long, value_parser = parse_json)]
    body: Option<serde_json::Value>,

    /// Decode the response body and print it as JSON
    #[arg(long)]
    expect_body: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // defaults -> YAML (if provided) -> env (STUB_CLIENT__*) -> CLI overrides
    let mut client_config = config::load(cli.config.as_deref(), ClientConfig::for_testing())
        .context("failed to load configuration")?;
    if let Some(url) = cli.url {
        client_config.url = url;
        client_config.validate().context("invalid --url")?;
    }

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&client_config)?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        bail!("no command given; try `stub-client call GET /hello --expect-body`");
    };

    match command {
        Commands::Call(args) => call(client_config, args).await,
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn call(client_config: ClientConfig, args: CallArgs) -> Result<()> {
    let client = TestClient::with_config(client_config).context("failed to build client")?;

    let params = to_multi_value(args.query);
    let headers = to_multi_value(args.header);
    let method = args.method;
    let path = args.path.as_str();

    tracing::info!(%method, path, "calling stub server");

    match (args.expect_body, args.body) {
        (true, Some(body)) => {
            let decoded = client
                .client()
                .request(method, path)
                .query(&params)
                .headers(&headers)
                .json(&body)?
                .send()
                .await?
                .decode::<serde_json::Value>()
                .await?;
            print_body(decoded.as_ref())?;
        }
        (true, None) => {
            let decoded: Option<serde_json::Value> = client
                .call_with_response(method, path, Some(&params), Some(&headers))
                .await?;
            print_body(decoded.as_ref())?;
        }
        (false, Some(body)) => {
            client
                .call_with_body(method, path, Some(&params), Some(&headers), Some(&body))
                .await?;
        }
        (false, None) => {
            client
                .call_without_response(method, path, Some(&params), Some(&headers))
                .await?;
        }
    }

    Ok(())
}

fn print_body(body: Option<&serde_json::Value>) -> Result<()> {
    match body {
        Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
        None => tracing::info!("response body is empty"),
    }
    Ok(())
}

fn to_multi_value(pairs: Vec<(String, String)>) -> MultiValueMap {
    pairs.into_iter().map(|(k, v)| (k, [v])).collect()
}

fn parse_method(s: &str) -> Result<Method, String> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes()).map_err(|e| e.to_string())
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

fn parse_json(s: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON body: {e}"))
}
