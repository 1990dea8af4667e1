mod client;
mod protocol;
mod query;
mod report;
mod session;
mod ui;

use clap::Parser;
use std::path::PathBuf;

/// Terminal client for the financial research agent: submit a query, watch
/// the run stream in, save the report.
#[derive(Debug, Parser)]
#[command(name = "finsight", version)]
struct Cli {
    /// Research question to submit as soon as the client starts
    query: Option<String>,

    /// Ticker symbols to research (comma-separated or repeated)
    #[arg(short = 't', long = "ticker", value_delimiter = ',')]
    tickers: Vec<String>,

    /// SEC filer ids (CIK) to research
    #[arg(long = "cik", value_delimiter = ',')]
    ciks: Vec<String>,

    /// SEC form types to retrieve
    #[arg(
        short = 'f',
        long = "form",
        value_delimiter = ',',
        default_values_t = query::DEFAULT_FORMS.map(String::from)
    )]
    forms: Vec<String>,

    /// Fiscal years to retrieve
    #[arg(short = 'y', long = "year", value_delimiter = ',', required = true)]
    years: Vec<u16>,

    /// Base URL of the agent server
    #[arg(
        long,
        env = "FINSIGHT_BASE_URL",
        default_value = "http://localhost:8000"
    )]
    base_url: String,

    /// Directory saved reports are written to
    #[arg(long, env = "FINSIGHT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let filters = query::Filters::build(&cli.tickers, &cli.ciks, &cli.forms, &cli.years)?;
    let client = client::AgentClient::new(&cli.base_url);

    ui::run(ui::AppConfig {
        client,
        filters,
        output_dir: cli.output_dir,
        initial_query: cli.query,
    })
}
