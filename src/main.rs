use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use page_harvest::config::{load_env_file, SESSION_SETTLE_DELAY};
use page_harvest::workflow::{DEFAULT_COLLECT_OUTPUT, DEFAULT_EXTRACT_OUTPUT};
use page_harvest::{
    end_session, Error, ExtractionMode, ExtractionRequest, HarvestConfig, OllamaExtractor,
    RemoteSession, Result, RunSummary, Schema, Workflow, CLICKABLE_SELECTORS,
};

#[derive(Parser)]
#[command(
    name = "page-harvest",
    about = "Collect clickable elements or LLM-extracted data from a web page into JSON",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Show the browser window instead of running headless.
    #[arg(long, global = true)]
    headed: bool,

    /// Read environment variables from this file instead of `./.env`.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Seconds to wait for a page to load.
    #[arg(long, default_value_t = 30, global = true)]
    navigation_timeout_secs: u64,

    /// Browser viewport width in pixels.
    #[arg(long, default_value_t = 1920, global = true)]
    viewport_width: u32,

    /// Browser viewport height in pixels.
    #[arg(long, default_value_t = 1080, global = true)]
    viewport_height: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save every clickable element of a page.
    Collect {
        /// Page to load.
        #[arg(long, default_value = "https://mrq-test.com")]
        url: String,

        /// Output JSON file.
        #[arg(short, long, default_value = DEFAULT_COLLECT_OUTPUT)]
        output: PathBuf,

        /// CSS selector to match (repeatable). Defaults to links, buttons and
        /// button-like inputs.
        #[arg(short, long = "selector")]
        selectors: Vec<String>,
    },

    /// Extract structured data from a page with an LLM.
    Extract {
        /// Page to load.
        #[arg(long, default_value = "https://mrq-test.com")]
        url: String,

        /// What to extract, in plain language.
        #[arg(short, long)]
        instruction: String,

        /// Result schema in compact JSON form, or `@path` to read it from a file.
        #[arg(short, long)]
        schema: String,

        /// Extract from page text or from a screenshot.
        #[arg(long, value_enum, default_value_t = ModeArg::Text)]
        mode: ModeArg,

        /// Output JSON file.
        #[arg(short, long, default_value = DEFAULT_EXTRACT_OUTPUT)]
        output: PathBuf,

        /// Seconds to wait for the model to answer.
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,

        /// Model name (overrides HARVEST_MODEL).
        #[arg(long, env = "HARVEST_MODEL")]
        model: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Text,
    Vision,
}

impl From<ModeArg> for ExtractionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Text => ExtractionMode::Text,
            ModeArg::Vision => ExtractionMode::Vision,
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_schema(arg: &str) -> Result<Schema> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidRequest(format!("cannot read schema file {path}: {e}")))?,
        None => arg.to_string(),
    };
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| Error::InvalidRequest(format!("schema is not valid JSON: {e}")))?;
    Schema::from_value(&value).map_err(|e| Error::InvalidRequest(format!("invalid schema: {e}")))
}

/// Browser settings taken from the command line.
struct BrowserArgs {
    headed: bool,
    navigation_timeout: Duration,
    viewport: (u32, u32),
}

/// A fully parsed job, ready to run once the browser is up.
enum Job {
    Collect {
        url: String,
        output: PathBuf,
        selectors: Vec<String>,
    },
    Extract {
        url: String,
        output: PathBuf,
        request: ExtractionRequest,
        extractor: OllamaExtractor,
        timeout: Duration,
    },
}

fn prepare(command: Command, config: &HarvestConfig) -> Result<Job> {
    Ok(match command {
        Command::Collect {
            url,
            output,
            selectors,
        } => Job::Collect {
            url,
            output,
            selectors,
        },
        Command::Extract {
            url,
            instruction,
            schema,
            mode,
            output,
            timeout_secs,
            model,
        } => {
            let request = ExtractionRequest::new(instruction, load_schema(&schema)?, mode.into());
            let extractor = OllamaExtractor::new(
                config.ollama_url.as_str(),
                model.unwrap_or_else(|| config.model.clone()),
            )?
            .with_api_key(config.api_key.clone());
            Job::Extract {
                url,
                output,
                request,
                extractor,
                timeout: Duration::from_secs(timeout_secs),
            }
        }
    })
}

async fn run(job: Job, config: &HarvestConfig, args: &BrowserArgs) -> Result<RunSummary> {
    let session = config.session_recording_url().map(|recording_url| RemoteSession {
        recording_url,
        settle_delay: SESSION_SETTLE_DELAY,
    });

    let (width, height) = args.viewport;
    let browser = config
        .browser_builder()
        .headless(!args.headed)
        .viewport(width, height)
        .timeout(args.navigation_timeout)
        .build()
        .await?;
    let page = match browser.new_page().await {
        Ok(page) => page,
        Err(e) => {
            end_session(browser.close(), None).await;
            return Err(e);
        }
    };

    let outcome = match job {
        Job::Collect {
            url,
            output,
            selectors,
        } => {
            let selectors: Vec<&str> = if selectors.is_empty() {
                CLICKABLE_SELECTORS.to_vec()
            } else {
                selectors.iter().map(String::as_str).collect()
            };
            Workflow::new(page, output)
                .run_collect(&url, &selectors)
                .await
        }
        Job::Extract {
            url,
            output,
            request,
            extractor,
            timeout,
        } => {
            tracing::info!(model = extractor.model_name(), "using Ollama extraction");
            Workflow::new(page, output)
                .with_extractor(&extractor)
                .extraction_timeout(timeout)
                .run_extract(&url, &request)
                .await
        }
    };

    let session = session.filter(|_| outcome.is_ok());
    end_session(browser.close(), session.as_ref()).await;
    outcome
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = match load_env_file(cli.env_file.as_deref()).and_then(|loaded| {
        if let Some(path) = loaded {
            tracing::debug!(path = %path.display(), "loaded environment file");
        }
        HarvestConfig::from_env()
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("setup failed: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    let browser_args = BrowserArgs {
        headed: cli.headed,
        navigation_timeout: Duration::from_secs(cli.navigation_timeout_secs),
        viewport: (cli.viewport_width, cli.viewport_height),
    };
    let outcome = match prepare(cli.command, &config) {
        Ok(job) => run(job, &config, &browser_args).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(summary) => {
            tracing::info!(
                output = %summary.output.display(),
                records = summary.records,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} failed: {e}", e.stage());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
