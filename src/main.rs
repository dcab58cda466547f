use clap::Parser;
use futures::StreamExt;
use parallel_pull::{
    CancellationToken, Config, Error, ErrorReport, Orchestrator, OutputFormat, ProgressState,
    Result, cancel_on_signal, cleanup, manifest, output, registry,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "parallel-pull")]
#[command(version)]
#[command(about = "Pull container images concurrently with retries and progress", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Image manifest file (YAML `images:` list)
    #[arg(short, long, value_name = "FILE")]
    images: Option<PathBuf>,

    /// Maximum concurrent pulls (1-20)
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Retries per image after the first failed attempt (0-10)
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Per-attempt timeout in seconds (30-1800)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Base retry delay in seconds
    #[arg(long, value_name = "SECS")]
    retry_delay: Option<u64>,

    /// Output format: text or json
    #[arg(long, value_name = "FORMAT")]
    format: Option<OutputFormat>,

    /// Docker Engine endpoint (unix://, tcp://, http:// or https://)
    #[arg(long, env = "DOCKER_HOST", value_name = "URL")]
    registry: Option<String>,

    /// Keep pulled images after the run
    #[arg(long)]
    no_cleanup: bool,

    /// Do not draw the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Log registry output for every pull
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Build the effective configuration: file (or defaults), then flags
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(images) = &self.images {
            config.manifest_file = images.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrency = concurrency;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Duration::from_secs(timeout);
        }
        if let Some(retry_delay) = self.retry_delay {
            config.retry_delay = Duration::from_secs(retry_delay);
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(endpoint) = &self.registry
            && !endpoint.is_empty()
        {
            config.registry.endpoint = endpoint.clone();
        }
        if self.no_cleanup {
            config.cleanup_after_run = false;
        }
        if self.no_progress {
            config.show_progress = false;
        }
        if self.verbose {
            config.verbose = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(format: OutputFormat, verbose: bool) {
    let default_filter = if verbose {
        "parallel_pull=debug"
    } else {
        "parallel_pull=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

/// Redraw the progress bar on stderr for every snapshot until `stop` fires
fn spawn_progress_renderer(
    mut feed: WatchStream<ProgressState>,
    stop: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                state = feed.next() => match state {
                    Some(state) => eprint!("\r{}", output::render_progress_bar(&state)),
                    None => break,
                },
            }
        }
    })
}

/// Progress bar line for the last snapshot the orchestrator published
fn final_progress_line(progress: &watch::Receiver<ProgressState>) -> String {
    output::render_progress_bar(&progress.borrow())
}

async fn run(config: Config) -> Result<bool> {
    let images = manifest::load(&config.manifest_file)?;
    tracing::info!(images = images.len(), "Loaded image manifest");

    let registry = registry::connect(&config.registry)?;
    tracing::debug!(client = registry.name(), "Connecting to Docker daemon");
    registry.ping().await?;

    let orchestrator = Orchestrator::new(registry.clone(), &config)?;

    let cancel = CancellationToken::new();
    let signal_listener = cancel_on_signal(cancel.clone());

    let draw_progress = config.show_progress && config.output_format == OutputFormat::Text;
    let progress = orchestrator.subscribe();
    let renderer_stop = CancellationToken::new();
    let renderer = draw_progress.then(|| {
        spawn_progress_renderer(WatchStream::new(progress.clone()), renderer_stop.clone())
    });

    let report = orchestrator.run(images, &cancel).await;

    if let Some(renderer) = renderer {
        renderer_stop.cancel();
        renderer.await.ok();
        eprintln!("\r{}", final_progress_line(&progress));
    }

    match config.output_format {
        OutputFormat::Json => println!("{}", output::render_json(&report)?),
        OutputFormat::Text => {
            println!();
            print!("{}", output::render_summary_text(&report.metrics));
            if report.has_failures() {
                println!();
                println!("Failed images:");
                print!("{}", output::render_failures_text(&report.results));
            }
        }
    }

    if config.cleanup_after_run && !cancel.is_cancelled() {
        cleanup::remove_pulled(registry.as_ref(), &report.results).await;
    }

    cancel.cancel();
    signal_listener.await.ok();

    Ok(report.has_failures())
}

fn report_error(error: &Error, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&ErrorReport::from(error)) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error: {}", error.sanitized()),
        },
        OutputFormat::Text => eprintln!("Error: {}", error.sanitized()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            report_error(&e, cli.format.unwrap_or_default());
            return ExitCode::FAILURE;
        }
    };

    init_logging(config.output_format, config.verbose);
    let format = config.output_format;

    match run(config).await {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e.sanitized(), code = e.error_code(), "Pull run aborted");
            report_error(&e, format);
            ExitCode::FAILURE
        }
    }
}
