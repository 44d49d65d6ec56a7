use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use is_terminal::IsTerminal;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pylive::{
    annotate::StyleKind,
    cli::Cli,
    config::{Config, EvalSettings},
    driver::{ChangeTracker, CycleOutcome, Debouncer, Driver},
    execution::python::PythonSandbox,
    printer::{AnnotatedPrinter, JsonPrinter, ProgressReporter},
    process::{python::probe, Interpreter},
    segment::{Document, MarkerSet},
};

const WATCH_POLL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let cfg = Config::load();
    let mut settings = EvalSettings::from_config(&cfg)
        .with_context(|| format!("invalid configuration in {}", cfg.config_path.display()))?;
    apply_overrides(&mut settings, &args);
    init_tracing(settings.debug);
    for key in cfg.unknown_keys() {
        warn!(key, path = %cfg.config_path.display(), "ignoring unknown config key");
    }
    debug!(?settings, "resolved settings");

    if args.gil_status {
        let info = probe(&settings.python).await?;
        AnnotatedPrinter::detect().status(&info.status_line(), StyleKind::Threading);
        return Ok(());
    }

    let sandbox = PythonSandbox::new(settings.python.clone(), settings.timeout);
    let driver = Driver::new(sandbox);

    if args.watch {
        let Some(path) = args.file else { bail!("--watch requires FILE") };
        return watch(path, driver, settings, args.json).await;
    }

    let text = read_source(args.file.as_deref())?;
    run_cycle(&driver, &text, &settings, args.json).await?;
    Ok(())
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {}", e);
    }
}

fn apply_overrides(settings: &mut EvalSettings, args: &Cli) {
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }
    if !args.markers.is_empty() {
        settings.markers = MarkerSet::new(args.markers.iter().cloned());
    }
    if let Some(ms) = args.delay {
        settings.unit_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = args.timeout {
        settings.timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = args.debounce {
        settings.debounce = Duration::from_millis(ms);
    }
    if let Some(path) = &args.python {
        settings.python = Interpreter::new(path.clone());
    }
    if args.timings {
        settings.show_timings = true;
    }
    if args.no_waiting {
        settings.show_waiting = false;
    }
    if args.debug {
        settings.debug = true;
    }
}

fn read_source(file: Option<&Path>) -> Result<String> {
    if let Some(path) = file {
        return std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()));
    }
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        bail!("no input: pass FILE or pipe Python source on stdin");
    }
    let mut buf = String::new();
    stdin.read_to_string(&mut buf)?;
    Ok(buf)
}

/// Runs and prints one cycle. Returns `false` when the driver was busy and dropped it.
async fn run_cycle(driver: &Driver<PythonSandbox>, text: &str, settings: &EvalSettings, json: bool) -> Result<bool> {
    let mut progress = ProgressReporter::detect();
    match driver.evaluate_with(text, settings, &mut progress).await {
        CycleOutcome::Skipped => {
            debug!("evaluation already running, request dropped");
            Ok(false)
        }
        CycleOutcome::Completed(annotations) if json => {
            JsonPrinter.print(&annotations)?;
            Ok(true)
        }
        CycleOutcome::Completed(annotations) => {
            let doc = Document::from_text(text);
            AnnotatedPrinter::detect().print(&doc, &annotations)?;
            Ok(true)
        }
    }
}

async fn watch(path: PathBuf, driver: Driver<PythonSandbox>, settings: EvalSettings, json: bool) -> Result<()> {
    let driver = Arc::new(driver);
    let settings = Arc::new(settings);
    let mut debouncer = Debouncer::new(settings.debounce);
    let mut tracker = ChangeTracker::new();
    let mut ticker = tokio::time::interval(WATCH_POLL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(path = %path.display(), "watching for changes");
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("stopping");
                break;
            }
            _ = ticker.tick() => {
                let text = match std::fs::read_to_string(&path) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(path = %path.display(), "cannot read file: {}", e);
                        continue;
                    }
                };
                let Some(change) = tracker.poll(text) else {
                    continue;
                };

                let driver = driver.clone();
                let settings = settings.clone();
                let stale = tracker.stale_flag();
                let text = change.text;
                let cycle = async move {
                    match run_cycle(&driver, &text, &settings, json).await {
                        // Dropped while another cycle ran; the next poll schedules it again.
                        Ok(false) => stale.mark(),
                        Ok(true) => {}
                        Err(e) => warn!("failed to print results: {}", e),
                    }
                };
                if change.first {
                    tokio::spawn(cycle);
                } else {
                    debug!("change detected, scheduling evaluation");
                    debouncer.schedule(cycle);
                }
            }
        }
    }
    Ok(())
}
