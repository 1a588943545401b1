use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use folio_cache::CacheStats;
use folio_render::{
    DecoderAdapter, DocumentHandle, DocumentRef, DocumentSource, LopdfSource, PageIndex,
    SyntheticSource, SyntheticSpec,
};
use folio_viewer::{ViewerConfig, ViewerController};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Parser)]
#[command(name = "folio")]
#[command(about = "Inspect documents and exercise the paged render cache")]
#[command(version)]
pub struct Cli {
    /// Viewer configuration file (defaults to the platform config dir).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Decode one page and write it as a JPEG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Raster scale (defaults to the configured render scale).
        #[arg(long)]
        scale: Option<f32>,
        /// JPEG quality, 1-100 (defaults to the configured quality).
        #[arg(long)]
        quality: Option<u8>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Read through a synthetic document and print the resident pages after
    /// every settled navigation, one JSON object per line.
    Simulate {
        #[arg(long, default_value_t = 40)]
        pages: u32,
        #[arg(long)]
        capacity: Option<u32>,
        #[arg(long)]
        look_ahead: Option<u32>,
        /// Pages to navigate to, in order.
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        navigate: Vec<PageIndex>,
        /// Pages whose decode always fails.
        #[arg(long, value_delimiter = ',')]
        fail: Vec<PageIndex>,
        /// Simulated decode latency per page.
        #[arg(long, default_value_t = 10)]
        latency_ms: u64,
    },
    /// Print the effective viewer configuration as TOML.
    Config,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: PageSizeOutput,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct SimulationStep {
    step: usize,
    cursor: PageIndex,
    resident: Vec<PageIndex>,
    failed: Vec<PageIndex>,
    decodes: u64,
}

#[derive(Debug, Serialize)]
struct SimulationSummary {
    pages: u32,
    capacity: u32,
    decodes: u64,
    hit_rate: f64,
    cache: CacheStats,
}

/// Install the stderr log subscriber, filtered by `FOLIO_LOG` (default `warn`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("FOLIO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let config = ViewerConfig::load(cli.config.as_deref())
        .context("failed to load viewer configuration")?;

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Render { file, page, scale, quality, output } => {
            let scale = scale.unwrap_or(config.render_scale);
            let quality = quality.unwrap_or(config.jpeg_quality);
            block_on_local(run_render(&file, page, scale, quality, output.as_deref()))
        }
        Commands::Simulate { pages, capacity, look_ahead, navigate, fail, latency_ms } => {
            let mut config = config;
            if let Some(capacity) = capacity {
                config.capacity = capacity;
                config.initial_burst = config.initial_burst.min(capacity);
            }
            if let Some(look_ahead) = look_ahead {
                config.look_ahead = look_ahead;
            }
            let spec = SyntheticSpec::new(pages)
                .with_latency(Duration::from_millis(latency_ms))
                .with_failing_pages(fail);
            block_on_local(run_simulate(spec, config, navigate))
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn block_on_local<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start runtime")?;

    LocalSet::new().block_on(&runtime, future)
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let document =
        LopdfSource::open_blocking(&DocumentRef::from(file)).context("failed to open PDF")?;
    let first = document.page_size(1).context("failed to read first page size")?;

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count: document.page_count(),
        first_page_size_pt: PageSizeOutput { width: first.width_pt, height: first.height_pt },
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

async fn run_render(
    file: &Path,
    page: PageIndex,
    scale: f32,
    quality: u8,
    output: Option<&Path>,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let handle =
        LopdfSource::new().open(&DocumentRef::from(file)).await.context("failed to open PDF")?;
    let decoder = DecoderAdapter::new(handle);

    let decoded = decoder.decode(page, scale).await.context("failed to render page")?;
    let jpeg = decoded.encode_jpeg(quality).context("failed to encode page")?;
    decoder.handle().close();

    let output =
        output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file, page));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&output, jpeg)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

async fn run_simulate(
    spec: SyntheticSpec,
    config: ViewerConfig,
    navigate: Vec<PageIndex>,
) -> Result<()> {
    let pages = spec.page_count;
    let capacity = config.capacity;
    let settle_delay = config.debounce() + spec.latency;

    let source = Rc::new(SyntheticSource::new(spec));
    let viewer =
        ViewerController::new(source.clone(), config).context("invalid viewer configuration")?;
    viewer.open("simulated").await.context("failed to open simulated document")?;

    let decodes = || source.last_opened().map(|document| document.total_decodes()).unwrap_or(0);
    print_step(&viewer, 0, decodes())?;

    for (step, target) in navigate.into_iter().enumerate() {
        viewer.on_navigate(target).with_context(|| format!("cannot navigate to page {target}"))?;
        tokio::time::sleep(settle_delay).await;

        while viewer.stats().tracker.in_flight > 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        debug!(step, target, "navigation settled");

        print_step(&viewer, step + 1, decodes())?;
    }

    let cache = viewer.stats().cache;
    let summary =
        SimulationSummary { pages, capacity, decodes: decodes(), hit_rate: cache.hit_rate(), cache };
    println!("{}", serde_json::to_string(&summary)?);

    viewer.close();
    Ok(())
}

fn print_step(viewer: &ViewerController, step: usize, decodes: u64) -> Result<()> {
    let pages = viewer.resident_pages();
    let line = SimulationStep {
        step,
        cursor: pages.cursor,
        resident: pages.ready(),
        failed: pages.failed(),
        decodes,
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_render_output(file: &Path, page: PageIndex) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.jpg"))
}
