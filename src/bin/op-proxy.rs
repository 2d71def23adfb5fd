//! CLI binary for op-proxy.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ProxyConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use op_proxy::{
    build_sheet_to_file, load_decklist, parse_entry, CardRequest, Language, ProgressCallback,
    ProxyConfig, ProxyProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over decklist entries plus a log
/// line per card naming the source it came from.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-entry wall-clock start times.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Where each entry was found, until it completes.
    sources: Mutex<HashMap<usize, (String, bool)>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us how many entries there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading decklist…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            sources: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} cards  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Fetching");
        self.bar.reset_eta();
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl ProxyProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_entries: usize, total_cards: u32) {
        self.activate_bar(total_entries);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Fetching {total_cards} cards ({total_entries} entries)…"
            ))
        ));
    }

    fn on_card_start(&self, index: usize, _total: usize, identifier: &str) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(index, Instant::now());
        }
        self.bar.set_message(identifier.to_string());
    }

    fn on_card_resolved(
        &self,
        index: usize,
        _total: usize,
        _identifier: &str,
        provenance: &str,
        watermarked: bool,
    ) {
        if let Ok(mut s) = self.sources.lock() {
            s.insert(index, (provenance.to_string(), watermarked));
        }
    }

    fn on_card_complete(&self, index: usize, total: usize, identifier: &str, copies: u32) {
        let (source, watermarked) = self
            .sources
            .lock()
            .ok()
            .and_then(|mut s| s.remove(&index))
            .unwrap_or_default();
        let note = if watermarked {
            format!("  {}", yellow("SAMPLE watermark"))
        } else {
            String::new()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}x {:<16} {}  {}{}",
            green("✓"),
            index,
            total,
            copies,
            identifier,
            dim(&format!("via {source}")),
            self.elapsed(index),
            note,
        ));
        self.bar.inc(1);
    }

    fn on_card_error(&self, index: usize, total: usize, identifier: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut s) = self.sources.lock() {
            s.remove(&index);
        }

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<19} {}  {}",
            red("✗"),
            index,
            total,
            identifier,
            red(&msg),
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_entries: usize, rendered_cards: u32) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);

        if failed == 0 {
            eprintln!(
                "{} {} cards ready",
                green("✔"),
                bold(&rendered_cards.to_string())
            );
        } else {
            eprintln!(
                "{} {} cards ready  ({}/{} entries failed)",
                if failed == total_entries {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&rendered_cards.to_string()),
                red(&failed.to_string()),
                total_entries,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # A few cards straight from the command line
  op-proxy "4x OP01-001" "2x ST01-012" "Monkey.D.Luffy"

  # A decklist file, written to a custom path
  op-proxy -f deck.txt -o red-zoro.pdf

  # Prefer your own scans, fall back to the web for the rest
  op-proxy -f deck.txt --image-dir ~/scans

  # Japanese printings, no cache, 600 dpi
  op-proxy -f deck.txt --jp --no-cache --dpi 600

  # Machine-readable report of what was found where
  op-proxy -f deck.txt --json > report.json

DECKLIST FORMAT:
  One entry per line: [quantity][x] <card code or name>
    4x OP01-001
    4 ST01-012
    Monkey.D.Luffy
  Blank lines and lines starting with '#' are ignored.

SOURCES (tried in this order, first hit wins):
  Local            --image-dir files named OP01-001.png, op01-001.jpg, …
  Limitless CDN    limitlesstcg.nyc3.digitaloceanspaces.com
  OPCGDB           opcgdb.com
  Limitless Site   onepiece.limitlesstcg.com
  Top Decks        onepiecetopdecks.com
  Official Site    en.onepiece-cardgame.com card list   (SAMPLE watermark)
  TCGPlayer        tcgplayer.com
  Official CDN     onepiece-cardgame.com images          (SAMPLE watermark)

OUTPUT:
  US Letter PDF, 3 × 3 grid of 2.5in × 3.5in cards, centered.
"#;

/// Build printable proxy sheets for the One Piece Card Game.
#[derive(Parser, Debug)]
#[command(
    name = "op-proxy",
    version,
    about = "Build printable proxy sheets for the One Piece Card Game",
    long_about = "Find card images for a decklist across local scans, CDNs and community \
sites, resize them to exact card dimensions and lay them out 3 × 3 on US Letter pages.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Cards to print, e.g. "4x OP01-001" "ST01-012" "Nami".
    cards: Vec<String>,

    /// Decklist file, one entry per line.
    #[arg(short, long, env = "OP_PROXY_FILE")]
    file: Option<PathBuf>,

    /// Output PDF path.
    #[arg(short, long, env = "OP_PROXY_OUTPUT", default_value = "proxies.pdf")]
    output: PathBuf,

    /// Print resolution of the card images (72–1200).
    #[arg(long, env = "OP_PROXY_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    dpi: u32,

    /// Ignore cached images and download everything again.
    #[arg(long, env = "OP_PROXY_NO_CACHE")]
    no_cache: bool,

    /// Prefer Japanese printings.
    #[arg(long = "japanese", visible_alias = "jp", env = "OP_PROXY_JAPANESE")]
    japanese: bool,

    /// Folder of your own card scans, checked before any website.
    #[arg(long, env = "OP_PROXY_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// Where downloaded images are cached.
    #[arg(long, env = "OP_PROXY_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Pause between cards in milliseconds.
    #[arg(long, env = "OP_PROXY_DELAY_MS", default_value_t = 200)]
    delay_ms: u64,

    /// Print a JSON report (per-card sources and errors) to stdout.
    #[arg(long, env = "OP_PROXY_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "OP_PROXY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OP_PROXY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OP_PROXY_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar already reports every card; only errors get through
    // while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Collect requests ─────────────────────────────────────────────────
    let mut requests: Vec<CardRequest> = match cli.file {
        Some(ref path) => load_decklist(path)
            .with_context(|| format!("Failed to load decklist {}", path.display()))?,
        None => Vec::new(),
    };
    requests.extend(cli.cards.iter().filter_map(|c| parse_entry(c)));

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ProxyProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let summary = build_sheet_to_file(&requests, &cli.output, &config)
        .await
        .context("Failed to build proxy sheet")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise report")?;
        println!("{json}");
        return Ok(());
    }

    if !cli.quiet {
        if !show_progress {
            for outcome in summary.outcomes.iter().filter(|o| !o.is_rendered()) {
                if let Some(ref e) = outcome.error {
                    eprintln!("  {} {}", red("✗"), e);
                }
            }
        }
        let stats = &summary.stats;
        eprintln!(
            "{}  {}/{} cards  {} pages  {}ms  →  {}",
            if stats.failed_entries == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.rendered_cards,
            stats.requested_cards,
            summary.page_count,
            stats.duration_ms,
            bold(&summary.output.display().to_string()),
        );
        if stats.watermarked_cards > 0 {
            eprintln!(
                "   {} cards came from the official site and carry a SAMPLE watermark",
                yellow(&stats.watermarked_cards.to_string())
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ProxyConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ProxyConfig> {
    let mut builder = ProxyConfig::builder()
        .dpi(cli.dpi)
        .language(if cli.japanese {
            Language::Japanese
        } else {
            Language::English
        })
        .use_cache(!cli.no_cache)
        .request_delay_ms(cli.delay_ms);

    if let Some(ref dir) = cli.image_dir {
        builder = builder.image_dir(dir);
    }
    if let Some(ref dir) = cli.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
