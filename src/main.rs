//! Codeblock - syntax-highlighted code samples as HTML.
//!
//! # Usage
//!
//! ```bash
//! codeblock example.py
//! codeblock --lang bash install.txt setup.sh
//! codeblock --watch --output samples.html src/*.rs
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use codeblock::app::{App, BlockId, Sample};
use codeblock::config::{
    ConfigFlags, clear_config_flags, global_config_path, load_config_flags, local_override_path,
    parse_flag_tokens, save_config_flags,
};
use codeblock::copy::ClipboardFailurePolicy;
use codeblock::highlight::{HighlightPipeline, HighlighterCache, LanguageTag, ThemeId};
use codeblock::perf;

/// Render code samples as syntax-highlighted HTML
#[derive(Parser, Debug)]
#[command(name = "codeblock", version, about, long_about = None)]
struct Cli {
    /// Source files, one code sample each
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Language for every sample (default: each file's extension)
    #[arg(short, long, value_name = "TAG")]
    lang: Option<String>,

    /// Watch sample files and re-render on change
    #[arg(short, long)]
    watch: bool,

    /// Highlight theme
    #[arg(long, value_name = "ID")]
    theme: Option<String>,

    /// Extra folder of .sublime-syntax definitions
    #[arg(long, value_name = "DIR")]
    syntax_dir: Option<PathBuf>,

    /// Copy sample INDEX (0-based) to the clipboard on start
    #[arg(long, value_name = "INDEX")]
    copy: Option<usize>,

    /// What the copy button shows when the clipboard write fails.
    ///
    /// Off macOS the clipboard is set with an OSC 52 terminal sequence, which
    /// only fails if stderr itself cannot be written.
    #[arg(long, value_enum)]
    clipboard_policy: Option<ClipboardFailurePolicy>,

    /// Write the page to a file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Enable performance timing logs
    #[arg(long)]
    perf: bool,

    /// Write detailed render debug events to a file
    #[arg(long, value_name = "PATH")]
    render_debug_log: Option<PathBuf>,

    /// Save current command-line flags as defaults
    #[arg(long)]
    save: bool,

    /// Clear saved defaults
    #[arg(long)]
    clear: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    perf::set_enabled(effective.perf);
    if effective.perf {
        // Scope timings are reported at info level.
        tracing::info!(target: "codeblock::perf", "perf logging enabled");
    }
    let render_debug_log_path = effective
        .render_debug_log
        .clone()
        .or_else(|| std::env::var_os("CODEBLOCK_RENDER_DEBUG_LOG").map(PathBuf::from));
    if let Err(err) = perf::set_debug_log_path(render_debug_log_path.as_deref()) {
        tracing::warn!(
            path = %render_debug_log_path
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string()),
            %err,
            "failed to initialize render debug log"
        );
    }

    let language = cli.lang.map(LanguageTag::new);
    let samples = cli
        .files
        .iter()
        .map(|path| Sample::from_file(path, language.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    if let Some(index) = cli.copy
        && index >= samples.len()
    {
        anyhow::bail!(
            "--copy {index} is out of range ({} sample(s) given)",
            samples.len()
        );
    }

    let theme = effective
        .theme
        .clone()
        .map_or_else(ThemeId::default, ThemeId::new);
    let cache = Arc::new(HighlighterCache::syntect(effective.syntax_dir.clone()));
    let pipeline = HighlightPipeline::new(cache).with_theme(theme);

    let app = App::new(samples)
        .with_pipeline(pipeline)
        .with_watch(effective.watch)
        .with_clipboard_policy(effective.clipboard_policy.unwrap_or_default())
        .with_copy_on_start(cli.copy.map(BlockId))
        .with_output(cli.output);

    app.run().context("Render failed")
}
