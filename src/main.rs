use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use hotsite::render_engine::{BuildOptions, BuildStats, RenderEngine, RenderEngineError};
use hotsite::{serve, ServeOptions};

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: HotsiteCommand,
}

#[derive(Subcommand)]
enum HotsiteCommand {
    /// Serve a site directory with incremental rebuilds and live reload
    Serve(ServeArgs),

    /// Internal: run as a build worker subprocess, reading a `BuildRequest`
    /// from stdin and writing a `BuildResult` to stdout. Never invoked
    /// directly; `BuildExecutor` re-execs the current binary with this
    /// flag when process isolation is selected.
    #[command(name = "build-worker", hide = true)]
    BuildWorker,
}

#[derive(Parser)]
struct ServeArgs {
    /// The site's source directory
    #[arg(default_value = ".")]
    site_root: PathBuf,

    /// Where rendered output is written and served from
    #[arg(short = 'o', long, default_value = "_site")]
    output_dir: PathBuf,

    /// The path to the configuration file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// The address to bind to
    #[arg(short, long)]
    bind: Option<String>,

    /// The port to bind to
    #[arg(short, long)]
    port: Option<u16>,

    /// Open the site in the default browser
    #[arg(long)]
    open: bool,

    /// Disable the file watcher (serve a static snapshot only)
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    match args.command {
        HotsiteCommand::Serve(args) => {
            let site_root = args.site_root.canonicalize().unwrap_or(args.site_root);
            let output_dir = site_root.join(&args.output_dir);
            let renderer = PassthroughRenderEngine {
                site_root: site_root.clone(),
                output_dir: output_dir.clone(),
            };

            serve(
                ServeOptions {
                    site_root,
                    output_dir,
                    config_file: args.config_file,
                    bind_override: args.bind,
                    port_override: args.port,
                    open_override: if args.open { Some(true) } else { None },
                    watch: !args.no_watch,
                },
                renderer,
            )
            .await?;
        }
        HotsiteCommand::BuildWorker => {
            hotsite::executor::run_build_worker::<PassthroughRenderEngine>()?;
        }
    }

    Ok(())
}

/// A renderer with no templating or markdown pipeline: it mirrors the
/// site's source tree into the output directory verbatim. Useful for
/// exercising the dev server end to end without a real page-rendering
/// engine wired up; a production user of this crate supplies their own
/// `RenderEngine` instead.
struct PassthroughRenderEngine {
    site_root: PathBuf,
    output_dir: PathBuf,
}

impl RenderEngine for PassthroughRenderEngine {
    fn build(&mut self, options: &BuildOptions) -> Result<BuildStats, RenderEngineError> {
        use hotsite::render_engine::{OutputPhase, OutputRecord, OutputType, ReloadHint};

        let sources: Vec<PathBuf> = if options.incremental {
            options.changed_sources.iter().cloned().collect()
        } else {
            collect_all_sources(&self.site_root, &self.output_dir)?
        };

        let mut changed_outputs = Vec::new();
        for source in &sources {
            let Ok(relative) = source.strip_prefix(&self.site_root) else {
                continue;
            };
            let dest = self.output_dir.join(relative);
            if !source.is_file() {
                continue;
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(source, &dest)?;

            let output_type = classify_extension(source);
            changed_outputs.push(OutputRecord {
                path: relative.to_path_buf(),
                output_type,
                phase: if output_type == OutputType::Html {
                    OutputPhase::Render
                } else {
                    OutputPhase::Asset
                },
            });
        }

        let reload_hint = if changed_outputs.is_empty() {
            Some(ReloadHint::None)
        } else if changed_outputs.iter().all(|r| r.output_type == OutputType::Css) {
            Some(ReloadHint::CssOnly)
        } else {
            Some(ReloadHint::Full)
        };

        Ok(BuildStats {
            total_pages: changed_outputs
                .iter()
                .filter(|r| r.output_type == OutputType::Html)
                .count() as u64,
            build_time_ms: 0.0,
            changed_outputs,
            reload_hint,
        })
    }

    fn prepare_for_rebuild(&mut self) {}

    fn from_config(root_path: &Path) -> Result<Self, RenderEngineError> {
        Ok(Self {
            site_root: root_path.to_path_buf(),
            output_dir: root_path.join("_site"),
        })
    }
}

fn classify_extension(path: &Path) -> hotsite::render_engine::OutputType {
    use hotsite::render_engine::OutputType;

    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => OutputType::Html,
        Some("css") => OutputType::Css,
        Some("js" | "mjs") => OutputType::Js,
        _ => OutputType::Asset,
    }
}

fn collect_all_sources(site_root: &Path, output_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in walkdir::WalkDir::new(site_root)
        .into_iter()
        .filter_entry(|e| e.path() != output_dir && !e.path().starts_with(output_dir))
    {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_file() {
            sources.push(entry.path().to_path_buf());
        }
    }
    Ok(sources)
}
