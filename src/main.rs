use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use console::Style;
use tracing::warn;

use photobatch::cli::{Cli, Command};
use photobatch::config::PhotobatchConfig;
use photobatch::engine::{BatchController, BatchOptions, BatchState};
use photobatch::error::EngineError;
use photobatch::export::{self, BatchExporter, DirectorySink, ExportOutcome, TarArchiver};
use photobatch::features::{Concurrency, Feature};
use photobatch::generator::{GeneratedImage, HttpGenerator};
use photobatch::history::{HistoryRecorder, JsonFileHistory};
use photobatch::photo::{GenerationParams, PhotoInput};
use photobatch::ui::BatchProgress;
use photobatch::variation;

struct RunArgs {
    photos: Vec<PathBuf>,
    feature: Feature,
    prompt: String,
    quantity: usize,
    concurrency: Option<usize>,
    precompress: bool,
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    photobatch::logging::init(cli.verbose);
    let config = PhotobatchConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            photos,
            feature,
            prompt,
            quantity,
            concurrency,
            precompress,
            out,
        } => {
            let args = RunArgs {
                photos,
                feature,
                prompt,
                quantity,
                concurrency,
                precompress,
                out,
            };
            run(&config, args).await
        }
        Command::History { limit } => show_history(&config, limit),
        Command::Variations { feature, count } => {
            show_variations(feature, count);
            Ok(())
        }
    }
}

async fn run(config: &PhotobatchConfig, args: RunArgs) -> Result<()> {
    let photos = args
        .photos
        .iter()
        .map(|path| {
            PhotoInput::from_path(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let items = args.feature.plan(photos, args.quantity);

    let max_concurrent = args.concurrency.unwrap_or_else(|| {
        let concurrency = match args.feature.concurrency() {
            Concurrency::Bounded(_) => Concurrency::Bounded(config.max_concurrent),
            parallel => parallel,
        };
        concurrency.limit(items.len())
    });

    let params = GenerationParams::new(args.prompt, config.model.clone())
        .with_precompress(args.precompress)
        .with_dimensions(args.feature.dimensions());

    let generator = HttpGenerator::new(
        config.endpoint.clone(),
        config.api_key.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let history = JsonFileHistory::<GeneratedImage>::open(&config.history_path, config.history_capacity)
        .with_context(|| format!("failed to open history at {}", config.history_path.display()))?;
    let options = BatchOptions {
        history: Some(Arc::new(history) as Arc<dyn HistoryRecorder<GeneratedImage>>),
        history_kind: args.feature.to_string(),
        progress_tick: Some(Duration::from_millis(config.progress_tick_ms.max(1))),
    };

    let controller: BatchController<_, PhotoInput, GenerationParams> =
        BatchController::new(Arc::new(generator), options);
    let handle = controller.start(items, params, max_concurrent)?;
    let progress = BatchProgress::start(controller.snapshot().total, &args.feature.to_string());

    let mut updates = handle.subscribe();
    let waiter = handle.wait();
    tokio::pin!(waiter);
    let result = loop {
        tokio::select! {
            result = &mut waiter => break result,
            changed = updates.changed() => match changed {
                Ok(()) => {
                    let state = updates.borrow_and_update().clone();
                    progress.update(&state);
                }
                Err(_) => break (&mut waiter).await,
            },
        }
    };

    match result {
        Ok(state) => {
            progress.finish(&state);
            export_successes(config, &state, &args.out).await
        }
        Err(EngineError::AllFailed { total, .. }) => {
            progress.finish(&controller.snapshot());
            bail!("all {total} jobs failed");
        }
        Err(e) => {
            progress.abandon();
            Err(e.into())
        }
    }
}

async fn export_successes(
    config: &PhotobatchConfig,
    state: &BatchState<GeneratedImage>,
    out: &Path,
) -> Result<()> {
    let items = export::items_from_successes(state).context("refusing to export a partial set of outputs")?;
    if items.is_empty() {
        return Ok(());
    }

    let exporter = BatchExporter::new(config.export_prefix.clone()).with_stagger(Duration::from_millis(100));
    let fallback_dir = out.with_extension("");
    let mut sink = DirectorySink::new(fallback_dir.clone());
    let green = Style::new().green();

    match exporter.export(items.clone(), Some(&TarArchiver), &mut sink).await? {
        ExportOutcome::Archive(archive) => match export::write_archive(&archive, out) {
            Ok(()) => {
                println!(
                    "  {} wrote {} images to {}",
                    green.apply_to("✓"),
                    archive.entries.len(),
                    out.display()
                );
            }
            Err(e) => {
                warn!(error = %e, path = %out.display(), "failed to write archive");
                if let ExportOutcome::Individual { emitted } = exporter.export(items, None, &mut sink).await? {
                    println!(
                        "  {} wrote {emitted} images to {}",
                        green.apply_to("✓"),
                        fallback_dir.display()
                    );
                }
            }
        },
        ExportOutcome::Individual { emitted } => {
            println!(
                "  {} wrote {emitted} images to {}",
                green.apply_to("✓"),
                fallback_dir.display()
            );
        }
    }
    Ok(())
}

fn show_history(config: &PhotobatchConfig, limit: usize) -> Result<()> {
    let history = JsonFileHistory::<GeneratedImage>::open(&config.history_path, config.history_capacity)
        .with_context(|| format!("failed to open history at {}", config.history_path.display()))?;
    if history.is_empty() {
        println!("No history yet.");
        return Ok(());
    }
    for entry in history.recent(limit) {
        println!(
            "{}  {:<9} {}  {} ({})",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.kind,
            entry.id,
            entry.payload.source,
            entry.payload.mime_type
        );
    }
    Ok(())
}

fn show_variations(feature: Feature, count: usize) {
    let dimensions = feature.dimensions();
    if dimensions.is_empty() {
        println!("{feature} uses no variations.");
        return;
    }
    for index in 0..count {
        let v = variation::variation_for(index, &dimensions);
        println!("{index:>3}  {}", variation::describe(&v));
    }
}
