mod args;

use std::path::Path;

use clap::Parser;
use headline_shorts::font::FontFace;
use headline_shorts::subtitle::SubtitleLayout;
use headline_shorts::{Payload, RenderConfig, VideoAssembler};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::{Args, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Command::Render { input, out, render } => {
            let assembler = VideoAssembler::new(render.to_config());
            info!("Starting video render from {}", input.display());
            match assembler.render(input.as_path(), &out).await {
                Ok(summary) => {
                    info!(
                        "Rendered {} scenes ({:.2}s) to {}",
                        summary.scene_durations.len(),
                        summary.total_duration(),
                        summary.output.display()
                    );
                }
                Err(e) => {
                    error!("Render failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Command::Inspect { input, render } => {
            inspect(&input, &render.to_config())?;
        }
        Command::Preview {
            input,
            scene,
            at,
            out,
            render,
        } => {
            let assembler = VideoAssembler::new(render.to_config());
            if let Err(e) = assembler.preview(input.as_path(), scene, at, &out).await {
                error!("Preview failed: {}", e);
                return Err(e.into());
            }
        }
    }

    info!("Process complete.");
    Ok(())
}

fn inspect(input: &Path, config: &RenderConfig) -> anyhow::Result<()> {
    let payload = Payload::from_file(input)?;
    info!(
        "Request '{}': \"{}\" with {} scenes",
        payload.request_id(),
        payload.metadata().title,
        payload.len()
    );
    for issue in payload.validate() {
        warn!("Scene {}: {}", issue.scene, issue.message);
    }

    let style = config.caption_style();
    let font = match FontFace::resolve(&config.font_search_order(), style.font_size) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Caption statistics unavailable: {:#}", e);
            None
        }
    };

    for (i, scene) in payload.scenes().iter().enumerate() {
        let words = scene.script.split_whitespace().count();
        match &font {
            Some(font) => {
                // Duration does not affect wrapping; only the card structure is reported.
                let layout = SubtitleLayout::new(&scene.script, 1.0, style.max_text_width, font);
                info!(
                    "Scene {} [{}]: {} words, {} lines, {} cards, audio={}",
                    i + 1,
                    scene.scene_id,
                    words,
                    layout.line_count(),
                    layout.cards().len(),
                    scene.audio_path
                );
            }
            None => info!(
                "Scene {} [{}]: {} words, audio={}",
                i + 1,
                scene.scene_id,
                words,
                scene.audio_path
            ),
        }
    }
    Ok(())
}
