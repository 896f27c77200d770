mod args;
mod audio;
mod background;
mod compositor;
mod config;
mod error;
mod ffmpeg;
mod font;
mod pipeline;
mod reddit;
mod segment;
mod subtitle;
mod timeline;
mod tts;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Command, EngineKind, GenerateArgs, RenderArgs};
use crate::background::list_assets;
use crate::config::Config;
use crate::error::PipelineError;
use crate::font::CaptionFont;
use crate::pipeline::{Pipeline, RunReport};
use crate::reddit::{FetchOptions, fetch_post};
use crate::segment::Post;
use crate::tts::{EspeakEngine, PiperEngine, SpeechEngine};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Generate(args) => match generate(args).await {
            Ok(report) => {
                if report.degraded.is_empty() {
                    info!("Video ready: {}", report.output_path.display());
                } else {
                    warn!(
                        "Video ready with {} degradation(s): {}",
                        report.degraded.len(),
                        report.output_path.display()
                    );
                }
                0
            }
            Err(e) => {
                error!("{}", e);
                e.exit_code()
            }
        },
        Command::Check(args) => match check(&args) {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(e) => {
                error!("{:#}", e);
                1
            }
        },
    };
    std::process::exit(code);
}

async fn generate(args: GenerateArgs) -> Result<RunReport, PipelineError> {
    let config = Config::from_args(&args.render, args.output.clone()).map_err(PipelineError::Config)?;
    info!("Generating from r/{} (top of the {})", args.subreddit, args.time.as_str());

    let options = FetchOptions {
        subreddit: args.subreddit.clone(),
        window: args.time,
        try_posts: args.try_posts,
        comments: args.comments,
        max_script_chars: args.max_script_chars,
    };

    let run = fetch_and_render(&args, &options, &config);
    match args.timeout {
        Some(secs) => {
            let limit = Duration::from_secs(secs);
            // dropping the run kills child processes and removes temp files
            tokio::time::timeout(limit, run)
                .await
                .map_err(|_| PipelineError::Timeout(limit))?
        }
        None => run.await,
    }
}

async fn fetch_and_render(
    args: &GenerateArgs,
    options: &FetchOptions,
    config: &Config,
) -> Result<RunReport, PipelineError> {
    let post = fetch_post(options, &args.used_posts).await?;
    match args.render.engine {
        EngineKind::Piper => {
            let engine = PiperEngine {
                model: args.render.piper_model.clone(),
            };
            render(config, &post, engine).await
        }
        EngineKind::Espeak => {
            let engine = EspeakEngine {
                voice: args.render.espeak_voice.clone(),
                words_per_minute: args.render.words_per_minute,
            };
            render(config, &post, engine).await
        }
    }
}

async fn render<E: SpeechEngine>(config: &Config, post: &Post, engine: E) -> Result<RunReport, PipelineError> {
    info!("Narrating with {}", engine.name());
    Pipeline::new(config, Arc::new(engine)).run(post).await
}

fn check(args: &RenderArgs) -> anyhow::Result<bool> {
    let mut ok = true;

    let assets = list_assets(&args.backgrounds);
    if assets.is_empty() {
        error!("No background assets in {}", args.backgrounds.display());
        ok = false;
    } else {
        info!("{} background assets in {}", assets.len(), args.backgrounds.display());
        for asset in &assets {
            info!("  {}", asset.display());
        }
    }

    let (font, fallback) = CaptionFont::resolve(&args.font);
    match fallback {
        Some(degradation) => warn!("{}", degradation),
        None => info!("Font OK: {}", font.family),
    }

    let engine_program = match args.engine {
        EngineKind::Piper => {
            if !args.piper_model.is_file() {
                error!("Piper model not found: {}", args.piper_model.display());
                ok = false;
            }
            PiperEngine { model: args.piper_model.clone() }.program().to_string()
        }
        EngineKind::Espeak => EspeakEngine {
            voice: args.espeak_voice.clone(),
            words_per_minute: args.words_per_minute,
        }
        .program()
        .to_string(),
    };
    for program in ["ffmpeg", "ffprobe", engine_program.as_str()] {
        match which::which(program) {
            Ok(path) => info!("Found {} at {}", program, path.display()),
            Err(_) => {
                error!("{} is not on PATH", program);
                ok = false;
            }
        }
    }

    let config = Config::from_args(args, "output".into())?;
    info!(
        "Rendering {}x{} at {} fps, units of {}..={} chars",
        config.width, config.height, config.fps, config.segment.min_chars, config.segment.max_chars
    );
    Ok(ok)
}
