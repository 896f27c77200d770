use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::background::BackgroundProvider;
use crate::compositor::{OutputSpec, RenderJob, compose, output_file_name};
use crate::config::Config;
use crate::error::{Degradation, PipelineError, SynthesisFailure};
use crate::font::CaptionFont;
use crate::segment::{CaptionUnit, Post, segment_post};
use crate::subtitle::OverlayRenderer;
use crate::timeline::{Timeline, build_timeline};
use crate::tts::{NarrationClip, SpeechEngine, synthesize_all};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fetched,
    Segmented,
    Synthesizing,
    TimelineBuilt,
    Composing,
    Done,
    Failed,
}

impl RunState {
    fn rank(self) -> u8 {
        match self {
            RunState::Fetched => 0,
            RunState::Segmented => 1,
            RunState::Synthesizing => 2,
            RunState::TimelineBuilt => 3,
            RunState::Composing => 4,
            RunState::Done | RunState::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub post_id: String,
    pub output_path: PathBuf,
    pub units: usize,
    pub total_duration: f64,
    pub degraded: Vec<Degradation>,
    pub elapsed: Duration,
}

pub struct Pipeline<'a, E: SpeechEngine> {
    config: &'a Config,
    engine: Arc<E>,
    state: RunState,
}

impl<'a, E: SpeechEngine> Pipeline<'a, E> {
    pub fn new(config: &'a Config, engine: Arc<E>) -> Self {
        Self {
            config,
            engine,
            state: RunState::Fetched,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn advance(&mut self, next: RunState) {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            warn!("Ignoring state change {:?} -> {:?}", self.state, next);
            return;
        }
        info!("Run state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub async fn run(&mut self, post: &Post) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        match self.execute(post, started).await {
            Ok(report) => {
                self.advance(RunState::Done);
                info!(
                    "Finished {} in {:.1}s: {} ({:.2}s of video, {} units)",
                    report.post_id,
                    report.elapsed.as_secs_f64(),
                    report.output_path.display(),
                    report.total_duration,
                    report.units
                );
                Ok(report)
            }
            Err(e) => {
                self.advance(RunState::Failed);
                error!("Run for post {} failed after {:.1}s: {}", post.id, started.elapsed().as_secs_f64(), e);
                Err(e)
            }
        }
    }

    async fn execute(&mut self, post: &Post, started: Instant) -> Result<RunReport, PipelineError> {
        let config = self.config;
        let units = segment_post(post, &config.segment)?;
        info!("Post {} split into {} units", post.id, units.len());
        self.advance(RunState::Segmented);

        // an empty pool is fatal, and must be found before paying for synthesis
        let mut backgrounds = BackgroundProvider::new(&config.background_dir, config.seed)?;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("storyreel-{}-", post.id))
            .tempdir()?;

        self.advance(RunState::Synthesizing);
        let (clips, timeline, mut degraded) = self.narrate(&units, workspace.path()).await?;
        self.advance(RunState::TimelineBuilt);
        info!(
            "Narration runs {:.2}s ({} frames)",
            timeline.total_duration,
            timeline.total_frames(config.fps)
        );

        let frame = (config.width, config.height);
        let (background, skipped) = backgrounds.prepare(timeline.total_duration, frame).await?;
        degraded.extend(skipped);

        let (font, font_fallback) = CaptionFont::resolve(&config.font_path);
        degraded.extend(font_fallback);
        let overlays = OverlayRenderer::new(&font, frame, config.overlay).layers(&units, &timeline);

        let output_path = config
            .output_dir
            .join(output_file_name(&post.id, &chrono::Local::now()));
        let job = RenderJob {
            background,
            narration: clips,
            overlays,
            fonts_dir: font.dir().map(Path::to_path_buf),
            output_spec: OutputSpec {
                width: config.width,
                height: config.height,
                fps: config.fps,
                path: output_path,
            },
            workspace,
        };

        self.advance(RunState::Composing);
        let output_path = compose(job).await?;

        for degradation in &degraded {
            warn!("Degraded: {}", degradation);
        }
        Ok(RunReport {
            post_id: post.id.clone(),
            output_path,
            units: units.len(),
            total_duration: timeline.total_duration,
            degraded,
            elapsed: started.elapsed(),
        })
    }

    async fn narrate(
        &self,
        units: &[CaptionUnit],
        dir: &Path,
    ) -> Result<(Vec<NarrationClip>, Timeline, Vec<Degradation>), PipelineError> {
        let (clips, degraded) =
            synthesize_all(Arc::clone(&self.engine), units, dir, &self.config.synthesis).await?;
        ensure_complete(units, &clips, self.config.synthesis.attempts)?;
        // clips are in unit order from here on, so entry i belongs to unit i
        let durations: Vec<f64> = clips.iter().map(|clip| clip.duration).collect();
        let timeline = build_timeline(&durations).map_err(|e| SynthesisFailure {
            unit_index: durations.iter().position(|d| !(*d > 0.0)).unwrap_or(0),
            attempts: self.config.synthesis.attempts,
            source: e,
        })?;
        Ok((clips, timeline, degraded))
    }
}

fn ensure_complete(units: &[CaptionUnit], clips: &[NarrationClip], attempts: u32) -> Result<(), SynthesisFailure> {
    for (position, unit) in units.iter().enumerate() {
        if clips.get(position).map(|clip| clip.unit_index) != Some(unit.index) {
            return Err(SynthesisFailure {
                unit_index: unit.index,
                attempts,
                source: anyhow::anyhow!("no narration clip for this unit"),
            });
        }
    }
    if clips.len() > units.len() {
        return Err(SynthesisFailure {
            unit_index: clips[units.len()].unit_index,
            attempts,
            source: anyhow::anyhow!("narration clip without a caption unit"),
        });
    }
    Ok(())
}
