use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, ensure};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::args::FailurePolicy;
use crate::audio::{FALLBACK_SPEC, estimate_duration, wav_duration_seconds, wav_spec, write_silence};
use crate::config::SynthesisConfig;
use crate::error::{Degradation, SynthesisFailure};
use crate::segment::CaptionUnit;

pub trait SpeechEngine: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn program(&self) -> &str;

    fn synthesize(&self, text: &str, out: &Path) -> impl Future<Output = anyhow::Result<()>> + Send;
}

pub struct PiperEngine {
    pub model: PathBuf,
}

impl SpeechEngine for PiperEngine {
    fn name(&self) -> &'static str {
        "piper"
    }

    fn program(&self) -> &str {
        "piper"
    }

    async fn synthesize(&self, text: &str, out: &Path) -> anyhow::Result<()> {
        let mut cmd = Command::new(self.program());
        cmd.arg("--model").arg(&self.model).arg("--output_file").arg(out);
        run_with_stdin(cmd, text).await
    }
}

pub struct EspeakEngine {
    pub voice: String,
    pub words_per_minute: u32,
}

impl SpeechEngine for EspeakEngine {
    fn name(&self) -> &'static str {
        "espeak-ng"
    }

    fn program(&self) -> &str {
        "espeak-ng"
    }

    async fn synthesize(&self, text: &str, out: &Path) -> anyhow::Result<()> {
        let mut cmd = Command::new(self.program());
        cmd.arg("-v")
            .arg(&self.voice)
            .arg("-s")
            .arg(self.words_per_minute.to_string())
            .arg("-w")
            .arg(out)
            .arg("--stdin");
        run_with_stdin(cmd, text).await
    }
}

async fn run_with_stdin(mut cmd: Command, text: &str) -> anyhow::Result<()> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {}", program))?;

    {
        let mut stdin = child
            .stdin
            .take()
            .with_context(|| format!("failed to open {} stdin", program))?;
        stdin.write_all(text.as_bytes()).await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} exited with {}: {}", program, output.status, stderr.trim());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct NarrationClip {
    pub unit_index: usize,
    pub path: PathBuf,
    pub duration: f64,
    pub degraded: bool,
}

fn clip_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("part_{:03}.wav", index))
}

pub async fn synthesize_unit<E: SpeechEngine>(
    engine: &E,
    unit: &CaptionUnit,
    dir: &Path,
    attempts: u32,
) -> Result<NarrationClip, SynthesisFailure> {
    let path = clip_path(dir, unit.index);
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        debug!("Unit {} attempt {}/{}: {}", unit.index, attempt, attempts, unit.text);
        // a stale file from a failed attempt must not be measured
        let _ = tokio::fs::remove_file(&path).await;

        let measured = async {
            engine.synthesize(&unit.text, &path).await?;
            let wav = path.clone();
            let duration = tokio::task::spawn_blocking(move || wav_duration_seconds(&wav)).await??;
            ensure!(duration > 0.0, "{} produced an empty clip", engine.name());
            Ok::<_, anyhow::Error>(duration)
        }
        .await;

        match measured {
            Ok(duration) => {
                info!("Narrated unit {} ({:.2}s)", unit.index, duration);
                return Ok(NarrationClip {
                    unit_index: unit.index,
                    path,
                    duration,
                    degraded: false,
                });
            }
            Err(e) => {
                warn!("{} failed on unit {} (attempt {}/{}): {:#}", engine.name(), unit.index, attempt, attempts, e);
                last_error = Some(e);
            }
        }
    }

    Err(SynthesisFailure {
        unit_index: unit.index,
        attempts,
        source: last_error.unwrap_or_else(|| anyhow::anyhow!("no attempt was made")),
    })
}

/// Narrate every unit on a bounded pool and hand the clips back in unit
/// order. Under [`FailurePolicy::Abort`] the first failure cancels the rest.
pub async fn synthesize_all<E: SpeechEngine>(
    engine: Arc<E>,
    units: &[CaptionUnit],
    dir: &Path,
    config: &SynthesisConfig,
) -> Result<(Vec<NarrationClip>, Vec<Degradation>), SynthesisFailure> {
    info!(
        "Synthesizing {} units with {} (concurrency {})",
        units.len(),
        engine.name(),
        config.concurrency
    );
    let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for unit in units {
        let engine = Arc::clone(&engine);
        let permits = Arc::clone(&permits);
        let unit = unit.clone();
        let dir = dir.to_path_buf();
        let attempts = config.attempts;
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            synthesize_unit(engine.as_ref(), &unit, &dir, attempts).await
        });
    }

    let mut clips = Vec::with_capacity(units.len());
    let mut failures = Vec::new();
    let mut accounted = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!("Synthesis task cancelled: {}", e);
                continue;
            }
        };
        match result {
            Ok(clip) => {
                accounted.insert(clip.unit_index);
                clips.push(clip);
            }
            Err(failure) if config.policy == FailurePolicy::Abort => {
                error!("{}", failure);
                // dropping the set aborts in-flight tasks and kills their children
                tasks.abort_all();
                return Err(failure);
            }
            Err(failure) => {
                accounted.insert(failure.unit_index);
                failures.push(failure);
            }
        }
    }

    let mut lost = unaccounted_units(units, &accounted, config.attempts);
    if !lost.is_empty() && config.policy == FailurePolicy::Abort {
        let failure = lost.remove(0);
        error!("{}", failure);
        return Err(failure);
    }
    failures.extend(lost);

    let mut degraded = Vec::new();
    if !failures.is_empty() {
        let spec = clips
            .first()
            .and_then(|clip| wav_spec(&clip.path).ok())
            .unwrap_or(FALLBACK_SPEC);
        for failure in failures {
            let unit = &units[failure.unit_index];
            let path = clip_path(dir, unit.index);
            let estimate = estimate_duration(&unit.text, config.words_per_minute);
            let silent = path.clone();
            let duration = tokio::task::spawn_blocking(move || write_silence(&silent, estimate, spec))
                .await
                .map_err(anyhow::Error::from)
                .and_then(|written| written)
                .map_err(|e| SynthesisFailure {
                    unit_index: unit.index,
                    attempts: failure.attempts,
                    source: e.context("failed to write silent stand-in"),
                })?;
            warn!("Muting unit {} for {:.2}s after: {}", unit.index, duration, failure);
            degraded.push(Degradation::MutedNarration {
                unit_index: unit.index,
                estimated_seconds: duration,
            });
            clips.push(NarrationClip {
                unit_index: unit.index,
                path,
                duration,
                degraded: true,
            });
        }
    }

    clips.sort_by_key(|clip| clip.unit_index);
    degraded.sort_by_key(|d| match d {
        Degradation::MutedNarration { unit_index, .. } => *unit_index,
        _ => usize::MAX,
    });
    Ok((clips, degraded))
}

// Units whose task ended without reporting back, e.g. because it was cancelled.
fn unaccounted_units(units: &[CaptionUnit], accounted: &HashSet<usize>, attempts: u32) -> Vec<SynthesisFailure> {
    units
        .iter()
        .filter(|unit| !accounted.contains(&unit.index))
        .map(|unit| SynthesisFailure {
            unit_index: unit.index,
            attempts,
            source: anyhow::anyhow!("synthesis task ended without a result"),
        })
        .collect()
}
