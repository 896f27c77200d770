use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use chrono::{DateTime, TimeZone};
use tempfile::TempDir;
use tracing::{info, warn};

use crate::audio::concat_wavs;
use crate::background::BackgroundTrack;
use crate::error::RenderError;
use crate::ffmpeg::{escape_filter_value, run_ffmpeg};
use crate::subtitle::{OverlayLayer, write_ass};
use crate::tts::NarrationClip;

const NARRATION_FILE: &str = "narration.wav";
const CAPTIONS_FILE: &str = "captions.ass";
const CONCAT_LIST_FILE: &str = "files.txt";

#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub path: PathBuf,
}

pub struct RenderJob {
    pub background: BackgroundTrack,
    pub narration: Vec<NarrationClip>,
    pub overlays: Vec<OverlayLayer>,
    pub fonts_dir: Option<PathBuf>,
    pub output_spec: OutputSpec,
    pub workspace: TempDir,
}

pub fn output_file_name<Tz: TimeZone>(post_id: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let id: String = post_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let id = if id.is_empty() { "post".to_string() } else { id };
    format!("{}_{}.mp4", id, at.format("%Y%m%d_%H%M%S"))
}

fn concat_list(clips: &[NarrationClip]) -> String {
    clips
        .iter()
        .map(|clip| {
            let name = clip
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("file '{}'\n", name.replace('\'', r"'\''"))
        })
        .collect()
}

async fn concat_narration(clips: &[NarrationClip], workspace: &Path) -> Result<PathBuf, RenderError> {
    let out = workspace.join(NARRATION_FILE);
    let parts: Vec<PathBuf> = clips.iter().map(|clip| clip.path.clone()).collect();
    let target = out.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let parts: Vec<&Path> = parts.iter().map(PathBuf::as_path).collect();
        concat_wavs(&parts, &target)
    })
    .await
    .map_err(|e| RenderError::Concat(e.into()))?;
    match joined {
        Ok(()) => {
            info!("Combined {} narration clips into {}", clips.len(), out.display());
            return Ok(out);
        }
        Err(e) => warn!("Sample-exact concatenation failed ({:#}); re-encoding with ffmpeg", e),
    }

    fs::write(workspace.join(CONCAT_LIST_FILE), concat_list(clips))?;
    let args: Vec<String> = [
        "-y", "-hide_banner", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i",
        CONCAT_LIST_FILE, "-c:a", "pcm_s16le", NARRATION_FILE,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    run_ffmpeg(&args, workspace)
        .await
        .map_err(|e| RenderError::Concat(anyhow!(e)))?;
    Ok(out)
}

fn filter_graph(job: &RenderJob) -> String {
    let mut ass = format!("ass={}", CAPTIONS_FILE);
    if let Some(dir) = &job.fonts_dir {
        ass.push_str(&format!(":fontsdir={}", escape_filter_value(&dir.to_string_lossy())));
    }
    format!(
        "[0:v]{},fps={},{}[v]",
        job.background.filter(),
        job.output_spec.fps,
        ass
    )
}

fn encode_args(job: &RenderJob, background: &BackgroundTrack, narration: &Path, target: &Path) -> Vec<String> {
    let fps = job.output_spec.fps;
    let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(background.input_args(fps));
    args.push("-i".into());
    args.push(narration.to_string_lossy().into_owned());
    args.push("-filter_complex".into());
    args.push(filter_graph(job));
    for arg in [
        "-map", "[v]", "-map", "1:a", "-c:v", "libx264", "-preset", "veryfast", "-pix_fmt",
        "yuv420p", "-c:a", "aac", "-b:a", "192k", "-movflags", "+faststart",
    ] {
        args.push(arg.into());
    }
    args.push("-r".into());
    args.push(fps.to_string());
    args.push("-t".into());
    args.push(format!("{:.6}", background.duration));
    args.push("-f".into());
    args.push("mp4".into());
    args.push(target.to_string_lossy().into_owned());
    args
}

/// Encode the job. Output is staged next to the final path and renamed into
/// place only once ffmpeg has succeeded; dropping this future leaves nothing
/// behind.
pub async fn compose(job: RenderJob) -> Result<PathBuf, RenderError> {
    let workspace = job.workspace.path().to_path_buf();
    let spec = &job.output_spec;

    // ffmpeg runs inside the workspace, so outside paths must be absolute
    let final_path = std::path::absolute(&spec.path)?;
    let output_dir = final_path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| RenderError::Concat(anyhow!("output path has no parent directory")))?;
    fs::create_dir_all(&output_dir)?;
    let mut background = job.background.clone();
    background.source_asset_path = std::path::absolute(&background.source_asset_path)?;

    let narration = concat_narration(&job.narration, &workspace).await?;
    write_ass(
        &workspace.join(CAPTIONS_FILE),
        &job.overlays,
        (spec.width, spec.height),
        spec.fps,
    )
    .map_err(|e| RenderError::Io(std::io::Error::other(e)))?;

    let staged = tempfile::Builder::new()
        .prefix(".storyreel-")
        .suffix(".mp4")
        .tempfile_in(&output_dir)?;
    let args = encode_args(&job, &background, &narration, staged.path());
    info!(
        "Encoding {}x{}@{} for {:.2}s over {}",
        spec.width,
        spec.height,
        spec.fps,
        background.duration,
        background.source_asset_path.display()
    );
    run_ffmpeg(&args, &workspace).await?;

    staged.persist(&final_path).map_err(|e| RenderError::Io(e.error))?;
    info!("Final video written to {}", final_path.display());
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FALLBACK_SPEC, wav_duration_seconds, write_tone};
    use crate::background::{CropGeometry, TrackMode};
    use chrono::Utc;

    fn clip(dir: &Path, index: usize, seconds: f64) -> NarrationClip {
        let path = dir.join(format!("part_{:03}.wav", index));
        write_tone(&path, seconds, FALLBACK_SPEC);
        NarrationClip {
            unit_index: index,
            path,
            duration: seconds,
            degraded: false,
        }
    }

    fn job(workspace: TempDir) -> RenderJob {
        RenderJob {
            background: BackgroundTrack {
                source_asset_path: PathBuf::from("/assets/bg.mp4"),
                duration: 5.0,
                frame_size: (1080, 1920),
                start_offset: 0.0,
                mode: TrackMode::Loop { passes: 3 },
                geometry: CropGeometry {
                    scaled_width: 3414,
                    scaled_height: 1920,
                    crop_x: 1167,
                    crop_y: 0,
                },
            },
            narration: Vec::new(),
            overlays: Vec::new(),
            fonts_dir: Some(PathBuf::from("/usr/share/fonts")),
            output_spec: OutputSpec {
                width: 1080,
                height: 1920,
                fps: 30,
                path: PathBuf::from("/out/abc_20240101_120000.mp4"),
            },
            workspace,
        }
    }

    #[test]
    fn names_output_after_post_and_time() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        assert_eq!(output_file_name("1abc2d", &at), "1abc2d_20240309_070502.mp4");
        assert_eq!(output_file_name("../x", &at), "x_20240309_070502.mp4");
        assert_eq!(output_file_name("", &at), "post_20240309_070502.mp4");
    }

    #[test]
    fn encode_args_limit_to_narration_length() {
        let job = job(tempfile::tempdir().unwrap());
        let args = encode_args(&job, &job.background, Path::new("narration.wav"), Path::new("/out/tmp.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-stream_loop 2 -t 5.000000 -i /assets/bg.mp4 -i narration.wav"));
        assert!(joined.contains(
            "[0:v]scale=3414:1920,crop=1080:1920:1167:0,setsar=1,fps=30,ass=captions.ass:fontsdir=/usr/share/fonts[v]"
        ));
        assert!(joined.contains("-map [v] -map 1:a"));
        assert!(joined.ends_with("-r 30 -t 5.000000 -f mp4 /out/tmp.mp4"));
    }

    #[test]
    fn concat_list_quotes_names() {
        let clips = vec![NarrationClip {
            unit_index: 0,
            path: PathBuf::from("/tmp/run/part_000.wav"),
            duration: 1.0,
            degraded: false,
        }];
        assert_eq!(concat_list(&clips), "file 'part_000.wav'\n");
    }

    #[tokio::test]
    async fn narration_is_joined_without_gaps() {
        let workspace = tempfile::tempdir().unwrap();
        let clips = vec![
            clip(workspace.path(), 0, 1.0),
            clip(workspace.path(), 1, 0.5),
            clip(workspace.path(), 2, 1.25),
        ];
        let out = concat_narration(&clips, workspace.path()).await.unwrap();
        let total = wav_duration_seconds(&out).unwrap();
        assert!((total - 2.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_encode_leaves_nothing_in_the_output_dir() {
        let assets = tempfile::tempdir().unwrap();
        let background = assets.path().join("bg.mp4");
        fs::write(&background, b"not a video").unwrap();
        let output = tempfile::tempdir().unwrap();
        let final_path = output.path().join("videos").join("x_1.mp4");

        let workspace = tempfile::tempdir().unwrap();
        let narration = vec![clip(workspace.path(), 0, 1.0)];
        let mut job = job(workspace);
        job.background.source_asset_path = background;
        job.background.duration = 1.0;
        job.narration = narration;
        job.fonts_dir = None;
        job.output_spec.path = final_path.clone();

        // fails whether ffmpeg rejects the input or is not installed at all
        assert!(compose(job).await.is_err());
        assert!(!final_path.exists());
        let left = fs::read_dir(output.path().join("videos")).unwrap().count();
        assert_eq!(left, 0);
    }
}
