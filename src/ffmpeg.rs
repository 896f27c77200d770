use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::debug;

use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration: Option<f64>,
    pub width: u32,
    pub height: u32,
}

pub async fn probe_media(path: &Path) -> anyhow::Result<MediaInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height:format=duration",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to run ffprobe for {}", path.display()))?;

    if !output.status.success() {
        bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8(output.stdout)
        .context("ffprobe returned non-UTF8 output")?;
    parse_probe_output(&stdout, is_still_image(path))
        .with_context(|| format!("Unable to parse ffprobe output for {}", path.display()))
}

fn parse_probe_output(stdout: &str, still: bool) -> anyhow::Result<MediaInfo> {
    let mut width = None;
    let mut height = None;
    let mut duration = None;
    for line in stdout.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse::<u32>().ok(),
            "height" => height = value.parse::<u32>().ok(),
            "duration" => duration = value.parse::<f64>().ok(),
            _ => {}
        }
    }
    let (Some(width), Some(height)) = (width, height) else {
        bail!("no video stream dimensions reported");
    };
    if width == 0 || height == 0 {
        bail!("video stream reports zero size {}x{}", width, height);
    }
    let duration = if still {
        None
    } else {
        match duration {
            Some(d) if d.is_finite() && d > 0.0 => Some(d),
            _ => bail!("no usable duration reported"),
        }
    };
    Ok(MediaInfo {
        duration,
        width,
        height,
    })
}

pub fn is_still_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

pub async fn run_ffmpeg(args: &[String], cwd: &Path) -> Result<(), RenderError> {
    debug!("ffmpeg {}", args.join(" "));
    let output = Command::new("ffmpeg")
        .current_dir(cwd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    if !output.status.success() {
        return Err(RenderError::Encode {
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr, 20),
        });
    }
    Ok(())
}

fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

fn backslash_escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if special.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

// Filter option values are unescaped twice: once by the graph parser and
// once by the filter's own option parser.
pub fn escape_filter_value(value: &str) -> String {
    let option = backslash_escape(value, &['\\', '\'', ':']);
    backslash_escape(&option, &['\\', '\'', '[', ']', ',', ';'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_video_probe() {
        let out = "width=1920\nheight=1080\nduration=12.480000\n";
        let info = parse_probe_output(out, false).unwrap();
        assert_eq!(info, MediaInfo { duration: Some(12.48), width: 1920, height: 1080 });
    }

    #[test]
    fn still_images_have_no_duration() {
        let out = "width=800\nheight=600\nduration=N/A\n";
        assert_eq!(parse_probe_output(out, true).unwrap().duration, None);
        assert!(parse_probe_output(out, false).is_err());
    }

    #[test]
    fn missing_dimensions_is_an_error() {
        assert!(parse_probe_output("duration=3.0\n", false).is_err());
    }

    #[test]
    fn recognizes_still_extensions() {
        assert!(is_still_image(Path::new("bg/Sky.JPG")));
        assert!(!is_still_image(Path::new("bg/loop.mp4")));
    }

    #[test]
    fn escapes_filter_values() {
        assert_eq!(escape_filter_value("/a/b"), "/a/b");
        assert_eq!(escape_filter_value("C:/fonts"), r"C\\:/fonts");
        assert_eq!(escape_filter_value("/home/o'neil/fonts"), r"/home/o\\\'neil/fonts");
        assert_eq!(escape_filter_value("/a,b[1]"), r"/a\,b\[1\]");
    }

    #[test]
    fn keeps_only_the_stderr_tail() {
        let tail = stderr_tail(b"a\nb\nc\nd", 2);
        assert_eq!(tail, "c\nd");
    }
}
