use std::path::PathBuf;

use anyhow::ensure;

use crate::args::{FailurePolicy, RenderArgs};

#[derive(Debug, Clone)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub font_path: PathBuf,
    pub background_dir: PathBuf,
    pub output_dir: PathBuf,
    pub seed: Option<u64>,
    pub segment: SegmentConfig,
    pub synthesis: SynthesisConfig,
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_chars: 30,
            max_chars: 90,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SynthesisConfig {
    pub attempts: u32,
    pub concurrency: usize,
    pub policy: FailurePolicy,
    pub words_per_minute: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            concurrency: 2,
            policy: FailurePolicy::Abort,
            words_per_minute: 175,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OverlayConfig {
    pub margin_ratio: f32,
    pub max_lines: usize,
    pub font_step: u32,
    pub min_font_size: u32,
    pub outline: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            margin_ratio: 0.08,
            max_lines: 3,
            font_step: 4,
            min_font_size: 28,
            outline: 4,
        }
    }
}

impl Config {
    pub fn from_args(args: &RenderArgs, output_dir: PathBuf) -> anyhow::Result<Self> {
        let config = Self {
            width: args.width,
            height: args.height,
            fps: args.fps,
            font_path: args.font.clone(),
            background_dir: args.backgrounds.clone(),
            output_dir,
            seed: args.seed,
            segment: SegmentConfig {
                min_chars: args.min_chars,
                max_chars: args.max_chars,
            },
            synthesis: SynthesisConfig {
                attempts: args.synthesis_attempts,
                concurrency: args.synthesis_concurrency,
                policy: args.on_synthesis_failure,
                words_per_minute: args.words_per_minute,
            },
            overlay: OverlayConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        // libx264 with yuv420p needs even dimensions
        ensure!(
            self.width >= 2 && self.height >= 2 && self.width % 2 == 0 && self.height % 2 == 0,
            "frame size must be even and non-zero, got {}x{}",
            self.width,
            self.height
        );
        ensure!(self.fps > 0, "fps must be positive");
        ensure!(self.segment.max_chars > 0, "max_chars must be positive");
        ensure!(
            self.segment.min_chars <= self.segment.max_chars,
            "min_chars ({}) exceeds max_chars ({})",
            self.segment.min_chars,
            self.segment.max_chars
        );
        ensure!(self.synthesis.attempts >= 1, "synthesis attempts must be at least 1");
        ensure!(self.synthesis.concurrency >= 1, "synthesis concurrency must be at least 1");
        ensure!(self.synthesis.words_per_minute > 0, "words per minute must be positive");
        ensure!(
            self.overlay.min_font_size > 0 && self.overlay.font_step > 0,
            "font sizes must be positive"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config(background_dir: PathBuf, output_dir: PathBuf) -> Config {
    Config {
        width: 1080,
        height: 1920,
        fps: 30,
        font_path: PathBuf::from("/nonexistent/font.ttf"),
        background_dir,
        output_dir,
        seed: Some(7),
        segment: SegmentConfig::default(),
        synthesis: SynthesisConfig::default(),
        overlay: OverlayConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_odd_frame_size() {
        let mut config = test_config(PathBuf::from("bg"), PathBuf::from("out"));
        config.width = 1081;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_segment_window() {
        let mut config = test_config(PathBuf::from("bg"), PathBuf::from("out"));
        config.segment.min_chars = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_test_config_is_valid() {
        let config = test_config(PathBuf::from("bg"), PathBuf::from("out"));
        assert!(config.validate().is_ok());
    }
}
