use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use fontdue::{Font, FontSettings};
use tracing::{info, warn};

use crate::error::Degradation;

const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const APPROXIMATE_ADVANCE: f32 = 0.6;

const DEFAULT_FAMILY: &str = "Sans";

enum Metrics {
    Font(Box<Font>),
    Approximate,
}

pub struct CaptionFont {
    pub family: String,
    pub path: Option<PathBuf>,
    metrics: Metrics,
}

impl CaptionFont {
    pub fn resolve(requested: &Path) -> (Self, Option<Degradation>) {
        match Self::load(requested) {
            Ok(font) => {
                info!("Using caption font {} ({})", font.family, requested.display());
                return (font, None);
            }
            Err(e) => warn!("Font {} unavailable: {:#}", requested.display(), e),
        }

        for candidate in FALLBACK_FONTS.iter().map(Path::new) {
            if let Ok(font) = Self::load(candidate) {
                warn!("Falling back to font {}", candidate.display());
                let degradation = Degradation::FallbackFont {
                    requested: requested.to_path_buf(),
                    used: Some(candidate.to_path_buf()),
                };
                return (font, Some(degradation));
            }
        }

        warn!("No usable font file found; captions are sized with approximate metrics");
        let degradation = Degradation::FallbackFont {
            requested: requested.to_path_buf(),
            used: None,
        };
        (Self::approximate(), Some(degradation))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path)?;
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow!("failed to parse font {}: {}", path.display(), e))?;
        let family = font
            .name()
            .map(str::to_string)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| DEFAULT_FAMILY.to_string());
        Ok(Self {
            family,
            path: Some(path.to_path_buf()),
            metrics: Metrics::Font(Box::new(font)),
        })
    }

    pub fn approximate() -> Self {
        Self {
            family: DEFAULT_FAMILY.to_string(),
            path: None,
            metrics: Metrics::Approximate,
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        match &self.metrics {
            Metrics::Font(font) => text.chars().map(|ch| font.metrics(ch, size).advance_width).sum(),
            Metrics::Approximate => text.chars().count() as f32 * size * APPROXIMATE_ADVANCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_degrades_instead_of_failing() {
        let requested = Path::new("/definitely/not/here.ttf");
        let (font, degradation) = CaptionFont::resolve(requested);
        assert!(!font.family.is_empty());
        match degradation {
            Some(Degradation::FallbackFont { requested: r, .. }) => assert_eq!(r, requested),
            other => panic!("expected a font fallback, got {:?}", other),
        }
    }

    #[test]
    fn garbage_font_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        fs::write(&path, b"not a font").unwrap();
        assert!(CaptionFont::load(&path).is_err());
    }

    #[test]
    fn approximate_width_scales_with_size_and_length() {
        let font = CaptionFont::approximate();
        assert!((font.text_width("abcd", 10.0) - 24.0).abs() < 1e-3);
        assert!((font.text_width("abcd", 20.0) - 48.0).abs() < 1e-3);
        assert!(font.dir().is_none());
    }
}
