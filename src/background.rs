use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::{AssetError, Degradation};
use crate::ffmpeg::{MediaInfo, probe_media};

pub const BACKGROUND_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "png", "jpg", "jpeg"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackMode {
    Loop { passes: u32 },
    Trim,
    Still,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropGeometry {
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundTrack {
    pub source_asset_path: PathBuf,
    pub duration: f64,
    pub frame_size: (u32, u32),
    pub start_offset: f64,
    pub mode: TrackMode,
    pub geometry: CropGeometry,
}

pub fn list_assets(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        warn!("Backgrounds directory not found: {}", dir.display());
        return Vec::new();
    };
    let mut assets: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| BACKGROUND_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    assets.sort();
    assets
}

pub fn center_crop(source: (u32, u32), frame: (u32, u32)) -> CropGeometry {
    let (w, h) = (source.0 as u64, source.1 as u64);
    let (fw, fh) = (frame.0 as u64, frame.1 as u64);
    // compare aspect ratios without floating point: w/h >= fw/fh
    let (scaled_width, scaled_height) = if w * fh >= fw * h {
        ((w * fh).div_ceil(h), fh)
    } else {
        (fw, (h * fw).div_ceil(w))
    };
    CropGeometry {
        scaled_width: scaled_width as u32,
        scaled_height: scaled_height as u32,
        crop_x: ((scaled_width - fw) / 2) as u32,
        crop_y: ((scaled_height - fh) / 2) as u32,
    }
}

pub fn plan_track<R: Rng>(
    path: &Path,
    info: MediaInfo,
    total_duration: f64,
    frame: (u32, u32),
    rng: &mut R,
) -> BackgroundTrack {
    let (mode, start_offset) = match info.duration {
        None => (TrackMode::Still, 0.0),
        Some(asset) if asset < total_duration => {
            let passes = (total_duration / asset).ceil().max(1.0) as u32;
            (TrackMode::Loop { passes }, 0.0)
        }
        Some(asset) => (TrackMode::Trim, rng.gen_range(0.0..=asset - total_duration)),
    };
    BackgroundTrack {
        source_asset_path: path.to_path_buf(),
        duration: total_duration,
        frame_size: frame,
        start_offset,
        mode,
        geometry: center_crop((info.width, info.height), frame),
    }
}

impl BackgroundTrack {
    pub fn input_args(&self, fps: u32) -> Vec<String> {
        let mut args = Vec::new();
        match self.mode {
            TrackMode::Loop { passes } => {
                args.push("-stream_loop".into());
                args.push((passes.saturating_sub(1)).to_string());
            }
            TrackMode::Trim => {
                args.push("-ss".into());
                args.push(format!("{:.6}", self.start_offset));
            }
            TrackMode::Still => {
                args.extend(["-loop".into(), "1".into(), "-framerate".into(), fps.to_string()]);
            }
        }
        args.push("-t".into());
        args.push(format!("{:.6}", self.duration));
        args.push("-i".into());
        args.push(self.source_asset_path.to_string_lossy().into_owned());
        args
    }

    pub fn filter(&self) -> String {
        let g = self.geometry;
        format!(
            "scale={}:{},crop={}:{}:{}:{},setsar=1",
            g.scaled_width, g.scaled_height, self.frame_size.0, self.frame_size.1, g.crop_x, g.crop_y
        )
    }
}

pub struct BackgroundProvider<R: Rng = StdRng> {
    dir: PathBuf,
    candidates: Vec<PathBuf>,
    rng: R,
}

impl BackgroundProvider<StdRng> {
    pub fn new(dir: &Path, seed: Option<u64>) -> Result<Self, AssetError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(dir, rng)
    }
}

impl<R: Rng> BackgroundProvider<R> {
    pub fn with_rng(dir: &Path, rng: R) -> Result<Self, AssetError> {
        let candidates = list_assets(dir);
        if candidates.is_empty() {
            return Err(AssetError::NoBackgroundAsset { dir: dir.to_path_buf() });
        }
        info!("Found {} background assets in {}", candidates.len(), dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            candidates,
            rng,
        })
    }

    pub fn select(&mut self) -> Option<PathBuf> {
        if self.candidates.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.candidates.len());
        Some(self.candidates.remove(index))
    }

    pub async fn prepare(
        &mut self,
        total_duration: f64,
        frame: (u32, u32),
    ) -> Result<(BackgroundTrack, Vec<Degradation>), AssetError> {
        let mut degraded = Vec::new();
        while let Some(path) = self.select() {
            info!("Selected background: {}", path.display());
            match probe_media(&path).await {
                Ok(media) => {
                    let track = plan_track(&path, media, total_duration, frame, &mut self.rng);
                    debug!("Background plan: {:?}", track);
                    return Ok((track, degraded));
                }
                Err(e) => {
                    let err = AssetError::Probe { path: path.clone(), source: e };
                    warn!("{}; trying another background", err);
                    degraded.push(Degradation::SkippedBackground { path });
                }
            }
        }
        Err(AssetError::NoBackgroundAsset { dir: self.dir.clone() })
    }
}
