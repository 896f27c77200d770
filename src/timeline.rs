//! Caption schedule built from measured narration durations.
//!
//! Boundaries are plain running sums. Nothing is rounded here; the only
//! quantization is [`quantize`], applied once per absolute boundary when the
//! captions are rendered, so rounding error never accumulates across units.

use anyhow::ensure;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEntry {
    pub unit_index: usize,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
    pub total_duration: f64,
}

pub fn build_timeline(durations: &[f64]) -> anyhow::Result<Timeline> {
    ensure!(!durations.is_empty(), "cannot schedule an empty narration");
    let mut entries = Vec::with_capacity(durations.len());
    let mut cursor = 0.0_f64;
    for (unit_index, &duration) in durations.iter().enumerate() {
        ensure!(
            duration.is_finite() && duration > 0.0,
            "unit {} has invalid duration {}",
            unit_index,
            duration
        );
        let end = cursor + duration;
        entries.push(TimelineEntry {
            unit_index,
            start: cursor,
            end,
        });
        cursor = end;
    }
    Ok(Timeline {
        entries,
        total_duration: cursor,
    })
}

pub fn quantize(seconds: f64, fps: u32) -> u64 {
    (seconds * fps as f64).round().max(0.0) as u64
}

impl Timeline {
    pub fn total_frames(&self, fps: u32) -> u64 {
        quantize(self.total_duration, fps)
    }
}
