use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::OverlayConfig;
use crate::font::CaptionFont;
use crate::segment::{CaptionUnit, SourceField};
use crate::timeline::{Timeline, quantize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const YELLOW: Rgb = Rgb(255, 214, 10);
    pub const LIGHT_BLUE: Rgb = Rgb(160, 210, 255);

    /// ASS colours are `&HAABBGGRR`.
    pub fn to_ass(self) -> String {
        format!("&H00{:02X}{:02X}{:02X}", self.2, self.1, self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    UpperThird,
    Center,
    LowerThird,
}

impl Anchor {
    fn y(self, height: u32) -> u32 {
        let ratio = match self {
            Anchor::UpperThird => 0.30,
            Anchor::Center => 0.50,
            Anchor::LowerThird => 0.70,
        };
        (height as f64 * ratio).round() as u32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub font_family: String,
    pub size: u32,
    pub color: Rgb,
    pub outline_color: Rgb,
    pub outline: u32,
    pub anchor: Anchor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayer {
    pub unit_index: usize,
    pub source_field: SourceField,
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub style: OverlayStyle,
    pub lines: Vec<String>,
}

fn style_name(field: SourceField) -> &'static str {
    match field {
        SourceField::Title => "Title",
        SourceField::Body => "Body",
        SourceField::Comment => "Comment",
    }
}

fn field_look(field: SourceField) -> (u32, Rgb, Anchor) {
    match field {
        SourceField::Title => (84, Rgb::YELLOW, Anchor::UpperThird),
        SourceField::Body => (72, Rgb::WHITE, Anchor::Center),
        SourceField::Comment => (64, Rgb::LIGHT_BLUE, Anchor::LowerThird),
    }
}

pub fn wrap_text(text: &str, max_width: f32, width: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if width(&candidate) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if width(word) <= max_width {
            current = word.to_string();
            continue;
        }
        for ch in word.chars() {
            current.push(ch);
            if width(&current) > max_width && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(ch);
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub struct OverlayRenderer<'a> {
    font: &'a CaptionFont,
    frame: (u32, u32),
    config: OverlayConfig,
}

impl<'a> OverlayRenderer<'a> {
    pub fn new(font: &'a CaptionFont, frame: (u32, u32), config: OverlayConfig) -> Self {
        Self { font, frame, config }
    }

    pub fn safe_width(&self) -> f32 {
        self.frame.0 as f32 * (1.0 - 2.0 * self.config.margin_ratio)
    }

    fn measure(&self, text: &str, size: u32) -> f32 {
        self.font.text_width(text, size as f32) + 2.0 * self.config.outline as f32
    }

    pub fn fit(&self, text: &str, base_size: u32) -> (u32, Vec<String>) {
        let safe = self.safe_width();
        let floor = self.config.min_font_size.min(base_size);
        let mut size = base_size;
        loop {
            let lines = wrap_text(text, safe, |s| self.measure(s, size));
            if lines.len() <= self.config.max_lines || size <= floor {
                return (size, lines);
            }
            size = size.saturating_sub(self.config.font_step).max(floor);
        }
    }

    pub fn layer(&self, unit: &CaptionUnit, start: f64, end: f64) -> OverlayLayer {
        let (base_size, color, anchor) = field_look(unit.source_field);
        let (size, lines) = self.fit(&unit.text, base_size);
        if size < base_size {
            debug!("Unit {} shrunk to {}px to fit", unit.index, size);
        }
        OverlayLayer {
            unit_index: unit.index,
            source_field: unit.source_field,
            text: unit.text.clone(),
            start,
            end,
            style: OverlayStyle {
                font_family: self.font.family.clone(),
                size,
                color,
                outline_color: Rgb::BLACK,
                outline: self.config.outline,
                anchor,
            },
            lines,
        }
    }

    pub fn layers(&self, units: &[CaptionUnit], timeline: &Timeline) -> Vec<OverlayLayer> {
        timeline
            .entries
            .iter()
            .filter_map(|entry| {
                let unit = units.iter().find(|unit| unit.index == entry.unit_index)?;
                Some(self.layer(unit, entry.start, entry.end))
            })
            .collect()
    }
}

fn ass_time(frame: u64, fps: u32) -> String {
    let cs = (frame as f64 * 100.0 / fps as f64).round() as u64;
    format!(
        "{}:{:02}:{:02}.{:02}",
        cs / 360_000,
        (cs / 6_000) % 60,
        (cs / 100) % 60,
        cs % 100
    )
}

fn escape_ass_text(text: &str) -> String {
    text.replace('\\', "/").replace('{', "(").replace('}', ")")
}

pub fn render_ass(layers: &[OverlayLayer], frame: (u32, u32), fps: u32) -> Result<String, fmt::Error> {
    let (width, height) = frame;
    let mut out = String::new();
    writeln!(out, "[Script Info]")?;
    writeln!(out, "ScriptType: v4.00+")?;
    writeln!(out, "PlayResX: {}", width)?;
    writeln!(out, "PlayResY: {}", height)?;
    writeln!(out, "WrapStyle: 2")?;
    writeln!(out, "ScaledBorderAndShadow: yes")?;
    writeln!(out)?;
    writeln!(out, "[V4+ Styles]")?;
    writeln!(
        out,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    )?;
    let family = layers
        .first()
        .map(|l| l.style.font_family.as_str())
        .unwrap_or("Sans");
    let outline = layers.first().map(|l| l.style.outline).unwrap_or(0);
    for field in [SourceField::Title, SourceField::Body, SourceField::Comment] {
        let (size, color, _) = field_look(field);
        writeln!(
            out,
            "Style: {},{},{},{},{},{},{},-1,0,0,0,100,100,0,0,1,{},0,5,0,0,0,1",
            style_name(field),
            family,
            size,
            color.to_ass(),
            color.to_ass(),
            Rgb::BLACK.to_ass(),
            Rgb::BLACK.to_ass(),
            outline
        )?;
    }
    writeln!(out)?;
    writeln!(out, "[Events]")?;
    writeln!(out, "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text")?;
    for layer in layers {
        let text = layer
            .lines
            .iter()
            .map(|line| escape_ass_text(line))
            .collect::<Vec<_>>()
            .join("\\N");
        writeln!(
            out,
            "Dialogue: 0,{},{},{},,0,0,0,,{{\\fs{}\\pos({},{})}}{}",
            ass_time(quantize(layer.start, fps), fps),
            ass_time(quantize(layer.end, fps), fps),
            style_name(layer.source_field),
            layer.style.size,
            width / 2,
            layer.style.anchor.y(height),
            text
        )?;
    }
    Ok(out)
}

pub fn write_ass(
    path: &Path,
    layers: &[OverlayLayer],
    frame: (u32, u32),
    fps: u32,
) -> anyhow::Result<()> {
    fs::write(path, render_ass(layers, frame, fps)?)?;
    Ok(())
}
