use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::SegmentConfig;
use crate::error::ContentError;
use crate::utils::normalize_lines;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?…]+["'”’)\]]*\s+"#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceField {
    Title,
    Body,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionUnit {
    pub index: usize,
    pub text: String,
    pub source_field: SourceField,
}

impl Post {
    pub fn fields(&self) -> impl Iterator<Item = (SourceField, &str)> {
        [(SourceField::Title, self.title.as_str()), (SourceField::Body, self.body.as_str())]
            .into_iter()
            .chain(self.comments.iter().map(|c| (SourceField::Comment, c.as_str())))
    }
}

pub fn segment_post(post: &Post, config: &SegmentConfig) -> Result<Vec<CaptionUnit>, ContentError> {
    info!(
        "Segmenting post {} into units of {}..={} chars",
        post.id, config.min_chars, config.max_chars
    );
    let mut units = Vec::new();
    for (field, text) in post.fields() {
        let pieces: Vec<String> = normalize_lines(text)
            .iter()
            .flat_map(|line| split_sentences(line))
            .flat_map(|sentence| force_split(&sentence, config.max_chars))
            .collect();
        for text in merge_pieces(pieces, config) {
            units.push(CaptionUnit {
                index: units.len(),
                text,
                source_field: field,
            });
        }
    }
    if units.is_empty() {
        return Err(ContentError::EmptyContent);
    }
    debug!("Segmented into {} caption units", units.len());
    Ok(units)
}

fn split_sentences(line: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END.find_iter(line) {
        let sentence = line[last..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        last = m.end();
    }
    let rest = line[last..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Cut at the last space that keeps the head within `max_chars`; a single
/// word longer than that is cut at a character boundary.
fn force_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut parts = Vec::new();
    let mut rest = sentence;
    while let Some((limit, next)) = rest.char_indices().nth(max_chars) {
        // a space right at the limit still yields a head of exactly max_chars
        let space = if next == ' ' {
            Some(limit)
        } else {
            rest[..limit].rfind(' ').filter(|&i| i > 0)
        };
        match space {
            Some(space) => {
                parts.push(rest[..space].to_string());
                rest = rest[space + 1..].trim_start();
            }
            None => {
                parts.push(rest[..limit].to_string());
                rest = &rest[limit..];
            }
        }
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

fn merge_pieces(pieces: Vec<String>, config: &SegmentConfig) -> Vec<String> {
    let fits = |a: &str, b: &str| a.chars().count() + 1 + b.chars().count() <= config.max_chars;
    let mut merged: Vec<String> = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if current.is_empty() {
            current = piece;
        } else if current.chars().count() < config.min_chars && fits(&current, &piece) {
            current.push(' ');
            current.push_str(&piece);
        } else {
            merged.push(std::mem::replace(&mut current, piece));
        }
    }
    if !current.is_empty() {
        match merged.last_mut() {
            Some(prev) if current.chars().count() < config.min_chars && fits(prev, &current) => {
                prev.push(' ');
                prev.push_str(&current);
            }
            _ => merged.push(current),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(title: &str, body: &str, comments: &[&str]) -> Post {
        Post {
            id: "t3_test".into(),
            title: title.into(),
            body: body.into(),
            comments: comments.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn source_text(post: &Post) -> String {
        let all = post.fields().map(|(_, t)| t).collect::<Vec<_>>().join(" ");
        all.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn joined(units: &[CaptionUnit]) -> String {
        units.iter().map(|u| u.text.as_str()).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn concatenated_units_reproduce_normalized_source() {
        let p = post(
            "My roommate   ate my lunch!!",
            "So here's the thing.  I labelled it.\n\nTwice, actually. \"Why?\" you ask... Because I'm petty.\nEdit: typo",
            &["NTA, label it three times.", "Get a lock box honestly, they are like ten bucks"],
        );
        for (min, max) in [(0, 20), (30, 90), (10, 40), (1, 5)] {
            let config = SegmentConfig { min_chars: min, max_chars: max };
            let units = segment_post(&p, &config).unwrap();
            let no_ws = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
            assert_eq!(no_ws(&joined(&units)), no_ws(&source_text(&p)), "window {min}..{max}");
            for (i, unit) in units.iter().enumerate() {
                assert_eq!(unit.index, i);
                assert!(!unit.text.is_empty());
                assert!(unit.text.chars().count() <= max, "{:?} exceeds {max}", unit.text);
            }
        }
    }

    #[test]
    fn word_boundary_splits_keep_exact_spacing() {
        let p = post("Title here", "alpha beta gamma delta epsilon zeta eta theta iota kappa", &[]);
        let config = SegmentConfig { min_chars: 0, max_chars: 16 };
        let units = segment_post(&p, &config).unwrap();
        assert_eq!(joined(&units), source_text(&p));
    }

    #[test]
    fn splits_on_sentences_and_newlines() {
        let p = post("Test", "One. Two. Three.", &[]);
        let config = SegmentConfig { min_chars: 0, max_chars: 90 };
        let texts: Vec<_> = segment_post(&p, &config)
            .unwrap()
            .into_iter()
            .map(|u| u.text)
            .collect();
        assert_eq!(texts, vec!["Test", "One.", "Two.", "Three."]);
    }

    #[test]
    fn short_fragments_merge_up_to_min_chars() {
        let p = post("Test", "One. Two. Three. Four.", &[]);
        let config = SegmentConfig { min_chars: 8, max_chars: 12 };
        let texts: Vec<_> = segment_post(&p, &config)
            .unwrap()
            .into_iter()
            .map(|u| u.text)
            .collect();
        assert_eq!(texts, vec!["Test", "One. Two.", "Three. Four."]);
    }

    #[test]
    fn long_sentence_is_split_at_word_boundary() {
        let parts = force_split("the quick brown fox jumps over", 10);
        assert_eq!(parts, vec!["the quick", "brown fox", "jumps over"]);
        assert_eq!(force_split("abcdefghij klm", 10), vec!["abcdefghij", "klm"]);
    }

    #[test]
    fn overlong_word_is_split_on_char_boundary() {
        let parts = force_split("ééééééé", 3);
        assert_eq!(parts, vec!["ééé", "ééé", "é"]);
    }

    #[test]
    fn empty_body_uses_title_only() {
        let units = segment_post(&post("Just a title", "   \n ", &[]), &SegmentConfig::default()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "Just a title");
        assert_eq!(units[0].source_field, SourceField::Title);
    }

    #[test]
    fn source_fields_are_tracked_and_never_merged_across() {
        let p = post("Hi", "Body.", &["Comment one."]);
        let units = segment_post(&p, &SegmentConfig::default()).unwrap();
        let fields: Vec<_> = units.iter().map(|u| u.source_field).collect();
        assert_eq!(fields, vec![SourceField::Title, SourceField::Body, SourceField::Comment]);
    }

    #[test]
    fn whitespace_only_post_is_empty_content() {
        let result = segment_post(&post(" ", "\n\t", &["  "]), &SegmentConfig::default());
        assert!(matches!(result, Err(ContentError::EmptyContent)));
    }
}
