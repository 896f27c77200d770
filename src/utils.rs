use std::sync::LazyLock;

use regex::Regex;

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static MD_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.*?)~~").unwrap());
static HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#+\s*").unwrap());
static INLINE_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\S\n]+").unwrap());

pub fn clean_text(text: &str) -> String {
    let text = MD_LINK.replace_all(text, "$1");
    let text = URL.replace_all(&text, "");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = STRIKE.replace_all(&text, "$1");
    let text = HEADER.replace_all(&text, "");
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#x200B;", "");
    normalize_lines(&text).join("\n")
}

pub fn normalize_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| INLINE_WS.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect()
}
