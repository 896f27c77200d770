use std::collections::HashSet;
use std::fs;
use std::path::Path;

use clap::ValueEnum;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::segment::Post;
use crate::utils::clean_text;

const BOT_USER_AGENT: &str = "storyreel-bot-rust/0.1";
const MIN_COMMENT_CHARS: usize = 5;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no eligible post found in r/{subreddit}")]
    NoContent { subreddit: String },

    #[error("reddit request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected reddit response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("used-post ledger error: {0}")]
    Ledger(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
pub struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
pub struct ListingData<T> {
    pub children: Vec<Child<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Child<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub is_self: Option<bool>,
    pub over_18: Option<bool>,
    pub stickied: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RedditComment {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub subreddit: String,
    pub window: TimeWindow,
    pub try_posts: usize,
    pub comments: usize,
    pub max_script_chars: usize,
}

pub async fn fetch_post(options: &FetchOptions, used_path: &Path) -> Result<Post, FetchError> {
    let url = format!(
        "https://www.reddit.com/r/{}/top.json?t={}&limit={}",
        options.subreddit,
        options.window.as_str(),
        options.try_posts
    );
    let client = reqwest::Client::new();
    let res = client
        .get(&url)
        .header(USER_AGENT, BOT_USER_AGENT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let parsed: Listing<RedditPost> = serde_json::from_str(&res)?;
    let mut used_ids = load_used_ids(used_path)?;

    for child in parsed.data.children {
        let post = child.data;
        let nsfw = post.over_18.unwrap_or(false);
        let stickied = post.stickied.unwrap_or(false);

        if nsfw || stickied || used_ids.contains(&post.id) {
            debug!("Skipping post (NSFW, stickied or already used): {}", post.title);
            continue;
        }

        let title = clean_text(&post.title);
        if title.is_empty() {
            continue;
        }
        let body = if post.is_self.unwrap_or(true) {
            clean_text(&post.selftext)
        } else {
            String::new()
        };

        let comments = match fetch_comments(&client, &options.subreddit, &post.id, options.comments).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!("Could not fetch comments for {}: {}", post.id, e);
                Vec::new()
            }
        };

        info!("Selected post {}: {}", post.id, title);
        used_ids.insert(post.id.clone());
        save_used_ids(used_path, &used_ids)?;

        return Ok(assemble_post(post.id, title, body, comments, options.max_script_chars));
    }

    Err(FetchError::NoContent {
        subreddit: options.subreddit.clone(),
    })
}

async fn fetch_comments(
    client: &reqwest::Client,
    subreddit: &str,
    post_id: &str,
    limit: usize,
) -> Result<Vec<String>, FetchError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let url = format!(
        "https://www.reddit.com/r/{}/comments/{}.json?sort=top&limit={}",
        subreddit, post_id, limit
    );
    let res = client
        .get(&url)
        .header(USER_AGENT, BOT_USER_AGENT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    // [post listing, comment listing]
    let (_, comments): (serde_json::Value, Listing<RedditComment>) = serde_json::from_str(&res)?;
    Ok(select_comments(comments, limit))
}

fn select_comments(listing: Listing<RedditComment>, limit: usize) -> Vec<String> {
    listing
        .data
        .children
        .into_iter()
        .filter_map(|child| {
            let author = child.data.author?;
            let body = child.data.body?;
            if author == "[deleted]" || body == "[removed]" || body == "[deleted]" {
                return None;
            }
            let cleaned = clean_text(&body);
            (cleaned.chars().count() >= MIN_COMMENT_CHARS).then_some(cleaned)
        })
        .take(limit)
        .collect()
}

fn assemble_post(
    id: String,
    title: String,
    body: String,
    comments: Vec<String>,
    max_script_chars: usize,
) -> Post {
    let mut length = title.chars().count() + body.chars().count();
    let mut kept = Vec::new();
    for comment in comments {
        let next = comment.chars().count();
        if length + next > max_script_chars {
            debug!("Script cap reached; dropping remaining comments");
            break;
        }
        length += next;
        kept.push(comment);
    }
    Post {
        id,
        title,
        body,
        comments: kept,
    }
}

fn load_used_ids(path: &Path) -> Result<HashSet<String>, FetchError> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let data = fs::read_to_string(path)?;
    let ids: Vec<String> = serde_json::from_str(&data)?;
    Ok(ids.into_iter().collect())
}

fn save_used_ids(path: &Path, ids: &HashSet<String>) -> Result<(), FetchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();
    let data = serde_json::to_string_pretty(&sorted)?;
    fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_listing_skips_deleted_and_more_entries() {
        let raw = r#"{"data":{"children":[
            {"kind":"t1","data":{"body":"This is **great** advice","author":"a"}},
            {"kind":"t1","data":{"body":"[removed]","author":"b"}},
            {"kind":"t1","data":{"body":"gone","author":"[deleted]"}},
            {"kind":"t1","data":{"body":"ok","author":"c"}},
            {"kind":"more","data":{"count":12,"children":["x"]}}
        ]}}"#;
        let listing: Listing<RedditComment> = serde_json::from_str(raw).unwrap();
        assert_eq!(select_comments(listing, 10), vec!["This is great advice".to_string()]);
    }

    #[test]
    fn script_cap_drops_trailing_comments_only() {
        let post = assemble_post(
            "abc".into(),
            "Title".into(),
            "A body that is long enough".into(),
            vec!["first comment".into(), "second comment is too long".into()],
            50,
        );
        assert_eq!(post.body, "A body that is long enough");
        assert_eq!(post.comments, vec!["first comment".to_string()]);
    }

    #[test]
    fn used_ids_round_trip_through_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/used.json");
        let ids: HashSet<String> = ["b".to_string(), "a".to_string()].into_iter().collect();
        save_used_ids(&path, &ids).unwrap();
        assert_eq!(load_used_ids(&path).unwrap(), ids);
        assert!(load_used_ids(&dir.path().join("missing.json")).unwrap().is_empty());
    }

    #[test]
    fn time_window_query_values() {
        assert_eq!(TimeWindow::All.as_str(), "all");
        assert_eq!(TimeWindow::Hour.as_str(), "hour");
    }
}
