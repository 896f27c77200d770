use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::reddit::TimeWindow;

#[derive(Parser, Debug)]
#[clap(name = "storyreel", about = "Turn a reddit post into a narrated vertical video")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a post and render it to a video
    Generate(GenerateArgs),
    /// Report available backgrounds, fonts and external tools
    Check(RenderArgs),
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    pub subreddit: String,

    #[clap(long = "time", short = 't', value_enum, default_value = "day")]
    pub time: TimeWindow,

    #[clap(long, short = 'o', default_value = "output")]
    pub output: PathBuf,

    #[clap(long, default_value_t = 25)]
    pub try_posts: usize,

    #[clap(long, default_value_t = 10)]
    pub comments: usize,

    #[clap(long, default_value_t = 2000)]
    pub max_script_chars: usize,

    #[clap(long, default_value = "./config/used_posts.json")]
    pub used_posts: PathBuf,

    /// Abort the whole run after this many seconds
    #[clap(long)]
    pub timeout: Option<u64>,

    #[clap(flatten)]
    pub render: RenderArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct RenderArgs {
    #[clap(long, default_value = "./assets/backgrounds")]
    pub backgrounds: PathBuf,

    #[clap(long, default_value = "./assets/fonts/arial.ttf")]
    pub font: PathBuf,

    #[clap(long, default_value_t = 1080)]
    pub width: u32,

    #[clap(long, default_value_t = 1920)]
    pub height: u32,

    #[clap(long, default_value_t = 30)]
    pub fps: u32,

    #[clap(long, value_enum, default_value = "piper")]
    pub engine: EngineKind,

    #[clap(long, default_value = "./tts/en_US-hfc_male-medium.onnx")]
    pub piper_model: PathBuf,

    #[clap(long, default_value = "en-us")]
    pub espeak_voice: String,

    #[clap(long, default_value_t = 175)]
    pub words_per_minute: u32,

    #[clap(long, default_value_t = 30)]
    pub min_chars: usize,

    #[clap(long, default_value_t = 90)]
    pub max_chars: usize,

    #[clap(long, default_value_t = 2)]
    pub synthesis_attempts: u32,

    #[clap(long, default_value_t = 2)]
    pub synthesis_concurrency: usize,

    #[clap(long, value_enum, default_value = "abort")]
    pub on_synthesis_failure: FailurePolicy,

    /// Seed for background selection; random when omitted
    #[clap(long)]
    pub seed: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineKind {
    Piper,
    Espeak,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Fail the run when any unit cannot be narrated
    Abort,
    /// Substitute an estimated-length silent clip and keep going
    Mute,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_parses_the_documented_shape() {
        let cli = Cli::try_parse_from([
            "storyreel", "generate", "AskReddit", "--time", "week", "--output", "out",
        ])
        .unwrap();
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.subreddit, "AskReddit");
                assert_eq!(args.time, TimeWindow::Week);
                assert_eq!(args.output, PathBuf::from("out"));
                assert_eq!(args.render.on_synthesis_failure, FailurePolicy::Abort);
                assert_eq!(args.render.seed, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_time_window() {
        assert!(Cli::try_parse_from(["storyreel", "generate", "x", "--time", "decade"]).is_err());
    }
}
