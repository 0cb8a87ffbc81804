//! Command line argument parsing

use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::config::ConfigCommand;

/// Cerberus - download videos from web pages
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("config_command")
        .args(["config", "list_config", "example_config"])
        .multiple(false)
))]
pub struct Args {
    /// Single page URL to download
    #[arg(short = 'l', long = "link", value_name = "URL")]
    pub link: Option<String>,

    /// Comma-separated page URLs
    #[arg(short = 'u', long = "urls", value_name = "CSV")]
    pub urls: Option<String>,

    /// File with one page URL per line
    #[arg(short = 'r', long = "list", value_name = "FILEPATH")]
    pub list: Option<PathBuf>,

    /// Output folder
    #[arg(short = 'p', long = "path", value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Custom base filename (single download only)
    #[arg(short = 'n', long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Suppress progress and status output
    #[arg(short = 'H', long)]
    pub hidden: bool,

    /// Skip browser discovery and extract directly
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Quality selector (e.g. 'best', 'worst', '720p')
    #[arg(short = 'q', long, value_name = "QUALITY")]
    pub quality: Option<String>,

    /// Open the settings file
    #[arg(long)]
    pub config: bool,

    /// Print current settings
    #[arg(long)]
    pub list_config: bool,

    /// Write an example settings file
    #[arg(long)]
    pub example_config: bool,
}

impl Args {
    /// Requested configuration command, if any
    pub fn config_command(&self) -> Option<ConfigCommand> {
        if self.config {
            Some(ConfigCommand::Open)
        } else if self.list_config {
            Some(ConfigCommand::List)
        } else if self.example_config {
            Some(ConfigCommand::Example)
        } else {
            None
        }
    }

    /// Whether any URL source was given
    pub fn has_sources(&self) -> bool {
        self.link.is_some() || self.urls.is_some() || self.list.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("cerberus").chain(args.iter().copied()))
    }

    #[test]
    fn test_short_flags() {
        let args = parse(&["-l", "https://a.example", "-p", "/tmp/out", "-n", "clip", "-H", "-f", "-q", "720p"])
            .unwrap();
        assert_eq!(args.link.as_deref(), Some("https://a.example"));
        assert_eq!(args.path, Some(PathBuf::from("/tmp/out")));
        assert_eq!(args.name.as_deref(), Some("clip"));
        assert!(args.hidden);
        assert!(args.force);
        assert_eq!(args.quality.as_deref(), Some("720p"));
        assert_eq!(args.config_command(), None);
    }

    #[test]
    fn test_sources_combine() {
        let args = parse(&["--link", "https://a", "--urls", "https://b,https://c", "--list", "urls.txt"]).unwrap();
        assert!(args.has_sources());
        assert_eq!(args.urls.as_deref(), Some("https://b,https://c"));
        assert_eq!(args.list, Some(PathBuf::from("urls.txt")));
    }

    #[test]
    fn test_config_commands_are_exclusive() {
        assert_eq!(parse(&["--list-config"]).unwrap().config_command(), Some(ConfigCommand::List));
        assert_eq!(parse(&["--config"]).unwrap().config_command(), Some(ConfigCommand::Open));
        assert_eq!(
            parse(&["--example-config"]).unwrap().config_command(),
            Some(ConfigCommand::Example)
        );
        assert!(parse(&["--config", "--list-config"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert!(!args.has_sources());
        assert!(!args.hidden);
        assert!(!args.force);
        assert_eq!(args.quality, None);
    }
}
