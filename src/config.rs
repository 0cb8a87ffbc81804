//! Settings file handling and configuration commands
//!
//! Settings live in a flat `key=value` text file inside the per-user config
//! directory (`%APPDATA%\.Cerberus` on Windows, `~/.Cerberus` elsewhere). The
//! file is read once per invocation into an immutable [`Settings`] value that
//! is passed by reference to every component.

use crate::error::CerberusError;
use crate::utils::url::DEFAULT_KNOWN_HOSTS;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Name of the per-user configuration directory
pub const CONFIG_DIR_NAME: &str = ".Cerberus";
/// Settings file name inside the configuration directory
pub const SETTINGS_FILE_NAME: &str = "Settings.txt";
/// Persistent log file name inside the configuration directory
pub const LOG_FILE_NAME: &str = "Cerberus.log";
/// Example settings file name inside the configuration directory
pub const EXAMPLE_FILE_NAME: &str = "example_settings.txt";
/// Default download folder name inside the configuration directory
pub const DOWNLOAD_DIR_NAME: &str = "Downloads";

/// User agent used when the settings file does not name one
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

const STARTER_SETTINGS: &str = "browser_path=C:/PATH/TO/BROWSER/Browser.exe
# use --list-config to see the current/standard config settings
# use --example-config to view all available config settings
";

const EXAMPLE_SETTINGS: &str = "browser_path=C:/PATH/TO/BROWSER/Browser.exe
minimized=false
overwrite_existing=false
output_always_hidden=false
ignoreerrors=false
yt_verbose=false # set true for detailed extractor output
custom_hosts=youtu.be,erome.com # e.g.
use_browser_cookies=false # needed for some yt downloads
ng_username=your_newgrounds_username # for newgrounds
ng_password=your_newgrounds_password
sort_by=none   # options: none, artist, platform, genre
default_quality=best   # e.g. best, worst, 720p
use_cwd_as_default=false   # if true, default save path is current directory
user_agent=Mozilla/5.0 (Windows NT 10.0; Win64; x64)
cookies_file=
proxy=
socket_timeout=60
retries=10
";

/// Locations of the files cerberus keeps between runs
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Configuration directory
    pub dir: PathBuf,
}

impl ConfigPaths {
    /// Resolve the per-user configuration directory
    pub fn discover() -> Result<Self, CerberusError> {
        let base = if cfg!(windows) {
            dirs::config_dir()
        } else {
            dirs::home_dir()
        }
        .ok_or_else(|| CerberusError::Config("could not determine home directory".to_string()))?;

        Ok(Self::at(base.join(CONFIG_DIR_NAME)))
    }

    /// Use an explicit configuration directory
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the configuration and default download directories
    pub fn ensure(&self) -> Result<(), CerberusError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::create_dir_all(self.download_dir())?;
        Ok(())
    }

    pub fn settings_file(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE_NAME)
    }

    pub fn example_file(&self) -> PathBuf {
        self.dir.join(EXAMPLE_FILE_NAME)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.dir.join(DOWNLOAD_DIR_NAME)
    }
}

/// Folder sorting policy applied after a successful download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    None,
    Artist,
    Platform,
    Genre,
}

impl SortBy {
    /// Parse a `sort_by` value; unknown values disable sorting
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "artist" => SortBy::Artist,
            "platform" => SortBy::Platform,
            "genre" => SortBy::Genre,
            _ => SortBy::None,
        }
    }
}

/// Flat key/value settings loaded once per invocation
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings from `path`, writing a starter file when it is missing.
    ///
    /// Never fails: an unreadable file falls back to defaults. The problems
    /// met on the way are returned so they can be logged once logging runs.
    pub fn load(path: &Path) -> (Self, Vec<String>) {
        let mut problems = Vec::new();
        let mut settings = match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                problems.push(format!("Settings file {} not found", path.display()));
                if let Err(e) = write_starter_settings(path) {
                    problems.push(format!("Could not create settings file {}: {}", path.display(), e));
                }
                Self::default()
            }
            Err(e) => {
                problems.push(format!("Could not read settings file {}: {}", path.display(), e));
                Self::default()
            }
        };
        settings.apply_defaults();
        (settings, problems)
    }

    /// Parse settings file contents (no defaults applied)
    pub fn parse(contents: &str) -> Self {
        let mut values = BTreeMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = match value.find(" #") {
                Some(idx) => &value[..idx],
                None => value,
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self { values }
    }

    fn apply_defaults(&mut self) {
        for (key, value) in [
            ("overwrite_existing", "false"),
            ("sort_by", "none"),
            ("default_quality", "best"),
            ("use_cwd_as_default", "false"),
        ] {
            self.values
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }

    /// Set a value, returning the updated settings
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    /// Raw string value; empty values are treated as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Boolean value: `true` (case-insensitive) is true, anything else false
    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn number(&self, key: &str, default: u64) -> u64 {
        match self.get(key) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Ignoring non-numeric {}={}, using {}", key, raw, default);
                default
            }),
            None => default,
        }
    }

    /// All entries, sorted by key
    pub fn entries(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    pub fn browser_path(&self) -> Option<PathBuf> {
        self.get("browser_path").map(PathBuf::from)
    }

    /// `browser_path` when it points at something on disk
    pub fn usable_browser_path(&self) -> Option<PathBuf> {
        self.browser_path().filter(|p| p.exists())
    }

    pub fn overwrite_existing(&self) -> bool {
        self.flag("overwrite_existing")
    }

    pub fn sort_by(&self) -> SortBy {
        SortBy::parse(self.get("sort_by").unwrap_or("none"))
    }

    pub fn default_quality(&self) -> &str {
        self.get("default_quality").unwrap_or("best")
    }

    pub fn use_cwd_as_default(&self) -> bool {
        self.flag("use_cwd_as_default")
    }

    pub fn minimized(&self) -> bool {
        self.flag("minimized")
    }

    pub fn output_always_hidden(&self) -> bool {
        self.flag("output_always_hidden")
    }

    pub fn ignore_errors(&self) -> bool {
        self.flag("ignoreerrors")
    }

    pub fn yt_verbose(&self) -> bool {
        self.flag("yt_verbose")
    }

    pub fn use_browser_cookies(&self) -> bool {
        self.flag("use_browser_cookies")
    }

    /// Hosts routed straight to direct extraction: defaults plus `custom_hosts`
    pub fn known_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = DEFAULT_KNOWN_HOSTS.iter().map(|h| h.to_string()).collect();
        if let Some(custom) = self.get("custom_hosts") {
            hosts.extend(
                custom
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_string),
            );
        }
        hosts
    }

    /// Newgrounds credentials, when both are present
    pub fn newgrounds_credentials(&self) -> Option<(String, String)> {
        match (self.get("ng_username"), self.get("ng_password")) {
            (Some(user), Some(pass)) => Some((user.to_string(), pass.to_string())),
            _ => None,
        }
    }

    pub fn user_agent(&self) -> &str {
        self.get("user_agent").unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn cookies_file(&self) -> Option<PathBuf> {
        self.get("cookies_file").map(PathBuf::from)
    }

    pub fn proxy(&self) -> Option<&str> {
        self.get("proxy")
    }

    /// Per-read network timeout
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.number("socket_timeout", 60))
    }

    /// Retry count handed to the extractor's own download routine
    pub fn retries(&self) -> u32 {
        self.number("retries", 10).min(u32::MAX as u64) as u32
    }
}

fn write_starter_settings(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, STARTER_SETTINGS)?;
    info!("Settings file created at {}", path.display());
    Ok(())
}

/// Configuration management command selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Open the settings file in the platform editor
    Open,
    /// Print the current settings
    List,
    /// Write an example settings file
    Example,
}

/// Run a configuration command; never downloads anything
pub fn handle_config(command: ConfigCommand, paths: &ConfigPaths) -> Result<(), CerberusError> {
    let settings_file = paths.settings_file();
    if !settings_file.exists() {
        write_starter_settings(&settings_file)?;
    }

    match command {
        ConfigCommand::List => {
            let (settings, problems) = Settings::load(&settings_file);
            for problem in problems {
                eprintln!("{}", problem);
            }
            println!("Current Settings:");
            for (key, value) in settings.entries() {
                println!("{} = {}", key, value);
            }
        }
        ConfigCommand::Example => {
            let example = paths.example_file();
            std::fs::write(&example, EXAMPLE_SETTINGS)?;
            println!("Example configuration created at {}", example.display());
        }
        ConfigCommand::Open => {
            println!("Opening settings file at {}...", settings_file.display());
            open_in_editor(&settings_file)?;
        }
    }
    Ok(())
}

fn open_in_editor(path: &Path) -> Result<(), CerberusError> {
    let mut command = if cfg!(windows) {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else {
        std::process::Command::new("xdg-open")
    };

    let status = command.arg(path).status().map_err(|e| {
        CerberusError::ExternalTool(format!("could not open {}: {}", path.display(), e))
    })?;
    if !status.success() {
        error!("Editor exited with {} for {}", status, path.display());
    }
    Ok(())
}
