//! Main entry point for the cerberus CLI

use anyhow::{bail, Context};
use cerberus::cli::{Args, OutputFormatter};
use cerberus::config::{handle_config, ConfigPaths, Settings, LOG_FILE_NAME};
use cerberus::core::{Orchestrator, OrchestratorOptions, QualityPreference};
use cerberus::download::{FetcherConfig, Fetcher, FfmpegTranscoder};
use cerberus::platform::{ExtractorOptions, HttpClientConfig, WebDriverBrowser, YtDlpExtractor};
use cerberus::utils::url::{matches_known_host, split_url_csv, split_url_lines};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let paths = ConfigPaths::discover()?;
    paths.ensure()?;

    if let Some(command) = args.config_command() {
        handle_config(command, &paths)?;
        return Ok(());
    }

    let (settings, problems) = Settings::load(&paths.settings_file());
    let hidden = args.hidden || settings.output_always_hidden();
    let _guard = init_logging(&paths, hidden)?;
    for problem in &problems {
        error!("{}", problem);
    }
    debug!("Starting cerberus with args: {:?}", args);

    let formatter = Arc::new(OutputFormatter::new(hidden, settings.ignore_errors()));

    if !args.has_sources() {
        formatter.error("No URLs provided. Use -l, -u or -r to specify download targets.");
        return Ok(());
    }
    let urls = gather_urls(&args)?;
    if urls.is_empty() {
        formatter.error("The given sources contain no URLs.");
        return Ok(());
    }
    if args.name.is_some() && urls.len() > 1 {
        formatter.warning("Custom name is ignored for multiple downloads.");
    }

    let needs_browser = !args.force
        && urls
            .iter()
            .any(|url| !matches_known_host(url, &settings.known_hosts()));
    if needs_browser && settings.usable_browser_path().is_none() {
        error!("browser_path is missing or does not exist: {:?}", settings.browser_path());
        bail!(
            "browser_path in {} is not set to an existing browser. Use --config to set it.",
            paths.settings_file().display()
        );
    }

    let save_folder = save_folder(&args, &settings, &paths)?;
    std::fs::create_dir_all(&save_folder)
        .with_context(|| format!("could not create output folder {}", save_folder.display()))?;
    info!("Saving into {}", save_folder.display());

    let mut options = OrchestratorOptions::from_settings(&settings, save_folder);
    options.force_direct = args.force;
    if let Some(quality) = &args.quality {
        options.quality = QualityPreference::parse(quality);
    }

    let client = HttpClientConfig::from_settings(&settings).build()?;
    let fetcher = Fetcher::with_config(
        client.clone(),
        Arc::new(FfmpegTranscoder::new()),
        FetcherConfig {
            read_timeout: settings.socket_timeout(),
            progress: Some(formatter.clone()),
            ..FetcherConfig::default()
        },
    );

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let orchestrator = Orchestrator::new(
        options,
        fetcher,
        Arc::new(YtDlpExtractor::new(ExtractorOptions::from_settings(&settings))),
        Arc::new(WebDriverBrowser::new()),
        client,
    )
    .with_reporter(formatter.clone())
    .with_cancellation(cancel);

    if urls.len() == 1 {
        formatter.info("Starting download...");
    }
    let report = orchestrator
        .run_batch(&urls, args.name.as_deref(), |page| {
            formatter.print_page_result(page.saved.as_deref(), page.elapsed);
        })
        .await;

    if report.cancelled {
        warn!("Batch cancelled after {} of {} URLs", report.pages.len(), urls.len());
        formatter.warning("Download cancelled.");
    }
    Ok(())
}

/// Page URLs from `--link`, `--urls` and `--list`, in that order
fn gather_urls(args: &Args) -> anyhow::Result<Vec<String>> {
    let mut urls = Vec::new();
    if let Some(link) = &args.link {
        let link = link.trim();
        if !link.is_empty() {
            urls.push(link.to_string());
        }
    }
    if let Some(csv) = &args.urls {
        urls.extend(split_url_csv(csv));
    }
    if let Some(list) = &args.list {
        let contents = std::fs::read_to_string(list)
            .with_context(|| format!("could not read URL list {}", list.display()))?;
        urls.extend(split_url_lines(&contents));
    }
    Ok(urls)
}

fn save_folder(args: &Args, settings: &Settings, paths: &ConfigPaths) -> anyhow::Result<PathBuf> {
    if let Some(path) = &args.path {
        return Ok(path.clone());
    }
    if settings.use_cwd_as_default() {
        return std::env::current_dir().context("could not resolve the current directory");
    }
    Ok(paths.download_dir())
}

/// Cancel `token` on the first interrupt; in-flight transfers finish on their own
fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current download");
            token.cancel();
        }
    });
}

/// Console logging (off when hidden) plus a persistent debug log file
fn init_logging(paths: &ConfigPaths, hidden: bool) -> anyhow::Result<WorkerGuard> {
    let appender = tracing_appender::rolling::never(&paths.dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_filter(LevelFilter::DEBUG);

    let console_layer = (!hidden).then(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_filter(filter)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("could not initialize logging")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_urls_combines_sources() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("urls.txt");
        std::fs::write(&list, "https://c.example\n\n  https://d.example  \n").unwrap();

        let args = Args {
            link: Some(" https://a.example ".into()),
            urls: Some("https://b.example, ,".into()),
            list: Some(list),
            ..Args::default()
        };

        assert_eq!(
            gather_urls(&args).unwrap(),
            vec!["https://a.example", "https://b.example", "https://c.example", "https://d.example"]
        );
    }

    #[test]
    fn test_gather_urls_missing_list_fails() {
        let args = Args {
            list: Some(PathBuf::from("/definitely/not/here.txt")),
            ..Args::default()
        };
        assert!(gather_urls(&args).is_err());
    }

    #[test]
    fn test_save_folder_precedence() {
        let paths = ConfigPaths::at("/cfg");
        let args = Args {
            path: Some(PathBuf::from("/out")),
            ..Args::default()
        };
        assert_eq!(save_folder(&args, &Settings::default(), &paths).unwrap(), PathBuf::from("/out"));

        let args = Args::default();
        assert_eq!(
            save_folder(&args, &Settings::default(), &paths).unwrap(),
            paths.download_dir()
        );

        let settings = Settings::default().with("use_cwd_as_default", "true");
        assert_eq!(
            save_folder(&args, &settings, &paths).unwrap(),
            std::env::current_dir().unwrap()
        );
    }
}
