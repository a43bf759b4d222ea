use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use adbscope_adb::{AdbClient, Connection};
use adbscope_logs::{
    FilterConfig, Level, LogcatPipeline, PidWatcher, ProcessAllowList, RenderOptions, Renderer,
    ResolutionPolicy, Sink, TerminalWidth, WatcherConfig, open_log_file,
};

mod config;

use config::{Config, expand_terms};

/// Adbscope - Colorized, filtered logcat for Android devices
#[derive(Parser, Debug)]
#[command(name = "adbscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $XDG_CONFIG_HOME/adbscope/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to the adb binary
    #[arg(long, global = true, value_name = "PATH")]
    adb_path: Option<String>,

    /// Target the device with this serial number
    #[arg(short = 's', long, global = true, conflicts_with_all = ["device", "emulator"])]
    serial: Option<String>,

    /// Target the only attached USB device
    #[arg(short = 'd', long, global = true, conflicts_with = "emulator")]
    device: bool,

    /// Target the only running emulator
    #[arg(short = 'e', long, global = true)]
    emulator: bool,

    /// Enable debug logging on stderr
    #[arg(short = 'D', long, global = true, conflicts_with = "quiet")]
    debug_log: bool,

    /// Only log errors on stderr
    #[arg(short = 'q', long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream the device log
    Logcat(LogcatArgs),

    /// List attached devices
    Devices,

    /// List installed packages
    Packages {
        /// Only third-party packages
        #[arg(short = '3', long)]
        third_party: bool,
    },
}

#[derive(Args, Debug)]
struct LogcatArgs {
    /// Only show output from this package
    #[arg(short = 'p', long, conflicts_with = "current")]
    package: Option<String>,

    /// Only show output from the app in the foreground
    #[arg(long)]
    current: bool,

    /// Minimum level to show (V, D, I, W, E, F)
    #[arg(short = 'l', long, value_name = "LEVEL")]
    min_level: Option<String>,

    /// Only show entries containing one of these terms (comma-separated, or @file)
    #[arg(long, value_name = "TERMS")]
    include: Vec<String>,

    /// Hide entries containing any of these terms (comma-separated, or @file)
    #[arg(long, value_name = "TERMS")]
    exclude: Vec<String>,

    /// Also append output to this file
    #[arg(short = 'o', long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Keep colors in the log file
    #[arg(long)]
    log_file_ansi: bool,

    /// Clear the device log buffer (and the log file) before starting
    #[arg(short = 'c', long)]
    clear: bool,

    /// Show the time column
    #[arg(long)]
    show_time: bool,

    /// Show the pid-tid column
    #[arg(long)]
    show_pid: bool,
}

/// How a logcat run ended
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Finished,
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Keep diagnostics on stderr so they never mix with log output
    let directive = if cli.debug_log {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(Outcome::Finished) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => {
            eprintln!("interrupted, shutting down...");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    let config = Config::load(cli.config.as_deref())?;
    let client = adb_client(&cli, &config);

    match cli.command {
        Commands::Logcat(args) => run_logcat(args, config, client).await,
        Commands::Devices => {
            let devices = client.list_devices().await.context("failed to list devices")?;
            for device in devices {
                println!("{device}");
            }
            Ok(Outcome::Finished)
        }
        Commands::Packages { third_party } => {
            let packages = client
                .list_packages(third_party)
                .await
                .context("failed to list packages")?;
            for package in packages {
                println!("{package}");
            }
            Ok(Outcome::Finished)
        }
    }
}

fn connection(cli: &Cli) -> Connection {
    if let Some(serial) = &cli.serial {
        Connection::Serial(serial.clone())
    } else if cli.device {
        Connection::Device
    } else if cli.emulator {
        Connection::Emulator
    } else {
        Connection::Any
    }
}

fn adb_client(cli: &Cli, config: &Config) -> AdbClient {
    let program = cli.adb_path.as_deref().or(config.adb_path.as_deref());
    AdbClient::new(program, connection(cli)).with_query_timeout(config.watcher.query_timeout())
}

fn min_level(args: &LogcatArgs, config: &Config) -> Result<Level> {
    let letter = args
        .min_level
        .as_deref()
        .or(config.min_level.as_deref())
        .unwrap_or("V");
    Level::from_letter(letter)
        .with_context(|| format!("invalid level '{letter}', expected one of V, D, I, W, E, F"))
}

async fn run_logcat(args: LogcatArgs, config: Config, client: AdbClient) -> Result<Outcome> {
    let level = min_level(&args, &config)?;
    let filter = FilterConfig::new(level)
        .with_include(expand_terms(&args.include)?)
        .with_exclude(expand_terms(&args.exclude)?);

    client
        .check_connection()
        .await
        .context("failed to connect to device")?;

    let package = if args.current {
        let app = client
            .current_app()
            .await
            .context("failed to find the foreground app")?;
        tracing::info!(package = %app, "following foreground app");
        Some(app)
    } else {
        args.package.clone()
    };

    if args.clear {
        client
            .clear_logcat()
            .await
            .context("failed to clear device log")?;
    }

    let log_file = args
        .log_file
        .as_deref()
        .map(|path| {
            open_log_file(path, args.clear)
                .with_context(|| format!("failed to open log file {}", path.display()))
        })
        .transpose()?;

    let packages: Vec<String> = package.into_iter().collect();
    let (allow_list, watcher) = if packages.is_empty() {
        (ProcessAllowList::unrestricted(), None)
    } else {
        let (allow_list, writer) = ProcessAllowList::for_packages(&packages);
        let watcher = PidWatcher::new(client.clone(), packages, writer).with_config(WatcherConfig {
            interval: config.watcher.poll_interval(),
            ..WatcherConfig::default()
        });
        (allow_list, Some(watcher))
    };

    let policy = if config.watcher.fail_fast {
        ResolutionPolicy::FailFast
    } else {
        ResolutionPolicy::Retry
    };
    let pipeline = LogcatPipeline::new(filter, allow_list).with_policy(policy);

    let renderer = Renderer::new(RenderOptions {
        show_time: args.show_time || config.show_time,
        show_pid: args.show_pid || config.show_pid,
    });
    let width = if io::stdout().is_terminal() {
        TerminalWidth::Detect
    } else {
        TerminalWidth::Fixed(None)
    };
    let mut sink = Sink::new(io::stdout(), renderer, pipeline.cancel_token()).with_width(width);
    if let Some(file) = log_file {
        sink = sink.with_file(file, args.log_file_ansi || config.log_file_ansi);
    }

    let child = client.spawn_logcat().context("failed to start logcat")?;

    let stop = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    let summary = pipeline.run_child(child, sink, watcher).await?;
    tracing::debug!(
        lines = summary.lines_read,
        entries = summary.entries,
        shown = summary.dispatched,
        "logcat finished"
    );

    if summary.interrupted {
        Ok(Outcome::Interrupted)
    } else {
        Ok(Outcome::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_logcat_flags() {
        let cli = parse(&[
            "adbscope", "logcat", "-p", "com.example", "-l", "w", "--include", "net,wifi",
            "--include", "gc", "-o", "out.txt", "-c", "--show-time",
        ]);
        let Commands::Logcat(args) = cli.command else {
            panic!("expected logcat");
        };
        assert_eq!(args.package.as_deref(), Some("com.example"));
        assert_eq!(args.include, vec!["net,wifi", "gc"]);
        assert_eq!(args.log_file, Some(PathBuf::from("out.txt")));
        assert!(args.clear);
        assert!(args.show_time);
        assert!(!args.show_pid);
        assert_eq!(min_level(&args, &Config::default()).unwrap(), Level::Warn);
    }

    #[test]
    fn test_package_conflicts_with_current() {
        assert!(Cli::try_parse_from(["adbscope", "logcat", "-p", "a.b", "--current"]).is_err());
    }

    #[test]
    fn test_connection_flags() {
        assert_eq!(
            connection(&parse(&["adbscope", "devices", "-s", "emulator-5554"])),
            Connection::Serial("emulator-5554".to_string())
        );
        assert_eq!(connection(&parse(&["adbscope", "-d", "devices"])), Connection::Device);
        assert_eq!(connection(&parse(&["adbscope", "devices", "-e"])), Connection::Emulator);
        assert_eq!(connection(&parse(&["adbscope", "devices"])), Connection::Any);
        assert!(Cli::try_parse_from(["adbscope", "devices", "-d", "-e"]).is_err());
    }

    #[test]
    fn test_packages_third_party() {
        let cli = parse(&["adbscope", "packages", "-3"]);
        assert!(matches!(cli.command, Commands::Packages { third_party: true }));
    }

    #[test]
    fn test_min_level_falls_back_to_config() {
        let cli = parse(&["adbscope", "logcat"]);
        let Commands::Logcat(args) = cli.command else {
            panic!("expected logcat");
        };
        let config = Config {
            min_level: Some("E".to_string()),
            ..Config::default()
        };
        assert_eq!(min_level(&args, &config).unwrap(), Level::Error);
        assert_eq!(min_level(&args, &Config::default()).unwrap(), Level::Verbose);

        let bad = Config {
            min_level: Some("X".to_string()),
            ..Config::default()
        };
        assert!(min_level(&args, &bad).is_err());
    }
}
