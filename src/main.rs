use anyhow::Result;
use clap::Parser;
use headcast::{HeadcastConfig, HeadcastPipelineBuilder, OperatorConsole};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "headcast")]
#[command(about = "Low-latency screen streaming and head-tracked input for HMD clients")]
#[command(version)]
#[command(long_about = "Captures the local display and broadcasts it as JPEG frames to \
head-mounted viewers, while turning the viewer's head pose into mouse and keyboard input. \
Profiles tune smoothing, sensitivity and gesture bindings per application.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "headcast.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the pipeline")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - build but don't start components
    #[arg(long, help = "Perform dry run - build the pipeline but don't start it")]
    dry_run: bool,

    /// Override the profile activated at startup
    #[arg(short, long, value_name = "NAME", help = "Profile to activate at startup")]
    profile: Option<String>,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR", help = "Directory for rolling log files")]
    log_dir: Option<String>,

    /// Enable operator hotkeys on the terminal
    #[arg(long, help = "Enable terminal hotkeys: c=calibrate r=reset t=tracking p=profile q=quit")]
    console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&args)?;

    info!("Starting Headcast v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match HeadcastConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(profile) = &args.profile {
        info!("Overriding startup profile: {}", profile);
        config.system.active_profile = profile.clone();
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let pipeline = HeadcastPipelineBuilder::new()
        .config(config)
        .build()
        .map(Arc::new)
        .map_err(|e| {
            error!("Failed to build pipeline: {}", e);
            e
        })?;

    if args.dry_run {
        info!("Dry run mode - pipeline built but not started");
        println!(
            "✓ Dry run completed successfully - profile '{}' of {} loaded",
            pipeline.active_profile().name,
            pipeline.profile_names().len()
        );
        return Ok(());
    }

    match pipeline.start_streaming().await {
        Ok(method) => info!("Streaming started with {} capture", method),
        Err(e) => error!("Failed to start streaming: {}", e),
    }

    let console = if args.console {
        let console = OperatorConsole::new(Arc::clone(&pipeline));
        console.start();
        Some(console)
    } else {
        None
    };

    let exit_code = pipeline.run().await.map_err(|e| {
        error!("Pipeline error during execution: {}", e);
        e
    })?;

    if let Some(console) = console {
        console.stop().await;
    }

    info!("Headcast exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("headcast={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "headcast.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    if args.console && args.log_format.as_deref() != Some("json") {
        warn!("Console hotkeys put the terminal in raw mode; log lines may be misaligned");
    }

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Headcast Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Any key can be overridden with HEADCAST_<SECTION>__<KEY>");
    println!();
    println!("{}", HeadcastConfig::default().to_toml()?);
    Ok(())
}
