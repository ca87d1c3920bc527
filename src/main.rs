//! KI-Identity - Main Entry Point
//!
//! Command-line front end for ki-identity-browser. Generates, validates and
//! compiles fingerprint profiles, and serves the control-plane API.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use ki_identity_browser::{
    api::ApiServer,
    config::{AccountsFile, CliArgs, IdentitySettings},
    context::{ContextLifecycleManager, MockWindowing},
    fingerprint::{user_agent_for, FingerprintGenerator, FingerprintProfile, QualityReport},
    injection::InjectionEngine,
    NAME, VERSION,
};
use serde::Serialize;

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
}

/// Print the startup banner with version and ASCII art
fn print_banner() {
    println!(
        r#"
{cyan}{bold}  _  ___       ___    _            _   _ _
 | |/ (_)     |_ _|__| | ___ _ __ | |_(_) |_ _   _
 | ' /| |_____ | |/ _` |/ _ \ '_ \| __| | __| | | |
 | . \| |_____|| | (_| |  __/ | | | |_| | |_| |_| |
 |_|\_\_|     |___\__,_|\___|_| |_|\__|_|\__|\__, |
                                              |___/
{reset}
{dim}  Isolated Browsing Contexts with Consistent Identities{reset}
{dim}  Version: {version}{reset}
"#,
        cyan = colors::CYAN,
        bold = colors::BOLD,
        reset = colors::RESET,
        dim = colors::DIM,
        version = VERSION
    );
}

/// Print configuration summary
fn print_config_summary(settings: &IdentitySettings) {
    println!(
        "{bold}{blue}Configuration:{reset}",
        bold = colors::BOLD,
        blue = colors::BLUE,
        reset = colors::RESET
    );
    println!(
        "  {dim}Partitions:{reset}     {}<account>",
        settings.partition_prefix,
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Chrome:{reset}         {}",
        settings.chrome_version,
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Low quality:{reset}    below {}",
        settings.low_quality_threshold,
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}API Server:{reset}     {}",
        if settings.api_enabled {
            format!(
                "{green}http://127.0.0.1:{}{reset}",
                settings.api_port,
                green = colors::GREEN,
                reset = colors::RESET
            )
        } else {
            format!("{yellow}disabled{reset}", yellow = colors::YELLOW, reset = colors::RESET)
        },
        dim = colors::DIM,
        reset = colors::RESET
    );

    if let Some(ref proxy) = settings.default_proxy {
        println!(
            "  {dim}Proxy:{reset}          {}",
            proxy.to_url(),
            dim = colors::DIM,
            reset = colors::RESET
        );
    }

    if let Some(ref accounts) = settings.accounts_file {
        println!(
            "  {dim}Accounts:{reset}       {}",
            accounts.display(),
            dim = colors::DIM,
            reset = colors::RESET
        );
    }

    println!();
}

fn seed_arg() -> Arg {
    Arg::new("seed")
        .long("seed")
        .value_name("SEED")
        .help("Seed string; the same seed always yields the same profile")
}

/// Build the CLI command parser
fn build_cli() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author("KI-Browser Team")
        .about("Per-account isolated browsing contexts with consistent fingerprints")
        .subcommand(
            Command::new("generate")
                .about("Generate a fingerprint profile and print it with its quality report")
                .arg(seed_arg()),
        )
        .subcommand(
            Command::new("validate")
                .about("Score a fingerprint profile read from a JSON file")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("script")
                .about("Print the injection bootstrap script for a profile")
                .arg(seed_arg())
                .arg(
                    Arg::new("profile")
                        .long("profile")
                        .value_name("FILE")
                        .help("Compile this profile instead of generating one")
                        .value_parser(clap::value_parser!(PathBuf))
                        .conflicts_with("seed"),
                ),
        )
        .subcommand(Command::new("serve").about("Run the control-plane API (default)"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file (TOML or JSON)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("API server port (default: 9222)")
                .value_parser(clap::value_parser!(u16))
                .global(true),
        )
        .arg(
            Arg::new("no-api")
                .long("no-api")
                .help("Disable the REST API server")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("accounts")
                .long("accounts")
                .value_name("FILE")
                .help("Accounts to start when serving (TOML or JSON)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("partition-prefix")
                .long("partition-prefix")
                .value_name("PREFIX")
                .help("Storage partition prefix (default: persist:account-)")
                .global(true),
        )
        .arg(
            Arg::new("chrome-version")
                .long("chrome-version")
                .value_name("VERSION")
                .help("Chrome version used in derived user agents")
                .global(true),
        )
        .arg(
            Arg::new("start-url")
                .long("start-url")
                .value_name("URL")
                .help("First URL every context loads")
                .global(true),
        )
        .arg(
            Arg::new("low-quality")
                .long("low-quality")
                .value_name("SCORE")
                .help("Warn when a profile scores below this value (0-100)")
                .value_parser(clap::value_parser!(u8))
                .global(true),
        )
        .arg(
            Arg::new("proxy")
                .long("proxy")
                .value_name("HOST:PORT")
                .help("Default proxy for accounts without their own")
                .global(true),
        )
        .arg(
            Arg::new("proxy-type")
                .long("proxy-type")
                .value_name("TYPE")
                .help("Proxy type: http, https, or socks5")
                .value_parser(["http", "https", "socks5"])
                .global(true),
        )
        .arg(
            Arg::new("proxy-auth")
                .long("proxy-auth")
                .value_name("USER:PASS")
                .help("Proxy authentication credentials")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::Count)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .global(true),
        )
}

/// Parse CLI arguments into CliArgs struct
fn parse_cli_args(matches: &ArgMatches) -> CliArgs {
    let mut args = CliArgs::default();

    args.config_file = matches.get_one::<PathBuf>("config").cloned();
    args.api_port = matches.get_one::<u16>("port").copied();
    args.accounts_file = matches.get_one::<PathBuf>("accounts").cloned();
    args.partition_prefix = matches.get_one::<String>("partition-prefix").cloned();
    args.chrome_version = matches.get_one::<String>("chrome-version").cloned();
    args.start_url = matches.get_one::<String>("start-url").cloned();
    args.low_quality_threshold = matches.get_one::<u8>("low-quality").copied();

    if matches.get_flag("no-api") {
        args.api_enabled = Some(false);
    }

    if let Some(proxy) = matches.get_one::<String>("proxy") {
        match proxy.rsplit_once(':') {
            Some((host, port)) => {
                if let Ok(port) = port.parse::<u16>() {
                    args.proxy_host = Some(host.to_string());
                    args.proxy_port = Some(port);
                }
            }
            None => args.proxy_host = Some(proxy.clone()),
        }
    }

    args.proxy_type = matches.get_one::<String>("proxy-type").cloned();

    if let Some(auth) = matches.get_one::<String>("proxy-auth") {
        match auth.split_once(':') {
            Some((user, pass)) => {
                args.proxy_username = Some(user.to_string());
                args.proxy_password = Some(pass.to_string());
            }
            None => args.proxy_username = Some(auth.clone()),
        }
    }

    args
}

/// Initialize the tracing/logging subsystem
fn init_tracing(verbosity: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower_http=info"] {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    // Logs go to stderr so generated JSON on stdout stays clean.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedOutput {
    profile: FingerprintProfile,
    quality: QualityReport,
    user_agent: String,
}

fn read_profile(path: &Path) -> Result<FingerprintProfile> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile {}", path.display()))?;
    FingerprintProfile::from_json(&json)
        .with_context(|| format!("Invalid profile in {}", path.display()))
}

fn cmd_generate(matches: &ArgMatches, settings: &IdentitySettings) -> Result<()> {
    let seed = matches.get_one::<String>("seed").map(String::as_str);
    let profile = FingerprintGenerator::new().generate(seed);
    let quality = ki_identity_browser::fingerprint::validate(&profile);
    let user_agent = user_agent_for(&profile.navigator.platform, &settings.chrome_version);

    let output = GeneratedOutput {
        profile,
        quality,
        user_agent,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_validate(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<PathBuf>("file")
        .context("Missing profile file")?;
    let profile = read_profile(path)?;
    let report = ki_identity_browser::fingerprint::validate(&profile);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_script(matches: &ArgMatches) -> Result<()> {
    let profile = match matches.get_one::<PathBuf>("profile") {
        Some(path) => read_profile(path)?,
        None => FingerprintGenerator::new().generate(matches.get_one::<String>("seed").map(String::as_str)),
    };
    println!("{}", InjectionEngine::new().bootstrap_script(&profile));
    Ok(())
}

/// Start every account listed in the accounts file
async fn autostart_accounts(manager: &ContextLifecycleManager, path: &Path) -> Result<()> {
    let file = AccountsFile::load(path)
        .with_context(|| format!("Failed to load accounts from {}", path.display()))?;
    info!("Starting {} account(s) from {}", file.accounts.len(), path.display());

    for entry in file.accounts {
        match manager.start(&entry.id, entry.config).await {
            Ok(handle) => info!(account = %entry.id, context = %handle, "Account started"),
            Err(e) => warn!(account = %entry.id, "Account failed to start: {}", e),
        }
    }
    Ok(())
}

async fn cmd_serve(settings: IdentitySettings, quiet: bool) -> Result<()> {
    if !quiet {
        print_banner();
        print_config_summary(&settings);
    }

    info!("Using in-memory windowing collaborator");
    let manager = ContextLifecycleManager::new(Arc::new(MockWindowing::new()), settings.clone());

    let mut api_server = if settings.api_enabled {
        info!("Starting API server on port {}...", settings.api_port);
        let mut server = ApiServer::new(settings.api_port, manager.clone());
        server
            .start()
            .await
            .context("Failed to start API server")?;

        if !quiet {
            println!(
                "{green}{bold}API Server started:{reset} http://127.0.0.1:{}",
                settings.api_port,
                green = colors::GREEN,
                bold = colors::BOLD,
                reset = colors::RESET
            );
            println!(
                "{dim}Press Ctrl+C to stop{reset}",
                dim = colors::DIM,
                reset = colors::RESET
            );
            println!();
        }

        Some(server)
    } else {
        info!("API server disabled");
        None
    };

    if let Some(ref path) = settings.accounts_file {
        autostart_accounts(&manager, path).await?;
    }

    info!("KI-Identity is running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal, stopping gracefully...");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    manager.stop_all().await;

    if let Some(ref mut server) = api_server {
        server.stop().await;
    }

    if !quiet {
        println!(
            "{green}KI-Identity stopped successfully.{reset}",
            green = colors::GREEN,
            reset = colors::RESET
        );
    }

    Ok(())
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let verbosity = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");

    init_tracing(verbosity, quiet);

    let cli_args = parse_cli_args(&matches);
    let settings = cli_args
        .load_settings()
        .context("Failed to load configuration")?;

    match matches.subcommand() {
        Some(("generate", sub)) => cmd_generate(sub, &settings),
        Some(("validate", sub)) => cmd_validate(sub),
        Some(("script", sub)) => cmd_script(sub),
        _ => cmd_serve(settings, quiet).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_serve() {
        let matches = build_cli().try_get_matches_from(["ki-identity"]).unwrap();
        assert!(matches.subcommand().is_none());
    }

    #[test]
    fn test_generate_seed_parsing() {
        let matches = build_cli()
            .try_get_matches_from(["ki-identity", "generate", "--seed", "account-1"])
            .unwrap();

        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "generate");
        assert_eq!(sub.get_one::<String>("seed").map(String::as_str), Some("account-1"));
    }

    #[test]
    fn test_validate_requires_file() {
        assert!(build_cli()
            .try_get_matches_from(["ki-identity", "validate"])
            .is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from(["ki-identity", "serve", "--port", "8080", "--proxy", "localhost:1080"])
            .unwrap();
        let args = parse_cli_args(&matches);

        assert_eq!(args.api_port, Some(8080));
        assert_eq!(args.proxy_host.as_deref(), Some("localhost"));
        assert_eq!(args.proxy_port, Some(1080));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(build_cli()
            .try_get_matches_from(["ki-identity", "-q", "-v"])
            .is_err());
    }
}
