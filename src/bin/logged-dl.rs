use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use logged_dl::cli::ConsoleShell;
use logged_dl::session::COOKIE_ENV;
use logged_dl::{App, AppConfig, RunOutcome, StrategyKind, UrlInput};

struct CliConfig {
    urls: Vec<String>,
    url_files: Vec<PathBuf>,
    strategy: Option<String>,
    output: Option<PathBuf>,
    config_path: PathBuf,
    force: bool,
    save_config: bool,
    interactive: bool,
    verbose: bool,
}

fn parse_args() -> CliConfig {
    let args: Vec<_> = env::args().skip(1).collect();

    let mut cli = CliConfig {
        urls: Vec::new(),
        url_files: Vec::new(),
        strategy: None,
        output: None,
        config_path: AppConfig::default_path(),
        force: false,
        save_config: false,
        interactive: false,
        verbose: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            flag @ ("-f" | "--file" | "-s" | "--strategy" | "-o" | "--output" | "-c"
            | "--config") => {
                i += 1;
                let Some(value) = args.get(i).cloned() else {
                    eprintln!("Error: {flag} requires a value");
                    std::process::exit(1);
                };
                match flag {
                    "-f" | "--file" => cli.url_files.push(PathBuf::from(value)),
                    "-s" | "--strategy" => cli.strategy = Some(value),
                    "-o" | "--output" => cli.output = Some(PathBuf::from(value)),
                    _ => cli.config_path = PathBuf::from(value),
                }
            }
            "--force" => cli.force = true,
            "--save-config" => cli.save_config = true,
            "-i" | "--interactive" => cli.interactive = true,
            "-v" | "--verbose" => cli.verbose = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => cli.urls.push(arg.to_string()),
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn print_usage() {
    let strategies: Vec<&str> = StrategyKind::ALL.iter().map(|s| s.name()).collect();
    eprintln!("Usage: logged-dl [OPTIONS] [url]...");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [url]                  URL to download; relative URLs need session.base_url");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -f, --file <PATH>      Read URLs from a file, one per line");
    eprintln!(
        "  -s, --strategy <NAME>  Transport strategy: {} (default: direct)",
        strategies.join(", ")
    );
    eprintln!("  -o, --output <DIR>     Download directory");
    eprintln!("  -c, --config <PATH>    Config file");
    eprintln!("      --force            Overwrite existing files");
    eprintln!("      --save-config      Write the effective config to the config file and exit");
    eprintln!("  -i, --interactive      Show the input prompt after URLs given here");
    eprintln!("  -v, --verbose          Log progress to stderr");
    eprintln!("  -h, --help             Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  {}       Extra session cookies, `name=value; ...`", COOKIE_ENV);
    eprintln!("  RUST_LOG               Log filter");
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_secs()
        .init();
}

async fn read_url_files(paths: &[PathBuf]) -> logged_dl::Result<Vec<String>> {
    let mut urls = Vec::new();
    for path in paths {
        let contents = tokio::fs::read_to_string(path).await?;
        urls.extend(contents.lines().map(String::from));
    }
    Ok(urls)
}

#[tokio::main]
async fn main() -> logged_dl::Result<()> {
    let cli = parse_args();
    init_logging(cli.verbose);

    let mut config = AppConfig::load_or_default(&cli.config_path)?;
    if let Some(strategy) = cli.strategy {
        config.download = config.download.with_strategy(strategy);
    }
    if cli.force {
        config.download = config.download.with_force_overwrite(true);
    }
    if let Some(output) = cli.output {
        config.paths.download_dir = output;
    }

    if cli.save_config {
        config.validate()?;
        config.save(&cli.config_path)?;
        println!("Config written to {}", cli.config_path.display());
        return Ok(());
    }

    if let Ok(header) = env::var(COOKIE_ENV) {
        config.session = config.session.with_cookie_header(&header);
    }

    let mut urls = cli.urls;
    urls.extend(read_url_files(&cli.url_files).await?);

    let mut app = App::from_config(&config, Arc::new(ConsoleShell::new())).await?;

    if urls.is_empty() {
        if config.auto_start || cli.interactive {
            return app.start().await;
        }
        print_usage();
        return Ok(());
    }

    let outcome = app.start_downloading(UrlInput::List(urls)).await?;
    if cli.interactive {
        return app.start().await;
    }
    match outcome {
        Some(RunOutcome::Completed(report)) if report.failed == 0 => Ok(()),
        _ => std::process::exit(1),
    }
}
