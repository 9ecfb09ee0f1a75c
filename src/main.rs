use anyhow::Result;
use std::path::PathBuf;

use contextsearch::logging::{self, LogTarget};
use contextsearch::{Config, ContextSearch, ImageSearchResult};

/// Command line options
struct CliArgs {
    context: String,
    limit: usize,
    prompt: Option<String>,
    config_path: Option<PathBuf>,
    json: bool,
    log_target: LogTarget,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            context: String::new(),
            limit: 3,
            prompt: None,
            config_path: None,
            json: false,
            log_target: LogTarget::Stderr,
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();
    let mut words = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("contextsearch {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--limit" | "-n" => {
                let value = required_value(&args, i, "--limit");
                cli.limit = match value.parse() {
                    Ok(n) => n,
                    Err(_) => {
                        eprintln!("Error: --limit expects a non-negative number, got {value:?}");
                        std::process::exit(1);
                    }
                };
                i += 1;
            }
            "--prompt" | "-p" => {
                cli.prompt = Some(required_value(&args, i, "--prompt").to_string());
                i += 1;
            }
            "--config" | "-c" => {
                cli.config_path = Some(PathBuf::from(required_value(&args, i, "--config")));
                i += 1;
            }
            "--log-dir" => {
                cli.log_target = LogTarget::File(PathBuf::from(required_value(&args, i, "--log-dir")));
                i += 1;
            }
            "--journald" => cli.log_target = LogTarget::Journald,
            "--json" => cli.json = true,
            "--" => {
                words.extend(args[i + 1..].iter().cloned());
                break;
            }
            arg if arg.starts_with('-') && arg.len() > 1 => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            word => words.push(word.to_string()),
        }
        i += 1;
    }

    cli.context = words.join(" ");
    if cli.context.trim().is_empty() {
        eprintln!("Error: a context to search for is required");
        print_help();
        std::process::exit(1);
    }

    cli
}

fn required_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"contextsearch - find web images that match a text context

USAGE:
    contextsearch [OPTIONS] <CONTEXT>...

OPTIONS:
    --limit, -n N       Number of images to return (default 3)
    --prompt, -p TEXT   Extra style guidance for query generation
    --config, -c PATH   Path to config file
    --json              Print results as a JSON array
    --log-dir PATH      Write logs to a daily rolling file in PATH
    --journald          Send logs to the systemd journal
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    GOOGLE_API_KEY              Google Custom Search API key
    GOOGLE_CX                   Programmable Search Engine id
    CONTEXTSEARCH_LLM_API_KEY   API key for the generation provider
    CONTEXTSEARCH_LOG           Log level (trace, debug, info, warn, error)

A .env file in the working directory is read before the environment.
Config file location: $XDG_CONFIG_HOME/contextsearch/config.toml"#
    );
}

fn main() {
    let cli = parse_args();

    // Missing .env is normal
    let _ = dotenvy::dotenv();

    if let Err(e) = logging::init(cli.log_target.clone()) {
        eprintln!("Warning: logging unavailable: {e:#}");
    }

    match run(&cli) {
        Ok(results) => {
            if let Err(e) = print_results(&results, cli.json) {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Search failed: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &CliArgs) -> Result<Vec<ImageSearchResult>> {
    let mut config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env();

    let search = ContextSearch::from_config(&config)?;
    let results = search.search_with_context(&cli.context, cli.limit, cli.prompt.as_deref())?;
    Ok(results)
}

fn print_results(results: &[ImageSearchResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. {}", i + 1, result.image_description);
        println!("   query: {}", result.image_search_query);
        println!("   url:   {}", result.url);
        println!("   score: {:.4}", result.score);
    }
    Ok(())
}
