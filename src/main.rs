//! Cellflow - run a reactive notebook from the command line.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, bail};
use tracing_subscriber::EnvFilter;

use cellflow_core::storage::markdown_content;
use cellflow_core::{Document, load_config};

fn print_usage() {
    eprintln!("Usage: cellflow [OPTIONS] <NOTEBOOK>");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <NOTEBOOK>                Notebook file to run (.json)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --set <NAME=VALUE>        Override a variable before running (can be repeated)");
    eprintln!("  -o, --output <FILE>       Export the evaluated notebook to a markdown file");
    eprintln!("  --config <FILE>           Load engine settings from a TOML file");
    eprintln!("  --vars                    Print every variable as `name = value`");
    eprintln!("  -h, --help                Print help");
    eprintln!();
    eprintln!("Set CELLFLOW_LOG (e.g. CELLFLOW_LOG=debug) to control log output.");
}

struct Options {
    notebook: PathBuf,
    overrides: Vec<(String, String)>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    vars: bool,
}

/// `Ok(None)` means help was requested.
fn parse_args(args: &[String]) -> anyhow::Result<Option<Options>> {
    let mut notebook: Option<PathBuf> = None;
    let mut overrides = Vec::new();
    let mut output = None;
    let mut config = None;
    let mut vars = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(None),
            "--set" => {
                i += 1;
                let Some(pair) = args.get(i) else {
                    bail!("--set requires NAME=VALUE");
                };
                let Some((name, value)) = pair.split_once('=') else {
                    bail!("--set expects NAME=VALUE, got {:?}", pair);
                };
                overrides.push((name.trim().to_string(), value.to_string()));
            }
            "-o" | "--output" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--output requires a file path");
                };
                output = Some(PathBuf::from(path));
            }
            "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--config requires a file path");
                };
                config = Some(PathBuf::from(path));
            }
            "--vars" => vars = true,
            arg if arg.starts_with('-') => bail!("Unknown option: {}", arg),
            arg => {
                if notebook.is_some() {
                    bail!("Unexpected argument: {}", arg);
                }
                notebook = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    let Some(notebook) = notebook else {
        bail!("missing <NOTEBOOK>");
    };
    Ok(Some(Options {
        notebook,
        overrides,
        output,
        config,
        vars,
    }))
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("CELLFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(options: Options) -> anyhow::Result<()> {
    let config = load_config(options.config.as_deref()).context("loading config")?;
    let mut doc = Document::open(&options.notebook, config)
        .with_context(|| format!("opening {}", options.notebook.display()))?;

    for (name, value) in &options.overrides {
        doc.override_variable(name, value)
            .with_context(|| format!("setting {}", name))?;
    }
    doc.run();

    for cell in doc.engine.cells() {
        if let Some(fault) = cell.fault() {
            eprintln!("Warning: cell {}: {}", cell.id, fault);
        }
    }

    if options.vars {
        for (name, value) in doc.variables() {
            println!("{} = {}", name, value);
        }
    }

    match options.output {
        Some(path) => {
            doc.export_markdown(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
        None if !options.vars => print!("{}", markdown_content(&doc.engine)),
        None => {}
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    init_logging();
    if let Err(e) = run(options) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
