//! Command-line interface for qlgen.
//!
//! # Usage
//!
//! ```bash
//! # Generate the client module described by qlgen.toml
//! qlgen generate
//!
//! # Validate operations without writing anything
//! qlgen check --config api/qlgen.toml
//!
//! # List the operations embedded in Rust sources
//! qlgen extract src/**/*.rs
//! ```

pub mod config;
pub mod extract;
pub mod sources;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::{Config, CONFIG_FILE};
use qlgen_codegen::{CodeGenerator, Generated};
use qlgen_core::{Error, Result};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "qlgen")]
#[command(author, version, about = "Typed Rust clients for GraphQL operations", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the client module
    #[command(alias = "gen")]
    Generate {
        /// Configuration file
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,
    },

    /// Parse, validate and convert operations without writing output
    Check {
        /// Configuration file
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,
    },

    /// Print the operations embedded in Rust source files
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print version information
    Version,
}

/// Runs a command and returns the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Generate { config } => generate(&config, cli.quiet),
        Commands::Check { config } => check(&config, cli.quiet),
        Commands::Extract { files } => extract_files(&files, cli.verbose),
        Commands::Version => {
            println!("qlgen {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

/// Loads the configuration and inputs, then runs the generator.
pub fn load_and_generate(config_path: &Path) -> Result<(Config, Generated)> {
    let config = Config::load(config_path)?;
    let root = config.root();

    let schema_paths = sources::expand(&config.schema, root)?;
    let schema = sources::load_schema(&schema_paths, root)?;
    let operation_paths = if config.operations.is_empty() {
        Vec::new()
    } else {
        sources::expand(&config.operations, root)?
    };
    let operations = sources::load_operations(&operation_paths, root)?;
    tracing::debug!(
        schema_files = schema.len(),
        operation_sources = operations.len(),
        "loaded inputs"
    );

    let generated = CodeGenerator::with_options(config.codegen_options())
        .generate(&schema, &operations)?;
    Ok((config, generated))
}

fn generate(config_path: &Path, quiet: bool) -> Result<i32> {
    let (config, generated) = load_and_generate(config_path)?;

    let output = config.generated_path();
    write(&output, &generated.render())?;
    tracing::info!(path = %output.display(), "wrote generated module");

    if let Some(export) = config.export_path() {
        let json = generated
            .export_operations()
            .to_json()
            .map_err(|error| Error::config(format!("exporting operations: {error}"), None))?;
        write(&export, &json)?;
        tracing::info!(path = %export.display(), "wrote operation export");
    }

    if !quiet {
        println!(
            "{} {} operation(s), {} type(s) -> {}",
            "Generated".green().bold(),
            generated.operations.len(),
            generated.types.len(),
            output.display()
        );
    }
    Ok(0)
}

fn check(config_path: &Path, quiet: bool) -> Result<i32> {
    let (_, generated) = load_and_generate(config_path)?;
    if !quiet {
        println!(
            "{} {} operation(s) checked",
            "Success:".green().bold(),
            generated.operations.len()
        );
    }
    Ok(0)
}

fn extract_files(files: &[PathBuf], verbose: bool) -> Result<i32> {
    for file in files {
        let text = std::fs::read_to_string(file)
            .map_err(|error| Error::io(file.display().to_string(), error))?;
        let found = extract::extract(&file.display().to_string(), &text)?;
        if found.is_empty() {
            if verbose {
                println!("{} {}", "None".dimmed(), file.display());
            }
            continue;
        }
        for source in found {
            println!(
                "{} {}:{}",
                "==>".blue(),
                source.path,
                source.line_offset + 1
            );
            println!("{}\n", source.text.trim());
        }
    }
    Ok(0)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|error| Error::io(parent.display().to_string(), error))?;
    }
    std::fs::write(path, contents).map_err(|error| Error::io(path.display().to_string(), error))
}

/// Prints an error with each of its located messages on its own line.
pub fn report(error: &Error) {
    match error {
        Error::Syntax { errors } | Error::Validation { errors } if errors.len() > 1 => {
            let kind = if matches!(error, Error::Syntax { .. }) {
                "syntax error"
            } else {
                "validation failed"
            };
            eprintln!("{} {kind}", "error:".red().bold());
            for message in errors {
                match &message.position {
                    Some(position) => eprintln!("  {} {}", format!("{position}:").blue(), message.message),
                    None => eprintln!("  {}", message.message),
                }
            }
        }
        error => eprintln!("{} {error}", "error:".red().bold()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["qlgen", "generate"]);
        match cli.command {
            Commands::Generate { config } => assert_eq!(config, Path::new(CONFIG_FILE)),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["qlgen", "check", "-c", "api/qlgen.toml", "--quiet"]);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Check { .. }));
    }
}
