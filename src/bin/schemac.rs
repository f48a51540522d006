//! Schema Compiler CLI
//!
//! Loads and prepares schema modules, reports diagnostics and writes the
//! frozen model consumed by the code emitter.

use std::path::PathBuf;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kvschema::{
    CompilerConfig, DirectorySource, EmbeddedSource, ModuleSource, OutputFormat, PrepareOptions,
    SchemaContext,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schemac")]
#[command(about = "Compile key-value store schema modules")]
struct Cli {
    /// Directory holding schema modules (overrides the config file)
    #[arg(short, long, global = true)]
    schema_dir: Option<PathBuf>,

    /// Use the schema corpus bundled with the binary
    #[arg(long, global = true, conflicts_with = "schema_dir")]
    bundled: bool,

    /// Explicit config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Skip malformed field declarations instead of failing
    #[arg(long, global = true)]
    lenient: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the modules of the schema source
    List,

    /// Prepare modules and report diagnostics
    Check {
        /// Modules to check (all when omitted)
        modules: Vec<String>,
    },

    /// Write the prepared model of a module as JSON
    Dump {
        module: String,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the module dependency graph in DOT format
    Graph {
        /// Output file (defaults to schemas.dot)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn open_source(cli: &Cli, config: &CompilerConfig) -> anyhow::Result<Box<dyn ModuleSource>> {
    if cli.bundled {
        return Ok(Box::new(EmbeddedSource::bundled()));
    }
    let dir = cli.schema_dir.clone().unwrap_or_else(|| config.schema_dir());
    let source = DirectorySource::with_config(&dir, &config.load_config())
        .with_context(|| format!("opening schema directory {}", dir.display()))?;
    Ok(Box::new(source))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = CompilerConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if cli.lenient {
        config.compiler.strict_fields = false;
    }

    let source = open_source(&cli, &config)?;
    let names = source.modules();
    let mut ctx = SchemaContext::from_source(source, PrepareOptions::from(&config));

    match cli.command {
        Commands::List => {
            for name in &names {
                println!("{}", name);
            }
            Ok(())
        }

        Commands::Check { modules } => {
            let targets = if modules.is_empty() { names } else { modules };
            let mut failed = 0;

            for name in &targets {
                match ctx.load(name) {
                    Ok(registry) => {
                        let diagnostics = registry.diagnostics();
                        println!(
                            "✅ {} - {} records, {} enums, {} warning(s)",
                            name,
                            registry.records().len(),
                            registry.enums().len(),
                            diagnostics.warning_count()
                        );
                        if !diagnostics.is_empty() {
                            print!("{}", diagnostics);
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        println!("❌ {} - {}", name, e);
                    }
                }
            }

            if failed > 0 {
                bail!("{} of {} module(s) failed to prepare", failed, targets.len());
            }
            Ok(())
        }

        Commands::Dump { module, output } => {
            let registry = ctx.load(&module)?;
            let json = match config.export.output_format {
                OutputFormat::Pretty => serde_json::to_string_pretty(registry.as_ref())?,
                OutputFormat::Compact => serde_json::to_string(registry.as_ref())?,
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                    println!("✅ Wrote {} ({}) to {:?}", module, registry.fingerprint()?.short(), path);
                }
                None => println!("{}", json),
            }
            Ok(())
        }

        Commands::Graph { output } => {
            ctx.load_all()?;
            let output_path = output.unwrap_or_else(|| PathBuf::from("schemas.dot"));
            std::fs::write(&output_path, ctx.dependency_dot())?;
            println!("✅ Exported DOT to: {:?}", output_path);
            Ok(())
        }
    }
}
