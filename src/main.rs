//! argmatch - grammar-driven argument matching for shell scripts.

use anyhow::{Context, Result};
use argmatch::{
    generate_error_output, generate_json, generate_output, Config, ConverterRegistry, Namespace,
    ParseError, Parsed,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "ARGMATCH_LOG";

/// Grammar-driven argument matching for shell scripts.
#[derive(Parser, Debug)]
#[command(name = "argmatch", version, about, disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// A sourceable script path
    Shell,
    /// JSON on stdout
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse script arguments against a schema and emit the result
    Parse {
        /// JSON schema for the target script
        #[arg(long)]
        config: String,

        /// Environment variable prefix (overrides config)
        #[arg(long)]
        env_prefix: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Shell)]
        format: Format,

        /// Treat unrecognized arguments as an error
        #[arg(long)]
        strict: bool,

        /// Arguments to parse for the target script
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Validate a schema without parsing anything
    Check {
        /// JSON schema for the target script
        #[arg(long)]
        config: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_parse(parser: &argmatch::Parser, args: &[String], strict: bool) -> Result<Parsed, ParseError> {
    if strict {
        parser.parse_args(args).map(|namespace| Parsed {
            namespace,
            extras: Vec::new(),
        })
    } else {
        parser.parse_known_args(args, Namespace::new())
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            config,
            env_prefix,
            format,
            strict,
            args,
        } => {
            let cfg = Config::from_json(&config).context("failed to parse config JSON")?;
            let parser = cfg
                .build(&ConverterRegistry::default())
                .context("invalid config")?;

            let effective_prefix = env_prefix
                .as_deref()
                .unwrap_or_else(|| cfg.effective_env_prefix());

            let outcome = run_parse(&parser, &args, strict);
            match format {
                Format::Json => {
                    let parsed = outcome.context("failed to parse arguments")?;
                    println!("{}", generate_json(&parsed)?);
                }
                Format::Shell => {
                    let path = match outcome {
                        Ok(parsed) => generate_output(&parsed, effective_prefix)
                            .context("failed to generate output file")?,
                        Err(err) => {
                            debug!(error = %err, "parse failed, writing error script");
                            generate_error_output(parser.prog(), &err.to_string())
                                .context("failed to generate error output file")?
                        }
                    };
                    println!("{}", path.display());
                }
            }
        }
        Commands::Check { config } => {
            let cfg = Config::from_json(&config).context("failed to parse config JSON")?;
            let parser = cfg
                .build(&ConverterRegistry::default())
                .context("invalid config")?;
            println!("{}: {} arguments ok", parser.prog(), parser.actions().len());
        }
    }

    Ok(())
}
