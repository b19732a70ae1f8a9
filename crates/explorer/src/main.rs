use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use correlation::{match_compilers, match_kind_label, CompilerMatchKind, SourceSettings};
use explorer::pipeline::Pipeline;
use explorer::remote::{HttpRemoteClient, RemoteClient};
use explorer::{ExplorerConfig, ExplorerEvent};

#[derive(Parser)]
#[command(name = "explorer", about = "Compile local sources on a remote compilation service")]
struct Cli {
    /// Base URL of the remote service (also: EXPLORER_URL).
    #[arg(long, global = true)]
    url: Option<String>,
    /// Read configuration from a TOML file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// List the compilers advertised by the remote service.
    Compilers {
        /// Rank the list against this local compiler binary.
        #[arg(long)]
        compiler: Option<PathBuf>,
        /// Compiler kind tag for matching, e.g. "GCC" or "Clang".
        #[arg(long, default_value = "")]
        kind: String,
        #[arg(long, default_value = "c++")]
        language: String,
        #[arg(long)]
        allow_minor_mismatch: bool,
    },
    /// Run the full pipeline for one source file and print the assembly.
    Compile {
        source: PathBuf,
        /// Local compiler binary used for matching and preprocessing.
        #[arg(long)]
        compiler: PathBuf,
        #[arg(long, default_value = "")]
        kind: String,
        #[arg(long, default_value = "c++")]
        language: String,
        #[arg(long, default_value = "")]
        language_switch: String,
        /// Compiler switch for local preprocessing; repeatable.
        #[arg(long = "switch")]
        switches: Vec<String>,
        /// Extra arguments forwarded to the remote compiler.
        #[arg(long, default_value = "")]
        user_args: String,
        /// Submit the raw source instead of preprocessing locally.
        #[arg(long)]
        no_preprocess: bool,
        #[arg(long)]
        allow_minor_mismatch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ExplorerConfig::from_file(path)?,
        None => ExplorerConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }

    match cli.command {
        CliCommand::Compilers {
            compiler,
            kind,
            language,
            allow_minor_mismatch,
        } => {
            let client = HttpRemoteClient::new(config.url.clone());
            let list = client
                .list_compilers(&CancellationToken::new())
                .await
                .with_context(|| format!("failed to list compilers at {}", config.url))?;
            info!(count = list.len(), url = %config.url, "remote compiler list fetched");
            match compiler {
                Some(compiler) => {
                    let settings = SourceSettings::new(
                        "unnamed.cpp",
                        language,
                        "",
                        compiler.display().to_string(),
                        kind,
                        vec![],
                    );
                    let matches = match_compilers(&settings, &list, allow_minor_mismatch);
                    for m in &matches.alternatives {
                        println!("{:<24} {:<32} {}", m.info.id, m.info.name, match_kind_label(m.kind));
                    }
                }
                None => {
                    for info in &list {
                        println!("{:<24} {:<32} {}", info.id, info.name, info.language);
                    }
                }
            }
        }
        CliCommand::Compile {
            source,
            compiler,
            kind,
            language,
            language_switch,
            switches,
            user_args,
            no_preprocess,
            allow_minor_mismatch,
        } => {
            let text = std::fs::read_to_string(&source)
                .with_context(|| format!("failed to read {}", source.display()))?;
            config.preprocess_locally = !no_preprocess;
            config.allow_minor_version_mismatch = allow_minor_mismatch;
            config.additional_switches = user_args;
            let settings = SourceSettings::new(
                source.display().to_string(),
                language,
                language_switch,
                compiler.display().to_string(),
                kind,
                switches,
            );

            let client = Arc::new(HttpRemoteClient::new(config.url.clone()));
            let (handle, bus) = Pipeline::spawn(config, client);
            let mut events = bus.subscribe();
            handle.select_source(settings, text);

            loop {
                match events.recv().await.context("event bus closed")? {
                    ExplorerEvent::RemoteMatched(matched) => {
                        if let Some(chosen) = &matched.matches.chosen {
                            if chosen.kind == CompilerMatchKind::NoMatch {
                                info!(compiler = %chosen.info.name, "no matching compiler, using closest");
                            } else {
                                info!(
                                    compiler = %chosen.info.name,
                                    kind = match_kind_label(chosen.kind),
                                    "remote compiler chosen"
                                );
                            }
                        } else {
                            bail!("remote service advertises no compilers");
                        }
                    }
                    ExplorerEvent::CompileStarted { source_name } => {
                        info!(source = %source_name, "compiling");
                    }
                    ExplorerEvent::Compiled { text, index } => {
                        for chunk in &text.asm {
                            let Some(line) = &chunk.text else { continue };
                            match &chunk.source {
                                Some(location) => println!("{line:<48} ; {location}"),
                                None => println!("{line}"),
                            }
                        }
                        info!(bytes = index.text().len(), "assembly rendered");
                        break;
                    }
                    ExplorerEvent::PipelineError(err) => bail!("{err}"),
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
