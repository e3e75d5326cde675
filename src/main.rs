// Command-line entry point for Callscope.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use callscope::api::server::{self, SessionFactory};
use callscope::application::DumpUsecase;
use callscope::domain::callable::CallableId;
use callscope::domain::session::CallTreeSession;
use callscope::infrastructure::concurrency::init_thread_pool;
use callscope::infrastructure::config::Config;
use callscope::infrastructure::cpp_provider::CppAnalysisProvider;
use callscope::infrastructure::logging::init_logging;
use callscope::ports::NoopObserver;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./callscope.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the call tree below an entry point as indented text
    Dump {
        /// Identity key of the entry point, e.g. `main()` or `ns::Foo::run(int)`
        entry: String,

        /// Source file or compile_commands.json
        path: PathBuf,

        #[arg(long)]
        include_system_headers: bool,

        /// Extra compiler arguments, after `--`
        #[arg(last = true)]
        extra: Vec<String>,
    },

    /// Write a PlantUML sequence diagram for a root and a set of included callables
    Export {
        /// Source file or compile_commands.json
        path: PathBuf,

        /// Identity key of the diagram root
        #[arg(long)]
        root: String,

        /// Callables to draw (repeatable)
        #[arg(long = "include")]
        included: Vec<String>,

        /// Translation unit declaring the root (defaults to the first catalog file)
        #[arg(long)]
        tu: Option<PathBuf>,

        /// Load definitions of declaration-only callables before exporting
        #[arg(long)]
        load_definitions: bool,

        #[arg(long)]
        include_system_headers: bool,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(last = true)]
        extra: Vec<String>,
    },

    /// Serve sessions over line-delimited JSON
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    init_thread_pool(config.threads)?;

    match cli.command {
        Command::Dump {
            entry,
            path,
            include_system_headers,
            extra,
        } => {
            let arguments = merged_arguments(&config, extra);
            let text = DumpUsecase::new(Box::new(CppAnalysisProvider::new()))
                .with_display_root(config.display_root.clone())
                .dump(
                    &CallableId::from(entry),
                    &path,
                    include_system_headers || config.include_system_headers,
                    &arguments,
                )?;
            print!("{}", text);
        }
        Command::Export {
            path,
            root,
            included,
            tu,
            load_definitions,
            include_system_headers,
            output,
            extra,
        } => {
            let mut session = new_session(&config);
            session.set_extra_arguments(merged_arguments(&config, extra))?;
            session.open(&path)?;
            let tu = match tu {
                Some(tu) => tu,
                None => session
                    .translation_units()
                    .into_iter()
                    .next()
                    .with_context(|| format!("{} lists no translation units", path.display()))?,
            };
            let system = include_system_headers || config.include_system_headers;
            session.select_translation_unit(&tu, system)?;

            let root = CallableId::from(root);
            session.select_root(&root)?;
            if load_definitions {
                load_reachable_definitions(&mut session, &root)?;
            }
            for id in included {
                session.include(&CallableId::from(id))?;
            }

            let diagram = session.export()?;
            match output {
                Some(output) => write_output(&output, &diagram)?,
                None => println!("{}", diagram),
            }
        }
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let factory: SessionFactory = {
                let config = config.clone();
                Arc::new(move || {
                    let mut session = new_session(&config);
                    if !config.extra_arguments.is_empty() {
                        if let Err(e) = session.set_extra_arguments(config.extra_arguments.clone()) {
                            error!("Cannot apply configured arguments: {}", e);
                        }
                    }
                    session
                })
            };
            server::start_server(&host, port, factory)?;
        }
    }
    Ok(())
}

fn new_session(config: &Config) -> CallTreeSession {
    CallTreeSession::new(Box::new(CppAnalysisProvider::new()), Box::new(NoopObserver))
        .with_display_root(config.display_root.clone())
}

/// Configured arguments first; command-line ones can override them.
fn merged_arguments(config: &Config, extra: Vec<String>) -> Vec<String> {
    let mut arguments = config.extra_arguments.clone();
    arguments.extend(extra);
    arguments
}

/// Resolves every declaration reachable from `root`.
fn load_reachable_definitions(session: &mut CallTreeSession, root: &CallableId) -> Result<()> {
    let mut queue = vec![root.clone()];
    let mut seen = std::collections::HashSet::new();
    while let Some(id) = queue.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if !session.lookup(&id)?.is_definition {
            session.load_definition(&id)?;
        }
        queue.extend(session.callees_of(&id).into_iter().map(|c| c.id.clone()));
    }
    Ok(())
}

fn write_output(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Diagram written to {}", path.display());
    Ok(())
}
