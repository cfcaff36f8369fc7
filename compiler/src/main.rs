use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use dacc::pipeline::{self, PipelineError, PipelineOptions};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum NetworkEmit {
    Graph,
    Dot,
    Json,
    Fingerprint,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ActorEmit {
    Ir,
    Schedule,
    Dot,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "dacc",
    version,
    about = "Dataflow Actor Compiler Collection: validates actor networks and normalises actor IR"
)]
struct Cli {
    /// Log pass summaries to stderr (RUST_LOG overrides)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a network description (.nl text or .json)
    Network {
        file: PathBuf,

        /// Actor class interface file (repeatable)
        #[arg(short, long = "registry")]
        registry: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = NetworkEmit::Graph)]
        emit: NetworkEmit,
    },
    /// Run the actor passes over an actor IR document
    Actor {
        file: PathBuf,

        /// Flatten conditionals into predicated straight-line code
        #[arg(long)]
        if_convert: bool,

        /// Rewrite state variables to a single store per procedure
        #[arg(long)]
        store_once: bool,

        /// Keep parallel actions unmerged
        #[arg(long)]
        no_classify: bool,

        #[arg(long, value_enum, default_value_t = ActorEmit::Ir)]
        emit: ActorEmit,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "dacc=debug" } else { "dacc=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Network { file, registry, emit } => run_network(&file, &registry, emit),
        Command::Actor {
            file,
            if_convert,
            store_once,
            no_classify,
            emit,
        } => {
            let options = PipelineOptions {
                if_convert,
                store_once,
                classify: !no_classify,
                ..PipelineOptions::default()
            };
            run_actor(&file, &options, emit)
        }
    };

    match result {
        Ok(output) => print!("{output}"),
        Err(err) => {
            eprintln!("dacc: {}", err.render());
            process::exit(err.exit_code());
        }
    }
}

fn run_network(file: &Path, registry: &[PathBuf], emit: NetworkEmit) -> Result<String, PipelineError> {
    let registry = pipeline::load_registry(registry)?;
    let network = pipeline::load_network(file, &registry)?;
    Ok(match emit {
        NetworkEmit::Graph => network.to_string(),
        NetworkEmit::Dot => dacc::dot::network_dot(&network),
        NetworkEmit::Json => to_json(file, &network.to_decl())?,
        NetworkEmit::Fingerprint => pipeline::compute_provenance(&network, &registry).to_json(),
    })
}

fn run_actor(file: &Path, options: &PipelineOptions, emit: ActorEmit) -> Result<String, PipelineError> {
    let mut actor = pipeline::load_actor(file)?;
    pipeline::run_actor_pipeline(&mut actor, options)?;
    Ok(match emit {
        ActorEmit::Ir => {
            let callees = actor.signatures();
            actor
                .procs
                .iter()
                .map(|p| p.display(&actor.globals, &callees).to_string())
                .collect::<Vec<_>>()
                .join("\n")
        }
        ActorEmit::Schedule => dacc::schedule::schedule_actor(&actor)
            .map_err(|error| PipelineError::Guard {
                actor: actor.name.clone(),
                error,
            })?
            .to_string(),
        ActorEmit::Dot => dacc::dot::fsm_dot(&actor),
        ActorEmit::Json => to_json(file, &actor)?,
    })
}

fn to_json<T: serde::Serialize>(file: &Path, value: &T) -> Result<String, PipelineError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|error| PipelineError::Json {
        path: file.to_path_buf(),
        error,
    })?;
    text.push('\n');
    Ok(text)
}
