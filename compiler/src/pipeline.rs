// pipeline.rs — Pass orchestration and input loading
//
// Runs the actor passes selected by `PipelineOptions` in pipeline order and
// loads network descriptions (text or JSON) against a class registry.
//
// Preconditions: actors satisfy `Actor::check`.
// Postconditions: on success the actor holds the fully transformed IR; on
//                 failure it is left exactly as it was passed in.
// Failure modes: the first failing pass aborts that actor; other actors in
//                `run_actors` are unaffected.
// Side effects: reads input files; logs per-pass summaries via `tracing`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actor::{Actor, ActorError};
use crate::ast::NetworkDecl;
use crate::classify::{classify, ClassifyReport};
use crate::diag::{codes, DiagCode, Diagnostic};
use crate::interp::InterpError;
use crate::network::{build_network, parse_network, Network, NetworkError};
use crate::pass::{descriptor, schedule_passes, PassError, PassId};
use crate::registry::{Registry, RegistryError};
use crate::{cast, if_convert, phi_removal, store_once};

// ── Options ────────────────────────────────────────────────────────────────

/// Which actor passes to run. Dependencies of a selected pass are always
/// added (see `pass::schedule_passes`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub insert_casts: bool,
    pub if_convert: bool,
    pub remove_phis: bool,
    pub store_once: bool,
    pub classify: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            insert_casts: true,
            if_convert: false,
            remove_phis: true,
            store_once: false,
            classify: true,
        }
    }
}

impl PipelineOptions {
    /// Selected passes with their dependencies, in execution order.
    pub fn passes(&self) -> Vec<PassId> {
        let flags = [
            (self.insert_casts, PassId::InsertCasts),
            (self.store_once, PassId::StoreOnce),
            (self.if_convert, PassId::IfConvert),
            (self.remove_phis, PassId::RemovePhis),
            (self.classify, PassId::Classify),
        ];
        let selected: Vec<PassId> = flags.iter().filter(|(on, _)| *on).map(|(_, p)| *p).collect();
        schedule_passes(&selected)
    }
}

// ── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{}: {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("{}: {error}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        error: serde_json::Error,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("{}: {error}", .path.display())]
    LoadActor {
        path: PathBuf,
        #[source]
        error: ActorError,
    },
    #[error(transparent)]
    InvalidActor(#[from] ActorError),
    #[error("{}: {error}", .path.display())]
    Network {
        path: PathBuf,
        /// Source text, present for textual descriptions.
        text: Option<String>,
        #[source]
        error: NetworkError,
    },
    #[error("actor '{actor}': {pass} failed: {error}")]
    Pass {
        actor: String,
        pass: &'static str,
        #[source]
        error: PassError,
    },
    #[error("actor '{actor}': cannot evaluate guard: {error}")]
    Guard {
        actor: String,
        #[source]
        error: InterpError,
    },
}

impl PipelineError {
    /// Process exit code: 2 for I/O failures, 1 for everything the input
    /// itself got wrong.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Io { .. } | PipelineError::Registry(RegistryError::Io { .. }) => 2,
            _ => 1,
        }
    }

    pub fn code(&self) -> Option<DiagCode> {
        match self {
            PipelineError::Network { error, .. } => Some(error.code()),
            PipelineError::Pass { error, .. } => Some(pass_code(error)),
            PipelineError::Guard { .. } => Some(codes::E0305),
            PipelineError::InvalidActor(_) | PipelineError::LoadActor { .. } => Some(codes::E0304),
            _ => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            PipelineError::Network { error, .. } => error.to_diagnostic(),
            PipelineError::Pass { actor, pass, error } => {
                Diagnostic::error(None, format!("actor '{actor}': {pass} failed"))
                    .with_code(pass_code(error))
                    .with_cause(error.to_string(), None)
            }
            PipelineError::Guard { actor, error } => {
                Diagnostic::error(None, format!("actor '{actor}': cannot evaluate guard"))
                    .with_code(codes::E0305)
                    .with_cause(error.to_string(), None)
            }
            PipelineError::LoadActor { error, .. } => {
                Diagnostic::error(None, error.to_string()).with_code(codes::E0304)
            }
            PipelineError::Io { error, .. } => Diagnostic::error(None, error.to_string()),
            PipelineError::Json { error, .. } => Diagnostic::error(None, error.to_string()),
            other => {
                let diag = Diagnostic::error(None, other.to_string());
                match other.code() {
                    Some(code) => diag.with_code(code),
                    None => diag,
                }
            }
        }
    }

    /// Render for the terminal, prefixed with the offending file when known.
    pub fn render(&self) -> String {
        let diag = self.to_diagnostic();
        match self {
            PipelineError::Network { path, text, .. } => {
                diag.render(&path.display().to_string(), text.as_deref())
            }
            PipelineError::Io { path, .. }
            | PipelineError::Json { path, .. }
            | PipelineError::LoadActor { path, .. } => diag.render(&path.display().to_string(), None),
            _ => diag.to_string(),
        }
    }
}

fn pass_code(error: &PassError) -> DiagCode {
    match error {
        PassError::UnsupportedLoop { .. } => codes::E0301,
        PassError::MissingParentType { .. } | PassError::Untyped { .. } => codes::E0302,
        PassError::MalformedPhi { .. } => codes::E0303,
        PassError::InitialValueTooLarge { .. } => codes::E0306,
        PassError::Ir(_) => codes::E0304,
    }
}

// ── Actor pipeline ─────────────────────────────────────────────────────────

/// What each pass did to one actor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorReport {
    /// Pass name and the number of rewrites it performed, in run order.
    pub passes: Vec<(&'static str, usize)>,
    pub classification: ClassifyReport,
}

/// Run the selected passes over `actor`. The actor is only replaced once
/// every pass has succeeded.
pub fn run_actor_pipeline(actor: &mut Actor, options: &PipelineOptions) -> Result<ActorReport, PipelineError> {
    actor.check()?;
    let mut work = actor.clone();
    let mut report = ActorReport::default();

    for pass in options.passes() {
        let name = descriptor(pass).name;
        let start = Instant::now();
        let wrap = |error: PassError| PipelineError::Pass {
            actor: actor.name.clone(),
            pass: name,
            error,
        };
        let changed = match pass {
            PassId::InsertCasts => cast::insert_casts(&mut work).map_err(wrap)?,
            PassId::StoreOnce => store_once::store_once(&mut work).map_err(wrap)?,
            PassId::IfConvert => if_convert::if_convert(&mut work).map_err(wrap)?,
            PassId::RemovePhis => phi_removal::remove_phis(&mut work).map_err(wrap)?,
            PassId::Classify => {
                let merged = classify(&mut work).map_err(wrap)?;
                let count = merged.merges.len();
                report.classification = merged;
                count
            }
        };
        debug!(
            actor = %work.name,
            pass = name,
            changed,
            elapsed_us = start.elapsed().as_micros() as u64,
            "pass complete"
        );
        report.passes.push((name, changed));
    }

    *actor = work;
    Ok(report)
}

/// Run the pipeline over each actor independently. A failure is reported
/// for its actor only.
pub fn run_actors(actors: &mut [Actor], options: &PipelineOptions) -> Vec<Result<ActorReport, PipelineError>> {
    actors
        .iter_mut()
        .map(|actor| run_actor_pipeline(actor, options))
        .collect()
}

pub fn load_actor(path: &Path) -> Result<Actor, PipelineError> {
    let text = read(path)?;
    Actor::from_json(&text).map_err(|error| PipelineError::LoadActor {
        path: path.to_path_buf(),
        error,
    })
}

// ── Networks ───────────────────────────────────────────────────────────────

pub fn load_registry(paths: &[PathBuf]) -> Result<Registry, PipelineError> {
    let mut registry = Registry::new();
    for path in paths {
        let count = registry.load_file(path)?;
        debug!(path = %path.display(), classes = count, "loaded interfaces");
    }
    Ok(registry)
}

/// Load a network description. Files ending in `.json` are read as JSON;
/// anything else as text.
pub fn load_network(path: &Path, registry: &Registry) -> Result<Network, PipelineError> {
    let text = read(path)?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let result = if is_json {
        let decl = NetworkDecl::from_json(&text).map_err(|error| PipelineError::Json {
            path: path.to_path_buf(),
            error,
        })?;
        build_network(&decl, registry).map_err(|error| (error, None))
    } else {
        parse_network(&text, registry).map_err(|error| (error, Some(text)))
    };
    let network = result.map_err(|(error, text)| PipelineError::Network {
        path: path.to_path_buf(),
        text,
        error,
    })?;
    info!(network = %network.name, path = %path.display(), "network loaded");
    Ok(network)
}

fn read(path: &Path) -> Result<String, PipelineError> {
    std::fs::read_to_string(path).map_err(|error| PipelineError::Io {
        path: path.to_path_buf(),
        error,
    })
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Fingerprint of a validated network and the interfaces it was checked
/// against, for cache keys and reproducibility checks.
///
/// `network_hash`: SHA-256 of the compact JSON of the network description.
/// `registry_fingerprint`: SHA-256 of `Registry::canonical_json()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub network_hash: [u8; 32],
    pub registry_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    pub fn network_hash_hex(&self) -> String {
        bytes_to_hex(&self.network_hash)
    }

    pub fn registry_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.registry_fingerprint)
    }

    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"network_hash\": \"{}\",\n  \"registry_fingerprint\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.network_hash_hex(),
            self.registry_fingerprint_hex(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Spans and source formatting do not contribute: a text file and its JSON
/// rendering fingerprint the same.
pub fn compute_provenance(network: &Network, registry: &Registry) -> Provenance {
    let canonical = serde_json::to_string(&network.to_decl()).unwrap_or_default();
    Provenance {
        network_hash: sha256(&canonical),
        registry_fingerprint: sha256(&registry.canonical_json()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}
