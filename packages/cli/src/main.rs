//! `conduit`: inspect Conduit service definitions from the command line.
//!
//! Provides three subcommands:
//!
//! - **`check`**: validate a definitions file and resolve every name in it.
//! - **`order`**: print each service's endpoints in resolution order.
//! - **`route`**: explain which service and endpoint an action routes to.
//!
//! Nothing is ever sent. Transporters and mappers named in the file are
//! replaced by stand-ins, and every authorizer allows everything.
//!
//! File arguments accept `-` for stdin.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use conduit::{identity, render, Endpoint, Exchange, Options, Status};
use conduit_dispatch::{
    build_registry, parse_definitions, should_fan_out, AllowAll, DefinitionError,
    DefinitionsFile, DispatchConfig, MemoryRegistry, Pipeline, Resources, Service,
    ServiceRegistry, Transporter,
};

/// conduit: Conduit dispatch CLI
///
/// Check service definitions and explain how actions route.
#[derive(Parser)]
#[command(name = "conduit", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a definitions file.
    ///
    /// Parses the file, validates every service and endpoint, and checks that
    /// every schema points at a defined service. Exits 0 if the file is
    /// usable, 1 otherwise.
    Check {
        /// Path to a JSON definitions file, or `-` for stdin.
        file: PathBuf,
    },

    /// Print endpoints in the order they are tried.
    Order {
        /// Path to a JSON definitions file, or `-` for stdin.
        file: PathBuf,

        /// Only print this service.
        #[arg(short = 's', long, value_name = "ID")]
        service: Option<String>,
    },

    /// Show which service and endpoint an action routes to.
    ///
    /// ACTION is a JSON exchange, e.g.
    ///   {"type": "GET", "request": {"type": "entry", "id": ["ent1", "ent2"]}}
    ///
    /// Multi-id actions that fan out list the endpoint chosen for each id.
    Route {
        /// Path to a JSON definitions file.
        file: PathBuf,

        /// Path to a JSON exchange, or `-` for stdin.
        action: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit=info,conduit_dispatch=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Check { file } => {
            let defs = load_definitions(&file);
            match build(&defs) {
                Ok(_) => {
                    let endpoints: usize = defs.services.iter().map(|s| s.endpoints.len()).sum();
                    println!(
                        "valid: {} service{}, {} endpoint{}",
                        defs.services.len(),
                        plural(defs.services.len()),
                        endpoints,
                        plural(endpoints)
                    );
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            }
        }

        Command::Order { file, service } => {
            let defs = load_definitions(&file);
            let registry = build(&defs).unwrap_or_else(|e| fatal(&e.to_string()));

            let ids: Vec<&str> = match &service {
                Some(id) if registry.contains(id) => vec![id.as_str()],
                Some(id) => fatal(&format!("no service with id '{}'", id)),
                None => defs.services.iter().map(|s| s.id.as_str()).collect(),
            };

            let blocks: Vec<String> = ids
                .into_iter()
                .filter_map(|id| registry.get_service(None, Some(id)))
                .map(|s| render::render_order(s.id(), s.endpoints()))
                .collect();
            print!("{}", blocks.join("\n"));
        }

        Command::Route { file, action } => {
            let defs = load_definitions(&file);
            let registry = build(&defs).unwrap_or_else(|e| fatal(&e.to_string()));
            let mut exchange: Exchange = serde_json::from_str(&read_input(&action))
                .unwrap_or_else(|e| fatal(&format!("failed to parse action: {}", e)));
            exchange.normalize_id();

            let request = &exchange.request;
            let Some(service) =
                registry.get_service(request.type_name.as_deref(), request.service_id.as_deref())
            else {
                eprintln!(
                    "unroutable: {}",
                    conduit_dispatch::DispatchError::no_service(
                        request.type_name.as_deref(),
                        request.service_id.as_deref()
                    )
                );
                process::exit(1);
            };

            let routed = Pipeline::routing().run(&service, exchange).await;
            if routed.is_resolved() {
                eprintln!(
                    "unroutable: {}: {}",
                    routed.status().unwrap_or(Status::Error),
                    routed.response.error.as_deref().unwrap_or("no reason given")
                );
                process::exit(1);
            }
            print!("{}", explain(&service, &routed));
        }
    }
}

// ---------------------------------------------------------------------------
// Route explanation
// ---------------------------------------------------------------------------

fn explain(service: &Service, routed: &Exchange) -> String {
    let mut out = format!(
        "service   {}\nendpoint  {}\naction    {}\nscope     {}\n",
        service.id(),
        endpoint_label(service, routed.endpoint.as_deref()),
        routed.action_type,
        routed.scope()
    );

    if should_fan_out(routed) {
        let ids = routed.request.ids();
        out.push_str(&format!("fan-out   {} branch{}\n", ids.len(), if ids.len() == 1 { "" } else { "es" }));
        for id in ids {
            let branch = service.assign_endpoint(routed.branch(id.as_str()));
            let target = match branch.endpoint.as_deref() {
                Some(endpoint) => endpoint_label(service, Some(endpoint)),
                None => format!("unroutable ({})", branch.response.error.as_deref().unwrap_or("")),
            };
            out.push_str(&format!("  {}  ->  {}\n", id, target));
        }
    }
    out
}

/// The endpoint's id, or its position in resolution order.
fn endpoint_label(service: &Service, endpoint: Option<&Endpoint>) -> String {
    let Some(endpoint) = endpoint else {
        return "(none)".to_string();
    };
    let index = service
        .endpoints()
        .iter()
        .position(|e| std::ptr::eq(&**e, endpoint))
        .unwrap_or_default();
    endpoint.label(index)
}

// ---------------------------------------------------------------------------
// Stand-in resources
// ---------------------------------------------------------------------------

/// Answers every send with `noaction`. Never reached by these commands, but
/// every service needs a transporter to be built.
struct DryRun;

#[async_trait]
impl Transporter for DryRun {
    async fn send(&self, exchange: Exchange, _options: &Options) -> Exchange {
        exchange.fail(Status::NoAction, "dry run; nothing is sent")
    }
}

/// Stand-ins for every name `defs` refers to.
fn stand_ins(defs: &DefinitionsFile) -> Resources {
    let transporter: Arc<dyn Transporter> = Arc::new(DryRun);
    let mut resources = Resources::new();
    for name in defs.transporter_names() {
        resources = resources.with_transporter(name, transporter.clone());
    }
    for name in defs.authorizer_names() {
        resources = resources.with_authorizer(name, Arc::new(AllowAll));
    }
    for name in defs.mapper_names() {
        resources = resources.with_mapper(name, identity());
    }
    resources
}

fn build(defs: &DefinitionsFile) -> Result<MemoryRegistry, DefinitionError> {
    build_registry(defs, &stand_ins(defs), &DispatchConfig::default())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read from a file path, or from stdin if the path is `-`.
fn read_input(path: &PathBuf) -> String {
    if path.to_str() == Some("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .unwrap_or_else(|e| fatal(&format!("failed to read stdin: {}", e)));
        buf
    } else {
        fs::read_to_string(path)
            .unwrap_or_else(|e| fatal(&format!("failed to read {}: {}", path.display(), e)))
    }
}

fn load_definitions(path: &PathBuf) -> DefinitionsFile {
    parse_definitions(&read_input(path)).unwrap_or_else(|e| fatal(&e.to_string()))
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Print an error message to stderr and exit with code 2.
fn fatal(msg: &str) -> ! {
    eprintln!("conduit: {}", msg);
    process::exit(2);
}
