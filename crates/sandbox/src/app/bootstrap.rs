use std::env;
use std::path::{Path, PathBuf};

use tracing::info;
use tracing_subscriber::EnvFilter;

use super::scenario::{load_scenario, Scenario};
use super::SandboxError;

pub(crate) const ROOT_ENV_VAR: &str = "OVERWORLD_ROOT";
const DEFAULT_SCENARIO: &str = "assets/scenarios/ice_cave.json";

pub(crate) struct AppWiring {
    pub(crate) root: PathBuf,
    pub(crate) scenario_path: PathBuf,
    pub(crate) scenario: Scenario,
}

/// Usage: `overworld_sandbox [scenario.json]`. Without an argument the demo
/// scenario under the project root is used.
pub(crate) fn build_app() -> Result<AppWiring, SandboxError> {
    init_tracing();
    info!("=== Overworld Sandbox Startup ===");

    let root = resolve_root()?;
    let scenario_path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join(DEFAULT_SCENARIO));
    let scenario = load_scenario(&scenario_path)?;
    info!(
        root = %root.display(),
        scenario = %scenario_path.display(),
        level = %scenario.level.display(),
        movers = scenario.movers.len(),
        "scenario_loaded"
    );

    Ok(AppWiring {
        root,
        scenario_path,
        scenario,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn resolve_root() -> Result<PathBuf, SandboxError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => root_from_env(Path::new(&value)),
        Err(env::VarError::NotPresent) => env::current_dir().map_err(SandboxError::CurrentDir),
        Err(source) => Err(SandboxError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn root_from_env(path: &Path) -> Result<PathBuf, SandboxError> {
    if path.is_dir() {
        Ok(path.to_path_buf())
    } else {
        Err(SandboxError::InvalidRoot {
            var: ROOT_ENV_VAR,
            path: path.to_path_buf(),
        })
    }
}
