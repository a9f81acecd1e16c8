//! Entry points: file paths and a time budget in, verdict out.
//!
//! Each call owns a fresh [`Manager`], dropped at the end of the run.

use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};

use crate::aiger::Circuit;
use crate::bdd::BddConfig;
use crate::error::{Error, Result};
use crate::manager::Manager;
use crate::model::compile;
use crate::reach::{check, Budget, ImageMethod, Inconclusive, Report, Verdict};
use crate::region::{validate, RegionVerdict};

/// Everything a verification run can be tuned with.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct CheckConfig {
    pub bdd: BddConfig,
    pub image: ImageMethod,
    pub budget: Budget,
}

impl CheckConfig {
    /// Default configuration with a wall-clock limit of `timeout_seconds`.
    pub fn with_timeout_seconds(timeout_seconds: u64) -> Self {
        Self {
            budget: Budget::unlimited().with_timeout(Duration::from_secs(timeout_seconds)),
            ..Self::default()
        }
    }
}

fn log_cache(dd: &Manager) {
    let bdd = dd.bdd();
    debug!(
        "{} live nodes, computed table: {} hits, {} misses",
        bdd.num_nodes(),
        bdd.cache_hits(),
        bdd.cache_misses()
    );
}

fn exhausted(rounds: usize) -> Report {
    Report {
        verdict: Verdict::Inconclusive(Inconclusive::ResourceExhausted),
        rounds,
        witness: None,
    }
}

/// Check whether an error state of `circuit` is reachable from its initial state.
pub fn check_circuit(circuit: &Circuit, config: &CheckConfig) -> Result<Report> {
    let dd = Manager::try_new(config.bdd)?;
    let model = match compile(circuit, &dd) {
        Ok(model) => model,
        Err(Error::ResourceExhausted(e)) => {
            warn!("Cannot compile the circuit: {}", e);
            return Ok(exhausted(0));
        }
        Err(e) => return Err(e),
    };
    let report = check(&dd, &model, config.image, &config.budget)?;
    log_cache(&dd);
    Ok(report)
}

/// [`check_safety`] with full control over the configuration.
pub fn check_safety_with(path: impl AsRef<Path>, config: &CheckConfig) -> Result<Report> {
    let path = path.as_ref();
    let circuit = Circuit::read(path)?;
    info!(
        "Checking '{}': {} inputs, {} latches, {} gates",
        path.display(),
        circuit.inputs().len(),
        circuit.latches().len(),
        circuit.gates().len()
    );
    check_circuit(&circuit, config)
}

/// Decide whether the circuit at `path` is safe, giving up after `timeout_seconds`.
pub fn check_safety(path: impl AsRef<Path>, timeout_seconds: u64) -> Result<Verdict> {
    let report = check_safety_with(path, &CheckConfig::with_timeout_seconds(timeout_seconds))?;
    Ok(report.verdict)
}

/// Validate the winning region `region` of the already parsed `strategy`.
pub fn validate_circuits(strategy: &Circuit, region: &Circuit, config: &CheckConfig) -> Result<RegionVerdict> {
    let dd = Manager::try_new(config.bdd)?;
    let model = match compile(strategy, &dd) {
        Ok(model) => model,
        Err(Error::ResourceExhausted(e)) => {
            warn!("Cannot compile the strategy: {}", e);
            return Ok(RegionVerdict::Inconclusive(Inconclusive::ResourceExhausted));
        }
        Err(e) => return Err(e),
    };
    let verdict = validate(&dd, &model, region, config.image, &config.budget)?;
    log_cache(&dd);
    Ok(verdict)
}

/// [`validate_winning_region`] with full control over the configuration.
pub fn validate_winning_region_with(
    strategy_path: impl AsRef<Path>,
    region_path: impl AsRef<Path>,
    config: &CheckConfig,
) -> Result<RegionVerdict> {
    let strategy = Circuit::read(strategy_path.as_ref())?;
    let region = Circuit::read(region_path.as_ref())?;
    info!(
        "Validating winning region '{}' of '{}'",
        region_path.as_ref().display(),
        strategy_path.as_ref().display()
    );
    validate_circuits(&strategy, &region, config)
}

/// Validate the winning region at `region_path` of the strategy at `strategy_path`.
pub fn validate_winning_region(
    strategy_path: impl AsRef<Path>,
    region_path: impl AsRef<Path>,
    timeout_seconds: u64,
) -> Result<RegionVerdict> {
    validate_winning_region_with(
        strategy_path,
        region_path,
        &CheckConfig::with_timeout_seconds(timeout_seconds),
    )
}
