//! Validation of a claimed winning region (inductive invariant) of a strategy.
//!
//! A region `W` over the strategy's latches is a valid certificate iff
//! - the initial state is in `W`,
//! - no state of `W` is an error state,
//! - no state of `W` has a successor outside `W`.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::time::Instant;

use log::{debug, info, warn};

use crate::aiger::Circuit;
use crate::error::{Error, Result};
use crate::manager::DdManager;
use crate::model::{resolve_defined, resolve_gates, SymbolicModel};
use crate::reach::{Budget, ImageMethod, Inconclusive, Transition};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegionVerdict {
    Valid,
    InitNotInRegion,
    RegionContainsError,
    NotInductive,
    Inconclusive(Inconclusive),
}

impl Display for RegionVerdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionVerdict::Valid => write!(f, "valid"),
            RegionVerdict::InitNotInRegion => write!(f, "initial state not in region"),
            RegionVerdict::RegionContainsError => write!(f, "region contains an error state"),
            RegionVerdict::NotInductive => write!(f, "region is not inductive"),
            RegionVerdict::Inconclusive(reason) => write!(f, "inconclusive ({})", reason),
        }
    }
}

/// The predicate encoded by the output of `candidate`, whose `i`-th input stands for
/// the `i`-th latch of the strategy.
pub fn load_region<D: DdManager>(dd: &D, model: &SymbolicModel<D>, candidate: &Circuit) -> Result<D::Func> {
    if !candidate.is_combinational() {
        return Err(Error::MalformedCircuit(format!(
            "winning region circuit must be combinational, it has {} latches",
            candidate.latches().len()
        )));
    }
    if candidate.inputs().len() > model.latches().len() {
        return Err(Error::MalformedCircuit(format!(
            "winning region circuit has {} inputs, but the strategy only has {} latches",
            candidate.inputs().len(),
            model.latches().len()
        )));
    }

    let mut funcs: Vec<Option<D::Func>> = vec![None; candidate.max_var() as usize + 1];
    for (lit, &v) in candidate.inputs().iter().zip(model.latches()) {
        funcs[lit.variable() as usize] = Some(dd.var(v)?);
    }
    let keep = HashSet::from([candidate.output().variable()]);
    resolve_gates(dd, candidate.gates(), &mut funcs, &keep)?;

    let region = resolve_defined(dd, &funcs, candidate.output(), "output")?;
    debug!("Winning region of {} nodes", dd.node_count(&region));
    Ok(region)
}

/// Check `region` against the initial state, the error states and the transitions of `model`.
pub fn validate_region<D: DdManager>(
    dd: &D,
    model: &SymbolicModel<D>,
    region: &D::Func,
    method: ImageMethod,
    budget: &Budget,
) -> Result<RegionVerdict> {
    let start = Instant::now();

    if dd.is_zero(&dd.and(region, model.init())?) {
        return Ok(RegionVerdict::InitNotInRegion);
    }
    if !dd.is_zero(&dd.and(region, model.error_fn())?) {
        return Ok(RegionVerdict::RegionContainsError);
    }
    if dd.is_one(region) {
        return Ok(RegionVerdict::Valid);
    }
    if budget.is_out_of_time(start) {
        return Ok(RegionVerdict::Inconclusive(Inconclusive::Timeout));
    }

    let transition = Transition::new(dd, model, method)?;
    let losing = dd.not(region)?;
    let escaping = transition.preimage(&losing)?;
    if !dd.is_zero(&dd.and(&escaping, region)?) {
        return Ok(RegionVerdict::NotInductive);
    }

    Ok(RegionVerdict::Valid)
}

/// Load the region encoded by `candidate` and validate it.
///
/// Running out of diagram resources is reported as [`Inconclusive::ResourceExhausted`].
pub fn validate<D: DdManager>(
    dd: &D,
    model: &SymbolicModel<D>,
    candidate: &Circuit,
    method: ImageMethod,
    budget: &Budget,
) -> Result<RegionVerdict> {
    let result =
        load_region(dd, model, candidate).and_then(|region| validate_region(dd, model, &region, method, budget));
    let verdict = match result {
        Ok(verdict) => verdict,
        Err(Error::ResourceExhausted(e)) => {
            warn!("Giving up on the winning region: {}", e);
            RegionVerdict::Inconclusive(Inconclusive::ResourceExhausted)
        }
        Err(e) => return Err(e),
    };
    info!("Winning region: {}", verdict);
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use test_log::test;

    use crate::aiger::parse;
    use crate::manager::Manager;
    use crate::model::compile;

    const TOGGLE: &str = "aag 1 0 1 1 0\n2 3\n2\n";
    const STUCK: &str = "aag 3 0 2 1 1\n2 3\n4 6\n4\n6 4 2\n";

    fn region_verdict(strategy: &str, region: &str) -> RegionVerdict {
        let dd = Manager::default();
        let model = compile(&parse(strategy).unwrap(), &dd).unwrap();
        validate(&dd, &model, &parse(region).unwrap(), ImageMethod::Compose, &Budget::unlimited()).unwrap()
    }

    #[test]
    fn test_negated_error_of_toggle() {
        let dd = Manager::default();
        let model = compile(&parse(TOGGLE).unwrap(), &dd).unwrap();
        let region = dd.not(model.error_fn()).unwrap();

        // Inductiveness by hand: ¬W = s, its predecessors are the states stepping to s, i.e. ¬s.
        let s = dd.var(model.latches()[0]).unwrap();
        let not_s = dd.not(&s).unwrap();
        assert_eq!(region, not_s);
        let (latch, primed) = (model.latches()[0], model.primed()[0]);
        let s_primed = dd.substitute(&s, &[(latch, primed)]).unwrap();
        let escaping = dd
            .vector_compose(&s_primed, &[(primed, model.next_fns()[0].clone())])
            .unwrap();
        assert_eq!(escaping, not_s);
        assert!(!dd.is_zero(&dd.and(&escaping, &region).unwrap()));

        for method in [ImageMethod::Compose, ImageMethod::RelProduct] {
            let verdict = validate_region(&dd, &model, &region, method, &Budget::unlimited()).unwrap();
            assert_eq!(verdict, RegionVerdict::NotInductive);
        }
    }

    #[test]
    fn test_negated_error_of_safe_strategy() {
        let dd = Manager::default();
        let model = compile(&parse(STUCK).unwrap(), &dd).unwrap();
        let region = dd.not(model.error_fn()).unwrap();
        for method in [ImageMethod::Compose, ImageMethod::RelProduct] {
            let verdict = validate_region(&dd, &model, &region, method, &Budget::unlimited()).unwrap();
            assert_eq!(verdict, RegionVerdict::Valid);
        }
    }

    #[test]
    fn test_constant_regions() {
        assert_eq!(region_verdict(TOGGLE, "aag 0 0 0 1 0\n0\n"), RegionVerdict::InitNotInRegion);
        assert_eq!(region_verdict(TOGGLE, "aag 0 0 0 1 0\n1\n"), RegionVerdict::RegionContainsError);
        // A strategy whose error output is constant false.
        assert_eq!(region_verdict("aag 1 0 1 1 0\n2 3\n0\n", "aag 0 0 0 1 0\n1\n"), RegionVerdict::Valid);
    }

    #[test]
    fn test_region_from_circuit() {
        // W = ¬c1, with inputs standing for (c0, c1).
        assert_eq!(region_verdict(STUCK, "aag 2 2 0 1 0\n2\n4\n5\n"), RegionVerdict::Valid);
        // W = ¬c0 ∧ ¬c1 excludes the state 10 the initial state steps into.
        assert_eq!(region_verdict(STUCK, "aag 3 2 0 1 1\n2\n4\n6\n6 3 5\n"), RegionVerdict::NotInductive);
        // The region of the toggle, through a gate: W = ¬s ∧ ¬s.
        assert_eq!(region_verdict(TOGGLE, "aag 2 1 0 1 1\n2\n4\n4 3 3\n"), RegionVerdict::NotInductive);
    }

    #[test]
    fn test_zero_timeout_is_inconclusive() {
        let dd = Manager::default();
        let model = compile(&parse(STUCK).unwrap(), &dd).unwrap();
        let region = dd.not(model.error_fn()).unwrap();
        let budget = Budget::unlimited().with_timeout(Duration::ZERO);
        let verdict = validate_region(&dd, &model, &region, ImageMethod::Compose, &budget).unwrap();
        assert_eq!(verdict, RegionVerdict::Inconclusive(Inconclusive::Timeout));

        // Cheap verdicts are still given.
        let verdict = validate_region(&dd, &model, &dd.zero(), ImageMethod::Compose, &budget).unwrap();
        assert_eq!(verdict, RegionVerdict::InitNotInRegion);
    }

    #[test]
    fn test_region_shape_errors() {
        let dd = Manager::default();
        let model = compile(&parse(TOGGLE).unwrap(), &dd).unwrap();

        let sequential = parse("aag 1 0 1 1 0\n2 3\n2\n").unwrap();
        let result = validate(&dd, &model, &sequential, ImageMethod::Compose, &Budget::unlimited());
        assert!(matches!(result, Err(Error::MalformedCircuit(_))));

        let too_wide = parse("aag 2 2 0 1 0\n2\n4\n2\n").unwrap();
        let result = validate(&dd, &model, &too_wide, ImageMethod::Compose, &Budget::unlimited());
        assert!(matches!(result, Err(Error::MalformedCircuit(_))));
    }
}
