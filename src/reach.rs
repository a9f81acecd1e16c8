//! Backward reachability: can an initial state reach an error state?

use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::manager::DdManager;
use crate::model::SymbolicModel;

/// How the one-step predecessor of a state set is computed.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum ImageMethod {
    /// Rename states to primed variables, substitute every primed variable by its
    /// next-state function, then quantify the inputs.
    #[default]
    Compose,
    /// Conjoin with the partitioned relation `primed_i <-> next_i`, quantifying each primed
    /// variable as soon as its conjunct is in, and the inputs with the last one.
    RelProduct,
}

/// Cooperative limits, checked between fixpoint rounds.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Budget {
    pub max_rounds: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn is_out_of_time(&self, start: Instant) -> bool {
        self.timeout.is_some_and(|t| start.elapsed() >= t)
    }

    fn is_exceeded(&self, rounds: usize, start: Instant) -> bool {
        self.max_rounds.is_some_and(|max| rounds >= max) || self.is_out_of_time(start)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Inconclusive {
    Timeout,
    ResourceExhausted,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Verdict {
    /// No error state is reachable from the initial state.
    Safe,
    /// Some error state is reachable from the initial state.
    Unsafe,
    Inconclusive(Inconclusive),
}

impl Display for Inconclusive {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Inconclusive::Timeout => write!(f, "timeout"),
            Inconclusive::ResourceExhausted => write!(f, "resources exhausted"),
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Safe => write!(f, "safe"),
            Verdict::Unsafe => write!(f, "unsafe"),
            Verdict::Inconclusive(reason) => write!(f, "inconclusive ({})", reason),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Report {
    pub verdict: Verdict,
    /// Number of preimage rounds performed.
    pub rounds: usize,
    /// For [`Verdict::Unsafe`]: latch values (in latch order, `-` for "any") of a state the initial
    /// state steps into on its way to an error, or of the initial state itself if it is an error.
    pub witness: Option<String>,
}

/// The transition relation of a model, in the representation a given [`ImageMethod`] needs.
pub struct Transition<'a, D: DdManager> {
    dd: &'a D,
    model: &'a SymbolicModel<D>,
    method: ImageMethod,
    /// `(primed_i <-> next_i, quantification cube)` for [`ImageMethod::RelProduct`].
    partitions: Vec<(D::Func, D::Func)>,
}

impl<'a, D: DdManager> Transition<'a, D> {
    pub fn new(dd: &'a D, model: &'a SymbolicModel<D>, method: ImageMethod) -> Result<Self> {
        let partitions = match method {
            ImageMethod::Compose => Vec::new(),
            ImageMethod::RelProduct => Self::partitions(dd, model)?,
        };
        Ok(Self {
            dd,
            model,
            method,
            partitions,
        })
    }

    fn partitions(dd: &D, model: &SymbolicModel<D>) -> Result<Vec<(D::Func, D::Func)>> {
        let n = model.primed().len();
        let mut partitions = Vec::with_capacity(n);
        for (i, (&p, next)) in model.primed().iter().zip(model.next_fns()).enumerate() {
            let relation = dd.biimp(&dd.var(p)?, next)?;
            let mut cube = dd.cube(&[p])?;
            if i + 1 == n {
                cube = dd.and(&cube, model.input_cube())?;
            }
            partitions.push((relation, cube));
        }
        Ok(partitions)
    }

    pub fn method(&self) -> ImageMethod {
        self.method
    }

    /// States with a successor in `states`, for some input.
    pub fn preimage(&self, states: &D::Func) -> Result<D::Func> {
        let dd = self.dd;
        let model = self.model;
        let rename: Vec<(D::Var, D::Var)> =
            model.latches().iter().copied().zip(model.primed().iter().copied()).collect();
        let primed = dd.substitute(states, &rename)?;

        match self.method {
            ImageMethod::Compose => {
                let subst: Vec<(D::Var, D::Func)> = model
                    .primed()
                    .iter()
                    .copied()
                    .zip(model.next_fns().iter().cloned())
                    .collect();
                let composed = dd.vector_compose(&primed, &subst)?;
                dd.exists(&composed, model.input_cube())
            }
            ImageMethod::RelProduct => {
                if self.partitions.is_empty() {
                    return dd.exists(&primed, model.input_cube());
                }
                let mut acc = primed;
                for (relation, cube) in &self.partitions {
                    acc = dd.and_exists(&acc, relation, cube)?;
                }
                Ok(acc)
            }
        }
    }

    /// Successors of `states`, for any input.
    pub fn image(&self, states: &D::Func) -> Result<D::Func> {
        let dd = self.dd;
        let model = self.model;
        let built;
        let partitions = if self.partitions.is_empty() {
            built = Self::partitions(dd, model)?;
            &built
        } else {
            &self.partitions
        };

        let mut acc = states.clone();
        for (relation, _) in partitions {
            acc = dd.and(&acc, relation)?;
        }
        let cube = dd.and(model.latch_cube(), model.input_cube())?;
        let next = dd.exists(&acc, &cube)?;

        let rename: Vec<(D::Var, D::Var)> =
            model.primed().iter().copied().zip(model.latches().iter().copied()).collect();
        dd.substitute(&next, &rename)
    }
}

/// Render one state of `states` as a latch bit-vector.
pub fn pick_state<D: DdManager>(dd: &D, model: &SymbolicModel<D>, states: &D::Func) -> Option<String> {
    let assignment = dd.pick_one(states)?;
    debug!(
        "Picked {}",
        assignment
            .iter()
            .filter_map(|&(v, value)| model.vars().circuit_var(v).map(|x| format!("x{}={}", x, value as u8)))
            .collect::<Vec<_>>()
            .join(" ")
    );
    let state = model
        .latches()
        .iter()
        .map(|v| match assignment.iter().find(|(u, _)| u == v) {
            Some((_, true)) => '1',
            Some((_, false)) => '0',
            None => '-',
        })
        .collect();
    Some(state)
}

/// Backward fixpoint from the error states.
///
/// After round `k`, `visited` holds exactly the states that reach an error in at most `k` steps
/// and `frontier` those that need exactly `k`.
pub struct BackwardReachability<'a, D: DdManager> {
    dd: &'a D,
    model: &'a SymbolicModel<D>,
    transition: Transition<'a, D>,
    visited: D::Func,
    frontier: D::Func,
    /// Frontier the previous round started from.
    target: Option<D::Func>,
    round: usize,
    started: bool,
}

impl<'a, D: DdManager> BackwardReachability<'a, D> {
    pub fn new(dd: &'a D, model: &'a SymbolicModel<D>, method: ImageMethod) -> Result<Self> {
        Ok(Self {
            dd,
            model,
            transition: Transition::new(dd, model, method)?,
            visited: model.error_fn().clone(),
            frontier: model.error_fn().clone(),
            target: None,
            round: 0,
            started: false,
        })
    }

    pub fn visited(&self) -> &D::Func {
        &self.visited
    }
    pub fn frontier(&self) -> &D::Func {
        &self.frontier
    }
    pub fn round(&self) -> usize {
        self.round
    }

    /// Perform the next round; the first call only inspects the error states themselves.
    ///
    /// Returns the verdict once it is decided.
    pub fn step(&mut self) -> Result<Option<Verdict>> {
        let dd = self.dd;

        if !self.started {
            self.started = true;
            if !dd.is_zero(&dd.and(&self.frontier, self.model.init())?) {
                return Ok(Some(Verdict::Unsafe));
            }
            if dd.is_zero(&self.frontier) {
                return Ok(Some(Verdict::Safe));
            }
            return Ok(None);
        }

        let previous = self.transition.preimage(&self.frontier)?;
        self.round += 1;

        if !dd.is_zero(&dd.and(&previous, self.model.init())?) {
            self.target = Some(self.frontier.clone());
            return Ok(Some(Verdict::Unsafe));
        }

        let new = dd.and(&previous, &dd.not(&self.visited)?)?;
        drop(previous);
        if dd.is_zero(&new) {
            return Ok(Some(Verdict::Safe));
        }

        self.visited = dd.or(&self.visited, &new)?;
        self.frontier = new;
        Ok(None)
    }

    fn witness(&self) -> Result<Option<String>> {
        let dd = self.dd;
        let states = match &self.target {
            None => dd.and(self.model.error_fn(), self.model.init())?,
            Some(target) => {
                let successors = self.transition.image(self.model.init())?;
                dd.and(&successors, target)?
            }
        };
        Ok(pick_state(dd, self.model, &states))
    }

    fn run_(&mut self, budget: &Budget) -> Result<Verdict> {
        let start = Instant::now();
        loop {
            if self.started && budget.is_exceeded(self.round, start) {
                info!("Budget exhausted after {} rounds", self.round);
                return Ok(Verdict::Inconclusive(Inconclusive::Timeout));
            }
            if let Some(verdict) = self.step()? {
                return Ok(verdict);
            }
            debug!(
                "Round {}: frontier of {} nodes, {} states visited",
                self.round,
                self.dd.node_count(&self.frontier),
                self.dd.sat_count(&self.visited, self.model.latches())
            );
        }
    }

    /// Run rounds until the verdict is decided or `budget` runs out.
    ///
    /// Running out of diagram resources is reported as [`Inconclusive::ResourceExhausted`].
    pub fn run(mut self, budget: &Budget) -> Result<Report> {
        let verdict = match self.run_(budget) {
            Ok(verdict) => verdict,
            Err(Error::ResourceExhausted(e)) => {
                warn!("Giving up after {} rounds: {}", self.round, e);
                Verdict::Inconclusive(Inconclusive::ResourceExhausted)
            }
            Err(e) => return Err(e),
        };

        let witness = if verdict == Verdict::Unsafe {
            self.witness().unwrap_or_else(|e| {
                warn!("Cannot extract a witness state: {}", e);
                None
            })
        } else {
            None
        };

        info!("Verdict: {} after {} rounds", verdict, self.round);
        Ok(Report {
            verdict,
            rounds: self.round,
            witness,
        })
    }
}

/// Decide whether an error state of `model` is reachable from its initial state.
pub fn check<D: DdManager>(dd: &D, model: &SymbolicModel<D>, method: ImageMethod, budget: &Budget) -> Result<Report> {
    let reach = match BackwardReachability::new(dd, model, method) {
        Ok(reach) => reach,
        Err(Error::ResourceExhausted(e)) => {
            warn!("Cannot build the transition relation: {}", e);
            return Ok(Report {
                verdict: Verdict::Inconclusive(Inconclusive::ResourceExhausted),
                rounds: 0,
                witness: None,
            });
        }
        Err(e) => return Err(e),
    };
    reach.run(budget)
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::aiger::parse;
    use crate::manager::Manager;
    use crate::model::compile;

    const TOGGLE: &str = "aag 1 0 1 1 0\n2 3\n2\n";
    const COUNTER: &str = "aag 5 0 2 1 3\n2 3\n4 10\n6\n6 2 4\n8 3 5\n10 7 9\n";

    fn run(text: &str, method: ImageMethod) -> Report {
        let circuit = parse(text).unwrap();
        let dd = Manager::default();
        let model = compile(&circuit, &dd).unwrap();
        check(&dd, &model, method, &Budget::unlimited()).unwrap()
    }

    #[test]
    fn test_toggle_is_unsafe_after_one_round() {
        for method in [ImageMethod::Compose, ImageMethod::RelProduct] {
            let report = run(TOGGLE, method);
            assert_eq!(report.verdict, Verdict::Unsafe);
            assert_eq!(report.rounds, 1);
            assert_eq!(report.witness.as_deref(), Some("1"));
        }
    }

    #[test]
    fn test_false_error_is_safe_at_round_zero() {
        let report = run("aag 1 0 1 1 0\n2 3\n0\n", ImageMethod::Compose);
        assert_eq!(report.verdict, Verdict::Safe);
        assert_eq!(report.rounds, 0);
        assert_eq!(report.witness, None);
    }

    #[test]
    fn test_initial_error_is_unsafe_at_round_zero() {
        // Identity transition, error = initial state.
        let report = run("aag 1 0 1 1 0\n2 2\n3\n", ImageMethod::Compose);
        assert_eq!(report.verdict, Verdict::Unsafe);
        assert_eq!(report.rounds, 0);
        assert_eq!(report.witness.as_deref(), Some("0"));
    }

    #[test]
    fn test_counter_reaches_three() {
        for method in [ImageMethod::Compose, ImageMethod::RelProduct] {
            let report = run(COUNTER, method);
            assert_eq!(report.verdict, Verdict::Unsafe);
            assert_eq!(report.rounds, 3);
            // The initial state 00 steps into c0=1, c1=0.
            assert_eq!(report.witness.as_deref(), Some("10"));
        }
    }

    #[test]
    fn test_stuck_latch_is_safe() {
        // c0' = ~c0, c1' = c1 ∧ c0, error = c1.
        let text = "aag 3 0 2 1 1\n2 3\n4 6\n4\n6 4 2\n";
        for method in [ImageMethod::Compose, ImageMethod::RelProduct] {
            let report = run(text, method);
            assert_eq!(report.verdict, Verdict::Safe);
            assert_eq!(report.rounds, 1);
        }
    }

    #[test]
    fn test_image_methods_agree_on_preimages() {
        let circuit = parse(COUNTER).unwrap();
        let dd = Manager::default();
        let model = compile(&circuit, &dd).unwrap();
        let compose = Transition::new(&dd, &model, ImageMethod::Compose).unwrap();
        let relprod = Transition::new(&dd, &model, ImageMethod::RelProduct).unwrap();

        let c0 = dd.var(model.latches()[0]).unwrap();
        let c1 = dd.var(model.latches()[1]).unwrap();
        for states in [c0.clone(), c1.clone(), dd.xor(&c0, &c1).unwrap(), dd.one(), dd.zero()] {
            assert_eq!(compose.preimage(&states).unwrap(), relprod.preimage(&states).unwrap());
        }
    }

    #[test]
    fn test_image_of_initial_state() {
        let circuit = parse(COUNTER).unwrap();
        let dd = Manager::default();
        let model = compile(&circuit, &dd).unwrap();
        let transition = Transition::new(&dd, &model, ImageMethod::Compose).unwrap();

        let next = transition.image(model.init()).unwrap();
        let c0 = dd.var(model.latches()[0]).unwrap();
        let c1 = dd.var(model.latches()[1]).unwrap();
        assert_eq!(next, dd.and(&c0, &dd.not(&c1).unwrap()).unwrap());
    }

    #[test]
    fn test_visited_grows_monotonically() {
        let circuit = parse(COUNTER).unwrap();
        let dd = Manager::default();
        let model = compile(&circuit, &dd).unwrap();
        let mut reach = BackwardReachability::new(&dd, &model, ImageMethod::Compose).unwrap();

        let mut previous = reach.visited().clone();
        while reach.step().unwrap().is_none() {
            let current = reach.visited().clone();
            // previous ⊆ current
            assert!(dd.is_zero(&dd.and(&previous, &dd.not(&current).unwrap()).unwrap()));
            previous = current;
        }
    }

    #[test]
    fn test_round_budget() {
        let circuit = parse(COUNTER).unwrap();
        let dd = Manager::default();
        let model = compile(&circuit, &dd).unwrap();

        let report = check(&dd, &model, ImageMethod::Compose, &Budget::unlimited().with_max_rounds(2)).unwrap();
        assert_eq!(report.verdict, Verdict::Inconclusive(Inconclusive::Timeout));
        assert_eq!(report.rounds, 2);

        let budget = Budget::unlimited().with_timeout(Duration::ZERO);
        let report = check(&dd, &model, ImageMethod::Compose, &budget).unwrap();
        assert_eq!(report.verdict, Verdict::Inconclusive(Inconclusive::Timeout));
        assert_eq!(report.rounds, 0);
    }

    #[test]
    fn test_budget_does_not_hide_round_zero() {
        let circuit = parse("aag 1 0 1 1 0\n2 2\n3\n").unwrap();
        let dd = Manager::default();
        let model = compile(&circuit, &dd).unwrap();
        let report = check(&dd, &model, ImageMethod::Compose, &Budget::unlimited().with_max_rounds(0)).unwrap();
        assert_eq!(report.verdict, Verdict::Unsafe);
    }
}
