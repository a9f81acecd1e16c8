//! Compilation of a [`Circuit`] into its symbolic transition system.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use log::{debug, info};

use crate::aiger::{AndGate, Circuit, Literal};
use crate::error::{Error, Result};
use crate::manager::DdManager;

/// Bidirectional map between circuit variables and diagram variables,
/// plus the primed (next-state) copy of every latch.
#[derive(Debug, Clone)]
pub struct VarTable<V> {
    by_circuit: HashMap<u32, V>,
    by_handle: HashMap<V, u32>,
    primed: Vec<V>,
}

impl<V> Default for VarTable<V> {
    fn default() -> Self {
        Self {
            by_circuit: HashMap::new(),
            by_handle: HashMap::new(),
            primed: Vec::new(),
        }
    }
}

impl<V> VarTable<V>
where
    V: Copy + Eq + Hash,
{
    fn insert(&mut self, circuit_var: u32, v: V) {
        self.by_circuit.insert(circuit_var, v);
        self.by_handle.insert(v, circuit_var);
    }

    /// Diagram variable of the circuit variable with the given index.
    pub fn get(&self, circuit_var: u32) -> Option<V> {
        self.by_circuit.get(&circuit_var).copied()
    }

    /// Circuit variable index of a (non-primed) diagram variable.
    pub fn circuit_var(&self, v: V) -> Option<u32> {
        self.by_handle.get(&v).copied()
    }

    /// Primed variables, one per latch, in latch order.
    pub fn primed(&self) -> &[V] {
        &self.primed
    }
}

/// The symbolic transition system of a circuit.
///
/// The transition relation is kept implicit, as one next-state function per latch.
pub struct SymbolicModel<D: DdManager> {
    vars: VarTable<D::Var>,
    inputs: Vec<D::Var>,
    controlled: Vec<D::Var>,
    uncontrolled: Vec<D::Var>,
    latches: Vec<D::Var>,
    next_fns: Vec<D::Func>,
    error_fn: D::Func,
    init: D::Func,
    latch_cube: D::Func,
    primed_cube: D::Func,
    input_cube: D::Func,
    controlled_cube: D::Func,
    uncontrolled_cube: D::Func,
}

impl<D: DdManager> SymbolicModel<D> {
    pub fn vars(&self) -> &VarTable<D::Var> {
        &self.vars
    }
    pub fn inputs(&self) -> &[D::Var] {
        &self.inputs
    }
    pub fn controlled(&self) -> &[D::Var] {
        &self.controlled
    }
    pub fn uncontrolled(&self) -> &[D::Var] {
        &self.uncontrolled
    }
    /// Current-state variables, in latch order.
    pub fn latches(&self) -> &[D::Var] {
        &self.latches
    }
    pub fn primed(&self) -> &[D::Var] {
        self.vars.primed()
    }
    /// Next-state function of every latch, over current-state and input variables.
    pub fn next_fns(&self) -> &[D::Func] {
        &self.next_fns
    }
    /// The error condition, with all inputs quantified existentially.
    pub fn error_fn(&self) -> &D::Func {
        &self.error_fn
    }
    /// The initial state: every latch is 0.
    pub fn init(&self) -> &D::Func {
        &self.init
    }
    pub fn latch_cube(&self) -> &D::Func {
        &self.latch_cube
    }
    pub fn primed_cube(&self) -> &D::Func {
        &self.primed_cube
    }
    pub fn input_cube(&self) -> &D::Func {
        &self.input_cube
    }
    pub fn controlled_cube(&self) -> &D::Func {
        &self.controlled_cube
    }
    pub fn uncontrolled_cube(&self) -> &D::Func {
        &self.uncontrolled_cube
    }
}

/// Resolve `lit` against the functions computed so far.
///
/// Returns `None` if its variable has no function yet.
pub(crate) fn resolve<D: DdManager>(dd: &D, funcs: &[Option<D::Func>], lit: Literal) -> Result<Option<D::Func>> {
    if lit == Literal::FALSE {
        return Ok(Some(dd.zero()));
    }
    if lit == Literal::TRUE {
        return Ok(Some(dd.one()));
    }
    let Some(f) = funcs.get(lit.variable() as usize).and_then(|f| f.as_ref()) else {
        return Ok(None);
    };
    if lit.is_negated() {
        dd.not(f).map(Some)
    } else {
        Ok(Some(f.clone()))
    }
}

/// Like [`resolve`], but a missing function is a malformed circuit.
pub(crate) fn resolve_defined<D: DdManager>(
    dd: &D,
    funcs: &[Option<D::Func>],
    lit: Literal,
    what: &str,
) -> Result<D::Func> {
    resolve(dd, funcs, lit)?.ok_or_else(|| {
        Error::MalformedCircuit(format!("{} literal {} refers to an unresolved variable", what, lit))
    })
}

/// Evaluate every AND gate, in whatever order their operands become available.
///
/// `funcs` is indexed by circuit variable and must already hold the functions of all inputs
/// and latches. A gate function is released once its last consumer gate has been evaluated,
/// unless its variable is in `keep`.
pub(crate) fn resolve_gates<D: DdManager>(
    dd: &D,
    gates: &[AndGate],
    funcs: &mut [Option<D::Func>],
    keep: &HashSet<u32>,
) -> Result<()> {
    let gate_vars: HashSet<u32> = gates.iter().map(|g| g.output.variable()).collect();
    let mut uses: HashMap<u32, usize> = HashMap::new();
    for gate in gates {
        for lit in [gate.left, gate.right] {
            if gate_vars.contains(&lit.variable()) {
                *uses.entry(lit.variable()).or_default() += 1;
            }
        }
    }

    let mut queue: VecDeque<&AndGate> = gates.iter().collect();
    let mut stalled = 0;
    let mut requeued = 0;
    while let Some(gate) = queue.pop_front() {
        let left = resolve(dd, funcs, gate.left)?;
        let right = resolve(dd, funcs, gate.right)?;
        let (Some(left), Some(right)) = (left, right) else {
            queue.push_back(gate);
            requeued += 1;
            stalled += 1;
            if stalled >= queue.len() {
                return Err(Error::MalformedCircuit(format!(
                    "AND gate {} depends on itself or on an undefined variable",
                    gate.output
                )));
            }
            continue;
        };
        stalled = 0;

        funcs[gate.output.variable() as usize] = Some(dd.and(&left, &right)?);

        for lit in [gate.left, gate.right] {
            let v = lit.variable();
            if let Some(n) = uses.get_mut(&v) {
                *n -= 1;
                if *n == 0 && !keep.contains(&v) {
                    funcs[v as usize] = None;
                }
            }
        }
    }

    if requeued > 0 {
        debug!("Resolved {} AND gates ({} deferred)", gates.len(), requeued);
    }
    Ok(())
}

/// Build the symbolic transition system of `circuit`.
///
/// Variables are allocated in a fixed order: inputs, then latches, then one primed
/// variable per latch.
pub fn compile<D: DdManager>(circuit: &Circuit, dd: &D) -> Result<SymbolicModel<D>> {
    let mut vars = VarTable::default();
    let mut funcs: Vec<Option<D::Func>> = vec![None; circuit.max_var() as usize + 1];

    let mut inputs = Vec::with_capacity(circuit.inputs().len());
    for lit in circuit.inputs() {
        let v = dd.new_var();
        vars.insert(lit.variable(), v);
        funcs[lit.variable() as usize] = Some(dd.var(v)?);
        inputs.push(v);
    }

    let mut latches = Vec::with_capacity(circuit.latches().len());
    for latch in circuit.latches() {
        let v = dd.new_var();
        vars.insert(latch.state.variable(), v);
        funcs[latch.state.variable() as usize] = Some(dd.var(v)?);
        latches.push(v);
    }

    let keep: HashSet<u32> = circuit
        .latches()
        .iter()
        .map(|l| l.next.variable())
        .chain([circuit.output().variable()])
        .collect();
    resolve_gates(dd, circuit.gates(), &mut funcs, &keep)?;

    for _ in circuit.latches() {
        vars.primed.push(dd.new_var());
    }

    let next_fns = circuit
        .latches()
        .iter()
        .map(|latch| resolve_defined(dd, &funcs, latch.next, "next-state"))
        .collect::<Result<Vec<_>>>()?;

    let controlled: Vec<D::Var> = circuit.controlled_inputs().iter().map(|&i| inputs[i]).collect();
    let uncontrolled: Vec<D::Var> = circuit.uncontrolled_inputs().iter().map(|&i| inputs[i]).collect();

    let latch_cube = dd.cube(&latches)?;
    let primed_cube = dd.cube(vars.primed())?;
    let input_cube = dd.cube(&inputs)?;
    let controlled_cube = dd.cube(&controlled)?;
    let uncontrolled_cube = dd.cube(&uncontrolled)?;

    if circuit.output_depends_on_inputs() {
        debug!("Error condition depends on inputs, quantifying them existentially");
    }
    let output = resolve_defined(dd, &funcs, circuit.output(), "output")?;
    let error_fn = dd.exists(&output, &input_cube)?;
    drop(output);
    drop(funcs);

    let mut init = dd.one();
    for &v in &latches {
        let not_v = dd.not(&dd.var(v)?)?;
        init = dd.and(&init, &not_v)?;
    }

    info!(
        "Compiled model: {} inputs ({} controllable), {} latches, {} gates, error condition of {} nodes",
        inputs.len(),
        controlled.len(),
        latches.len(),
        circuit.gates().len(),
        dd.node_count(&error_fn)
    );

    Ok(SymbolicModel {
        vars,
        inputs,
        controlled,
        uncontrolled,
        latches,
        next_fns,
        error_fn,
        init,
        latch_cube,
        primed_cube,
        input_cube,
        controlled_cube,
        uncontrolled_cube,
    })
}
