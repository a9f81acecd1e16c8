//! Decision diagram capability interface and its reference-counted BDD backend.
//!
//! The reachability engine and the region validator are written against [`DdManager`],
//! so they never touch node indices or reference counts directly.
//! [`Manager`] implements it on top of [`Bdd`]: every [`Func`] it hands out holds one external
//! reference to its root, released when the handle is dropped. Operations borrow their operands;
//! to consume an intermediate result, move it into a scope that drops it.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use log::debug;
use num_bigint::BigUint;

use crate::bdd::{Bdd, BddConfig, BddError, BddResult};
use crate::error::Result;
use crate::reference::Ref;

/// The operations a decision diagram package must provide.
///
/// Every operation that may allocate returns [`Error::ResourceExhausted`](crate::error::Error::ResourceExhausted)
/// when the backend runs out of room.
pub trait DdManager {
    /// Handle for a diagram variable.
    type Var: Copy + Eq + Hash + Debug;
    /// Handle for a Boolean function. Equal handles denote equal functions.
    type Func: Clone + Eq + Debug;

    fn one(&self) -> Self::Func;
    fn zero(&self) -> Self::Func;

    /// Allocate a fresh variable, placed below all existing ones in the order.
    fn new_var(&self) -> Self::Var;
    /// The projection function of `v`.
    fn var(&self, v: Self::Var) -> Result<Self::Func>;

    fn is_zero(&self, f: &Self::Func) -> bool;
    fn is_one(&self, f: &Self::Func) -> bool;

    fn not(&self, f: &Self::Func) -> Result<Self::Func>;
    fn and(&self, f: &Self::Func, g: &Self::Func) -> Result<Self::Func>;
    fn or(&self, f: &Self::Func, g: &Self::Func) -> Result<Self::Func>;
    fn xor(&self, f: &Self::Func, g: &Self::Func) -> Result<Self::Func>;
    /// `f <-> g`
    fn biimp(&self, f: &Self::Func, g: &Self::Func) -> Result<Self::Func>;

    /// Conjunction of the positive literals of `vars`.
    fn cube(&self, vars: &[Self::Var]) -> Result<Self::Func>;
    /// `∃cube. f`
    fn exists(&self, f: &Self::Func, cube: &Self::Func) -> Result<Self::Func>;
    /// `∃cube. f ∧ g`
    fn and_exists(&self, f: &Self::Func, g: &Self::Func, cube: &Self::Func) -> Result<Self::Func>;
    /// Simultaneous renaming `from_i := to_i`.
    fn substitute(&self, f: &Self::Func, pairs: &[(Self::Var, Self::Var)]) -> Result<Self::Func>;
    /// Simultaneous substitution `v_i := g_i`.
    fn vector_compose(&self, f: &Self::Func, subst: &[(Self::Var, Self::Func)]) -> Result<Self::Func>;

    /// One satisfying assignment, restricted to the variables it constrains.
    fn pick_one(&self, f: &Self::Func) -> Option<Vec<(Self::Var, bool)>>;
    /// Number of assignments to `vars` satisfying `f`, which must only depend on `vars`.
    fn sat_count(&self, f: &Self::Func, vars: &[Self::Var]) -> BigUint;
    /// Number of nodes of `f`.
    fn node_count(&self, f: &Self::Func) -> usize;

    /// Conjunction of all `funcs`.
    fn and_all<'a, I>(&self, funcs: I) -> Result<Self::Func>
    where
        I: IntoIterator<Item = &'a Self::Func>,
        Self::Func: 'a,
    {
        let mut res = self.one();
        for f in funcs {
            res = self.and(&res, f)?;
        }
        Ok(res)
    }
}

/// BDD-backed [`DdManager`].
#[derive(Debug, Clone)]
pub struct Manager {
    bdd: Rc<Bdd>,
}

/// Reference-counted handle to a BDD function of a [`Manager`].
pub struct Func {
    bdd: Rc<Bdd>,
    node: Ref,
}

impl Func {
    pub fn node(&self) -> Ref {
        self.node
    }
}

impl Clone for Func {
    fn clone(&self) -> Self {
        self.bdd.ref_node(self.node);
        Self {
            bdd: Rc::clone(&self.bdd),
            node: self.node,
        }
    }
}

impl Drop for Func {
    fn drop(&mut self) {
        self.bdd.deref_node(self.node);
    }
}

impl PartialEq for Func {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.bdd, &other.bdd) && self.node == other.node
    }
}

impl Eq for Func {}

impl Debug for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Func({})", self.node)
    }
}

impl Default for Manager {
    fn default() -> Self {
        Manager::new(BddConfig::default())
    }
}

impl Manager {
    /// # Panics
    ///
    /// Panics if `config` does not pass [`BddConfig::validate`], see [`Manager::try_new`].
    pub fn new(config: BddConfig) -> Self {
        Self {
            bdd: Rc::new(Bdd::new(config)),
        }
    }

    pub fn try_new(config: BddConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    fn wrap(&self, node: Ref) -> Func {
        self.bdd.ref_node(node);
        Func {
            bdd: Rc::clone(&self.bdd),
            node,
        }
    }

    fn node(&self, f: &Func) -> Ref {
        assert!(Rc::ptr_eq(&self.bdd, &f.bdd), "Func belongs to another manager");
        f.node
    }

    /// Run `op`; when the node table overflows, collect garbage and run it once more.
    fn run(&self, op: impl Fn(&Bdd) -> BddResult<Ref>) -> Result<Func> {
        let node = match op(&self.bdd) {
            Ok(node) => node,
            Err(BddError::Overflow { capacity }) => {
                let freed = self.bdd.collect_garbage();
                debug!(
                    "Node table overflow (capacity {}), freed {} nodes, retrying",
                    capacity, freed
                );
                op(&self.bdd)?
            }
        };
        Ok(self.wrap(node))
    }

    pub fn collect_garbage(&self) -> usize {
        self.bdd.collect_garbage()
    }

    /// Render the given functions in DOT format.
    pub fn to_dot(&self, funcs: &[&Func]) -> Result<String, std::fmt::Error> {
        let roots: Vec<Ref> = funcs.iter().map(|f| self.node(f)).collect();
        self.bdd.to_dot(&roots)
    }
}

impl DdManager for Manager {
    type Var = u32;
    type Func = Func;

    fn one(&self) -> Func {
        self.wrap(self.bdd.one)
    }
    fn zero(&self) -> Func {
        self.wrap(self.bdd.zero)
    }

    fn new_var(&self) -> u32 {
        self.bdd.new_var()
    }
    fn var(&self, v: u32) -> Result<Func> {
        self.run(|bdd| bdd.mk_var(v))
    }

    fn is_zero(&self, f: &Func) -> bool {
        self.bdd.is_zero(self.node(f))
    }
    fn is_one(&self, f: &Func) -> bool {
        self.bdd.is_one(self.node(f))
    }

    fn not(&self, f: &Func) -> Result<Func> {
        Ok(self.wrap(-self.node(f)))
    }
    fn and(&self, f: &Func, g: &Func) -> Result<Func> {
        let (f, g) = (self.node(f), self.node(g));
        self.run(|bdd| bdd.apply_and(f, g))
    }
    fn or(&self, f: &Func, g: &Func) -> Result<Func> {
        let (f, g) = (self.node(f), self.node(g));
        self.run(|bdd| bdd.apply_or(f, g))
    }
    fn xor(&self, f: &Func, g: &Func) -> Result<Func> {
        let (f, g) = (self.node(f), self.node(g));
        self.run(|bdd| bdd.apply_xor(f, g))
    }
    fn biimp(&self, f: &Func, g: &Func) -> Result<Func> {
        let (f, g) = (self.node(f), self.node(g));
        self.run(|bdd| bdd.apply_eq(f, g))
    }

    fn cube(&self, vars: &[u32]) -> Result<Func> {
        self.run(|bdd| bdd.cube(vars.iter().map(|&v| v as i32)))
    }
    fn exists(&self, f: &Func, cube: &Func) -> Result<Func> {
        let (f, cube) = (self.node(f), self.node(cube));
        self.run(|bdd| bdd.exists(f, cube))
    }
    fn and_exists(&self, f: &Func, g: &Func, cube: &Func) -> Result<Func> {
        let (f, g, cube) = (self.node(f), self.node(g), self.node(cube));
        self.run(|bdd| bdd.rel_product(f, g, cube))
    }
    fn substitute(&self, f: &Func, pairs: &[(u32, u32)]) -> Result<Func> {
        let f = self.node(f);
        let perm: HashMap<u32, u32> = pairs.iter().copied().collect();
        self.run(|bdd| bdd.rename(f, &perm))
    }
    fn vector_compose(&self, f: &Func, subst: &[(u32, Func)]) -> Result<Func> {
        let f = self.node(f);
        let subst: HashMap<u32, Ref> = subst.iter().map(|(v, g)| (*v, self.node(g))).collect();
        self.run(|bdd| bdd.vector_compose(f, &subst))
    }

    fn pick_one(&self, f: &Func) -> Option<Vec<(u32, bool)>> {
        let path = self.bdd.one_sat(self.node(f))?;
        Some(path.into_iter().map(|lit| (lit.unsigned_abs(), lit > 0)).collect())
    }
    fn sat_count(&self, f: &Func, vars: &[u32]) -> BigUint {
        let total = self.bdd.num_vars() as usize;
        let count = self.bdd.sat_count(self.node(f), total);
        count >> (total - vars.len())
    }
    fn node_count(&self, f: &Func) -> usize {
        self.bdd.size(self.node(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::error::Error;

    #[test]
    fn test_handles_track_references() {
        let m = Manager::default();
        let x = m.var(m.new_var()).unwrap();
        let node = x.node();
        assert_eq!(m.bdd().ref_count(node), 1);

        let y = x.clone();
        assert_eq!(m.bdd().ref_count(node), 2);
        assert_eq!(x, y);

        drop(x);
        assert_eq!(m.bdd().ref_count(node), 1);
        drop(y);
        assert_eq!(m.bdd().ref_count(node), 0);
    }

    #[test]
    fn test_basic_algebra() {
        let m = Manager::default();
        let x = m.var(m.new_var()).unwrap();
        let y = m.var(m.new_var()).unwrap();

        let f = m.and(&x, &y).unwrap();
        let nf = m.not(&f).unwrap();
        let g = m.or(&m.not(&x).unwrap(), &m.not(&y).unwrap()).unwrap();
        assert_eq!(nf, g);

        assert!(m.is_zero(&m.and(&f, &nf).unwrap()));
        assert!(m.is_one(&m.or(&f, &nf).unwrap()));
        assert!(m.is_one(&m.biimp(&f, &f).unwrap()));
        assert!(m.is_zero(&m.xor(&g, &g).unwrap()));
    }

    #[test]
    fn test_substitute_and_compose() {
        let m = Manager::default();
        let (a, b, c) = (m.new_var(), m.new_var(), m.new_var());
        let (x, y, z) = (m.var(a).unwrap(), m.var(b).unwrap(), m.var(c).unwrap());

        let f = m.and(&x, &m.not(&y).unwrap()).unwrap();
        let g = m.substitute(&f, &[(a, c)]).unwrap();
        assert_eq!(g, m.and(&z, &m.not(&y).unwrap()).unwrap());

        let h = m.vector_compose(&f, &[(a, y.clone())]).unwrap();
        assert!(m.is_zero(&h));
    }

    #[test]
    fn test_pick_one_and_sat_count() {
        let m = Manager::default();
        let (a, b, c) = (m.new_var(), m.new_var(), m.new_var());
        let x = m.var(a).unwrap();
        let y = m.var(b).unwrap();

        let f = m.and(&x, &m.not(&y).unwrap()).unwrap();
        assert_eq!(m.pick_one(&f), Some(vec![(a, true), (b, false)]));
        assert_eq!(m.pick_one(&m.zero()), None);

        assert_eq!(m.sat_count(&f, &[a, b]), BigUint::from(1u32));
        assert_eq!(m.sat_count(&f, &[a, b, c]), BigUint::from(2u32));
        assert_eq!(m.sat_count(&m.one(), &[a, b, c]), BigUint::from(8u32));
    }

    #[test]
    fn test_and_exists() {
        let m = Manager::default();
        let (a, b) = (m.new_var(), m.new_var());
        let x = m.var(a).unwrap();
        let y = m.var(b).unwrap();

        let cube = m.cube(&[b]).unwrap();
        let r = m.and_exists(&m.biimp(&x, &y).unwrap(), &y, &cube).unwrap();
        assert_eq!(r, x);
    }

    #[test]
    #[should_panic(expected = "Func belongs to another manager")]
    fn test_foreign_func_is_rejected() {
        let m1 = Manager::default();
        let m2 = Manager::default();
        let x = m1.var(m1.new_var()).unwrap();
        let _ = m2.not(&x);
    }

    #[test]
    fn test_invalid_config() {
        let config = BddConfig::default().with_storage_bits(40);
        assert!(matches!(Manager::try_new(config), Err(Error::InvalidConfig(_))));
        let config = BddConfig::default().with_cache_bits(32);
        assert!(matches!(Manager::try_new(config), Err(Error::InvalidConfig(_))));
        let config = BddConfig::default().with_storage_bits(0);
        assert!(matches!(Manager::try_new(config), Err(Error::InvalidConfig(_))));
        assert!(Manager::try_new(BddConfig::default().with_storage_bits(4)).is_ok());
    }

    #[test]
    fn test_overflow_retries_after_gc() {
        // 32 cells: the terminal, six variables, and room for a couple of parities at a time.
        let m = Manager::new(BddConfig::default().with_storage_bits(5).with_cache_bits(4));
        let vars: Vec<u32> = (0..6).map(|_| m.new_var()).collect();
        let xs: Vec<Func> = vars.iter().map(|&v| m.var(v).unwrap()).collect();

        // 63 distinct parity functions cannot all fit at once.
        for mask in 1u32..64 {
            let mut acc = m.zero();
            for (i, x) in xs.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    acc = m.xor(&acc, x).unwrap();
                }
            }
            assert!(!m.is_zero(&acc));
            assert!(m.node_count(&acc) <= 7);
        }
    }

    #[test]
    fn test_overflow_of_live_nodes_is_exhaustion() {
        let m = Manager::new(BddConfig::default().with_storage_bits(3).with_cache_bits(2));
        let mut held = Vec::new();
        let mut result = Ok(());
        for _ in 0..8 {
            match m.var(m.new_var()) {
                Ok(f) => held.push(f),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        assert!(matches!(result, Err(Error::ResourceExhausted(_))));
        assert_eq!(held.len(), 6);
    }
}
