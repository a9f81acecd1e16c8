//! The BDD engine.
//!
//! [`Bdd`] is a manager-centric implementation of reduced ordered BDDs with complement edges:
//! a negated [`Ref`] denotes the negation of the function of its node, so `not` is free and
//! two references are equal iff they denote the same Boolean function.
//!
//! Variables are identified by positive integers and ordered by their identifier
//! (smaller identifiers are closer to the root). There is no dynamic reordering.
//!
//! All operations that may create nodes return `Result<Ref, BddError>`: the node table has a
//! fixed capacity, and running out of it is reported as [`BddError::Overflow`] rather than a panic.
//! Nodes are reclaimed by [`Bdd::collect_garbage`], which keeps everything reachable from
//! externally referenced nodes (see [`Bdd::ref_node`]).

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::ops::RangeInclusive;

use log::debug;
use thiserror::Error;

use crate::cache::Cache;
use crate::error;
use crate::node::Node;
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{pairing2, MyHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum BddError {
    #[error("node table is full (capacity {capacity})")]
    Overflow { capacity: usize },
}

pub type BddResult<T> = Result<T, BddError>;

/// Sizing of the node table and of the computed table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BddConfig {
    /// The node table holds `2^storage_bits` nodes.
    pub storage_bits: usize,
    /// The computed table holds `2^cache_bits` entries.
    pub cache_bits: usize,
}

impl Default for BddConfig {
    fn default() -> Self {
        Self {
            storage_bits: 20,
            cache_bits: 16,
        }
    }
}

impl BddConfig {
    pub const STORAGE_BITS: RangeInclusive<usize> = 1..=31;
    pub const CACHE_BITS: RangeInclusive<usize> = 0..=31;

    /// Fails with [`error::Error::InvalidConfig`] if a table size is out of range.
    pub fn validate(&self) -> error::Result<()> {
        if !Self::STORAGE_BITS.contains(&self.storage_bits) {
            return Err(error::Error::InvalidConfig(format!(
                "node table size of {} bits is outside {:?}",
                self.storage_bits,
                Self::STORAGE_BITS
            )));
        }
        if !Self::CACHE_BITS.contains(&self.cache_bits) {
            return Err(error::Error::InvalidConfig(format!(
                "computed table size of {} bits is outside {:?}",
                self.cache_bits,
                Self::CACHE_BITS
            )));
        }
        Ok(())
    }

    pub fn with_storage_bits(mut self, bits: usize) -> Self {
        self.storage_bits = bits;
        self
    }

    pub fn with_cache_bits(mut self, bits: usize) -> Self {
        self.cache_bits = bits;
        self
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum OpKey {
    Ite(Ref, Ref, Ref),
    Exists(Ref, Ref),
    RelProduct(Ref, Ref, Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match *self {
            OpKey::Ite(f, g, h) => pairing2(1, (f, g, h).hash()),
            OpKey::Exists(f, c) => pairing2(2, (f, c).hash()),
            OpKey::RelProduct(f, g, c) => pairing2(3, (f, g, c).hash()),
        }
    }
}

type Storage = Table<Node>;

pub struct Bdd {
    storage: RefCell<Storage>,
    refs: RefCell<Vec<u32>>,
    cache: RefCell<Cache<OpKey, Ref>>,
    num_vars: Cell<u32>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    /// # Panics
    ///
    /// Panics if `config` does not pass [`BddConfig::validate`].
    pub fn new(config: BddConfig) -> Self {
        if let Err(e) = config.validate() {
            panic!("{}", e);
        }

        let mut storage = Storage::new(config.storage_bits);

        // Allocate the terminal node:
        let one = match storage.add(Node::default()) {
            Ok(index) => index,
            Err(_) => unreachable!("empty table has room for the terminal"),
        };
        assert_eq!(one, 1, "terminal node must be (1)");
        let one = Ref::positive(one as u32);
        let zero = -one;

        let capacity = storage.capacity();

        Self {
            storage: RefCell::new(storage),
            refs: RefCell::new(vec![0; capacity]),
            cache: RefCell::new(Cache::new(config.cache_bits)),
            num_vars: Cell::new(0),
            zero,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(BddConfig::default())
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        f.debug_struct("Bdd")
            .field("capacity", &storage.capacity())
            .field("size", &storage.size())
            .field("real_size", &storage.real_size())
            .field("num_vars", &self.num_vars.get())
            .finish()
    }
}

impl Bdd {
    pub fn capacity(&self) -> usize {
        self.storage.borrow().capacity()
    }
    /// Number of live nodes, including the terminal.
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().real_size()
    }
    pub fn cache_hits(&self) -> usize {
        self.cache.borrow().hits()
    }
    pub fn cache_misses(&self) -> usize {
        self.cache.borrow().misses()
    }

    /// Number of variables allocated so far.
    pub fn num_vars(&self) -> u32 {
        self.num_vars.get()
    }

    /// Allocate a fresh variable.
    ///
    /// Variables are numbered `1, 2, 3, ...` in allocation order.
    pub fn new_var(&self) -> u32 {
        let v = self.num_vars.get() + 1;
        self.num_vars.set(v);
        v
    }

    pub fn variable(&self, index: usize) -> u32 {
        self.storage.borrow().value(index).variable
    }
    pub fn low(&self, index: usize) -> Ref {
        self.storage.borrow().value(index).low
    }
    pub fn high(&self, index: usize) -> Ref {
        self.storage.borrow().value(index).high
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == self.one.index()
    }

    /// Variable at the root of `node`, or `u32::MAX` for terminals,
    /// so that terminals sort below every variable.
    fn top_var(&self, node: Ref) -> u32 {
        if self.is_terminal(node) {
            u32::MAX
        } else {
            self.variable(node.index())
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> BddResult<Ref> {
        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            return Ok(-self.mk_node(v, -low, -high)?);
        }

        // Handle duplicates
        if low == high {
            return Ok(low);
        }

        let mut storage = self.storage.borrow_mut();
        let capacity = storage.capacity();
        let i = storage
            .put(Node { variable: v, low, high })
            .map_err(|_| BddError::Overflow { capacity })?;
        Ok(Ref::positive(i as u32))
    }

    pub fn mk_var(&self, v: u32) -> BddResult<Ref> {
        self.mk_node(v, self.zero, self.one)
    }

    /// Conjunction of DIMACS-style literals: `3` is `x3`, `-3` is `~x3`.
    pub fn cube(&self, literals: impl IntoIterator<Item = i32>) -> BddResult<Ref> {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        literals.sort_by_key(|&v| std::cmp::Reverse(v.abs()));
        let mut current = self.one;
        for lit in literals {
            assert_ne!(lit, 0, "Variable index should not be zero");
            current = if lit < 0 {
                self.mk_node(lit.unsigned_abs(), current, self.zero)?
            } else {
                self.mk_node(lit as u32, self.zero, current)?
            };
        }
        Ok(current)
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        if self.top_var(node) != v {
            return (node, node);
        }
        (self.low_node(node), self.high_node(node))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> BddResult<Ref> {
        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return Ok(g);
        }
        if self.is_zero(f) {
            return Ok(h);
        }

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        if g == h {
            return Ok(g);
        }
        if self.is_one(g) && self.is_zero(h) {
            return Ok(f);
        }
        if self.is_zero(g) && self.is_one(h) {
            return Ok(-f);
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        let i = self.top_var(f);
        let j = self.top_var(g);
        let k = self.top_var(h);

        // Equivalent pairs (choose the one with the lowest variable):
        //   ite(F,1,H) == ite(H,1,F) == F ∨ H
        //   ite(F,G,0) == ite(G,F,0) == F ∧ G
        //   ite(F,G,1) == ite(~G,~F,1) == F -> G
        //   ite(F,0,H) == ite(~H,0,~F) == ~F ∧ H
        if self.is_one(g) && k < i {
            return self.apply_ite(h, self.one, f);
        }
        if self.is_zero(h) && j < i {
            return self.apply_ite(g, f, self.zero);
        }
        if self.is_one(h) && j < i {
            return self.apply_ite(-g, -f, self.one);
        }
        if self.is_zero(g) && k < i {
            return self.apply_ite(-h, self.zero, -f);
        }

        // Make sure the first two pointers (f and g) are regular (not negated)
        let (mut f, mut g, mut h) = (f, g, h);

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = OpKey::Ite(f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return Ok(if n { -res } else { res });
        }

        // Determine the top variable:
        let m = self.top_var(f).min(self.top_var(g)).min(self.top_var(h));
        debug_assert_ne!(m, u32::MAX);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0)?;
        let t = self.apply_ite(f1, g1, h1)?;

        let res = self.mk_node(m, e, t)?;
        self.cache.borrow_mut().insert(key, res);

        Ok(if n { -res } else { res })
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> BddResult<Ref> {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> BddResult<Ref> {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> BddResult<Ref> {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> BddResult<Ref> {
        self.apply_ite(u, v, -v)
    }

    /// Skip the variables of a positive cube that lie above `v`.
    fn cube_from(&self, mut cube: Ref, v: u32) -> Ref {
        while !self.is_one(cube) && self.top_var(cube) < v {
            cube = self.high_node(cube);
        }
        cube
    }

    /// Existential quantification of `f` over the variables of the positive `cube`.
    ///
    /// ```text
    /// ∃x. f = f|x<-0 ∨ f|x<-1
    /// ```
    pub fn exists(&self, f: Ref, cube: Ref) -> BddResult<Ref> {
        if self.is_terminal(f) {
            return Ok(f);
        }

        let v = self.top_var(f);
        let cube = self.cube_from(cube, v);
        if self.is_one(cube) {
            return Ok(f);
        }

        let key = OpKey::Exists(f, cube);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return Ok(res);
        }

        let (f0, f1) = (self.low_node(f), self.high_node(f));
        let res = if self.top_var(cube) == v {
            let rest = self.high_node(cube);
            let e0 = self.exists(f0, rest)?;
            if self.is_one(e0) {
                self.one
            } else {
                let e1 = self.exists(f1, rest)?;
                self.apply_or(e0, e1)?
            }
        } else {
            let e0 = self.exists(f0, cube)?;
            let e1 = self.exists(f1, cube)?;
            self.mk_node(v, e0, e1)?
        };

        self.cache.borrow_mut().insert(key, res);
        Ok(res)
    }

    /// Relational product: `∃cube. f ∧ g`, without building `f ∧ g` first.
    pub fn rel_product(&self, f: Ref, g: Ref, cube: Ref) -> BddResult<Ref> {
        if self.is_zero(f) || self.is_zero(g) || f == -g {
            return Ok(self.zero);
        }
        if self.is_one(f) || f == g {
            return self.exists(g, cube);
        }
        if self.is_one(g) {
            return self.exists(f, cube);
        }

        // Conjunction is commutative, so normalize the cache key:
        let (f, g) = if f.raw() <= g.raw() { (f, g) } else { (g, f) };

        let m = self.top_var(f).min(self.top_var(g));
        let cube = self.cube_from(cube, m);
        if self.is_one(cube) {
            return self.apply_and(f, g);
        }

        let key = OpKey::RelProduct(f, g, cube);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return Ok(res);
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let res = if self.top_var(cube) == m {
            let rest = self.high_node(cube);
            let r0 = self.rel_product(f0, g0, rest)?;
            if self.is_one(r0) {
                self.one
            } else {
                let r1 = self.rel_product(f1, g1, rest)?;
                self.apply_or(r0, r1)?
            }
        } else {
            let r0 = self.rel_product(f0, g0, cube)?;
            let r1 = self.rel_product(f1, g1, cube)?;
            self.mk_node(m, r0, r1)?
        };

        self.cache.borrow_mut().insert(key, res);
        Ok(res)
    }

    /// Simultaneous substitution: every variable `v` in `subst` is replaced by `subst[v]`.
    ///
    /// ```text
    /// f[v1 := g1, ..., vn := gn]
    /// ```
    pub fn vector_compose(&self, f: Ref, subst: &HashMap<u32, Ref>) -> BddResult<Ref> {
        let mut cache = HashMap::new();
        self.vector_compose_(f, subst, &mut cache)
    }

    fn vector_compose_(&self, f: Ref, subst: &HashMap<u32, Ref>, cache: &mut HashMap<Ref, Ref>) -> BddResult<Ref> {
        if self.is_terminal(f) {
            return Ok(f);
        }

        let node = f.regular();
        let res = match cache.get(&node) {
            Some(&res) => res,
            None => {
                let index = node.index();
                let v = self.variable(index);
                let low = self.vector_compose_(self.low(index), subst, cache)?;
                let high = self.vector_compose_(self.high(index), subst, cache)?;
                let x = match subst.get(&v) {
                    Some(&g) => g,
                    None => self.mk_var(v)?,
                };
                let res = self.apply_ite(x, high, low)?;
                cache.insert(node, res);
                res
            }
        };

        Ok(if f.is_negated() { -res } else { res })
    }

    /// Rename variables: every `v` in `perm` is replaced by the variable `perm[v]`, simultaneously.
    pub fn rename(&self, f: Ref, perm: &HashMap<u32, u32>) -> BddResult<Ref> {
        debug!("rename(f = {}, perm = {:?})", f, perm);
        let mut subst = HashMap::with_capacity(perm.len());
        for (&from, &to) in perm {
            subst.insert(from, self.mk_var(to)?);
        }
        self.vector_compose(f, &subst)
    }

    pub fn descendants(&self, nodes: impl IntoIterator<Item = Ref>) -> HashSet<usize> {
        let mut visited = HashSet::new();
        let mut stack: Vec<usize> = nodes.into_iter().map(|r| r.index()).collect();
        while let Some(i) = stack.pop() {
            if !visited.insert(i) {
                continue;
            }
            if i == self.one.index() {
                continue;
            }
            stack.push(self.low(i).index());
            stack.push(self.high(i).index());
        }
        visited
    }

    /// Number of nodes in `f`, including the terminal.
    pub fn size(&self, f: Ref) -> usize {
        self.descendants([f]).len()
    }

    /// Protect `node` from garbage collection.
    pub fn ref_node(&self, node: Ref) {
        if !self.is_terminal(node) {
            self.refs.borrow_mut()[node.index()] += 1;
        }
    }

    /// Drop one external reference to `node`.
    pub fn deref_node(&self, node: Ref) {
        if !self.is_terminal(node) {
            let mut refs = self.refs.borrow_mut();
            let count = &mut refs[node.index()];
            assert!(*count > 0, "Dereferencing node {} with zero references", node);
            *count -= 1;
        }
    }

    /// Number of external references to `node`.
    pub fn ref_count(&self, node: Ref) -> u32 {
        self.refs.borrow()[node.index()]
    }

    /// Reclaim every node that is not reachable from an externally referenced node.
    ///
    /// Any `Ref` not protected by [`Bdd::ref_node`] (directly or through an ancestor)
    /// is invalid after this call. Returns the number of reclaimed nodes.
    pub fn collect_garbage(&self) -> usize {
        let before = self.num_nodes();

        self.cache.borrow_mut().clear();

        let roots: Vec<Ref> = {
            let refs = self.refs.borrow();
            let storage = self.storage.borrow();
            (1..=storage.size())
                .filter(|&i| refs[i] > 0 && storage.is_occupied(i))
                .map(|i| Ref::positive(i as u32))
                .collect()
        };
        let alive = self.descendants(roots);

        let mut storage = self.storage.borrow_mut();
        for b in 0..storage.num_buckets() {
            // Rebuild the collision chain with only the live cells, preserving their order.
            let mut kept = Vec::new();
            let mut index = storage.bucket(b);
            while index != 0 {
                let next = storage.next(index);
                if alive.contains(&index) {
                    kept.push(index);
                } else {
                    storage.drop(index);
                }
                index = next;
            }
            storage.set_bucket(b, kept.first().copied().unwrap_or(0));
            for w in kept.windows(2) {
                storage.set_next(w[0], w[1]);
            }
            if let Some(&last) = kept.last() {
                storage.set_next(last, 0);
            }
        }
        drop(storage);

        let freed = before - self.num_nodes();
        debug!("collect_garbage: freed {} of {} nodes", freed, before);
        freed
    }
}
