use std::collections::HashMap;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Returns one satisfying assignment for the BDD, if any exists.
    ///
    /// The assignment is a path to the `1` terminal, given as DIMACS-style literals:
    /// `v` if the variable is true, `-v` if it is false.
    /// Variables not on the path are unconstrained and omitted.
    ///
    /// Returns `None` if the BDD represents the constant false function.
    pub fn one_sat(&self, node: Ref) -> Option<Vec<i32>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = node;

        // Walk down the BDD, always picking a satisfying branch
        while !self.is_one(current) {
            let var = self.variable(current.index()) as i32;
            let high = self.high_node(current);
            let low = self.low_node(current);

            // Prefer high branch if satisfiable, otherwise take low
            if !self.is_zero(high) {
                path.push(var);
                current = high;
            } else {
                path.push(-var);
                current = low;
            }
        }

        Some(path)
    }

    /// Number of satisfying assignments over the first `num_vars` variables.
    ///
    /// The function must not depend on variables beyond `num_vars`.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let max = BigUint::from(1u32) << num_vars;
        self.sat_count_(node, &max, &mut cache)
    }

    fn sat_count_(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let low = self.low(node.index());
        let high = self.high(node.index());

        let count_low = self.sat_count_(low, max, cache);
        let count_high = self.sat_count_(high, max, cache);

        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_sat() {
        let bdd = Bdd::default();
        for _ in 0..3 {
            bdd.new_var();
        }

        let f = bdd.cube([1, -2, -3]).unwrap();
        let model = bdd.one_sat(f);
        assert_eq!(model, Some(vec![1, -2, -3]));

        let g = bdd.apply_and(f, -bdd.cube(model.unwrap()).unwrap()).unwrap();
        assert_eq!(bdd.one_sat(g), None);
    }

    #[test]
    fn test_one_sat_many() {
        let bdd = Bdd::default();
        for _ in 0..3 {
            bdd.new_var();
        }

        for &s1 in &[1, -1] {
            for &s2 in &[1, -1] {
                for &s3 in &[1, -1] {
                    let cube = [s1, 2 * s2, 3 * s3];
                    let f = bdd.cube(cube).unwrap();
                    let model = bdd.one_sat(f);
                    assert_eq!(model, Some(cube.to_vec()));

                    let g = bdd.apply_and(f, -bdd.cube(model.unwrap()).unwrap()).unwrap();
                    assert_eq!(bdd.one_sat(g), None);
                }
            }
        }
    }

    #[test]
    fn test_one_sat_skips_unconstrained() {
        let bdd = Bdd::default();
        for _ in 0..3 {
            bdd.new_var();
        }
        let f = bdd.cube([-2]).unwrap();
        assert_eq!(bdd.one_sat(f), Some(vec![-2]));
        assert_eq!(bdd.one_sat(bdd.one), Some(vec![]));
        assert_eq!(bdd.one_sat(bdd.zero), None);
    }

    #[test]
    fn test_sat_count_terminal() {
        let bdd = Bdd::default();

        assert_eq!(bdd.sat_count(bdd.zero, 1), BigUint::from(0u32));
        assert_eq!(bdd.sat_count(bdd.zero, 3), BigUint::from(0u32));

        assert_eq!(bdd.sat_count(bdd.one, 1), BigUint::from(2u32));
        assert_eq!(bdd.sat_count(bdd.one, 2), BigUint::from(4u32));
        assert_eq!(bdd.sat_count(bdd.one, 3), BigUint::from(8u32));
    }

    #[test]
    fn test_sat_count_functions() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(bdd.new_var()).unwrap();
        let y = bdd.mk_var(bdd.new_var()).unwrap();
        let z = bdd.mk_var(bdd.new_var()).unwrap();

        assert_eq!(bdd.sat_count(x, 3), BigUint::from(4u32));
        assert_eq!(bdd.sat_count(-x, 3), BigUint::from(4u32));
        assert_eq!(bdd.sat_count(bdd.apply_and(x, y).unwrap(), 3), BigUint::from(2u32));
        assert_eq!(bdd.sat_count(bdd.apply_or(x, z).unwrap(), 3), BigUint::from(6u32));
        assert_eq!(bdd.sat_count(bdd.apply_xor(y, z).unwrap(), 2 + 1), BigUint::from(4u32));
    }
}
