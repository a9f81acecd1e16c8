//! BDD to DOT (Graphviz) conversion.
//!
//! Conventions:
//! - terminal `1` is a square at the bottom, complemented edges to it are drawn to a `0` square,
//! - variable nodes are grouped by variable (one rank per variable),
//! - high edges are solid, low edges are dashed,
//! - complemented low edges are dotted with a hollow circle,
//! - roots are labelled rectangles at the top.
//!
//! ```text
//! dot -Tsvg region.dot -o region.svg
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Render the BDDs rooted at `roots` in DOT format. Shared nodes are displayed once.
    pub fn to_dot(&self, roots: &[Ref]) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "graph {{")?;
        writeln!(dot, "node [shape=circle, fixedsize=true];")?;

        writeln!(dot, "{{ rank=sink")?;
        writeln!(dot, "0 [shape=square, label=\"0\"];")?;
        writeln!(dot, "1 [shape=square, label=\"1\"];")?;
        writeln!(dot, "}}")?;

        let all_nodes = self.descendants(roots.iter().copied());
        let terminal = self.one.index();

        let mut levels = BTreeMap::<u32, Vec<usize>>::new();
        for &id in all_nodes.iter() {
            if id == terminal {
                continue;
            }
            levels.entry(self.variable(id)).or_default().push(id);
        }

        for (var, ids) in levels.iter_mut() {
            ids.sort_unstable();
            writeln!(dot, "{{ rank=same")?;
            for id in ids.iter() {
                writeln!(dot, "{} [label=<x<SUB>{}</SUB>>];", id, var)?;
            }
            writeln!(dot, "}}")?;
        }

        for ids in levels.values() {
            for &id in ids {
                let high = self.high(id);
                debug_assert!(!high.is_negated());
                writeln!(dot, "{} -- {} [style=solid];", id, high.index())?;

                let low = self.low(id);
                if low == self.zero {
                    writeln!(dot, "{} -- 0 [style=dashed];", id)?;
                } else if low.is_negated() {
                    writeln!(dot, "{} -- {} [style=dotted, dir=forward, arrowhead=odot];", id, low.index())?;
                } else {
                    writeln!(dot, "{} -- {} [style=dashed];", id, low.index())?;
                }
            }
        }

        writeln!(dot, "{{ rank=source")?;
        for (i, root) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape=rect, label=\"{}\"];", i, root)?;
        }
        writeln!(dot, "}}")?;

        for (i, &root) in roots.iter().enumerate() {
            if root == self.zero {
                writeln!(dot, "r{} -- 0;", i)?;
            } else if root.is_negated() {
                writeln!(dot, "r{} -- {} [dir=forward, arrowhead=odot];", i, root.index())?;
            } else {
                writeln!(dot, "r{} -- {};", i, root.index())?;
            }
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_dot_basic() {
        let bdd = Bdd::default();
        for _ in 0..3 {
            bdd.new_var();
        }
        let f = bdd.cube([-1, 2, 3]).unwrap();

        let dot = bdd.to_dot(&[f]).unwrap();
        assert!(dot.starts_with("graph {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("x<SUB>1</SUB>"));
        assert!(dot.contains("x<SUB>3</SUB>"));
    }

    #[test]
    fn test_to_dot_constants() {
        let bdd = Bdd::default();
        let dot = bdd.to_dot(&[bdd.zero, bdd.one]).unwrap();
        assert!(dot.contains("r0 -- 0;"));
        assert!(dot.contains("r1 -- 1;"));
    }
}
