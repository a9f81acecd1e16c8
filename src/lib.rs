//! # aig-verify: symbolic verification of AIGER circuits
//!
//! **`aig-verify`** re-checks the output of a reactive synthesis tool with Binary Decision Diagrams.
//! Given an ASCII AIGER circuit whose single output flags an error, it decides whether an error
//! state is reachable from the all-zero initial state; given a second circuit claiming to encode
//! a winning region, it checks that the region is a valid inductive certificate.
//!
//! ## Pipeline
//!
//! 1. **[`aiger`]** parses and validates the circuit, splitting its inputs into controllable
//!    and uncontrollable ones by their symbols.
//! 2. **[`model`]** compiles it into a [`SymbolicModel`][crate::model::SymbolicModel]: one BDD per
//!    latch next-state function, the error condition, the initial state and quantification cubes.
//! 3. **[`reach`]** runs the backward fixpoint from the error states.
//! 4. **[`region`]** validates a winning region against the same model.
//!
//! All of it is generic over the [`DdManager`][crate::manager::DdManager] capability trait.
//! The crate ships its own BDD engine ([`bdd::Bdd`]) with complement edges, a hash-consed
//! node table and a computed table, wrapped into the reference-counted
//! [`Manager`][crate::manager::Manager].
//!
//! ## Basic Usage
//!
//! ```rust
//! use aig_verify::aiger::parse;
//! use aig_verify::reach::Verdict;
//! use aig_verify::verify::{check_circuit, CheckConfig};
//!
//! // One latch toggling every step; the error is "the latch is set".
//! let circuit = parse("aag 1 0 1 1 0\n2 3\n2\n").unwrap();
//! let report = check_circuit(&circuit, &CheckConfig::default()).unwrap();
//! assert_eq!(report.verdict, Verdict::Unsafe);
//! assert_eq!(report.rounds, 1);
//! ```
//!
//! For file-based checks, see [`verify::check_safety`] and [`verify::validate_winning_region`].

pub mod aiger;
pub mod bdd;
pub mod cache;
pub mod dot;
pub mod error;
pub mod manager;
pub mod model;
pub mod node;
pub mod reach;
pub mod reference;
pub mod region;
pub mod sat;
pub mod syntax;
pub mod table;
pub mod utils;
pub mod verify;
