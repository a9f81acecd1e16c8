//! Reader for the ASCII AIGER format (`aag`).
//!
//! ```text
//! aag M I L O A
//! <I input literals>
//! <L latch lines: state next [reset]>
//! <O output literals, O = 1>
//! <A and-gate lines: lhs rhs0 rhs1>
//! [symbol table: i<idx> name | l<idx> name | o<idx> name]
//! [c
//!  comment lines...]
//! ```
//!
//! Inputs whose symbol marks them as controllable (see [`is_controllable`]) form the
//! controlled partition, all other inputs are uncontrolled.

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};

use crate::error::{Error, Result};

/// A signed reference to a circuit variable: `2*v` is the variable `v`, `2*v+1` its negation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Literal(u32);

impl Literal {
    pub const FALSE: Literal = Literal(0);
    pub const TRUE: Literal = Literal(1);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn from_variable(variable: u32, negated: bool) -> Self {
        Self((variable << 1) | negated as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index of the variable, as counted by the `M` field of the header.
    pub const fn variable(self) -> u32 {
        self.0 >> 1
    }

    /// The non-negated literal of the same variable (`lit & ~1`).
    pub const fn positive(self) -> Literal {
        Literal(self.0 & !1)
    }

    pub const fn is_negated(self) -> bool {
        self.0 & 1 != 0
    }

    pub const fn is_const(self) -> bool {
        self.variable() == 0
    }
}

impl std::ops::Not for Literal {
    type Output = Literal;

    fn not(self) -> Self::Output {
        Literal(self.0 ^ 1)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Header {
    /// Maximum variable index.
    pub m: usize,
    /// Number of inputs.
    pub i: usize,
    /// Number of latches.
    pub l: usize,
    /// Number of outputs.
    pub o: usize,
    /// Number of AND gates.
    pub a: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Latch {
    pub state: Literal,
    pub next: Literal,
    /// Parsed but not used: every latch starts at 0.
    pub reset: Literal,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AndGate {
    pub output: Literal,
    pub left: Literal,
    pub right: Literal,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SymbolKind {
    Input,
    Latch,
    Output,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub index: usize,
    pub name: String,
}

/// Largest variable index whose literals fit into a `u32`.
const MAX_VARIABLE: usize = (u32::MAX >> 1) as usize;

const CONTROLLABLE: &str = "controllable";
const UNCONTROLLABLE: &str = "uncontrollable";

/// Whether an input named `name` is driven by the controller.
pub fn is_controllable(name: &str) -> bool {
    let name = name.to_lowercase();
    name.contains(CONTROLLABLE) && !name.contains(UNCONTROLLABLE)
}

/// A parsed and validated single-output AIGER circuit.
#[derive(Debug, Clone)]
pub struct Circuit {
    header: Header,
    inputs: Vec<Literal>,
    latches: Vec<Latch>,
    output: Literal,
    gates: Vec<AndGate>,
    symbols: Vec<Symbol>,
    comments: Vec<String>,
    controlled: Vec<usize>,
    uncontrolled: Vec<usize>,
}

impl Circuit {
    pub fn header(&self) -> &Header {
        &self.header
    }
    pub fn max_var(&self) -> u32 {
        self.header.m as u32
    }
    pub fn inputs(&self) -> &[Literal] {
        &self.inputs
    }
    pub fn latches(&self) -> &[Latch] {
        &self.latches
    }
    /// The single output, interpreted as the error (bad-state) condition.
    pub fn output(&self) -> Literal {
        self.output
    }
    pub fn gates(&self) -> &[AndGate] {
        &self.gates
    }
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
    /// Lines after the `c` marker.
    pub fn comments(&self) -> &[String] {
        &self.comments
    }
    /// Positions (in [`Circuit::inputs`]) of the controllable inputs.
    pub fn controlled_inputs(&self) -> &[usize] {
        &self.controlled
    }
    /// Positions (in [`Circuit::inputs`]) of the uncontrollable inputs.
    pub fn uncontrolled_inputs(&self) -> &[usize] {
        &self.uncontrolled
    }

    fn symbol(&self, kind: SymbolKind, index: usize) -> Option<&str> {
        self.symbols
            .iter()
            .find(|s| s.kind == kind && s.index == index)
            .map(|s| s.name.as_str())
    }
    pub fn input_name(&self, index: usize) -> Option<&str> {
        self.symbol(SymbolKind::Input, index)
    }
    pub fn latch_name(&self, index: usize) -> Option<&str> {
        self.symbol(SymbolKind::Latch, index)
    }
    pub fn output_name(&self) -> Option<&str> {
        self.symbol(SymbolKind::Output, 0)
    }

    pub fn is_combinational(&self) -> bool {
        self.latches.is_empty()
    }

    /// Fails with [`Error::MissingPartition`] unless there is at least one controllable
    /// and at least one uncontrollable input.
    pub fn require_game_partition(&self) -> Result<()> {
        if self.controlled.is_empty() || self.uncontrolled.is_empty() {
            if self.symbols.iter().all(|s| s.kind != SymbolKind::Input) {
                warn!("No input symbols: every input is considered uncontrollable");
            }
            return Err(Error::MissingPartition {
                controlled: self.controlled.len(),
                uncontrolled: self.uncontrolled.len(),
            });
        }
        Ok(())
    }

    /// Whether the combinational cone of the output reaches an input.
    pub fn output_depends_on_inputs(&self) -> bool {
        let inputs: HashSet<u32> = self.inputs.iter().map(|lit| lit.variable()).collect();
        let gates: HashMap<u32, &AndGate> = self.gates.iter().map(|g| (g.output.variable(), g)).collect();

        let mut visited = HashSet::new();
        let mut stack = vec![self.output.variable()];
        while let Some(v) = stack.pop() {
            if !visited.insert(v) {
                continue;
            }
            if inputs.contains(&v) {
                return true;
            }
            if let Some(gate) = gates.get(&v) {
                stack.push(gate.left.variable());
                stack.push(gate.right.variable());
            }
        }
        false
    }

    /// Read and parse an `.aag` file.
    pub fn read(path: impl AsRef<Path>) -> Result<Circuit> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Parsing '{}'", path.display());
        parse(&text)
    }
}

impl FromStr for Circuit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

/// Line cursor with 1-based line numbers for error reporting.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    last: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
            last: 0,
        }
    }

    fn next_line(&mut self, what: &str) -> Result<(usize, &'a str)> {
        match self.inner.next() {
            Some((i, line)) => {
                self.last = i + 1;
                Ok((i + 1, line))
            }
            None => Err(Error::format(self.last + 1, format!("unexpected end of file, expected {}", what))),
        }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let (i, line) = self.inner.next()?;
        self.last = i + 1;
        Some((i + 1, line))
    }
}

fn parse_number(token: &str, line: usize) -> Result<usize> {
    token
        .parse()
        .map_err(|_| Error::format(line, format!("expected a non-negative integer, got '{}'", token)))
}

fn parse_literal(token: &str, line: usize, max_var: usize) -> Result<Literal> {
    let raw: u32 = token
        .parse()
        .map_err(|_| Error::format(line, format!("invalid literal '{}'", token)))?;
    let lit = Literal::new(raw);
    if lit.variable() as usize > max_var {
        return Err(Error::format(
            line,
            format!("literal {} exceeds the maximum variable index {}", lit, max_var),
        ));
    }
    Ok(lit)
}

/// Parse a literal that defines a variable: even and not a constant.
fn parse_definition(token: &str, line: usize, max_var: usize, defined: &mut HashSet<u32>) -> Result<Literal> {
    let lit = parse_literal(token, line, max_var)?;
    if lit.is_negated() || lit.is_const() {
        return Err(Error::format(
            line,
            format!("literal {} cannot be defined, expected an even non-constant literal", lit),
        ));
    }
    let v = lit.variable();
    if !defined.insert(v) {
        return Err(Error::MalformedCircuit(format!(
            "variable {} defined twice (line {})",
            v, line
        )));
    }
    Ok(lit)
}

fn tokens<'a>(
    line: &'a str,
    count: std::ops::RangeInclusive<usize>,
    lineno: usize,
    what: &str,
) -> Result<Vec<&'a str>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if !count.contains(&tokens.len()) {
        return Err(Error::format(
            lineno,
            format!("malformed {} definition '{}'", what, line.trim()),
        ));
    }
    Ok(tokens)
}

fn parse_header(line: &str, lineno: usize) -> Result<Header> {
    let mut fields = line.split_whitespace();
    match fields.next() {
        Some("aag") => {}
        Some("aig") => return Err(Error::format(lineno, "binary AIGER ('aig') is not supported")),
        Some(tag) => return Err(Error::format(lineno, format!("expected header tag 'aag', got '{}'", tag))),
        None => return Err(Error::format(lineno, "missing header")),
    }

    let numbers = fields.map(|t| parse_number(t, lineno)).collect::<Result<Vec<_>>>()?;
    let [m, i, l, o, a] = numbers[..] else {
        return Err(Error::format(
            lineno,
            format!("header must have exactly 5 numbers 'M I L O A', got {}", numbers.len()),
        ));
    };

    if o != 1 {
        return Err(Error::format(lineno, format!("expected exactly one output, got {}", o)));
    }
    if i.checked_add(l).and_then(|s| s.checked_add(a)) != Some(m) {
        return Err(Error::format(
            lineno,
            format!("header violates M = I + L + A ({} != {} + {} + {})", m, i, l, a),
        ));
    }
    if m > MAX_VARIABLE {
        return Err(Error::format(
            lineno,
            format!("maximum variable index {} exceeds the supported {}", m, MAX_VARIABLE),
        ));
    }

    Ok(Header { m, i, l, o, a })
}

fn parse_symbol(line: &str, lineno: usize, header: &Header) -> Result<Symbol> {
    let invalid = || Error::format(lineno, format!("invalid symbol table entry '{}'", line));

    let (tag, name) = line.split_once(' ').ok_or_else(invalid)?;
    let mut chars = tag.chars();
    let (kind, count) = match chars.next() {
        Some('i') => (SymbolKind::Input, header.i),
        Some('l') => (SymbolKind::Latch, header.l),
        Some('o') => (SymbolKind::Output, header.o),
        _ => return Err(invalid()),
    };
    let index = chars.as_str().parse::<usize>().map_err(|_| invalid())?;
    if index >= count {
        return Err(Error::format(
            lineno,
            format!("symbol index {} out of range for '{}' ({} declared)", index, &tag[..1], count),
        ));
    }

    Ok(Symbol {
        kind,
        index,
        name: name.to_string(),
    })
}

/// Parse the text of an ASCII AIGER file.
pub fn parse(text: &str) -> Result<Circuit> {
    let mut lines = Lines::new(text);

    let (lineno, line) = lines.next_line("header")?;
    let header = parse_header(line, lineno)?;
    debug!("header = {:?}", header);

    // Sized by the lines actually read, not by the header.
    let m = header.m;
    let mut defined = HashSet::new();

    let mut inputs = Vec::new();
    for _ in 0..header.i {
        let (lineno, line) = lines.next_line("an input")?;
        let t = tokens(line, 1..=1, lineno, "input")?;
        inputs.push(parse_definition(t[0], lineno, m, &mut defined)?);
    }

    let mut latches = Vec::new();
    for _ in 0..header.l {
        let (lineno, line) = lines.next_line("a latch")?;
        let t = tokens(line, 2..=3, lineno, "latch")?;
        let state = parse_definition(t[0], lineno, m, &mut defined)?;
        let next = parse_literal(t[1], lineno, m)?;
        let reset = match t.get(2) {
            Some(token) => parse_literal(token, lineno, m)?,
            None => Literal::FALSE,
        };
        if reset != Literal::FALSE {
            warn!(
                "Latch {} has reset literal {} (line {}), it is initialized to 0 anyway",
                state, reset, lineno
            );
        }
        latches.push(Latch { state, next, reset });
    }

    let (lineno, line) = lines.next_line("the output")?;
    let t = tokens(line, 1..=1, lineno, "output")?;
    let output = parse_literal(t[0], lineno, m)?;

    let mut gates = Vec::new();
    for _ in 0..header.a {
        let (lineno, line) = lines.next_line("an AND gate")?;
        let t = tokens(line, 3..=3, lineno, "AND gate")?;
        let lhs = parse_definition(t[0], lineno, m, &mut defined)?;
        let left = parse_literal(t[1], lineno, m)?;
        let right = parse_literal(t[2], lineno, m)?;
        gates.push(AndGate {
            output: lhs,
            left,
            right,
        });
    }

    let mut symbols = Vec::new();
    let mut comments = Vec::new();
    while let Some((lineno, line)) = lines.next() {
        if line.trim_end() == "c" {
            comments.extend(lines.by_ref().map(|(_, line)| line.to_string()));
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        symbols.push(parse_symbol(line, lineno, &header)?);
    }

    let mut controlled = Vec::new();
    let mut uncontrolled = Vec::new();
    for index in 0..inputs.len() {
        let name = symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Input && s.index == index)
            .map(|s| s.name.as_str());
        match name {
            Some(name) if is_controllable(name) => controlled.push(index),
            _ => uncontrolled.push(index),
        }
    }

    debug!(
        "Parsed {} inputs ({} controllable), {} latches, {} gates, {} symbols, {} comment lines",
        inputs.len(),
        controlled.len(),
        latches.len(),
        gates.len(),
        symbols.len(),
        comments.len()
    );

    Ok(Circuit {
        header,
        inputs,
        latches,
        output,
        gates,
        symbols,
        comments,
        controlled,
        uncontrolled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    const GAME: &str = "\
aag 5 2 1 1 2
2
4
6 10
8
8 2 7
10 4 6
i0 controllable_grant
i1 request
l0 state
o0 err
c
generated by hand
";

    #[test]
    fn test_literal() {
        let lit = Literal::new(7);
        assert_eq!(lit.variable(), 3);
        assert!(lit.is_negated());
        assert_eq!(lit.positive(), Literal::new(6));
        assert_eq!(!lit, Literal::new(6));
        assert_eq!(Literal::from_variable(3, true), lit);
        assert!(Literal::FALSE.is_const());
        assert!(Literal::TRUE.is_const());
        assert_eq!(!Literal::FALSE, Literal::TRUE);
    }

    #[test]
    fn test_parse_game() {
        let circuit = parse(GAME).unwrap();
        assert_eq!(circuit.header(), &Header { m: 5, i: 2, l: 1, o: 1, a: 2 });
        assert_eq!(circuit.inputs(), &[Literal::new(2), Literal::new(4)]);
        assert_eq!(
            circuit.latches(),
            &[Latch {
                state: Literal::new(6),
                next: Literal::new(10),
                reset: Literal::FALSE,
            }]
        );
        assert_eq!(circuit.output(), Literal::new(8));
        assert_eq!(circuit.gates().len(), 2);
        assert_eq!(circuit.gates()[0].right, Literal::new(7));
        assert_eq!(circuit.controlled_inputs(), &[0]);
        assert_eq!(circuit.uncontrolled_inputs(), &[1]);
        assert_eq!(circuit.input_name(0), Some("controllable_grant"));
        assert_eq!(circuit.latch_name(0), Some("state"));
        assert_eq!(circuit.output_name(), Some("err"));
        assert_eq!(circuit.comments(), &["generated by hand".to_string()]);
        assert!(circuit.require_game_partition().is_ok());
        assert!(circuit.output_depends_on_inputs());
    }

    #[test]
    fn test_controllable_marker() {
        assert!(is_controllable("controllable_x"));
        assert!(is_controllable("Controllable_Grant"));
        assert!(is_controllable("req_controllable"));
        assert!(!is_controllable("uncontrollable_x"));
        assert!(!is_controllable("UNCONTROLLABLE_req"));
        assert!(!is_controllable("grant"));
    }

    #[test]
    fn test_missing_partition() {
        let text = "aag 1 1 0 1 0\n2\n2\ni0 request\n";
        let circuit = parse(text).unwrap();
        match circuit.require_game_partition() {
            Err(Error::MissingPartition { controlled, uncontrolled }) => {
                assert_eq!(controlled, 0);
                assert_eq!(uncontrolled, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reset_literal_is_kept_but_ignored() {
        let text = "aag 1 0 1 1 0\n2 3 1\n2\n";
        let circuit = parse(text).unwrap();
        assert_eq!(circuit.latches()[0].reset, Literal::TRUE);
    }

    #[test]
    fn test_output_without_input_dependency() {
        let text = "aag 3 1 1 1 1\n2\n4 6\n4\n6 2 4\n";
        let circuit = parse(text).unwrap();
        assert!(!circuit.output_depends_on_inputs());
    }

    fn format_error_line(text: &str) -> usize {
        match parse(text) {
            Err(Error::Format { line, .. }) => line,
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(format_error_line(""), 1);
        assert_eq!(format_error_line("aig 0 0 0 1 0\n0\n"), 1);
        assert_eq!(format_error_line("aag 1 1 0 1\n2\n2\n"), 1);
        assert_eq!(format_error_line("aag 1 1 0 1 0 0\n2\n2\n"), 1);
        assert_eq!(format_error_line("aag 1 1 0 2 0\n2\n2\n2\n"), 1);
        assert_eq!(format_error_line("aag 2 1 0 1 0\n2\n2\n"), 1);
        assert_eq!(format_error_line("aag x 1 0 1 0\n2\n2\n"), 1);
        // I + L + A overflows and must not wrap around to M.
        assert_eq!(format_error_line("aag 0 18446744073709551615 1 1 0\n"), 1);
        assert_eq!(format_error_line("aag 18446744073709551615 18446744073709551615 1 1 0\n"), 1);
        // Literals of M would not fit.
        assert_eq!(format_error_line("aag 3000000000 3000000000 0 1 0\n2\n"), 1);
    }

    #[test]
    fn test_huge_header_with_truncated_body() {
        assert_eq!(format_error_line("aag 2000000000 2000000000 0 1 0\n2\n"), 3);
        assert_eq!(format_error_line("aag 2000000000 0 0 1 2000000000\n0\n2 0 1\n"), 4);
    }

    #[test]
    fn test_body_errors() {
        // Truncated: missing output line.
        assert_eq!(format_error_line("aag 1 1 0 1 0\n2\n"), 3);
        // Odd input literal.
        assert_eq!(format_error_line("aag 1 1 0 1 0\n3\n2\n"), 2);
        // Literal above M.
        assert_eq!(format_error_line("aag 1 1 0 1 0\n2\n4\n"), 3);
        // Gate with two operands only.
        assert_eq!(format_error_line("aag 2 1 0 1 1\n2\n4\n4 2\n"), 4);
        // Symbol index out of range.
        assert_eq!(format_error_line("aag 1 1 0 1 0\n2\n2\ni1 x\n"), 4);
        // Unknown symbol kind.
        assert_eq!(format_error_line("aag 1 1 0 1 0\n2\n2\nb0 x\n"), 4);
    }

    #[test]
    fn test_duplicate_definition() {
        let text = "aag 2 1 0 1 1\n2\n2\n2 2 3\n";
        assert!(matches!(parse(text), Err(Error::MalformedCircuit(_))));
    }
}
