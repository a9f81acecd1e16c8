use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// A reference to a BDD node, potentially negated.
///
/// Uses a 32-bit representation where the least significant bit indicates negation
/// and the remaining bits store the node index.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Ref(u32);

impl Ref {
    /// Creates a new reference with the given node index and negation flag.
    pub const fn new(index: u32, negated: bool) -> Self {
        Self((index << 1) | (negated as u32))
    }

    /// Creates a positive (non-negated) reference.
    pub const fn positive(index: u32) -> Self {
        Self::new(index, false)
    }

    /// Creates a negative (negated) reference.
    pub const fn negative(index: u32) -> Self {
        Self::new(index, true)
    }

    /// Returns the index of the node this reference points to.
    #[inline]
    pub const fn index(self) -> usize {
        (self.0 >> 1) as usize
    }

    /// Returns true if this reference is negated.
    #[inline]
    pub const fn is_negated(self) -> bool {
        (self.0 & 1) != 0
    }

    /// Returns the same reference without the negation flag.
    #[inline]
    pub const fn regular(self) -> Self {
        Self(self.0 & !1)
    }

    /// Returns the raw underlying value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

// -Ref
impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(self.0 ^ 1)
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_negated() {
            write!(f, "~@{}", self.index())
        } else {
            write!(f, "@{}", self.index())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_positive_negative() {
        let pos = Ref::positive(42);
        assert_eq!(pos.index(), 42);
        assert!(!pos.is_negated());

        let neg = Ref::negative(42);
        assert_eq!(neg.index(), 42);
        assert!(neg.is_negated());

        assert_eq!(pos.index(), neg.index());
        assert_ne!(pos, neg);
        assert_eq!(neg.regular(), pos);
    }

    #[test]
    fn test_ref_double_negation() {
        let r = Ref::positive(7);
        assert_eq!(-(-r), r);
        assert_eq!(-r, Ref::negative(7));
    }

    #[test]
    fn test_ref_display() {
        assert_eq!(Ref::positive(3).to_string(), "@3");
        assert_eq!(Ref::negative(3).to_string(), "~@3");
    }
}
