//! Provide the summing component the demo specs are written against.
//!
//! This crate is intentionally tiny and dependency-free. It is the "feature under test" of the demo specs and is
//! never referenced by the harness core.
//!
//! ## Notes
//!
//! - **Width policy**: sums are computed in `i16` with two's-complement wraparound. The width is pinned here (rather
//!   than left to whatever integer type a caller happens to use) so overflow behavior is reproducible:
//!   `sum(0x7FFF, 1) == i16::MIN`.

/// Default left operand carried by [`AplusB::default`].
pub const DEFAULT_A: i16 = 2;
/// Default right operand carried by [`AplusB::default`].
pub const DEFAULT_B: i16 = 3;

/// A component that adds two numbers and carries a pair of sample operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AplusB {
    pub a: i16,
    pub b: i16,
}

impl Default for AplusB {
    fn default() -> Self {
        Self {
            a: DEFAULT_A,
            b: DEFAULT_B,
        }
    }
}

impl AplusB {
    /// Create a component with explicit sample operands.
    pub fn new(a: i16, b: i16) -> Self {
        Self { a, b }
    }

    /// Add two numbers.
    ///
    /// ## Parameters
    /// - `a`: left operand.
    /// - `b`: right operand.
    ///
    /// ## Returns
    /// - (`i16`): `a + b`, wrapped on overflow.
    ///
    /// ## Examples
    /// ```rust
    /// use aplusb::AplusB;
    ///
    /// let feature = AplusB::default();
    /// assert_eq!(feature.sum(11, 22), 33);
    /// assert_eq!(feature.sum(0x7FFF, 1), i16::MIN);
    /// ```
    #[inline]
    pub fn sum(&self, a: i16, b: i16) -> i16 {
        a.wrapping_add(b)
    }

    /// Add the component's own sample operands.
    pub fn sum_members(&self) -> i16 {
        self.sum(self.a, self.b)
    }
}
