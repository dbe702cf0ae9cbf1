//! Affine forms and the integer tests run on them.
//!
//! Subscripts and loop bounds are turned into [`LinearExpr`]s over some atom
//! type (iterators, symbols, distances). Anything that is not affine fails to
//! linearize and is treated conservatively by the callers.

use crate::ir::expr::{BinaryOp, Expr, UnaryOp};
use num_integer::Integer;
use std::collections::BTreeMap;

/// `Σ coeff·atom + constant`, with zero coefficients dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearExpr<K: Ord> {
    pub terms: BTreeMap<K, i64>,
    pub constant: i64,
}

impl<K: Ord + Clone> LinearExpr<K> {
    pub fn constant(value: i64) -> Self {
        Self { terms: BTreeMap::new(), constant: value }
    }

    pub fn atom(key: K) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(key, 1);
        Self { terms, constant: 0 }
    }

    pub fn as_constant(&self) -> Option<i64> {
        if self.terms.is_empty() {
            Some(self.constant)
        } else {
            None
        }
    }

    pub fn coeff(&self, key: &K) -> i64 {
        self.terms.get(key).copied().unwrap_or(0)
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let mut terms = self.terms.clone();
        for (k, c) in &other.terms {
            let entry = terms.entry(k.clone()).or_insert(0);
            *entry = entry.checked_add(*c)?;
            if *entry == 0 {
                terms.remove(k);
            }
        }
        Some(Self { terms, constant: self.constant.checked_add(other.constant)? })
    }

    pub fn checked_scale(&self, factor: i64) -> Option<Self> {
        if factor == 0 {
            return Some(Self::constant(0));
        }
        let mut terms = BTreeMap::new();
        for (k, c) in &self.terms {
            terms.insert(k.clone(), c.checked_mul(factor)?);
        }
        Some(Self { terms, constant: self.constant.checked_mul(factor)? })
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.checked_add(&other.checked_scale(-1)?)
    }

    /// Range of values given a range for every atom.
    pub fn range(&self, bound: impl Fn(&K) -> Interval) -> Interval {
        self.terms
            .iter()
            .fold(Interval::point(self.constant), |acc, (k, c)| acc.add(&bound(k).scale(*c)))
    }
}

/// Convert `expr` to an affine form, resolving scalar variables through
/// `resolve`. Returns `None` for anything non-affine.
pub fn linearize<K: Ord + Clone>(
    expr: &Expr,
    resolve: &mut dyn FnMut(&str) -> Option<LinearExpr<K>>,
) -> Option<LinearExpr<K>> {
    match expr {
        Expr::Int(v) => Some(LinearExpr::constant(*v)),
        Expr::Var(name) => resolve(name),
        Expr::Unary { op: UnaryOp::Neg, operand } => linearize(operand, resolve)?.checked_scale(-1),
        Expr::Binary { op, lhs, rhs } => {
            let a = linearize(lhs, resolve)?;
            let b = linearize(rhs, resolve)?;
            match op {
                BinaryOp::Add => a.checked_add(&b),
                BinaryOp::Sub => a.checked_sub(&b),
                BinaryOp::Mul => match (a.as_constant(), b.as_constant()) {
                    (Some(c), _) => b.checked_scale(c),
                    (_, Some(c)) => a.checked_scale(c),
                    _ => None,
                },
                _ => None,
            }
        }
        _ => None,
    }
}

/// Closed integer interval; `None` ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub lo: Option<i64>,
    pub hi: Option<i64>,
}

impl Interval {
    pub fn new(lo: i64, hi: i64) -> Self {
        Self { lo: Some(lo), hi: Some(hi) }
    }

    pub fn point(v: i64) -> Self {
        Self::new(v, v)
    }

    pub fn unbounded() -> Self {
        Self { lo: None, hi: None }
    }

    pub fn at_least(lo: i64) -> Self {
        Self { lo: Some(lo), hi: None }
    }

    pub fn is_empty(&self) -> bool {
        matches!((self.lo, self.hi), (Some(lo), Some(hi)) if lo > hi)
    }

    pub fn add(&self, other: &Interval) -> Interval {
        let sum = |a: Option<i64>, b: Option<i64>| a.zip(b).and_then(|(a, b)| a.checked_add(b));
        Interval { lo: sum(self.lo, other.lo), hi: sum(self.hi, other.hi) }
    }

    pub fn scale(&self, c: i64) -> Interval {
        let mul = |v: Option<i64>| v.and_then(|v| v.checked_mul(c));
        match c.cmp(&0) {
            std::cmp::Ordering::Equal => Interval::point(0),
            std::cmp::Ordering::Greater => Interval { lo: mul(self.lo), hi: mul(self.hi) },
            std::cmp::Ordering::Less => Interval { lo: mul(self.hi), hi: mul(self.lo) },
        }
    }

    pub fn contains_zero(&self) -> bool {
        self.lo.map_or(true, |lo| lo <= 0) && self.hi.map_or(true, |hi| hi >= 0)
    }

    /// Every value is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.hi.map_or(false, |hi| hi < 0)
    }

    /// Every value is non-negative.
    pub fn is_non_negative(&self) -> bool {
        self.lo.map_or(false, |lo| lo >= 0)
    }
}

/// GCD test: whether `Σ coeffs·x = constant` can have an integer solution.
pub fn gcd_test(coeffs: &[i64], constant: i64) -> bool {
    let g = coeffs.iter().fold(0i64, |acc, &c| acc.gcd(&c));
    if g == 0 {
        constant == 0
    } else {
        constant % g == 0
    }
}

/// Banerjee bounds test: whether `Σ coeffs·x + constant` can be zero when
/// every `x` lies in its interval.
pub fn banerjee_test(coeffs: &[i64], constant: i64, bounds: &[Interval]) -> bool {
    coeffs
        .iter()
        .zip(bounds.iter().chain(std::iter::repeat(&Interval::unbounded())))
        .fold(Interval::point(constant), |acc, (&c, b)| acc.add(&b.scale(c)))
        .contains_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::{int, var, load};

    fn sym(name: &str) -> Option<LinearExpr<String>> {
        Some(LinearExpr::atom(name.to_string()))
    }

    #[test]
    fn test_gcd_test() {
        assert!(!gcd_test(&[2, -2], 1));
        assert!(gcd_test(&[2, -2], 0));
        assert!(gcd_test(&[3, -6], 9));
        assert!(!gcd_test(&[3, -6], 10));
        assert!(!gcd_test(&[], 3));
    }

    #[test]
    fn test_banerjee() {
        let b = [Interval::new(0, 9), Interval::new(0, 9)];
        assert!(banerjee_test(&[1, -1], 0, &b));
        assert!(!banerjee_test(&[1, -1], 20, &b));
        assert!(banerjee_test(&[1], 20, &[Interval::unbounded()]));
    }

    #[test]
    fn test_linearize() {
        let e = var("i") * 2 + int(3) - var("j");
        let lin = linearize(&e, &mut sym).unwrap();
        assert_eq!(lin.coeff(&"i".to_string()), 2);
        assert_eq!(lin.coeff(&"j".to_string()), -1);
        assert_eq!(lin.constant, 3);

        assert!(linearize(&(var("i") * var("j")), &mut sym).is_none());
        assert!(linearize(&load("x", vec![var("i")]), &mut sym).is_none());
    }

    #[test]
    fn test_cancellation() {
        let a = linearize(&(var("i") + 2), &mut sym).unwrap();
        let b = linearize(&var("i"), &mut sym).unwrap();
        assert_eq!(a.checked_sub(&b).unwrap().as_constant(), Some(2));
    }

    #[test]
    fn test_interval_arith() {
        let i = Interval::new(0, 3).scale(-2);
        assert_eq!(i, Interval::new(-6, 0));
        let j = Interval::at_least(1).scale(-2).add(&Interval::new(-1, 1));
        assert!(j.is_negative());
        assert!(!j.contains_zero());
        assert!(Interval::new(2, 1).is_empty());
    }
}
