//! Exact rational numbers over arbitrary-precision integers.
//!
//! Values are kept normalized: the denominator is positive and shares no
//! factor with the numerator, so structural equality is numeric equality.
//! Used by the rational determinant path of the spanning-tree counter.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigRational {
    numer: BigInt,
    denom: BigInt,
}

fn gcd(a: &BigInt, b: &BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

impl BigRational {
    /// `numer / denom`, or `None` when `denom` is zero.
    pub fn new(numer: BigInt, denom: BigInt) -> Option<Self> {
        if denom.is_zero() {
            return None;
        }
        Some(Self::normalized(numer, denom))
    }

    fn normalized(mut numer: BigInt, mut denom: BigInt) -> Self {
        if denom.is_negative() {
            numer = -numer;
            denom = -denom;
        }
        let g = gcd(&numer, &denom);
        if !g.is_zero() && !g.is_one() {
            numer /= &g;
            denom /= &g;
        }
        if numer.is_zero() {
            denom = BigInt::one();
        }
        Self { numer, denom }
    }

    pub fn from_integer(value: BigInt) -> Self {
        Self {
            numer: value,
            denom: BigInt::one(),
        }
    }

    pub fn zero() -> Self {
        Self::from_integer(BigInt::zero())
    }

    pub fn one() -> Self {
        Self::from_integer(BigInt::one())
    }

    pub fn numer(&self) -> &BigInt {
        &self.numer
    }

    pub fn denom(&self) -> &BigInt {
        &self.denom
    }

    pub fn is_zero(&self) -> bool {
        self.numer.is_zero()
    }

    pub fn is_integer(&self) -> bool {
        self.denom.is_one()
    }

    pub fn abs(&self) -> Self {
        Self {
            numer: self.numer.abs(),
            denom: self.denom.clone(),
        }
    }

    /// `1 / self`, or `None` for zero.
    pub fn recip(&self) -> Option<Self> {
        Self::new(self.denom.clone(), self.numer.clone())
    }

    /// Nearest integer, halves rounded away from zero.
    pub fn round(&self) -> BigInt {
        let twice = &self.numer * 2;
        let sign = if self.numer.is_negative() { -1 } else { 1 };
        (twice + &self.denom * sign) / (&self.denom * 2)
    }
}

impl Add for &BigRational {
    type Output = BigRational;
    fn add(self, rhs: Self) -> BigRational {
        if self.denom == rhs.denom {
            return BigRational::normalized(&self.numer + &rhs.numer, self.denom.clone());
        }
        BigRational::normalized(
            &self.numer * &rhs.denom + &rhs.numer * &self.denom,
            &self.denom * &rhs.denom,
        )
    }
}

impl Sub for &BigRational {
    type Output = BigRational;
    fn sub(self, rhs: Self) -> BigRational {
        self + &(-rhs)
    }
}

impl Mul for &BigRational {
    type Output = BigRational;
    fn mul(self, rhs: Self) -> BigRational {
        BigRational::normalized(&self.numer * &rhs.numer, &self.denom * &rhs.denom)
    }
}

impl Neg for &BigRational {
    type Output = BigRational;
    fn neg(self) -> BigRational {
        BigRational {
            numer: -&self.numer,
            denom: self.denom.clone(),
        }
    }
}

impl Add for BigRational {
    type Output = BigRational;
    fn add(self, rhs: Self) -> BigRational {
        &self + &rhs
    }
}

impl Sub for BigRational {
    type Output = BigRational;
    fn sub(self, rhs: Self) -> BigRational {
        &self - &rhs
    }
}

impl Mul for BigRational {
    type Output = BigRational;
    fn mul(self, rhs: Self) -> BigRational {
        &self * &rhs
    }
}

impl Neg for BigRational {
    type Output = BigRational;
    fn neg(self) -> BigRational {
        -&self
    }
}

impl Ord for BigRational {
    fn cmp(&self, other: &Self) -> Ordering {
        // Denominators are positive, so cross-multiplying keeps the order
        (&self.numer * &other.denom).cmp(&(&other.numer * &self.denom))
    }
}

impl PartialOrd for BigRational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BigRational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integer() {
            write!(f, "{}", self.numer)
        } else {
            write!(f, "{}/{}", self.numer, self.denom)
        }
    }
}
