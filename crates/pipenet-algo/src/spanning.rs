//! Spanning-tree counting via the Matrix-Tree theorem.
//!
//! The number of spanning trees of a connected multigraph equals any cofactor
//! of its Laplacian `L = D - A`, where off-diagonal entries count parallel
//! pipes. The counter deletes the last row and column and takes the
//! determinant exactly, either fraction-free (Bareiss) over `BigInt` or by
//! plain Gaussian elimination over [`BigRational`].
//!
//! A caller-supplied threshold turns the count into a cheap size gate: as
//! soon as the running determinant (the product of pivots so far) exceeds the
//! threshold in absolute value, elimination stops and `threshold + 1` is
//! returned. That sentinel means "too many to enumerate", never a true count.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::graph::SearchGraph;
use crate::progress::ProgressObserver;
use crate::rational::BigRational;

/// Exact determinant algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeterminantMethod {
    /// Fraction-free elimination over integers
    #[default]
    Bareiss,
    /// Gaussian elimination over exact rationals
    Rational,
}

impl DeterminantMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeterminantMethod::Bareiss => "bareiss",
            DeterminantMethod::Rational => "rational",
        }
    }
}

impl fmt::Display for DeterminantMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeterminantMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bareiss" => Ok(DeterminantMethod::Bareiss),
            "rational" | "gauss" => Ok(DeterminantMethod::Rational),
            _ => Err(format!("Unknown determinant method: {}", s)),
        }
    }
}

/// Counts spanning trees of a [`SearchGraph`].
#[derive(Debug, Clone, Default)]
pub struct SpanningTreeCounter {
    method: DeterminantMethod,
    threshold: Option<BigInt>,
}

impl SpanningTreeCounter {
    pub fn new(method: DeterminantMethod) -> Self {
        Self {
            method,
            threshold: None,
        }
    }

    /// Stop early once the running determinant exceeds `threshold`.
    pub fn with_threshold(mut self, threshold: impl Into<BigInt>) -> Self {
        self.threshold = Some(threshold.into());
        self
    }

    pub fn method(&self) -> DeterminantMethod {
        self.method
    }

    /// The value returned when the threshold is exceeded.
    pub fn sentinel(&self) -> Option<BigInt> {
        self.threshold.as_ref().map(|t| t + 1)
    }

    /// True if `count` is this counter's early-exit sentinel.
    pub fn exceeded(&self, count: &BigInt) -> bool {
        self.sentinel().is_some_and(|s| &s == count)
    }

    pub fn count(&self, graph: &SearchGraph) -> BigInt {
        self.count_with(graph, &())
    }

    pub fn count_with(&self, graph: &SearchGraph, observer: &dyn ProgressObserver) -> BigInt {
        if graph.node_count() <= 1 {
            return BigInt::one();
        }
        let matrix = reduced_laplacian(graph);
        let count = match self.method {
            DeterminantMethod::Bareiss => bareiss(matrix, self.threshold.as_ref(), observer),
            DeterminantMethod::Rational => gaussian(matrix, self.threshold.as_ref(), observer),
        };
        trace!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            method = %self.method,
            %count,
            "spanning trees counted"
        );
        count
    }
}

/// Laplacian with the last row and column removed.
pub fn reduced_laplacian(graph: &SearchGraph) -> Vec<Vec<BigInt>> {
    let size = graph.node_count().saturating_sub(1);
    let mut matrix = vec![vec![BigInt::zero(); size]; size];
    for edge in graph.edges() {
        let (a, b) = (edge.a, edge.b);
        if a < size {
            matrix[a][a] += 1;
        }
        if b < size {
            matrix[b][b] += 1;
        }
        if a < size && b < size {
            matrix[a][b] -= 1;
            matrix[b][a] -= 1;
        }
    }
    matrix
}

fn exceeds(value: &BigInt, threshold: Option<&BigInt>) -> bool {
    threshold.is_some_and(|t| &value.abs() > t)
}

/// Row with the largest magnitude entry in column `k`, from row `k` down.
fn pivot_row<T, F>(matrix: &[Vec<T>], k: usize, magnitude: F) -> Option<usize>
where
    F: Fn(&T) -> Option<T>,
    T: Ord,
{
    let mut best: Option<(usize, T)> = None;
    for (row, values) in matrix.iter().enumerate().skip(k) {
        let Some(abs) = magnitude(&values[k]) else {
            continue;
        };
        if best.as_ref().map_or(true, |(_, current)| abs > *current) {
            best = Some((row, abs));
        }
    }
    best.map(|(row, _)| row)
}

fn bareiss(
    mut m: Vec<Vec<BigInt>>,
    threshold: Option<&BigInt>,
    observer: &dyn ProgressObserver,
) -> BigInt {
    let n = m.len();
    let mut negate = false;
    let mut previous = BigInt::one();

    for k in 0..n {
        let nonzero = |v: &BigInt| (!v.is_zero()).then(|| v.abs());
        let Some(row) = pivot_row(&m, k, nonzero) else {
            return BigInt::zero();
        };
        if row != k {
            m.swap(row, k);
            negate = !negate;
        }
        if exceeds(&m[k][k], threshold) {
            return threshold.map_or_else(BigInt::zero, |t| t + 1);
        }

        for i in k + 1..n {
            for j in k + 1..n {
                let value = (&m[i][j] * &m[k][k] - &m[i][k] * &m[k][j]) / &previous;
                m[i][j] = value;
            }
        }
        previous = m[k][k].clone();
        observer.pivot(k + 1, n);
    }

    let det = if n == 0 { BigInt::one() } else { m[n - 1][n - 1].clone() };
    if negate {
        -det
    } else {
        det
    }
}

fn gaussian(
    matrix: Vec<Vec<BigInt>>,
    threshold: Option<&BigInt>,
    observer: &dyn ProgressObserver,
) -> BigInt {
    let n = matrix.len();
    let mut m: Vec<Vec<BigRational>> = matrix
        .into_iter()
        .map(|row| row.into_iter().map(BigRational::from_integer).collect())
        .collect();
    let mut det = BigRational::one();

    for k in 0..n {
        let nonzero = |v: &BigRational| (!v.is_zero()).then(|| v.abs());
        let Some(row) = pivot_row(&m, k, nonzero) else {
            return BigInt::zero();
        };
        if row != k {
            m.swap(row, k);
            det = -det;
        }
        det = &det * &m[k][k];
        if threshold.is_some_and(|t| det.abs() > BigRational::from_integer(t.clone())) {
            return threshold.map_or_else(BigInt::zero, |t| t + 1);
        }

        let Some(inverse) = m[k][k].recip() else {
            return BigInt::zero();
        };
        for i in k + 1..n {
            if m[i][k].is_zero() {
                continue;
            }
            let factor = &m[i][k] * &inverse;
            for j in k..n {
                let value = &m[i][j] - &(&factor * &m[k][j]);
                m[i][j] = value;
            }
        }
        observer.pivot(k + 1, n);
    }

    // Integer matrix, so the product of pivots is an integer
    det.round()
}
