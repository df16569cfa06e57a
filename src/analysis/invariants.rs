//! 结构不变量分析
//!
//! * P-不变量：满足 `y·C = 0` 的库所权向量，即 `Cᵗ` 的零空间；
//! * T-不变量：满足 `C·x = 0` 的迁移计数向量，即 `C` 的零空间。
//!
//! 零空间由奇异值分解给出：右奇异向量中对应奇异值 `≤ ε` 的那些张成零空间。
//! 两族不变量彼此独立计算，一族数值失败不影响另一族。

use std::fmt;

use nalgebra::{DMatrix, DVector, SVD};
use serde::Serialize;
use thiserror::Error;

use crate::net::ids::PlaceId;
use crate::net::incidence::Incidence;
use crate::net::index_vec::Idx;
use crate::net::structure::{Marking, Tokens};

/// Singular values at or below this are treated as zero.
pub const DEFAULT_NULL_SPACE_EPSILON: f64 = 1e-10;
/// Cutoff used by the older matrix-analysis variant. Kept selectable through
/// `AnalysisConfig::null_space_epsilon`; it can merge nearly-dependent rows
/// into spurious invariants on badly scaled nets.
pub const LEGACY_NULL_SPACE_EPSILON: f64 = 1e-5;
/// Beyond 15 decimals `f64` has no digits left and `10^d` soon overflows.
pub const MAX_ROUNDING_DECIMALS: u32 = 15;
/// An entry counts as positive (for full/partial) above this value.
const POSITIVE_ENTRY_THRESHOLD: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InvariantConfig {
    pub epsilon: f64,
    pub rounding_decimals: u32,
    pub max_iterations: usize,
}

impl Default for InvariantConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_NULL_SPACE_EPSILON,
            rounding_decimals: 3,
            max_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvariantKind {
    Place,
    Transition,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvariantKind::Place => "P-invariant",
            InvariantKind::Transition => "T-invariant",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Coverage {
    /// Every place (transition) carries a strictly positive weight.
    Full,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum NumericalFailure {
    #[error("matrix contains non-finite entries")]
    NonFinite,
    #[error("SVD of the {rows}x{cols} matrix did not converge within {max_iterations} iterations")]
    NoConvergence {
        rows: usize,
        cols: usize,
        max_iterations: usize,
    },
    #[error("SVD did not produce right singular vectors")]
    MissingSingularVectors,
}

/// A numerical failure attached to the invariant family it prevented.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyFailure {
    pub kind: InvariantKind,
    pub error: NumericalFailure,
}

impl fmt::Display for FamilyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} computation failed: {}", self.kind, self.error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invariant {
    pub kind: InvariantKind,
    /// Unit-length null-space vector after sign normalisation.
    pub weights: Vec<f64>,
    /// `weights` rounded for presentation.
    pub rounded: Vec<f64>,
    pub coverage: Coverage,
}

impl Invariant {
    fn from_null_vector(kind: InvariantKind, vector: &DVector<f64>, decimals: u32) -> Self {
        let mut weights: Vec<f64> = vector
            .iter()
            .map(|&v| if v.abs() <= POSITIVE_ENTRY_THRESHOLD { 0.0 } else { v })
            .collect();
        if weights.iter().any(|&v| v < 0.0) {
            for value in &mut weights {
                *value = -*value;
            }
        }
        let rounded: Vec<f64> = weights.iter().map(|&v| round_to(v, decimals)).collect();
        let coverage = if !rounded.is_empty() && rounded.iter().all(|&v| v > POSITIVE_ENTRY_THRESHOLD) {
            Coverage::Full
        } else {
            Coverage::Partial
        };
        Self {
            kind,
            weights,
            rounded,
            coverage,
        }
    }

    pub fn is_full(&self) -> bool {
        self.coverage == Coverage::Full
    }

    /// Indices with a nonzero weight.
    pub fn support(&self) -> Vec<usize> {
        self.weights
            .iter()
            .enumerate()
            .filter(|(_, w)| w.abs() > POSITIVE_ENTRY_THRESHOLD)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// `y·M` for a P-invariant. `None` for T-invariants, for markings of the
    /// wrong length, and when a weighted place holds ω.
    pub fn weighted_sum(&self, marking: &Marking) -> Option<f64> {
        if self.kind != InvariantKind::Place || marking.len() != self.weights.len() {
            return None;
        }
        let mut sum = 0.0;
        for (idx, weight) in self.weights.iter().enumerate() {
            match marking.tokens(PlaceId::from_usize(idx)) {
                Tokens::Finite(count) => sum += weight * count as f64,
                Tokens::Omega if weight.abs() > POSITIVE_ENTRY_THRESHOLD => return None,
                Tokens::Omega => {}
            }
        }
        Some(sum)
    }

    /// Largest absolute entry of `y·C` (P-invariant) or `C·x` (T-invariant).
    pub fn residual(&self, c: &Incidence<i64>) -> f64 {
        let matrix = to_dmatrix(c);
        let vector = DVector::from_column_slice(&self.weights);
        let product = match self.kind {
            InvariantKind::Place => matrix.transpose() * vector,
            InvariantKind::Transition => matrix * vector,
        };
        product.amax()
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, value) in self.rounded.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    // `+ 0.0` folds -0.0 into 0.0
    (value * scale).round() / scale + 0.0
}

/// Source of null-space bases. The default is [`SvdSolver`].
pub trait NullSpaceSolver {
    /// Basis of `{ x | matrix · x = 0 }`.
    fn null_space(&self, matrix: &DMatrix<f64>) -> Result<Vec<DVector<f64>>, NumericalFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvdSolver {
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl NullSpaceSolver for SvdSolver {
    fn null_space(&self, matrix: &DMatrix<f64>) -> Result<Vec<DVector<f64>>, NumericalFailure> {
        let (rows, cols) = matrix.shape();
        if cols == 0 {
            return Ok(Vec::new());
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(NumericalFailure::NonFinite);
        }

        // 补零行使 V 为完整的 cols × cols 基
        let padded = if rows < cols {
            let mut padded = DMatrix::zeros(cols, cols);
            padded.view_mut((0, 0), (rows, cols)).copy_from(matrix);
            padded
        } else {
            matrix.clone()
        };

        let svd = SVD::try_new(padded, false, true, f64::EPSILON, self.max_iterations).ok_or(
            NumericalFailure::NoConvergence {
                rows,
                cols,
                max_iterations: self.max_iterations,
            },
        )?;
        let v_t = svd.v_t.ok_or(NumericalFailure::MissingSingularVectors)?;

        Ok(svd
            .singular_values
            .iter()
            .enumerate()
            .filter(|(_, sigma)| **sigma <= self.epsilon)
            .map(|(idx, _)| v_t.row(idx).transpose())
            .collect())
    }
}

/// Exact integer bases, computed by rational elimination.
#[cfg(feature = "exact-invariants")]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExactInvariants {
    pub place: Vec<Vec<num::BigInt>>,
    pub transition: Vec<Vec<num::BigInt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantAnalysis {
    pub p_invariants: Vec<Invariant>,
    pub t_invariants: Vec<Invariant>,
    pub errors: Vec<FamilyFailure>,
    #[cfg(feature = "exact-invariants")]
    #[serde(skip)]
    pub exact: ExactInvariants,
}

impl InvariantAnalysis {
    pub fn full_p_invariants(&self) -> impl Iterator<Item = &Invariant> {
        self.p_invariants.iter().filter(|inv| inv.is_full())
    }

    pub fn full_t_invariants(&self) -> impl Iterator<Item = &Invariant> {
        self.t_invariants.iter().filter(|inv| inv.is_full())
    }

    pub fn failed(&self, kind: InvariantKind) -> Option<&NumericalFailure> {
        self.errors
            .iter()
            .find(|failure| failure.kind == kind)
            .map(|failure| &failure.error)
    }
}

pub struct InvariantAnalyzer<S = SvdSolver> {
    solver: S,
    rounding_decimals: u32,
}

impl InvariantAnalyzer<SvdSolver> {
    pub fn new(config: InvariantConfig) -> Self {
        Self {
            solver: SvdSolver {
                epsilon: config.epsilon,
                // nalgebra 把 0 当作不限迭代次数
                max_iterations: config.max_iterations.max(1),
            },
            rounding_decimals: config.rounding_decimals.min(MAX_ROUNDING_DECIMALS),
        }
    }
}

impl Default for InvariantAnalyzer<SvdSolver> {
    fn default() -> Self {
        Self::new(InvariantConfig::default())
    }
}

impl<S: NullSpaceSolver> InvariantAnalyzer<S> {
    pub fn with_solver(solver: S, rounding_decimals: u32) -> Self {
        Self {
            solver,
            rounding_decimals: rounding_decimals.min(MAX_ROUNDING_DECIMALS),
        }
    }

    /// Both families; a failure in one is recorded and the other proceeds.
    pub fn analyze(&self, c: &Incidence<i64>) -> InvariantAnalysis {
        let mut errors = Vec::new();

        let p_invariants = self.p_invariants(c).unwrap_or_else(|error| {
            log::warn!("P-invariant computation failed: {error}");
            errors.push(FamilyFailure {
                kind: InvariantKind::Place,
                error,
            });
            Vec::new()
        });
        let t_invariants = self.t_invariants(c).unwrap_or_else(|error| {
            log::warn!("T-invariant computation failed: {error}");
            errors.push(FamilyFailure {
                kind: InvariantKind::Transition,
                error,
            });
            Vec::new()
        });

        log::info!(
            "found {} P-invariant(s) ({} full), {} T-invariant(s) ({} full)",
            p_invariants.len(),
            p_invariants.iter().filter(|inv| inv.is_full()).count(),
            t_invariants.len(),
            t_invariants.iter().filter(|inv| inv.is_full()).count(),
        );

        InvariantAnalysis {
            p_invariants,
            t_invariants,
            errors,
            #[cfg(feature = "exact-invariants")]
            exact: ExactInvariants {
                place: exact::place_invariants(c),
                transition: exact::transition_invariants(c),
            },
        }
    }

    /// Null space of `Cᵗ`.
    pub fn p_invariants(&self, c: &Incidence<i64>) -> Result<Vec<Invariant>, NumericalFailure> {
        let basis = self.solver.null_space(&to_dmatrix(c).transpose())?;
        Ok(self.collect(InvariantKind::Place, basis))
    }

    /// Null space of `C`.
    pub fn t_invariants(&self, c: &Incidence<i64>) -> Result<Vec<Invariant>, NumericalFailure> {
        let basis = self.solver.null_space(&to_dmatrix(c))?;
        Ok(self.collect(InvariantKind::Transition, basis))
    }

    fn collect(&self, kind: InvariantKind, basis: Vec<DVector<f64>>) -> Vec<Invariant> {
        basis
            .iter()
            .map(|vector| Invariant::from_null_vector(kind, vector, self.rounding_decimals))
            .collect()
    }
}

fn to_dmatrix(c: &Incidence<i64>) -> DMatrix<f64> {
    DMatrix::from_fn(c.places(), c.transitions(), |p, t| {
        c.row(PlaceId::from_usize(p))[t] as f64
    })
}

#[cfg(feature = "exact-invariants")]
pub mod exact {
    //! 有理数高斯消元求整数零空间基，用于精确校验守恒性。
    use num::bigint::BigInt;
    use num::integer::Integer;
    use num::rational::BigRational;
    use num::traits::{One, Signed, Zero};

    use crate::net::incidence::Incidence;

    pub fn place_invariants(c: &Incidence<i64>) -> Vec<Vec<BigInt>> {
        let mut transposed = vec![vec![BigInt::zero(); c.places()]; c.transitions()];
        for (place, row) in c.rows().iter().enumerate() {
            for (transition, value) in row.iter().enumerate() {
                transposed[transition][place] = BigInt::from(*value);
            }
        }
        compute_nullspace(&transposed, c.places())
    }

    pub fn transition_invariants(c: &Incidence<i64>) -> Vec<Vec<BigInt>> {
        let data = c
            .rows()
            .iter()
            .map(|row| row.iter().map(|v| BigInt::from(*v)).collect())
            .collect::<Vec<Vec<BigInt>>>();
        compute_nullspace(&data, c.transitions())
    }

    fn compute_nullspace(matrix: &[Vec<BigInt>], cols: usize) -> Vec<Vec<BigInt>> {
        if cols == 0 {
            return Vec::new();
        }

        let rows = matrix.len();
        let mut rref = matrix
            .iter()
            .map(|row| {
                row.iter()
                    .cloned()
                    .map(BigRational::from_integer)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let mut pivot_cols = Vec::new();
        let mut pivot_row = 0usize;

        for col in 0..cols {
            if pivot_row >= rows {
                break;
            }
            let Some(row_idx) = (pivot_row..rows).find(|&row| !rref[row][col].is_zero()) else {
                continue;
            };
            rref.swap(row_idx, pivot_row);

            let pivot_value = rref[pivot_row][col].clone();
            for value in rref[pivot_row].iter_mut() {
                *value /= pivot_value.clone();
            }

            for row in 0..rows {
                if row == pivot_row || rref[row][col].is_zero() {
                    continue;
                }
                let factor = rref[row][col].clone();
                for inner in col..cols {
                    let adjustment = rref[pivot_row][inner].clone() * factor.clone();
                    rref[row][inner] -= adjustment;
                }
            }

            pivot_cols.push(col);
            pivot_row += 1;
        }

        let mut is_pivot = vec![false; cols];
        for &col in &pivot_cols {
            is_pivot[col] = true;
        }

        (0..cols)
            .filter(|&col| !is_pivot[col])
            .map(|free_col| {
                let mut vector = vec![BigRational::zero(); cols];
                vector[free_col] = BigRational::one();
                for (pivot_index, &pivot_col) in pivot_cols.iter().enumerate() {
                    vector[pivot_col] = -rref[pivot_index][free_col].clone();
                }
                normalize(to_integer(vector))
            })
            .collect()
    }

    fn to_integer(vector: Vec<BigRational>) -> Vec<BigInt> {
        let lcm = vector
            .iter()
            .fold(BigInt::one(), |acc, value| acc.lcm(value.denom()));
        vector
            .into_iter()
            .map(|value| value.numer() * (&lcm / value.denom()))
            .collect()
    }

    /// Divides by the gcd and flips the sign if any entry is negative.
    fn normalize(mut vector: Vec<BigInt>) -> Vec<BigInt> {
        let gcd = vector
            .iter()
            .filter(|value| !value.is_zero())
            .fold(BigInt::zero(), |acc, value| acc.gcd(&value.abs()));
        if !gcd.is_zero() && !gcd.is_one() {
            for value in &mut vector {
                *value /= gcd.clone();
            }
        }
        if vector.iter().any(|value| value.is_negative()) {
            for value in &mut vector {
                *value = -value.clone();
            }
        }
        vector
    }
}
