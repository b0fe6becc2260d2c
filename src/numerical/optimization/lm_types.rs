//! Named, size-checked containers used by the fit: parameters, observations, jacobian,
//! weights, convergence history and the final result.
use crate::numerical::optimization::lm_error::LMError;
use nalgebra::{DMatrix, DVector};
use std::fmt;

/// ordered vector of n finite parameter values
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterVector(DVector<f64>);

impl ParameterVector {
    pub fn new(p: DVector<f64>) -> Result<Self, LMError> {
        if p.is_empty() {
            return Err(LMError::EmptyData);
        }
        if !p.iter().all(|x| x.is_finite()) {
            return Err(LMError::NonFiniteData);
        }
        Ok(Self(p))
    }

    pub fn from_vec(p: Vec<f64>) -> Result<Self, LMError> {
        Self::new(DVector::from_vec(p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_dvector(&self) -> &DVector<f64> {
        &self.0
    }

    pub fn into_inner(self) -> DVector<f64> {
        self.0
    }
}

/// (t_i, y_i) pairs to be fitted; t is assumed error free
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    t: DVector<f64>,
    y: DVector<f64>,
}

impl Observations {
    pub fn new(t: DVector<f64>, y: DVector<f64>) -> Result<Self, LMError> {
        if t.len() != y.len() {
            return Err(LMError::LengthMismatch {
                t_len: t.len(),
                y_len: y.len(),
            });
        }
        if y.is_empty() {
            return Err(LMError::EmptyData);
        }
        if !t.iter().chain(y.iter()).all(|x| x.is_finite()) {
            return Err(LMError::NonFiniteData);
        }
        Ok(Self { t, y })
    }

    pub fn from_slices(t: &[f64], y: &[f64]) -> Result<Self, LMError> {
        Self::new(DVector::from_column_slice(t), DVector::from_column_slice(y))
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn t(&self) -> &DVector<f64> {
        &self.t
    }

    pub fn y(&self) -> &DVector<f64> {
        &self.y
    }
}

/// (m x n) matrix J(i,j) = dy_hat(i)/dp(j)
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian(DMatrix<f64>);

impl Jacobian {
    pub fn zeros(npnt: usize, npar: usize) -> Self {
        Self(DMatrix::zeros(npnt, npar))
    }

    pub fn from_matrix(j: DMatrix<f64>, npnt: usize, npar: usize) -> Result<Self, LMError> {
        if j.nrows() != npnt {
            return Err(LMError::DimensionMismatch {
                what: "jacobian rows".to_string(),
                expected: npnt,
                found: j.nrows(),
            });
        }
        if j.ncols() != npar {
            return Err(LMError::DimensionMismatch {
                what: "jacobian columns".to_string(),
                expected: npar,
                found: j.ncols(),
            });
        }
        Ok(Self(j))
    }

    pub fn nrows(&self) -> usize {
        self.0.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.0.ncols()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.0
    }

    pub(crate) fn matrix_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.0
    }

    pub fn into_inner(self) -> DMatrix<f64> {
        self.0
    }
}

/// weights of the least squares fit: inverse of the squared measurement errors
#[derive(Debug, Clone, PartialEq)]
pub enum WeightVector {
    Uniform { value: f64, len: usize },
    PerObservation(DVector<f64>),
}

impl WeightVector {
    pub fn uniform(value: f64, len: usize) -> Result<Self, LMError> {
        if !value.is_finite() {
            return Err(LMError::NonFiniteData);
        }
        if value < 0.0 {
            return Err(LMError::NegativeWeight { index: 0, value });
        }
        Ok(WeightVector::Uniform { value, len })
    }

    /// per-observation weights; a vector with zero variance collapses into a uniform weight
    pub fn per_observation(w: DVector<f64>) -> Result<Self, LMError> {
        if w.is_empty() {
            return Err(LMError::EmptyData);
        }
        if let Some((index, value)) = w.iter().enumerate().find(|(_, x)| **x < 0.0) {
            return Err(LMError::NegativeWeight {
                index,
                value: *value,
            });
        }
        if !w.iter().all(|x| x.is_finite()) {
            return Err(LMError::NonFiniteData);
        }
        if w.iter().all(|x| *x == w[0]) {
            return Ok(WeightVector::Uniform {
                value: w[0].abs(),
                len: w.len(),
            });
        }
        Ok(WeightVector::PerObservation(w))
    }

    /// default weight 1/(y'y) broadcast to all observations
    pub fn default_for(y: &DVector<f64>) -> Result<Self, LMError> {
        Self::uniform(1.0 / y.dot(y), y.len())
    }

    pub fn len(&self) -> usize {
        match self {
            WeightVector::Uniform { len, .. } => *len,
            WeightVector::PerObservation(w) => w.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self, WeightVector::Uniform { .. })
    }

    pub fn to_dvector(&self) -> DVector<f64> {
        match self {
            WeightVector::Uniform { value, len } => DVector::from_element(*len, *value),
            WeightVector::PerObservation(w) => w.clone(),
        }
    }
}

/// one row of the convergence history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub func_calls: usize,
    pub reduced_chi_sq: f64,
    pub lambda: f64,
    pub parameters: DVector<f64>,
}

/// append-only record of the fit, one row per completed iteration
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceHistory {
    npar: usize,
    rows: Vec<HistoryRow>,
}

impl ConvergenceHistory {
    pub fn with_capacity(npar: usize, max_iterations: usize) -> Self {
        Self {
            npar,
            rows: Vec::with_capacity(max_iterations),
        }
    }

    pub fn push(
        &mut self,
        func_calls: usize,
        reduced_chi_sq: f64,
        lambda: f64,
        parameters: &DVector<f64>,
    ) -> Result<(), LMError> {
        if parameters.len() != self.npar {
            return Err(LMError::DimensionMismatch {
                what: "history parameters".to_string(),
                expected: self.npar,
                found: parameters.len(),
            });
        }
        self.rows.push(HistoryRow {
            func_calls,
            reduced_chi_sq,
            lambda,
            parameters: parameters.clone(),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[HistoryRow] {
        &self.rows
    }

    pub fn last(&self) -> Option<&HistoryRow> {
        self.rows.last()
    }

    pub fn npar(&self) -> usize {
        self.npar
    }

    /// columns: function calls, reduced chi-square, lambda, parameters...
    pub fn to_matrix(&self) -> DMatrix<f64> {
        let ncols = self.npar + 3;
        DMatrix::from_fn(self.rows.len(), ncols, |i, j| {
            let row = &self.rows[i];
            match j {
                0 => row.func_calls as f64,
                1 => row.reduced_chi_sq,
                2 => row.lambda,
                _ => row.parameters[j - 3],
            }
        })
    }
}

/// why the fit loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// max|JtWdy| fell below gradient_tolerance
    ConvergedGradient,
    /// max(|h|/|p|) fell below parameter_tolerance
    ConvergedParameters,
    MaxIterations,
    /// a trial step produced NaN or infinite residuals
    NonFinite,
    Cancelled,
}

impl FitStatus {
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            FitStatus::ConvergedGradient | FitStatus::ConvergedParameters
        )
    }
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FitStatus::ConvergedGradient => write!(f, "convergence in r.h.s. (JtWdy)"),
            FitStatus::ConvergedParameters => write!(f, "convergence in parameters"),
            FitStatus::MaxIterations => {
                write!(f, "maximum number of iterations reached without convergence")
            }
            FitStatus::NonFinite => write!(f, "stopped on non-finite residuals"),
            FitStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// outcome of a fit; produced once when the loop terminates
#[derive(Debug, Clone)]
pub struct FitResult {
    /// least-squares optimal estimate of the parameter values
    pub p: DVector<f64>,
    pub status: FitStatus,
    pub iterations: usize,
    pub func_calls: usize,
    /// reduced chi-square with the weights used during fitting
    pub reduced_chi_sq: f64,
    /// reduced chi-square with the error-analysis weights (close to 1 for uniform weights)
    pub reduced_chi_sq_scaled: f64,
    /// asymptotic standard error of the parameters
    pub sigma_p: DVector<f64>,
    /// sigma_p / p, NaN where p is exactly zero
    pub relative_error_p: DVector<f64>,
    /// asymptotic standard error of the curve-fit
    pub sigma_y: DVector<f64>,
    pub corr_p: DMatrix<f64>,
    pub covariance: DMatrix<f64>,
    /// JtWJ at the solution (inverse of the covariance matrix)
    pub jtwj: DMatrix<f64>,
    /// coefficient of multiple determination
    pub r_sq: f64,
    /// (lower, upper) confidence bounds of every parameter
    pub confidence_intervals: Vec<(f64, f64)>,
    pub y_hat: DVector<f64>,
    pub cvg_hst: ConvergenceHistory,
}
