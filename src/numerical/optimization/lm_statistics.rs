//! Error analysis after convergence: parameter covariance, standard errors of parameters
//! and of the fitted curve, correlation matrix, R² and confidence intervals.
use crate::numerical::optimization::lm_error::LMError;
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};

#[derive(Debug, Clone)]
pub struct ParameterStatistics {
    /// inverse of JtWJ over the fitted parameters; rows/columns of fixed parameters are 0
    pub covariance: DMatrix<f64>,
    pub sigma_p: DVector<f64>,
    /// sigma_p / p, NaN where p == 0
    pub relative_error_p: DVector<f64>,
    pub sigma_y: DVector<f64>,
    /// covariance / (sigma_p sigma_p'), NaN for fixed parameters
    pub corr_p: DMatrix<f64>,
}

impl ParameterStatistics {
    /// statistics from the linearized Hessian JtWJ and Jacobian J at parameters p;
    /// `free` lists the fitted parameters
    pub fn from_hessian(
        jtwj: &DMatrix<f64>,
        j: &DMatrix<f64>,
        p: &DVector<f64>,
        free: &[usize],
    ) -> Result<Self, LMError> {
        let npar = p.len();
        if jtwj.nrows() != npar || jtwj.ncols() != npar {
            return Err(LMError::DimensionMismatch {
                what: "JtWJ".to_string(),
                expected: npar,
                found: jtwj.nrows(),
            });
        }
        if j.ncols() != npar {
            return Err(LMError::DimensionMismatch {
                what: "jacobian columns".to_string(),
                expected: npar,
                found: j.ncols(),
            });
        }
        let covariance = covariance_matrix(jtwj, p, free)?;
        let sigma_p = covariance.diagonal().map(|x| x.sqrt());
        let relative_error_p = relative_errors(&sigma_p, p);

        // standard error of the fit
        let sigma_y = DVector::from_fn(j.nrows(), |i, _| {
            let j_row = j.row(i);
            (j_row * &covariance * j_row.transpose())[(0, 0)].max(0.0).sqrt()
        });

        // parameter correlation matrix
        let sigma_p_outer = &sigma_p * sigma_p.transpose();
        let corr_p = covariance.component_div(&sigma_p_outer);

        Ok(Self {
            covariance,
            sigma_p,
            relative_error_p,
            sigma_y,
            corr_p,
        })
    }
}

/// Inverse of JtWJ restricted to the `free` parameters, by Cholesky factorization.
/// A singular or not positive definite block means an ill-conditioned fit.
pub fn covariance_matrix(
    jtwj: &DMatrix<f64>,
    p: &DVector<f64>,
    free: &[usize],
) -> Result<DMatrix<f64>, LMError> {
    let npar = jtwj.nrows();
    let ill = || LMError::IllConditioned {
        parameters: p.iter().cloned().collect(),
    };
    if free.is_empty() || !jtwj.iter().all(|x| x.is_finite()) {
        return Err(ill());
    }
    let nfree = free.len();
    let block = DMatrix::from_fn(nfree, nfree, |r, c| jtwj[(free[r], free[c])]);
    let inverse = block.cholesky().ok_or_else(ill)?.inverse();
    if !inverse.iter().all(|x| x.is_finite()) || inverse.diagonal().iter().any(|d| *d <= 0.0) {
        return Err(ill());
    }
    let mut covariance = DMatrix::zeros(npar, npar);
    for (r, &i) in free.iter().enumerate() {
        for (c, &k) in free.iter().enumerate() {
            covariance[(i, k)] = inverse[(r, c)];
        }
    }
    Ok(covariance)
}

/// sigma_p/p with NaN marking parameters that are exactly zero
pub fn relative_errors(sigma_p: &DVector<f64>, p: &DVector<f64>) -> DVector<f64> {
    sigma_p.zip_map(p, |s, pi| if pi == 0.0 { f64::NAN } else { s / pi })
}

/// Uniform weight DoF/(dy'dy) used for the error analysis when the fit weights were
/// uniform; None when the residual vanishes and no empirical scale exists.
pub fn uniform_analysis_weight(dof: f64, delta_y: &DVector<f64>) -> Option<f64> {
    let sse = delta_y.dot(delta_y);
    let w = dof / sse;
    if sse > 0.0 && w.is_finite() { Some(w) } else { None }
}

/// coefficient of multiple determination 1 - SS_res/SS_tot
pub fn r_squared(y_dat: &DVector<f64>, y_hat: &DVector<f64>) -> f64 {
    let y_mean = y_dat.mean();
    let ss_tot: f64 = y_dat.iter().map(|&y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = y_dat
        .iter()
        .zip(y_hat.iter())
        .map(|(&y, &yh)| (y - yh).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return f64::NAN;
    }
    1.0 - ss_res / ss_tot
}

/// two sided Student-t quantile t_{1-(1-level)/2, dof}
pub fn t_quantile(level: f64, dof: f64) -> Result<f64, LMError> {
    let dist = StudentsT::new(0.0, 1.0, dof)
        .map_err(|e| LMError::InvalidConfig(format!("Student-t with {} dof: {}", dof, e)))?;
    Ok(dist.inverse_cdf(1.0 - (1.0 - level) / 2.0))
}

/// p_i -/+ t * sigma_p_i for the given confidence level
pub fn confidence_intervals(
    p: &DVector<f64>,
    sigma_p: &DVector<f64>,
    level: f64,
    dof: f64,
) -> Result<Vec<(f64, f64)>, LMError> {
    let t = t_quantile(level, dof)?;
    Ok(p
        .iter()
        .zip(sigma_p.iter())
        .map(|(&pi, &si)| (pi - t * si, pi + t * si))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_singular_hessian_is_ill_conditioned() {
        let jtwj = dmatrix![1.0, 1.0; 1.0, 1.0];
        let j = dmatrix![1.0, 1.0; 1.0, 1.0; 1.0, 1.0];
        let p = dvector![1.0, 2.0];
        let res = ParameterStatistics::from_hessian(&jtwj, &j, &p, &[0, 1]);
        assert_eq!(
            res.unwrap_err(),
            LMError::IllConditioned {
                parameters: vec![1.0, 2.0]
            }
        );
    }

    #[test]
    fn test_indefinite_hessian_is_ill_conditioned() {
        let jtwj = dmatrix![1.0, 2.0; 2.0, 1.0];
        let j = DMatrix::zeros(3, 2);
        let res = ParameterStatistics::from_hessian(&jtwj, &j, &dvector![1.0, 1.0], &[0, 1]);
        assert!(matches!(res, Err(LMError::IllConditioned { .. })));
        let zero = DMatrix::zeros(2, 2);
        let res = ParameterStatistics::from_hessian(&zero, &j, &dvector![1.0, 1.0], &[0, 1]);
        assert!(matches!(res, Err(LMError::IllConditioned { .. })));
    }

    #[test]
    fn test_diagonal_hessian() {
        let jtwj = dmatrix![4.0, 0.0; 0.0, 25.0];
        let j = dmatrix![1.0, 0.0; 0.0, 1.0; 1.0, 1.0];
        let p = dvector![2.0, 0.0];
        let stats = ParameterStatistics::from_hessian(&jtwj, &j, &p, &[0, 1]).unwrap();
        assert_relative_eq!(stats.sigma_p[0], 0.5, epsilon = 1e-14);
        assert_relative_eq!(stats.sigma_p[1], 0.2, epsilon = 1e-14);
        assert_relative_eq!(stats.relative_error_p[0], 0.25, epsilon = 1e-14);
        assert!(stats.relative_error_p[1].is_nan());
        assert_relative_eq!(stats.sigma_y[0], 0.5, epsilon = 1e-14);
        assert_relative_eq!(stats.sigma_y[2], (0.25f64 + 0.04).sqrt(), epsilon = 1e-14);
        assert_relative_eq!(stats.corr_p[(0, 0)], 1.0, epsilon = 1e-14);
        assert_relative_eq!(stats.corr_p[(0, 1)], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_correlation_of_coupled_parameters() {
        let jtwj = dmatrix![2.0, 1.0; 1.0, 2.0];
        let j = DMatrix::identity(2, 2);
        let stats =
            ParameterStatistics::from_hessian(&jtwj, &j, &dvector![1.0, 1.0], &[0, 1]).unwrap();
        // inverse = 1/3 [2 -1; -1 2]
        assert_relative_eq!(stats.covariance[(0, 1)], -1.0 / 3.0, epsilon = 1e-14);
        assert_relative_eq!(stats.corr_p[(0, 1)], -0.5, epsilon = 1e-14);
        assert_relative_eq!(stats.corr_p[(1, 1)], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_fixed_parameter_block() {
        // second parameter fixed: zero row and column in JtWJ
        let jtwj = dmatrix![4.0, 0.0; 0.0, 0.0];
        let j = dmatrix![1.0, 0.0; 2.0, 0.0; 3.0, 0.0];
        let p = dvector![1.0, 7.0];
        assert!(ParameterStatistics::from_hessian(&jtwj, &j, &p, &[0, 1]).is_err());
        let stats = ParameterStatistics::from_hessian(&jtwj, &j, &p, &[0]).unwrap();
        assert_relative_eq!(stats.sigma_p[0], 0.5, epsilon = 1e-14);
        assert_eq!(stats.sigma_p[1], 0.0);
        assert_eq!(stats.covariance[(1, 1)], 0.0);
        assert_relative_eq!(stats.sigma_y[2], 1.5, epsilon = 1e-14);
    }

    #[test]
    fn test_uniform_analysis_weight() {
        let dy = dvector![1.0, -1.0, 2.0];
        assert_eq!(uniform_analysis_weight(3.0, &dy), Some(0.5));
        assert_eq!(uniform_analysis_weight(3.0, &DVector::zeros(3)), None);
    }

    #[test]
    fn test_r_squared() {
        let y = dvector![1.0, 2.0, 3.0];
        assert_relative_eq!(r_squared(&y, &y), 1.0, epsilon = 1e-15);
        let y_hat = dvector![2.0, 2.0, 2.0];
        assert_relative_eq!(r_squared(&y, &y_hat), 0.0, epsilon = 1e-15);
        assert!(r_squared(&dvector![1.0, 1.0], &dvector![1.0, 1.0]).is_nan());
    }

    #[test]
    fn test_confidence_intervals() {
        let t = t_quantile(0.95, 1000.0).unwrap();
        assert_relative_eq!(t, 1.962339, epsilon = 1e-3);
        let t10 = t_quantile(0.95, 10.0).unwrap();
        assert_relative_eq!(t10, 2.228139, epsilon = 1e-4);
        let ci = confidence_intervals(&dvector![1.0, -2.0], &dvector![0.1, 0.0], 0.95, 10.0)
            .unwrap();
        assert_relative_eq!(ci[0].0, 1.0 - 0.1 * t10, epsilon = 1e-12);
        assert_relative_eq!(ci[0].1, 1.0 + 0.1 * t10, epsilon = 1e-12);
        assert_eq!(ci[1], (-2.0, -2.0));
        assert!(t_quantile(0.95, -1.0).is_err());
    }
}
