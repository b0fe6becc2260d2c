use crate::numerical::optimization::lm_error::LMError;
use crate::numerical::optimization::lm_jacobian::{
    FitContext, ModelFunction, broyden_update, finite_difference_jacobian,
};
use crate::numerical::optimization::lm_types::Jacobian;
use log::debug;
use nalgebra::{DMatrix, DVector};

/// linearized fitting system of the Levenberg-Marquardt step
#[derive(Debug, Clone)]
pub struct LinearizedSystem {
    /// linearized Hessian matrix J'WJ (inverse of covariance matrix), n x n
    pub jtwj: DMatrix<f64>,
    /// linearized fitting vector J'W(y - y_hat), n x 1
    pub jtwdy: DVector<f64>,
    /// weighted sum of the squared residuals
    pub chi_sq: f64,
    /// model evaluated with parameters p
    pub y_hat: DVector<f64>,
    pub j: Jacobian,
}

impl LinearizedSystem {
    /// assemble J'WJ, J'Wdy and chi-square from a jacobian and a model evaluation
    pub fn assemble(
        j: Jacobian,
        y_hat: DVector<f64>,
        y_dat: &DVector<f64>,
        weight: &DVector<f64>,
    ) -> Self {
        let jm = j.matrix();
        // residual error between model and data
        let delta_y = y_dat - &y_hat;
        let weighted_delta = delta_y.component_mul(weight);
        let chi_sq = delta_y.dot(&weighted_delta);
        let jw = DMatrix::from_fn(jm.nrows(), jm.ncols(), |i, k| jm[(i, k)] * weight[i]);
        let jtwj = jm.transpose() * jw;
        let jtwdy = jm.transpose() * weighted_delta;
        Self {
            jtwj,
            jtwdy,
            chi_sq,
            y_hat,
            j,
        }
    }

    pub fn max_abs_gradient(&self) -> f64 {
        self.jtwdy.amax()
    }
}

/// Evaluate the model at p, refresh the Jacobian and build the linearized system.
/// The Jacobian comes from finite differences when they are due (every 2n iterations or
/// after chi-square went up, dx2 > 0), otherwise from a Broyden update using the
/// previous accepted state (p_old, y_old). Pass dx2 > 0 to force finite differences.
pub fn lm_matx<M: ModelFunction + ?Sized>(
    ctx: &mut FitContext<M>,
    p_old: &DVector<f64>,
    y_old: &DVector<f64>,
    dx2: f64,
    j: &Jacobian,
    p: &DVector<f64>,
    y_dat: &DVector<f64>,
    weight: &DVector<f64>,
) -> Result<LinearizedSystem, LMError> {
    if weight.len() != y_dat.len() {
        return Err(LMError::DimensionMismatch {
            what: "weight vector".to_string(),
            expected: y_dat.len(),
            found: weight.len(),
        });
    }
    let y_hat = ctx.evaluate(p)?;
    let j_new = if ctx.finite_difference_due(dx2) {
        debug!("iteration {}: finite difference jacobian", ctx.iteration);
        finite_difference_jacobian(ctx, p, &y_hat)?
    } else {
        debug!("iteration {}: Broyden rank-1 update", ctx.iteration);
        broyden_update(p_old, y_old, j, p, &y_hat)
    };
    Ok(LinearizedSystem::assemble(j_new, y_hat, y_dat, weight))
}
