//! Levenberg-Marquardt curve fitting in the formulation of H.P. Gavin,
//! "The Levenberg-Marquardt algorithm for nonlinear least squares curve-fitting problems".
//!
//! Minimizes the weighted sum of squared residuals
//! chi_sq = (y_dat - y_hat(p))' W (y_dat - y_hat(p))
//! of a model y_hat = f(t, p). The Jacobian comes from finite differences every 2n
//! iterations (or when chi_sq went up) and from Broyden rank-1 updates in between.
//! After the loop the error analysis gives covariance, standard errors, correlations,
//! R² and confidence intervals of the parameters.
//! ```no_run
//! use nalgebra::DVector;
//! use RustedLMFit::numerical::optimization::lm_config::LMConfig;
//! use RustedLMFit::numerical::optimization::lm_gavin::LevenbergMarquardtGavin;
//! let t = DVector::from_vec((0..20).map(|i| i as f64 * 0.2).collect());
//! let y = t.map(|ti| 5.0 * (-0.8 * ti).exp());
//! let model = |t: &DVector<f64>, p: &DVector<f64>| t.map(|ti| p[0] * (-p[1] * ti).exp());
//! let lm = LevenbergMarquardtGavin::new(model, LMConfig::default());
//! let result = lm.fit(DVector::from_vec(vec![4.0, 0.6]), &t, &y).unwrap();
//! println!("p = {}, status: {}", result.p, result.status);
//! ```
use crate::Utils::logger::init_logger;
use crate::numerical::optimization::lm_config::{DampingUpdate, LMConfig};
use crate::numerical::optimization::lm_damping::DampingState;
use crate::numerical::optimization::lm_error::LMError;
use crate::numerical::optimization::lm_jacobian::{FitContext, ModelFunction};
use crate::numerical::optimization::lm_matx::{LinearizedSystem, lm_matx};
use crate::numerical::optimization::lm_statistics::{
    ParameterStatistics, confidence_intervals, r_squared, uniform_analysis_weight,
};
use crate::numerical::optimization::lm_types::{
    ConvergenceHistory, FitResult, FitStatus, Jacobian, Observations, ParameterVector,
    WeightVector,
};
use log::{debug, error, info, warn};
use nalgebra::DVector;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct LevenbergMarquardtGavin<M: ModelFunction> {
    model: M,
    pub config: LMConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl<M: ModelFunction> LevenbergMarquardtGavin<M> {
    pub fn new(model: M, config: LMConfig) -> Self {
        Self {
            model,
            config,
            cancel: None,
        }
    }

    /// the fit stops with `FitStatus::Cancelled` at the start of the first iteration
    /// after the token was set
    pub fn with_cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|token| token.load(Ordering::Relaxed))
    }

    /// fit with the default uniform weight 1/(y'y)
    pub fn fit(
        &self,
        p0: DVector<f64>,
        t: &DVector<f64>,
        y_dat: &DVector<f64>,
    ) -> Result<FitResult, LMError> {
        if t.len() != y_dat.len() {
            return Err(LMError::LengthMismatch {
                t_len: t.len(),
                y_len: y_dat.len(),
            });
        }
        let y_norm_sq = y_dat.dot(y_dat);
        let weights = if y_norm_sq > 0.0 {
            WeightVector::default_for(y_dat)?
        } else {
            WeightVector::uniform(1.0, y_dat.len())?
        };
        self.fit_weighted(p0, t, y_dat, weights)
    }

    /// fit with caller supplied weights (inverse of the measurement error variances)
    pub fn fit_weighted(
        &self,
        p0: DVector<f64>,
        t: &DVector<f64>,
        y_dat: &DVector<f64>,
        weights: WeightVector,
    ) -> Result<FitResult, LMError> {
        self.config.validate()?;
        let loglevel = self.config.loglevel.as_deref();
        if init_logger(loglevel, false)? {
            info!("LM fitting started with loglevel: {:?}", loglevel);
        }
        let res = self.solver(p0, t, y_dat, weights);
        if let Err(e) = &res {
            error!("LM fitting failed: {}", e);
        }
        res
    }

    fn solver(
        &self,
        p0: DVector<f64>,
        t: &DVector<f64>,
        y_dat: &DVector<f64>,
        weights: WeightVector,
    ) -> Result<FitResult, LMError> {
        let config = &self.config;
        let obs = Observations::new(t.clone(), y_dat.clone())?;
        let p0 = ParameterVector::new(p0)?;
        let npar = p0.len();
        let npnt = obs.len();
        if let Some(expected) = self.model.parameter_count() {
            if expected != npar {
                return Err(LMError::DimensionMismatch {
                    what: format!("parameters of model '{}'", self.model.name()),
                    expected,
                    found: npar,
                });
            }
        }
        if npnt <= npar {
            return Err(LMError::TooFewObservations {
                observations: npnt,
                parameters: npar,
            });
        }
        if weights.len() != npnt {
            return Err(LMError::DimensionMismatch {
                what: "weight vector".to_string(),
                expected: npnt,
                found: weights.len(),
            });
        }
        let dp = config.finite_difference_step.resolve(npar)?;
        let (p_min, p_max) = config.bounds(p0.as_dvector())?;
        let weight = weights.to_dvector();
        let y_dat = obs.y();

        let mut ctx = FitContext::new(&self.model, obs.t(), dp);
        let free = ctx.free_parameters();
        if free.is_empty() {
            return Err(LMError::InvalidConfig(
                "every parameter is held fixed (finite_difference_step is zero)".to_string(),
            ));
        }
        let dof = (npnt - npar + 1) as f64;
        info!(
            "fitting model '{}': {} parameters ({} free), {} observations, damping update {}",
            self.model.name(),
            npar,
            free.len(),
            npnt,
            config.damping_update
        );

        let mut p = clip(p0.as_dvector(), &p_min, &p_max);
        if &p != p0.as_dvector() {
            warn!(
                "initial guess lies outside the parameter bounds, clipped to {:?}",
                p.as_slice()
            );
        }
        let mut p_old = DVector::zeros(npar);
        let mut y_old = DVector::zeros(npnt);

        // initialize Jacobian with finite difference calculation
        let mut sys = lm_matx(
            &mut ctx,
            &p_old,
            &y_old,
            1.0,
            &Jacobian::zeros(npnt, npar),
            &p,
            y_dat,
            &weight,
        )?;
        if !sys.chi_sq.is_finite() || !sys.jtwj.iter().all(|x| x.is_finite()) {
            error!("model gives non-finite values at the initial guess");
            return Err(LMError::NonFiniteData);
        }
        if sys.max_abs_gradient() < config.gradient_tolerance {
            info!("*** Your Initial Guess is Extremely Close to Optimal ***");
        }

        let mut damping = DampingState::new(
            config.damping_update,
            config.initial_damping,
            config.damping_up_factor,
            config.damping_down_factor,
            &sys.jtwj,
        );
        let mut x2 = sys.chi_sq;
        // previous value of chi_sq
        let mut x2_old = x2;
        let mut cvg_hst = ConvergenceHistory::with_capacity(npar, config.max_iterations);

        let status = loop {
            if self.is_cancelled() {
                warn!("fit cancelled after {} iterations", cvg_hst.len());
                break FitStatus::Cancelled;
            }
            ctx.iteration += 1;
            let iteration = ctx.iteration;

            // incremental change in parameters
            let mut h = solve_step(&damping, &sys, &free, iteration)?;
            let mut p_try = clip(&(&p + &h), &p_min, &p_max);
            let Some(mut x2_try) = trial_chi_sq(&mut ctx, &p_try, y_dat, &weight)? else {
                warn!("non-finite residuals at iteration {}, stopping", iteration);
                break FitStatus::NonFinite;
            };

            let mut alpha = 1.0;
            if config.damping_update == DampingUpdate::Quadratic {
                // line search along h
                let jtwdy_h = sys.jtwdy.dot(&h);
                alpha = jtwdy_h / ((x2_try - x2) / 2.0 + 2.0 * jtwdy_h);
                if !alpha.is_finite() {
                    alpha = 1.0;
                }
                h *= alpha;
                p_try = clip(&(&p + &h), &p_min, &p_max);
                match trial_chi_sq(&mut ctx, &p_try, y_dat, &weight)? {
                    Some(x2_scaled) => x2_try = x2_scaled,
                    None => {
                        warn!("non-finite residuals at iteration {}, stopping", iteration);
                        break FitStatus::NonFinite;
                    }
                }
            }

            let rho_den = x2 - x2_try;
            let rho = h.dot(&(damping.lambda() * &h + &sys.jtwdy)) / rho_den;

            if rho_den != 0.0 && rho > config.step_acceptance_threshold {
                // it IS significantly better
                let dx2 = x2 - x2_old;
                x2_old = x2;
                p_old = std::mem::replace(&mut p, p_try);
                y_old = sys.y_hat.clone();
                sys = lm_matx(&mut ctx, &p_old, &y_old, dx2, &sys.j, &p, y_dat, &weight)?;
                x2 = sys.chi_sq;
                // decrease lambda ==> Gauss-Newton method
                damping.on_accept(rho, alpha);
                debug!(
                    "iteration {}: step accepted, chi_sq = {:e}, lambda = {:e}",
                    iteration,
                    x2,
                    damping.lambda()
                );
            } else {
                // do not accept p_try
                if iteration % (2 * npar) == 0 {
                    sys = lm_matx(&mut ctx, &p_old, &y_old, -1.0, &sys.j, &p, y_dat, &weight)?;
                }
                // increase lambda ==> gradient descent method
                damping.on_reject(x2_try, x2, alpha);
                debug!(
                    "iteration {}: step rejected, chi_sq_try = {:e}, lambda = {:e}",
                    iteration,
                    x2_try,
                    damping.lambda()
                );
            }

            cvg_hst.push(ctx.func_calls, x2 / dof, damping.lambda(), &p)?;

            if sys.max_abs_gradient() < config.gradient_tolerance && iteration > 2 {
                info!("**** Convergence in r.h.s. (\"JtWdy\")  ****");
                break FitStatus::ConvergedGradient;
            }
            let max_rel_change = h
                .iter()
                .zip(p.iter())
                .map(|(hi, pi)| hi.abs() / (pi.abs() + 1e-12))
                .fold(0.0, f64::max);
            if max_rel_change < config.parameter_tolerance && iteration > 2 {
                info!("**** Convergence in Parameters ****");
                break FitStatus::ConvergedParameters;
            }
            if iteration == config.max_iterations {
                warn!("!! Maximum Number of Iterations Reached Without Convergence !!");
                break FitStatus::MaxIterations;
            }
        };

        // ---- Error Analysis ----
        // recompute equal weights for parameter error analysis
        let analysis_weight = if weights.is_uniform() {
            let delta_y = y_dat - &sys.y_hat;
            match uniform_analysis_weight(dof, &delta_y) {
                Some(w) => DVector::from_element(npnt, w),
                None => weight.clone(),
            }
        } else {
            weight.clone()
        };
        let reduced_chi_sq = x2 / dof;
        let final_sys = lm_matx(
            &mut ctx,
            &p_old,
            &y_old,
            1.0,
            &sys.j,
            &p,
            y_dat,
            &analysis_weight,
        )?;
        let stats =
            ParameterStatistics::from_hessian(&final_sys.jtwj, final_sys.j.matrix(), &p, &free)?;
        let intervals = confidence_intervals(
            &p,
            &stats.sigma_p,
            config.confidence_level,
            (npnt - npar) as f64,
        )?;
        let r_sq = r_squared(y_dat, &final_sys.y_hat);

        info!(
            "LM fitting finished: {} after {} iterations and {} function calls",
            status,
            cvg_hst.len(),
            ctx.func_calls
        );
        for i in 0..npar {
            info!(
                "p{}: fitted value = {:.6}, standard error = {:.2} %",
                i + 1,
                p[i],
                100.0 * stats.relative_error_p[i].abs()
            );
        }

        Ok(FitResult {
            status,
            iterations: cvg_hst.len(),
            func_calls: ctx.func_calls,
            reduced_chi_sq,
            reduced_chi_sq_scaled: final_sys.chi_sq / dof,
            sigma_p: stats.sigma_p,
            relative_error_p: stats.relative_error_p,
            sigma_y: stats.sigma_y,
            corr_p: stats.corr_p,
            covariance: stats.covariance,
            jtwj: final_sys.jtwj,
            r_sq,
            confidence_intervals: intervals,
            y_hat: final_sys.y_hat,
            cvg_hst,
            p,
        })
    }
}

/// damped normal equations solved for the free parameters; fixed entries of h are 0
fn solve_step(
    damping: &DampingState,
    sys: &LinearizedSystem,
    free: &[usize],
    iteration: usize,
) -> Result<DVector<f64>, LMError> {
    let a = damping.damped_matrix(&sys.jtwj, free);
    let rhs = DVector::from_fn(free.len(), |r, _| sys.jtwdy[free[r]]);
    let h_free = a
        .lu()
        .solve(&rhs)
        .filter(|h| h.iter().all(|x| x.is_finite()))
        .ok_or(LMError::SingularSystem { iteration })?;
    let mut h = DVector::zeros(sys.jtwdy.len());
    for (r, &i) in free.iter().enumerate() {
        h[i] = h_free[r];
    }
    Ok(h)
}

/// chi-square of a trial point, None if any residual is not finite
fn trial_chi_sq<M: ModelFunction + ?Sized>(
    ctx: &mut FitContext<M>,
    p_try: &DVector<f64>,
    y_dat: &DVector<f64>,
    weight: &DVector<f64>,
) -> Result<Option<f64>, LMError> {
    let delta_y = y_dat - ctx.evaluate(p_try)?;
    if !delta_y.iter().all(|x| x.is_finite()) {
        return Ok(None);
    }
    Ok(Some(delta_y.dot(&delta_y.component_mul(weight))))
}

/// apply constraints p_min <= p <= p_max
fn clip(p: &DVector<f64>, p_min: &DVector<f64>, p_max: &DVector<f64>) -> DVector<f64> {
    DVector::from_fn(p.len(), |i, _| p[i].max(p_min[i]).min(p_max[i]))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::optimization::lm_damping::LAMBDA_MIN;
    use nalgebra::{DMatrix, dmatrix, dvector};

    #[test]
    fn test_clip() {
        let p = dvector![-5.0, 0.5, 7.0];
        let lo = dvector![-1.0, 0.0, 0.0];
        let hi = dvector![1.0, 1.0, 2.0];
        assert_eq!(clip(&p, &lo, &hi), dvector![-1.0, 0.5, 2.0]);
    }

    #[test]
    fn test_solve_step_levenberg() {
        let jtwj = dmatrix![2.0, 0.0; 0.0, 4.0];
        let damping = DampingState::new(DampingUpdate::Levenberg, 1.0, 5.0, 5.0, &jtwj);
        let sys = LinearizedSystem {
            jtwj,
            jtwdy: dvector![4.0, 8.0],
            chi_sq: 1.0,
            y_hat: DVector::zeros(3),
            j: Jacobian::zeros(3, 2),
        };
        // (JtWJ + diag(JtWJ)) h = JtWdy
        let h = solve_step(&damping, &sys, &[0, 1], 1).unwrap();
        assert_eq!(h, dvector![1.0, 1.0]);
        let h = solve_step(&damping, &sys, &[1], 1).unwrap();
        assert_eq!(h, dvector![0.0, 1.0]);
    }

    #[test]
    fn test_solve_step_singular() {
        let jtwj = DMatrix::zeros(2, 2);
        let damping = DampingState::new(DampingUpdate::Levenberg, 1.0, 5.0, 5.0, &jtwj);
        let sys = LinearizedSystem {
            jtwj,
            jtwdy: dvector![1.0, 1.0],
            chi_sq: 1.0,
            y_hat: DVector::zeros(3),
            j: Jacobian::zeros(3, 2),
        };
        assert_eq!(
            solve_step(&damping, &sys, &[0, 1], 7).unwrap_err(),
            LMError::SingularSystem { iteration: 7 }
        );
        // Quadratic/Nielsen damping keeps the system regular
        let damping = DampingState::new(DampingUpdate::Nielsen, 1.0, 5.0, 5.0, &sys.jtwj);
        assert_eq!(damping.lambda(), LAMBDA_MIN);
        assert!(solve_step(&damping, &sys, &[0, 1], 1).is_ok());
    }

    #[test]
    fn test_trial_chi_sq() {
        let line = |t: &DVector<f64>, p: &DVector<f64>| t.map(|ti| p[0] + p[1] * ti);
        let t = dvector![0.0, 1.0, 2.0];
        let mut ctx = FitContext::new(&line, &t, dvector![1e-5, 1e-5]);
        let y_dat = dvector![1.0, 2.0, 4.0];
        let w = dvector![1.0, 2.0, 0.5];
        let x2 = trial_chi_sq(&mut ctx, &dvector![1.0, 1.0], &y_dat, &w).unwrap();
        // residuals [0, 0, 1]
        assert_eq!(x2, Some(0.5));
        let blow_up = |t: &DVector<f64>, p: &DVector<f64>| t.map(|ti| p[0] / ti);
        let mut ctx = FitContext::new(&blow_up, &t, dvector![1e-5]);
        assert_eq!(
            trial_chi_sq(&mut ctx, &dvector![1.0], &y_dat, &w).unwrap(),
            None
        );
        assert_eq!(ctx.func_calls, 1);
    }
}
