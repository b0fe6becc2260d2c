use crate::numerical::optimization::lm_error::LMError;
use crate::numerical::optimization::lm_types::Jacobian;
use nalgebra::DVector;

/// model used for curve fitting: y_hat = f(t, p)
pub trait ModelFunction {
    /// evaluate the model at independent variables t with parameters p
    fn evaluate(&self, t: &DVector<f64>, p: &DVector<f64>) -> DVector<f64>;

    /// name for logging
    fn name(&self) -> &str {
        "unnamed_model"
    }

    /// number of parameters the model expects, None if it accepts any
    fn parameter_count(&self) -> Option<usize> {
        None
    }
}

impl<F> ModelFunction for F
where
    F: Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64>,
{
    fn evaluate(&self, t: &DVector<f64>, p: &DVector<f64>) -> DVector<f64> {
        self(t, p)
    }
}

/// State of one fit call: model, data abscissa, derivative steps, iteration and
/// function call counters. Nothing here outlives the call that created it.
pub struct FitContext<'a, M: ModelFunction + ?Sized> {
    model: &'a M,
    t: &'a DVector<f64>,
    dp: DVector<f64>,
    pub iteration: usize,
    pub func_calls: usize,
}

impl<'a, M: ModelFunction + ?Sized> FitContext<'a, M> {
    pub fn new(model: &'a M, t: &'a DVector<f64>, dp: DVector<f64>) -> Self {
        Self {
            model,
            t,
            dp,
            iteration: 0,
            func_calls: 0,
        }
    }

    pub fn npar(&self) -> usize {
        self.dp.len()
    }

    pub fn npnt(&self) -> usize {
        self.t.len()
    }

    pub fn dp(&self) -> &DVector<f64> {
        &self.dp
    }

    pub fn t(&self) -> &DVector<f64> {
        self.t
    }

    /// parameters that are fitted (dp != 0)
    pub fn free_parameters(&self) -> Vec<usize> {
        (0..self.dp.len()).filter(|&j| self.dp[j] != 0.0).collect()
    }

    /// evaluate the model and count the call
    pub fn evaluate(&mut self, p: &DVector<f64>) -> Result<DVector<f64>, LMError> {
        let y_hat = self.model.evaluate(self.t, p);
        self.func_calls += 1;
        if y_hat.len() != self.t.len() {
            return Err(LMError::DimensionMismatch {
                what: format!("output of model '{}'", self.model.name()),
                expected: self.t.len(),
                found: y_hat.len(),
            });
        }
        Ok(y_hat)
    }

    /// finite differences are due every 2*n iterations or when chi-square went up (dx2 > 0)
    pub fn finite_difference_due(&self, dx2: f64) -> bool {
        self.iteration % (2 * self.npar()) == 0 || dx2 > 0.0
    }
}

/// Computes partial derivatives (Jacobian) dy/dp via finite differences.
/// y is the model evaluated at p; step of parameter j is dp_j*(1 + |p_j|)
/// - dp_j > 0 central differences (two model calls)
/// - dp_j < 0 one sided differences (one model call)
/// - dp_j = 0 zero column, parameter held fixed
pub fn finite_difference_jacobian<M: ModelFunction + ?Sized>(
    ctx: &mut FitContext<M>,
    p: &DVector<f64>,
    y: &DVector<f64>,
) -> Result<Jacobian, LMError> {
    let m = y.len();
    let n = p.len();
    if n != ctx.npar() {
        return Err(LMError::DimensionMismatch {
            what: "parameter vector".to_string(),
            expected: ctx.npar(),
            found: n,
        });
    }
    let mut j = Jacobian::zeros(m, n);
    let mut ps = p.clone();

    for idx in 0..n {
        let dp = ctx.dp()[idx];
        let del = dp * (1.0 + p[idx].abs());
        if del == 0.0 {
            continue;
        }
        ps[idx] = p[idx] + del;
        let y1 = ctx.evaluate(&ps)?;

        let column = if dp < 0.0 {
            // backwards difference
            (y1 - y) / del
        } else {
            // central difference, additional func call
            ps[idx] = p[idx] - del;
            let y2 = ctx.evaluate(&ps)?;
            (y1 - y2) / (2.0 * del)
        };
        j.matrix_mut().set_column(idx, &column);
        // restore p(j)
        ps[idx] = p[idx];
    }
    Ok(j)
}

/// Rank-1 update of the Jacobian with Broyden's equation
/// J <- J + ((y - y_old) - J h) h' / (h' h),  h = p - p_old.
/// A zero step carries no secant information and leaves J unchanged.
pub fn broyden_update(
    p_old: &DVector<f64>,
    y_old: &DVector<f64>,
    j: &Jacobian,
    p: &DVector<f64>,
    y: &DVector<f64>,
) -> Jacobian {
    let h = p - p_old;
    let b = h.dot(&h);
    if b == 0.0 {
        return j.clone();
    }
    let jm = j.matrix();
    let a = ((y - y_old) - jm * &h) * h.transpose();
    let mut updated = j.clone();
    *updated.matrix_mut() += a / b;
    updated
}
