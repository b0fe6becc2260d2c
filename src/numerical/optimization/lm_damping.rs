use crate::numerical::optimization::lm_config::DampingUpdate;
use nalgebra::DMatrix;

pub const LAMBDA_MIN: f64 = 1e-7;
pub const LAMBDA_MAX: f64 = 1e7;

/// damping parameter lambda together with the bookkeeping of its update rule
#[derive(Debug, Clone, PartialEq)]
pub struct DampingState {
    strategy: DampingUpdate,
    lambda: f64,
    /// Nielsen's growth factor
    nu: f64,
    up_factor: f64,
    down_factor: f64,
}

impl DampingState {
    /// Levenberg starts from lambda_0, Quadratic and Nielsen from lambda_0*max(diag(JtWJ))
    pub fn new(
        strategy: DampingUpdate,
        lambda_0: f64,
        up_factor: f64,
        down_factor: f64,
        jtwj: &DMatrix<f64>,
    ) -> Self {
        let lambda = match strategy {
            DampingUpdate::Levenberg => lambda_0,
            DampingUpdate::Quadratic | DampingUpdate::Nielsen => {
                let max_diag = jtwj.diagonal().iter().cloned().fold(0.0, f64::max);
                lambda_0 * max_diag
            }
        };
        Self {
            strategy,
            lambda: clamp(lambda),
            nu: 2.0,
            up_factor,
            down_factor,
        }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn nu(&self) -> f64 {
        self.nu
    }

    pub fn strategy(&self) -> DampingUpdate {
        self.strategy
    }

    /// JtWJ + lambda*diag(diag(JtWJ)) for Levenberg, JtWJ + lambda*I otherwise,
    /// restricted to the rows and columns listed in `free`
    pub fn damped_matrix(&self, jtwj: &DMatrix<f64>, free: &[usize]) -> DMatrix<f64> {
        let nfree = free.len();
        let mut a = DMatrix::from_fn(nfree, nfree, |r, c| jtwj[(free[r], free[c])]);
        for (r, &i) in free.iter().enumerate() {
            a[(r, r)] += match self.strategy {
                DampingUpdate::Levenberg => self.lambda * jtwj[(i, i)],
                DampingUpdate::Quadratic | DampingUpdate::Nielsen => self.lambda,
            };
        }
        a
    }

    /// decrease lambda after an accepted step (towards Gauss-Newton)
    pub fn on_accept(&mut self, rho: f64, alpha: f64) {
        self.lambda = match self.strategy {
            DampingUpdate::Levenberg => self.lambda / self.down_factor,
            DampingUpdate::Quadratic => self.lambda / (1.0 + alpha),
            DampingUpdate::Nielsen => {
                self.nu = 2.0;
                self.lambda * f64::max(1.0 / 3.0, 1.0 - (2.0 * rho - 1.0).powi(3))
            }
        };
        self.lambda = clamp(self.lambda);
    }

    /// increase lambda after a rejected step (towards gradient descent)
    pub fn on_reject(&mut self, x2_try: f64, x2: f64, alpha: f64) {
        self.lambda = match self.strategy {
            DampingUpdate::Levenberg => self.lambda * self.up_factor,
            DampingUpdate::Quadratic => self.lambda + ((x2_try - x2) / 2.0 / alpha).abs(),
            DampingUpdate::Nielsen => {
                let lambda = self.lambda * self.nu;
                self.nu *= 2.0;
                lambda
            }
        };
        self.lambda = clamp(self.lambda);
    }
}

fn clamp(lambda: f64) -> f64 {
    if lambda.is_nan() {
        return LAMBDA_MAX;
    }
    lambda.clamp(LAMBDA_MIN, LAMBDA_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dmatrix;
    use strum::IntoEnumIterator;

    fn jtwj() -> DMatrix<f64> {
        dmatrix![4.0, 1.0; 1.0, 2.0]
    }

    #[test]
    fn test_initial_lambda() {
        let lm = DampingState::new(DampingUpdate::Levenberg, 5.0, 5.0, 5.0, &jtwj());
        assert_eq!(lm.lambda(), 5.0);
        let nielsen = DampingState::new(DampingUpdate::Nielsen, 5.0, 5.0, 5.0, &jtwj());
        assert_eq!(nielsen.lambda(), 20.0);
        assert_eq!(nielsen.nu(), 2.0);
        let zero = DampingState::new(DampingUpdate::Quadratic, 5.0, 5.0, 5.0, &DMatrix::zeros(2, 2));
        assert_eq!(zero.lambda(), LAMBDA_MIN);
    }

    #[test]
    fn test_damped_matrix() {
        let lm = DampingState::new(DampingUpdate::Levenberg, 0.5, 5.0, 5.0, &jtwj());
        assert_eq!(lm.damped_matrix(&jtwj(), &[0, 1]), dmatrix![6.0, 1.0; 1.0, 3.0]);
        assert_eq!(lm.damped_matrix(&jtwj(), &[1]), dmatrix![3.0]);
        let q = DampingState::new(DampingUpdate::Quadratic, 0.125, 5.0, 5.0, &jtwj());
        // lambda = 0.125*4 = 0.5
        assert_eq!(q.damped_matrix(&jtwj(), &[0, 1]), dmatrix![4.5, 1.0; 1.0, 2.5]);
    }

    #[test]
    fn test_levenberg_updates() {
        let mut d = DampingState::new(DampingUpdate::Levenberg, 5.0, 11.0, 9.0, &jtwj());
        d.on_accept(0.5, 1.0);
        assert_relative_eq!(d.lambda(), 5.0 / 9.0, epsilon = 1e-15);
        d.on_reject(2.0, 1.0, 1.0);
        assert_relative_eq!(d.lambda(), 5.0 / 9.0 * 11.0, epsilon = 1e-14);
    }

    #[test]
    fn test_nielsen_updates() {
        let mut d = DampingState::new(DampingUpdate::Nielsen, 1.0, 5.0, 5.0, &dmatrix![1.0]);
        d.on_reject(2.0, 1.0, 1.0);
        assert_eq!(d.lambda(), 2.0);
        d.on_reject(2.0, 1.0, 1.0);
        assert_eq!(d.lambda(), 8.0);
        assert_eq!(d.nu(), 8.0);
        // rho = 0.5 gives factor max(1/3, 1) = 1
        d.on_accept(0.5, 1.0);
        assert_eq!(d.lambda(), 8.0);
        assert_eq!(d.nu(), 2.0);
        // rho = 1 gives factor 1/3
        d.on_accept(1.0, 1.0);
        assert_relative_eq!(d.lambda(), 8.0 / 3.0, epsilon = 1e-15);
    }

    #[test]
    fn test_quadratic_updates() {
        let mut d = DampingState::new(DampingUpdate::Quadratic, 1.0, 5.0, 5.0, &dmatrix![1.0]);
        d.on_accept(0.5, 1.0);
        assert_eq!(d.lambda(), 0.5);
        d.on_reject(3.0, 1.0, 0.5);
        assert_eq!(d.lambda(), 0.5 + 2.0);
    }

    #[test]
    fn test_lambda_stays_in_bounds() {
        for strategy in DampingUpdate::iter() {
            let mut d = DampingState::new(strategy, 5.0, 5.0, 5.0, &jtwj());
            for _ in 0..200 {
                d.on_reject(1e12, 1.0, 1e-3);
                assert!(d.lambda() >= LAMBDA_MIN && d.lambda() <= LAMBDA_MAX);
            }
            assert_eq!(d.lambda(), LAMBDA_MAX);
            for _ in 0..200 {
                d.on_accept(1.0, 1e3);
                assert!(d.lambda() >= LAMBDA_MIN && d.lambda() <= LAMBDA_MAX);
            }
            // alternate the two transitions
            for k in 0..100 {
                if k % 3 == 0 {
                    d.on_reject(2.0, 1.0, 0.5);
                } else {
                    d.on_accept(0.9, 0.5);
                }
                assert!(d.lambda() >= LAMBDA_MIN && d.lambda() <= LAMBDA_MAX);
            }
        }
    }
}
