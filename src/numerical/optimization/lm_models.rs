//! Ready-made models y_hat = f(t, p) for the curve fitting.
use crate::numerical::optimization::lm_jacobian::ModelFunction;
use nalgebra::DVector;

/// y_hat = p0*exp(-p1*t) + p2*exp(p3*t) + p4*exp(-p5*t)
/// two decaying and one growing exponential
#[derive(Debug, Clone, Copy, Default)]
pub struct TripleExponential;

impl ModelFunction for TripleExponential {
    fn evaluate(&self, t: &DVector<f64>, p: &DVector<f64>) -> DVector<f64> {
        t.map(|ti| p[0] * (-p[1] * ti).exp() + p[2] * (p[3] * ti).exp() + p[4] * (-p[5] * ti).exp())
    }

    fn name(&self) -> &str {
        "triple_exponential"
    }

    fn parameter_count(&self) -> Option<usize> {
        Some(6)
    }
}

/// y_hat = p0 + p1*t
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl ModelFunction for Linear {
    fn evaluate(&self, t: &DVector<f64>, p: &DVector<f64>) -> DVector<f64> {
        t.map(|ti| p[0] + p[1] * ti)
    }

    fn name(&self) -> &str {
        "linear"
    }

    fn parameter_count(&self) -> Option<usize> {
        Some(2)
    }
}

/// y_hat = sum p_j t^j, j = 0..=degree
#[derive(Debug, Clone, Copy)]
pub struct Polynomial {
    degree: usize,
}

impl Polynomial {
    pub fn new(degree: usize) -> Self {
        Self { degree }
    }
}

impl ModelFunction for Polynomial {
    fn evaluate(&self, t: &DVector<f64>, p: &DVector<f64>) -> DVector<f64> {
        // Horner scheme
        t.map(|ti| (0..=self.degree).rev().fold(0.0, |acc, j| acc * ti + p[j]))
    }

    fn name(&self) -> &str {
        "polynomial"
    }

    fn parameter_count(&self) -> Option<usize> {
        Some(self.degree + 1)
    }
}

/// y_hat = p0*exp(-p1*t)
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialDecay;

impl ModelFunction for ExponentialDecay {
    fn evaluate(&self, t: &DVector<f64>, p: &DVector<f64>) -> DVector<f64> {
        t.map(|ti| p[0] * (-p[1] * ti).exp())
    }

    fn name(&self) -> &str {
        "exponential_decay"
    }

    fn parameter_count(&self) -> Option<usize> {
        Some(2)
    }
}

/// p0 = amplitude, p1 = mean, p2 = standard deviation
#[derive(Debug, Clone, Copy, Default)]
pub struct Gaussian;

impl ModelFunction for Gaussian {
    fn evaluate(&self, t: &DVector<f64>, p: &DVector<f64>) -> DVector<f64> {
        t.map(|ti| p[0] * (-0.5 * ((ti - p[1]) / p[2]).powi(2)).exp())
    }

    fn name(&self) -> &str {
        "gaussian"
    }

    fn parameter_count(&self) -> Option<usize> {
        Some(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    #[test]
    fn test_triple_exponential() {
        let t = dvector![0.0, 1.0];
        let p = dvector![1.0, 1.0, 2.0, 0.5, 3.0, 2.0];
        let y = TripleExponential.evaluate(&t, &p);
        assert_relative_eq!(y[0], 6.0, epsilon = 1e-14);
        let expected = (-1.0f64).exp() + 2.0 * 0.5f64.exp() + 3.0 * (-2.0f64).exp();
        assert_relative_eq!(y[1], expected, epsilon = 1e-14);
        assert_eq!(TripleExponential.parameter_count(), Some(6));
    }

    #[test]
    fn test_polynomial() {
        let t = dvector![0.0, 1.0, 2.0];
        let p = dvector![1.0, 2.0, 0.5];
        let y = Polynomial::new(2).evaluate(&t, &p);
        assert_eq!(y, dvector![1.0, 3.5, 7.0]);
        assert_eq!(Linear.evaluate(&t, &dvector![1.0, 2.0]), dvector![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_decay_and_gaussian() {
        let t = dvector![0.0, 2.0];
        let y = ExponentialDecay.evaluate(&t, &dvector![5.0, 0.5]);
        assert_relative_eq!(y[1], 5.0 * (-1.0f64).exp(), epsilon = 1e-14);
        let g = Gaussian.evaluate(&t, &dvector![2.0, 0.0, 1.0]);
        assert_eq!(g[0], 2.0);
        assert_relative_eq!(g[1], 2.0 * (-2.0f64).exp(), epsilon = 1e-14);
        assert_eq!(Gaussian.name(), "gaussian");
    }
}
