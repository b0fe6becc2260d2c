use crate::Utils::fit_report::fit_report;
use crate::Utils::logger::{init_logger, save_fit_to_csv, save_history_to_csv};
use crate::numerical::optimization::lm_config::{DampingUpdate, FiniteDifferenceStep, LMConfig};
use crate::numerical::optimization::lm_error::LMError;
use crate::numerical::optimization::lm_gavin::LevenbergMarquardtGavin;
use crate::numerical::optimization::lm_jacobian::ModelFunction;
use crate::numerical::optimization::lm_models::{ExponentialDecay, Gaussian, TripleExponential};
use crate::numerical::optimization::lm_types::WeightVector;
use log::info;
use nalgebra::{DVector, dvector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strum::IntoEnumIterator;

/// number of observations of the reference problem
pub const REFERENCE_LEN: usize = 150;
/// measured trajectory of the reference problem, sampled every 0.02 from t = 0
pub const REFERENCE_Y: [f64; REFERENCE_LEN] = [
    8.83495, 8.93995, 8.79963, 8.74592, 8.60279, 8.55959, 8.39714, 8.48836, 8.30669,
    8.18984, 8.23806, 8.14314, 8.27182, 8.06469, 7.87759, 7.93303, 7.60783, 7.70537,
    7.73949, 7.62501, 7.60763, 7.56328, 7.45224, 7.21446, 7.34391, 7.25029, 7.30344,
    7.27458, 7.06239, 7.15777, 7.02408, 6.9052, 6.7224, 6.61736, 6.66216, 6.73185, 6.65275,
    6.40096, 6.53693, 6.50425, 6.28483, 6.20103, 6.33008, 6.20527, 6.06906, 6.06673,
    6.02343, 6.23313, 6.07637, 5.77906, 5.83179, 5.73937, 5.74065, 5.62095, 5.82376, 5.7641,
    5.72798, 5.66125, 5.53929, 5.34524, 5.35613, 5.4151, 5.46055, 5.19746, 5.48782, 5.22529,
    5.22759, 5.06215, 5.10408, 5.19137, 5.17659, 4.93481, 4.94715, 4.96005, 4.89191,
    4.81703, 4.85079, 4.68142, 4.65036, 4.51725, 4.69305, 4.57623, 4.5986, 4.58899, 4.61747,
    4.42485, 4.32722, 4.4074, 4.22968, 4.33492, 4.32131, 4.19774, 4.32111, 4.40177, 4.16635,
    4.14304, 3.94273, 4.03299, 3.93099, 4.0596, 4.07135, 3.85163, 4.00523, 4.02336, 4.10443,
    3.66252, 3.80528, 3.94834, 3.75637, 3.67035, 3.68917, 3.65159, 3.46119, 3.6114, 3.50229,
    3.32806, 3.48662, 3.59046, 3.44973, 3.57768, 3.49351, 3.42112, 3.39601, 3.32952,
    3.20713, 3.35853, 3.21302, 3.31671, 3.20436, 3.29151, 3.14428, 3.22103, 3.06689,
    2.94693, 3.13882, 3.0227, 2.98073, 2.98372, 2.9455, 2.96104, 3.23768, 2.9289, 2.91961,
    2.82069, 3.04194, 2.82005, 2.76146, 2.91165, 2.84249, 2.72275,
];

/// independent variable of the reference problem: 0.0, 0.02, ..., 2.98
pub fn reference_t() -> DVector<f64> {
    DVector::from_fn(REFERENCE_LEN, |i, _| i as f64 * 0.02)
}

pub fn reference_y() -> DVector<f64> {
    DVector::from_column_slice(&REFERENCE_Y)
}

/// initial guess used for the reference problem
pub fn reference_p0() -> DVector<f64> {
    dvector![0.1, 1.0, 1.0, 1.0, 1.0, 1.0]
}

pub fn lm_examples(example: usize) -> Result<(), LMError> {
    match example {
        0 => {
            // triple exponential fitted to the reference trajectory
            let lm = LevenbergMarquardtGavin::new(TripleExponential, LMConfig::default());
            let t = reference_t();
            let y = reference_y();
            let result = lm.fit(reference_p0(), &t, &y)?;
            println!("{}", fit_report(&result));
            println!("correlation matrix {}", result.corr_p);
            save_history_to_csv(&result.cvg_hst, "lm_convergence_history.csv")?;
            save_fit_to_csv(&t, &y, &result, "lm_fit.csv")?;
        }
        1 => {
            // noisy exponential decay, all damping update rules
            init_logger(Some("info"), false)?;
            let mut rng = StdRng::seed_from_u64(42);
            let t = DVector::from_fn(40, |i, _| i as f64 * 0.1);
            let p_true = dvector![5.0, 0.8];
            let y = ExponentialDecay
                .evaluate(&t, &p_true)
                .map(|yi| yi + rng.random_range(-0.02..0.02));
            for damping_update in DampingUpdate::iter() {
                let config = LMConfig::default()
                    .with_damping_update(damping_update)
                    .with_loglevel(None);
                let lm = LevenbergMarquardtGavin::new(ExponentialDecay, config);
                let result = lm.fit(dvector![4.0, 0.6], &t, &y)?;
                info!(
                    "{}: p = [{:.5}, {:.5}], {} iterations, {} function calls, {}",
                    damping_update,
                    result.p[0],
                    result.p[1],
                    result.iterations,
                    result.func_calls,
                    result.status
                );
            }
        }
        2 => {
            // Gaussian peak with measurement errors growing along t, the mean is held fixed
            let toml = r#"
                [lm]
                max_iterations = 200
                gradient_tolerance = 1e-8
                parameter_tolerance = 1e-8
                damping_update = "nielsen"
                finite_difference_step = [1e-5, 0.0, -1e-4]
                lower_bounds = [0.0, -1.0, 0.1]
                upper_bounds = [10.0, 1.0, 5.0]
            "#;
            let config = LMConfig::from_toml_str(toml)?;
            let t = DVector::from_fn(101, |i, _| -5.0 + i as f64 * 0.1);
            let mut rng = StdRng::seed_from_u64(7);
            let sigma = t.map(|ti| 0.01 + 0.002 * (ti + 5.0));
            let y = Gaussian
                .evaluate(&t, &dvector![2.0, 0.0, 1.0])
                .zip_map(&sigma, |yi, si| yi + si * rng.random_range(-1.0..1.0));
            let weights = WeightVector::per_observation(sigma.map(|s| 1.0 / (s * s)))?;
            let lm = LevenbergMarquardtGavin::new(Gaussian, config);
            let result = lm.fit_weighted(dvector![1.5, 0.0, 1.4], &t, &y, weights)?;
            println!("{}", fit_report(&result));
        }
        3 => {
            // one sided differences for the reference problem
            let config = LMConfig::default()
                .with_finite_difference_step(FiniteDifferenceStep::Uniform(-1e-3))
                .with_max_iterations(200);
            let lm = LevenbergMarquardtGavin::new(TripleExponential, config);
            let result = lm.fit(reference_p0(), &reference_t(), &reference_y())?;
            println!("{}", fit_report(&result));
        }
        _ => {
            println!("no example with number {}", example);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_data() {
        let t = reference_t();
        let y = reference_y();
        assert_eq!(t.len(), y.len());
        assert_eq!(t[0], 0.0);
        assert!((t[REFERENCE_LEN - 1] - 2.98).abs() < 1e-12);
        assert_eq!(y[0], 8.83495);
        assert_eq!(y[REFERENCE_LEN - 1], 2.72275);
    }
}
