//! pretty printing of the fit results
use crate::numerical::optimization::lm_types::FitResult;
use tabled::{builder::Builder, settings::Style};

/// parameter table: fitted value, standard error, relative error and confidence interval
pub fn parameter_table(result: &FitResult) -> String {
    let mut builder = Builder::default();
    builder.push_record(vec![
        "parameter".to_string(),
        "fitted value".to_string(),
        "sigma_p".to_string(),
        "standard error, %".to_string(),
        "confidence interval".to_string(),
    ]);
    for i in 0..result.p.len() {
        let (lower, upper) = result.confidence_intervals[i];
        builder.push_record(vec![
            format!("p{}", i + 1),
            format!("{:.6}", result.p[i]),
            format!("{:.4e}", result.sigma_p[i]),
            format!("{:.2}", 100.0 * result.relative_error_p[i].abs()),
            format!("[{:.6}, {:.6}]", lower, upper),
        ]);
    }
    let mut table = builder.build();
    table.with(Style::modern_rounded());
    table.to_string()
}

/// summary of the fit followed by the parameter table
pub fn fit_report(result: &FitResult) -> String {
    let summary: Vec<Vec<String>> = vec![
        vec!["status".to_string(), result.status.to_string()],
        vec!["iterations".to_string(), result.iterations.to_string()],
        vec!["function calls".to_string(), result.func_calls.to_string()],
        vec![
            "reduced chi-square".to_string(),
            format!("{:.6e}", result.reduced_chi_sq),
        ],
        vec![
            "reduced chi-square (analysis weights)".to_string(),
            format!("{:.6}", result.reduced_chi_sq_scaled),
        ],
        vec!["R^2".to_string(), format!("{:.6}", result.r_sq)],
    ];
    let mut table = Builder::from(summary).build();
    table.with(Style::modern_rounded());
    format!(
        "LM fitting results\n{}\n{}",
        table,
        parameter_table(result)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::optimization::lm_types::{ConvergenceHistory, FitStatus};
    use nalgebra::{DMatrix, DVector, dvector};

    fn result() -> FitResult {
        FitResult {
            p: dvector![2.0, 0.0],
            status: FitStatus::ConvergedGradient,
            iterations: 7,
            func_calls: 31,
            reduced_chi_sq: 1e-6,
            reduced_chi_sq_scaled: 1.0,
            sigma_p: dvector![0.1, 0.2],
            relative_error_p: dvector![0.05, f64::NAN],
            sigma_y: DVector::zeros(3),
            corr_p: DMatrix::identity(2, 2),
            covariance: DMatrix::identity(2, 2),
            jtwj: DMatrix::identity(2, 2),
            r_sq: 0.99,
            confidence_intervals: vec![(1.8, 2.2), (-0.4, 0.4)],
            y_hat: DVector::zeros(3),
            cvg_hst: ConvergenceHistory::with_capacity(2, 7),
        }
    }

    #[test]
    fn test_fit_report() {
        let report = fit_report(&result());
        assert!(report.starts_with("LM fitting results"));
        assert!(report.contains("convergence in r.h.s."));
        assert!(report.contains("p1"));
        assert!(report.contains("2.000000"));
        assert!(report.contains("[1.800000, 2.200000]"));
        assert!(report.contains("5.00"));
        // relative error of a zero parameter
        assert!(report.contains("NaN"));
    }
}
