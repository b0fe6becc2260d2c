use crate::numerical::optimization::lm_error::LMError;
use crate::numerical::optimization::lm_types::{ConvergenceHistory, FitResult};
use chrono::Local;
use csv::Writer;
use log::LevelFilter;
use nalgebra::DVector;
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::fs::File;
use std::path::Path;

/// "debug" | "info" | "warn" | "error" | "off" | "none", case insensitive
pub fn level_filter(loglevel: &str) -> Result<LevelFilter, LMError> {
    match loglevel.to_lowercase().as_str() {
        "debug" => Ok(LevelFilter::Debug),
        "info" => Ok(LevelFilter::Info),
        "warn" => Ok(LevelFilter::Warn),
        "error" => Ok(LevelFilter::Error),
        "off" | "none" => Ok(LevelFilter::Off),
        other => Err(LMError::InvalidConfig(format!(
            "loglevel must be debug, info, warn, error or off, got {}",
            other
        ))),
    }
}

/// Install a terminal logger (and, if asked, a logger writing to log_<date_time>.txt).
/// Returns false when logging is switched off or another logger is already installed.
pub fn init_logger(loglevel: Option<&str>, log_to_file: bool) -> Result<bool, LMError> {
    let Some(loglevel) = loglevel else {
        return Ok(false);
    };
    let log_option = level_filter(loglevel)?;
    if log_option == LevelFilter::Off {
        return Ok(false);
    }
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        log_option,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));
    if log_to_file {
        let date_and_time = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let name = format!("log_{}.txt", date_and_time);
        loggers.push(WriteLogger::new(
            log_option,
            Config::default(),
            File::create(name)?,
        ));
    }
    Ok(CombinedLogger::init(loggers).is_ok())
}

/// convergence history as csv: func_calls, reduced_chi_sq, lambda, p1 .. pn
pub fn save_history_to_csv<P: AsRef<Path>>(
    cvg_hst: &ConvergenceHistory,
    filename: P,
) -> Result<(), LMError> {
    let mut writer = Writer::from_path(filename)?;
    let mut headers = vec![
        "func_calls".to_string(),
        "reduced_chi_sq".to_string(),
        "lambda".to_string(),
    ];
    headers.extend((1..=cvg_hst.npar()).map(|i| format!("p{}", i)));
    writer.write_record(&headers)?;
    for row in cvg_hst.rows() {
        let mut record = vec![
            row.func_calls.to_string(),
            row.reduced_chi_sq.to_string(),
            row.lambda.to_string(),
        ];
        record.extend(row.parameters.iter().map(|&val| val.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// fitted curve as csv: t, y_dat, y_hat, sigma_y
pub fn save_fit_to_csv<P: AsRef<Path>>(
    t: &DVector<f64>,
    y_dat: &DVector<f64>,
    result: &FitResult,
    filename: P,
) -> Result<(), LMError> {
    for (what, len) in [
        ("y_dat", y_dat.len()),
        ("y_hat", result.y_hat.len()),
        ("sigma_y", result.sigma_y.len()),
    ] {
        if len != t.len() {
            return Err(LMError::DimensionMismatch {
                what: what.to_string(),
                expected: t.len(),
                found: len,
            });
        }
    }
    let mut writer = Writer::from_path(filename)?;
    writer.write_record(["t", "y_dat", "y_hat", "sigma_y"])?;
    for i in 0..t.len() {
        writer.write_record(&[
            t[i].to_string(),
            y_dat[i].to_string(),
            result.y_hat[i].to_string(),
            result.sigma_y[i].to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter("Debug").unwrap(), LevelFilter::Debug);
        assert_eq!(level_filter("none").unwrap(), LevelFilter::Off);
        assert!(level_filter("verbose").is_err());
        assert_eq!(init_logger(None, false).unwrap(), false);
        assert_eq!(init_logger(Some("off"), false).unwrap(), false);
    }

    #[test]
    fn test_save_history_to_csv() {
        let mut hst = ConvergenceHistory::with_capacity(2, 4);
        hst.push(5, 0.5, 1.0, &dvector![1.0, 2.0]).unwrap();
        hst.push(6, 0.25, 0.2, &dvector![1.5, 2.5]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        save_history_to_csv(&hst, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "func_calls,reduced_chi_sq,lambda,p1,p2");
        assert_eq!(lines[2], "6,0.25,0.2,1.5,2.5");
    }

    #[test]
    fn test_save_history_to_missing_dir() {
        let hst = ConvergenceHistory::with_capacity(1, 1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("history.csv");
        assert!(matches!(
            save_history_to_csv(&hst, &path),
            Err(LMError::Io(_))
        ));
    }
}
