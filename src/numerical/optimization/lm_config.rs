//! Settings of the Levenberg-Marquardt fit.
//!
//! Every option has the default of the reference fitting problem, can be overridden
//! one by one (`set_params`, `with_*`) or read from a TOML document:
//! ```toml
//! [lm]
//! max_iterations = 200
//! gradient_tolerance = 1e-6
//! damping_update = "nielsen"
//! finite_difference_step = [1e-5, -1e-3, 0.0]
//! loglevel = "warn"
//! ```
use crate::numerical::optimization::lm_error::LMError;
use nalgebra::DVector;
use std::path::Path;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

/// rule used to adapt the damping parameter lambda after accepted and rejected steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum DampingUpdate {
    /// lambda divided/multiplied by fixed factors, damping matrix diag(JtWJ)
    Levenberg,
    /// quadratic line search along the step, damping matrix I
    Quadratic,
    /// Nielsen's update, damping matrix I
    Nielsen,
}

impl Default for DampingUpdate {
    fn default() -> Self {
        DampingUpdate::Levenberg
    }
}

/// fractional increment of parameters for numerical derivatives
/// - dp > 0 central differences
/// - dp < 0 one sided (backward) differences
/// - dp = 0 parameter is held fixed
#[derive(Debug, Clone, PartialEq)]
pub enum FiniteDifferenceStep {
    Uniform(f64),
    PerParameter(Vec<f64>),
}

impl Default for FiniteDifferenceStep {
    fn default() -> Self {
        FiniteDifferenceStep::Uniform(1e-5)
    }
}

impl FiniteDifferenceStep {
    /// expand into one step per parameter
    pub fn resolve(&self, npar: usize) -> Result<DVector<f64>, LMError> {
        match self {
            FiniteDifferenceStep::Uniform(dp) => Ok(DVector::from_element(npar, *dp)),
            FiniteDifferenceStep::PerParameter(dp) => {
                if dp.len() != npar {
                    return Err(LMError::DimensionMismatch {
                        what: "finite_difference_step".to_string(),
                        expected: npar,
                        found: dp.len(),
                    });
                }
                Ok(DVector::from_vec(dp.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LMConfig {
    pub max_iterations: usize,
    /// epsilon_1: convergence tolerance for gradient max|JtWdy|
    pub gradient_tolerance: f64,
    /// epsilon_2: convergence tolerance for relative parameter change
    pub parameter_tolerance: f64,
    /// epsilon_4: determines acceptance of a L-M step
    pub step_acceptance_threshold: f64,
    pub initial_damping: f64,
    pub damping_up_factor: f64,
    pub damping_down_factor: f64,
    pub damping_update: DampingUpdate,
    pub finite_difference_step: FiniteDifferenceStep,
    /// bounds are -scale*|p0| ..= scale*|p0| unless explicit bounds are given
    pub parameter_bounds_scale: f64,
    pub lower_bounds: Option<Vec<f64>>,
    pub upper_bounds: Option<Vec<f64>>,
    /// level of the parameter confidence intervals
    pub confidence_level: f64,
    pub loglevel: Option<String>,
}

impl Default for LMConfig {
    fn default() -> Self {
        Self {
            max_iterations: 76,
            gradient_tolerance: 1e-3,
            parameter_tolerance: 8.30462e-6,
            step_acceptance_threshold: 1e-1,
            initial_damping: 5.0,
            damping_up_factor: 5.0,
            damping_down_factor: 5.0,
            damping_update: DampingUpdate::Levenberg,
            finite_difference_step: FiniteDifferenceStep::default(),
            parameter_bounds_scale: 100.0,
            lower_bounds: None,
            upper_bounds: None,
            confidence_level: 0.95,
            loglevel: Some("info".to_string()),
        }
    }
}

impl LMConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_params(
        &mut self,
        max_iterations: Option<usize>,
        gradient_tolerance: Option<f64>,
        parameter_tolerance: Option<f64>,
        step_acceptance_threshold: Option<f64>,
        initial_damping: Option<f64>,
        damping_up_factor: Option<f64>,
        damping_down_factor: Option<f64>,
        damping_update: Option<DampingUpdate>,
    ) {
        if let Some(max_iterations) = max_iterations {
            self.max_iterations = max_iterations;
        }
        if let Some(gradient_tolerance) = gradient_tolerance {
            self.gradient_tolerance = gradient_tolerance;
        }
        if let Some(parameter_tolerance) = parameter_tolerance {
            self.parameter_tolerance = parameter_tolerance;
        }
        if let Some(step_acceptance_threshold) = step_acceptance_threshold {
            self.step_acceptance_threshold = step_acceptance_threshold;
        }
        if let Some(initial_damping) = initial_damping {
            self.initial_damping = initial_damping;
        }
        if let Some(damping_up_factor) = damping_up_factor {
            self.damping_up_factor = damping_up_factor;
        }
        if let Some(damping_down_factor) = damping_down_factor {
            self.damping_down_factor = damping_down_factor;
        }
        if let Some(damping_update) = damping_update {
            self.damping_update = damping_update;
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerances(mut self, gradient_tolerance: f64, parameter_tolerance: f64) -> Self {
        self.gradient_tolerance = gradient_tolerance;
        self.parameter_tolerance = parameter_tolerance;
        self
    }

    pub fn with_damping_update(mut self, damping_update: DampingUpdate) -> Self {
        self.damping_update = damping_update;
        self
    }

    pub fn with_finite_difference_step(mut self, step: FiniteDifferenceStep) -> Self {
        self.finite_difference_step = step;
        self
    }

    pub fn with_bounds(mut self, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        self.lower_bounds = Some(lower);
        self.upper_bounds = Some(upper);
        self
    }

    pub fn with_loglevel(mut self, loglevel: Option<&str>) -> Self {
        self.loglevel = loglevel.map(|l| l.to_string());
        self
    }

    /// check that all settings make sense before the fit starts
    pub fn validate(&self) -> Result<(), LMError> {
        let positive = [
            ("gradient_tolerance", self.gradient_tolerance),
            ("parameter_tolerance", self.parameter_tolerance),
            ("initial_damping", self.initial_damping),
            ("parameter_bounds_scale", self.parameter_bounds_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(LMError::InvalidConfig(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(LMError::InvalidConfig(
                "max_iterations must be a positive number".to_string(),
            ));
        }
        if !self.step_acceptance_threshold.is_finite() {
            return Err(LMError::InvalidConfig(
                "step_acceptance_threshold must be finite".to_string(),
            ));
        }
        if !(self.damping_up_factor > 1.0 && self.damping_down_factor > 1.0) {
            return Err(LMError::InvalidConfig(
                "damping factors must be greater than 1.0".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(LMError::InvalidConfig(format!(
                "confidence_level must lie in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if self.lower_bounds.is_some() != self.upper_bounds.is_some() {
            return Err(LMError::InvalidConfig(
                "lower_bounds and upper_bounds must be given together".to_string(),
            ));
        }
        if let Some(level) = &self.loglevel {
            let level = level.to_lowercase();
            if !["debug", "info", "warn", "error", "off", "none"].contains(&level.as_str()) {
                return Err(LMError::InvalidConfig(format!(
                    "loglevel must be debug, info, warn, error or off, got {}",
                    level
                )));
            }
        }
        Ok(())
    }

    /// lower and upper parameter bounds for initial guess p0
    pub fn bounds(&self, p0: &DVector<f64>) -> Result<(DVector<f64>, DVector<f64>), LMError> {
        let npar = p0.len();
        match (&self.lower_bounds, &self.upper_bounds) {
            (Some(lb), Some(ub)) => {
                for (what, b) in [("lower_bounds", lb), ("upper_bounds", ub)] {
                    if b.len() != npar {
                        return Err(LMError::DimensionMismatch {
                            what: what.to_string(),
                            expected: npar,
                            found: b.len(),
                        });
                    }
                }
                if lb.iter().zip(ub.iter()).any(|(l, u)| l > u) {
                    return Err(LMError::InvalidConfig(
                        "lower bound exceeds upper bound".to_string(),
                    ));
                }
                Ok((DVector::from_vec(lb.clone()), DVector::from_vec(ub.clone())))
            }
            _ => {
                let scale = self.parameter_bounds_scale;
                Ok((
                    p0.map(|x| -scale * x.abs()),
                    p0.map(|x| scale * x.abs()),
                ))
            }
        }
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, LMError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// read settings from a TOML document; keys may live at top level or in an `[lm]` table
    pub fn from_toml_str(content: &str) -> Result<Self, LMError> {
        let document = content.parse::<toml::Table>()?;
        let table = match document.get("lm") {
            Some(toml::Value::Table(section)) => section.clone(),
            Some(_) => return Err(LMError::ConfigParse("[lm] must be a table".to_string())),
            None => document,
        };
        let mut config = LMConfig::default();
        for (key, value) in table.iter() {
            match key.as_str() {
                "max_iterations" => {
                    let v = value
                        .as_integer()
                        .filter(|v| *v > 0)
                        .ok_or_else(|| bad_value(key, "a positive integer"))?;
                    config.max_iterations = v as usize;
                }
                "gradient_tolerance" => config.gradient_tolerance = as_f64(key, value)?,
                "parameter_tolerance" => config.parameter_tolerance = as_f64(key, value)?,
                "step_acceptance_threshold" => {
                    config.step_acceptance_threshold = as_f64(key, value)?
                }
                "initial_damping" => config.initial_damping = as_f64(key, value)?,
                "damping_up_factor" => config.damping_up_factor = as_f64(key, value)?,
                "damping_down_factor" => config.damping_down_factor = as_f64(key, value)?,
                "damping_update" => {
                    let name = value
                        .as_str()
                        .ok_or_else(|| bad_value(key, "a string"))?;
                    config.damping_update = DampingUpdate::from_str(name).map_err(|_| {
                        bad_value(key, "one of levenberg, quadratic, nielsen")
                    })?;
                }
                "finite_difference_step" => {
                    config.finite_difference_step = match value {
                        toml::Value::Array(_) => {
                            FiniteDifferenceStep::PerParameter(as_f64_vec(key, value)?)
                        }
                        _ => FiniteDifferenceStep::Uniform(as_f64(key, value)?),
                    }
                }
                "parameter_bounds_scale" => config.parameter_bounds_scale = as_f64(key, value)?,
                "lower_bounds" => config.lower_bounds = Some(as_f64_vec(key, value)?),
                "upper_bounds" => config.upper_bounds = Some(as_f64_vec(key, value)?),
                "confidence_level" => config.confidence_level = as_f64(key, value)?,
                "loglevel" => {
                    let level = value.as_str().ok_or_else(|| bad_value(key, "a string"))?;
                    config.loglevel = Some(level.to_string());
                }
                other => {
                    return Err(LMError::InvalidConfig(format!("unknown key '{}'", other)));
                }
            }
        }
        config.validate()?;
        Ok(config)
    }
}

fn bad_value(key: &str, expected: &str) -> LMError {
    LMError::ConfigParse(format!("'{}' must be {}", key, expected))
}

fn as_f64(key: &str, value: &toml::Value) -> Result<f64, LMError> {
    match value {
        toml::Value::Float(f) => Ok(*f),
        toml::Value::Integer(i) => Ok(*i as f64),
        _ => Err(bad_value(key, "a number")),
    }
}

fn as_f64_vec(key: &str, value: &toml::Value) -> Result<Vec<f64>, LMError> {
    let array = value
        .as_array()
        .ok_or_else(|| bad_value(key, "an array of numbers"))?;
    array.iter().map(|v| as_f64(key, v)).collect()
}
