use std::fmt;

/// Error types of the Levenberg-Marquardt fitting engine
#[derive(Debug, Clone, PartialEq)]
pub enum LMError {
    /// independent and dependent data vectors differ in length
    LengthMismatch { t_len: usize, y_len: usize },
    /// the fit needs more observations than parameters
    TooFewObservations {
        observations: usize,
        parameters: usize,
    },
    EmptyData,
    NonFiniteData,
    /// a vector or matrix does not have the size the fit expects
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    NegativeWeight { index: usize, value: f64 },
    InvalidConfig(String),
    ConfigParse(String),
    /// damped normal equations could not be solved
    SingularSystem { iteration: usize },
    /// JtWJ is singular or not positive definite at error analysis time
    IllConditioned { parameters: Vec<f64> },
    Io(String),
}

impl fmt::Display for LMError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LMError::LengthMismatch { t_len, y_len } => write!(
                f,
                "the length of t ({}) must equal the length of y_dat ({})",
                t_len, y_len
            ),
            LMError::TooFewObservations {
                observations,
                parameters,
            } => write!(
                f,
                "number of observations ({}) must exceed number of parameters ({})",
                observations, parameters
            ),
            LMError::EmptyData => write!(f, "data vectors must not be empty"),
            LMError::NonFiniteData => write!(f, "data contain NaN or infinite values"),
            LMError::DimensionMismatch {
                what,
                expected,
                found,
            } => write!(
                f,
                "{} has length {}, expected {}",
                what, found, expected
            ),
            LMError::NegativeWeight { index, value } => {
                write!(f, "weight #{} is negative ({})", index, value)
            }
            LMError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            LMError::ConfigParse(msg) => write!(f, "failed to parse configuration: {}", msg),
            LMError::SingularSystem { iteration } => write!(
                f,
                "damped normal equations are singular at iteration {}",
                iteration
            ),
            LMError::IllConditioned { parameters } => write!(
                f,
                "ill-conditioned fit: JtWJ is singular or not positive definite at p = {:?}",
                parameters
            ),
            LMError::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for LMError {}

impl From<std::io::Error> for LMError {
    fn from(e: std::io::Error) -> Self {
        LMError::Io(e.to_string())
    }
}

impl From<csv::Error> for LMError {
    fn from(e: csv::Error) -> Self {
        LMError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for LMError {
    fn from(e: toml::de::Error) -> Self {
        LMError::ConfigParse(e.to_string())
    }
}
