/// error type of the curve fitting
pub mod lm_error;
/// settings of the fit: tolerances, damping update rule, finite difference steps, bounds.
/// Can be read from a TOML document
pub mod lm_config;
/// parameters, observations, jacobian, weights, convergence history and fit result
pub mod lm_types;
/// model trait, finite difference jacobian and Broyden rank-1 update
pub mod lm_jacobian;
/// assembly of the linearized fitting system J'WJ h = J'W(y - y_hat)
pub mod lm_matx;
/// damping parameter and its update rules (Levenberg, quadratic line search, Nielsen)
pub mod lm_damping;
/// main loop of the Levenberg-Marquardt curve fitting (H.P. Gavin formulation)
pub mod lm_gavin;
/// covariance, standard errors, correlation, R² and confidence intervals after the fit
pub mod lm_statistics;
/// ready-made models for curve fitting
pub mod lm_models;
