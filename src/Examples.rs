//! examples of usage of RustedLMFit
/// curve fitting examples: the reference triple exponential problem, damping update
/// rules on noisy data, weighted fit configured from TOML
pub mod lm_examples;
