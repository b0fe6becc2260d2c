/// nonlinear least squares curve fitting with the Levenberg-Marquardt algorithm
pub mod optimization;
