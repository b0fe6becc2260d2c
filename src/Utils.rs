//! different utility modules used throughout the project
/// logger initialization and saving of the fit results into csv files
pub mod logger;
/// pretty printing of the fit results as tables
pub mod fit_report;
