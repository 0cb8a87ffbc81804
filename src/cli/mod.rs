//! Command line surface: arguments and console output

pub mod args;
pub mod output;

pub use args::Args;
pub use output::OutputFormatter;
