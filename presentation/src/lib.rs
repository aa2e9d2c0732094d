pub mod cli;
pub mod formatter;
