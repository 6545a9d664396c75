mod command;
pub mod today;

pub use command::*;
