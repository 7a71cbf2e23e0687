pub mod case;
pub mod cli;

pub use case::Case;
pub use cli::{Cli, Commands};
