use anyhow::{Context, Result};
use rao_core::RaoParameters;
use std::path::Path;

use crate::commands::util::write_output;

pub fn handle(out: Option<&Path>) -> Result<()> {
    let contents = RaoParameters::default()
        .to_toml_string()
        .context("serializing default parameters")?;
    match out {
        Some(path) => {
            write_output(path, &contents)?;
            println!("Wrote default parameters to {}", path.display());
        }
        None => print!("{contents}"),
    }
    Ok(())
}
