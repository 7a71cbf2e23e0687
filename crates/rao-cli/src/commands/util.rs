use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Thread count from `auto` or a number; anything unparsable means `auto`.
pub fn thread_count(value: &str) -> usize {
    if value.eq_ignore_ascii_case("auto") {
        num_cpus::get()
    } else {
        value.parse().ok().filter(|n| *n > 0).unwrap_or_else(num_cpus::get)
    }
}

pub fn configure_threads(count: usize) {
    // A global pool may already exist; the optimiser builds its own pools anyway.
    let _ = rayon::ThreadPoolBuilder::new().num_threads(count).build_global();
}

pub fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}
