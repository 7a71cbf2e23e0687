use anyhow::Result;
use rao_cli::Case;
use std::path::Path;
use tracing::info;

pub fn handle(case_path: &Path) -> Result<()> {
    info!("Validating case {}", case_path.display());
    let case = Case::load(case_path)?;
    case.validate()?;
    let crac = &case.crac;
    println!(
        "Case '{}' is valid: {} contingencies, {} cnecs, {} network actions, {} range actions",
        crac.id,
        crac.contingencies.len(),
        crac.cnecs.len(),
        crac.network_actions().count(),
        crac.range_actions().count()
    );
    Ok(())
}
