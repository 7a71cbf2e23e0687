use anyhow::{Context, Result};
use rao_algo::{Castor, OptimizationInstant, RaoResult};
use rao_cli::Case;
use rao_core::RaoParameters;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tabwriter::TabWriter;
use tracing::info;

use crate::commands::util::{configure_threads, thread_count, write_output};

pub fn handle(case_path: &Path, parameters: Option<&Path>, out: Option<&Path>, threads: Option<&str>) -> Result<()> {
    let started = chrono::Utc::now();
    let case = Case::load(case_path)?;
    case.validate()?;

    let mut parameters = match parameters {
        Some(path) => RaoParameters::load_from(path)
            .with_context(|| format!("loading parameters from {}", path.display()))?,
        None => RaoParameters::default(),
    };
    if let Some(value) = threads {
        let count = thread_count(value);
        configure_threads(count);
        let multithreading = &mut parameters.multithreading;
        multithreading.contingency_scenarios_in_parallel = count;
        multithreading.preventive_leaves_in_parallel = count;
        multithreading.curative_leaves_in_parallel = count;
    }

    info!("Running remedial action optimization on {}", case_path.display());
    let Case { network, crac, oracle } = case;
    let result = Castor::new(Arc::new(oracle), parameters)
        .run(&network, &crac)
        .context("remedial action optimization failed")?;

    print_summary(&result, started)?;
    let json = result.to_json_pretty().context("serializing result")?;
    match out {
        Some(path) => {
            write_output(path, &json)?;
            println!("Wrote result to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_summary(result: &RaoResult, started: chrono::DateTime<chrono::Utc>) -> Result<()> {
    let initial = result.functional_cost(OptimizationInstant::Initial).unwrap_or(0.0);
    let (instant, last) = result
        .final_costs()
        .map(|(i, c)| (i, c.functional_cost))
        .unwrap_or((OptimizationInstant::Initial, initial));

    println!("RAO started at {}", started.to_rfc3339());
    println!("  Steps executed   : {:?}", result.optimization_steps_executed);
    println!("  Functional cost  : {initial:.2} -> {last:.2} ({instant:?})");
    println!("  Final cost       : {:.2}", result.final_cost());
    println!("  Secure           : {}", if result.is_secure() { "yes" } else { "no" });

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "STATE\tNETWORK ACTIONS\tRANGE ACTIONS")?;
    for (state, decisions) in &result.states {
        let activated: Vec<String> = decisions
            .range_actions
            .iter()
            .filter(|(_, r)| r.activated)
            .map(|(id, r)| match r.tap {
                Some(tap) => format!("{id}@tap {tap}"),
                None => format!("{id}@{:.1}", r.setpoint),
            })
            .collect();
        if decisions.activated_network_actions.is_empty() && activated.is_empty() {
            continue;
        }
        writeln!(
            writer,
            "{}\t{}\t{}",
            state,
            decisions.activated_network_actions.join(","),
            activated.join(",")
        )?;
    }
    writer.flush()?;
    Ok(())
}
