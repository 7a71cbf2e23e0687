//! Breadth-first search over network action combinations.
//!
//! Each depth blooms the current best leaf into candidate combinations,
//! evaluates and optimises them in parallel on pooled network clones, and
//! keeps the best one. Selection is deterministic whatever the completion
//! order of the workers:
//!
//! - a leaf only competes if it improves enough on the previous depth;
//! - a leaf reaching the stop criterion beats one that does not;
//! - among leaves reaching it, the lowest combination rank wins;
//! - otherwise the lowest cost wins, rank breaking ties.

mod bloomer;
mod combination;
mod leaf;
mod network_pool;
mod parameters;

pub use bloomer::Bloomer;
pub use combination::{canonical_id, NetworkActionCombination};
pub use leaf::{Leaf, LeafStatus};
pub use network_pool::{NetworkPool, PooledNetwork};
pub use parameters::{StopCriterion, TreeParameters, PURELY_VIRTUAL_COST_EPSILON};

use crate::activation::RangeActionActivation;
use crate::applied::AppliedRemedialActions;
use crate::linear_optimization::MilpSolver;
use crate::objective::ObjectiveFunction;
use crate::perimeter::OptimizationPerimeter;
use crate::result::PerimeterResult;
use crate::sensitivity::{SensitivityComputer, SensitivityRequest, SystematicSensitivityResult};
use parking_lot::Mutex;
use rao_core::{CoreResult, Network, NetworkAction, RangeAction, RaoError, RaoParameters};
use std::collections::BTreeSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on the wait for one depth's leaves.
pub const DEPTH_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

/// Number of most limiting elements logged and used for proximity filtering.
const MOST_LIMITING_ELEMENTS: usize = 5;

/// Everything one search needs; shared read-only by the leaf workers.
pub struct SearchTreeInput {
    pub perimeter: OptimizationPerimeter,
    /// Network before any action of the perimeter.
    pub network: Network,
    pub initial_flows: SystematicSensitivityResult,
    pub initial_setpoints: RangeActionActivation,
    pub pre_perimeter_flows: SystematicSensitivityResult,
    pub pre_perimeter_setpoints: RangeActionActivation,
    pub applied_remedial_actions: AppliedRemedialActions,
    pub objective_function: ObjectiveFunction,
    pub sensitivity_computer: SensitivityComputer,
    pub solver: Arc<dyn MilpSolver>,
    pub parameters: RaoParameters,
    pub tree_parameters: TreeParameters,
}

impl SearchTreeInput {
    pub fn sensitivity_request<'a>(&'a self, range_actions: &'a [RangeAction]) -> SensitivityRequest<'a> {
        SensitivityRequest {
            cnecs: self.perimeter.cnecs(),
            range_actions,
            contingencies: self.perimeter.contingencies(),
            applied_remedial_actions: &self.applied_remedial_actions,
            compute_ptdf_sums: self.parameters.relative_margins_enabled(),
            compute_loop_flows: self.parameters.loop_flow.enabled,
        }
    }

    pub fn stop_criterion_reached(&self, leaf: &Leaf) -> bool {
        if self.perimeter.is_purely_virtual() && leaf.virtual_cost() < PURELY_VIRTUAL_COST_EPSILON {
            return true;
        }
        match self.tree_parameters.stop_criterion {
            StopCriterion::MinObjective => false,
            StopCriterion::AtTargetObjectiveValue(target) => leaf.cost() < target,
        }
    }
}

#[derive(Default)]
struct DepthState {
    best: Option<Leaf>,
    /// Lowest rank among recorded leaves that reach the stop criterion.
    stop_rank: Option<u64>,
}

pub struct SearchTree {
    input: Arc<SearchTreeInput>,
}

impl SearchTree {
    pub fn new(input: SearchTreeInput) -> Self {
        Self { input: Arc::new(input) }
    }

    pub fn input(&self) -> &SearchTreeInput {
        &self.input
    }

    pub fn run(&self) -> CoreResult<PerimeterResult> {
        let input = &self.input;
        let started = web_time::Instant::now();
        let state = input.perimeter.main_state().clone();
        let tree = &input.tree_parameters;
        let networks = Arc::new(NetworkPool::new(&input.network, tree.leaves_in_parallel));

        info!(%state, "Evaluating root leaf");
        let mut root = Leaf::root(input);
        {
            let mut network = networks.acquire();
            root.evaluate(&mut network, input);
            if root.status() == LeafStatus::Error {
                warn!(%state, "Root leaf could not be evaluated");
                return Ok(self.result(root));
            }
            if input.stop_criterion_reached(&root) {
                info!(%state, leaf = %root, "Stop criterion reached on root leaf");
                return Ok(self.result(root));
            }
            root.optimize(&network, input);
        }
        info!(%state, leaf = %root, "Root leaf optimized");

        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(tree.leaves_in_parallel)
            .build()
            .map_err(|e| RaoError::Other(format!("failed to build leaf thread pool: {e}")))?;
        let bloomer = Bloomer::new(&input.perimeter, tree, &input.network);
        let mut tried = BTreeSet::from([canonical_id(root.network_actions().iter().map(|na| na.id.as_str()))]);
        let mut optimal = root;
        let mut depth = 0;

        loop {
            if input.stop_criterion_reached(&optimal) {
                info!(%state, depth, "Stop criterion reached");
                break;
            }
            if depth >= tree.max_search_tree_depth {
                info!(%state, depth, "Maximum search depth reached");
                break;
            }
            let most_limiting = input
                .objective_function
                .most_limiting_elements(optimal.flows(), MOST_LIMITING_ELEMENTS);
            for (i, cnec) in most_limiting.iter().enumerate() {
                debug!(rank = i + 1, cnec = %cnec.id, margin = optimal.flows().margin(cnec, input.parameters.objective_function.unit), "Limiting element");
            }
            let combinations = bloomer.bloom(&optimal, &input.pre_perimeter_setpoints, &most_limiting, &tried);
            if combinations.is_empty() {
                info!(%state, depth, "No more network action available");
                break;
            }
            for combination in &combinations {
                tried.insert(canonical_id(
                    optimal
                        .network_actions()
                        .iter()
                        .chain(combination.actions())
                        .map(|na| na.id.as_str()),
                ));
            }
            info!(%state, depth = depth + 1, leaves = combinations.len(), "Search depth started");

            let best = self.run_depth(&workers, &networks, optimal.network_actions(), combinations, optimal.cost())?;
            depth += 1;
            match best {
                Some(leaf) => {
                    info!(%state, depth, leaf = %leaf, "Optimal leaf updated");
                    optimal = leaf;
                }
                None => {
                    info!(%state, depth, "No better result found in depth, stopping search");
                    break;
                }
            }
        }

        info!(
            %state,
            depth,
            cost = optimal.cost(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search tree finished"
        );
        Ok(self.result(optimal))
    }

    fn run_depth(
        &self,
        workers: &rayon::ThreadPool,
        networks: &Arc<NetworkPool>,
        parent_actions: &[NetworkAction],
        combinations: Vec<NetworkActionCombination>,
        previous_cost: f64,
    ) -> CoreResult<Option<Leaf>> {
        let depth_state = Arc::new(Mutex::new(DepthState::default()));
        let parent_actions: Arc<Vec<NetworkAction>> = Arc::new(parent_actions.to_vec());
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let count = combinations.len();

        for combination in combinations {
            let input = Arc::clone(&self.input);
            let networks = Arc::clone(networks);
            let parent_actions = Arc::clone(&parent_actions);
            let depth_state = Arc::clone(&depth_state);
            let done = done_tx.clone();
            workers.spawn(move || {
                process_leaf(&input, &networks, &parent_actions, combination, &depth_state, previous_cost);
                // The receiver only disappears after a timeout.
                let _ = done.send(());
            });
        }
        drop(done_tx);

        for _ in 0..count {
            match done_rx.recv_timeout(DEPTH_TIMEOUT) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => {
                    return Err(RaoError::Timeout(format!(
                        "search depth did not finish within {} s",
                        DEPTH_TIMEOUT.as_secs()
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RaoError::Other("a leaf worker stopped before reporting".into()))
                }
            }
        }
        let best = depth_state.lock().best.take();
        Ok(best)
    }

    fn result(&self, leaf: Leaf) -> PerimeterResult {
        PerimeterResult::from_leaf(
            self.input.perimeter.main_state().clone(),
            leaf,
            self.input.perimeter.range_actions().to_vec(),
            self.input.pre_perimeter_setpoints.clone(),
        )
    }
}

fn process_leaf(
    input: &SearchTreeInput,
    networks: &NetworkPool,
    parent_actions: &[NetworkAction],
    combination: NetworkActionCombination,
    depth_state: &Mutex<DepthState>,
    previous_cost: f64,
) {
    let mut leaf = Leaf::child(parent_actions, combination);
    let mut network = networks.acquire();
    leaf.evaluate(&mut network, input);
    if leaf.status() == LeafStatus::Error {
        return;
    }
    let outranked = depth_state
        .lock()
        .stop_rank
        .is_some_and(|rank| rank < leaf.rank());
    if outranked {
        debug!(leaf = %leaf.id(), "A better ranked leaf already reached the stop criterion, skipping optimization");
        return;
    }
    leaf.optimize(&network, input);
    drop(network);
    record_leaf(input, depth_state, leaf, previous_cost);
}

fn record_leaf(input: &SearchTreeInput, depth_state: &Mutex<DepthState>, leaf: Leaf, previous_cost: f64) {
    if !input.tree_parameters.improved_enough(previous_cost, leaf.cost()) {
        debug!(leaf = %leaf, previous_cost, "Leaf does not improve enough");
        return;
    }
    let reaches_stop = input.stop_criterion_reached(&leaf);
    let mut state = depth_state.lock();
    if reaches_stop && leaf.is_fully_optimized() {
        state.stop_rank = Some(state.stop_rank.map_or(leaf.rank(), |r| r.min(leaf.rank())));
    }
    let replace = match &state.best {
        None => true,
        Some(best) => is_better(input, &leaf, reaches_stop, best),
    };
    if replace {
        state.best = Some(leaf);
    }
}

/// Deterministic preference of `candidate` over `best`.
fn is_better(input: &SearchTreeInput, candidate: &Leaf, candidate_stops: bool, best: &Leaf) -> bool {
    if candidate.is_fully_optimized() != best.is_fully_optimized() {
        return candidate.is_fully_optimized();
    }
    let best_stops = input.stop_criterion_reached(best);
    match (candidate_stops, best_stops) {
        (true, false) => true,
        (false, true) => false,
        (true, true) => candidate.rank() < best.rank(),
        (false, false) => candidate
            .cost()
            .total_cmp(&best.cost())
            .then_with(|| candidate.rank().cmp(&best.rank()))
            .is_lt(),
    }
}
