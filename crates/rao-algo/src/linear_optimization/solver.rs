//! MILP backends.
//!
//! The problem is handed to `good_lp` in one shot: variables in index order,
//! the minimised objective, then every constraint with its finite bounds.

use super::problem::{LinearProblem, LinearProblemStatus, MilpSolution, VariableKind};
use good_lp::solvers::Solver;
use good_lp::{constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable};
use rao_core::{CoreResult, RaoError, SolverKind};
use tracing::{debug, warn};

/// Solves a [`LinearProblem`]. Backends must be usable from worker threads.
pub trait MilpSolver: Send + Sync {
    fn name(&self) -> &str;
    fn solve(&self, problem: &LinearProblem) -> CoreResult<MilpSolution>;
}

/// `good_lp` backend selected by [`SolverKind`].
#[derive(Debug, Clone)]
pub struct GoodLpSolver {
    kind: SolverKind,
    /// Only HiGHS takes a MIP gap.
    #[cfg_attr(not(feature = "solver-highs"), allow(dead_code))]
    relative_mip_gap: f64,
}

impl GoodLpSolver {
    pub fn new(kind: SolverKind, relative_mip_gap: f64) -> Self {
        Self {
            kind,
            relative_mip_gap,
        }
    }
}

impl Default for GoodLpSolver {
    fn default() -> Self {
        Self::new(SolverKind::Microlp, 1e-4)
    }
}

impl MilpSolver for GoodLpSolver {
    fn name(&self) -> &str {
        match self.kind {
            SolverKind::Microlp => "microlp",
            SolverKind::Highs => "highs",
        }
    }

    fn solve(&self, problem: &LinearProblem) -> CoreResult<MilpSolution> {
        debug!(
            solver = self.name(),
            variables = problem.variable_count(),
            constraints = problem.constraint_count(),
            "Solving linear problem"
        );
        match self.kind {
            #[cfg(feature = "solver-microlp")]
            SolverKind::Microlp => Ok(solve_with(problem, good_lp::solvers::microlp::microlp, |m| m)),
            #[cfg(feature = "solver-highs")]
            SolverKind::Highs => {
                let gap = self.relative_mip_gap;
                Ok(solve_with(problem, good_lp::solvers::highs::highs, move |m| {
                    m.set_option("mip_rel_gap", gap)
                }))
            }
            #[allow(unreachable_patterns)]
            other => Err(RaoError::Config(format!(
                "solver {other:?} is not compiled in; enable the matching feature"
            ))),
        }
    }
}

fn solve_with<S, F>(problem: &LinearProblem, solver: S, configure: F) -> MilpSolution
where
    S: Solver,
    S::Model: SolverModel<Error = ResolutionError>,
    F: FnOnce(S::Model) -> S::Model,
{
    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = problem
        .variables()
        .iter()
        .map(|v| {
            let mut definition = variable();
            if v.lb.is_finite() {
                definition = definition.min(v.lb);
            }
            if v.ub.is_finite() {
                definition = definition.max(v.ub);
            }
            match v.kind {
                VariableKind::Continuous => {}
                VariableKind::Integer => definition = definition.integer(),
                VariableKind::Binary => definition = definition.binary(),
            }
            vars.add(definition)
        })
        .collect();

    let mut objective = Expression::from(0.0);
    for (&i, &coefficient) in problem.objective() {
        objective += coefficient * handles[i];
    }

    let mut model = configure(vars.minimise(objective).using(solver));
    for c in problem.constraints() {
        let mut expr = Expression::from(0.0);
        for (&i, &coefficient) in &c.coefficients {
            expr += coefficient * handles[i];
        }
        let (lb, ub) = (c.lb, c.ub);
        if lb.is_finite() && ub.is_finite() && (ub - lb).abs() < f64::EPSILON {
            model = model.with(constraint!(expr == lb));
            continue;
        }
        if lb.is_finite() {
            model = model.with(constraint!(expr.clone() >= lb));
        }
        if ub.is_finite() {
            model = model.with(constraint!(expr <= ub));
        }
    }

    match model.solve() {
        Ok(solution) => MilpSolution {
            status: LinearProblemStatus::Optimal,
            values: handles.iter().map(|&h| solution.value(h)).collect(),
        },
        Err(ResolutionError::Infeasible) => status_only(LinearProblemStatus::Infeasible),
        Err(ResolutionError::Unbounded) => status_only(LinearProblemStatus::Unbounded),
        Err(e) => {
            warn!("Linear solver error: {}", e);
            status_only(LinearProblemStatus::Abnormal)
        }
    }
}

fn status_only(status: LinearProblemStatus) -> MilpSolution {
    MilpSolution {
        status,
        values: Vec::new(),
    }
}
