//! Solver-independent MILP instance with typed variable and constraint keys.

use super::solver::MilpSolver;
use rao_core::{CoreResult, RaoError, Side};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariableKey {
    Flow { cnec: String, side: Side },
    Setpoint { action: String },
    AbsoluteVariation { action: String },
    MinMargin,
    MinRelativeMargin,
    MarginSign,
    TapVariation { action: String, direction: Direction },
    TapVariationBinary { action: String, direction: Direction },
    GroupSetpoint { group: String },
    GroupTap { group: String },
    MnecViolation { cnec: String, side: Side },
    LoopFlowViolation { cnec: String, side: Side },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKey {
    Flow { cnec: String, side: Side },
    AbsoluteVariationPositive { action: String },
    AbsoluteVariationNegative { action: String },
    MinMarginLower { cnec: String, side: Side },
    MinMarginUpper { cnec: String, side: Side },
    MinRelativeMarginLower { cnec: String, side: Side },
    MinRelativeMarginUpper { cnec: String, side: Side },
    MarginSignNegative,
    MarginSignPositive,
    TapToAngle { action: String },
    UpOrDown { action: String },
    TapVariationBinary { action: String, direction: Direction },
    PstGroupTap { action: String },
    RangeActionGroup { action: String },
    MnecLower { cnec: String, side: Side },
    MnecUpper { cnec: String, side: Side },
    LoopFlowLower { cnec: String, side: Side },
    LoopFlowUpper { cnec: String, side: Side },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Continuous,
    Integer,
    Binary,
}

#[derive(Debug, Clone)]
pub struct LinearVariable {
    pub kind: VariableKind,
    pub lb: f64,
    pub ub: f64,
}

/// `lb ≤ Σ coefficient · variable ≤ ub`; infinite bounds are omitted.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub lb: f64,
    pub ub: f64,
    pub coefficients: BTreeMap<usize, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearProblemStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Abnormal,
}

impl fmt::Display for LinearProblemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinearProblemStatus::Optimal => "OPTIMAL",
            LinearProblemStatus::Infeasible => "INFEASIBLE",
            LinearProblemStatus::Unbounded => "UNBOUNDED",
            LinearProblemStatus::Abnormal => "ABNORMAL",
        };
        f.write_str(s)
    }
}

/// Values returned by a [`MilpSolver`], indexed like the problem variables.
#[derive(Debug, Clone)]
pub struct MilpSolution {
    pub status: LinearProblemStatus,
    pub values: Vec<f64>,
}

/// One MILP, minimised. A fresh instance is built for every leaf.
#[derive(Debug, Default)]
pub struct LinearProblem {
    variables: Vec<LinearVariable>,
    variable_index: HashMap<VariableKey, usize>,
    constraints: Vec<LinearConstraint>,
    constraint_index: HashMap<ConstraintKey, usize>,
    objective: BTreeMap<usize, f64>,
    solution: Option<Vec<f64>>,
}

impl LinearProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, key: VariableKey, kind: VariableKind, lb: f64, ub: f64) -> CoreResult<()> {
        if self.variable_index.contains_key(&key) {
            return Err(RaoError::Solver(format!("variable {key:?} already created")));
        }
        let (lb, ub) = match kind {
            VariableKind::Binary => (lb.max(0.0), ub.min(1.0)),
            _ => (lb, ub),
        };
        self.variable_index.insert(key, self.variables.len());
        self.variables.push(LinearVariable { kind, lb, ub });
        Ok(())
    }

    pub fn has_variable(&self, key: &VariableKey) -> bool {
        self.variable_index.contains_key(key)
    }

    fn variable_position(&self, key: &VariableKey) -> CoreResult<usize> {
        self.variable_index
            .get(key)
            .copied()
            .ok_or_else(|| RaoError::Solver(format!("variable {key:?} has not been created")))
    }

    fn constraint_position(&self, key: &ConstraintKey) -> CoreResult<usize> {
        self.constraint_index
            .get(key)
            .copied()
            .ok_or_else(|| RaoError::Solver(format!("constraint {key:?} has not been created")))
    }

    pub fn variable(&self, key: &VariableKey) -> CoreResult<&LinearVariable> {
        Ok(&self.variables[self.variable_position(key)?])
    }

    pub fn set_variable_bounds(&mut self, key: &VariableKey, lb: f64, ub: f64) -> CoreResult<()> {
        let i = self.variable_position(key)?;
        self.variables[i].lb = lb;
        self.variables[i].ub = ub;
        Ok(())
    }

    pub fn add_constraint(&mut self, key: ConstraintKey, lb: f64, ub: f64) -> CoreResult<()> {
        if self.constraint_index.contains_key(&key) {
            return Err(RaoError::Solver(format!("constraint {key:?} already created")));
        }
        self.constraint_index.insert(key, self.constraints.len());
        self.constraints.push(LinearConstraint {
            lb,
            ub,
            coefficients: BTreeMap::new(),
        });
        Ok(())
    }

    pub fn has_constraint(&self, key: &ConstraintKey) -> bool {
        self.constraint_index.contains_key(key)
    }

    pub fn set_constraint_bounds(&mut self, key: &ConstraintKey, lb: f64, ub: f64) -> CoreResult<()> {
        let i = self.constraint_position(key)?;
        self.constraints[i].lb = lb;
        self.constraints[i].ub = ub;
        Ok(())
    }

    pub fn set_coefficient(&mut self, constraint: &ConstraintKey, variable: &VariableKey, coefficient: f64) -> CoreResult<()> {
        let c = self.constraint_position(constraint)?;
        let v = self.variable_position(variable)?;
        if coefficient == 0.0 {
            self.constraints[c].coefficients.remove(&v);
        } else {
            self.constraints[c].coefficients.insert(v, coefficient);
        }
        Ok(())
    }

    pub fn set_objective_coefficient(&mut self, variable: &VariableKey, coefficient: f64) -> CoreResult<()> {
        let v = self.variable_position(variable)?;
        self.objective.insert(v, coefficient);
        Ok(())
    }

    pub fn variables(&self) -> &[LinearVariable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &BTreeMap<usize, f64> {
        &self.objective
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Solve with `solver`; on success the values become readable through
    /// [`LinearProblem::value`], otherwise any previous solution is dropped.
    pub fn solve(&mut self, solver: &dyn MilpSolver) -> CoreResult<LinearProblemStatus> {
        let solution = solver.solve(self)?;
        if solution.status == LinearProblemStatus::Optimal {
            if solution.values.len() != self.variables.len() {
                return Err(RaoError::Solver(format!(
                    "solver returned {} values for {} variables",
                    solution.values.len(),
                    self.variables.len()
                )));
            }
            self.solution = Some(solution.values);
        } else {
            self.solution = None;
        }
        Ok(solution.status)
    }

    pub fn value(&self, key: &VariableKey) -> Option<f64> {
        let i = *self.variable_index.get(key)?;
        self.solution.as_ref().map(|values| values[i])
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.solution
            .as_ref()
            .map(|values| self.objective.iter().map(|(&i, &c)| c * values[i]).sum())
    }
}
