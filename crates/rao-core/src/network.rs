//! Network element-state registry.
//!
//! The optimiser never needs the electrical model itself (the sensitivity
//! oracle owns the physics); it only needs the controllable state of the
//! grid: which branches are connected, PST tap positions and injection/HVDC
//! setpoints, plus the bidding-zone (area) of each element for the
//! distance-to-constraint filters. A [`Network`] is cheap to clone, and
//! every search-tree worker owns its own clone.

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::error::{CoreResult, RaoError};

fn default_true() -> bool {
    true
}

/// Branch (line, transformer, switch) between two areas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub from_area: String,
    pub to_area: String,
    #[serde(default = "default_true")]
    pub connected: bool,
}

/// Phase-shifting transformer: current tap and tap/angle table (degrees).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseShifter {
    pub tap: i32,
    pub tap_to_angle: BTreeMap<i32, f64>,
    #[serde(default)]
    pub area: Option<String>,
}

impl PhaseShifter {
    pub fn angle(&self) -> CoreResult<f64> {
        self.tap_to_angle.get(&self.tap).copied().ok_or_else(|| {
            RaoError::Network(format!("tap {} is not in the tap/angle table", self.tap))
        })
    }
}

/// Controllable state of a transmission grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default)]
    pub branches: BTreeMap<String, Branch>,
    #[serde(default)]
    pub phase_shifters: BTreeMap<String, PhaseShifter>,
    /// Injection, HVDC and counter-trade setpoints (MW).
    #[serde(default)]
    pub setpoints: BTreeMap<String, f64>,
    /// Area of elements that are not branches (generators, HVDC terminals).
    #[serde(default)]
    pub element_areas: BTreeMap<String, String>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_branch(&mut self, id: impl Into<String>, from_area: &str, to_area: &str) {
        self.branches.insert(
            id.into(),
            Branch {
                from_area: from_area.to_string(),
                to_area: to_area.to_string(),
                connected: true,
            },
        );
    }

    pub fn add_phase_shifter(&mut self, id: impl Into<String>, tap: i32, tap_to_angle: BTreeMap<i32, f64>) {
        self.phase_shifters.insert(
            id.into(),
            PhaseShifter {
                tap,
                tap_to_angle,
                area: None,
            },
        );
    }

    pub fn has_element(&self, id: &str) -> bool {
        self.branches.contains_key(id)
            || self.phase_shifters.contains_key(id)
            || self.setpoints.contains_key(id)
    }

    pub fn is_connected(&self, branch: &str) -> CoreResult<bool> {
        self.branches
            .get(branch)
            .map(|b| b.connected)
            .ok_or_else(|| RaoError::Network(format!("unknown branch '{}'", branch)))
    }

    pub fn set_connected(&mut self, branch: &str, connected: bool) -> CoreResult<()> {
        let b = self
            .branches
            .get_mut(branch)
            .ok_or_else(|| RaoError::Network(format!("unknown branch '{}'", branch)))?;
        b.connected = connected;
        Ok(())
    }

    pub fn phase_shifter(&self, id: &str) -> CoreResult<&PhaseShifter> {
        self.phase_shifters
            .get(id)
            .ok_or_else(|| RaoError::Network(format!("unknown phase shifter '{}'", id)))
    }

    pub fn pst_tap(&self, id: &str) -> CoreResult<i32> {
        Ok(self.phase_shifter(id)?.tap)
    }

    pub fn set_pst_tap(&mut self, id: &str, tap: i32) -> CoreResult<()> {
        let pst = self
            .phase_shifters
            .get_mut(id)
            .ok_or_else(|| RaoError::Network(format!("unknown phase shifter '{}'", id)))?;
        if !pst.tap_to_angle.contains_key(&tap) {
            return Err(RaoError::Network(format!(
                "tap {} out of the physical range of '{}'",
                tap, id
            )));
        }
        pst.tap = tap;
        Ok(())
    }

    /// Setpoint of an injection-like element, 0 if never set.
    pub fn setpoint(&self, id: &str) -> f64 {
        self.setpoints.get(id).copied().unwrap_or(0.0)
    }

    pub fn set_setpoint(&mut self, id: &str, value: f64) {
        self.setpoints.insert(id.to_string(), value);
    }

    /// Areas an element belongs to (two for a cross-border branch).
    pub fn areas_of(&self, element: &str) -> BTreeSet<String> {
        let mut areas = BTreeSet::new();
        if let Some(b) = self.branches.get(element) {
            areas.insert(b.from_area.clone());
            areas.insert(b.to_area.clone());
        }
        if let Some(area) = self.phase_shifters.get(element).and_then(|p| p.area.clone()) {
            areas.insert(area);
        }
        if let Some(area) = self.element_areas.get(element) {
            areas.insert(area.clone());
        }
        areas
    }

    /// Area adjacency graph built from cross-area branches.
    pub fn area_graph(&self) -> AreaGraph {
        AreaGraph::from_network(self)
    }
}

/// Undirected graph of areas; an edge is a border crossed by at least one branch.
#[derive(Debug, Clone)]
pub struct AreaGraph {
    graph: UnGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl AreaGraph {
    pub fn from_network(network: &Network) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut index = HashMap::new();
        let mut node = |graph: &mut UnGraph<String, ()>, area: &str| -> NodeIndex {
            *index
                .entry(area.to_string())
                .or_insert_with(|| graph.add_node(area.to_string()))
        };
        for branch in network.branches.values() {
            let a = node(&mut graph, &branch.from_area);
            let b = node(&mut graph, &branch.to_area);
            if a != b && graph.find_edge(a, b).is_none() {
                graph.add_edge(a, b, ());
            }
        }
        for area in network.element_areas.values() {
            node(&mut graph, area);
        }
        Self { graph, index }
    }

    pub fn area_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of borders between two areas, `None` if disconnected or unknown.
    pub fn boundary_distance(&self, from: &str, to: &str) -> Option<usize> {
        let start = *self.index.get(from)?;
        let goal = *self.index.get(to)?;
        let mut distances: HashMap<NodeIndex, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        distances.insert(start, 0);
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            let d = distances[&node];
            if node == goal {
                return Some(d);
            }
            for next in self.graph.neighbors(node) {
                if !distances.contains_key(&next) {
                    distances.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// True when the two areas are at most `max_boundaries` borders apart.
    pub fn are_neighbors(&self, from: &str, to: &str, max_boundaries: usize) -> bool {
        self.boundary_distance(from, to)
            .map_or(false, |d| d <= max_boundaries)
    }
}
