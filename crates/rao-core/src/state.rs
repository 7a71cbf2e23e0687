//! Instants, contingencies and states.
//!
//! A [`State`] pairs an [`Instant`] with an optional contingency id and is the
//! unit every Cnec and usage rule is attached to. States order by
//! contingency first (base case before any outage) and instant second.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Ordered optimisation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instant {
    Preventive,
    Outage,
    Auto,
    Curative,
}

impl Instant {
    pub fn is_preventive(self) -> bool {
        self == Instant::Preventive
    }

    pub fn is_outage(self) -> bool {
        self == Instant::Outage
    }

    pub fn is_auto(self) -> bool {
        self == Instant::Auto
    }

    pub fn is_curative(self) -> bool {
        self == Instant::Curative
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Instant::Preventive => "preventive",
            Instant::Outage => "outage",
            Instant::Auto => "auto",
            Instant::Curative => "curative",
        }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outage scenario: the listed network elements are disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contingency {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub elements: Vec<String>,
}

impl Contingency {
    pub fn new(id: impl Into<String>, elements: Vec<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            elements,
        }
    }
}

/// (Instant, optional contingency) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    pub instant: Instant,
    #[serde(default)]
    pub contingency: Option<String>,
}

impl State {
    pub fn preventive() -> Self {
        Self {
            instant: Instant::Preventive,
            contingency: None,
        }
    }

    pub fn post_contingency(instant: Instant, contingency: impl Into<String>) -> Self {
        Self {
            instant,
            contingency: Some(contingency.into()),
        }
    }

    pub fn is_preventive(&self) -> bool {
        self.contingency.is_none()
    }

    pub fn contingency_id(&self) -> Option<&str> {
        self.contingency.as_deref()
    }

    /// Stable textual id, e.g. `preventive` or `co1 - curative`.
    pub fn id(&self) -> String {
        match &self.contingency {
            None => self.instant.to_string(),
            Some(co) => format!("{} - {}", co, self.instant),
        }
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        self.contingency
            .cmp(&other.contingency)
            .then(self.instant.cmp(&other.instant))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}
