//! Joins grouped metrics against reference data: operations against the
//! catalog, actors against the caller-supplied roster.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::catalog::OperationCatalog;
use super::types::{ActorLabel, ActorMetric, DimensionKey, NamedMetric, OperationMetric};

/// One administrator identity from the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRosterEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Actor id -> display identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    by_id: HashMap<String, ActorRosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<ActorRosterEntry>) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        for entry in entries {
            by_id.entry(entry.id.clone()).or_insert(entry);
        }
        Self { by_id }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn label(&self, actor: &DimensionKey) -> ActorLabel {
        actor
            .as_known()
            .and_then(|id| self.by_id.get(id))
            .map(|entry| ActorLabel::Rostered {
                name: entry.name.clone(),
                email: entry.email.clone(),
            })
            .unwrap_or(ActorLabel::Unmatched)
    }
}

/// Attach catalog description and deprecation flag; misses get defaults.
pub fn enrich_operations(metrics: Vec<NamedMetric>, catalog: &OperationCatalog) -> Vec<OperationMetric> {
    metrics
        .into_iter()
        .map(|metric| {
            let entry = metric.name.as_known().and_then(|id| catalog.get(id));
            OperationMetric {
                description: entry.map(|e| e.description.clone()).unwrap_or_default(),
                deprecated: entry.map(|e| e.deprecated).unwrap_or(false),
                metric,
            }
        })
        .collect()
}

pub fn enrich_actors(metrics: Vec<NamedMetric>, roster: &Roster) -> Vec<ActorMetric> {
    metrics
        .into_iter()
        .map(|metric| ActorMetric {
            display_label: roster.label(&metric.name),
            metric,
        })
        .collect()
}
