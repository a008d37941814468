//! Causal graph builder.
//!
//! Structure comes from partial correlations over the highest-variance numeric
//! columns. Edges point from the higher-variance to the lower-variance column.
//! This ordering is a heuristic proxy, not a causal discovery algorithm; the
//! graph says which variables move together once the others are held fixed,
//! and the direction is a guess.

use crate::algorithms::linalg::{correlation_matrix, ols, partial_correlations};
use crate::data::RefinedDataset;
use crate::stats::{round_to, standardize, variance};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const MAX_COLUMNS: usize = 15;
pub const MIN_COLUMNS: usize = 3;
pub const MIN_ROWS: usize = 5;
/// Minimum |partial correlation| for an edge.
pub const EDGE_THRESHOLD: f64 = 0.25;
const STRONG_EDGE: f64 = 0.5;
const MAX_COUNTERFACTUALS: usize = 2;
const OUTCOME_HINTS: &[&str] = &["revenue", "profit", "sales", "price"];

pub const INSUFFICIENT_DATA: &str = "Not enough numeric data for causal analysis.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalNode {
    pub id: String,
    pub group: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalLink {
    pub source: String,
    pub target: String,
    pub value: f64,
    /// "strong" or "moderate".
    pub strength: String,
}

/// Effect of a one standard deviation increase in `treatment` on `outcome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterfactual {
    pub treatment: String,
    pub outcome: String,
    pub effect_size: f64,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CausalNetwork {
    pub nodes: Vec<CausalNode>,
    pub links: Vec<CausalLink>,
    #[serde(default)]
    pub counterfactuals: Vec<Counterfactual>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CausalNetwork {
    pub fn insufficient() -> Self {
        Self {
            error: Some(INSUFFICIENT_DATA.to_string()),
            ..Self::default()
        }
    }
}

/// Numeric columns with non-zero variance, highest variance first, at most [`MAX_COLUMNS`].
fn select_columns(ds: &RefinedDataset) -> Vec<(String, f64, Vec<f64>)> {
    let mut columns: Vec<(String, f64, Vec<f64>)> = ds
        .numeric_columns()
        .into_iter()
        .map(|(name, values)| (name.to_string(), variance(values, 1), values.to_vec()))
        .filter(|(_, var, _)| var.is_finite() && *var > 0.0)
        .collect();
    columns.sort_by(|a, b| b.1.total_cmp(&a.1));
    columns.truncate(MAX_COLUMNS);
    columns
}

/// Build the causal network. Insufficient data yields a network carrying an error text.
pub fn build_causal_network(ds: &RefinedDataset) -> CausalNetwork {
    let selected = select_columns(ds);
    if selected.len() < MIN_COLUMNS || ds.n_rows() < MIN_ROWS {
        return CausalNetwork::insufficient();
    }

    let standardized: Vec<Vec<f64>> = selected.iter().map(|(_, _, v)| standardize(v)).collect();
    let pcor = match partial_correlations(&correlation_matrix(&standardized)) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Partial correlation failed");
            return CausalNetwork {
                error: Some(format!("Causal generation failed: {}", e)),
                ..CausalNetwork::default()
            };
        }
    };

    let mut graph: DiGraph<String, f64> = DiGraph::new();
    let ids: Vec<NodeIndex> = selected
        .iter()
        .map(|(name, _, _)| graph.add_node(name.clone()))
        .collect();
    let k = selected.len();
    for i in 0..k {
        for j in 0..k {
            if i == j {
                continue;
            }
            let weight = pcor[(i, j)];
            if weight.abs() > EDGE_THRESHOLD && selected[j].1 < selected[i].1 {
                graph.add_edge(ids[i], ids[j], weight);
            }
        }
    }
    debug!(nodes = k, edges = graph.edge_count(), "Built causal graph");

    let nodes = graph
        .node_indices()
        .map(|n| CausalNode {
            id: graph[n].clone(),
            group: 1,
        })
        .collect();
    let links = graph
        .edge_references()
        .map(|e| CausalLink {
            source: graph[e.source()].clone(),
            target: graph[e.target()].clone(),
            value: round_to(*e.weight(), 3),
            strength: if e.weight().abs() > STRONG_EDGE {
                "strong"
            } else {
                "moderate"
            }
            .to_string(),
        })
        .collect();

    let counterfactuals = select_outcome(&graph, &ids)
        .map(|outcome| counterfactuals_for(&graph, outcome, &ids, &standardized))
        .unwrap_or_default();

    CausalNetwork {
        nodes,
        links,
        counterfactuals,
        error: None,
    }
}

/// Outcome by name, else the first node with the highest in-degree.
fn select_outcome(graph: &DiGraph<String, f64>, ids: &[NodeIndex]) -> Option<NodeIndex> {
    let by_name = ids.iter().copied().find(|&n| {
        let lower = graph[n].to_lowercase();
        OUTCOME_HINTS.iter().any(|hint| lower.contains(hint))
    });
    by_name.or_else(|| {
        let mut best: Option<(NodeIndex, usize)> = None;
        for &n in ids {
            let degree = graph.neighbors_directed(n, Direction::Incoming).count();
            if best.is_none_or(|(_, d)| degree > d) {
                best = Some((n, degree));
            }
        }
        best.map(|(n, _)| n)
    })
}

fn counterfactuals_for(
    graph: &DiGraph<String, f64>,
    outcome: NodeIndex,
    ids: &[NodeIndex],
    standardized: &[Vec<f64>],
) -> Vec<Counterfactual> {
    let mut parents: Vec<NodeIndex> = graph
        .neighbors_directed(outcome, Direction::Incoming)
        .collect();
    if parents.is_empty() {
        return Vec::new();
    }
    parents.sort();
    parents.dedup();

    let position = |n: NodeIndex| ids.iter().position(|&x| x == n).unwrap_or(0);
    let regressors: Vec<Vec<f64>> = parents
        .iter()
        .map(|&p| standardized[position(p)].clone())
        .collect();
    let coefficients = match ols(&regressors, &standardized[position(outcome)]) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, outcome = %graph[outcome], "Could not compute OLS for counterfactuals");
            return Vec::new();
        }
    };

    let mut effects: Vec<(NodeIndex, f64)> = parents.into_iter().zip(coefficients).collect();
    effects.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    effects
        .into_iter()
        .take(MAX_COUNTERFACTUALS)
        .map(|(treatment, coef)| {
            let effect = round_to(coef, 3);
            let direction = if effect > 0.0 { "increase" } else { "decrease" };
            let treatment = graph[treatment].clone();
            let outcome = graph[outcome].clone();
            Counterfactual {
                description: format!(
                    "Causal Inference: If we increase '{}' by 1 Standard Deviation, the model predicts a {:.1}% std dev {} in '{}', holding all other variables constant (Do-Calculus).",
                    treatment,
                    (effect * 100.0).abs(),
                    direction,
                    outcome
                ),
                treatment,
                outcome,
                effect_size: effect,
            }
        })
        .collect()
}
