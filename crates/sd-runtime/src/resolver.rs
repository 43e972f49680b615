//! Evaluation order for auxiliaries and the per-stock flow wiring.

use crate::error::SimError;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction as EdgeDirection;
use sd_core::{QuantityKind, ValidatedModel};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Auxiliary dependency graph; an edge `B -> A` means A's formula reads B.
///
/// Node `i` is the auxiliary declared at position `i`.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
}

impl DependencyGraph {
    /// Build the graph, rejecting auxiliaries or flows that read a flow.
    pub fn from_model(model: &ValidatedModel) -> Result<Self, SimError> {
        let desc = model.description();
        let mut graph = DiGraph::with_capacity(desc.auxiliaries.len(), 0);
        for aux in &desc.auxiliaries {
            graph.add_node(aux.name.clone());
        }

        let aux_index = |name: &str| {
            desc.auxiliaries
                .iter()
                .position(|a| a.name == name)
                .map(NodeIndex::new)
        };

        for (i, (aux, formula)) in desc
            .auxiliaries
            .iter()
            .zip(model.auxiliary_formulas())
            .enumerate()
        {
            for name in formula.referenced_names() {
                match model.kind_of(&name) {
                    Some(QuantityKind::Flow) => {
                        return Err(SimError::InvalidReference {
                            quantity: aux.name.clone(),
                            kind: QuantityKind::Auxiliary,
                            name,
                        })
                    }
                    Some(QuantityKind::Auxiliary) => {
                        if let Some(dep) = aux_index(&name) {
                            graph.update_edge(dep, NodeIndex::new(i), ());
                        }
                    }
                    _ => {}
                }
            }
        }

        for (flow, formula) in desc.flows.iter().zip(model.flow_formulas()) {
            if let Some(name) = formula
                .referenced_names()
                .into_iter()
                .find(|n| model.kind_of(n) == Some(QuantityKind::Flow))
            {
                return Err(SimError::InvalidReference {
                    quantity: flow.name.clone(),
                    kind: QuantityKind::Flow,
                    name,
                });
            }
        }

        Ok(Self { graph })
    }

    /// Names of the auxiliaries that `name` reads directly.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        let Some(node) = self.graph.node_indices().find(|n| self.graph[*n] == name) else {
            return Vec::new();
        };
        let mut deps: Vec<&str> = self
            .graph
            .neighbors_directed(node, EdgeDirection::Incoming)
            .map(|n| self.graph[n].as_str())
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Strongly connected components that form cycles, self-loops included.
    fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut names: Vec<String> = scc.iter().map(|n| self.graph[*n].clone()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Declaration indices in an order where every auxiliary follows its
    /// dependencies; among ready auxiliaries the earliest declared goes first.
    pub fn evaluation_order(&self) -> Result<Vec<usize>, SimError> {
        if let Some(members) = self.cycles().into_iter().next() {
            return Err(SimError::CircularDependency { members });
        }

        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, EdgeDirection::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for next in self.graph.neighbors_directed(NodeIndex::new(i), EdgeDirection::Outgoing) {
                let d = &mut in_degree[next.index()];
                *d -= 1;
                if *d == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }
        Ok(order)
    }
}

/// How the integration loop walks a model each step. Computed once per model
/// and shared by every run of it.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPlan {
    auxiliary_order: Vec<usize>,
    /// Per stock in declaration order: `(flow index, +1 inflow / -1 outflow)`.
    stock_links: Vec<Vec<(usize, f64)>>,
}

impl EvaluationPlan {
    /// Auxiliary declaration indices in evaluation order.
    pub fn auxiliary_order(&self) -> &[usize] {
        &self.auxiliary_order
    }

    /// Auxiliary names in evaluation order.
    pub fn ordered_auxiliaries<'m>(&self, model: &'m ValidatedModel) -> Vec<&'m str> {
        let auxes = &model.description().auxiliaries;
        self.auxiliary_order
            .iter()
            .map(|i| auxes[*i].name.as_str())
            .collect()
    }

    pub fn stock_links(&self, stock: usize) -> &[(usize, f64)] {
        &self.stock_links[stock]
    }
}

/// Compute the evaluation plan for `model`.
pub fn resolve(model: &ValidatedModel) -> Result<EvaluationPlan, SimError> {
    let graph = DependencyGraph::from_model(model)?;
    let auxiliary_order = graph.evaluation_order()?;

    let desc = model.description();
    let stock_links = desc
        .stocks
        .iter()
        .map(|stock| {
            desc.connections_of(&stock.name)
                .filter_map(|c| {
                    desc.flows
                        .iter()
                        .position(|f| f.name == c.flow)
                        .map(|i| (i, c.direction.sign()))
                })
                .collect()
        })
        .collect();

    let plan = EvaluationPlan {
        auxiliary_order,
        stock_links,
    };
    tracing::debug!(order = ?plan.ordered_auxiliaries(model), "auxiliary order resolved");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sd_core::{
        validate_model, Auxiliary, Direction, Flow, FlowConnection, ModelDescription,
        SimulationSettings, Stock,
    };

    fn aux(name: &str, formula: &str) -> Auxiliary {
        Auxiliary {
            name: name.into(),
            formula: formula.into(),
            unit: "u".into(),
            description: String::new(),
        }
    }

    /// A stock drained by one flow that reads `flow_formula`, plus `auxes`.
    fn model(auxes: Vec<Auxiliary>, flow_formula: &str) -> ValidatedModel {
        let desc = ModelDescription {
            problem_description: None,
            stocks: vec![Stock {
                name: "S".into(),
                initial_value: 1.0,
                unit: "u".into(),
                description: String::new(),
            }],
            parameters: Default::default(),
            auxiliaries: auxes,
            flows: vec![Flow {
                name: "F".into(),
                formula: flow_formula.into(),
                unit: "u/day".into(),
                description: String::new(),
            }],
            flow_connections: vec![FlowConnection::new("F", "S", Direction::Outflow)],
            simulation_settings: SimulationSettings::default(),
        };
        validate_model(&desc).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let m = model(
            vec![aux("C", "A + B"), aux("A", "S * 2"), aux("B", "A + 1")],
            "C",
        );
        let plan = resolve(&m).unwrap();
        assert_eq!(plan.ordered_auxiliaries(&m), vec!["A", "B", "C"]);
        assert_eq!(plan.stock_links(0), &[(0usize, -1.0)]);

        let graph = DependencyGraph::from_model(&m).unwrap();
        assert_eq!(graph.dependencies_of("C"), vec!["A", "B"]);
        assert!(graph.dependencies_of("A").is_empty());
    }

    #[test]
    fn independent_auxiliaries_keep_declaration_order() {
        let m = model(vec![aux("Z", "S"), aux("Y", "S"), aux("X", "S")], "X + Y + Z");
        assert_eq!(resolve(&m).unwrap().auxiliary_order(), &[0usize, 1, 2]);
    }

    #[test]
    fn two_cycle_names_both_members() {
        let m = model(vec![aux("A", "B + 1"), aux("B", "A * 2")], "A + B");
        assert_eq!(
            resolve(&m).unwrap_err(),
            SimError::CircularDependency {
                members: vec!["A".into(), "B".into()]
            }
        );
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let m = model(vec![aux("A", "A + S"), aux("B", "A")], "B");
        assert_eq!(
            resolve(&m).unwrap_err(),
            SimError::CircularDependency {
                members: vec!["A".into()]
            }
        );
    }

    #[test]
    fn flow_reads_are_rejected() {
        let m = model(vec![aux("A", "F + S")], "A");
        assert!(matches!(
            resolve(&m),
            Err(SimError::InvalidReference {
                kind: QuantityKind::Auxiliary,
                ..
            })
        ));
        let m = model(vec![aux("A", "S")], "A + F");
        assert!(matches!(
            resolve(&m),
            Err(SimError::InvalidReference {
                kind: QuantityKind::Flow,
                ..
            })
        ));
    }
}
