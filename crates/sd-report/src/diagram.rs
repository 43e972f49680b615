//! Mermaid flowchart of a model's structure.

use sd_core::{Direction, QuantityKind, ValidatedModel};
use sd_expr::Formula;
use std::fmt::Write;

const CLASS_DEFS: [&str; 5] = [
    "classDef stockNode fill:#FFD700,stroke:#B8860B,stroke-width:4px,color:#000,font-weight:bold",
    "classDef flowNode fill:#87CEEB,stroke:#4682B4,stroke-width:2px,color:#000",
    "classDef auxNode fill:#B0E57C,stroke:#228B22,stroke-width:2px,color:#000",
    "classDef paramNode fill:#E0E0E0,stroke:#888,stroke-width:1px,color:#666",
    "classDef animated stroke-dasharray: 5 5, animate: true, animation: fast",
];

/// `graph LR` text: one styled node per quantity, animated edges for flow
/// connections, dashed edges from parameters and auxiliaries to the formulas
/// that read them, and plain links from stocks to their readers.
pub fn model_diagram(model: &ValidatedModel) -> String {
    let desc = model.description();
    let mut out = String::from("graph LR\n");
    // writing into a String cannot fail
    let mut line = |text: String| {
        let _ = writeln!(out, "  {text}");
    };

    for s in &desc.stocks {
        line(format!("{}[\"STOCK: {} ({})\"]", s.name, s.name, s.unit));
        line(format!("class {} stockNode", s.name));
    }
    for a in &desc.auxiliaries {
        line(format!("{}>\"AUX: {} ({})\"]", a.name, a.name, a.unit));
        line(format!("class {} auxNode", a.name));
    }
    for (name, p) in &desc.parameters {
        line(format!("{name}[(\"PARAM: {name} ({})\")]", p.unit));
        line(format!("class {name} paramNode"));
    }
    for f in &desc.flows {
        line(format!("{}[[\"FLOW: {} ({})\"]]", f.name, f.name, f.unit));
        line(format!("class {} flowNode", f.name));
    }

    for (n, c) in desc.flow_connections.iter().enumerate() {
        let edge = n + 1;
        match c.direction {
            Direction::Inflow => line(format!(
                "{} e{edge}@==>|\"inflow\"| {}:::animated",
                c.flow, c.stock
            )),
            Direction::Outflow => line(format!(
                "{} e{edge}@==>|\"outflow\"| {}:::animated",
                c.stock, c.flow
            )),
        }
        line(format!("e{edge}@{{ animate: true }}"));
    }

    let auxiliaries = desc
        .auxiliaries
        .iter()
        .map(|a| a.name.as_str())
        .zip(model.auxiliary_formulas());
    let flows = desc
        .flows
        .iter()
        .map(|f| f.name.as_str())
        .zip(model.flow_formulas());
    let readers: Vec<(&str, &Formula)> = auxiliaries.chain(flows).collect();

    for (source_kind, arrow) in [
        (QuantityKind::Parameter, "-.->"),
        (QuantityKind::Auxiliary, "-.->"),
        (QuantityKind::Stock, "---"),
    ] {
        for (reader, formula) in &readers {
            for name in formula.referenced_names() {
                if model.kind_of(&name) == Some(source_kind) {
                    line(format!("{name} {arrow} {reader}"));
                }
            }
        }
    }

    for def in CLASS_DEFS {
        line(def.to_string());
    }
    out
}

/// Wrap a diagram in a fenced markdown block.
pub fn markdown_block(diagram: &str) -> String {
    format!("```mermaid\n{diagram}```\n")
}
