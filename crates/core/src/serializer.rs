//! C2: Graph -> C4-PlantUML DSL serializer (spec §4.2).
//!
//! No teacher analogue exists — the teacher server only ever receives
//! finished PlantUML source over HTTP. The "walk a model, emit text" shape
//! here follows the consuming-builder-to-text pattern seen in the pack's
//! `c4rs` crate, adapted to the exact C4-PlantUML grammar and string-cleaning
//! quirks this spec pins down.

use crate::error::SerializeError;
use crate::graph::{Container, Direction, Graph, Relation};
use std::collections::BTreeMap;
use std::fmt::Write as _;

const PREAMBLE_INCLUDE: &str =
    "!include https://raw.githubusercontent.com/plantuml-stdlib/C4-PlantUML/master/C4_Container.puml";

/// Trims whitespace and rewrites embedded newlines as the literal `\n`
/// two-character sequence. Embedded double quotes are deliberately left
/// unescaped — a known quirk of the output DSL that existing fixtures
/// depend on; see spec §9.
pub fn clean(s: &str) -> String {
    s.trim().replace('\n', "\\n")
}

/// Serializes `graph` into C4-PlantUML source.
pub fn serialize(graph: &Graph) -> Result<String, SerializeError> {
    if graph.is_empty() {
        return Err(SerializeError::InvalidGraph(
            "graph must contain at least one container".into(),
        ));
    }

    let mut out = String::new();
    out.push_str("@startuml\n");
    out.push_str(PREAMBLE_INCLUDE);
    out.push('\n');
    let _ = writeln!(out, "footer \"{}\"", clean(graph.footer_or_default()));
    if !graph.title.trim().is_empty() {
        let _ = writeln!(out, "title \"{}\"", clean(&graph.title));
    }

    emit_containers(&mut out, &graph.containers)?;
    emit_relations(&mut out, &graph.relations, &graph.containers)?;

    if graph.with_legend {
        out.push_str("SHOW_LEGEND()\n");
    }

    out.push_str("@enduml\n");
    Ok(out)
}

fn emit_containers(out: &mut String, containers: &[Container]) -> Result<(), SerializeError> {
    // Ungrouped containers first, in original order; grouped containers
    // follow, grouped by `system` in first-seen order.
    let mut groups: BTreeMap<&str, Vec<&Container>> = BTreeMap::new();
    let mut group_order: Vec<&str> = Vec::new();

    for c in containers {
        if c.id.trim().is_empty() {
            return Err(SerializeError::InvalidGraph(
                "container id must not be empty".into(),
            ));
        }
        if c.system.trim().is_empty() {
            out.push_str(&container_statement(c)?);
            out.push('\n');
        } else {
            if !groups.contains_key(c.system.as_str()) {
                group_order.push(c.system.as_str());
            }
            groups.entry(c.system.as_str()).or_default().push(c);
        }
    }

    for system in group_order {
        let members = &groups[system];
        let group_id = system.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        let _ = writeln!(out, "System_Boundary({}, \"{}\") {{", group_id, clean(system));
        for member in members {
            out.push_str(&container_statement(member)?);
            out.push('\n');
        }
        out.push_str("}\n");
    }

    Ok(())
}

fn container_tag(c: &Container) -> String {
    let base = if c.is_user { "User" } else { "Container" };
    let suffix = if c.is_user {
        ""
    } else if c.is_queue && c.is_database {
        ""
    } else if c.is_queue {
        "Queue"
    } else if c.is_database {
        "Db"
    } else {
        ""
    };
    let ext = if c.is_external { "_Ext" } else { "" };
    format!("{base}{suffix}{ext}")
}

fn container_statement(c: &Container) -> Result<String, SerializeError> {
    if c.id.trim().is_empty() {
        return Err(SerializeError::InvalidGraph(
            "container id must not be empty".into(),
        ));
    }
    let tag = container_tag(c);
    let mut args = vec![c.id.clone(), format!("\"{}\"", clean(c.label_or_id()))];
    if !c.description.trim().is_empty() {
        args.push(format!("\"{}\"", clean(&c.technology)));
        args.push(format!("\"{}\"", clean(&c.description)));
    } else if !c.technology.trim().is_empty() {
        args.push(format!("\"{}\"", clean(&c.technology)));
    }
    Ok(format!("{}({})", tag, args.join(", ")))
}

fn emit_relations(
    out: &mut String,
    relations: &[Relation],
    containers: &[Container],
) -> Result<(), SerializeError> {
    for r in relations {
        if r.from.trim().is_empty() || r.to.trim().is_empty() {
            return Err(SerializeError::InvalidGraph(
                "relation must specify from and to".into(),
            ));
        }
        if !containers.iter().any(|c| c.id == r.from) || !containers.iter().any(|c| c.id == r.to)
        {
            return Err(SerializeError::InvalidGraph(format!(
                "relation references unknown container ({} -> {})",
                r.from, r.to
            )));
        }

        let dir = Direction::from_wire(&r.direction);
        let rel_tag = match dir.suffix() {
            Some(suffix) => format!("Rel_{suffix}"),
            None => "Rel".to_string(),
        };

        let mut args = vec![
            r.from.clone(),
            r.to.clone(),
            format!("\"{}\"", clean(r.label_or_default())),
        ];
        if !r.technology.trim().is_empty() {
            args.push(format!("\"{}\"", clean(&r.technology)));
        }
        let _ = writeln!(out, "{}({})", rel_tag, args.join(", "));
    }
    Ok(())
}
