//! Input data model for diagram rendering (spec §3).

use serde::{Deserialize, Serialize};

/// The default footer emitted when a [`Graph`] doesn't specify one.
///
/// PlantUML expands `%date(...)` at render time; it is emitted verbatim and
/// is not evaluated here.
pub const DEFAULT_FOOTER: &str = "generated by diagramastext.dev - %date('yyyy-MM-dd')";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub footer: String,
    pub containers: Vec<Container>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub with_legend: bool,
}

impl Graph {
    /// True when the graph has no containers — always invalid for rendering.
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn footer_or_default(&self) -> &str {
        if self.footer.trim().is_empty() {
            DEFAULT_FOOTER
        } else {
            &self.footer
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub technology: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub is_user: bool,
    #[serde(default)]
    pub is_queue: bool,
    #[serde(default)]
    pub is_database: bool,
    #[serde(default)]
    pub is_external: bool,
}

impl Container {
    pub fn label_or_id(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    None,
    LeftRight,
    RightLeft,
    TopDown,
    DownTop,
}

impl Direction {
    /// Parses the wire strings from spec §3; any unrecognized value maps to
    /// `None` rather than failing, matching the graph's tolerant-input
    /// posture for this field.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "LR" => Self::LeftRight,
            "RL" => Self::RightLeft,
            "TD" => Self::TopDown,
            "DT" => Self::DownTop,
            _ => Self::None,
        }
    }

    /// The `Rel_<X>` suffix letter, or `None` when no suffix is emitted.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::LeftRight => Some("R"),
            Self::RightLeft => Some("L"),
            Self::TopDown => Some("D"),
            Self::DownTop => Some("U"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub technology: String,
}

impl Relation {
    pub fn label_or_default(&self) -> &str {
        if self.label.trim().is_empty() {
            "Uses"
        } else {
            &self.label
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_defaults_when_blank() {
        let g = Graph {
            title: String::new(),
            footer: "   ".into(),
            containers: vec![],
            relations: vec![],
            with_legend: false,
        };
        assert_eq!(g.footer_or_default(), DEFAULT_FOOTER);
    }

    #[test]
    fn label_defaults_to_id() {
        let c = Container {
            id: "svc".into(),
            label: String::new(),
            technology: String::new(),
            description: String::new(),
            system: String::new(),
            is_user: false,
            is_queue: false,
            is_database: false,
            is_external: false,
        };
        assert_eq!(c.label_or_id(), "svc");
    }

    #[test]
    fn direction_unknown_maps_to_none() {
        assert_eq!(Direction::from_wire("sideways"), Direction::None);
        assert_eq!(Direction::from_wire("LR"), Direction::LeftRight);
    }
}
