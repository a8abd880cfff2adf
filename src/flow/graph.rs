use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::limits::MAX_FLOW_NODES;

use super::node::NodeKind;
use super::FlowError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub position: Position,
    pub label: String,
    pub kind: NodeKind,
}

/// Directed connection. `source_handle` picks the branch on nodes with more
/// than one exit (`button_{i}`, `condition_{i}`, `default`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, alias = "source_handle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

/// A conversational flow as built in the visual editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EditorGraph", into = "EditorGraph")]
pub struct FlowGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub viewport: Option<Viewport>,
}

// Persisted editor shape: `{nodes: [{id, type, position, data: {label, config}}], edges, viewport?}`.

#[derive(Serialize, Deserialize)]
struct EditorGraph {
    nodes: Vec<EditorNode>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    viewport: Option<Viewport>,
}

#[derive(Serialize, Deserialize)]
struct EditorNode {
    id: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    data: EditorData,
}

#[derive(Default, Serialize, Deserialize)]
struct EditorData {
    #[serde(default)]
    label: String,
    #[serde(default)]
    config: Value,
}

impl TryFrom<EditorGraph> for FlowGraph {
    type Error = FlowError;

    fn try_from(raw: EditorGraph) -> Result<Self, FlowError> {
        let nodes = raw
            .nodes
            .into_iter()
            .map(|n| -> Result<Node, FlowError> {
                Ok(Node {
                    kind: NodeKind::from_parts(&n.type_name, n.data.config)?,
                    id: n.id,
                    position: n.position,
                    label: n.data.label,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FlowGraph {
            nodes,
            edges: raw.edges,
            viewport: raw.viewport,
        })
    }
}

impl From<FlowGraph> for EditorGraph {
    fn from(graph: FlowGraph) -> Self {
        EditorGraph {
            nodes: graph
                .nodes
                .into_iter()
                .map(|n| EditorNode {
                    type_name: n.kind.type_name().to_string(),
                    data: EditorData {
                        label: n.label,
                        config: n.kind.config_value(),
                    },
                    id: n.id,
                    position: n.position,
                })
                .collect(),
            edges: graph.edges,
            viewport: graph.viewport,
        }
    }
}

impl FlowGraph {
    /// Load a graph saved by the editor. Missing config fields are filled
    /// with the node type's defaults. Does not validate.
    pub fn from_json(json: &str) -> Result<FlowGraph, FlowError> {
        let raw: EditorGraph = serde_json::from_str(json)?;
        FlowGraph::try_from(raw)
    }

    pub fn from_value(value: Value) -> Result<FlowGraph, FlowError> {
        let raw: EditorGraph = serde_json::from_value(value)?;
        FlowGraph::try_from(raw)
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn trigger(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Trigger(_)))
    }

    pub fn outgoing<'a, 'b>(&'a self, node_id: &'b str) -> impl Iterator<Item = &'a Edge> + use<'a, 'b> {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// The edge leaving `node_id` through `handle`.
    pub fn edge_from(&self, node_id: &str, handle: &str) -> Option<&Edge> {
        self.outgoing(node_id)
            .find(|e| e.source_handle.as_deref() == Some(handle))
    }

    /// The single exit of a node that doesn't branch.
    pub fn next_edge(&self, node_id: &str) -> Option<&Edge> {
        self.outgoing(node_id).next()
    }

    /// Whether an inbound message should start this flow: it contains one of
    /// the trigger's keywords, ignoring case. A trigger without keywords
    /// matches every message.
    pub fn matches_trigger(&self, text: &str) -> bool {
        let Some(NodeKind::Trigger(config)) = self.trigger().map(|n| &n.kind) else {
            return false;
        };
        let keywords: Vec<String> = config
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return true;
        }
        let text = text.to_lowercase();
        keywords.iter().any(|k| text.contains(k.as_str()))
    }

    /// Check the structure a conversation relies on.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.nodes.len() > MAX_FLOW_NODES {
            return Err(FlowError::InvalidGraph(format!(
                "{} nodes exceeds the limit of {MAX_FLOW_NODES}",
                self.nodes.len()
            )));
        }

        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(FlowError::InvalidGraph(format!("duplicate node id {}", node.id)));
            }
        }

        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !ids.contains(end.as_str()) {
                    return Err(FlowError::InvalidGraph(format!(
                        "edge {} references missing node {end}",
                        edge.id
                    )));
                }
            }
        }

        let triggers: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Trigger(_)))
            .collect();
        let [trigger] = triggers.as_slice() else {
            return Err(FlowError::InvalidGraph(format!(
                "expected exactly one trigger, found {}",
                triggers.len()
            )));
        };
        if self.edges.iter().any(|e| e.target == trigger.id) {
            return Err(FlowError::InvalidGraph("trigger has incoming edges".into()));
        }
        let exits = self.outgoing(&trigger.id).count();
        if exits != 1 {
            return Err(FlowError::InvalidGraph(format!(
                "trigger must have exactly one outgoing edge, found {exits}"
            )));
        }

        for node in &self.nodes {
            if node.kind.is_terminal() && self.outgoing(&node.id).next().is_some() {
                return Err(FlowError::InvalidGraph(format!(
                    "{} node {} has outgoing edges",
                    node.kind.type_name(),
                    node.id
                )));
            }
            if let NodeKind::Condition(config) = &node.kind {
                let targets = config
                    .conditions
                    .iter()
                    .filter_map(|c| c.target.as_deref())
                    .chain(config.default_target.as_deref());
                for target in targets {
                    if !ids.contains(target) {
                        return Err(FlowError::InvalidGraph(format!(
                            "condition {} targets missing node {target}",
                            node.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
