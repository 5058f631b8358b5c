use crate::WorkflowError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

pub type NodeId = String;

/// Node type used when a declaration omits `type`.
pub const DEFAULT_NODE_TYPE: &str = "shell";

/// Complete workflow definition as read from the input document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl WorkflowSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            nodes: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A declared step: identity, prerequisites and the typed action to run.
///
/// On the wire a node is a flat object: `id`, `type`, `requires` and the
/// type-specific parameters side by side. Parameters may also be nested under
/// a `params` object; flat keys win when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNodeSpec", into = "RawNodeSpec")]
pub struct NodeSpec {
    pub id: NodeId,
    pub requires: Vec<NodeId>,
    pub action: NodeAction,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, action: NodeAction) -> Self {
        Self {
            id: id.into(),
            requires: Vec::new(),
            action,
        }
    }

    pub fn shell(id: impl Into<NodeId>, command: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeAction::Shell(ShellParams {
                command: command.into(),
                allow_failure: false,
            }),
        )
    }

    pub fn http(id: impl Into<NodeId>, url: impl Into<String>) -> Self {
        Self::new(id, NodeAction::Http(HttpParams::get(url)))
    }

    pub fn log(id: impl Into<NodeId>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeAction::Log(LogParams {
                message: Some(message.into()),
                prefix: None,
            }),
        )
    }

    pub fn custom(
        id: impl Into<NodeId>,
        node_type: impl Into<String>,
        params: Map<String, Value>,
    ) -> Self {
        Self::new(
            id,
            NodeAction::Custom {
                node_type: node_type.into(),
                params,
            },
        )
    }

    pub fn with_dependency(mut self, id: impl Into<NodeId>) -> Self {
        let id = id.into();
        if !self.requires.contains(&id) {
            self.requires.push(id);
        }
        self
    }

    pub fn with_dependencies<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        ids.into_iter().fold(self, |spec, id| spec.with_dependency(id))
    }

    pub fn node_type(&self) -> &str {
        self.action.node_type()
    }
}

/// Type-specific parameters of a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAction {
    Shell(ShellParams),
    Http(HttpParams),
    Log(LogParams),
    /// Any tag without a built-in parameter schema. Handlers registered for
    /// the tag interpret `params` themselves.
    Custom {
        node_type: String,
        params: Map<String, Value>,
    },
}

impl NodeAction {
    /// Build the typed action for `tag`. Aliases from older workflow files
    /// (`httpRequest`, `terminalLog`) map onto the built-in variants.
    pub fn from_params(tag: &str, params: Map<String, Value>) -> Result<Self, serde_json::Error> {
        match tag {
            "shell" => Ok(NodeAction::Shell(serde_json::from_value(Value::Object(params))?)),
            "http" | "httpRequest" => {
                Ok(NodeAction::Http(serde_json::from_value(Value::Object(params))?))
            }
            "log" | "terminalLog" => {
                Ok(NodeAction::Log(serde_json::from_value(Value::Object(params))?))
            }
            other => Ok(NodeAction::Custom {
                node_type: other.to_string(),
                params,
            }),
        }
    }

    pub fn node_type(&self) -> &str {
        match self {
            NodeAction::Shell(_) => "shell",
            NodeAction::Http(_) => "http",
            NodeAction::Log(_) => "log",
            NodeAction::Custom { node_type, .. } => node_type,
        }
    }

    /// Flat parameter map, as it appears on the wire.
    pub fn params(&self) -> Map<String, Value> {
        let value = match self {
            NodeAction::Shell(p) => serde_json::to_value(p),
            NodeAction::Http(p) => serde_json::to_value(p),
            NodeAction::Log(p) => serde_json::to_value(p),
            NodeAction::Custom { params, .. } => return params.clone(),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellParams {
    #[serde(default)]
    pub command: String,
    /// Record a non-zero exit as `success: false` instead of failing the run.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpParams {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl HttpParams {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogParams {
    /// Without a message the node prints what its `requires` produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_node_type() -> String {
    DEFAULT_NODE_TYPE.to_string()
}

#[derive(Serialize, Deserialize)]
struct RawNodeSpec {
    id: NodeId,
    #[serde(rename = "type", default = "default_node_type")]
    node_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    requires: Vec<NodeId>,
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl TryFrom<RawNodeSpec> for NodeSpec {
    type Error = WorkflowError;

    fn try_from(raw: RawNodeSpec) -> Result<Self, Self::Error> {
        let RawNodeSpec {
            id,
            node_type,
            mut requires,
            mut params,
        } = raw;

        if id.trim().is_empty() {
            return Err(WorkflowError::Invalid("node id must not be empty".to_string()));
        }

        if matches!(params.get("params"), Some(Value::Object(_))) {
            if let Some(Value::Object(nested)) = params.remove("params") {
                for (key, value) in nested {
                    params.entry(key).or_insert(value);
                }
            }
        }

        let mut seen = HashSet::new();
        requires.retain(|dep| seen.insert(dep.clone()));

        let action = NodeAction::from_params(&node_type, params)
            .map_err(|e| WorkflowError::Invalid(format!("node '{}' ({}): {}", id, node_type, e)))?;

        Ok(NodeSpec {
            id,
            requires,
            action,
        })
    }
}

impl From<NodeSpec> for RawNodeSpec {
    fn from(spec: NodeSpec) -> Self {
        RawNodeSpec {
            params: spec.action.params(),
            node_type: spec.action.node_type().to_string(),
            id: spec.id,
            requires: spec.requires,
        }
    }
}
