// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Device-tree style configuration input.
//!
//! The engine only needs a narrow, read-only view of the tree: find the
//! nodes compatible with a SoC's PCIe binding and read raw property bytes
//! from them. Property values use flattened device tree encoding, so cells
//! are big-endian 32-bit words and string lists are NUL separated.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::big_endian::U32;

/// Errors decoding a property or a snapshot.
#[derive(Debug, Error)]
pub enum DtError {
    /// The property length is not a whole number of cells.
    #[error("property length {0} is not a multiple of 4")]
    CellLength(usize),
    /// A string list entry is not valid UTF-8.
    #[error("property is not a valid string list")]
    InvalidString(#[source] std::str::Utf8Error),
    /// A JSON snapshot failed to parse.
    #[error("invalid device tree snapshot")]
    Json(#[source] serde_json::Error),
}

/// A node exposing raw property values.
pub trait PropertyNode {
    /// Node name, used for diagnostics.
    fn name(&self) -> &str;

    /// Raw value of property `name`, if present.
    fn property(&self, name: &str) -> Option<&[u8]>;
}

/// A configuration source the topology is loaded from.
pub trait TopologySource {
    /// Returns the nodes whose `compatible` list contains `compatible`, in
    /// tree order.
    fn compatible_nodes(&self, compatible: &str) -> Vec<&dyn PropertyNode>;
}

/// Decodes property `name` as big-endian cells.
pub fn read_cells(node: &dyn PropertyNode, name: &str) -> Result<Option<Vec<u32>>, DtError> {
    let Some(bytes) = node.property(name) else {
        return Ok(None);
    };
    let cells = <[U32]>::ref_from_bytes(bytes).map_err(|_| DtError::CellLength(bytes.len()))?;
    Ok(Some(cells.iter().map(|c| c.get()).collect()))
}

/// Decodes property `name` as a NUL separated string list.
pub fn read_strings<'a>(
    node: &'a dyn PropertyNode,
    name: &str,
) -> Result<Option<Vec<&'a str>>, DtError> {
    let Some(bytes) = node.property(name) else {
        return Ok(None);
    };
    bytes
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| std::str::from_utf8(s).map_err(DtError::InvalidString))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Joins pairs of cells into 64-bit values, high cell first.
pub fn cells_to_u64(hi: u32, lo: u32) -> u64 {
    ((hi as u64) << 32) | lo as u64
}

/// Standard `status` semantics: absent, `"okay"` or `"ok"` mean enabled.
pub fn is_enabled(node: &dyn PropertyNode) -> bool {
    match read_strings(node, "status") {
        Ok(None) => true,
        Ok(Some(status)) => matches!(status.first(), Some(&"okay") | Some(&"ok")),
        Err(_) => false,
    }
}

/// An owned device tree node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "NodeSpec")]
pub struct DtNode {
    name: String,
    properties: BTreeMap<String, Vec<u8>>,
}

impl DtNode {
    /// Creates a node without properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Sets property `name` to big-endian `cells`.
    pub fn with_cells(mut self, name: &str, cells: &[u32]) -> Self {
        let bytes = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
        self.properties.insert(name.to_owned(), bytes);
        self
    }

    /// Sets property `name` to a single NUL terminated string.
    pub fn with_string(self, name: &str, value: &str) -> Self {
        self.with_strings(name, &[value])
    }

    /// Sets property `name` to a NUL separated string list.
    pub fn with_strings(mut self, name: &str, values: &[&str]) -> Self {
        let mut bytes = Vec::new();
        for value in values {
            bytes.extend_from_slice(value.as_bytes());
            bytes.push(0);
        }
        self.properties.insert(name.to_owned(), bytes);
        self
    }

    /// Removes property `name`.
    pub fn without(mut self, name: &str) -> Self {
        self.properties.remove(name);
        self
    }
}

impl PropertyNode for DtNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn property(&self, name: &str) -> Option<&[u8]> {
        self.properties.get(name).map(Vec::as_slice)
    }
}

#[derive(Deserialize)]
struct NodeSpec {
    name: String,
    #[serde(default)]
    properties: BTreeMap<String, PropSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PropSpec {
    Cells(Vec<u32>),
    String(String),
    Strings(Vec<String>),
}

impl From<NodeSpec> for DtNode {
    fn from(spec: NodeSpec) -> Self {
        let mut node = DtNode::new(spec.name);
        for (name, value) in spec.properties {
            node = match value {
                PropSpec::Cells(cells) => node.with_cells(&name, &cells),
                PropSpec::String(s) => node.with_string(&name, &s),
                PropSpec::Strings(list) => {
                    let list: Vec<&str> = list.iter().map(String::as_str).collect();
                    node.with_strings(&name, &list)
                }
            };
        }
        node
    }
}

/// An owned, in-memory device tree: a flat list of nodes.
///
/// The JSON form is
///
/// ```json
/// {"nodes": [{"name": "pcie@2300000", "properties": {
///     "reg": [0, 1], "status": "okay", "reg-names": ["dbi", "config"]
/// }}]}
/// ```
///
/// where an array of numbers is a cell list, a string is a single string
/// and an array of strings is a string list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceTreeSnapshot {
    nodes: Vec<DtNode>,
}

impl DeviceTreeSnapshot {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON form.
    pub fn from_json(json: &str) -> Result<Self, DtError> {
        serde_json::from_str(json).map_err(DtError::Json)
    }

    /// Appends `node`.
    pub fn with_node(mut self, node: DtNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// The nodes in insertion order.
    pub fn nodes(&self) -> &[DtNode] {
        &self.nodes
    }
}

impl TopologySource for DeviceTreeSnapshot {
    fn compatible_nodes(&self, compatible: &str) -> Vec<&dyn PropertyNode> {
        self.nodes
            .iter()
            .filter(|node| {
                read_strings(*node, "compatible")
                    .ok()
                    .flatten()
                    .is_some_and(|list| list.contains(&compatible))
            })
            .map(|node| node as &dyn PropertyNode)
            .collect()
    }
}
