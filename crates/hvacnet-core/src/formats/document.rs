//! # Network Document
//!
//! ```json
//! {
//!   "elements": [
//!     { "guid": "p1", "kind": "Pipe",
//!       "attributes": { "length": { "value": 300.0, "unit": "mm" } },
//!       "ports": [ { "guid": "p1:0", "position": [0, 0, 0], "flow_direction": "sink" } ] }
//!   ],
//!   "connections": [ ["p1:1", "p2:0"] ]
//! }
//! ```
//!
//! Element kinds accept the classification tag with or without the `Ifc`
//! prefix, case-insensitively. Quantities carry a unit tag (`mm`, `m`,
//! `mm2`, `m2`, `W`, `kW`, `m3/s`, `l/s`, `m3/h`, `kg/s`, `K`, `degC`); tags
//! are resolved here and nowhere else. Written documents use SI base units.

use crate::element::{Attributes, Network};
use crate::quantity::Quantity;
use crate::{Attribute, ElementKind, FlowDirection, Guid, HvacError, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum accepted document size.
///
/// Checked before parsing so a corrupted file cannot exhaust memory.
pub const MAX_DOCUMENT_SIZE: usize = 256 * 1024 * 1024;

/// One port of an element record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortRecord {
    pub guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 3]>,
    #[serde(default)]
    pub flow_direction: FlowDirection,
}

/// A quantity as written in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantityRecord {
    pub value: f64,
    pub unit: String,
}

/// One attribute value of an element record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeRecord {
    Flag(bool),
    Count(u64),
    Quantity(QuantityRecord),
}

impl AttributeRecord {
    /// Resolve the unit tag of a quantity.
    pub fn to_value(&self) -> Result<Value, HvacError> {
        match self {
            Self::Flag(b) => Ok(Value::Flag(*b)),
            Self::Count(n) => Ok(Value::Count(*n)),
            Self::Quantity(record) => Quantity::parse(record.value, &record.unit)
                .map(Value::Quantity)
                .ok_or_else(|| {
                    HvacError::InvalidNetwork(format!("unknown unit tag {:?}", record.unit))
                }),
        }
    }
}

impl From<Value> for AttributeRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Flag(b) => Self::Flag(b),
            Value::Count(n) => Self::Count(n),
            Value::Quantity(q) => Self::Quantity(QuantityRecord {
                value: q.si_value(),
                unit: q.dimension().si_symbol().to_string(),
            }),
        }
    }
}

/// Document form of an attribute set.
#[must_use]
pub fn attribute_records(attributes: &Attributes) -> BTreeMap<Attribute, AttributeRecord> {
    attributes
        .iter()
        .map(|(attribute, value)| (attribute, value.into()))
        .collect()
}

/// One element of a network document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementRecord {
    pub guid: String,
    /// Classification tag, e.g. `"Pipe"` or `"IfcPump"`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<Attribute, AttributeRecord>,
    /// Ports in element order.
    #[serde(default)]
    pub ports: Vec<PortRecord>,
}

/// A whole network as exchanged with the loading collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkDocument {
    pub elements: Vec<ElementRecord>,
    /// Connected port guid pairs, each connection listed once.
    #[serde(default)]
    pub connections: Vec<[String; 2]>,
}

impl NetworkDocument {
    /// Parse a document from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HvacError> {
        if bytes.len() > MAX_DOCUMENT_SIZE {
            return Err(HvacError::Serialization(format!(
                "document of {} bytes exceeds the limit of {}",
                bytes.len(),
                MAX_DOCUMENT_SIZE
            )));
        }
        serde_json::from_slice(bytes).map_err(|e| HvacError::Serialization(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, HvacError> {
        Self::from_slice(text.as_bytes())
    }

    pub fn to_json(&self) -> Result<String, HvacError> {
        serde_json::to_string_pretty(self).map_err(|e| HvacError::Serialization(e.to_string()))
    }

    /// Validate the document and build the element arena.
    ///
    /// Rejects unknown kinds, duplicate element or port guids, connections
    /// naming unknown ports, connections between two ports of one element
    /// and ports connected more than once.
    pub fn into_network(self) -> Result<Network, HvacError> {
        let mut network = Network::new();

        for record in self.elements {
            let kind = ElementKind::from_classification(&record.kind).ok_or_else(|| {
                HvacError::InvalidNetwork(format!(
                    "element {} has unknown kind {:?}",
                    record.guid, record.kind
                ))
            })?;
            let id = network.insert_element(Guid::new(record.guid.clone()), kind)?;
            for (attribute, value) in &record.attributes {
                let value = value.to_value().map_err(|e| {
                    HvacError::InvalidNetwork(format!("element {}: {}", record.guid, e))
                })?;
                network.set_attribute(id, *attribute, value)?;
            }
            for port in record.ports {
                network.add_port(id, port.guid, port.position, port.flow_direction)?;
            }
        }

        for [a, b] in self.connections {
            let pa = network
                .port_by_guid(&a)
                .ok_or_else(|| HvacError::InvalidNetwork(format!("unknown port guid {}", a)))?;
            let pb = network
                .port_by_guid(&b)
                .ok_or_else(|| HvacError::InvalidNetwork(format!("unknown port guid {}", b)))?;
            if network.connection(pa).is_some() || network.connection(pb).is_some() {
                return Err(HvacError::InvalidNetwork(format!(
                    "connection {} - {} reuses a connected port",
                    a, b
                )));
            }
            network.connect(pa, pb)?;
        }

        Ok(network)
    }
}

// =============================================================================
// TESTS
// =============================================================================
