//! # Canonical Export Module
//!
//! Deterministic serialization of a (reduced) graph.
//!
//! Graph handles depend on allocation order, so the canonical form is keyed
//! by guid instead: elements sorted by guid, ports in element order and the
//! flat connection list as sorted guid pairs. Its `postcard` stream is
//! bit-exact, and the `blake3` digest of that stream is the replay checksum:
//! the same network reduced with the same answers yields the same checksum.

use crate::formats::{AttributeRecord, ElementRecord, NetworkDocument, PortRecord};
use crate::graph::HvacGraph;
use crate::quantity::{Dimension, Quantity};
use crate::{Attribute, ElementKind, FlowDirection, HvacError, Value};
use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"HVNX";

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum element count accepted by `import_canonical`.
pub const MAX_IMPORT_ELEMENT_COUNT: u64 = 1_000_000;

/// Maximum connection count accepted by `import_canonical`.
pub const MAX_IMPORT_CONNECTION_COUNT: u64 = 10_000_000;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub element_count: u64,
    pub connection_count: u64,
    /// blake3 digest of the data section.
    pub checksum: [u8; 32],
}

impl CanonicalHeader {
    #[must_use]
    pub fn new(element_count: u64, connection_count: u64, checksum: [u8; 32]) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            element_count,
            connection_count,
            checksum,
        }
    }

    /// Error messages stay generic so corrupted input is not echoed back.
    pub fn validate(&self) -> Result<(), HvacError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(HvacError::Serialization("Invalid file format".to_string()));
        }
        if self.version != CANONICAL_VERSION {
            return Err(HvacError::Serialization(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL ELEMENTS
// =============================================================================

/// Attribute value in an externally tagged form that `postcard` can read back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum CanonicalValue {
    Flag(bool),
    Count(u64),
    /// SI value of the given dimension.
    Quantity { dimension: Dimension, si: f64 },
}

impl From<Value> for CanonicalValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Flag(b) => Self::Flag(b),
            Value::Count(n) => Self::Count(n),
            Value::Quantity(q) => Self::Quantity {
                dimension: q.dimension(),
                si: q.si_value(),
            },
        }
    }
}

impl From<CanonicalValue> for Value {
    fn from(value: CanonicalValue) -> Self {
        match value {
            CanonicalValue::Flag(b) => Self::Flag(b),
            CanonicalValue::Count(n) => Self::Count(n),
            CanonicalValue::Quantity { dimension, si } => {
                Self::Quantity(Quantity::from_si(dimension, si))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalPort {
    pub guid: String,
    pub position: Option<[f64; 3]>,
    pub flow_direction: FlowDirection,
    /// Guids of the original ports an aggregation port stands for.
    pub originals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalElement {
    pub guid: String,
    pub kind: ElementKind,
    /// Sorted by attribute.
    pub attributes: Vec<(Attribute, CanonicalValue)>,
    pub ports: Vec<CanonicalPort>,
    /// Sorted guids of absorbed elements, empty for loaded elements.
    pub members: Vec<String>,
}

/// A graph in canonical form for bit-exact serialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalNetwork {
    /// Active elements sorted by guid.
    pub elements: Vec<CanonicalElement>,
    /// Port guid pairs, smaller guid first, sorted.
    pub connections: Vec<(String, String)>,
}

impl CanonicalNetwork {
    #[must_use]
    pub fn from_graph(graph: &HvacGraph) -> Self {
        let port_guid = |id| {
            graph
                .port(id)
                .map(|p| p.guid.as_str().to_string())
                .unwrap_or_default()
        };

        let mut elements: Vec<CanonicalElement> = graph
            .active_elements()
            .map(|element| {
                let ports = element
                    .ports
                    .iter()
                    .filter_map(|id| graph.port(*id))
                    .map(|port| CanonicalPort {
                        guid: port.guid.as_str().to_string(),
                        position: port.position,
                        flow_direction: port.flow_direction,
                        originals: port.originals.iter().map(|o| port_guid(*o)).collect(),
                    })
                    .collect();
                let mut members: Vec<String> = element
                    .members
                    .iter()
                    .filter_map(|m| graph.element(*m))
                    .map(|m| m.guid.as_str().to_string())
                    .collect();
                members.sort();

                CanonicalElement {
                    guid: element.guid.as_str().to_string(),
                    kind: element.kind,
                    attributes: element
                        .attributes
                        .iter()
                        .map(|(attribute, value)| (attribute, value.into()))
                        .collect(),
                    ports,
                    members,
                }
            })
            .collect();
        elements.sort_by(|a, b| a.guid.cmp(&b.guid));

        let mut connections: Vec<(String, String)> = graph
            .get_connections()
            .into_iter()
            .map(|(a, b)| {
                let (a, b) = (port_guid(a), port_guid(b));
                if a <= b { (a, b) } else { (b, a) }
            })
            .collect();
        connections.sort();

        Self {
            elements,
            connections,
        }
    }

    /// Hex blake3 digest of the postcard stream.
    pub fn checksum(&self) -> Result<String, HvacError> {
        let data = postcard::to_allocvec(self)
            .map_err(|e| HvacError::Serialization(format!("Data: {}", e)))?;
        Ok(blake3::hash(&data).to_hex().to_string())
    }

    /// The network as a document, aggregates written as plain elements.
    #[must_use]
    pub fn to_document(&self) -> NetworkDocument {
        let elements = self
            .elements
            .iter()
            .map(|element| {
                let attributes = element
                    .attributes
                    .iter()
                    .map(|(attribute, value)| (*attribute, AttributeRecord::from(Value::from(*value))))
                    .collect();
                ElementRecord {
                    guid: element.guid.clone(),
                    kind: element.kind.ifc_classification().to_string(),
                    attributes,
                    ports: element
                        .ports
                        .iter()
                        .map(|port| PortRecord {
                            guid: port.guid.clone(),
                            position: port.position,
                            flow_direction: port.flow_direction,
                        })
                        .collect(),
                }
            })
            .collect();

        NetworkDocument {
            elements,
            connections: self
                .connections
                .iter()
                .map(|(a, b)| [a.clone(), b.clone()])
                .collect(),
        }
    }
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export a graph to canonical postcard format.
///
/// ```text
/// [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalNetwork (postcard)]
/// ```
pub fn export_canonical(graph: &HvacGraph) -> Result<Vec<u8>, HvacError> {
    let canonical = CanonicalNetwork::from_graph(graph);

    let data_bytes = postcard::to_allocvec(&canonical)
        .map_err(|e| HvacError::Serialization(format!("Data: {}", e)))?;
    let header = CanonicalHeader::new(
        canonical.elements.len() as u64,
        canonical.connections.len() as u64,
        *blake3::hash(&data_bytes).as_bytes(),
    );
    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| HvacError::Serialization(format!("Header: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Read back a canonical export, verifying header, limits and digest.
pub fn import_canonical(data: &[u8]) -> Result<CanonicalNetwork, HvacError> {
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(HvacError::Serialization("Data too short".to_string()));
    };
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(HvacError::Serialization(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, data_bytes) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| HvacError::Serialization(format!("Header: {}", e)))?;
    header.validate()?;

    if header.element_count > MAX_IMPORT_ELEMENT_COUNT {
        return Err(HvacError::Serialization(format!(
            "Element count {} exceeds maximum allowed {}",
            header.element_count, MAX_IMPORT_ELEMENT_COUNT
        )));
    }
    if header.connection_count > MAX_IMPORT_CONNECTION_COUNT {
        return Err(HvacError::Serialization(format!(
            "Connection count {} exceeds maximum allowed {}",
            header.connection_count, MAX_IMPORT_CONNECTION_COUNT
        )));
    }
    if *blake3::hash(data_bytes).as_bytes() != header.checksum {
        return Err(HvacError::Serialization("Checksum mismatch".to_string()));
    }

    let canonical: CanonicalNetwork = postcard::from_bytes(data_bytes)
        .map_err(|e| HvacError::Serialization(format!("Data: {}", e)))?;
    if canonical.elements.len() as u64 != header.element_count
        || canonical.connections.len() as u64 != header.connection_count
    {
        return Err(HvacError::Serialization("Count mismatch".to_string()));
    }
    Ok(canonical)
}

/// Replay checksum of a graph.
pub fn canonical_checksum(graph: &HvacGraph) -> Result<String, HvacError> {
    CanonicalNetwork::from_graph(graph).checksum()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Network;

    fn sample() -> HvacGraph {
        let mut net = Network::new();
        let ids: Vec<_> = ["c", "a", "b"]
            .iter()
            .map(|g| net.add_element(*g, ElementKind::Pipe, 2).expect("add"))
            .collect();
        net.chain(&ids).expect("chain");
        net.set_quantity(ids[0], Attribute::Length, Quantity::mm(12.5))
            .expect("set");
        HvacGraph::build(net).expect("build")
    }

    #[test]
    fn elements_are_sorted_by_guid() {
        let canonical = CanonicalNetwork::from_graph(&sample());
        let guids: Vec<_> = canonical.elements.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, ["a", "b", "c"]);
        assert_eq!(
            canonical.connections,
            [
                ("a:0".to_string(), "c:0".to_string()),
                ("a:1".to_string(), "b:0".to_string())
            ]
        );
    }

    #[test]
    fn export_import_preserves_content() {
        let graph = sample();
        let bytes = export_canonical(&graph).expect("export");
        let imported = import_canonical(&bytes).expect("import");
        assert_eq!(imported, CanonicalNetwork::from_graph(&graph));
    }

    #[test]
    fn corrupted_data_is_rejected() {
        let mut bytes = export_canonical(&sample()).expect("export");
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xff;
        }
        assert!(import_canonical(&bytes).is_err());
        assert!(import_canonical(&[1, 0]).is_err());
    }

    #[test]
    fn checksum_is_stable() {
        let first = canonical_checksum(&sample()).expect("checksum");
        let second = canonical_checksum(&sample()).expect("checksum");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn document_reloads() {
        let document = CanonicalNetwork::from_graph(&sample()).to_document();
        let network = document.into_network().expect("reload");
        assert_eq!(network.element_count(), 3);
        let c = network.element_by_guid("c").expect("c");
        assert_eq!(
            network.element(c).expect("c").quantity(Attribute::Length),
            Some(Quantity::mm(12.5))
        );
    }

    #[test]
    fn quantities_export_as_si_values() {
        let canonical = CanonicalNetwork::from_graph(&sample());
        let c = canonical
            .elements
            .iter()
            .find(|e| e.guid == "c")
            .expect("c");
        let [(Attribute::Length, CanonicalValue::Quantity { dimension, si })] =
            c.attributes.as_slice()
        else {
            unreachable!("one length attribute");
        };
        assert_eq!(*dimension, Dimension::Length);
        assert!((si - 0.0125).abs() < 1e-12);
    }
}
