//! # Element Model
//!
//! Ports, elements and the input `Network` arena.
//!
//! A `Network` is what the loading collaborator hands over: classified
//! elements with ordered ports and an already resolved, symmetric
//! port-to-port connection relation. `HvacGraph::build` consumes it.

use crate::quantity::Quantity;
use crate::{Attribute, ElementId, ElementKind, FlowDirection, Guid, HvacError, PortId, Value};
use std::collections::BTreeMap;

// =============================================================================
// PORT
// =============================================================================

/// A connection point of an element.
///
/// Ports minted by aggregation record the original ports they stand for in
/// `originals`; for ports of loaded elements the list is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub id: PortId,
    pub guid: Guid,
    pub parent: ElementId,
    pub position: Option<[f64; 3]>,
    pub flow_direction: FlowDirection,
    pub originals: Vec<PortId>,
}

impl Port {
    /// Whether this port was minted by an aggregation.
    #[must_use]
    pub fn is_aggregation_port(&self) -> bool {
        !self.originals.is_empty()
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// Attribute storage of an element. Absent keys mean "unset".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(BTreeMap<Attribute, Value>);

impl Attributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, attribute: Attribute, value: Value) {
        self.0.insert(attribute, value);
    }

    /// Set a quantity, or clear the key when `None`.
    pub fn set_quantity(&mut self, attribute: Attribute, quantity: Option<Quantity>) {
        match quantity {
            Some(q) => {
                self.0.insert(attribute, Value::Quantity(q));
            }
            None => {
                self.0.remove(&attribute);
            }
        }
    }

    #[must_use]
    pub fn get(&self, attribute: Attribute) -> Option<Value> {
        self.0.get(&attribute).copied()
    }

    #[must_use]
    pub fn quantity(&self, attribute: Attribute) -> Option<Quantity> {
        match self.0.get(&attribute) {
            Some(Value::Quantity(q)) => Some(*q),
            _ => None,
        }
    }

    #[must_use]
    pub fn flag(&self, attribute: Attribute) -> Option<bool> {
        match self.0.get(&attribute) {
            Some(Value::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn count(&self, attribute: Attribute) -> Option<u64> {
        match self.0.get(&attribute) {
            Some(Value::Count(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, Value)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// ELEMENT
// =============================================================================

/// A classified HVAC product or an aggregate of products.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub guid: Guid,
    pub kind: ElementKind,
    pub attributes: Attributes,
    /// Ordered ports; every port here has `parent == id`.
    pub ports: Vec<PortId>,
    /// Absorbed elements (aggregates only). Never changes after the merge.
    pub members: Vec<ElementId>,
    /// Port pairs that became interior to this aggregate.
    pub inner_connections: Vec<(PortId, PortId)>,
    /// The aggregate that absorbed this element, if any.
    pub absorbed_by: Option<ElementId>,
}

impl Element {
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        self.kind.is_aggregate()
    }

    #[must_use]
    pub fn quantity(&self, attribute: Attribute) -> Option<Quantity> {
        self.attributes.quantity(attribute)
    }
}

// =============================================================================
// NETWORK (input arena)
// =============================================================================

/// The element collection handed over by the loading collaborator.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub(crate) elements: BTreeMap<ElementId, Element>,
    pub(crate) ports: BTreeMap<PortId, Port>,
    /// Symmetric connection relation: a -> b implies b -> a.
    pub(crate) connections: BTreeMap<PortId, PortId>,
    guid_index: BTreeMap<Guid, ElementId>,
    port_guid_index: BTreeMap<Guid, PortId>,
    next_element_id: u64,
    next_port_id: u64,
}

impl Network {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element with `port_count` ports named `<guid>:<index>`.
    pub fn add_element(
        &mut self,
        guid: impl Into<String>,
        kind: ElementKind,
        port_count: usize,
    ) -> Result<ElementId, HvacError> {
        let guid = Guid::new(guid);
        let id = self.insert_element(guid.clone(), kind)?;
        for index in 0..port_count {
            self.add_port(id, format!("{}:{}", guid, index), None, FlowDirection::Unknown)?;
        }
        Ok(id)
    }

    /// Add an element without ports.
    pub fn insert_element(&mut self, guid: Guid, kind: ElementKind) -> Result<ElementId, HvacError> {
        if self.guid_index.contains_key(&guid) {
            return Err(HvacError::InvalidNetwork(format!(
                "duplicate element guid {}",
                guid
            )));
        }
        let id = ElementId(self.next_element_id);
        self.next_element_id = self.next_element_id.saturating_add(1);
        self.guid_index.insert(guid.clone(), id);
        self.elements.insert(
            id,
            Element {
                id,
                guid,
                kind,
                attributes: Attributes::new(),
                ports: Vec::new(),
                members: Vec::new(),
                inner_connections: Vec::new(),
                absorbed_by: None,
            },
        );
        Ok(id)
    }

    /// Append a port to an element.
    pub fn add_port(
        &mut self,
        element: ElementId,
        guid: impl Into<String>,
        position: Option<[f64; 3]>,
        flow_direction: FlowDirection,
    ) -> Result<PortId, HvacError> {
        let guid = Guid::new(guid);
        if self.port_guid_index.contains_key(&guid) {
            return Err(HvacError::InvalidNetwork(format!(
                "duplicate port guid {}",
                guid
            )));
        }
        let owner = self
            .elements
            .get_mut(&element)
            .ok_or(HvacError::ElementNotFound(element))?;
        let id = PortId(self.next_port_id);
        self.next_port_id = self.next_port_id.saturating_add(1);
        owner.ports.push(id);
        self.port_guid_index.insert(guid.clone(), id);
        self.ports.insert(
            id,
            Port {
                id,
                guid,
                parent: element,
                position,
                flow_direction,
                originals: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Connect two ports symmetrically.
    ///
    /// Rejects self-loops (both ports on one element) and ports that are
    /// already connected elsewhere.
    pub fn connect(&mut self, a: PortId, b: PortId) -> Result<(), HvacError> {
        let parent_a = self.ports.get(&a).ok_or(HvacError::PortNotFound(a))?.parent;
        let parent_b = self.ports.get(&b).ok_or(HvacError::PortNotFound(b))?.parent;
        if parent_a == parent_b {
            return Err(HvacError::InvalidNetwork(format!(
                "ports {} and {} belong to the same element",
                a, b
            )));
        }
        for (port, other) in [(a, b), (b, a)] {
            if let Some(existing) = self.connections.get(&port)
                && *existing != other
            {
                return Err(HvacError::InvalidNetwork(format!(
                    "port {} is already connected to {}",
                    port, existing
                )));
            }
        }
        self.connections.insert(a, b);
        self.connections.insert(b, a);
        Ok(())
    }

    /// Connect the first free port of `a` to the first free port of `b`.
    pub fn link(&mut self, a: ElementId, b: ElementId) -> Result<(PortId, PortId), HvacError> {
        let pa = self.first_free_port(a)?;
        let pb = self.first_free_port(b)?;
        self.connect(pa, pb)?;
        Ok((pa, pb))
    }

    /// Link consecutive elements of a sequence.
    pub fn chain(&mut self, elements: &[ElementId]) -> Result<(), HvacError> {
        for pair in elements.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    fn first_free_port(&self, element: ElementId) -> Result<PortId, HvacError> {
        let owner = self
            .elements
            .get(&element)
            .ok_or(HvacError::ElementNotFound(element))?;
        owner
            .ports
            .iter()
            .copied()
            .find(|p| !self.connections.contains_key(p))
            .ok_or_else(|| {
                HvacError::InvalidNetwork(format!("element {} has no free port", owner.guid))
            })
    }

    /// Fails with `InvalidNetwork` when the value does not fit the
    /// attribute, e.g. a power given as `Length`.
    pub fn set_attribute(
        &mut self,
        element: ElementId,
        attribute: Attribute,
        value: Value,
    ) -> Result<(), HvacError> {
        let target = self
            .elements
            .get_mut(&element)
            .ok_or(HvacError::ElementNotFound(element))?;
        if !attribute.accepts(&value) {
            return Err(HvacError::InvalidNetwork(format!(
                "element {}: {:?} cannot hold {:?}",
                target.guid, attribute, value
            )));
        }
        target.attributes.set(attribute, value);
        Ok(())
    }

    /// Shorthand for setting a quantity attribute.
    pub fn set_quantity(
        &mut self,
        element: ElementId,
        attribute: Attribute,
        quantity: Quantity,
    ) -> Result<(), HvacError> {
        self.set_attribute(element, attribute, Value::Quantity(quantity))
    }

    pub fn set_port_position(&mut self, port: PortId, position: [f64; 3]) -> Result<(), HvacError> {
        self.ports
            .get_mut(&port)
            .ok_or(HvacError::PortNotFound(port))?
            .position = Some(position);
        Ok(())
    }

    pub fn set_flow_direction(
        &mut self,
        port: PortId,
        direction: FlowDirection,
    ) -> Result<(), HvacError> {
        self.ports
            .get_mut(&port)
            .ok_or(HvacError::PortNotFound(port))?
            .flow_direction = direction;
        Ok(())
    }

    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    #[must_use]
    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(&id)
    }

    /// The `index`-th port of an element.
    #[must_use]
    pub fn port_of(&self, element: ElementId, index: usize) -> Option<PortId> {
        self.elements.get(&element)?.ports.get(index).copied()
    }

    #[must_use]
    pub fn element_by_guid(&self, guid: &str) -> Option<ElementId> {
        self.guid_index.get(&Guid::new(guid)).copied()
    }

    #[must_use]
    pub fn port_by_guid(&self, guid: &str) -> Option<PortId> {
        self.port_guid_index.get(&Guid::new(guid)).copied()
    }

    #[must_use]
    pub fn connection(&self, port: PortId) -> Option<PortId> {
        self.connections.get(&port).copied()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }
}

// =============================================================================
// TESTS
// =============================================================================
