//! JSON netlist model for layout synchronization.
//!
//! This crate deserializes the evaluator's JSON netlist document – the
//! `{instances, nets, package_roots}` shape – and resolves it into the flat
//! part/module/net form the layout lens consumes.  It is a *read-only*
//! representation: the structures are `serde`-deserialisable and carry no
//! behaviour beyond resolution.
//!
//! The central entry points are [`Netlist::from_str`] (or
//! [`Netlist::from_file`]) followed by [`Netlist::resolve`].

mod resolve;

pub use resolve::{
    format_footprint, is_library_footprint, Module, NetNode, Part, Property, ResolvedNet,
    ResolvedNetlist,
};

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attribute key that stores the path to the board layout associated with a
/// module instance. Used with `AttributeValue::String`.
pub const ATTR_LAYOUT_PATH: &str = "layout_path";

/// Error type for netlist loading.
#[derive(Debug, Error)]
pub enum NetlistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("netlist JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Discriminates the *kind* of an [`Instance`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstanceKind {
    Module,
    Component,
    Interface,
    Port,
    Pin,
}

/// A netlist attribute value.
///
/// This is the closed union carried by the JSON document; unknown variants
/// are rejected at deserialization time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")] // Match original casing in JSON (String, Number ...)
pub enum AttributeValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Coerce to the property-string form used on footprint fields.
    ///
    /// Booleans become `"true"`/`"false"`, numbers use their display form and
    /// arrays are comma-joined after element-wise coercion.
    pub fn to_property_string(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Number(n) => n.to_string(),
            AttributeValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            AttributeValue::Array(items) => items
                .iter()
                .map(AttributeValue::to_property_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

/// A single instance record: a module, component, interface, port or pin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub kind: InstanceKind,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub reference_designator: Option<String>,
}

impl Instance {
    pub fn new(kind: InstanceKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
            reference_designator: None,
        }
    }

    /// Builder-style attribute insertion that consumes `self`.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder-style reference designator insertion that consumes `self`.
    pub fn with_reference_designator(mut self, designator: impl Into<String>) -> Self {
        self.reference_designator = Some(designator.into());
        self
    }

    /// First string attribute found among `keys`, if any.
    pub fn string_attr(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|&key| self.attributes.get(key).and_then(AttributeValue::string))
    }
}

/// An electrical net: the ports it connects plus a semantic kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetRecord {
    #[serde(default)]
    pub ports: Vec<String>,
    /// Net kind (e.g. "Net", "Power", "Ground", "NotConnected"). Open
    /// vocabulary; only "NotConnected" carries special semantics downstream.
    #[serde(default = "default_net_kind")]
    pub kind: String,
}

fn default_net_kind() -> String {
    "Net".to_string()
}

/// Complete netlist document (instances + nets + package roots).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Netlist {
    /// Every instance in the design, keyed by its fully-qualified reference
    /// string (`path/to/file.zen:<root>.Power.R1`).
    #[serde(default)]
    pub instances: BTreeMap<String, Instance>,

    /// Electrical nets, keyed by their unique name.
    #[serde(default)]
    pub nets: BTreeMap<String, NetRecord>,

    /// Package URL -> absolute filesystem path, for layout fragment and
    /// footprint resolution.
    #[serde(default)]
    pub package_roots: BTreeMap<String, String>,
}

impl Netlist {
    /// Parse a netlist from a JSON string.
    pub fn from_str(json: &str) -> Result<Self, NetlistError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a netlist from a JSON file on disk.
    pub fn from_file(path: &Path) -> Result<Self, NetlistError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_attribute_unions() {
        let json = r#"{
            "instances": {
                "/b.zen:Board.R1": {
                    "kind": "Component",
                    "reference_designator": "R1",
                    "attributes": {
                        "value": {"String": "10k"},
                        "dnp": {"Boolean": true},
                        "tolerance": {"Number": 5.0},
                        "tags": {"Array": [{"String": "a"}, {"String": "b"}]}
                    }
                }
            },
            "nets": {},
            "package_roots": {"gh://acme/lib": "/tmp/lib"}
        }"#;

        let netlist = Netlist::from_str(json).unwrap();
        let inst = netlist.instances.get("/b.zen:Board.R1").unwrap();
        assert_eq!(inst.kind, InstanceKind::Component);
        assert_eq!(inst.reference_designator.as_deref(), Some("R1"));
        assert_eq!(inst.string_attr(&["value"]), Some("10k"));
        assert_eq!(inst.attributes.get("dnp").unwrap().boolean(), Some(true));
        assert_eq!(
            netlist.package_roots.get("gh://acme/lib").map(String::as_str),
            Some("/tmp/lib")
        );
    }

    #[test]
    fn reject_unknown_attribute_variant() {
        let json = r#"{
            "instances": {
                "/b.zen:Board.R1": {
                    "kind": "Component",
                    "attributes": {"x": {"Blob": "??"}}
                }
            },
            "nets": {}
        }"#;

        assert!(Netlist::from_str(json).is_err());
    }

    #[test]
    fn string_attr_takes_first_match() {
        let inst = Instance::new(InstanceKind::Component)
            .with_reference_designator("U1")
            .with_attribute("value", "10k")
            .with_attribute("mpn", "RC-GEN");
        assert_eq!(inst.string_attr(&["mpn", "value"]), Some("RC-GEN"));
        assert_eq!(inst.string_attr(&["value", "mpn"]), Some("10k"));
        assert_eq!(inst.string_attr(&["missing"]), None);
        assert_eq!(inst.reference_designator.as_deref(), Some("U1"));
    }

    #[test]
    fn property_string_coercions() {
        assert_eq!(AttributeValue::from("x").to_property_string(), "x");
        assert_eq!(AttributeValue::from(true).to_property_string(), "true");
        assert_eq!(AttributeValue::from(false).to_property_string(), "false");
        assert_eq!(AttributeValue::Number(5.5).to_property_string(), "5.5");
        assert_eq!(
            AttributeValue::Array(vec!["a".into(), true.into()]).to_property_string(),
            "a,true"
        );
    }
}
