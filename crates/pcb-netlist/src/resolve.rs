//! Resolution of the raw netlist document into flat parts, modules and nets.
//!
//! Instance references in the document look like
//! `path/to/file.zen:<root>.Power.R1`; resolution strips the file prefix and
//! the `<root>` segment so downstream code sees plain hierarchical names
//! (`Power.R1`). Net ports are resolved to `(refdes, pad, pin)` node tuples
//! by walking up the hierarchy to the owning component and fanning a logical
//! pin out over its physical pads.

use std::collections::BTreeMap;
use std::path::Path;

use crate::{AttributeValue, Instance, InstanceKind, Netlist, ATTR_LAYOUT_PATH};

/// A component part, flattened for lens projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Reference designator (`R1`).
    pub reference: String,
    /// Display value; precedence is `mpn` > `value` > `Value` > `"?"`.
    pub value: String,
    /// Footprint identifier in `library:name` form.
    pub footprint: String,
    /// Hierarchical name (`Power.R1`).
    pub path: String,
    /// Remaining attributes, coerced to strings.
    pub properties: Vec<Property>,
}

/// A named property on a part.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: String,
}

/// A module instance that may reference a pre-laid layout fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub path: String,
    pub layout_path: Option<String>,
}

/// One net node: a component pad together with its logical pin.
///
/// A single logical pin can map to multiple pads (e.g. SW pins, thermal
/// pads, stitched pads); the pin name is carried separately so
/// pin-vs-pad-aware behaviour (NotConnected handling) stays possible.
#[derive(Debug, Clone, PartialEq)]
pub struct NetNode {
    pub reference: String,
    pub pad: String,
    pub pin: String,
}

/// A resolved electrical net.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNet {
    pub name: String,
    pub kind: String,
    pub nodes: Vec<NetNode>,
}

/// Fully resolved netlist, ready for lens projection.
#[derive(Debug, Clone, Default)]
pub struct ResolvedNetlist {
    pub parts: Vec<Part>,
    /// Modules keyed by hierarchical path.
    pub modules: BTreeMap<String, Module>,
    pub nets: Vec<ResolvedNet>,
    pub package_roots: BTreeMap<String, String>,
}

impl Netlist {
    /// Resolve the raw document into flat parts, modules and net nodes.
    pub fn resolve(&self) -> ResolvedNetlist {
        let mut resolved = ResolvedNetlist {
            package_roots: self.package_roots.clone(),
            ..Default::default()
        };

        for (instance_ref, instance) in &self.instances {
            match instance.kind {
                InstanceKind::Module => {
                    let path = strip_instance_path(instance_ref);
                    // Skip the root module itself.
                    if path.is_empty() {
                        continue;
                    }
                    let layout_path = instance
                        .string_attr(&[ATTR_LAYOUT_PATH])
                        .map(str::to_string);
                    log::debug!("found module {path} with layout_path: {layout_path:?}");
                    resolved
                        .modules
                        .insert(path.clone(), Module { path, layout_path });
                }
                InstanceKind::Component => {
                    resolved.parts.push(resolve_part(instance_ref, instance));
                }
                _ => {}
            }
        }

        for (net_name, net) in &self.nets {
            let mut nodes = Vec::new();
            for port_ref in &net.ports {
                self.resolve_port_nodes(port_ref, &mut nodes);
            }
            if !nodes.is_empty() {
                resolved.nets.push(ResolvedNet {
                    name: net_name.clone(),
                    kind: net.kind.clone(),
                    nodes,
                });
            }
        }

        resolved
    }

    /// Resolve one port reference into `(refdes, pad, pin)` nodes.
    fn resolve_port_nodes(&self, port_ref: &str, nodes: &mut Vec<NetNode>) {
        let port_parts: Vec<&str> = port_ref.split('.').collect();

        // Find the owning component by walking up the hierarchy.
        let mut parent: Option<&Instance> = None;
        for i in (1..port_parts.len()).rev() {
            let test_ref = port_parts[..i].join(".");
            if let Some(inst) = self.instances.get(&test_ref) {
                if inst.kind == InstanceKind::Component {
                    parent = Some(inst);
                    break;
                }
            }
        }
        let Some(parent) = parent else {
            return;
        };
        let reference = parent
            .reference_designator
            .clone()
            .unwrap_or_else(|| "U?".to_string());

        // The physical pads of the logical pin come from the port instance.
        let pads = self
            .instances
            .get(port_ref)
            .and_then(|port| port.attributes.get("pads"))
            .map(|attr| match attr {
                AttributeValue::Array(items) => items
                    .iter()
                    .map(|item| item.string().unwrap_or("1").to_string())
                    .collect(),
                _ => Vec::new(),
            })
            .unwrap_or_default();

        let pin = port_parts.last().copied().unwrap_or_default().to_string();
        for pad in pads {
            nodes.push(NetNode {
                reference: reference.clone(),
                pad,
                pin: pin.clone(),
            });
        }
    }
}

fn resolve_part(instance_ref: &str, instance: &Instance) -> Part {
    let reference = instance
        .reference_designator
        .clone()
        .unwrap_or_else(|| "U?".to_string());

    let value = instance
        .string_attr(&["mpn", "value", "Value"])
        .unwrap_or("?")
        .to_string();

    let footprint = match instance.string_attr(&["footprint"]) {
        Some(fp) if !fp.is_empty() => format_footprint(fp),
        _ => "unknown:unknown".to_string(),
    };

    let mut properties = Vec::new();
    for (name, attr) in &instance.attributes {
        if matches!(name.as_str(), "footprint" | "value" | "Value") {
            continue;
        }
        properties.push(Property {
            name: name.clone(),
            value: attr.to_property_string(),
        });
    }

    Part {
        reference,
        value,
        footprint,
        path: strip_instance_path(instance_ref),
        properties,
    }
}

/// Strip the file prefix and `<root>` segment from an instance reference.
///
/// `path/to/file.zen:<root>.Power.R1` becomes `Power.R1`. The root module
/// itself resolves to the empty string.
pub(crate) fn strip_instance_path(instance_ref: &str) -> String {
    let instance_path = match instance_ref.rsplit_once(':') {
        Some((_, path)) => path,
        None => instance_ref,
    };
    let mut parts: Vec<&str> = instance_path.split('.').collect();
    if parts.first() == Some(&"<root>") {
        parts.remove(0);
    }
    parts.join(".")
}

/// Determine whether a string is a `lib:footprint` reference rather than a
/// file path.
pub fn is_library_footprint(s: &str) -> bool {
    let Some((lib, fp)) = s.split_once(':') else {
        return false;
    };

    // Filter out Windows drive prefixes like "C:".
    if lib.len() == 1 && lib.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }

    // Any path separator indicates this is still a filesystem path.
    !(lib.contains('/') || lib.contains('\\') || fp.contains('/') || fp.contains('\\'))
}

/// Convert footprint strings that may point to a `.kicad_mod` file into a
/// `lib:fp` identifier.
pub fn format_footprint(fp_str: &str) -> String {
    if is_library_footprint(fp_str) {
        return fp_str.to_string();
    }

    match Path::new(fp_str).file_stem().and_then(|s| s.to_str()) {
        Some(stem) if !stem.is_empty() => format!("{stem}:{stem}"),
        _ => "UNKNOWN:UNKNOWN".to_string(),
    }
}
