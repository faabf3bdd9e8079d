//! Netlist projection: derive a [`BoardView`] from the source netlist.
//!
//! This is the `get` direction of the lens. It is a pure function that
//! extracts all source-authoritative data and structures it for
//! synchronization.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use pcb_netlist::ResolvedNetlist;

use crate::types::{BoardView, EntityId, EntityPath, FootprintView, GroupView, NetView};

/// Net kind that marks intentionally unconnected pins.
pub const NET_KIND_NOT_CONNECTED: &str = "NotConnected";

/// Property names that never become footprint fields.
const SKIPPED_PROPERTIES: [&str; 4] = ["value", "reference", "symbol_name", "symbol_path"];

/// Derive a [`BoardView`] from the source netlist.
pub fn get(netlist: &ResolvedNetlist) -> BoardView {
    let mut footprints: BTreeMap<EntityId, FootprintView> = BTreeMap::new();
    let mut groups: BTreeMap<EntityId, GroupView> = BTreeMap::new();
    let mut nets: BTreeMap<String, NetView> = BTreeMap::new();
    let mut not_connected_pads: BTreeSet<(EntityId, String)> = BTreeSet::new();

    for part in &netlist.parts {
        let entity_path = EntityPath::parse(&part.path);
        // FPID participates in identity: an FPID change is delete + create.
        let entity_id = EntityId::new(entity_path, part.footprint.clone());

        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        fields.insert("Datasheet".to_string(), String::new());
        fields.insert("Description".to_string(), String::new());
        fields.insert("Path".to_string(), part.path.clone());

        let mut dnp = false;
        let mut exclude_from_bom = false;
        let mut exclude_from_pos = false;

        for prop in &part.properties {
            let name_lower = prop.name.to_lowercase();
            match name_lower.as_str() {
                "dnp" => dnp = parse_bool(&prop.value),
                "skip_bom" => exclude_from_bom = parse_bool(&prop.value),
                "skip_pos" => exclude_from_pos = parse_bool(&prop.value),
                "datasheet" => {
                    fields.insert("Datasheet".to_string(), prop.value.clone());
                }
                "description" => {
                    fields.insert("Description".to_string(), prop.value.clone());
                }
                _ => {
                    if SKIPPED_PROPERTIES.contains(&name_lower.as_str())
                        || prop.name.starts_with('_')
                    {
                        continue;
                    }
                    let field_name = title_case(&prop.name.replace('_', " "));
                    fields.insert(field_name, prop.value.clone());
                }
            }
        }

        footprints.insert(
            entity_id.clone(),
            FootprintView {
                entity_id,
                reference: part.reference.clone(),
                value: part.value.clone(),
                fpid: part.footprint.clone(),
                dnp,
                exclude_from_bom,
                exclude_from_pos,
                fields,
            },
        );
    }

    let fp_id_by_ref: HashMap<&str, &EntityId> = footprints
        .iter()
        .map(|(fp_id, fp_view)| (fp_view.reference.as_str(), fp_id))
        .collect();

    // A module qualifies as a group if it has a layout_path OR contains more
    // than one direct child. Single-child wrapper modules (e.g. generic
    // component wrappers) are elided so they do not create noise groups.
    for (module_path, module) in &netlist.modules {
        let entity_path = EntityPath::parse(module_path);
        let entity_id = EntityId::group(entity_path.clone());

        let direct_footprints = footprints
            .keys()
            .filter(|fp_id| fp_id.path.parent().as_ref() == Some(&entity_path))
            .count();
        let direct_submodules = netlist
            .modules
            .keys()
            .filter(|sub_path| EntityPath::parse(sub_path).parent().as_ref() == Some(&entity_path))
            .count();

        if direct_footprints + direct_submodules <= 1 && module.layout_path.is_none() {
            continue;
        }

        // Members are all descendant footprints, not just direct children,
        // since nested component wrappers are skipped.
        let member_ids: Vec<EntityId> = footprints
            .keys()
            .filter(|fp_id| entity_path.is_ancestor_of(&fp_id.path))
            .cloned()
            .collect();

        groups.insert(
            entity_id.clone(),
            GroupView {
                entity_id,
                member_ids,
                layout_path: module.layout_path.clone(),
            },
        );
    }

    for net in &netlist.nets {
        // Logical ports (component refdes + pin name), independent of pad
        // fanout.
        let mut logical_ports_set: BTreeSet<(String, String)> = BTreeSet::new();
        let mut pads_by_port: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
        for node in &net.nodes {
            let port = (node.reference.clone(), node.pin.clone());
            logical_ports_set.insert(port.clone());
            pads_by_port.entry(port).or_default().insert(node.pad.clone());
        }
        let logical_ports: Vec<(String, String)> = logical_ports_set.into_iter().collect();

        // A NotConnected net incident on exactly one logical pin that fans
        // out to multiple pads is exploded into one distinct net per pad so
        // those pads are not electrically tied together.
        if net.kind == NET_KIND_NOT_CONNECTED && logical_ports.len() == 1 {
            let (reference, pin_name) = &logical_ports[0];
            let mut pad_nums: Vec<String> = pads_by_port
                .get(&(reference.clone(), pin_name.clone()))
                .map(|pads| pads.iter().cloned().collect())
                .unwrap_or_default();
            pad_nums.sort_by(|a, b| pad_order(a, b));

            if let Some(fp_id) = fp_id_by_ref.get(reference.as_str()) {
                if pad_nums.len() > 1 {
                    for pad_num in &pad_nums {
                        let name = unique_net_name(
                            &unconnected_net_name(&fp_id.path, reference, pad_num),
                            &nets,
                        );
                        not_connected_pads.insert(((*fp_id).clone(), pad_num.clone()));
                        nets.insert(
                            name.clone(),
                            NetView {
                                name,
                                connections: vec![((*fp_id).clone(), pad_num.clone())],
                                kind: net.kind.clone(),
                                logical_ports: logical_ports.clone(),
                            },
                        );
                    }
                    continue;
                }
            }
        }

        // Other NotConnected nets stay whole: the "no connect" behaviour is
        // expressed via pad pin type at apply time, not by suppressing the
        // connection.
        let mut connections: Vec<(EntityId, String)> = Vec::new();
        let mut seen: BTreeSet<(EntityId, String)> = BTreeSet::new();
        for node in &net.nodes {
            let Some(fp_id) = fp_id_by_ref.get(node.reference.as_str()) else {
                continue;
            };
            let conn = ((*fp_id).clone(), node.pad.clone());
            if seen.insert(conn.clone()) {
                connections.push(conn);
            }
        }

        if net.kind == NET_KIND_NOT_CONNECTED {
            for conn in &connections {
                not_connected_pads.insert(conn.clone());
            }
        }

        nets.insert(
            net.name.clone(),
            NetView {
                name: net.name.clone(),
                connections,
                kind: net.kind.clone(),
                logical_ports,
            },
        );
    }

    BoardView {
        footprints,
        groups,
        nets,
        not_connected_pads,
    }
}

/// Parse a boolean from a property string.
fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

/// Title-case a property name the way field names are stored: each letter
/// that does not follow another letter is capitalized, the rest lowered.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_alpha = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_is_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_alpha = true;
        } else {
            out.push(ch);
            prev_is_alpha = false;
        }
    }
    out
}

/// Generate the per-pad unconnected net name for a single pad.
fn unconnected_net_name(path: &EntityPath, reference: &str, pad_num: &str) -> String {
    let path_str = if path.is_empty() {
        reference.to_string()
    } else {
        path.to_string()
    };
    format!("unconnected-({path_str}:{pad_num})")
}

/// Return a name not already present in `existing`, suffixing `__2`, `__3`, …
/// on collision.
fn unique_net_name(base: &str, existing: &BTreeMap<String, NetView>) -> String {
    if !existing.contains_key(base) {
        return base.to_string();
    }
    let mut i = 2;
    loop {
        let candidate = format!("{base}__{i}");
        if !existing.contains_key(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

/// Natural pad ordering: numeric pads compare as integers and sort before
/// non-numeric pads, which compare as strings.
pub fn pad_order(a: &str, b: &str) -> Ordering {
    match (parse_pad_number(a), parse_pad_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn parse_pad_number(pad: &str) -> Option<u128> {
    if pad.is_empty() || !pad.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    pad.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcb_netlist::{Module, NetNode, Part, Property, ResolvedNet};

    fn part(path: &str, reference: &str, fpid: &str) -> Part {
        Part {
            reference: reference.to_string(),
            value: "1k".to_string(),
            footprint: fpid.to_string(),
            path: path.to_string(),
            properties: Vec::new(),
        }
    }

    fn node(reference: &str, pad: &str, pin: &str) -> NetNode {
        NetNode {
            reference: reference.to_string(),
            pad: pad.to_string(),
            pin: pin.to_string(),
        }
    }

    #[test]
    fn projects_parts_with_standard_fields() {
        let mut netlist = ResolvedNetlist::default();
        let mut p = part("Power.R1", "R1", "Resistor_SMD:R_0603");
        p.properties = vec![
            Property {
                name: "dnp".to_string(),
                value: "true".to_string(),
            },
            Property {
                name: "skip_bom".to_string(),
                value: "True".to_string(),
            },
            Property {
                name: "part_number".to_string(),
                value: "RC0603".to_string(),
            },
            Property {
                name: "_internal".to_string(),
                value: "x".to_string(),
            },
            Property {
                name: "symbol_name".to_string(),
                value: "R".to_string(),
            },
        ];
        netlist.parts.push(p);

        let view = get(&netlist);
        let id = EntityId::parse("Power.R1", "Resistor_SMD:R_0603");
        let fp = view.footprints.get(&id).unwrap();

        assert!(fp.dnp);
        assert!(fp.exclude_from_bom);
        assert!(!fp.exclude_from_pos);
        assert_eq!(fp.fields.get("Path").map(String::as_str), Some("Power.R1"));
        assert_eq!(fp.fields.get("Datasheet").map(String::as_str), Some(""));
        assert_eq!(
            fp.fields.get("Part Number").map(String::as_str),
            Some("RC0603")
        );
        // Leading-underscore and symbol properties never become fields.
        assert!(!fp.fields.keys().any(|k| k.contains("Internal")));
        assert!(!fp.fields.contains_key("Symbol Name"));
    }

    #[test]
    fn single_child_wrapper_modules_are_elided() {
        let mut netlist = ResolvedNetlist::default();
        netlist.parts.push(part("Power.R1.R", "R1", "Lib:R"));
        netlist.parts.push(part("Power.C1.C", "C1", "Lib:C"));
        for path in ["Power", "Power.R1", "Power.C1"] {
            netlist.modules.insert(
                path.to_string(),
                Module {
                    path: path.to_string(),
                    layout_path: None,
                },
            );
        }

        let view = get(&netlist);

        // "Power" has two direct submodules, so it is a group; the wrappers
        // have one child each and no layout_path, so they are elided.
        assert_eq!(view.groups.len(), 1);
        let group = view.groups.get(&EntityId::parse("Power", "")).unwrap();
        assert_eq!(group.member_ids.len(), 2);
    }

    #[test]
    fn layout_path_forces_group() {
        let mut netlist = ResolvedNetlist::default();
        netlist.parts.push(part("Reg.C1", "C1", "Lib:C"));
        netlist.modules.insert(
            "Reg".to_string(),
            Module {
                path: "Reg".to_string(),
                layout_path: Some("gh://acme/reg/layout".to_string()),
            },
        );

        let view = get(&netlist);
        let group = view.groups.get(&EntityId::parse("Reg", "")).unwrap();
        assert_eq!(group.layout_path.as_deref(), Some("gh://acme/reg/layout"));
    }

    #[test]
    fn not_connected_fanout_explodes_per_pad() {
        let mut netlist = ResolvedNetlist::default();
        netlist.parts.push(part("Power.C1", "C1", "Lib:C"));
        netlist.nets.push(ResolvedNet {
            name: "NC_NET".to_string(),
            kind: NET_KIND_NOT_CONNECTED.to_string(),
            nodes: vec![node("C1", "1", "NC"), node("C1", "2", "NC")],
        });

        let view = get(&netlist);

        assert!(!view.nets.contains_key("NC_NET"));
        let id = EntityId::parse("Power.C1", "Lib:C");
        for pad in ["1", "2"] {
            let name = format!("unconnected-(Power.C1:{pad})");
            let net = view.nets.get(&name).unwrap_or_else(|| panic!("missing {name}"));
            assert_eq!(net.connections, vec![(id.clone(), pad.to_string())]);
            assert_eq!(
                net.logical_ports,
                vec![("C1".to_string(), "NC".to_string())]
            );
            assert!(view.not_connected_pads.contains(&(id.clone(), pad.to_string())));
        }
    }

    #[test]
    fn not_connected_single_pad_stays_whole() {
        let mut netlist = ResolvedNetlist::default();
        netlist.parts.push(part("Power.C1", "C1", "Lib:C"));
        netlist.nets.push(ResolvedNet {
            name: "NC_ONE".to_string(),
            kind: NET_KIND_NOT_CONNECTED.to_string(),
            nodes: vec![node("C1", "1", "NC")],
        });

        let view = get(&netlist);
        let net = view.nets.get("NC_ONE").unwrap();
        assert_eq!(net.connections.len(), 1);
        assert!(view
            .not_connected_pads
            .contains(&(EntityId::parse("Power.C1", "Lib:C"), "1".to_string())));
    }

    #[test]
    fn duplicate_connections_are_dropped() {
        let mut netlist = ResolvedNetlist::default();
        netlist.parts.push(part("A", "A", "Lib:X"));
        netlist.nets.push(ResolvedNet {
            name: "N".to_string(),
            kind: "Net".to_string(),
            nodes: vec![node("A", "1", "P1"), node("A", "1", "P1"), node("A", "2", "P2")],
        });

        let view = get(&netlist);
        assert_eq!(view.nets.get("N").unwrap().connections.len(), 2);
    }

    #[test]
    fn pad_ordering_is_natural() {
        assert_eq!(pad_order("2", "10"), Ordering::Less);
        assert_eq!(pad_order("10", "2"), Ordering::Greater);
        assert_eq!(pad_order("2", "A1"), Ordering::Less);
        assert_eq!(pad_order("A1", "2"), Ordering::Greater);
        assert_eq!(pad_order("A1", "A2"), Ordering::Less);
    }

    #[test]
    fn title_casing_matches_field_convention() {
        assert_eq!(title_case("part number"), "Part Number");
        assert_eq!(title_case("mpn"), "Mpn");
        assert_eq!(title_case("abc2def"), "Abc2Def");
    }
}
