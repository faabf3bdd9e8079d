//! Layout operation log for debugging and testing.
//!
//! Records every action taken during changeset application so runs can be
//! compared as deterministic snapshots. Each operation is a structured
//! [`OpEvent`] serialized as one human-readable line:
//!
//! ```text
//! FP_ADD path=Power.R1 ref=R1 fpid=Resistor_SMD:R_0603 value=10k x=0 y=0
//! ```
//!
//! Values are integers, bare strings, JSON-quoted strings (whitespace or
//! special characters), or JSON arrays (member lists). Identical inputs must
//! serialize identically across runs.

use std::fmt;

/// Kinds of logged operations, in rough phase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpKind {
    NetAdd,
    NetRemove,
    GrRemove,
    FpRemove,
    FpAdd,
    GrAdd,
    FpReplace,
    GrMember,
    FragTrack,
    FragVia,
    FragZone,
    FragGraphic,
    PlaceFp,
    PlaceGr,
    PlaceFpInherit,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::NetAdd => "NET_ADD",
            OpKind::NetRemove => "NET_REMOVE",
            OpKind::GrRemove => "GR_REMOVE",
            OpKind::FpRemove => "FP_REMOVE",
            OpKind::FpAdd => "FP_ADD",
            OpKind::GrAdd => "GR_ADD",
            OpKind::FpReplace => "FP_REPLACE",
            OpKind::GrMember => "GR_MEMBER",
            OpKind::FragTrack => "FRAG_TRACK",
            OpKind::FragVia => "FRAG_VIA",
            OpKind::FragZone => "FRAG_ZONE",
            OpKind::FragGraphic => "FRAG_GRAPHIC",
            OpKind::PlaceFp => "PLACE_FP",
            OpKind::PlaceGr => "PLACE_GR",
            OpKind::PlaceFpInherit => "PLACE_FP_INHERIT",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OpKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NET_ADD" => OpKind::NetAdd,
            "NET_REMOVE" => OpKind::NetRemove,
            "GR_REMOVE" => OpKind::GrRemove,
            "FP_REMOVE" => OpKind::FpRemove,
            "FP_ADD" => OpKind::FpAdd,
            "GR_ADD" => OpKind::GrAdd,
            "FP_REPLACE" => OpKind::FpReplace,
            "GR_MEMBER" => OpKind::GrMember,
            "FRAG_TRACK" => OpKind::FragTrack,
            "FRAG_VIA" => OpKind::FragVia,
            "FRAG_ZONE" => OpKind::FragZone,
            "FRAG_GRAPHIC" => OpKind::FragGraphic,
            "PLACE_FP" => OpKind::PlaceFp,
            "PLACE_GR" => OpKind::PlaceGr,
            "PLACE_FP_INHERIT" => OpKind::PlaceFpInherit,
            other => return Err(format!("unknown op kind: '{other}'")),
        })
    }
}

/// A field value on an event line.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::List(v)
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.contains(char::is_whitespace)
        || s.contains('"')
        || s.contains('=')
        || s.starts_with('[')
        || s.parse::<i64>().is_ok()
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Int(i) => i.to_string(),
        Value::Str(s) if needs_quoting(s) => {
            serde_json::to_string(s).expect("string serialization is infallible")
        }
        Value::Str(s) => s.clone(),
        Value::List(items) => {
            serde_json::to_string(items).expect("string list serialization is infallible")
        }
    }
}

fn parse_value(raw: &str) -> Result<Value, String> {
    if raw.starts_with('"') {
        let s: String =
            serde_json::from_str(raw).map_err(|e| format!("bad quoted value {raw}: {e}"))?;
        return Ok(Value::Str(s));
    }
    if raw.starts_with('[') {
        let items: Vec<String> =
            serde_json::from_str(raw).map_err(|e| format!("bad list value {raw}: {e}"))?;
        return Ok(Value::List(items));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    Ok(Value::Str(raw.to_string()))
}

/// Serialize one event line: `KIND k1=v1 k2=v2 …`.
pub fn format_line(kind: OpKind, fields: &[(String, Value)]) -> String {
    let mut line = kind.as_str().to_string();
    for (key, value) in fields {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(&format_value(value));
    }
    line
}

/// Parse one event line back into kind and fields.
pub fn parse_line(line: &str) -> Result<(OpKind, Vec<(String, Value)>), String> {
    let mut tokens = tokenize(line)?;
    if tokens.is_empty() {
        return Err("empty op line".to_string());
    }
    let kind: OpKind = tokens.remove(0).parse()?;
    let mut fields = Vec::new();
    for token in tokens {
        let (key, raw) = token
            .split_once('=')
            .ok_or_else(|| format!("malformed field '{token}'"))?;
        fields.push((key.to_string(), parse_value(raw)?));
    }
    Ok((kind, fields))
}

/// Split a line on spaces, keeping JSON-quoted strings and arrays intact.
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in line.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                current.push(ch);
                in_string = !in_string;
            }
            ' ' if !in_string => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if in_string {
        return Err(format!("unterminated string in op line: {line}"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// A single structured operation event.
#[derive(Debug, Clone, PartialEq)]
pub struct OpEvent {
    pub kind: OpKind,
    pub fields: Vec<(String, Value)>,
}

impl OpEvent {
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    /// Serialize to a single human-readable line.
    pub fn to_line(&self) -> String {
        format_line(self.kind, &self.fields)
    }

    /// Parse a single line back to an event.
    pub fn from_line(line: &str) -> Result<Self, String> {
        let (kind, fields) = parse_line(line)?;
        Ok(Self { kind, fields })
    }

    /// Look up a field value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Accumulates layout operations for debugging and testing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpLog {
    pub events: Vec<OpEvent>,
}

impl OpLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: OpEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events of a given kind, in emission order.
    pub fn of_kind(&self, kind: OpKind) -> Vec<&OpEvent> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }

    // Phase 1: net operations ------------------------------------------------

    pub fn net_add(&mut self, name: &str) {
        self.emit(OpEvent::new(OpKind::NetAdd).field("name", name));
    }

    pub fn net_remove(&mut self, name: &str) {
        self.emit(OpEvent::new(OpKind::NetRemove).field("name", name));
    }

    // Phase 2: deletions -----------------------------------------------------

    pub fn gr_remove(&mut self, path: &str, items_released: i64) {
        self.emit(
            OpEvent::new(OpKind::GrRemove)
                .field("path", path)
                .field("items", items_released),
        );
    }

    pub fn fp_remove(&mut self, path: &str) {
        self.emit(OpEvent::new(OpKind::FpRemove).field("path", path));
    }

    // Phase 3: additions -----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn fp_add(
        &mut self,
        path: &str,
        reference: &str,
        fpid: &str,
        value: &str,
        x: i64,
        y: i64,
        layer: &str,
        pad_count: i64,
    ) {
        let mut event = OpEvent::new(OpKind::FpAdd)
            .field("path", path)
            .field("ref", reference)
            .field("fpid", fpid)
            .field("value", value)
            .field("x", x)
            .field("y", y);
        if !layer.is_empty() {
            event = event.field("layer", layer);
        }
        if pad_count != 0 {
            event = event.field("pads", pad_count);
        }
        self.emit(event);
    }

    pub fn gr_add(&mut self, path: &str) {
        self.emit(OpEvent::new(OpKind::GrAdd).field("path", path));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn fp_replace(
        &mut self,
        path: &str,
        old_fpid: &str,
        new_fpid: &str,
        x: i64,
        y: i64,
        layer: &str,
        pad_count: i64,
    ) {
        let mut event = OpEvent::new(OpKind::FpReplace)
            .field("path", path)
            .field("old", old_fpid)
            .field("new", new_fpid)
            .field("x", x)
            .field("y", y);
        if !layer.is_empty() {
            event = event.field("layer", layer);
        }
        if pad_count != 0 {
            event = event.field("pads", pad_count);
        }
        self.emit(event);
    }

    // Phase 5: group membership ----------------------------------------------

    pub fn gr_member(&mut self, group_path: &str, member_paths: &[String]) {
        let mut members = member_paths.to_vec();
        members.sort();
        self.emit(
            OpEvent::new(OpKind::GrMember)
                .field("path", group_path)
                .field("members", members),
        );
    }

    // Phase 6: fragment routing ----------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn frag_track(
        &mut self,
        group_path: &str,
        net_name: &str,
        layer: &str,
        start_x: i64,
        start_y: i64,
        end_x: i64,
        end_y: i64,
        width: i64,
    ) {
        let dx = (end_x - start_x) as f64;
        let dy = (end_y - start_y) as f64;
        let length = (dx * dx + dy * dy).sqrt() as i64;
        let mut event = OpEvent::new(OpKind::FragTrack)
            .field("group", group_path)
            .field("net", net_name)
            .field("layer", layer)
            .field("x1", start_x)
            .field("y1", start_y)
            .field("x2", end_x)
            .field("y2", end_y)
            .field("len", length);
        if width != 0 {
            event = event.field("w", width);
        }
        self.emit(event);
    }

    pub fn frag_via(&mut self, group_path: &str, net_name: &str, x: i64, y: i64, drill: i64) {
        let mut event = OpEvent::new(OpKind::FragVia)
            .field("group", group_path)
            .field("net", net_name)
            .field("x", x)
            .field("y", y);
        if drill != 0 {
            event = event.field("drill", drill);
        }
        self.emit(event);
    }

    pub fn frag_zone(&mut self, group_path: &str, net_name: &str, layer: &str, name: &str) {
        let mut event = OpEvent::new(OpKind::FragZone)
            .field("group", group_path)
            .field("net", net_name)
            .field("layer", layer);
        if !name.is_empty() {
            event = event.field("name", name);
        }
        self.emit(event);
    }

    pub fn frag_graphic(&mut self, group_path: &str, graphic_type: &str, layer: &str) {
        self.emit(
            OpEvent::new(OpKind::FragGraphic)
                .field("group", group_path)
                .field("type", graphic_type)
                .field("layer", layer),
        );
    }

    // Phase 7: placement -----------------------------------------------------

    pub fn place_fp(&mut self, path: &str, x: i64, y: i64, w: i64, h: i64) {
        let mut event = OpEvent::new(OpKind::PlaceFp)
            .field("path", path)
            .field("x", x)
            .field("y", y);
        if w != 0 && h != 0 {
            event = event.field("w", w).field("h", h);
        }
        self.emit(event);
    }

    pub fn place_gr(&mut self, path: &str, x: i64, y: i64, w: i64, h: i64) {
        let mut event = OpEvent::new(OpKind::PlaceGr)
            .field("path", path)
            .field("x", x)
            .field("y", y);
        if w != 0 && h != 0 {
            event = event.field("w", w).field("h", h);
        }
        self.emit(event);
    }

    /// Log position inheritance for an FPID change.
    pub fn place_fp_inherit(&mut self, path: &str, x: i64, y: i64, old_fpid: &str, new_fpid: &str) {
        self.emit(
            OpEvent::new(OpKind::PlaceFpInherit)
                .field("path", path)
                .field("x", x)
                .field("y", y)
                .field("old_fpid", old_fpid)
                .field("new_fpid", new_fpid),
        );
    }

    // Serialization ----------------------------------------------------------

    /// Serialize to plaintext, one line per event.
    pub fn to_plaintext(&self) -> String {
        if self.events.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&event.to_line());
            out.push('\n');
        }
        out
    }

    /// Parse plaintext back to an OpLog, skipping blank and comment lines.
    pub fn from_plaintext(text: &str) -> Result<Self, String> {
        let mut events = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            events.push(OpEvent::from_line(line)?);
        }
        Ok(Self { events })
    }

    /// Log all events as INFO-level messages.
    pub fn log_all(&self) {
        for event in &self.events {
            log::info!("OPLOG {}", event.to_line());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_line_format() {
        let mut oplog = OpLog::new();
        oplog.fp_add("Power.R1", "R1", "Resistor_SMD:R_0603", "10k", 0, 0, "F.Cu", 2);
        assert_eq!(
            oplog.to_plaintext(),
            "FP_ADD path=Power.R1 ref=R1 fpid=Resistor_SMD:R_0603 value=10k x=0 y=0 layer=F.Cu pads=2\n"
        );
    }

    #[test]
    fn whitespace_values_are_json_quoted() {
        let mut oplog = OpLog::new();
        oplog.net_add("NET WITH SPACES");
        assert_eq!(oplog.to_plaintext(), "NET_ADD name=\"NET WITH SPACES\"\n");
    }

    #[test]
    fn empty_value_is_quoted() {
        let mut oplog = OpLog::new();
        oplog.frag_zone("Power", "", "F.Cu", "");
        assert_eq!(
            oplog.to_plaintext(),
            "FRAG_ZONE group=Power net=\"\" layer=F.Cu\n"
        );
    }

    #[test]
    fn member_lists_serialize_as_json_arrays() {
        let mut oplog = OpLog::new();
        oplog.gr_member("Power", &["Power.R1".to_string(), "Power.C1".to_string()]);
        // List is sorted before serialization.
        assert_eq!(
            oplog.to_plaintext(),
            "GR_MEMBER path=Power members=[\"Power.C1\",\"Power.R1\"]\n"
        );
    }

    #[test]
    fn track_length_is_derived() {
        let mut oplog = OpLog::new();
        oplog.frag_track("G", "VCC", "F.Cu", 0, 0, 3, 4, 0);
        let event = &oplog.events[0];
        assert_eq!(event.get("len"), Some(&Value::Int(5)));
    }

    #[test]
    fn plaintext_roundtrip() {
        let mut oplog = OpLog::new();
        oplog.net_add("VCC");
        oplog.net_remove("OLD NET");
        oplog.fp_remove("Legacy.R9");
        oplog.gr_member("Power", &["Power.R1".to_string()]);
        oplog.place_fp_inherit("Power.R1", 100, -200, "R_0402", "R_0603");

        let text = oplog.to_plaintext();
        let parsed = OpLog::from_plaintext(&text).unwrap();
        assert_eq!(parsed, oplog);
        assert_eq!(parsed.to_plaintext(), text);
    }

    #[test]
    fn numeric_looking_strings_roundtrip() {
        let event = OpEvent::new(OpKind::NetAdd).field("name", "42");
        let line = event.to_line();
        assert_eq!(line, "NET_ADD name=\"42\"");
        // The quoted form survives the roundtrip as a string.
        let parsed = OpEvent::from_line(&line).unwrap();
        assert_eq!(parsed.get("name"), Some(&Value::Str("42".to_string())));
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let parsed = OpLog::from_plaintext("# header\n\nNET_ADD name=VCC\n").unwrap();
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].kind, OpKind::NetAdd);
    }
}
