//! Typed model of one Dockerfile-producing build script entry.
//!
//! In YAML a script entry is either a plain string, emitted verbatim:
//!
//! ```yaml
//! - RUN make
//! ```
//!
//! or a single-key mapping whose key is the instruction and whose value is
//! rendered into Dockerfile literal syntax:
//!
//! ```yaml
//! - cmd: [./server, --port, 8080]   # CMD ["./server","--port","8080"]
//! - env: { PATH: /opt/bin }         # ENV PATH="/opt/bin"
//! - import: compiler                # copy the files exported by `compiler`
//! ```

use crate::error::LayercakeError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A scalar or composite value attached to an instruction key.
///
/// Closed set of shapes a YAML value may take; each renders to the
/// Dockerfile literal form expected after the instruction keyword.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScriptValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ScriptValue>),
    Map(BTreeMap<String, ScriptValue>),
}

impl ScriptValue {
    /// Renders the value as it appears after the instruction keyword.
    ///
    /// Lists become JSON arrays of quoted strings (`["a","b"]`), maps become
    /// space-joined `key="value"` pairs in key order.
    pub fn render(&self) -> String {
        match self {
            ScriptValue::Boolean(b) => b.to_string(),
            ScriptValue::Integer(i) => i.to_string(),
            ScriptValue::Float(f) => f.to_string(),
            ScriptValue::String(s) => s.clone(),
            ScriptValue::List(items) => {
                let quoted: Vec<String> = items.iter().map(|v| quote(&v.render())).collect();
                format!("[{}]", quoted.join(","))
            }
            ScriptValue::Map(entries) => entries
                .iter()
                .map(|(k, v)| format!("{}={}", k, quote(&v.render())))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn quote(s: &str) -> String {
    // JSON string escaping matches what the Dockerfile parser accepts in exec form
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

/// One line (or import) of an image's build script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ScriptEntry")]
pub enum BuildScript {
    /// A literal Dockerfile line.
    Raw(String),
    /// An upper-cased instruction keyword with its pre-rendered value.
    Instruction { instruction: String, value: String },
    /// Copy the files exported by another declared image.
    Import(String),
}

impl BuildScript {
    pub fn instruction(instruction: &str, value: &str) -> Self {
        BuildScript::Instruction {
            instruction: instruction.to_uppercase(),
            value: value.to_string(),
        }
    }

    /// Name of the imported image, if this entry is an import.
    pub fn import_name(&self) -> Option<&str> {
        match self {
            BuildScript::Import(name) => Some(name),
            _ => None,
        }
    }
}

/// Wire shape of a script entry before validation.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptEntry {
    Line(String),
    Keyed(BTreeMap<String, ScriptValue>),
}

impl TryFrom<ScriptEntry> for BuildScript {
    type Error = LayercakeError;

    fn try_from(entry: ScriptEntry) -> Result<Self, Self::Error> {
        let map = match entry {
            ScriptEntry::Line(line) => return Ok(BuildScript::Raw(line)),
            ScriptEntry::Keyed(map) => map,
        };

        if map.len() != 1 {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            return Err(LayercakeError::MalformedScript(format!(
                "expected exactly one instruction per entry, got [{}]",
                keys.join(", ")
            )));
        }

        let (key, value) = map.into_iter().next().ok_or_else(|| {
            LayercakeError::MalformedScript("empty script entry".to_string())
        })?;
        let instruction = key.to_uppercase();

        if instruction == "IMPORT" {
            return match value {
                ScriptValue::String(name) if !name.is_empty() => Ok(BuildScript::Import(name)),
                other => Err(LayercakeError::MalformedScript(format!(
                    "import expects an image name, got {:?}",
                    other
                ))),
            };
        }

        Ok(BuildScript::Instruction {
            instruction,
            value: value.render(),
        })
    }
}
