use serde_json::Map;
use serde_json::Value;
use tracing::debug;

/// Repository metadata stored as the repository node's value.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryStat {
    /// Value decoded from a `{...}` JSON object
    Object(Map<String, Value>),
    /// Anything else, kept verbatim
    Raw(String),
}

impl RepositoryStat {
    /// Decodes a remote value.
    ///
    /// Values wrapped in braces are decoded as JSON objects; when that fails the
    /// raw text is kept instead.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.len() > 2 && trimmed.starts_with('{') && trimmed.ends_with('}') {
            match serde_json::from_str::<Map<String, Value>>(trimmed) {
                Ok(object) => return RepositoryStat::Object(object),
                Err(e) => {
                    debug!("stat looks like an object but does not decode: {:?}", e);
                }
            }
        }
        RepositoryStat::Raw(raw.to_string())
    }

    /// Absent or empty node values carry no stat.
    pub fn parse_optional(raw: Option<&str>) -> Option<Self> {
        match raw {
            Some(v) if !v.is_empty() => Some(Self::parse(v)),
            _ => None,
        }
    }

    /// Encoding written to the repository node.
    pub fn to_wire(&self) -> String {
        match self {
            RepositoryStat::Object(object) => Value::Object(object.clone()).to_string(),
            RepositoryStat::Raw(raw) => raw.clone(),
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            RepositoryStat::Object(object) => Some(object),
            RepositoryStat::Raw(_) => None,
        }
    }
}

impl From<Value> for RepositoryStat {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(object) => RepositoryStat::Object(object),
            Value::String(raw) => RepositoryStat::Raw(raw),
            other => RepositoryStat::Raw(other.to_string()),
        }
    }
}
