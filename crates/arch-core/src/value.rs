use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::ArchJson;

const DEFAULT_SCHEMA: &str = "arch";
const DEFAULT_VERSION: u32 = 1;

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_version() -> u32 {
    DEFAULT_VERSION
}

/// Versioned on-disk envelope around an exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub root: ArchJson,
}

impl ArchValue {
    pub fn from_root(root: ArchJson) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            root,
        }
    }

    pub fn into_root(self) -> ArchJson {
        self.root
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    #[test]
    fn missing_envelope_fields_use_defaults() {
        let value = ArchValue::from_json_str(
            r#"{ "root": { "type": "fragment", "children": [{ "type": "text", "nodeValue": "hi" }] } }"#,
        )
        .unwrap();
        assert_eq!(value.schema, "arch");
        assert_eq!(value.version, 1);
        assert_eq!(value.root.node_type, NodeType::Fragment);
        assert_eq!(value.root.children()[0].node_value.as_deref(), Some("hi"));
    }
}
