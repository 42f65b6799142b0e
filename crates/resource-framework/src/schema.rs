//! # Schema Documents
//!
//! The registry is populated from a JSON document produced out-of-band from
//! the resource descriptions of a pack:
//!
//! ```json
//! {
//!   "resources": {
//!     "os.packages": { "list_type": true, "fields": { "list": { "type": "[]package" } } },
//!     "packages":    { "name": "os.packages" }
//!   }
//! }
//! ```
//!
//! An entry whose `name` differs from its key is an alias of the class named
//! by `name`. Empty `id` and `name` are filled in from the key.

use crate::error::Result;
use crate::value::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mandatory: bool,
    pub private: bool,
    pub implicit_resource: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, field_type: &str) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::parse(field_type),
            ..Self::default()
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceInfo {
    pub id: String,
    pub name: String,
    pub title: String,
    pub desc: String,
    pub min_version: String,
    pub private: bool,
    pub list_type: bool,
    pub fields: BTreeMap<String, FieldInfo>,
}

impl ResourceInfo {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    /// An alias entry for the class `target`.
    pub fn alias(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: target.into(),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn list_type(mut self) -> Self {
        self.list_type = true;
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Whether this entry names a different class than its own id.
    pub fn is_alias(&self) -> bool {
        !self.name.is_empty() && self.name != self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDocument {
    pub resources: BTreeMap<String, ResourceInfo>,
}

impl SchemaDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut doc: SchemaDocument = serde_json::from_str(json)?;
        for (key, info) in doc.resources.iter_mut() {
            if info.id.is_empty() {
                info.id = key.clone();
            }
            if info.name.is_empty() {
                info.name = key.clone();
            }
            for (name, field) in info.fields.iter_mut() {
                if field.name.is_empty() {
                    field.name = name.clone();
                }
            }
        }
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_ids_and_names_from_keys() {
        let doc = SchemaDocument::from_json(
            r#"{
                "resources": {
                    "file": { "fields": { "path": { "type": "string", "mandatory": true } } },
                    "files": { "name": "file" }
                }
            }"#,
        )
        .unwrap();

        let file = &doc.resources["file"];
        assert_eq!(file.id, "file");
        assert!(!file.is_alias());
        assert_eq!(file.fields["path"].name, "path");
        assert_eq!(file.fields["path"].field_type, FieldType::String);
        assert!(file.fields["path"].mandatory);

        assert!(doc.resources["files"].is_alias());
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = SchemaDocument::from_json("{ \"resources\": [] }").unwrap_err();
        assert!(matches!(err, crate::FrameworkError::Schema(_)));
    }
}
