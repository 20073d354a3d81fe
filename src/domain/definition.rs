//! Schema model for structured data.
//!
//! A [`DataDefinition`] describes which fields a structured-data tree may
//! contain: groups (pure containers), text fields of various subtypes, and
//! asset-chooser references. Definitions are immutable once loaded and are
//! shared between every tree decoded against them.
//!
//! Definitions are written in YAML (or JSON):
//!
//! ```yaml
//! id: "a1b2c3"
//! path: "/_internal/definitions/news"
//! fields:
//!   - name: title
//!     type: text
//!   - name: multiple-first
//!     type: group
//!     multiple: true
//!     fields:
//!       - name: body
//!         type: text
//!         text_type: wysiwyg
//!   - name: color
//!     type: text
//!     text_type: dropdown
//!     values: [red, green]
//!   - name: link
//!     type: asset
//!     asset_type: linkable
//! ```

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::asset::ReferenceKind;
use super::identifier::{validate_name, Identifier, IdentifierError, Segment};

/// Errors raised while loading or validating a definition
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Invalid field name: {0}")]
    InvalidName(#[from] IdentifierError),

    #[error("Duplicate field '{path}'")]
    DuplicateField { path: String },

    #[error("Field '{path}' declares legal values but is not an enumerated text field")]
    ValuesOnNonEnumerated { path: String },

    #[error("Field '{path}' declares child fields but is not a group")]
    ChildrenOnNonGroup { path: String },

    #[error("Field '{name}' of type {field_type} is missing '{missing}'")]
    MissingAttribute {
        name: String,
        field_type: &'static str,
        missing: &'static str,
    },

    #[error("Failed to parse definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Failed to read definition file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Subtype of a text field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextKind {
    #[default]
    Plain,
    MultiLine,
    /// Rich text
    Wysiwyg,
    /// Epoch milliseconds
    Datetime,
    /// `MM-DD-YYYY`
    Calendar,
    Dropdown,
    Radio,
    Checkbox,
    MultiSelector,
}

/// Item prefix of checkbox values
pub const CHECKBOX_PREFIX: &str = "::CONTENT-XML-CHECKBOX::";

/// Item prefix of multi-selector values
pub const SELECTOR_PREFIX: &str = "::CONTENT-XML-SELECTOR::";

impl TextKind {
    /// Value is chosen from a fixed set
    pub fn is_enumerated(&self) -> bool {
        matches!(
            self,
            TextKind::Dropdown | TextKind::Radio | TextKind::Checkbox | TextKind::MultiSelector
        )
    }

    /// Value holds several selected items
    pub fn is_multi_valued(&self) -> bool {
        self.item_prefix().is_some()
    }

    /// Prefix each selected item carries in a multi-valued text
    pub fn item_prefix(&self) -> Option<&'static str> {
        match self {
            TextKind::Checkbox => Some(CHECKBOX_PREFIX),
            TextKind::MultiSelector => Some(SELECTOR_PREFIX),
            _ => None,
        }
    }

    /// Split a stored value into its selected items.
    ///
    /// Single-valued kinds yield the value itself (or nothing when empty).
    pub fn split_items<'a>(&self, value: &'a str) -> Vec<&'a str> {
        match self.item_prefix() {
            Some(prefix) => value.split(prefix).filter(|item| !item.is_empty()).collect(),
            None if value.is_empty() => Vec::new(),
            None => vec![value],
        }
    }

    /// Inverse of [`TextKind::split_items`]
    pub fn join_items<S: AsRef<str>>(&self, items: &[S]) -> String {
        match self.item_prefix() {
            Some(prefix) => items
                .iter()
                .map(|item| format!("{}{}", prefix, item.as_ref()))
                .collect(),
            None => items
                .first()
                .map(|item| item.as_ref().to_string())
                .unwrap_or_default(),
        }
    }
}

/// What a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Group,
    Text(TextKind),
    Reference(ReferenceKind),
}

impl FieldKind {
    pub fn is_group(&self) -> bool {
        matches!(self, FieldKind::Group)
    }
}

/// One field of a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FieldSpec", into = "FieldSpec")]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub repeatable: bool,
    /// Legal values of an enumerated text field
    pub legal_values: Option<BTreeSet<String>>,
    pub label: Option<String>,
    /// Seed value for newly synthesized instances
    pub default: Option<String>,
    pub required: bool,
    /// Child fields of a group
    pub fields: Vec<SchemaField>,
}

impl SchemaField {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            repeatable: false,
            legal_values: None,
            label: None,
            default: None,
            required: false,
            fields: Vec::new(),
        }
    }

    /// Group field containing `fields`
    pub fn group(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        let mut field = Self::with_kind(name, FieldKind::Group);
        field.fields = fields;
        field
    }

    /// Text field of the given subtype
    pub fn text(name: impl Into<String>, kind: TextKind) -> Self {
        Self::with_kind(name, FieldKind::Text(kind))
    }

    /// Asset chooser
    pub fn reference(name: impl Into<String>, kind: ReferenceKind) -> Self {
        Self::with_kind(name, FieldKind::Reference(kind))
    }

    /// Mark the field repeatable
    pub fn multiple(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legal_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Direct child field by name
    pub fn child(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `value` is acceptable. Fields without a constraint accept anything,
    /// and the empty value is always acceptable.
    pub fn allows_value(&self, value: &str) -> bool {
        match (&self.kind, &self.legal_values) {
            (FieldKind::Text(kind), Some(legal)) => kind
                .split_items(value)
                .iter()
                .all(|item| legal.contains(*item)),
            _ => true,
        }
    }

    fn validate(&self, path: &str) -> Result<(), DefinitionError> {
        validate_name(&self.name)?;

        match self.kind {
            FieldKind::Group => {}
            _ if !self.fields.is_empty() => {
                return Err(DefinitionError::ChildrenOnNonGroup {
                    path: path.to_string(),
                })
            }
            _ => {}
        }

        if self.legal_values.is_some() {
            let enumerated = matches!(self.kind, FieldKind::Text(kind) if kind.is_enumerated());
            if !enumerated {
                return Err(DefinitionError::ValuesOnNonEnumerated {
                    path: path.to_string(),
                });
            }
        }

        validate_siblings(&self.fields, Some(path))
    }
}

fn validate_siblings(fields: &[SchemaField], parent: Option<&str>) -> Result<(), DefinitionError> {
    let mut seen = HashSet::new();
    for field in fields {
        let path = match parent {
            Some(parent) => format!("{};{}", parent, field.name),
            None => field.name.clone(),
        };
        if !seen.insert(field.name.as_str()) {
            return Err(DefinitionError::DuplicateField { path });
        }
        field.validate(&path)?;
    }
    Ok(())
}

/// `type` attribute of a serialized field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FieldType {
    Group,
    Text,
    Asset,
}

/// Serialized form of a [`SchemaField`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldSpec {
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text_type: Option<TextKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asset_type: Option<ReferenceKind>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<SchemaField>,
}

impl TryFrom<FieldSpec> for SchemaField {
    type Error = DefinitionError;

    fn try_from(spec: FieldSpec) -> Result<Self, Self::Error> {
        let kind = match spec.field_type {
            FieldType::Group => FieldKind::Group,
            FieldType::Text => FieldKind::Text(spec.text_type.unwrap_or_default()),
            FieldType::Asset => {
                let kind = spec.asset_type.ok_or_else(|| DefinitionError::MissingAttribute {
                    name: spec.name.clone(),
                    field_type: "asset",
                    missing: "asset_type",
                })?;
                FieldKind::Reference(kind)
            }
        };

        let field = SchemaField {
            name: spec.name,
            kind,
            repeatable: spec.multiple,
            legal_values: spec.values.map(|values| values.into_iter().collect()),
            label: spec.label,
            default: spec.default,
            required: spec.required,
            fields: spec.fields,
        };
        field.validate(&field.name)?;
        Ok(field)
    }
}

impl From<SchemaField> for FieldSpec {
    fn from(field: SchemaField) -> Self {
        let (field_type, text_type, asset_type) = match field.kind {
            FieldKind::Group => (FieldType::Group, None, None),
            FieldKind::Text(TextKind::Plain) => (FieldType::Text, None, None),
            FieldKind::Text(kind) => (FieldType::Text, Some(kind), None),
            FieldKind::Reference(kind) => (FieldType::Asset, None, Some(kind)),
        };
        FieldSpec {
            name: field.name,
            field_type,
            text_type,
            asset_type,
            multiple: field.repeatable,
            values: field.legal_values.map(|values| values.into_iter().collect()),
            label: field.label,
            default: field.default,
            required: field.required,
            fields: field.fields,
        }
    }
}

/// Serialized form of a [`DataDefinition`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DefinitionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    fields: Vec<SchemaField>,
}

/// A complete schema for structured data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DefinitionSpec", into = "DefinitionSpec")]
pub struct DataDefinition {
    id: Option<String>,
    path: Option<String>,
    name: Option<String>,
    fields: Vec<SchemaField>,
}

impl TryFrom<DefinitionSpec> for DataDefinition {
    type Error = DefinitionError;

    fn try_from(spec: DefinitionSpec) -> Result<Self, Self::Error> {
        let mut definition = DataDefinition::new(spec.id, spec.path, spec.fields)?;
        definition.name = spec.name;
        Ok(definition)
    }
}

impl From<DataDefinition> for DefinitionSpec {
    fn from(definition: DataDefinition) -> Self {
        DefinitionSpec {
            id: definition.id,
            path: definition.path,
            name: definition.name,
            fields: definition.fields,
        }
    }
}

impl DataDefinition {
    /// Build and validate a definition
    pub fn new(
        id: Option<String>,
        path: Option<String>,
        fields: Vec<SchemaField>,
    ) -> Result<Self, DefinitionError> {
        validate_siblings(&fields, None)?;
        Ok(Self {
            id,
            path,
            name: None,
            fields,
        })
    }

    /// Parse a definition from YAML (or JSON) text
    pub fn from_yaml(content: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a definition file
    pub fn from_file(path: &Path) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Lookup key: the id when present, else the path
    pub fn key(&self) -> Option<&str> {
        self.id().or_else(|| self.path())
    }

    /// Top-level fields
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Field at a name path (sibling indices already stripped)
    pub fn field(&self, path: &[&str]) -> Option<&SchemaField> {
        let (first, rest) = path.split_first()?;
        let mut field = self.fields.iter().find(|f| f.name == *first)?;
        for name in rest {
            field = field.child(name)?;
        }
        Some(field)
    }

    /// Field owning the node an identifier addresses
    pub fn field_for(&self, identifier: &Identifier) -> Option<&SchemaField> {
        self.field(&identifier.field_path())
    }

    /// Identifier of the first instance of every field, pre-order
    pub fn identifiers(&self) -> Vec<Identifier> {
        let mut out = Vec::new();
        collect_identifiers(&self.fields, None, &mut out);
        out
    }
}

fn collect_identifiers(fields: &[SchemaField], parent: Option<&Identifier>, out: &mut Vec<Identifier>) {
    for field in fields {
        let segment = if field.repeatable {
            Segment::indexed(field.name.clone(), 0)
        } else {
            Segment::field(field.name.clone())
        };
        // Names were validated when the definition was built
        let Ok(segment) = segment else { continue };
        let id = match parent {
            Some(parent) => parent.child(segment),
            None => Identifier::root(segment),
        };
        out.push(id.clone());
        collect_identifiers(&field.fields, Some(&id), out);
    }
}
