//! Content objects owned by the remote service.
//!
//! Only the handful of properties the tree layer needs are typed here; the
//! rest of an asset travels as an opaque JSON property bag so that a commit
//! can send back exactly what was read.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property holding the structured-data payload
pub const STRUCTURED_DATA: &str = "structuredData";

/// Property holding plain xhtml content
pub const XHTML: &str = "xhtml";

/// Kind of asset a reference node can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Page,
    File,
    Block,
    Symlink,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Page,
        AssetKind::File,
        AssetKind::Block,
        AssetKind::Symlink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Page => "page",
            AssetKind::File => "file",
            AssetKind::Block => "block",
            AssetKind::Symlink => "symlink",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset chooser kind declared by a reference field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Page,
    File,
    Block,
    Symlink,
    /// Page, file, or symlink
    Linkable,
}

impl ReferenceKind {
    /// Whether an asset of `kind` may be chosen by this chooser
    pub fn accepts(&self, kind: AssetKind) -> bool {
        match self {
            ReferenceKind::Page => kind == AssetKind::Page,
            ReferenceKind::File => kind == AssetKind::File,
            ReferenceKind::Block => kind == AssetKind::Block,
            ReferenceKind::Symlink => kind == AssetKind::Symlink,
            ReferenceKind::Linkable => matches!(
                kind,
                AssetKind::Page | AssetKind::File | AssetKind::Symlink
            ),
        }
    }

    /// Value of the `assetType` wire property
    pub fn wire_name(&self) -> &'static str {
        match self {
            ReferenceKind::Page => "page",
            ReferenceKind::File => "file",
            ReferenceKind::Block => "block",
            ReferenceKind::Symlink => "symlink",
            ReferenceKind::Linkable => "page,file,symlink",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name.trim() {
            "page" => Some(ReferenceKind::Page),
            "file" => Some(ReferenceKind::File),
            "block" => Some(ReferenceKind::Block),
            "symlink" => Some(ReferenceKind::Symlink),
            "page,file,symlink" | "linkable" => Some(ReferenceKind::Linkable),
            _ => None,
        }
    }
}

impl From<AssetKind> for ReferenceKind {
    fn from(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Page => ReferenceKind::Page,
            AssetKind::File => ReferenceKind::File,
            AssetKind::Block => ReferenceKind::Block,
            AssetKind::Symlink => ReferenceKind::Symlink,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Content objects that can own a structured-data tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Content page
    Page,
    /// Data-definition block
    Block,
}

impl ContentType {
    /// Type segment used by the read URL
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Page => "page",
            ContentType::Block => "block",
        }
    }

    /// Property name the service wraps the asset in
    pub fn type_key(&self) -> &'static str {
        match self {
            ContentType::Page => "page",
            ContentType::Block => "xhtmlDataDefinitionBlock",
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(ContentType::Page),
            "block" | "xhtmlDataDefinitionBlock" => Ok(ContentType::Block),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

/// Identity of a content object on the service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    pub kind: ContentType,
    pub id: String,
}

impl AssetRef {
    pub fn new(kind: ContentType, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn page(id: impl Into<String>) -> Self {
        Self::new(ContentType::Page, id)
    }

    pub fn block(id: impl Into<String>) -> Self {
        Self::new(ContentType::Block, id)
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Full property bag of an asset as the service returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Wrapper key the service uses for this asset type
    pub type_key: String,

    /// Asset properties
    pub properties: Map<String, Value>,
}

impl AssetRecord {
    pub fn new(type_key: impl Into<String>, properties: Map<String, Value>) -> Self {
        Self {
            type_key: type_key.into(),
            properties,
        }
    }

    /// Structured-data payload, if the asset has one
    pub fn structured_data(&self) -> Option<&Value> {
        self.properties
            .get(STRUCTURED_DATA)
            .filter(|value| !value.is_null())
    }

    /// Plain xhtml content, if any
    pub fn xhtml(&self) -> Option<&str> {
        self.properties.get(XHTML).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }

    pub fn path(&self) -> Option<&str> {
        self.properties.get("path").and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.properties.get("id").and_then(Value::as_str)
    }

    /// Copy of this record with one property replaced
    pub fn with_property(&self, key: &str, value: Value) -> Self {
        let mut properties = self.properties.clone();
        properties.insert(key.to_string(), value);
        Self {
            type_key: self.type_key.clone(),
            properties,
        }
    }
}
