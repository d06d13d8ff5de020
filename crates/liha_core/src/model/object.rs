//! Object document model.
//!
//! # Responsibility
//! - Define the canonical canvas document (`ObjectInstance`) and its placed
//!   blocks (`ContentItem`).
//! - Provide the two structural edits used by the layout reconciler:
//!   `insert` and `resync`.
//!
//! # Invariants
//! - Every key in `contents` equals the `id` of its item.
//! - Edits never mutate the receiver; they return a new value that shares
//!   untouched items with the previous one.
//! - `version` is bumped only when an edit changes at least one field.
//! - A zero `w`/`h` reported by layout means "unspecified" and becomes
//!   `DEFAULT_SPAN`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Default grid span for new blocks and for zero spans reported by layout.
pub const DEFAULT_SPAN: u32 = 12;

/// Stable identifier of one canvas document.
pub type ObjectId = String;

/// Identifier of one content block, unique within its owning object.
pub type ContentId = String;

/// Block type tag selecting renderer behavior.
///
/// Only `Text` is rendered today; every other tag is kept verbatim so
/// documents written by newer builds survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentKind {
    Text,
    Other(String),
}

impl ContentKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Other(tag) => tag.as_str(),
        }
    }
}

impl From<String> for ContentKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "text" => Self::Text,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for ContentKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ContentKind> for String {
    fn from(value: ContentKind) -> Self {
        match value {
            ContentKind::Text => "text".to_string(),
            ContentKind::Other(tag) => tag,
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grid cell position and span of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Placement {
    /// Returns a copy with zero spans replaced by `DEFAULT_SPAN`.
    pub fn normalized(self) -> Self {
        Self {
            w: normalize_span(self.w),
            h: normalize_span(self.h),
            ..self
        }
    }
}

/// One placed block on the canvas grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    /// Serialized as `type` to match the stored document shape.
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Renderer-defined payload, opaque to the core.
    #[serde(default)]
    pub content: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl ContentItem {
    /// Creates an empty block at `(x, y)` with the default 12x12 span.
    pub fn new(id: impl Into<ContentId>, kind: impl Into<ContentKind>, x: u32, y: u32) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            content: String::new(),
            x,
            y,
            w: DEFAULT_SPAN,
            h: DEFAULT_SPAN,
        }
    }

    pub fn placement(&self) -> Placement {
        Placement {
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
        }
    }

    fn set_placement(&mut self, placement: Placement) {
        self.x = placement.x;
        self.y = placement.y;
        self.w = placement.w;
        self.h = placement.h;
    }
}

/// One positional entry of a layout-change frame.
///
/// `key` is the content id; the grid collaborator calls it `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    #[serde(alias = "i")]
    pub key: ContentId,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl LayoutEntry {
    pub fn new(key: impl Into<ContentId>, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            key: key.into(),
            x,
            y,
            w,
            h,
        }
    }

    fn placement(&self) -> Placement {
        Placement {
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
        }
        .normalized()
    }
}

/// Structural edit failures. Both indicate programmer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    DuplicateId(ContentId),
    KeyMismatch { key: ContentId, id: ContentId },
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId(id) => write!(f, "content id already exists: {id}"),
            Self::KeyMismatch { key, id } => {
                write!(f, "content key `{key}` does not match item id `{id}`")
            }
        }
    }
}

impl Error for DocumentError {}

/// One canvas document.
///
/// Cloning is cheap: items are reference counted and shared between
/// versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ObjectInstanceWire")]
pub struct ObjectInstance {
    pub id: ObjectId,
    contents: BTreeMap<ContentId, Arc<ContentItem>>,
    /// Local edit counter; not part of the stored shape.
    #[serde(skip)]
    version: u64,
}

// Equality is structural; `version` only tracks edit lineage.
impl PartialEq for ObjectInstance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.contents == other.contents
    }
}

impl Eq for ObjectInstance {}

impl ObjectInstance {
    /// Creates an empty document.
    pub fn new(id: impl Into<ObjectId>) -> Self {
        Self {
            id: id.into(),
            contents: BTreeMap::new(),
            version: 0,
        }
    }

    /// Builds a document from items, keyed by their ids.
    ///
    /// # Errors
    /// - `DuplicateId` when two items share an id.
    pub fn with_items(
        id: impl Into<ObjectId>,
        items: impl IntoIterator<Item = ContentItem>,
    ) -> Result<Self, DocumentError> {
        let mut object = Self::new(id);
        for item in items {
            if object.contents.contains_key(&item.id) {
                return Err(DocumentError::DuplicateId(item.id));
            }
            object.contents.insert(item.id.clone(), Arc::new(item));
        }
        Ok(object)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns whether `other` is this exact edit of the same lineage.
    pub fn is_same_version(&self, other: &Self) -> bool {
        self.id == other.id && self.version == other.version
    }

    pub fn contents(&self) -> &BTreeMap<ContentId, Arc<ContentItem>> {
        &self.contents
    }

    pub fn get(&self, id: &str) -> Option<&ContentItem> {
        self.contents.get(id).map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Items in visual order: top to bottom, then left to right.
    pub fn ordered_items(&self) -> Vec<&ContentItem> {
        let mut items: Vec<&ContentItem> = self.contents.values().map(Arc::as_ref).collect();
        items.sort_by(|a, b| (a.y, a.x, &a.id).cmp(&(b.y, b.x, &b.id)));
        items
    }

    /// Returns a new document with `item` added.
    ///
    /// # Errors
    /// - `DuplicateId` when an item with the same id already exists.
    pub fn insert(&self, item: ContentItem) -> Result<Self, DocumentError> {
        if self.contents.contains_key(&item.id) {
            return Err(DocumentError::DuplicateId(item.id));
        }

        let mut contents = self.contents.clone();
        contents.insert(item.id.clone(), Arc::new(item));
        Ok(Self {
            id: self.id.clone(),
            contents,
            version: self.version + 1,
        })
    }

    /// Merges a layout frame into item positions.
    ///
    /// Keys missing from the frame are left untouched; the layout engine
    /// does not report items outside the viewport. Frame entries for unknown
    /// keys are ignored, and a key listed twice takes its last entry. When
    /// no item ends up differing from the receiver the returned value keeps
    /// the receiver's version, which callers use to skip persistence.
    pub fn resync(&self, frame: &[LayoutEntry]) -> Self {
        let latest: BTreeMap<&str, Placement> = frame
            .iter()
            .map(|entry| (entry.key.as_str(), entry.placement()))
            .collect();

        let mut contents = self.contents.clone();
        let mut changed = false;
        for (key, placement) in latest {
            let Some(item) = contents.get_mut(key) else {
                continue;
            };
            if item.placement() == placement {
                continue;
            }
            Arc::make_mut(item).set_placement(placement);
            changed = true;
        }

        if !changed {
            return self.clone();
        }

        Self {
            id: self.id.clone(),
            contents,
            version: self.version + 1,
        }
    }

    /// Checks that every key equals its item's id.
    pub fn validate(&self) -> Result<(), DocumentError> {
        for (key, item) in &self.contents {
            if key != &item.id {
                return Err(DocumentError::KeyMismatch {
                    key: key.clone(),
                    id: item.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ObjectInstanceWire {
    id: ObjectId,
    #[serde(default)]
    contents: Option<BTreeMap<ContentId, ContentItem>>,
}

impl TryFrom<ObjectInstanceWire> for ObjectInstance {
    type Error = DocumentError;

    fn try_from(wire: ObjectInstanceWire) -> Result<Self, Self::Error> {
        let contents = wire
            .contents
            .unwrap_or_default()
            .into_iter()
            .map(|(key, mut item)| {
                // Stored documents may carry zero spans from older layouts.
                item.w = normalize_span(item.w);
                item.h = normalize_span(item.h);
                (key, Arc::new(item))
            })
            .collect();
        let object = Self {
            id: wire.id,
            contents,
            version: 0,
        };
        object.validate()?;
        Ok(object)
    }
}

fn normalize_span(value: u32) -> u32 {
    if value == 0 {
        DEFAULT_SPAN
    } else {
        value
    }
}
