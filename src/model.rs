//! Note shapes on both sides of the bridge.
//!
//! Source notes follow the graph export layout (pages holding a block tree,
//! blocks addressed by `uid`). Sink notes are flat: a title, a plain-text body,
//! tags and a notebook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier assigned by Source (pages and blocks share one namespace)
pub type SourceId = String;

/// Identifier assigned by Sink
pub type SinkId = String;

// =============================================================================
// Source side
// =============================================================================

/// A block in a page's content tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub uid: SourceId,

    #[serde(default)]
    pub string: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,

    /// Ids this block references (pages or blocks), resolved from its text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<SourceId>,
}

/// A Source page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceNote {
    pub uid: SourceId,

    pub title: String,

    #[serde(default)]
    pub children: Vec<Block>,

    /// Pages referenced from anywhere in this page's block tree
    #[serde(default, rename = "page-refs", skip_serializing_if = "BTreeSet::is_empty")]
    pub page_refs: BTreeSet<SourceId>,

    #[serde(default, rename = "edit-time", skip_serializing_if = "Option::is_none")]
    pub edit_time: Option<i64>,
}

impl SourceNote {
    /// Depth-first, pre-order walk over every block of the page.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Whether any block on this page references `uid`.
    pub fn references(&self, uid: &str) -> bool {
        self.page_refs.contains(uid) || self.blocks().any(|b| b.refs.iter().any(|r| r == uid))
    }
}

/// Iterator returned by [`SourceNote::blocks`]
pub struct Blocks<'a> {
    stack: Vec<&'a Block>,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.stack.pop()?;
        self.stack.extend(block.children.iter().rev());
        Some(block)
    }
}

/// Block content headed into Source. `uid` pins an existing block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<SourceId>,

    #[serde(default)]
    pub string: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BlockDraft>,
}

impl BlockDraft {
    pub fn text(string: impl Into<String>) -> Self {
        Self {
            uid: None,
            string: string.into(),
            children: Vec::new(),
        }
    }
}

/// Page content headed into Source, shaped like an export page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,

    #[serde(default)]
    pub children: Vec<BlockDraft>,
}

/// One item of a merge payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportItem {
    /// Content with no Source identity yet. Source assigns the uid.
    Create {
        draft: NoteDraft,
        /// Sink note this came from, if any
        origin: Option<SinkId>,
    },
    /// Content replacing an existing Source page
    Update {
        uid: SourceId,
        draft: NoteDraft,
        origin: Option<SinkId>,
    },
}

impl ImportItem {
    pub fn draft(&self) -> &NoteDraft {
        match self {
            ImportItem::Create { draft, .. } | ImportItem::Update { draft, .. } => draft,
        }
    }

    pub fn origin(&self) -> Option<&SinkId> {
        match self {
            ImportItem::Create { origin, .. } | ImportItem::Update { origin, .. } => {
                origin.as_ref()
            }
        }
    }
}

/// Source's answer to an import call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReceipt {
    /// Batch index of each `Create` item -> uid Source confirmed for it
    pub confirmed: BTreeMap<usize, SourceId>,

    /// Pages newly created
    pub created: usize,

    /// Pages updated (explicit updates and creates matched by title)
    pub updated: usize,
}

impl MergeReceipt {
    pub fn confirmed_id(&self, index: usize) -> Option<&SourceId> {
        self.confirmed.get(&index)
    }
}

/// Point-in-time export of Source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub graph: String,
    pub notes: Vec<SourceNote>,
    pub exported_at: DateTime<Utc>,
}

// =============================================================================
// Sink side
// =============================================================================

/// A Sink note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkNote {
    pub id: SinkId,
    pub title: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub notebook: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SinkNote {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Adds `tag` unless present. Returns whether the note changed.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if self.has_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }
}

/// A Sink note before Sink has assigned it an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSinkNote {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub notebook: String,
    pub source_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(uid: &str, string: &str, children: Vec<Block>) -> Block {
        Block {
            uid: uid.to_string(),
            string: string.to_string(),
            children,
            refs: Vec::new(),
        }
    }

    #[test]
    fn test_blocks_walk_is_preorder() {
        let note = SourceNote {
            uid: "p1".to_string(),
            title: "Page".to_string(),
            children: vec![
                block("a", "a", vec![block("a1", "a1", vec![]), block("a2", "a2", vec![])]),
                block("b", "b", vec![]),
            ],
            page_refs: BTreeSet::new(),
            edit_time: None,
        };

        let order: Vec<&str> = note.blocks().map(|b| b.uid.as_str()).collect();
        assert_eq!(order, vec!["a", "a1", "a2", "b"]);
    }

    #[test]
    fn test_add_tag_is_idempotent() {
        let mut note = SinkNote {
            id: "s1".to_string(),
            title: "Inbox".to_string(),
            body: String::new(),
            tags: vec![],
            notebook: "RoamImport".to_string(),
            source_url: None,
            updated_at: None,
        };

        assert!(note.add_tag("RoamImported"));
        assert!(!note.add_tag("RoamImported"));
        assert_eq!(note.tags, vec!["RoamImported".to_string()]);
    }

    #[test]
    fn test_source_note_reads_export_layout() {
        let json = r#"{
            "uid": "p1",
            "title": "Reading list",
            "edit-time": 1700000000000,
            "children": [{"uid": "b1", "string": "see [[Books]]", "refs": ["p2"]}]
        }"#;
        let note: SourceNote = serde_json::from_str(json).unwrap();
        assert_eq!(note.edit_time, Some(1700000000000));
        assert!(note.references("p2"));
        assert!(!note.references("p3"));
    }
}
