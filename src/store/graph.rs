//! In-memory page graph with backlink-preserving merge.
//!
//! References live in block text: `[[Title]]`, `#Tag`, `#[[Tag]]` point at
//! pages, `((uid))` at blocks. After every merge the `refs` / `page_refs`
//! fields are recomputed from text, so they always describe what resolves.
//!
//! Merge rules:
//! - an update keeps the page uid and the uid of any block it names again;
//! - a block that something else references survives an update even when
//!   the new content drops it (it is re-attached at the end of the page);
//! - renaming a page rewrites `[[Old]]` / `#Old` everywhere to the new title;
//! - a create whose title already exists appends its new blocks to that page.

use crate::model::{Block, BlockDraft, ImportItem, MergeReceipt, NoteDraft, SourceId, SourceNote};
use anyhow::{bail, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

fn block_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\(([A-Za-z0-9_-]+)\)\)").expect("valid block ref pattern"))
}

fn page_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]]+)\]\]").expect("valid page ref pattern"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)#([\w/-]+)").expect("valid tag pattern"))
}

/// Page titles referenced by `text`
pub fn page_titles(text: &str) -> Vec<String> {
    let mut titles: Vec<String> = page_ref_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    titles.extend(tag_re().captures_iter(text).map(|c| c[1].to_string()));
    titles
}

/// Block uids referenced by `text`
pub fn block_uids(text: &str) -> Vec<String> {
    block_ref_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Page graph
#[derive(Debug, Clone, Default)]
pub struct Graph {
    notes: Vec<SourceNote>,
}

impl Graph {
    pub fn new(notes: Vec<SourceNote>) -> Self {
        let mut graph = Self { notes };
        graph.reindex();
        graph
    }

    pub fn notes(&self) -> &[SourceNote] {
        &self.notes
    }

    pub fn note(&self, uid: &str) -> Option<&SourceNote> {
        self.notes.iter().find(|n| n.uid == uid)
    }

    pub fn note_by_title(&self, title: &str) -> Option<&SourceNote> {
        self.notes.iter().find(|n| n.title == title)
    }

    /// Apply a payload. `next_uid` mints fresh ids; collisions are retried.
    pub fn merge<F>(&mut self, batch: &[ImportItem], mut next_uid: F) -> Result<MergeReceipt>
    where
        F: FnMut() -> SourceId,
    {
        let mut receipt = MergeReceipt::default();
        let now = chrono::Utc::now().timestamp_millis();

        for (index, item) in batch.iter().enumerate() {
            let draft = item.draft();
            if draft.title.trim().is_empty() {
                bail!("payload item {} has an empty title", index);
            }

            let uid = match item {
                ImportItem::Update { uid, .. } => match self.position(uid) {
                    Some(pos) => {
                        self.replace_content(pos, draft, &mut next_uid);
                        receipt.updated += 1;
                        uid.clone()
                    }
                    // Page was deleted in Source since it was linked
                    None => self.create_or_append(draft, &mut next_uid, &mut receipt),
                },
                ImportItem::Create { .. } => {
                    self.create_or_append(draft, &mut next_uid, &mut receipt)
                }
            };

            if let Some(pos) = self.position(&uid) {
                self.notes[pos].edit_time = Some(now);
            }
            receipt.confirmed.insert(index, uid);
        }

        self.reindex();
        Ok(receipt)
    }

    fn position(&self, uid: &str) -> Option<usize> {
        self.notes.iter().position(|n| n.uid == uid)
    }

    fn create_or_append<F>(
        &mut self,
        draft: &NoteDraft,
        next_uid: &mut F,
        receipt: &mut MergeReceipt,
    ) -> SourceId
    where
        F: FnMut() -> SourceId,
    {
        if let Some(pos) = self.notes.iter().position(|n| n.title == draft.title) {
            self.append_content(pos, draft, next_uid);
            receipt.updated += 1;
            return self.notes[pos].uid.clone();
        }

        let mut taken = self.all_uids();
        let uid = fresh_uid(&mut taken, next_uid);
        let children = build_blocks(&draft.children, &mut taken, next_uid);
        self.notes.push(SourceNote {
            uid: uid.clone(),
            title: draft.title.clone(),
            children,
            page_refs: BTreeSet::new(),
            edit_time: None,
        });
        receipt.created += 1;
        uid
    }

    /// Add the draft's top-level blocks that the page does not already hold.
    fn append_content<F>(&mut self, pos: usize, draft: &NoteDraft, next_uid: &mut F)
    where
        F: FnMut() -> SourceId,
    {
        let existing: HashSet<String> = self.notes[pos]
            .children
            .iter()
            .map(|b| b.string.clone())
            .collect();
        let fresh: Vec<BlockDraft> = draft
            .children
            .iter()
            .filter(|d| !existing.contains(&d.string))
            .cloned()
            .collect();

        let mut taken = self.all_uids();
        let blocks = build_blocks(&fresh, &mut taken, next_uid);
        self.notes[pos].children.extend(blocks);
    }

    fn replace_content<F>(&mut self, pos: usize, draft: &NoteDraft, next_uid: &mut F)
    where
        F: FnMut() -> SourceId,
    {
        let old_title = self.notes[pos].title.clone();
        let own: Vec<Block> = self.notes[pos]
            .blocks()
            .map(|b| Block {
                uid: b.uid.clone(),
                string: b.string.clone(),
                children: Vec::new(),
                refs: Vec::new(),
            })
            .collect();
        let own_uids: HashSet<&str> = own.iter().map(|b| b.uid.as_str()).collect();

        // Everything pointed at from outside this page, or from the new content.
        // Read from text: `refs` is stale until the batch is reindexed.
        let mut referenced: HashSet<String> = self
            .notes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .flat_map(|(_, n)| n.blocks().flat_map(|b| block_uids(&b.string)))
            .collect();
        collect_draft_refs(&draft.children, &mut referenced);

        let mut taken: HashSet<String> = self
            .all_uids()
            .into_iter()
            .filter(|uid| !own_uids.contains(uid.as_str()))
            .collect();
        let mut children = build_blocks(&draft.children, &mut taken, next_uid);

        for block in own {
            if referenced.contains(&block.uid) && !taken.contains(&block.uid) {
                taken.insert(block.uid.clone());
                children.push(block);
            }
        }

        let note = &mut self.notes[pos];
        note.title = draft.title.clone();
        note.children = children;

        if old_title != draft.title {
            self.rename_references(&old_title, &draft.title);
        }
    }

    /// Point every textual reference to `old` at `new`.
    fn rename_references(&mut self, old: &str, new: &str) {
        let bracketed_old = format!("[[{}]]", old);
        let bracketed_new = format!("[[{}]]", new);
        let tag_new = if new.chars().any(char::is_whitespace) {
            format!("#{}", bracketed_new)
        } else {
            format!("#{}", new)
        };

        for note in &mut self.notes {
            rewrite_blocks(&mut note.children, &mut |text: &str| {
                let out = text.replace(&bracketed_old, &bracketed_new);
                // Only whole tags: `#Old/sub` names another page
                tag_re()
                    .replace_all(&out, |c: &regex::Captures| {
                        let whole = &c[0];
                        if &c[1] == old {
                            let lead = &whole[..whole.len() - c[1].len() - 1];
                            format!("{}{}", lead, tag_new)
                        } else {
                            whole.to_string()
                        }
                    })
                    .into_owned()
            });
        }
    }

    fn all_uids(&self) -> HashSet<String> {
        let mut uids = HashSet::new();
        for note in &self.notes {
            uids.insert(note.uid.clone());
            uids.extend(note.blocks().map(|b| b.uid.clone()));
        }
        uids
    }

    /// Recompute `refs` and `page_refs` from block text.
    fn reindex(&mut self) {
        let by_title: HashMap<String, SourceId> = self
            .notes
            .iter()
            .map(|n| (n.title.clone(), n.uid.clone()))
            .collect();
        let mut block_owner: HashMap<SourceId, SourceId> = HashMap::new();
        for note in &self.notes {
            for block in note.blocks() {
                block_owner.insert(block.uid.clone(), note.uid.clone());
            }
        }

        for note in &mut self.notes {
            let mut page_refs = BTreeSet::new();
            resolve_refs(
                &mut note.children,
                &note.uid,
                &by_title,
                &block_owner,
                &mut page_refs,
            );
            note.page_refs = page_refs;
        }
    }
}

fn fresh_uid<F>(taken: &mut HashSet<String>, next_uid: &mut F) -> SourceId
where
    F: FnMut() -> SourceId,
{
    loop {
        let uid = next_uid();
        if taken.insert(uid.clone()) {
            return uid;
        }
    }
}

fn build_blocks<F>(drafts: &[BlockDraft], taken: &mut HashSet<String>, next_uid: &mut F) -> Vec<Block>
where
    F: FnMut() -> SourceId,
{
    let mut blocks = Vec::with_capacity(drafts.len());
    for draft in drafts {
        // A pinned uid is honoured unless another block already owns it
        let uid = match &draft.uid {
            Some(uid) if !uid.is_empty() && taken.insert(uid.clone()) => uid.clone(),
            _ => fresh_uid(taken, next_uid),
        };
        blocks.push(Block {
            uid,
            string: draft.string.clone(),
            children: build_blocks(&draft.children, taken, next_uid),
            refs: Vec::new(),
        });
    }
    blocks
}

fn collect_draft_refs(drafts: &[BlockDraft], out: &mut HashSet<String>) {
    for draft in drafts {
        out.extend(block_uids(&draft.string));
        collect_draft_refs(&draft.children, out);
    }
}

fn rewrite_blocks(blocks: &mut [Block], rewrite: &mut dyn FnMut(&str) -> String) {
    for block in blocks {
        block.string = rewrite(&block.string);
        rewrite_blocks(&mut block.children, rewrite);
    }
}

fn resolve_refs(
    blocks: &mut [Block],
    page_uid: &str,
    by_title: &HashMap<String, SourceId>,
    block_owner: &HashMap<SourceId, SourceId>,
    page_refs: &mut BTreeSet<SourceId>,
) {
    for block in blocks {
        let mut refs: Vec<SourceId> = Vec::new();

        for title in page_titles(&block.string) {
            if let Some(uid) = by_title.get(&title) {
                if !refs.contains(uid) {
                    refs.push(uid.clone());
                }
                if uid != page_uid {
                    page_refs.insert(uid.clone());
                }
            }
        }
        for uid in block_uids(&block.string) {
            if let Some(owner) = block_owner.get(&uid) {
                if !refs.contains(&uid) {
                    refs.push(uid.clone());
                }
                if owner != page_uid {
                    page_refs.insert(owner.clone());
                }
            }
        }

        block.refs = refs;
        resolve_refs(&mut block.children, page_uid, by_title, block_owner, page_refs);
    }
}
