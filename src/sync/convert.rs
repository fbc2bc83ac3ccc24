//! Content conversion between Sink bodies and Source block trees.
//!
//! Sink bodies are plain text. Each non-empty line is one block; two spaces
//! (or one tab) of indentation nest a line under the one above, and a leading
//! `- ` / `* ` bullet is dropped. Rendering goes the other way and always
//! emits bullets, so a body survives a round trip once normalised.

use crate::model::{Block, BlockDraft};

const INDENT: &str = "  ";

/// Split a Sink body into a block tree.
pub fn body_to_blocks(body: &str) -> Vec<BlockDraft> {
    let mut roots: Vec<BlockDraft> = Vec::new();
    // Open ancestors of the current line, innermost last
    let mut stack: Vec<(usize, BlockDraft)> = Vec::new();

    for line in body.lines() {
        let content = line.trim_start();
        if content.trim().is_empty() {
            continue;
        }

        let level = indent_level(&line[..line.len() - content.len()]);
        let text = strip_bullet(content.trim_end());

        while let Some((top_level, _)) = stack.last() {
            if *top_level < level {
                break;
            }
            if let Some((_, done)) = stack.pop() {
                attach(&mut stack, &mut roots, done);
            }
        }
        stack.push((level, BlockDraft::text(text)));
    }

    while let Some((_, done)) = stack.pop() {
        attach(&mut stack, &mut roots, done);
    }
    roots
}

/// Render a block tree as an indented bullet list.
pub fn blocks_to_body(blocks: &[Block]) -> String {
    let mut lines = Vec::new();
    render(blocks, 0, &mut lines);
    lines.join("\n")
}

fn render(blocks: &[Block], depth: usize, out: &mut Vec<String>) {
    for block in blocks {
        // Multi-line blocks would re-split into siblings on the way back
        let text = block.string.lines().collect::<Vec<_>>().join(" ");
        out.push(format!("{}- {}", INDENT.repeat(depth), text));
        render(&block.children, depth + 1, out);
    }
}

fn attach(stack: &mut [(usize, BlockDraft)], roots: &mut Vec<BlockDraft>, block: BlockDraft) {
    match stack.last_mut() {
        Some((_, parent)) => parent.children.push(block),
        None => roots.push(block),
    }
}

fn indent_level(prefix: &str) -> usize {
    let mut spaces = 0;
    for c in prefix.chars() {
        match c {
            '\t' => spaces += INDENT.len(),
            _ => spaces += 1,
        }
    }
    spaces / INDENT.len()
}

fn strip_bullet(text: &str) -> &str {
    text.strip_prefix("- ")
        .or_else(|| text.strip_prefix("* "))
        .unwrap_or(text)
}
