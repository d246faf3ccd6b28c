//! Content fingerprints for categories and groups.
//!
//! A checksum covers a node and all of its descendants. Children are sorted
//! by id before hashing so that the order in which a remote store (or the
//! local database) happens to return them never changes the result.
//! Timestamps are deliberately left out: only content is fingerprinted.
//!
//! Nodes without an id hash with an empty id. Every field is written with
//! its byte length in front, so no field content can move a boundary.

use sha2::{Digest, Sha256};

use crate::models::{Category, Group, Item, ItemKind};

const FIELD_SEP: char = '\u{1f}';

/// SHA-256 hex digest over a category, its groups and their items.
pub fn category_checksum(category: &Category) -> String {
    let mut blocks: Vec<(&str, Vec<String>)> = category
        .groups
        .iter()
        .map(|group| {
            let mut block = Vec::with_capacity(group.items.len() + 1);
            push_group(&mut block, group);
            (group.id_or_empty(), block)
        })
        .collect();
    blocks.sort();

    let mut lines = vec![category_line(category)];
    for (_, block) in blocks {
        lines.extend(block);
    }

    digest(&lines)
}

/// SHA-256 hex digest over a group and its items.
pub fn group_checksum(group: &Group) -> String {
    let mut lines = Vec::with_capacity(group.items.len() + 1);
    push_group(&mut lines, group);
    digest(&lines)
}

fn push_group(lines: &mut Vec<String>, group: &Group) {
    lines.push(group_line(group));

    let mut items: Vec<String> = group.items.iter().map(item_line).collect();
    // Lines are fully determined by content, so sorting them fixes the order.
    items.sort();
    lines.extend(items);
}

fn digest(lines: &[String]) -> String {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn join(fields: &[&str]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEP);
        }
        out.push_str(&field.len().to_string());
        out.push(':');
        out.push_str(field);
    }
    out
}

fn category_line(category: &Category) -> String {
    join(&[
        "category",
        category.id_or_empty(),
        &category.name,
        &category.description,
    ])
}

fn group_line(group: &Group) -> String {
    let limit = group
        .difficulty_or_time_limit
        .map(|v| v.to_string())
        .unwrap_or_default();
    join(&["group", group.id_or_empty(), &group.name, &group.description, &limit])
}

fn item_line(item: &Item) -> String {
    let time_limit = item
        .time_limit_seconds
        .map(|v| v.to_string())
        .unwrap_or_default();
    let case_sensitive = if item.case_sensitive { "1" } else { "0" };

    let variant = match &item.kind {
        ItemKind::Word {
            letter_position,
            target_letter,
        } => join(&[&letter_position.to_string(), target_letter]),
        ItemKind::CategoryAnswer { answer_bank } => {
            // BTreeSet iterates in sorted order already.
            let answers: Vec<&str> = answer_bank.iter().map(String::as_str).collect();
            join(&answers)
        }
    };

    join(&[
        "item",
        item.id_or_empty(),
        &item.name,
        &item.description,
        &item.instructions,
        &time_limit,
        case_sensitive,
        item.kind.tag(),
        &variant,
    ])
}
