//! Indentation-driven reader for the YAML subset used by network-config
//! documents.
//!
//! Only block mappings, block sequences, flow sequences of scalars and
//! plain or quoted scalars are understood. Anything else is skipped, so the
//! caller has to validate the fields it relies on.

use std::fmt;

use serde_yaml::{Mapping, Value};

/// A parsed document node. Scalars are never coerced to numbers or
/// booleans; the consumer decides how to read them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Scalar(String),
    Mapping(Vec<(String, Node)>),
    Sequence(Vec<Node>),
}

impl Node {
    /// Looks up `key` if this node is a mapping.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mapping(&self) -> Option<&[(String, Node)]> {
        match self {
            Node::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Converts the tree into a `serde_yaml` value, keeping mapping order.
    #[must_use]
    pub fn to_yaml(&self) -> Value {
        match self {
            Node::Scalar(s) => Value::String(s.clone()),
            Node::Mapping(entries) => Value::Mapping(
                entries
                    .iter()
                    .map(|(k, v)| (Value::String(k.clone()), v.to_yaml()))
                    .collect::<Mapping>(),
            ),
            Node::Sequence(items) => Value::Sequence(items.iter().map(Node::to_yaml).collect()),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(s) = serde_yaml::to_string(&self.to_yaml()) {
            write!(f, "{s}")
        } else {
            Ok(())
        }
    }
}

const ROOT: usize = 0;

enum Slot {
    Scalar(String),
    // A container does not know whether it is a mapping or a sequence until
    // the whole document has been read.
    Container {
        entries: Vec<(String, usize)>,
        items: Vec<usize>,
    },
}

struct TreeBuilder {
    slots: Vec<Slot>,
}

impl TreeBuilder {
    fn new() -> Self {
        TreeBuilder {
            slots: vec![Slot::Container {
                entries: Vec::new(),
                items: Vec::new(),
            }],
        }
    }

    fn container(&mut self) -> usize {
        self.slots.push(Slot::Container {
            entries: Vec::new(),
            items: Vec::new(),
        });
        self.slots.len() - 1
    }

    fn scalar(&mut self, s: &str) -> usize {
        self.slots.push(Slot::Scalar(s.to_string()));
        self.slots.len() - 1
    }

    // Reads a value written after `key:` or `-`.
    fn value(&mut self, raw: &str) -> usize {
        let raw = strip_comment(raw);
        if raw == "{}" {
            return self.container();
        }
        if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let seq = self.container();
            for part in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let item = self.scalar(unquote(part));
                self.append(seq, item);
            }
            return seq;
        }
        self.scalar(unquote(raw))
    }

    fn insert(&mut self, parent: usize, key: &str, child: usize) {
        if let Slot::Container { entries, .. } = &mut self.slots[parent] {
            if let Some(entry) = entries.iter_mut().find(|(k, _)| k == key) {
                entry.1 = child;
            } else {
                entries.push((key.to_string(), child));
            }
        }
    }

    fn append(&mut self, parent: usize, child: usize) {
        if let Slot::Container { items, .. } = &mut self.slots[parent] {
            items.push(child);
        }
    }

    fn finish(&mut self, idx: usize) -> Node {
        match std::mem::replace(&mut self.slots[idx], Slot::Scalar(String::new())) {
            Slot::Scalar(s) => Node::Scalar(s),
            Slot::Container { entries, items } if entries.is_empty() && !items.is_empty() => {
                Node::Sequence(items.into_iter().map(|i| self.finish(i)).collect())
            }
            Slot::Container { entries, items } => {
                if !items.is_empty() {
                    tracing::debug!(
                        count = items.len(),
                        "dropping list items mixed into a mapping"
                    );
                }
                Node::Mapping(
                    entries
                        .into_iter()
                        .map(|(k, i)| (k, self.finish(i)))
                        .collect(),
                )
            }
        }
    }
}

struct Frame {
    slot: usize,
    // `None` for the document root.
    indent: Option<usize>,
    list_item: bool,
}

/// Parses `text` into a node tree. Never fails: lines that match none of
/// the supported forms are skipped.
#[must_use]
pub fn parse(text: &str) -> Node {
    let mut tree = TreeBuilder::new();
    let mut stack = vec![Frame {
        slot: ROOT,
        indent: None,
        list_item: false,
    }];

    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');
        let content = line.trim_start();
        if content.trim_end().is_empty() || content.starts_with('#') {
            continue;
        }
        let content = content.trim_end();
        let indent = line.chars().take_while(|c| c.is_whitespace()).count();
        let item = list_item(content);

        // A sequence may sit at the same column as the key that owns it.
        stack.truncate(
            stack
                .iter()
                .rposition(|f| match f.indent {
                    None => true,
                    Some(i) if item.is_some() => i < indent || (i == indent && !f.list_item),
                    Some(i) => i < indent,
                })
                .map_or(1, |p| p + 1),
        );
        let parent = stack.last().map_or(ROOT, |f| f.slot);

        if let Some((rest, gap)) = item {
            match split_entry(rest) {
                Some((key, value)) => {
                    let entry = tree.container();
                    tree.append(parent, entry);
                    stack.push(Frame {
                        slot: entry,
                        indent: Some(indent),
                        list_item: true,
                    });
                    if let Some(value) = value {
                        let child = tree.value(value);
                        tree.insert(entry, key, child);
                    } else {
                        let child = tree.container();
                        tree.insert(entry, key, child);
                        stack.push(Frame {
                            slot: child,
                            indent: Some(indent + 1 + gap),
                            list_item: false,
                        });
                    }
                }
                None if rest.is_empty() => {
                    let entry = tree.container();
                    tree.append(parent, entry);
                    stack.push(Frame {
                        slot: entry,
                        indent: Some(indent),
                        list_item: true,
                    });
                }
                None => {
                    let child = tree.value(rest);
                    tree.append(parent, child);
                }
            }
        } else if let Some((key, value)) = split_entry(content) {
            if let Some(value) = value {
                let child = tree.value(value);
                tree.insert(parent, key, child);
            } else {
                let child = tree.container();
                tree.insert(parent, key, child);
                stack.push(Frame {
                    slot: child,
                    indent: Some(indent),
                    list_item: false,
                });
            }
        } else {
            tracing::trace!(line = content, "skipping unrecognized line");
        }
    }

    tree.finish(ROOT)
}

// Returns the text after a leading "-" and the width of the whitespace gap
// that followed it.
fn list_item(content: &str) -> Option<(&str, usize)> {
    let rest = content.strip_prefix('-')?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let trimmed = rest.trim_start();
    let gap = rest[..rest.len() - trimmed.len()].chars().count();
    Some((trimmed, gap))
}

// Splits `key: value` at the first colon followed by whitespace or the end
// of the line. Colons inside values such as IPv6 literals are kept.
fn split_entry(content: &str) -> Option<(&str, Option<&str>)> {
    let search_from = quoted_prefix_len(content);
    let bytes = content.as_bytes();
    let colon = content[search_from..]
        .char_indices()
        .map(|(i, c)| (i + search_from, c))
        .find(|&(i, c)| {
            c == ':'
                && bytes
                    .get(i + 1)
                    .is_none_or(|next| next.is_ascii_whitespace())
        })
        .map(|(i, _)| i)?;

    let key = unquote(content[..colon].trim());
    if key.is_empty() {
        return None;
    }
    let value = content[colon + 1..].trim();
    let value = (!value.is_empty() && !value.starts_with('#')).then_some(value);
    Some((key, value))
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

// Length of a leading quoted span, including both quotes.
fn quoted_prefix_len(s: &str) -> usize {
    match s.chars().next() {
        Some(q @ ('"' | '\'')) => s[1..].find(q).map_or(0, |end| end + 2),
        _ => 0,
    }
}

fn strip_comment(s: &str) -> &str {
    let start = quoted_prefix_len(s);
    s[start..]
        .find(" #")
        .map_or(s, |i| s[..start + i].trim_end())
}
