//! Path table derived from a [`Schema`] description.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use super::{ObjectShape, Schema, Shape, ValueKind};
use crate::jsonptr;

/// One segment of a schema path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum Segment {
    Key(String),
    /// Any element of a sequence or map.
    Wildcard,
}

impl Segment {
    fn render(path: &[Self]) -> String {
        path.iter().fold(String::new(), |mut acc, seg| {
            acc.push('/');
            match seg {
                Self::Key(key) => acc.push_str(&jsonptr::escape(key)),
                Self::Wildcard => acc.push('*'),
            }
            acc
        })
    }
}

/// What a table entry describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// A value that is never recursed into.
    Leaf(ValueKind),
    /// A nested struct.
    Object,
    /// A sequence of structs.
    Sequence,
    /// A map of structs.
    Map,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(kind) => kind.fmt(f),
            Self::Object => f.write_str("object"),
            Self::Sequence => f.write_str("sequence"),
            Self::Map => f.write_str("map"),
        }
    }
}

/// Metadata for one field reachable from the schema root.
#[derive(Clone, Debug)]
pub struct FieldEntry {
    pub(super) data: Vec<Segment>,
    pub(super) structure: Vec<Segment>,
    data_path: String,
    struct_path: String,
    rust_path: String,
    kind: EntryKind,
    sensitive: bool,
    env: Option<String>,
    remapped: bool,
}

impl FieldEntry {
    /// Where the value lives in layer data, with `*` for wildcards.
    #[must_use]
    pub fn data_path(&self) -> &str {
        &self.data_path
    }

    /// Where serde expects the value when decoding.
    #[must_use]
    pub fn struct_path(&self) -> &str {
        &self.struct_path
    }

    /// Dotted Rust field path such as `servers[*].host`.
    #[must_use]
    pub fn rust_path(&self) -> &str {
        &self.rust_path
    }

    /// Kind of the entry.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Whether the field is marked sensitive.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Environment variable bound to the field.
    #[must_use]
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// Whether the data path differs from the struct path.
    #[must_use]
    pub const fn is_remapped(&self) -> bool {
        self.remapped
    }

    /// Whether the data path contains a wildcard segment.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.data.contains(&Segment::Wildcard)
    }
}

#[derive(Debug, Default)]
struct Node {
    children: BTreeMap<String, Node>,
    wildcard: Option<Box<Node>>,
    entry: Option<usize>,
}

impl Node {
    fn child(&self, key: &str) -> Option<&Self> {
        self.children
            .get(key)
            .or_else(|| self.wildcard.as_deref())
    }

    fn child_mut(&mut self, seg: &Segment) -> &mut Self {
        match seg {
            Segment::Key(key) => self.children.entry(key.clone()).or_default(),
            Segment::Wildcard => self.wildcard.get_or_insert_with(Box::default),
        }
    }
}

/// Index from JSON Pointer paths to schema field metadata.
///
/// Built once per configuration type and shared read-only afterwards.
/// Paths are matched against data paths: an exact key is preferred over
/// a wildcard at the same level.
#[derive(Debug, Default)]
pub struct PathTable {
    pub(super) entries: Vec<FieldEntry>,
    root: Node,
}

impl PathTable {
    /// Build the table for `T`.
    #[must_use]
    pub fn build<T: Schema + ?Sized>() -> Self {
        let mut builder = Builder::default();
        if let Shape::Object(object) = T::shape() {
            builder.stack.push(object.type_name);
            builder.visit_object(&object, &Scope::default());
        }
        let mut table = Self {
            entries: builder.entries,
            root: Node::default(),
        };
        for (idx, entry) in table.entries.iter().enumerate() {
            let mut node = &mut table.root;
            for seg in &entry.data {
                node = node.child_mut(seg);
            }
            if let Some(first) = node.entry.replace(idx).and_then(|prev| table.entries.get(prev)) {
                warn!(
                    path = %entry.data_path,
                    first = %first.rust_path,
                    second = %entry.rust_path,
                    "two fields map to the same data path"
                );
            }
        }
        table
    }

    /// All entries in schema declaration order.
    #[must_use]
    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    /// Returns `true` when the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry whose data path matches `path` exactly.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&FieldEntry> {
        self.route(path)
            .last()
            .filter(|(depth, _)| *depth == segment_count(path))
            .map(|(_, entry)| *entry)
    }

    /// Whether `path` holds sensitive data.
    ///
    /// True when the nearest schema leaf at or above `path` is marked
    /// sensitive.
    #[must_use]
    pub fn is_sensitive(&self, path: &str) -> bool {
        self.route(path)
            .iter()
            .any(|(_, entry)| matches!(entry.kind, EntryKind::Leaf(_)) && entry.sensitive)
    }

    /// Whether any schema field is marked sensitive.
    #[must_use]
    pub fn has_sensitive(&self) -> bool {
        self.entries.iter().any(|entry| entry.sensitive)
    }

    /// Entries bound to environment variables.
    ///
    /// Fields below sequences or maps are skipped since their position is
    /// not fixed.
    pub fn env_bindings(&self) -> impl Iterator<Item = &FieldEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.env.is_some() && !entry.has_wildcard())
    }

    /// Entries matched along `path`, paired with the depth of each match.
    fn route(&self, path: &str) -> Vec<(usize, &FieldEntry)> {
        let Ok(keys) = jsonptr::parse(path) else {
            return Vec::new();
        };
        let mut matched = Vec::new();
        let mut node = &self.root;
        for (depth, key) in keys.iter().enumerate() {
            let Some(next) = node.child(key) else {
                break;
            };
            node = next;
            if let Some(entry) = node.entry.and_then(|idx| self.entries.get(idx)) {
                matched.push((depth + 1, entry));
            }
        }
        matched
    }
}

fn segment_count(path: &str) -> usize {
    path.matches('/').count()
}

impl fmt::Display for PathTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "{} -> {} ({})", entry.rust_path, entry.data_path, entry.kind)?;
            if entry.remapped {
                write!(f, " decodes at {}", entry.struct_path)?;
            }
            if entry.sensitive {
                f.write_str(" [sensitive]")?;
            }
            if let Some(env) = &entry.env {
                write!(f, " env={env}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Traversal position while walking shapes.
#[derive(Clone, Default)]
struct Scope {
    data: Vec<Segment>,
    structure: Vec<Segment>,
    rust: String,
}

impl Scope {
    fn field(&self, key: &str, rust_name: &str, remap: Option<&str>) -> Self {
        let mut structure = self.structure.clone();
        structure.push(Segment::Key(key.to_owned()));
        let data = match remap.and_then(|path| resolve_remap(&self.data, path)) {
            Some(data) => data,
            None => {
                let mut data = self.data.clone();
                data.push(Segment::Key(key.to_owned()));
                data
            }
        };
        let rust = if self.rust.is_empty() {
            rust_name.to_owned()
        } else {
            format!("{}.{rust_name}", self.rust)
        };
        Self {
            data,
            structure,
            rust,
        }
    }

    fn element(&self) -> Self {
        let mut next = self.clone();
        next.data.push(Segment::Wildcard);
        next.structure.push(Segment::Wildcard);
        next.rust.push_str("[*]");
        next
    }
}

/// Resolve a path override against the parent's data path.
fn resolve_remap(parent: &[Segment], path: &str) -> Option<Vec<Segment>> {
    let (mut base, rest) = match path.strip_prefix('/') {
        Some(rest) => (Vec::new(), rest),
        None => (parent.to_vec(), path.strip_prefix("./").unwrap_or(path)),
    };
    for raw in rest.split('/').filter(|seg| !seg.is_empty()) {
        match jsonptr::unescape(raw) {
            Ok(key) => base.push(Segment::Key(key)),
            Err(err) => {
                warn!(path, error = %err, "ignoring malformed field path override");
                return None;
            }
        }
    }
    Some(base)
}

#[derive(Default)]
struct Builder {
    entries: Vec<FieldEntry>,
    stack: Vec<&'static str>,
}

impl Builder {
    fn visit_object(&mut self, object: &ObjectShape, scope: &Scope) {
        for field in &object.fields {
            let shape = field.shape();
            if field.is_flattened() {
                if let Shape::Object(inner) = &shape {
                    self.guarded(inner, scope);
                    continue;
                }
            }
            let next = scope.field(field.key(), field.rust_name(), field.path());
            let leaf_kind = match &shape {
                Shape::Leaf(kind) => Some(*kind),
                Shape::Object(inner) if self.stack.contains(&inner.type_name) => {
                    Some(ValueKind::Any)
                }
                Shape::Sequence(_) if !shape.is_structured() => Some(ValueKind::Array),
                Shape::Map(_) if !shape.is_structured() => Some(ValueKind::Map),
                _ => None,
            };
            if let Some(kind) = leaf_kind {
                self.push(&next, EntryKind::Leaf(kind), field.is_sensitive(), field.env());
                continue;
            }
            let kind = match &shape {
                Shape::Sequence(_) => EntryKind::Sequence,
                Shape::Map(_) => EntryKind::Map,
                _ => EntryKind::Object,
            };
            if field.is_sensitive() {
                warn!(
                    field = %next.rust,
                    "sensitive marker on a structured field is ignored; mark its leaves instead"
                );
            }
            self.push(&next, kind, false, field.env());
            match shape {
                Shape::Object(inner) => self.guarded(&inner, &next),
                Shape::Sequence(inner) | Shape::Map(inner) => {
                    self.visit_element(&inner(), &next.element());
                }
                Shape::Leaf(_) => {}
            }
        }
    }

    fn visit_element(&mut self, shape: &Shape, scope: &Scope) {
        match shape {
            Shape::Object(inner) => self.guarded(inner, scope),
            Shape::Sequence(inner) | Shape::Map(inner) => {
                self.visit_element(&inner(), &scope.element());
            }
            Shape::Leaf(_) => {}
        }
    }

    fn guarded(&mut self, object: &ObjectShape, scope: &Scope) {
        if self.stack.contains(&object.type_name) {
            return;
        }
        self.stack.push(object.type_name);
        self.visit_object(object, scope);
        self.stack.pop();
    }

    fn push(&mut self, scope: &Scope, kind: EntryKind, sensitive: bool, env: Option<&str>) {
        self.entries.push(FieldEntry {
            data_path: Segment::render(&scope.data),
            struct_path: Segment::render(&scope.structure),
            remapped: scope.data != scope.structure,
            data: scope.data.clone(),
            structure: scope.structure.clone(),
            rust_path: scope.rust.clone(),
            kind,
            sensitive,
            env: env.map(str::to_owned),
        });
    }
}
