//! The global binding table.
//!
//! An [`Environment`] maps names to entries. Every entry owns a one-element
//! array cell; compiled code writes top-level definitions through that cell,
//! and `var` bindings are read and written through it at run time.

use std::collections::HashMap;
use std::sync::Arc;

use sable_foundation::Value;

/// Whether a global binding may be reassigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Immutable definition.
    Def,
    /// Mutable variable.
    Var,
}

/// Metadata attached to a global binding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryMeta {
    /// Documentation string.
    pub doc: Option<String>,
    /// The value is a macro.
    pub is_macro: bool,
    /// Using the binding raises a lint.
    pub deprecated: bool,
    /// Other keyword flags, without colons.
    pub flags: Vec<String>,
    /// Key/value pairs from a metadata struct.
    pub extra: Vec<(Value, Value)>,
}

impl EntryMeta {
    /// Records a keyword flag, recognizing `:macro` and `:deprecated`.
    pub fn add_flag(&mut self, flag: &str) {
        match flag {
            "macro" => self.is_macro = true,
            "deprecated" => self.deprecated = true,
            _ => {}
        }
        if !self.flags.iter().any(|f| f == flag) {
            self.flags.push(flag.to_string());
        }
    }

    /// Merges a metadata struct: `:doc`, `:macro` and `:deprecated` are
    /// recognized, everything else is kept in `extra`.
    pub fn merge_pairs(&mut self, pairs: Vec<(Value, Value)>) {
        for (key, value) in pairs {
            match (key.as_keyword(), &value) {
                (Some("doc"), Value::String(doc)) => self.doc = Some(doc.to_string()),
                (Some(flag @ ("macro" | "deprecated")), v) if v.is_truthy() => self.add_flag(flag),
                _ => self.extra.push((key, value)),
            }
        }
    }
}

/// A global binding.
#[derive(Clone, Debug)]
pub struct Entry {
    /// Def or var.
    pub kind: EntryKind,
    /// One-element array holding the current value.
    pub cell: Value,
    /// Metadata.
    pub meta: EntryMeta,
}

impl Entry {
    /// Creates an entry whose cell holds `value`.
    #[must_use]
    pub fn new(kind: EntryKind, value: Value) -> Self {
        Self {
            kind,
            cell: Value::array(vec![value]),
            meta: EntryMeta::default(),
        }
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: EntryMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Returns the value currently in the cell.
    #[must_use]
    pub fn value(&self) -> Value {
        match &self.cell {
            Value::Array(cell) => cell.borrow().first().cloned().unwrap_or(Value::Nil),
            _ => Value::Nil,
        }
    }
}

/// Result of looking a name up in the environment.
#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    /// No entry.
    None,
    /// Immutable value.
    Def(Value),
    /// Mutable variable; the payload is the reference cell.
    Var(Value),
    /// Macro bound with `def`; the payload is the expander.
    Macro(Value),
    /// Macro bound with `var`; the payload is the reference cell.
    DynamicMacro(Value),
}

/// Global binding table passed by reference to the compiler.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    entries: HashMap<Arc<str>, Entry>,
    missing_symbol: Option<Value>,
}

impl Environment {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, name: &str, entry: Entry) {
        self.entries.insert(name.into(), entry);
    }

    /// Defines an immutable binding.
    pub fn def(&mut self, name: &str, value: impl Into<Value>) {
        self.insert(name, Entry::new(EntryKind::Def, value.into()));
    }

    /// Defines a mutable binding.
    pub fn var(&mut self, name: &str, value: impl Into<Value>) {
        self.insert(name, Entry::new(EntryKind::Var, value.into()));
    }

    /// Defines a macro.
    pub fn def_macro(&mut self, name: &str, expander: Value) {
        let mut meta = EntryMeta::default();
        meta.add_flag("macro");
        self.insert(name, Entry::new(EntryKind::Def, expander).with_meta(meta));
    }

    /// Returns the entry for `name`.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Returns the current value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entry(name).map(Entry::value)
    }

    /// Classifies the binding for `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Binding {
        let Some(entry) = self.entry(name) else {
            return Binding::None;
        };
        match (entry.kind, entry.meta.is_macro) {
            (EntryKind::Def, false) => Binding::Def(entry.value()),
            (EntryKind::Def, true) => Binding::Macro(entry.value()),
            (EntryKind::Var, false) => Binding::Var(entry.cell.clone()),
            (EntryKind::Var, true) => Binding::DynamicMacro(entry.cell.clone()),
        }
    }

    /// Installs a handler called with a symbol when a name has no entry.
    /// It returns nil for "unknown", or a value to bind as a def.
    pub fn set_missing_symbol(&mut self, handler: Value) {
        self.missing_symbol = Some(handler);
    }

    /// Returns the missing-symbol handler.
    #[must_use]
    pub const fn missing_symbol(&self) -> Option<&Value> {
        self.missing_symbol.as_ref()
    }

    /// Returns all bound names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(AsRef::as_ref).collect();
        names.sort_unstable();
        names
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_kinds() {
        let mut env = Environment::new();
        env.def("x", 1);
        env.var("y", 2);
        env.def_macro("m", Value::Nil);

        assert_eq!(env.resolve("x"), Binding::Def(Value::Int(1)));
        assert!(matches!(env.resolve("y"), Binding::Var(Value::Array(_))));
        assert!(matches!(env.resolve("m"), Binding::Macro(_)));
        assert_eq!(env.resolve("nope"), Binding::None);
    }

    #[test]
    fn var_cell_is_shared() {
        let mut env = Environment::new();
        env.var("v", 0);
        let Binding::Var(Value::Array(cell)) = env.resolve("v") else {
            panic!("expected var");
        };
        cell.borrow_mut()[0] = Value::Int(9);
        assert_eq!(env.get("v"), Some(Value::Int(9)));
    }

    #[test]
    fn meta_flags() {
        let mut meta = EntryMeta::default();
        meta.add_flag("deprecated");
        meta.add_flag("private");
        meta.merge_pairs(vec![
            (Value::keyword("doc"), Value::from("docs")),
            (Value::keyword("line"), Value::Int(3)),
        ]);
        assert!(meta.deprecated);
        assert!(!meta.is_macro);
        assert_eq!(meta.doc.as_deref(), Some("docs"));
        assert_eq!(meta.flags, vec!["deprecated", "private"]);
        assert_eq!(meta.extra.len(), 1);
    }

    #[test]
    fn names_are_sorted() {
        let mut env = Environment::new();
        env.def("b", 1);
        env.def("a", 1);
        assert_eq!(env.names(), vec!["a", "b"]);
        assert_eq!(env.len(), 2);
    }
}
