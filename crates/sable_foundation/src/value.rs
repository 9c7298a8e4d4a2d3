//! Core value type for all Sable data.
//!
//! Source code is data: the reader produces `Value`s and the compiler consumes
//! them. Tuples and structs are immutable and compare structurally. Arrays,
//! tables and buffers are mutable and compare by identity, as do functions.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use im::{OrdMap, Vector};

use crate::funcdef::FuncDef;
use crate::span::Span;

/// A register frame shared between a running call and the closures it creates.
pub type Frame = Rc<RefCell<Vec<Value>>>;

/// Core value type for all Sable data.
#[derive(Clone)]
pub enum Value {
    /// The nil value.
    Nil,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Real(f64),
    /// Immutable string.
    String(Arc<str>),
    /// Symbol (identifier).
    Symbol(Arc<str>),
    /// Keyword (`:name`), stored without the colon.
    Keyword(Arc<str>),
    /// Mutable byte string.
    Buffer(Rc<RefCell<String>>),
    /// Mutable array.
    Array(Rc<RefCell<Vec<Value>>>),
    /// Immutable tuple; also the shape of every call form.
    Tuple(Tuple),
    /// Immutable key/value structure.
    Struct(OrdMap<Value, Value>),
    /// Mutable key/value table.
    Table(Rc<RefCell<OrdMap<Value, Value>>>),
    /// Bytecode closure.
    Function(Rc<Closure>),
    /// Function implemented in Rust.
    Native(NativeFn),
}

/// An immutable sequence with a delimiter flag and an optional source span.
#[derive(Clone)]
pub struct Tuple {
    /// Elements.
    pub items: Vector<Value>,
    /// True for `[...]`, false for `(...)`.
    pub bracket: bool,
    /// Where the reader found this tuple.
    pub span: Option<Span>,
}

impl Tuple {
    /// Creates a parenthesized tuple.
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            items: items.into_iter().collect(),
            bracket: false,
            span: None,
        }
    }

    /// Creates a bracketed tuple.
    #[must_use]
    pub fn bracket(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            bracket: true,
            ..Self::new(items)
        }
    }

    /// Attaches a source span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the tuple has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> im::vector::Iter<'_, Value> {
        self.items.iter()
    }
}

/// A function record paired with the environments it captured.
pub struct Closure {
    /// The compiled function.
    pub def: Rc<FuncDef>,
    /// Captured frames, indexed by environment number.
    pub envs: Vec<Frame>,
}

impl Closure {
    /// The function's name, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.def.name.as_deref()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({})", self.name().unwrap_or("_"))
    }
}

/// Operations the compiler may open-code when the callee is a known native.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessThanEqual,
    /// `>=`
    GreaterThanEqual,
    /// `=`
    Equals,
    /// `not=`
    NotEquals,
    /// `get`
    Get,
    /// `in`
    In,
    /// `put`
    Put,
    /// `length`
    Length,
    /// `apply`
    Apply,
    /// `error`
    Error,
}

/// Native function callable from Sable.
#[derive(Clone)]
pub struct NativeFn {
    /// Function name for debugging.
    pub name: &'static str,
    /// Function pointer.
    pub func: fn(&[Value]) -> crate::Result<Value>,
    /// Instruction-level equivalent, if any.
    pub intrinsic: Option<Intrinsic>,
}

impl NativeFn {
    /// Creates a native function with no intrinsic.
    #[must_use]
    pub const fn new(name: &'static str, func: fn(&[Value]) -> crate::Result<Value>) -> Self {
        Self {
            name,
            func,
            intrinsic: None,
        }
    }

    /// Marks this native as open-codable.
    #[must_use]
    pub const fn with_intrinsic(mut self, intrinsic: Intrinsic) -> Self {
        self.intrinsic = Some(intrinsic);
        self
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({})", self.name)
    }
}

impl Value {
    /// Creates a symbol.
    #[must_use]
    pub fn symbol(name: &str) -> Self {
        Self::Symbol(name.into())
    }

    /// Creates a keyword from its name without the colon.
    #[must_use]
    pub fn keyword(name: &str) -> Self {
        Self::Keyword(name.into())
    }

    /// Creates a parenthesized tuple.
    #[must_use]
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Tuple(Tuple::new(items))
    }

    /// Creates a bracketed tuple.
    #[must_use]
    pub fn bracket_tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Tuple(Tuple::bracket(items))
    }

    /// Creates a fresh array.
    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    /// Creates a fresh buffer.
    #[must_use]
    pub fn buffer(text: impl Into<String>) -> Self {
        Self::Buffer(Rc::new(RefCell::new(text.into())))
    }

    /// Creates a struct from key/value pairs. Nil keys and nil values are dropped.
    #[must_use]
    pub fn struct_from(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self::Struct(
            pairs
                .into_iter()
                .filter(|(k, v)| !k.is_nil() && !v.is_nil())
                .collect(),
        )
    }

    /// Creates a fresh table from key/value pairs. Nil keys and nil values are dropped.
    #[must_use]
    pub fn table_from(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let map = pairs
            .into_iter()
            .filter(|(k, v)| !k.is_nil() && !v.is_nil())
            .collect();
        Self::Table(Rc::new(RefCell::new(map)))
    }

    /// Wraps a native function.
    #[must_use]
    pub fn native(native: NativeFn) -> Self {
        Self::Native(native)
    }

    /// Returns the type name used in error messages and by `type`.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Keyword(_) => "keyword",
            Self::Buffer(_) => "buffer",
            Self::Array(_) => "array",
            Self::Tuple(_) => "tuple",
            Self::Struct(_) => "struct",
            Self::Table(_) => "table",
            Self::Function(_) => "function",
            Self::Native(_) => "cfunction",
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Nil => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Real(_) => 3,
            Self::String(_) => 4,
            Self::Symbol(_) => 5,
            Self::Keyword(_) => 6,
            Self::Buffer(_) => 7,
            Self::Array(_) => 8,
            Self::Tuple(_) => 9,
            Self::Struct(_) => 10,
            Self::Table(_) => 11,
            Self::Function(_) => 12,
            Self::Native(_) => 13,
        }
    }

    /// Returns true if this value is nil.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns true if this value is truthy.
    ///
    /// Only `nil` and `false` are falsy.
    #[must_use]
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// Attempts to extract an integer value.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract a number as f64 (converts int to float).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Real(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract a string's contents.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract a symbol's name.
    #[must_use]
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Self::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract a keyword's name.
    #[must_use]
    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Self::Keyword(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract a tuple.
    #[must_use]
    pub const fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Self::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true if this is the symbol `name`.
    #[must_use]
    pub fn is_symbol(&self, name: &str) -> bool {
        self.as_symbol() == Some(name)
    }

    /// Returns the elements of an indexed value (array or tuple).
    #[must_use]
    pub fn indexed_items(&self) -> Option<Vec<Value>> {
        match self {
            Self::Array(a) => Some(a.borrow().clone()),
            Self::Tuple(t) => Some(t.items.iter().cloned().collect()),
            _ => None,
        }
    }

    /// Returns the key/value pairs of a dictionary (struct or table).
    #[must_use]
    pub fn dictionary_pairs(&self) -> Option<Vec<(Value, Value)>> {
        match self {
            Self::Struct(m) => Some(m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Self::Table(t) => Some(
                t.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Renders the value as plain text: strings, symbols, keywords and buffers
    /// without delimiters, everything else as printed.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) | Self::Symbol(s) | Self::Keyword(s) => s.to_string(),
            Self::Buffer(b) => b.borrow().clone(),
            other => other.to_string(),
        }
    }
}

fn addr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc).cast::<()>() as usize
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.bracket == other.bracket && self.items == other.items
    }
}

impl Eq for Tuple {}

impl Hash for Tuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bracket.hash(state);
        self.items.hash(state);
    }
}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.items
            .cmp(&other.items)
            .then(self.bracket.cmp(&other.bracket))
    }
}

// Reals compare by bit pattern so that Eq and Hash stay consistent.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b))
            | (Self::Symbol(a), Self::Symbol(b))
            | (Self::Keyword(a), Self::Keyword(b)) => a == b,
            (Self::Buffer(a), Self::Buffer(b)) => Rc::ptr_eq(a, b),
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => a == b,
            (Self::Table(a), Self::Table(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => std::ptr::fn_addr_eq(a.func, b.func),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Nil => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(n) => n.hash(state),
            Self::Real(n) => n.to_bits().hash(state),
            Self::String(s) | Self::Symbol(s) | Self::Keyword(s) => s.hash(state),
            Self::Buffer(b) => addr(b).hash(state),
            Self::Array(a) => addr(a).hash(state),
            Self::Tuple(t) => t.hash(state),
            Self::Struct(m) => m.hash(state),
            Self::Table(t) => addr(t).hash(state),
            Self::Function(c) => addr(c).hash(state),
            Self::Native(n) => (n.func as usize).hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order: first by type, then by contents (identity types by address).
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Nil, Self::Nil) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Real(a), Self::Real(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b))
            | (Self::Symbol(a), Self::Symbol(b))
            | (Self::Keyword(a), Self::Keyword(b)) => a.cmp(b),
            (Self::Buffer(a), Self::Buffer(b)) => addr(a).cmp(&addr(b)),
            (Self::Array(a), Self::Array(b)) => addr(a).cmp(&addr(b)),
            (Self::Tuple(a), Self::Tuple(b)) => a.cmp(b),
            (Self::Struct(a), Self::Struct(b)) => a.cmp(b),
            (Self::Table(a), Self::Table(b)) => addr(a).cmp(&addr(b)),
            (Self::Function(a), Self::Function(b)) => addr(a).cmp(&addr(b)),
            (Self::Native(a), Self::Native(b)) => (a.func as usize).cmp(&(b.func as usize)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn write_seq<'a>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: impl Iterator<Item = &'a Value>,
    close: &str,
) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

fn write_pairs<'a>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    pairs: impl Iterator<Item = (&'a Value, &'a Value)>,
) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, (k, v)) in pairs.enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{k} {v}")?;
    }
    write!(f, "}}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Real(n) => write!(f, "{n:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Symbol(s) => write!(f, "{s}"),
            Self::Keyword(s) => write!(f, ":{s}"),
            Self::Buffer(b) => write!(f, "@{:?}", b.borrow()),
            Self::Array(a) => write_seq(f, "@[", a.borrow().iter(), "]"),
            Self::Tuple(t) if t.bracket => write_seq(f, "[", t.iter(), "]"),
            Self::Tuple(t) => write_seq(f, "(", t.iter(), ")"),
            Self::Struct(m) => write_pairs(f, "{", m.iter()),
            Self::Table(t) => write_pairs(f, "@{", t.borrow().iter()),
            Self::Function(c) => match c.name() {
                Some(name) => write!(f, "<function {name}>"),
                None => write!(f, "<function>"),
            },
            Self::Native(n) => write!(f, "<cfunction {}>", n.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Value::Tuple(self.clone()), f)
    }
}

// Convenience From implementations

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Real(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<Tuple> for Value {
    fn from(t: Tuple) -> Self {
        Self::Tuple(t)
    }
}

impl From<NativeFn> for Value {
    fn from(n: NativeFn) -> Self {
        Self::Native(n)
    }
}
