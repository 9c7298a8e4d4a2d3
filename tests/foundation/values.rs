//! Integration tests for Value types
//!
//! Tests value equality, ordering, display, and the collection helpers the
//! compiler and VM lean on.

use std::collections::{BTreeSet, HashSet};

use sable_foundation::{Span, Tuple, Value};

// =============================================================================
// Equality and Hashing
// =============================================================================

#[test]
fn integers_and_reals_are_distinct_keys() {
    let set: HashSet<Value> = [Value::Int(1), Value::Real(1.0), Value::Int(1)]
        .into_iter()
        .collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn strings_symbols_and_keywords_differ() {
    assert_ne!(Value::from("a"), Value::symbol("a"));
    assert_ne!(Value::symbol("a"), Value::keyword("a"));
    assert_eq!(Value::keyword("a"), Value::keyword("a"));
}

#[test]
fn tuples_hash_by_content() {
    let spanned = Tuple::new([Value::Int(1)]).with_span(Span::new(0, 3, 1, 1));
    let plain = Tuple::new([Value::Int(1)]);
    let set: HashSet<Value> = [Value::Tuple(spanned), Value::Tuple(plain)]
        .into_iter()
        .collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn mutable_collections_use_identity() {
    let a = Value::array(vec![Value::Int(1)]);
    let b = Value::array(vec![Value::Int(1)]);
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
    let t = Value::table_from([(Value::keyword("k"), Value::Int(1))]);
    assert_eq!(t, t.clone());
    assert_ne!(t, Value::table_from([(Value::keyword("k"), Value::Int(1))]));
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn mixed_values_sort_by_type_then_content() {
    let sorted: Vec<Value> = [
        Value::keyword("b"),
        Value::Int(2),
        Value::Nil,
        Value::keyword("a"),
        Value::Int(-1),
        Value::Bool(false),
    ]
    .into_iter()
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect();
    assert_eq!(sorted[0], Value::Nil);
    assert_eq!(sorted[1], Value::Bool(false));
    assert_eq!(sorted[2], Value::Int(-1));
    assert_eq!(sorted[3], Value::Int(2));
    assert!(sorted[4] < sorted[5]);
}

// =============================================================================
// Collections
// =============================================================================

#[test]
fn struct_keys_are_ordered_and_nil_free() {
    let s = Value::struct_from([
        (Value::keyword("b"), Value::Int(2)),
        (Value::keyword("a"), Value::Int(1)),
        (Value::keyword("c"), Value::Nil),
        (Value::Nil, Value::Int(3)),
    ]);
    assert_eq!(s.to_string(), "{:a 1 :b 2}");
    assert_eq!(s.dictionary_pairs().map(|p| p.len()), Some(2));
}

#[test]
fn indexed_items_cover_arrays_and_tuples() {
    let items = vec![Value::Int(1), Value::Int(2)];
    assert_eq!(Value::array(items.clone()).indexed_items(), Some(items.clone()));
    assert_eq!(Value::bracket_tuple(items.clone()).indexed_items(), Some(items));
    assert_eq!(Value::from("ab").indexed_items(), None);
}

#[test]
fn printed_forms_read_back_as_source() {
    let form = Value::tuple([
        Value::symbol("def"),
        Value::symbol("x"),
        Value::bracket_tuple([Value::Real(1.5), Value::from("s"), Value::keyword("k")]),
    ]);
    assert_eq!(form.to_string(), r#"(def x [1.5 "s" :k])"#);
    assert_eq!(Value::buffer("hi").to_string(), r#"@"hi""#);
    assert_eq!(Value::buffer("hi").to_text(), "hi");
}

#[test]
fn truthiness() {
    assert!(!Value::Nil.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    for value in [Value::Int(0), Value::from(""), Value::tuple([]), Value::Bool(true)] {
        assert!(value.is_truthy(), "{value}");
    }
}
