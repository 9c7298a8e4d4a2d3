//! Native function implementations for the VM.
//!
//! This module contains the builtin functions and the arithmetic, comparison
//! and collection helpers shared by the natives and the instruction loop.

#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use sable_foundation::{Error, ErrorKind, Intrinsic, NativeFn, Result, Value};

// =============================================================================
// Arithmetic and Comparison Helpers
// =============================================================================

fn arith(
    a: &Value,
    b: &Value,
    int: fn(i64, i64) -> Option<i64>,
    real: fn(f64, f64) -> f64,
) -> Result<Value> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        return int(*x, *y)
            .map(Value::Int)
            .ok_or_else(|| Error::runtime("integer overflow"));
    }
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => Ok(Value::Real(real(x, y))),
        (None, _) => Err(Error::type_mismatch("number", a.type_name())),
        (_, None) => Err(Error::type_mismatch("number", b.type_name())),
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Int(n) => *n == 0,
        Value::Real(n) => *n == 0.0,
        _ => false,
    }
}

/// Adds two numbers.
pub(crate) fn add_values(a: &Value, b: &Value) -> Result<Value> {
    arith(a, b, i64::checked_add, |x, y| x + y)
}

/// Subtracts two numbers.
pub(crate) fn sub_values(a: &Value, b: &Value) -> Result<Value> {
    arith(a, b, i64::checked_sub, |x, y| x - y)
}

/// Multiplies two numbers.
pub(crate) fn mul_values(a: &Value, b: &Value) -> Result<Value> {
    arith(a, b, i64::checked_mul, |x, y| x * y)
}

/// Divides two numbers. Integer division truncates.
pub(crate) fn div_values(a: &Value, b: &Value) -> Result<Value> {
    if is_zero(b) && a.as_number().is_some() {
        return Err(Error::new(ErrorKind::DivisionByZero));
    }
    arith(a, b, i64::checked_div, |x, y| x / y)
}

/// Remainder of two numbers, with the sign of the dividend.
pub(crate) fn mod_values(a: &Value, b: &Value) -> Result<Value> {
    if is_zero(b) && a.as_number().is_some() {
        return Err(Error::new(ErrorKind::DivisionByZero));
    }
    arith(a, b, i64::checked_rem, |x, y| x % y)
}

/// Orders two values. Numbers compare by magnitude across integer and
/// real; everything else uses the total order on values.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int(_) | Value::Real(_), Value::Int(_) | Value::Real(_)) => {
            let (x, y) = (a.as_number().unwrap_or(0.0), b.as_number().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y))
        }
        _ => a.cmp(b),
    }
}

// =============================================================================
// Collection Helpers
// =============================================================================

/// Returns the element of an indexed value at `index`, or `None` when out of
/// range. Strings and buffers index bytes.
fn element(ds: &Value, index: i64) -> Option<Value> {
    let index = usize::try_from(index).ok()?;
    match ds {
        Value::Array(items) => items.borrow().get(index).cloned(),
        Value::Tuple(tuple) => tuple.get(index).cloned(),
        Value::String(s) => s.as_bytes().get(index).map(|b| Value::Int(i64::from(*b))),
        Value::Buffer(b) => b.borrow().as_bytes().get(index).map(|b| Value::Int(i64::from(*b))),
        _ => None,
    }
}

/// Returns the length of a string, buffer, sequence or dictionary.
pub(crate) fn length_of(value: &Value) -> Result<usize> {
    match value {
        Value::String(s) => Ok(s.len()),
        Value::Buffer(b) => Ok(b.borrow().len()),
        Value::Array(items) => Ok(items.borrow().len()),
        Value::Tuple(tuple) => Ok(tuple.len()),
        Value::Struct(map) => Ok(map.len()),
        Value::Table(map) => Ok(map.borrow().len()),
        other => Err(Error::type_mismatch("data structure", other.type_name())),
    }
}

/// `ds[key]`, nil when the key or index is missing.
pub(crate) fn get_value(ds: &Value, key: &Value) -> Result<Value> {
    match ds {
        Value::Nil => Ok(Value::Nil),
        Value::Struct(map) => Ok(map.get(key).cloned().unwrap_or(Value::Nil)),
        Value::Table(map) => Ok(map.borrow().get(key).cloned().unwrap_or(Value::Nil)),
        Value::Array(_) | Value::Tuple(_) | Value::String(_) | Value::Buffer(_) => Ok(key
            .as_int()
            .and_then(|index| element(ds, index))
            .unwrap_or(Value::Nil)),
        other => Err(Error::type_mismatch("data structure", other.type_name())),
    }
}

/// `ds[key]`; an index outside a sequence is an error, a missing dictionary
/// key is nil.
pub(crate) fn in_value(ds: &Value, key: &Value) -> Result<Value> {
    match ds {
        Value::Struct(_) | Value::Table(_) => get_value(ds, key),
        Value::Array(_) | Value::Tuple(_) | Value::String(_) | Value::Buffer(_) => {
            let index = key
                .as_int()
                .ok_or_else(|| Error::type_mismatch("integer", key.type_name()))?;
            element(ds, index).ok_or_else(|| {
                Error::new(ErrorKind::IndexOutOfBounds {
                    index,
                    length: length_of(ds).unwrap_or(0),
                })
            })
        }
        other => Err(Error::type_mismatch("data structure", other.type_name())),
    }
}

/// `ds[key] = value` for arrays and tables. Writing one past the end of an
/// array appends; a nil value removes a table key.
pub(crate) fn put_value(ds: &Value, key: &Value, value: Value) -> Result<()> {
    match ds {
        Value::Array(items) => {
            let index = key
                .as_int()
                .ok_or_else(|| Error::type_mismatch("integer", key.type_name()))?;
            let mut items = items.borrow_mut();
            let length = items.len();
            match usize::try_from(index) {
                Ok(i) if i < length => items[i] = value,
                Ok(i) if i == length => items.push(value),
                _ => return Err(Error::new(ErrorKind::IndexOutOfBounds { index, length })),
            }
            Ok(())
        }
        Value::Table(map) => {
            if key.is_nil() {
                return Err(Error::runtime("table key cannot be nil"));
            }
            let mut map = map.borrow_mut();
            if value.is_nil() {
                map.remove(key);
            } else {
                map.insert(key.clone(), value);
            }
            Ok(())
        }
        other => Err(Error::type_mismatch("array or table", other.type_name())),
    }
}

/// Pairs up alternating keys and values.
pub(crate) fn pairs(items: &[Value]) -> Result<Vec<(Value, Value)>> {
    if items.len() % 2 != 0 {
        return Err(Error::runtime("expected an even number of keys and values"));
    }
    Ok(items
        .chunks(2)
        .map(|kv| (kv[0].clone(), kv[1].clone()))
        .collect())
}

/// Concatenates the text of every value.
pub(crate) fn concat_text(items: &[Value]) -> String {
    items.iter().map(Value::to_text).collect()
}

/// The error raised by `(error value)` and the `error` instruction.
pub(crate) fn raise(value: &Value) -> Error {
    Error::runtime(value.to_text())
}

// =============================================================================
// Arity Helpers
// =============================================================================

fn expect_arity(args: &[Value], count: usize) -> Result<()> {
    if args.len() == count {
        Ok(())
    } else {
        Err(Error::arity_mismatch(count.to_string(), args.len()))
    }
}

fn expect_range(args: &[Value], min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(Error::arity_mismatch(format!("{min} to {max}"), args.len()))
    }
}

fn expect_at_least(args: &[Value], min: usize) -> Result<()> {
    if args.len() >= min {
        Ok(())
    } else {
        Err(Error::arity_mismatch(format!("at least {min}"), args.len()))
    }
}

// =============================================================================
// Arithmetic Natives
// =============================================================================

fn reduce(
    args: &[Value],
    identity: i64,
    unary_left: Option<i64>,
    op: fn(&Value, &Value) -> Result<Value>,
) -> Result<Value> {
    match args {
        [] => Ok(Value::Int(identity)),
        [only] => match unary_left {
            Some(left) => op(&Value::Int(left), only),
            None => Ok(only.clone()),
        },
        [first, rest @ ..] => rest.iter().try_fold(first.clone(), |acc, v| op(&acc, v)),
    }
}

fn native_add(args: &[Value]) -> Result<Value> {
    reduce(args, 0, None, add_values)
}

fn native_subtract(args: &[Value]) -> Result<Value> {
    reduce(args, 0, Some(0), sub_values)
}

fn native_multiply(args: &[Value]) -> Result<Value> {
    reduce(args, 1, None, mul_values)
}

fn native_divide(args: &[Value]) -> Result<Value> {
    reduce(args, 1, Some(1), div_values)
}

fn native_modulo(args: &[Value]) -> Result<Value> {
    expect_arity(args, 2)?;
    mod_values(&args[0], &args[1])
}

// =============================================================================
// Comparison Natives
// =============================================================================

fn chain(args: &[Value], accept: fn(Ordering) -> bool) -> Value {
    Value::Bool(
        args.windows(2)
            .all(|pair| accept(compare_values(&pair[0], &pair[1]))),
    )
}

fn native_lt(args: &[Value]) -> Result<Value> {
    Ok(chain(args, Ordering::is_lt))
}

fn native_gt(args: &[Value]) -> Result<Value> {
    Ok(chain(args, Ordering::is_gt))
}

fn native_le(args: &[Value]) -> Result<Value> {
    Ok(chain(args, Ordering::is_le))
}

fn native_ge(args: &[Value]) -> Result<Value> {
    Ok(chain(args, Ordering::is_ge))
}

fn native_eq(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args.windows(2).all(|pair| pair[0] == pair[1])))
}

fn native_not_eq(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args.windows(2).any(|pair| pair[0] != pair[1])))
}

fn native_not(args: &[Value]) -> Result<Value> {
    expect_arity(args, 1)?;
    Ok(Value::Bool(!args[0].is_truthy()))
}

// =============================================================================
// Collection Natives
// =============================================================================

fn native_get(args: &[Value]) -> Result<Value> {
    expect_range(args, 2, 3)?;
    let found = get_value(&args[0], &args[1])?;
    match (found, args.get(2)) {
        (Value::Nil, Some(default)) => Ok(default.clone()),
        (found, _) => Ok(found),
    }
}

fn native_in(args: &[Value]) -> Result<Value> {
    expect_arity(args, 2)?;
    in_value(&args[0], &args[1])
}

fn native_put(args: &[Value]) -> Result<Value> {
    expect_arity(args, 3)?;
    put_value(&args[0], &args[1], args[2].clone())?;
    Ok(args[0].clone())
}

fn native_length(args: &[Value]) -> Result<Value> {
    expect_arity(args, 1)?;
    let length = length_of(&args[0])?;
    i64::try_from(length)
        .map(Value::Int)
        .map_err(|_| Error::runtime("length does not fit in an integer"))
}

fn native_tuple(args: &[Value]) -> Result<Value> {
    Ok(Value::tuple(args.iter().cloned()))
}

fn native_array(args: &[Value]) -> Result<Value> {
    Ok(Value::array(args.to_vec()))
}

fn native_struct(args: &[Value]) -> Result<Value> {
    Ok(Value::struct_from(pairs(args)?))
}

fn native_table(args: &[Value]) -> Result<Value> {
    Ok(Value::table_from(pairs(args)?))
}

fn native_array_push(args: &[Value]) -> Result<Value> {
    expect_at_least(args, 1)?;
    let Value::Array(items) = &args[0] else {
        return Err(Error::type_mismatch("array", args[0].type_name()));
    };
    items.borrow_mut().extend(args[1..].iter().cloned());
    Ok(args[0].clone())
}

/// `(slice seq &opt start end)` as a tuple. Negative bounds count from the
/// end.
fn native_slice(args: &[Value]) -> Result<Value> {
    expect_range(args, 1, 3)?;
    let items = args[0]
        .indexed_items()
        .ok_or_else(|| Error::type_mismatch("array or tuple", args[0].type_name()))?;
    let length = items.len() as i64;
    let bound = |arg: Option<&Value>, default: i64| -> Result<usize> {
        let raw = match arg {
            None | Some(Value::Nil) => default,
            Some(v) => v
                .as_int()
                .ok_or_else(|| Error::type_mismatch("integer", v.type_name()))?,
        };
        let resolved = if raw < 0 { length + raw + 1 } else { raw };
        if (0..=length).contains(&resolved) {
            Ok(resolved as usize)
        } else {
            Err(Error::new(ErrorKind::IndexOutOfBounds {
                index: raw,
                length: items.len(),
            }))
        }
    };
    let start = bound(args.get(1), 0)?;
    let end = bound(args.get(2), length)?;
    Ok(Value::tuple(items.get(start..end.max(start)).unwrap_or_default().iter().cloned()))
}

// =============================================================================
// Type and Text Natives
// =============================================================================

fn native_type(args: &[Value]) -> Result<Value> {
    expect_arity(args, 1)?;
    Ok(Value::keyword(args[0].type_name()))
}

fn native_nil_p(args: &[Value]) -> Result<Value> {
    expect_arity(args, 1)?;
    Ok(Value::Bool(args[0].is_nil()))
}

fn native_string_p(args: &[Value]) -> Result<Value> {
    expect_arity(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::String(_))))
}

fn native_number_p(args: &[Value]) -> Result<Value> {
    expect_arity(args, 1)?;
    Ok(Value::Bool(args[0].as_number().is_some()))
}

fn native_function_p(args: &[Value]) -> Result<Value> {
    expect_arity(args, 1)?;
    Ok(Value::Bool(matches!(
        args[0],
        Value::Function(_) | Value::Native(_)
    )))
}

fn native_string(args: &[Value]) -> Result<Value> {
    Ok(Value::from(concat_text(args)))
}

fn native_buffer(args: &[Value]) -> Result<Value> {
    Ok(Value::buffer(concat_text(args)))
}

fn native_symbol(args: &[Value]) -> Result<Value> {
    Ok(Value::symbol(&concat_text(args)))
}

fn native_keyword(args: &[Value]) -> Result<Value> {
    Ok(Value::keyword(&concat_text(args)))
}

fn native_print(args: &[Value]) -> Result<Value> {
    println!("{}", concat_text(args));
    Ok(Value::Nil)
}

static GENSYM_COUNTER: AtomicU64 = AtomicU64::new(0);

fn native_gensym(args: &[Value]) -> Result<Value> {
    expect_arity(args, 0)?;
    let n = GENSYM_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    Ok(Value::symbol(&format!("_{n:06x}")))
}

// =============================================================================
// Control Natives
// =============================================================================

fn native_error(args: &[Value]) -> Result<Value> {
    expect_arity(args, 1)?;
    Err(raise(&args[0]))
}

/// Only reached when called outside the VM's call dispatch, which handles
/// `apply` itself.
fn native_apply(args: &[Value]) -> Result<Value> {
    expect_at_least(args, 2)?;
    Err(Error::runtime("apply can only be called from running code"))
}

// =============================================================================
// Registration
// =============================================================================

/// Every builtin, named by the symbol it is bound to.
pub(crate) fn natives() -> Vec<NativeFn> {
    let intrinsic = |name: &'static str, func: fn(&[Value]) -> Result<Value>, tag: Intrinsic| {
        NativeFn::new(name, func).with_intrinsic(tag)
    };
    vec![
        intrinsic("+", native_add, Intrinsic::Add),
        intrinsic("-", native_subtract, Intrinsic::Subtract),
        intrinsic("*", native_multiply, Intrinsic::Multiply),
        intrinsic("/", native_divide, Intrinsic::Divide),
        intrinsic("%", native_modulo, Intrinsic::Modulo),
        intrinsic("<", native_lt, Intrinsic::LessThan),
        intrinsic(">", native_gt, Intrinsic::GreaterThan),
        intrinsic("<=", native_le, Intrinsic::LessThanEqual),
        intrinsic(">=", native_ge, Intrinsic::GreaterThanEqual),
        intrinsic("=", native_eq, Intrinsic::Equals),
        intrinsic("not=", native_not_eq, Intrinsic::NotEquals),
        intrinsic("get", native_get, Intrinsic::Get),
        intrinsic("in", native_in, Intrinsic::In),
        intrinsic("put", native_put, Intrinsic::Put),
        intrinsic("length", native_length, Intrinsic::Length),
        intrinsic("apply", native_apply, Intrinsic::Apply),
        intrinsic("error", native_error, Intrinsic::Error),
        NativeFn::new("not", native_not),
        NativeFn::new("type", native_type),
        NativeFn::new("nil?", native_nil_p),
        NativeFn::new("string?", native_string_p),
        NativeFn::new("number?", native_number_p),
        NativeFn::new("function?", native_function_p),
        NativeFn::new("tuple", native_tuple),
        NativeFn::new("array", native_array),
        NativeFn::new("struct", native_struct),
        NativeFn::new("table", native_table),
        NativeFn::new("array/push", native_array_push),
        NativeFn::new("slice", native_slice),
        NativeFn::new("string", native_string),
        NativeFn::new("buffer", native_buffer),
        NativeFn::new("symbol", native_symbol),
        NativeFn::new("keyword", native_keyword),
        NativeFn::new("print", native_print),
        NativeFn::new("gensym", native_gensym),
    ]
}
