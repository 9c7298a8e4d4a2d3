//! Whole-program tests
//!
//! Each program is parsed, compiled, verified, and run in a fresh context.

use sable_compiler::CompilerOptions;
use sable_foundation::{ErrorKind, Value};
use sable_vm::{RunContext, eval};

fn run(source: &str) -> Value {
    eval(source).unwrap_or_else(|e| panic!("{source}: {e}"))
}

fn run_both(source: &str) -> Value {
    let optimized = run(source);
    let plain = RunContext::new()
        .unwrap()
        .with_options(CompilerOptions::unoptimized())
        .eval_str(source)
        .unwrap();
    assert_eq!(optimized, plain, "{source}");
    optimized
}

// =============================================================================
// Algorithms
// =============================================================================

#[test]
fn iterative_factorial() {
    let source = "
        (defn fact [n]
          (var acc 1)
          (var i 2)
          (while (<= i n)
            (set acc (* acc i))
            (++ i))
          acc)
        (fact 10)";
    assert_eq!(run_both(source), Value::Int(3_628_800));
}

#[test]
fn mutual_recursion_through_globals() {
    let source = "
        (var odd? nil)
        (defn even? [n] (if (= n 0) true (odd? (- n 1))))
        (set odd? (fn [n] (if (= n 0) false (even? (- n 1)))))
        [(even? 10) (even? 7)]";
    assert_eq!(run_both(source).to_string(), "[true false]");
}

#[test]
fn accumulating_into_a_table() {
    let source = "
        (def counts @{})
        (def words [:a :b :a :c :a :b])
        (var i 0)
        (while (< i (length words))
          (def w (in words i))
          (put counts w (+ 1 (get counts w 0)))
          (++ i))
        [(get counts :a) (get counts :b) (get counts :c)]";
    assert_eq!(run_both(source).to_string(), "[3 2 1]");
}

#[test]
fn higher_order_functions() {
    let source = "
        (defn map-array [f xs]
          (def out @[])
          (var i 0)
          (while (< i (length xs))
            (array/push out (f (in xs i)))
            (++ i))
          out)
        (defn adder [n] (fn [x] (+ x n)))
        (apply + (map-array (adder 10) [1 2 3]))";
    assert_eq!(run_both(source), Value::Int(36));
}

#[test]
fn closures_capture_each_iteration() {
    let source = "
        (def thunks @[])
        (defn fill []
          (var i 0)
          (while (< i 4)
            (def j (* i i))
            (array/push thunks (fn [] j))
            (++ i)))
        (fill)
        (+ ((in thunks 1)) ((in thunks 3)))";
    assert_eq!(run_both(source), Value::Int(10));
}

#[test]
fn destructuring_in_bindings_and_parameters() {
    let source = "
        (def [a [b c] & rest] [1 [2 3] 4 5])
        (def {:x x :y y} {:x 10 :y 20})
        (defn sum-pair [[p q]] (+ p q))
        (+ a b c (length rest) x y (sum-pair [100 200]))";
    assert_eq!(run_both(source), Value::Int(338));
}

// =============================================================================
// Macros
// =============================================================================

#[test]
fn user_macros_expand_before_compilation() {
    let source = "
        (defmacro swap! [a b]
          (def tmp (gensym))
          ~(do (def ,tmp ,a) (set ,a ,b) (set ,b ,tmp)))
        (var x 1)
        (var y 2)
        (swap! x y)
        [x y]";
    assert_eq!(run(source).to_string(), "[2 1]");
}

#[test]
fn let_and_when() {
    let source = "
        (let [a 1 b (+ a 1)]
          (when (> b a) (* a b 10)))";
    assert_eq!(run(source), Value::Int(20));
    assert_eq!(run("(unless true 1)"), Value::Nil);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn raised_errors_carry_their_message() {
    let err = eval("(defn check [n] (if (< n 0) (error \"negative\") n)) (check -1)").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Runtime(ref message) if message == "negative"));
}

#[test]
fn failed_forms_leave_earlier_definitions_in_place() {
    let mut context = RunContext::new().unwrap();
    context.eval_str("(def kept 1)").unwrap();
    assert!(context.eval_str("(def lost (/ kept 0))").is_err());
    assert_eq!(context.eval_str("(+ kept 1)").unwrap(), Value::Int(2));
}

// =============================================================================
// Properties
// =============================================================================

mod properties {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn arithmetic_matches_the_host(a in -10_000i64..10_000, b in -10_000i64..10_000) {
            let source = format!("(defn f [x y] (- (* x y) (if (< x y) x y))) (f {a} {b})");
            prop_assert_eq!(run_both(&source), Value::Int(a * b - a.min(b)));
        }

        #[test]
        fn loops_count_like_the_host(n in 0i64..200) {
            let source = format!("(var s 0) (var i 0) (while (< i {n}) (set s (+ s i)) (++ i)) s");
            prop_assert_eq!(run(&source), Value::Int(n * (n - 1) / 2));
        }
    }
}
