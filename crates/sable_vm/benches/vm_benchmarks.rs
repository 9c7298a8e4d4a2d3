//! Benchmarks for the Sable VM.
//!
//! Run with: `cargo bench --package sable_vm`

use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sable_compiler::{CompilerOptions, parse_one};
use sable_foundation::Value;
use sable_vm::{RunContext, Vm};

// =============================================================================
// Call Benchmarks
// =============================================================================

const FIB: &str = "(defn fib [n] (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))";

const COUNT_DOWN: &str = "(defn count-down [n] (if (= n 0) :done (count-down (- n 1))))";

fn context_with(definitions: &str) -> RunContext {
    let mut context = RunContext::new().expect("prelude");
    context.eval_str(definitions).expect("definitions");
    context
}

fn bench_recursion(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursion");
    let mut context = context_with(FIB);
    let fib = context.env().get("fib").expect("fib");
    for n in [10i64, 15, 20] {
        group.bench_with_input(BenchmarkId::new("fib", n), &n, |b, &n| {
            b.iter(|| context.call(&fib, vec![Value::Int(black_box(n))]));
        });
    }
    group.finish();
}

fn bench_tail_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("tail_calls");
    let mut context = context_with(COUNT_DOWN);
    let count_down = context.env().get("count-down").expect("count-down");
    for n in [1_000i64, 10_000] {
        group.bench_with_input(BenchmarkId::new("count_down", n), &n, |b, &n| {
            b.iter(|| context.call(&count_down, vec![Value::Int(black_box(n))]));
        });
    }
    group.finish();
}

// =============================================================================
// Loop Benchmarks
// =============================================================================

const SUM_LOOP: &str = "
    (defn sum-to [n]
      (var i 0)
      (var total 0)
      (while (< i n)
        (set total (+ total i))
        (++ i))
      total)";

const CLOSURE_LOOP: &str = "
    (defn make-thunks [n]
      (var out @[])
      (var i 0)
      (while (< i n)
        (def j i)
        (array/push out (fn [] j))
        (++ i))
      out)";

fn bench_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("loops");
    for (name, source, entry) in [
        ("sum", SUM_LOOP, "sum-to"),
        ("closures", CLOSURE_LOOP, "make-thunks"),
    ] {
        let mut context = context_with(source);
        let function = context.env().get(entry).expect("entry");
        group.bench_function(name, |b| {
            b.iter(|| context.call(&function, vec![Value::Int(black_box(1_000))]));
        });
    }
    group.finish();
}

// =============================================================================
// Optimization Benchmarks
// =============================================================================

fn bench_optimized_vs_plain(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimization");
    let form = parse_one(
        "((fn [n] (var m n) (var a 0) (var b 1) (while (> m 0) (def t b) (set b (+ a b)) (set a t) (-- m)) a) 40)",
    )
    .expect("parse");
    for (name, options) in [
        ("optimized", CompilerOptions::default()),
        ("unoptimized", CompilerOptions::unoptimized()),
    ] {
        let mut context = RunContext::new().expect("prelude").with_options(options);
        let def = Rc::new(context.compile(&form).expect("compile"));
        group.bench_function(name, |b| {
            b.iter(|| Vm::new().run(black_box(Rc::clone(&def))));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_recursion,
    bench_tail_calls,
    bench_loops,
    bench_optimized_vs_plain,
);

criterion_main!(benches);
