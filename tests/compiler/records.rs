//! Integration tests for compiled function records
//!
//! Every record the compiler produces must verify, disassemble back to the
//! same words, and carry consistent debug metadata.

use sable_compiler::{Compiler, CompilerOptions, Environment, disassemble, parse_one, verify};
use sable_foundation::{Capture, FuncDef, FuncFlags, Instr, Opcode};
use sable_vm::core_environment;

const PROGRAMS: &[&str] = &[
    "(+ 1 2)",
    "(fn [x] (if x 1 2))",
    "(do (var i 0) (while (< i 10) (set i (+ i 1))) i)",
    "(fn [n] (var acc @[]) (var i 0) (while (< i n) (def j i) (array/push acc (fn [] j)) (set i (+ i 1))) acc)",
    "(fn outer [a] (fn [b] (fn [c] (+ a b c))))",
    "(def [a b & r] [1 2 3 4])",
    "(fn [&named x y] [x y])",
    "(fn [a &opt b & more] (tuple a b more))",
    "(fn [xs] (apply + 1 xs))",
    "~(a ,(+ 1 2) ,;[3 4])",
    "(fn [t] (set (t :a) 1) (get t :a))",
    "(fn f [n] (if (= n 0) :done (f (- n 1))))",
    "(fn [] (break 1))",
    "(fn [x] @{:a [1 x] :b @[3]})",
    "(fn [x] (not= x 1 2))",
    "(fn [x] (upscope (def y (* x 2))) y)",
    "(fn [] (var x 1) (if true 1 (fn [] x)))",
    "(fn [f] (do (f 1)))",
    "(fn [] (var i 0) (while true (def j i) (fn [] j) (if (= i 3) (break)) (set i (+ i 1))))",
];

fn compile_with(source: &str, options: CompilerOptions) -> FuncDef {
    let mut env: Environment = core_environment();
    let form = parse_one(source).unwrap();
    Compiler::new(&mut env)
        .with_options(options)
        .compile(&form)
        .unwrap_or_else(|e| panic!("{source}: {e}"))
}

fn compile(source: &str) -> FuncDef {
    compile_with(source, CompilerOptions::default())
}

fn walk(def: &FuncDef, visit: &mut impl FnMut(&FuncDef)) {
    visit(def);
    for child in &def.defs {
        walk(child, visit);
    }
}

fn instructions(def: &FuncDef) -> Vec<Instr> {
    def.bytecode
        .iter()
        .map(|&word| Instr::decode(word).unwrap())
        .collect()
}

// =============================================================================
// Record Invariants
// =============================================================================

#[test]
fn every_record_verifies() {
    for source in PROGRAMS {
        for options in [CompilerOptions::default(), CompilerOptions::unoptimized()] {
            walk(&compile_with(source, options), &mut |def| {
                assert_eq!(verify(def), Ok(()), "{source}");
            });
        }
    }
}

#[test]
fn corrupted_records_are_rejected() {
    let top = compile("(do (var i 0) (while (< i 10) (set i (+ i 1))) i)");

    let mut bad_jump = top.clone();
    let (pc, jump) = instructions(&bad_jump)
        .into_iter()
        .enumerate()
        .find(|(_, i)| i.opcode() == Opcode::Jump)
        .unwrap();
    bad_jump.bytecode[pc] = jump.with_displacement(1000).unwrap().encode();
    assert_eq!(verify(&bad_jump).unwrap_err().code(), 5);

    let mut cut_frame = top.clone();
    cut_frame.slot_count = 0;
    assert_eq!(verify(&cut_frame).unwrap_err().code(), 4);

    let mut no_return = top;
    no_return.bytecode.pop();
    assert!(verify(&no_return).is_err());
}

#[test]
fn listings_reassemble_to_the_same_words() {
    for source in PROGRAMS {
        walk(&compile(source), &mut |def| {
            let listing = disassemble(def).unwrap();
            assert_eq!(listing.assemble(), def.bytecode, "{source}");
        });
    }
}

#[test]
fn debug_metadata_lines_up_with_the_code() {
    for source in PROGRAMS {
        walk(&compile(source), &mut |def| {
            let len = u32::try_from(def.bytecode.len()).unwrap();
            assert_eq!(def.source_map.len(), def.bytecode.len(), "{source}");
            for symbol in &def.symbol_map {
                assert!(symbol.birth <= symbol.death, "{source}: {}", symbol.name);
                assert!(symbol.death <= len, "{source}: {}", symbol.name);
                assert!(symbol.register < def.slot_count, "{source}: {}", symbol.name);
            }
        });
    }
}

#[test]
fn optimized_records_have_no_noops() {
    for source in PROGRAMS {
        walk(&compile(source), &mut |def| {
            assert!(
                instructions(def).iter().all(|i| i.opcode() != Opcode::Noop),
                "{source}"
            );
        });
    }
}

#[test]
fn optimization_never_grows_code() {
    for source in PROGRAMS {
        let optimized = compile(source);
        let plain = compile_with(source, CompilerOptions::unoptimized());
        assert!(optimized.bytecode.len() <= plain.bytecode.len(), "{source}");
    }
}

// =============================================================================
// Functions and Closures
// =============================================================================

#[test]
fn parameter_lists_set_arity() {
    let top = compile("(fn [a &opt b & more] (tuple a b more))");
    let f = &top.defs[0];
    assert_eq!((f.arity, f.min_arity, f.max_arity), (2, 1, u32::MAX));
    assert!(f.flags.contains(FuncFlags::VARARG));

    let top = compile("(fn [&named x y] [x y])");
    let f = &top.defs[0];
    assert_eq!((f.arity, f.min_arity), (0, 0));
    assert!(f.flags.contains(FuncFlags::STRUCTARG));
}

#[test]
fn captured_registers_are_recorded() {
    let top = compile("(fn outer [a] (fn [b] (fn [c] (+ a b c))))");
    let outer = &top.defs[0];
    assert_eq!(outer.name.as_deref(), Some("outer"));
    assert!(outer.flags.contains(FuncFlags::NEEDS_ENV));
    assert!(outer.is_captured(0));

    let middle = &outer.defs[0];
    assert_eq!(middle.environments, vec![Capture::Frame]);
    let inner = &middle.defs[0];
    assert_eq!(inner.environments, vec![Capture::Upvalue(0), Capture::Frame]);
    assert!(
        instructions(inner)
            .iter()
            .any(|i| i.opcode() == Opcode::LoadUpvalue)
    );
}

#[test]
fn tail_calls_only_inside_functions() {
    let top = compile("(fn f [n] (if (= n 0) :done (f (- n 1))))");
    let f = &top.defs[0];
    assert!(instructions(f).iter().any(|i| i.opcode() == Opcode::Tailcall));

    let code = instructions(&compile("(array/push @[] 1)"));
    assert!(code.iter().any(|i| i.opcode() == Opcode::Call));
    assert!(code.iter().all(|i| i.opcode() != Opcode::Tailcall));
}

#[test]
fn tail_position_reaches_into_bodies() {
    let top = compile("(fn [f] (do (f 1)))");
    assert!(instructions(&top.defs[0]).iter().any(|i| i.opcode() == Opcode::Tailcall));

    let top = compile("(fn lp [n] (if (> n 0) (do (lp (- n 1)))))");
    let code = instructions(&top.defs[0]);
    assert!(code.iter().any(|i| i.opcode() == Opcode::Tailcall));
    assert!(code.iter().all(|i| i.opcode() != Opcode::Call));
}

#[test]
fn closures_in_dead_branches_are_discarded() {
    let top = compile("(fn [] (var x 1) (if true 1 (fn [] x)))");
    let f = &top.defs[0];
    assert!(f.defs.is_empty());
    assert!(f.environments.is_empty());
}

#[test]
fn loops_with_closures_become_functions() {
    let top = compile(PROGRAMS[3]);
    let f = &top.defs[0];
    let loop_fn = f
        .defs
        .iter()
        .find(|d| d.name.as_deref() == Some("_while"))
        .expect("loop function");
    assert!(instructions(loop_fn).iter().any(|i| i.opcode() == Opcode::Tailcall));
    assert!(instructions(f).iter().all(|i| i.opcode() != Opcode::Jump));
}

#[test]
fn plain_loops_stay_flat() {
    let top = compile("(do (var i 0) (while (< i 10) (set i (+ i 1))) i)");
    assert!(top.defs.is_empty());
    assert!(instructions(&top).iter().any(|i| i.opcode() == Opcode::Jump));
}

#[test]
fn small_integers_use_immediates() {
    let top = compile("(fn [x] (+ x 1))");
    let code = instructions(&top.defs[0]);
    assert!(code.iter().any(|i| i.opcode() == Opcode::AddImmediate));
    assert!(top.defs[0].constants.is_empty());
}

#[test]
fn source_names_are_recorded() {
    let top = compile_with("(fn [] 1)", CompilerOptions::default().with_source_name("lib.sbl"));
    assert_eq!(top.source.as_deref(), Some("lib.sbl"));
    assert_eq!(top.defs[0].source.as_deref(), Some("lib.sbl"));
}
