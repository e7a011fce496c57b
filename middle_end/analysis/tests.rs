use pretty_assertions::assert_eq;

use super::available_copies::Copy;
use super::available_exprs::Expression;
use super::reaching_defs::Definition;
use super::*;
use crate::middle_end::ir::*;

fn build(code: &str) -> Cfg {
    let program = code
        .parse::<Program>()
        .unwrap()
        .validate()
        .unwrap();
    Cfg::build(&program).unwrap()
}

fn set<T: Ord>(items: impl IntoIterator<Item = T>) -> Set<T> {
    items.into_iter().collect()
}

fn def(var: &str, b: usize, n: usize) -> Definition {
    Definition {
        site: (BlockId(b), n),
        var: var_id(var),
    }
}

fn copy(src: &str, dst: &str) -> Copy {
    Copy {
        src: var_id(src),
        dst: var_id(dst),
    }
}

const LOOP: &str = r"
define @f
  alloc_int %i
  store_int 0 %i
  jump label %H
H:
  load_int %i %1
  cbranch %1 label %B label %X
B:
  store_int 1 %i
  jump label %H
X:
  return_void
";

// SECTION: reaching definitions

#[test]
fn later_store_kills_earlier_one() {
    let cfg = build(
        r"
define @f
  alloc_int %x
  store_int 1 %x
  store_int 2 %x
  return_void
",
    );
    let f = &cfg.functions[0];
    let results = reaching_defs::analyze(f);

    let b0 = BlockId(0);
    assert_eq!(results.block(b0).gen[2], set([def("%x", 0, 2)]));
    assert_eq!(results.block(b0).kill[3], set([def("%x", 0, 2)]));
    assert_eq!(results.outs((b0, 2)), &set([def("%x", 0, 2)]));
    assert_eq!(results.outs((b0, 3)), &set([def("%x", 0, 3)]));
}

#[test]
fn parameter_and_return_slots_are_not_definitions() {
    let cfg = build(
        r"
define_int @f int %1
  alloc_int %p
  alloc_int %r
  store_int %1 %p
  load_int %p %2
  store_int %2 %r
  load_int %r %3
  return_int %3
",
    );
    let results = reaching_defs::analyze(&cfg.functions[0]);
    assert!(results.block(BlockId(0)).gen.iter().all(Set::is_empty));
}

#[test]
fn definitions_flow_around_a_loop() {
    let cfg = build(LOOP);
    let f = &cfg.functions[0];
    let results = reaching_defs::analyze(f);

    let h = f.find(&label("H")).unwrap();
    let x = f.find(&label("X")).unwrap();
    let both = set([def("%i", 0, 2), def("%i", 2, 1)]);
    assert_eq!(results.ins((h, 0)), &both);
    assert_eq!(results.ins((x, 0)), &both);
    assert!(results.passes >= 2);
}

#[test]
fn adding_a_back_edge_only_grows_may_sets() {
    let without = build(&LOOP.replace("jump label %H\nX:", "jump label %X\nX:"));
    let with = build(LOOP);
    let (f1, f2) = (&without.functions[0], &with.functions[0]);
    assert_eq!(f1.blocks.len(), f2.blocks.len());

    let r1 = reaching_defs::analyze(f1);
    let r2 = reaching_defs::analyze(f2);
    for (t1, t2) in r1.blocks.iter().zip(&r2.blocks) {
        for (s1, s2) in t1.ins.iter().zip(&t2.ins) {
            assert!(s1.is_subset(s2), "{} lost facts", t1.label);
        }
        for (s1, s2) in t1.outs.iter().zip(&t2.outs) {
            assert!(s1.is_subset(s2), "{} lost facts", t1.label);
        }
    }
}

#[test]
fn analysis_is_idempotent() {
    let cfg = build(LOOP);
    let f = &cfg.functions[0];
    assert_eq!(reaching_defs::analyze(f), reaching_defs::analyze(f));
    assert_eq!(liveness::analyze(f), liveness::analyze(f));
    assert_eq!(available_copies::analyze(f), available_copies::analyze(f));
}

#[test]
fn unreachable_blocks_keep_empty_tables() {
    let cfg = build(
        r"
define @f
  alloc_int %x
  return_void
L:
  store_int 1 %x
  return_void
",
    );
    let f = &cfg.functions[0];
    let l = f.find(&label("L")).unwrap();
    let results = reaching_defs::analyze(f);

    assert_eq!(results.block(l).gen[1], set([def("%x", l.0, 1)]));
    assert!(results.block(l).outs.iter().all(Set::is_empty));
}

#[test]
fn degenerate_blocks_have_empty_gen_and_kill() {
    let cfg = build(
        r"
define @f
  alloc_int %x
  store_int 1 %x
  jump label %A
A:
B:
  return_void
",
    );
    let f = &cfg.functions[0];
    let a = f.find(&label("A")).unwrap();
    let b = f.find(&label("B")).unwrap();
    let results = reaching_defs::analyze(f);

    assert_eq!(results.block(a).gen, vec![Set::new()]);
    assert_eq!(results.block(a).kill, vec![Set::new()]);
    assert_eq!(results.ins((b, 0)), &set([def("%x", 0, 2)]));
}

// SECTION: available expressions

#[test]
fn store_kills_expressions_through_loaded_registers() {
    let cfg = build(
        r"
define @f
  alloc_int %x
  load_int %x %1
  add_int %1 1 %2
  store_int 3 %x
  return_void
",
    );
    let results = available_exprs::analyze(&cfg.functions[0]);

    let e = Expression {
        site: (BlockId(0), 3),
        lhs: Operand::Var(var_id("%1")),
        rhs: Some(Operand::Imm(Immediate::Int(1))),
    };
    assert_eq!(results.outs((BlockId(0), 3)), &set([e.clone()]));
    assert_eq!(results.block(BlockId(0)).kill[4], set([e]));
    assert!(results.outs((BlockId(0), 4)).is_empty());
}

#[test]
fn expressions_merge_by_union() {
    let cfg = build(
        r"
define @f
  literal_bool 1 %c
  cbranch %c label %T label %E
T:
  not_bool %c %n
  jump label %E
E:
  return_void
",
    );
    let f = &cfg.functions[0];
    let t = f.find(&label("T")).unwrap();
    let e = f.find(&label("E")).unwrap();
    let results = available_exprs::analyze(f);

    // only computed along one of the two paths into E.
    let not = Expression {
        site: (t, 1),
        lhs: Operand::Var(var_id("%c")),
        rhs: None,
    };
    assert_eq!(results.ins((e, 0)), &set([not]));
}

// SECTION: liveness

#[test]
fn call_reads_its_parameters() {
    let cfg = build(
        r"
define @f
  alloc_int %x
  load_int %x %1
  param_int %1
  call @g
  store_int 2 %x
  return_void
",
    );
    let results = liveness::analyze(&cfg.functions[0]);
    let b0 = results.block(BlockId(0));

    assert!(b0.gen[3].is_empty());
    assert_eq!(b0.gen[4], set([var_id("%1")]));
    assert_eq!(b0.kill[5], set([var_id("%x")]));
    assert!(b0.ins[4].contains(&var_id("%1")));
    assert!(b0.ins[2].contains(&var_id("%x")));
    assert!(b0.ins[5].is_empty());
}

#[test]
fn loads_and_returns_read_their_operands() {
    let cfg = build(
        r"
define_int @f
  alloc_int %x
  store_int 1 %x
  load_int %x %1
  return_int %1
",
    );
    let results = liveness::analyze(&cfg.functions[0]);
    let b0 = results.block(BlockId(0));

    assert_eq!(b0.gen[3], set([var_id("%x")]));
    assert_eq!(b0.gen[4], set([var_id("%1")]));
    assert!(b0.ins[3].contains(&var_id("%x")));
    assert!(!b0.ins[2].contains(&var_id("%x")));
}

#[test]
fn liveness_flows_backwards_around_a_loop() {
    let cfg = build(LOOP);
    let f = &cfg.functions[0];
    let h = f.find(&label("H")).unwrap();
    let b = f.find(&label("B")).unwrap();
    let results = liveness::analyze(f);

    let i = var_id("%i");
    assert!(results.ins((h, 0)).contains(&i));
    assert!(results.outs((BlockId(0), 3)).contains(&i));
    // the back-edge carries liveness out of B, the store kills it inside.
    assert!(results.outs((b, 2)).contains(&i));
    assert!(!results.ins((b, 0)).contains(&i));
}

// SECTION: available copies

#[test]
fn redefinition_kills_a_copy() {
    let cfg = build(
        r"
define_int @f
  alloc_int %A
  alloc_int %B
  load_int %A %r
  store_int %r %B
  store_int 5 %A
  load_int %B %s
  return_int %s
",
    );
    let results = available_copies::analyze(&cfg.functions[0]);
    let b0 = results.block(BlockId(0));

    assert_eq!(b0.gen[4], set([copy("%A", "%B")]));
    assert_eq!(b0.kill[5], set([copy("%A", "%B")]));
    assert_eq!(b0.outs[4], set([copy("%A", "%B")]));
    assert!(b0.ins[6].is_empty());
}

#[test]
fn copies_merge_by_intersection() {
    let cfg = build(
        r"
define @f
  alloc_int %a
  alloc_int %b
  alloc_int %c
  load_int %a %1
  store_int %1 %b
  cbranch %1 label %T label %F
T:
  load_int %a %2
  store_int %2 %c
  jump label %E
F:
  jump label %E
E:
  load_int %b %3
  return_void
",
    );
    let f = &cfg.functions[0];
    let t = f.find(&label("T")).unwrap();
    let e = f.find(&label("E")).unwrap();
    let results = available_copies::analyze(f);

    assert_eq!(
        results.outs((t, 3)),
        &set([copy("%a", "%b"), copy("%a", "%c")])
    );
    assert_eq!(results.ins((e, 0)), &set([copy("%a", "%b")]));
    assert_eq!(results.passes, 2);
}

#[test]
fn copies_survive_a_loop_that_does_not_touch_them() {
    let cfg = build(
        r"
define @f
  alloc_int %a
  alloc_int %b
  alloc_int %i
  load_int %a %1
  store_int %1 %b
  jump label %H
H:
  load_int %i %2
  cbranch %2 label %B label %X
B:
  store_int 0 %i
  jump label %H
X:
  return_void
",
    );
    let f = &cfg.functions[0];
    let x = f.find(&label("X")).unwrap();
    let results = available_copies::analyze(f);
    assert_eq!(results.ins((x, 0)), &set([copy("%a", "%b")]));
}

#[test]
fn call_kills_copies_of_globals() {
    let cfg = build(
        r"
global_int @g 0

define @f
  alloc_int %a
  alloc_int %b
  alloc_int %c
  load_int @g %1
  store_int %1 %b
  load_int %a %2
  store_int %2 %c
  call @h
  load_int %b %3
  return_void

define @h
  store_int 1 @g
  return_void
",
    );
    let results = available_copies::analyze(&cfg.functions[0]);
    let b0 = results.block(BlockId(0));

    assert_eq!(b0.kill[8], set([copy("@g", "%b")]));
    assert_eq!(b0.outs[8], set([copy("%a", "%c")]));
}

#[test]
fn pointer_loads_and_stores_make_no_copies() {
    let cfg = build(
        r"
define @f
  alloc_int_2 %a
  alloc_int %b
  elem_int %a 0 %p
  load_int_* %p %1
  store_int %1 %b
  load_int %b %2
  store_int_* %2 %p
  return_void
",
    );
    let f = &cfg.functions[0];
    let results = available_copies::analyze(f);
    let b0 = results.block(BlockId(0));

    assert!(available_copies::AvailableCopies::for_function(f)
        .universe()
        .is_empty());
    assert!(b0.gen[5].is_empty());
    assert!(b0.gen[7].is_empty());
}

// SECTION: driver

#[test]
fn every_analysis_for_every_function() {
    let cfg = build(
        r"
define @f
  return_void

define @main
  call @f
  return_void
",
    );
    let reports = run_all(&cfg);

    assert_eq!(
        reports.iter().map(|r| r.function.as_str()).collect::<Vec<_>>(),
        vec!["f", "main"]
    );
    let text = reports[1].to_string();
    assert!(text.starts_with("reaching definitions of @main (2 passes)"));
    assert!(text.contains("liveness of @main"));
    assert!(serde_json::to_string(&reports).is_ok());
}
