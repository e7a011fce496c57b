use pretty_assertions::assert_eq;

use super::cfg_dump_impl::dump_cfg;
use super::*;

fn build(code: &str) -> Cfg {
    let program = code
        .parse::<Program>()
        .unwrap()
        .validate()
        .unwrap();
    Cfg::build(&program).unwrap()
}

fn ids(ids: &[usize]) -> Set<BlockId> {
    ids.iter().copied().map(BlockId).collect()
}

// every successor edge is mirrored by a predecessor entry and vice versa.
fn assert_edges_consistent(f: &Function) {
    for b in f.block_ids() {
        for s in f[b].successors() {
            assert!(f[s].preds().contains(&b), "{b} -> {s} has no pred entry");
        }
        for &p in f[b].preds() {
            assert!(f[p].successors().contains(&b), "{p} listed as pred of {b}");
        }
    }
}

#[test]
fn straight_line_is_one_block() {
    let cfg = build(
        r"
define @main
  alloc_int %x
  literal_int 1 %1
  store_int %1 %x
  return_void
",
    );

    let f = &cfg.functions[0];
    assert_eq!(f.blocks.len(), 1);
    assert_eq!(f[f.entry()].insts().len(), 5);
    assert!(f[f.entry()].preds().is_empty());
    assert!(f[f.entry()].successors().is_empty());
}

#[test]
fn conditional_diamond() {
    let cfg = build(
        r"
define @main
  alloc_int %x
  literal_bool 1 %c
  cbranch %c label %T label %F
T:
  literal_int 1 %1
  store_int %1 %x
  jump label %E
F:
  literal_int 2 %2
  store_int %2 %x
  jump label %E
E:
  return_void
",
    );

    let f = &cfg.functions[0];
    assert_eq!(f.blocks.len(), 4);

    let (t, e, fl) = (
        f.find(&label("T")).unwrap(),
        f.find(&label("E")).unwrap(),
        f.find(&label("F")).unwrap(),
    );
    assert_eq!(
        f[f.entry()],
        Block::Condition {
            label: label("main"),
            insts: f[f.entry()].insts().to_vec(),
            preds: Set::new(),
            taken: t,
            fall_through: fl,
        }
    );
    assert_eq!(f[t].successors(), vec![e]);
    assert_eq!(f[fl].successors(), vec![e]);
    assert_eq!(f[e].preds(), &[t, fl].into_iter().collect::<Set<_>>());
    assert_eq!(f.exits(), vec![e]);
    assert_edges_consistent(f);
}

#[test]
fn loop_back_edge_reuses_the_header() {
    let cfg = build(
        r"
define @main
  alloc_int %i
  jump label %H
H:
  load_int %i %1
  cbranch %1 label %B label %X
B:
  store_int 0 %i
  jump label %H
X:
  return_void
",
    );

    let f = &cfg.functions[0];
    // entry, H, B, X: the back-edge to H must not create a second H.
    assert_eq!(f.blocks.len(), 4);
    let (h, b) = (f.find(&label("H")).unwrap(), f.find(&label("B")).unwrap());
    assert_eq!(f[h].preds(), &[f.entry(), b].into_iter().collect::<Set<_>>());
    assert_eq!(f[b].successors(), vec![h]);
    assert_edges_consistent(f);
}

#[test]
fn label_after_open_block_falls_through() {
    let cfg = build(
        r"
define @main
  alloc_int %x
L:
  store_int 1 %x
  return_void
",
    );

    let f = &cfg.functions[0];
    let l = f.find(&label("L")).unwrap();
    assert_eq!(f[f.entry()].successors(), vec![l]);
    assert_eq!(f[l].preds(), &ids(&[0]));
    assert_edges_consistent(f);
}

#[test]
fn code_after_a_terminator_is_dropped() {
    let cfg = build(
        r"
define @main
  return_void
  print_void
L:
  print_void
  return_void
",
    );

    let f = &cfg.functions[0];
    assert_eq!(f[f.entry()].insts().len(), 2);
    // `L` is a block of its own but nothing flows into it.
    let l = f.find(&label("L")).unwrap();
    assert!(f[l].preds().is_empty());
    assert_eq!(f.reachable(), ids(&[0]));
}

#[test]
fn degenerate_blocks() {
    // an empty label block and a block that only jumps.
    let cfg = build(
        r"
define @main
  jump label %A
A:
B:
  jump label %C
C:
  return_void
",
    );

    let f = &cfg.functions[0];
    let (a, b, c) = (
        f.find(&label("A")).unwrap(),
        f.find(&label("B")).unwrap(),
        f.find(&label("C")).unwrap(),
    );
    assert_eq!(f[a].insts().len(), 1);
    assert_eq!(f[a].successors(), vec![b]);
    assert_eq!(f[b].successors(), vec![c]);
    assert_eq!(f.reverse_postorder(), vec![f.entry(), a, b, c]);
    assert_edges_consistent(f);
}

#[test]
fn functions_and_globals_are_separated() {
    let cfg = build(
        r"
global_int @g 1
define @f
L:
  return_void
define @main
L:
  call @f
  return_void
",
    );

    assert_eq!(cfg.globals.len(), 1);
    assert_eq!(
        cfg.functions.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        vec!["f", "main"]
    );
    assert!(cfg.function("main").unwrap().find(&label("L")).is_some());
}

#[test]
fn flatten_restores_the_stream() {
    let code = r"global_int @g 1

define_int @f int %1
alloc_int %a
store_int %1 %a
load_int %a %2
cbranch %2 label %T label %F
F:
jump label %T
T:
load_int %a %3
return_int %3
";
    let program = code.parse::<Program>().unwrap();
    let cfg = Cfg::build(&program.clone().validate().unwrap()).unwrap();
    assert_eq!(cfg.flatten(), program);
    assert_eq!(cfg.flatten().to_string(), code);
}

#[test]
fn parameter_and_return_slots() {
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

    let f = &cfg.functions[0];
    assert_eq!(f.param_slots(), [var_id("%p")].into_iter().collect());
    assert_eq!(f.return_slots(), [var_id("%r")].into_iter().collect());
}

#[test]
fn unresolved_label_is_an_error() {
    // skips validation on purpose to reach the builder's own check.
    let program = crate::commons::skip_validation(
        "define @f\njump label %nowhere\n"
            .parse::<Program>()
            .unwrap(),
    );
    assert_eq!(
        Cfg::build(&program),
        Err(InternalError::UnresolvedLabel {
            func: "f".to_owned(),
            label: "nowhere".to_owned()
        })
    );
}

#[test]
fn dot_output_marks_branch_ports() {
    let cfg = build(
        r"
define @main
  literal_bool 1 %c
  cbranch %c label %T label %F
T:
  return_void
F:
  return_void
",
    );

    let dot = dump_cfg(&cfg.functions[0], "digraph main");
    assert!(dot.starts_with("digraph main {"));
    assert!(dot.contains("{<t>T|<f>F}"));
    assert!(dot.contains("main__b0:t -> main__b1 [color=black];"));
    assert!(dot.contains("main__b0:f -> main__b2 [color=black];"));
    assert!(dot.contains("main__b1 -> main__b0 [color=gray style=dashed];"));
}
