use super::super::copy_prop::*;
use super::*;
use crate::middle_end::cfg::Cfg;

fn copy_propagates_to(input: &str, expected: &str) {
    optimizes_to(copy_prop_program, input, expected);
}

#[test]
fn straight_line_copy() {
    copy_propagates_to(
        r"
define_int @f
  alloc_int %a
  alloc_int %b
  literal_int 7 %0
  store_int %0 %a
  load_int %a %1
  store_int %1 %b
  load_int %b %2
  return_int %2
",
        r"
define_int @f
  alloc_int %a
  alloc_int %b
  literal_int 7 %0
  store_int %0 %a
  load_int %a %1
  store_int %1 %b
  load_int %a %2
  return_int %2
",
    );
}

#[test]
fn no_rewrite_after_source_is_redefined() {
    copy_propagates_to(
        r"
define_int @f
  alloc_int %a
  alloc_int %b
  alloc_int %c
  load_int %a %1
  store_int %1 %b
  store_int 5 %c
  load_int %b %2
  store_int 6 %a
  load_int %b %3
  add_int %2 %3 %4
  return_int %4
",
        r"
define_int @f
  alloc_int %a
  alloc_int %b
  alloc_int %c
  load_int %a %1
  store_int %1 %b
  store_int 5 %c
  load_int %a %2
  store_int 6 %a
  load_int %b %3
  add_int %2 %3 %4
  return_int %4
",
    );
}

#[test]
fn only_copies_made_on_every_path_are_used() {
    copy_propagates_to(
        r"
define @f
  alloc_int %a
  alloc_int %b
  alloc_int %c
  load_int %a %1
  store_int %1 %b
  cbranch %1 label %T label %E
T:
  load_int %a %2
  store_int %2 %c
  jump label %E
E:
  load_int %b %3
  load_int %c %4
  return_void
",
        r"
define @f
  alloc_int %a
  alloc_int %b
  alloc_int %c
  load_int %a %1
  store_int %1 %b
  cbranch %1 label %T label %E
T:
  load_int %a %2
  store_int %2 %c
  jump label %E
E:
  load_int %a %3
  load_int %c %4
  return_void
",
    );
}

#[test]
fn loop_that_overwrites_the_copy() {
    let code = r"
define @f
  alloc_int %a
  alloc_int %b
  load_int %a %1
  store_int %1 %b
  jump label %H
H:
  load_int %b %2
  cbranch %2 label %B label %X
B:
  store_int 0 %b
  jump label %H
X:
  return_void
";
    copy_propagates_to(code, code);
}

#[test]
fn copies_stay_inside_their_function() {
    copy_propagates_to(
        r"
global_int @g 0

define @f
  alloc_int %b
  load_int @g %1
  store_int %1 %b
  load_int %b %2
  return_void

define @h
  alloc_int %b
  load_int %b %3
  return_void
",
        r"
global_int @g 0

define @f
  alloc_int %b
  load_int @g %1
  store_int %1 %b
  load_int @g %2
  return_void

define @h
  alloc_int %b
  load_int %b %3
  return_void
",
    );
}

#[test]
fn call_may_overwrite_a_global_source() {
    let code = r"
global_int @g 0

define @h
  store_int 1 @g
  return_void

define_int @f
  alloc_int %b
  load_int @g %1
  store_int %1 %b
  call @h
  load_int %b %2
  return_int %2
";
    copy_propagates_to(code, code);
}

#[test]
fn call_may_overwrite_a_global_target() {
    let code = r"
global_int @g 0

define @h
  store_int 1 @g
  return_void

define_int @f
  alloc_int %a
  load_int %a %1
  store_int %1 @g
  call @h
  load_int @g %2
  return_int %2
";
    copy_propagates_to(code, code);
}

#[test]
fn locals_survive_a_call() {
    copy_propagates_to(
        r"
define_int @f
  alloc_int %a
  alloc_int %b
  load_int %a %1
  store_int %1 %b
  call @h
  load_int %b %2
  return_int %2
",
        r"
define_int @f
  alloc_int %a
  alloc_int %b
  load_int %a %1
  store_int %1 %b
  call @h
  load_int %a %2
  return_int %2
",
    );
}

#[test]
fn copies_through_aliased_pointers_are_not_propagated() {
    let code = r"
define_int @f
  alloc_int_2 %a
  alloc_int %b
  elem_int %a 0 %p
  elem_int %a 0 %q
  load_int_* %p %1
  store_int %1 %b
  store_int_* 9 %q
  load_int %b %2
  return_int %2
";
    copy_propagates_to(code, code);
}

#[test]
fn input_graph_is_left_alone() {
    let program = r"
define @f
  alloc_int %a
  alloc_int %b
  load_int %a %1
  store_int %1 %b
  load_int %b %2
  return_void
"
    .parse::<Program>()
    .unwrap()
    .validate()
    .unwrap();

    let cfg = Cfg::build(&program).unwrap();
    let optimized = copy_prop(&cfg);

    assert_eq!(cfg.flatten(), program.0);
    assert_ne!(optimized, cfg);
    assert_eq!(optimized.functions[0].blocks.len(), cfg.functions[0].blocks.len());
}
