use std::path::Path;

use taint_query_core::patch::{header_directive, PatchEngine, PatchError, PatchSet, Placement};

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).expect("utf-8 output")
}

const HEADER: &str = "#include \"oracle.h\"\n";

#[test]
fn header_is_prepended_even_without_edits() {
    let engine = PatchEngine::new();
    let out = engine.apply(Path::new("a.c"), b"int x;\n", HEADER).expect("apply");
    assert_eq!(text(out), "#include \"oracle.h\"\nint x;\n");
    assert_eq!(header_directive("pirate_mark_lava.h"), "#include \"pirate_mark_lava.h\"\n");
}

#[test]
fn header_stays_ahead_of_edits_at_offset_zero() {
    let mut set = PatchSet::new();
    set.enqueue(0, "/* first */", Placement::AfterExisting);
    set.enqueue(0, "/* front */", Placement::BeforeExisting);
    let out = set.apply(Path::new("a.c"), b"int x;\n", HEADER).expect("apply");
    assert_eq!(text(out), "#include \"oracle.h\"\n/* front *//* first */int x;\n");
}

#[test]
fn same_offset_edits_keep_enqueue_order() {
    let src = "f(g(x));";
    let mut set = PatchSet::new();
    set.enqueue(0, "[", Placement::AfterExisting);
    set.enqueue(2, "<", Placement::AfterExisting);
    set.enqueue(6, ">", Placement::AfterExisting);
    set.enqueue(7, "]", Placement::AfterExisting);
    set.enqueue(0, "{", Placement::AfterExisting);

    let out = set.apply(Path::new("a.c"), src.as_bytes(), "").expect("apply");
    assert_eq!(text(out), "[{f(<g(x)>)];");
}

#[test]
fn nested_call_wraps_stay_balanced() {
    let src = "p(q(1))";
    let mut engine = PatchEngine::new();
    let file = Path::new("nest.c");
    // Pre-order: outer p(...) first.
    engine.enqueue(file, 0, "({", Placement::AfterExisting);
    engine.enqueue(file, 7, "; })", Placement::AfterExisting);
    engine.enqueue(file, 2, "({", Placement::AfterExisting);
    engine.enqueue(file, 6, "; })", Placement::AfterExisting);
    assert_eq!(engine.edit_count(file), 4);

    let out = engine.apply(file, src.as_bytes(), "").expect("apply");
    assert_eq!(text(out), "({p(({q(1); })); })");
}

#[test]
fn indented_edits_follow_the_target_line() {
    let src = "int f() {\n    g();\n}\n";
    let mut set = PatchSet::new();
    set.enqueue_indented(14, "A;\nB;\n", Placement::AfterExisting);
    let out = set.apply(Path::new("a.c"), src.as_bytes(), "").expect("apply");
    assert_eq!(text(out), "int f() {\n    A;\n    B;\n    g();\n}\n");

    let tabs = "void h() {\n\tk();\n}\n";
    let mut set = PatchSet::new();
    set.enqueue_indented(12, "X;\n", Placement::AfterExisting);
    let out = set.apply(Path::new("b.c"), tabs.as_bytes(), "").expect("apply");
    assert_eq!(text(out), "void h() {\n\tX;\n\tk();\n}\n");
}

#[test]
fn offsets_past_the_end_fail_without_output() {
    let mut set = PatchSet::new();
    set.enqueue(99, "x", Placement::AfterExisting);
    let err = set.apply(Path::new("short.c"), b"int;", "").unwrap_err();
    assert_eq!(err, PatchError::OutOfBounds { path: "short.c".into(), offset: 99, len: 4 });
}

#[test]
fn edits_are_kept_per_file() {
    let mut engine = PatchEngine::new();
    engine.enqueue(Path::new("a.c"), 0, "A", Placement::AfterExisting);
    engine.enqueue(Path::new("b.c"), 0, "B", Placement::AfterExisting);

    assert_eq!(engine.apply(Path::new("a.c"), b"x", "").expect("apply a"), b"Ax");
    assert_eq!(engine.apply(Path::new("b.c"), b"y", "").expect("apply b"), b"By");
    assert!(engine.patch_set(Path::new("c.c")).is_none());
}

#[test]
fn non_utf8_sources_pass_through_byte_for_byte() {
    // Latin-1 comment: 0xE9 is not valid UTF-8 on its own.
    let src = b"/* caf\xe9 */\nint f() {\n    g();\n}\n";
    let mut set = PatchSet::new();
    set.enqueue_indented(25, "A;\n", Placement::AfterExisting);
    let out = set.apply(Path::new("latin1.c"), src, HEADER).expect("apply");
    assert_eq!(
        out,
        b"#include \"oracle.h\"\n/* caf\xe9 */\nint f() {\n    A;\n    g();\n}\n".to_vec()
    );
}
