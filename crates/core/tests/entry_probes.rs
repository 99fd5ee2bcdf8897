use taint_query_core::config::InstrumentConfig;
use taint_query_core::context::RunContext;
use taint_query_core::db::SymbolTable;
use taint_query_core::instrument::{build_entry_text, plan_entry};
use taint_query_core::model::{
    CType, FieldDecl, FunctionBody, FunctionDecl, ParamDecl, ProbeStmt, RecordDecl, RecordKind,
    SourceRange, StorageClass, TypeKind, VarDecl,
};

const FILE: &str = "/work/src/parse.c";

fn context() -> RunContext {
    RunContext::new(InstrumentConfig::default(), SymbolTable::new()).with_seed(11)
}

fn function(name: &str, params: Vec<ParamDecl>) -> FunctionDecl {
    FunctionDecl {
        name: name.into(),
        params,
        body: FunctionBody::Compound { first_statement: Some(SourceRange::main_file(40, 45, 4)) },
        range: SourceRange::main_file(4, 9, 3),
    }
}

#[test]
fn scalar_parameter_gets_a_single_probe_with_declaration_metadata() {
    let mut ctx = context();
    let f = function("parse", vec![ParamDecl::new("len", CType::scalar("int"), 3)]);

    let text = build_entry_text(&mut ctx, &f, FILE);
    assert_eq!(
        text,
        "// Check if arguments of parse are tainted\n\
         vm_lava_query_buffer(&(len), sizeof(len), 0, 1, 3);\n"
    );
    assert_eq!(ctx.symbols.get(FILE), Some(0));
    assert_eq!(ctx.symbols.get("len"), Some(1));
}

#[test]
fn pointer_parameter_adds_null_guarded_pointee_probe() {
    let mut ctx = context();
    let f = function(
        "parse",
        vec![ParamDecl::new("buf", CType::pointer_to(CType::scalar("char")), 3)],
    );

    let text = build_entry_text(&mut ctx, &f, FILE);
    assert_eq!(
        text,
        "// Check if arguments of parse are tainted\n\
         vm_lava_query_buffer(&(buf), sizeof(buf), 0, 1, 3);\n\
         if (buf) {\n    vm_lava_query_buffer(buf, sizeof(char), 0, 1, 3);\n}\n"
    );
}

#[test]
fn incomplete_and_function_pointees_are_not_dereferenced() {
    let mut ctx = context();
    let callback = CType::new(
        "void (*)(int)",
        TypeKind::Pointer(Box::new(CType::new("void (int)", TypeKind::Function))),
    );
    let f = function(
        "run",
        vec![
            ParamDecl::new("opaque", CType::pointer_to(CType::void()), 7),
            ParamDecl::new("ctx", CType::pointer_to(CType::record(RecordKind::Struct, "ctx")), 7),
            ParamDecl::new("cb", callback, 7),
        ],
    );

    let plan = plan_entry(&mut ctx, &f, FILE);
    assert_eq!(plan.params.len(), 3);
    assert!(plan.params.iter().all(|stmt| matches!(stmt, ProbeStmt::Probe(_))));

    // Once the struct is defined its pointee becomes measurable.
    ctx.records.define(RecordDecl {
        tag: "ctx".into(),
        kind: RecordKind::Struct,
        fields: vec![FieldDecl::new("depth", CType::scalar("int"))],
    });
    let plan = plan_entry(&mut ctx, &f, FILE);
    assert_eq!(plan.params.len(), 4);
    match &plan.params[2] {
        ProbeStmt::Guarded { condition, probes } => {
            assert_eq!(condition, "ctx");
            assert_eq!(probes[0].size, "sizeof(struct ctx)");
        }
        other => panic!("expected guarded probe, got {other:?}"),
    }
}

#[test]
fn register_and_unnamed_parameters_are_skipped() {
    let mut ctx = context();
    let f = function(
        "hot",
        vec![
            ParamDecl::new("fast", CType::scalar("int"), 2).with_storage(StorageClass::Register),
            ParamDecl::new("", CType::scalar("int"), 2),
            ParamDecl::new("slow", CType::scalar("long"), 2),
        ],
    );

    let plan = plan_entry(&mut ctx, &f, FILE);
    assert_eq!(plan.params.len(), 1);
    assert!(ctx.symbols.get("fast").is_none());
    assert!(ctx.symbols.get("slow").is_some());
}

#[test]
fn function_without_parameters_still_gets_the_comment_line() {
    let mut ctx = context();
    let text = build_entry_text(&mut ctx, &function("main", Vec::new()), FILE);
    assert_eq!(text, "// Check if arguments of main are tainted\n");
}

#[test]
fn globals_are_probed_only_when_enabled() {
    let global = VarDecl {
        name: "config".into(),
        ty: CType::scalar("int"),
        storage: StorageClass::Static,
        line: 1,
        range: SourceRange::main_file(11, 17, 1),
    };
    let opaque = VarDecl {
        name: "handle".into(),
        ty: CType::record(RecordKind::Struct, "opaque"),
        storage: StorageClass::Extern,
        line: 2,
        range: SourceRange::main_file(30, 36, 2),
    };

    let mut ctx = context();
    ctx.globals.push(global.clone());
    let plan = plan_entry(&mut ctx, &function("f", Vec::new()), FILE);
    assert!(plan.globals.is_empty());

    let config = InstrumentConfig { probe_globals: true, ..InstrumentConfig::default() };
    let mut ctx = RunContext::new(config, SymbolTable::new());
    ctx.globals.push(global);
    ctx.globals.push(opaque);
    let text = build_entry_text(&mut ctx, &function("f", Vec::new()), FILE);
    assert_eq!(
        text,
        "// Check if arguments of f are tainted\n\
         // Check if global variables are tainted\n\
         vm_lava_query_buffer(&(config), sizeof(config), 0, 1, 1);\n"
    );
}
