//! End-to-end rendering through the backend pipeline

mod common;

use common::*;
use pretty_assertions::assert_eq;
use strand_backend::ir::{BasicBlockId, InstructionKind, TextLocation, Terminator, Var};
use strand_backend::{Backend, BackendConfig, BackendError};

#[test]
fn test_straight_line_method() {
    let sum = MethodBuilder::new_static("T", "add", "(II)I", 4)
        .block(vec![add(3, 1, 2)], ret(3))
        .build();
    let code = render(unit(vec![class("T", vec![sum])]));

    let expected = "\
function T() {
}
function T_add(var$1, var$2) {
    var var$3;
    var$3 = var$1 + var$2 | 0;
    return var$3;
}
function T_$clinit() {}
";
    assert_eq!(code, expected);
}

#[test]
fn test_resumable_method_layout() {
    let compiled = compile(unit(vec![class("T", vec![worked_example()])]));
    let rendered = Backend::new(config()).render(&compiled);
    let code = rendered.code;

    let body = compiled
        .body(&worked_example().reference)
        .and_then(|b| b.as_async())
        .unwrap();
    let live: Vec<String> = body.live.iter().map(|v| format!("var${}", v.0)).collect();
    let push = format!("$rt_nativeThread().push({}, $ptr);", live.join(", "));
    let locals: Vec<String> = (1..body.variable_count).map(|slot| format!("var${}", slot)).collect();
    let declare = format!("var {}, $ptr, $tmp;", locals.join(", "));

    let order = [
        declare.as_str(),
        "$ptr = 0;",
        "if ($rt_resuming()) {",
        "$ptr = $thread.pop();",
        "$main: while (true) { switch ($ptr) {",
        "case 0:",
        "$tmp = ",
        "if ($rt_suspending()) {",
        "break $main;",
        "var$1 = $tmp;",
        "$ptr = 1;",
        "case 1:",
        "return var$3;",
        "default:",
        "$rt_invalidPointer();",
        push.as_str(),
    ];
    let mut from = 0;
    for fragment in order {
        let at = code[from..]
            .find(fragment)
            .unwrap_or_else(|| panic!("`{}` missing after offset {} in\n{}", fragment, from, code));
        from += at + fragment.len();
    }

    // part 0 falls into part 1
    assert!(!code.contains("continue $main;"), "{}", code);
}

#[test]
fn test_locals_named_like_dispatch_state() {
    let mut method = worked_example();
    method.variable_names = vec![
        None,
        Some("ptr".to_string()),
        Some("tmp".to_string()),
        Some("thread".to_string()),
    ];
    let code = render(unit(vec![class("T", vec![method])]));

    assert!(code.contains("var $ptr_1, $tmp_1, $thread_1, $ptr, $tmp;"), "{}", code);
    assert!(code.contains("$thread_1 = $thread.pop();"), "{}", code);
    assert!(code.contains("$ptr_1 = $tmp;"), "{}", code);
    assert!(code.contains("return $thread_1;"), "{}", code);
}

#[test]
fn test_minified_resumable_method() {
    let config = BackendConfig {
        minify: true,
        ..config()
    };
    let code = Backend::new(config)
        .compile_unit(unit(vec![class("T", vec![worked_example()])]))
        .unwrap()
        .code;
    assert!(code.contains("$m:while(true){switch($p){"), "{}", code);
    assert!(code.contains("break $m;"), "{}", code);
    assert!(!code.contains("    "), "{}", code);
}

#[test]
fn test_strings_are_pooled() {
    let greet = MethodBuilder::new_static("T", "greet", "()Ljava/lang/String;", 2)
        .block(vec![string(1, "hello")], ret(1))
        .build();
    let rendered = Backend::new(config())
        .compile_unit(unit(vec![class("T", vec![greet])]))
        .unwrap();
    assert_eq!(rendered.string_pool, vec!["hello".to_string()]);
    assert!(rendered.code.contains("$rt_s(0)"), "{}", rendered.code);
    assert!(rendered.code.ends_with("$rt_stringPool([\"hello\"]);\n"), "{}", rendered.code);
}

#[test]
fn test_strings_inline_without_pool() {
    let greet = MethodBuilder::new_static("T", "greet", "()Ljava/lang/String;", 2)
        .block(vec![string(1, "hello")], ret(1))
        .build();
    let config = BackendConfig {
        pool_strings: false,
        ..config()
    };
    let rendered = Backend::new(config)
        .compile_unit(unit(vec![class("T", vec![greet])]))
        .unwrap();
    assert!(rendered.string_pool.is_empty());
    assert!(rendered.code.contains("\"hello\""), "{}", rendered.code);
}

#[test]
fn test_debug_locations_recorded() {
    let mut method = MethodBuilder::new_static("T", "one", "()I", 2).build();
    let mut block = strand_backend::ir::BasicBlock::new(strand_backend::ir::BasicBlockId(0));
    block.add_instr(
        strand_backend::ir::Instruction::new(int(1, 1)).at(TextLocation::new("T.java", 7)),
    );
    block.set_terminator(ret(1));
    method.blocks.push(block);

    let config = BackendConfig {
        debug_locations: true,
        ..config()
    };
    let rendered = Backend::new(config)
        .compile_unit(unit(vec![class("T", vec![method])]))
        .unwrap();
    assert!(
        rendered
            .debug
            .iter()
            .any(|e| e.location.as_ref().map(|l| l.line) == Some(7)),
        "{:?}",
        rendered.debug
    );
}

#[test]
fn test_invalid_config_rejected() {
    let config = BackendConfig {
        indent: 40,
        ..config()
    };
    let result = Backend::new(config).compile(unit(vec![class("T", vec![worked_example()])]));
    assert!(matches!(result, Err(BackendError::Config(_))));
}

#[test]
fn test_unknown_variable_rejected() {
    let stray = MethodBuilder::new_static("T", "stray", "()I", 2)
        .block(vec![int(9, 3)], ret(9))
        .build();
    let result = Backend::new(config()).compile(unit(vec![class("T", vec![stray])]));
    match result {
        Err(BackendError::UnknownVariable { method, block, var }) => {
            assert_eq!(method, "T.stray()I");
            assert_eq!(block, BasicBlockId(0));
            assert_eq!(var, Var(9));
        }
        other => panic!("expected an unknown variable, got {:?}", other.err()),
    }
}

#[test]
fn test_virtual_method_gets_prototype_delegate() {
    let get = MethodBuilder::new_instance("T", "get", "(I)I", 2)
        .block(vec![], ret(1))
        .build();
    let code = render(unit(vec![class("T", vec![get])]));
    assert!(
        code.contains("T.prototype.$get = function(p1) { return T_get(this, p1); };"),
        "{}",
        code
    );
}

#[test]
fn test_void_trailing_return_dropped() {
    let noop = MethodBuilder::new_static("T", "noop", "()V", 1)
        .block(vec![InstructionKind::Nop], Terminator::ret(None))
        .build();
    let code = render(unit(vec![class("T", vec![noop])]));
    assert!(code.contains("function T_noop() {\n}\n"), "{}", code);
}
