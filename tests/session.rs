//! Embedding tests: the host-side session API, value marshalling in
//! both directions, resource limits and sandbox coverage.

use std::rc::Rc;

use moonbox::{HostValue, LimitKind, LuaError, Session, SessionConfig};

#[test]
fn execute_returns_printed_output() {
    let mut session = Session::new();
    assert_eq!(session.execute("print('hello')").unwrap(), "hello");
    assert_eq!(session.execute("print(1) print(2)").unwrap(), "1\n2");
    assert_eq!(session.execute("local x = 1").unwrap(), "");
}

#[test]
fn state_persists_across_calls() {
    let mut session = Session::new();
    session.execute("counter = 0").unwrap();
    session.execute("counter = counter + 1").unwrap();
    session.execute("counter = counter + 1").unwrap();
    assert_eq!(session.eval("counter").unwrap(), vec![HostValue::Int(2)]);
}

#[test]
fn functions_persist_across_calls() {
    let mut session = Session::new();
    session
        .execute("function double(n) return n * 2 end")
        .unwrap();
    assert_eq!(session.eval("double(21)").unwrap(), vec![HostValue::Int(42)]);
}

#[test]
fn sessions_are_isolated() {
    let mut a = Session::new();
    let mut b = Session::new();
    a.execute("secret = 'a'").unwrap();
    assert_eq!(b.eval("secret").unwrap(), vec![HostValue::Nil]);
}

#[test]
fn eval_returns_multiple_values() {
    let mut session = Session::new();
    assert_eq!(
        session.eval("1, 'two', true").unwrap(),
        vec![
            HostValue::Int(1),
            HostValue::Str("two".into()),
            HostValue::Bool(true)
        ]
    );
    assert_eq!(session.eval("1.5").unwrap(), vec![HostValue::Float(1.5)]);
}

#[test]
fn eval_rejects_bad_syntax() {
    let mut session = Session::new();
    assert!(matches!(
        session.eval("1 +").unwrap_err(),
        LuaError::Syntax(_)
    ));
    assert!(matches!(
        session.execute("local = 5").unwrap_err(),
        LuaError::Syntax(_)
    ));
}

// ---- marshalling ----

#[test]
fn set_and_get_scalars() {
    let mut session = Session::new();
    session.set("n", HostValue::Int(7)).unwrap();
    session.set("f", HostValue::Float(2.5)).unwrap();
    session.set("s", HostValue::Str("text".into())).unwrap();
    session.set("b", HostValue::Bool(true)).unwrap();
    assert_eq!(session.eval("n + 1").unwrap(), vec![HostValue::Int(8)]);
    assert_eq!(session.eval("f * 2").unwrap(), vec![HostValue::Float(5.0)]);
    assert_eq!(session.eval("s .. '!'").unwrap(), vec![HostValue::Str("text!".into())]);
    assert_eq!(session.get("b").unwrap(), HostValue::Bool(true));
    assert_eq!(session.get("missing").unwrap(), HostValue::Nil);
}

#[test]
fn arrays_become_sequences() {
    let mut session = Session::new();
    session
        .set(
            "xs",
            HostValue::Array(vec![
                HostValue::Int(10),
                HostValue::Int(20),
                HostValue::Int(30),
            ]),
        )
        .unwrap();
    assert_eq!(session.eval("#xs").unwrap(), vec![HostValue::Int(3)]);
    assert_eq!(session.eval("xs[2]").unwrap(), vec![HostValue::Int(20)]);
}

#[test]
fn sequences_come_back_as_arrays() {
    let mut session = Session::new();
    session.execute("t = {1, 2, 3}").unwrap();
    assert_eq!(
        session.get("t").unwrap(),
        HostValue::Array(vec![
            HostValue::Int(1),
            HostValue::Int(2),
            HostValue::Int(3)
        ])
    );
}

#[test]
fn keyed_tables_come_back_as_maps() {
    let mut session = Session::new();
    session.execute("t = {name = 'kai', age = 30}").unwrap();
    match session.get("t").unwrap() {
        HostValue::Map(pairs) => {
            assert_eq!(pairs.len(), 2);
            assert!(pairs
                .iter()
                .any(|(k, v)| k == &HostValue::Str("name".into())
                    && v == &HostValue::Str("kai".into())));
            assert!(pairs
                .iter()
                .any(|(k, v)| k == &HostValue::Str("age".into()) && v == &HostValue::Int(30)));
        }
        other => panic!("expected a map, got {:?}", other),
    }
}

#[test]
fn nested_structures_round_trip() {
    let mut session = Session::new();
    session
        .set(
            "cfg",
            HostValue::Map(vec![(
                HostValue::Str("limits".into()),
                HostValue::Array(vec![HostValue::Int(1), HostValue::Int(2)]),
            )]),
        )
        .unwrap();
    assert_eq!(
        session.eval("cfg.limits[1] + cfg.limits[2]").unwrap(),
        vec![HostValue::Int(3)]
    );
}

#[test]
fn empty_table_is_an_empty_array() {
    let mut session = Session::new();
    session.execute("t = {}").unwrap();
    assert_eq!(session.get("t").unwrap(), HostValue::Array(vec![]));
}

#[test]
fn deeply_nested_tables_refuse_to_marshal() {
    let mut session = Session::new();
    session
        .execute(
            "t = {} local cur = t for _ = 1, 150 do cur.next = {} cur = cur.next end",
        )
        .unwrap();
    let err = session.get("t").unwrap_err();
    assert!(err.to_string().contains("nested too deeply"));
}

#[test]
fn cyclic_tables_refuse_to_marshal() {
    let mut session = Session::new();
    session.execute("t = {} t.me = t").unwrap();
    assert!(session.get("t").is_err());
}

// ---- host functions ----

#[test]
fn host_function_callable_from_scripts() {
    let mut session = Session::new();
    session
        .set(
            "add",
            HostValue::Function(Rc::new(|args| match (args.first(), args.get(1)) {
                (Some(HostValue::Int(a)), Some(HostValue::Int(b))) => Ok(HostValue::Int(a + b)),
                _ => Err("two integers expected".to_string()),
            })),
        )
        .unwrap();
    assert_eq!(session.eval("add(2, 3)").unwrap(), vec![HostValue::Int(5)]);
}

#[test]
fn host_function_errors_are_catchable() {
    let mut session = Session::new();
    session
        .set(
            "fail",
            HostValue::Function(Rc::new(|_| Err("host said no".to_string()))),
        )
        .unwrap();
    let out = session
        .execute("local ok, err = pcall(fail) print(ok, err)")
        .unwrap();
    assert!(out.starts_with("false"));
    assert!(out.contains("host said no"));
}

#[test]
fn host_function_receives_marshalled_arguments() {
    let mut session = Session::new();
    session
        .set(
            "describe",
            HostValue::Function(Rc::new(|args| {
                Ok(HostValue::Str(format!("{} args", args.len())))
            })),
        )
        .unwrap();
    assert_eq!(
        session.eval("describe(1, 'a', {})").unwrap(),
        vec![HostValue::Str("3 args".into())]
    );
}

#[test]
fn script_functions_callable_from_host() {
    let mut session = Session::new();
    session
        .execute("function greet(name) return 'hi ' .. name end")
        .unwrap();
    let f = match session.get("greet").unwrap() {
        HostValue::Function(f) => f,
        other => panic!("expected a function, got {:?}", other),
    };
    assert_eq!(
        f(vec![HostValue::Str("kai".into())]).unwrap(),
        HostValue::Str("hi kai".into())
    );
}

#[test]
fn script_function_errors_surface_to_host() {
    let mut session = Session::new();
    session
        .execute("function boom() error('from script') end")
        .unwrap();
    let f = match session.get("boom").unwrap() {
        HostValue::Function(f) => f,
        other => panic!("expected a function, got {:?}", other),
    };
    let err = f(vec![]).unwrap_err();
    assert!(err.contains("from script"));
}

// ---- resource limits ----

#[test]
fn instruction_limit_stops_runaway_loops() {
    let mut session = Session::with_config(SessionConfig {
        max_instructions: 1_000,
        ..SessionConfig::default()
    });
    let err = session.execute("while true do end").unwrap_err();
    assert_eq!(err.limit_kind(), Some(LimitKind::Instructions));
    assert!(err.to_string().contains("execution quota exceeded"));
}

#[test]
fn instruction_budget_resets_per_call() {
    let mut session = Session::with_config(SessionConfig {
        max_instructions: 1_000,
        ..SessionConfig::default()
    });
    let script = "local s = 0 for i = 1, 200 do s = s + i end print(s)";
    assert_eq!(session.execute(script).unwrap(), "20100");
    assert_eq!(session.execute(script).unwrap(), "20100");
}

#[test]
fn exhausted_budget_trips_again_after_pcall() {
    let mut session = Session::with_config(SessionConfig {
        max_instructions: 1_000,
        ..SessionConfig::default()
    });
    let err = session
        .execute("pcall(function() while true do end end) print('unreached')")
        .unwrap_err();
    assert_eq!(err.limit_kind(), Some(LimitKind::Instructions));
}

#[test]
fn call_depth_limit_is_configurable() {
    let mut session = Session::with_config(SessionConfig {
        max_call_depth: 20,
        ..SessionConfig::default()
    });
    let err = session
        .execute("local function f() return f() end f()")
        .unwrap_err();
    assert_eq!(err.limit_kind(), Some(LimitKind::CallDepth));
    assert!(err.to_string().contains("stack overflow"));
}

#[test]
fn output_limit_caps_printing() {
    let mut session = Session::with_config(SessionConfig {
        max_output_bytes: 100,
        ..SessionConfig::default()
    });
    let err = session
        .execute("for i = 1, 1000 do print('0123456789') end")
        .unwrap_err();
    assert_eq!(err.limit_kind(), Some(LimitKind::Output));
    assert!(err.to_string().contains("output limit exceeded"));
}

#[test]
fn string_length_limit_is_tagged() {
    let mut session = Session::new();
    let err = session
        .execute("return ('x'):rep(11 * 1024 * 1024)")
        .unwrap_err();
    assert_eq!(err.limit_kind(), Some(LimitKind::StringLength));
    assert!(err.to_string().contains("string length overflow"));

    // the same ceiling applies to concatenation
    let err = session
        .execute("local s = ('x'):rep(9000000) return s .. s")
        .unwrap_err();
    assert_eq!(err.limit_kind(), Some(LimitKind::StringLength));
}

#[test]
fn string_length_limit_is_catchable() {
    let mut session = Session::new();
    let out = session
        .execute("print(pcall(string.rep, 'x', 11 * 1024 * 1024))")
        .unwrap();
    assert!(out.starts_with("false"));
    assert!(out.contains("string length overflow"));
}

#[test]
fn partial_output_survives_a_failure() {
    let mut session = Session::new();
    let err = session.execute("print('before') error('stop')").unwrap_err();
    assert!(err.to_string().contains("stop"));
    assert_eq!(session.output(), "before");
}

#[test]
fn limit_errors_are_catchable_in_scripts() {
    let mut session = Session::with_config(SessionConfig {
        max_call_depth: 20,
        ..SessionConfig::default()
    });
    let out = session
        .execute(
            "local function f() return f() end \
             local ok, err = pcall(f) print(ok, err)",
        )
        .unwrap();
    assert!(out.starts_with("false"));
    assert!(out.contains("stack overflow"));
}

// ---- sandboxing ----

#[test]
fn host_facing_libraries_are_absent() {
    let mut session = Session::new();
    for name in [
        "io",
        "require",
        "dofile",
        "load",
        "loadstring",
        "loadfile",
        "debug",
        "package",
        "coroutine",
        "collectgarbage",
    ] {
        assert_eq!(
            session.eval(name).unwrap(),
            vec![HostValue::Nil],
            "{} should not be exposed",
            name
        );
    }
}

#[test]
fn os_table_is_clock_only() {
    let mut session = Session::new();
    assert_eq!(
        session
            .eval("os.execute, os.getenv, os.remove, os.exit")
            .unwrap(),
        vec![HostValue::Nil; 4]
    );
    let types = session
        .execute("print(type(os.clock), type(os.time), type(os.difftime))")
        .unwrap();
    assert_eq!(types, "function\tfunction\tfunction");
}
