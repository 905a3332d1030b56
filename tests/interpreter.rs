//! End-to-end language tests: each case runs a script in a fresh
//! session and checks printed output, evaluated values, or the error.

use moonbox::{HostValue, Session};

fn run(script: &str) -> String {
    Session::new()
        .execute(script)
        .unwrap_or_else(|e| panic!("script failed: {}\n{}", e, script))
}

fn eval(expr: &str) -> Vec<HostValue> {
    Session::new()
        .eval(expr)
        .unwrap_or_else(|e| panic!("eval failed: {}\n{}", e, expr))
}

fn eval1(expr: &str) -> HostValue {
    eval(expr).into_iter().next().unwrap_or(HostValue::Nil)
}

fn fails(script: &str) -> String {
    match Session::new().execute(script) {
        Err(e) => e.to_string(),
        Ok(out) => panic!("expected failure, got output: {:?}", out),
    }
}

// ---- literals and operators ----

#[test]
fn literals() {
    assert_eq!(eval1("nil"), HostValue::Nil);
    assert_eq!(eval1("true"), HostValue::Bool(true));
    assert_eq!(eval1("42"), HostValue::Int(42));
    assert_eq!(eval1("3.5"), HostValue::Float(3.5));
    assert_eq!(eval1("0xff"), HostValue::Int(255));
    assert_eq!(eval1("1e2"), HostValue::Float(100.0));
    assert_eq!(eval1("'hi'"), HostValue::Str("hi".into()));
    assert_eq!(eval1("[[long\nstring]]"), HostValue::Str("long\nstring".into()));
}

#[test]
fn string_escapes() {
    assert_eq!(eval1(r#""a\tb\n""#), HostValue::Str("a\tb\n".into()));
    assert_eq!(eval1(r#""\65\66""#), HostValue::Str("AB".into()));
    assert_eq!(eval1(r#""\x41""#), HostValue::Str("A".into()));
    assert_eq!(eval1(r#""\u{48}\u{49}""#), HostValue::Str("HI".into()));
}

#[test]
fn integer_arithmetic() {
    assert_eq!(eval1("1 + 2 * 3"), HostValue::Int(7));
    assert_eq!(eval1("(1 + 2) * 3"), HostValue::Int(9));
    assert_eq!(eval1("7 // 2"), HostValue::Int(3));
    assert_eq!(eval1("-7 // 2"), HostValue::Int(-4));
    assert_eq!(eval1("7 % 3"), HostValue::Int(1));
    assert_eq!(eval1("-7 % 3"), HostValue::Int(2));
    assert_eq!(eval1("7 % -3"), HostValue::Int(-2));
}

#[test]
fn float_arithmetic() {
    assert_eq!(eval1("7 / 2"), HostValue::Float(3.5));
    assert_eq!(eval1("2 ^ 10"), HostValue::Float(1024.0));
    assert_eq!(eval1("1 + 0.5"), HostValue::Float(1.5));
    assert_eq!(eval1("7.0 // 2"), HostValue::Float(3.0));
    assert_eq!(eval1("-0.5 % 2"), HostValue::Float(1.5));
}

#[test]
fn integer_wraparound() {
    assert_eq!(
        eval1("math.maxinteger + 1"),
        HostValue::Int(i64::MIN)
    );
    assert_eq!(
        eval1("math.mininteger - 1"),
        HostValue::Int(i64::MAX)
    );
}

#[test]
fn division_by_zero() {
    assert!(fails("return 1 // 0").contains("n//0"));
    assert!(fails("return 1 % 0").contains("n%%0"));
    assert_eq!(eval1("1 / 0"), HostValue::Float(f64::INFINITY));
}

#[test]
fn bitwise_operators() {
    assert_eq!(eval1("5 & 3"), HostValue::Int(1));
    assert_eq!(eval1("5 | 3"), HostValue::Int(7));
    assert_eq!(eval1("5 ~ 3"), HostValue::Int(6));
    assert_eq!(eval1("~0"), HostValue::Int(-1));
    assert_eq!(eval1("1 << 4"), HostValue::Int(16));
    assert_eq!(eval1("256 >> 4"), HostValue::Int(16));
    assert_eq!(eval1("1 << 64"), HostValue::Int(0));
    assert_eq!(eval1("-1 >> 1"), HostValue::Int(i64::MAX));
}

#[test]
fn comparisons() {
    assert_eq!(eval1("1 < 2"), HostValue::Bool(true));
    assert_eq!(eval1("2 <= 2"), HostValue::Bool(true));
    assert_eq!(eval1("3 > 2"), HostValue::Bool(true));
    assert_eq!(eval1("1 == 1.0"), HostValue::Bool(true));
    assert_eq!(eval1("'a' < 'b'"), HostValue::Bool(true));
    assert_eq!(eval1("'abc' ~= 'abd'"), HostValue::Bool(true));
    assert_eq!(eval1("1 == '1'"), HostValue::Bool(false));
}

#[test]
fn comparison_type_errors() {
    let out = run("print(pcall(function() return {} < {} end))");
    assert!(out.contains("false"));
    assert!(out.contains("attempt to compare two table values"));
    let out = run("print(pcall(function() return 1 < 'x' end))");
    assert!(out.contains("attempt to compare number with string"));
}

#[test]
fn logical_operators() {
    assert_eq!(eval1("true and 5"), HostValue::Int(5));
    assert_eq!(eval1("false and 5"), HostValue::Bool(false));
    assert_eq!(eval1("nil or 'default'"), HostValue::Str("default".into()));
    assert_eq!(eval1("not nil"), HostValue::Bool(true));
    assert_eq!(eval1("not 0"), HostValue::Bool(false));
    // the right side must not run when short-circuited
    assert_eq!(run("local ok = false and error('no') print('fine')"), "fine");
}

#[test]
fn concatenation() {
    assert_eq!(eval1("'a' .. 'b' .. 'c'"), HostValue::Str("abc".into()));
    assert_eq!(eval1("'n=' .. 42"), HostValue::Str("n=42".into()));
    assert_eq!(eval1("1 .. 2"), HostValue::Str("12".into()));
    assert!(fails("return {} .. 'x'").contains("attempt to concatenate a table value"));
}

#[test]
fn string_to_number_coercion() {
    assert_eq!(eval1("'10' + 5"), HostValue::Int(15));
    assert_eq!(eval1("'3.5' * 2"), HostValue::Float(7.0));
    assert!(fails("return 'abc' + 1").contains("arithmetic"));
}

#[test]
fn length_operator() {
    assert_eq!(eval1("#'hello'"), HostValue::Int(5));
    assert_eq!(eval1("#{1, 2, 3}"), HostValue::Int(3));
    assert_eq!(eval1("#{}"), HostValue::Int(0));
    assert!(fails("return #5").contains("attempt to get length of a number value"));
}

// ---- variables and control flow ----

#[test]
fn multiple_assignment() {
    assert_eq!(eval("(function() local a, b = 1, 2 return a, b end)()").len(), 2);
    assert_eq!(run("local a, b = 1 print(a, b)"), "1\tnil");
    assert_eq!(run("local a, b, c = 1, 2 a, b = b, a print(a, b, c)"), "2\t1\tnil");
}

#[test]
fn globals_persist_across_statements() {
    assert_eq!(run("x = 10 x = x + 5 print(x)"), "15");
}

#[test]
fn if_elseif_else() {
    let script = "
        local function grade(n)
            if n >= 90 then return 'A'
            elseif n >= 80 then return 'B'
            else return 'C' end
        end
        print(grade(95), grade(85), grade(10))
    ";
    assert_eq!(run(script), "A\tB\tC");
}

#[test]
fn while_loop_with_break() {
    assert_eq!(
        run("local i = 0 while true do i = i + 1 if i >= 4 then break end end print(i)"),
        "4"
    );
}

#[test]
fn repeat_until_sees_body_locals() {
    assert_eq!(
        run("local n = 0 repeat local done = n >= 3 n = n + 1 until done print(n)"),
        "4"
    );
}

#[test]
fn numeric_for() {
    assert_eq!(run("local s = 0 for i = 1, 5 do s = s + i end print(s)"), "15");
    assert_eq!(run("local s = 0 for i = 5, 1, -1 do s = s + i end print(s)"), "15");
    assert_eq!(run("local n = 0 for i = 1, 0 do n = n + 1 end print(n)"), "0");
    assert_eq!(run("local s = '' for i = 1, 2, 0.5 do s = s .. i .. ' ' end print(s)"), "1.0 1.5 2.0 ");
    assert!(fails("for i = 1, 10, 0 do end").contains("'for' step is zero"));
    assert!(fails("for i = {}, 10 do end").contains("'for' initial value must be a number"));
}

#[test]
fn numeric_for_fresh_binding_per_iteration() {
    let script = "
        local fns = {}
        for i = 1, 3 do fns[i] = function() return i end end
        print(fns[1]() + fns[2]() + fns[3]())
    ";
    assert_eq!(run(script), "6");
}

#[test]
fn generic_for_over_pairs() {
    let script = "
        local t = {a = 1, b = 2, c = 3}
        local sum = 0
        for _, v in pairs(t) do sum = sum + v end
        print(sum)
    ";
    assert_eq!(run(script), "6");
}

#[test]
fn generic_for_over_ipairs() {
    let script = "
        local t = {10, 20, 30}
        local sum = 0
        for i, v in ipairs(t) do sum = sum + i * v end
        print(sum)
    ";
    assert_eq!(run(script), "140");
}

#[test]
fn ipairs_stops_at_first_nil() {
    let script = "
        local t = {1, 2, nil, 4}
        local count = 0
        for _ in ipairs(t) do count = count + 1 end
        print(count)
    ";
    assert_eq!(run(script), "2");
}

#[test]
fn do_block_scoping() {
    assert_eq!(run("local x = 1 do local x = 2 end print(x)"), "1");
}

#[test]
fn goto_is_rejected() {
    assert!(Session::new().execute("goto done ::done::").is_err());
}

// ---- functions ----

#[test]
fn function_definition_and_call() {
    assert_eq!(run("local function add(a, b) return a + b end print(add(2, 3))"), "5");
    assert_eq!(run("function square(x) return x * x end print(square(7))"), "49");
}

#[test]
fn multiple_return_values() {
    let script = "
        local function minmax(a, b)
            if a < b then return a, b else return b, a end
        end
        print(minmax(5, 2))
    ";
    assert_eq!(run(script), "2\t5");
}

#[test]
fn return_value_adjustment() {
    assert_eq!(run("local function f() return 1, 2, 3 end local a, b = f() print(a, b)"), "1\t2");
    assert_eq!(run("local function f() return 1 end local a, b = f() print(a, b)"), "1\tnil");
    // only the last call in a list expands
    assert_eq!(run("local function f() return 1, 2 end print(f(), 9)"), "1\t9");
    assert_eq!(run("local function f() return 1, 2 end print(9, f())"), "9\t1\t2");
}

#[test]
fn missing_arguments_are_nil() {
    assert_eq!(run("local function f(a, b) print(a, b) end f(1)"), "1\tnil");
}

#[test]
fn closures_share_upvalues() {
    let script = "
        local function counter()
            local n = 0
            return function() n = n + 1 return n end,
                   function() return n end
        end
        local bump, peek = counter()
        bump() bump()
        print(peek())
    ";
    assert_eq!(run(script), "2");
}

#[test]
fn recursion() {
    let script = "
        local function fib(n)
            if n < 2 then return n end
            return fib(n - 1) + fib(n - 2)
        end
        print(fib(15))
    ";
    assert_eq!(run(script), "610");
}

#[test]
fn local_function_can_recurse() {
    assert_eq!(
        run("local function fact(n) if n <= 1 then return 1 end return n * fact(n - 1) end print(fact(6))"),
        "720"
    );
}

#[test]
fn varargs() {
    let script = "
        local function count(...) return select('#', ...) end
        print(count(), count(1), count(1, nil, 3))
    ";
    assert_eq!(run(script), "0\t1\t3");
    assert_eq!(run("local function f(...) return ... end print(f(1, 2, 3))"), "1\t2\t3");
    assert_eq!(
        run("local function f(a, ...) return a, ... end print(f(1, 2, 3))"),
        "1\t2\t3"
    );
}

#[test]
fn vararg_outside_vararg_function_fails() {
    assert!(fails("local function f() return ... end f()").contains("outside a vararg function"));
}

#[test]
fn method_call_syntax() {
    let script = "
        local account = {balance = 100}
        function account:deposit(n) self.balance = self.balance + n end
        account:deposit(50)
        print(account.balance)
    ";
    assert_eq!(run(script), "150");
}

#[test]
fn call_shorthand_arguments() {
    assert_eq!(run("local function id(x) return x end print(id'str')"), "str");
    assert_eq!(run("local function first(t) return t[1] end print(first{7, 8})"), "7");
}

#[test]
fn deep_recursion_overflows() {
    let out = run("local function f() return f() end print(pcall(f))");
    assert!(out.contains("false"));
    assert!(out.contains("stack overflow"));
}

// ---- tables ----

#[test]
fn table_constructors() {
    assert_eq!(run("local t = {1, 2, 3} print(t[1], t[3])"), "1\t3");
    assert_eq!(run("local t = {x = 1, ['y'] = 2} print(t.x, t.y)"), "1\t2");
    assert_eq!(run("local t = {[1 + 1] = 'two'} print(t[2])"), "two");
    assert_eq!(run("local t = {1, x = 2, 3} print(t[1], t[2], t.x)"), "1\t3\t2");
}

#[test]
fn constructor_expands_final_call() {
    assert_eq!(
        run("local function f() return 2, 3 end local t = {1, f()} print(#t)"),
        "3"
    );
    assert_eq!(
        run("local function f() return 2, 3 end local t = {f(), 9} print(#t, t[1], t[2])"),
        "2\t2\t9"
    );
}

#[test]
fn nested_tables() {
    assert_eq!(run("local t = {a = {b = {c = 42}}} print(t.a.b.c)"), "42");
}

#[test]
fn float_keys_normalize() {
    assert_eq!(run("local t = {} t[1.0] = 'x' print(t[1])"), "x");
}

#[test]
fn nil_keys_and_nan_keys_fail() {
    assert!(fails("local t = {} t[nil] = 1").contains("table index is nil"));
    assert!(fails("local t = {} t[0/0] = 1").contains("table index is NaN"));
}

#[test]
fn removing_trailing_element_shrinks_length() {
    assert_eq!(run("local t = {1, 2, 3} t[3] = nil print(#t)"), "2");
}

#[test]
fn indexing_nil_fails() {
    assert!(fails("local t print(t.x)").contains("attempt to index a nil value"));
    assert!(fails("return (5).x").contains("attempt to index a number value"));
}

#[test]
fn next_iterates_everything() {
    let script = "
        local t = {10, 20, x = 30}
        local sum, k, v = 0, next(t)
        while k ~= nil do
            sum = sum + v
            k, v = next(t, k)
        end
        print(sum)
    ";
    assert_eq!(run(script), "60");
}

// ---- metatables ----

#[test]
fn index_metamethod_table() {
    let script = "
        local base = {greet = 'hi'}
        local t = setmetatable({}, {__index = base})
        print(t.greet)
    ";
    assert_eq!(run(script), "hi");
}

#[test]
fn index_metamethod_function() {
    let script = "
        local t = setmetatable({}, {__index = function(_, k) return k .. '!' end})
        print(t.x)
    ";
    assert_eq!(run(script), "x!");
}

#[test]
fn chained_index_metatables() {
    let script = "
        local a = {deep = 'found'}
        local b = setmetatable({}, {__index = a})
        local c = setmetatable({}, {__index = b})
        print(c.deep)
    ";
    assert_eq!(run(script), "found");
}

#[test]
fn newindex_metamethod() {
    let script = "
        local log = {}
        local t = setmetatable({}, {__newindex = function(_, k, v) log[#log + 1] = k end})
        t.a = 1
        t.b = 2
        print(#log, rawget(t, 'a'))
    ";
    assert_eq!(run(script), "2\tnil");
}

#[test]
fn newindex_does_not_fire_for_existing_keys() {
    let script = "
        local t = setmetatable({x = 1}, {__newindex = function() error('trap') end})
        t.x = 2
        print(t.x)
    ";
    assert_eq!(run(script), "2");
}

#[test]
fn arithmetic_metamethods() {
    let script = "
        local mt = {__add = function(a, b) return a.v + b.v end,
                    __mul = function(a, b) return a.v * b.v end}
        local a = setmetatable({v = 3}, mt)
        local b = setmetatable({v = 4}, mt)
        print(a + b, a * b)
    ";
    assert_eq!(run(script), "7\t12");
}

#[test]
fn unary_minus_metamethod() {
    let script = "
        local a = setmetatable({v = 5}, {__unm = function(x) return -x.v end})
        print(-a)
    ";
    assert_eq!(run(script), "-5");
}

#[test]
fn eq_lt_le_metamethods() {
    let script = "
        local mt = {
            __eq = function(a, b) return a.v == b.v end,
            __lt = function(a, b) return a.v < b.v end,
            __le = function(a, b) return a.v <= b.v end,
        }
        local a = setmetatable({v = 1}, mt)
        local b = setmetatable({v = 1}, mt)
        local c = setmetatable({v = 2}, mt)
        print(a == b, a < c, a <= b, a == c)
    ";
    assert_eq!(run(script), "true\ttrue\ttrue\tfalse");
}

#[test]
fn call_metamethod() {
    let script = "
        local t = setmetatable({}, {__call = function(self, x) return x * 2 end})
        print(t(21))
    ";
    assert_eq!(run(script), "42");
}

#[test]
fn len_and_concat_metamethods() {
    let script = "
        local t = setmetatable({}, {
            __len = function() return 99 end,
            __concat = function(a, b) return 'joined' end,
        })
        print(#t, t .. 'x', 'x' .. t)
    ";
    assert_eq!(run(script), "99\tjoined\tjoined");
}

#[test]
fn tostring_metamethod() {
    let script = "
        local t = setmetatable({}, {__tostring = function() return 'pretty' end})
        print(t)
        print(tostring(t))
    ";
    assert_eq!(run(script), "pretty\npretty");
}

#[test]
fn protected_metatable() {
    let script = "
        local t = setmetatable({}, {__metatable = 'locked'})
        print(getmetatable(t))
        print(pcall(setmetatable, t, {}))
    ";
    let out = run(script);
    assert!(out.starts_with("locked"));
    assert!(out.contains("false"));
    assert!(out.contains("cannot change a protected metatable"));
}

#[test]
fn rawget_rawset_bypass_metamethods() {
    let script = "
        local t = setmetatable({}, {
            __index = function() return 'meta' end,
            __newindex = function() error('trap') end,
        })
        rawset(t, 'k', 'raw')
        print(rawget(t, 'k'), rawget(t, 'missing'), t.missing)
    ";
    assert_eq!(run(script), "raw\tnil\tmeta");
}

#[test]
fn rawequal_and_rawlen() {
    let script = "
        local mt = {__eq = function() return true end, __len = function() return 99 end}
        local a = setmetatable({1, 2}, mt)
        local b = setmetatable({1, 2}, mt)
        print(a == b, rawequal(a, b), #a, rawlen(a))
    ";
    assert_eq!(run(script), "true\tfalse\t99\t2");
}

// ---- error handling ----

#[test]
fn error_messages_carry_position() {
    let err = fails("local x = 1\nerror('boom')");
    assert!(err.contains("input:2: boom"), "got: {}", err);
}

#[test]
fn error_level_zero_is_unprefixed() {
    let err = fails("error('bare', 0)");
    assert_eq!(err, "bare");
}

#[test]
fn pcall_catches_and_returns_message() {
    assert_eq!(run("print(pcall(function() return 1, 2 end))"), "true\t1\t2");
    let out = run("local ok, err = pcall(function() error('oops') end) print(ok, err)");
    assert!(out.starts_with("false"));
    assert!(out.contains("oops"));
}

#[test]
fn pcall_preserves_non_string_error_values() {
    let script = "
        local ok, err = pcall(function() error({code = 42}) end)
        print(ok, type(err), err.code)
    ";
    assert_eq!(run(script), "false\ttable\t42");
}

#[test]
fn xpcall_runs_handler() {
    let script = "
        local ok, msg = xpcall(function() error('raw') end,
                               function(e) return 'handled: ' .. e end)
        print(ok, msg)
    ";
    let out = run(script);
    assert!(out.starts_with("false\thandled:"));
    assert!(out.contains("raw"));
}

#[test]
fn assert_passes_values_through() {
    assert_eq!(run("print(assert(1, 'unused'))"), "1\tunused");
    assert!(fails("assert(false)").contains("assertion failed!"));
    assert!(fails("assert(nil, 'custom')").contains("custom"));
}

#[test]
fn runtime_type_errors() {
    assert!(fails("local x = nil x()").contains("attempt to call a nil value"));
    assert!(fails("return 5 + {}").contains("attempt to perform arithmetic on a table value"));
}

// ---- basic library ----

#[test]
fn type_function() {
    assert_eq!(
        run("print(type(nil), type(true), type(1), type('s'), type({}), type(print))"),
        "nil\tboolean\tnumber\tstring\ttable\tfunction"
    );
}

#[test]
fn tostring_and_tonumber() {
    assert_eq!(run("print(tostring(nil), tostring(true), tostring(42))"), "nil\ttrue\t42");
    assert_eq!(run("print(tostring(1.5), tostring(10 / 2))"), "1.5\t5.0");
    assert_eq!(run("print(tonumber('42'), tonumber('3.5'), tonumber('bad'))"), "42\t3.5\tnil");
    assert_eq!(run("print(tonumber('0x10'), tonumber('ff', 16), tonumber('10', 2))"), "16\t255\t2");
}

#[test]
fn select_function() {
    assert_eq!(run("print(select('#', 'a', 'b', 'c'))"), "3");
    assert_eq!(run("print(select(2, 'a', 'b', 'c'))"), "b\tc");
    assert_eq!(run("print(select(-1, 'a', 'b', 'c'))"), "c");
}

#[test]
fn unpack_function() {
    assert_eq!(run("print(unpack({1, 2, 3}))"), "1\t2\t3");
    assert_eq!(run("print(table.unpack({1, 2, 3}, 2))"), "2\t3");
    assert_eq!(run("print(table.unpack({1, 2, 3}, 2, 3))"), "2\t3");
}

#[test]
fn version_and_globals_table() {
    assert_eq!(run("print(_VERSION)"), "Lua 5.5");
    assert_eq!(run("x = 7 print(_G.x)"), "7");
    assert_eq!(run("_G.y = 8 print(y)"), "8");
}

#[test]
fn print_formatting() {
    assert_eq!(run("print()"), "");
    assert_eq!(run("print(1, 'two', nil, true)"), "1\ttwo\tnil\ttrue");
    assert_eq!(run("print(1) print(2)"), "1\n2");
    assert_eq!(run("print(1e100)"), "1e+100");
    assert_eq!(run("print(-0.0)"), "-0.0");
}

// ---- string library ----

#[test]
fn string_basics() {
    assert_eq!(run("print(string.len('hello'), ('hello'):len())"), "5\t5");
    assert_eq!(run("print(('hello'):upper(), ('HELLO'):lower())"), "HELLO\thello");
    assert_eq!(run("print(('abc'):reverse())"), "cba");
    assert_eq!(run("print(('ab'):rep(3), ('ab'):rep(3, '-'))"), "ababab\tab-ab-ab");
    assert_eq!(run("print(('ab'):rep(0))"), "");
}

#[test]
fn string_sub() {
    assert_eq!(run("print(('hello'):sub(2, 4))"), "ell");
    assert_eq!(run("print(('hello'):sub(-3))"), "llo");
    assert_eq!(run("print(('hello'):sub(2))"), "ello");
    assert_eq!(run("print(('hello'):sub(4, 2))"), "");
    assert_eq!(run("print(('hello'):sub(-100, 100))"), "hello");
}

#[test]
fn string_byte_char() {
    assert_eq!(run("print(('A'):byte())"), "65");
    assert_eq!(run("print(('ABC'):byte(1, 3))"), "65\t66\t67");
    assert_eq!(run("print(string.char(72, 105))"), "Hi");
    assert!(fails("string.char(300)").contains("value out of range"));
}

#[test]
fn string_find() {
    assert_eq!(run("print(('hello'):find('ll'))"), "3\t4");
    assert_eq!(run("print(('hello'):find('xyz'))"), "nil");
    assert_eq!(run("print(('hello'):find('l', 4))"), "4\t4");
    assert_eq!(run("print(('a.b'):find('.', 1, true))"), "2\t2");
    assert_eq!(run("print(('hello world'):find('(o)%s(w)'))"), "5\t7\to\tw");
}

#[test]
fn string_match() {
    assert_eq!(run("print(('hello 123'):match('%d+'))"), "123");
    assert_eq!(run("print(('key=val'):match('(%w+)=(%w+)'))"), "key\tval");
    assert_eq!(run("print(('abc'):match('%d'))"), "nil");
    assert_eq!(run("print(('hello'):match('(h)(e)(l)'))"), "h\te\tl");
}

#[test]
fn string_gmatch() {
    let script = "
        local words = {}
        for w in ('one two three'):gmatch('%a+') do words[#words + 1] = w end
        print(#words, words[1], words[3])
    ";
    assert_eq!(run(script), "3\tone\tthree");
}

#[test]
fn string_gmatch_with_captures() {
    let script = "
        local out = {}
        for k, v in ('a=1,b=2'):gmatch('(%w+)=(%w+)') do out[k] = v end
        print(out.a, out.b)
    ";
    assert_eq!(run(script), "1\t2");
}

#[test]
fn string_gsub() {
    assert_eq!(run("print(('hello world'):gsub('o', '0'))"), "hell0 w0rld\t2");
    assert_eq!(run("print(('hello'):gsub('l+', 'L'))"), "heLo\t1");
    assert_eq!(run("print(('abc'):gsub('%w', '%0%0'))"), "aabbcc\t3");
    assert_eq!(run("print(('key=val'):gsub('(%w+)=(%w+)', '%2=%1'))"), "val=key\t1");
    assert_eq!(run("print(('hi'):gsub('x', 'y'))"), "hi\t0");
}

#[test]
fn string_gsub_with_limit() {
    assert_eq!(run("print(('aaa'):gsub('a', 'b', 2))"), "bba\t2");
}

#[test]
fn string_gsub_function_replacement() {
    let script = "print(('abc'):gsub('%a', function(c) return c:upper() end))";
    assert_eq!(run(script), "ABC\t3");
    // nil from the function keeps the original text
    let script = "print(('a1b'):gsub('%w', function(c) if c == '1' then return '#' end end))";
    assert_eq!(run(script), "a#b\t3");
}

#[test]
fn string_gsub_table_replacement() {
    let script = "print(('$name is $age'):gsub('%$(%w+)', {name = 'kai', age = 30}))";
    assert_eq!(run(script), "kai is 30\t2");
}

#[test]
fn string_patterns_balanced_and_frontier() {
    assert_eq!(run("print(('f(a(b)c) end'):match('%b()'))"), "(a(b)c)");
    assert_eq!(run("print(('THE quick fox'):match('%f[%l]%l+'))"), "quick");
}

#[test]
fn string_pattern_anchors_and_lazy() {
    assert_eq!(run("print(('hello'):match('^h'))"), "h");
    assert_eq!(run("print(('hello'):match('^e'))"), "nil");
    assert_eq!(run("print(('<a><b>'):match('<(.-)>'))"), "a");
    assert_eq!(run("print(('<a><b>'):match('<(.*)>'))"), "a><b");
}

#[test]
fn string_position_captures() {
    assert_eq!(run("print(('hello'):match('()ll()'))"), "3\t5");
}

#[test]
fn malformed_pattern_errors() {
    let out = run("print(pcall(string.match, 'x', '%'))");
    assert!(out.contains("false"));
    assert!(out.contains("malformed pattern"));
}

#[test]
fn string_format_basics() {
    assert_eq!(run("print(string.format('%d apples', 3))"), "3 apples");
    assert_eq!(run("print(string.format('%5d|%-5d|', 42, 42))"), "   42|42   |");
    assert_eq!(run("print(string.format('%05d', 42))"), "00042");
    assert_eq!(run("print(string.format('%+d %+d', 5, -5))"), "+5 -5");
    assert_eq!(run("print(string.format('%x %X %o', 255, 255, 8))"), "ff FF 10");
    assert_eq!(run("print(string.format('%#x', 255))"), "0xff");
}

#[test]
fn string_format_floats_and_strings() {
    assert_eq!(run("print(string.format('%.2f', 3.14159))"), "3.14");
    assert_eq!(run("print(string.format('%6.2f|', 3.14159))"), "  3.14|");
    assert_eq!(run("print(string.format('%e', 1500.0))"), "1.500000e+03");
    assert_eq!(run("print(string.format('%g %g', 0.5, 1e20))"), "0.5 1e+20");
    assert_eq!(run("print(string.format('%s=%s', 'k', 42))"), "k=42");
    assert_eq!(run("print(string.format('%.3s', 'hello'))"), "hel");
    assert_eq!(run("print(string.format('%c%c', 72, 105))"), "Hi");
    assert_eq!(run("print(string.format('100%%'))"), "100%");
}

#[test]
fn string_format_quoted() {
    assert_eq!(run(r#"print(string.format('%q', 'a"b'))"#), r#""a\"b""#);
    assert_eq!(run(r#"print(string.format('%q', 'a\nb'))"#), r#""a\nb""#);
}

#[test]
fn string_format_errors() {
    assert!(fails("string.format('%d', 'abc')").contains("bad argument"));
    assert!(fails("string.format('%?', 1)").contains("invalid conversion"));
}

// ---- table library ----

#[test]
fn table_insert_remove() {
    assert_eq!(run("local t = {1, 2} table.insert(t, 3) print(#t, t[3])"), "3\t3");
    assert_eq!(run("local t = {1, 3} table.insert(t, 2, 2) print(t[1], t[2], t[3])"), "1\t2\t3");
    assert_eq!(run("local t = {1, 2, 3} print(table.remove(t), #t)"), "3\t2");
    assert_eq!(run("local t = {1, 2, 3} print(table.remove(t, 1), t[1])"), "1\t2");
    assert!(fails("table.insert({1}, 5, 'x')").contains("position out of bounds"));
}

#[test]
fn table_concat() {
    assert_eq!(run("print(table.concat({1, 2, 3}))"), "123");
    assert_eq!(run("print(table.concat({'a', 'b', 'c'}, ', '))"), "a, b, c");
    assert_eq!(run("print(table.concat({'a', 'b', 'c'}, '-', 2, 3))"), "b-c");
    assert_eq!(run("print(table.concat({}))"), "");
    assert!(fails("table.concat({{}})").contains("invalid value"));
}

#[test]
fn table_sort() {
    assert_eq!(run("local t = {3, 1, 2} table.sort(t) print(t[1], t[2], t[3])"), "1\t2\t3");
    assert_eq!(
        run("local t = {1, 3, 2} table.sort(t, function(a, b) return a > b end) print(t[1], t[3])"),
        "3\t1"
    );
    assert_eq!(
        run("local t = {'banana', 'apple'} table.sort(t) print(t[1])"),
        "apple"
    );
}

#[test]
fn table_sort_comparator_errors_propagate() {
    let out = run("print(pcall(table.sort, {1, 2, 3}, function() error('bad cmp') end))");
    assert!(out.contains("false"));
    assert!(out.contains("bad cmp"));
}

#[test]
fn table_move() {
    assert_eq!(
        run("local t = table.move({1, 2, 3}, 1, 3, 2, {}) print(t[2], t[3], t[4])"),
        "1\t2\t3"
    );
    assert_eq!(
        run("local t = {1, 2, 3, 4} table.move(t, 1, 3, 2) print(t[1], t[2], t[3], t[4])"),
        "1\t1\t2\t3"
    );
}

#[test]
fn table_pack() {
    assert_eq!(run("local t = table.pack(1, nil, 3) print(t.n, t[1], t[3])"), "3\t1\t3");
}

// ---- math library ----

#[test]
fn math_basics() {
    assert_eq!(run("print(math.abs(-5), math.abs(5), math.abs(-2.5))"), "5\t5\t2.5");
    assert_eq!(run("print(math.floor(3.7), math.ceil(3.2), math.floor(-3.5))"), "3\t4\t-4");
    assert_eq!(run("print(math.sqrt(16))"), "4.0");
    assert_eq!(run("print(math.max(3, 1, 2), math.min(3, 1, 2))"), "3\t1");
    assert_eq!(run("print(math.fmod(7, 3), math.fmod(-7, 3))"), "1\t-1");
}

#[test]
fn math_modf() {
    assert_eq!(run("print(math.modf(3.7))"), "3\t0.7");
    assert_eq!(run("print(math.modf(-3.5))"), "-3\t-0.5");
}

#[test]
fn math_subtype_inspection() {
    assert_eq!(run("print(math.type(1), math.type(1.0), math.type('x'))"), "integer\tfloat\tnil");
    assert_eq!(run("print(math.tointeger(3.0), math.tointeger(3.5))"), "3\tnil");
}

#[test]
fn math_constants() {
    assert_eq!(run("print(math.huge > 1e300, -math.huge < -1e300)"), "true\ttrue");
    assert_eq!(run("print(math.pi > 3.14 and math.pi < 3.15)"), "true");
    assert_eq!(run("print(math.maxinteger, math.mininteger)"),
               format!("{}\t{}", i64::MAX, i64::MIN));
}

#[test]
fn math_random_ranges() {
    let script = "
        math.randomseed(42)
        for _ = 1, 50 do
            local r = math.random()
            assert(r >= 0 and r < 1)
            local d = math.random(6)
            assert(d >= 1 and d <= 6 and math.type(d) == 'integer')
            local n = math.random(10, 20)
            assert(n >= 10 and n <= 20)
        end
        print('ok')
    ";
    assert_eq!(run(script), "ok");
}

#[test]
fn math_randomseed_reproducible() {
    let script = "
        math.randomseed(7)
        local a = math.random(1000000)
        math.randomseed(7)
        local b = math.random(1000000)
        print(a == b)
    ";
    assert_eq!(run(script), "true");
}

#[test]
fn math_random_empty_interval() {
    assert!(fails("math.random(5, 1)").contains("interval is empty"));
}

#[test]
fn huge_rep_trips_string_limit() {
    let out = run("print(pcall(string.rep, 'ab', math.maxinteger))");
    assert!(out.contains("false"));
    assert!(out.contains("string length overflow"));
    let out = run("print(pcall(string.rep, 'x', 11 * 1024 * 1024))");
    assert!(out.contains("false"));
    assert!(out.contains("string length overflow"));
}

#[test]
fn unpack_range_spanning_integer_line_is_rejected() {
    let out = run("print(pcall(table.unpack, {}, math.mininteger, math.maxinteger))");
    assert!(out.contains("false"));
    assert!(out.contains("too many results to unpack"));
}

#[test]
fn mixed_number_comparisons_are_exact_at_the_edges() {
    assert_eq!(
        eval1("math.maxinteger < math.maxinteger + 0.0"),
        HostValue::Bool(true)
    );
    assert_eq!(
        eval1("math.maxinteger + 0.0 <= math.maxinteger"),
        HostValue::Bool(false)
    );
    assert_eq!(
        eval1("math.maxinteger == math.maxinteger + 0.0"),
        HostValue::Bool(false)
    );
    assert_eq!(
        eval1("math.mininteger <= math.mininteger + 0.0"),
        HostValue::Bool(true)
    );
    assert_eq!(
        eval1("math.mininteger + 0.0 < math.mininteger"),
        HostValue::Bool(false)
    );
    assert_eq!(eval1("1 < 1.5"), HostValue::Bool(true));
    assert_eq!(eval1("2.5 < 3"), HostValue::Bool(true));
    assert_eq!(eval1("0/0 < 1"), HostValue::Bool(false));
    assert_eq!(eval1("1 < 0/0"), HostValue::Bool(false));
}

// ---- os library ----

#[test]
fn os_clock_and_time() {
    assert_eq!(run("print(type(os.clock()), os.clock() >= 0)"), "number\ttrue");
    assert_eq!(run("print(math.type(os.time()))"), "integer");
    assert_eq!(run("print(os.difftime(10, 4))"), "6.0");
}
