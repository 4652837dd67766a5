#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use once_cell::sync::Lazy;
    use rustc_hash::FxHashMap;

    use crate::ast::BinOp;
    use crate::error::{Error, EvalError};
    use crate::eval::{eval, exec_file, Thread};
    use crate::resolve::{default_options, set_default_options, Options};
    use crate::val::{equal, ForeignValue, StringDict, Value};

    /// Serializes tests that flip the process-wide dialect defaults.
    static OPTIONS_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn with_options<T>(opts: Options, f: impl FnOnce() -> T) -> T {
        let guard = OPTIONS_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let prev = default_options();
        set_default_options(opts);
        let out = f();
        set_default_options(prev);
        drop(guard);
        out
    }

    fn eval_str(thread: &mut Thread, src: &str, env: &StringDict) -> String {
        match eval(thread, "<expr>", src, env) {
            Ok(v) => v.repr(),
            Err(Error::Eval(e)) => e.to_string(),
            Err(e) => e.to_string(),
        }
    }

    fn exec(thread: &mut Thread, filename: &str, src: &str) -> Result<StringDict, Error> {
        exec_file(thread, filename, Some(src), &StringDict::new())
    }

    #[test]
    fn eval_expr_table() {
        let mut thread = Thread::new();
        let env = StringDict::new();
        for (src, want) in [
            ("123", "123"),
            ("-1", "-1"),
            ("\"a\"+\"b\"", "\"ab\""),
            ("1+2", "3"),
            // lists
            ("[]", "[]"),
            ("[1]", "[1]"),
            ("[1,]", "[1]"),
            ("[1, 2]", "[1, 2]"),
            ("[2 * x for x in [1, 2, 3]]", "[2, 4, 6]"),
            ("[2 * x for x in [1, 2, 3] if x > 1]", "[4, 6]"),
            (
                "[(x, y) for x in [1, 2] for y in [3, 4]]",
                "[(1, 3), (1, 4), (2, 3), (2, 4)]",
            ),
            (
                "[(x, y) for x in [1, 2] if x == 2 for y in [3, 4]]",
                "[(2, 3), (2, 4)]",
            ),
            // tuples
            ("()", "()"),
            ("(1)", "1"),
            ("(1,)", "(1,)"),
            ("(1, 2)", "(1, 2)"),
            ("(1, 2, 3, 4, 5)", "(1, 2, 3, 4, 5)"),
            ("1, 2", "(1, 2)"),
            // dicts
            ("{}", "{}"),
            ("{\"a\": 1}", "{\"a\": 1}"),
            ("{\"a\": 1,}", "{\"a\": 1}"),
            ("{k: v for k, v in [(\"a\", 1), (\"b\", 2)]}", "{\"a\": 1, \"b\": 2}"),
            // conditionals
            ("1 if 3 > 2 else 0", "1"),
            ("1 if \"foo\" else 0", "1"),
            ("1 if \"\" else 0", "0"),
            // and/or keep operand values
            ("0 or \"a\"", "\"a\""),
            ("1 and \"a\"", "\"a\""),
            ("None or False", "False"),
            // indexing
            ("[\"a\", \"b\"][0]", "\"a\""),
            ("[\"a\", \"b\"][1]", "\"b\""),
            ("(\"a\", \"b\")[0]", "\"a\""),
            ("(\"a\", \"b\")[1]", "\"b\""),
            ("\"aΩb\"[0]", "\"a\""),
            ("\"aΩb\"[1]", "\"\\xce\""),
            ("\"aΩb\"[3]", "\"b\""),
            ("{\"a\": 1}[\"a\"]", "1"),
            ("{\"a\": 1}[\"b\"]", "key \"b\" not in dict"),
            ("{}[[]]", "unhashable type: list"),
            ("{\"a\": 1}[[]]", "unhashable type: list"),
            ("[x for x in range(3)]", "[0, 1, 2]"),
            // slicing
            ("\"banana\"[1:3]", "\"an\""),
            ("\"banana\"[::2]", "\"bnn\""),
            ("\"banana\"[::-1]", "\"ananab\""),
            ("[1, 2, 3, 4][1:-1]", "[2, 3]"),
            // arithmetic
            ("7 // 2", "3"),
            ("-7 // 2", "-4"),
            ("7 % -2", "-1"),
            ("2 * \"mur\"", "\"murmur\""),
            ("\"mur\" * 2", "\"murmur\""),
            ("(None,) * 2", "(None, None)"),
            ("1 << 8", "256"),
            ("~0", "-1"),
            ("1 // 0", "floored division by zero"),
            // membership
            ("2 in [1, 2]", "True"),
            ("3 not in [1, 2]", "True"),
            ("\"an\" in \"banana\"", "True"),
            ("\"a\" in {\"a\": 1}", "True"),
            ("1 in range(5)", "True"),
            // misc errors
            ("\"a\" * None", "unknown binary op: string * NoneType"),
            ("(1)(2)", "invalid call of non-function (int)"),
        ] {
            assert_eq!(eval_str(&mut thread, src, &env), want, "eval {}", src);
        }
    }

    #[test]
    fn parameter_passing() {
        const SRC: &str = "\
def a():
    return
def b(a, b):
    return a, b
def c(a, b=42):
    return a, b
def d(*args):
    return args
def e(**kwargs):
    return kwargs
def f(a, b=42, *args, **kwargs):
    return a, b, args, kwargs
def g(a, b=42, *args, c=123, **kwargs):
    return a, b, args, c, kwargs
def h(a, b=42, *, c=123, **kwargs):
    return a, b, c, kwargs
def i(a, b=42, *, c, d=123, e, **kwargs):
    return a, b, c, d, e, kwargs
def j(a, b=42, *args, c, d=123, e, **kwargs):
    return a, b, args, c, d, e, kwargs
";
        let mut thread = Thread::new();
        let globals = exec(&mut thread, "parameters.bst", SRC).expect("exec");

        for (src, want) in [
            // a()
            ("a()", "None"),
            ("a(1)", "function a accepts no arguments (1 given)"),
            // b(a, b)
            ("b()", "function b missing 2 arguments (a, b)"),
            ("b(1)", "function b missing 1 argument (b)"),
            ("b(a=1)", "function b missing 1 argument (b)"),
            ("b(b=1)", "function b missing 1 argument (a)"),
            ("b(1, 2)", "(1, 2)"),
            ("b", "<function b>"),
            ("b(1, 2, 3)", "function b accepts 2 positional arguments (3 given)"),
            ("b(1, b=2)", "(1, 2)"),
            ("b(1, a=2)", "function b got multiple values for parameter \"a\""),
            ("b(1, x=2)", "function b got an unexpected keyword argument \"x\""),
            ("b(a=1, b=2)", "(1, 2)"),
            ("b(b=1, a=2)", "(2, 1)"),
            ("b(b=1, a=2, x=1)", "function b got an unexpected keyword argument \"x\""),
            ("b(x=1, b=1, a=2)", "function b got an unexpected keyword argument \"x\""),
            // c(a, b=42)
            ("c()", "function c missing 1 argument (a)"),
            ("c(1)", "(1, 42)"),
            ("c(1, 2)", "(1, 2)"),
            ("c(1, 2, 3)", "function c accepts at most 2 positional arguments (3 given)"),
            ("c(1, b=2)", "(1, 2)"),
            ("c(1, a=2)", "function c got multiple values for parameter \"a\""),
            ("c(a=1, b=2)", "(1, 2)"),
            ("c(b=1, a=2)", "(2, 1)"),
            // d(*args)
            ("d()", "()"),
            ("d(1)", "(1,)"),
            ("d(1, 2)", "(1, 2)"),
            ("d(1, 2, k=3)", "function d got an unexpected keyword argument \"k\""),
            ("d(args=[])", "function d got an unexpected keyword argument \"args\""),
            // e(**kwargs)
            ("e()", "{}"),
            ("e(1)", "function e accepts 0 positional arguments (1 given)"),
            ("e(k=1)", "{\"k\": 1}"),
            ("e(kwargs={})", "{\"kwargs\": {}}"),
            // f(a, b=42, *args, **kwargs)
            ("f()", "function f missing 1 argument (a)"),
            ("f(0)", "(0, 42, (), {})"),
            ("f(0, 1)", "(0, 1, (), {})"),
            ("f(0, 1, 2)", "(0, 1, (2,), {})"),
            ("f(0, 1, 2, 3)", "(0, 1, (2, 3), {})"),
            ("f(a=0)", "(0, 42, (), {})"),
            ("f(0, b=1)", "(0, 1, (), {})"),
            ("f(0, a=1)", "function f got multiple values for parameter \"a\""),
            ("f(0, b=1, c=2)", "(0, 1, (), {\"c\": 2})"),
            (
                "f(0, 1, x=2, *[3, 4], y=5, **dict(z=6))",
                "(0, 1, (3, 4), {\"x\": 2, \"y\": 5, \"z\": 6})",
            ),
            // g(a, b=42, *args, c=123, **kwargs)
            ("g()", "function g missing 1 argument (a)"),
            ("g(0)", "(0, 42, (), 123, {})"),
            ("g(0, 1)", "(0, 1, (), 123, {})"),
            ("g(0, 1, 2)", "(0, 1, (2,), 123, {})"),
            ("g(0, 1, 2, 3)", "(0, 1, (2, 3), 123, {})"),
            ("g(a=0)", "(0, 42, (), 123, {})"),
            ("g(0, b=1)", "(0, 1, (), 123, {})"),
            ("g(0, a=1)", "function g got multiple values for parameter \"a\""),
            ("g(0, b=1, c=2, d=3)", "(0, 1, (), 2, {\"d\": 3})"),
            (
                "g(0, 1, x=2, *[3, 4], y=5, **dict(z=6))",
                "(0, 1, (3, 4), 123, {\"x\": 2, \"y\": 5, \"z\": 6})",
            ),
            // h(a, b=42, *, c=123, **kwargs)
            ("h()", "function h missing 1 argument (a)"),
            ("h(0)", "(0, 42, 123, {})"),
            ("h(0, 1)", "(0, 1, 123, {})"),
            ("h(0, 1, 2)", "function h accepts at most 2 positional arguments (3 given)"),
            ("h(a=0)", "(0, 42, 123, {})"),
            ("h(0, b=1)", "(0, 1, 123, {})"),
            ("h(0, a=1)", "function h got multiple values for parameter \"a\""),
            ("h(0, b=1, c=2)", "(0, 1, 2, {})"),
            ("h(0, b=1, d=2)", "(0, 1, 123, {\"d\": 2})"),
            ("h(0, b=1, c=2, d=3)", "(0, 1, 2, {\"d\": 3})"),
            // i(a, b=42, *, c, d=123, e, **kwargs)
            ("i()", "function i missing 3 arguments (a, c, e)"),
            ("i(0)", "function i missing 2 arguments (c, e)"),
            ("i(0, 1)", "function i missing 2 arguments (c, e)"),
            ("i(0, 1, 2)", "function i accepts at most 2 positional arguments (3 given)"),
            ("i(0, 1, e=2)", "function i missing 1 argument (c)"),
            ("i(0, 1, 2, 3)", "function i accepts at most 2 positional arguments (4 given)"),
            ("i(a=0)", "function i missing 2 arguments (c, e)"),
            ("i(0, b=1)", "function i missing 2 arguments (c, e)"),
            ("i(0, a=1)", "function i got multiple values for parameter \"a\""),
            ("i(0, b=1, c=2)", "function i missing 1 argument (e)"),
            ("i(0, b=1, d=2)", "function i missing 2 arguments (c, e)"),
            ("i(0, b=1, c=2, d=3)", "function i missing 1 argument (e)"),
            ("i(0, b=1, c=2, d=3, e=4)", "(0, 1, 2, 3, 4, {})"),
            (
                "i(0, 1, b=1, c=2, d=3, e=4)",
                "function i got multiple values for parameter \"b\"",
            ),
            // j(a, b=42, *args, c, d=123, e, **kwargs)
            ("j()", "function j missing 3 arguments (a, c, e)"),
            ("j(0)", "function j missing 2 arguments (c, e)"),
            ("j(0, 1)", "function j missing 2 arguments (c, e)"),
            ("j(0, 1, 2)", "function j missing 2 arguments (c, e)"),
            ("j(0, 1, e=2)", "function j missing 1 argument (c)"),
            ("j(0, 1, 2, 3)", "function j missing 2 arguments (c, e)"),
            ("j(a=0)", "function j missing 2 arguments (c, e)"),
            ("j(0, b=1)", "function j missing 2 arguments (c, e)"),
            ("j(0, a=1)", "function j got multiple values for parameter \"a\""),
            ("j(0, b=1, c=2)", "function j missing 1 argument (e)"),
            ("j(0, b=1, d=2)", "function j missing 2 arguments (c, e)"),
            ("j(0, b=1, c=2, d=3)", "function j missing 1 argument (e)"),
            ("j(0, b=1, c=2, d=3, e=4)", "(0, 1, (), 2, 3, 4, {})"),
            (
                "j(0, 1, b=1, c=2, d=3, e=4)",
                "function j got multiple values for parameter \"b\"",
            ),
            ("j(0, 1, 2, c=3, e=4)", "(0, 1, (2,), 3, 123, 4, {})"),
        ] {
            assert_eq!(eval_str(&mut thread, src, &globals), want, "eval {}", src);
        }
    }

    /// Continuity of the active call stack, including propagation through
    /// builtins such as `min`.
    #[test]
    fn traceback_spans_builtin_frames() {
        const SRC: &str = "\ndef f(x): return 1//x\ndef g(x): f(x)\ndef h(): return min([1, 2, 0], key=g)\ndef i(): return h()\ni()\n";
        let mut thread = Thread::new();
        let err = exec(&mut thread, "crash.bst", SRC).expect_err("must fail");
        let eval_err = match err {
            Error::Eval(e) => e,
            other => panic!("want EvalError, got {:?}", other),
        };
        let want = "Traceback (most recent call last):\n  \
                    crash.bst:6:2: in <toplevel>\n  \
                    crash.bst:5:18: in i\n  \
                    crash.bst:4:20: in h\n  \
                    <builtin>: in min\n  \
                    crash.bst:3:12: in g\n  \
                    crash.bst:2:19: in f\n\
                    Error: floored division by zero";
        assert_eq!(eval_err.backtrace(), want);
    }

    /// A program compiled once runs repeatedly with different predeclared
    /// values.
    #[test]
    fn repeated_exec_with_varying_predeclared() {
        let mut predeclared = StringDict::new();
        predeclared.insert("x", Value::None);
        let (_, prog) = crate::eval::source_program("repeat.bst", "y = 2 * x", |n| {
            predeclared.has(n)
        })
        .expect("compile");

        for (x, want) in [
            (Value::int(42), Value::int(84)),
            (Value::str_("mur"), Value::str_("murmur")),
            (
                Value::new_tuple(vec![Value::None]),
                Value::new_tuple(vec![Value::None, Value::None]),
            ),
        ] {
            let mut env = StringDict::new();
            env.insert("x", x.clone());
            let mut thread = Thread::new();
            let globals = prog.init(&mut thread, &env).expect("init");
            let y = globals.get("y").expect("y");
            assert!(equal(y, &want).expect("equal"), "x={:?}: y={:?}", x, y);
        }
    }

    #[test]
    fn globals_are_frozen_after_exec() {
        let mut thread = Thread::new();
        let globals = exec(&mut thread, "mod.bst", "l = [1, 2]\nd = {\"a\": 1}\n").expect("exec");
        assert_eq!(
            eval_str(&mut thread, "l.append(3)", &globals),
            "cannot append to frozen list"
        );
        assert_eq!(
            eval_str(&mut thread, "d.clear()", &globals),
            "cannot clear frozen dict"
        );
    }

    #[test]
    fn mutation_during_iteration_is_rejected() {
        const SRC: &str = "\
def f():
    l = [1, 2]
    for x in l:
        l.insert(0, x)
f()
";
        let mut thread = Thread::new();
        let err = exec(&mut thread, "iter.bst", SRC).expect_err("must fail");
        assert!(
            err.to_string()
                .contains("cannot insert into list during iteration"),
            "wrong error: {}",
            err
        );
    }

    #[test]
    fn iterators_release_on_error_unwind() {
        const SRC: &str = "\
def f(l):
    for x in l:
        [1][5]
f(input)
";
        let mut thread = Thread::new();
        let mut env = StringDict::new();
        let list = Value::new_list(vec![Value::int(1)]);
        env.insert("input", list.clone());
        let err =
            exec_file(&mut thread, "unwind.bst", Some(SRC), &env).expect_err("must fail");
        assert!(err.to_string().contains("out of range"), "{}", err);
        // The failing frame is gone; nothing still pins its iterator.
        match &list {
            Value::List(l) => l.append(Value::int(2)).expect("list must be mutable again"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn closures_share_cells() {
        const SRC: &str = "\
def counter():
    n = [0]
    def bump():
        n.append(len(n))
        return len(n)
    return bump
c = counter()
a = c()
b = c()
";
        with_options(
            Options {
                allow_nested_def: true,
                ..Options::default()
            },
            || {
                let mut thread = Thread::new();
                let globals = exec(&mut thread, "closure.bst", SRC).expect("exec");
                assert_eq!(globals.get("a").expect("a").repr(), "2");
                assert_eq!(globals.get("b").expect("b").repr(), "3");
            },
        )
    }

    #[test]
    fn while_loops_and_recursion_require_the_gate() {
        with_options(Options::default(), || {
            let mut thread = Thread::new();
            // Rejected at resolve time without the gate.
            let err = exec(
                &mut thread,
                "w.bst",
                "def f():\n    while True:\n        break\n",
            )
            .expect_err("must fail");
            assert!(err.to_string().contains("allow_recursion"), "{}", err);

            // Recursive calls are rejected at run time without the gate.
            let err = exec(&mut thread, "r.bst", "def f(n): return f(n)\nf(1)\n")
                .expect_err("must fail");
            assert!(
                err.to_string().contains("function f called recursively"),
                "{}",
                err
            );
        });

        with_options(
            Options {
                allow_recursion: true,
                ..Options::default()
            },
            || {
                const SRC: &str = "\
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)

def sum_below(n):
    total = 0
    i = 0
    while i < n:
        total += i
        i += 1
    return total

a = fib(10)
b = sum_below(10)
";
                let mut thread = Thread::new();
                let globals = exec(&mut thread, "rec.bst", SRC).expect("exec");
                assert_eq!(globals.get("a").expect("a").repr(), "55");
                assert_eq!(globals.get("b").expect("b").repr(), "45");
            },
        )
    }

    #[test]
    fn load_resolves_through_the_host_callback() {
        let mut thread = Thread::new();
        thread.set_load(|_thread, module| {
            if module == "lib.bst" {
                let mut d = StringDict::new();
                d.insert("answer", Value::int(42));
                Ok(d)
            } else {
                Err(Error::Eval(EvalError::other("no such module")))
            }
        });
        let globals = exec(
            &mut thread,
            "main.bst",
            "load(\"lib.bst\", \"answer\")\ny = answer + 1\n",
        )
        .expect("exec");
        assert_eq!(globals.get("y").expect("y").repr(), "43");

        let err = exec(
            &mut thread,
            "main.bst",
            "load(\"lib.bst\", \"missing\")\n",
        )
        .expect_err("must fail");
        assert!(
            err.to_string()
                .contains("load: name \"missing\" not found in module \"lib.bst\""),
            "{}",
            err
        );

        let err = exec(&mut thread, "main.bst", "load(\"nope.bst\", \"x\")\n")
            .expect_err("must fail");
        assert!(err.to_string().contains("cannot load nope.bst"), "{}", err);
    }

    // A host record that permits any field to be set, and answers
    // list + hasfields with 42 through the binary-op protocol.
    #[derive(Debug)]
    struct HasFields {
        frozen: AtomicBool,
        attrs: Mutex<FxHashMap<String, Value>>,
    }

    impl HasFields {
        fn new() -> Arc<HasFields> {
            Arc::new(HasFields {
                frozen: AtomicBool::new(false),
                attrs: Mutex::new(FxHashMap::default()),
            })
        }
    }

    impl ForeignValue for HasFields {
        fn type_name(&self) -> &'static str {
            "hasfields"
        }

        fn freeze_value(&self) {
            self.frozen.store(true, Ordering::Release);
        }

        fn hash_value(&self) -> Result<u32, EvalError> {
            Ok(42)
        }

        fn attr(&self, name: &str) -> Result<Option<Value>, EvalError> {
            Ok(self.attrs.lock().unwrap().get(name).cloned())
        }

        fn attr_names(&self) -> Vec<String> {
            let mut names: Vec<String> = self.attrs.lock().unwrap().keys().cloned().collect();
            names.sort();
            names
        }

        fn set_attr(&self, name: &str, value: &Value) -> Result<(), EvalError> {
            if self.frozen.load(Ordering::Acquire) {
                return Err(EvalError::frozen("cannot set field on a frozen hasfields"));
            }
            self.attrs
                .lock()
                .unwrap()
                .insert(name.to_string(), value.clone());
            Ok(())
        }

        fn binary(
            &self,
            op: BinOp,
            other: &Value,
            _this_on_left: bool,
        ) -> Result<Option<Value>, EvalError> {
            if op == BinOp::Add {
                if let Value::List(_) = other {
                    return Ok(Some(Value::int(42)));
                }
            }
            Ok(None)
        }
    }

    #[test]
    fn foreign_values_join_the_attribute_and_binary_protocols() {
        let mut env = StringDict::new();
        env.insert("hf", Value::Foreign(HasFields::new()));
        let mut thread = Thread::new();
        const SRC: &str = "\
hf.x = 1
y = hf.x
def bump(l):
    l += hf
    return l
z = bump([1])
";
        let globals = exec_file(&mut thread, "host.bst", Some(SRC), &env).expect("exec");
        assert_eq!(globals.get("y").expect("y").repr(), "1");
        // list += hasfields falls through to the binary hook.
        assert_eq!(globals.get("z").expect("z").repr(), "42");

        // Genuinely absent attributes are a missing-attribute error.
        let err = eval(&mut thread, "<expr>", "hf.nope", &env).expect_err("must fail");
        assert!(
            err.to_string().contains("hasfields has no .nope field or method"),
            "{}",
            err
        );
    }

    // An infinite iterable host value: the Fibonacci sequence.
    #[derive(Debug)]
    struct Fib;

    impl ForeignValue for Fib {
        fn type_name(&self) -> &'static str {
            "fib"
        }

        fn iterate(&self) -> Option<Box<dyn Iterator<Item = Value> + Send>> {
            let mut state = (0i64, 1i64);
            Some(Box::new(std::iter::from_fn(move || {
                let v = state.0;
                state = (state.1, state.0 + state.1);
                Some(Value::int(v))
            })))
        }
    }

    #[test]
    fn foreign_infinite_iterables_work_with_zip() {
        let mut env = StringDict::new();
        env.insert("fibonacci", Value::Foreign(Arc::new(Fib)));
        let mut thread = Thread::new();
        assert_eq!(
            eval_str(&mut thread, "[x[1] for x in zip(range(6), fibonacci)]", &env),
            "[0, 1, 1, 2, 3, 5]"
        );
    }

    #[test]
    fn string_method_errors_are_stable() {
        let mut thread = Thread::new();
        let env = StringDict::new();
        assert_eq!(
            eval_str(&mut thread, "\"\".join([1])", &env),
            "join: in list, want string, got int"
        );
        assert_eq!(eval_str(&mut thread, "\"-\".join([\"a\", \"b\"])", &env), "\"a-b\"");
        assert_eq!(
            eval_str(&mut thread, "\"a,b,c\".split(\",\")", &env),
            "[\"a\", \"b\", \"c\"]"
        );
        assert_eq!(
            eval_str(&mut thread, "\"  x \".strip()", &env),
            "\"x\""
        );
        assert_eq!(
            eval_str(&mut thread, "\"{} and {name}\".format(1, name=2)", &env),
            "\"1 and 2\""
        );
    }

    #[test]
    fn builtin_surface() {
        let mut thread = Thread::new();
        let env = StringDict::new();
        for (src, want) in [
            ("len(\"abc\")", "3"),
            ("len([1, 2])", "2"),
            ("type(1)", "\"int\""),
            ("type(\"\")", "\"string\""),
            ("str(42)", "\"42\""),
            ("str(\"x\")", "\"x\""),
            ("repr(\"x\")", "\"\\\"x\\\"\""),
            ("bool([])", "False"),
            ("bool([0])", "True"),
            ("int(\"ff\", 16)", "255"),
            ("int(\"-12\")", "-12"),
            ("int(True)", "1"),
            ("chr(65)", "\"A\""),
            ("ord(\"A\")", "65"),
            ("min([3, 1, 2])", "1"),
            ("max(3, 1, 2)", "3"),
            ("sorted([3, 1, 2])", "[1, 2, 3]"),
            ("sorted([\"aaa\", \"a\", \"aa\"], key=len)", "[\"a\", \"aa\", \"aaa\"]"),
            ("sorted([1, 3, 2], reverse=True)", "[3, 2, 1]"),
            ("reversed([1, 2, 3])", "[3, 2, 1]"),
            ("enumerate([\"a\", \"b\"])", "[(0, \"a\"), (1, \"b\")]"),
            ("zip([1, 2], [\"a\", \"b\"])", "[(1, \"a\"), (2, \"b\")]"),
            ("any([0, 1])", "True"),
            ("all([1, 0])", "False"),
            ("list((1, 2))", "[1, 2]"),
            ("tuple([1, 2])", "(1, 2)"),
            ("dict([(\"a\", 1)], b=2)", "{\"a\": 1, \"b\": 2}"),
            ("range(3)", "range(3)"),
            ("range(1, 10, 2)", "range(1, 10, 2)"),
            ("len(range(1, 10, 2))", "5"),
            ("getattr(\"x\", \"upper\")()", "\"X\""),
            ("hasattr([], \"append\")", "True"),
            ("hasattr([], \"nope\")", "False"),
            ("min([], key=None)", "min: argument is an empty sequence"),
            ("fail(\"boom\")", "fail: boom"),
        ] {
            assert_eq!(eval_str(&mut thread, src, &env), want, "eval {}", src);
        }
    }

    #[test]
    fn struct_and_module_values() {
        let mut thread = Thread::new();
        let globals = exec(
            &mut thread,
            "records.bst",
            "s = struct(a=1, b=\"x\")\nm = module(\"lib\", version=3)\n",
        )
        .expect("exec");
        assert_eq!(eval_str(&mut thread, "s.a", &globals), "1");
        assert_eq!(eval_str(&mut thread, "s", &globals), "struct(a = 1, b = \"x\")");
        assert_eq!(eval_str(&mut thread, "m.version", &globals), "3");
        assert_eq!(eval_str(&mut thread, "m", &globals), "<module \"lib\">");
        assert_eq!(
            eval_str(&mut thread, "m.missing", &globals),
            "module has no .missing field or method"
        );
        assert_eq!(
            eval_str(&mut thread, "s == struct(b=\"x\", a=1)", &globals),
            "True"
        );
    }

    #[test]
    fn sets_behind_the_gate() {
        with_options(
            Options {
                allow_set: true,
                ..Options::default()
            },
            || {
                let mut thread = Thread::new();
                let env = StringDict::new();
                for (src, want) in [
                    ("{1, 2} | {2, 3}", "set([1, 2, 3])"),
                    ("{1, 2} & {2, 3}", "set([2])"),
                    ("{1, 2} - {2}", "set([1])"),
                    ("{1, 2} ^ {2, 3}", "set([1, 3])"),
                    ("2 in {1, 2}", "True"),
                    ("set([3, 1, 3])", "set([3, 1])"),
                ] {
                    assert_eq!(eval_str(&mut thread, src, &env), want, "eval {}", src);
                }
            },
        )
    }

    #[test]
    fn unpacking_assignments() {
        let mut thread = Thread::new();
        let globals = exec(
            &mut thread,
            "unpack.bst",
            "a, b = [1, 2]\nc, d = (3, 4)\ne = a + b + c + d\n",
        )
        .expect("exec");
        assert_eq!(globals.get("e").expect("e").repr(), "10");

        let err = exec(&mut thread, "unpack.bst", "a, b = [1]\n").expect_err("must fail");
        assert!(err.to_string().contains("not enough values"), "{}", err);
    }

    #[test]
    fn dict_literal_duplicate_key_rejected() {
        let mut thread = Thread::new();
        let env = StringDict::new();
        assert_eq!(
            eval_str(&mut thread, "{\"a\": 1, \"a\": 2}", &env),
            "duplicate key: \"a\""
        );
    }
}
