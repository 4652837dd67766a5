#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::error::EvalError;
    use crate::eval::{call, eval, exec_file, Thread};
    use crate::val::{Builtin, StringDict, Value};

    fn exec(thread: &mut Thread, filename: &str, src: &str) -> StringDict {
        exec_file(thread, filename, Some(src), &StringDict::new()).expect("exec")
    }

    /// The `print` builtin reports through the thread's hook, and the hook
    /// can ask the thread for its caller's position.
    #[test]
    fn print_reports_caller_positions() {
        const SRC: &str = "\nprint(\"hello\")\ndef f(): print(\"hello\", \"world\", sep=\", \")\nf()\n";
        let buf = Arc::new(Mutex::new(String::new()));
        let sink = buf.clone();
        let mut thread = Thread::new();
        thread.set_print(move |thread, msg| {
            let caller = thread.call_frame(1).expect("caller frame");
            let pos = caller.pos.as_ref().expect("caller position");
            sink.lock().unwrap().push_str(&format!(
                "{}:{}:{}: {}: {}\n",
                pos.filename, pos.line, pos.col, caller.name, msg
            ));
        });
        exec(&mut thread, "foo.bst", SRC);
        let want = "foo.bst:2:6: <toplevel>: hello\nfoo.bst:3:15: f: hello, world\n";
        assert_eq!(buf.lock().unwrap().as_str(), want);
    }

    fn trace_builtin(
        thread: &mut Thread,
        _b: &Builtin,
        _args: &[Value],
        _kwargs: &[(String, Value)],
    ) -> Result<Value, EvalError> {
        let mut out = String::new();
        for depth in 0..thread.call_stack_depth() {
            let fr = thread.debug_frame(depth).expect("frame");
            match fr.callable() {
                Value::Function(f) => {
                    out.push_str(f.name());
                    out.push('(');
                    for i in 0..f.num_params() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        let (name, _) = f.param(i).expect("param");
                        let v = fr
                            .local(i)
                            .map(|v| v.repr())
                            .unwrap_or_else(|| "?".to_string());
                        out.push_str(&format!("{}={}", name, v));
                    }
                    out.push_str(")\n");
                }
                _ => out.push_str("builtin(...)\n"),
            }
        }
        thread.set_local("trace", Box::new(out));
        Ok(Value::None)
    }

    /// Debug frames expose parameters and locals of every active call.
    #[test]
    fn debug_frames_expose_locals() {
        const SRC: &str = "\ndef f(x, y): builtin()\ndef g(z): f(z, z*z)\ng(7)\n";
        let mut predeclared = StringDict::new();
        predeclared.insert("builtin", Builtin::value("builtin", trace_builtin));
        let mut thread = Thread::new();
        exec_file(&mut thread, "foo.bst", Some(SRC), &predeclared).expect("exec");
        let trace = thread
            .local("trace")
            .and_then(|v| v.downcast_ref::<String>())
            .expect("trace recorded");
        let want = "builtin(...)\nf(x=7, y=49)\ng(z=7)\n<toplevel>()\n";
        assert_eq!(trace, want);
    }

    #[test]
    fn docstrings_are_recorded() {
        const SRC: &str = "\ndef somefunc():\n    \"somefunc doc\"\n    return 0\n";
        let mut thread = Thread::new();
        let globals = exec(&mut thread, "doc.bst", SRC);
        match globals.get("somefunc").expect("somefunc") {
            Value::Function(f) => assert_eq!(f.doc(), "somefunc doc"),
            other => panic!("want function, got {:?}", other),
        }
    }

    #[test]
    fn call_api_reaches_compiled_functions() {
        const SRC: &str = "def add(a, b=10):\n    return a + b\n";
        let mut thread = Thread::new();
        let globals = exec(&mut thread, "add.bst", SRC);
        let f = globals.get("add").expect("add").clone();

        let r = call(&mut thread, &f, vec![Value::int(1), Value::int(2)], vec![]).expect("call");
        assert_eq!(r.repr(), "3");

        let r = call(
            &mut thread,
            &f,
            vec![Value::int(1)],
            vec![("b".to_string(), Value::int(5))],
        )
        .expect("call");
        assert_eq!(r.repr(), "6");

        let err = call(&mut thread, &f, vec![], vec![]).expect_err("must fail");
        assert_eq!(err.to_string(), "function add missing 1 argument (a)");
    }

    #[test]
    fn thread_locals_round_trip() {
        let mut thread = Thread::new();
        assert!(thread.local("reporter").is_none());
        thread.set_local("reporter", Box::new(42i64));
        let got = thread
            .local("reporter")
            .and_then(|v| v.downcast_ref::<i64>())
            .copied();
        assert_eq!(got, Some(42));
        // Overwrite with a different type under the same key.
        thread.set_local("reporter", Box::new("seven".to_string()));
        assert!(thread
            .local("reporter")
            .and_then(|v| v.downcast_ref::<String>())
            .is_some());
    }

    #[test]
    fn eval_sees_env_as_predeclared() {
        let mut env = StringDict::new();
        env.insert("x", Value::int(2));
        let mut thread = Thread::new();
        let v = eval(&mut thread, "<expr>", "x * 3", &env).expect("eval");
        assert_eq!(v.repr(), "6");

        let err = eval(&mut thread, "<expr>", "y", &env).expect_err("must fail");
        assert!(err.to_string().contains("undefined: y"), "{}", err);
    }

    #[test]
    fn failed_exec_discards_partial_state() {
        let mut thread = Thread::new();
        let err = exec_file(
            &mut thread,
            "part.bst",
            Some("x = 1\ny = 1 // 0\n"),
            &StringDict::new(),
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("floored division by zero"), "{}", err);
        assert_eq!(thread.call_stack_depth(), 0);
    }

    #[test]
    fn exec_reports_missing_files() {
        let mut thread = Thread::new();
        let err = exec_file(&mut thread, "/no/such/file.bst", None, &StringDict::new());
        assert!(err.is_err());
    }
}
