#[cfg(test)]
mod tests {
    use crate::compile::{call_arg, call_counts, decode_program, encode_program};
    use crate::error::Error;
    use crate::eval::{compiled_program, source_program, Thread};
    use crate::val::{equal, StringDict, Value};

    const MUL_SRC: &str = "\ndef mul(a, b):\n    return a * b\n\ny = mul(x, n)\n";

    fn mul_predeclared() -> StringDict {
        let mut d = StringDict::new();
        d.insert("x", Value::str_("mur"));
        d.insert("n", Value::int(2));
        d
    }

    /// A serialized program can be decoded and executed, and behaves like
    /// the original in both results and error backtraces.
    #[test]
    fn serialization_round_trip() {
        let predeclared = mul_predeclared();
        let (_, old_prog) =
            source_program("mul.bst", MUL_SRC, |n| predeclared.has(n)).expect("compile");

        let mut buf = Vec::new();
        old_prog.write(&mut buf).expect("write");
        let new_prog = compiled_program(&mut &buf[..]).expect("decode");
        assert_eq!(new_prog.filename(), "mul.bst");

        let mut thread = Thread::new();
        let globals = new_prog.init(&mut thread, &predeclared).expect("init");
        let y = globals.get("y").expect("y");
        assert!(equal(y, &Value::str_("murmur")).expect("equal"));

        // Re-init with a bad predeclared value: the decoded program must
        // produce an accurate stack frame.
        let mut predeclared = mul_predeclared();
        predeclared.insert("n", Value::None);
        let err = new_prog.init(&mut thread, &predeclared).expect_err("must fail");
        let eval_err = match err {
            Error::Eval(e) => e,
            other => panic!("want EvalError, got {:?}", other),
        };
        let want = "Traceback (most recent call last):\n  \
                    mul.bst:5:8: in <toplevel>\n  \
                    mul.bst:3:14: in mul\n\
                    Error: unknown binary op: string * NoneType";
        assert_eq!(eval_err.backtrace(), want);
    }

    #[test]
    fn garbage_is_rejected() {
        let garbage = b"This is not a compiled basalt program.";
        let err = decode_program(garbage).expect_err("must fail");
        assert!(
            err.to_string().contains("not a compiled module"),
            "wrong error: {}",
            err
        );
    }

    #[test]
    fn short_input_is_rejected() {
        assert!(decode_program(b"BS").is_err());
        assert!(decode_program(b"").is_err());
    }

    #[test]
    fn truncation_is_detected() {
        let predeclared = mul_predeclared();
        let (_, prog) = source_program("mul.bst", MUL_SRC, |n| predeclared.has(n)).expect("compile");
        let bytes = encode_program(&prog).expect("encode");
        for cut in [8, bytes.len() / 2, bytes.len() - 1] {
            assert!(decode_program(&bytes[..cut]).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn writers_are_deterministic() {
        let predeclared = mul_predeclared();
        let (_, a) = source_program("mul.bst", MUL_SRC, |n| predeclared.has(n)).expect("compile");
        let (_, b) = source_program("mul.bst", MUL_SRC, |n| predeclared.has(n)).expect("compile");
        assert_eq!(encode_program(&a).expect("a"), encode_program(&b).expect("b"));
    }

    #[test]
    fn round_trip_preserves_constant_kinds() {
        let src = "a = 123456789123456789123456789\nb = \"text\"\nc = b\"\\x00\\xff\"\nd = None\ne = True\n";
        let (_, prog) = source_program("consts.bst", src, |_| false).expect("compile");
        let bytes = encode_program(&prog).expect("encode");
        let back = decode_program(&bytes).expect("decode");
        let mut thread = Thread::new();
        let globals = back.init(&mut thread, &StringDict::new()).expect("init");
        assert_eq!(globals.get("a").expect("a").repr(), "123456789123456789123456789");
        assert_eq!(globals.get("b").expect("b").repr(), "\"text\"");
        assert_eq!(globals.get("c").expect("c").repr(), "b\"\\x00\\xff\"");
        assert_eq!(globals.get("d").expect("d").repr(), "None");
        assert_eq!(globals.get("e").expect("e").repr(), "True");
    }

    #[test]
    fn empty_source_has_valid_filename_and_no_globals() {
        for content in ["", "empty = False\n"] {
            let (_, prog) = source_program("hello.bst", content, |_| false).expect("compile");
            assert_eq!(prog.filename(), "hello.bst");
        }
        let (_, prog) = source_program("hello.bst", "", |_| false).expect("compile");
        let mut thread = Thread::new();
        let globals = prog.init(&mut thread, &StringDict::new()).expect("init");
        assert!(globals.is_empty());
    }

    #[test]
    fn call_arg_packs_both_counts() {
        for (npos, nkw) in [(0, 0), (1, 0), (0, 3), (7, 5), (300, 300)] {
            assert_eq!(call_counts(call_arg(npos, nkw)), (npos, nkw));
        }
    }

    #[test]
    fn functions_survive_round_trip() {
        let src = "def f(a, b=2, *rest, c, **kw):\n    return a\n";
        let (_, prog) = source_program("fn.bst", src, |_| false).expect("compile");
        let bytes = encode_program(&prog).expect("encode");
        let back = decode_program(&bytes).expect("decode");
        let f = &back.data.functions[0];
        assert_eq!(f.name.as_ref(), "f");
        assert_eq!(f.num_kwonly, 1);
        assert!(f.has_varargs);
        assert!(f.has_kwargs);
        assert_eq!(f.params.len(), 5);
        assert_eq!(f.code, prog.data.functions[0].code);
    }
}
