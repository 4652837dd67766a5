#[cfg(test)]
mod tests {
    use crate::ast::parse_file;
    use crate::resolve::{resolve_file, Options, Scope};

    fn resolve_with(src: &str, options: Options) -> Result<(), String> {
        let unit = parse_file("test.bst", src).expect("parse");
        match resolve_file(&unit, &options, &|_| false) {
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn resolve_default(src: &str) -> Result<(), String> {
        resolve_with(src, Options::default())
    }

    fn permissive() -> Options {
        Options {
            allow_float: true,
            allow_set: true,
            allow_lambda: true,
            allow_nested_def: true,
            allow_recursion: true,
            allow_global_reassign: true,
            load_binds_globally: false,
        }
    }

    #[test]
    fn undefined_name() {
        let err = resolve_default("x = y\n").unwrap_err();
        assert!(err.contains("undefined: y"), "{}", err);
    }

    #[test]
    fn forward_global_reference_is_allowed() {
        assert!(resolve_default("def f(): return g\ndef g(): return 1\n").is_ok());
    }

    #[test]
    fn duplicate_parameter() {
        let err = resolve_default("def f(a, a): pass\n").unwrap_err();
        assert!(err.contains("duplicate parameter: a"), "{}", err);
    }

    #[test]
    fn required_after_optional_rejected() {
        let err = resolve_default("def f(a=1, b): pass\n").unwrap_err();
        assert!(err.contains("required parameter may not follow optional"), "{}", err);
    }

    #[test]
    fn gates_reject_and_name_their_option() {
        for (src, gate) in [
            ("while True: pass\n", "allow_recursion"),
            ("x = lambda: 1\n", "allow_lambda"),
            ("def f():\n    def g(): pass\n", "allow_nested_def"),
            ("x = 1.5\n", "allow_float"),
            ("x = {1, 2}\n", "allow_set"),
            ("x = 1 / 2\n", "allow_float"),
            ("if True:\n    pass\n", "allow_global_reassign"),
        ] {
            let err = resolve_default(src).unwrap_err();
            assert!(err.contains(gate), "{:?} -> {}", src, err);
        }
    }

    #[test]
    fn gates_accept_when_enabled() {
        for src in [
            "def f():\n    while True: break\n",
            "x = lambda: 1\n",
            "def f():\n    def g(): pass\n",
            "x = 1.5\n",
            "x = {1, 2}\n",
            "x = 1 / 2\n",
            "if True:\n    pass\n",
        ] {
            assert!(resolve_with(src, permissive()).is_ok(), "{:?}", src);
        }
    }

    #[test]
    fn global_reassignment_rejected_without_gate() {
        let err = resolve_default("x = 1\nx = 2\n").unwrap_err();
        assert!(err.contains("cannot reassign global x"), "{}", err);
        assert!(resolve_with("x = 1\nx = 2\n", permissive()).is_ok());
    }

    #[test]
    fn load_must_be_toplevel() {
        let err = resolve_with(
            "def f():\n    load(\"m.bst\", \"x\")\n",
            permissive(),
        )
        .unwrap_err();
        assert!(err.contains("top level"), "{}", err);
    }

    #[test]
    fn load_symbol_collision() {
        let err = resolve_default("load(\"m.bst\", \"x\", \"x\")\n").unwrap_err();
        assert!(err.contains("bound twice"), "{}", err);
    }

    #[test]
    fn break_outside_loop() {
        let err = resolve_default("break\n").unwrap_err();
        assert!(err.contains("break not in a loop"), "{}", err);
    }

    #[test]
    fn return_outside_function() {
        let err = resolve_default("return 1\n").unwrap_err();
        assert!(err.contains("return statement not within a function"), "{}", err);
    }

    #[test]
    fn universals_can_be_shadowed_by_globals() {
        // Binding `len` at module level shadows the universal for this file.
        assert!(resolve_default("len = 1\ndef f(): return len\n").is_ok());
    }

    #[test]
    fn scope_classification() {
        let src = "def outer():\n    x = 1\n    def inner(): return x + g\n    return inner\ng = 2\n";
        let unit = parse_file("test.bst", src).expect("parse");
        let module = resolve_file(&unit, &permissive(), &|_| false).expect("resolve");
        assert_eq!(module.globals.len(), 2); // outer, g
        // The outer function's local x must be a cell; inner captures it.
        let outer = match &unit.stmts[0] {
            crate::ast::Stmt::Def(def) => def.info.get().expect("info").clone(),
            other => panic!("want def, got {:?}", other),
        };
        assert_eq!(outer.cells.len(), 1);
        let inner = match &unit.stmts[0] {
            crate::ast::Stmt::Def(def) => match &def.body[1] {
                crate::ast::Stmt::Def(inner) => inner.info.get().expect("info").clone(),
                other => panic!("want nested def, got {:?}", other),
            },
            _ => unreachable!(),
        };
        assert_eq!(inner.freevars.len(), 1);
        assert_eq!(inner.freevars[0].name.as_ref(), "x");
        assert_eq!(inner.freevars[0].parent.scope, Scope::Cell);
    }

    #[test]
    fn resolving_twice_is_a_no_op() {
        let unit = parse_file("test.bst", "x = 1\n").expect("parse");
        let first = resolve_file(&unit, &Options::default(), &|_| false).expect("resolve");
        let second = resolve_file(&unit, &Options::default(), &|_| false).expect("resolve");
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn predeclared_names_resolve() {
        let unit = parse_file("test.bst", "y = x\n").expect("parse");
        assert!(resolve_file(&unit, &Options::default(), &|n| n == "x").is_ok());
    }

    #[test]
    fn comprehension_variables_do_not_become_globals() {
        let unit = parse_file("test.bst", "y = [x for x in z]\n").expect("parse");
        let module = resolve_file(&unit, &Options::default(), &|n| n == "z").expect("resolve");
        let names: Vec<&str> = module.globals.iter().map(|(n, _)| n.as_ref()).collect();
        assert_eq!(names, vec!["y"]);
        assert!(!module.toplevel.locals.is_empty());
    }

    #[test]
    fn multiple_errors_are_collected() {
        let unit = parse_file("test.bst", "a = q\nb = r\n").expect("parse");
        let err = resolve_file(&unit, &Options::default(), &|_| false).unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }
}
