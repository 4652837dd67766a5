#[cfg(test)]
mod tests {
    use crate::ast::{parse_expr, parse_file, BinOp, CompBody, Expr, Stmt};

    fn file(src: &str) -> Vec<Stmt> {
        parse_file("test.bst", src).expect("parse").stmts
    }

    #[test]
    fn precedence() {
        let unit = parse_expr("<expr>", "1 + 2 * 3").expect("parse");
        match unit.expr {
            Expr::Binary { op: BinOp::Add, ref y, .. } => {
                assert!(matches!(**y, Expr::Binary { op: BinOp::Mul, .. }))
            }
            other => panic!("want +, got {:?}", other),
        }
    }

    #[test]
    fn bare_tuple() {
        let unit = parse_expr("<expr>", "1, 2").expect("parse");
        assert!(matches!(unit.expr, Expr::TupleExpr { ref items, .. } if items.len() == 2));
    }

    #[test]
    fn chained_comparison_rejected() {
        assert!(parse_expr("<expr>", "1 < 2 < 3").is_err());
    }

    #[test]
    fn not_in_is_one_operator() {
        let unit = parse_expr("<expr>", "1 not in [2]").expect("parse");
        assert!(matches!(unit.expr, Expr::Binary { op: BinOp::NotIn, .. }));
    }

    #[test]
    fn def_with_full_parameter_shapes() {
        let stmts = file("def f(a, b=1, *args, c, d=2, **kwargs):\n    return a\n");
        match &stmts[0] {
            Stmt::Def(def) => {
                assert_eq!(def.name, "f");
                assert_eq!(def.params.len(), 6);
            }
            other => panic!("want def, got {:?}", other),
        }
    }

    #[test]
    fn one_line_suite() {
        let stmts = file("def f(): return 1\n");
        match &stmts[0] {
            Stmt::Def(def) => assert_eq!(def.body.len(), 1),
            other => panic!("want def, got {:?}", other),
        }
    }

    #[test]
    fn elif_chains_nest() {
        let stmts = file("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        match &stmts[0] {
            Stmt::If { else_body, .. } => {
                assert_eq!(else_body.len(), 1);
                assert!(matches!(else_body[0], Stmt::If { .. }));
            }
            other => panic!("want if, got {:?}", other),
        }
    }

    #[test]
    fn comprehension_clauses() {
        let unit = parse_expr("<expr>", "[2 * x for x in y if x > 1]").expect("parse");
        match unit.expr {
            Expr::Comp(comp) => {
                assert!(matches!(comp.body, CompBody::Value(_)));
                assert_eq!(comp.clauses.len(), 2);
            }
            other => panic!("want comprehension, got {:?}", other),
        }
    }

    #[test]
    fn dict_comprehension() {
        let unit = parse_expr("<expr>", "{k: v for k, v in pairs}").expect("parse");
        match unit.expr {
            Expr::Comp(comp) => assert!(matches!(comp.body, CompBody::KeyValue(_, _))),
            other => panic!("want comprehension, got {:?}", other),
        }
    }

    #[test]
    fn call_argument_forms() {
        let unit = parse_expr("<expr>", "f(1, x=2, *rest, **kw)").expect("parse");
        match unit.expr {
            Expr::Call { args, .. } => assert_eq!(args.len(), 4),
            other => panic!("want call, got {:?}", other),
        }
    }

    #[test]
    fn call_position_is_lparen() {
        let unit = parse_expr("<expr>", "fn(1)").expect("parse");
        match unit.expr {
            Expr::Call { pos, .. } => assert_eq!((pos.line, pos.col), (1, 3)),
            other => panic!("want call, got {:?}", other),
        }
    }

    #[test]
    fn slice_forms() {
        assert!(matches!(
            parse_expr("<expr>", "x[1:2:3]").expect("parse").expr,
            Expr::SliceExpr { .. }
        ));
        assert!(matches!(
            parse_expr("<expr>", "x[:]").expect("parse").expr,
            Expr::SliceExpr { lo: None, hi: None, step: None, .. }
        ));
        assert!(matches!(
            parse_expr("<expr>", "x[1]").expect("parse").expr,
            Expr::Index { .. }
        ));
    }

    #[test]
    fn load_statement() {
        let stmts = file("load(\"lib.bst\", \"f\", g = \"h\")\n");
        match &stmts[0] {
            Stmt::Load(load) => {
                assert_eq!(load.module, "lib.bst");
                assert_eq!(load.pairs.len(), 2);
                assert_eq!(load.pairs[1].local.name, "g");
                assert_eq!(load.pairs[1].orig, "h");
            }
            other => panic!("want load, got {:?}", other),
        }
    }

    #[test]
    fn load_without_symbols_rejected() {
        assert!(parse_file("t.bst", "load(\"m\")\n").is_err());
    }

    #[test]
    fn lambda_expression() {
        let unit = parse_expr("<expr>", "lambda x, y=1: x + y").expect("parse");
        match unit.expr {
            Expr::Lambda(def) => {
                assert!(def.is_lambda);
                assert_eq!(def.params.len(), 2);
            }
            other => panic!("want lambda, got {:?}", other),
        }
    }

    #[test]
    fn augmented_assignment() {
        let stmts = file("x += 1\n");
        assert!(matches!(&stmts[0], Stmt::Assign { op: Some(BinOp::Add), .. }));
    }

    #[test]
    fn set_literal() {
        let unit = parse_expr("<expr>", "{1, 2, 3}").expect("parse");
        assert!(matches!(unit.expr, Expr::SetExpr { ref items, .. } if items.len() == 3));
    }

    #[test]
    fn empty_file_parses() {
        assert!(file("").is_empty());
    }
}
