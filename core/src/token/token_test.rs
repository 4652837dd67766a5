#[cfg(test)]
mod tests {
    use crate::token::{tokenize, Position, Token};

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).expect("scan").into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn punctuation_and_layout() {
        let toks = kinds("x = 1 + 2\n");
        assert_eq!(
            toks,
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::Int(1.into()),
                Token::Plus,
                Token::Int(2.into()),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn indent_outdent_pairs() {
        let toks = kinds("if x:\n    y\nz\n");
        assert!(toks.contains(&Token::Indent));
        assert!(toks.contains(&Token::Outdent));
        let indents = toks.iter().filter(|t| **t == Token::Indent).count();
        let outdents = toks.iter().filter(|t| **t == Token::Outdent).count();
        assert_eq!(indents, outdents);
    }

    #[test]
    fn blank_and_comment_lines_are_invisible() {
        let toks = kinds("a\n\n# note\n   # indented note\nb\n");
        let idents = toks
            .iter()
            .filter(|t| matches!(t, Token::Ident(_)))
            .count();
        assert_eq!(idents, 2);
        assert!(!toks.contains(&Token::Indent));
    }

    #[test]
    fn brackets_suppress_newlines() {
        let toks = kinds("x = [1,\n     2]\n");
        let newlines = toks.iter().filter(|t| **t == Token::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn positions_are_one_based_bytes() {
        let toks = tokenize("a = 1\n").expect("scan");
        assert_eq!(toks[0].pos, Position::new(1, 1));
        assert_eq!(toks[1].pos, Position::new(1, 3));
        assert_eq!(toks[2].pos, Position::new(1, 5));
    }

    #[test]
    fn string_escapes() {
        let toks = kinds(r#""a\nb\x41\u03a9""#);
        match &toks[0] {
            Token::Str(b) => assert_eq!(b, "a\nbA\u{3a9}".as_bytes()),
            other => panic!("want string, got {:?}", other),
        }
    }

    #[test]
    fn raw_and_bytes_literals() {
        match &kinds(r#"r"a\nb""#)[0] {
            Token::Str(b) => assert_eq!(b, b"a\\nb"),
            other => panic!("want raw string, got {:?}", other),
        }
        match &kinds(r#"b"\x00\xff""#)[0] {
            Token::Bytes(b) => assert_eq!(b, &[0u8, 0xff]),
            other => panic!("want bytes, got {:?}", other),
        }
    }

    #[test]
    fn triple_quoted_spans_lines() {
        match &kinds("\"\"\"a\nb\"\"\"\n")[0] {
            Token::Str(b) => assert_eq!(b, b"a\nb"),
            other => panic!("want string, got {:?}", other),
        }
    }

    #[test]
    fn number_radixes() {
        assert_eq!(kinds("0xff")[0], Token::Int(255.into()));
        assert_eq!(kinds("0o755")[0], Token::Int(0o755.into()));
        assert_eq!(kinds("0b1010")[0], Token::Int(10.into()));
        assert!(matches!(kinds("1.5e3")[0], Token::Float(f) if f == 1500.0));
    }

    #[test]
    fn huge_int_literal() {
        match &kinds("123456789123456789123456789")[0] {
            Token::Int(i) => assert_eq!(i.to_string(), "123456789123456789123456789"),
            other => panic!("want int, got {:?}", other),
        }
    }

    #[test]
    fn obsolete_octal_rejected() {
        assert!(tokenize("0755").is_err());
    }

    #[test]
    fn bad_unindent_rejected() {
        assert!(tokenize("if x:\n    a\n  b\n").is_err());
    }

    #[test]
    fn reserved_keyword_rejected() {
        let err = tokenize("class Foo").unwrap_err();
        assert!(err.msg.contains("reserved"));
    }
}
