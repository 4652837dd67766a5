#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use crate::val::int::Int;
    use crate::val::{equal, order_values, Dict, List, Str, Value};

    #[test]
    fn int_i64_u64_boundaries() {
        let one = Int::Small(1);
        let cases: Vec<(Int, Option<i64>, Option<u64>)> = vec![
            (
                Int::from_big(BigInt::from(i64::MIN) - 1),
                None,
                None,
            ),
            (Int::Small(i64::MIN), Some(i64::MIN), None),
            (Int::Small(-1), Some(-1), None),
            (Int::Small(0), Some(0), Some(0)),
            (Int::Small(1), Some(1), Some(1)),
            (Int::Small(i64::MAX), Some(i64::MAX), Some(i64::MAX as u64)),
            (Int::from(u64::MAX), None, Some(u64::MAX)),
            (
                Int::from_big(BigInt::from(u64::MAX) + one.to_big()),
                None,
                None,
            ),
        ];
        for (i, want_i64, want_u64) in cases {
            assert_eq!(i.to_i64(), want_i64, "to_i64 of {}", i);
            assert_eq!(i.to_u64(), want_u64, "to_u64 of {}", i);
        }
    }

    #[test]
    fn int_floored_division_sign_follows_divisor() {
        let div = |a: i64, b: i64| {
            Int::Small(a)
                .floor_div(&Int::Small(b))
                .unwrap()
                .to_i64()
                .unwrap()
        };
        let rem = |a: i64, b: i64| {
            Int::Small(a)
                .mod_floor(&Int::Small(b))
                .unwrap()
                .to_i64()
                .unwrap()
        };
        assert_eq!(div(7, 2), 3);
        assert_eq!(div(-7, 2), -4);
        assert_eq!(div(7, -2), -4);
        assert_eq!(rem(-7, 2), 1);
        assert_eq!(rem(7, -2), -1);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = Int::Small(1).floor_div(&Int::Small(0)).unwrap_err();
        assert_eq!(err.to_string(), "floored division by zero");
        let err = Int::Small(1).mod_floor(&Int::Small(0)).unwrap_err();
        assert_eq!(err.to_string(), "integer modulo by zero");
    }

    #[test]
    fn int_overflow_promotes_to_big() {
        let v = Int::Small(i64::MAX).add(&Int::Small(1));
        assert_eq!(v.to_string(), "9223372036854775808");
        assert_eq!(v.to_i64(), None);
        let back = v.sub(&Int::Small(1));
        assert_eq!(back.to_i64(), Some(i64::MAX));
    }

    #[test]
    fn string_bytes_are_byte_addressed() {
        let s = Str::from("aΩb");
        assert_eq!(s.len(), 4);
        assert_eq!(s.as_bytes()[1], 0xce);
        // A one-byte substring of a multi-byte character quotes as \xce.
        let byte = Value::Str(Str::from_bytes(vec![s.as_bytes()[1]]));
        assert_eq!(byte.repr(), "\"\\xce\"");
    }

    #[test]
    fn repr_forms() {
        assert_eq!(Value::None.repr(), "None");
        assert_eq!(Value::Bool(true).repr(), "True");
        assert_eq!(Value::int(3).repr(), "3");
        assert_eq!(Value::Float(84.0).repr(), "84.0");
        assert_eq!(Value::str_("ab").repr(), "\"ab\"");
        assert_eq!(
            Value::new_tuple(vec![Value::int(1)]).repr(),
            "(1,)"
        );
        assert_eq!(
            Value::new_list(vec![Value::int(1), Value::int(2)]).repr(),
            "[1, 2]"
        );
        let d = Dict::new();
        d.insert(&Value::str_("a"), Value::int(1)).unwrap();
        assert_eq!(Value::Dict(d).repr(), "{\"a\": 1}");
    }

    #[test]
    fn cyclic_list_prints_sentinel() {
        let l = List::new(vec![Value::int(1)]);
        l.append(Value::List(l.clone())).unwrap();
        assert_eq!(Value::List(l).repr(), "[1, [...]]");
    }

    #[test]
    fn cyclic_equality_reports_depth_error() {
        let a = List::new(Vec::new());
        a.append(Value::List(a.clone())).unwrap();
        let b = List::new(Vec::new());
        b.append(Value::List(b.clone())).unwrap();
        let err = equal(&Value::List(a), &Value::List(b)).unwrap_err();
        assert!(err.to_string().contains("maximum recursion depth"));
    }

    #[test]
    fn freeze_is_deep_and_idempotent() {
        let inner = List::new(vec![Value::int(1)]);
        let outer = List::new(vec![Value::List(inner.clone())]);
        let v = Value::List(outer.clone());
        v.freeze();
        v.freeze(); // freeze(freeze(x)) == freeze(x)
        assert!(outer.is_frozen());
        assert!(inner.is_frozen());
        let err = inner.append(Value::int(2)).unwrap_err();
        assert_eq!(err.to_string(), "cannot append to frozen list");
    }

    #[test]
    fn frozen_list_becomes_hashable() {
        let l = List::new(vec![Value::int(1)]);
        let v = Value::List(l);
        let err = v.hash32().unwrap_err();
        assert_eq!(err.to_string(), "unhashable type: list");
        v.freeze();
        let h1 = v.hash32().unwrap();
        let h2 = v.hash32().unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn mutation_during_iteration_fails() {
        let l = List::new(vec![Value::int(1), Value::int(2)]);
        let v = Value::List(l.clone());
        let _it = v.iterate().unwrap();
        let err = l.insert_at(0, Value::int(0)).unwrap_err();
        assert_eq!(err.to_string(), "cannot insert into list during iteration");
        drop(_it);
        l.insert_at(0, Value::int(0)).unwrap();
    }

    #[test]
    fn dict_preserves_insertion_order_through_deletion() {
        let d = Dict::new();
        for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
            d.insert(&Value::str_(k), Value::int(v)).unwrap();
        }
        d.delete(&Value::str_("a")).unwrap();
        d.insert(&Value::str_("a"), Value::int(4)).unwrap();
        let keys: Vec<String> = d.keys().iter().map(|k| k.to_str()).collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
    }

    #[test]
    fn unhashable_dict_key_is_an_error() {
        let d = Dict::new();
        let err = d
            .insert(&Value::new_list(Vec::new()), Value::int(1))
            .unwrap_err();
        assert_eq!(err.to_string(), "unhashable type: list");
    }

    #[test]
    fn equality_is_numeric_across_int_and_float() {
        assert!(equal(&Value::int(1), &Value::Float(1.0)).unwrap());
        assert!(!equal(&Value::int(1), &Value::Float(1.5)).unwrap());
        // Hashes must agree wherever equality holds.
        assert_eq!(
            Value::int(1).hash32().unwrap(),
            Value::Float(1.0).hash32().unwrap()
        );
    }

    #[test]
    fn hash_is_deterministic_within_a_process() {
        for v in [
            Value::str_("hello"),
            Value::int(42),
            Value::Bool(true),
            Value::new_tuple(vec![Value::int(1), Value::str_("x")]),
        ] {
            assert_eq!(v.hash32().unwrap(), v.hash32().unwrap());
        }
    }

    #[test]
    fn ordering_is_lexicographic_for_sequences() {
        use std::cmp::Ordering;
        let a = Value::new_list(vec![Value::int(1), Value::int(2)]);
        let b = Value::new_list(vec![Value::int(1), Value::int(3)]);
        assert_eq!(order_values("<", &a, &b).unwrap(), Ordering::Less);
        let err = order_values("<", &Value::int(1), &Value::str_("a")).unwrap_err();
        assert_eq!(err.to_string(), "unsupported comparison: int < string");
    }

    #[test]
    fn mixed_type_equality_is_false_not_an_error() {
        assert!(!equal(&Value::int(1), &Value::str_("1")).unwrap());
        assert!(!equal(&Value::None, &Value::Bool(false)).unwrap());
    }
}
