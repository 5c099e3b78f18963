use crate::errors::ConvertError;
use crate::value::{Type, Value};
use std::collections::BTreeMap;

/// Convert `val` to the static type `want`.
///
/// Converting to `Type::Any` is the identity. Unknown values convert to an
/// unknown of the target type; null passes through unchanged. Primitive
/// coercions follow the language rules: numbers and bools stringify, strings
/// parse into numbers and bools. Collections convert element-wise.
pub fn convert(val: Value, want: &Type) -> Result<Value, ConvertError> {
    if want.is_any() {
        return Ok(val);
    }
    if val.is_unknown() {
        return Ok(Value::Unknown(want.clone()));
    }
    if val.is_null() {
        return Ok(Value::Null);
    }

    let from = val.type_of();
    match (val, want) {
        (val @ Value::Bool(_), Type::Bool) => Ok(val),
        (val @ Value::Number(_), Type::Number) => Ok(val),
        (val @ Value::String(_), Type::String) => Ok(val),

        (Value::Number(num), Type::String) => Ok(Value::String(format_number(num))),
        (Value::Bool(flag), Type::String) => {
            Ok(Value::String(if flag { "true" } else { "false" }.into()))
        }
        (Value::String(text), Type::Number) => text
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| ConvertError::BadNumber(text)),
        (Value::String(text), Type::Bool) => match text.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(ConvertError::BadBool(text)),
        },

        (Value::List(items), Type::List(elem)) => {
            let converted: Result<Vec<Value>, ConvertError> =
                items.into_iter().map(|item| convert(item, elem)).collect();
            Ok(Value::List(converted?))
        }
        (Value::Object(attrs), Type::Map(elem)) => {
            let converted: Result<BTreeMap<String, Value>, ConvertError> = attrs
                .into_iter()
                .map(|(key, item)| convert(item, elem).map(|item| (key, item)))
                .collect();
            Ok(Value::Object(converted?))
        }
        (Value::Object(mut attrs), Type::Object(fields)) => {
            let mut out = BTreeMap::new();
            for (name, field_ty) in fields {
                match attrs.remove(name) {
                    Some(item) => {
                        out.insert(name.clone(), convert(item, field_ty)?);
                    }
                    None => return Err(ConvertError::MissingAttribute(name.clone())),
                }
            }
            // Attributes not named by the target type are dropped.
            Ok(Value::Object(out))
        }

        _ => Err(ConvertError::Incompatible {
            from,
            want: want.clone(),
        }),
    }
}

/// Render a number the way the language prints it: integral values without
/// a trailing fraction.
fn format_number(num: f64) -> String {
    if num.fract() == 0.0 && num.abs() < 1e15 {
        format!("{}", num as i64)
    } else {
        format!("{num}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn number_to_string() {
        assert_eq!(
            convert(Value::Number(8.0), &Type::String),
            Ok(Value::String("8".into()))
        );
        assert_eq!(
            convert(Value::Number(1.5), &Type::String),
            Ok(Value::String("1.5".into()))
        );
    }

    #[test]
    fn string_to_number() {
        assert_eq!(
            convert(Value::String("12".into()), &Type::Number),
            Ok(Value::Number(12.0))
        );
        assert!(convert(Value::String("abc".into()), &Type::Number).is_err());
    }

    #[test]
    fn unknown_converts_to_unknown_of_target() {
        assert_eq!(
            convert(Value::Unknown(Type::Any), &Type::Number),
            Ok(Value::Unknown(Type::Number))
        );
    }

    #[test]
    fn list_converts_element_wise() {
        let val = Value::List(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(
            convert(val, &Type::list_of(Type::String)),
            Ok(Value::List(vec![
                Value::String("1".into()),
                Value::String("2".into()),
            ]))
        );
    }

    #[test]
    fn object_to_object_requires_fields() {
        let want = Type::Object([("name".to_string(), Type::String)].into_iter().collect());
        let err = convert(Value::Object(Default::default()), &want).unwrap_err();
        assert_eq!(err, ConvertError::MissingAttribute("name".into()));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            Just(Value::Unknown(Type::Any)),
            any::<bool>().prop_map(Value::Bool),
            (-1e9f64..1e9).prop_map(Value::Number),
            "[a-z0-9]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(Value::Object),
            ]
        })
    }

    proptest! {
        #[test]
        fn convert_to_any_is_identity(val in arb_value()) {
            prop_assert_eq!(convert(val.clone(), &Type::Any), Ok(val));
        }

        #[test]
        fn convert_to_string_never_panics(val in arb_value()) {
            let _ = convert(val, &Type::String);
        }
    }
}
