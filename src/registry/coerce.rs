use std::collections::HashMap;

use super::params::{ArgValue, Args, ParamDescriptor, ParamType};
use crate::error::ArgumentCoercionError;

/// Converts one raw query value to the declared type.
pub fn coerce_value(
    parameter: &str,
    raw: &str,
    ty: ParamType,
) -> Result<ArgValue, ArgumentCoercionError> {
    let fail = || ArgumentCoercionError {
        parameter: parameter.to_string(),
        raw: raw.to_string(),
        expected: ty,
    };
    match ty {
        ParamType::String => Ok(ArgValue::String(raw.to_string())),
        ParamType::Bool => {
            let trimmed = raw.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                Ok(ArgValue::Bool(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Ok(ArgValue::Bool(false))
            } else {
                Err(fail())
            }
        }
        ParamType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(ArgValue::Integer)
            .map_err(|_| fail()),
        ParamType::Float => {
            let parsed = raw.trim().parse::<f64>().map_err(|_| fail())?;
            if parsed.is_finite() {
                Ok(ArgValue::Float(parsed))
            } else {
                Err(fail())
            }
        }
    }
}

/// Builds the argument list for an operation from its query mapping.
///
/// Declared parameters are filled in order: the supplied value if present,
/// otherwise the declared default, otherwise the type's zero value. Query keys
/// that match no parameter are ignored.
pub fn coerce_args(
    params: &[ParamDescriptor],
    query: &HashMap<String, String>,
) -> Result<Args, ArgumentCoercionError> {
    let mut args = Args::default();
    for param in params {
        match query.get(&param.name) {
            Some(raw) => {
                let value = coerce_value(&param.name, raw, param.ty)?;
                args.push(&param.name, value, true);
            }
            None => {
                let value = param
                    .default
                    .clone()
                    .unwrap_or_else(|| param.ty.zero_value());
                args.push(&param.name, value, false);
            }
        }
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, ty: ParamType, default: Option<ArgValue>) -> ParamDescriptor {
        ParamDescriptor {
            name: name.to_string(),
            ty,
            default,
            autocomplete: None,
        }
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn bool_accepts_any_case_and_rejects_numbers() {
        assert_eq!(
            coerce_value("b", "True", ParamType::Bool),
            Ok(ArgValue::Bool(true))
        );
        assert_eq!(
            coerce_value("b", " FALSE ", ParamType::Bool),
            Ok(ArgValue::Bool(false))
        );
        assert!(coerce_value("b", "1", ParamType::Bool).is_err());
        assert!(coerce_value("b", "yes", ParamType::Bool).is_err());
    }

    #[test]
    fn integer_is_base_ten_with_sign() {
        assert_eq!(
            coerce_value("n", "-42", ParamType::Integer),
            Ok(ArgValue::Integer(-42))
        );
        assert_eq!(
            coerce_value("n", "+7", ParamType::Integer),
            Ok(ArgValue::Integer(7))
        );
        let err = coerce_value("n", "0x10", ParamType::Integer).expect_err("hex rejected");
        assert_eq!(err.parameter, "n");
        assert_eq!(err.raw, "0x10");
        assert_eq!(err.expected, ParamType::Integer);
        assert!(coerce_value("n", "1.5", ParamType::Integer).is_err());
    }

    #[test]
    fn float_rejects_non_finite() {
        assert_eq!(
            coerce_value("f", "2.5", ParamType::Float),
            Ok(ArgValue::Float(2.5))
        );
        assert!(coerce_value("f", "NaN", ParamType::Float).is_err());
        assert!(coerce_value("f", "abc", ParamType::Float).is_err());
    }

    #[test]
    fn string_passes_through_untouched() {
        assert_eq!(
            coerce_value("s", "  spaced  ", ParamType::String),
            Ok(ArgValue::String("  spaced  ".into()))
        );
    }

    #[test]
    fn omitted_parameter_gets_declared_default() {
        let params = vec![
            param("TestCase", ParamType::String, None),
            param("input", ParamType::String, Some(ArgValue::String("test".into()))),
            param("count", ParamType::Integer, Some(ArgValue::Integer(5))),
        ];
        let args = coerce_args(&params, &query(&[("TestCase", "a")])).expect("coerce");

        assert_eq!(args.str("TestCase"), "a");
        assert_eq!(args.str("input"), "test");
        assert_eq!(args.int("count"), 5);
        assert!(args.is_supplied("TestCase"));
        assert!(!args.is_supplied("input"));
    }

    #[test]
    fn omitted_parameter_without_default_gets_zero_value() {
        let params = vec![
            param("s", ParamType::String, None),
            param("b", ParamType::Bool, None),
            param("i", ParamType::Integer, None),
            param("f", ParamType::Float, None),
        ];
        let args = coerce_args(&params, &HashMap::new()).expect("coerce");
        let values: Vec<_> = args.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(
            values,
            vec![
                ArgValue::String(String::new()),
                ArgValue::Bool(false),
                ArgValue::Integer(0),
                ArgValue::Float(0.0),
            ]
        );
    }

    #[test]
    fn unparsable_value_names_the_parameter() {
        let params = vec![
            param("amount", ParamType::Integer, None),
            param("infinite", ParamType::Bool, None),
        ];
        let err = coerce_args(&params, &query(&[("amount", "10"), ("infinite", "maybe")]))
            .expect_err("should fail");
        assert_eq!(err.parameter, "infinite");
        assert_eq!(err.raw, "maybe");
        assert!(err.to_string().contains("infinite"));
    }

    #[test]
    fn unknown_query_keys_are_ignored() {
        let params = vec![param("input", ParamType::String, None)];
        let args = coerce_args(&params, &query(&[("input", "x"), ("extra", "y")]))
            .expect("coerce");
        assert_eq!(args.len(), 1);
    }
}
