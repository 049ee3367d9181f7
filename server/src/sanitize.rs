//! Coercion of untrusted input into canonical values.
//!
//! Every typed tree node validates through [`sanitize`], and RPC arguments
//! from remote clients go through the same functions. In [`Mode::Lenient`]
//! malformed scalars are corrected to a default; in [`Mode::Strict`] they are
//! rejected. Neither mode panics on bad input.

use crate::error::SanitizeError;
use crate::input::Input;
use crate::types::{DictionaryType, PrimitiveKind, PrimitiveType, TypeDescriptor};
use log::warn;
use shared::protocol::is_reserved_key;
use shared::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Lenient,
    Strict,
}

pub fn sanitize(ty: &TypeDescriptor, input: &Input, mode: Mode) -> Result<Value, SanitizeError> {
    match ty {
        TypeDescriptor::Primitive(p) => sanitize_primitive(p, input, mode),
        TypeDescriptor::List { element } => sanitize_list(element, input, mode).map(Value::List),
        TypeDescriptor::Dictionary(d) => sanitize_dictionary(d, input, mode).map(Value::Map),
        TypeDescriptor::GameObject { class, nullable } => {
            sanitize_game_object(class, *nullable, input)
        }
    }
}

pub fn sanitize_primitive(
    ty: &PrimitiveType,
    input: &Input,
    mode: Mode,
) -> Result<Value, SanitizeError> {
    if ty.nullable && input.is_null() {
        return Ok(Value::Null);
    }

    let value = match ty.kind {
        PrimitiveKind::Boolean => Value::Bool(sanitize_boolean(input, mode)?),
        PrimitiveKind::Int => Value::Int(sanitize_integer(input, mode)?),
        PrimitiveKind::Float => Value::Float(sanitize_float(input, mode)?),
        PrimitiveKind::String => Value::String(sanitize_string(input, mode)?),
    };

    match &ty.literals {
        Some(literals) if !literals.is_empty() => constrain_to_literals(value, literals, mode),
        _ => Ok(value),
    }
}

fn constrain_to_literals(
    value: Value,
    literals: &[Value],
    mode: Mode,
) -> Result<Value, SanitizeError> {
    if let Some(literal) = literals.iter().find(|l| literal_matches(l, &value)) {
        return Ok(literal.clone());
    }

    match mode {
        Mode::Strict => Err(SanitizeError::NotAllowed {
            value: value.to_string(),
            allowed: literals.iter().map(Value::to_string).collect(),
        }),
        Mode::Lenient => {
            let fallback = literals[0].clone();
            warn!("{} is not an allowed literal, using {}", value, fallback);
            Ok(fallback)
        }
    }
}

fn literal_matches(literal: &Value, value: &Value) -> bool {
    match (literal, value) {
        (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
        (a, b) => a == b,
    }
}

pub fn sanitize_boolean(input: &Input, mode: Mode) -> Result<bool, SanitizeError> {
    match input {
        Input::Bool(b) => Ok(*b),
        Input::Null => Ok(false),
        Input::Int(i) => Ok(*i != 0),
        Input::Float(f) => Ok(*f != 0.0 && !f.is_nan()),
        Input::Str(s) => match s.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => match mode {
                Mode::Strict => Err(mismatch("boolean", input)),
                Mode::Lenient => Ok(!s.is_empty()),
            },
        },
        Input::List(_) | Input::Map(_) | Input::Object(_) => match mode {
            Mode::Strict => Err(mismatch("boolean", input)),
            Mode::Lenient => Ok(true),
        },
    }
}

pub fn sanitize_integer(input: &Input, mode: Mode) -> Result<i32, SanitizeError> {
    let parsed = match input {
        Input::Int(i) => Some(*i as f64),
        Input::Float(f) if f.is_finite() => Some(f.trunc()),
        Input::Str(s) => parse_leading_integer(s),
        _ => None,
    };

    match (parsed, mode) {
        (Some(n), _) if n >= i32::MIN as f64 && n <= i32::MAX as f64 => Ok(n as i32),
        (Some(n), Mode::Strict) => Err(SanitizeError::OutOfRange { value: n }),
        // `as` saturates at the i32 bounds
        (Some(n), Mode::Lenient) => Ok(n as i32),
        (None, Mode::Strict) => Err(mismatch("integer", input)),
        (None, Mode::Lenient) => Ok(0),
    }
}

pub fn sanitize_float(input: &Input, mode: Mode) -> Result<f64, SanitizeError> {
    let parsed = match input {
        Input::Int(i) => Some(*i as f64),
        Input::Float(f) => Some(*f),
        Input::Str(s) => parse_leading_float(s),
        _ => None,
    };

    match (parsed.filter(|f| f.is_finite()), mode) {
        (Some(f), _) => Ok(f),
        (None, Mode::Strict) => Err(mismatch("float", input)),
        (None, Mode::Lenient) => Ok(0.0),
    }
}

pub fn sanitize_string(input: &Input, mode: Mode) -> Result<String, SanitizeError> {
    match input {
        Input::Str(s) => Ok(s.clone()),
        Input::Null => Ok(String::new()),
        Input::Bool(b) => Ok(b.to_string()),
        Input::Int(i) => Ok(i.to_string()),
        Input::Float(f) => Ok(f.to_string()),
        Input::List(_) | Input::Map(_) | Input::Object(_) => match mode {
            Mode::Strict => Err(mismatch("string", input)),
            Mode::Lenient => Ok(String::new()),
        },
    }
}

pub fn sanitize_list(
    element: &TypeDescriptor,
    input: &Input,
    mode: Mode,
) -> Result<Vec<Value>, SanitizeError> {
    match (input, mode) {
        (Input::List(items), _) => items
            .iter()
            .enumerate()
            .map(|(i, item)| sanitize(element, item, mode).map_err(|e| e.within(&i.to_string())))
            .collect(),
        (_, Mode::Strict) => Err(mismatch("list", input)),
        (_, Mode::Lenient) => Ok(Vec::new()),
    }
}

pub fn sanitize_dictionary(
    ty: &DictionaryType,
    input: &Input,
    mode: Mode,
) -> Result<BTreeMap<String, Value>, SanitizeError> {
    let entries = match (input, mode) {
        (Input::Map(entries), _) => entries,
        (_, Mode::Strict) => return Err(mismatch("dictionary", input)),
        (_, Mode::Lenient) => return Ok(BTreeMap::new()),
    };

    let mut sanitized = BTreeMap::new();
    for (raw_key, raw_value) in entries {
        let key = sanitize_key(&ty.key, raw_key, mode)?;
        let Some(value_type) = ty.value_type(&key) else {
            match mode {
                Mode::Strict => return Err(SanitizeError::UnknownKey { key }),
                Mode::Lenient => {
                    warn!("dropping undeclared key {:?}", key);
                    continue;
                }
            }
        };
        let value = sanitize(value_type, raw_value, mode).map_err(|e| e.within(&key))?;
        sanitized.insert(key, value);
    }
    Ok(sanitized)
}

/// Sanitizes a dictionary key and renders it in its canonical string form.
pub fn sanitize_key(ty: &PrimitiveType, raw: &str, mode: Mode) -> Result<String, SanitizeError> {
    if is_reserved_key(raw) {
        return Err(SanitizeError::ReservedKey {
            key: raw.to_string(),
        });
    }
    let input = Input::Str(raw.to_string());
    sanitize_primitive(ty, &input, mode)?
        .key_string()
        .ok_or_else(|| mismatch("dictionary key", &input))
}

pub fn sanitize_game_object(
    class: &str,
    nullable: bool,
    input: &Input,
) -> Result<Value, SanitizeError> {
    match input {
        Input::Object(obj) if obj.is_instance_of(class) => Ok(Value::Ref(obj.id.clone())),
        _ if nullable => Ok(Value::Null),
        _ => Err(SanitizeError::NotInstance {
            expected: class.to_string(),
            got: input.describe(),
        }),
    }
}

fn mismatch(expected: &'static str, input: &Input) -> SanitizeError {
    SanitizeError::Mismatch {
        expected,
        got: input.describe(),
    }
}

/// Parses an optional sign and the decimal digits that follow it, ignoring
/// leading whitespace and anything after the digits.
fn parse_leading_integer(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let magnitude: f64 = rest[..digits].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parses the longest numeric prefix of `s` (after leading whitespace).
fn parse_leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end += 1;
    }
    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let exp_digits = count_digits(&bytes[exp_end.min(bytes.len())..]);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }

    s[..end].parse().ok()
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::GameObjectRef;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_integer_boundaries() {
        assert!(matches!(
            sanitize_integer(&"2147483648".into(), Mode::Strict),
            Err(SanitizeError::OutOfRange { .. })
        ));
        assert_eq!(sanitize_integer(&"2147483647".into(), Mode::Strict), Ok(i32::MAX));
        assert_eq!(sanitize_integer(&"-2147483648".into(), Mode::Strict), Ok(i32::MIN));
        assert_eq!(sanitize_integer(&"2147483648".into(), Mode::Lenient), Ok(i32::MAX));
        assert_eq!(sanitize_integer(&Input::Int(-5_000_000_000), Mode::Lenient), Ok(i32::MIN));
    }

    #[test]
    fn test_integer_parsing() {
        assert_eq!(sanitize_integer(&"abc".into(), Mode::Lenient), Ok(0));
        assert!(sanitize_integer(&"abc".into(), Mode::Strict).is_err());
        assert_eq!(sanitize_integer(&"  42".into(), Mode::Strict), Ok(42));
        assert_eq!(sanitize_integer(&"12abc".into(), Mode::Strict), Ok(12));
        assert_eq!(sanitize_integer(&"-7".into(), Mode::Strict), Ok(-7));
        assert_eq!(sanitize_integer(&Input::Float(3.9), Mode::Strict), Ok(3));
        assert_eq!(sanitize_integer(&Input::Float(-3.9), Mode::Strict), Ok(-3));
        assert_eq!(sanitize_integer(&Input::Bool(true), Mode::Lenient), Ok(0));
        assert!(sanitize_integer(&Input::Null, Mode::Strict).is_err());
    }

    #[test]
    fn test_float_parsing() {
        assert_approx_eq!(sanitize_float(&"3.25".into(), Mode::Strict).unwrap(), 3.25);
        assert_approx_eq!(sanitize_float(&"1.5e2xyz".into(), Mode::Strict).unwrap(), 150.0);
        assert_approx_eq!(sanitize_float(&".5".into(), Mode::Strict).unwrap(), 0.5);
        assert_approx_eq!(sanitize_float(&"-2.".into(), Mode::Strict).unwrap(), -2.0);
        assert_approx_eq!(sanitize_float(&"7e".into(), Mode::Strict).unwrap(), 7.0);
        assert_approx_eq!(sanitize_float(&Input::Int(4), Mode::Strict).unwrap(), 4.0);
        assert_eq!(sanitize_float(&"NaN".into(), Mode::Lenient), Ok(0.0));
        assert_eq!(sanitize_float(&Input::Float(f64::INFINITY), Mode::Lenient), Ok(0.0));
        assert!(sanitize_float(&"pi".into(), Mode::Strict).is_err());
        assert!(sanitize_float(&".".into(), Mode::Strict).is_err());
    }

    #[test]
    fn test_boolean_coercion() {
        assert_eq!(sanitize_boolean(&"TRUE".into(), Mode::Lenient), Ok(true));
        assert_eq!(sanitize_boolean(&"False".into(), Mode::Strict), Ok(false));
        assert_eq!(sanitize_boolean(&Input::Int(3), Mode::Strict), Ok(true));
        assert_eq!(sanitize_boolean(&Input::Float(0.0), Mode::Strict), Ok(false));
        assert_eq!(sanitize_boolean(&Input::Null, Mode::Strict), Ok(false));
        assert_eq!(sanitize_boolean(&Input::map([("a", 1)]), Mode::Lenient), Ok(true));
        assert!(sanitize_boolean(&Input::map([("a", 1)]), Mode::Strict).is_err());
        assert!(sanitize_boolean(&"yes".into(), Mode::Strict).is_err());
        assert_eq!(sanitize_boolean(&"yes".into(), Mode::Lenient), Ok(true));
        assert_eq!(sanitize_boolean(&"".into(), Mode::Lenient), Ok(false));
    }

    #[test]
    fn test_string_coercion() {
        assert_eq!(sanitize_string(&Input::Null, Mode::Lenient), Ok(String::new()));
        assert_eq!(sanitize_string(&Input::Int(12), Mode::Strict), Ok("12".to_string()));
        assert_eq!(sanitize_string(&Input::Float(2.5), Mode::Strict), Ok("2.5".to_string()));
        assert_eq!(sanitize_string(&Input::Bool(false), Mode::Strict), Ok("false".to_string()));
        assert!(sanitize_string(&Input::list([1, 2]), Mode::Strict).is_err());
        assert_eq!(sanitize_string(&Input::list([1, 2]), Mode::Lenient), Ok(String::new()));
    }

    #[test]
    fn test_literals() {
        let facing = TypeDescriptor::string().literals(["North", "South"]);
        assert_eq!(
            sanitize(&facing, &"south".into(), Mode::Strict),
            Ok(Value::from("South"))
        );
        assert!(matches!(
            sanitize(&facing, &"east".into(), Mode::Strict),
            Err(SanitizeError::NotAllowed { .. })
        ));
        assert_eq!(
            sanitize(&facing, &"east".into(), Mode::Lenient),
            Ok(Value::from("North"))
        );

        let level = TypeDescriptor::int().literals([1, 2, 3]);
        assert_eq!(sanitize(&level, &"2".into(), Mode::Strict), Ok(Value::Int(2)));
        assert_eq!(sanitize(&level, &"9".into(), Mode::Lenient), Ok(Value::Int(1)));
    }

    #[test]
    fn test_nullable_short_circuits() {
        let ty = TypeDescriptor::int().nullable();
        assert_eq!(sanitize(&ty, &Input::Null, Mode::Strict), Ok(Value::Null));
        assert_eq!(sanitize(&TypeDescriptor::int(), &Input::Null, Mode::Lenient), Ok(Value::Int(0)));

        let literal = TypeDescriptor::string().literals(["a"]).nullable();
        assert_eq!(sanitize(&literal, &Input::Null, Mode::Strict), Ok(Value::Null));
    }

    #[test]
    fn test_game_object_references() {
        let unit = GameObjectRef::new("42", "Unit").with_ancestors(["GameObject"]);
        let player = GameObjectRef::new("1", "Player");

        let ty = TypeDescriptor::game_object("GameObject");
        assert_eq!(sanitize(&ty, &unit.clone().into(), Mode::Strict), Ok(Value::Ref("42".into())));
        assert!(matches!(
            sanitize(&TypeDescriptor::game_object("Unit"), &player.clone().into(), Mode::Lenient),
            Err(SanitizeError::NotInstance { .. })
        ));

        let nullable = TypeDescriptor::game_object("Unit").nullable();
        assert_eq!(sanitize(&nullable, &player.into(), Mode::Strict), Ok(Value::Null));
        assert_eq!(sanitize(&nullable, &Input::Null, Mode::Strict), Ok(Value::Null));
        assert_eq!(sanitize(&nullable, &"42".into(), Mode::Strict), Ok(Value::Null));
    }

    #[test]
    fn test_collections_recurse() {
        let ty = TypeDescriptor::list(TypeDescriptor::record([("health", TypeDescriptor::int())]));
        let input = Input::list([Input::map([("health", "10")]), Input::map([("health", 20)])]);

        let value = sanitize(&ty, &input, Mode::Strict).unwrap();
        assert_eq!(value.as_list().unwrap()[0].get("health"), Some(&Value::Int(10)));
        assert_eq!(value.as_list().unwrap()[1].get("health"), Some(&Value::Int(20)));

        let bad = Input::list([Input::map([("health", "lots")])]);
        let err = sanitize(&ty, &bad, Mode::Strict).unwrap_err();
        assert!(err.to_string().starts_with("at 0.health:"));

        assert_eq!(sanitize(&ty, &"nope".into(), Mode::Lenient), Ok(Value::List(Vec::new())));
        assert!(sanitize(&ty, &"nope".into(), Mode::Strict).is_err());
    }

    #[test]
    fn test_dictionary_keys() {
        let ty = TypeDescriptor::keyed_dictionary(
            PrimitiveType::new(PrimitiveKind::Int),
            TypeDescriptor::string(),
        );
        let value = sanitize(&ty, &Input::map([("07", "a"), ("-1", "b")]), Mode::Strict).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["-1", "7"]);

        let reserved = Input::map([("&LEN", "a")]);
        assert!(matches!(
            sanitize(&TypeDescriptor::dictionary(TypeDescriptor::string()), &reserved, Mode::Lenient),
            Err(SanitizeError::ReservedKey { .. })
        ));
    }

    #[test]
    fn test_record_rejects_undeclared_fields_in_strict_mode() {
        let ty = TypeDescriptor::record([("health", TypeDescriptor::int())]);
        let input = Input::map([("health", Input::Int(3)), ("mana", Input::Int(9))]);

        assert!(matches!(
            sanitize(&ty, &input, Mode::Strict),
            Err(SanitizeError::UnknownKey { .. })
        ));
        let lenient = sanitize(&ty, &input, Mode::Lenient).unwrap();
        assert_eq!(lenient.as_map().unwrap().len(), 1);
    }
}
