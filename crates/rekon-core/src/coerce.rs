// ── Value coercer ──
//
// Converts scalars between their typed state form and whatever JSON form
// the device uses at a given API version. Encoding is strict: the state
// value must already have the descriptor's type. Decoding accepts every
// encoding the field could carry at any version (the native form plus each
// rule's encoding), since devices sometimes keep answering with an older
// form after an upgrade.
//
// Shape mismatches (a table given a scalar, a scalar given an object) are
// reported here too, so flatten and expand share one error vocabulary.

use serde_json::{Map, Number, Value};

use crate::error::CoreError;
use crate::path::FieldPath;
use crate::schema::{FieldDescriptor, FieldKind, ScalarType, WireEncoding};
use crate::value::{Scalar, StateTree, StateValue};
use crate::version::ApiVersion;

/// Which way a value is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToState,
    ToWire,
}

/// Coerce a single scalar JSON value in either direction.
///
/// `ToState` returns the typed state value rendered as JSON; `ToWire`
/// takes that rendering and returns the version-specific wire form.
pub fn coerce(
    value: &Value,
    direction: Direction,
    descriptor: &FieldDescriptor,
    api_version: &ApiVersion,
    path: &FieldPath,
) -> Result<Value, CoreError> {
    match direction {
        Direction::ToState => Ok(decode(value, descriptor, path)?.to_json()),
        Direction::ToWire => {
            let scalar = raw_scalar(value, descriptor.scalar_type, path)?;
            encode(&scalar, descriptor, api_version, path)
        }
    }
}

// ── Decoding (wire → state) ─────────────────────────────────────────

/// Decode a wire scalar, accepting any encoding the descriptor declares.
pub fn decode(raw: &Value, descriptor: &FieldDescriptor, path: &FieldPath) -> Result<Scalar, CoreError> {
    decode_with(raw, descriptor.scalar_type, &descriptor.possible_encodings(), path)
}

/// Decode a value that must already be in native form (state documents,
/// schema defaults).
pub fn decode_native(raw: &Value, scalar_type: ScalarType, path: &FieldPath) -> Result<Scalar, CoreError> {
    decode_with(raw, scalar_type, &[WireEncoding::Native], path)
}

fn decode_with(
    raw: &Value,
    scalar_type: ScalarType,
    allowed: &[WireEncoding],
    path: &FieldPath,
) -> Result<Scalar, CoreError> {
    let scalar = raw_scalar(raw, scalar_type, path)?;
    let permitted = allowed.iter().any(|enc| accepts(*enc, scalar_type, &scalar));
    if !permitted {
        return Err(CoreError::coercion(path, scalar_type.to_string(), describe_json(raw)));
    }
    convert(&scalar, scalar_type, path)
}

/// Decode a scalar or list-of-scalar wire value into a state value.
pub fn decode_value(
    raw: &Value,
    descriptor: &FieldDescriptor,
    path: &FieldPath,
) -> Result<StateValue, CoreError> {
    match descriptor.kind {
        FieldKind::Scalar => decode(raw, descriptor, path).map(StateValue::Scalar),
        FieldKind::ListOfScalar => expect_array(raw, descriptor, path)?
            .iter()
            .enumerate()
            .map(|(idx, item)| decode(item, descriptor, &path.index(idx)))
            .collect::<Result<Vec<_>, _>>()
            .map(StateValue::Scalars),
        FieldKind::ListOfObject | FieldKind::SetOfObject => Err(CoreError::coercion(
            path,
            descriptor.kind.to_string(),
            describe_json(raw),
        )),
    }
}

// ── Encoding (state → wire) ─────────────────────────────────────────

/// Encode a typed scalar for the wire at `api_version`.
pub fn encode(
    value: &Scalar,
    descriptor: &FieldDescriptor,
    api_version: &ApiVersion,
    path: &FieldPath,
) -> Result<Value, CoreError> {
    let fits = value.scalar_type() == descriptor.scalar_type
        || (descriptor.scalar_type == ScalarType::Float && matches!(value, Scalar::Int(_)));
    if !fits {
        return Err(CoreError::coercion(
            path,
            descriptor.scalar_type.to_string(),
            describe_scalar(value),
        ));
    }

    let target = match descriptor.encoding_for(api_version) {
        WireEncoding::Native => return native_json(value, path),
        WireEncoding::String => ScalarType::String,
        WireEncoding::Integer => ScalarType::Integer,
        WireEncoding::Float => ScalarType::Float,
        WireEncoding::Boolean => ScalarType::Boolean,
    };
    if let Scalar::Float(f) = value {
        if !f.is_finite() {
            return Err(CoreError::coercion(path, "finite number", f.to_string()));
        }
    }
    native_json(&convert(value, target, path)?, path)
}

/// Encode a scalar or list-of-scalar state value.
pub fn encode_value(
    value: &StateValue,
    descriptor: &FieldDescriptor,
    api_version: &ApiVersion,
    path: &FieldPath,
) -> Result<Value, CoreError> {
    match (descriptor.kind, value) {
        (FieldKind::Scalar, StateValue::Scalar(s)) => encode(s, descriptor, api_version, path),
        (FieldKind::ListOfScalar, StateValue::Scalars(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| encode(item, descriptor, api_version, &path.index(idx)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (kind, other) => Err(CoreError::coercion(path, kind.to_string(), other.shape())),
    }
}

fn native_json(value: &Scalar, path: &FieldPath) -> Result<Value, CoreError> {
    match value {
        Scalar::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| CoreError::coercion(path, "finite number", f.to_string())),
        other => Ok(other.to_json()),
    }
}

// ── Shape checks ────────────────────────────────────────────────────

/// The wire value of a list field must be an array.
pub fn expect_array<'v>(
    raw: &'v Value,
    descriptor: &FieldDescriptor,
    path: &FieldPath,
) -> Result<&'v Vec<Value>, CoreError> {
    raw.as_array()
        .ok_or_else(|| CoreError::coercion(path, descriptor.kind.to_string(), describe_json(raw)))
}

/// The wire value of a table field must be an array of objects.
pub fn expect_rows<'v>(
    raw: &'v Value,
    descriptor: &FieldDescriptor,
    path: &FieldPath,
) -> Result<Vec<&'v Map<String, Value>>, CoreError> {
    expect_array(raw, descriptor, path)?
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_object()
                .ok_or_else(|| CoreError::coercion(&path.index(idx), "object", describe_json(item)))
        })
        .collect()
}

/// The state value of a table field must be a list or set of rows.
pub fn state_rows<'v>(
    value: &'v StateValue,
    descriptor: &FieldDescriptor,
    path: &FieldPath,
) -> Result<&'v [StateTree], CoreError> {
    value
        .rows()
        .ok_or_else(|| CoreError::coercion(path, descriptor.kind.to_string(), value.shape()))
}

// ── Conversion core ─────────────────────────────────────────────────

/// Read a JSON scalar without converting it. Numbers become `Float` when
/// the target is a float, otherwise `Int` when they fit in i64.
fn raw_scalar(raw: &Value, target: ScalarType, path: &FieldPath) -> Result<Scalar, CoreError> {
    match raw {
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::Number(n) => match (target, n.as_i64(), n.as_f64()) {
            (ScalarType::Float, _, Some(f)) => Ok(Scalar::Float(f)),
            (_, Some(i), _) => Ok(Scalar::Int(i)),
            (_, None, Some(f)) => Ok(Scalar::Float(f)),
            (_, None, None) => Err(CoreError::coercion(path, target.to_string(), n.to_string())),
        },
        Value::String(s) => Ok(Scalar::Str(s.clone())),
        Value::Null | Value::Array(_) | Value::Object(_) => {
            Err(CoreError::coercion(path, target.to_string(), describe_json(raw)))
        }
    }
}

/// Whether a raw scalar is a legal carrier of `scalar_type` under `encoding`.
fn accepts(encoding: WireEncoding, scalar_type: ScalarType, raw: &Scalar) -> bool {
    let carrier = match encoding {
        WireEncoding::Native => scalar_type,
        WireEncoding::String => ScalarType::String,
        WireEncoding::Integer => ScalarType::Integer,
        WireEncoding::Float => ScalarType::Float,
        WireEncoding::Boolean => ScalarType::Boolean,
    };
    match (carrier, raw) {
        (ScalarType::String, Scalar::Str(_))
        | (ScalarType::Integer, Scalar::Int(_))
        | (ScalarType::Float, Scalar::Float(_) | Scalar::Int(_))
        | (ScalarType::Boolean, Scalar::Bool(_)) => true,
        _ => false,
    }
}

/// Convert a scalar to `target`, failing rather than guessing.
fn convert(value: &Scalar, target: ScalarType, path: &FieldPath) -> Result<Scalar, CoreError> {
    let fail = || CoreError::coercion(path, target.to_string(), describe_scalar(value));
    let converted = match (target, value) {
        (ScalarType::String, Scalar::Str(s)) => Scalar::Str(s.clone()),
        (ScalarType::String, other) => Scalar::Str(other.to_string()),

        (ScalarType::Integer, Scalar::Int(i)) => Scalar::Int(*i),
        (ScalarType::Integer, Scalar::Str(s)) => Scalar::Int(s.trim().parse().map_err(|_| fail())?),
        (ScalarType::Integer, Scalar::Bool(b)) => Scalar::Int(i64::from(*b)),
        (ScalarType::Integer, Scalar::Float(f)) => Scalar::Int(integral(*f).ok_or_else(fail)?),

        (ScalarType::Float, Scalar::Float(f)) => Scalar::Float(*f),
        #[allow(clippy::cast_precision_loss)]
        (ScalarType::Float, Scalar::Int(i)) => Scalar::Float(*i as f64),
        (ScalarType::Float, Scalar::Str(s)) => {
            let f: f64 = s.trim().parse().map_err(|_| fail())?;
            if !f.is_finite() {
                return Err(fail());
            }
            Scalar::Float(f)
        }

        (ScalarType::Boolean, Scalar::Bool(b)) => Scalar::Bool(*b),
        (ScalarType::Boolean, Scalar::Int(0)) => Scalar::Bool(false),
        (ScalarType::Boolean, Scalar::Int(1)) => Scalar::Bool(true),
        (ScalarType::Boolean, Scalar::Str(s)) => match s.trim() {
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            _ => return Err(fail()),
        },

        _ => return Err(fail()),
    };
    Ok(converted)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
        .then_some(f as i64)
}

fn describe_json(raw: &Value) -> String {
    match raw {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "array".into(),
        Value::Object(_) => "object".into(),
    }
}

fn describe_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Bool(b) => format!("boolean {b}"),
        Scalar::Int(i) => format!("integer {i}"),
        Scalar::Float(f) => format!("float {f}"),
        Scalar::Str(s) => format!("string {s:?}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::schema::CoercionRule;
    use serde_json::json;

    fn v(raw: &str) -> ApiVersion {
        raw.parse().unwrap()
    }

    fn path() -> FieldPath {
        FieldPath::root().key("field")
    }

    /// Integer sent as a string before 6.2.4, as a number from then on.
    fn ttl() -> FieldDescriptor {
        FieldDescriptor::scalar("session_ttl", ScalarType::Integer).with_rule(CoercionRule {
            since: None,
            below: Some(v("6.2.4")),
            encode: WireEncoding::String,
        })
    }

    #[test]
    fn version_gates_wire_encoding() {
        let d = ttl();
        let value = Scalar::Int(300);
        assert_eq!(encode(&value, &d, &v("6.2.3"), &path()).unwrap(), json!("300"));
        assert_eq!(encode(&value, &d, &v("6.2.4"), &path()).unwrap(), json!(300));
    }

    #[test]
    fn decode_accepts_any_declared_encoding() {
        let d = ttl();
        assert_eq!(decode(&json!("300"), &d, &path()).unwrap(), Scalar::Int(300));
        assert_eq!(decode(&json!(300), &d, &path()).unwrap(), Scalar::Int(300));
    }

    #[test]
    fn decode_without_rules_is_strict() {
        let d = FieldDescriptor::scalar("port", ScalarType::Integer);
        let err = decode(&json!("80"), &d, &path()).unwrap_err();
        match err {
            CoreError::Coercion { path, expected, found } => {
                assert_eq!(path.to_string(), "field");
                assert_eq!(expected, "integer");
                assert_eq!(found, "string \"80\"");
            }
            other => panic!("expected Coercion, got {other:?}"),
        }
    }

    #[test]
    fn unparsable_numeric_string_is_error() {
        let err = decode(&json!("three hundred"), &ttl(), &path()).unwrap_err();
        assert!(matches!(err, CoreError::Coercion { .. }));
    }

    #[test]
    fn shape_mismatch_is_error() {
        let d = FieldDescriptor::scalar("name", ScalarType::String);
        assert!(decode(&json!(["a"]), &d, &path()).is_err());
        assert!(decode(&json!({ "a": 1 }), &d, &path()).is_err());

        let table = FieldDescriptor::table(
            "members",
            FieldKind::SetOfObject,
            "name",
            vec![FieldDescriptor::scalar("name", ScalarType::String)],
        );
        assert!(expect_rows(&json!("a"), &table, &path()).is_err());
        let err = expect_rows(&json!([{ "name": "a" }, 3]), &table, &path()).unwrap_err();
        assert_eq!(err.path().unwrap().to_string(), "field[1]");
        assert!(decode_value(&json!("a"), &table, &path()).is_err());
    }

    #[test]
    fn encode_rejects_wrong_state_type() {
        let err = encode(&Scalar::Str("300".into()), &ttl(), &v("7.0"), &path()).unwrap_err();
        assert!(matches!(err, CoreError::Coercion { .. }));
    }

    #[test]
    fn non_finite_float_is_error() {
        let d = FieldDescriptor::scalar("ratio", ScalarType::Float);
        assert!(encode(&Scalar::Float(f64::NAN), &d, &v("7.0"), &path()).is_err());
        let as_string = d.with_rule(CoercionRule {
            since: None,
            below: None,
            encode: WireEncoding::String,
        });
        assert!(encode(&Scalar::Float(f64::INFINITY), &as_string, &v("7.0"), &path()).is_err());
    }

    #[test]
    fn boolean_as_integer_encoding() {
        let d = FieldDescriptor::scalar("enabled", ScalarType::Boolean).with_rule(CoercionRule {
            since: Some(v("7.0")),
            below: None,
            encode: WireEncoding::Integer,
        });
        assert_eq!(encode(&Scalar::Bool(true), &d, &v("7.2"), &path()).unwrap(), json!(1));
        assert_eq!(encode(&Scalar::Bool(true), &d, &v("6.4"), &path()).unwrap(), json!(true));
        assert_eq!(decode(&json!(0), &d, &path()).unwrap(), Scalar::Bool(false));
        assert!(decode(&json!(2), &d, &path()).is_err());
    }

    #[test]
    fn float_accepts_integer_json() {
        let d = FieldDescriptor::scalar("ratio", ScalarType::Float);
        assert_eq!(decode(&json!(2), &d, &path()).unwrap(), Scalar::Float(2.0));
        assert_eq!(encode(&Scalar::Int(2), &d, &v("7.0"), &path()).unwrap(), json!(2));
    }

    #[test]
    fn list_of_scalar_round_trip() {
        let d = FieldDescriptor::scalar_list("ports", ScalarType::Integer).with_rule(CoercionRule {
            since: None,
            below: Some(v("7.0")),
            encode: WireEncoding::String,
        });
        let state = decode_value(&json!(["80", 443]), &d, &path()).unwrap();
        assert_eq!(state, StateValue::Scalars(vec![Scalar::Int(80), Scalar::Int(443)]));
        assert_eq!(
            encode_value(&state, &d, &v("6.4"), &path()).unwrap(),
            json!(["80", "443"])
        );
        let err = decode_value(&json!(["80", "x"]), &d, &path()).unwrap_err();
        assert_eq!(err.path().unwrap().to_string(), "field[1]");
    }

    #[test]
    fn coerce_dispatches_on_direction() {
        let d = ttl();
        assert_eq!(
            coerce(&json!("42"), Direction::ToState, &d, &v("6.0"), &path()).unwrap(),
            json!(42)
        );
        assert_eq!(
            coerce(&json!(42), Direction::ToWire, &d, &v("6.0"), &path()).unwrap(),
            json!("42")
        );
    }
}
