//! # Entity Mapper
//!
//! Translates between the ERP's JSON records and the local field map,
//! driven entirely by the [`EntitySchema`](crate::schema::EntitySchema)
//! declarations.
//!
//! ## Invariants
//! - Only declared fields cross the boundary. Unknown remote properties are
//!   ignored; local-only columns never appear in a field map, so an update
//!   built from one can never null them out.
//! - Every value is normalized (see [`FieldKind`]) so that the Diff Engine
//!   compares like with like.

use chrono::{DateTime, NaiveDate};
use serde_json::{Number, Value};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::record::{DocumentLine, FieldMap, FieldValue, RemoteRecord};
use crate::schema::{line_fields, EntitySchema, FieldKind};
use crate::validation::validate_natural_key;

// =============================================================================
// Remote → Local
// =============================================================================

/// Extracts the natural key of a remote record.
pub fn remote_key(schema: &EntitySchema, remote: &RemoteRecord) -> CoreResult<String> {
    let entity = schema.kind.as_str();
    let key = match remote.get(schema.key.remote) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    validate_natural_key(schema.key.local, &key)
        .map_err(|e| CoreError::mapping(entity, "<unknown>", e.to_string()))?;

    Ok(key)
}

/// Maps a remote record into `(natural key, local fields)`.
///
/// The returned map holds every declared field, normalized.
///
/// ## Errors
/// `CoreError::Mapping` if the key is missing, a required field is empty,
/// or a value has the wrong JSON type for its field kind.
pub fn to_local_shape(schema: &EntitySchema, remote: &RemoteRecord) -> CoreResult<(String, FieldMap)> {
    let key = remote_key(schema, remote)?;
    let entity = schema.kind.as_str();

    let mut fields = FieldMap::new();
    for spec in schema.fields {
        let raw = remote.get(spec.remote).unwrap_or(&Value::Null);
        let value = parse_remote_value(spec.kind, raw)
            .map_err(|reason| CoreError::mapping(entity, &key, format!("{}: {}", spec.remote, reason)))?;
        let value = normalize(spec.kind, &value);

        if spec.required && is_empty(spec.kind, &value) {
            return Err(CoreError::mapping(
                entity,
                &key,
                format!("{} is required", spec.remote),
            ));
        }

        fields.insert(spec.local.to_string(), value);
    }

    Ok((key, fields))
}

fn is_empty(kind: FieldKind, value: &FieldValue) -> bool {
    match kind {
        FieldKind::Text | FieldKind::Date | FieldKind::Lines => value.is_null(),
        _ => false,
    }
}

fn parse_remote_value(kind: FieldKind, raw: &Value) -> Result<FieldValue, String> {
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }

    match kind {
        FieldKind::Text => match raw {
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
            Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
            _ => Err("expected text".to_string()),
        },
        FieldKind::Integer => parse_integer(raw).map(|v| v.map_or(FieldValue::Null, FieldValue::Integer)),
        FieldKind::Money => parse_money(raw).map(|v| v.map_or(FieldValue::Null, FieldValue::Money)),
        FieldKind::Flag { .. } => parse_flag(raw).map(FieldValue::Flag),
        FieldKind::Date => parse_date(raw).map(|v| v.map_or(FieldValue::Null, FieldValue::Date)),
        FieldKind::Lines => parse_lines(raw).map(FieldValue::Lines),
    }
}

fn parse_integer(raw: &Value) -> Result<Option<i64>, String> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            integer_from_decimal_text(&n.to_string()).map(Some)
        }
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => integer_from_decimal_text(s.trim()).map(Some),
        _ => Err("expected a whole number".to_string()),
    }
}

/// Accepts "12" and "12.000" but not "12.5".
fn integer_from_decimal_text(text: &str) -> Result<i64, String> {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    if !fraction.chars().all(|c| c == '0') {
        return Err(format!("'{}' is not a whole number", text));
    }
    whole
        .parse::<i64>()
        .map_err(|_| format!("'{}' is not a whole number", text))
}

fn parse_money(raw: &Value) -> Result<Option<Money>, String> {
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.clone(),
        _ => return Err("expected a decimal amount".to_string()),
    };
    Money::parse_decimal(&text)
        .map(Some)
        .ok_or_else(|| format!("'{}' is not a decimal amount", text))
}

fn parse_flag(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("'{}' is not a flag", n)),
        },
        Value::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "TRUE" | "T" | "Y" | "YES" | "1" => Ok(true),
            "FALSE" | "F" | "N" | "NO" | "0" => Ok(false),
            other => Err(format!("'{}' is not a flag", other)),
        },
        _ => Err("expected a flag".to_string()),
    }
}

fn parse_date(raw: &Value) -> Result<Option<NaiveDate>, String> {
    let Value::String(s) = raw else {
        return Err("expected a date string".to_string());
    };
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.date_naive()));
    }
    // "2024-03-01", "2024-03-01T00:00:00", "2024-03-01 00:00:00"
    s.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .map(Some)
        .ok_or_else(|| format!("'{}' is not a date", s))
}

fn parse_lines(raw: &Value) -> Result<Vec<DocumentLine>, String> {
    let Value::Array(items) = raw else {
        return Err("expected an array of lines".to_string());
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let Value::Object(line) = item else {
                return Err(format!("line {} is not an object", idx + 1));
            };
            let get = |name: &str| line.get(name).unwrap_or(&Value::Null);

            let item_code = match get(line_fields::ITEM_CODE) {
                Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                _ => return Err(format!("line {}: {} is required", idx + 1, line_fields::ITEM_CODE)),
            };
            let description = match get(line_fields::DESCRIPTION) {
                Value::String(s) => Some(s.clone()),
                _ => None,
            };
            let quantity = parse_integer(get(line_fields::QUANTITY))
                .map_err(|e| format!("line {}: {}", idx + 1, e))?
                .unwrap_or(0);
            let unit_cost = parse_money(get(line_fields::UNIT_PRICE))
                .map_err(|e| format!("line {}: {}", idx + 1, e))?
                .unwrap_or_default();

            Ok(DocumentLine {
                item_code,
                description,
                quantity,
                unit_cost,
            })
        })
        .collect()
}

// =============================================================================
// Normalization
// =============================================================================

/// Brings a value into the canonical form for its field kind.
pub fn normalize(kind: FieldKind, value: &FieldValue) -> FieldValue {
    match (kind, value) {
        (FieldKind::Text, FieldValue::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                FieldValue::Null
            } else {
                FieldValue::Text(trimmed.to_string())
            }
        }
        (FieldKind::Integer, FieldValue::Null) => FieldValue::Integer(0),
        (FieldKind::Money, FieldValue::Null) => FieldValue::Money(Money::zero()),
        (FieldKind::Flag { absent }, FieldValue::Null) => FieldValue::Flag(absent),
        (FieldKind::Lines, FieldValue::Lines(lines)) if lines.is_empty() => FieldValue::Null,
        (FieldKind::Lines, FieldValue::Lines(lines)) => FieldValue::Lines(
            lines
                .iter()
                .map(|line| DocumentLine {
                    item_code: line.item_code.trim().to_string(),
                    description: line
                        .description
                        .as_deref()
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(str::to_string),
                    quantity: line.quantity,
                    unit_cost: line.unit_cost,
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Normalizes every declared field of a map; absent fields become their
/// kind's canonical "no value".
pub fn normalize_fields(schema: &EntitySchema, fields: &FieldMap) -> FieldMap {
    schema
        .fields
        .iter()
        .map(|spec| {
            let value = fields.get(spec.local).unwrap_or(&FieldValue::Null);
            (spec.local.to_string(), normalize(spec.kind, value))
        })
        .collect()
}

// =============================================================================
// Local → Remote
// =============================================================================

/// Builds the ERP payload for a record.
///
/// Only fields present in `fields` are written (partial payload). Values
/// are emitted in canonical form: blank text as `""`, missing amounts as
/// `0`, missing dates omitted.
pub fn to_remote_shape(schema: &EntitySchema, key: &str, fields: &FieldMap) -> RemoteRecord {
    let mut remote = RemoteRecord::new();
    remote.insert(schema.key.remote, Value::String(key.to_string()));

    for spec in schema.fields {
        let Some(value) = fields.get(spec.local) else {
            continue;
        };
        if let Some(json) = remote_value(spec.kind, &normalize(spec.kind, value)) {
            remote.insert(spec.remote, json);
        }
    }

    remote
}

fn remote_value(kind: FieldKind, value: &FieldValue) -> Option<Value> {
    match value {
        FieldValue::Null => match kind {
            FieldKind::Text => Some(Value::String(String::new())),
            FieldKind::Lines => Some(Value::Array(Vec::new())),
            _ => None,
        },
        FieldValue::Text(s) => Some(Value::String(s.clone())),
        FieldValue::Integer(i) => Some(Value::from(*i)),
        FieldValue::Money(m) => Some(money_json(*m)),
        FieldValue::Flag(b) => Some(Value::Bool(*b)),
        FieldValue::Date(d) => Some(Value::String(d.format("%Y-%m-%d").to_string())),
        FieldValue::Lines(lines) => Some(Value::Array(
            lines
                .iter()
                .map(|line| {
                    let mut obj = serde_json::Map::new();
                    obj.insert(line_fields::ITEM_CODE.into(), Value::String(line.item_code.clone()));
                    obj.insert(
                        line_fields::DESCRIPTION.into(),
                        Value::String(line.description.clone().unwrap_or_default()),
                    );
                    obj.insert(line_fields::QUANTITY.into(), Value::from(line.quantity));
                    obj.insert(line_fields::UNIT_PRICE.into(), money_json(line.unit_cost));
                    Value::Object(obj)
                })
                .collect(),
        )),
    }
}

/// A JSON number when it reads back as exactly this amount, otherwise the
/// decimal text.
fn money_json(amount: Money) -> Value {
    let text = amount.to_decimal_string();
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .filter(|number| Money::parse_decimal(&number.to_string()) == Some(amount))
        .map(Value::Number)
        .unwrap_or(Value::String(text))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{INVENTORY_ITEM, PURCHASE_ORDER, SUPPLIER};
    use serde_json::json;

    fn remote(value: Value) -> RemoteRecord {
        RemoteRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_item_to_local_shape() {
        let record = remote(json!({
            "ItemCode": " ITM-001 ",
            "Description": "Hex Bolt M6",
            "ItemGroup": "",
            "StandardCost": 1.2,
            "Price": "2.50",
            "IsActive": "T",
            "Unmapped": {"ignored": true}
        }));

        let (key, fields) = to_local_shape(&INVENTORY_ITEM, &record).unwrap();
        assert_eq!(key, "ITM-001");
        assert_eq!(fields["name"], FieldValue::Text("Hex Bolt M6".into()));
        assert_eq!(fields["category"], FieldValue::Null);
        assert_eq!(fields["cost_cents"], FieldValue::Money(Money::from_cents(120)));
        assert_eq!(fields["price_cents"], FieldValue::Money(Money::from_cents(250)));
        assert_eq!(fields["is_active"], FieldValue::Flag(true));
        assert_eq!(fields.len(), INVENTORY_ITEM.fields.len());
        assert!(!fields.contains_key("Unmapped"));
    }

    #[test]
    fn test_missing_key_is_mapping_error() {
        let err = to_local_shape(&INVENTORY_ITEM, &remote(json!({"Description": "x"}))).unwrap_err();
        assert!(matches!(err, CoreError::Mapping { .. }));
    }

    #[test]
    fn test_missing_required_field_is_mapping_error() {
        let err = to_local_shape(&SUPPLIER, &remote(json!({"AccNo": "400-A001", "CompanyName": "  "})))
            .unwrap_err();
        assert!(err.to_string().contains("400-A001"));
        assert!(err.to_string().contains("CompanyName is required"));
    }

    #[test]
    fn test_wrong_type_is_mapping_error() {
        let err = to_local_shape(
            &INVENTORY_ITEM,
            &remote(json!({"ItemCode": "A", "Description": "a", "StandardCost": "cheap"})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("StandardCost"));
    }

    #[test]
    fn test_purchase_order_lines_and_date() {
        let record = remote(json!({
            "DocNo": "PO-0001",
            "CreditorCode": "400-A001",
            "DocDate": "2024-03-01T00:00:00",
            "Total": 26,
            "Details": [
                {"ItemCode": "ITM-001", "Description": " Bolts ", "Qty": 10, "UnitPrice": 2},
                {"ItemCode": "ITM-002", "Qty": "2.000", "UnitPrice": "3.00"}
            ]
        }));

        let (_, fields) = to_local_shape(&PURCHASE_ORDER, &record).unwrap();
        assert_eq!(
            fields["order_date"],
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        let FieldValue::Lines(lines) = &fields["lines"] else {
            panic!("expected lines");
        };
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].description.as_deref(), Some("Bolts"));
        assert_eq!(lines[1].quantity, 2);
        assert_eq!(lines[1].unit_cost, Money::from_cents(300));
    }

    #[test]
    fn test_fractional_line_quantity_rejected() {
        let record = remote(json!({
            "DocNo": "PO-0002",
            "CreditorCode": "400-A001",
            "DocDate": "2024-03-01",
            "Details": [{"ItemCode": "ITM-001", "Qty": 1.5, "UnitPrice": 2}]
        }));
        assert!(to_local_shape(&PURCHASE_ORDER, &record).is_err());
    }

    #[test]
    fn test_normalization_equivalences() {
        assert_eq!(normalize(FieldKind::Text, &FieldValue::Text("  ".into())), FieldValue::Null);
        assert_eq!(normalize(FieldKind::Money, &FieldValue::Null), FieldValue::Money(Money::zero()));
        assert_eq!(normalize(FieldKind::Integer, &FieldValue::Null), FieldValue::Integer(0));
        assert_eq!(
            normalize(FieldKind::Flag { absent: true }, &FieldValue::Null),
            FieldValue::Flag(true)
        );
        assert_eq!(normalize(FieldKind::Lines, &FieldValue::Lines(vec![])), FieldValue::Null);
    }

    #[test]
    fn test_to_remote_shape_is_partial() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::Text("Hex Bolt".into()));
        fields.insert("cost_cents".into(), FieldValue::Money(Money::from_cents(125)));
        fields.insert("category".into(), FieldValue::Null);

        let payload = to_remote_shape(&INVENTORY_ITEM, "ITM-001", &fields).into_value();
        assert_eq!(payload["ItemCode"], json!("ITM-001"));
        assert_eq!(payload["Description"], json!("Hex Bolt"));
        assert_eq!(payload["StandardCost"], json!(1.25));
        assert_eq!(payload["ItemGroup"], json!(""));
        assert!(payload.get("Price").is_none());
        assert!(payload.get("IsActive").is_none());
    }

    #[test]
    fn test_local_fields_survive_remote_round_trip() {
        let record = remote(json!({
            "AccNo": "400-B002",
            "CompanyName": "Borneo Fasteners Sdn Bhd",
            "Phone1": "088-123456",
            "IsActive": false
        }));
        let (key, fields) = to_local_shape(&SUPPLIER, &record).unwrap();
        let back = to_remote_shape(&SUPPLIER, &key, &fields);
        let (key2, fields2) = to_local_shape(&SUPPLIER, &back).unwrap();
        assert_eq!(key, key2);
        assert_eq!(fields, fields2);
    }

    #[test]
    fn test_large_amounts_keep_every_cent() {
        assert_eq!(money_json(Money::from_cents(120)), json!(1.2));
        assert_eq!(money_json(Money::from_cents(-5)), json!(-0.05));
        assert_eq!(money_json(Money::from_cents(4200)), json!(42.0));

        // Past 2^53 cents an f64 cannot hold every cent.
        let large = Money::from_cents(9_007_199_254_740_993);
        assert_eq!(money_json(large), json!("90071992547409.93"));
        assert_eq!(money_json(Money::from_cents(i64::MAX)), json!("92233720368547758.07"));

        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::Text("Hex Bolt".into()));
        fields.insert("cost_cents".into(), FieldValue::Money(large));
        let payload = to_remote_shape(&INVENTORY_ITEM, "ITM-001", &fields);
        let (_, back) = to_local_shape(&INVENTORY_ITEM, &payload).unwrap();
        assert_eq!(back["cost_cents"], FieldValue::Money(large));
    }
}
