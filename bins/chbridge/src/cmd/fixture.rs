use std::net::IpAddr;

use chbridge_api::{
    ArrayValue, Block, Cell, CodecResult, Column, ColumnType, Datum, ExternalType, map_type,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::CliError;

// ════════════════════════════════════════════════════════════════
// Fixture file
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    #[serde(default = "default_table")]
    pub table: String,
    pub columns: Vec<FixtureColumn>,
    /// Each batch is flushed as its own block; rows are positional arrays.
    #[serde(default)]
    pub batches: Vec<Vec<Vec<Value>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

fn default_table() -> String {
    "fixture".to_string()
}

impl Fixture {
    /// Parse a fixture; every column type must map to an external type.
    pub fn parse(json: &str) -> Result<Self, CliError> {
        let fixture: Self = serde_json::from_str(json)?;
        for c in &fixture.columns {
            map_type(&c.ty)?;
        }
        Ok(fixture)
    }

    /// Empty block with the fixture's column layout.
    pub fn target(&self) -> CodecResult<Block> {
        let mut block = Block::new();
        for c in &self.columns {
            block.push_column(c.name.clone(), Column::new(c.ty.clone())?)?;
        }
        Ok(block)
    }
}

// ════════════════════════════════════════════════════════════════
// JSON → Datum
// ════════════════════════════════════════════════════════════════

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn to_datum(value: &Value, ty: &ExternalType) -> Result<Option<Datum>, CliError> {
    if value.is_null() {
        return Ok(None);
    }
    let bad = || CliError::Fixture(format!("{value} is not a valid {ty}"));
    let datum = match ty {
        ExternalType::Int2 => Datum::Int2(value.as_i64().and_then(|v| i16::try_from(v).ok()).ok_or_else(bad)?),
        ExternalType::Int4 => Datum::Int4(value.as_i64().and_then(|v| i32::try_from(v).ok()).ok_or_else(bad)?),
        ExternalType::Int8 => Datum::Int8(value.as_i64().ok_or_else(bad)?),
        ExternalType::Float4 => Datum::Float4(value.as_f64().ok_or_else(bad)? as f32),
        ExternalType::Float8 => Datum::Float8(value.as_f64().ok_or_else(bad)?),
        ExternalType::Text => Datum::Text(value.as_str().ok_or_else(bad)?.to_string()),
        ExternalType::Date => {
            let date = value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .ok_or_else(bad)?;
            Datum::from_naive_date(date).ok_or_else(bad)?
        }
        ExternalType::Timestamp => {
            let s = value.as_str().ok_or_else(bad)?;
            let ts = TIMESTAMP_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .ok_or_else(bad)?;
            Datum::from_naive_datetime(ts).ok_or_else(bad)?
        }
        ExternalType::Uuid => Datum::Uuid(
            value
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .ok_or_else(bad)?,
        ),
        ExternalType::Inet => Datum::Inet(
            value
                .as_str()
                .and_then(|s| s.parse::<IpAddr>().ok())
                .ok_or_else(bad)?,
        ),
        ExternalType::Array(elem) => {
            let items = value
                .as_array()
                .ok_or_else(bad)?
                .iter()
                .map(|v| to_datum(v, elem))
                .collect::<Result<Vec<_>, _>>()?;
            Datum::Array(ArrayValue {
                element_type: (**elem).clone(),
                items,
            })
        }
        ExternalType::Record => {
            return Err(CliError::Fixture(format!("{ty} values cannot be written")));
        }
    };
    Ok(Some(datum))
}

// ════════════════════════════════════════════════════════════════
// Cell → JSON
// ════════════════════════════════════════════════════════════════

pub fn to_json(cell: &Cell) -> Value {
    match &cell.datum {
        None => Value::Null,
        Some(d) => datum_json(d),
    }
}

fn datum_json(datum: &Datum) -> Value {
    match datum {
        Datum::Int2(v) => Value::from(*v),
        Datum::Int4(v) => Value::from(*v),
        Datum::Int8(v) => Value::from(*v),
        // Non-finite floats have no JSON form and come out as null.
        Datum::Float4(v) => Value::from(*v),
        Datum::Float8(v) => Value::from(*v),
        Datum::Text(s) => Value::String(s.clone()),
        Datum::Array(a) => Value::Array(
            a.items
                .iter()
                .map(|i| i.as_ref().map_or(Value::Null, datum_json))
                .collect(),
        ),
        Datum::Record(r) if r.fields.iter().all(|f| f.name.is_some()) => {
            let mut map = Map::new();
            for f in &r.fields {
                let name = f.name.clone().unwrap_or_default();
                map.insert(name, to_json(&f.cell));
            }
            Value::Object(map)
        }
        Datum::Record(r) => Value::Array(r.fields.iter().map(|f| to_json(&f.cell)).collect()),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chbridge_api::{CodecError, RecordField, RecordValue};
    use serde_json::json;

    #[test]
    fn parses_fixture_layout() {
        let f = Fixture::parse(
            r#"{"columns": [{"name": "id", "type": "UInt32"}, {"name": "tags", "type": "Array(Nullable(String))"}],
                "batches": [[[1, ["a", null]]]]}"#,
        )
        .unwrap();
        assert_eq!(f.table, "fixture");
        assert_eq!(f.columns[1].ty.to_string(), "Array(Nullable(String))");
        let target = f.target().unwrap();
        assert_eq!(target.column_count(), 2);
        assert_eq!(target.names(), &["id".to_string(), "tags".to_string()]);
    }

    #[test]
    fn rejects_unknown_wire_type() {
        let err = Fixture::parse(r#"{"columns": [{"name": "x", "type": "Nope"}]}"#).unwrap_err();
        assert!(
            matches!(&err, CliError::Codec(CodecError::UnsupportedType(name)) if name == "Nope"),
            "{err}"
        );
        let nested = Fixture::parse(r#"{"columns": [{"name": "x", "type": "Array(Map(String, UInt8))"}]}"#);
        assert!(matches!(nested, Err(CliError::Codec(CodecError::UnsupportedType(_)))));
        assert!(matches!(Fixture::parse(r#"{"columns": [{"name": "x", "type": "Array("}]}"#), Err(CliError::Json(_))));
    }

    #[test]
    fn converts_scalars() {
        assert_eq!(to_datum(&json!(7), &ExternalType::Int2).unwrap(), Some(Datum::Int2(7)));
        assert!(to_datum(&json!(40000), &ExternalType::Int2).is_err());
        assert_eq!(to_datum(&json!(null), &ExternalType::Int8).unwrap(), None);
        assert_eq!(
            to_datum(&json!("2000-01-02"), &ExternalType::Date).unwrap(),
            Some(Datum::Date(1))
        );
        assert_eq!(
            to_datum(&json!("2000-01-01T00:00:01.5"), &ExternalType::Timestamp).unwrap(),
            Some(Datum::Timestamp(1_500_000))
        );
        assert_eq!(
            to_datum(&json!("10.0.0.1"), &ExternalType::Inet).unwrap(),
            Some(Datum::Inet("10.0.0.1".parse().unwrap()))
        );
        assert!(to_datum(&json!("not-a-uuid"), &ExternalType::Uuid).is_err());
    }

    #[test]
    fn converts_arrays_with_null_items() {
        let ty = ExternalType::array_of(ExternalType::Int4).unwrap();
        let d = to_datum(&json!([1, null, 3]), &ty).unwrap().unwrap();
        assert_eq!(
            d,
            Datum::Array(ArrayValue {
                element_type: ExternalType::Int4,
                items: vec![Some(Datum::Int4(1)), None, Some(Datum::Int4(3))],
            })
        );
        assert_eq!(to_json(&Cell::value(d, ty)), json!([1, null, 3]));
    }

    #[test]
    fn records_are_not_writable() {
        assert!(to_datum(&json!([1]), &ExternalType::Record).is_err());
    }

    #[test]
    fn renders_records() {
        let named = Datum::Record(RecordValue {
            fields: vec![
                RecordField {
                    name: Some("a".into()),
                    cell: Cell::value(Datum::Int4(1), ExternalType::Int4),
                },
                RecordField {
                    name: Some("b".into()),
                    cell: Cell::null(ExternalType::Text),
                },
            ],
        });
        assert_eq!(to_json(&Cell::value(named, ExternalType::Record)), json!({"a": 1, "b": null}));

        let positional = Datum::Record(RecordValue {
            fields: vec![RecordField {
                name: None,
                cell: Cell::value(Datum::Text("x".into()), ExternalType::Text),
            }],
        });
        assert_eq!(to_json(&Cell::value(positional, ExternalType::Record)), json!(["x"]));
    }

    #[test]
    fn renders_temporal_values_as_text() {
        let cell = Cell::value(Datum::Date(1), ExternalType::Date);
        assert_eq!(to_json(&cell), json!("2000-01-02"));
    }
}
