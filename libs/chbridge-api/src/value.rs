use std::fmt;
use std::net::IpAddr;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::external::ExternalType;

/// Days between 1970-01-01 (wire epoch) and 2000-01-01 (engine epoch).
pub const EPOCH_BIAS_DAYS: i64 = 10_957;
pub const SECS_PER_DAY: i64 = 86_400;
pub const USECS_PER_SEC: i64 = 1_000_000;

/// Engine-side value.
///
/// Temporal variants use the engine's own epoch (2000-01-01):
/// - `Date`: days
/// - `Timestamp`: microseconds
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(String),
    Date(i32),
    Timestamp(i64),
    Uuid(uuid::Uuid),
    Inet(IpAddr),
    Array(ArrayValue),
    Record(RecordValue),
}

/// One-dimensional array. `None` items are null elements.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub element_type: ExternalType,
    pub items: Vec<Option<Datum>>,
}

/// Anonymous composite built from a tuple cell, members in position order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    pub fields: Vec<RecordField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: Option<String>,
    pub cell: Cell,
}

/// Materialized cell: value (or null) plus the external type it was read as.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub datum: Option<Datum>,
    pub ty: ExternalType,
}

impl Cell {
    pub fn value(datum: Datum, ty: ExternalType) -> Self {
        Self { datum: Some(datum), ty }
    }

    pub fn null(ty: ExternalType) -> Self {
        Self { datum: None, ty }
    }

    pub fn is_null(&self) -> bool {
        self.datum.is_none()
    }
}

fn engine_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap_or_default()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
}

impl Datum {
    /// External type this value is an instance of.
    pub fn external_type(&self) -> ExternalType {
        match self {
            Datum::Int2(_) => ExternalType::Int2,
            Datum::Int4(_) => ExternalType::Int4,
            Datum::Int8(_) => ExternalType::Int8,
            Datum::Float4(_) => ExternalType::Float4,
            Datum::Float8(_) => ExternalType::Float8,
            Datum::Text(_) => ExternalType::Text,
            Datum::Date(_) => ExternalType::Date,
            Datum::Timestamp(_) => ExternalType::Timestamp,
            Datum::Uuid(_) => ExternalType::Uuid,
            Datum::Inet(_) => ExternalType::Inet,
            Datum::Array(arr) => ExternalType::Array(Box::new(arr.element_type.clone())),
            Datum::Record(_) => ExternalType::Record,
        }
    }

    pub fn from_naive_date(date: NaiveDate) -> Option<Self> {
        let days = date.signed_duration_since(engine_epoch().date()).num_days();
        i32::try_from(days).ok().map(Datum::Date)
    }

    pub fn from_naive_datetime(ts: NaiveDateTime) -> Option<Self> {
        ts.signed_duration_since(engine_epoch())
            .num_microseconds()
            .map(Datum::Timestamp)
    }

    /// Calendar date of a `Date` datum. `None` for other variants and for
    /// values outside chrono's range.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        match self {
            Datum::Date(days) => engine_epoch()
                .date()
                .checked_add_signed(TimeDelta::try_days(i64::from(*days))?),
            _ => None,
        }
    }

    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Datum::Timestamp(us) => engine_epoch().checked_add_signed(TimeDelta::microseconds(*us)),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Int2(v) => write!(f, "{v}"),
            Datum::Int4(v) => write!(f, "{v}"),
            Datum::Int8(v) => write!(f, "{v}"),
            Datum::Float4(v) => write!(f, "{v}"),
            Datum::Float8(v) => write!(f, "{v}"),
            Datum::Text(v) => f.write_str(v),
            Datum::Date(days) => match self.to_naive_date() {
                Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                None => write!(f, "date({days})"),
            },
            Datum::Timestamp(us) => match self.to_naive_datetime() {
                Some(ts) if us.rem_euclid(USECS_PER_SEC) == 0 => {
                    write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S"))
                }
                Some(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
                None => write!(f, "timestamp({us})"),
            },
            Datum::Uuid(v) => write!(f, "{v}"),
            Datum::Inet(v) => write!(f, "{v}"),
            Datum::Array(arr) => {
                f.write_str("{")?;
                for (i, item) in arr.items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match item {
                        Some(d) => write!(f, "{d}")?,
                        None => f.write_str("NULL")?,
                    }
                }
                f.write_str("}")
            }
            Datum::Record(rec) => {
                f.write_str("(")?;
                for (i, field) in rec.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if let Some(d) = &field.cell.datum {
                        write!(f, "{d}")?;
                    }
                }
                f.write_str(")")
            }
        }
    }
}
