//! Columnar cell → row-engine datum.
//!
//! [`read_cell`] never mutates the column. Wrappers are handled recursively:
//! a null flag stops the descent, dictionaries resolve to their entry, arrays
//! and tuples materialize every element before anything is returned.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chbridge_api::value::{EPOCH_BIAS_DAYS, SECS_PER_DAY, USECS_PER_SEC};
use chbridge_api::{
    ArrayValue, Block, Cell, CodecError, CodecResult, Column, ColumnData, ColumnType, Datum,
    ExternalType, MAX_DATETIME64_PRECISION, RecordField, RecordValue, map_type,
};

/// Materialize the cell at `row`.
pub fn read_cell(column: &Column, row: usize) -> CodecResult<Cell> {
    if let ColumnType::Tuple(fields) = column.column_type() {
        if fields.is_empty() {
            return Err(CodecError::invalid("returned tuple is empty"));
        }
    }
    if row >= column.len() {
        return Err(CodecError::invalid(format!(
            "row {row} out of range for column of {} rows",
            column.len()
        )));
    }
    let ty = map_type(column.column_type())?;
    let datum = read_datum(column, row, &ty)?;
    Ok(Cell { datum, ty })
}

/// Materialize one row of `block`, one cell per column.
pub fn read_row(block: &Block, row: usize) -> CodecResult<Vec<Cell>> {
    block.columns().iter().map(|c| read_cell(c, row)).collect()
}

// ════════════════════════════════════════════════════════════════
//  Dispatch
// ════════════════════════════════════════════════════════════════

/// `None` means null. `ty` is the already mapped type of `column`.
fn read_datum(column: &Column, row: usize, ty: &ExternalType) -> CodecResult<Option<Datum>> {
    let datum = match column.data() {
        ColumnData::Int8(v) => Datum::Int2(i16::from(v[row])),
        ColumnData::Int16(v) => Datum::Int2(v[row]),
        ColumnData::Int32(v) => Datum::Int4(v[row]),
        ColumnData::Int64(v) => Datum::Int8(v[row]),
        ColumnData::UInt8(v) => Datum::Int2(i16::from(v[row])),
        ColumnData::UInt16(v) => Datum::Int4(i32::from(v[row])),
        ColumnData::UInt32(v) => Datum::Int8(i64::from(v[row])),
        ColumnData::UInt64(v) => {
            let raw = v[row];
            Datum::Int8(i64::try_from(raw).map_err(|_| CodecError::overflow("int8", raw))?)
        }
        ColumnData::Float32(v) => Datum::Float4(v[row]),
        ColumnData::Float64(v) => Datum::Float8(v[row]),
        ColumnData::String(v) => Datum::Text(decode_text(&v[row])?),
        ColumnData::FixedString(bytes) => {
            let width = match column.column_type() {
                ColumnType::FixedString(width) => *width,
                other => return Err(CodecError::invalid(format!("fixed-width storage for {other}"))),
            };
            Datum::Text(decode_text(&bytes[row * width..(row + 1) * width])?)
        }
        ColumnData::Enum8(v) => Datum::Text(enum_name(column, i16::from(v[row]))?),
        ColumnData::Enum16(v) => Datum::Text(enum_name(column, v[row])?),
        ColumnData::Date(v) => match v[row] {
            0 => return Ok(None),
            days => Datum::Date(i32::from(days) - EPOCH_BIAS_DAYS as i32),
        },
        ColumnData::DateTime(v) => match v[row] {
            0 => return Ok(None),
            secs => Datum::Timestamp((i64::from(secs) - EPOCH_BIAS_DAYS * SECS_PER_DAY) * USECS_PER_SEC),
        },
        ColumnData::DateTime64(v) => match v[row] {
            0 => return Ok(None),
            ticks => {
                let precision = match column.column_type() {
                    ColumnType::DateTime64(p) => *p,
                    other => return Err(CodecError::invalid(format!("tick storage for {other}"))),
                };
                Datum::Timestamp(ticks_to_timestamp(ticks, precision)?)
            }
        },
        ColumnData::Uuid(v) => {
            let (hi, lo) = v[row];
            let mut bytes = [0u8; 16];
            bytes[..8].copy_from_slice(&hi.to_be_bytes());
            bytes[8..].copy_from_slice(&lo.to_be_bytes());
            Datum::Uuid(uuid::Uuid::from_bytes(bytes))
        }
        ColumnData::IPv4(v) => Datum::Inet(IpAddr::V4(Ipv4Addr::from(v[row]))),
        ColumnData::IPv6(v) => Datum::Inet(IpAddr::V6(Ipv6Addr::from(v[row]))),
        ColumnData::Nullable { nulls, nested } => {
            if nulls[row] {
                return Ok(None);
            }
            return read_datum(nested, row, ty);
        }
        ColumnData::LowCardinality { dictionary, keys } => {
            let key = keys[row] as usize;
            if key >= dictionary.len() {
                return Err(CodecError::invalid(format!(
                    "dictionary key {key} out of range for {} entries",
                    dictionary.len()
                )));
            }
            return read_datum(dictionary, key, ty);
        }
        ColumnData::Array { offsets, items } => Datum::Array(read_array(offsets, items, row, ty)?),
        ColumnData::Tuple(members) => Datum::Record(read_record(column, members, row)?),
    };
    Ok(Some(datum))
}

// ════════════════════════════════════════════════════════════════
//  Scalars
// ════════════════════════════════════════════════════════════════

/// Text stops at the first NUL; the engine's text type cannot hold one.
fn decode_text(bytes: &[u8]) -> CodecResult<String> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_owned)
        .map_err(|e| CodecError::invalid(format!("string is not valid UTF-8: {e}")))
}

fn enum_name(column: &Column, code: i16) -> CodecResult<String> {
    column
        .column_type()
        .enum_name(code)
        .map(str::to_owned)
        .ok_or_else(|| {
            CodecError::invalid(format!("code {code} is not declared by {}", column.column_type()))
        })
}

/// Ticks of `10^-precision` s since 1970 → microseconds since 2000.
pub fn ticks_to_timestamp(ticks: i64, precision: u8) -> CodecResult<i64> {
    check_precision(precision)?;
    let overflow = || CodecError::overflow("timestamp", format!("{ticks}e-{precision}"));
    let micros = if precision <= 6 {
        ticks
            .checked_mul(10i64.pow(u32::from(6 - precision)))
            .ok_or_else(overflow)?
    } else {
        ticks.div_euclid(10i64.pow(u32::from(precision - 6)))
    };
    micros
        .checked_sub(EPOCH_BIAS_DAYS * SECS_PER_DAY * USECS_PER_SEC)
        .ok_or_else(overflow)
}

fn check_precision(precision: u8) -> CodecResult<()> {
    if precision > MAX_DATETIME64_PRECISION {
        return Err(CodecError::invalid(format!(
            "DateTime64 precision {precision} exceeds {MAX_DATETIME64_PRECISION}"
        )));
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════
//  Containers
// ════════════════════════════════════════════════════════════════

fn read_array(
    offsets: &[u64],
    items: &Column,
    row: usize,
    ty: &ExternalType,
) -> CodecResult<ArrayValue> {
    let element_type = ty
        .element()
        .cloned()
        .ok_or_else(|| CodecError::UnsupportedType(items.column_type().to_string()))?;
    let start = if row == 0 { 0 } else { offsets[row - 1] };
    let end = offsets[row];
    if start > end || end > items.len() as u64 {
        return Err(CodecError::invalid(format!(
            "array offsets {start}..{end} out of range for {} items",
            items.len()
        )));
    }
    let values = (start as usize..end as usize)
        .map(|i| read_datum(items, i, &element_type))
        .collect::<CodecResult<Vec<_>>>()?;
    Ok(ArrayValue { element_type, items: values })
}

fn read_record(column: &Column, members: &[Column], row: usize) -> CodecResult<RecordValue> {
    let ColumnType::Tuple(fields) = column.column_type() else {
        return Err(CodecError::invalid(format!("member storage for {}", column.column_type())));
    };
    if members.is_empty() {
        return Err(CodecError::invalid("returned tuple is empty"));
    }
    let fields = fields
        .iter()
        .zip(members)
        .map(|(field, member)| {
            Ok(RecordField {
                name: field.name.clone(),
                cell: read_cell(member, row)?,
            })
        })
        .collect::<CodecResult<Vec<_>>>()?;
    Ok(RecordValue { fields })
}
