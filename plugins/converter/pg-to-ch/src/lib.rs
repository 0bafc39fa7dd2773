//! Row-engine datum → columnar cell.
//!
//! Every pairing of external type and wire column type is listed explicitly
//! in [`append_datum`]; anything else is a [`CodecError::TypeMismatch`]. A
//! failed append leaves the target column unchanged.

use std::net::IpAddr;

use chbridge_api::value::{EPOCH_BIAS_DAYS, SECS_PER_DAY, USECS_PER_SEC};
use chbridge_api::{
    CodecError, CodecResult, Column, ColumnData, ColumnType, Datum, ExternalType,
    MAX_DATETIME64_PRECISION,
};

/// Append one value (`None` = null) declared as `ty` to `column`.
pub fn append_datum(column: &mut Column, datum: Option<&Datum>, ty: &ExternalType) -> CodecResult<()> {
    if let Some(d) = datum {
        let actual = d.external_type();
        if actual != *ty {
            return Err(CodecError::mismatch(ty, format!("{actual} value")));
        }
    }
    let column_type = column.column_type().clone();
    match (column.data_mut(), datum) {
        (ColumnData::Nullable { nulls, nested }, None) => {
            nested.push_default()?;
            nulls.push(true);
            Ok(())
        }
        (ColumnData::Nullable { nulls, nested }, Some(d)) => {
            append_datum(nested, Some(d), ty)?;
            nulls.push(false);
            Ok(())
        }
        (ColumnData::LowCardinality { dictionary, keys }, value) => {
            let key = dictionary_key(dictionary, value, ty)?;
            keys.push(key);
            Ok(())
        }
        (_, None) => Err(CodecError::mismatch(
            format!("null {ty}"),
            format!("non-nullable {column_type}"),
        )),
        (data, Some(d)) => append_value(data, &column_type, d, ty),
    }
}

// ════════════════════════════════════════════════════════════════
//  Scalar pairings
// ════════════════════════════════════════════════════════════════

fn append_value(
    data: &mut ColumnData,
    column_type: &ColumnType,
    datum: &Datum,
    ty: &ExternalType,
) -> CodecResult<()> {
    match (datum, data) {
        (Datum::Int2(v), ColumnData::Int16(out)) => out.push(*v),
        (Datum::Int2(v), ColumnData::Int8(out)) => out.push(narrow(*v, "Int8")?),
        (Datum::Int2(v), ColumnData::UInt8(out)) => out.push(narrow(*v, "UInt8")?),
        (Datum::Int4(v), ColumnData::Int32(out)) => out.push(*v),
        (Datum::Int4(v), ColumnData::UInt16(out)) => out.push(narrow(*v, "UInt16")?),
        (Datum::Int8(v), ColumnData::Int64(out)) => out.push(*v),
        (Datum::Int8(v), ColumnData::UInt32(out)) => out.push(narrow(*v, "UInt32")?),
        (Datum::Int8(v), ColumnData::UInt64(out)) => out.push(narrow(*v, "UInt64")?),
        (Datum::Float4(v), ColumnData::Float32(out)) => out.push(*v),
        (Datum::Float8(v), ColumnData::Float64(out)) => out.push(*v),

        (Datum::Text(s), ColumnData::String(out)) => out.push(s.as_bytes().to_vec()),
        (Datum::Text(s), ColumnData::FixedString(out)) => {
            let ColumnType::FixedString(width) = *column_type else {
                return Err(CodecError::mismatch(ty, column_type));
            };
            if s.len() > width {
                return Err(CodecError::invalid(format!(
                    "{} bytes do not fit into {column_type}",
                    s.len()
                )));
            }
            out.extend_from_slice(s.as_bytes());
            out.resize(out.len() + width - s.len(), 0);
        }
        (Datum::Text(s), ColumnData::Enum8(out)) => {
            let code = enum_code(column_type, s)?;
            out.push(code as i8);
        }
        (Datum::Text(s), ColumnData::Enum16(out)) => out.push(enum_code(column_type, s)?),

        (Datum::Date(days), ColumnData::Date(out)) => {
            let raw = i64::from(*days) + EPOCH_BIAS_DAYS;
            out.push(u16::try_from(raw).map_err(|_| CodecError::overflow("Date", days))?);
        }
        (Datum::Timestamp(us), ColumnData::DateTime(out)) => {
            let secs = us.div_euclid(USECS_PER_SEC) + EPOCH_BIAS_DAYS * SECS_PER_DAY;
            out.push(u32::try_from(secs).map_err(|_| CodecError::overflow("DateTime", us))?);
        }
        (Datum::Timestamp(us), ColumnData::DateTime64(out)) => {
            let ColumnType::DateTime64(precision) = *column_type else {
                return Err(CodecError::mismatch(ty, column_type));
            };
            out.push(timestamp_to_ticks(*us, precision)?);
        }

        (Datum::Uuid(u), ColumnData::Uuid(out)) => {
            let bytes = u.as_bytes();
            let mut hi = [0u8; 8];
            let mut lo = [0u8; 8];
            hi.copy_from_slice(&bytes[..8]);
            lo.copy_from_slice(&bytes[8..]);
            out.push((u64::from_be_bytes(hi), u64::from_be_bytes(lo)));
        }
        (Datum::Inet(IpAddr::V4(addr)), ColumnData::IPv4(out)) => out.push(u32::from(*addr)),
        (Datum::Inet(IpAddr::V6(addr)), ColumnData::IPv4(_)) => {
            return Err(CodecError::invalid(format!("{addr} does not fit into IPv4")));
        }
        (Datum::Inet(IpAddr::V6(addr)), ColumnData::IPv6(out)) => out.push(addr.octets()),
        (Datum::Inet(IpAddr::V4(addr)), ColumnData::IPv6(out)) => {
            out.push(addr.to_ipv6_mapped().octets());
        }

        (Datum::Array(arr), ColumnData::Array { offsets, items }) => {
            // Elements go into a transient column first so a failing element
            // leaves `items` untouched.
            let mut transient = Column::new(items.column_type().clone())?;
            for item in &arr.items {
                append_datum(&mut transient, item.as_ref(), &arr.element_type)?;
            }
            items.extend_from(&transient)?;
            offsets.push(items.len() as u64);
        }

        _ => return Err(CodecError::mismatch(ty, column_type)),
    }
    Ok(())
}

fn narrow<S, T>(value: S, target: &'static str) -> CodecResult<T>
where
    S: Copy + std::fmt::Display,
    T: TryFrom<S>,
{
    T::try_from(value).map_err(|_| CodecError::overflow(target, value))
}

fn enum_code(column_type: &ColumnType, name: &str) -> CodecResult<i16> {
    column_type
        .enum_code(name)
        .ok_or_else(|| CodecError::invalid(format!("'{name}' is not a value of {column_type}")))
}

/// Microseconds since 2000 → ticks of `10^-precision` s since 1970.
pub fn timestamp_to_ticks(us: i64, precision: u8) -> CodecResult<i64> {
    if precision > MAX_DATETIME64_PRECISION {
        return Err(CodecError::invalid(format!(
            "DateTime64 precision {precision} exceeds {MAX_DATETIME64_PRECISION}"
        )));
    }
    let overflow = || CodecError::overflow("DateTime64", us);
    let micros = us
        .checked_add(EPOCH_BIAS_DAYS * SECS_PER_DAY * USECS_PER_SEC)
        .ok_or_else(overflow)?;
    if precision <= 6 {
        Ok(micros.div_euclid(10i64.pow(u32::from(6 - precision))))
    } else {
        micros
            .checked_mul(10i64.pow(u32::from(precision - 6)))
            .ok_or_else(overflow)
    }
}

// ════════════════════════════════════════════════════════════════
//  Dictionary
// ════════════════════════════════════════════════════════════════

/// Key of `value` in `dictionary`, adding the entry when it is new.
fn dictionary_key(dictionary: &mut Column, value: Option<&Datum>, ty: &ExternalType) -> CodecResult<u32> {
    let mut entry = Column::new(dictionary.column_type().clone())?;
    append_datum(&mut entry, value, ty)?;
    dictionary.intern(&entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chbridge_api::{ArrayValue, Cell, RecordField, RecordValue};
    use chbridge_converter_ch_to_pg::read_cell;
    use proptest::prelude::*;

    fn column(ty: &str) -> Column {
        Column::new(ty.parse().unwrap()).unwrap()
    }

    fn write(column: &mut Column, datum: Datum) -> CodecResult<()> {
        let ty = datum.external_type();
        append_datum(column, Some(&datum), &ty)
    }

    #[test]
    fn integer_whitelist() {
        let mut c = column("UInt16");
        write(&mut c, Datum::Int4(65_535)).unwrap();
        assert!(matches!(write(&mut c, Datum::Int4(65_536)), Err(CodecError::Overflow { .. })));
        assert_eq!(c.len(), 1);

        let err = write(&mut c, Datum::Int8(1)).unwrap_err();
        assert_eq!(err, CodecError::mismatch("int8", "UInt16"));

        let mut c = column("Int64");
        assert!(matches!(write(&mut c, Datum::Int4(1)), Err(CodecError::TypeMismatch { .. })));
    }

    #[test]
    fn uint64_rejects_negative() {
        let mut c = column("UInt64");
        assert!(matches!(write(&mut c, Datum::Int8(-1)), Err(CodecError::Overflow { target: "UInt64", .. })));
        write(&mut c, Datum::Int8(i64::MAX)).unwrap();
        assert_eq!(read_cell(&c, 0).unwrap().datum, Some(Datum::Int8(i64::MAX)));
    }

    #[test]
    fn declared_type_must_match_value() {
        let mut c = column("Int32");
        let err = append_datum(&mut c, Some(&Datum::Int2(1)), &ExternalType::Int4).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn null_needs_nullable_column() {
        let mut c = column("String");
        let err = append_datum(&mut c, None, &ExternalType::Text).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
        assert!(c.is_empty());

        let mut c = column("Nullable(String)");
        append_datum(&mut c, None, &ExternalType::Text).unwrap();
        assert!(read_cell(&c, 0).unwrap().is_null());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn failed_nested_write_leaves_null_flags_aligned() {
        let mut c = column("Nullable(UInt8)");
        assert!(write(&mut c, Datum::Int2(-1)).is_err());
        assert!(c.is_empty());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn text_targets() {
        let mut c = column("FixedString(3)");
        write(&mut c, Datum::Text("ab".into())).unwrap();
        assert!(matches!(write(&mut c, Datum::Text("abcd".into())), Err(CodecError::InvalidData(_))));
        assert_eq!(c.data(), &ColumnData::FixedString(b"ab\0".to_vec()));
        assert_eq!(read_cell(&c, 0).unwrap().datum, Some(Datum::Text("ab".into())));

        let mut c = column("Enum8('up' = 1, 'down' = -1)");
        write(&mut c, Datum::Text("down".into())).unwrap();
        assert!(matches!(write(&mut c, Datum::Text("left".into())), Err(CodecError::InvalidData(_))));
        assert_eq!(c.data(), &ColumnData::Enum8(vec![-1]));
    }

    #[test]
    fn low_cardinality_reuses_entries() {
        let mut c = column("LowCardinality(Nullable(String))");
        for value in [Some("eu"), None, Some("us"), Some("eu"), None] {
            let datum = value.map(|s| Datum::Text(s.into()));
            append_datum(&mut c, datum.as_ref(), &ExternalType::Text).unwrap();
        }
        let ColumnData::LowCardinality { dictionary, keys } = c.data() else { panic!("expected dictionary") };
        assert_eq!(dictionary.len(), 3);
        assert_eq!(keys, &vec![0, 1, 2, 0, 1]);
        assert_eq!(read_cell(&c, 3).unwrap().datum, Some(Datum::Text("eu".into())));
        assert!(read_cell(&c, 4).unwrap().is_null());
    }

    #[test]
    fn low_cardinality_handles_many_distinct_values() {
        let mut c = column("LowCardinality(String)");
        let n = 50_000;
        for round in 0..2 {
            for i in 0..n {
                append_datum(&mut c, Some(&Datum::Text(format!("sym-{i}"))), &ExternalType::Text).unwrap();
            }
            let ColumnData::LowCardinality { dictionary, keys } = c.data() else { panic!("expected dictionary") };
            assert_eq!(dictionary.len(), n);
            assert_eq!(keys.len(), n * (round + 1));
        }
        let ColumnData::LowCardinality { keys, .. } = c.data() else { panic!("expected dictionary") };
        assert_eq!(keys[n + 123], 123);
        assert_eq!(read_cell(&c, n + 4_999).unwrap().datum, Some(Datum::Text("sym-4999".into())));
    }

    #[test]
    fn low_cardinality_fixed_string_dedupes_padded_entries() {
        let mut c = column("LowCardinality(FixedString(4))");
        for value in ["ab", "abcd", "ab"] {
            append_datum(&mut c, Some(&Datum::Text(value.into())), &ExternalType::Text).unwrap();
        }
        let ColumnData::LowCardinality { dictionary, keys } = c.data() else { panic!("expected dictionary") };
        assert_eq!(dictionary.len(), 2);
        assert_eq!(keys, &vec![0, 1, 0]);
    }

    #[test]
    fn precision_beyond_nanoseconds_is_rejected() {
        let ty = ColumnType::DateTime64(30);
        assert!(matches!(Column::new(ty), Err(CodecError::InvalidData(_))));
        assert!(matches!(timestamp_to_ticks(1, 30), Err(CodecError::InvalidData(_))));
        assert!(matches!(timestamp_to_ticks(1, 10), Err(CodecError::InvalidData(_))));
        assert!(timestamp_to_ticks(1, 9).is_ok());
    }

    #[test]
    fn temporal_bias_is_inverse_of_reader() {
        let mut c = column("Date");
        write(&mut c, Datum::Date(0)).unwrap();
        assert_eq!(c.data(), &ColumnData::Date(vec![10_957]));
        assert!(matches!(write(&mut c, Datum::Date(-20_000)), Err(CodecError::Overflow { .. })));

        let mut c = column("DateTime");
        write(&mut c, Datum::Timestamp(1_999_999)).unwrap();
        assert_eq!(c.data(), &ColumnData::DateTime(vec![946_684_801]));

        let mut c = column("DateTime64(3)");
        write(&mut c, Datum::Timestamp(1_500_000)).unwrap();
        assert_eq!(read_cell(&c, 0).unwrap().datum, Some(Datum::Timestamp(1_500_000)));
        assert_eq!(timestamp_to_ticks(0, 9).unwrap(), 946_684_800_000_000_000);
    }

    #[test]
    fn uuid_and_inet() {
        let u = uuid::Uuid::parse_str("01234567-89ab-cdef-fedc-ba9876543210").unwrap();
        let mut c = column("UUID");
        write(&mut c, Datum::Uuid(u)).unwrap();
        assert_eq!(c.data(), &ColumnData::Uuid(vec![(0x0123_4567_89ab_cdef, 0xfedc_ba98_7654_3210)]));

        let v4: IpAddr = "10.0.0.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        let mut c = column("IPv4");
        write(&mut c, Datum::Inet(v4)).unwrap();
        assert!(matches!(write(&mut c, Datum::Inet(v6)), Err(CodecError::InvalidData(_))));

        let mut c = column("IPv6");
        write(&mut c, Datum::Inet(v4)).unwrap();
        assert_eq!(read_cell(&c, 0).unwrap().datum.unwrap().to_string(), "::ffff:10.0.0.1");
    }

    #[test]
    fn arrays_write_through_transient_column() {
        let mut c = column("Array(Nullable(Int32))");
        let arr = Datum::Array(ArrayValue {
            element_type: ExternalType::Int4,
            items: vec![Some(Datum::Int4(1)), None],
        });
        write(&mut c, arr.clone()).unwrap();
        assert_eq!(read_cell(&c, 0).unwrap().datum, Some(arr));

        let bad = Datum::Array(ArrayValue {
            element_type: ExternalType::Int4,
            items: vec![Some(Datum::Int4(2)), Some(Datum::Text("x".into()))],
        });
        assert!(write(&mut c, bad).is_err());
        assert_eq!(c.len(), 1);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn records_are_not_writable() {
        let mut c = column("Tuple(UInt8)");
        let rec = Datum::Record(RecordValue {
            fields: vec![RecordField { name: None, cell: Cell::value(Datum::Int2(1), ExternalType::Int2) }],
        });
        assert!(matches!(write(&mut c, rec), Err(CodecError::TypeMismatch { .. })));
    }

    proptest! {
        #[test]
        fn uint64_round_trip_below_signed_max(v in 0i64..=i64::MAX) {
            let mut c = column("UInt64");
            write(&mut c, Datum::Int8(v)).unwrap();
            prop_assert_eq!(read_cell(&c, 0).unwrap().datum, Some(Datum::Int8(v)));
        }

        #[test]
        fn uint16_round_trips_as_int4(v in 0i32..=i32::from(u16::MAX)) {
            let mut c = column("UInt16");
            write(&mut c, Datum::Int4(v)).unwrap();
            prop_assert_eq!(read_cell(&c, 0).unwrap().datum, Some(Datum::Int4(v)));
        }

        #[test]
        fn datetime64_round_trips_at_micro_precision(us in -10_000_000_000_000i64..10_000_000_000_000) {
            let mut c = column("DateTime64(6)");
            write(&mut c, Datum::Timestamp(us)).unwrap();
            let cell = read_cell(&c, 0).unwrap();
            // Raw zero is the implicit-null sentinel.
            if us == -EPOCH_BIAS_DAYS * SECS_PER_DAY * USECS_PER_SEC {
                prop_assert!(cell.is_null());
            } else {
                prop_assert_eq!(cell.datum, Some(Datum::Timestamp(us)));
            }
        }
    }
}
