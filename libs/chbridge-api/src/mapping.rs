use crate::error::{CodecError, CodecResult};
use crate::external::ExternalType;
use crate::types::ColumnType;

/// External type a wire column is read as.
///
/// Nullability is not part of the result; see [`ColumnDescriptor::nullable`].
pub fn map_type(ty: &ColumnType) -> CodecResult<ExternalType> {
    Ok(match ty {
        ColumnType::Int8 | ColumnType::Int16 | ColumnType::UInt8 => ExternalType::Int2,
        ColumnType::Int32 | ColumnType::UInt16 => ExternalType::Int4,
        ColumnType::Int64 | ColumnType::UInt32 | ColumnType::UInt64 => ExternalType::Int8,
        ColumnType::Float32 => ExternalType::Float4,
        ColumnType::Float64 => ExternalType::Float8,
        ColumnType::String
        | ColumnType::FixedString(_)
        | ColumnType::Enum8(_)
        | ColumnType::Enum16(_) => ExternalType::Text,
        ColumnType::Date => ExternalType::Date,
        ColumnType::DateTime | ColumnType::DateTime64(_) => ExternalType::Timestamp,
        ColumnType::Uuid => ExternalType::Uuid,
        ColumnType::IPv4 | ColumnType::IPv6 => ExternalType::Inet,
        ColumnType::Nullable(inner) | ColumnType::LowCardinality(inner) => map_type(inner)?,
        ColumnType::Array(inner) => ExternalType::array_of(map_type(inner)?)
            .ok_or_else(|| CodecError::UnsupportedType(ty.to_string()))?,
        ColumnType::Tuple(_) => ExternalType::Record,
        ColumnType::Unknown(name) => return Err(CodecError::UnsupportedType(name.clone())),
    })
}

/// Planner-facing description of one result or target column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub external_type: ExternalType,
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn describe(name: impl Into<String>, column_type: ColumnType) -> CodecResult<Self> {
        let external_type = map_type(&column_type)?;
        Ok(Self {
            name: name.into(),
            nullable: column_type.is_nullable(),
            column_type,
            external_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(s: &str) -> ColumnType {
        s.parse().unwrap()
    }

    #[test]
    fn integer_widths() {
        assert_eq!(map_type(&ColumnType::UInt8).unwrap(), ExternalType::Int2);
        assert_eq!(map_type(&ColumnType::UInt16).unwrap(), ExternalType::Int4);
        assert_eq!(map_type(&ColumnType::UInt32).unwrap(), ExternalType::Int8);
        assert_eq!(map_type(&ColumnType::UInt64).unwrap(), ExternalType::Int8);
    }

    #[test]
    fn wrappers_are_transparent() {
        assert_eq!(map_type(&parse("Nullable(DateTime64(3))")).unwrap(), ExternalType::Timestamp);
        assert_eq!(map_type(&parse("LowCardinality(Nullable(String))")).unwrap(), ExternalType::Text);
        assert_eq!(
            map_type(&parse("Array(Nullable(IPv6))")).unwrap().name(),
            "inet[]"
        );
        assert_eq!(map_type(&parse("Tuple(UInt8, String)")).unwrap(), ExternalType::Record);
    }

    #[test]
    fn unmappable_types_name_themselves() {
        let err = map_type(&parse("Array(Array(UInt8))")).unwrap_err();
        assert_eq!(err, CodecError::UnsupportedType("Array(Array(UInt8))".into()));
        let err = map_type(&parse("Array(Tuple(UInt8))")).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedType(_)));
        let err = map_type(&parse("Decimal(18, 4)")).unwrap_err();
        assert_eq!(err, CodecError::UnsupportedType("Decimal(18, 4)".into()));
    }

    #[test]
    fn descriptor_reports_nullability() {
        let d = ColumnDescriptor::describe("x", parse("LowCardinality(Nullable(String))")).unwrap();
        assert!(d.nullable);
        assert_eq!(d.external_type.oid(), 25);
        let d = ColumnDescriptor::describe("y", ColumnType::Date).unwrap();
        assert!(!d.nullable);
    }

    fn scalar() -> impl Strategy<Value = ColumnType> {
        prop_oneof![
            Just(ColumnType::Int8),
            Just(ColumnType::UInt16),
            Just(ColumnType::UInt64),
            Just(ColumnType::Float32),
            Just(ColumnType::String),
            Just(ColumnType::Date),
            Just(ColumnType::Uuid),
            Just(ColumnType::IPv4),
            (1usize..32).prop_map(ColumnType::FixedString),
            (0u8..=9).prop_map(ColumnType::DateTime64),
        ]
    }

    fn column_type() -> impl Strategy<Value = ColumnType> {
        scalar().prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(ColumnType::nullable),
                inner.clone().prop_map(ColumnType::array),
                inner.clone().prop_map(ColumnType::low_cardinality),
                prop::collection::vec(inner, 1..3).prop_map(|tys| {
                    ColumnType::Tuple(tys.into_iter().map(crate::types::TupleField::unnamed).collect())
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn mapping_is_deterministic(ty in column_type()) {
            prop_assert_eq!(map_type(&ty), map_type(&ty.clone()));
        }

        #[test]
        fn display_parses_back(ty in column_type()) {
            let text = ty.to_string();
            prop_assert_eq!(text.parse::<ColumnType>().unwrap(), ty);
        }
    }
}
