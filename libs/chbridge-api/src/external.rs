use std::fmt;

/// Type identifier on the row-engine side.
///
/// Only the types the bridge ever produces or accepts are modeled. `Array`
/// wraps a scalar element; the engine has no array of arrays or array of
/// records, see [`ExternalType::array_of`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalType {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    Date,
    Timestamp,
    Uuid,
    Inet,
    /// Anonymous composite.
    Record,
    Array(Box<ExternalType>),
}

impl ExternalType {
    /// Array type for `element`, if the engine defines one.
    pub fn array_of(element: ExternalType) -> Option<Self> {
        match element {
            ExternalType::Array(_) | ExternalType::Record => None,
            scalar => Some(ExternalType::Array(Box::new(scalar))),
        }
    }

    /// Element type of an array type.
    pub fn element(&self) -> Option<&ExternalType> {
        match self {
            ExternalType::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Numeric type identifier.
    pub fn oid(&self) -> u32 {
        match self {
            ExternalType::Int2 => 21,
            ExternalType::Int4 => 23,
            ExternalType::Int8 => 20,
            ExternalType::Float4 => 700,
            ExternalType::Float8 => 701,
            ExternalType::Text => 25,
            ExternalType::Date => 1082,
            ExternalType::Timestamp => 1114,
            ExternalType::Uuid => 2950,
            ExternalType::Inet => 869,
            ExternalType::Record => 2249,
            ExternalType::Array(elem) => match **elem {
                ExternalType::Int2 => 1005,
                ExternalType::Int4 => 1007,
                ExternalType::Int8 => 1016,
                ExternalType::Float4 => 1021,
                ExternalType::Float8 => 1022,
                ExternalType::Text => 1009,
                ExternalType::Date => 1182,
                ExternalType::Timestamp => 1115,
                ExternalType::Uuid => 2951,
                ExternalType::Inet => 1041,
                // `array_of` never builds these.
                ExternalType::Record | ExternalType::Array(_) => 0,
            },
        }
    }

    /// Type name as the engine spells it.
    pub fn name(&self) -> String {
        match self {
            ExternalType::Array(elem) => format!("{}[]", elem.name()),
            scalar => scalar.scalar_name().to_string(),
        }
    }

    fn scalar_name(&self) -> &'static str {
        match self {
            ExternalType::Int2 => "int2",
            ExternalType::Int4 => "int4",
            ExternalType::Int8 => "int8",
            ExternalType::Float4 => "float4",
            ExternalType::Float8 => "float8",
            ExternalType::Text => "text",
            ExternalType::Date => "date",
            ExternalType::Timestamp => "timestamp",
            ExternalType::Uuid => "uuid",
            ExternalType::Inet => "inet",
            ExternalType::Record => "record",
            ExternalType::Array(_) => "anyarray",
        }
    }
}

impl fmt::Display for ExternalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalType::Array(elem) => write!(f, "{elem}[]"),
            scalar => f.write_str(scalar.scalar_name()),
        }
    }
}
