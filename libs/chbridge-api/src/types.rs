use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// Finest `DateTime64` resolution the store supports (nanoseconds).
pub const MAX_DATETIME64_PRECISION: u8 = 9;

// ════════════════════════════════════════════════════════════════
//  Column Type
// ════════════════════════════════════════════════════════════════

/// Wire-level type of one column of the analytical store.
///
/// Displayed and parsed in the store's own syntax:
/// `Nullable(Array(UInt16))`, `Enum8('a' = 1, 'b' = 2)`, `DateTime64(3)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    /// Fixed byte width, NUL padded.
    FixedString(usize),
    /// Declared `(name, code)` pairs.
    Enum8(Vec<(std::string::String, i8)>),
    Enum16(Vec<(std::string::String, i16)>),
    /// Days since 1970-01-01, `UInt16`.
    Date,
    /// Seconds since 1970-01-01, `UInt32`.
    DateTime,
    /// Ticks of `10^-precision` seconds since 1970-01-01, `Int64`.
    DateTime64(u8),
    Uuid,
    IPv4,
    IPv6,
    /// Dictionary-encoded values of the nested type.
    LowCardinality(Box<ColumnType>),
    Array(Box<ColumnType>),
    Tuple(Vec<TupleField>),
    Nullable(Box<ColumnType>),
    /// A wire type this codec does not model (`Decimal(10, 2)`, `Map(...)`).
    /// Carries the full type name.
    Unknown(std::string::String),
}

/// One member of a `Tuple`. Unnamed members have `name == None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleField {
    pub name: Option<std::string::String>,
    pub ty: ColumnType,
}

impl TupleField {
    pub fn new(name: impl Into<std::string::String>, ty: ColumnType) -> Self {
        Self { name: Some(name.into()), ty }
    }

    pub fn unnamed(ty: ColumnType) -> Self {
        Self { name: None, ty }
    }
}

impl ColumnType {
    pub fn nullable(inner: ColumnType) -> Self {
        ColumnType::Nullable(Box::new(inner))
    }

    pub fn array(inner: ColumnType) -> Self {
        ColumnType::Array(Box::new(inner))
    }

    pub fn low_cardinality(inner: ColumnType) -> Self {
        ColumnType::LowCardinality(Box::new(inner))
    }

    /// Whether a null can be stored directly in a column of this type.
    pub fn is_nullable(&self) -> bool {
        match self {
            ColumnType::Nullable(_) => true,
            ColumnType::LowCardinality(inner) => matches!(**inner, ColumnType::Nullable(_)),
            _ => false,
        }
    }

    /// Name of the declared enum code, if any.
    pub fn enum_name(&self, code: i16) -> Option<&str> {
        match self {
            ColumnType::Enum8(items) => items
                .iter()
                .find(|(_, c)| i16::from(*c) == code)
                .map(|(n, _)| n.as_str()),
            ColumnType::Enum16(items) => items
                .iter()
                .find(|(_, c)| *c == code)
                .map(|(n, _)| n.as_str()),
            _ => None,
        }
    }

    /// Code of the declared enum name, if any.
    pub fn enum_code(&self, name: &str) -> Option<i16> {
        match self {
            ColumnType::Enum8(items) => items
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, c)| i16::from(*c)),
            ColumnType::Enum16(items) => items.iter().find(|(n, _)| n == name).map(|(_, c)| *c),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int8 => f.write_str("Int8"),
            ColumnType::Int16 => f.write_str("Int16"),
            ColumnType::Int32 => f.write_str("Int32"),
            ColumnType::Int64 => f.write_str("Int64"),
            ColumnType::UInt8 => f.write_str("UInt8"),
            ColumnType::UInt16 => f.write_str("UInt16"),
            ColumnType::UInt32 => f.write_str("UInt32"),
            ColumnType::UInt64 => f.write_str("UInt64"),
            ColumnType::Float32 => f.write_str("Float32"),
            ColumnType::Float64 => f.write_str("Float64"),
            ColumnType::String => f.write_str("String"),
            ColumnType::FixedString(n) => write!(f, "FixedString({n})"),
            ColumnType::Enum8(items) => {
                f.write_str("Enum8(")?;
                write_enum_items(f, items.iter().map(|(n, c)| (n.as_str(), i16::from(*c))))?;
                f.write_str(")")
            }
            ColumnType::Enum16(items) => {
                f.write_str("Enum16(")?;
                write_enum_items(f, items.iter().map(|(n, c)| (n.as_str(), *c)))?;
                f.write_str(")")
            }
            ColumnType::Date => f.write_str("Date"),
            ColumnType::DateTime => f.write_str("DateTime"),
            ColumnType::DateTime64(p) => write!(f, "DateTime64({p})"),
            ColumnType::Uuid => f.write_str("UUID"),
            ColumnType::IPv4 => f.write_str("IPv4"),
            ColumnType::IPv6 => f.write_str("IPv6"),
            ColumnType::LowCardinality(inner) => write!(f, "LowCardinality({inner})"),
            ColumnType::Array(inner) => write!(f, "Array({inner})"),
            ColumnType::Nullable(inner) => write!(f, "Nullable({inner})"),
            ColumnType::Tuple(fields) => {
                f.write_str("Tuple(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match &field.name {
                        Some(name) => write!(f, "{name} {}", field.ty)?,
                        None => write!(f, "{}", field.ty)?,
                    }
                }
                f.write_str(")")
            }
            ColumnType::Unknown(name) => f.write_str(name),
        }
    }
}

fn write_enum_items<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = (&'a str, i16)>,
) -> fmt::Result {
    for (i, (name, code)) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str("'")?;
        for ch in name.chars() {
            if ch == '\'' || ch == '\\' {
                f.write_str("\\")?;
            }
            write!(f, "{ch}")?;
        }
        write!(f, "' = {code}")?;
    }
    Ok(())
}

impl FromStr for ColumnType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = TypeParser { src: s, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(CodecError::invalid(format!(
                "trailing characters in type name '{s}' at offset {}",
                parser.pos
            )));
        }
        Ok(ty)
    }
}

impl Serialize for ColumnType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = std::string::String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

// ════════════════════════════════════════════════════════════════
//  Type name parser
// ════════════════════════════════════════════════════════════════

struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: u8) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: u8) -> CodecResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c as char)))
        }
    }

    fn error(&self, what: &str) -> CodecError {
        CodecError::invalid(format!("{what} at offset {} in type name '{}'", self.pos, self.src))
    }

    fn ident(&mut self) -> CodecResult<&'a str> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.pos += 1,
            _ => return Err(self.error("expected identifier")),
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.pos += 1;
        }
        Ok(&self.src[start..self.pos])
    }

    fn integer(&mut self) -> CodecResult<i64> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.src[start..self.pos]
            .parse()
            .map_err(|_| self.error("expected integer"))
    }

    /// Single-quoted literal with backslash escapes.
    fn quoted(&mut self) -> CodecResult<std::string::String> {
        self.expect(b'\'')?;
        let mut out = std::string::String::new();
        let mut chars = self.src[self.pos..].char_indices();
        while let Some((i, ch)) = chars.next() {
            match ch {
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                '\'' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                _ => out.push(ch),
            }
        }
        Err(self.error("unterminated quoted string"))
    }

    fn parse_type(&mut self) -> CodecResult<ColumnType> {
        self.skip_ws();
        let start = self.pos;
        let name = self.ident()?;
        let ty = match name {
            "Int8" => ColumnType::Int8,
            "Int16" => ColumnType::Int16,
            "Int32" => ColumnType::Int32,
            "Int64" => ColumnType::Int64,
            "UInt8" => ColumnType::UInt8,
            "UInt16" => ColumnType::UInt16,
            "UInt32" => ColumnType::UInt32,
            "UInt64" => ColumnType::UInt64,
            "Float32" => ColumnType::Float32,
            "Float64" => ColumnType::Float64,
            "String" => ColumnType::String,
            "Date" => ColumnType::Date,
            "UUID" => ColumnType::Uuid,
            "IPv4" => ColumnType::IPv4,
            "IPv6" => ColumnType::IPv6,
            "DateTime" => {
                // DateTime('Europe/Berlin'): time zone only affects rendering on the server.
                if self.eat(b'(') {
                    self.quoted()?;
                    self.expect(b')')?;
                }
                ColumnType::DateTime
            }
            "DateTime64" => {
                self.expect(b'(')?;
                let precision = self.integer()?;
                if !(0..=i64::from(MAX_DATETIME64_PRECISION)).contains(&precision) {
                    return Err(self.error("DateTime64 precision must be within 0..=9"));
                }
                if self.eat(b',') {
                    self.quoted()?;
                }
                self.expect(b')')?;
                ColumnType::DateTime64(precision as u8)
            }
            "FixedString" => {
                self.expect(b'(')?;
                let width = self.integer()?;
                if width <= 0 {
                    return Err(self.error("FixedString width must be positive"));
                }
                self.expect(b')')?;
                ColumnType::FixedString(width as usize)
            }
            "Enum8" => {
                let items = self.enum_items(i64::from(i8::MIN), i64::from(i8::MAX))?;
                ColumnType::Enum8(items.into_iter().map(|(n, c)| (n, c as i8)).collect())
            }
            "Enum16" => {
                let items = self.enum_items(i64::from(i16::MIN), i64::from(i16::MAX))?;
                ColumnType::Enum16(items.into_iter().map(|(n, c)| (n, c as i16)).collect())
            }
            "Nullable" => ColumnType::Nullable(Box::new(self.wrapped()?)),
            "Array" => ColumnType::Array(Box::new(self.wrapped()?)),
            "LowCardinality" => ColumnType::LowCardinality(Box::new(self.wrapped()?)),
            "Tuple" => {
                self.expect(b'(')?;
                let mut fields = Vec::new();
                if !self.eat(b')') {
                    loop {
                        fields.push(self.tuple_field()?);
                        if self.eat(b')') {
                            break;
                        }
                        self.expect(b',')?;
                    }
                }
                ColumnType::Tuple(fields)
            }
            _ => {
                self.skip_ws();
                if self.peek() == Some(b'(') {
                    self.skip_balanced()?;
                } else {
                    self.pos = start + name.len();
                }
                ColumnType::Unknown(self.src[start..self.pos].trim().to_string())
            }
        };
        Ok(ty)
    }

    fn wrapped(&mut self) -> CodecResult<ColumnType> {
        self.expect(b'(')?;
        let inner = self.parse_type()?;
        self.expect(b')')?;
        Ok(inner)
    }

    fn enum_items(&mut self, min: i64, max: i64) -> CodecResult<Vec<(std::string::String, i64)>> {
        self.expect(b'(')?;
        let mut items = Vec::new();
        loop {
            let name = self.quoted()?;
            self.expect(b'=')?;
            let code = self.integer()?;
            if code < min || code > max {
                return Err(self.error(&format!("enum code {code} out of range")));
            }
            items.push((name, code));
            if self.eat(b')') {
                return Ok(items);
            }
            self.expect(b',')?;
        }
    }

    /// `name Type` or just `Type`.
    fn tuple_field(&mut self) -> CodecResult<TupleField> {
        self.skip_ws();
        let start = self.pos;
        let first = self.ident()?;
        let after_ident = self.pos;
        self.skip_ws();
        let followed_by_type = self.pos > after_ident
            && self
                .peek()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == b'_');
        if followed_by_type {
            let ty = self.parse_type()?;
            Ok(TupleField::new(first, ty))
        } else {
            self.pos = start;
            Ok(TupleField::unnamed(self.parse_type()?))
        }
    }

    /// Consume a parenthesized argument list of a type we do not model.
    fn skip_balanced(&mut self) -> CodecResult<()> {
        let mut depth = 0usize;
        let mut in_quote = false;
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            let c = bytes[self.pos];
            self.pos += 1;
            if in_quote {
                match c {
                    b'\\' => self.pos += 1,
                    b'\'' => in_quote = false,
                    _ => {}
                }
                continue;
            }
            match c {
                b'\'' => in_quote = true,
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses"))
    }
}
