use std::collections::HashMap;
use std::fmt;

use crate::error::{CodecError, CodecResult};
use crate::types::{ColumnType, MAX_DATETIME64_PRECISION};

// ════════════════════════════════════════════════════════════════
//  Column storage
// ════════════════════════════════════════════════════════════════

/// Typed storage behind a [`Column`]. The variant always agrees with the
/// column's [`ColumnType`]; [`Column::from_data`] enforces it.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    /// Raw bytes, not necessarily UTF-8.
    String(Vec<Vec<u8>>),
    /// Flat buffer, `width` bytes per row (width comes from the type).
    FixedString(Vec<u8>),
    Enum8(Vec<i8>),
    Enum16(Vec<i16>),
    Date(Vec<u16>),
    DateTime(Vec<u32>),
    DateTime64(Vec<i64>),
    /// Two host-order halves per value, as sent on the wire.
    Uuid(Vec<(u64, u64)>),
    /// `a.b.c.d` packed as `a << 24 | b << 16 | c << 8 | d`.
    IPv4(Vec<u32>),
    /// Network byte order.
    IPv6(Vec<[u8; 16]>),
    Nullable {
        nulls: Vec<bool>,
        nested: Box<Column>,
    },
    /// `offsets[i]` is the end (exclusive) of row `i` in `items`.
    Array {
        offsets: Vec<u64>,
        items: Box<Column>,
    },
    Tuple(Vec<Column>),
    LowCardinality {
        dictionary: Box<Column>,
        keys: Vec<u32>,
    },
}

/// One column of a block: wire type plus its values.
#[derive(Clone)]
pub struct Column {
    ty: ColumnType,
    data: ColumnData,
    /// Entry lookup for columns used as a dictionary; see [`Column::intern`].
    index: EntryIndex,
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.data == other.data
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("ty", &self.ty)
            .field("data", &self.data)
            .finish()
    }
}

/// Hash of dictionary entries to their keys, filled lazily for string
/// dictionaries. `None` is the null entry.
#[derive(Clone, Default)]
struct EntryIndex {
    keys: HashMap<Option<Vec<u8>>, u32>,
    indexed: usize,
}

impl Column {
    /// Empty column of the given type.
    pub fn new(ty: ColumnType) -> CodecResult<Self> {
        let data = match &ty {
            ColumnType::Int8 => ColumnData::Int8(Vec::new()),
            ColumnType::Int16 => ColumnData::Int16(Vec::new()),
            ColumnType::Int32 => ColumnData::Int32(Vec::new()),
            ColumnType::Int64 => ColumnData::Int64(Vec::new()),
            ColumnType::UInt8 => ColumnData::UInt8(Vec::new()),
            ColumnType::UInt16 => ColumnData::UInt16(Vec::new()),
            ColumnType::UInt32 => ColumnData::UInt32(Vec::new()),
            ColumnType::UInt64 => ColumnData::UInt64(Vec::new()),
            ColumnType::Float32 => ColumnData::Float32(Vec::new()),
            ColumnType::Float64 => ColumnData::Float64(Vec::new()),
            ColumnType::String => ColumnData::String(Vec::new()),
            ColumnType::FixedString(0) => {
                return Err(CodecError::invalid("FixedString width must be positive"));
            }
            ColumnType::FixedString(_) => ColumnData::FixedString(Vec::new()),
            ColumnType::Enum8(_) => ColumnData::Enum8(Vec::new()),
            ColumnType::Enum16(_) => ColumnData::Enum16(Vec::new()),
            ColumnType::Date => ColumnData::Date(Vec::new()),
            ColumnType::DateTime => ColumnData::DateTime(Vec::new()),
            ColumnType::DateTime64(p) if *p > MAX_DATETIME64_PRECISION => {
                return Err(CodecError::invalid(format!(
                    "DateTime64 precision {p} exceeds {MAX_DATETIME64_PRECISION}"
                )));
            }
            ColumnType::DateTime64(_) => ColumnData::DateTime64(Vec::new()),
            ColumnType::Uuid => ColumnData::Uuid(Vec::new()),
            ColumnType::IPv4 => ColumnData::IPv4(Vec::new()),
            ColumnType::IPv6 => ColumnData::IPv6(Vec::new()),
            ColumnType::Nullable(inner) => ColumnData::Nullable {
                nulls: Vec::new(),
                nested: Box::new(Column::new((**inner).clone())?),
            },
            ColumnType::Array(inner) => ColumnData::Array {
                offsets: Vec::new(),
                items: Box::new(Column::new((**inner).clone())?),
            },
            ColumnType::Tuple(fields) => ColumnData::Tuple(
                fields
                    .iter()
                    .map(|f| Column::new(f.ty.clone()))
                    .collect::<CodecResult<_>>()?,
            ),
            ColumnType::LowCardinality(inner) => ColumnData::LowCardinality {
                dictionary: Box::new(Column::new((**inner).clone())?),
                keys: Vec::new(),
            },
            ColumnType::Unknown(name) => return Err(CodecError::UnsupportedType(name.clone())),
        };
        Ok(Self { ty, data, index: EntryIndex::default() })
    }

    /// Column from already decoded storage, validated against the type.
    pub fn from_data(ty: ColumnType, data: ColumnData) -> CodecResult<Self> {
        let column = Self { ty, data, index: EntryIndex::default() };
        column.validate()?;
        Ok(column)
    }

    pub fn column_type(&self) -> &ColumnType {
        &self.ty
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Raw access for encoders. Callers must keep the storage consistent;
    /// [`Column::validate`] checks it.
    pub fn data_mut(&mut self) -> &mut ColumnData {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Int8(v) | ColumnData::Enum8(v) => v.len(),
            ColumnData::Int16(v) | ColumnData::Enum16(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) | ColumnData::DateTime64(v) => v.len(),
            ColumnData::UInt8(v) => v.len(),
            ColumnData::UInt16(v) | ColumnData::Date(v) => v.len(),
            ColumnData::UInt32(v) | ColumnData::DateTime(v) | ColumnData::IPv4(v) => v.len(),
            ColumnData::UInt64(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::FixedString(bytes) => match self.ty {
                ColumnType::FixedString(width) if width > 0 => bytes.len() / width,
                _ => 0,
            },
            ColumnData::Uuid(v) => v.len(),
            ColumnData::IPv6(v) => v.len(),
            ColumnData::Nullable { nulls, .. } => nulls.len(),
            ColumnData::Array { offsets, .. } => offsets.len(),
            ColumnData::Tuple(members) => members.first().map_or(0, Column::len),
            ColumnData::LowCardinality { keys, .. } => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all rows, keeping the type.
    pub fn clear(&mut self) {
        self.index = EntryIndex::default();
        match &mut self.data {
            ColumnData::Int8(v) | ColumnData::Enum8(v) => v.clear(),
            ColumnData::Int16(v) | ColumnData::Enum16(v) => v.clear(),
            ColumnData::Int32(v) => v.clear(),
            ColumnData::Int64(v) | ColumnData::DateTime64(v) => v.clear(),
            ColumnData::UInt8(v) | ColumnData::FixedString(v) => v.clear(),
            ColumnData::UInt16(v) | ColumnData::Date(v) => v.clear(),
            ColumnData::UInt32(v) | ColumnData::DateTime(v) | ColumnData::IPv4(v) => v.clear(),
            ColumnData::UInt64(v) => v.clear(),
            ColumnData::Float32(v) => v.clear(),
            ColumnData::Float64(v) => v.clear(),
            ColumnData::String(v) => v.clear(),
            ColumnData::Uuid(v) => v.clear(),
            ColumnData::IPv6(v) => v.clear(),
            ColumnData::Nullable { nulls, nested } => {
                nulls.clear();
                nested.clear();
            }
            ColumnData::Array { offsets, items } => {
                offsets.clear();
                items.clear();
            }
            ColumnData::Tuple(members) => members.iter_mut().for_each(Column::clear),
            ColumnData::LowCardinality { dictionary, keys } => {
                dictionary.clear();
                keys.clear();
            }
        }
    }

    /// Append the type's zero value. Used as the placeholder behind a null
    /// flag, where the nested column still needs one row.
    pub fn push_default(&mut self) -> CodecResult<()> {
        let width = match self.ty {
            ColumnType::FixedString(width) => width,
            _ => 0,
        };
        let first_enum_code = match &self.ty {
            ColumnType::Enum8(items) => items.first().map(|(_, c)| i16::from(*c)),
            ColumnType::Enum16(items) => items.first().map(|(_, c)| *c),
            _ => None,
        };
        match &mut self.data {
            ColumnData::Int8(v) => v.push(0),
            ColumnData::Int16(v) => v.push(0),
            ColumnData::Int32(v) => v.push(0),
            ColumnData::Int64(v) | ColumnData::DateTime64(v) => v.push(0),
            ColumnData::UInt8(v) => v.push(0),
            ColumnData::UInt16(v) | ColumnData::Date(v) => v.push(0),
            ColumnData::UInt32(v) | ColumnData::DateTime(v) | ColumnData::IPv4(v) => v.push(0),
            ColumnData::UInt64(v) => v.push(0),
            ColumnData::Float32(v) => v.push(0.0),
            ColumnData::Float64(v) => v.push(0.0),
            ColumnData::String(v) => v.push(Vec::new()),
            ColumnData::FixedString(v) => v.resize(v.len() + width, 0),
            ColumnData::Enum8(v) => {
                let code = first_enum_code.ok_or_else(|| CodecError::invalid("enum without values"))?;
                v.push(code as i8);
            }
            ColumnData::Enum16(v) => {
                let code = first_enum_code.ok_or_else(|| CodecError::invalid("enum without values"))?;
                v.push(code);
            }
            ColumnData::Uuid(v) => v.push((0, 0)),
            ColumnData::IPv6(v) => v.push([0; 16]),
            ColumnData::Nullable { nulls, nested } => {
                nested.push_default()?;
                nulls.push(true);
            }
            ColumnData::Array { offsets, .. } => {
                let end = offsets.last().copied().unwrap_or(0);
                offsets.push(end);
            }
            ColumnData::Tuple(members) => {
                for member in members.iter_mut() {
                    member.push_default()?;
                }
            }
            ColumnData::LowCardinality { dictionary, keys } => {
                // Entry 0 holds the default value.
                if dictionary.is_empty() {
                    dictionary.push_default()?;
                }
                keys.push(0);
            }
        }
        Ok(())
    }

    /// Append every row of `other`, which must have the same type.
    pub fn extend_from(&mut self, other: &Column) -> CodecResult<()> {
        if self.ty != other.ty {
            return Err(CodecError::mismatch(&other.ty, &self.ty));
        }
        match (&mut self.data, &other.data) {
            (ColumnData::Int8(a), ColumnData::Int8(b))
            | (ColumnData::Enum8(a), ColumnData::Enum8(b)) => a.extend_from_slice(b),
            (ColumnData::Int16(a), ColumnData::Int16(b))
            | (ColumnData::Enum16(a), ColumnData::Enum16(b)) => a.extend_from_slice(b),
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.extend_from_slice(b),
            (ColumnData::Int64(a), ColumnData::Int64(b))
            | (ColumnData::DateTime64(a), ColumnData::DateTime64(b)) => a.extend_from_slice(b),
            (ColumnData::UInt8(a), ColumnData::UInt8(b))
            | (ColumnData::FixedString(a), ColumnData::FixedString(b)) => a.extend_from_slice(b),
            (ColumnData::UInt16(a), ColumnData::UInt16(b))
            | (ColumnData::Date(a), ColumnData::Date(b)) => a.extend_from_slice(b),
            (ColumnData::UInt32(a), ColumnData::UInt32(b))
            | (ColumnData::DateTime(a), ColumnData::DateTime(b))
            | (ColumnData::IPv4(a), ColumnData::IPv4(b)) => a.extend_from_slice(b),
            (ColumnData::UInt64(a), ColumnData::UInt64(b)) => a.extend_from_slice(b),
            (ColumnData::Float32(a), ColumnData::Float32(b)) => a.extend_from_slice(b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.extend_from_slice(b),
            (ColumnData::String(a), ColumnData::String(b)) => a.extend_from_slice(b),
            (ColumnData::Uuid(a), ColumnData::Uuid(b)) => a.extend_from_slice(b),
            (ColumnData::IPv6(a), ColumnData::IPv6(b)) => a.extend_from_slice(b),
            (
                ColumnData::Nullable { nulls, nested },
                ColumnData::Nullable { nulls: other_nulls, nested: other_nested },
            ) => {
                nested.extend_from(other_nested)?;
                nulls.extend_from_slice(other_nulls);
            }
            (
                ColumnData::Array { offsets, items },
                ColumnData::Array { offsets: other_offsets, items: other_items },
            ) => {
                let base = offsets.last().copied().unwrap_or(0);
                items.extend_from(other_items)?;
                offsets.extend(other_offsets.iter().map(|end| end + base));
            }
            (ColumnData::Tuple(members), ColumnData::Tuple(other_members)) => {
                for (member, other_member) in members.iter_mut().zip(other_members) {
                    member.extend_from(other_member)?;
                }
            }
            (
                ColumnData::LowCardinality { dictionary, keys },
                ColumnData::LowCardinality { dictionary: other_dict, keys: other_keys },
            ) => {
                let base = dictionary.len() as u32;
                dictionary.extend_from(other_dict)?;
                keys.extend(other_keys.iter().map(|k| k + base));
            }
            _ => return Err(CodecError::mismatch(&other.ty, &self.ty)),
        }
        Ok(())
    }

    /// Whether row `row` of `self` holds the same value as `other_row` of
    /// `other`. Floats compare bitwise.
    pub fn row_eq(&self, row: usize, other: &Column, other_row: usize) -> bool {
        if self.ty != other.ty || row >= self.len() || other_row >= other.len() {
            return false;
        }
        let (i, j) = (row, other_row);
        match (&self.data, &other.data) {
            (ColumnData::Int8(a), ColumnData::Int8(b))
            | (ColumnData::Enum8(a), ColumnData::Enum8(b)) => a[i] == b[j],
            (ColumnData::Int16(a), ColumnData::Int16(b))
            | (ColumnData::Enum16(a), ColumnData::Enum16(b)) => a[i] == b[j],
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a[i] == b[j],
            (ColumnData::Int64(a), ColumnData::Int64(b))
            | (ColumnData::DateTime64(a), ColumnData::DateTime64(b)) => a[i] == b[j],
            (ColumnData::UInt8(a), ColumnData::UInt8(b)) => a[i] == b[j],
            (ColumnData::UInt16(a), ColumnData::UInt16(b))
            | (ColumnData::Date(a), ColumnData::Date(b)) => a[i] == b[j],
            (ColumnData::UInt32(a), ColumnData::UInt32(b))
            | (ColumnData::DateTime(a), ColumnData::DateTime(b))
            | (ColumnData::IPv4(a), ColumnData::IPv4(b)) => a[i] == b[j],
            (ColumnData::UInt64(a), ColumnData::UInt64(b)) => a[i] == b[j],
            (ColumnData::Float32(a), ColumnData::Float32(b)) => a[i].to_bits() == b[j].to_bits(),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a[i].to_bits() == b[j].to_bits(),
            (ColumnData::String(a), ColumnData::String(b)) => a[i] == b[j],
            (ColumnData::FixedString(a), ColumnData::FixedString(b)) => {
                let ColumnType::FixedString(width) = self.ty else {
                    return false;
                };
                a[i * width..(i + 1) * width] == b[j * width..(j + 1) * width]
            }
            (ColumnData::Uuid(a), ColumnData::Uuid(b)) => a[i] == b[j],
            (ColumnData::IPv6(a), ColumnData::IPv6(b)) => a[i] == b[j],
            (
                ColumnData::Nullable { nulls: na, nested: a },
                ColumnData::Nullable { nulls: nb, nested: b },
            ) => match (na[i], nb[j]) {
                (true, true) => true,
                (false, false) => a.row_eq(i, b, j),
                _ => false,
            },
            (
                ColumnData::Array { offsets: oa, items: a },
                ColumnData::Array { offsets: ob, items: b },
            ) => {
                let range = |offsets: &[u64], row: usize| {
                    let start = if row == 0 { 0 } else { offsets[row - 1] };
                    start as usize..offsets[row] as usize
                };
                let (ra, rb) = (range(oa.as_slice(), i), range(ob.as_slice(), j));
                ra.len() == rb.len() && ra.zip(rb).all(|(x, y)| a.row_eq(x, b, y))
            }
            (ColumnData::Tuple(a), ColumnData::Tuple(b)) => {
                a.iter().zip(b).all(|(x, y)| x.row_eq(i, y, j))
            }
            (
                ColumnData::LowCardinality { dictionary: da, keys: ka },
                ColumnData::LowCardinality { dictionary: db, keys: kb },
            ) => da.row_eq(ka[i] as usize, db, kb[j] as usize),
            _ => false,
        }
    }

    /// Key of the single row of `entry` in this column used as a dictionary,
    /// appending the entry when it is not present yet.
    ///
    /// String-like dictionaries are looked up through a hash index. Entries
    /// must only be appended between clears for the index to stay valid.
    pub fn intern(&mut self, entry: &Column) -> CodecResult<u32> {
        if self.ty != entry.ty {
            return Err(CodecError::mismatch(&entry.ty, &self.ty));
        }
        if entry.len() != 1 {
            return Err(CodecError::invalid(format!(
                "dictionary entry holds {} rows",
                entry.len()
            )));
        }
        let hashed = entry.entry_bytes(0).map(|b| b.map(<[u8]>::to_vec));
        let found = match &hashed {
            Some(bytes) => {
                self.sync_index();
                self.index.keys.get(bytes).copied()
            }
            None => (0..self.len())
                .find(|i| self.row_eq(*i, entry, 0))
                .and_then(|i| u32::try_from(i).ok()),
        };
        if let Some(key) = found {
            return Ok(key);
        }
        let key = u32::try_from(self.len())
            .map_err(|_| CodecError::overflow("dictionary key", self.len()))?;
        self.extend_from(entry)?;
        if let Some(bytes) = hashed {
            self.index.keys.insert(bytes, key);
            self.index.indexed = self.len();
        }
        Ok(key)
    }

    /// Hash the rows appended since the last lookup. A shrunken column was
    /// rebuilt behind the index's back, so it starts over.
    fn sync_index(&mut self) {
        let len = self.len();
        if len < self.index.indexed {
            self.index = EntryIndex::default();
        }
        let fresh: Vec<_> = (self.index.indexed..len)
            .filter_map(|row| {
                let bytes = self.entry_bytes(row)?.map(<[u8]>::to_vec);
                Some((bytes, u32::try_from(row).ok()?))
            })
            .collect();
        for (bytes, key) in fresh {
            self.index.keys.entry(bytes).or_insert(key);
        }
        self.index.indexed = len;
    }

    /// Hashable form of a string-like row: `Some(None)` for null, `None` for
    /// types that are compared row by row instead.
    fn entry_bytes(&self, row: usize) -> Option<Option<&[u8]>> {
        match (&self.ty, &self.data) {
            (ColumnType::String, ColumnData::String(v)) => v.get(row).map(|b| Some(b.as_slice())),
            (ColumnType::FixedString(width), ColumnData::FixedString(bytes)) => bytes
                .get(row * width..(row + 1) * width)
                .map(Some),
            (_, ColumnData::Nullable { nulls, nested }) => {
                if *nulls.get(row)? {
                    Some(None)
                } else {
                    nested.entry_bytes(row)
                }
            }
            _ => None,
        }
    }

    /// Check that the storage agrees with the type, recursively.
    pub fn validate(&self) -> CodecResult<()> {
        let mismatch = || {
            CodecError::invalid(format!(
                "column storage does not match type {}",
                self.ty
            ))
        };
        match (&self.ty, &self.data) {
            (ColumnType::Int8, ColumnData::Int8(_))
            | (ColumnType::Int16, ColumnData::Int16(_))
            | (ColumnType::Int32, ColumnData::Int32(_))
            | (ColumnType::Int64, ColumnData::Int64(_))
            | (ColumnType::UInt8, ColumnData::UInt8(_))
            | (ColumnType::UInt16, ColumnData::UInt16(_))
            | (ColumnType::UInt32, ColumnData::UInt32(_))
            | (ColumnType::UInt64, ColumnData::UInt64(_))
            | (ColumnType::Float32, ColumnData::Float32(_))
            | (ColumnType::Float64, ColumnData::Float64(_))
            | (ColumnType::String, ColumnData::String(_))
            | (ColumnType::Date, ColumnData::Date(_))
            | (ColumnType::DateTime, ColumnData::DateTime(_))
            | (ColumnType::Uuid, ColumnData::Uuid(_))
            | (ColumnType::IPv4, ColumnData::IPv4(_))
            | (ColumnType::IPv6, ColumnData::IPv6(_)) => Ok(()),
            (ColumnType::DateTime64(p), ColumnData::DateTime64(_)) => {
                if *p > MAX_DATETIME64_PRECISION {
                    return Err(CodecError::invalid(format!(
                        "DateTime64 precision {p} exceeds {MAX_DATETIME64_PRECISION}"
                    )));
                }
                Ok(())
            }
            (ColumnType::FixedString(width), ColumnData::FixedString(bytes)) => {
                if *width == 0 || bytes.len() % width != 0 {
                    return Err(CodecError::invalid(format!(
                        "FixedString({width}) buffer of {} bytes",
                        bytes.len()
                    )));
                }
                Ok(())
            }
            (ColumnType::Enum8(_), ColumnData::Enum8(codes)) => {
                check_enum_codes(&self.ty, codes.iter().map(|c| i16::from(*c)))
            }
            (ColumnType::Enum16(_), ColumnData::Enum16(codes)) => {
                check_enum_codes(&self.ty, codes.iter().copied())
            }
            (ColumnType::Nullable(inner), ColumnData::Nullable { nulls, nested }) => {
                if nested.column_type() != &**inner {
                    return Err(mismatch());
                }
                if nulls.len() != nested.len() {
                    return Err(CodecError::invalid(format!(
                        "{} null flags for {} nested values",
                        nulls.len(),
                        nested.len()
                    )));
                }
                nested.validate()
            }
            (ColumnType::Array(inner), ColumnData::Array { offsets, items }) => {
                if items.column_type() != &**inner {
                    return Err(mismatch());
                }
                if offsets.windows(2).any(|w| w[0] > w[1]) {
                    return Err(CodecError::invalid("array offsets are not monotonic"));
                }
                let end = offsets.last().copied().unwrap_or(0);
                if end != items.len() as u64 {
                    return Err(CodecError::invalid(format!(
                        "array offsets end at {end} but {} items are present",
                        items.len()
                    )));
                }
                items.validate()
            }
            (ColumnType::Tuple(fields), ColumnData::Tuple(members)) => {
                if fields.len() != members.len() {
                    return Err(mismatch());
                }
                let rows = members.first().map_or(0, Column::len);
                for (field, member) in fields.iter().zip(members) {
                    if member.column_type() != &field.ty {
                        return Err(mismatch());
                    }
                    if member.len() != rows {
                        return Err(CodecError::invalid("tuple members differ in length"));
                    }
                    member.validate()?;
                }
                Ok(())
            }
            (ColumnType::LowCardinality(inner), ColumnData::LowCardinality { dictionary, keys }) => {
                if dictionary.column_type() != &**inner {
                    return Err(mismatch());
                }
                let size = dictionary.len();
                if let Some(key) = keys.iter().find(|k| **k as usize >= size) {
                    return Err(CodecError::invalid(format!(
                        "dictionary key {key} out of range for {size} entries"
                    )));
                }
                dictionary.validate()
            }
            (ColumnType::Unknown(name), _) => Err(CodecError::UnsupportedType(name.clone())),
            _ => Err(mismatch()),
        }
    }
}

fn check_enum_codes(ty: &ColumnType, mut codes: impl Iterator<Item = i16>) -> CodecResult<()> {
    match codes.find(|c| ty.enum_name(*c).is_none()) {
        Some(code) => Err(CodecError::invalid(format!("code {code} is not declared by {ty}"))),
        None => Ok(()),
    }
}

// ════════════════════════════════════════════════════════════════
//  Block
// ════════════════════════════════════════════════════════════════

/// A batch: ordered, named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(
        columns: impl IntoIterator<Item = (String, Column)>,
    ) -> CodecResult<Self> {
        let mut block = Self::new();
        for (name, column) in columns {
            block.push_column(name, column)?;
        }
        Ok(block)
    }

    /// Append a column; its length must match the columns already present.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> CodecResult<()> {
        let name = name.into();
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(CodecError::invalid(format!(
                    "column '{name}' has {} rows, block has {}",
                    column.len(),
                    first.len()
                )));
            }
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Rows in the block, taken from column 0.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Verify that every column has the same number of rows and return it.
    pub fn refresh_row_count(&self) -> CodecResult<usize> {
        let rows = self.row_count();
        for (name, column) in self.iter() {
            if column.len() != rows {
                return Err(CodecError::invalid(format!(
                    "column '{name}' has {} rows, expected {rows}",
                    column.len()
                )));
            }
        }
        Ok(rows)
    }

    /// Drop all rows, keeping the column set.
    pub fn clear(&mut self) {
        self.columns.iter_mut().for_each(Column::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TupleField;

    #[test]
    fn new_builds_nested_storage() {
        let ty: ColumnType = "Nullable(Array(LowCardinality(String)))".parse().unwrap();
        let column = Column::new(ty.clone()).unwrap();
        assert_eq!(column.column_type(), &ty);
        assert!(column.is_empty());
        assert!(column.validate().is_ok());
    }

    #[test]
    fn new_rejects_unknown_types() {
        let err = Column::new(ColumnType::Unknown("Decimal(9, 2)".into())).unwrap_err();
        assert_eq!(err, CodecError::UnsupportedType("Decimal(9, 2)".into()));
    }

    #[test]
    fn from_data_checks_shapes() {
        assert!(Column::from_data(ColumnType::UInt8, ColumnData::Int8(vec![1])).is_err());
        assert!(Column::from_data(ColumnType::FixedString(4), ColumnData::FixedString(vec![0; 6])).is_err());

        let nested = Column::from_data(ColumnType::Int32, ColumnData::Int32(vec![1, 2])).unwrap();
        let bad_nulls = ColumnData::Nullable { nulls: vec![false], nested: Box::new(nested) };
        assert!(Column::from_data(ColumnType::nullable(ColumnType::Int32), bad_nulls).is_err());

        let items = Column::from_data(ColumnType::UInt8, ColumnData::UInt8(vec![1, 2, 3])).unwrap();
        let bad_offsets = ColumnData::Array { offsets: vec![2, 1], items: Box::new(items) };
        assert!(Column::from_data(ColumnType::array(ColumnType::UInt8), bad_offsets).is_err());

        let enum_ty = ColumnType::Enum8(vec![("a".into(), 1)]);
        assert!(Column::from_data(enum_ty, ColumnData::Enum8(vec![1, 7])).is_err());
    }

    #[test]
    fn dictionary_keys_must_be_in_range() {
        let dict = Column::from_data(ColumnType::String, ColumnData::String(vec![b"x".to_vec()])).unwrap();
        let data = ColumnData::LowCardinality { dictionary: Box::new(dict), keys: vec![0, 1] };
        let err = Column::from_data(ColumnType::low_cardinality(ColumnType::String), data).unwrap_err();
        assert!(matches!(err, CodecError::InvalidData(_)));
    }

    #[test]
    fn push_default_keeps_nested_lengths_aligned() {
        let ty = ColumnType::Tuple(vec![
            TupleField::new("a", ColumnType::nullable(ColumnType::FixedString(3))),
            TupleField::new("b", ColumnType::array(ColumnType::UInt16)),
        ]);
        let mut column = Column::new(ty).unwrap();
        column.push_default().unwrap();
        column.push_default().unwrap();
        assert_eq!(column.len(), 2);
        assert!(column.validate().is_ok());
    }

    #[test]
    fn extend_shifts_offsets_and_keys() {
        let items = Column::from_data(ColumnType::UInt8, ColumnData::UInt8(vec![1, 2])).unwrap();
        let arr = Column::from_data(
            ColumnType::array(ColumnType::UInt8),
            ColumnData::Array { offsets: vec![2], items: Box::new(items) },
        )
        .unwrap();
        let mut target = arr.clone();
        target.extend_from(&arr).unwrap();
        assert_eq!(target.len(), 2);
        assert!(target.validate().is_ok());
        assert!(target.row_eq(0, &target, 1));

        let dict = Column::from_data(ColumnType::String, ColumnData::String(vec![b"a".to_vec()])).unwrap();
        let lc = Column::from_data(
            ColumnType::low_cardinality(ColumnType::String),
            ColumnData::LowCardinality { dictionary: Box::new(dict), keys: vec![0] },
        )
        .unwrap();
        let mut target = lc.clone();
        target.extend_from(&lc).unwrap();
        assert!(target.validate().is_ok());
        assert!(target.row_eq(0, &lc, 0));
        assert!(target.row_eq(1, &lc, 0));
    }

    #[test]
    fn extend_rejects_other_types() {
        let mut a = Column::new(ColumnType::Int32).unwrap();
        let b = Column::new(ColumnType::UInt32).unwrap();
        assert!(matches!(a.extend_from(&b), Err(CodecError::TypeMismatch { .. })));
    }

    #[test]
    fn row_eq_distinguishes_nulls() {
        let mut c = Column::new(ColumnType::nullable(ColumnType::String)).unwrap();
        c.push_default().unwrap();
        if let ColumnData::Nullable { nulls, nested } = c.data_mut() {
            if let ColumnData::String(v) = nested.data_mut() {
                v.push(Vec::new());
            }
            nulls.push(false);
        }
        assert!(c.validate().is_ok());
        assert!(c.row_eq(0, &c, 0));
        assert!(!c.row_eq(0, &c, 1));
    }

    fn text_entry(ty: &ColumnType, value: Option<&str>) -> Column {
        let data = match (ty, value) {
            (ColumnType::String, Some(v)) => ColumnData::String(vec![v.as_bytes().to_vec()]),
            (ColumnType::Nullable(_), v) => ColumnData::Nullable {
                nulls: vec![v.is_none()],
                nested: Box::new(text_entry(&ColumnType::String, Some(v.unwrap_or("")))),
            },
            _ => panic!("unsupported entry"),
        };
        Column::from_data(ty.clone(), data).unwrap()
    }

    #[test]
    fn intern_dedupes_values_and_nulls() {
        let ty = ColumnType::nullable(ColumnType::String);
        let mut dict = Column::new(ty.clone()).unwrap();
        let keys: Vec<u32> = [Some("a"), None, Some("b"), None, Some("a"), Some("")]
            .into_iter()
            .map(|v| dict.intern(&text_entry(&ty, v)).unwrap())
            .collect();
        assert_eq!(keys, vec![0, 1, 2, 1, 0, 3]);
        assert_eq!(dict.len(), 4);
    }

    #[test]
    fn intern_indexes_prebuilt_dictionary() {
        let dict_data = ColumnData::String(vec![b"x".to_vec(), b"y".to_vec()]);
        let mut dict = Column::from_data(ColumnType::String, dict_data).unwrap();
        assert_eq!(dict.intern(&text_entry(&ColumnType::String, Some("y"))).unwrap(), 1);
        assert_eq!(dict.intern(&text_entry(&ColumnType::String, Some("z"))).unwrap(), 2);

        dict.clear();
        assert_eq!(dict.intern(&text_entry(&ColumnType::String, Some("z"))).unwrap(), 0);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn intern_falls_back_to_row_comparison() {
        let mut dict = Column::new(ColumnType::UInt32).unwrap();
        let entry = |v| Column::from_data(ColumnType::UInt32, ColumnData::UInt32(vec![v])).unwrap();
        assert_eq!(dict.intern(&entry(7)).unwrap(), 0);
        assert_eq!(dict.intern(&entry(9)).unwrap(), 1);
        assert_eq!(dict.intern(&entry(7)).unwrap(), 0);
        assert!(dict.intern(&Column::new(ColumnType::String).unwrap()).is_err());
    }

    #[test]
    fn datetime64_precision_is_bounded() {
        assert!(Column::new(ColumnType::DateTime64(9)).is_ok());
        assert!(matches!(Column::new(ColumnType::DateTime64(10)), Err(CodecError::InvalidData(_))));
        let data = ColumnData::DateTime64(vec![1]);
        assert!(matches!(
            Column::from_data(ColumnType::DateTime64(30), data),
            Err(CodecError::InvalidData(_))
        ));
    }

    #[test]
    fn block_rejects_ragged_columns() {
        let a = Column::from_data(ColumnType::Int64, ColumnData::Int64(vec![1, 2])).unwrap();
        let b = Column::from_data(ColumnType::Int64, ColumnData::Int64(vec![1])).unwrap();
        let mut block = Block::new();
        block.push_column("a", a).unwrap();
        assert!(block.push_column("b", b).is_err());
        assert_eq!(block.row_count(), 2);
        assert_eq!(block.column_count(), 1);
    }

    #[test]
    fn clear_keeps_column_set() {
        let a = Column::from_data(ColumnType::String, ColumnData::String(vec![b"x".to_vec()])).unwrap();
        let mut block = Block::with_columns([("a".to_string(), a)]).unwrap();
        block.clear();
        assert_eq!(block.column_count(), 1);
        assert_eq!(block.row_count(), 0);
        assert_eq!(block.name(0), Some("a"));
    }
}
