pub mod column;
pub mod error;
pub mod external;
pub mod mapping;
pub mod settings;
pub mod transport;
pub mod types;
pub mod value;

pub use column::{Block, Column, ColumnData};
pub use error::{CodecError, CodecResult, TransportError, TransportErrorKind};
pub use external::ExternalType;
pub use mapping::{ColumnDescriptor, map_type};
pub use settings::{Query, QuerySettings, SettingValue};
pub use transport::{BatchStream, Transport, VecBatchStream};
pub use types::{ColumnType, MAX_DATETIME64_PRECISION, TupleField};
pub use value::{ArrayValue, Cell, Datum, RecordField, RecordValue};
