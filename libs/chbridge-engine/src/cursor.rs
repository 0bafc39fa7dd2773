use tokio_util::sync::CancellationToken;

use chbridge_api::{
    BatchStream, Block, Cell, CodecError, CodecResult, ColumnDescriptor, Query, Transport,
};
use chbridge_converter_ch_to_pg::read_row;

// ════════════════════════════════════════════════════════════════
//  Batch collection
// ════════════════════════════════════════════════════════════════

/// Every block of one select, or the error that stopped collecting them.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub blocks: Vec<Block>,
    /// Column count of the first block that had any columns.
    pub columns: usize,
    pub error: Option<CodecError>,
}

impl Response {
    pub fn failed(error: CodecError) -> Self {
        Self { error: Some(error), ..Self::default() }
    }
}

/// Drain `stream` into a [`Response`].
///
/// The token is checked once per arriving block. Blocks without columns are
/// dropped; every other block must have the column count of the first one.
pub fn collect_batches(stream: &mut dyn BatchStream, token: &CancellationToken) -> Response {
    let mut response = Response::default();
    loop {
        let block = match stream.next_batch() {
            Ok(Some(block)) => block,
            Ok(None) => break,
            Err(e) => {
                response.error = Some(CodecError::Transport(e));
                break;
            }
        };
        if token.is_cancelled() {
            response.error = Some(CodecError::Canceled);
            break;
        }
        if block.column_count() == 0 {
            continue;
        }
        if response.columns == 0 {
            response.columns = block.column_count();
        } else if response.columns != block.column_count() {
            response.error = Some(CodecError::invalid(format!(
                "columns mismatch in blocks: {} != {}",
                block.column_count(),
                response.columns
            )));
            break;
        }
        response.blocks.push(block);
    }
    tracing::debug!(
        blocks = response.blocks.len(),
        columns = response.columns,
        failed = response.error.is_some(),
        "select collected"
    );
    response
}

// ════════════════════════════════════════════════════════════════
//  Result cursor
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum CursorState {
    Ready { block: usize, row: usize },
    Done,
    Errored(CodecError),
}

/// Row-by-row reader over a collected select.
///
/// Once `Done` or `Errored` the cursor never materializes anything again;
/// an error is reported on every later call.
#[derive(Debug)]
pub struct ResultCursor {
    names: Vec<String>,
    blocks: Vec<Block>,
    columns: usize,
    state: CursorState,
    scratch: Vec<Cell>,
}

impl ResultCursor {
    /// Run `query` and collect its result.
    ///
    /// Failures do not surface here; they are reported by the first
    /// [`ResultCursor::advance`]. After a failed collection the transport is
    /// asked to reset its connection state.
    pub fn open<T: Transport + ?Sized>(
        transport: &mut T,
        query: &Query,
        token: &CancellationToken,
    ) -> Self {
        let response = match transport.select(query) {
            Ok(mut stream) => collect_batches(stream.as_mut(), token),
            Err(e) => Response::failed(CodecError::Transport(e)),
        };
        if let Some(error) = &response.error {
            tracing::warn!(error = %error, sql = %query.sql, "select failed");
            if let Err(e) = transport.reset() {
                tracing::warn!(error = %e, "connection reset failed");
            }
        }
        Self::from_response(response)
    }

    pub fn from_response(response: Response) -> Self {
        let names = response
            .blocks
            .first()
            .map(|b| b.names().to_vec())
            .unwrap_or_default();
        let state = match response.error {
            Some(e) => CursorState::Errored(e),
            None if response.columns > 0 && !response.blocks.is_empty() => {
                CursorState::Ready { block: 0, row: 0 }
            }
            None => CursorState::Done,
        };
        Self {
            names,
            blocks: response.blocks,
            columns: response.columns,
            state,
            scratch: Vec::new(),
        }
    }

    /// Next row, `Ok(None)` when the result is exhausted.
    pub fn advance(&mut self) -> CodecResult<Option<&[Cell]>> {
        loop {
            let (block_idx, row_idx) = match &self.state {
                CursorState::Done => return Ok(None),
                CursorState::Errored(e) => return Err(e.clone()),
                CursorState::Ready { block, row } => (*block, *row),
            };
            let Some(block) = self.blocks.get(block_idx) else {
                self.state = CursorState::Done;
                return Ok(None);
            };
            let rows = block.row_count();
            if row_idx >= rows {
                self.state = CursorState::Ready { block: block_idx + 1, row: 0 };
                continue;
            }
            match read_row(block, row_idx) {
                Ok(cells) => {
                    self.scratch = cells;
                    self.state = if row_idx + 1 < rows {
                        CursorState::Ready { block: block_idx, row: row_idx + 1 }
                    } else if block_idx + 1 < self.blocks.len() {
                        CursorState::Ready { block: block_idx + 1, row: 0 }
                    } else {
                        CursorState::Done
                    };
                    return Ok(Some(self.scratch.as_slice()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, block = block_idx, row = row_idx, "row materialization failed");
                    self.scratch.clear();
                    self.state = CursorState::Errored(e.clone());
                    return Err(e);
                }
            }
        }
    }

    /// The error this cursor failed with, if any.
    pub fn last_error(&self) -> Option<&CodecError> {
        match &self.state {
            CursorState::Errored(e) => Some(e),
            _ => None,
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    pub fn is_done(&self) -> bool {
        self.state == CursorState::Done
    }

    /// Planner-facing description of the result columns.
    pub fn describe(&self) -> CodecResult<Vec<ColumnDescriptor>> {
        let Some(block) = self.blocks.first() else {
            return Ok(Vec::new());
        };
        block
            .iter()
            .map(|(name, column)| ColumnDescriptor::describe(name, column.column_type().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chbridge_api::{Column, ColumnData, ColumnType, Datum, TransportError, VecBatchStream};

    fn int_block(values: Vec<i32>) -> Block {
        let column = Column::from_data(ColumnType::Int32, ColumnData::Int32(values)).unwrap();
        Block::with_columns([("n".to_string(), column)]).unwrap()
    }

    struct Failing(Vec<Block>);

    impl BatchStream for Failing {
        fn next_batch(&mut self) -> Result<Option<Block>, TransportError> {
            if self.0.is_empty() {
                return Err(TransportError::protocol("unexpected packet"));
            }
            Ok(Some(self.0.remove(0)))
        }
    }

    #[test]
    fn collection_drops_columnless_blocks() {
        let mut stream = VecBatchStream::new(vec![Block::new(), int_block(vec![1]), Block::new()]);
        let response = collect_batches(&mut stream, &CancellationToken::new());
        assert_eq!(response.blocks.len(), 1);
        assert_eq!(response.columns, 1);
        assert!(response.error.is_none());
    }

    #[test]
    fn collection_keeps_transport_error() {
        let mut stream = Failing(vec![int_block(vec![1])]);
        let response = collect_batches(&mut stream, &CancellationToken::new());
        assert_eq!(response.blocks.len(), 1);
        assert_eq!(response.error, Some(CodecError::Transport(TransportError::protocol("unexpected packet"))));
    }

    #[test]
    fn no_columns_means_done() {
        let mut cursor = ResultCursor::from_response(Response::default());
        assert!(cursor.is_done());
        assert_eq!(cursor.advance(), Ok(None));
        assert!(cursor.last_error().is_none());
    }

    #[test]
    fn scratch_holds_latest_row() {
        let response = Response { blocks: vec![int_block(vec![5, 6])], columns: 1, error: None };
        let mut cursor = ResultCursor::from_response(response);
        assert_eq!(cursor.column_names(), ["n"]);
        let row = cursor.advance().unwrap().unwrap().to_vec();
        assert_eq!(row[0].datum, Some(Datum::Int4(5)));
        let row = cursor.advance().unwrap().unwrap().to_vec();
        assert_eq!(row[0].datum, Some(Datum::Int4(6)));
        assert!(cursor.is_done());
    }
}
