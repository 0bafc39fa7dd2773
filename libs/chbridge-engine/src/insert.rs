use chbridge_api::{
    Block, CodecError, CodecResult, ColumnDescriptor, Datum, ExternalType, Transport, map_type,
};
use chbridge_converter_pg_to_ch::append_datum;

#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    /// Flush automatically once this many rows are pending. `None`: only on
    /// explicit [`InsertSession::flush`] and on close.
    pub max_block_rows: Option<usize>,
}

/// Accumulates rows for one insert statement and ships them in blocks.
///
/// The first failure poisons the session: pending rows are never sent and
/// every later call reports that error. The insert is always ended on the
/// transport, by [`InsertSession::close`] or on drop.
pub struct InsertSession<T: Transport> {
    transport: T,
    statement: String,
    /// External type each column's values are declared as.
    declared: Vec<ExternalType>,
    block: Block,
    rows: usize,
    sent_rows: usize,
    options: InsertOptions,
    error: Option<CodecError>,
    closed: bool,
}

impl<T: Transport> InsertSession<T> {
    /// Begin `statement`; `columns` declares the external type of the values
    /// supplied for each target column, in target order.
    pub fn open(
        transport: T,
        statement: &str,
        columns: Vec<ExternalType>,
        options: InsertOptions,
    ) -> CodecResult<Self> {
        Self::begin(transport, statement, Some(columns), options)
    }

    /// Like [`InsertSession::open`], declaring every column as the external
    /// type its wire type maps to.
    pub fn open_mapped(transport: T, statement: &str, options: InsertOptions) -> CodecResult<Self> {
        Self::begin(transport, statement, None, options)
    }

    fn begin(
        mut transport: T,
        statement: &str,
        columns: Option<Vec<ExternalType>>,
        options: InsertOptions,
    ) -> CodecResult<Self> {
        let block = transport.begin_insert(statement)?;
        let declared = match columns {
            Some(columns) => columns,
            None => block
                .columns()
                .iter()
                .map(|c| map_type(c.column_type()))
                .collect::<CodecResult<_>>()
                .inspect_err(|_| end_quietly(&mut transport, statement))?,
        };
        if declared.len() != block.column_count() {
            end_quietly(&mut transport, statement);
            return Err(CodecError::invalid(format!(
                "insert target has {} columns, {} values declared",
                block.column_count(),
                declared.len()
            )));
        }
        let mut block = block;
        block.clear();
        tracing::debug!(statement, columns = block.column_count(), "insert started");
        Ok(Self {
            transport,
            statement: statement.to_string(),
            declared,
            block,
            rows: 0,
            sent_rows: 0,
            options,
            error: None,
            closed: false,
        })
    }

    pub fn column_names(&self) -> &[String] {
        self.block.names()
    }

    pub fn column_count(&self) -> usize {
        self.block.column_count()
    }

    /// Descriptors of the target columns.
    pub fn describe(&self) -> CodecResult<Vec<ColumnDescriptor>> {
        self.block
            .iter()
            .map(|(name, column)| ColumnDescriptor::describe(name, column.column_type().clone()))
            .collect()
    }

    /// Rows waiting for the next flush.
    pub fn pending_rows(&self) -> usize {
        self.rows
    }

    /// Rows already handed to the transport.
    pub fn sent_rows(&self) -> usize {
        self.sent_rows
    }

    pub fn last_error(&self) -> Option<&CodecError> {
        self.error.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Write one cell of the row in progress. The row is committed by
    /// [`InsertSession::end_row`].
    pub fn write_column(&mut self, index: usize, datum: Option<&Datum>) -> CodecResult<()> {
        self.check_usable()?;
        let result = self.write_cell(index, datum);
        self.poison_on_err(result)
    }

    /// Commit the row in progress; every column must have been written once.
    pub fn end_row(&mut self) -> CodecResult<()> {
        self.check_usable()?;
        let expected = self.rows + 1;
        let short = self
            .block
            .iter()
            .find(|(_, c)| c.len() != expected)
            .map(|(name, column)| {
                CodecError::invalid(format!(
                    "column '{name}' holds {} values, expected {expected}",
                    column.len()
                ))
            });
        if let Some(err) = short {
            return self.poison_on_err(Err(err));
        }
        self.rows = expected;
        match self.options.max_block_rows {
            Some(max) if self.rows >= max => self.flush(),
            _ => Ok(()),
        }
    }

    /// Write a full row, one value per column in target order.
    pub fn append_row(&mut self, values: &[Option<Datum>]) -> CodecResult<()> {
        self.check_usable()?;
        if values.len() != self.block.column_count() {
            let err = CodecError::invalid(format!(
                "row has {} values, insert target has {} columns",
                values.len(),
                self.block.column_count()
            ));
            return self.poison_on_err(Err(err));
        }
        for (index, value) in values.iter().enumerate() {
            let result = self.write_cell(index, value.as_ref());
            self.poison_on_err(result)?;
        }
        self.end_row()
    }

    /// Send the pending rows as one block and start a new one.
    pub fn flush(&mut self) -> CodecResult<()> {
        self.check_usable()?;
        let untouched = self.rows == 0 && self.block.columns().iter().all(|c| c.is_empty());
        if self.block.column_count() == 0 || untouched {
            return Ok(());
        }
        let result = self.send_pending();
        self.poison_on_err(result)
    }

    /// Flush what is pending (unless the session failed) and end the insert.
    ///
    /// Safe to call repeatedly and after a failure; the first error of the
    /// session is returned in that case.
    pub fn close(&mut self) -> CodecResult<()> {
        if self.closed {
            return self.error.clone().map_or(Ok(()), Err);
        }
        if self.error.is_none() {
            // A failed flush poisons the session; the error is returned below.
            let _ = self.flush();
        }
        self.closed = true;
        let ended = self.transport.end_insert();
        tracing::debug!(statement = %self.statement, rows = self.sent_rows, "insert ended");
        match (self.error.clone(), ended) {
            (Some(e), Err(end_err)) => {
                tracing::warn!(error = %end_err, original = %e, "ending failed insert also failed");
                Err(e)
            }
            (Some(e), Ok(())) => Err(e),
            (None, Err(end_err)) => {
                let e = CodecError::Transport(end_err);
                self.error = Some(e.clone());
                Err(e)
            }
            (None, Ok(())) => Ok(()),
        }
    }

    fn check_usable(&self) -> CodecResult<()> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if self.closed {
            return Err(CodecError::invalid("insert session is closed"));
        }
        Ok(())
    }

    fn write_cell(&mut self, index: usize, datum: Option<&Datum>) -> CodecResult<()> {
        let ty = self
            .declared
            .get(index)
            .ok_or_else(|| CodecError::invalid(format!("no insert column at index {index}")))?;
        let column = self
            .block
            .column_mut(index)
            .ok_or_else(|| CodecError::invalid(format!("no insert column at index {index}")))?;
        if column.len() > self.rows {
            return Err(CodecError::invalid(format!("column {index} written twice in one row")));
        }
        append_datum(column, datum, ty)
    }

    fn send_pending(&mut self) -> CodecResult<()> {
        let rows = self.block.refresh_row_count()?;
        if rows != self.rows {
            return Err(CodecError::invalid(format!(
                "block holds {rows} rows, {} were committed",
                self.rows
            )));
        }
        self.transport.send_batch(&self.block)?;
        tracing::debug!(statement = %self.statement, rows, "insert block sent");
        self.sent_rows += rows;
        self.rows = 0;
        self.block.clear();
        Ok(())
    }

    fn poison_on_err<R>(&mut self, result: CodecResult<R>) -> CodecResult<R> {
        if let Err(e) = &result {
            if self.error.is_none() {
                tracing::warn!(error = %e, statement = %self.statement, "insert session failed");
                self.error = Some(e.clone());
            }
        }
        result
    }
}

impl<T: Transport> Drop for InsertSession<T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, statement = %self.statement, "insert dropped with error");
        }
    }
}

fn end_quietly<T: Transport>(transport: &mut T, statement: &str) {
    if let Err(e) = transport.end_insert() {
        tracing::warn!(error = %e, statement, "ending aborted insert failed");
    }
}
