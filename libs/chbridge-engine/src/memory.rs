use std::collections::VecDeque;

use chbridge_api::{BatchStream, Block, Query, Transport, TransportError};

// ════════════════════════════════════════════════════════════════
//  MemoryTransport
// ════════════════════════════════════════════════════════════════

/// One scripted select: blocks (or a mid-stream failure) in arrival order.
type ScriptedResult = Result<Vec<Result<Block, TransportError>>, TransportError>;

/// In-process transport. Serves scripted select results in order, records
/// every block sent by inserts and counts the protocol signals it received.
///
/// A select with nothing scripted returns an empty result.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    results: VecDeque<ScriptedResult>,
    insert_target: Block,
    queries: Vec<Query>,
    sent: Vec<Block>,
    in_insert: bool,
    begins: usize,
    ends: usize,
    resets: usize,
    fail_begin: Option<TransportError>,
    fail_send: Option<TransportError>,
    fail_end: Option<TransportError>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a select result made of `blocks`.
    pub fn push_result(&mut self, blocks: Vec<Block>) {
        self.results.push_back(Ok(blocks.into_iter().map(Ok).collect()));
    }

    /// Queue a select result whose stream may fail part way.
    pub fn push_stream(&mut self, items: Vec<Result<Block, TransportError>>) {
        self.results.push_back(Ok(items));
    }

    /// Queue a select that fails before any block arrives.
    pub fn push_select_error(&mut self, error: TransportError) {
        self.results.push_back(Err(error));
    }

    /// Columns reported to the next inserts. Rows in `target` are ignored.
    pub fn set_insert_target(&mut self, mut target: Block) {
        target.clear();
        self.insert_target = target;
    }

    pub fn fail_next_begin(&mut self, error: TransportError) {
        self.fail_begin = Some(error);
    }

    pub fn fail_next_send(&mut self, error: TransportError) {
        self.fail_send = Some(error);
    }

    pub fn fail_next_end(&mut self, error: TransportError) {
        self.fail_end = Some(error);
    }

    /// Blocks received by inserts, in order.
    pub fn sent_blocks(&self) -> &[Block] {
        &self.sent
    }

    /// Take the received blocks, e.g. to serve them back as a select result.
    pub fn take_sent(&mut self) -> Vec<Block> {
        std::mem::take(&mut self.sent)
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn begin_count(&self) -> usize {
        self.begins
    }

    pub fn end_count(&self) -> usize {
        self.ends
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }

    pub fn in_insert(&self) -> bool {
        self.in_insert
    }
}

struct MemoryStream {
    items: std::vec::IntoIter<Result<Block, TransportError>>,
    failed: bool,
}

impl BatchStream for MemoryStream {
    fn next_batch(&mut self) -> Result<Option<Block>, TransportError> {
        if self.failed {
            return Ok(None);
        }
        match self.items.next() {
            Some(Ok(block)) => Ok(Some(block)),
            Some(Err(e)) => {
                self.failed = true;
                Err(e)
            }
            None => Ok(None),
        }
    }
}

impl Transport for MemoryTransport {
    fn select(&mut self, query: &Query) -> Result<Box<dyn BatchStream + '_>, TransportError> {
        if self.in_insert {
            return Err(TransportError::protocol("select while an insert is in progress"));
        }
        self.queries.push(query.clone());
        let items = self.results.pop_front().unwrap_or_else(|| Ok(Vec::new()))?;
        Ok(Box::new(MemoryStream { items: items.into_iter(), failed: false }))
    }

    fn begin_insert(&mut self, statement: &str) -> Result<Block, TransportError> {
        if self.in_insert {
            return Err(TransportError::protocol("insert already in progress"));
        }
        if let Some(e) = self.fail_begin.take() {
            return Err(e);
        }
        tracing::trace!(statement, "memory insert begin");
        self.in_insert = true;
        self.begins += 1;
        Ok(self.insert_target.clone())
    }

    fn send_batch(&mut self, block: &Block) -> Result<(), TransportError> {
        if !self.in_insert {
            return Err(TransportError::protocol("block sent outside of an insert"));
        }
        if let Some(e) = self.fail_send.take() {
            return Err(e);
        }
        if block.names() != self.insert_target.names() {
            return Err(TransportError::server(format!(
                "block columns {:?} do not match insert target {:?}",
                block.names(),
                self.insert_target.names()
            )));
        }
        self.sent.push(block.clone());
        Ok(())
    }

    fn end_insert(&mut self) -> Result<(), TransportError> {
        if !self.in_insert {
            return Err(TransportError::protocol("no insert in progress"));
        }
        self.in_insert = false;
        self.ends += 1;
        match self.fail_end.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.resets += 1;
        self.in_insert = false;
        Ok(())
    }
}
