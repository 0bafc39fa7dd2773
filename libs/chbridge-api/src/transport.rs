use crate::column::Block;
use crate::error::TransportError;
use crate::settings::Query;

/// Result of a running select: blocks in arrival order.
///
/// Blocks may be empty (zero rows) or carry no columns at all (progress
/// packets); consumers skip those.
pub trait BatchStream {
    /// Next block, `Ok(None)` at end of stream.
    fn next_batch(&mut self) -> Result<Option<Block>, TransportError>;
}

/// Connection to the analytical store.
///
/// Blocking: every call returns when the server answered. The codec drives
/// one session at a time; implementations do not need to be `Sync`.
pub trait Transport {
    /// Start a select and return its block stream.
    fn select(&mut self, query: &Query) -> Result<Box<dyn BatchStream + '_>, TransportError>;

    /// Start an insert. Returns an empty block carrying the target columns
    /// (names and wire types) in statement order.
    fn begin_insert(&mut self, statement: &str) -> Result<Block, TransportError>;

    /// Send one block of the running insert.
    fn send_batch(&mut self, block: &Block) -> Result<(), TransportError>;

    /// Finish the running insert. Must be called once per `begin_insert`,
    /// including after failures.
    fn end_insert(&mut self) -> Result<(), TransportError>;

    /// Drop whatever protocol state a failed exchange left behind.
    ///
    /// Default: nothing to reset.
    fn reset(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn select(&mut self, query: &Query) -> Result<Box<dyn BatchStream + '_>, TransportError> {
        (**self).select(query)
    }

    fn begin_insert(&mut self, statement: &str) -> Result<Block, TransportError> {
        (**self).begin_insert(statement)
    }

    fn send_batch(&mut self, block: &Block) -> Result<(), TransportError> {
        (**self).send_batch(block)
    }

    fn end_insert(&mut self) -> Result<(), TransportError> {
        (**self).end_insert()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }
}

/// Stream over blocks already in memory.
pub struct VecBatchStream {
    blocks: std::vec::IntoIter<Block>,
}

impl VecBatchStream {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks: blocks.into_iter() }
    }
}

impl BatchStream for VecBatchStream {
    fn next_batch(&mut self) -> Result<Option<Block>, TransportError> {
        Ok(self.blocks.next())
    }
}
