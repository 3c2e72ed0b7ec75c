use crate::id::TransactionId;

/// A single, immutable entry of the ledger.
///
/// The content is either the output of an executed unit or the payload of
/// a raw submission. Fields are private so a transaction cannot be changed
/// after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: TransactionId,
    content: Vec<u8>,
}

impl Transaction {
    /// Wrap `content` in a new transaction with a freshly generated id.
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self::with_id(TransactionId::new(), content)
    }

    pub fn with_id(id: TransactionId, content: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }
}
