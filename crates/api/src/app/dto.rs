use serde::{Deserialize, Serialize};
use serde_json::Value;

use hatchery_core::Transaction;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PostTransactionRequest {
    /// Unit to run. Without it the payload is appended as-is.
    #[serde(default)]
    pub txn_type: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl PostTransactionRequest {
    /// Bytes handed to the unit: strings verbatim, anything else as JSON text.
    pub fn payload_bytes(&self) -> Vec<u8> {
        match &self.payload {
            Value::Null => Vec::new(),
            Value::String(s) => s.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub content: Value,
}

pub fn transaction_to_json(txn: &Transaction) -> TransactionResponse {
    TransactionResponse {
        id: txn.id().to_string(),
        content: bytes_to_json(txn.content()),
    }
}

/// Render stored bytes: embedded JSON when they parse, otherwise a (lossy) string.
pub fn bytes_to_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
