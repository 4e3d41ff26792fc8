use super::transaction::TransactionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `resultCode` value the backend uses to report success.
pub const SUCCESS_CODE: &str = "success";

/// Body the backend posts to `/callback/{transactionId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackBody {
    #[serde(default)]
    pub status: String,
    pub result_code: String,
    #[serde(default)]
    pub result_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CallbackBody {
    pub fn success(data: Value) -> Self {
        Self {
            status: "200".to_string(),
            result_code: SUCCESS_CODE.to_string(),
            result_message: "OK".to_string(),
            data: Some(data),
        }
    }

    pub fn failure(result_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "500".to_string(),
            result_code: result_code.into(),
            result_message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code == SUCCESS_CODE
    }
}

/// What the intake did with a callback. Not part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDisposition {
    Applied,
    AlreadyResolved,
    UnknownTransaction,
    Rejected,
}

/// Acknowledgement returned to the backend for every callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub status: String,
    pub result_code: String,
    pub result_message: String,
    #[serde(skip)]
    pub disposition: CallbackDisposition,
}

impl CallbackAck {
    pub fn applied() -> Self {
        Self {
            status: "200".to_string(),
            result_code: SUCCESS_CODE.to_string(),
            result_message: "callback accepted".to_string(),
            disposition: CallbackDisposition::Applied,
        }
    }

    pub fn already_resolved(transaction_id: &TransactionId) -> Self {
        Self {
            status: "200".to_string(),
            result_code: SUCCESS_CODE.to_string(),
            result_message: format!("transaction {transaction_id} was already resolved"),
            disposition: CallbackDisposition::AlreadyResolved,
        }
    }

    pub fn unknown(transaction_id: &TransactionId) -> Self {
        Self {
            status: "404".to_string(),
            result_code: "unknown_transaction".to_string(),
            result_message: format!("no transaction {transaction_id}"),
            disposition: CallbackDisposition::UnknownTransaction,
        }
    }

    pub fn invalid_body(reason: impl Into<String>) -> Self {
        Self {
            status: "400".to_string(),
            result_code: "invalid_callback".to_string(),
            result_message: reason.into(),
            disposition: CallbackDisposition::Rejected,
        }
    }
}
