// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Failed to encode message '{method}': {reason}")]
    Encode { method: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MessageError>;
