use filedrop_core::StoreError;
use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::sink::DeliveryError;

/// Failure of one dispatched message or one subscription
#[derive(Debug, Error, Clone)]
pub enum RelayError {
    #[error(transparent)]
    Decode(#[from] ProtocolError),
    #[error("error processing message: invalid password")]
    Unauthorized,
    #[error("error processing message: {0}")]
    Storage(#[from] StoreError),
    #[error("error sending message: {0}")]
    Delivery(#[from] DeliveryError),
}
