//! Asset decoding boundary
//!
//! A decoder looks at one internal call and says whether it moved an asset
//! the protocol cares about. Protocol-specific decoders plug in through
//! [`AssetDecoder`]; [`NativeTransferDecoder`] covers native-coin transfers.

use crate::error::DecodeError;
use crate::records::AssetMovement;
use crate::types::InternalCall;
use alloy_primitives::U256;

/// Outcome of decoding a single internal call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Movement(AssetMovement),
    NotRelevant,
}

pub trait AssetDecoder: Send + Sync {
    fn decode(&self, call: &InternalCall) -> Result<Decoded, DecodeError>;
}

/// Decodes native-coin value transfers out of traced calls.
///
/// - CALL, CALLCODE and SELFDESTRUCT with a non-zero value move coins.
/// - STATICCALL and DELEGATECALL never move value, even if a tracer reports one.
/// - CREATE / CREATE2 endowments are not attributed to the protocol.
/// - Calls that errored were rolled back and move nothing.
pub struct NativeTransferDecoder {
    protocol: String,
    symbol: String,
    decimals: u8,
}

impl NativeTransferDecoder {
    pub fn new(protocol: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            protocol: protocol.into(),
            symbol: symbol.into(),
            decimals,
        }
    }
}

impl AssetDecoder for NativeTransferDecoder {
    fn decode(&self, call: &InternalCall) -> Result<Decoded, DecodeError> {
        let moves_value = match call.call_type.as_str() {
            "" => return Err(DecodeError::MissingCallType),
            "CALL" | "CALLCODE" | "SELFDESTRUCT" => true,
            "STATICCALL" | "DELEGATECALL" | "CREATE" | "CREATE2" => false,
            other => return Err(DecodeError::UnknownCallType(other.to_string())),
        };

        if !moves_value || call.error.is_some() || call.value == U256::ZERO {
            return Ok(Decoded::NotRelevant);
        }
        if call.to.is_none() {
            return Err(DecodeError::Malformed(format!(
                "{} with value has no recipient",
                call.call_type
            )));
        }

        Ok(Decoded::Movement(AssetMovement {
            symbol: self.symbol.clone(),
            amount: call.value,
            decimals: self.decimals,
            protocol: self.protocol.clone(),
        }))
    }
}
