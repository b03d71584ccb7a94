//! Transfer-log decoding and amount scaling.

use custodex_types::{Contract, CustodexError, Platform, Result, constants};
use rust_decimal::Decimal;

use crate::gateway::Log;

/// A token transfer recovered from a `Transfer(address,address,uint256)` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub to: String,
    /// Amount in the token's smallest unit.
    pub amount: u128,
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

fn decode_word(hex_word: &str) -> Result<Vec<u8>> {
    hex::decode(strip_0x(hex_word)).map_err(|e| CustodexError::AmountDecode {
        reason: format!("bad hex {hex_word:?}: {e}"),
    })
}

/// Parse a big-endian hex quantity (a 32-byte ABI word or shorter).
pub fn decode_amount(data: &str) -> Result<u128> {
    let bytes = decode_word(data)?;
    if bytes.len() > 32 {
        return Err(CustodexError::AmountDecode {
            reason: format!("{} bytes is wider than one word", bytes.len()),
        });
    }
    let split = bytes.len().saturating_sub(16);
    let (high, low) = bytes.split_at(split);
    if high.iter().any(|b| *b != 0) {
        return Err(CustodexError::AmountDecode {
            reason: "amount exceeds 128 bits".to_string(),
        });
    }
    Ok(low.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
}

/// Address held in the low 20 bytes of an indexed topic.
pub fn topic_address(topic: &str, platform: Platform) -> Result<String> {
    let bytes = decode_word(topic)?;
    if bytes.len() != 32 {
        return Err(CustodexError::AmountDecode {
            reason: format!("topic is {} bytes, expected 32", bytes.len()),
        });
    }
    let account = hex::encode(&bytes[12..]);
    Ok(match platform {
        Platform::Ethereum => format!("0x{account}"),
        Platform::Tron => format!("41{account}"),
    })
}

/// Decode `log` as a transfer emitted by `contract`.
///
/// `Ok(None)` when the log is some other event or was emitted by a
/// different contract; an error when it claims to be a transfer but cannot
/// be decoded.
pub fn decode_transfer_log(log: &Log, contract: &Contract) -> Result<Option<TokenTransfer>> {
    let is_transfer = log
        .topics
        .first()
        .is_some_and(|t| t.eq_ignore_ascii_case(constants::TRANSFER_EVENT_TOPIC));
    if !is_transfer || !contract.platform.same_address(&log.address, &contract.address) {
        return Ok(None);
    }
    let Some(destination) = log.topics.get(2) else {
        return Err(CustodexError::AmountDecode {
            reason: "transfer log without a destination topic".to_string(),
        });
    };
    Ok(Some(TokenTransfer {
        to: topic_address(destination, contract.platform)?,
        amount: decode_amount(&log.data)?,
    }))
}

/// Scale a smallest-unit amount into ledger units.
pub fn scale_amount(raw: u128, decimals: u32) -> Result<Decimal> {
    let signed = i128::try_from(raw).map_err(|_| CustodexError::AmountDecode {
        reason: format!("{raw} overflows a signed 128-bit value"),
    })?;
    Decimal::try_from_i128_with_scale(signed, decimals)
        .map(|d| d.normalize())
        .map_err(|e| CustodexError::AmountDecode {
            reason: format!("{raw} at {decimals} decimals: {e}"),
        })
}
