//! Typed chain gateway seam.
//!
//! One [`ChainGateway`] talks to one chain's RPC node. The reconcilers never
//! see raw JSON: blocks, logs and outcomes arrive as the structs below, and
//! amounts stay in the chain's smallest unit until [`crate::decode`] scales
//! them into ledger decimals.

use std::sync::Arc;

use async_trait::async_trait;
use custodex_types::{Platform, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A transaction as it appears in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub hash: String,
    pub from: String,
    /// Recipient, or the called contract. `None` for contract creation.
    pub to: Option<String>,
    /// Native value in the smallest unit.
    pub value: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub transactions: Vec<ChainTransaction>,
}

/// An event log emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract.
    pub address: String,
    /// Hex-encoded 32-byte topics, `0x`-prefixed.
    pub topics: Vec<String>,
    /// Hex-encoded data, `0x`-prefixed.
    pub data: String,
}

/// Final state of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutcome {
    Success,
    Failure,
    /// Not mined yet, or the node does not know it.
    Unknown,
}

/// What to sign: a native transfer when `contract` is `None`, otherwise a
/// token transfer through `contract`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub platform: Platform,
    pub from: String,
    pub to: String,
    pub value: Decimal,
    pub decimals: u32,
    pub contract: Option<String>,
}

/// A signed, broadcastable transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransfer {
    pub hash: String,
    /// Encoded transaction bytes as hex.
    pub raw: String,
}

/// Per-chain RPC client.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Fails with [`CustodexError::BlockNotAvailable`](custodex_types::CustodexError::BlockNotAvailable)
    /// when `number` is beyond the chain head.
    async fn block_by_number(&self, number: u64) -> Result<Block>;
    async fn logs_by_transaction(&self, hash: &str) -> Result<Vec<Log>>;
    async fn transaction_status(&self, hash: &str) -> Result<TxOutcome>;
    /// Expected network fee, in parent-asset units, for `intent`.
    async fn estimate_fee(&self, intent: &TransferIntent) -> Result<Decimal>;
    async fn sign_transfer(&self, private_key: &str, intent: &TransferIntent) -> Result<SignedTransfer>;
    async fn broadcast(&self, signed: &SignedTransfer) -> Result<()>;
}

/// Opens gateways for chain rows.
#[async_trait]
pub trait GatewayDialer: Send + Sync {
    async fn dial(&self, rpc: &str, platform: Platform) -> Result<Arc<dyn ChainGateway>>;
}

/// A derived custodial key.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub address: String,
    pub private_key: String,
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Address encoding and key derivation.
pub trait Keypair: Send + Sync {
    fn derive(&self, passphrase: &str, entropy: &str, platform: Platform) -> Result<DerivedKey>;
    fn is_valid_address(&self, platform: Platform, address: &str) -> bool;
}

/// Outbound mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_withdrawal_confirmation(
        &self,
        email: &str,
        symbol: &str,
        value: Decimal,
        hash: &str,
    ) -> Result<()>;
    async fn send_security_code(&self, email: &str, code: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_key_debug_hides_the_secret() {
        let key = DerivedKey {
            address: "0xabc".into(),
            private_key: "deadbeef".into(),
        };
        let shown = format!("{key:?}");
        assert!(shown.contains("0xabc"));
        assert!(!shown.contains("deadbeef"));
    }
}
