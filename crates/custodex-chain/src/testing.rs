//! Scripted collaborators for tests.
//!
//! [`ScriptedGateway`] serves blocks, logs and outcomes that the test put
//! there, records everything it signs and broadcasts, and can be told to
//! fail, stall or panic at specific steps.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use custodex_types::{CustodexError, Platform, Result};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use crate::gateway::{
    Block, ChainGateway, DerivedKey, GatewayDialer, Keypair, Log, Mailer, SignedTransfer,
    TransferIntent, TxOutcome,
};

#[derive(Default)]
struct Script {
    blocks: HashMap<u64, Block>,
    logs: HashMap<String, Vec<Log>>,
    outcomes: HashMap<String, TxOutcome>,
    fee: Decimal,
    signed: Vec<TransferIntent>,
    broadcasts: Vec<SignedTransfer>,
    fail_blocks: bool,
    fail_broadcast: bool,
    drop_broadcast: bool,
    panic_on_sign: bool,
    sign_gate: Option<Arc<Semaphore>>,
    nonce: u64,
}

/// In-memory chain node.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
}

impl ScriptedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fee(self, fee: Decimal) -> Self {
        self.script.lock().fee = fee;
        self
    }

    pub fn push_block(&self, block: Block) {
        self.script.lock().blocks.insert(block.number, block);
    }

    pub fn add_logs(&self, hash: &str, logs: Vec<Log>) {
        self.script.lock().logs.insert(hash.to_string(), logs);
    }

    pub fn set_outcome(&self, hash: &str, outcome: TxOutcome) {
        self.script.lock().outcomes.insert(hash.to_string(), outcome);
    }

    pub fn fail_blocks(&self, fail: bool) {
        self.script.lock().fail_blocks = fail;
    }

    pub fn fail_broadcast(&self, fail: bool) {
        self.script.lock().fail_broadcast = fail;
    }

    /// Accept broadcasts but answer with a transport error, as a node that
    /// times out after taking the transfer would.
    pub fn drop_broadcast(&self, drop: bool) {
        self.script.lock().drop_broadcast = drop;
    }

    /// Make every signing wait for a permit on the returned gate.
    pub fn hold_signing(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.script.lock().sign_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn release_signing(&self) {
        if let Some(gate) = self.script.lock().sign_gate.take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn panic_on_sign(&self, panic: bool) {
        self.script.lock().panic_on_sign = panic;
    }

    #[must_use]
    pub fn signed(&self) -> Vec<TransferIntent> {
        self.script.lock().signed.clone()
    }

    #[must_use]
    pub fn broadcasts(&self) -> Vec<SignedTransfer> {
        self.script.lock().broadcasts.clone()
    }
}

#[async_trait]
impl ChainGateway for ScriptedGateway {
    async fn block_by_number(&self, number: u64) -> Result<Block> {
        let script = self.script.lock();
        if script.fail_blocks {
            return Err(CustodexError::Gateway {
                reason: "node unreachable".to_string(),
            });
        }
        script
            .blocks
            .get(&number)
            .cloned()
            .ok_or(CustodexError::BlockNotAvailable(number))
    }

    async fn logs_by_transaction(&self, hash: &str) -> Result<Vec<Log>> {
        Ok(self.script.lock().logs.get(hash).cloned().unwrap_or_default())
    }

    async fn transaction_status(&self, hash: &str) -> Result<TxOutcome> {
        Ok(self
            .script
            .lock()
            .outcomes
            .get(hash)
            .copied()
            .unwrap_or(TxOutcome::Unknown))
    }

    async fn estimate_fee(&self, _intent: &TransferIntent) -> Result<Decimal> {
        Ok(self.script.lock().fee)
    }

    async fn sign_transfer(&self, private_key: &str, intent: &TransferIntent) -> Result<SignedTransfer> {
        let gate = self.script.lock().sign_gate.clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| CustodexError::Signing {
                    reason: e.to_string(),
                })?
                .forget();
        }
        let mut script = self.script.lock();
        assert!(!script.panic_on_sign, "scripted signer panic");
        script.nonce += 1;
        let digest = Sha256::digest(format!(
            "{private_key}:{}:{}:{}:{}",
            intent.from, intent.to, intent.value, script.nonce
        ));
        script.signed.push(intent.clone());
        Ok(SignedTransfer {
            hash: format!("0x{}", hex::encode(digest)),
            raw: hex::encode(format!("{intent:?}")),
        })
    }

    async fn broadcast(&self, signed: &SignedTransfer) -> Result<()> {
        let mut script = self.script.lock();
        if script.fail_broadcast {
            return Err(CustodexError::Broadcast {
                reason: "node rejected transaction".to_string(),
            });
        }
        script.broadcasts.push(signed.clone());
        if script.drop_broadcast {
            return Err(CustodexError::Gateway {
                reason: "broadcast timed out".to_string(),
            });
        }
        Ok(())
    }
}

/// Hands out pre-registered gateways by RPC endpoint.
#[derive(Default)]
pub struct ScriptedDialer {
    gateways: Mutex<HashMap<String, Arc<ScriptedGateway>>>,
}

impl ScriptedDialer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, rpc: &str, gateway: Arc<ScriptedGateway>) {
        self.gateways.lock().insert(rpc.to_string(), gateway);
    }
}

#[async_trait]
impl GatewayDialer for ScriptedDialer {
    async fn dial(&self, rpc: &str, _platform: Platform) -> Result<Arc<dyn ChainGateway>> {
        let gateway = self
            .gateways
            .lock()
            .get(rpc)
            .cloned()
            .ok_or_else(|| CustodexError::Gateway {
                reason: format!("no node at {rpc}"),
            })?;
        Ok(gateway)
    }
}

/// Deterministic key derivation: the address is a hash of the inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashKeypair;

impl Keypair for HashKeypair {
    fn derive(&self, passphrase: &str, entropy: &str, platform: Platform) -> Result<DerivedKey> {
        let digest = hex::encode(Sha256::digest(format!("{passphrase}:{entropy}")));
        let address = match platform {
            Platform::Ethereum => format!("0x{}", &digest[..40]),
            Platform::Tron => format!("41{}", &digest[..40]),
        };
        Ok(DerivedKey {
            address,
            private_key: hex::encode(Sha256::digest(format!("{entropy}:{passphrase}"))),
        })
    }

    fn is_valid_address(&self, platform: Platform, address: &str) -> bool {
        let body = match platform {
            Platform::Ethereum => address.strip_prefix("0x"),
            Platform::Tron => address.strip_prefix("41"),
        };
        body.is_some_and(|b| b.len() == 40 && b.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

/// A mail that [`RecordingMailer`] would have sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mail {
    WithdrawalConfirmation { email: String, hash: String },
    SecurityCode { email: String, code: String },
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Mail>>,
}

impl RecordingMailer {
    #[must_use]
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_withdrawal_confirmation(
        &self,
        email: &str,
        _symbol: &str,
        _value: Decimal,
        hash: &str,
    ) -> Result<()> {
        self.sent.lock().push(Mail::WithdrawalConfirmation {
            email: email.to_string(),
            hash: hash.to_string(),
        });
        Ok(())
    }

    async fn send_security_code(&self, email: &str, code: &str) -> Result<()> {
        self.sent.lock().push(Mail::SecurityCode {
            email: email.to_string(),
            code: code.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_blocks_are_not_available() {
        let gw = ScriptedGateway::new();
        gw.push_block(Block {
            number: 7,
            transactions: vec![],
        });
        assert_eq!(gw.block_by_number(7).await.unwrap().number, 7);
        assert!(matches!(
            gw.block_by_number(8).await.unwrap_err(),
            CustodexError::BlockNotAvailable(8)
        ));
    }

    #[tokio::test]
    async fn signed_hashes_are_unique_and_recorded() {
        let gw = ScriptedGateway::new().with_fee(Decimal::ONE);
        let intent = TransferIntent {
            platform: Platform::Ethereum,
            from: "0x01".into(),
            to: "0x02".into(),
            value: Decimal::TEN,
            decimals: 18,
            contract: None,
        };
        let a = gw.sign_transfer("key", &intent).await.unwrap();
        let b = gw.sign_transfer("key", &intent).await.unwrap();
        assert_ne!(a.hash, b.hash);
        assert_eq!(gw.signed().len(), 2);

        gw.broadcast(&a).await.unwrap();
        gw.fail_broadcast(true);
        assert!(gw.broadcast(&b).await.is_err());
        assert_eq!(gw.broadcasts(), vec![a]);
    }

    #[tokio::test]
    async fn dialer_serves_registered_endpoints_only() {
        let dialer = ScriptedDialer::new();
        dialer.register("mem://eth", Arc::new(ScriptedGateway::new()));
        assert!(dialer.dial("mem://eth", Platform::Ethereum).await.is_ok());
        assert!(dialer.dial("mem://tron", Platform::Tron).await.is_err());
    }

    #[test]
    fn hash_keypair_is_deterministic_and_valid() {
        let kp = HashKeypair;
        let a = kp.derive("pass", "entropy", Platform::Ethereum).unwrap();
        let b = kp.derive("pass", "entropy", Platform::Ethereum).unwrap();
        assert_eq!(a, b);
        assert!(kp.is_valid_address(Platform::Ethereum, &a.address));
        assert!(!kp.is_valid_address(Platform::Ethereum, "0xnope"));
        assert!(!kp.is_valid_address(Platform::Tron, &a.address));
    }
}
