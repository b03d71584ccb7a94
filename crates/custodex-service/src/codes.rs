//! One-time withdrawal security codes.
//!
//! A code is six random digits mailed to the account holder. Only its
//! SHA-256 digest is kept. Any verification attempt consumes the code,
//! right or wrong, so a guesser gets one try per issued code.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use custodex_types::{UserId, constants};
use parking_lot::Mutex;
use rand::Rng;
use sha2::{Digest, Sha256};

struct Issued {
    digest: String,
    expires_at: Instant,
}

pub struct SecurityCodes {
    ttl: Duration,
    issued: Mutex<HashMap<UserId, Issued>>,
}

impl SecurityCodes {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            issued: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh code for `user`, replacing any outstanding one.
    #[must_use]
    pub fn issue(&self, user: UserId) -> String {
        let bound = 10u32.pow(u32::try_from(constants::SECURITY_CODE_LEN).unwrap_or(6));
        let n = rand::thread_rng().gen_range(0..bound);
        let code = format!("{n:0width$}", width = constants::SECURITY_CODE_LEN);
        self.issued.lock().insert(
            user,
            Issued {
                digest: digest(&code),
                expires_at: Instant::now() + self.ttl,
            },
        );
        code
    }

    /// Check and consume `user`'s outstanding code.
    pub fn consume(&self, user: UserId, code: &str) -> bool {
        let Some(issued) = self.issued.lock().remove(&user) else {
            return false;
        };
        Instant::now() < issued.expires_at && issued.digest == digest(code.trim())
    }
}

fn digest(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}
