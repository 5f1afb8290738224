//! Venue signing: HMAC-SHA256 query-string signing (grounded in the
//! workspace precedent's `BinanceRequestSigner`) and EIP-712 typed-data
//! signing over an EVM wallet (grounded in the pack's `ethers`
//! `TypedData::encode_eip712` usage).

use ethers::signers::{LocalWallet, Signer as EthersSigner};
use ethers::types::transaction::eip712::{Eip712, TypedData};
use hmac::{Hmac, Mac};
use polytrade_core::WorkerError;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Produces the signatures a venue adapter attaches to its requests.
/// One instance per account; never shared across an `.await` since the
/// underlying material is just bytes, not a socket.
pub trait Signer: Send + Sync {
    /// HMAC-SHA256 hex digest of `payload`, as used by the CEX derivatives
    /// venue's query-string auth and the prediction-market CLOB's L2 auth.
    fn sign_hmac(&self, payload: &str) -> Result<String, WorkerError>;

    /// EIP-712 signature over an already-assembled typed-data document,
    /// as used by the prediction-market CLOB's on-chain order auth.
    fn sign_eip712(&self, typed_data: &TypedData) -> Result<String, WorkerError>;
}

/// Signs with a raw HMAC secret and, optionally, an EVM private key.
pub struct AccountSigner {
    hmac_secret: Option<String>,
    wallet: Option<LocalWallet>,
}

impl std::fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSigner")
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "<redacted>"))
            .field("wallet", &self.wallet_address())
            .finish()
    }
}

impl AccountSigner {
    pub fn hmac_only(api_secret: impl Into<String>) -> Self {
        Self {
            hmac_secret: Some(api_secret.into()),
            wallet: None,
        }
    }

    pub fn from_private_key(private_key: &str) -> Result<Self, WorkerError> {
        let wallet: LocalWallet = private_key
            .parse()
            .map_err(|e: ethers::signers::WalletError| WorkerError::SignError(e.to_string()))?;
        Ok(Self {
            hmac_secret: None,
            wallet: Some(wallet),
        })
    }

    pub fn with_hmac(mut self, api_secret: impl Into<String>) -> Self {
        self.hmac_secret = Some(api_secret.into());
        self
    }

    pub fn wallet_address(&self) -> Option<String> {
        self.wallet.as_ref().map(|w| format!("{:?}", w.address()))
    }
}

impl Signer for AccountSigner {
    fn sign_hmac(&self, payload: &str) -> Result<String, WorkerError> {
        let secret = self
            .hmac_secret
            .as_ref()
            .ok_or_else(|| WorkerError::SignError("no HMAC secret configured".into()))?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| WorkerError::SignError(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn sign_eip712(&self, typed_data: &TypedData) -> Result<String, WorkerError> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| WorkerError::SignError("no EVM wallet configured".into()))?;
        let digest = typed_data
            .encode_eip712()
            .map_err(|e| WorkerError::SignError(e.to_string()))?;
        let sig = wallet
            .sign_hash(digest.into())
            .map_err(|e| WorkerError::SignError(e.to_string()))?;
        Ok(format!("0x{}", sig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_signature_is_deterministic_for_same_payload() {
        let signer = AccountSigner::hmac_only("supersecret");
        let a = signer.sign_hmac("symbol=BTCUSDT&timestamp=1").unwrap();
        let b = signer.sign_hmac("symbol=BTCUSDT&timestamp=1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex-encoded SHA256
    }

    #[test]
    fn hmac_signature_changes_with_payload() {
        let signer = AccountSigner::hmac_only("supersecret");
        let a = signer.sign_hmac("timestamp=1").unwrap();
        let b = signer.sign_hmac("timestamp=2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn missing_hmac_secret_surfaces_as_sign_error() {
        let signer = AccountSigner::from_private_key(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert!(matches!(signer.sign_hmac("x"), Err(WorkerError::SignError(_))));
    }
}
