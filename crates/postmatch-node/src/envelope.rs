//! Signed command envelopes.
//!
//! A command is signed over `DOMAIN ‖ json(command)` with the actor's ed25519
//! key. Verification checks the signature and that the address derived from
//! the public key is the command's actor, so nobody can act for another
//! account.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use postmatch_settlement::Command;
use postmatch_types::{Address, PostmatchError, Result};
use serde::{Deserialize, Serialize};

/// Domain separator for command signatures.
pub const DOMAIN: &[u8] = b"postmatch:command:v1:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedCommand {
    pub command: Command,
    /// Hex ed25519 public key, 32 bytes.
    pub public_key: String,
    /// Hex ed25519 signature, 64 bytes.
    pub signature: String,
}

impl SignedCommand {
    pub fn sign(command: Command, key: &SigningKey) -> Result<Self> {
        let signature = key.sign(&signing_bytes(&command)?);
        Ok(Self {
            command,
            public_key: hex::encode(key.verifying_key().as_bytes()),
            signature: hex::encode(signature.to_bytes()),
        })
    }

    /// The verified command, or why it cannot be trusted.
    pub fn verify(&self) -> Result<&Command> {
        let key = decode_key(&self.public_key)?;
        let signature = decode_signature(&self.signature)?;
        key.verify_strict(&signing_bytes(&self.command)?, &signature)
            .map_err(|e| invalid(format!("signature check failed: {e}")))?;

        let signer = Address::from_verifying_key(&key);
        let actor = self.command.actor();
        if signer != actor {
            return Err(invalid(format!("signed by {signer}, command acts as {actor}")));
        }
        Ok(&self.command)
    }

    pub fn into_command(self) -> Command {
        self.command
    }
}

fn signing_bytes(command: &Command) -> Result<Vec<u8>> {
    let mut bytes = DOMAIN.to_vec();
    bytes.extend(serde_json::to_vec(command)?);
    Ok(bytes)
}

fn decode_key(raw: &str) -> Result<VerifyingKey> {
    let bytes: [u8; 32] = hex::decode(raw)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid("public key must be 32 hex-encoded bytes"))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| invalid(format!("bad public key: {e}")))
}

fn decode_signature(raw: &str) -> Result<Signature> {
    let bytes: [u8; 64] = hex::decode(raw)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid("signature must be 64 hex-encoded bytes"))?;
    Ok(Signature::from_bytes(&bytes))
}

fn invalid(reason: impl Into<String>) -> PostmatchError {
    PostmatchError::InvalidSignature {
        reason: reason.into(),
    }
}
