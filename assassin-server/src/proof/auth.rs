//! Check-in auth message construction and signature recovery.
//!
//! Players sign a short text message with their wallet (EIP-191 personal
//! sign); the server recovers the signer and checks freshness and game
//! binding. The transport middleware that carries the signature is out of
//! scope - this module is the codec it calls into.

use alloy::primitives::{Address, Signature};

use crate::error::AuthError;
use crate::types::primitives::{GameId, UnixSeconds};

/// Maximum accepted age of a signed auth message.
pub const AUTH_MESSAGE_MAX_AGE_SECONDS: i64 = 300;

/// Build the canonical auth message for a check-in.
///
/// The chain id binds the message to one deployment; the timestamp bounds
/// replay.
#[must_use]
pub fn auth_message(chain_id: u64, game_id: GameId, timestamp: UnixSeconds) -> String {
    format!("assassin-checkin:{chain_id}:{game_id}:{timestamp}")
}

/// Recover the signer of an auth message.
///
/// # Errors
///
/// Returns [`AuthError::SignatureInvalid`] when the signature is malformed
/// or recovery fails.
pub fn recover_signer(message: &str, signature_hex: &str) -> Result<Address, AuthError> {
    let raw = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|_| AuthError::SignatureInvalid)?;
    let signature = Signature::from_raw(&raw).map_err(|_| AuthError::SignatureInvalid)?;

    signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|_| AuthError::SignatureInvalid)
}

/// Validate a signed check-in message end to end.
///
/// Checks game binding and freshness, then recovers the signer. The caller
/// compares the returned address against the claimed identity.
///
/// # Errors
///
/// Returns [`AuthError::WrongGame`] on id mismatch,
/// [`AuthError::MessageStale`] beyond the freshness window (or from the
/// future), and [`AuthError::SignatureInvalid`] on recovery failure.
pub fn validate_auth(
    chain_id: u64,
    expected_game: GameId,
    signed_game: GameId,
    timestamp: UnixSeconds,
    signature_hex: &str,
    now: UnixSeconds,
) -> Result<Address, AuthError> {
    if signed_game != expected_game {
        return Err(AuthError::WrongGame {
            expected: expected_game.value(),
            got: signed_game.value(),
        });
    }

    let age = now - timestamp;
    if !(0..=AUTH_MESSAGE_MAX_AGE_SECONDS).contains(&age) {
        return Err(AuthError::MessageStale { age_seconds: age });
    }

    let message = auth_message(chain_id, signed_game, timestamp);
    recover_signer(&message, signature_hex)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use alloy::signers::SignerSync;
    use alloy::signers::local::PrivateKeySigner;

    use super::*;

    fn sign(message: &str, signer: &PrivateKeySigner) -> String {
        let sig = signer.sign_message_sync(message.as_bytes()).unwrap();
        hex::encode(sig.as_bytes())
    }

    #[test]
    fn recovers_the_signer() {
        let signer = PrivateKeySigner::random();
        let message = auth_message(31337, GameId::new(5), 1_700_000_000);
        let sig = sign(&message, &signer);

        let recovered = validate_auth(
            31337,
            GameId::new(5),
            GameId::new(5),
            1_700_000_000,
            &sig,
            1_700_000_010,
        )
        .unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn stale_message_rejected() {
        let signer = PrivateKeySigner::random();
        let ts = 1_700_000_000;
        let message = auth_message(1, GameId::new(5), ts);
        let sig = sign(&message, &signer);

        let err = validate_auth(
            1,
            GameId::new(5),
            GameId::new(5),
            ts,
            &sig,
            ts + AUTH_MESSAGE_MAX_AGE_SECONDS + 1,
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::MessageStale { .. }));
    }

    #[test]
    fn future_timestamp_rejected() {
        let signer = PrivateKeySigner::random();
        let ts = 1_700_000_100;
        let message = auth_message(1, GameId::new(5), ts);
        let sig = sign(&message, &signer);

        let err = validate_auth(1, GameId::new(5), GameId::new(5), ts, &sig, ts - 5).unwrap_err();
        assert!(matches!(err, AuthError::MessageStale { .. }));
    }

    #[test]
    fn wrong_game_rejected_before_recovery() {
        let err = validate_auth(
            1,
            GameId::new(5),
            GameId::new(6),
            1_700_000_000,
            "not-even-hex",
            1_700_000_000,
        )
        .unwrap_err();
        assert_eq!(
            err,
            AuthError::WrongGame {
                expected: 5,
                got: 6
            }
        );
    }

    #[test]
    fn tampered_message_recovers_different_address() {
        let signer = PrivateKeySigner::random();
        let message = auth_message(1, GameId::new(5), 1_700_000_000);
        let sig = sign(&message, &signer);

        let recovered = recover_signer("assassin-checkin:1:5:1700000001", &sig).unwrap();
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn garbage_signature_rejected() {
        assert_eq!(
            recover_signer("msg", "0xzz"),
            Err(AuthError::SignatureInvalid)
        );
        assert_eq!(
            recover_signer("msg", "00"),
            Err(AuthError::SignatureInvalid)
        );
    }
}
