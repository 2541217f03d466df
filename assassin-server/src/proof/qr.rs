//! Numeric QR payload cipher.
//!
//! A player's QR encodes `gameId * 10_000 + playerNumber`, obfuscated with a
//! multiplicative cipher over a large prime modulus so payloads cannot be
//! forged or enumerated by incrementing. Numeric-only output keeps the QR in
//! the densest encoding mode.
//!
//! The modulus and key are build-time constants; both sides of a scan must
//! run the same build.

use std::sync::OnceLock;

use thiserror::Error;

use crate::types::primitives::{GameId, PlayerNumber};

/// Prime modulus of the cipher group. Largest prime below 10^12, so every
/// ciphertext fits in 12 decimal digits.
const MODULUS: u64 = 999_999_999_989;

/// Multiplicative key. Any unit mod the prime works; fixed at build time.
const KEY: u64 = 472_882_049;

/// Payload packing factor: four decimal digits for the player number.
const NUMBER_BASE: u64 = 10_000;

/// A QR payload failed to decode.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum QrError {
    /// Payload contained non-digit characters or was empty.
    #[error("payload is not numeric")]
    NotNumeric,

    /// Payload value outside the cipher domain.
    #[error("payload outside the valid domain")]
    OutOfDomain,

    /// Decoded player number is zero or beyond the encodable range.
    #[error("decoded player number invalid")]
    InvalidPlayerNumber,
}

/// Decoded QR contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrPayload {
    /// Game the QR belongs to.
    pub game_id: GameId,
    /// The player the QR identifies.
    pub player_number: PlayerNumber,
}

fn mul_mod(a: u64, b: u64) -> u64 {
    // The remainder is below MODULUS, so it fits u64.
    #[allow(clippy::cast_possible_truncation)]
    let result = ((u128::from(a) * u128::from(b)) % u128::from(MODULUS)) as u64;
    result
}

/// Modular inverse of `a` mod [`MODULUS`] by extended Euclid.
///
/// The modulus is prime and `a` is a fixed nonzero constant, so the inverse
/// always exists.
fn mod_inverse(a: u64) -> u64 {
    let (mut old_r, mut r) = (i128::from(a), i128::from(MODULUS));
    let (mut old_s, mut s) = (1_i128, 0_i128);

    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }

    // rem_euclid keeps the value in [0, MODULUS).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let inv = old_s.rem_euclid(i128::from(MODULUS)) as u64;
    inv
}

fn key_inverse() -> u64 {
    static INV: OnceLock<u64> = OnceLock::new();
    *INV.get_or_init(|| mod_inverse(KEY))
}

/// Encode a player's QR payload as a decimal string.
///
/// # Errors
///
/// Returns [`QrError::InvalidPlayerNumber`] for number 0 or ≥ 10 000, and
/// [`QrError::OutOfDomain`] when the packed value would leave the cipher
/// group (game ids beyond ~10^8).
pub fn encode_qr(game_id: GameId, player_number: PlayerNumber) -> Result<String, QrError> {
    let number = u64::from(player_number.value());
    if number == 0 || number >= NUMBER_BASE {
        return Err(QrError::InvalidPlayerNumber);
    }

    let packed = game_id
        .value()
        .checked_mul(NUMBER_BASE)
        .and_then(|v| v.checked_add(number))
        .filter(|v| *v < MODULUS)
        .ok_or(QrError::OutOfDomain)?;

    Ok(mul_mod(packed, KEY).to_string())
}

/// Decode a QR payload string.
///
/// Rejects non-numeric input, ciphertexts outside the group, and decoded
/// player numbers of zero. The caller still checks the number against the
/// game's registered count.
///
/// # Errors
///
/// Returns the specific [`QrError`] for each rejection.
pub fn decode_qr(payload: &str) -> Result<QrPayload, QrError> {
    if payload.is_empty() || !payload.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QrError::NotNumeric);
    }

    let cipher: u64 = payload.parse().map_err(|_| QrError::OutOfDomain)?;
    if cipher == 0 || cipher >= MODULUS {
        return Err(QrError::OutOfDomain);
    }

    let packed = mul_mod(cipher, key_inverse());
    let number = packed % NUMBER_BASE;
    let game = packed / NUMBER_BASE;

    if number == 0 {
        return Err(QrError::InvalidPlayerNumber);
    }

    #[allow(clippy::cast_possible_truncation)] // number < 10_000
    let player_number = PlayerNumber::new(number as u32);
    Ok(QrPayload {
        game_id: GameId::new(game),
        player_number,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
