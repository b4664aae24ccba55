//! # c32check
//!
//! Stacks addresses are a version character followed by the Crockford base32 encoding of
//! `hash160 ++ checksum`, where the checksum is the first four bytes of
//! `sha256(sha256(version ++ hash160))`. Standard addresses additionally carry an `S` prefix.
use sha2::{Digest, Sha256};
use thiserror::Error;

const C32_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Length of the hash carried by standard principals.
pub const HASH160_LENGTH: usize = 20;

const CHECKSUM_LENGTH: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid c32 character: {0:?}")]
    InvalidCharacter(char),

    #[error("Invalid address length: {0}")]
    InvalidLength(usize),

    #[error("Address must start with 'S': {0}")]
    MissingPrefix(String),

    #[error("Invalid address version: {0}")]
    InvalidVersion(u8),

    #[error("Checksum mismatch for {0}")]
    ChecksumMismatch(String),

    #[error("Invalid contract name: {0:?}")]
    InvalidContractName(String),
}

/// Maps a (normalized) c32 character to its 5 bit value.
fn c32_digit(c: char) -> Result<u8, AddressError> {
    let normalized = match c.to_ascii_uppercase() {
        'O' => '0',
        'I' | 'L' => '1',
        other => other,
    };
    C32_ALPHABET
        .iter()
        .position(|&a| a as char == normalized)
        .map(|pos| pos as u8)
        .ok_or(AddressError::InvalidCharacter(c))
}

/// Encodes bytes into a c32 string.
///
/// Leading zero bytes are preserved as leading `0` characters, matching the reference encoder.
pub fn c32_encode(input: &[u8]) -> String {
    let mut result = Vec::with_capacity(input.len() * 8 / 5 + 1);
    let mut carry: u16 = 0;
    let mut carry_bits: u8 = 0;

    for &byte in input.iter().rev() {
        carry |= (byte as u16) << carry_bits;
        carry_bits += 8;
        while carry_bits >= 5 {
            result.push(C32_ALPHABET[(carry & 0x1f) as usize]);
            carry >>= 5;
            carry_bits -= 5;
        }
    }
    if carry_bits > 0 {
        result.push(C32_ALPHABET[(carry & 0x1f) as usize]);
    }

    while result.last() == Some(&C32_ALPHABET[0]) {
        result.pop();
    }
    for _ in input
        .iter()
        .take_while(|&&b| b == 0)
    {
        result.push(C32_ALPHABET[0]);
    }

    result.reverse();
    result
        .into_iter()
        .map(char::from)
        .collect()
}

/// Decodes a c32 string into bytes.
pub fn c32_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    let digits = input
        .chars()
        .map(c32_digit)
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = Vec::with_capacity(input.len() * 5 / 8 + 1);
    let mut carry: u16 = 0;
    let mut carry_bits: u8 = 0;
    for &digit in digits.iter().rev() {
        carry |= (digit as u16) << carry_bits;
        carry_bits += 5;
        if carry_bits >= 8 {
            result.push((carry & 0xff) as u8);
            carry >>= 8;
            carry_bits -= 8;
        }
    }
    if carry_bits > 0 {
        result.push(carry as u8);
    }

    while result.last() == Some(&0) {
        result.pop();
    }
    for _ in digits
        .iter()
        .take_while(|&&d| d == 0)
    {
        result.push(0);
    }

    result.reverse();
    Ok(result)
}

fn checksum(version: u8, data: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update([version]);
    hasher.update(data);
    let first = hasher.finalize();
    let second = Sha256::digest(first);

    let mut out = [0u8; CHECKSUM_LENGTH];
    out.copy_from_slice(&second[..CHECKSUM_LENGTH]);
    out
}

/// Encodes `data` with a version character and a trailing checksum.
pub fn c32check_encode(version: u8, data: &[u8]) -> Result<String, AddressError> {
    if version as usize >= C32_ALPHABET.len() {
        return Err(AddressError::InvalidVersion(version));
    }
    let mut payload = data.to_vec();
    payload.extend_from_slice(&checksum(version, data));
    Ok(format!("{}{}", C32_ALPHABET[version as usize] as char, c32_encode(&payload)))
}

/// Decodes a c32check string into its version and payload, verifying the checksum.
pub fn c32check_decode(input: &str) -> Result<(u8, Vec<u8>), AddressError> {
    let mut chars = input.chars();
    let version_char = chars
        .next()
        .ok_or(AddressError::InvalidLength(0))?;
    let version = c32_digit(version_char)?;

    let decoded = c32_decode(chars.as_str())?;
    if decoded.len() < CHECKSUM_LENGTH {
        return Err(AddressError::InvalidLength(input.len()));
    }
    let (data, expected) = decoded.split_at(decoded.len() - CHECKSUM_LENGTH);
    if checksum(version, data) != expected {
        return Err(AddressError::ChecksumMismatch(input.to_string()));
    }
    Ok((version, data.to_vec()))
}

/// Encodes a standard Stacks address, e.g. `SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7`.
pub fn c32_address(version: u8, hash160: &[u8; HASH160_LENGTH]) -> Result<String, AddressError> {
    Ok(format!("S{}", c32check_encode(version, hash160)?))
}

/// Decodes a standard Stacks address into its version and hash160.
pub fn c32_address_decode(address: &str) -> Result<(u8, [u8; HASH160_LENGTH]), AddressError> {
    // 'S' + version + at least the checksum
    if address.len() <= 5 {
        return Err(AddressError::InvalidLength(address.len()));
    }
    let rest = address
        .strip_prefix('S')
        .or_else(|| address.strip_prefix('s'))
        .ok_or_else(|| AddressError::MissingPrefix(address.to_string()))?;

    let (version, data) = c32check_decode(rest)?;
    let hash160: [u8; HASH160_LENGTH] = data
        .try_into()
        .map_err(|data: Vec<u8>| AddressError::InvalidLength(data.len()))?;
    Ok((version, hash160))
}
