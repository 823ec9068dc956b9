use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Builds a unique payment reference such as `LSN_9F1C...`.
pub fn generate_reference(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple()).to_uppercase()
}

/// Ten-digit account number derived from a reference, stable across calls.
pub fn derive_account_number(reference: &str) -> String {
    let digest = Sha256::digest(reference.as_bytes());
    let mut value: u64 = 0;
    for byte in digest.iter().take(8) {
        value = (value << 8) | u64::from(*byte);
    }
    // Leading 9 keeps the number ten digits long.
    format!("9{:09}", value % 1_000_000_000)
}

/// Short code the buyer quotes in a transfer narration.
pub fn payment_code(reference: &str) -> String {
    let digest = Sha256::digest(reference.as_bytes());
    hex::encode(&digest[..4]).to_uppercase()
}

pub fn is_valid_nigerian_phone(phone: &str) -> bool {
    let phone = phone.replace(' ', "").replace('-', "");
    let phone = phone.strip_prefix('+').unwrap_or(&phone);
    if phone.len() == 11 {
        phone.starts_with('0') && phone.chars().all(|c| c.is_ascii_digit())
    } else if phone.len() == 13 && phone.starts_with("234") {
        phone.chars().all(|c| c.is_ascii_digit())
    } else {
        false
    }
}

/// Normalizes to the local `0XXXXXXXXXX` form. Callers validate first.
pub fn normalize_nigerian_phone(phone: &str) -> String {
    let phone = phone.replace(' ', "").replace('-', "");
    let phone = phone.strip_prefix('+').unwrap_or(&phone);
    match phone.strip_prefix("234") {
        Some(rest) if phone.len() == 13 => format!("0{}", rest),
        _ => phone.to_string(),
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
