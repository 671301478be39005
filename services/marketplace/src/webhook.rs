//! Payment provider webhook verification and payload parsing

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;

use crate::store::MemberLookup;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the hex HMAC-SHA512 of the raw body
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Event type that grants paid membership
pub const CHARGE_SUCCESS: &str = "charge.success";

/// Check `signature_hex` against the HMAC-SHA512 of `body` in constant time
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Hex HMAC-SHA512 of `body`, as the provider computes it
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub event: String,
    #[serde(default)]
    pub data: PaymentData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentData {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub metadata: Option<PaymentMetadata>,
    #[serde(default)]
    pub customer: Option<PaymentCustomer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentMetadata {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentCustomer {
    #[serde(default)]
    pub email: Option<String>,
}

impl PaymentEvent {
    pub fn is_charge_success(&self) -> bool {
        self.event == CHARGE_SUCCESS
    }

    /// Who paid: the user id from the metadata, else the customer email
    pub fn payer(&self) -> Option<MemberLookup> {
        let user_id = self
            .data
            .metadata
            .as_ref()
            .and_then(|m| m.user_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty());
        if let Some(id) = user_id {
            return Some(MemberLookup::Id(id.to_string()));
        }

        self.data
            .customer
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(|email| MemberLookup::Email(email.to_lowercase()))
    }
}
