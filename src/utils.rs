//! Identifier and key helpers

use bech32::Bech32m;
use uuid7::uuid7;

pub const USER_HRP: &str = "user_";
pub const LISTING_HRP: &str = "listing_";
pub const VERIFICATION_HRP: &str = "verif_";
pub const SALE_HRP: &str = "sale_";
pub const SHIPMENT_HRP: &str = "ship_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Key for records addressed by a pair of ids, scannable by the first one.
pub fn pair_key(owner: &str, member: &str) -> String {
    format!("{owner}/{member}")
}

/// Content-derived id for records that may exist at most once per pair.
pub fn pair_digest(a: &str, b: &str) -> String {
    let key = pair_key(a, b).into_bytes();
    sha256::digest(&key)
}

/// Trimmed text, or `None` when nothing is left.
pub fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
