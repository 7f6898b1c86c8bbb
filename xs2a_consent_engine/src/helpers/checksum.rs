use serde::Serialize;
use sha2::{Digest, Sha512};

use crate::db_types::ConsentStatus;

/// SHA-512 digest of the JSON representation of `value`.
pub fn calculate_checksum<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Sha512::digest(&bytes).to_vec())
}

/// A digest becomes write-once as soon as the consent is valid (or finalised) and a digest has been stored.
pub fn is_checksum_updatable(status: ConsentStatus, existing: Option<&[u8]>) -> bool {
    existing.is_none() || (!status.is_finalised() && status != ConsentStatus::Valid)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::{AccountAccess, AccountReference};

    #[test]
    fn digest_is_stable_and_sensitive() {
        let a = AccountAccess { accounts: vec![AccountReference::with_resource_id("acc-1")], ..Default::default() };
        let mut b = a.clone();
        assert_eq!(calculate_checksum(&a).unwrap(), calculate_checksum(&b).unwrap());
        assert_eq!(calculate_checksum(&a).unwrap().len(), 64);
        b.balances.push(AccountReference::with_resource_id("acc-1"));
        assert_ne!(calculate_checksum(&a).unwrap(), calculate_checksum(&b).unwrap());
    }

    #[test]
    fn write_once_after_valid() {
        let digest = [1u8; 64];
        assert!(is_checksum_updatable(ConsentStatus::Received, Some(&digest)));
        assert!(is_checksum_updatable(ConsentStatus::PartiallyAuthorised, Some(&digest)));
        assert!(!is_checksum_updatable(ConsentStatus::Valid, Some(&digest)));
        assert!(!is_checksum_updatable(ConsentStatus::Expired, Some(&digest)));
        assert!(is_checksum_updatable(ConsentStatus::Valid, None));
        assert!(is_checksum_updatable(ConsentStatus::Rejected, None));
    }
}
