//! Stable method identity.

use sha2::{Digest, Sha256};

use crate::model::MethodId;

/// Compute the stable id for a method.
///
/// The id is the lowercase hex SHA-256 digest of the UTF-8 bytes of
/// `assembly|type|signature`. Every component that resolves methods (the
/// coverage normalizer, the source resolver) must use this exact function
/// so the same method gets the same id regardless of which side computed
/// it.
#[must_use]
pub fn method_id(assembly_name: &str, type_full_name: &str, method_signature: &str) -> MethodId {
    let mut hasher = Sha256::new();
    hasher.update(assembly_name.as_bytes());
    hasher.update(b"|");
    hasher.update(type_full_name.as_bytes());
    hasher.update(b"|");
    hasher.update(method_signature.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
