//! The build hash (spec §4.H "Asset hash"): `sha1(bundle_entry_source)`
//! truncated to its first 8 hex characters, used both as the asset
//! directory name and the public asset prefix.

use crate::transform::content_hash;

pub fn build_hash(bundle_entry_source: &[u8]) -> String {
    content_hash(bundle_entry_source)[..8].to_string()
}

pub fn asset_prefix(hash: &str) -> String {
    format!("assets-{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_eight_hex_characters_and_stable() {
        let hash = build_hash(b"const App = () => null;");
        assert_eq!(hash.len(), 8);
        assert_eq!(hash, build_hash(b"const App = () => null;"));
        assert_ne!(hash, build_hash(b"const App = () => 1;"));
    }

    #[test]
    fn prefix_is_dash_joined_with_assets() {
        assert_eq!(asset_prefix("deadbeef"), "assets-deadbeef");
    }
}
