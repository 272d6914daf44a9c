//! Building manifests from an ordered chunk list.

use cmf_core::config::ManifestConfig;
use cmf_core::{HashAlgo, ObjectId, ObjectKind};
use cmf_store::ObjectStore;
use tracing::debug;

use crate::codec::{self, FormatVersion, CURRENT_VERSION};
use crate::error::{FormatError, ManifestError};

/// Produces manifest bytes in one format version.
///
/// [`write`](Self::write) and [`hash_only`](Self::hash_only) share
/// [`encode`](Self::encode), so a dry run names exactly the object a real
/// write would store.
#[derive(Clone, Copy)]
pub struct ManifestBuilder {
    format: &'static dyn FormatVersion,
}

impl ManifestBuilder {
    /// Builder for an explicit format version. Unknown versions are refused.
    pub fn new(version: u32) -> Result<Self, FormatError> {
        Ok(Self {
            format: codec::resolve(version)?,
        })
    }

    pub fn from_config(cfg: &ManifestConfig) -> Result<Self, FormatError> {
        Self::new(cfg.version)
    }

    pub fn version(&self) -> u32 {
        self.format.version()
    }

    /// Serialize a manifest listing `hashes` in order. The chunk count is
    /// the list length; `total_size` is recorded as given.
    pub fn encode(&self, total_size: u64, hashes: &[ObjectId]) -> Vec<u8> {
        self.format.build(total_size, hashes.len() as u64, hashes)
    }

    /// Persist the manifest through `store`, returning its id.
    pub fn write<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        total_size: u64,
        hashes: &[ObjectId],
    ) -> Result<ObjectId, ManifestError> {
        check_algo(store.algo(), hashes)?;
        let bytes = self.encode(total_size, hashes);
        let id = store.write_object(&bytes, ObjectKind::Manifest)?;
        debug!(%id, total_size, chunks = hashes.len(), "wrote manifest");
        Ok(id)
    }

    /// The id [`write`](Self::write) would return, without storing anything.
    pub fn hash_only(
        &self,
        algo: HashAlgo,
        total_size: u64,
        hashes: &[ObjectId],
    ) -> Result<ObjectId, ManifestError> {
        check_algo(algo, hashes)?;
        let bytes = self.encode(total_size, hashes);
        Ok(cmf_chunks::hash_object(algo, ObjectKind::Manifest, &bytes))
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self {
            format: codec::format_for(CURRENT_VERSION).unwrap_or(&codec::V1),
        }
    }
}

impl std::fmt::Debug for ManifestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestBuilder")
            .field("version", &self.version())
            .finish()
    }
}

/// Write a current-version manifest through `store`.
pub fn write_manifest<S: ObjectStore + ?Sized>(
    store: &S,
    total_size: u64,
    hashes: &[ObjectId],
) -> Result<ObjectId, ManifestError> {
    ManifestBuilder::default().write(store, total_size, hashes)
}

/// Id of a current-version manifest, without storing it.
pub fn hash_manifest(
    algo: HashAlgo,
    total_size: u64,
    hashes: &[ObjectId],
) -> Result<ObjectId, ManifestError> {
    ManifestBuilder::default().hash_only(algo, total_size, hashes)
}

/// Hash lines have one width per manifest; an id from another algorithm
/// could never be read back.
fn check_algo(algo: HashAlgo, hashes: &[ObjectId]) -> Result<(), ManifestError> {
    match hashes.iter().find(|h| h.algo() != algo) {
        Some(h) => Err(ManifestError::MixedAlgo {
            id: *h,
            expected: algo,
            found: h.algo(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ManifestStream;
    use cmf_store::MemoryStore;

    #[test]
    fn write_and_hash_only_agree() {
        let store = MemoryStore::default();
        let a = store.write_object(b"first", ObjectKind::Blob).unwrap();
        let b = store.write_object(b"second", ObjectKind::Blob).unwrap();

        let predicted = hash_manifest(store.algo(), 11, &[a, b]).unwrap();
        assert!(!store.contains(&predicted).unwrap());

        let written = write_manifest(&store, 11, &[a, b]).unwrap();
        assert_eq!(predicted, written);
        assert_eq!(
            store.type_and_size(&written).unwrap().0,
            ObjectKind::Manifest
        );
    }

    #[test]
    fn written_manifest_streams_back() {
        let store = MemoryStore::default();
        let a = store.write_object(b"first", ObjectKind::Blob).unwrap();
        let b = store.write_object(b"second", ObjectKind::Blob).unwrap();
        let id = write_manifest(&store, 11, &[a, b]).unwrap();
        let data = ManifestStream::open(&store, id).unwrap().read_to_vec().unwrap();
        assert_eq!(data, b"firstsecond");
    }

    #[test]
    fn version_selection() {
        assert_eq!(ManifestBuilder::new(1).unwrap().version(), 1);
        assert_eq!(ManifestBuilder::default().version(), CURRENT_VERSION);
        assert!(matches!(
            ManifestBuilder::new(2),
            Err(FormatError::UnsupportedVersion { found: 2, .. })
        ));
        assert!(matches!(
            ManifestBuilder::new(0),
            Err(FormatError::InvalidVersion(_))
        ));

        let cfg = ManifestConfig {
            version: 5,
            ..Default::default()
        };
        assert!(ManifestBuilder::from_config(&cfg).is_err());
    }

    #[test]
    fn encode_counts_hashes() {
        let store = MemoryStore::default();
        let a = store.hash_object(b"x", ObjectKind::Blob);
        let text = String::from_utf8(ManifestBuilder::default().encode(1, &[a, a, a])).unwrap();
        assert!(text.starts_with("1\n1\n3\n"));
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn mixed_algorithms_refused() {
        let store = MemoryStore::new(HashAlgo::Blake3);
        let sha = cmf_chunks::hash_object(HashAlgo::Sha256, ObjectKind::Blob, b"x");
        assert!(matches!(
            write_manifest(&store, 1, &[sha]),
            Err(ManifestError::MixedAlgo { .. })
        ));
        assert!(matches!(
            hash_manifest(HashAlgo::Blake3, 1, &[sha]),
            Err(ManifestError::MixedAlgo { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn empty_manifest() {
        let store = MemoryStore::default();
        let id = write_manifest(&store, 0, &[]).unwrap();
        assert_eq!(store.read_object(&id).unwrap().1, b"1\n0\n0\n");
    }
}
