//! Loose-object store on the local filesystem.
//!
//! Layout: `{root}/objects/{hex[0..2]}/{hex[2..]}` (two-level sharding).
//! Each file holds one zstd frame whose plaintext is the type header followed
//! by the content: `"<kind> <len>\0" ++ data`. Files are written atomically
//! (temp → rename) and never rewritten once present.

use cmf_core::config::StoreConfig;
use cmf_core::{HashAlgo, ObjectId, ObjectKind};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{check_algo, ObjectStore, ObjectStream};

/// Longest type header accepted when decoding (`"manifest " + u64 + NUL` fits)
const MAX_HEADER_LEN: usize = 32;

/// Upper bound on the buffer reserved up front from a header's declared size
const MAX_PREALLOC: u64 = 64 * 1024;

type ObjectDecoder = zstd::stream::read::Decoder<'static, BufReader<File>>;

pub struct FsStore {
    root: PathBuf,
    algo: HashAlgo,
    level: i32,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, algo: HashAlgo, level: i32) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        debug!(root = %root.display(), %algo, level, "opened object store");
        Ok(Self { root, algo, level })
    }

    /// Open the store described by the `[store]` config section.
    pub fn from_config(cfg: &StoreConfig) -> Result<Self, StoreError> {
        Self::open(expand_tilde(&cfg.path), cfg.hash_algo, cfg.compression_level)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the file path for an object id.
    fn path_for(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        let (shard, rest) = hex.split_at(2);
        self.root.join("objects").join(shard).join(rest)
    }

    /// Open an object file and decode its type header, leaving the decoder
    /// positioned at the first content byte.
    fn open_decoder(&self, id: &ObjectId) -> Result<(ObjectKind, u64, ObjectDecoder), StoreError> {
        check_algo(self.algo, id)?;
        let path = self.path_for(id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound(*id)),
            Err(e) => return Err(e.into()),
        };

        let mut decoder = zstd::stream::read::Decoder::new(file)?;
        let (kind, size) = read_header(&mut decoder).map_err(|reason| StoreError::Corrupt {
            id: *id,
            reason,
        })?;
        Ok((kind, size, decoder))
    }
}

impl ObjectStore for FsStore {
    fn algo(&self) -> HashAlgo {
        self.algo
    }

    fn type_and_size(&self, id: &ObjectId) -> Result<(ObjectKind, u64), StoreError> {
        let (kind, size, _) = self.open_decoder(id)?;
        Ok((kind, size))
    }

    fn read_object(&self, id: &ObjectId) -> Result<(ObjectKind, Vec<u8>), StoreError> {
        let (kind, size, decoder) = self.open_decoder(id)?;
        let mut data = Vec::with_capacity(size.min(MAX_PREALLOC) as usize);
        decoder.take(size).read_to_end(&mut data)?;
        if data.len() as u64 != size {
            return Err(StoreError::Corrupt {
                id: *id,
                reason: format!("header declares {size} bytes, found {}", data.len()),
            });
        }
        Ok((kind, data))
    }

    fn write_object(&self, data: &[u8], kind: ObjectKind) -> Result<ObjectId, StoreError> {
        let id = self.hash_object(data, kind);
        let path = self.path_for(&id);
        if path.exists() {
            debug!(%id, "dedup: object already stored");
            return Ok(id);
        }

        let parent = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "object path has no parent"))?;
        fs::create_dir_all(parent)?;

        // Unique temp file per writer: parallel writers of one id must not collide
        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        let mut encoder = zstd::stream::write::Encoder::new(tmp, self.level)?;
        encoder.write_all(cmf_chunks::object_header(kind, data.len() as u64).as_bytes())?;
        encoder.write_all(data)?;
        let tmp = encoder.finish()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(%id, %kind, size = data.len(), "stored object");
        Ok(id)
    }

    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        check_algo(self.algo, id)?;
        Ok(self.path_for(id).exists())
    }

    fn open_stream(&self, id: &ObjectId) -> Result<ObjectStream, StoreError> {
        let (kind, size, decoder) = self.open_decoder(id)?;
        Ok(ObjectStream::new(kind, size, decoder.take(size)))
    }
}

/// Decode `"<kind> <len>\0"` from the front of a decompressed object.
fn read_header(reader: &mut impl Read) -> Result<(ObjectKind, u64), String> {
    let mut header = Vec::with_capacity(MAX_HEADER_LEN);
    let mut byte = [0u8; 1];
    loop {
        let n = reader
            .read(&mut byte)
            .map_err(|e| format!("reading header: {e}"))?;
        if n == 0 {
            return Err("truncated header".into());
        }
        if byte[0] == 0 {
            break;
        }
        if header.len() == MAX_HEADER_LEN {
            return Err("header too long".into());
        }
        header.push(byte[0]);
    }

    let header = std::str::from_utf8(&header).map_err(|_| "header is not UTF-8".to_string())?;
    let (kind, len) = header
        .split_once(' ')
        .ok_or_else(|| format!("malformed header {header:?}"))?;
    let kind = kind.parse::<ObjectKind>().map_err(|e| e.to_string())?;
    let len = len
        .parse::<u64>()
        .map_err(|_| format!("bad length in header {header:?}"))?;
    Ok((kind, len))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    expand_tilde_in(path, Path::new(&home))
}

fn expand_tilde_in(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn temp_store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path(), HashAlgo::Blake3, 3).unwrap();
        (dir, store)
    }

    #[test]
    fn put_and_get() {
        let (_dir, store) = temp_store();
        let id = store.write_object(b"hello world", ObjectKind::Blob).unwrap();
        let (kind, data) = store.read_object(&id).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn sharded_layout() {
        let (dir, store) = temp_store();
        let id = store.write_object(b"layout", ObjectKind::Manifest).unwrap();
        let hex = id.to_hex();
        let expected = dir.path().join("objects").join(&hex[..2]).join(&hex[2..]);
        assert!(expected.is_file());
    }

    #[test]
    fn ids_agree_with_memory_store() {
        let (_dir, store) = temp_store();
        let mem = crate::MemoryStore::new(HashAlgo::Blake3);
        let a = store.write_object(b"same bytes", ObjectKind::Blob).unwrap();
        let b = mem.write_object(b"same bytes", ObjectKind::Blob).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn miss_is_not_found() {
        let (_dir, store) = temp_store();
        let id = store.hash_object(b"absent", ObjectKind::Blob);
        assert!(!store.contains(&id).unwrap());
        assert!(matches!(store.type_and_size(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn stream_matches_content() {
        let (_dir, store) = temp_store();
        let data: Vec<u8> = (0u8..=255).cycle().take(300_000).collect();
        let id = store.write_object(&data, ObjectKind::Blob).unwrap();

        let mut stream = store.open_stream(&id).unwrap();
        assert_eq!(stream.size(), data.len() as u64);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn empty_object() {
        let (_dir, store) = temp_store();
        let id = store.write_object(b"", ObjectKind::Blob).unwrap();
        assert_eq!(store.type_and_size(&id).unwrap(), (ObjectKind::Blob, 0));
        assert!(store.read_object(&id).unwrap().1.is_empty());
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let (_dir, store) = temp_store();
        let id = store.hash_object(b"planted", ObjectKind::Blob);
        let path = store.path_for(&id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let bogus = zstd::encode_all(&b"no header here"[..], 1).unwrap();
        fs::write(&path, bogus).unwrap();

        assert!(matches!(store.read_object(&id), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn oversized_declared_length_is_corrupt() {
        let (_dir, store) = temp_store();
        let id = store.hash_object(b"abc", ObjectKind::Blob);
        let path = store.path_for(&id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let bogus = zstd::encode_all(&b"blob 18446744073709551615\0abc"[..], 1).unwrap();
        fs::write(&path, bogus).unwrap();

        match store.read_object(&id) {
            Err(StoreError::Corrupt { reason, .. }) => assert!(reason.contains("found 3")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn header_parsing() {
        let mut ok = &b"manifest 42\0rest"[..];
        assert_eq!(read_header(&mut ok).unwrap(), (ObjectKind::Manifest, 42));
        assert_eq!(ok, b"rest");

        assert!(read_header(&mut &b"tree 1\0"[..]).is_err());
        assert!(read_header(&mut &b"blob x\0"[..]).is_err());
        assert!(read_header(&mut &b"blob 3"[..]).is_err());
    }

    #[test]
    fn tilde_expansion() {
        let home = Path::new("/home/tester");
        assert_eq!(
            expand_tilde_in(Path::new("~/store"), home),
            PathBuf::from("/home/tester/store")
        );
        assert_eq!(expand_tilde_in(Path::new("/abs"), home), PathBuf::from("/abs"));
        assert_eq!(expand_tilde_in(Path::new("~user/x"), home), PathBuf::from("~user/x"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn stream_and_whole_read_agree(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let (_dir, store) = temp_store();
            let id = store.write_object(&data, ObjectKind::Blob).unwrap();
            let mut streamed = Vec::new();
            store.open_stream(&id).unwrap().read_to_end(&mut streamed).unwrap();
            prop_assert_eq!(&streamed, &store.read_object(&id).unwrap().1);
            prop_assert_eq!(streamed, data);
        }
    }
}
