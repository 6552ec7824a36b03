// BulkDL - Bulk Media Downloader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Content hashing
//!
//! Files are read in 1 MiB chunks on a blocking worker so large videos do
//! not stall the runtime. Every requested algorithm is fed from the same
//! read pass.

use std::fs::File;
use std::hash::Hasher as _;
use std::io::Read;
use std::path::{Path, PathBuf};

use md5::Md5;
use sha2::{Digest, Sha256};
use twox_hash::xxh3::{Hash128, HasherExt};

use crate::error::{DownloaderError, Result};
use crate::storage::HashType;

/// Read size for hashing
pub const CHUNK_SIZE: usize = 1024 * 1024;

enum State {
    Xxh128(Hash128),
    Md5(Md5),
    Sha256(Sha256),
}

impl State {
    fn new(hash_type: HashType) -> Self {
        match hash_type {
            HashType::Xxh128 => State::Xxh128(Hash128::with_seed(0)),
            HashType::Md5 => State::Md5(Md5::new()),
            HashType::Sha256 => State::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            State::Xxh128(h) => h.write(data),
            State::Md5(h) => h.update(data),
            State::Sha256(h) => h.update(data),
        }
    }

    fn finish(self) -> String {
        match self {
            State::Xxh128(h) => format!("{:032x}", h.finish_ext()),
            State::Md5(h) => hex::encode(h.finalize()),
            State::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hash `path` with every algorithm in `types`, in one pass
pub fn hash_file_sync(path: &Path, types: &[HashType]) -> Result<Vec<(HashType, String)>> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DownloaderError::FileNotFound(path.display().to_string())
        } else {
            DownloaderError::FileIoError(format!("Failed to open {}: {}", path.display(), e))
        }
    })?;

    let mut states: Vec<(HashType, State)> = types.iter().map(|t| (*t, State::new(*t))).collect();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        for (_, state) in states.iter_mut() {
            state.update(&buffer[..read]);
        }
    }

    Ok(states
        .into_iter()
        .map(|(hash_type, state)| (hash_type, state.finish()))
        .collect())
}

/// [`hash_file_sync`] on the blocking pool
pub async fn hash_file(path: &Path, types: &[HashType]) -> Result<Vec<(HashType, String)>> {
    let path: PathBuf = path.to_path_buf();
    let types = types.to_vec();
    tokio::task::spawn_blocking(move || hash_file_sync(&path, &types))
        .await
        .map_err(|e| DownloaderError::internal(format!("hash task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_known_digests() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        let hashes = hash_file_sync(&path, &[HashType::Md5, HashType::Sha256]).unwrap();
        assert_eq!(hashes[0], (HashType::Md5, "900150983cd24fb0d6963f7d28e17f72".to_string()));
        assert_eq!(
            hashes[1].1,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_xxh128_shape_and_stability() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let c = dir.path().join("c.bin");
        // spans several chunks
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&a, &data).unwrap();
        std::fs::write(&b, &data).unwrap();
        std::fs::write(&c, b"something else").unwrap();

        let ha = &hash_file_sync(&a, &[HashType::Xxh128]).unwrap()[0].1;
        let hb = &hash_file_sync(&b, &[HashType::Xxh128]).unwrap()[0].1;
        let hc = &hash_file_sync(&c, &[HashType::Xxh128]).unwrap()[0].1;
        assert_eq!(ha.len(), 32);
        assert!(ha.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
        assert_eq!(ha, hb);
        assert_ne!(ha, hc);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = hash_file(&dir.path().join("gone.jpg"), &[HashType::Xxh128]).await.unwrap_err();
        assert!(matches!(err, DownloaderError::FileNotFound(_)));
    }
}
