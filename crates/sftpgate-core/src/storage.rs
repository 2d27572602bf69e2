// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Storage seam used once a policy has resolved a client path

use async_trait::async_trait;
use sftpgate_proto::FileAttributes;
use std::fmt;
use std::io::{self, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// An open file descriptor held by a read or write handle
#[async_trait]
pub trait FileHandle: Send + Sync + fmt::Debug {
    /// Read up to `len` bytes at `offset`; fewer bytes only at end of file
    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Flush outstanding writes; the descriptor is released when dropped
    async fn close(&mut self) -> io::Result<()>;
}

/// Opens the real paths a policy hands back
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Open for reading, returning the handle and the file size at open time
    async fn open_read(&self, path: &str) -> io::Result<(Box<dyn FileHandle>, u64)>;

    /// Open for writing, creating or truncating the file
    async fn open_write(&self, path: &str) -> io::Result<Box<dyn FileHandle>>;

    async fn metadata(&self, path: &str) -> io::Result<FileAttributes>;
}

/// Local filesystem store
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileStore;

#[async_trait]
impl FileStore for LocalFileStore {
    async fn open_read(&self, path: &str) -> io::Result<(Box<dyn FileHandle>, u64)> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok((Box::new(LocalFile::new(file, path)), size))
    }

    async fn open_write(&self, path: &str) -> io::Result<Box<dyn FileHandle>> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        Ok(Box::new(LocalFile::new(file, path)))
    }

    async fn metadata(&self, path: &str) -> io::Result<FileAttributes> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(attributes_from_metadata(&meta))
    }
}

/// Translate host metadata into protocol attributes
pub fn attributes_from_metadata(meta: &std::fs::Metadata) -> FileAttributes {
    FileAttributes {
        size: Some(meta.len()),
        uid: Some(meta.uid()),
        gid: Some(meta.gid()),
        permissions: Some(meta.mode()),
        atime: Some(clamp_time(meta.atime())),
        mtime: Some(clamp_time(meta.mtime())),
    }
}

fn clamp_time(secs: i64) -> u32 {
    u32::try_from(secs.max(0)).unwrap_or(u32::MAX)
}

#[derive(Debug)]
pub struct LocalFile {
    file: tokio::fs::File,
    path: PathBuf,
}

impl LocalFile {
    fn new(file: tokio::fs::File, path: &str) -> Self {
        Self {
            file,
            path: PathBuf::from(path),
        }
    }
}

#[async_trait]
impl FileHandle for LocalFile {
    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::with_capacity(len);
        (&mut self.file).take(len as u64).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.file.flush().await.map_err(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "flush on close failed");
            e
        })
    }
}
