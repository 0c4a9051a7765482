//! Process directory.
//!
//! Maps a process id to the inner-network endpoint its relay fiber listens
//! on. Consulted only when a session to that process is created lazily.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;

/// One process reachable over the inner network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub id: i32,
    pub inner_endpoint: SocketAddr,
}

impl ProcessEntry {
    pub fn new(id: i32, inner_endpoint: SocketAddr) -> Self {
        Self { id, inner_endpoint }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Process {0} is listed more than once")]
    DuplicateProcess(i32),

    #[error("Process id {0} is not positive")]
    InvalidProcessId(i32),
}

/// Immutable process id to endpoint lookup
#[derive(Debug, Clone, Default)]
pub struct ProcessDirectory {
    endpoints: HashMap<i32, SocketAddr>,
}

impl ProcessDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[ProcessEntry]) -> Result<Self, DirectoryError> {
        let mut directory = Self::new();
        for entry in entries {
            directory.insert(entry.id, entry.inner_endpoint)?;
        }
        Ok(directory)
    }

    /// Add a process; duplicates are rejected
    pub fn insert(&mut self, process: i32, endpoint: SocketAddr) -> Result<(), DirectoryError> {
        if process <= 0 {
            return Err(DirectoryError::InvalidProcessId(process));
        }
        if self.endpoints.insert(process, endpoint).is_some() {
            return Err(DirectoryError::DuplicateProcess(process));
        }
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with_process(mut self, process: i32, endpoint: SocketAddr) -> Result<Self, DirectoryError> {
        self.insert(process, endpoint)?;
        Ok(self)
    }

    pub fn inner_endpoint(&self, process: i32) -> Option<SocketAddr> {
        self.endpoints.get(&process).copied()
    }

    pub fn contains(&self, process: i32) -> bool {
        self.endpoints.contains_key(&process)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn processes(&self) -> impl Iterator<Item = i32> + '_ {
        self.endpoints.keys().copied()
    }
}
