//! # Assets and Connections
//!
//! Resources read their raw data through a [`Connection`]: run a command,
//! read a file. The runtime never inspects a connection beyond that. It
//! only needs to hold one per asset context and close it at teardown.
//!
//! A [`ConnectionHandle`] is one opened use of a connection. Runtimes scoped
//! to different assets get independent handles, which close independently.
//! Handles over the same connection share an open count, and the connection
//! itself is closed with the last of them.

use crate::error::{FrameworkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A target being inspected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Asset {
    /// Canonical identifier.
    pub mrn: String,
    pub name: String,
    pub platform_ids: Vec<String>,
}

impl Asset {
    pub fn new(mrn: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mrn: mrn.into(),
            name: name.into(),
            platform_ids: Vec::new(),
        }
    }

    pub fn with_platform_id(mut self, id: impl Into<String>) -> Self {
        self.platform_ids.push(id.into());
        self
    }

    /// Two assets are the same if they share a canonical identifier or any
    /// platform identifier.
    pub fn is_same(&self, other: &Asset) -> bool {
        if self == other {
            return true;
        }
        if !self.mrn.is_empty() && self.mrn == other.mrn {
            return true;
        }
        let ids: HashSet<&str> = self.platform_ids.iter().map(String::as_str).collect();
        other.platform_ids.iter().any(|p| ids.contains(p.as_str()))
    }
}

/// Output of a command run over a connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

/// Transport to an asset.
pub trait Connection: Send + Sync + fmt::Debug {
    fn id(&self) -> String;

    fn run_command(&self, command: &str) -> Result<CommandOutput>;

    fn read_file(&self, path: &str) -> Result<String>;

    fn close(&self) {}
}

/// Opens connections for assets.
pub trait ConnectionProvider: Send + Sync {
    fn connect(&self, asset: &Asset) -> Result<Arc<dyn Connection>>;
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// One opened use of a [`Connection`].
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    connection: Arc<dyn Connection>,
    closed: AtomicBool,
    /// Open handles over `connection`, this one included.
    open: Arc<AtomicUsize>,
}

impl ConnectionHandle {
    pub fn open(connection: Arc<dyn Connection>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            connection,
            closed: AtomicBool::new(false),
            open: Arc::new(AtomicUsize::new(1)),
        })
    }

    /// Opens a sibling handle over the same connection. Fails if this handle
    /// is already closed.
    pub fn share(&self) -> Result<Arc<Self>> {
        self.ensure_open()?;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Self {
            id: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            connection: self.connection.clone(),
            closed: AtomicBool::new(false),
            open: self.open.clone(),
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Whether this handle wraps exactly `connection`.
    pub fn wraps(&self, connection: &Arc<dyn Connection>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.connection), Arc::as_ptr(connection))
    }

    pub fn run_command(&self, command: &str) -> Result<CommandOutput> {
        self.ensure_open()?;
        self.connection.run_command(command)
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        self.ensure_open()?;
        self.connection.read_file(path)
    }

    /// Closes the handle, and the connection with it if no sibling handle
    /// is still open. Returns `false` if the handle was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let remaining = self.open.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.connection.close();
            info!(handle = self.id, connection = %self.connection.id(), "Connection closed");
        } else {
            debug!(handle = self.id, remaining, "Connection handle released");
        }
        true
    }

    /// Open handles over this handle's connection.
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(FrameworkError::Connection(format!(
                "connection handle {} is closed",
                self.id
            )));
        }
        Ok(())
    }
}

/// The asset context a runtime (and every resource it creates) is bound to.
#[derive(Debug)]
pub struct Scope {
    pub asset: Asset,
    pub handle: Arc<ConnectionHandle>,
}

impl Scope {
    pub fn new(asset: Asset, handle: Arc<ConnectionHandle>) -> Arc<Self> {
        Arc::new(Self { asset, handle })
    }

    /// Whether resources for `asset` over `connection` belong in this scope.
    pub fn matches(&self, asset: &Asset, connection: &Arc<dyn Connection>) -> bool {
        self.handle.wraps(connection) && self.asset.is_same(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_asset_by_mrn_or_platform_id() {
        let host = Asset::new("//assets/host-1", "host-1").with_platform_id("pid-a");
        let same_mrn = Asset::new("//assets/host-1", "renamed");
        let overlapping = Asset::new("//assets/other", "vm")
            .with_platform_id("pid-z")
            .with_platform_id("pid-a");
        let disjoint = Asset::new("//assets/host-2", "host-2").with_platform_id("pid-b");

        assert!(host.is_same(&host));
        assert!(host.is_same(&same_mrn));
        assert!(host.is_same(&overlapping));
        assert!(!host.is_same(&disjoint));
    }

    #[test]
    fn connection_closes_with_its_last_handle() {
        let conn = Arc::new(crate::mock::MockConnection::new("remote"));
        conn.expect_file("/etc/hostname").return_ok("remote\n");
        let first = ConnectionHandle::open(conn.clone());
        let second = first.share().unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(first.open_count(), 2);

        assert!(second.close());
        assert!(!second.close());
        assert!(!first.is_closed());
        assert_eq!(conn.close_count(), 0);
        assert!(second.read_file("/etc/hostname").is_err());
        assert_eq!(first.read_file("/etc/hostname").unwrap(), "remote\n");

        assert!(first.close());
        assert_eq!(conn.close_count(), 1);
        assert!(first.share().is_err());
    }

    #[test]
    fn empty_mrns_do_not_match() {
        let a = Asset::new("", "a").with_platform_id("1");
        let b = Asset::new("", "b").with_platform_id("2");
        assert!(!a.is_same(&b));
    }
}
