//! The shared table coupling connections, display names, and occupancy.
//!
//! Three fields move together: the connection-to-name map, the set of
//! names in use, and the occupancy count (everyone admitted, named or
//! not). A single mutex guards all three so the membership test and the
//! insert of a registration run as one atomic step — the first bind wins a
//! simultaneous claim on the same name. The lock is never held across
//! I/O: fan-out callers take a [`Roster::snapshot`] and send with the
//! lock released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::network::connection::{ConnectionHandle, ConnectionId};

/// Error returned by [`Roster::bind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// Another connection already registered this name.
    #[error("name {name:?} is already registered")]
    NameTaken { name: String },
    /// This connection already holds a binding.
    #[error("connection is already bound to {name:?}")]
    AlreadyBound { name: String },
}

#[derive(Debug)]
struct BoundPeer {
    name: String,
    handle: Arc<ConnectionHandle>,
}

#[derive(Debug, Default)]
struct RosterInner {
    bound: HashMap<ConnectionId, BoundPeer>,
    names: HashSet<String>,
    occupancy: usize,
}

/// Process-wide record of who is connected and under which name.
///
/// Occupancy counts every admitted connection, including those still
/// choosing a name, so it may exceed the number of bound entries but
/// never undercount them. Every occupancy change is also published on a
/// watch channel, which is what [`Roster::drained`] listens to during
/// shutdown.
#[derive(Debug)]
pub struct Roster {
    capacity: usize,
    inner: Mutex<RosterInner>,
    occupancy_tx: watch::Sender<usize>,
}

impl Roster {
    /// Creates an empty roster admitting at most `capacity` connections.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(RosterInner::default()),
            occupancy_tx: watch::channel(0).0,
        }
    }

    /// Admits one connection if there is room.
    ///
    /// The capacity check and the occupancy increment run under one lock
    /// acquisition, so concurrent admissions cannot overshoot the limit.
    #[must_use]
    pub fn try_admit(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.occupancy >= self.capacity {
            false
        } else {
            inner.occupancy += 1;
            self.occupancy_tx.send_replace(inner.occupancy);
            true
        }
    }

    /// Returns one admission credit for a connection that never bound.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.occupancy > 0, "release without a matching admit");
        inner.occupancy = inner.occupancy.saturating_sub(1);
        self.occupancy_tx.send_replace(inner.occupancy);
    }

    /// Whether `name` is currently registered.
    #[must_use]
    pub fn name_taken(&self, name: &str) -> bool {
        self.inner.lock().names.contains(name)
    }

    /// Registers `name` for the connection.
    ///
    /// Does not change occupancy: the connection was already admitted.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::NameTaken`] if another connection claimed the
    /// name first, or [`BindError::AlreadyBound`] if this connection
    /// already holds a binding.
    pub fn bind(
        &self,
        id: ConnectionId,
        name: &str,
        handle: Arc<ConnectionHandle>,
    ) -> Result<(), BindError> {
        let mut inner = self.inner.lock();
        if let Some(peer) = inner.bound.get(&id) {
            return Err(BindError::AlreadyBound {
                name: peer.name.clone(),
            });
        }
        if inner.names.contains(name) {
            return Err(BindError::NameTaken {
                name: name.to_owned(),
            });
        }
        inner.names.insert(name.to_owned());
        inner.bound.insert(
            id,
            BoundPeer {
                name: name.to_owned(),
                handle,
            },
        );
        Ok(())
    }

    /// Removes the connection's binding, frees its name, and returns the
    /// admission credit. Returns the freed name, or `None` if the
    /// connection was not bound.
    pub fn unbind(&self, id: ConnectionId) -> Option<String> {
        let mut inner = self.inner.lock();
        let peer = inner.bound.remove(&id)?;
        inner.names.remove(&peer.name);
        inner.occupancy = inner.occupancy.saturating_sub(1);
        self.occupancy_tx.send_replace(inner.occupancy);
        Some(peer.name)
    }

    /// Resolves once every admitted connection has left, or when `limit`
    /// passes first. Returns whether the roster actually emptied.
    ///
    /// Event-driven: admissions and departures publish the occupancy
    /// count, so shutdown waits on the bookkeeping the sessions already
    /// do instead of sampling a counter on a timer.
    pub async fn drained(&self, limit: Duration) -> bool {
        let mut occupancy = self.occupancy_tx.subscribe();
        let emptied =
            tokio::time::timeout(limit, occupancy.wait_for(|&count| count == 0)).await;
        matches!(emptied, Ok(Ok(_)))
    }

    /// Point-in-time view of every bound connection's handle.
    ///
    /// The returned `Vec` owns its `Arc`s, so callers iterate and send
    /// without holding the roster lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.inner
            .lock()
            .bound
            .values()
            .map(|peer| Arc::clone(&peer.handle))
            .collect()
    }

    /// Number of admitted connections, named or not.
    #[must_use]
    pub fn occupancy(&self) -> usize {
        self.inner.lock().occupancy
    }

    /// The admission limit this roster was created with.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bound (named) connections.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.inner.lock().bound.len()
    }

    /// The registered names, sorted for stable log output.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().names.iter().cloned().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u64) -> Arc<ConnectionHandle> {
        let (handle, rx) = ConnectionHandle::channel(ConnectionId(id), 8);
        // Receivers are irrelevant to roster bookkeeping; leak them so the
        // handles stay connected for the duration of the test.
        std::mem::forget(rx);
        Arc::new(handle)
    }

    #[test]
    fn admits_until_capacity() {
        let roster = Roster::new(2);
        assert!(roster.try_admit());
        assert!(roster.try_admit());
        assert!(!roster.try_admit());
        assert_eq!(roster.occupancy(), 2);
    }

    #[test]
    fn admits_again_after_release() {
        let roster = Roster::new(1);
        assert!(roster.try_admit());
        assert!(!roster.try_admit());
        roster.release();
        assert!(roster.try_admit());
        assert_eq!(roster.occupancy(), 1);
    }

    #[test]
    fn one_below_capacity_admits_at_capacity_rejects() {
        let roster = Roster::new(50);
        for _ in 0..49 {
            assert!(roster.try_admit());
        }
        assert_eq!(roster.occupancy(), 49);
        assert!(roster.try_admit());
        assert!(!roster.try_admit());
        assert_eq!(roster.occupancy(), 50);
    }

    #[test]
    fn bind_registers_name_without_touching_occupancy() {
        let roster = Roster::new(4);
        assert!(roster.try_admit());
        roster.bind(ConnectionId(1), "alice", handle(1)).unwrap();

        assert!(roster.name_taken("alice"));
        assert!(!roster.name_taken("bob"));
        assert_eq!(roster.occupancy(), 1);
        assert_eq!(roster.bound_count(), 1);
    }

    #[test]
    fn first_bind_wins_the_name() {
        let roster = Roster::new(4);
        assert!(roster.try_admit());
        assert!(roster.try_admit());
        roster.bind(ConnectionId(1), "alice", handle(1)).unwrap();

        let err = roster
            .bind(ConnectionId(2), "alice", handle(2))
            .unwrap_err();
        assert_eq!(
            err,
            BindError::NameTaken {
                name: "alice".to_owned()
            }
        );
        assert_eq!(roster.bound_count(), 1);
    }

    #[test]
    fn rebinding_the_same_connection_is_rejected() {
        let roster = Roster::new(4);
        assert!(roster.try_admit());
        roster.bind(ConnectionId(1), "alice", handle(1)).unwrap();

        let err = roster
            .bind(ConnectionId(1), "alice2", handle(1))
            .unwrap_err();
        assert_eq!(
            err,
            BindError::AlreadyBound {
                name: "alice".to_owned()
            }
        );
    }

    #[test]
    fn unbind_frees_the_name_and_the_admission() {
        let roster = Roster::new(4);
        assert!(roster.try_admit());
        roster.bind(ConnectionId(1), "alice", handle(1)).unwrap();

        assert_eq!(roster.unbind(ConnectionId(1)), Some("alice".to_owned()));
        assert!(!roster.name_taken("alice"));
        assert_eq!(roster.occupancy(), 0);
        assert_eq!(roster.bound_count(), 0);

        // The name is immediately reusable.
        assert!(roster.try_admit());
        roster.bind(ConnectionId(2), "alice", handle(2)).unwrap();
        assert!(roster.name_taken("alice"));
    }

    #[test]
    fn unbind_of_unbound_connection_is_none() {
        let roster = Roster::new(4);
        assert!(roster.try_admit());
        assert_eq!(roster.unbind(ConnectionId(7)), None);
        // Occupancy untouched: the caller still owes a release.
        assert_eq!(roster.occupancy(), 1);
    }

    #[test]
    fn occupancy_never_undercounts_bound_entries() {
        let roster = Roster::new(8);
        for i in 1..=3 {
            assert!(roster.try_admit());
            if i < 3 {
                roster
                    .bind(ConnectionId(i), &format!("user-{i}"), handle(i))
                    .unwrap();
            }
        }
        assert_eq!(roster.bound_count(), 2);
        assert_eq!(roster.occupancy(), 3);
        assert!(roster.occupancy() >= roster.bound_count());
    }

    #[test]
    fn snapshot_returns_owned_handles_for_bound_peers_only() {
        let roster = Roster::new(8);
        assert!(roster.try_admit());
        assert!(roster.try_admit());
        roster.bind(ConnectionId(1), "alice", handle(1)).unwrap();

        let snapshot = roster.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, ConnectionId(1));
    }

    #[test]
    fn names_are_sorted() {
        let roster = Roster::new(8);
        for (i, name) in [(1, "zoe"), (2, "ana"), (3, "mia")] {
            assert!(roster.try_admit());
            roster.bind(ConnectionId(i), name, handle(i)).unwrap();
        }
        assert_eq!(roster.names(), vec!["ana", "mia", "zoe"]);
    }

    #[tokio::test]
    async fn drained_resolves_at_once_when_nobody_is_admitted() {
        let roster = Roster::new(4);
        assert!(roster.drained(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn drained_waits_for_the_last_departure() {
        let roster = Arc::new(Roster::new(4));
        assert!(roster.try_admit());
        assert!(roster.try_admit());
        roster.release();

        let leaver = {
            let roster = Arc::clone(&roster);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                roster.release();
            })
        };

        assert!(roster.drained(Duration::from_secs(2)).await);
        assert_eq!(roster.occupancy(), 0);
        leaver.await.unwrap();
    }

    #[tokio::test]
    async fn drained_gives_up_while_someone_stays() {
        let roster = Roster::new(4);
        assert!(roster.try_admit());
        assert!(!roster.drained(Duration::from_millis(20)).await);
        assert_eq!(roster.occupancy(), 1);
    }
}
