//! Fleet-wide bounded reboot semaphore.
//!
//! This library implements a named, capacity-N semaphore on top of a flat
//! key-value backend that only offers get, set, compare-and-swap, and a
//! long-poll watch. There is no native lock, lease, or owner concept in the
//! backend; everything is built from those four primitives:
//!
//! - **Spinlock mutex**: one `<group>/mutex` key holding `"0"` or `"1"`,
//!   taken with CAS and waited on with a revision-indexed watch.
//! - **Holder document**: one `<group>/data` key holding a JSON document
//!   `{"max": N, "holders": [...]}`, always replaced whole.
//!
//! The [`KvStore`] trait abstracts the backend; [`EtcdClient`] speaks the
//! etcd v2 HTTP surface and [`MemoryStore`] is an in-process fake with the
//! same observable semantics, used by tests and local development.

pub mod etcd;
pub mod holders;
pub mod memory;
pub mod semaphore;
pub mod store;

pub use etcd::EtcdClient;
pub use holders::GroupDoc;
pub use memory::MemoryStore;
pub use semaphore::{DistributedLock, LockError, DEFAULT_GROUP, DEFAULT_ROOT};
pub use store::{KvError, KvNode, KvStore};
