mod remote;
mod syncer;

pub use remote::{HttpRemoteStore, NoopRemoteStore, RemoteStatsStore};
pub use syncer::RemoteSync;

#[cfg(test)]
pub(crate) use remote::memory::MemoryRemoteStore;
