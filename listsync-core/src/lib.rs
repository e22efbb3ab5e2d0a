#![doc = "listsync-core: core logic library for listsync."]

//! This crate holds the service-independent parts of listsync: the contracts a
//! notes source and a reminders sink must satisfy, title normalization, the sync
//! pass itself, the in-memory list snapshot served over HTTP and the periodic runner.
//! Network clients live in the `listsync` crate.

pub mod contract;
pub mod normalize;
pub mod schedule;
pub mod snapshot;
pub mod synchronise;
