//! An in-memory key/value store with ordered-set support, served over a
//! length-prefixed binary protocol by a single-threaded, readiness-driven
//! event loop.
//!
//! The store itself (`keyspace`, `sorted_set`, `tree`, `hash_index`,
//! `arena`) has no knowledge of sockets or the wire format; `protocol`,
//! `dispatcher`, `connection`, `reactor` and `event_loop` layer the server
//! on top of it. `src/bin/server.rs` is the thin binary entry point.

pub mod arena;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod entry;
pub mod event_loop;
pub mod hash_index;
pub mod hashing;
pub mod keyspace;
pub mod protocol;
pub mod reactor;
pub mod sorted_set;
pub mod tree;
