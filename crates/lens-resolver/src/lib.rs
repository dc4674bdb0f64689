//! Object resolution for Lens.
//!
//! Turns a [`ContentIdentifier`](lens_types::ContentIdentifier) into a
//! verified, decoded [`ResolvedObject`] by fetching its block from a
//! [`ContentStore`]. Graph codecs (dag-pb, dag-json, dag-cbor) expose their
//! outbound links; [`ObjectResolver::resolve_deep`] and
//! [`ObjectResolver::assemble`] follow them under a depth bound.
//!
//! # Key Types
//!
//! - [`ContentStore`]: block source capability
//! - [`InMemoryContentStore`] / [`FsContentStore`]: bundled block stores
//! - [`ObjectResolver`]: fetches, verifies and decodes objects
//! - [`ResolvedObject`] / [`Link`] / [`Node`]: a decoded block

pub mod dagpb;
pub mod error;
pub mod fs;
pub mod ipld;
pub mod memory;
pub mod object;
pub mod resolver;
pub mod store;
pub mod unixfs;

pub use error::{BlockStoreError, CodecError, FetchError, ResolveError, ResolveResult};
pub use fs::FsContentStore;
pub use memory::InMemoryContentStore;
pub use object::{GraphEntry, Link, Node, ResolvedGraph, ResolvedObject};
pub use resolver::{ObjectResolver, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_DEPTH};
pub use store::ContentStore;
pub use unixfs::{build_directory, build_file, UnixFsDag};
