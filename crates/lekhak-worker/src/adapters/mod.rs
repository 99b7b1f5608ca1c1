//! Collaborator adapters available to the worker binary.
//!
//! Production inference and storage are external services; the `stub`
//! profile keeps the binary runnable end to end on a development machine
//! without cloud credentials.

pub mod stub;
