//! Core internal logic.
//!
//! The control channel client and its wire parsers, the status and scan
//! queries, the network configuration transaction, and the access point
//! supervisor.

pub(crate) mod access_point;
pub(crate) mod control;
pub(crate) mod parse;
pub(crate) mod scan;
pub(crate) mod transaction;
