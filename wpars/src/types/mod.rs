//! Type definitions and constants.
//!
//! This module contains wpa_supplicant control protocol constants.

pub(crate) mod constants;
