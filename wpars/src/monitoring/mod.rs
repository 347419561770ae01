//! Real-time monitoring of supplicant events.
//!
//! The control channel reports events only while it is open; the monitor
//! here watches an interface continuously through `wpa_cli`.

pub(crate) mod monitor;
