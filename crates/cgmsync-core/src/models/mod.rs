//! Data models for glucose readings and backend payloads.
//!
//! - `GlucoseReading`, `Backend`: the normalized domain types
//! - `nightscout`: Nightscout `entries.json` wire format
//! - `libre_link_up`: LibreLinkUp login, connections and graph payloads

pub mod libre_link_up;
pub mod nightscout;
pub mod reading;

pub use nightscout::NightscoutEntry;
pub use reading::{Backend, GlucoseReading};
