//! Station observation record and its JSON wire codec.

use serde::{Deserialize, Serialize};

/// One observation from one station.
///
/// Field names match the wire format exactly (§3 of the spec this crate
/// implements); `_last_updated` is server-assigned and any value supplied on
/// the wire is overwritten on accept (see `Record::stamp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub time_zone: String,
    #[serde(default)]
    pub local_date_time: String,
    #[serde(default)]
    pub local_date_time_full: String,
    #[serde(default)]
    pub cloud: String,
    #[serde(default)]
    pub wind_dir: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub air_temp: f64,
    #[serde(default)]
    pub apparent_t: f64,
    #[serde(default)]
    pub dewpt: f64,
    #[serde(default)]
    pub press: f64,
    #[serde(default)]
    pub rel_hum: i32,
    #[serde(default)]
    pub wind_spd_kmh: i32,
    #[serde(default)]
    pub wind_spd_kt: i32,
    #[serde(default, rename = "_last_updated")]
    pub last_updated: i64,
}

impl Record {
    /// Overwrite `last_updated` with the server's current wall-clock time,
    /// discarding whatever (if anything) was supplied on the wire.
    pub fn stamp(&mut self, now_unix_secs: i64) {
        self.last_updated = now_unix_secs;
    }

    pub fn is_expired(&self, now_unix_secs: i64, ttl_secs: i64) -> bool {
        now_unix_secs - self.last_updated > ttl_secs
    }
}

/// Errors raised while encoding or decoding the wire JSON.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode a single record from a PUT body.
///
/// Rejected decode produces a malformed-payload error carried to the caller
/// without aborting the pipeline (§4.1).
pub fn decode(bytes: &[u8]) -> Result<Record, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode a list of records as a pretty-printed JSON array (used for the
/// on-disk snapshot and for GET responses).
pub fn encode_list(records: &[Record]) -> Vec<u8> {
    // Pretty-printing never fails for a `Vec<Record>`: every field type
    // round-trips through serde_json without error.
    serde_json::to_vec_pretty(records).expect("record list is always serializable")
}
