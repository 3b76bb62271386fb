//! Endpoint prefix of an uplink Send payload
//!
//! A gateway forwarding Send requests of several end devices names the device
//! in the base name of the SenML pack, e.g. `"bn": "sensor-12/3303/0/"`.
//! The prefix is that first path segment, when it is not a plain object id.
//!
//! Both SenML-JSON and SenML-CBOR apply that digit rule, so a base name such as
//! `"/3303/0/"` yields no prefix rather than `"3303"`.

use ciborium::Value as CborValue;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::request::ContentFormat;

/// SenML-CBOR label of the base name
const SENML_CBOR_BASE_NAME: i128 = -2;

#[derive(Debug, Deserialize)]
struct SenmlJsonRecord {
    #[serde(default)]
    bn: Option<String>,
}

/// Extract the endpoint prefix of a SenML pack
///
/// Returns `Ok(None)` when the pack carries no prefix, or for a content format
/// that is not SenML. A payload that can not be decoded is an error.
pub fn extract_prefix(payload: &[u8], format: ContentFormat) -> Result<Option<String>> {
    let base_name = match format {
        ContentFormat::SenmlJson => json_base_name(payload)?,
        ContentFormat::SenmlCbor => cbor_base_name(payload)?,
        _ => return Ok(None),
    };
    Ok(base_name.as_deref().and_then(prefix_of))
}

fn json_base_name(payload: &[u8]) -> Result<Option<String>> {
    let records: Vec<SenmlJsonRecord> = serde_json::from_slice(payload)?;
    Ok(records.into_iter().next().and_then(|record| record.bn))
}

fn cbor_base_name(payload: &[u8]) -> Result<Option<String>> {
    let value: CborValue =
        ciborium::from_reader(payload).map_err(|e| Error::Cbor(format!("{}", e)))?;

    let records = value
        .as_array()
        .ok_or_else(|| Error::Cbor("SenML pack is not an array".into()))?;
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let record = first
        .as_map()
        .ok_or_else(|| Error::Cbor("SenML record is not a map".into()))?;

    Ok(record
        .iter()
        .find(|(key, _)| key.as_integer().map(i128::from) == Some(SENML_CBOR_BASE_NAME))
        .and_then(|(_, value)| value.as_text())
        .map(str::to_string))
}

fn prefix_of(base_name: &str) -> Option<String> {
    let trimmed = base_name.trim();
    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let segment = trimmed.split('/').next()?;
    segment
        .chars()
        .any(|c| !c.is_ascii_digit())
        .then(|| segment.to_string())
}
