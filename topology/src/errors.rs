// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error types for the topology and its selector.
//!
//! Callers that speak numeric status codes get them through `code()`: `0` is success, anything
//! else is a failure (negated errno values).

/// Numeric code for success.
pub const SUCCESS: i32 = 0;
/// Numeric code for malformed topology input (`-EINVAL`).
pub const ERR_MALFORMED_JSON: i32 = -22;
/// Numeric code for "no device to select" (`-ENODEV`).
pub const ERR_DEVICE_NOT_FOUND: i32 = -19;

/// The reasons why a topology may be rejected
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// The input is not JSON, or not shaped like an affinity matrix.
    #[error("malformed topology: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

impl TopologyError {
    /// The numeric code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            TopologyError::MalformedJson(_) => ERR_MALFORMED_JSON,
        }
    }
}

/// Reasons why no device could be selected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectError {
    /// The locality (named here) has no candidate device.
    #[error("no device available for locality '{0}'")]
    NoDevice(String),
}

impl SelectError {
    /// The numeric code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            SelectError::NoDevice(_) => ERR_DEVICE_NOT_FOUND,
        }
    }
}

/// Result-like type for topology updates
pub type TopologyResult = Result<(), TopologyError>;

/// Collapse a [`TopologyResult`] into a numeric status code.
#[must_use]
pub fn result_code(result: &TopologyResult) -> i32 {
    match result {
        Ok(()) => SUCCESS,
        Err(e) => e.code(),
    }
}
