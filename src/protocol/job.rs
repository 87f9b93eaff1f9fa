//! External job identifier.

use std::fmt;
use std::str::FromStr;

use crate::error::TunnelError;

/// Length of every external job identifier.
pub const JOB_ID_LEN: usize = 11;

/// A validated job identifier: 11 characters from `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for JobId {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid_chars = s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if s.len() != JOB_ID_LEN || !valid_chars {
            return Err(TunnelError::InvalidInput(format!(
                "job id must be {} characters of [A-Za-z0-9_-]",
                JOB_ID_LEN
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
