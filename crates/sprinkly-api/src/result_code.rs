// ── Command result codes ──
//
// Every command endpoint answers `{"result": N}`. Only `1` is success;
// the rest are kept distinct so callers can tell a bad password from an
// out-of-range value without guessing at recovery.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result code reported by the controller in the `{result: N}` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ResultCode {
    /// 1 -- command accepted.
    Success,
    /// 2 -- missing or wrong password.
    Unauthorized,
    /// 3 -- e.g. new password and confirmation differ.
    Mismatch,
    /// 16 -- required parameters missing.
    DataMissing,
    /// 17 -- value exceeds the acceptable range.
    OutOfRange,
    /// 18 -- value does not match the required format.
    DataFormat,
    /// 19 -- RF code malformed.
    RfCode,
    /// 32 -- page not found or requested file missing.
    PageNotFound,
    /// 48 -- cannot operate on the requested station.
    NotPermitted,
    /// Anything the table above doesn't know about.
    Unknown(i64),
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn as_raw(self) -> i64 {
        i64::from(self)
    }

    /// Short human label used in logs and CLI diagnostics.
    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Unauthorized => "unauthorized",
            Self::Mismatch => "mismatch",
            Self::DataMissing => "data missing",
            Self::OutOfRange => "out of range",
            Self::DataFormat => "data format error",
            Self::RfCode => "RF code error",
            Self::PageNotFound => "page not found",
            Self::NotPermitted => "not permitted",
            Self::Unknown(_) => "unknown result",
        }
    }
}

impl From<i64> for ResultCode {
    fn from(raw: i64) -> Self {
        match raw {
            1 => Self::Success,
            2 => Self::Unauthorized,
            3 => Self::Mismatch,
            16 => Self::DataMissing,
            17 => Self::OutOfRange,
            18 => Self::DataFormat,
            19 => Self::RfCode,
            32 => Self::PageNotFound,
            48 => Self::NotPermitted,
            other => Self::Unknown(other),
        }
    }
}

impl From<ResultCode> for i64 {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::Success => 1,
            ResultCode::Unauthorized => 2,
            ResultCode::Mismatch => 3,
            ResultCode::DataMissing => 16,
            ResultCode::OutOfRange => 17,
            ResultCode::DataFormat => 18,
            ResultCode::RfCode => 19,
            ResultCode::PageNotFound => 32,
            ResultCode::NotPermitted => 48,
            ResultCode::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_raw())
    }
}
