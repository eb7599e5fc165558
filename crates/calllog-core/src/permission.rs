//! Capabilities and the authorization collaborator
//!
//! The gate never caches authorization state: every submitted request asks
//! the [`Authorizer`] again, and every prompt is answered through
//! [`crate::RequestGate::on_authorization_result`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Request code used for prompts issued by the request gate
pub const GATE_REQUEST_CODE: i32 = 0;

/// A capability that must be granted before an operation may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    /// Read the device call log
    #[serde(rename = "android.permission.READ_CALL_LOG")]
    ReadCallLog,
    /// Observe telephony state
    #[serde(rename = "android.permission.READ_PHONE_STATE")]
    ReadPhoneState,
    /// Place outbound calls
    #[serde(rename = "android.permission.CALL_PHONE")]
    CallPhone,
    /// Answer or end calls
    #[serde(rename = "android.permission.ANSWER_PHONE_CALLS")]
    AnswerPhoneCalls,
}

impl Permission {
    /// All known permissions
    pub const ALL: [Permission; 4] = [
        Permission::ReadCallLog,
        Permission::ReadPhoneState,
        Permission::CallPhone,
        Permission::AnswerPhoneCalls,
    ];

    /// Platform identifier of the permission
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadCallLog => "android.permission.READ_CALL_LOG",
            Permission::ReadPhoneState => "android.permission.READ_PHONE_STATE",
            Permission::CallPhone => "android.permission.CALL_PHONE",
            Permission::AnswerPhoneCalls => "android.permission.ANSWER_PHONE_CALLS",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = BridgeError;

    /// Accepts the full platform identifier or its short suffix
    /// (`READ_CALL_LOG`), case-insensitively for the suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.strip_prefix("android.permission.").unwrap_or(s);
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str()["android.permission.".len()..].eq_ignore_ascii_case(short))
            .ok_or_else(|| BridgeError::config(format!("unknown permission: {}", s)))
    }
}

/// Outcome for a single permission in an authorization callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantResult {
    Granted,
    Denied,
}

impl GrantResult {
    pub fn is_granted(self) -> bool {
        matches!(self, GrantResult::Granted)
    }
}

impl From<bool> for GrantResult {
    fn from(granted: bool) -> Self {
        if granted {
            GrantResult::Granted
        } else {
            GrantResult::Denied
        }
    }
}

/// Platform authorization service
///
/// `request` only issues the prompt. The answer arrives later through the
/// gate's authorization callback, possibly from inside `request` itself.
pub trait Authorizer: Send + Sync {
    /// Whether the process currently holds `permission`
    fn is_granted(&self, permission: Permission) -> bool;

    /// Show an authorization prompt for `permissions`
    ///
    /// Returns an error when no prompt can be shown at all (for example
    /// when no foreground activity is attached).
    fn request(&self, permissions: &[Permission], request_code: i32) -> BridgeResult<()>;
}

/// Permissions from `required` that are not currently granted, in order
pub fn missing_permissions(authorizer: &dyn Authorizer, required: &[Permission]) -> Vec<Permission> {
    required
        .iter()
        .copied()
        .filter(|p| !authorizer.is_granted(*p))
        .collect()
}
