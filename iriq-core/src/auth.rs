//! Authenticators
//!
//! Two ways for a device to obtain a bearer credential:
//!
//! - [`EdgeFunctionAuthenticator`] posts the device identity to the
//!   authentication function and receives a short-lived token. This is the
//!   production path; the backend can refuse devices that are unknown or not
//!   linked to an owner.
//! - [`StaticKeyAuthenticator`] uses the pre-shared API key itself as the
//!   bearer value. Every device shares it and it cannot be revoked per
//!   device, so it is a degraded mode for bench testing and for backends
//!   without the function deployed.
//!
//! Either can leave an entry in the `device_auth_logs` table. The audit
//! write is best-effort and never changes the outcome of the attempt.

use alloc::string::{String, ToString};

use serde::{Deserialize, Serialize};

use crate::backend::authorize;
use crate::constants::network::{
    AUTH_FUNCTION_PATH, DEFAULT_DEVICE_TYPE, REST_PREFIX, TABLE_DEVICE_AUTH_LOGS,
};
use crate::constants::MS_PER_SECOND;
use crate::errors::{SyncError, SyncResult};
use crate::traits::{Authenticator, IssuedToken, Method, Request, Transport};

#[derive(Serialize)]
struct AuthRequest<'a> {
    device_id: &'a str,
    device_type: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Serialize)]
struct AuthLogRow<'a> {
    device_id: &'a str,
    success: bool,
    user_agent: &'a str,
}

/// Identity shared by both authenticators
#[derive(Debug, Clone)]
struct DeviceIdentity {
    device_id: String,
    device_type: String,
    api_key: String,
    audit: bool,
}

impl DeviceIdentity {
    fn record_attempt<T: Transport>(&self, transport: &T, success: bool) {
        if !self.audit {
            return;
        }
        let row = AuthLogRow {
            device_id: &self.device_id,
            success,
            user_agent: &self.device_type,
        };
        let body = match serde_json::to_string(&row) {
            Ok(body) => body,
            Err(e) => {
                log_warn!("could not encode auth log entry: {}", e);
                return;
            }
        };
        let path = alloc::format!("{}/{}", REST_PREFIX, TABLE_DEVICE_AUTH_LOGS);
        let request = authorize(Request::new(Method::Post, path), &self.api_key, &self.api_key)
            .header("Prefer", "return=minimal")
            .body(body);
        match transport.execute(&request) {
            Ok(resp) if resp.is_success() => {}
            Ok(resp) => log_debug!("auth log rejected with HTTP {}", resp.status),
            Err(e) => log_debug!("auth log not delivered: {}", e),
        }
    }
}

/// Token issuance through the device authentication function
pub struct EdgeFunctionAuthenticator<T> {
    transport: T,
    identity: DeviceIdentity,
}

impl<T: Transport> EdgeFunctionAuthenticator<T> {
    /// Authenticator for `device_id`, using `api_key` to reach the function
    pub fn new(transport: T, device_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            identity: DeviceIdentity {
                device_id: device_id.into(),
                device_type: DEFAULT_DEVICE_TYPE.to_string(),
                api_key: api_key.into(),
                audit: false,
            },
        }
    }

    /// Device type announced to the function
    pub fn device_type(mut self, device_type: impl Into<String>) -> Self {
        self.identity.device_type = device_type.into();
        self
    }

    /// Record each attempt in the authentication audit log
    pub fn audit_log(mut self, enabled: bool) -> Self {
        self.identity.audit = enabled;
        self
    }

    fn request_token(&self) -> SyncResult<IssuedToken> {
        let body = serde_json::to_string(&AuthRequest {
            device_id: &self.identity.device_id,
            device_type: &self.identity.device_type,
        })
        .map_err(|e| SyncError::Parse(e.to_string()))?;

        let request = authorize(
            Request::new(Method::Post, AUTH_FUNCTION_PATH),
            &self.identity.api_key,
            &self.identity.api_key,
        )
        .body(body);

        let response = self.transport.execute(&request)?;
        let status = response.status;
        match status {
            200..=299 => {}
            401 | 403 => return Err(SyncError::Auth { status }),
            _ => return Err(SyncError::Backend { status }),
        }

        let parsed: AuthResponse = serde_json::from_str(&response.body)
            .map_err(|e| SyncError::Parse(e.to_string()))?;
        if parsed.token.is_empty() {
            return Err(SyncError::Parse("issuer returned an empty token".into()));
        }
        if let Some(user_id) = &parsed.user_id {
            log_debug!("device linked to owner {}", user_id);
        }

        Ok(IssuedToken {
            token: parsed.token,
            expires_in_ms: parsed.expires_in.map(|secs| secs.saturating_mul(MS_PER_SECOND)),
        })
    }
}

impl<T: Transport> Authenticator for EdgeFunctionAuthenticator<T> {
    fn authenticate(&mut self) -> SyncResult<IssuedToken> {
        let result = self.request_token();
        self.identity.record_attempt(&self.transport, result.is_ok());
        result
    }
}

/// Degraded authentication: the pre-shared key is the bearer credential
pub struct StaticKeyAuthenticator<T> {
    transport: T,
    identity: DeviceIdentity,
}

impl<T: Transport> StaticKeyAuthenticator<T> {
    /// Authenticator that always issues `api_key`
    pub fn new(transport: T, device_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            identity: DeviceIdentity {
                device_id: device_id.into(),
                device_type: DEFAULT_DEVICE_TYPE.to_string(),
                api_key: api_key.into(),
                audit: false,
            },
        }
    }

    /// Record each attempt in the authentication audit log
    pub fn audit_log(mut self, enabled: bool) -> Self {
        self.identity.audit = enabled;
        self
    }
}

impl<T: Transport> Authenticator for StaticKeyAuthenticator<T> {
    fn authenticate(&mut self) -> SyncResult<IssuedToken> {
        if self.identity.api_key.is_empty() {
            self.identity.record_attempt(&self.transport, false);
            return Err(SyncError::Auth { status: 401 });
        }
        self.identity.record_attempt(&self.transport, true);
        Ok(IssuedToken {
            token: self.identity.api_key.clone(),
            expires_in_ms: None,
        })
    }

    fn is_degraded(&self) -> bool {
        true
    }
}
