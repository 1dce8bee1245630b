//! Output projection
//!
//! Read-side views of a settled selection: single-key lookups and the
//! full authentication-info map handed to GSSD-style consumers. Both
//! wait for server resolution and return nothing on cancellation.

use serde::Serialize;

use crate::mechanism::{ClientNameType, ServerNameType, SPNEGO_NAME};
use crate::selection::Selection;

/// Keys understood by [`Selection::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKey {
    ClientPrincipal,
    ServerPrincipal,
    /// The outer mechanism: SPNEGO when the wrap flag is set.
    Mechanism,
    /// The raw mechanism regardless of wrapping.
    InnerMechanism,
    CredentialType,
    InferredLabel,
    HaveCredential,
    UseSpnego,
    UserPrintable,
}

/// A value returned by [`Selection::info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    String(String),
    Bool(bool),
}

impl InfoValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            InfoValue::String(s) => Some(s),
            InfoValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            InfoValue::Bool(b) => Some(*b),
            InfoValue::String(_) => None,
        }
    }
}

/// The authentication-info map for a resolved selection.
#[derive(Debug, Clone, Serialize)]
pub struct AuthInfo {
    pub mechanism: String,
    pub credential_type: String,
    pub client_name_type: ClientNameType,
    pub client_name_type_gssd: i32,
    pub server_name_type: ServerNameType,
    pub server_name_type_gssd: i32,
    pub client_principal: String,
    pub server_principal: String,
    pub inferred_label: Option<String>,
    pub use_spnego: bool,
}

impl Selection {
    /// Looks up one projection key. Waits for server resolution;
    /// returns `None` on cancellation or when the key has no value yet.
    pub async fn info(&self, key: InfoKey) -> Option<InfoValue> {
        if !self.latch.wait().await {
            return None;
        }
        let mech = self.mechanism();
        let fields = self.lock_fields();
        match key {
            InfoKey::HaveCredential => Some(InfoValue::Bool(fields.ccache.is_some())),
            InfoKey::UserPrintable | InfoKey::ClientPrincipal => {
                Some(InfoValue::String(fields.client.clone()))
            }
            InfoKey::ServerPrincipal => fields.server.clone().map(InfoValue::String),
            InfoKey::Mechanism => {
                // If not told otherwise, everything goes in SPNEGO
                // wrappings.
                let name = if self.spnego() {
                    SPNEGO_NAME
                } else {
                    mech.name()
                };
                Some(InfoValue::String(name.to_string()))
            }
            InfoKey::InnerMechanism | InfoKey::CredentialType => {
                Some(InfoValue::String(mech.name().to_string()))
            }
            InfoKey::UseSpnego => Some(InfoValue::Bool(self.spnego())),
            InfoKey::InferredLabel => fields.label.clone().map(InfoValue::String),
        }
    }

    /// The full authentication-info map. `None` on cancellation or
    /// while the server principal is still unresolved.
    pub async fn auth_info(&self) -> Option<AuthInfo> {
        if !self.latch.wait().await {
            return None;
        }
        let mech = self.mechanism();
        let fields = self.lock_fields();
        let server_principal = fields.server.clone()?;
        let mechanism = if self.spnego() {
            SPNEGO_NAME.to_string()
        } else {
            mech.name().to_string()
        };
        Some(AuthInfo {
            mechanism,
            credential_type: mech.name().to_string(),
            client_name_type: fields.client_type,
            client_name_type_gssd: fields.client_type.gssd_code(),
            server_name_type: fields.server_type,
            server_name_type_gssd: fields.server_type.gssd_code(),
            client_principal: fields.client.clone(),
            server_principal,
            inferred_label: fields.label.clone(),
            use_spnego: self.spnego(),
        })
    }
}
