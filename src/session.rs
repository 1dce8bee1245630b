//! Session construction
//!
//! A session canonicalises the caller's input (hostname, service class,
//! optional credentials and server hints), runs the guessers in a fixed
//! order, and owns the resulting ordered selection list. The input is
//! immutable once `create` returns; only per-selection fields are still
//! settled by background resolvers.
//!
//! # Guesser order
//!
//! 1. User-selection overrides from the preference store
//! 2. The Kerberos cluster (caches, wellknown LKDC, classic realms,
//!    classic LKDC)
//! 3. NTLM, only for SMB-class services without client certificates
//!
//! Callers treat index 0 of the selection list as the preferred
//! candidate.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::errors::{NahError, Result};
use crate::guess_kerberos::guess_kerberos;
use crate::guess_ntlm::guess_ntlm;
use crate::mechanism::{ClientNameType, Mechanism, ServerNameType};
use crate::providers::{ClientCertificate, KrbContext, Providers, X509Context};
use crate::secure_types::SecureString;
use crate::selection::Selection;
use crate::user_selections::add_user_selections;

/// Service class of an AFP file server.
pub const SERVICE_AFP: &str = "afpserver";
/// Service class of an SMB/CIFS file server.
pub const SERVICE_CIFS: &str = "cifs";
/// Generic host service class (also SMB-capable).
pub const SERVICE_HOST: &str = "host";
/// Screen-sharing service class.
pub const SERVICE_VNC: &str = "vnc";

/// Mechanism hints advertised by the server, keyed by mechanism OID,
/// plus the optional SPNEGO hostname hint.
#[derive(Debug, Clone, Default)]
pub struct ServerHints {
    mechs: HashMap<String, Vec<u8>>,
    hostname: Option<String>,
}

impl ServerHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mech(mut self, oid: &str, value: &[u8]) -> Self {
        self.mechs.insert(oid.to_string(), value.to_vec());
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    pub fn contains(&self, oid: &str) -> bool {
        self.mechs.contains_key(oid)
    }

    pub fn value(&self, oid: &str) -> Option<&[u8]> {
        self.mechs.get(oid).map(Vec::as_slice)
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }
}

/// Client certificate input: a single certificate, a single identity,
/// or a sequence of either; normalised to a list at session creation.
pub enum CertificateInput {
    Certificate(Arc<dyn ClientCertificate>),
    Identity(Arc<dyn ClientCertificate>),
    Sequence(Vec<Arc<dyn ClientCertificate>>),
}

/// Optional inputs to session creation.
#[derive(Default)]
pub struct SessionInfo {
    pub username: Option<String>,
    pub password: Option<SecureString>,
    pub certificates: Option<CertificateInput>,
    pub server_hints: Option<ServerHints>,
}

/// Immutable session state shared with every selection and background
/// task. The Kerberos and X.509 contexts are installed by the Kerberos
/// guesser and reused by acquisition.
pub(crate) struct SessionCore {
    pub(crate) hostname: String,
    pub(crate) service: String,
    pub(crate) username: String,
    /// Short name extracted from `user@realm` / `domain\user` input;
    /// present only when the caller supplied the username.
    pub(crate) specific_name: Option<String>,
    pub(crate) password: Option<SecureString>,
    pub(crate) certificates: Vec<Arc<dyn ClientCertificate>>,
    pub(crate) hints: Option<ServerHints>,
    pub(crate) providers: Providers,
    pub(crate) krb: OnceLock<Arc<dyn KrbContext>>,
    pub(crate) hx: OnceLock<Arc<dyn X509Context>>,
}

impl SessionCore {
    pub(crate) fn is_smb(&self) -> bool {
        self.service == SERVICE_CIFS || self.service == SERVICE_HOST
    }

    pub(crate) fn hints_present(&self) -> bool {
        self.hints.is_some()
    }

    pub(crate) fn hints_contain(&self, oid: &str) -> bool {
        self.hints.as_ref().is_some_and(|h| h.contains(oid))
    }

    pub(crate) fn hint_value(&self, oid: &str) -> Option<&[u8]> {
        self.hints.as_ref().and_then(|h| h.value(oid))
    }

    pub(crate) fn spnego_server_name(&self) -> Option<&str> {
        self.hints.as_ref().and_then(|h| h.hostname())
    }

    pub(crate) fn krb_context(&self) -> Option<Arc<dyn KrbContext>> {
        self.krb.get().cloned()
    }

    pub(crate) fn x509_context(&self) -> Option<Arc<dyn X509Context>> {
        self.hx.get().cloned()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(hostname: &str, service: &str, providers: Providers) -> Arc<Self> {
        Arc::new(SessionCore {
            hostname: hostname.to_string(),
            service: service.to_string(),
            username: "testuser".to_string(),
            specific_name: None,
            password: None,
            certificates: Vec::new(),
            hints: None,
            providers,
            krb: OnceLock::new(),
            hx: OnceLock::new(),
        })
    }
}

/// Flags controlling one `SelectionSet::add` call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AddFlags {
    /// Wrap the selection in SPNEGO.
    pub(crate) spnego: bool,
    /// Bypass the specific-name matching filter.
    pub(crate) force: bool,
}

impl AddFlags {
    pub(crate) fn forced(self) -> Self {
        Self {
            force: true,
            ..self
        }
    }
}

/// Append-only ordered list of selections, de-duplicated by
/// (mechanism, client, server, server-name-type).
pub(crate) struct SelectionSet {
    items: Vec<Arc<Selection>>,
}

impl SelectionSet {
    pub(crate) fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Adds a selection unless the specific-name filter rejects it.
    /// Returns the (possibly pre-existing) record and whether it was a
    /// duplicate.
    pub(crate) fn add(
        &mut self,
        core: &Arc<SessionCore>,
        client: &str,
        client_type: Option<ClientNameType>,
        server: Option<&str>,
        server_type: Option<ServerNameType>,
        mech: Mechanism,
        flags: AddFlags,
    ) -> Option<(Arc<Selection>, bool)> {
        let client_type = client_type.unwrap_or_default();
        let server_type = server_type.unwrap_or_default();

        let matching = flags.force
            || core
                .specific_name
                .as_deref()
                .map_or(true, |specific| client.starts_with(specific));

        debug!(
            mech = %mech,
            client,
            server = server.unwrap_or("(unresolved)"),
            spnego = flags.spnego,
            matching,
            "add selection"
        );

        // A non-matching client is not an error, just not a candidate.
        if !matching {
            return None;
        }

        for sel in &self.items {
            if sel.matches(mech, client, server, server_type) {
                return Some((sel.clone(), true));
            }
        }

        let sel = Selection::new(
            core.clone(),
            mech,
            flags.spnego,
            client.to_string(),
            client_type,
            server.map(str::to_string),
            server_type,
        );
        self.items.push(sel.clone());
        Some((sel, false))
    }

    pub(crate) fn into_items(self) -> Vec<Arc<Selection>> {
        self.items
    }
}

/// A negotiation session: canonicalised input plus the ordered list of
/// candidate selections.
pub struct Session {
    core: Arc<SessionCore>,
    selections: Vec<Arc<Selection>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Builds the candidate set for `hostname`/`service`.
    ///
    /// Runs every guesser and returns as soon as the list is complete;
    /// selections whose server principal needs a network lookup are
    /// still resolving in the background and settle independently.
    /// Must be called within a tokio runtime.
    pub fn create(
        hostname: &str,
        service: &str,
        info: Option<SessionInfo>,
        providers: Providers,
    ) -> Result<Arc<Session>> {
        info!(hostname, service, "creating negotiation session");

        // Undo any browser-service decoration first.
        let canonical = deconstruct_service_name(hostname).unwrap_or_else(|| hostname.to_string());
        let canonical = canonical.trim_matches('.').to_string();
        debug!(hostname = %canonical, "canonical hostname");

        let (username, specific_name) = resolve_username(info.as_ref())?;
        let source = if specific_name.is_some() { "given" } else { "generated" };
        debug!(username = %username, source, "resolved username");

        let mut password = None;
        let mut certificates = Vec::new();
        let mut hints = None;
        if let Some(info) = info {
            password = info.password;
            if password.is_some() {
                debug!("password supplied");
            }
            if let Some(h) = &info.server_hints {
                if let Some(name) = h.hostname() {
                    debug!(server_name = %name, "SPNEGO hints name");
                }
            }
            hints = info.server_hints;
            if let Some(input) = info.certificates {
                certificates = match input {
                    CertificateInput::Certificate(c) | CertificateInput::Identity(c) => vec![c],
                    CertificateInput::Sequence(v) => v,
                };
            }
        }

        let core = Arc::new(SessionCore {
            hostname: canonical,
            service: service.to_string(),
            username,
            specific_name,
            password,
            certificates,
            hints,
            providers,
            krb: OnceLock::new(),
            hx: OnceLock::new(),
        });

        // Here starts the guessing game.
        let mut set = SelectionSet::new();
        add_user_selections(&core, &mut set);
        guess_kerberos(&core, &mut set);
        // Only do NTLM for SMB, and never when the caller supplied
        // certificates.
        if core.certificates.is_empty() && core.is_smb() {
            guess_ntlm(&core, &mut set);
        }

        let selections = set.into_items();
        if selections.is_empty() {
            return Err(NahError::NoMechanism(format!(
                "no candidates for {}/{}",
                core.service, core.hostname
            )));
        }

        Ok(Arc::new(Session { core, selections }))
    }

    /// The ordered candidate list; index 0 is the preferred selection.
    pub fn selections(&self) -> &[Arc<Selection>] {
        &self.selections
    }

    pub fn hostname(&self) -> &str {
        &self.core.hostname
    }

    pub fn service(&self) -> &str {
        &self.core.service
    }

    pub fn username(&self) -> &str {
        &self.core.username
    }

    /// Cancels every selection: pending and future waiters observe
    /// failure, and in-flight acquisition results are discarded.
    pub fn cancel(&self) {
        info!(hostname = %self.core.hostname, "canceling session");
        for sel in &self.selections {
            sel.latch.cancel();
        }
    }
}

/// Rebuilds `<instance>.<domain>` from a DNS-SD style
/// `<instance>._<service>._tcp.<domain>` name; `None` when the name
/// carries no service decoration.
fn deconstruct_service_name(hostname: &str) -> Option<String> {
    for marker in ["._tcp.", "._udp."] {
        if let Some(pos) = hostname.find(marker) {
            let head = &hostname[..pos];
            let domain = &hostname[pos + marker.len()..];
            if let Some(dot) = head.find("._") {
                let instance = &head[..dot];
                if !instance.is_empty() && !domain.is_empty() {
                    return Some(format!("{}.{}", instance, domain));
                }
            }
        }
    }
    None
}

/// The short form of a username: the prefix before the first `@`, the
/// suffix after the first `\`, or the whole name.
pub(crate) fn specific_name_of(username: &str) -> String {
    if let Some((prefix, _)) = username.split_once('@') {
        prefix.to_string()
    } else if let Some((_, suffix)) = username.split_once('\\') {
        suffix.to_string()
    } else {
        username.to_string()
    }
}

fn resolve_username(info: Option<&SessionInfo>) -> Result<(String, Option<String>)> {
    if let Some(username) = info.and_then(|i| i.username.clone()) {
        let specific = specific_name_of(&username);
        debug!(specific = %specific, "specific name");
        return Ok((username, Some(specific)));
    }
    os_login_name()
        .map(|name| (name, None))
        .ok_or_else(|| NahError::NoUsername("not supplied and no OS login name".to_string()))
}

#[cfg(windows)]
fn os_login_name() -> Option<String> {
    std::env::var("USERNAME").ok().filter(|u| !u.is_empty())
}

#[cfg(not(windows))]
fn os_login_name() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
        .filter(|u| !u.is_empty())
}
