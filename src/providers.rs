//! Provider interfaces
//!
//! The negotiation core never talks to Heimdal, GSS, the keychain, or
//! the preference store directly; it consumes the trait seams defined
//! here. A platform crate implements them over the real libraries; the
//! tests drive the full pipeline through the mock implementations at
//! the bottom of this module.
//!
//! Handle lifetimes follow ordinary ownership: contexts, caches,
//! principals and credentials are released by `Drop`, caches before the
//! context that produced them.

#[cfg(test)]
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::secure_types::GssIdentity;

/// Cache-config key holding the hostname an LKDC cache was minted for.
pub const CONFIG_LKDC_HOSTNAME: &str = "lkdc-hostname";
/// Cache-config / credential-label key for the human-readable name.
pub const CONFIG_FRIENDLY_NAME: &str = "FriendlyName";
/// Marker stamped on every cache and credential this crate creates;
/// reference counting refuses to touch credentials without it.
pub const NAH_CREATED: &str = "nah-created";

/// Error reported by any provider, carrying the provider's own numeric
/// status code.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub code: i32,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for ProviderError {}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Flags for principal parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseFlags {
    /// Parse as an enterprise name (chosen when the client string
    /// contains two `@`).
    pub enterprise: bool,
}

/// Options for an initial-credential exchange, the moral equivalent of
/// an init-creds opt block.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitCredsOptions {
    pub canonicalize: bool,
    /// PKINIT pre-authentication will be configured on the exchange.
    pub use_pkinit: bool,
}

/// A client certificate handed in by the caller. The core only needs
/// the encoded bytes (for fingerprinting and store lookups); everything
/// else goes back through the store that owns it.
pub trait ClientCertificate: Send + Sync {
    fn der_bytes(&self) -> &[u8];
}

/// Subject attributes used for friendly-name derivation.
#[derive(Debug, Clone, Default)]
pub struct SubjectAttributes {
    pub description: Option<String>,
    pub common_name: Option<String>,
    pub organizational_unit: Option<String>,
}

/// Certificate store operations.
pub trait CertStore: Send + Sync {
    /// Kerberos principal the store has mapped to this certificate.
    fn kerberos_principal(&self, cert: &dyn ClientCertificate) -> Option<String>;
    /// AppleID account bound to this certificate, if it is an AppleID
    /// certificate.
    fn appleid_account(&self, cert: &dyn ClientCertificate) -> Option<String>;
    /// The store's own inferred display label.
    fn infer_label(&self, cert: &dyn ClientCertificate) -> Option<String>;
    /// Subject attributes (description, commonName, organizationalUnit).
    fn subject_attributes(&self, cert: &dyn ClientCertificate) -> SubjectAttributes;
}

/// Kerberos provider: context construction plus LKDC realm discovery.
pub trait KerberosProvider: Send + Sync {
    fn new_context(&self) -> ProviderResult<Arc<dyn KrbContext>>;
    fn new_x509_context(&self) -> ProviderResult<Arc<dyn X509Context>>;
    /// Resolves the LKDC realm of a host, typically over mDNS. Blocking.
    fn discover_lkdc_realm(&self, hostname: &str) -> ProviderResult<String>;
}

/// A Kerberos library context.
pub trait KrbContext: Send + Sync {
    fn parse_name(&self, name: &str, flags: ParseFlags) -> ProviderResult<Box<dyn KrbPrincipal>>;
    /// Snapshot of the credential-cache collection (the provider's own
    /// synchronised enumeration).
    fn caches(&self) -> ProviderResult<Vec<Box<dyn KrbCache>>>;
    /// The cache holding credentials for this client, if one exists.
    fn cache_match(&self, client: &dyn KrbPrincipal) -> ProviderResult<Box<dyn KrbCache>>;
    fn new_unique_cache(&self) -> ProviderResult<Box<dyn KrbCache>>;
    fn host_realms(&self, hostname: &str) -> ProviderResult<Vec<String>>;
    fn default_realms(&self) -> ProviderResult<Vec<String>>;
    fn realm_is_lkdc(&self, realm: &str) -> bool;
    fn new_init_creds(
        &self,
        client: &dyn KrbPrincipal,
        opts: &InitCredsOptions,
    ) -> ProviderResult<Box<dyn KrbInitCreds>>;
}

/// A parsed Kerberos principal.
pub trait KrbPrincipal: Send + Sync {
    fn unparse(&self) -> ProviderResult<String>;
    fn realm(&self) -> String;
    fn is_lkdc(&self) -> bool;
}

/// A credential cache. Dropping the handle closes it; `destroy` removes
/// the cache from the collection as well.
pub trait KrbCache: Send + Sync {
    fn principal(&self) -> ProviderResult<Box<dyn KrbPrincipal>>;
    fn config(&self, key: &str) -> Option<Vec<u8>>;
    fn set_config(&self, key: &str, value: &[u8]) -> ProviderResult<()>;
    fn initialize(&self, client: &dyn KrbPrincipal) -> ProviderResult<()>;
    fn store(&self, creds: &dyn KrbCredentials) -> ProviderResult<()>;
    fn destroy(self: Box<Self>);
}

/// An in-progress initial-credential exchange.
pub trait KrbInitCreds: Send {
    fn set_password(&mut self, password: &str) -> ProviderResult<()>;
    /// Configures PKINIT with the client certificate, converted through
    /// the session's X.509 context.
    fn set_pkinit_client_cert(
        &mut self,
        hx: &dyn X509Context,
        cert: &dyn ClientCertificate,
    ) -> ProviderResult<()>;
    /// Pins the KDC, e.g. `tcp/<hostname>` for LKDC principals.
    fn set_kdc_hostname(&mut self, hostname: &str) -> ProviderResult<()>;
    /// Runs the exchange and returns the acquired credentials.
    fn run(&mut self) -> ProviderResult<Box<dyn KrbCredentials>>;
    /// Persists the exchange configuration into the cache.
    fn store_config(&self, cache: &dyn KrbCache) -> ProviderResult<()>;
}

/// Credentials returned by an initial-credential exchange.
pub trait KrbCredentials: Send + Sync {
    /// The client principal the KDC actually issued for (may differ
    /// from the requested one after referrals).
    fn client(&self) -> ProviderResult<Box<dyn KrbPrincipal>>;
}

/// An X.509 context for certificate introspection.
pub trait X509Context: Send + Sync {
    /// The AppleID subject attribute of the certificate.
    fn appleid_for_certificate(&self, cert: &dyn ClientCertificate) -> ProviderResult<String>;
}

/// Mechanism selector for GSS credential operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GssMech {
    Krb5,
    Ntlm,
    Iakerb,
}

/// An imported GSS name.
pub trait GssName: Send + Sync {
    fn display(&self) -> String;
}

/// A GSS credential handle.
pub trait GssCredential: Send + Sync {
    fn display_name(&self) -> String;
    /// The credential's UUID (IAKERB credentials carry one).
    fn uuid(&self) -> ProviderResult<String>;
    fn label(&self, key: &str) -> Option<Vec<u8>>;
    /// Sets a label; `None` clears it.
    fn set_label(&self, key: &str, value: Option<&[u8]>);
    fn hold(&self);
    fn unhold(&self);
}

/// Completion callback for asynchronous credential acquisition.
pub type GssAcquireDone =
    Box<dyn FnOnce(ProviderResult<Arc<dyn GssCredential>>) + Send + 'static>;

/// NTLM/IAKERB provider.
pub trait GssProvider: Send + Sync {
    fn import_user_name(&self, name: &str) -> ProviderResult<Box<dyn GssName>>;
    /// Acquires an initiator credential from an explicit identity. The
    /// provider invokes `done` exactly once, possibly on another
    /// thread, bounded by its own timeout.
    fn acquire_cred_with_identity(
        &self,
        name: &dyn GssName,
        mech: GssMech,
        identity: &GssIdentity,
        done: GssAcquireDone,
    ) -> ProviderResult<()>;
    /// Looks up an already-held credential for the name.
    fn acquire_cred(
        &self,
        name: &dyn GssName,
        mech: GssMech,
    ) -> ProviderResult<Arc<dyn GssCredential>>;
    /// Acquires an initial credential with a password (the IAKERB path).
    fn initial_cred(
        &self,
        name: &dyn GssName,
        mech: GssMech,
        password: &str,
    ) -> ProviderResult<Arc<dyn GssCredential>>;
    /// Iterates credentials of one mechanism (or all with `None`),
    /// terminating with a final `None` sentinel call.
    fn iter_creds(
        &self,
        mech: Option<GssMech>,
        cb: &mut dyn FnMut(Option<Arc<dyn GssCredential>>),
    );
}

/// One entry of the user-selection override list.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSelectionEntry {
    pub mech: String,
    pub domain: String,
    #[serde(default)]
    pub user: Option<String>,
    pub client: String,
}

/// Preferences store.
pub trait PrefsStore: Send + Sync {
    /// The `GSSEnable` flag; `None` when the key is absent (treated as
    /// enabled).
    fn gss_enable(&self) -> Option<bool>;
    /// The `UserSelections` override list.
    fn user_selections(&self) -> Vec<UserSelectionEntry>;
}

/// The full provider bundle a session is created over.
#[derive(Clone)]
pub struct Providers {
    pub kerberos: Arc<dyn KerberosProvider>,
    pub gss: Arc<dyn GssProvider>,
    pub certs: Arc<dyn CertStore>,
    pub prefs: Arc<dyn PrefsStore>,
}

/// Mock providers driving the full pipeline in tests.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
    use std::sync::{mpsc, Mutex};

    // ---- certificates ----

    pub(crate) struct MockCert {
        der: Vec<u8>,
    }

    impl MockCert {
        pub(crate) fn new(der: &[u8]) -> Arc<dyn ClientCertificate> {
            Arc::new(MockCert { der: der.to_vec() })
        }
    }

    impl ClientCertificate for MockCert {
        fn der_bytes(&self) -> &[u8] {
            &self.der
        }
    }

    #[derive(Default, Clone)]
    pub(crate) struct CertEntry {
        pub kerberos_principal: Option<String>,
        pub appleid_account: Option<String>,
        pub inferred_label: Option<String>,
        pub subject: SubjectAttributes,
    }

    #[derive(Default)]
    pub(crate) struct MockCertStore {
        pub entries: Mutex<HashMap<Vec<u8>, CertEntry>>,
    }

    impl MockCertStore {
        pub(crate) fn insert(&self, der: &[u8], entry: CertEntry) {
            self.entries.lock().unwrap().insert(der.to_vec(), entry);
        }

        fn entry(&self, cert: &dyn ClientCertificate) -> CertEntry {
            self.entries
                .lock()
                .unwrap()
                .get(cert.der_bytes())
                .cloned()
                .unwrap_or_default()
        }
    }

    impl CertStore for Arc<MockCertStore> {
        fn kerberos_principal(&self, cert: &dyn ClientCertificate) -> Option<String> {
            self.entry(cert).kerberos_principal
        }
        fn appleid_account(&self, cert: &dyn ClientCertificate) -> Option<String> {
            self.entry(cert).appleid_account
        }
        fn infer_label(&self, cert: &dyn ClientCertificate) -> Option<String> {
            self.entry(cert).inferred_label
        }
        fn subject_attributes(&self, cert: &dyn ClientCertificate) -> SubjectAttributes {
            self.entry(cert).subject
        }
    }

    // ---- kerberos ----

    pub(crate) struct MockPrincipal {
        pub name: String,
    }

    fn realm_of(name: &str) -> String {
        name.rsplit_once('@').map(|(_, r)| r.to_string()).unwrap_or_default()
    }

    fn realm_is_lkdc(realm: &str) -> bool {
        realm.starts_with("LKDC:") || realm == "WELLKNOWN:COM.APPLE.LKDC"
    }

    impl KrbPrincipal for MockPrincipal {
        fn unparse(&self) -> ProviderResult<String> {
            Ok(self.name.clone())
        }
        fn realm(&self) -> String {
            realm_of(&self.name)
        }
        fn is_lkdc(&self) -> bool {
            realm_is_lkdc(&self.realm())
        }
    }

    pub(crate) struct MockCacheState {
        pub principal: Mutex<String>,
        pub config: Mutex<HashMap<String, Vec<u8>>>,
        pub destroyed: AtomicBool,
        pub stored_creds: AtomicUsize,
    }

    impl MockCacheState {
        pub(crate) fn new(principal: &str) -> Arc<Self> {
            Arc::new(MockCacheState {
                principal: Mutex::new(principal.to_string()),
                config: Mutex::new(HashMap::new()),
                destroyed: AtomicBool::new(false),
                stored_creds: AtomicUsize::new(0),
            })
        }

        pub(crate) fn with_config(principal: &str, key: &str, value: &[u8]) -> Arc<Self> {
            let state = Self::new(principal);
            state.config.lock().unwrap().insert(key.to_string(), value.to_vec());
            state
        }

        pub(crate) fn config_string(&self, key: &str) -> Option<String> {
            self.config
                .lock()
                .unwrap()
                .get(key)
                .map(|v| String::from_utf8_lossy(v).into_owned())
        }
    }

    struct MockCache {
        state: Arc<MockCacheState>,
        fail_store: bool,
    }

    impl KrbCache for MockCache {
        fn principal(&self) -> ProviderResult<Box<dyn KrbPrincipal>> {
            let name = self.state.principal.lock().unwrap().clone();
            if name.is_empty() {
                return Err(ProviderError::new(-1, "cache has no principal"));
            }
            Ok(Box::new(MockPrincipal { name }))
        }
        fn config(&self, key: &str) -> Option<Vec<u8>> {
            self.state.config.lock().unwrap().get(key).cloned()
        }
        fn set_config(&self, key: &str, value: &[u8]) -> ProviderResult<()> {
            self.state
                .config
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }
        fn initialize(&self, client: &dyn KrbPrincipal) -> ProviderResult<()> {
            *self.state.principal.lock().unwrap() = client.unparse()?;
            Ok(())
        }
        fn store(&self, creds: &dyn KrbCredentials) -> ProviderResult<()> {
            if self.fail_store {
                return Err(ProviderError::new(-1, "cache store failed"));
            }
            let _ = creds.client()?;
            self.state.stored_creds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn destroy(self: Box<Self>) {
            self.state.destroyed.store(true, Ordering::SeqCst);
        }
    }

    struct MockCredentials {
        client: String,
    }

    impl KrbCredentials for MockCredentials {
        fn client(&self) -> ProviderResult<Box<dyn KrbPrincipal>> {
            Ok(Box::new(MockPrincipal {
                name: self.client.clone(),
            }))
        }
    }

    #[derive(Default)]
    pub(crate) struct MockKrbState {
        pub caches: Mutex<Vec<Arc<MockCacheState>>>,
        pub created_caches: Mutex<Vec<Arc<MockCacheState>>>,
        pub host_realms: Mutex<Vec<String>>,
        pub default_realms: Mutex<Vec<String>>,
        pub lkdc_realm: Mutex<Option<String>>,
        /// When set, the next realm discovery blocks until the sender is
        /// dropped or sends.
        pub lkdc_gate: Mutex<Option<mpsc::Receiver<()>>>,
        /// Requested-client -> canonical-client referral mapping.
        pub canonical: Mutex<HashMap<String, String>>,
        pub fail_exchange: Mutex<Option<ProviderError>>,
        pub fail_store: AtomicBool,
        pub fail_context: AtomicBool,
        pub exchanges: AtomicUsize,
        pub parsed: Mutex<Vec<(String, bool)>>,
        pub appleids: Mutex<HashMap<Vec<u8>, String>>,
        pub kdc_hostnames: Mutex<Vec<String>>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockKerberos {
        pub state: Arc<MockKrbState>,
    }

    impl MockKerberos {
        pub(crate) fn add_cache(&self, cache: Arc<MockCacheState>) {
            self.state.caches.lock().unwrap().push(cache);
        }

        pub(crate) fn set_lkdc_realm(&self, realm: &str) {
            *self.state.lkdc_realm.lock().unwrap() = Some(realm.to_string());
        }

        pub(crate) fn set_canonical(&self, requested: &str, canonical: &str) {
            self.state
                .canonical
                .lock()
                .unwrap()
                .insert(requested.to_string(), canonical.to_string());
        }

        /// Blocks the next realm discovery until the returned sender is
        /// used or dropped.
        pub(crate) fn gate_lkdc_discovery(&self) -> mpsc::Sender<()> {
            let (tx, rx) = mpsc::channel();
            *self.state.lkdc_gate.lock().unwrap() = Some(rx);
            tx
        }
    }

    struct MockContext {
        state: Arc<MockKrbState>,
    }

    impl KrbContext for MockContext {
        fn parse_name(&self, name: &str, flags: ParseFlags) -> ProviderResult<Box<dyn KrbPrincipal>> {
            self.state
                .parsed
                .lock()
                .unwrap()
                .push((name.to_string(), flags.enterprise));
            Ok(Box::new(MockPrincipal {
                name: name.to_string(),
            }))
        }
        fn caches(&self) -> ProviderResult<Vec<Box<dyn KrbCache>>> {
            Ok(self
                .state
                .caches
                .lock()
                .unwrap()
                .iter()
                .map(|s| {
                    Box::new(MockCache {
                        state: s.clone(),
                        fail_store: false,
                    }) as Box<dyn KrbCache>
                })
                .collect())
        }
        fn cache_match(&self, client: &dyn KrbPrincipal) -> ProviderResult<Box<dyn KrbCache>> {
            let wanted = client.unparse()?;
            let caches = self.state.caches.lock().unwrap();
            caches
                .iter()
                .find(|s| *s.principal.lock().unwrap() == wanted)
                .map(|s| {
                    Box::new(MockCache {
                        state: s.clone(),
                        fail_store: false,
                    }) as Box<dyn KrbCache>
                })
                .ok_or_else(|| ProviderError::new(-1, "no matching cache"))
        }
        fn new_unique_cache(&self) -> ProviderResult<Box<dyn KrbCache>> {
            let state = MockCacheState::new("");
            self.state.created_caches.lock().unwrap().push(state.clone());
            Ok(Box::new(MockCache {
                state,
                fail_store: self.state.fail_store.load(Ordering::SeqCst),
            }))
        }
        fn host_realms(&self, _hostname: &str) -> ProviderResult<Vec<String>> {
            Ok(self.state.host_realms.lock().unwrap().clone())
        }
        fn default_realms(&self) -> ProviderResult<Vec<String>> {
            Ok(self.state.default_realms.lock().unwrap().clone())
        }
        fn realm_is_lkdc(&self, realm: &str) -> bool {
            realm_is_lkdc(realm)
        }
        fn new_init_creds(
            &self,
            client: &dyn KrbPrincipal,
            opts: &InitCredsOptions,
        ) -> ProviderResult<Box<dyn KrbInitCreds>> {
            Ok(Box::new(MockInitCreds {
                state: self.state.clone(),
                client: client.unparse()?,
                opts: *opts,
                have_password: false,
                have_pkinit_cert: false,
            }))
        }
    }

    struct MockInitCreds {
        state: Arc<MockKrbState>,
        client: String,
        opts: InitCredsOptions,
        have_password: bool,
        have_pkinit_cert: bool,
    }

    impl KrbInitCreds for MockInitCreds {
        fn set_password(&mut self, _password: &str) -> ProviderResult<()> {
            self.have_password = true;
            Ok(())
        }
        fn set_pkinit_client_cert(
            &mut self,
            _hx: &dyn X509Context,
            _cert: &dyn ClientCertificate,
        ) -> ProviderResult<()> {
            self.have_pkinit_cert = true;
            Ok(())
        }
        fn set_kdc_hostname(&mut self, hostname: &str) -> ProviderResult<()> {
            self.state
                .kdc_hostnames
                .lock()
                .unwrap()
                .push(hostname.to_string());
            Ok(())
        }
        fn run(&mut self) -> ProviderResult<Box<dyn KrbCredentials>> {
            if !self.have_password && !self.have_pkinit_cert {
                return Err(ProviderError::new(-1, "no preauthentication configured"));
            }
            if let Some(err) = self.state.fail_exchange.lock().unwrap().clone() {
                return Err(err);
            }
            self.state.exchanges.fetch_add(1, Ordering::SeqCst);
            // Referral rewrites only apply when canonicalisation was
            // requested.
            let canonical = if self.opts.canonicalize {
                self.state
                    .canonical
                    .lock()
                    .unwrap()
                    .get(&self.client)
                    .cloned()
                    .unwrap_or_else(|| self.client.clone())
            } else {
                self.client.clone()
            };
            Ok(Box::new(MockCredentials { client: canonical }))
        }
        fn store_config(&self, _cache: &dyn KrbCache) -> ProviderResult<()> {
            Ok(())
        }
    }

    struct MockX509Context {
        state: Arc<MockKrbState>,
    }

    impl X509Context for MockX509Context {
        fn appleid_for_certificate(&self, cert: &dyn ClientCertificate) -> ProviderResult<String> {
            self.state
                .appleids
                .lock()
                .unwrap()
                .get(cert.der_bytes())
                .cloned()
                .ok_or_else(|| ProviderError::new(-1, "no appleid attribute"))
        }
    }

    impl KerberosProvider for MockKerberos {
        fn new_context(&self) -> ProviderResult<Arc<dyn KrbContext>> {
            if self.state.fail_context.load(Ordering::SeqCst) {
                return Err(ProviderError::new(-1, "context init failed"));
            }
            Ok(Arc::new(MockContext {
                state: self.state.clone(),
            }))
        }
        fn new_x509_context(&self) -> ProviderResult<Arc<dyn X509Context>> {
            Ok(Arc::new(MockX509Context {
                state: self.state.clone(),
            }))
        }
        fn discover_lkdc_realm(&self, _hostname: &str) -> ProviderResult<String> {
            let gate = self.state.lkdc_gate.lock().unwrap().take();
            if let Some(rx) = gate {
                let _ = rx.recv();
            }
            self.state
                .lkdc_realm
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ProviderError::new(-1, "realm discovery failed"))
        }
    }

    // ---- gss ----

    pub(crate) struct MockGssCred {
        pub name: String,
        pub mech: GssMech,
        pub labels: Mutex<HashMap<String, Vec<u8>>>,
        pub hold_count: AtomicI32,
        pub uuid: Option<String>,
    }

    impl MockGssCred {
        pub(crate) fn new(name: &str, mech: GssMech) -> Arc<Self> {
            Arc::new(MockGssCred {
                name: name.to_string(),
                mech,
                labels: Mutex::new(HashMap::new()),
                hold_count: AtomicI32::new(0),
                uuid: None,
            })
        }

        pub(crate) fn with_label(self: Arc<Self>, key: &str, value: &[u8]) -> Arc<Self> {
            self.labels
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            self
        }
    }

    impl GssCredential for Arc<MockGssCred> {
        fn display_name(&self) -> String {
            self.name.clone()
        }
        fn uuid(&self) -> ProviderResult<String> {
            self.uuid
                .clone()
                .ok_or_else(|| ProviderError::new(-1, "credential has no uuid"))
        }
        fn label(&self, key: &str) -> Option<Vec<u8>> {
            self.labels.lock().unwrap().get(key).cloned()
        }
        fn set_label(&self, key: &str, value: Option<&[u8]>) {
            let mut labels = self.labels.lock().unwrap();
            match value {
                Some(v) => {
                    labels.insert(key.to_string(), v.to_vec());
                }
                None => {
                    labels.remove(key);
                }
            }
        }
        fn hold(&self) {
            self.hold_count.fetch_add(1, Ordering::SeqCst);
        }
        fn unhold(&self) {
            self.hold_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct MockGssName {
        name: String,
    }

    impl GssName for MockGssName {
        fn display(&self) -> String {
            self.name.clone()
        }
    }

    #[derive(Default)]
    pub(crate) struct MockGssState {
        pub creds: Mutex<Vec<Arc<MockGssCred>>>,
        pub fail_acquire_start: AtomicBool,
        pub fail_acquire_callback: AtomicBool,
        pub fail_initial: AtomicBool,
        pub initial_uuid: Mutex<Option<String>>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockGss {
        pub state: Arc<MockGssState>,
    }

    impl MockGss {
        pub(crate) fn add_cred(&self, cred: Arc<MockGssCred>) {
            self.state.creds.lock().unwrap().push(cred);
        }

        pub(crate) fn set_initial_uuid(&self, uuid: &str) {
            *self.state.initial_uuid.lock().unwrap() = Some(uuid.to_string());
        }

        pub(crate) fn find(&self, name: &str) -> Option<Arc<MockGssCred>> {
            self.state
                .creds
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.name == name)
                .cloned()
        }
    }

    impl GssProvider for MockGss {
        fn import_user_name(&self, name: &str) -> ProviderResult<Box<dyn GssName>> {
            if name.is_empty() {
                return Err(ProviderError::new(-1, "empty name"));
            }
            Ok(Box::new(MockGssName {
                name: name.to_string(),
            }))
        }

        fn acquire_cred_with_identity(
            &self,
            name: &dyn GssName,
            mech: GssMech,
            _identity: &GssIdentity,
            done: GssAcquireDone,
        ) -> ProviderResult<()> {
            if self.state.fail_acquire_start.load(Ordering::SeqCst) {
                return Err(ProviderError::new(-1, "acquire rejected"));
            }
            if self.state.fail_acquire_callback.load(Ordering::SeqCst) {
                done(Err(ProviderError::new(-1, "acquire failed")));
                return Ok(());
            }
            let cred = MockGssCred::new(&name.display(), mech);
            self.state.creds.lock().unwrap().push(cred.clone());
            done(Ok(Arc::new(cred) as Arc<dyn GssCredential>));
            Ok(())
        }

        fn acquire_cred(
            &self,
            name: &dyn GssName,
            mech: GssMech,
        ) -> ProviderResult<Arc<dyn GssCredential>> {
            let wanted = name.display();
            self.state
                .creds
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.name == wanted && c.mech == mech)
                .cloned()
                .map(|c| Arc::new(c) as Arc<dyn GssCredential>)
                .ok_or_else(|| ProviderError::new(-1, "no credential for name"))
        }

        fn initial_cred(
            &self,
            name: &dyn GssName,
            mech: GssMech,
            _password: &str,
        ) -> ProviderResult<Arc<dyn GssCredential>> {
            if self.state.fail_initial.load(Ordering::SeqCst) {
                return Err(ProviderError::new(-1, "initial cred failed"));
            }
            let uuid = self.state.initial_uuid.lock().unwrap().clone();
            let cred = Arc::new(MockGssCred {
                name: name.display(),
                mech,
                labels: Mutex::new(HashMap::new()),
                hold_count: AtomicI32::new(0),
                uuid,
            });
            self.state.creds.lock().unwrap().push(cred.clone());
            Ok(Arc::new(cred) as Arc<dyn GssCredential>)
        }

        fn iter_creds(
            &self,
            mech: Option<GssMech>,
            cb: &mut dyn FnMut(Option<Arc<dyn GssCredential>>),
        ) {
            let creds: Vec<_> = self
                .state
                .creds
                .lock()
                .unwrap()
                .iter()
                .filter(|c| mech.map_or(true, |m| c.mech == m))
                .cloned()
                .collect();
            for cred in creds {
                cb(Some(Arc::new(cred) as Arc<dyn GssCredential>));
            }
            cb(None);
        }
    }

    // ---- prefs ----

    #[derive(Default)]
    pub(crate) struct MockPrefs {
        pub gss_enable: Option<bool>,
        pub user_selections: Vec<UserSelectionEntry>,
    }

    impl PrefsStore for MockPrefs {
        fn gss_enable(&self) -> Option<bool> {
            self.gss_enable
        }
        fn user_selections(&self) -> Vec<UserSelectionEntry> {
            self.user_selections.clone()
        }
    }

    // ---- bundle helpers ----

    pub(crate) struct MockEnv {
        pub providers: Providers,
        pub kerberos: MockKerberos,
        pub gss: MockGss,
        pub certs: Arc<MockCertStore>,
    }

    pub(crate) fn env() -> MockEnv {
        env_with_prefs(MockPrefs::default())
    }

    pub(crate) fn env_with_prefs(prefs: MockPrefs) -> MockEnv {
        let kerberos = MockKerberos::default();
        let gss = MockGss::default();
        let certs = Arc::new(MockCertStore::default());
        let providers = Providers {
            kerberos: Arc::new(kerberos.clone()),
            gss: Arc::new(gss.clone()),
            certs: Arc::new(certs.clone()),
            prefs: Arc::new(prefs),
        };
        MockEnv {
            providers,
            kerberos,
            gss,
            certs,
        }
    }
}
