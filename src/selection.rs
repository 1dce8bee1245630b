//! Candidate authentication selections
//!
//! A selection is one concrete (mechanism, client, server, wrapper
//! policy) quadruple a caller may attempt. Guessers create them;
//! background resolvers and the acquisition path mutate the string
//! fields until the completion latch signals; afterwards the record is
//! read-only to the caller.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::latch::CompletionLatch;
use crate::mechanism::{ClientNameType, Mechanism, ServerNameType};
use crate::providers::{ClientCertificate, KrbCache};
use crate::session::SessionCore;

/// Mutable portion of a selection, guarded by one lock.
pub(crate) struct SelectionFields {
    pub(crate) client: String,
    pub(crate) client_type: ClientNameType,
    pub(crate) server: Option<String>,
    pub(crate) server_type: ServerNameType,
    pub(crate) certificate: Option<Arc<dyn ClientCertificate>>,
    pub(crate) ccache: Option<Box<dyn KrbCache>>,
    pub(crate) have_cred: bool,
    pub(crate) label: Option<String>,
}

/// One candidate authentication configuration.
pub struct Selection {
    pub(crate) core: Arc<SessionCore>,
    mech: Mechanism,
    spnego: bool,
    pub(crate) latch: CompletionLatch,
    fields: Mutex<SelectionFields>,
}

impl Selection {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        mech: Mechanism,
        spnego: bool,
        client: String,
        client_type: ClientNameType,
        server: Option<String>,
        server_type: ServerNameType,
    ) -> Arc<Selection> {
        // A selection born without a server owns a live latch; one born
        // resolved starts pre-signalled.
        let latch = if server.is_some() {
            CompletionLatch::signaled()
        } else {
            CompletionLatch::pending()
        };
        Arc::new(Selection {
            core,
            mech,
            spnego,
            latch,
            fields: Mutex::new(SelectionFields {
                client,
                client_type,
                server,
                server_type,
                certificate: None,
                ccache: None,
                have_cred: false,
                label: None,
            }),
        })
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mech
    }

    /// Whether this selection should be wrapped in SPNEGO.
    pub fn spnego(&self) -> bool {
        self.spnego
    }

    pub fn client(&self) -> String {
        self.lock_fields().client.clone()
    }

    pub fn client_name_type(&self) -> ClientNameType {
        self.lock_fields().client_type
    }

    /// The server principal; `None` while a background resolver is
    /// still discovering it.
    pub fn server(&self) -> Option<String> {
        self.lock_fields().server.clone()
    }

    pub fn server_name_type(&self) -> ServerNameType {
        self.lock_fields().server_type
    }

    /// True when a credential cache is already bound to this selection.
    pub fn have_cred(&self) -> bool {
        self.lock_fields().have_cred
    }

    /// Human-readable label, when one was inferred or copied from a
    /// cache.
    pub fn label(&self) -> Option<String> {
        self.lock_fields().label.clone()
    }

    /// Waits until the server principal is resolved. Returns `false`
    /// if the session was canceled.
    pub async fn wait(&self) -> bool {
        self.latch.wait().await
    }

    /// The reference key addressing this selection's credential:
    /// `krb5:<client>` for Kerberos-family mechanisms, `ntlm:<client>`
    /// for NTLM. `None` for mechanisms without refcounted credentials.
    pub fn reference_key(&self) -> Option<String> {
        let prefix = if self.mech.is_kerberos_family() {
            "krb5"
        } else if self.mech == Mechanism::Ntlm {
            "ntlm"
        } else {
            return None;
        };
        Some(format!("{}:{}", prefix, self.client()))
    }

    pub(crate) fn lock_fields(&self) -> MutexGuard<'_, SelectionFields> {
        self.fields.lock().expect("selection lock poisoned")
    }

    /// Duplicate test: same mechanism, same client (case-sensitive),
    /// same server when both sides have one, same server-name-type.
    pub(crate) fn matches(
        &self,
        mech: Mechanism,
        client: &str,
        server: Option<&str>,
        server_type: ServerNameType,
    ) -> bool {
        if self.mech != mech {
            return false;
        }
        let fields = self.lock_fields();
        if fields.client != client {
            return false;
        }
        if let (Some(have), Some(want)) = (fields.server.as_deref(), server) {
            if have != want {
                return false;
            }
        }
        fields.server_type == server_type
    }
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.lock_fields();
        write!(
            f,
            "<Selection: {}, {} {} spnego: {}>",
            self.mech,
            fields.client,
            fields.server.as_deref().unwrap_or("(unresolved)"),
            if self.spnego { "yes" } else { "no" },
        )
    }
}
