//! Credential acquisition
//!
//! Per-selection acquisition drives the configured provider for the
//! selection's mechanism:
//!
//! * **Kerberos** runs an initial-credential exchange (password or
//!   PKINIT), stores the result in a matching cache, and adopts any
//!   client principal the KDC rewrote through referrals.
//! * **NTLM** acquires from an explicit user/realm/password identity
//!   through the provider's callback interface.
//! * **IAKERB** acquires an initial credential and rewrites the
//!   selection's client to the credential's UUID.
//!
//! Cancellation always supersedes a pending success: a callback in
//! flight completes normally, but its result is discarded.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::credref::cred_change;
use crate::errors::{NahError, Result};
use crate::mechanism::{ClientNameType, Mechanism};
use crate::providers::{
    ClientCertificate, GssAcquireDone, GssMech, InitCredsOptions, KrbCache, KrbContext,
    KrbCredentials, KrbInitCreds, KrbPrincipal, ParseFlags, CONFIG_FRIENDLY_NAME, NAH_CREATED,
};
use crate::selection::Selection;

impl Selection {
    /// Waits for the server principal to resolve, then acquires the
    /// credential. Fails with [`NahError::Canceled`] if the session was
    /// canceled, including while acquisition was in flight.
    pub async fn acquire(self: &Arc<Self>) -> Result<()> {
        if !self.latch.wait().await {
            return Err(NahError::Canceled(format!(
                "failed to get server for {}",
                self.client()
            )));
        }
        let result = self.acquire_have_result().await;
        if self.latch.is_canceled() {
            return Err(NahError::Canceled("session canceled".to_string()));
        }
        result
    }

    /// Spawns [`Selection::acquire`] on the background queue and hands
    /// the outcome to `done` on completion.
    pub fn acquire_with_callback(
        self: &Arc<Self>,
        done: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        let sel = self.clone();
        tokio::spawn(async move {
            done(sel.acquire().await);
        });
    }

    /// Acquires the credential without waiting for server resolution.
    pub async fn acquire_have_result(self: &Arc<Self>) -> Result<()> {
        match self.mechanism() {
            Mechanism::Kerberos => self.acquire_kerberos().await,
            Mechanism::Ntlm => self.acquire_ntlm().await,
            Mechanism::KerberosIakerb => self.acquire_iakerb().await,
            other => {
                debug!(mech = %other, "no acquisition path for mechanism");
                Err(NahError::ProviderFailure {
                    mech: other.name(),
                    code: 0,
                    message: "mechanism has no acquisition path".to_string(),
                })
            }
        }
    }

    async fn acquire_kerberos(self: &Arc<Self>) -> Result<()> {
        debug!(client = %self.client(), server = ?self.server(), "acquire kerberos");

        // An already-bound cache only needs its reference count bumped.
        if self.lock_fields().ccache.is_some() {
            debug!("have ccache");
            if let Some(key) = self.reference_key() {
                let _ = cred_change(&*self.core.providers.gss, &key, 1, None);
            }
            return Ok(());
        }

        let certificate = self.lock_fields().certificate.clone();
        if self.core.password.is_none() && certificate.is_none() {
            debug!("kerberos: no password or certificate, punting");
            return Err(NahError::insufficient_credentials("Kerberos"));
        }

        let sel = self.clone();
        tokio::task::spawn_blocking(move || kerberos_exchange(&sel, certificate))
            .await
            .map_err(|err| NahError::IoFailure(format!("background task failed: {err}")))?
    }

    async fn acquire_ntlm(self: &Arc<Self>) -> Result<()> {
        debug!(client = %self.client(), "acquire ntlm");

        if self.have_cred() {
            return Ok(());
        }
        let Some(password) = self.core.password.clone() else {
            debug!("ntlm: no password");
            return Err(NahError::insufficient_credentials("NTLM"));
        };

        let client = self.client();
        let gss = self.core.providers.gss.clone();
        let name = gss
            .import_user_name(&client)
            .map_err(|e| NahError::provider("NTLM", e))?;

        self.lock_fields().label = Some(client.clone());

        let (user, realm) = match client.split_once('@') {
            Some((user, realm)) => (user.to_string(), realm.to_string()),
            None => (client.clone(), String::new()),
        };
        let identity = crate::secure_types::GssIdentity::new(user.clone(), realm, password);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let done: GssAcquireDone = Box::new(move |result| {
            let outcome = match result {
                Ok(cred) => {
                    cred.set_label(CONFIG_FRIENDLY_NAME, Some(user.as_bytes()));
                    cred.set_label(NAH_CREATED, Some(b"1"));
                    Ok(())
                }
                Err(err) => Err(NahError::provider("NTLM", err)),
            };
            let _ = tx.send(outcome);
        });

        gss.acquire_cred_with_identity(&*name, GssMech::Ntlm, &identity, done)
            .map_err(|e| NahError::provider("NTLM", e))?;

        // Completion is bounded by the provider's own timeout.
        rx.await.map_err(|_| NahError::ProviderFailure {
            mech: "NTLM",
            code: 0,
            message: "provider dropped the completion callback".to_string(),
        })?
    }

    async fn acquire_iakerb(self: &Arc<Self>) -> Result<()> {
        debug!(client = %self.client(), "acquire iakerb");

        if self.have_cred() {
            return Err(NahError::insufficient_credentials("IAKerb"));
        }
        let Some(password) = self.core.password.clone() else {
            debug!("iakerb: no password");
            return Err(NahError::insufficient_credentials("IAKerb"));
        };

        let client = self.client();
        let gss = self.core.providers.gss.clone();
        let name = gss
            .import_user_name(&client)
            .map_err(|e| NahError::provider("IAKerb", e))?;

        self.lock_fields().label = Some(client.clone());

        let sel = self.clone();
        tokio::task::spawn_blocking(move || {
            let cred = gss
                .initial_cred(&*name, GssMech::Iakerb, password.expose_secret())
                .map_err(|e| NahError::provider("IAKerb", e))?;

            let uuid = cred.uuid().map_err(|e| NahError::provider("IAKerb", e))?;
            if Uuid::parse_str(&uuid).is_err() {
                return Err(NahError::ParseFailure(format!(
                    "credential uuid {uuid:?}"
                )));
            }

            let mut fields = sel.lock_fields();
            fields.client = uuid;
            fields.client_type = ClientNameType::Uuid;
            Ok(())
        })
        .await
        .map_err(|err| NahError::IoFailure(format!("background task failed: {err}")))?
    }
}

/// The blocking Kerberos initial-credential exchange.
fn kerberos_exchange(
    sel: &Arc<Selection>,
    certificate: Option<Arc<dyn ClientCertificate>>,
) -> Result<()> {
    let krb = |e| NahError::provider("Kerberos", e);
    let core = &sel.core;

    let ctx = core.krb_context().ok_or_else(|| NahError::ProviderFailure {
        mech: "Kerberos",
        code: 0,
        message: "no kerberos context on session".to_string(),
    })?;

    let client_str = sel.client();
    // An enterprise name carries a second @.
    let enterprise = client_str.matches('@').count() >= 2;
    let client = ctx
        .parse_name(&client_str, ParseFlags { enterprise })
        .map_err(krb)?;
    if let Ok(principal) = client.unparse() {
        debug!(%principal, "trying client principal");
    }

    let opts = InitCredsOptions {
        canonicalize: true,
        use_pkinit: certificate.is_some(),
    };
    let mut icc = ctx.new_init_creds(&*client, &opts).map_err(krb)?;

    if client.is_lkdc() {
        icc.set_kdc_hostname(&format!("tcp/{}", core.hostname))
            .map_err(krb)?;
    }

    if let Some(cert) = &certificate {
        let hx = core.x509_context().ok_or_else(|| NahError::ProviderFailure {
            mech: "Kerberos",
            code: 0,
            message: "no x509 context on session".to_string(),
        })?;
        icc.set_pkinit_client_cert(&*hx, &**cert).map_err(krb)?;
    } else if let Some(password) = &core.password {
        icc.set_password(password.expose_secret()).map_err(krb)?;
    } else {
        return Err(NahError::insufficient_credentials("Kerberos"));
    }

    let creds = icc.run().map_err(krb)?;
    let cred_client = creds.client().map_err(krb)?;

    let (cache, newly_created) = match ctx.cache_match(&*cred_client) {
        Ok(cache) => (cache, false),
        Err(_) => (ctx.new_unique_cache().map_err(krb)?, true),
    };

    match store_and_adopt(
        sel,
        &*ctx,
        &*icc,
        &*creds,
        &*cred_client,
        &*cache,
        certificate.as_deref(),
    ) {
        Ok(()) => {
            debug!("kerberos acquisition successful");
            Ok(())
        }
        Err(err) => {
            // A cache we just minted must not survive a failed exchange.
            if newly_created {
                cache.destroy();
            }
            Err(err)
        }
    }
}

/// Stores the acquired credentials and adopts the principals the KDC
/// returned.
fn store_and_adopt(
    sel: &Arc<Selection>,
    ctx: &dyn KrbContext,
    icc: &dyn KrbInitCreds,
    creds: &dyn KrbCredentials,
    cred_client: &dyn KrbPrincipal,
    cache: &dyn KrbCache,
    certificate: Option<&dyn ClientCertificate>,
) -> Result<()> {
    let krb = |e| NahError::provider("Kerberos", e);
    let core = &sel.core;

    cache.initialize(cred_client).map_err(krb)?;
    cache.store(creds).map_err(krb)?;
    icc.store_config(cache).map_err(krb)?;

    // The KDC might have done referral games; adopt the names it
    // returned.
    let realm = cred_client.realm();
    let is_lkdc = ctx.realm_is_lkdc(&realm);
    let new_client = cred_client.unparse().map_err(krb)?;
    debug!(principal = %new_client, "got client principal");

    {
        let mut fields = sel.lock_fields();
        if fields.client != new_client {
            fields.client = new_client;
            fields.server = Some(if is_lkdc {
                format!("{}/{}@{}", core.service, realm, realm)
            } else {
                format!("{}/{}@{}", core.service, core.hostname, realm)
            });
        }
    }

    set_friendly_name(sel, certificate, cache, is_lkdc);

    let _ = cache.set_config(NAH_CREATED, b"1");

    Ok(())
}

/// Derives a human-readable label for the credential and stamps it on
/// the cache and the selection.
fn set_friendly_name(
    sel: &Arc<Selection>,
    certificate: Option<&dyn ClientCertificate>,
    cache: &dyn KrbCache,
    is_lkdc: bool,
) {
    let core = &sel.core;
    let store = &core.providers.certs;

    let label = if let Some(cert) = certificate {
        store
            .appleid_account(cert)
            .or_else(|| {
                let attrs = store.subject_attributes(cert);
                match attrs.description.as_deref() {
                    Some(".Mac Sharing Certificate") | Some("MobileMe Sharing Certificate") => {
                        match (attrs.common_name, attrs.organizational_unit) {
                            (Some(cn), Some(ou)) => Some(format!("{}@{}", cn, ou)),
                            _ => None,
                        }
                    }
                    _ => None,
                }
            })
            .or_else(|| store.infer_label(cert))
    } else if core.specific_name.is_some() || is_lkdc {
        Some(core.username.clone())
    } else {
        Some(sel.client())
    };

    if let Some(label) = label {
        let _ = cache.set_config(CONFIG_FRIENDLY_NAME, label.as_bytes());
        sel.lock_fields().label = Some(label);
    }
}
