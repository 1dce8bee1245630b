//! Kerberos guesser cluster
//!
//! Produces every Kerberos-family candidate: existing credential
//! caches, the wellknown LKDC pseudo-realm (plain and via IAKERB),
//! classic host-realm Kerberos, and classic per-host LKDC with
//! certificate fingerprints. Decisions are driven by the server's
//! advertised mechanisms, the service class, and host locality.
//!
//! Provider failures in here are logged and swallowed; a later guesser
//! may still produce a viable selection.

use std::sync::Arc;

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::mechanism::{oid, ClientNameType, Mechanism, ServerNameType};
use crate::providers::{KrbContext, X509Context, CONFIG_FRIENDLY_NAME, CONFIG_LKDC_HOSTNAME};
use crate::selection::Selection;
use crate::session::{AddFlags, SelectionSet, SessionCore, SERVICE_AFP, SERVICE_VNC};

/// Pseudo-realm selecting LKDC without pinning a host realm.
pub(crate) const WELLKNOWN_LKDC: &str = "WELLKNOWN:COM.APPLE.LKDC";

pub(crate) fn guess_kerberos(core: &Arc<SessionCore>, set: &mut SelectionSet) {
    let mut try_lkdc_classic = true;
    let mut try_wlkdc = false;
    let mut try_iakerb_with_lkdc = false;

    let use_gss_uam = core.providers.prefs.gss_enable().unwrap_or(true);

    if use_gss_uam
        && core.password.is_some()
        && core.hints_contain(oid::IAKERB)
        && core.hints_contain(oid::APPLE_LKDC)
        && !core.is_smb()
    {
        // IAKERB needs the server to announce both IAKERB and LKDC
        // support; SMB clients can't handle it.
        try_iakerb_with_lkdc = true;
    } else if core.hints_contain(oid::PKU2U) || core.hints_contain(oid::APPLE_LKDC) {
        try_wlkdc = true;
    } else if core.service == SERVICE_VNC {
        try_wlkdc = true;
    }

    // Two cases where classic LKDC is known not to apply: the server
    // announces wellknown-name support, or it announced a name without
    // any LKDC realm in it.
    if core.hints_contain(oid::PKU2U) || core.hints_contain(oid::APPLE_LKDC) {
        debug!("turning off classic LKDC: server announces wellknown-name support");
        try_lkdc_classic = false;
    } else if let Some(name) = core.spnego_server_name() {
        if !name.contains("@LKDC") {
            debug!(server_name = %name, "turning off classic LKDC: announced name has no LKDC realm");
            try_lkdc_classic = false;
        }
    }

    let mut flags = AddFlags {
        spnego: true,
        force: false,
    };
    // Old AFP servers don't speak SPNEGO.
    if core.service == SERVICE_AFP && !core.hints_contain(oid::APPLE_LKDC) {
        flags.spnego = false;
    }

    let have_kerberos = !core.hints_present()
        || core.hints_contain(oid::IAKERB)
        || core.hints_contain(oid::KERBEROS)
        || core.hints_contain(oid::KERBEROS_MICROSOFT)
        || core.hints_contain(oid::PKU2U);

    debug!(
        have_kerberos,
        try_iakerb_with_lkdc,
        try_wlkdc,
        try_lkdc_classic,
        use_spnego = flags.spnego,
        "kerberos guesser decisions"
    );

    if !have_kerberos {
        return;
    }

    let ctx = match core.providers.kerberos.new_context() {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(%err, "kerberos context initialization failed");
            return;
        }
    };
    let _ = core.krb.set(ctx.clone());

    let hx = match core.providers.kerberos.new_x509_context() {
        Ok(hx) => hx,
        Err(err) => {
            warn!(%err, "x509 context initialization failed");
            return;
        }
    };
    let _ = core.hx.set(hx.clone());

    // Matching LKDC credentials beat public-key operations, so they go
    // first.
    use_existing_caches(core, set, &*ctx, true, flags);

    if try_iakerb_with_lkdc {
        wellknown_lkdc(core, set, &*hx, Mechanism::KerberosIakerb, flags);
    }

    if try_wlkdc {
        wellknown_lkdc(core, set, &*hx, Mechanism::Kerberos, flags);
    }

    if core.password.is_some() {
        classic_kerberos(core, set, &*ctx, flags);
    }

    // Classic LKDC causes mDNS lookups, avoided when possible.
    if try_lkdc_classic {
        classic_lkdc(core, set, flags);
    }

    // Pick up whatever non-LKDC credentials already exist.
    use_existing_caches(core, set, &*ctx, false, flags);
}

/// Hostnames with these suffixes live on the local network segment and
/// get LKDC treatment instead of classic realms.
pub(crate) fn is_local_hostname(hostname: &str) -> bool {
    hostname.ends_with(".local")
        || hostname.ends_with(".members.mac.com")
        || hostname.ends_with(".members.me.com")
}

/// One pass over the credential-cache collection, keeping either only
/// LKDC caches (bound to this host) or only classic ones.
fn use_existing_caches(
    core: &Arc<SessionCore>,
    set: &mut SelectionSet,
    ctx: &dyn KrbContext,
    only_lkdc: bool,
    flags: AddFlags,
) {
    let caches = match ctx.caches() {
        Ok(caches) => caches,
        Err(err) => {
            warn!(%err, "cache enumeration failed");
            return;
        }
    };

    for cache in caches {
        let Ok(client) = cache.principal() else {
            continue;
        };
        if only_lkdc != client.is_lkdc() {
            continue;
        }
        let Ok(unparsed) = client.unparse() else {
            continue;
        };

        let server = if only_lkdc {
            // An LKDC cache is only usable against the host it was
            // minted for.
            let cache_host = cache
                .config(CONFIG_LKDC_HOSTNAME)
                .map(|v| String::from_utf8_lossy(&v).into_owned());
            if cache_host.as_deref() != Some(core.hostname.as_str()) {
                continue;
            }
            let realm = client.realm();
            debug!(client = %unparsed, "adding existing LKDC cache");
            format!("{}/{}@{}", core.service, realm, realm)
        } else {
            debug!(client = %unparsed, "adding existing cache");
            format!("{}/{}@{}", core.service, core.hostname, client.realm())
        };

        let Some((sel, _)) = set.add(
            core,
            &unparsed,
            Some(ClientNameType::Krb5Principal),
            Some(&server),
            Some(ServerNameType::Krb5PrincipalReferral),
            Mechanism::Kerberos,
            flags,
        ) else {
            continue;
        };

        let mut fields = sel.lock_fields();
        if fields.ccache.is_none() {
            if fields.label.is_none() {
                if let Some(name) = cache.config(CONFIG_FRIENDLY_NAME) {
                    fields.label = Some(String::from_utf8_lossy(&name).into_owned());
                }
            }
            fields.ccache = Some(cache);
            fields.have_cred = true;
        }
        // A duplicate that already owns a cache keeps it; this handle
        // just closes.
    }
}

/// Wellknown-LKDC candidates: the username plus one per client
/// certificate with a usable principal or AppleID.
fn wellknown_lkdc(
    core: &Arc<SessionCore>,
    set: &mut SelectionSet,
    hx: &dyn X509Context,
    mech: Mechanism,
    flags: AddFlags,
) {
    let server = format!("{}/localhost@{}", core.service, WELLKNOWN_LKDC);

    if core.password.is_some() {
        let client = format!("{}@{}", core.username, WELLKNOWN_LKDC);
        set.add(
            core,
            &client,
            Some(ClientNameType::Krb5Principal),
            Some(&server),
            Some(ServerNameType::Krb5Principal),
            mech,
            flags,
        );
    }

    for cert in &core.certificates {
        let name = core
            .providers
            .certs
            .kerberos_principal(&**cert)
            .or_else(|| hx.appleid_for_certificate(&**cert).ok());
        let Some(name) = name else {
            continue;
        };
        let client = format!("{}@{}", name, WELLKNOWN_LKDC);
        if let Some((sel, _)) = set.add(
            core,
            &client,
            Some(ClientNameType::Krb5Principal),
            Some(&server),
            Some(ServerNameType::Krb5PrincipalReferral),
            mech,
            flags,
        ) {
            sel.lock_fields().certificate = Some(cert.clone());
        }
    }
}

/// Classic Kerberos candidates from explicit realms in the username,
/// the host realm, and the default realms.
fn classic_kerberos(
    core: &Arc<SessionCore>,
    set: &mut SelectionSet,
    ctx: &dyn KrbContext,
    flags: AddFlags,
) {
    if is_local_hostname(&core.hostname) {
        return;
    }

    // If the user has @REALM, try that out.
    if let Some((_, domain)) = core.username.split_once('@') {
        let server = format!(
            "{}/{}@{}",
            core.service,
            core.hostname,
            domain.to_uppercase()
        );
        set.add(
            core,
            &core.username,
            Some(ClientNameType::Krb5Principal),
            Some(&server),
            Some(ServerNameType::Krb5PrincipalReferral),
            Mechanism::Kerberos,
            flags,
        );
    }

    if let Some((domain, user)) = core.username.split_once('\\') {
        let client = format!("{}@{}", user, domain);
        let server = format!(
            "{}/{}@{}",
            core.service,
            core.hostname,
            domain.to_uppercase()
        );
        set.add(
            core,
            &client,
            Some(ClientNameType::Krb5Principal),
            Some(&server),
            Some(ServerNameType::Krb5PrincipalReferral),
            Mechanism::Kerberos,
            flags.forced(),
        );
    }

    // Try the host realm.
    match ctx.host_realms(&core.hostname) {
        Ok(realms) => add_realms(core, set, &realms, flags),
        Err(err) => debug!(%err, "host realm lookup failed"),
    }

    // Also, just for the heck of it, check default realms.
    match ctx.default_realms() {
        Ok(realms) => add_realms(core, set, &realms, flags),
        Err(err) => debug!(%err, "default realm lookup failed"),
    }
}

fn add_realms(core: &Arc<SessionCore>, set: &mut SelectionSet, realms: &[String], flags: AddFlags) {
    for realm in realms {
        let client = format!("{}@{}", core.username, realm);
        let server = format!("{}/{}@{}", core.service, core.hostname, realm);
        set.add(
            core,
            &client,
            Some(ClientNameType::Krb5Principal),
            Some(&server),
            Some(ServerNameType::Krb5PrincipalReferral),
            Mechanism::Kerberos,
            flags,
        );
    }
}

/// Classic per-host LKDC: certificate fingerprints (and the username
/// when a password exists) with the server left unresolved until a
/// background realm discovery completes.
fn classic_lkdc(core: &Arc<SessionCore>, set: &mut SelectionSet, flags: AddFlags) {
    if !is_local_hostname(&core.hostname) {
        return;
    }

    for cert in &core.certificates {
        let fingerprint = sha1_hex(cert.der_bytes());

        if let Some(label) = core.providers.certs.infer_label(&**cert) {
            debug!(%label, "adding classic LKDC for certificate");
        }

        let Some((sel, duplicate)) = set.add(
            core,
            &fingerprint,
            Some(ClientNameType::Krb5Principal),
            None,
            Some(ServerNameType::Krb5PrincipalReferral),
            Mechanism::Kerberos,
            flags,
        ) else {
            continue;
        };
        if duplicate {
            continue;
        }
        sel.lock_fields().certificate = Some(cert.clone());
        spawn_lkdc_resolver(core, &sel);
    }

    if core.password.is_some() {
        if let Some((sel, duplicate)) = set.add(
            core,
            &core.username,
            Some(ClientNameType::Krb5Principal),
            None,
            Some(ServerNameType::Krb5PrincipalReferral),
            Mechanism::Kerberos,
            flags,
        ) {
            if !duplicate {
                spawn_lkdc_resolver(core, &sel);
            }
        }
    }
}

/// Resolves the host's LKDC realm in the background, rewrites the
/// selection's client and server, then signals the latch. The latch is
/// signalled on failure too, leaving the server unresolved.
fn spawn_lkdc_resolver(core: &Arc<SessionCore>, sel: &Arc<Selection>) {
    let core = core.clone();
    let sel = sel.clone();
    tokio::task::spawn_blocking(move || {
        match core.providers.kerberos.discover_lkdc_realm(&core.hostname) {
            Ok(realm) => {
                let mut fields = sel.lock_fields();
                fields.server = Some(format!("{}/{}@{}", core.service, realm, realm));
                let qualified = format!("{}@{}", fields.client, realm);
                fields.client = qualified;
            }
            Err(err) => {
                warn!(%err, hostname = %core.hostname, "LKDC realm discovery failed");
            }
        }
        sel.latch.signal();
    });
}

/// Uppercase-hex SHA-1 fingerprint of the certificate bytes.
fn sha1_hex(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    digest.iter().map(|b| format!("{:02X}", b)).collect()
}
