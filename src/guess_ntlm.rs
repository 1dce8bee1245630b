//! NTLM guesser
//!
//! Runs only for SMB-class services when the server advertises NTLM
//! and the caller supplied no client certificates. Produces
//! password-derived client names plus one candidate per NTLM
//! credential the provider already holds.

use std::sync::Arc;

use tracing::debug;

use crate::mechanism::{oid, Mechanism};
use crate::providers::GssMech;
use crate::session::{AddFlags, SelectionSet, SessionCore};

pub(crate) fn guess_ntlm(core: &Arc<SessionCore>, set: &mut SelectionSet) {
    if !core.hints_contain(oid::NTLM) {
        return;
    }

    let mut flags = AddFlags {
        spnego: true,
        force: false,
    };
    // A server tagging its NTLM hint `raw` wants the mechanism without
    // the SPNEGO wrapping.
    if core.hint_value(oid::NTLM) == Some(b"raw".as_slice()) {
        flags.spnego = false;
    }

    let server = format!("{}@{}", core.service, core.hostname);

    if core.password.is_some() {
        let (client, explicit_realm) = if core.username.contains('@') {
            (core.username.clone(), true)
        } else if let Some((domain, user)) = core.username.split_once('\\') {
            (format!("{}@{}", user, domain), true)
        } else {
            (format!("{}@\\{}", core.username, core.hostname), false)
        };

        debug!(client = %client, server = %server, "ntlm candidate");
        set.add(
            core,
            &client,
            None,
            Some(&server),
            None,
            Mechanism::Ntlm,
            if explicit_realm { flags.forced() } else { flags },
        );

        if let Some(specific) = &core.specific_name {
            let client = format!("{}@\\{}", specific, core.hostname);
            set.add(core, &client, None, Some(&server), None, Mechanism::Ntlm, flags);
        }
    }

    // Pick up NTLM credentials already held by the provider.
    core.providers
        .gss
        .iter_creds(Some(GssMech::Ntlm), &mut |cred| {
            let Some(cred) = cred else {
                return;
            };
            let client = cred.display_name();
            debug!(client = %client, "ntlm cached credential");
            if let Some((sel, _)) = set.add(
                core,
                &client,
                None,
                Some(&server),
                None,
                Mechanism::Ntlm,
                flags,
            ) {
                sel.lock_fields().have_cred = true;
            }
        });
}
