//! Reference-counted credential labelling
//!
//! Credentials this crate acquires are stamped `nah-created` and can be
//! held/unheld through a reference key (`krb5:<client>` or
//! `ntlm:<client>`). Labels let a caller tag a held credential and
//! later release every credential carrying the tag. Credentials without
//! the `nah-created` marker are never touched.

use tracing::debug;

use crate::providers::{GssMech, GssProvider, NAH_CREATED};
use crate::selection::Selection;

/// Applies a reference-count change (and optionally a label) to the
/// credential addressed by `reference_key`. Returns `false` when the
/// key is malformed, the credential cannot be found, or it was not
/// created by this crate.
pub(crate) fn cred_change(
    gss: &dyn GssProvider,
    reference_key: &str,
    delta: i32,
    label: Option<&str>,
) -> bool {
    debug!(
        key = %reference_key,
        delta,
        label = label.unwrap_or("<nolabel>"),
        "credential reference change"
    );

    let (mech, name) = if let Some(rest) = reference_key.strip_prefix("krb5:") {
        (GssMech::Krb5, rest)
    } else if let Some(rest) = reference_key.strip_prefix("ntlm:") {
        (GssMech::Ntlm, rest)
    } else {
        return false;
    };

    let Ok(gname) = gss.import_user_name(name) else {
        return false;
    };
    let cred = match gss.acquire_cred(&*gname, mech) {
        Ok(cred) => cred,
        Err(err) => {
            debug!(%name, %err, "credential not found");
            return false;
        }
    };

    // Only touch credentials we originated.
    if cred.label(NAH_CREATED).is_none() {
        return false;
    }

    if delta > 0 {
        cred.hold();
    } else if delta < 0 {
        cred.unhold();
    }

    if let Some(label) = label {
        cred.set_label(label, Some(b"1"));
    }

    true
}

/// Adds one reference to the credential addressed by `reference_key`.
pub fn cred_add_reference(gss: &dyn GssProvider, reference_key: &str) -> bool {
    cred_change(gss, reference_key, 1, None)
}

/// Removes one reference from the credential addressed by
/// `reference_key`.
pub fn cred_remove_reference(gss: &dyn GssProvider, reference_key: &str) -> bool {
    cred_change(gss, reference_key, -1, None)
}

/// Releases every crate-created credential carrying `label`: clears the
/// label and drops one reference.
pub fn find_by_label_and_release(gss: &dyn GssProvider, label: &str) {
    debug!(%label, "releasing credentials by label");
    gss.iter_creds(None, &mut |cred| {
        let Some(cred) = cred else {
            return;
        };
        if cred.label(NAH_CREATED).is_none() {
            return;
        }
        if cred.label(label).is_some() {
            debug!(name = %cred.display_name(), "found credential, unholding");
            cred.set_label(label, None);
            cred.unhold();
        }
    });
}

impl Selection {
    /// Adds a reference to this selection's credential and stamps it
    /// with `identifier`, so [`find_by_label_and_release`] can later
    /// drop it. Returns `false` on cancellation or when the credential
    /// is missing or foreign.
    pub async fn add_reference_and_label(&self, identifier: &str) -> bool {
        if !self.latch.wait().await {
            return false;
        }
        let Some(key) = self.reference_key() else {
            return false;
        };
        debug!(key = %key, label = %identifier, "add reference and label");
        cred_change(&*self.core.providers.gss, &key, 1, Some(identifier))
    }
}
