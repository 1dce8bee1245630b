//! User-selection overrides
//!
//! The preference store may carry a `UserSelections` list pinning a
//! client principal to a host. Matching entries are added ahead of
//! every guessed candidate and bypass the specific-name filter.

use std::sync::Arc;

use tracing::debug;

use crate::mechanism::Mechanism;
use crate::session::{AddFlags, SelectionSet, SessionCore};

pub(crate) fn add_user_selections(core: &Arc<SessionCore>, set: &mut SelectionSet) {
    for entry in core.providers.prefs.user_selections() {
        let Some(mech) = Mechanism::parse(&entry.mech) else {
            continue;
        };

        // Exact host matching for now, should really be domain matching.
        if !entry.domain.eq_ignore_ascii_case(&core.hostname) {
            continue;
        }

        // A missing user matches any user.
        if let Some(user) = &entry.user {
            if user != &core.username {
                continue;
            }
        }

        let server = format!("{}@{}", core.service, core.hostname);
        debug!(client = %entry.client, server = %server, mech = %mech, "adding user selection");
        set.add(
            core,
            &entry.client,
            None,
            Some(&server),
            None,
            mech,
            AddFlags {
                spnego: true,
                force: true,
            },
        );
    }
}
