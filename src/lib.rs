//! Client-side network authentication negotiation helper
//!
//! Given a target service (hostname plus service class) and whatever
//! the caller knows — a username, a password, client certificates,
//! server-advertised mechanism hints — this crate enumerates a ranked
//! list of candidate authentication **selections**: concrete
//! (mechanism, client principal, server principal, SPNEGO policy)
//! quadruples. On request it acquires the credential behind a chosen
//! selection through pluggable Kerberos and NTLM/IAKERB providers.
//!
//! The crate performs no cryptography and no protocol framing, and it
//! never runs the authenticated session itself; it decides *what to
//! authenticate as* and makes the credential exist.
//!
//! # Example
//!
//! ```rust,ignore
//! use netauth::{Providers, ServerHints, Session, SessionInfo, oid};
//!
//! let session = Session::create(
//!     "fileserver.example.com",
//!     netauth::SERVICE_CIFS,
//!     Some(SessionInfo {
//!         username: Some("DOMAIN\\alice".into()),
//!         password: Some("secret".into()),
//!         server_hints: Some(
//!             ServerHints::new()
//!                 .with_mech(oid::KERBEROS, b"")
//!                 .with_mech(oid::NTLM, b""),
//!         ),
//!         ..Default::default()
//!     }),
//!     providers,
//! )?;
//!
//! for sel in session.selections() {
//!     println!("{:?}", sel);
//! }
//! let preferred = session.selections()[0].clone();
//! preferred.acquire().await?;
//! let info = preferred.auth_info().await;
//! ```
//!
//! # Concurrency
//!
//! `Session::create` runs the guessers synchronously and returns a
//! complete list, but selections whose server principal needs a network
//! lookup (classic LKDC) resolve in background tasks; use
//! [`Selection::wait`] or the projection methods, which wait
//! internally. Creation and acquisition must run inside a tokio
//! runtime. [`Session::cancel`] wakes every waiter with failure.

mod acquire;
mod credref;
mod errors;
mod guess_kerberos;
mod guess_ntlm;
mod latch;
mod mechanism;
mod projection;
mod providers;
mod secure_types;
mod selection;
mod session;
mod user_selections;

pub use credref::{cred_add_reference, cred_remove_reference, find_by_label_and_release};
pub use errors::{NahError, Result};
pub use mechanism::{gssd, oid, ClientNameType, Mechanism, ServerNameType, SPNEGO_NAME};
pub use projection::{AuthInfo, InfoKey, InfoValue};
pub use providers::{
    CertStore, ClientCertificate, GssAcquireDone, GssCredential, GssMech, GssName, GssProvider,
    InitCredsOptions, KerberosProvider, KrbCache, KrbContext, KrbCredentials, KrbInitCreds,
    KrbPrincipal, ParseFlags, PrefsStore, ProviderError, ProviderResult, Providers,
    SubjectAttributes, UserSelectionEntry, X509Context, CONFIG_FRIENDLY_NAME,
    CONFIG_LKDC_HOSTNAME, NAH_CREATED,
};
pub use secure_types::{GssIdentity, SecureString};
pub use selection::Selection;
pub use session::{
    CertificateInput, ServerHints, Session, SessionInfo, SERVICE_AFP, SERVICE_CIFS, SERVICE_HOST,
    SERVICE_VNC,
};
