//! Mechanism and name-type tables
//!
//! The mechanism tags a selection can carry, the case-insensitive name
//! table used by preference entries, and the client/server name types
//! with their numeric GSSD projections.

use serde::{Deserialize, Serialize};

/// Mechanism OID identifiers used in server hint maps.
///
/// Hint maps sent by servers key small opaque values by these
/// identifiers; the guessers only test membership (and, for NTLM, probe
/// one value).
pub mod oid {
    pub const KERBEROS: &str = "1.2.840.113554.1.2.2";
    pub const KERBEROS_MICROSOFT: &str = "1.2.840.48018.1.2.2";
    pub const NTLM: &str = "1.3.6.1.4.1.311.2.2.10";
    pub const IAKERB: &str = "1.3.6.1.5.2.5";
    pub const PKU2U: &str = "1.3.6.1.5.2.7";
    pub const SPNEGO: &str = "1.3.6.1.5.5.2";
    /// Pseudo-mechanism a server advertises to announce LKDC support
    pub const APPLE_LKDC: &str = "1.2.752.43.14.3";
}

/// Name of the SPNEGO wrapper, reported as the outer mechanism when a
/// selection has the SPNEGO flag set.
pub const SPNEGO_NAME: &str = "SPNEGO";

/// Authentication mechanism of a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mechanism {
    Kerberos,
    KerberosU2U,
    KerberosIakerb,
    KerberosPku2u,
    Ntlm,
}

impl Mechanism {
    /// Canonical mechanism name, matching the OID-derived spellings.
    pub fn name(self) -> &'static str {
        match self {
            Mechanism::Kerberos => "Kerberos",
            Mechanism::KerberosU2U => "KerberosUser2User",
            Mechanism::KerberosIakerb => "IAKerb",
            Mechanism::KerberosPku2u => "PKU2U",
            Mechanism::Ntlm => "NTLM",
        }
    }

    /// Case-insensitive reverse lookup, used by preference entries.
    pub fn parse(name: &str) -> Option<Mechanism> {
        const TABLE: [Mechanism; 5] = [
            Mechanism::Kerberos,
            Mechanism::KerberosU2U,
            Mechanism::KerberosPku2u,
            Mechanism::KerberosIakerb,
            Mechanism::Ntlm,
        ];
        TABLE
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }

    /// Kerberos-family mechanisms share the `krb5:` reference-key prefix.
    pub fn is_kerberos_family(self) -> bool {
        matches!(
            self,
            Mechanism::Kerberos | Mechanism::KerberosIakerb | Mechanism::KerberosPku2u
        )
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric name-type codes handed to GSSD-style consumers
pub mod gssd {
    pub const USER: i32 = 0;
    pub const KRB5_PRINCIPAL: i32 = 1;
    pub const KRB5_REFERRAL: i32 = 2;
    pub const NTLM_PRINCIPAL: i32 = 3;
    pub const HOSTBASED: i32 = 4;
}

/// How a selection's client string should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClientNameType {
    #[default]
    Username,
    Krb5Principal,
    Krb5PrincipalReferral,
    Uuid,
}

impl ClientNameType {
    pub fn gssd_code(self) -> i32 {
        match self {
            // A UUID travels as a plain user name
            ClientNameType::Uuid => gssd::USER,
            ClientNameType::Krb5Principal => gssd::KRB5_PRINCIPAL,
            ClientNameType::Username => gssd::NTLM_PRINCIPAL,
            ClientNameType::Krb5PrincipalReferral => gssd::USER,
        }
    }
}

/// How a selection's server string should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServerNameType {
    #[default]
    ServiceBased,
    Krb5Principal,
    Krb5PrincipalReferral,
}

impl ServerNameType {
    pub fn gssd_code(self) -> i32 {
        match self {
            ServerNameType::ServiceBased => gssd::HOSTBASED,
            ServerNameType::Krb5PrincipalReferral => gssd::KRB5_REFERRAL,
            ServerNameType::Krb5Principal => gssd::KRB5_PRINCIPAL,
        }
    }
}
