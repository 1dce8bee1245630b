//! Secure Types Module
//!
//! Credential containers that automatically zero sensitive data from
//! memory when dropped, so a caller-supplied password never outlives the
//! session that carried it.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secure string that automatically zeros its contents when dropped.
///
/// Used for the session password and for the password field of a GSS
/// identity. The contents are zeroed from memory when the value goes out
/// of scope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: Vec<u8>,
}

impl SecureString {
    /// Creates a new SecureString, consuming the given String.
    pub fn new(s: String) -> Self {
        Self {
            inner: s.into_bytes(),
        }
    }

    /// Temporarily exposes the secret as a string slice.
    ///
    /// # Security
    /// The returned reference should be used immediately and not stored.
    pub fn expose_secret(&self) -> &str {
        // SecureString is only constructed from String, so the bytes are
        // always valid UTF-8.
        std::str::from_utf8(&self.inner)
            .expect("SecureString invariant violated: contains invalid UTF-8")
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString([REDACTED])")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// A GSS acquisition identity: user, realm, and password.
///
/// Built by the NTLM acquisition path from a selection's client string;
/// the password is zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct GssIdentity {
    /// User part (before the `@`)
    username: String,
    /// Realm part (after the `@`, empty when the client had none)
    realm: String,
    /// Password, zeroed on drop
    password: SecureString,
}

impl GssIdentity {
    pub fn new(username: String, realm: String, password: SecureString) -> Self {
        Self {
            username,
            realm,
            password,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Temporarily exposes the password.
    ///
    /// # Security
    /// Use only at the provider call site; do not store the reference.
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for GssIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GssIdentity")
            .field("username", &self.username)
            .field("realm", &self.realm)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_string_new() {
        let secret = SecureString::new("my_password".to_string());
        assert_eq!(secret.expose_secret(), "my_password");
        assert!(!secret.is_empty());
    }

    #[test]
    fn test_secure_string_empty() {
        let secret = SecureString::new(String::new());
        assert!(secret.is_empty());
    }

    #[test]
    fn test_secure_string_debug_redacts() {
        let secret = SecureString::new("password123".to_string());
        let debug_output = format!("{:?}", secret);
        assert_eq!(debug_output, "SecureString([REDACTED])");
        assert!(!debug_output.contains("password123"));
    }

    #[test]
    fn test_secure_string_display_redacts() {
        let secret = SecureString::new("password123".to_string());
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_gss_identity() {
        let ident = GssIdentity::new(
            "alice".to_string(),
            "CORP".to_string(),
            SecureString::from("secret"),
        );
        assert_eq!(ident.username(), "alice");
        assert_eq!(ident.realm(), "CORP");
        assert_eq!(ident.password(), "secret");
    }

    #[test]
    fn test_gss_identity_debug_redacts() {
        let ident = GssIdentity::new(
            "alice".to_string(),
            String::new(),
            SecureString::from("secret"),
        );
        let debug_output = format!("{:?}", ident);
        assert!(debug_output.contains("alice"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("secret"));
    }
}
