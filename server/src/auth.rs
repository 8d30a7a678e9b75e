//! Shared-secret check for inbound messages

/// The relay password. Immutable once the server starts.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Gate in front of the router's dispatch step
#[derive(Debug, Clone)]
pub struct Authenticator {
    secret: Secret,
}

impl Authenticator {
    pub fn new(secret: Secret) -> Self {
        Self { secret }
    }

    /// True iff the credential is exactly the configured secret
    /// (case-sensitive, no trimming). A missing credential never matches.
    pub fn check(&self, credential: Option<&str>) -> bool {
        credential == Some(self.secret.expose())
    }
}
