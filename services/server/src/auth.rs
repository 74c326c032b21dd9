use std::collections::HashMap;

use async_trait::async_trait;

/// What a successful authentication resolves to: the durable identity
/// (`suid`) a `Client` should log in as, plus a display name. Deliberately
/// thin — anything else an application needs (roles, scopes) belongs in
/// application-specific `Value`s set on the `Client` after login, not here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthTicket {
    pub suid: String,
    pub nickname: String,
}

/// Resolves a client-supplied auth token to an `AuthTicket`. The original
/// source calls out to an application-owned database for this; this crate
/// has no opinion on where credentials live, so the lookup is behind a
/// trait object the binary supplies at startup.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Option<AuthTicket>;
}

/// Rejects every token. Useful as a safe default before wiring a real
/// authenticator, and for exercising the unauthenticated-guest path.
pub struct NoopAuthenticator;

#[async_trait]
impl Authenticator for NoopAuthenticator {
    async fn authenticate(&self, _token: &str) -> Option<AuthTicket> {
        None
    }
}

/// Looks tokens up in a fixed in-memory table. Meant for tests and small
/// deployments, not as a production credential store.
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, AuthTicket>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: HashMap<String, AuthTicket>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Option<AuthTicket> {
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_authenticator_always_rejects() {
        assert!(NoopAuthenticator.authenticate("anything").await.is_none());
    }

    #[tokio::test]
    async fn static_token_authenticator_resolves_known_tokens() {
        let mut tokens = HashMap::new();
        tokens.insert(
            "tok-1".to_owned(),
            AuthTicket { suid: "u1".to_owned(), nickname: "Alice".to_owned() },
        );
        let auth = StaticTokenAuthenticator::new(tokens);

        assert_eq!(
            auth.authenticate("tok-1").await,
            Some(AuthTicket { suid: "u1".to_owned(), nickname: "Alice".to_owned() })
        );
        assert!(auth.authenticate("unknown").await.is_none());
    }
}
