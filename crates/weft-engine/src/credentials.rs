//! Tiered credential discovery and write-through persistence.

use std::sync::Arc;

use tracing::{debug, warn};

use weft_core::{EngineError, SessionCredentials};
use weft_store::{StringStore, StructuredStore, legacy_keys};

use crate::client::IdentityProvider;

/// Structured-tier namespace holding one JSON record per user id.
pub const SESSIONS_NAMESPACE: &str = "sessions";
/// String-tier namespace for the engine's own keys.
pub const STRING_NAMESPACE: &str = "weft";
/// String-tier namespace holding the reference client's legacy flat keys.
pub const LEGACY_NAMESPACE: &str = "legacy";

fn session_key(user_id: &str) -> String {
    format!("session/{user_id}")
}

/// Discovers session credentials across storage tiers, falling back to a
/// remote identity provider, and writes results back for future calls.
pub struct CredentialResolver {
    structured: Arc<dyn StructuredStore>,
    strings: Arc<dyn StringStore>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl CredentialResolver {
    pub fn new(
        structured: Arc<dyn StructuredStore>,
        strings: Arc<dyn StringStore>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            structured,
            strings,
            identity,
        }
    }

    /// Probe tiers in strict priority order; first candidate with a user id
    /// and a non-empty access token wins.
    ///
    /// A hit in the legacy tier or the identity provider is written through
    /// to the structured and string tiers so later calls resolve locally.
    pub async fn resolve(&self, user_id: &str) -> Result<SessionCredentials, EngineError> {
        if let Some(credentials) = self.from_structured_tier(user_id) {
            debug!(user_id, "credentials resolved from structured tier");
            return Ok(credentials);
        }

        if let Some(credentials) = self.from_string_tier(user_id) {
            debug!(user_id, "credentials resolved from string tier");
            return Ok(credentials);
        }

        if let Some(credentials) = self.from_legacy_tier(user_id) {
            debug!(user_id, "credentials resolved from legacy flat keys");
            self.persist(&credentials);
            return Ok(credentials);
        }

        if let Some(identity) = &self.identity {
            match identity.lookup(user_id).await {
                Ok(Some(credentials)) if credentials.is_candidate() => {
                    debug!(user_id, "credentials resolved from identity provider");
                    self.persist(&credentials);
                    return Ok(credentials);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(user_id, error = %err, "identity provider lookup failed");
                }
            }
        }

        Err(EngineError::no_credentials_found(user_id))
    }

    /// Write credentials to the structured and string tiers.
    ///
    /// Write-through failures are logged but never fail the resolution.
    pub fn persist(&self, credentials: &SessionCredentials) {
        match serde_json::to_value(credentials) {
            Ok(value) => {
                if let Err(err) =
                    self.structured
                        .set_value(SESSIONS_NAMESPACE, &credentials.user_id, &value)
                {
                    warn!(user_id = %credentials.user_id, error = %err, "structured-tier write-through failed");
                }
            }
            Err(err) => {
                warn!(user_id = %credentials.user_id, error = %err, "credentials serialization failed");
            }
        }

        match serde_json::to_string(credentials) {
            Ok(encoded) => {
                if let Err(err) = self.strings.set_string(
                    STRING_NAMESPACE,
                    &session_key(&credentials.user_id),
                    &encoded,
                ) {
                    warn!(user_id = %credentials.user_id, error = %err, "string-tier write-through failed");
                }
            }
            Err(err) => {
                warn!(user_id = %credentials.user_id, error = %err, "credentials serialization failed");
            }
        }
    }

    fn from_structured_tier(&self, user_id: &str) -> Option<SessionCredentials> {
        let value = self.structured.get_value(SESSIONS_NAMESPACE, user_id).ok()?;
        let credentials: SessionCredentials = serde_json::from_value(value)
            .map_err(|err| {
                warn!(user_id, error = %err, "structured-tier entry is malformed");
                err
            })
            .ok()?;
        credentials.is_candidate().then_some(credentials)
    }

    fn from_string_tier(&self, user_id: &str) -> Option<SessionCredentials> {
        let raw = self
            .strings
            .get_string(STRING_NAMESPACE, &session_key(user_id))
            .ok()?;
        let credentials: SessionCredentials = serde_json::from_str(&raw)
            .map_err(|err| {
                warn!(user_id, error = %err, "string-tier entry is malformed");
                err
            })
            .ok()?;
        credentials.is_candidate().then_some(credentials)
    }

    fn from_legacy_tier(&self, user_id: &str) -> Option<SessionCredentials> {
        let legacy_user = self
            .strings
            .get_string(LEGACY_NAMESPACE, legacy_keys::USER_ID)
            .ok()?;
        if legacy_user != user_id {
            debug!(user_id, %legacy_user, "legacy flat keys belong to a different user");
            return None;
        }

        let access_token = self
            .strings
            .get_string(LEGACY_NAMESPACE, legacy_keys::ACCESS_TOKEN)
            .ok()?;
        let device_id = self
            .strings
            .get_string(LEGACY_NAMESPACE, legacy_keys::DEVICE_ID)
            .unwrap_or_default();
        let homeserver_url = self
            .strings
            .get_string(LEGACY_NAMESPACE, legacy_keys::HOMESERVER_URL)
            .unwrap_or_default();

        let credentials = SessionCredentials {
            user_id: legacy_user,
            access_token,
            device_id,
            homeserver_url,
            password: None,
        };
        credentials.is_candidate().then_some(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weft_store::{InMemoryStringStore, InMemoryStructuredStore};

    const USER: &str = "@alice:example.org";

    fn credentials(token: &str) -> SessionCredentials {
        SessionCredentials {
            user_id: USER.into(),
            access_token: token.into(),
            device_id: "DEV1".into(),
            homeserver_url: "https://matrix.example.org".into(),
            password: None,
        }
    }

    struct CountingProvider {
        result: Option<SessionCredentials>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn lookup(&self, _user_id: &str) -> Result<Option<SessionCredentials>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    fn resolver_with(
        structured: InMemoryStructuredStore,
        strings: InMemoryStringStore,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> CredentialResolver {
        CredentialResolver::new(Arc::new(structured), Arc::new(strings), identity)
    }

    #[tokio::test]
    async fn structured_tier_wins_over_later_tiers() {
        let structured = InMemoryStructuredStore::default();
        let strings = InMemoryStringStore::default();
        structured
            .set_value(
                SESSIONS_NAMESPACE,
                USER,
                &serde_json::to_value(credentials("tier1")).unwrap(),
            )
            .unwrap();
        strings
            .set_string(
                STRING_NAMESPACE,
                &session_key(USER),
                &serde_json::to_string(&credentials("tier2")).unwrap(),
            )
            .unwrap();

        let resolver = resolver_with(structured, strings, None);
        let resolved = resolver.resolve(USER).await.expect("resolution");
        assert_eq!(resolved.access_token, "tier1");
    }

    #[tokio::test]
    async fn legacy_flat_keys_resolve_and_write_through() {
        let structured = InMemoryStructuredStore::default();
        let strings = InMemoryStringStore::default();
        strings
            .set_string(LEGACY_NAMESPACE, legacy_keys::USER_ID, USER)
            .unwrap();
        strings
            .set_string(LEGACY_NAMESPACE, legacy_keys::ACCESS_TOKEN, "legacy_token")
            .unwrap();
        strings
            .set_string(LEGACY_NAMESPACE, legacy_keys::DEVICE_ID, "LEGACYDEV")
            .unwrap();
        strings
            .set_string(
                LEGACY_NAMESPACE,
                legacy_keys::HOMESERVER_URL,
                "https://matrix.example.org",
            )
            .unwrap();

        let resolver = resolver_with(structured.clone(), strings.clone(), None);
        let resolved = resolver.resolve(USER).await.expect("resolution");
        assert_eq!(resolved.access_token, "legacy_token");

        // Both faster tiers now hold the record.
        let tier1 = structured.get_value(SESSIONS_NAMESPACE, USER).unwrap();
        assert_eq!(tier1["access_token"], "legacy_token");
        let tier2 = strings
            .get_string(STRING_NAMESPACE, &session_key(USER))
            .unwrap();
        assert!(tier2.contains("legacy_token"));
    }

    #[tokio::test]
    async fn skips_empty_token_candidates() {
        let structured = InMemoryStructuredStore::default();
        let strings = InMemoryStringStore::default();
        structured
            .set_value(
                SESSIONS_NAMESPACE,
                USER,
                &serde_json::to_value(credentials("")).unwrap(),
            )
            .unwrap();

        let resolver = resolver_with(structured, strings, None);
        let err = resolver.resolve(USER).await.expect_err("must fail");
        assert_eq!(err.code, "no_credentials_found");
    }

    #[tokio::test]
    async fn identity_provider_is_probed_last_and_written_through() {
        let structured = InMemoryStructuredStore::default();
        let strings = InMemoryStringStore::default();
        let provider = Arc::new(CountingProvider {
            result: Some(credentials("remote_token")),
            calls: AtomicUsize::new(0),
        });

        let resolver = resolver_with(structured.clone(), strings, Some(provider.clone()));
        let resolved = resolver.resolve(USER).await.expect("resolution");
        assert_eq!(resolved.access_token, "remote_token");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // Second resolve hits the structured tier without a remote call.
        let resolved = resolver.resolve(USER).await.expect("resolution");
        assert_eq!(resolved.access_token, "remote_token");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fails_with_no_credentials_found_when_all_tiers_miss() {
        let resolver = resolver_with(
            InMemoryStructuredStore::default(),
            InMemoryStringStore::default(),
            Some(Arc::new(CountingProvider {
                result: None,
                calls: AtomicUsize::new(0),
            })),
        );
        let err = resolver.resolve(USER).await.expect_err("must fail");
        assert_eq!(err.code, "no_credentials_found");
    }

    #[tokio::test]
    async fn legacy_keys_for_other_user_are_ignored() {
        let structured = InMemoryStructuredStore::default();
        let strings = InMemoryStringStore::default();
        strings
            .set_string(LEGACY_NAMESPACE, legacy_keys::USER_ID, "@bob:example.org")
            .unwrap();
        strings
            .set_string(LEGACY_NAMESPACE, legacy_keys::ACCESS_TOKEN, "bob_token")
            .unwrap();

        let resolver = resolver_with(structured, strings, None);
        let err = resolver.resolve(USER).await.expect_err("must fail");
        assert_eq!(err.code, "no_credentials_found");
    }
}
