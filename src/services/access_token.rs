//! Project access token selection and rotation.
//!
//! A token is usable only while it is active, not revoked and expires more
//! than [`SAFETY_MARGIN_DAYS`] from now. When no usable token exists a new
//! one is minted; its secret is only visible in that creation response.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AccessTokenGrant, AccessTokenRecord, NewAccessToken};
use crate::domain::ports::{Clock, RemoteApi};

/// Tokens expiring within this many days are treated as already expired.
pub const SAFETY_MARGIN_DAYS: i64 = 10;

/// Lifetime of a freshly minted token.
pub const TOKEN_LIFETIME_DAYS: i64 = 30;

/// Scopes granted to minted tokens.
pub const TOKEN_SCOPES: &[&str] = &["read_repository"];

/// Reporter access level.
pub const TOKEN_ACCESS_LEVEL: u32 = 20;

/// Usable tokens, newest expiry first.
pub fn usable_tokens(tokens: Vec<AccessTokenRecord>, now: DateTime<Utc>) -> Vec<AccessTokenRecord> {
    let cutoff = now + Duration::days(SAFETY_MARGIN_DAYS);
    let mut usable: Vec<AccessTokenRecord> = tokens
        .into_iter()
        .filter(|t| t.active && !t.revoked && t.expires_at > cutoff)
        .collect();
    usable.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));
    usable
}

/// Select a usable token for `full_path` or mint a new one named `name`.
///
/// Without a UID hint the newest usable token is returned. With a hint the
/// matching usable token is returned; a hint that matches nothing usable is
/// logged and a new token is minted, since the secret behind any other
/// token cannot be recovered.
pub async fn ensure_access_token(
    api: &dyn RemoteApi,
    clock: &dyn Clock,
    full_path: &str,
    name: &str,
    uid_hint: Option<u64>,
) -> DomainResult<AccessTokenGrant> {
    let now = clock.now();
    let usable = usable_tokens(api.list_access_tokens(full_path).await?, now);

    match uid_hint {
        None => {
            if let Some(newest) = usable.first() {
                return Ok(AccessTokenGrant {
                    uid: newest.uid,
                    expires_at: newest.expires_at,
                    token: None,
                });
            }
        }
        Some(uid) => {
            if let Some(matching) = usable.iter().find(|t| t.uid == uid) {
                return Ok(AccessTokenGrant {
                    uid: matching.uid,
                    expires_at: matching.expires_at,
                    token: None,
                });
            }
            warn!(
                repo = full_path,
                uid = uid,
                usable = usable.len(),
                "Recorded access token is missing or about to expire"
            );
        }
    }

    let request = NewAccessToken {
        name: name.to_string(),
        scopes: TOKEN_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        access_level: TOKEN_ACCESS_LEVEL,
        expires_at: now + Duration::days(TOKEN_LIFETIME_DAYS),
    };
    let created = api.create_access_token(full_path, &request).await?;
    let token = created.token.ok_or_else(|| {
        DomainError::Provider(format!(
            "access token {} for {full_path} was created without a secret",
            created.uid
        ))
    })?;

    info!(repo = full_path, uid = created.uid, expires_at = %created.expires_at, "Minted project access token");
    Ok(AccessTokenGrant {
        uid: created.uid,
        expires_at: created.expires_at,
        token: Some(token),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRemote;
    use crate::domain::ports::FixedClock;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn token(uid: u64, days: i64) -> AccessTokenRecord {
        AccessTokenRecord {
            uid,
            name: "repokeeper".into(),
            active: true,
            revoked: false,
            expires_at: now() + Duration::days(days),
            scopes: vec!["read_repository".into()],
            token: None,
        }
    }

    async fn remote_with(tokens: Vec<AccessTokenRecord>) -> InMemoryRemote {
        let remote = InMemoryRemote::new("https://gitlab.example.com");
        remote.seed_project("foo/bar").await;
        for t in tokens {
            remote.seed_token("foo/bar", t).await;
        }
        remote
    }

    #[test]
    fn test_usable_tokens_filters_and_sorts() {
        let mut revoked = token(4, 90);
        revoked.revoked = true;
        let mut inactive = token(5, 90);
        inactive.active = false;

        let usable = usable_tokens(
            vec![token(1, 5), token(2, 40), token(3, 60), revoked, inactive],
            now(),
        );
        assert_eq!(usable.iter().map(|t| t.uid).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[tokio::test]
    async fn test_newest_valid_token_without_hint() {
        let remote = remote_with(vec![token(1, 5), token(2, 40), token(3, 60)]).await;

        let grant = ensure_access_token(&remote, &FixedClock(now()), "foo/bar", "repokeeper", None)
            .await
            .unwrap();

        assert_eq!(grant.uid, 3);
        assert!(grant.token.is_none());
        assert_eq!(remote.call_count("create_access_token").await, 0);
    }

    #[tokio::test]
    async fn test_matching_hint_is_kept() {
        let remote = remote_with(vec![token(2, 40), token(3, 60)]).await;

        let grant =
            ensure_access_token(&remote, &FixedClock(now()), "foo/bar", "repokeeper", Some(2))
                .await
                .unwrap();
        assert_eq!(grant.uid, 2);
    }

    #[tokio::test]
    async fn test_stale_hint_mints_new_token() {
        let remote = remote_with(vec![token(1, 5), token(3, 60)]).await;

        let grant =
            ensure_access_token(&remote, &FixedClock(now()), "foo/bar", "repokeeper", Some(1))
                .await
                .unwrap();

        assert_ne!(grant.uid, 1);
        assert!(grant.token.is_some());
        assert_eq!(grant.expires_at, now() + Duration::days(TOKEN_LIFETIME_DAYS));
        assert_eq!(remote.call_count("create_access_token").await, 1);
    }

    #[tokio::test]
    async fn test_no_valid_token_mints_new_one() {
        let remote = remote_with(vec![token(1, 9)]).await;

        let grant = ensure_access_token(&remote, &FixedClock(now()), "foo/bar", "repokeeper", None)
            .await
            .unwrap();
        assert!(grant.token.is_some());

        let tokens = remote.tokens("foo/bar").await;
        let minted = tokens.iter().find(|t| t.uid == grant.uid).unwrap();
        assert_eq!(minted.scopes, vec!["read_repository".to_string()]);
    }
}
