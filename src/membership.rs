//! Repository membership tracking.
//!
//! Membership is derived from the provider's collaborator and invitation
//! lists - never set unilaterally - and cached per (repo, user) with a TTL
//! so gating checks do not hammer the provider.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::github::{ProviderError, RepoId, RepoProvider};
use crate::model::now_string;

/// A user's collaboration state on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipState {
    #[default]
    None,
    Invited,
    Active,
}

impl MembershipState {
    pub fn is_active(self) -> bool {
        self == MembershipState::Active
    }
}

impl std::fmt::Display for MembershipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MembershipState::None => "none",
            MembershipState::Invited => "invited",
            MembershipState::Active => "active",
        };
        write!(f, "{}", s)
    }
}

/// Cached membership lookup for one (repo, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub state: MembershipState,
    /// Legacy flag: true once an invitation exists. Gating must use `state`,
    /// never this field.
    pub joined: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invited_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
    pub checked_at: String,
}

/// TTL-cached membership lookups against the provider.
pub struct MembershipTracker {
    provider: Arc<dyn RepoProvider>,
    ttl: chrono::Duration,
    cache: RwLock<HashMap<(String, String), MembershipRecord>>,
}

impl MembershipTracker {
    pub fn new(provider: Arc<dyn RepoProvider>, ttl_secs: u64) -> Self {
        Self {
            provider,
            ttl: chrono::Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn is_fresh(&self, record: &MembershipRecord) -> bool {
        chrono::DateTime::parse_from_rfc3339(&record.checked_at)
            .map(|checked| chrono::Utc::now().signed_duration_since(checked) < self.ttl)
            .unwrap_or(false)
    }

    /// Current membership of `login` on `repo`, from cache when fresh.
    pub async fn membership(
        &self,
        repo: &RepoId,
        login: &str,
    ) -> Result<MembershipRecord, ProviderError> {
        let key = (repo.to_string(), login.to_string());
        let previous = {
            let cache = self.cache.read().await;
            cache.get(&key).cloned()
        };
        if let Some(record) = &previous {
            if self.is_fresh(record) {
                return Ok(record.clone());
            }
        }

        let collaborators = self.provider.list_collaborators(repo).await?;
        let state = if collaborators.iter().any(|c| c == login) {
            MembershipState::Active
        } else {
            let invitations = self.provider.list_invitations(repo).await?;
            if invitations.iter().any(|i| i == login) {
                MembershipState::Invited
            } else {
                MembershipState::None
            }
        };

        let now = now_string();
        let invited_at = match (&previous, state) {
            (Some(p), _) if p.invited_at.is_some() => p.invited_at.clone(),
            (_, MembershipState::Invited | MembershipState::Active) => Some(now.clone()),
            _ => None,
        };
        let accepted_at = match (&previous, state) {
            (Some(p), _) if p.accepted_at.is_some() => p.accepted_at.clone(),
            (_, MembershipState::Active) => Some(now.clone()),
            _ => None,
        };
        let record = MembershipRecord {
            state,
            joined: state != MembershipState::None,
            invited_at,
            accepted_at,
            checked_at: now,
        };
        self.cache.write().await.insert(key, record.clone());
        Ok(record)
    }

    /// Drop the cached record so the next check hits the provider.
    pub async fn invalidate(&self, repo: &RepoId, login: &str) {
        self.cache
            .write()
            .await
            .remove(&(repo.to_string(), login.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::fake::FakeProvider;

    #[tokio::test]
    async fn derives_state_from_provider_lists() {
        let provider = Arc::new(FakeProvider::new());
        provider.add_repo("acme/shop", "main").await;
        provider.add_collaborator("acme/shop", "carol").await;
        provider.add_invitation("acme/shop", "bob").await;
        let tracker = MembershipTracker::new(provider, 300);
        let repo = RepoId::parse("acme/shop").unwrap();

        assert_eq!(
            tracker.membership(&repo, "carol").await.unwrap().state,
            MembershipState::Active
        );
        let bob = tracker.membership(&repo, "bob").await.unwrap();
        assert_eq!(bob.state, MembershipState::Invited);
        // Legacy flag is set for invitees, but state stays below active.
        assert!(bob.joined);
        assert_eq!(
            tracker.membership(&repo, "mallory").await.unwrap().state,
            MembershipState::None
        );
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_provider_and_invalidate_refreshes() {
        let provider = Arc::new(FakeProvider::new());
        provider.add_repo("acme/shop", "main").await;
        let tracker = MembershipTracker::new(Arc::clone(&provider) as Arc<dyn RepoProvider>, 300);
        let repo = RepoId::parse("acme/shop").unwrap();

        assert_eq!(
            tracker.membership(&repo, "bob").await.unwrap().state,
            MembershipState::None
        );

        // Provider-side acceptance is not visible until the cache expires...
        provider.add_collaborator("acme/shop", "bob").await;
        assert_eq!(
            tracker.membership(&repo, "bob").await.unwrap().state,
            MembershipState::None
        );

        // ...or the record is invalidated.
        tracker.invalidate(&repo, "bob").await;
        assert_eq!(
            tracker.membership(&repo, "bob").await.unwrap().state,
            MembershipState::Active
        );
    }
}
