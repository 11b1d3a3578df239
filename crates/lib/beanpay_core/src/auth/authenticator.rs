//! Login and refresh-token rotation.
//!
//! Every login starts a refresh *chain*. Each successful refresh appends a new
//! link to the same chain, and only the newest link may be exchanged. If an
//! older link is ever presented again, someone is replaying a rotated token.
//! The whole chain is then revoked and the legitimate holder has to log in
//! again as well.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AuthError;
use super::jwt::TokenSignatory;
use super::password::{self, DEFAULT_BCRYPT_COST};
use crate::clock::Clock;
use crate::models::auth::{RefreshToken, User};
use crate::store::{CredentialStore, RefreshTokenLedger, StoreError};

/// Access token lifetime: 15 minutes.
const ACCESS_TOKEN_EXPIRY_MINS: i64 = 15;

/// Refresh token lifetime: 90 days.
const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 90;

/// How long each kind of token stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(ACCESS_TOKEN_EXPIRY_MINS),
            refresh: Duration::days(REFRESH_TOKEN_EXPIRY_DAYS),
        }
    }
}

/// Result of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub access_token_expiration: DateTime<Utc>,
    /// Newest link of the chain; its id goes back to the client.
    pub refresh_token: RefreshToken,
    pub refresh_token_expiration: DateTime<Utc>,
}

/// Where a presented refresh token stands relative to its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    /// Not in the ledger (garbage, or its chain was already revoked).
    Absent,
    /// Present, but a newer link exists: the token was replayed.
    Stale(RefreshToken),
    /// The newest link, but older than the refresh lifetime.
    Expired(RefreshToken),
    /// The newest link and still fresh.
    Current(RefreshToken),
}

/// Orchestrates credential checks, access-token issuance and chain rotation.
pub struct Authenticator {
    users: Arc<dyn CredentialStore>,
    ledger: Arc<dyn RefreshTokenLedger>,
    signatory: Arc<TokenSignatory>,
    clock: Arc<dyn Clock>,
    lifetimes: TokenLifetimes,
    bcrypt_cost: u32,
}

impl Authenticator {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        ledger: Arc<dyn RefreshTokenLedger>,
        signatory: Arc<TokenSignatory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            ledger,
            signatory,
            clock,
            lifetimes: TokenLifetimes::default(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    pub fn with_lifetimes(mut self, lifetimes: TokenLifetimes) -> Self {
        self.lifetimes = lifetimes;
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn signatory(&self) -> &TokenSignatory {
        &self.signatory
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Create a user. A taken email surfaces as `Store(Conflict)`.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let cost = self.bcrypt_cost;
        let password = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || password::hash_password(&password, cost))
            .await
            .map_err(|e| AuthError::Password(format!("hashing task: {e}")))??;

        let user = self.users.insert_user(email, &hash).await?;
        info!(user_id = %user.id, "registered user");
        Ok(user)
    }

    /// Delete a user and, by cascade, everything they own.
    pub async fn close_account(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.users.delete_user(user_id).await?;
        info!(user_id = %user_id, "closed account");
        Ok(())
    }

    /// Check email + password and start a new refresh chain.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedTokens, AuthError> {
        let record = match self.users.fetch_user_by_email(email).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Err(AuthError::Unauthorized),
            Err(e) => return Err(e.into()),
        };

        let password = password.to_owned();
        let hash = record.password_hash;
        let matches =
            tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
                .await
                .map_err(|e| AuthError::Password(format!("verify task: {e}")))??;
        if !matches {
            return Err(AuthError::Unauthorized);
        }

        let chain_id = Uuid::new_v4();
        let link = self.ledger.insert(chain_id, record.user.id).await?;
        info!(user_id = %record.user.id, chain_id = %chain_id, "login succeeded");
        self.issue(link)
    }

    /// Exchange the presented refresh token id for a fresh token pair.
    pub async fn refresh(&self, presented: &str) -> Result<IssuedTokens, AuthError> {
        match self.classify(presented).await? {
            ChainState::Absent => Err(AuthError::Unauthorized),
            ChainState::Stale(token) => self.on_stale(token).await,
            ChainState::Expired(token) => self.on_expired(token).await,
            ChainState::Current(token) => self.on_current(token).await,
        }
    }

    /// Place the presented token in its chain without changing anything.
    pub async fn classify(&self, presented: &str) -> Result<ChainState, AuthError> {
        let Ok(id) = Uuid::parse_str(presented) else {
            return Ok(ChainState::Absent);
        };

        let token = match self.ledger.fetch_by_id(id).await {
            Ok(token) => token,
            Err(StoreError::NotFound) => return Ok(ChainState::Absent),
            Err(e) => return Err(e.into()),
        };

        let latest = match self.ledger.fetch_most_recent_in_chain(token.chain_id).await {
            Ok(latest) => latest,
            Err(StoreError::NotFound) => {
                return Err(AuthError::Invariant(format!(
                    "chain {} has no latest link but contains {}",
                    token.chain_id, token.id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if latest.id != token.id {
            return Ok(ChainState::Stale(token));
        }
        if self.clock.now() - token.created_at > self.lifetimes.refresh {
            return Ok(ChainState::Expired(token));
        }
        Ok(ChainState::Current(token))
    }

    /// Drop chains that can no longer be refreshed: their newest link is
    /// already past the refresh window, so every link would classify as
    /// `Expired`. Returns the number of links removed.
    pub async fn prune_expired_chains(&self) -> Result<u64, AuthError> {
        let cutoff = self.clock.now() - self.lifetimes.refresh;
        let pruned = self.ledger.prune_chains_before(cutoff).await?;
        if pruned > 0 {
            info!(pruned, %cutoff, "pruned expired refresh chains");
        }
        Ok(pruned)
    }

    async fn on_stale(&self, token: RefreshToken) -> Result<IssuedTokens, AuthError> {
        warn!(
            user_id = %token.user_id,
            chain_id = %token.chain_id,
            token_id = %token.id,
            "refresh token reuse detected, revoking chain"
        );
        self.revoke_chain(&token).await?;
        Err(AuthError::Unauthorized)
    }

    async fn on_expired(&self, token: RefreshToken) -> Result<IssuedTokens, AuthError> {
        info!(
            user_id = %token.user_id,
            chain_id = %token.chain_id,
            "refresh chain expired, revoking"
        );
        self.revoke_chain(&token).await?;
        Err(AuthError::Unauthorized)
    }

    async fn on_current(&self, token: RefreshToken) -> Result<IssuedTokens, AuthError> {
        match self.ledger.rotate(&token).await {
            Ok(next) => {
                debug!(chain_id = %next.chain_id, token_id = %next.id, "rotated refresh token");
                self.issue(next)
            }
            // A concurrent request exchanged the same link first.
            Err(StoreError::Superseded) => self.on_stale(token).await,
            // The chain was revoked between classification and rotation.
            Err(StoreError::NotFound) => Err(AuthError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the token's chain. An already-empty chain counts as revoked;
    /// any other failure is surfaced so a half-done revocation is never hidden.
    async fn revoke_chain(&self, token: &RefreshToken) -> Result<(), AuthError> {
        match self.ledger.delete_chain(token.chain_id).await {
            Ok(deleted) => {
                debug!(chain_id = %token.chain_id, deleted, "revoked refresh chain");
                Ok(())
            }
            Err(StoreError::NotFound) => {
                debug!(chain_id = %token.chain_id, "refresh chain already revoked");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn issue(&self, refresh_token: RefreshToken) -> Result<IssuedTokens, AuthError> {
        let now = self.clock.now().trunc_subsecs(0);
        let access_token_expiration = now + self.lifetimes.access;
        let access_token = self
            .signatory
            .issue(refresh_token.user_id, access_token_expiration)?;
        Ok(IssuedTokens {
            access_token,
            access_token_expiration,
            refresh_token_expiration: now + self.lifetimes.refresh,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::auth::SignatoryError;
    use crate::clock::ManualClock;
    use crate::store::{MemoryStore, StoreResult};

    const EMAIL: &str = "user@domain.com";
    const PASSWORD: &str = "some-great-password";

    struct Harness {
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        auth: Authenticator,
    }

    fn harness_with_ledger(
        ledger: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn RefreshTokenLedger>,
    ) -> Harness {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let signatory = Arc::new(TokenSignatory::new(b"test-signing-key", clock.clone()));
        let auth = Authenticator::new(
            store.clone(),
            ledger(store.clone()),
            signatory,
            clock.clone(),
        )
        .with_bcrypt_cost(4);
        Harness { clock, store, auth }
    }

    async fn harness() -> Harness {
        let h = harness_with_ledger(|store| store as Arc<dyn RefreshTokenLedger>);
        h.auth.register(EMAIL, PASSWORD).await.unwrap();
        h
    }

    fn id_of(tokens: &IssuedTokens) -> String {
        tokens.refresh_token.id.to_string()
    }

    #[tokio::test]
    async fn login_issues_access_token_and_one_link_chain() {
        let h = harness().await;
        let tokens = h.auth.login(EMAIL, PASSWORD).await.unwrap();

        let claims = h.auth.signatory().verify(&tokens.access_token).unwrap();
        assert_eq!(claims.user_id, tokens.refresh_token.user_id);
        assert_eq!(
            tokens.access_token_expiration,
            h.clock.now() + Duration::minutes(15)
        );
        assert_eq!(claims.expires_at(), tokens.access_token_expiration);

        let chains = h.store.chains_for_user(claims.user_id).await;
        assert_eq!(chains, vec![tokens.refresh_token.chain_id]);
        assert_eq!(h.store.chain(chains[0]).await.len(), 1);
    }

    #[tokio::test]
    async fn every_login_starts_a_new_chain() {
        let h = harness().await;
        let a = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        let b = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        assert_ne!(a.refresh_token.chain_id, b.refresh_token.chain_id);
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let h = harness().await;
        assert!(matches!(
            h.auth.login("nobody@domain.com", PASSWORD).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            h.auth.login(EMAIL, "wrong-password").await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn register_rejects_taken_email() {
        let h = harness().await;
        let err = h.auth.register(EMAIL, PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::Store(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn refresh_rotates_within_the_same_chain() {
        let h = harness().await;
        let t0 = h.auth.login(EMAIL, PASSWORD).await.unwrap();

        h.clock.advance(Duration::minutes(20));
        let t1 = h.auth.refresh(&id_of(&t0)).await.unwrap();

        assert_eq!(t1.refresh_token.chain_id, t0.refresh_token.chain_id);
        assert_ne!(t1.refresh_token.id, t0.refresh_token.id);
        assert_eq!(
            h.auth.signatory().verify(&t1.access_token).unwrap().user_id,
            t0.refresh_token.user_id
        );
        assert!(matches!(
            h.auth.classify(&id_of(&t0)).await.unwrap(),
            ChainState::Stale(_)
        ));
        assert!(matches!(
            h.auth.classify(&id_of(&t1)).await.unwrap(),
            ChainState::Current(_)
        ));
    }

    #[tokio::test]
    async fn replaying_a_rotated_token_revokes_the_whole_chain() {
        let h = harness().await;
        let t0 = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        let t1 = h.auth.refresh(&id_of(&t0)).await.unwrap();

        assert!(matches!(
            h.auth.refresh(&id_of(&t0)).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(h.store.chain(t0.refresh_token.chain_id).await.is_empty());
        assert!(matches!(
            h.auth.refresh(&id_of(&t1)).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn replay_leaves_other_chains_alone() {
        let h = harness().await;
        let phone = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        let laptop = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        h.auth.refresh(&id_of(&phone)).await.unwrap();
        h.auth.refresh(&id_of(&phone)).await.unwrap_err();

        assert!(h.auth.refresh(&id_of(&laptop)).await.is_ok());
    }

    #[tokio::test]
    async fn expired_chain_is_revoked() {
        let h = harness().await;
        let t0 = h.auth.login(EMAIL, PASSWORD).await.unwrap();

        h.clock.advance(Duration::days(90) + Duration::seconds(1));
        assert!(matches!(
            h.auth.classify(&id_of(&t0)).await.unwrap(),
            ChainState::Expired(_)
        ));
        assert!(matches!(
            h.auth.refresh(&id_of(&t0)).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(h.store.chain(t0.refresh_token.chain_id).await.is_empty());
        assert!(matches!(
            h.auth.refresh(&id_of(&t0)).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn token_exactly_at_the_window_is_still_current() {
        let h = harness().await;
        let t0 = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        h.clock.advance(Duration::days(90));
        assert!(h.auth.refresh(&id_of(&t0)).await.is_ok());
    }

    #[tokio::test]
    async fn rotation_resets_the_refresh_window() {
        let h = harness().await;
        let t0 = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        h.clock.advance(Duration::days(60));
        let t1 = h.auth.refresh(&id_of(&t0)).await.unwrap();
        h.clock.advance(Duration::days(60));
        assert!(h.auth.refresh(&id_of(&t1)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_or_garbage_tokens_are_unauthorized() {
        let h = harness().await;
        for presented in ["invalid-refresh-token", "", &Uuid::new_v4().to_string()] {
            assert!(matches!(
                h.auth.refresh(presented).await,
                Err(AuthError::Unauthorized)
            ));
        }
    }

    #[tokio::test]
    async fn concurrent_refreshes_of_one_token_let_exactly_one_through() {
        let h = harness().await;
        let t0 = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        let id = id_of(&t0);

        let (a, b) = tokio::join!(h.auth.refresh(&id), h.auth.refresh(&id));
        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "a = {a:?}, b = {b:?}");
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(loser, Err(AuthError::Unauthorized)));

        // The losing request replayed a superseded link, so the chain is gone.
        assert!(h.store.chain(t0.refresh_token.chain_id).await.is_empty());
    }

    #[tokio::test]
    async fn pruning_removes_only_chains_past_the_refresh_window() {
        let h = harness().await;
        let stale = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        h.clock.advance(Duration::days(30));
        let fresh = h.auth.login(EMAIL, PASSWORD).await.unwrap();

        h.clock.advance(Duration::days(60));
        assert_eq!(h.auth.prune_expired_chains().await.unwrap(), 0);

        h.clock.advance(Duration::seconds(1));
        assert_eq!(h.auth.prune_expired_chains().await.unwrap(), 1);
        assert!(h.store.chain(stale.refresh_token.chain_id).await.is_empty());
        assert!(h.auth.refresh(&id_of(&fresh)).await.is_ok());
    }

    #[tokio::test]
    async fn issued_access_tokens_expire_after_fifteen_minutes() {
        let h = harness().await;
        let t0 = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        h.clock.advance(Duration::minutes(15));
        assert_eq!(
            h.auth.signatory().verify(&t0.access_token),
            Err(SignatoryError::Expired)
        );
    }

    /// Ledger whose chain deletion always fails.
    struct BrokenDelete(Arc<MemoryStore>);

    #[async_trait]
    impl RefreshTokenLedger for BrokenDelete {
        async fn insert(&self, chain_id: Uuid, user_id: Uuid) -> StoreResult<RefreshToken> {
            self.0.insert(chain_id, user_id).await
        }
        async fn fetch_by_id(&self, id: Uuid) -> StoreResult<RefreshToken> {
            self.0.fetch_by_id(id).await
        }
        async fn fetch_most_recent_in_chain(&self, chain_id: Uuid) -> StoreResult<RefreshToken> {
            self.0.fetch_most_recent_in_chain(chain_id).await
        }
        async fn delete_chain(&self, _chain_id: Uuid) -> StoreResult<u64> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn rotate(&self, presented: &RefreshToken) -> StoreResult<RefreshToken> {
            self.0.rotate(presented).await
        }
        async fn prune_chains_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
            self.0.prune_chains_before(cutoff).await
        }
    }

    #[tokio::test]
    async fn failed_revocation_is_surfaced_not_hidden() {
        let h = harness_with_ledger(|store| Arc::new(BrokenDelete(store)) as Arc<dyn RefreshTokenLedger>);
        h.auth.register(EMAIL, PASSWORD).await.unwrap();
        let t0 = h.auth.login(EMAIL, PASSWORD).await.unwrap();
        h.auth.refresh(&id_of(&t0)).await.unwrap();

        let err = h.auth.refresh(&id_of(&t0)).await.unwrap_err();
        assert!(matches!(err, AuthError::Store(StoreError::Database(_))));
        assert_eq!(h.store.chain(t0.refresh_token.chain_id).await.len(), 2);
    }

    /// Ledger where another request always wins the rotation race.
    struct LosesRace(Arc<MemoryStore>);

    #[async_trait]
    impl RefreshTokenLedger for LosesRace {
        async fn insert(&self, chain_id: Uuid, user_id: Uuid) -> StoreResult<RefreshToken> {
            self.0.insert(chain_id, user_id).await
        }
        async fn fetch_by_id(&self, id: Uuid) -> StoreResult<RefreshToken> {
            self.0.fetch_by_id(id).await
        }
        async fn fetch_most_recent_in_chain(&self, chain_id: Uuid) -> StoreResult<RefreshToken> {
            self.0.fetch_most_recent_in_chain(chain_id).await
        }
        async fn delete_chain(&self, chain_id: Uuid) -> StoreResult<u64> {
            self.0.delete_chain(chain_id).await
        }
        async fn rotate(&self, presented: &RefreshToken) -> StoreResult<RefreshToken> {
            self.0.rotate(presented).await?;
            self.0.rotate(presented).await
        }
        async fn prune_chains_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
            self.0.prune_chains_before(cutoff).await
        }
    }

    #[tokio::test]
    async fn losing_the_rotation_race_revokes_the_chain() {
        let h = harness_with_ledger(|store| Arc::new(LosesRace(store)) as Arc<dyn RefreshTokenLedger>);
        h.auth.register(EMAIL, PASSWORD).await.unwrap();
        let t0 = h.auth.login(EMAIL, PASSWORD).await.unwrap();

        assert!(matches!(
            h.auth.refresh(&id_of(&t0)).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(h.store.chain(t0.refresh_token.chain_id).await.is_empty());
    }
}
