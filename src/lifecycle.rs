//! Voucher lifecycle: creation, update, resize and deletion.
//!
//! This is the administrative surface. Owner authorization is enforced by the
//! calling handler; every operation here assumes the caller is allowed to
//! touch the voucher.

use std::sync::Arc;

use chrono::Utc;

use crate::config::TokenStrategy;
use crate::error::{Error, Result};
use crate::model::{
    random_hash, CreateVoucherData, DerivedTokens, RandomTokens, Secret, TokenDeriver, Voucher,
};
use crate::store::VoucherStore;

/// Upper bound on redeemable units per voucher.
pub const MAX_USES: u16 = 250;

/// Creation, resize, update and deletion of vouchers.
pub struct VoucherLifecycle {
    store: Arc<dyn VoucherStore>,
    deriver: Arc<dyn TokenDeriver>,
}

impl VoucherLifecycle {
    /// Build a lifecycle over the given store with the configured token
    /// strategy.
    pub fn new(store: Arc<dyn VoucherStore>, tokens: TokenStrategy) -> Self {
        let deriver: Arc<dyn TokenDeriver> = match tokens {
            TokenStrategy::Random => Arc::new(RandomTokens),
            TokenStrategy::Derived => Arc::new(DerivedTokens),
        };
        Self { store, deriver }
    }

    /// Validate input, generate the voucher and one secret per unit, persist.
    pub async fn create(&self, data: CreateVoucherData, wallet: &str) -> Result<Voucher> {
        validate(&data)?;

        let id: String = random_hash().chars().take(22).collect();
        let salt = random_hash();
        let now = Utc::now();
        let open_time = now.timestamp() + data.wait_time as i64;

        let secrets = (0..data.uses as u32)
            .map(|index| Secret {
                index,
                k1: self.deriver.derive(&id, &salt, index),
                amount: data.max_withdrawable,
                used: false,
                used_at: None,
                available_at: open_time,
            })
            .collect();

        let voucher = Voucher {
            id,
            wallet: wallet.to_string(),
            title: data.title,
            min_withdrawable: data.min_withdrawable,
            max_withdrawable: data.max_withdrawable,
            uses: data.uses,
            wait_time: data.wait_time,
            is_unique: data.is_unique,
            unique_hash: random_hash(),
            salt,
            open_time,
            used: 0,
            secrets,
            webhook_url: data.webhook_url,
            webhook_headers: data.webhook_headers,
            webhook_body: data.webhook_body,
            custom_url: data.custom_url,
            created_at: now,
        };

        tracing::info!(
            voucher_id = %voucher.id,
            wallet = %voucher.wallet,
            uses = voucher.uses,
            is_unique = voucher.is_unique,
            "Voucher created"
        );

        self.store.insert(voucher.clone()).await?;
        Ok(voucher)
    }

    /// Change the number of redeemable units.
    ///
    /// Growing appends fresh secrets with strictly increasing indices;
    /// shrinking truncates only unused tail entries and fails if that would
    /// drop below the consumed count. Used secrets are never touched.
    pub async fn resize(&self, id: &str, new_uses: u16) -> Result<Voucher> {
        if new_uses < 1 || new_uses > MAX_USES {
            return Err(Error::validation(format!(
                "`uses` must be between 1 and {MAX_USES}"
            )));
        }
        let deriver = self.deriver.clone();
        self.store
            .update_with(id, Box::new(move |v| apply_resize(v, new_uses, &*deriver)))
            .await
    }

    /// Replace the voucher's mutable fields; a changed `uses` goes through
    /// the resize path.
    pub async fn update(&self, id: &str, data: CreateVoucherData) -> Result<Voucher> {
        validate(&data)?;
        let deriver = self.deriver.clone();
        self.store
            .update_with(
                id,
                Box::new(move |v| {
                    v.title = data.title;
                    v.min_withdrawable = data.min_withdrawable;
                    v.max_withdrawable = data.max_withdrawable;
                    v.wait_time = data.wait_time;
                    v.is_unique = data.is_unique;
                    v.webhook_url = data.webhook_url;
                    v.webhook_headers = data.webhook_headers;
                    v.webhook_body = data.webhook_body;
                    v.custom_url = data.custom_url;
                    if data.uses != v.uses {
                        apply_resize(v, data.uses, &*deriver)?;
                    }
                    Ok(())
                }),
            )
            .await
    }

    /// Remove a voucher and all its secrets. No-op if absent.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await
    }

    /// Fetch by admin id.
    pub async fn get(&self, id: &str) -> Result<Option<Voucher>> {
        self.store.get(id).await
    }

    /// Fetch by public share identifier.
    pub async fn get_by_unique_hash(&self, unique_hash: &str) -> Result<Option<Voucher>> {
        self.store.get_by_unique_hash(unique_hash).await
    }

    /// Page through vouchers funded by the given wallets.
    pub async fn list(
        &self,
        wallets: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Voucher>, usize)> {
        self.store.list(wallets, limit, offset).await
    }
}

/// Input validation shared by create and update.
fn validate(data: &CreateVoucherData) -> Result<()> {
    if data.uses < 1 || data.uses > MAX_USES {
        return Err(Error::validation(format!(
            "`uses` must be between 1 and {MAX_USES}"
        )));
    }
    if data.min_withdrawable < 1 {
        return Err(Error::validation("`min_withdrawable` must be >= 1"));
    }
    if data.max_withdrawable < data.min_withdrawable {
        return Err(Error::validation(
            "`max_withdrawable` must be >= `min_withdrawable`",
        ));
    }
    if let Some(headers) = &data.webhook_headers {
        let parsed: serde_json::Value = serde_json::from_str(headers)
            .map_err(|_| Error::validation("`webhook_headers` must be valid JSON"))?;
        if !parsed.is_object() {
            return Err(Error::validation("`webhook_headers` must be a JSON object"));
        }
    }
    if let Some(body) = &data.webhook_body {
        serde_json::from_str::<serde_json::Value>(body)
            .map_err(|_| Error::validation("`webhook_body` must be valid JSON"))?;
    }
    Ok(())
}

/// Resize in place. Runs inside the store's atomic update.
fn apply_resize(v: &mut Voucher, new_uses: u16, deriver: &dyn TokenDeriver) -> Result<()> {
    if new_uses < v.uses {
        if new_uses <= v.used {
            return Err(Error::InvalidState(format!(
                "cannot shrink to {new_uses} uses: {} already consumed",
                v.used
            )));
        }
        // Drop unused entries from the tail only; used ones stay put.
        let mut to_remove = v.secrets.len().saturating_sub(new_uses as usize);
        let mut i = v.secrets.len();
        while to_remove > 0 && i > 0 {
            i -= 1;
            if !v.secrets[i].used {
                v.secrets.remove(i);
                to_remove -= 1;
            }
        }
        if to_remove > 0 {
            return Err(Error::InvalidState(
                "cannot shrink: not enough unused secrets to truncate".to_string(),
            ));
        }
    } else if new_uses > v.uses {
        let next_index = v.secrets.iter().map(|s| s.index + 1).max().unwrap_or(0);
        let count = (new_uses - v.uses) as u32;
        let available_at = Utc::now().timestamp() + v.wait_time as i64;
        for offset in 0..count {
            let index = next_index + offset;
            v.secrets.push(Secret {
                index,
                k1: deriver.derive(&v.id, &v.salt, index),
                amount: v.max_withdrawable,
                used: false,
                used_at: None,
                available_at,
            });
        }
    }
    v.uses = new_uses;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn lifecycle() -> VoucherLifecycle {
        VoucherLifecycle::new(Arc::new(MemoryStore::new()), TokenStrategy::Random)
    }

    fn data(uses: u16) -> CreateVoucherData {
        CreateVoucherData {
            title: "test".into(),
            min_withdrawable: 10,
            max_withdrawable: 20,
            uses,
            wait_time: 0,
            is_unique: false,
            webhook_url: None,
            webhook_headers: None,
            webhook_body: None,
            custom_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_materializes_one_secret_per_unit() {
        let lifecycle = lifecycle();
        let voucher = lifecycle.create(data(5), "w1").await.unwrap();

        assert_eq!(voucher.secrets.len(), 5);
        assert_eq!(voucher.used, 0);
        let indices: Vec<u32> = voucher.secrets.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        for secret in &voucher.secrets {
            assert_eq!(secret.amount, 20);
            assert!(!secret.used);
        }
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let lifecycle = lifecycle();

        let mut bad = data(0);
        assert!(matches!(
            lifecycle.create(bad, "w1").await,
            Err(Error::Validation(_))
        ));

        bad = data(251);
        assert!(matches!(
            lifecycle.create(bad, "w1").await,
            Err(Error::Validation(_))
        ));

        bad = data(1);
        bad.min_withdrawable = 30;
        assert!(matches!(
            lifecycle.create(bad, "w1").await,
            Err(Error::Validation(_))
        ));

        bad = data(1);
        bad.webhook_body = Some("not json".into());
        assert!(matches!(
            lifecycle.create(bad, "w1").await,
            Err(Error::Validation(_))
        ));

        bad = data(1);
        bad.webhook_headers = Some("[1,2]".into());
        assert!(matches!(
            lifecycle.create(bad, "w1").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_resize_up_appends_increasing_indices() {
        let lifecycle = lifecycle();
        let voucher = lifecycle.create(data(2), "w1").await.unwrap();
        let original_k1s: Vec<String> = voucher.secrets.iter().map(|s| s.k1.clone()).collect();

        let grown = lifecycle.resize(&voucher.id, 4).await.unwrap();
        assert_eq!(grown.uses, 4);
        assert_eq!(grown.secrets.len(), 4);
        let indices: Vec<u32> = grown.secrets.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        // existing tokens untouched
        assert_eq!(grown.secrets[0].k1, original_k1s[0]);
        assert_eq!(grown.secrets[1].k1, original_k1s[1]);
    }

    #[tokio::test]
    async fn test_resize_down_truncates_unused_tail() {
        let lifecycle = lifecycle();
        let voucher = lifecycle.create(data(4), "w1").await.unwrap();

        let shrunk = lifecycle.resize(&voucher.id, 2).await.unwrap();
        assert_eq!(shrunk.uses, 2);
        assert_eq!(shrunk.secrets.len(), 2);
        let indices: Vec<u32> = shrunk.secrets.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_resize_down_never_drops_used_secrets() {
        let lifecycle = lifecycle();
        let voucher = lifecycle.create(data(3), "w1").await.unwrap();

        // consume the *last* unit, then shrink to 2
        let last_k1 = voucher.secrets[2].k1.clone();
        lifecycle
            .store
            .update_with(
                &voucher.id,
                Box::new(move |v| {
                    let s = v.secret_by_k1_mut(&last_k1).unwrap();
                    s.used = true;
                    s.used_at = Some(Utc::now());
                    v.used = 1;
                    Ok(())
                }),
            )
            .await
            .unwrap();

        let shrunk = lifecycle.resize(&voucher.id, 2).await.unwrap();
        assert_eq!(shrunk.secrets.len(), 2);
        // the used secret at index 2 survived; an unused one was dropped
        assert!(shrunk.secrets.iter().any(|s| s.index == 2 && s.used));
    }

    #[tokio::test]
    async fn test_resize_below_consumed_fails() {
        let lifecycle = lifecycle();
        let voucher = lifecycle.create(data(3), "w1").await.unwrap();
        let k1 = voucher.secrets[0].k1.clone();
        lifecycle
            .store
            .update_with(
                &voucher.id,
                Box::new(move |v| {
                    v.secret_by_k1_mut(&k1).unwrap().used = true;
                    v.used = 1;
                    Ok(())
                }),
            )
            .await
            .unwrap();

        // new_uses == used is also rejected: nothing left to redeem
        assert!(matches!(
            lifecycle.resize(&voucher.id, 1).await,
            Err(Error::InvalidState(_))
        ));
        assert!(lifecycle.resize(&voucher.id, 2).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_routes_uses_through_resize() {
        let lifecycle = lifecycle();
        let voucher = lifecycle.create(data(2), "w1").await.unwrap();

        let mut updated = data(5);
        updated.title = "renamed".into();
        let result = lifecycle.update(&voucher.id, updated).await.unwrap();
        assert_eq!(result.title, "renamed");
        assert_eq!(result.uses, 5);
        assert_eq!(result.secrets.len(), 5);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let lifecycle = lifecycle();
        let voucher = lifecycle.create(data(1), "w1").await.unwrap();
        lifecycle.delete(&voucher.id).await.unwrap();
        lifecycle.delete(&voucher.id).await.unwrap();
        assert!(lifecycle.get(&voucher.id).await.unwrap().is_none());
    }
}
