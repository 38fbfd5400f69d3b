//! Storage interfaces: the voucher store and the processing guard.
//!
//! [`VoucherStore`] persists vouchers and their secrets and provides atomic
//! read-modify-write on a single voucher via [`VoucherStore::update_with`].
//! [`ProcessingGuard`] records "this claim token is being processed" with
//! create-if-absent semantics; it is the primary defense against two
//! concurrent callbacks racing on the same secret.
//!
//! The in-memory implementations back the test suite and single-process
//! deployments. A relational backend implements the same traits.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::model::Voucher;

/// A one-shot mutation applied to a voucher under the store's write lock.
pub type UpdateFn = Box<dyn FnOnce(&mut Voucher) -> Result<()> + Send>;

/// Persistence for vouchers and their per-unit secrets.
#[async_trait]
pub trait VoucherStore: Send + Sync {
    /// Persist a new voucher.
    async fn insert(&self, voucher: Voucher) -> Result<()>;

    /// Fetch by admin id.
    async fn get(&self, id: &str) -> Result<Option<Voucher>>;

    /// Fetch by the public share identifier.
    async fn get_by_unique_hash(&self, unique_hash: &str) -> Result<Option<Voucher>>;

    /// Fetch the voucher owning the given claim token.
    async fn get_by_k1(&self, k1: &str) -> Result<Option<Voucher>>;

    /// Page through vouchers funded by any of the given wallets, newest
    /// activity first. `limit == 0` disables pagination. Returns the page and
    /// the total match count.
    async fn list(
        &self,
        wallets: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Voucher>, usize)>;

    /// Atomic load-modify-persist on one voucher. The closure runs under the
    /// store's write lock; if it errors, nothing is persisted.
    async fn update_with(&self, id: &str, f: UpdateFn) -> Result<Voucher>;

    /// Remove a voucher and all its secrets. Idempotent.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Idempotency guard keyed by claim token.
#[async_trait]
pub trait ProcessingGuard: Send + Sync {
    /// Atomically create a marker for the token if none exists. Returns
    /// whether creation succeeded; `false` means a claim is already in flight.
    async fn acquire(&self, k1: &str) -> Result<bool>;

    /// Delete the marker unconditionally. Idempotent.
    async fn release(&self, k1: &str) -> Result<()>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

#[derive(Default)]
struct StoreInner {
    vouchers: HashMap<String, Voucher>,
    by_unique_hash: HashMap<String, String>,
    by_k1: HashMap<String, String>,
}

/// In-memory [`VoucherStore`]. A single `RwLock` over the maps makes each
/// operation one atomic step, so a whole-voucher update can never lose a
/// concurrent update to an unrelated voucher.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn reindex_secrets(inner: &mut StoreInner, id: &str) {
        inner.by_k1.retain(|_, voucher_id| voucher_id.as_str() != id);
        if let Some(voucher) = inner.vouchers.get(id) {
            for secret in &voucher.secrets {
                inner.by_k1.insert(secret.k1.clone(), id.to_string());
            }
        }
    }
}

#[async_trait]
impl VoucherStore for MemoryStore {
    async fn insert(&self, voucher: Voucher) -> Result<()> {
        let mut inner = self.inner.write();
        inner
            .by_unique_hash
            .insert(voucher.unique_hash.clone(), voucher.id.clone());
        for secret in &voucher.secrets {
            inner.by_k1.insert(secret.k1.clone(), voucher.id.clone());
        }
        inner.vouchers.insert(voucher.id.clone(), voucher);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Voucher>> {
        Ok(self.inner.read().vouchers.get(id).cloned())
    }

    async fn get_by_unique_hash(&self, unique_hash: &str) -> Result<Option<Voucher>> {
        let inner = self.inner.read();
        Ok(inner
            .by_unique_hash
            .get(unique_hash)
            .and_then(|id| inner.vouchers.get(id))
            .cloned())
    }

    async fn get_by_k1(&self, k1: &str) -> Result<Option<Voucher>> {
        let inner = self.inner.read();
        Ok(inner
            .by_k1
            .get(k1)
            .and_then(|id| inner.vouchers.get(id))
            .cloned())
    }

    async fn list(
        &self,
        wallets: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Voucher>, usize)> {
        let inner = self.inner.read();
        let mut matches: Vec<Voucher> = inner
            .vouchers
            .values()
            .filter(|v| wallets.contains(&v.wallet))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.open_time.cmp(&a.open_time));

        let total = matches.len();
        let page = if limit > 0 {
            matches.into_iter().skip(offset).take(limit).collect()
        } else {
            matches
        };
        Ok((page, total))
    }

    async fn update_with(&self, id: &str, f: UpdateFn) -> Result<Voucher> {
        let mut inner = self.inner.write();
        let current = inner.vouchers.get(id).ok_or(Error::NotFound)?;
        // Mutate a copy; commit only if the closure succeeds.
        let mut candidate = current.clone();
        f(&mut candidate)?;
        inner.vouchers.insert(id.to_string(), candidate.clone());
        Self::reindex_secrets(&mut inner, id);
        Ok(candidate)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(voucher) = inner.vouchers.remove(id) {
            inner.by_unique_hash.remove(&voucher.unique_hash);
            inner.by_k1.retain(|_, voucher_id| voucher_id.as_str() != id);
        }
        Ok(())
    }
}

/// In-memory [`ProcessingGuard`]: a mutex-protected set, so `acquire` is a
/// single atomic insert rather than a check-then-insert.
#[derive(Default)]
pub struct MemoryGuard {
    inflight: Mutex<HashSet<String>>,
}

impl MemoryGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessingGuard for MemoryGuard {
    async fn acquire(&self, k1: &str) -> Result<bool> {
        Ok(self.inflight.lock().insert(k1.to_string()))
    }

    async fn release(&self, k1: &str) -> Result<()> {
        self.inflight.lock().remove(k1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Secret, Voucher};
    use chrono::Utc;

    fn voucher(id: &str, wallet: &str, open_time: i64) -> Voucher {
        Voucher {
            id: id.into(),
            wallet: wallet.into(),
            title: "t".into(),
            min_withdrawable: 1,
            max_withdrawable: 1,
            uses: 1,
            wait_time: 0,
            is_unique: false,
            unique_hash: format!("uh-{id}"),
            salt: "salt".into(),
            open_time,
            used: 0,
            secrets: vec![Secret {
                index: 0,
                k1: format!("k1-{id}"),
                amount: 1,
                used: false,
                used_at: None,
                available_at: 0,
            }],
            webhook_url: None,
            webhook_headers: None,
            webhook_body: None,
            custom_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_lookup_by_id_hash_and_k1() {
        let store = MemoryStore::new();
        store.insert(voucher("a", "w1", 10)).await.unwrap();

        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get_by_unique_hash("uh-a").await.unwrap().is_some());
        assert_eq!(
            store.get_by_k1("k1-a").await.unwrap().unwrap().id,
            "a".to_string()
        );
        assert!(store.get_by_k1("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_with_reindexes_new_secrets() {
        let store = MemoryStore::new();
        store.insert(voucher("a", "w1", 10)).await.unwrap();

        store
            .update_with(
                "a",
                Box::new(|v| {
                    v.secrets.push(Secret {
                        index: 1,
                        k1: "fresh".into(),
                        amount: 1,
                        used: false,
                        used_at: None,
                        available_at: 0,
                    });
                    v.uses = 2;
                    Ok(())
                }),
            )
            .await
            .unwrap();

        assert_eq!(store.get_by_k1("fresh").await.unwrap().unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_update_with_error_persists_nothing() {
        let store = MemoryStore::new();
        store.insert(voucher("a", "w1", 10)).await.unwrap();

        let result = store
            .update_with(
                "a",
                Box::new(|v| {
                    v.used = 99;
                    Err(Error::Spent)
                }),
            )
            .await;
        assert!(matches!(result, Err(Error::Spent)));
        assert_eq!(store.get("a").await.unwrap().unwrap().used, 0);

        assert!(matches!(
            store
                .update_with("missing", Box::new(|_| Ok(())))
                .await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_orders_and_paginates() {
        let store = MemoryStore::new();
        store.insert(voucher("a", "w1", 10)).await.unwrap();
        store.insert(voucher("b", "w1", 30)).await.unwrap();
        store.insert(voucher("c", "w1", 20)).await.unwrap();
        store.insert(voucher("d", "w2", 99)).await.unwrap();

        let (page, total) = store.list(&["w1".into()], 2, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            page.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "c"]
        );

        let (rest, _) = store.list(&["w1".into()], 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "a");

        // limit 0 disables pagination
        let (all, _) = store.list(&["w1".into()], 0, 0).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_drops_indexes() {
        let store = MemoryStore::new();
        store.insert(voucher("a", "w1", 10)).await.unwrap();

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get_by_k1("k1-a").await.unwrap().is_none());
        assert!(store.get_by_unique_hash("uh-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guard_acquire_is_exclusive_until_release() {
        let guard = MemoryGuard::new();
        assert!(guard.acquire("k").await.unwrap());
        assert!(!guard.acquire("k").await.unwrap());
        guard.release("k").await.unwrap();
        assert!(guard.acquire("k").await.unwrap());
        // release of an absent marker is a no-op
        guard.release("never-acquired").await.unwrap();
    }
}
