mod locks;

pub use locks::ChestLocks;

use crate::db::error::DbError;
use crate::db::repo::ChestRepo;
use crate::error::{AppResult, DomainError};
use crate::models::chest::{
    AggregateView, Chest, ChestItemsView, ChestRef, ChestSummary, LedgerRow, QuantityChange,
};
use crate::models::item::{CanonicalItemRef, Item, ItemRef};
use crate::models::types::ChestId;
use crate::services::activity::{ActivityService, Actor};
use crate::services::catalog::CatalogService;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub item: Item,
    pub change: QuantityChange,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    pub migrate_to: Option<ChestId>,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedChest {
    #[serde(rename = "_id")]
    pub id: ChestId,
    pub name: String,
    /// Units migrated, or the number of entries when nothing was migrated
    pub item_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    /// Total units moved into the target
    pub item_count: i64,
    pub target_chest: ChestRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub deleted: DeletedChest,
    pub migrated_to: Option<ChestId>,
    pub migration: Option<MigrationSummary>,
    /// Stock is safe in the target but the source chest could not be removed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pending_cleanup: bool,
}

pub struct ChestService {
    repo: Arc<dyn ChestRepo>,
    catalog: Arc<CatalogService>,
    activity: Arc<ActivityService>,
    locks: ChestLocks,
}

fn map_unique(e: DbError, name: &str) -> DomainError {
    match e {
        DbError::UniqueViolation => DomainError::Conflict(format!("a chest named {name:?} already exists")),
        other => other.into(),
    }
}

impl ChestService {
    pub fn new(repo: Arc<dyn ChestRepo>, catalog: Arc<CatalogService>, activity: Arc<ActivityService>) -> Self {
        Self {
            repo,
            catalog,
            activity,
            locks: ChestLocks::new(),
        }
    }

    // ========================================================================
    // CHEST STORE
    // ========================================================================

    pub async fn list(&self) -> AppResult<Vec<ChestSummary>> {
        Ok(self.repo.list_summaries().await?)
    }

    pub async fn get(&self, id: ChestId) -> AppResult<Chest> {
        self.repo.get(id).await?.ok_or(DomainError::ChestNotFound(id))
    }

    pub async fn create(&self, actor: Actor<'_>, raw_name: &str) -> AppResult<Chest> {
        let name = Chest::normalize_name(raw_name)?;

        if self.repo.name_taken(&name, None).await? {
            return Err(DomainError::Conflict(format!("a chest named {name:?} already exists")));
        }

        let chest = Chest::new(name);
        // the unique index still catches a concurrent create with the same name
        self.repo.insert(&chest).await.map_err(|e| map_unique(e, &chest.name))?;

        tracing::info!(chest_id = %chest.id, name = %chest.name, "chest created");
        self.activity.chest_created(actor, &chest).await;

        Ok(chest)
    }

    pub async fn rename(&self, actor: Actor<'_>, id: ChestId, raw_name: &str) -> AppResult<Chest> {
        let name = Chest::normalize_name(raw_name)?;
        let mut chest = self.get(id).await?;
        if chest.name == name {
            return Ok(chest);
        }

        if self.repo.name_taken(&name, Some(id)).await? {
            return Err(DomainError::Conflict(format!("a chest named {name:?} already exists")));
        }
        if !self.repo.rename(id, &name).await.map_err(|e| map_unique(e, &name))? {
            return Err(DomainError::ChestNotFound(id));
        }

        let old_name = std::mem::replace(&mut chest.name, name);
        tracing::info!(chest_id = %id, from = %old_name, to = %chest.name, "chest renamed");
        self.activity.chest_renamed(actor, &chest, &old_name).await;

        Ok(chest)
    }

    /// Entries of one chest joined with their catalog items.
    pub async fn items(&self, id: ChestId) -> AppResult<ChestItemsView> {
        let chest = self.get(id).await?;

        let keys: Vec<CanonicalItemRef> = chest.entries.iter().map(|e| e.item).collect();
        let mut items = self.catalog.lookup(&keys).await?;

        let rows = chest
            .entries
            .iter()
            .map(|e| LedgerRow::new(e.item, e.quantity, items.remove(&e.item)))
            .collect();

        Ok(ChestItemsView {
            chest_id: chest.id,
            name: chest.name,
            items: rows,
        })
    }

    // ========================================================================
    // LEDGER OPERATIONS
    // ========================================================================

    /// Deposits (`delta > 0`) or withdraws (`delta < 0`) an item.
    pub async fn move_item(
        &self,
        actor: Actor<'_>,
        id: ChestId,
        item_ref: &ItemRef,
        delta: i64,
    ) -> AppResult<MoveOutcome> {
        if delta == 0 {
            return Err(DomainError::InvalidDelta);
        }

        let item = self.catalog.resolve(item_ref).await?;

        let (chest, change) = {
            let _guard = self.locks.acquire(id).await;

            let mut chest = self.get(id).await?;
            let change = chest.apply_delta(&item, delta)?;

            if !self.repo.save_entries(id, &chest.entries).await? {
                return Err(DomainError::ChestNotFound(id));
            }
            (chest, change)
        };

        tracing::info!(
            chest_id = %id,
            item = %item.canonical_ref(),
            delta,
            old = change.old,
            new = change.new,
            "chest entry moved"
        );
        self.activity.item_moved(actor, &chest, &item, change).await;

        Ok(MoveOutcome { item, change })
    }

    /// Deletes a chest, optionally migrating its entries into another one first.
    ///
    /// A non-empty chest needs `confirmed`; without a migration target it also needs a decision.
    pub async fn delete(&self, actor: Actor<'_>, id: ChestId, req: DeleteRequest) -> AppResult<DeleteOutcome> {
        if req.migrate_to == Some(id) {
            return Err(DomainError::InvalidInput("a chest cannot be migrated into itself".into()));
        }

        let (source, migration, pending_cleanup) = {
            let _guard = match req.migrate_to {
                Some(target) => self.locks.acquire_pair(id, target).await,
                None => self.locks.acquire(id).await,
            };

            let source = self.get(id).await?;

            match req.migrate_to {
                _ if source.is_empty() => self.delete_unchecked(source).await?,
                None if !req.confirmed => {
                    let candidates = self
                        .repo
                        .list_summaries()
                        .await?
                        .into_iter()
                        .filter(|c| c.id != id)
                        .map(|c| ChestRef { id: c.id, name: c.name })
                        .collect();
                    return Err(DomainError::RequiresDecision {
                        item_count: source.entries.len(),
                        candidates,
                    });
                }
                Some(_) if !req.confirmed => {
                    return Err(DomainError::RequiresConfirmation {
                        item_count: source.entries.len(),
                        migrate_to: req.migrate_to,
                    });
                }
                Some(target) => self.migrate_and_delete(&source, target).await?,
                None => {
                    let deleted = self.delete_unchecked(source).await?;
                    tracing::warn!(
                        chest_id = %id,
                        entries = deleted.0.entries.len(),
                        quantity = deleted.0.total_quantity(),
                        "non-empty chest deleted, stock discarded"
                    );
                    deleted
                }
            }
        };

        let details = match &migration {
            Some(m) => format!(
                "Deleted chest \"{}\", moved {} units to \"{}\"",
                source.name, m.item_count, m.target_chest.name
            ),
            None => format!("Deleted chest \"{}\"", source.name),
        };
        tracing::info!(chest_id = %id, name = %source.name, pending_cleanup, "chest deleted");
        self.activity.chest_deleted(actor, &source, details).await;

        let item_count = match &migration {
            Some(m) if m.item_count > 0 => m.item_count,
            _ => i64::try_from(source.entries.len()).unwrap_or(i64::MAX),
        };
        Ok(DeleteOutcome {
            deleted: DeletedChest {
                id: source.id,
                name: source.name.clone(),
                item_count,
            },
            migrated_to: migration.as_ref().map(|m| m.target_chest.id),
            migration,
            pending_cleanup,
        })
    }

    async fn delete_unchecked(&self, source: Chest) -> AppResult<(Chest, Option<MigrationSummary>, bool)> {
        if !self.repo.delete(source.id).await? {
            return Err(DomainError::ChestNotFound(source.id));
        }
        Ok((source, None, false))
    }

    /// Target is persisted first; failures after that point leave stock in the target and are only logged.
    async fn migrate_and_delete(
        &self,
        source: &Chest,
        target_id: ChestId,
    ) -> AppResult<(Chest, Option<MigrationSummary>, bool)> {
        let mut target = self
            .repo
            .get(target_id)
            .await?
            .ok_or(DomainError::MigrationTargetNotFound(target_id))?;

        let keys: Vec<CanonicalItemRef> = source.entries.iter().map(|e| e.item).collect();
        let known = self.catalog.lookup(&keys).await?;
        let moved = target.merge_from(&source.entries, &known)?;

        if !self.repo.save_entries(target.id, &target.entries).await? {
            return Err(DomainError::MigrationTargetNotFound(target_id));
        }

        let mut pending_cleanup = false;
        if let Err(e) = self.repo.save_entries(source.id, &[]).await {
            tracing::warn!(error = %e, chest_id = %source.id, "cannot clear migrated chest");
        }
        match self.repo.delete(source.id).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(chest_id = %source.id, "migrated chest vanished before delete"),
            Err(e) => {
                tracing::error!(error = %e, chest_id = %source.id, "cannot delete migrated chest");
                pending_cleanup = true;
            }
        }

        let summary = MigrationSummary {
            item_count: moved,
            target_chest: target.chest_ref(),
        };
        Ok((source.clone(), Some(summary), pending_cleanup))
    }

    /// Total quantity of every item over all chests.
    ///
    /// Catalog ids and database ids are separate keys; the same item stored under both is listed twice.
    pub async fn aggregate(&self) -> AppResult<AggregateView> {
        let chests = self.repo.list().await?;

        let mut totals: BTreeMap<CanonicalItemRef, i64> = BTreeMap::new();
        for entry in chests.iter().flat_map(|c| c.entries.iter()) {
            let total = totals.entry(entry.item).or_insert(0);
            *total = total.saturating_add(entry.quantity);
        }
        totals.retain(|_, q| *q > 0);

        let keys: Vec<CanonicalItemRef> = totals.keys().copied().collect();
        let mut items = self.catalog.lookup(&keys).await?;

        let rows: Vec<LedgerRow> = totals
            .into_iter()
            .map(|(key, quantity)| LedgerRow::new(key, quantity, items.remove(&key)))
            .collect();

        Ok(AggregateView {
            total_items: rows.len(),
            items: rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbResult;
    use crate::db::repo::{MemoryActivityRepository, MemoryChestRepository, MemoryItemRepository};
    use crate::models::chest::{ChestEntry, ChestSummary};
    use crate::models::item::fixtures::item;
    use crate::models::types::CatalogId;

    const ALICE: Actor<'static> = Actor {
        id: "u1",
        username: "alice",
    };

    struct Fixture {
        svc: Arc<ChestService>,
        chests: Arc<dyn ChestRepo>,
        spice: Item,
        water: Item,
        relic: Item,
    }

    fn fixture_with(chests: Arc<dyn ChestRepo>) -> Fixture {
        let spice = item(Some(42), "Spice");
        let water = item(Some(1), "Water");
        let relic = item(None, "Relic");
        let items = Arc::new(MemoryItemRepository::with_items([spice.clone(), water.clone(), relic.clone()]));

        let catalog = Arc::new(CatalogService::new(items));
        let activity = Arc::new(ActivityService::new(Arc::new(MemoryActivityRepository::new())));
        let svc = Arc::new(ChestService::new(chests.clone(), catalog, activity));

        Fixture {
            svc,
            chests,
            spice,
            water,
            relic,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryChestRepository::new()))
    }

    fn by_id(c: CatalogId) -> ItemRef {
        ItemRef::Catalog(c)
    }

    #[tokio::test]
    async fn garage_deposit_shows_up_in_items() {
        let f = fixture();
        let garage = f.svc.create(ALICE, "Garage").await.unwrap();

        f.svc.move_item(ALICE, garage.id, &by_id(CatalogId(42)), 5).await.unwrap();

        let view = f.svc.items(garage.id).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].item_id, Some(CatalogId(42)));
        assert_eq!(view.items[0].quantity, 5);
        assert_eq!(view.items[0].item.as_ref().map(|i| i.name.as_str()), Some("Spice"));
    }

    #[tokio::test]
    async fn withdraw_to_zero_then_overdraw() {
        let f = fixture();
        let garage = f.svc.create(ALICE, "Garage").await.unwrap();
        f.svc.move_item(ALICE, garage.id, &by_id(CatalogId(42)), 5).await.unwrap();

        f.svc.move_item(ALICE, garage.id, &by_id(CatalogId(42)), -5).await.unwrap();
        assert!(f.svc.get(garage.id).await.unwrap().entries.is_empty());

        let err = f
            .svc
            .move_item(ALICE, garage.id, &by_id(CatalogId(42)), -1)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientQuantity { .. }));
    }

    #[tokio::test]
    async fn move_validates_before_touching_the_chest() {
        let f = fixture();
        let garage = f.svc.create(ALICE, "Garage").await.unwrap();

        assert!(matches!(
            f.svc.move_item(ALICE, garage.id, &by_id(CatalogId(42)), 0).await,
            Err(DomainError::InvalidDelta)
        ));
        assert!(matches!(
            f.svc.move_item(ALICE, garage.id, &by_id(CatalogId(777)), 1).await,
            Err(DomainError::ItemNotFound(_))
        ));
        assert!(matches!(
            f.svc.move_item(ALICE, ChestId::new(), &by_id(CatalogId(42)), 1).await,
            Err(DomainError::ChestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn name_and_database_refs_land_on_the_catalog_entry() {
        let f = fixture();
        let garage = f.svc.create(ALICE, "Garage").await.unwrap();

        f.svc.move_item(ALICE, garage.id, &ItemRef::Name("spice".into()), 2).await.unwrap();
        f.svc.move_item(ALICE, garage.id, &ItemRef::Database(f.spice.id), 3).await.unwrap();
        f.svc.move_item(ALICE, garage.id, &ItemRef::Database(f.relic.id), 1).await.unwrap();

        let chest = f.svc.get(garage.id).await.unwrap();
        assert_eq!(chest.entries.len(), 2);
        assert_eq!(chest.quantity_of(&f.spice.canonical_ref()), 5);
        assert_eq!(chest.quantity_of(&CanonicalItemRef::Database(f.relic.id)), 1);
    }

    #[tokio::test]
    async fn concurrent_withdrawals_never_overdraw() {
        let f = fixture();
        let garage = f.svc.create(ALICE, "Garage").await.unwrap();
        f.svc.move_item(ALICE, garage.id, &by_id(CatalogId(42)), 10).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..25 {
            let svc = f.svc.clone();
            tasks.push(tokio::spawn(async move {
                svc.move_item(ALICE, garage.id, &ItemRef::Catalog(CatalogId(42)), -1).await.is_ok()
            }));
        }
        let mut ok = 0;
        for t in tasks {
            if t.await.unwrap() {
                ok += 1;
            }
        }

        assert_eq!(ok, 10);
        assert!(f.svc.get(garage.id).await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn concurrent_deposits_are_not_lost() {
        let f = fixture();
        let garage = f.svc.create(ALICE, "Garage").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..30 {
            let svc = f.svc.clone();
            let catalog_id = if i % 2 == 0 { 42 } else { 1 };
            tasks.push(tokio::spawn(async move {
                svc.move_item(ALICE, garage.id, &ItemRef::Catalog(CatalogId(catalog_id)), 2).await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        let chest = f.svc.get(garage.id).await.unwrap();
        assert_eq!(chest.entries.len(), 2);
        assert_eq!(chest.quantity_of(&f.spice.canonical_ref()), 30);
        assert_eq!(chest.quantity_of(&f.water.canonical_ref()), 30);
    }

    #[tokio::test]
    async fn duplicate_names_conflict_case_insensitively() {
        let f = fixture();
        f.svc.create(ALICE, "X").await.unwrap();

        assert!(matches!(f.svc.create(ALICE, "X").await, Err(DomainError::Conflict(_))));
        assert!(matches!(f.svc.create(ALICE, " x ").await, Err(DomainError::Conflict(_))));
        assert!(matches!(f.svc.create(ALICE, "  ").await, Err(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn rename_conflict_leaves_both_chests_unchanged() {
        let f = fixture();
        let a = f.svc.create(ALICE, "A").await.unwrap();
        let b = f.svc.create(ALICE, "B").await.unwrap();

        assert!(matches!(f.svc.rename(ALICE, a.id, "b").await, Err(DomainError::Conflict(_))));
        assert_eq!(f.svc.get(a.id).await.unwrap().name, "A");
        assert_eq!(f.svc.get(b.id).await.unwrap().name, "B");

        let renamed = f.svc.rename(ALICE, a.id, " Attic ").await.unwrap();
        assert_eq!(renamed.name, "Attic");
        assert!(matches!(
            f.svc.rename(ALICE, a.id, &"y".repeat(51)).await,
            Err(DomainError::Validation { .. })
        ));
        assert!(matches!(
            f.svc.rename(ALICE, ChestId::new(), "Z").await,
            Err(DomainError::ChestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn migration_merges_into_target() {
        let f = fixture();
        let a = f.svc.create(ALICE, "A").await.unwrap();
        let b = f.svc.create(ALICE, "B").await.unwrap();
        f.svc.move_item(ALICE, a.id, &by_id(CatalogId(1)), 3).await.unwrap();
        f.svc.move_item(ALICE, a.id, &by_id(CatalogId(42)), 4).await.unwrap();
        f.svc.move_item(ALICE, b.id, &by_id(CatalogId(1)), 2).await.unwrap();

        let out = f
            .svc
            .delete(
                ALICE,
                a.id,
                DeleteRequest {
                    migrate_to: Some(b.id),
                    confirmed: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(out.migrated_to, Some(b.id));
        assert_eq!(out.deleted.item_count, 7);
        assert!(!out.pending_cleanup);
        let migration = out.migration.unwrap();
        assert_eq!(migration.item_count, 7);

        let target = f.svc.get(b.id).await.unwrap();
        assert_eq!(target.quantity_of(&f.water.canonical_ref()), 5);
        assert_eq!(target.quantity_of(&f.spice.canonical_ref()), 4);
        assert!(matches!(f.svc.get(a.id).await, Err(DomainError::ChestNotFound(_))));
    }

    #[tokio::test]
    async fn non_empty_delete_requires_a_decision() {
        let f = fixture();
        let a = f.svc.create(ALICE, "A").await.unwrap();
        let b = f.svc.create(ALICE, "B").await.unwrap();
        f.svc.move_item(ALICE, a.id, &by_id(CatalogId(1)), 3).await.unwrap();

        let err = f.svc.delete(ALICE, a.id, DeleteRequest::default()).await.unwrap_err();
        match err {
            DomainError::RequiresDecision { item_count, candidates } => {
                assert_eq!(item_count, 1);
                assert_eq!(candidates, vec![b.chest_ref()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.svc.get(a.id).await.unwrap().total_quantity(), 3);

        let out = f
            .svc
            .delete(
                ALICE,
                a.id,
                DeleteRequest {
                    migrate_to: None,
                    confirmed: true,
                },
            )
            .await
            .unwrap();
        assert!(out.migration.is_none());
        assert!(matches!(f.svc.get(a.id).await, Err(DomainError::ChestNotFound(_))));
    }

    #[tokio::test]
    async fn migration_needs_confirmation() {
        let f = fixture();
        let a = f.svc.create(ALICE, "A").await.unwrap();
        let b = f.svc.create(ALICE, "B").await.unwrap();
        f.svc.move_item(ALICE, a.id, &by_id(CatalogId(1)), 3).await.unwrap();

        let err = f
            .svc
            .delete(
                ALICE,
                a.id,
                DeleteRequest {
                    migrate_to: Some(b.id),
                    confirmed: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::RequiresConfirmation { item_count: 1, migrate_to: Some(t) } if t == b.id
        ));
        assert_eq!(f.svc.get(a.id).await.unwrap().total_quantity(), 3);
        assert!(f.svc.get(b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn legacy_keyed_source_merges_into_catalog_entry() {
        let f = fixture();
        let a = f.svc.create(ALICE, "A").await.unwrap();
        let b = f.svc.create(ALICE, "B").await.unwrap();

        // written before spice had a catalog id
        f.chests
            .save_entries(a.id, &[ChestEntry::new(CanonicalItemRef::Database(f.spice.id), 3)])
            .await
            .unwrap();
        f.svc.move_item(ALICE, b.id, &by_id(CatalogId(42)), 2).await.unwrap();

        f.svc
            .delete(
                ALICE,
                a.id,
                DeleteRequest {
                    migrate_to: Some(b.id),
                    confirmed: true,
                },
            )
            .await
            .unwrap();

        let target = f.svc.get(b.id).await.unwrap();
        assert_eq!(target.entries, vec![ChestEntry::new(f.spice.canonical_ref(), 5)]);
    }

    #[tokio::test]
    async fn missing_chests_leave_no_locks_behind() {
        let f = fixture();
        let a = f.svc.create(ALICE, "A").await.unwrap();
        f.svc.move_item(ALICE, a.id, &by_id(CatalogId(1)), 3).await.unwrap();

        for _ in 0..50 {
            let _ = f.svc.move_item(ALICE, ChestId::new(), &by_id(CatalogId(42)), 1).await;
            let _ = f.svc.delete(ALICE, ChestId::new(), DeleteRequest::default()).await;
        }
        // refused delete of an existing chest
        let _ = f.svc.delete(ALICE, a.id, DeleteRequest::default()).await;

        assert_eq!(f.svc.locks.len(), 0);
    }

    #[tokio::test]
    async fn empty_chest_deletes_without_confirmation() {
        let f = fixture();
        let a = f.svc.create(ALICE, "A").await.unwrap();
        let out = f.svc.delete(ALICE, a.id, DeleteRequest::default()).await.unwrap();
        assert_eq!(out.deleted.item_count, 0);
        assert!(matches!(
            f.svc.delete(ALICE, a.id, DeleteRequest::default()).await,
            Err(DomainError::ChestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn migration_target_must_exist_and_differ() {
        let f = fixture();
        let a = f.svc.create(ALICE, "A").await.unwrap();
        f.svc.move_item(ALICE, a.id, &by_id(CatalogId(1)), 3).await.unwrap();

        let missing = ChestId::new();
        let err = f
            .svc
            .delete(
                ALICE,
                a.id,
                DeleteRequest {
                    migrate_to: Some(missing),
                    confirmed: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::MigrationTargetNotFound(id) if id == missing));

        let err = f
            .svc
            .delete(
                ALICE,
                a.id,
                DeleteRequest {
                    migrate_to: Some(a.id),
                    confirmed: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert_eq!(f.svc.get(a.id).await.unwrap().total_quantity(), 3);
    }

    /// Chest store whose deletes always fail
    struct StickyChests(MemoryChestRepository);

    #[async_trait::async_trait]
    impl ChestRepo for StickyChests {
        async fn list(&self) -> DbResult<Vec<Chest>> {
            self.0.list().await
        }
        async fn list_summaries(&self) -> DbResult<Vec<ChestSummary>> {
            self.0.list_summaries().await
        }
        async fn get(&self, id: ChestId) -> DbResult<Option<Chest>> {
            self.0.get(id).await
        }
        async fn name_taken(&self, name: &str, except: Option<ChestId>) -> DbResult<bool> {
            self.0.name_taken(name, except).await
        }
        async fn insert(&self, chest: &Chest) -> DbResult<()> {
            self.0.insert(chest).await
        }
        async fn rename(&self, id: ChestId, name: &str) -> DbResult<bool> {
            self.0.rename(id, name).await
        }
        async fn save_entries(&self, id: ChestId, entries: &[ChestEntry]) -> DbResult<bool> {
            self.0.save_entries(id, entries).await
        }
        async fn delete(&self, _id: ChestId) -> DbResult<bool> {
            Err(DbError::Decode("delete refused".into()))
        }
    }

    #[tokio::test]
    async fn failed_source_delete_after_migration_keeps_stock_in_target() {
        let f = fixture_with(Arc::new(StickyChests(MemoryChestRepository::new())));
        let a = f.svc.create(ALICE, "A").await.unwrap();
        let b = f.svc.create(ALICE, "B").await.unwrap();
        f.svc.move_item(ALICE, a.id, &by_id(CatalogId(1)), 3).await.unwrap();

        let out = f
            .svc
            .delete(
                ALICE,
                a.id,
                DeleteRequest {
                    migrate_to: Some(b.id),
                    confirmed: true,
                },
            )
            .await
            .unwrap();

        assert!(out.pending_cleanup);
        assert_eq!(f.svc.get(b.id).await.unwrap().quantity_of(&f.water.canonical_ref()), 3);
        // source was cleared, so nothing is counted twice
        let leftover = f.chests.get(a.id).await.unwrap().unwrap();
        assert!(leftover.is_empty());

        let agg = f.svc.aggregate().await.unwrap();
        assert_eq!(agg.items.len(), 1);
        assert_eq!(agg.items[0].quantity, 3);
    }

    #[tokio::test]
    async fn aggregate_sums_over_chests_per_namespace() {
        let f = fixture();
        let a = f.svc.create(ALICE, "A").await.unwrap();
        let b = f.svc.create(ALICE, "B").await.unwrap();
        f.svc.move_item(ALICE, a.id, &by_id(CatalogId(42)), 3).await.unwrap();
        f.svc.move_item(ALICE, b.id, &by_id(CatalogId(42)), 4).await.unwrap();
        f.svc.move_item(ALICE, b.id, &ItemRef::Database(f.relic.id), 1).await.unwrap();

        // legacy row keyed by the database id of an item that has a catalog id
        let mut legacy = f.svc.get(b.id).await.unwrap();
        legacy.entries.push(ChestEntry::new(CanonicalItemRef::Database(f.spice.id), 2));
        f.chests.save_entries(b.id, &legacy.entries).await.unwrap();

        let agg = f.svc.aggregate().await.unwrap();
        assert_eq!(agg.total_items, 3);

        let spice_by_catalog = agg.items.iter().find(|r| r.item_id == Some(CatalogId(42))).unwrap();
        assert_eq!(spice_by_catalog.quantity, 7);
        let spice_by_db = agg.items.iter().find(|r| r.item_mongo_id == Some(f.spice.id)).unwrap();
        assert_eq!(spice_by_db.quantity, 2);
        assert!(spice_by_db.item.is_some());
    }
}
