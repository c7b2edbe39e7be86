//! crates/momentbox_core/src/shop.rs
//!
//! Cosmetic shop: a fixed in-code catalog of closet items plus the
//! purchase/equip rules. Points earned from quests are the only currency.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::{ShopItem, UserView};
use crate::ports::{DatabaseService, PortError, PortResult};

/// One catalog row. Kept as static data so the shop needs no seeding step.
struct CatalogEntry {
    id: &'static str,
    name: &'static str,
    price: i64,
    category: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { id: "hat_beanie", name: "Cozy Beanie", price: 300, category: "hat" },
    CatalogEntry { id: "hat_beret", name: "Painter Beret", price: 500, category: "hat" },
    CatalogEntry { id: "hat_crown", name: "Tiny Crown", price: 1500, category: "hat" },
    CatalogEntry { id: "top_hoodie", name: "Oversize Hoodie", price: 400, category: "top" },
    CatalogEntry { id: "top_shirt", name: "Striped Shirt", price: 350, category: "top" },
    CatalogEntry { id: "top_raincoat", name: "Yellow Raincoat", price: 800, category: "top" },
    CatalogEntry { id: "bottom_jeans", name: "Classic Jeans", price: 400, category: "bottom" },
    CatalogEntry { id: "bottom_skirt", name: "Pleated Skirt", price: 450, category: "bottom" },
    CatalogEntry { id: "shoes_sneakers", name: "High-Top Sneakers", price: 600, category: "shoes" },
    CatalogEntry { id: "shoes_boots", name: "Rain Boots", price: 550, category: "shoes" },
    CatalogEntry { id: "acc_glasses", name: "Round Glasses", price: 250, category: "accessory" },
    CatalogEntry { id: "acc_scarf", name: "Knit Scarf", price: 300, category: "accessory" },
    CatalogEntry { id: "bg_meadow", name: "Meadow Backdrop", price: 1000, category: "background" },
    CatalogEntry { id: "bg_night", name: "Night Sky Backdrop", price: 1200, category: "background" },
];

/// The full catalog, in display order.
pub fn catalog() -> Vec<ShopItem> {
    CATALOG
        .iter()
        .map(|e| ShopItem {
            id: e.id.to_string(),
            name: e.name.to_string(),
            price: e.price,
            category: e.category.to_string(),
        })
        .collect()
}

fn find_item(item_id: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.id == item_id)
}

/// Purchase and equip over the database port.
pub struct ShopEngine {
    db: Arc<dyn DatabaseService>,
}

impl ShopEngine {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Buys one catalog item. Unknown items, already-owned items, and an
    /// insufficient balance all fail without touching the user document.
    /// Returns the refreshed user view on success.
    pub async fn purchase(&self, user_id: Uuid, item_id: &str) -> PortResult<UserView> {
        let item = find_item(item_id)
            .ok_or_else(|| PortError::NotFound(format!("shop item '{item_id}'")))?;

        let view = self.db.get_user_view(user_id).await?;
        if view.closet.iter().any(|owned| owned == item_id) {
            return Err(PortError::Validation("item already owned".to_string()));
        }

        // The debit is conditional on the balance inside the store, so a
        // racing purchase cannot push the balance negative.
        if !self.db.purchase_item(user_id, item_id, item.price).await? {
            return Err(PortError::Validation(
                "not enough points for this item".to_string(),
            ));
        }
        info!(user = %user_id, item = item_id, price = item.price, "item purchased");
        self.db.get_user_view(user_id).await
    }

    /// Equips an owned item into its category slot, leaving other slots as
    /// they are. Returns the refreshed user view.
    pub async fn equip(&self, user_id: Uuid, item_id: &str) -> PortResult<UserView> {
        let item = find_item(item_id)
            .ok_or_else(|| PortError::NotFound(format!("shop item '{item_id}'")))?;

        let view = self.db.get_user_view(user_id).await?;
        if !view.closet.iter().any(|owned| owned == item_id) {
            return Err(PortError::Validation("item not owned".to_string()));
        }

        self.db.equip_item(user_id, item.category, item_id).await?;
        self.db.get_user_view(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDb;

    fn engine() -> (ShopEngine, Arc<MockDb>) {
        let db = Arc::new(MockDb::default());
        (ShopEngine::new(db.clone()), db)
    }

    #[test]
    fn catalog_ids_are_unique() {
        let items = catalog();
        for (i, a) in items.iter().enumerate() {
            for b in &items[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }

    #[tokio::test]
    async fn purchase_debits_and_adds_to_closet() {
        let (shop, db) = engine();
        let user_id = db.seed_user(1_000);

        let view = shop.purchase(user_id, "hat_beanie").await.unwrap();
        assert_eq!(view.points, 700);
        assert_eq!(view.closet, vec!["hat_beanie".to_string()]);
    }

    #[tokio::test]
    async fn purchase_unknown_item_is_not_found() {
        let (shop, db) = engine();
        let user_id = db.seed_user(1_000);

        let err = shop.purchase(user_id, "hat_nonexistent").await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        assert_eq!(db.points(user_id), 1_000);
    }

    #[tokio::test]
    async fn purchase_twice_fails_second_time() {
        let (shop, db) = engine();
        let user_id = db.seed_user(1_000);

        shop.purchase(user_id, "acc_glasses").await.unwrap();
        let err = shop.purchase(user_id, "acc_glasses").await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(db.points(user_id), 750);
    }

    #[tokio::test]
    async fn purchase_without_funds_leaves_balance_alone() {
        let (shop, db) = engine();
        let user_id = db.seed_user(100);

        let err = shop.purchase(user_id, "bg_night").await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(db.points(user_id), 100);
        assert!(db.get_user_view(user_id).await.unwrap().closet.is_empty());
    }

    #[tokio::test]
    async fn equip_requires_ownership() {
        let (shop, db) = engine();
        let user_id = db.seed_user(1_000);

        let err = shop.equip(user_id, "top_hoodie").await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn equip_overwrites_only_its_category_slot() {
        let (shop, db) = engine();
        let user_id = db.seed_user(5_000);

        shop.purchase(user_id, "hat_beanie").await.unwrap();
        shop.purchase(user_id, "hat_beret").await.unwrap();
        shop.purchase(user_id, "top_hoodie").await.unwrap();

        shop.equip(user_id, "hat_beanie").await.unwrap();
        shop.equip(user_id, "top_hoodie").await.unwrap();
        let view = shop.equip(user_id, "hat_beret").await.unwrap();

        assert_eq!(view.equipped_items.get("hat").map(String::as_str), Some("hat_beret"));
        assert_eq!(view.equipped_items.get("top").map(String::as_str), Some("top_hoodie"));
    }
}
