use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    cart_item::{self, Entity as CartItem},
    product::Entity as Product,
    product_variant::Entity as ProductVariant,
    CartItemModel, ProductModel, ProductVariantModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// A cart line resolved with its variant and parent product.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedCartLine {
    pub item: CartItemModel,
    pub variant: ProductVariantModel,
    pub product: ProductModel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCartItemInput {
    pub variant_id: Uuid,
    pub quantity: i32,
}

/// Shopping cart operations. One row per (user, variant); adding an
/// already-present variant increments quantity instead of duplicating.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Reads the user's cart lines, each resolved with variant and product.
    /// An empty result is valid; checkout rejects it separately.
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ResolvedCartLine>, ServiceError> {
        Self::read_lines(&*self.db, user_id).await
    }

    /// Cart snapshot read usable inside an enclosing transaction; the
    /// returned order is stable (cart line id) across calls.
    pub async fn read_lines<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
    ) -> Result<Vec<ResolvedCartLine>, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::Id)
            .find_also_related(ProductVariant)
            .all(conn)
            .await?;

        let mut lines = Vec::with_capacity(rows.len());
        let mut product_ids = Vec::new();
        for (_, variant) in &rows {
            if let Some(variant) = variant {
                product_ids.push(variant.product_id);
            }
        }

        let products: HashMap<Uuid, ProductModel> = Product::find()
            .filter(crate::entities::product::Column::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        for (item, variant) in rows {
            let variant = variant.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "cart line {} references missing variant {}",
                    item.id, item.variant_id
                ))
            })?;
            let product = products.get(&variant.product_id).cloned().ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "variant {} references missing product {}",
                    variant.id, variant.product_id
                ))
            })?;
            lines.push(ResolvedCartLine {
                item,
                variant,
                product,
            });
        }

        Ok(lines)
    }

    /// Adds a variant to the cart, incrementing quantity when the variant is
    /// already present.
    #[instrument(skip(self, input), fields(variant_id = %input.variant_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddCartItemInput,
    ) -> Result<CartItemModel, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".into(),
            ));
        }

        ProductVariant::find_by_id(input.variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product variant {} not found", input.variant_id))
            })?;

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::VariantId.eq(input.variant_id))
            .one(&*self.db)
            .await?;

        let saved = if let Some(item) = existing {
            let quantity = item.quantity + input.quantity;
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.update(&*self.db).await?
        } else {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                variant_id: Set(input.variant_id),
                quantity: Set(input.quantity),
            }
            .insert(&*self.db)
            .await?
        };

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                variant_id: input.variant_id,
            })
            .await;

        Ok(saved)
    }

    /// Sets the quantity of an existing cart line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartItemModel, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".into(),
            ));
        }

        let item = self.find_owned(user_id, item_id).await?;
        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated { user_id, item_id })
            .await;

        Ok(updated)
    }

    /// Removes a cart line owned by the user.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let item = self.find_owned(user_id, item_id).await?;
        CartItem::delete_by_id(item.id).exec(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { user_id, item_id })
            .await;

        Ok(())
    }

    /// Deletes every cart line for the user. Checkout calls this inside its
    /// transaction; the public handler path uses the pooled connection.
    pub async fn clear<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Empties the user's cart via the public API.
    #[instrument(skip(self))]
    pub async fn clear_for_user(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let removed = Self::clear(&*self.db, user_id).await?;
        info!(removed, "cart cleared");
        self.event_sender.send_or_log(Event::CartCleared(user_id)).await;
        Ok(())
    }

    async fn find_owned(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartItemModel, ServiceError> {
        CartItem::find_by_id(item_id)
            .filter(cart_item::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {item_id} not found")))
    }
}
