use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::entities::product_variant::{self, Entity as ProductVariant};
use crate::errors::ServiceError;

/// Variant stock store.
///
/// `reserve` runs inside the caller's checkout transaction under an
/// exclusive row lock so concurrent checkouts referencing the same variant
/// serialize on the row instead of both observing sufficient stock.
/// `restore` is a pure additive compensation and only needs per-row
/// atomicity.
#[derive(Clone, Default)]
pub struct InventoryService;

impl InventoryService {
    pub fn new() -> Self {
        Self
    }

    /// Locks the variant row, checks stock, and decrements it by `quantity`.
    ///
    /// Fails with `InsufficientStock` without mutating when stock is short.
    /// Must be called once per cart line inside the same transaction as
    /// order creation; rollback of that transaction undoes the decrement.
    #[instrument(skip(self, conn))]
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<product_variant::Model, ServiceError> {
        let variant = ProductVariant::find_by_id(variant_id)
            .lock_exclusive()
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product variant {variant_id} not found"))
            })?;

        if variant.stock < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "variant \"{}\" has {} in stock, {} requested",
                variant.name, variant.stock, quantity
            )));
        }

        let remaining = variant.stock - quantity;
        let mut active: product_variant::ActiveModel = variant.into();
        active.stock = Set(remaining);
        let updated = active.update(conn).await?;

        Ok(updated)
    }

    /// Atomically increments the variant's stock by `quantity`.
    ///
    /// Used only as compensation when an order is cancelled or expires. A
    /// missing variant row cannot be compensated and corrupts stock
    /// accounting, so it is logged as an error and surfaced.
    #[instrument(skip(self, conn))]
    pub async fn restore<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(quantity),
            )
            .filter(product_variant::Column::Id.eq(variant_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            error!(%variant_id, quantity, "stock restoration failed: variant row missing");
            return Err(ServiceError::InternalError(format!(
                "cannot restore {quantity} units: variant {variant_id} no longer exists"
            )));
        }

        Ok(())
    }
}
