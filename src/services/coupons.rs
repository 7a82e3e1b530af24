use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::coupon::{self, CouponType, Entity as Coupon};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCouponInput {
    pub code: String,
    pub r#type: CouponType,
    pub value: Decimal,
    #[serde(default)]
    pub min_order: Decimal,
    pub valid_from: chrono::DateTime<Utc>,
    pub valid_to: chrono::DateTime<Utc>,
    #[serde(default)]
    pub usage_limit: i32,
}

/// Coupon validation and administration.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: CreateCouponInput) -> Result<coupon::Model, ServiceError> {
        if input.value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "coupon value must be positive".into(),
            ));
        }
        if input.valid_to < input.valid_from {
            return Err(ServiceError::ValidationError(
                "valid_to must not precede valid_from".into(),
            ));
        }

        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code),
            r#type: Set(input.r#type),
            value: Set(input.value),
            min_order: Set(input.min_order),
            valid_from: Set(input.valid_from),
            valid_to: Set(input.valid_to),
            usage_limit: Set(input.usage_limit),
            used_count: Set(0),
            is_active: Set(true),
        };

        let created = model.insert(&*self.db).await?;
        info!(coupon_id = %created.id, "coupon created");
        Ok(created)
    }

    pub async fn list(&self) -> Result<Vec<coupon::Model>, ServiceError> {
        Ok(Coupon::find()
            .order_by_desc(coupon::Column::ValidTo)
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<coupon::Model, ServiceError> {
        Coupon::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {id} not found")))
    }

    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: Uuid) -> Result<coupon::Model, ServiceError> {
        let existing = self.get(id).await?;
        let mut active: coupon::ActiveModel = existing.into();
        active.is_active = Set(false);
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get(id).await?;
        Coupon::delete_by_id(existing.id).exec(&*self.db).await?;
        Ok(())
    }

    /// Validates a coupon code against the given subtotal.
    ///
    /// Checks run in a fixed order so the reported error kind is
    /// deterministic: existence, active flag, validity window (inclusive),
    /// usage limit (0 = unlimited), minimum order.
    #[instrument(skip(self, conn))]
    pub async fn validate<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        subtotal: Decimal,
    ) -> Result<coupon::Model, ServiceError> {
        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::CouponNotFound(code.to_string()))?;

        if !coupon.is_active {
            return Err(ServiceError::CouponInactive(code.to_string()));
        }

        let now = Utc::now();
        if now < coupon.valid_from || now > coupon.valid_to {
            return Err(ServiceError::CouponExpired(code.to_string()));
        }

        if coupon.usage_limit > 0 && coupon.used_count >= coupon.usage_limit {
            return Err(ServiceError::CouponUsageLimitReached(code.to_string()));
        }

        if subtotal < coupon.min_order {
            return Err(ServiceError::CouponBelowMinOrder {
                code: code.to_string(),
                min_order: coupon.min_order,
            });
        }

        Ok(coupon)
    }

    /// Computes the discount for a validated coupon. The result is clamped
    /// to the subtotal so the order total can never go negative.
    pub fn calculate_discount(coupon: &coupon::Model, subtotal: Decimal) -> Decimal {
        let raw = match coupon.r#type {
            CouponType::Percentage => subtotal * coupon.value / Decimal::from(100),
            CouponType::Fixed => coupon.value,
        };
        raw.min(subtotal)
    }

    /// Atomically increments the coupon's usage count. Called exactly once
    /// per successful checkout, inside the checkout transaction, so a
    /// rollback also undoes the increment.
    pub async fn increment_usage<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon_id: Uuid,
    ) -> Result<(), ServiceError> {
        Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .filter(coupon::Column::Id.eq(coupon_id))
            .exec(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn coupon_of(r#type: CouponType, value: Decimal) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "TEST".into(),
            r#type,
            value,
            min_order: Decimal::ZERO,
            valid_from: Utc::now(),
            valid_to: Utc::now(),
            usage_limit: 0,
            used_count: 0,
            is_active: true,
        }
    }

    #[test]
    fn percentage_discount_is_proportional() {
        let coupon = coupon_of(CouponType::Percentage, dec!(20));
        assert_eq!(
            CouponService::calculate_discount(&coupon, dec!(30000)),
            dec!(6000)
        );
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        let coupon = coupon_of(CouponType::Fixed, dec!(50000));
        assert_eq!(
            CouponService::calculate_discount(&coupon, dec!(30000)),
            dec!(30000)
        );
        assert_eq!(
            CouponService::calculate_discount(&coupon, dec!(80000)),
            dec!(50000)
        );
    }

    #[test]
    fn discount_is_bounded_by_subtotal_even_for_oversized_percentages() {
        let coupon = coupon_of(CouponType::Percentage, dec!(150));
        assert_eq!(
            CouponService::calculate_discount(&coupon, dec!(10000)),
            dec!(10000)
        );
    }

    #[test]
    fn zero_subtotal_yields_zero_discount() {
        let coupon = coupon_of(CouponType::Fixed, dec!(5000));
        assert_eq!(
            CouponService::calculate_discount(&coupon, Decimal::ZERO),
            Decimal::ZERO
        );
    }
}
