use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{
    coupon::Model as CouponRow,
    order::{self, OrderStatus},
    order_item,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::payments::{PaymentGateway, SessionCustomer, SessionLineItem, SessionRequest};
use crate::services::{
    cart::CartService, coupons::CouponService, inventory::InventoryService, orders::OrderService,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub user_id: Uuid,
    pub user_email: String,
    pub user_name: String,
    pub coupon_code: Option<String>,
}

/// What the caller gets back from a successful checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order_id: Uuid,
    pub external_order_id: String,
    pub total: Decimal,
    pub status: OrderStatus,
    pub session_token: String,
    pub redirect_url: String,
}

/// Checkout orchestrator.
///
/// Runs the whole reserve-price-discount-persist-clear sequence inside one
/// database transaction: any failure rolls back every stock decrement, the
/// order rows, the cart deletion, and the coupon usage increment.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: InventoryService,
    coupons: CouponService,
    orders: Arc<OrderService>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        inventory: InventoryService,
        coupons: CouponService,
        orders: Arc<OrderService>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
            coupons,
            orders,
            gateway,
        }
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn checkout(&self, input: CheckoutInput) -> Result<CheckoutOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        // 1. Cart snapshot, in stable cart-read order.
        let lines = CartService::read_lines(&txn, input.user_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::CartEmpty);
        }

        // 2. Reserve stock. Row locks are acquired in a fixed global order
        // (sorted by variant id) so two checkouts racing for the same
        // variants cannot deadlock by locking in opposite orders.
        let mut lock_order: Vec<usize> = (0..lines.len()).collect();
        lock_order.sort_by_key(|&i| lines[i].variant.id);

        let mut reserved_prices: HashMap<Uuid, Decimal> = HashMap::with_capacity(lines.len());
        for &i in &lock_order {
            let line = &lines[i];
            let reserved = self
                .inventory
                .reserve(&txn, line.variant.id, line.item.quantity)
                .await?;
            reserved_prices.insert(reserved.id, reserved.price);
        }

        // 3. Subtotal and the gateway line-item list, both from the price
        // observed at reservation time, in the cart's original order.
        let mut subtotal = Decimal::ZERO;
        let mut gateway_items = Vec::with_capacity(lines.len() + 1);
        for line in &lines {
            let price = reserved_prices[&line.variant.id];
            subtotal += price * Decimal::from(line.item.quantity);
            gateway_items.push(SessionLineItem {
                id: line.variant.id.to_string(),
                name: format!("{} - {}", line.product.name, line.variant.name),
                price: round_units(price),
                quantity: line.item.quantity,
            });
        }

        // 4. Coupon.
        let mut discount = Decimal::ZERO;
        let mut applied_coupon: Option<CouponRow> = None;
        if let Some(code) = input.coupon_code.as_deref() {
            let coupon = self.coupons.validate(&txn, code, subtotal).await?;
            discount = CouponService::calculate_discount(&coupon, subtotal);
            if discount > Decimal::ZERO {
                gateway_items.push(SessionLineItem {
                    id: "DISCOUNT".to_string(),
                    name: format!("Coupon: {code}"),
                    price: -round_units(discount),
                    quantity: 1,
                });
            }
            applied_coupon = Some(coupon);
        }

        // 5. Payment session.
        let total = round_units(subtotal - discount);
        let external_order_id = format!("TXN-{}", Uuid::new_v4());

        let session = self
            .gateway
            .create_session(SessionRequest {
                external_order_id: external_order_id.clone(),
                gross_amount: total,
                items: gateway_items,
                customer: SessionCustomer {
                    first_name: input.user_name.clone(),
                    email: input.user_email.clone(),
                },
            })
            .await?;

        // 6. Persist the order and its line snapshots.
        let now = Utc::now();
        let order_row = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            external_order_id: Set(external_order_id.clone()),
            user_id: Set(input.user_id),
            coupon_id: Set(applied_coupon.as_ref().map(|c| c.id)),
            subtotal: Set(subtotal),
            discount: Set(discount),
            total: Set(total),
            session_token: Set(session.token.clone()),
            redirect_url: Set(session.redirect_url.clone()),
            payment_type: Set(None),
            status: Set(OrderStatus::WaitingPayment),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let snapshots: Vec<order_item::ActiveModel> = lines
            .iter()
            .map(|line| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_row.id),
                variant_id: Set(line.variant.id),
                product_name: Set(line.product.name.clone()),
                variant_name: Set(line.variant.name.clone()),
                price: Set(reserved_prices[&line.variant.id]),
                quantity: Set(line.item.quantity),
            })
            .collect();
        order_item::Entity::insert_many(snapshots).exec(&txn).await?;

        // 7. Clear the cart.
        CartService::clear(&txn, input.user_id).await?;

        // 8. Count the coupon use.
        if let Some(coupon) = &applied_coupon {
            self.coupons.increment_usage(&txn, coupon.id).await?;
        }

        // 9. Commit; everything above rolls back together on any failure.
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order_row.id,
                external_order_id: external_order_id.clone(),
            })
            .await;
        if let Some(coupon) = &applied_coupon {
            self.event_sender
                .send_or_log(Event::CouponApplied {
                    coupon_id: coupon.id,
                    order_id: order_row.id,
                })
                .await;
        }

        // 10. Post-commit auto-confirm for gateways that settle
        // synchronously. Deliberately outside the transaction; the
        // lifecycle manager's idempotency absorbs a concurrent external
        // notification for the same order.
        let mut status = order_row.status;
        if self.gateway.auto_confirms() {
            match self
                .orders
                .apply_payment_notification(&external_order_id, OrderStatus::Processed, "mock_payment")
                .await
            {
                Ok(Some(updated)) => status = updated.status,
                Ok(None) => {}
                Err(e) => warn!(%external_order_id, "auto-confirm failed: {e}"),
            }
        }

        info!(
            order_id = %order_row.id,
            %external_order_id,
            %total,
            "checkout completed"
        );

        Ok(CheckoutOutcome {
            order_id: order_row.id,
            external_order_id,
            total,
            status,
            session_token: session.token,
            redirect_url: session.redirect_url,
        })
    }
}

/// Rounds to whole currency units, half away from zero.
fn round_units(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_units(dec!(24000.5)), dec!(24001));
        assert_eq!(round_units(dec!(24000.4)), dec!(24000));
        assert_eq!(round_units(dec!(-1.5)), dec!(-2));
    }
}
