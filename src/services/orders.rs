use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{
    order::{self, Entity as Order, OrderStatus},
    order_item::{self, Entity as OrderItem},
    OrderItemModel, OrderModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::payments::{NotificationPayload, PaymentGateway};
use crate::services::inventory::InventoryService;

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Order lifecycle manager.
///
/// Owns every status transition after checkout: settlement via gateway
/// notifications, fulfilment advances, and the stock compensation that
/// cancellation and expiry require.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: InventoryService,
    gateway: Arc<dyn PaymentGateway>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        inventory: InventoryService,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
            gateway,
        }
    }

    /// Handles an asynchronous payment notification.
    ///
    /// An invalid signature is the only rejection; everything else the
    /// gateway sends is absorbed so it stops retrying. Notifications for
    /// unknown or already-settled orders are logged and dropped.
    #[instrument(skip(self, payload), fields(external_order_id = %payload.order_id))]
    pub async fn process_notification(
        &self,
        payload: &NotificationPayload,
    ) -> Result<(), ServiceError> {
        if !self.gateway.verify_signature(
            &payload.order_id,
            &payload.status_code,
            &payload.gross_amount,
            &payload.signature_key,
        ) {
            warn!("payment notification rejected: signature mismatch");
            return Err(ServiceError::InvalidSignature);
        }

        let Some(new_status) = map_gateway_status(
            &payload.transaction_status,
            payload.fraud_status.as_deref(),
        ) else {
            info!(
                transaction_status = %payload.transaction_status,
                "payment notification carries no settlement, ignoring"
            );
            return Ok(());
        };

        self.apply_payment_notification(&payload.order_id, new_status, &payload.payment_type)
            .await?;
        Ok(())
    }

    /// Applies a settlement outcome to an order, idempotently.
    ///
    /// The order row is locked for the duration so the mock auto-confirm
    /// and an external notification racing on the same order serialize;
    /// whichever arrives second sees a non-pending status and no-ops.
    /// Returns `Ok(None)` when no order matches the external id.
    #[instrument(skip(self))]
    pub async fn apply_payment_notification(
        &self,
        external_order_id: &str,
        new_status: OrderStatus,
        payment_type: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find()
            .filter(order::Column::ExternalOrderId.eq(external_order_id))
            .lock_exclusive()
            .one(&txn)
            .await?;

        let Some(order) = order else {
            warn!(%external_order_id, "payment notification for unknown order, absorbing");
            self.event_sender
                .send_or_log(Event::PaymentNotificationAbsorbed {
                    external_order_id: external_order_id.to_string(),
                    at: Utc::now(),
                })
                .await;
            return Ok(None);
        };

        if order.status != OrderStatus::WaitingPayment {
            info!(
                order_id = %order.id,
                status = order.status.as_str(),
                "order already settled, notification is a no-op"
            );
            return Ok(Some(order));
        }

        let old_status = order.status;
        let order_id = order.id;

        // Cancellation and expiry hand the reserved stock back. This runs
        // in the same transaction as the status flip so a crash cannot
        // leave the order settled with the stock still deducted.
        let mut restored: Vec<(Uuid, i32)> = Vec::new();
        if matches!(new_status, OrderStatus::Cancelled | OrderStatus::Expired) {
            let items = OrderItem::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(&txn)
                .await?;
            for item in &items {
                self.inventory
                    .restore(&txn, item.variant_id, item.quantity)
                    .await?;
                restored.push((item.variant_id, item.quantity));
            }
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.payment_type = Set(Some(payment_type.to_string()));
        if new_status == OrderStatus::Processed {
            active.paid_at = Set(Some(Utc::now()));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            %order_id,
            from = old_status.as_str(),
            to = new_status.as_str(),
            "order settled from payment notification"
        );
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;
        for (variant_id, quantity) in restored {
            self.event_sender
                .send_or_log(Event::StockRestored {
                    order_id,
                    variant_id,
                    quantity,
                })
                .await;
        }

        Ok(Some(updated))
    }

    /// Advances a paid order through fulfilment. Only
    /// `processed -> delivery` and `delivery -> finished` are legal.
    #[instrument(skip(self))]
    pub async fn advance_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let allowed = matches!(
            (order.status, target),
            (OrderStatus::Processed, OrderStatus::Delivery)
                | (OrderStatus::Delivery, OrderStatus::Finished)
        );
        if !allowed {
            return Err(ServiceError::InvalidStatusTransition {
                from: order.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(target);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: target,
            })
            .await;

        Ok(updated)
    }

    /// Lists a user's orders, newest first, each with its line snapshots.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderWithItems>, ServiceError> {
        let rows = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .find_with_related(OrderItem)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(order, items)| OrderWithItems { order, items })
            .collect())
    }

    /// Fetches one order with its items. When `user_id` is given the lookup
    /// is scoped to that owner and foreign orders read as not-found.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        order_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<OrderWithItems, ServiceError> {
        let mut query = Order::find_by_id(order_id);
        if let Some(user_id) = user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        let order = query
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;

        Ok(OrderWithItems { order, items })
    }
}

/// Maps a gateway transaction status to the order status it settles to.
/// `None` means the notification is informational and nothing changes.
fn map_gateway_status(transaction_status: &str, fraud_status: Option<&str>) -> Option<OrderStatus> {
    match transaction_status {
        "capture" => match fraud_status {
            Some("accept") => Some(OrderStatus::Processed),
            _ => Some(OrderStatus::Cancelled),
        },
        "settlement" => Some(OrderStatus::Processed),
        "cancel" | "deny" => Some(OrderStatus::Cancelled),
        "expire" => Some(OrderStatus::Expired),
        _ => None,
    }
}
