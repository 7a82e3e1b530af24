use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Events published by the services. Consumed by the in-process event loop
/// for observability; never part of transactional correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded { user_id: Uuid, variant_id: Uuid },
    CartItemUpdated { user_id: Uuid, item_id: Uuid },
    CartItemRemoved { user_id: Uuid, item_id: Uuid },
    CartCleared(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductRated {
        product_id: Uuid,
        user_id: Uuid,
        stars: i32,
    },

    // Checkout / order events
    OrderCreated {
        order_id: Uuid,
        external_order_id: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    StockRestored {
        order_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    },
    CouponApplied {
        coupon_id: Uuid,
        order_id: Uuid,
    },
    PaymentNotificationAbsorbed {
        external_order_id: String,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Services use this after commit: a lost event must not fail the request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("event dropped: {e}");
        }
    }
}

/// Drains the event channel and logs each event. Spawned from `main`.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                external_order_id,
            } => {
                info!(%order_id, %external_order_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    %order_id,
                    from = old_status.as_str(),
                    to = new_status.as_str(),
                    "order status changed"
                );
            }
            Event::StockRestored {
                order_id,
                variant_id,
                quantity,
            } => {
                info!(%order_id, %variant_id, quantity, "stock restored");
            }
            other => {
                info!(event = ?other, "event");
            }
        }
    }

    info!("event processing loop stopped");
}
