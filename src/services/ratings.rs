use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    product::Entity as Product,
    rating::{self, Entity as Rating},
    RatingModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Deserialize)]
pub struct RateProductInput {
    pub stars: i32,
    pub comment: Option<String>,
}

/// Star average and count for one product's listing page.
#[derive(Debug, Clone, Serialize)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductRatings {
    pub summary: RatingSummary,
    pub ratings: Vec<RatingModel>,
}

/// Product reviews: one star rating (with optional comment) per user and
/// product, replaced when the user rates again.
#[derive(Clone)]
pub struct RatingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl RatingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(stars = input.stars))]
    pub async fn rate(
        &self,
        product_id: Uuid,
        user_id: Uuid,
        input: RateProductInput,
    ) -> Result<RatingModel, ServiceError> {
        if !(1..=5).contains(&input.stars) {
            return Err(ServiceError::ValidationError(
                "stars must be between 1 and 5".into(),
            ));
        }
        self.ensure_product(product_id).await?;

        let now = Utc::now();
        let existing = Rating::find()
            .filter(rating::Column::ProductId.eq(product_id))
            .filter(rating::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;

        let saved = match existing {
            Some(current) => {
                let mut active: rating::ActiveModel = current.into();
                active.stars = Set(input.stars);
                active.comment = Set(input.comment);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                rating::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    product_id: Set(product_id),
                    user_id: Set(user_id),
                    stars: Set(input.stars),
                    comment: Set(input.comment),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        info!(%product_id, %user_id, stars = saved.stars, "product rated");
        self.event_sender
            .send_or_log(Event::ProductRated {
                product_id,
                user_id,
                stars: saved.stars,
            })
            .await;

        Ok(saved)
    }

    /// All ratings for a product, newest first, with the aggregate summary.
    #[instrument(skip(self))]
    pub async fn list_for_product(&self, product_id: Uuid) -> Result<ProductRatings, ServiceError> {
        self.ensure_product(product_id).await?;

        let ratings = Rating::find()
            .filter(rating::Column::ProductId.eq(product_id))
            .order_by_desc(rating::Column::UpdatedAt)
            .all(&*self.db)
            .await?;

        let count = ratings.len() as u64;
        let average = if ratings.is_empty() {
            None
        } else {
            let sum: i64 = ratings.iter().map(|r| i64::from(r.stars)).sum();
            Some(sum as f64 / ratings.len() as f64)
        };

        Ok(ProductRatings {
            summary: RatingSummary { average, count },
            ratings,
        })
    }

    /// Removes the caller's rating of a product, if any.
    #[instrument(skip(self))]
    pub async fn delete_own(&self, product_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let existing = Rating::find()
            .filter(rating::Column::ProductId.eq(product_id))
            .filter(rating::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No rating for product {product_id}"))
            })?;

        existing.delete(&*self.db).await?;
        Ok(())
    }

    async fn ensure_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;
        Ok(())
    }
}
