use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Order as SortOrder, Query, SimpleExpr, SubQueryStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    category::{self, Entity as Category},
    product::{self, Entity as Product},
    product_variant::{self, Entity as ProductVariant},
    CategoryModel, ProductModel, ProductVariantModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVariantInput {
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category_id: Option<Uuid>,
    pub variants: Vec<CreateVariantInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    Name,
    PriceAsc,
    PriceDesc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListProductsQuery {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductWithVariants {
    #[serde(flatten)]
    pub product: ProductModel,
    pub variants: Vec<ProductVariantModel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub items: Vec<ProductWithVariants>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// Product catalog: products with their sellable variants.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductWithVariants, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "product name must not be empty".into(),
            ));
        }
        if input.variants.is_empty() {
            return Err(ServiceError::ValidationError(
                "product needs at least one variant".into(),
            ));
        }
        for variant in &input.variants {
            if variant.price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "variant price must not be negative".into(),
                ));
            }
            if variant.stock < 0 {
                return Err(ServiceError::ValidationError(
                    "variant stock must not be negative".into(),
                ));
            }
        }

        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            image_url: Set(input.image_url),
            category_id: Set(input.category_id),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let variant_rows: Vec<product_variant::ActiveModel> = input
            .variants
            .into_iter()
            .map(|v| product_variant::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(created.id),
                name: Set(v.name),
                price: Set(v.price),
                stock: Set(v.stock),
            })
            .collect();
        ProductVariant::insert_many(variant_rows).exec(&txn).await?;

        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(created.id))
            .order_by_asc(product_variant::Column::Price)
            .all(&txn)
            .await?;

        txn.commit().await?;

        info!(product_id = %created.id, "product created");
        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;

        Ok(ProductWithVariants {
            product: created,
            variants,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductWithVariants, ServiceError> {
        let existing = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            if name.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "product name must not be empty".into(),
                ));
            }
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(Some(image_url));
        }
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
            active.category_id = Set(Some(category_id));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;

        let variants = self.variants_of(updated.id).await?;
        Ok(ProductWithVariants {
            product: updated,
            variants,
        })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, product_id: Uuid) -> Result<ProductWithVariants, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;
        let variants = self.variants_of(product.id).await?;
        Ok(ProductWithVariants { product, variants })
    }

    /// Paginated catalog listing with search, active filter, and sorting.
    ///
    /// Price sorting orders by each product's cheapest variant, computed by
    /// a correlated subquery so the pagination window stays correct (a join
    /// would duplicate products with several variants).
    #[instrument(skip(self))]
    pub async fn list(&self, query: ListProductsQuery) -> Result<ProductPage, ServiceError> {
        let mut select = Product::find();
        if let Some(is_active) = query.is_active {
            select = select.filter(product::Column::IsActive.eq(is_active));
        }
        if let Some(category_id) = query.category_id {
            select = select.filter(product::Column::CategoryId.eq(category_id));
        }
        if let Some(search) = query.search.as_deref() {
            if !search.trim().is_empty() {
                select = select.filter(product::Column::Name.contains(search.trim()));
            }
        }

        select = match query.sort {
            ProductSort::Newest => select.order_by_desc(product::Column::CreatedAt),
            ProductSort::Name => select.order_by_asc(product::Column::Name),
            ProductSort::PriceAsc => select.order_by(min_variant_price(), SortOrder::Asc),
            ProductSort::PriceDesc => select.order_by(min_variant_price(), SortOrder::Desc),
        };

        let total = select.clone().count(&*self.db).await?;

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let products = select
            .offset((page - 1) * per_page)
            .limit(per_page)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let mut variants_by_product: HashMap<Uuid, Vec<ProductVariantModel>> = HashMap::new();
        for variant in ProductVariant::find()
            .filter(product_variant::Column::ProductId.is_in(product_ids))
            .order_by_asc(product_variant::Column::Price)
            .all(&*self.db)
            .await?
        {
            variants_by_product
                .entry(variant.product_id)
                .or_default()
                .push(variant);
        }

        let items = products
            .into_iter()
            .map(|product| {
                let variants = variants_by_product.remove(&product.id).unwrap_or_default();
                ProductWithVariants { product, variants }
            })
            .collect();

        Ok(ProductPage {
            items,
            total,
            page,
            per_page,
        })
    }

    #[instrument(skip(self))]
    pub async fn create_category(&self, name: String) -> Result<CategoryModel, ServiceError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "category name must not be empty".into(),
            ));
        }
        let existing = Category::find()
            .filter(category::Column::Name.eq(name.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "category '{name}' already exists"
            )));
        }

        let created = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(category_id = %created.id, "category created");
        Ok(created)
    }

    pub async fn list_categories(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(Category::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Removes a category and detaches its products. Products themselves
    /// stay in the catalog, uncategorised.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, category_id: Uuid) -> Result<(), ServiceError> {
        let existing = Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {category_id} not found")))?;

        let txn = self.db.begin().await?;
        Product::update_many()
            .col_expr(product::Column::CategoryId, Expr::value(Value::Uuid(None)))
            .filter(product::Column::CategoryId.eq(category_id))
            .exec(&txn)
            .await?;
        existing.delete(&txn).await?;
        txn.commit().await?;

        info!(%category_id, "category deleted");
        Ok(())
    }

    async fn ensure_category(&self, category_id: Uuid) -> Result<(), ServiceError> {
        Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {category_id} not found")))?;
        Ok(())
    }

    async fn variants_of(&self, product_id: Uuid) -> Result<Vec<ProductVariantModel>, ServiceError> {
        Ok(ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::Price)
            .all(&*self.db)
            .await?)
    }
}

/// `(SELECT MIN(price) FROM product_variants WHERE product_id = products.id)`
fn min_variant_price() -> SimpleExpr {
    let sub = Query::select()
        .expr(Expr::col((ProductVariant, product_variant::Column::Price)).min())
        .from(ProductVariant)
        .and_where(
            Expr::col((ProductVariant, product_variant::Column::ProductId))
                .equals((Product, product::Column::Id)),
        )
        .to_owned();
    SimpleExpr::SubQuery(None, Box::new(SubQueryStatement::SelectStatement(sub)))
}
