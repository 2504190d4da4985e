//! Product catalog management: TOML sync and content-addressed indexing.
//!
//! Indexing is incremental — a product is re-embedded only when the SHA-256
//! of its index text changes — and failures are isolated per product: one
//! bad product never aborts the rest of the run. (The research stage makes
//! the opposite choice on purpose; both behaviors are load-bearing.)

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use prospector_core::embedding::EmbeddingProvider;
use prospector_core::models::Product;
use prospector_core::provider::VectorIndex;
use prospector_core::store::Store;

/// Namespace holding the indexed product catalog.
pub const PRODUCT_NAMESPACE: &str = "products";

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    product: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    value_proposition: String,
}

/// Load or update catalog products from a TOML file (name-keyed upsert).
/// Returns the number of products processed.
pub async fn sync_catalog(store: &Arc<dyn Store>, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
    let file: CatalogFile =
        toml::from_str(&content).with_context(|| "Failed to parse catalog file")?;

    for entry in &file.product {
        store
            .upsert_product(
                &entry.name,
                &entry.category,
                &entry.description,
                &entry.value_proposition,
            )
            .await?;
    }

    Ok(file.product.len())
}

/// Outcome counts of one indexing run.
#[derive(Debug, Default)]
pub struct IndexSummary {
    pub total: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Embed and index every catalog product whose content changed.
pub async fn index_products(
    store: &Arc<dyn Store>,
    embeddings: &Arc<dyn EmbeddingProvider>,
    vectors: &Arc<dyn VectorIndex>,
) -> Result<IndexSummary> {
    let products = store.list_products().await?;
    let mut summary = IndexSummary {
        total: products.len(),
        ..Default::default()
    };

    for product in &products {
        let text = build_product_text(product);
        let hash = content_hash(&text);

        if product.content_hash.as_deref() == Some(hash.as_str()) {
            summary.skipped += 1;
            continue;
        }

        match index_one(store, embeddings, vectors, product, &text, &hash).await {
            Ok(()) => summary.indexed += 1,
            Err(err) => {
                // One bad product must not break the whole run
                warn!(product_id = product.id, error = %err, "failed to index product");
                summary.failed += 1;
            }
        }
    }

    info!(
        total = summary.total,
        indexed = summary.indexed,
        skipped = summary.skipped,
        failed = summary.failed,
        "catalog indexing complete"
    );

    Ok(summary)
}

async fn index_one(
    store: &Arc<dyn Store>,
    embeddings: &Arc<dyn EmbeddingProvider>,
    vectors: &Arc<dyn VectorIndex>,
    product: &Product,
    text: &str,
    hash: &str,
) -> Result<()> {
    let vector = embeddings.embed(text).await?;
    vectors
        .upsert(
            &format!("product-{}", product.id),
            &vector,
            json!({
                "product_id": product.id,
                "name": product.name,
                "category": product.category,
            }),
            PRODUCT_NAMESPACE,
        )
        .await?;
    store.set_product_content_hash(product.id, hash).await?;
    Ok(())
}

fn build_product_text(product: &Product) -> String {
    [
        format!("Product Name: {}", product.name),
        format!("Category: {}", product.category),
        format!("Description: {}", product.description),
        format!("Value Proposition: {}", product.value_proposition),
    ]
    .join("\n")
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_text_shape() {
        let product = Product {
            id: 1,
            name: "FlexConsumption Platform".into(),
            category: "Cloud".into(),
            description: "Usage-billed infrastructure".into(),
            value_proposition: "Turns CapEx into OpEx".into(),
            content_hash: None,
        };
        let text = build_product_text(&product);
        assert!(text.starts_with("Product Name: FlexConsumption Platform"));
        assert!(text.contains("Category: Cloud"));
        assert!(text.ends_with("Value Proposition: Turns CapEx into OpEx"));
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
