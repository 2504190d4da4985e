//! In-memory [`Store`] implementation for tests.
//!
//! Uses `Vec`s behind `std::sync::RwLock` with atomic id counters. Row
//! ordering matches insertion order, mirroring the rowid ordering of the
//! SQLite store.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Analysis, AnalysisStatus, Company, Insight, InsightSource, NewInsight, NewRecommendation,
    NewResearchDocument, Product, Recommendation, ResearchDocument, SalesStrategy,
    StrategyContent,
};

use super::Store;

/// In-memory store for exercising stages without a database.
pub struct InMemoryStore {
    next_id: AtomicI64,
    companies: RwLock<Vec<Company>>,
    analyses: RwLock<Vec<Analysis>>,
    documents: RwLock<Vec<ResearchDocument>>,
    insights: RwLock<Vec<Insight>>,
    insight_sources: RwLock<Vec<InsightSource>>,
    recommendations: RwLock<Vec<Recommendation>>,
    strategies: RwLock<Vec<SalesStrategy>>,
    products: RwLock<Vec<Product>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            companies: RwLock::new(Vec::new()),
            analyses: RwLock::new(Vec::new()),
            documents: RwLock::new(Vec::new()),
            insights: RwLock::new(Vec::new()),
            insight_sources: RwLock::new(Vec::new()),
            recommendations: RwLock::new(Vec::new()),
            strategies: RwLock::new(Vec::new()),
            products: RwLock::new(Vec::new()),
        }
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// All provenance links, for test assertions.
    pub fn insight_sources(&self) -> Vec<InsightSource> {
        self.insight_sources.read().unwrap().clone()
    }

    /// All research documents, for test assertions.
    pub fn research_documents(&self) -> Vec<ResearchDocument> {
        self.documents.read().unwrap().clone()
    }

    /// Number of strategy rows for an analysis, for upsert assertions.
    pub fn strategy_row_count(&self, analysis_id: i64) -> usize {
        self.strategies
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.analysis_id == analysis_id)
            .count()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_or_create_company(&self, name: &str, domain: Option<&str>) -> Result<Company> {
        let mut companies = self.companies.write().unwrap();
        if let Some(existing) = companies
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            return Ok(existing.clone());
        }
        let company = Company {
            id: self.alloc_id(),
            name: name.to_string(),
            domain: domain.map(|d| d.to_string()),
        };
        companies.push(company.clone());
        Ok(company)
    }

    async fn get_company(&self, id: i64) -> Result<Option<Company>> {
        Ok(self
            .companies
            .read()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn create_analysis(
        &self,
        user_id: i64,
        company_id: i64,
        propensity_score: i64,
        deal_stage: Option<&str>,
    ) -> Result<Analysis> {
        let now = chrono::Utc::now().timestamp();
        let analysis = Analysis {
            id: self.alloc_id(),
            user_id,
            company_id,
            status: AnalysisStatus::Pending,
            strategic_score: None,
            propensity_score,
            deal_stage: deal_stage.map(|s| s.to_string()),
            error_stage: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.analyses.write().unwrap().push(analysis.clone());
        Ok(analysis)
    }

    async fn get_analysis(&self, id: i64) -> Result<Option<Analysis>> {
        Ok(self
            .analyses
            .read()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn find_active_analysis(
        &self,
        user_id: i64,
        company_id: i64,
    ) -> Result<Option<Analysis>> {
        Ok(self
            .analyses
            .read()
            .unwrap()
            .iter()
            .find(|a| {
                a.user_id == user_id
                    && a.company_id == company_id
                    && a.status != AnalysisStatus::Completed
            })
            .cloned())
    }

    async fn update_analysis_status(&self, id: i64, status: AnalysisStatus) -> Result<()> {
        let mut analyses = self.analyses.write().unwrap();
        if let Some(analysis) = analyses.iter_mut().find(|a| a.id == id) {
            analysis.status = status;
            analysis.updated_at = chrono::Utc::now().timestamp();
        }
        Ok(())
    }

    async fn mark_analysis_failed(&self, id: i64, stage: &str, message: &str) -> Result<()> {
        let mut analyses = self.analyses.write().unwrap();
        if let Some(analysis) = analyses.iter_mut().find(|a| a.id == id) {
            analysis.status = AnalysisStatus::Failed;
            analysis.error_stage = Some(stage.to_string());
            analysis.error_message = Some(message.to_string());
            analysis.updated_at = chrono::Utc::now().timestamp();
        }
        Ok(())
    }

    async fn set_strategic_score(&self, id: i64, score: i64) -> Result<()> {
        let mut analyses = self.analyses.write().unwrap();
        if let Some(analysis) = analyses.iter_mut().find(|a| a.id == id) {
            analysis.strategic_score = Some(score);
        }
        Ok(())
    }

    async fn list_completed_analyses(&self, user_id: i64) -> Result<Vec<Analysis>> {
        Ok(self
            .analyses
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id && a.status == AnalysisStatus::Completed)
            .cloned()
            .collect())
    }

    async fn delete_analysis(&self, id: i64) -> Result<()> {
        let insight_ids: Vec<i64> = self
            .insights
            .read()
            .unwrap()
            .iter()
            .filter(|i| i.analysis_id == id)
            .map(|i| i.id)
            .collect();

        self.analyses.write().unwrap().retain(|a| a.id != id);
        self.documents.write().unwrap().retain(|d| d.analysis_id != id);
        self.insights.write().unwrap().retain(|i| i.analysis_id != id);
        self.insight_sources
            .write()
            .unwrap()
            .retain(|s| !insight_ids.contains(&s.insight_id));
        self.recommendations
            .write()
            .unwrap()
            .retain(|r| !insight_ids.contains(&r.insight_id));
        self.strategies.write().unwrap().retain(|s| s.analysis_id != id);
        Ok(())
    }

    async fn insert_research_document(&self, doc: NewResearchDocument) -> Result<i64> {
        let id = self.alloc_id();
        self.documents.write().unwrap().push(ResearchDocument {
            id,
            analysis_id: doc.analysis_id,
            title: doc.title,
            source_url: doc.source_url,
            raw_content: doc.raw_content,
            embedding_id: None,
            created_at: chrono::Utc::now().timestamp(),
        });
        Ok(id)
    }

    async fn set_document_embedding_id(&self, document_id: i64, embedding_id: &str) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        if let Some(doc) = documents.iter_mut().find(|d| d.id == document_id) {
            doc.embedding_id = Some(embedding_id.to_string());
        }
        Ok(())
    }

    async fn get_research_document(&self, id: i64) -> Result<Option<ResearchDocument>> {
        Ok(self
            .documents
            .read()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn insert_insight(&self, insight: NewInsight) -> Result<i64> {
        let id = self.alloc_id();
        self.insights.write().unwrap().push(Insight {
            id,
            analysis_id: insight.analysis_id,
            title: insight.title,
            description: insight.description,
            category: insight.category,
            severity: insight.severity,
        });
        Ok(id)
    }

    async fn insert_insight_source(
        &self,
        insight_id: i64,
        research_document_id: i64,
        snippet: &str,
    ) -> Result<()> {
        let id = self.alloc_id();
        self.insight_sources.write().unwrap().push(InsightSource {
            id,
            insight_id,
            research_document_id,
            snippet: snippet.to_string(),
        });
        Ok(())
    }

    async fn get_insight(&self, id: i64) -> Result<Option<Insight>> {
        Ok(self
            .insights
            .read()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn list_insights(&self, analysis_id: i64) -> Result<Vec<Insight>> {
        Ok(self
            .insights
            .read()
            .unwrap()
            .iter()
            .filter(|i| i.analysis_id == analysis_id)
            .cloned()
            .collect())
    }

    async fn replace_recommendations(
        &self,
        insight_id: i64,
        recommendations: &[NewRecommendation],
    ) -> Result<()> {
        let mut stored = self.recommendations.write().unwrap();
        stored.retain(|r| r.insight_id != insight_id);
        for rec in recommendations {
            stored.push(Recommendation {
                id: self.alloc_id(),
                insight_id: rec.insight_id,
                product_id: rec.product_id,
                match_percentage: rec.match_percentage,
                strategic_fit: rec.strategic_fit,
                confidence_score: rec.confidence_score,
                priority_rank: rec.priority_rank,
                llm_rank_position: rec.llm_rank_position,
                reasoning: rec.reasoning.clone(),
                is_accepted: None,
            });
        }
        Ok(())
    }

    async fn list_recommendations(&self, analysis_id: i64) -> Result<Vec<Recommendation>> {
        let insight_ids: Vec<i64> = self
            .insights
            .read()
            .unwrap()
            .iter()
            .filter(|i| i.analysis_id == analysis_id)
            .map(|i| i.id)
            .collect();
        let mut recs: Vec<Recommendation> = self
            .recommendations
            .read()
            .unwrap()
            .iter()
            .filter(|r| insight_ids.contains(&r.insight_id))
            .cloned()
            .collect();
        recs.sort_by_key(|r| (r.insight_id, r.priority_rank));
        Ok(recs)
    }

    async fn list_accepted_recommendations(
        &self,
        analysis_id: i64,
    ) -> Result<Vec<Recommendation>> {
        Ok(self
            .list_recommendations(analysis_id)
            .await?
            .into_iter()
            .filter(|r| r.is_accepted == Some(true))
            .collect())
    }

    async fn set_recommendation_acceptance(
        &self,
        recommendation_id: i64,
        accepted: Option<bool>,
    ) -> Result<bool> {
        let mut recs = self.recommendations.write().unwrap();
        match recs.iter_mut().find(|r| r.id == recommendation_id) {
            Some(rec) => {
                rec.is_accepted = accepted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn max_recommendation_confidence(&self, analysis_id: i64) -> Result<Option<f64>> {
        Ok(self
            .list_recommendations(analysis_id)
            .await?
            .iter()
            .map(|r| r.confidence_score)
            .fold(None, |acc: Option<f64>, score| {
                Some(acc.map_or(score, |best| best.max(score)))
            }))
    }

    async fn upsert_strategy(&self, analysis_id: i64, content: &StrategyContent) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut strategies = self.strategies.write().unwrap();
        if let Some(existing) = strategies.iter_mut().find(|s| s.analysis_id == analysis_id) {
            existing.status = "generated".to_string();
            existing.overview = content.overview.clone();
            existing.priority_initiatives = content.priority_initiatives.clone();
            existing.financial_positioning = content.financial_positioning.clone();
            existing.technical_summary = content.technical_summary.clone();
            existing.objection_handling = content.objection_handling.clone();
            existing.executive_version = content.executive_version.clone();
            existing.email_version = content.email_version.clone();
            existing.generated_by_llm = content.generated_by_llm;
            existing.updated_at = now;
            return Ok(());
        }
        strategies.push(SalesStrategy {
            id: self.alloc_id(),
            analysis_id,
            status: "generated".to_string(),
            overview: content.overview.clone(),
            priority_initiatives: content.priority_initiatives.clone(),
            financial_positioning: content.financial_positioning.clone(),
            technical_summary: content.technical_summary.clone(),
            objection_handling: content.objection_handling.clone(),
            executive_version: content.executive_version.clone(),
            email_version: content.email_version.clone(),
            generated_by_llm: content.generated_by_llm,
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }

    async fn get_strategy(&self, analysis_id: i64) -> Result<Option<SalesStrategy>> {
        Ok(self
            .strategies
            .read()
            .unwrap()
            .iter()
            .find(|s| s.analysis_id == analysis_id)
            .cloned())
    }

    async fn upsert_product(
        &self,
        name: &str,
        category: &str,
        description: &str,
        value_proposition: &str,
    ) -> Result<Product> {
        let mut products = self.products.write().unwrap();
        if let Some(existing) = products.iter_mut().find(|p| p.name == name) {
            existing.category = category.to_string();
            existing.description = description.to_string();
            existing.value_proposition = value_proposition.to_string();
            return Ok(existing.clone());
        }
        let product = Product {
            id: self.alloc_id(),
            name: name.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            value_proposition: value_proposition.to_string(),
            content_hash: None,
        };
        products.push(product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        Ok(self
            .products
            .read()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.products.read().unwrap().clone())
    }

    async fn set_product_content_hash(&self, id: i64, hash: &str) -> Result<()> {
        let mut products = self.products.write().unwrap();
        if let Some(product) = products.iter_mut().find(|p| p.id == id) {
            product.content_hash = Some(hash.to_string());
        }
        Ok(())
    }
}
