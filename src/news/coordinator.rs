//! The News NLP Coordinator: fans each article out to the four leaf
//! analyzers concurrently, then assembles a `NewsReport` across the batch.

use std::sync::Arc;

use futures::future::join_all;

use crate::errors::RuntimeError;
use crate::model::report::{NewsArticleReport, NewsReport, NewsSummary};

use super::analyzers::{ImpactAnalyzer, KeywordAnalyzer, NerAnalyzer, SentimentAnalyzer};

pub struct NewsCoordinator {
    sentiment: Arc<dyn SentimentAnalyzer>,
    ner: Arc<dyn NerAnalyzer>,
    impact: Arc<dyn ImpactAnalyzer>,
    keyword: Arc<dyn KeywordAnalyzer>,
}

impl NewsCoordinator {
    #[must_use]
    pub fn new(
        sentiment: Arc<dyn SentimentAnalyzer>,
        ner: Arc<dyn NerAnalyzer>,
        impact: Arc<dyn ImpactAnalyzer>,
        keyword: Arc<dyn KeywordAnalyzer>,
    ) -> Self {
        Self {
            sentiment,
            ner,
            impact,
            keyword,
        }
    }

    #[must_use]
    pub fn with_default_analyzers() -> Self {
        use super::analyzers::{CapitalizedRunNerAnalyzer, KeywordImpactAnalyzer, LexiconKeywordAnalyzer, LexiconSentimentAnalyzer};
        Self::new(
            Arc::new(LexiconSentimentAnalyzer),
            Arc::new(CapitalizedRunNerAnalyzer),
            Arc::new(KeywordImpactAnalyzer),
            Arc::new(LexiconKeywordAnalyzer),
        )
    }

    async fn analyze_one(&self, article: String) -> Result<NewsArticleReport, RuntimeError> {
        let (sentiment, ner, impact, keyword) = {
            let s = self.sentiment.clone();
            let n = self.ner.clone();
            let i = self.impact.clone();
            let k = self.keyword.clone();
            let a1 = article.clone();
            let a2 = article.clone();
            let a3 = article.clone();
            let a4 = article;
            let (s, n, i, k) = tokio::join!(
                tokio::task::spawn_blocking(move || s.analyze(&a1)),
                tokio::task::spawn_blocking(move || n.analyze(&a2)),
                tokio::task::spawn_blocking(move || i.analyze(&a3)),
                tokio::task::spawn_blocking(move || k.analyze(&a4)),
            );
            (
                s.map_err(|e| RuntimeError::Internal(anyhow::anyhow!(e)))?,
                n.map_err(|e| RuntimeError::Internal(anyhow::anyhow!(e)))?,
                i.map_err(|e| RuntimeError::Internal(anyhow::anyhow!(e)))?,
                k.map_err(|e| RuntimeError::Internal(anyhow::anyhow!(e)))?,
            )
        };
        Ok(NewsArticleReport {
            sentiment,
            ner,
            impact,
            keyword_evidence: keyword,
        })
    }

    /// Analyze every article for `ticker`. A single article's analyzer
    /// failure drops that article from the result (logged) rather than
    /// failing the whole batch -- news coverage is best-effort.
    pub async fn analyze_batch(&self, ticker: &str, articles: &[String]) -> NewsReport {
        let reports = join_all(articles.iter().cloned().map(|a| self.analyze_one(a))).await;
        let mut articles_out = Vec::with_capacity(reports.len());
        for (idx, result) in reports.into_iter().enumerate() {
            match result {
                Ok(report) => articles_out.push(report),
                Err(err) => {
                    tracing::warn!(ticker, article_index = idx, error = %err, "article analysis failed, dropping from batch");
                }
            }
        }
        let overall_sentiment_score = if articles_out.is_empty() {
            0.0
        } else {
            articles_out.iter().map(|a| a.sentiment.score).sum::<f64>() / articles_out.len() as f64
        };
        let article_count = articles_out.len();
        NewsReport {
            articles: articles_out,
            summary: NewsSummary {
                overall_sentiment_score,
                article_count,
            },
        }
    }

    /// Warms any leaf-model caches. The lexicon-based analyzers here have
    /// nothing to warm; a model-backed swap-in would do its loading here.
    pub async fn preload_caches(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

pub type SharedNewsCoordinator = Arc<NewsCoordinator>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn analyze_batch_summarizes_across_articles() {
        let coordinator = NewsCoordinator::with_default_analyzers();
        let articles = vec![
            "Company beats earnings expectations, shares rally".to_string(),
            "Analysts downgrade citing weak demand".to_string(),
        ];
        let report = coordinator.analyze_batch("ABC", &articles).await;
        assert_eq!(report.articles.len(), 2);
        assert_eq!(report.summary.article_count, 2);
    }

    #[tokio::test]
    async fn analyze_batch_on_empty_input_yields_zeroed_summary() {
        let coordinator = NewsCoordinator::with_default_analyzers();
        let report = coordinator.analyze_batch("ABC", &[]).await;
        assert_eq!(report.summary.article_count, 0);
        assert_eq!(report.summary.overall_sentiment_score, 0.0);
    }
}
