//! Conversation store: fetch, clean, enrich and persist a website per conversation.

use std::sync::Arc;

use tracing::{info, instrument};
use url::Url;

use sitebot_cleaner::html_to_text;
use sitebot_fetcher::PageFetcher;
use sitebot_shared::{ConversationContext, ConversationId, Result, SiteBotError};
use sitebot_storage::Storage;

use crate::enrichment::{COMPANY_LOOKUP_QUERY, InfoEnricher, append_company_info};

#[derive(Clone)]
pub struct ConversationStore {
    storage: Arc<Storage>,
    fetcher: PageFetcher,
    enricher: Arc<dyn InfoEnricher>,
}

impl ConversationStore {
    pub fn new(storage: Arc<Storage>, fetcher: PageFetcher, enricher: Arc<dyn InfoEnricher>) -> Self {
        Self {
            storage,
            fetcher,
            enricher,
        }
    }

    /// Fetch and enrich `website`, then upsert it for the conversation.
    ///
    /// The page is fetched and the company looked up on every call. A failed
    /// fetch stores empty page text rather than failing.
    #[instrument(skip_all, fields(conversation_id = %conversation_id, website = %website))]
    pub async fn save(
        &self,
        conversation_id: ConversationId,
        website: &str,
    ) -> Result<ConversationContext> {
        let url = Url::parse(website)
            .map_err(|e| SiteBotError::validation(format!("invalid website URL {website:?}: {e}")))?;

        let html = self.fetcher.fetch(&url).await;
        let page_text = html_to_text(&html);
        let company = self.enricher.enrich(&url, COMPANY_LOOKUP_QUERY).await;
        let blob = append_company_info(&page_text, &company)?;

        let ctx = self
            .storage
            .upsert_context(conversation_id, website, &blob)
            .await?;

        info!(
            html_len = html.len(),
            text_len = page_text.len(),
            company = %company.company_name,
            enricher = self.enricher.name(),
            "website saved"
        );
        Ok(ctx)
    }

    /// Most recently saved website for the conversation.
    pub async fn get_latest(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationContext>> {
        self.storage.get_latest_context(conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{OfflineEnricher, split_enriched_text};
    use sitebot_shared::FetchConfig;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_store() -> ConversationStore {
        let tmp = std::env::temp_dir().join(format!("sb_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.expect("open test db");
        let fetcher = PageFetcher::new(&FetchConfig {
            allow_private_hosts: true,
            ..FetchConfig::default()
        })
        .unwrap();
        ConversationStore::new(Arc::new(storage), fetcher, Arc::new(OfflineEnricher))
    }

    #[tokio::test]
    async fn save_fetches_cleans_and_enriches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><head><script>track()</script></head><body><h1>Acme</h1><p>We  sell anvils</p></body></html>",
            ))
            .mount(&server)
            .await;

        let store = test_store().await;
        let ctx = store.save(ConversationId(5), &server.uri()).await.unwrap();
        assert_eq!(ctx.website, server.uri());

        let (text, info) = split_enriched_text(&ctx.enriched_text);
        assert_eq!(text, "AcmeWe sell anvils");
        assert_eq!(info.unwrap().company_name, "127");
    }

    #[tokio::test]
    async fn fetch_failure_stores_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = test_store().await;
        let ctx = store.save(ConversationId(5), &server.uri()).await.unwrap();
        let (text, info) = split_enriched_text(&ctx.enriched_text);
        assert_eq!(text, "");
        assert!(info.is_some());
    }

    #[tokio::test]
    async fn saving_twice_keeps_one_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>v</p>"))
            .mount(&server)
            .await;

        let store = test_store().await;
        let first = store.save(ConversationId(1), &server.uri()).await.unwrap();
        let second = store.save(ConversationId(1), &server.uri()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.storage.count_contexts(ConversationId(1)).await.unwrap(), 1);

        let latest = store.get_latest(ConversationId(1)).await.unwrap().unwrap();
        assert_eq!(latest, second);
    }

    #[tokio::test]
    async fn invalid_url_is_validation_error() {
        let store = test_store().await;
        let err = store.save(ConversationId(1), "https://").await.unwrap_err();
        assert!(matches!(err, SiteBotError::Validation { .. }));
    }

    #[tokio::test]
    async fn nothing_saved_yet() {
        let store = test_store().await;
        assert!(store.get_latest(ConversationId(404)).await.unwrap().is_none());
    }
}
