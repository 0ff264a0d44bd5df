use crate::aliases::ArchiveAliases;
use crate::error::SearchError;
use crate::models::{ChunkPayload, FilterValue, SearchFilters, SearchRequest, SearchResult};
use crate::query::{parse_shorthand, FilterKey};
use crate::traits::{EmbeddingProvider, NativeFilter, Reranker, VectorStore};
use tracing::debug;

pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 20;
pub const FILTERED_OVERFETCH_FACTOR: usize = 5;
pub const UNFILTERED_OVERFETCH_FACTOR: usize = 3;
pub const MIN_UNFILTERED_FETCH: usize = 30;
pub const RERANK_TEXT_LIMIT: usize = 1_500;

pub struct SearchPipeline<E, V, R> {
    embedder: E,
    store: V,
    reranker: Option<R>,
    aliases: ArchiveAliases,
}

impl<E, V, R> SearchPipeline<E, V, R>
where
    E: EmbeddingProvider + Send + Sync,
    V: VectorStore + Send + Sync,
    R: Reranker + Send + Sync,
{
    pub fn new(embedder: E, store: V, reranker: Option<R>, aliases: ArchiveAliases) -> Self {
        Self {
            embedder,
            store,
            reranker,
            aliases,
        }
    }

    pub async fn run(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        let (clean_query, shorthand) = parse_shorthand(&request.text)
            .map_err(|error| SearchError::Request(error.to_string()))?;

        let mut filters = request.filters.clone();
        let mut top_k = request.top_k;
        for (key, value) in shorthand {
            match key {
                FilterKey::Type => {
                    if filters.item_type.is_none() {
                        filters.item_type = Some(value);
                    }
                }
                FilterKey::By => {
                    if filters.author.is_none() {
                        filters.author = Some(value);
                    }
                }
                FilterKey::Tag => {
                    if filters.tag.is_none() {
                        filters.tag = Some(value);
                    }
                }
                FilterKey::In => {
                    if filters.archive.is_none() {
                        filters.archive = Some(value);
                    }
                }
                FilterKey::Collection => {
                    if filters.collection.is_none() {
                        filters.collection = Some(value);
                    }
                }
                FilterKey::From => {
                    if filters.date_from.is_none() {
                        filters.date_from = Some(value.text);
                    }
                }
                FilterKey::To => {
                    if filters.date_to.is_none() {
                        filters.date_to = Some(value.text);
                    }
                }
                FilterKey::Top => {
                    if let Ok(parsed) = value.text.parse::<usize>() {
                        top_k = parsed;
                    }
                }
            }
        }
        let top_k = top_k.clamp(MIN_TOP_K, MAX_TOP_K);

        let native = filters.item_type.as_ref().map(|value| NativeFilter {
            item_type: Some(value.text.clone()),
        });
        let fetch = if filters.has_client_side() {
            top_k * FILTERED_OVERFETCH_FACTOR
        } else {
            (top_k * UNFILTERED_OVERFETCH_FACTOR).max(MIN_UNFILTERED_FETCH)
        };

        let vector = self.embedder.embed_query(&clean_query).await?;
        debug!(top_k, fetch, "querying vector store");
        let mut candidates = self.store.query(&vector, fetch, native.as_ref()).await?;
        candidates.retain(|candidate| self.passes_filters(&filters, &candidate.payload));
        debug!(candidates = candidates.len(), "after metadata filters");

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(reranker) = &self.reranker {
            let texts: Vec<String> = candidates
                .iter()
                .map(|candidate| truncate_chars(&candidate.payload.text, RERANK_TEXT_LIMIT))
                .collect();
            let mut entries = reranker.rerank(&clean_query, &texts).await?;
            entries.sort_by(|a, b| b.score.total_cmp(&a.score));

            let mut results = Vec::new();
            for entry in entries.into_iter().take(top_k) {
                let candidate =
                    candidates
                        .get(entry.index)
                        .ok_or_else(|| SearchError::BackendResponse {
                            backend: "reranker".to_string(),
                            details: format!("result index {} out of range", entry.index),
                        })?;
                results.push(SearchResult {
                    id: candidate.id.clone(),
                    score: candidate.score,
                    metadata: candidate.payload.clone(),
                    rerank_score: Some(entry.score),
                });
            }
            return Ok(results);
        }

        candidates.truncate(top_k);
        Ok(candidates
            .into_iter()
            .map(|candidate| SearchResult {
                id: candidate.id,
                score: candidate.score,
                metadata: candidate.payload,
                rerank_score: None,
            })
            .collect())
    }

    fn passes_filters(&self, filters: &SearchFilters, payload: &ChunkPayload) -> bool {
        if let Some(author) = &filters.author {
            if !text_matches(author, &payload.authors.join(" ")) {
                return false;
            }
        }
        if let Some(tag) = &filters.tag {
            if !payload.tags.iter().any(|candidate| text_matches(tag, candidate)) {
                return false;
            }
        }
        if let Some(collection) = &filters.collection {
            if !payload
                .collections
                .iter()
                .any(|candidate| text_matches(collection, candidate))
            {
                return false;
            }
        }
        if let Some(archive) = &filters.archive {
            if !self.archive_matches(archive, &payload.archive_collection) {
                return false;
            }
        }
        if !payload.date.is_empty() {
            if let Some(from) = &filters.date_from {
                if payload.date.as_str() < from.as_str() {
                    return false;
                }
            }
            if let Some(to) = &filters.date_to {
                if payload.date.as_str() > to.as_str() {
                    return false;
                }
            }
        }
        true
    }

    fn archive_matches(&self, value: &FilterValue, archive_collection: &str) -> bool {
        if let Some(canonical) = self.aliases.resolve(&value.text) {
            return archive_collection.to_lowercase() == canonical.to_lowercase();
        }
        text_matches(value, archive_collection)
    }
}

fn text_matches(value: &FilterValue, candidate: &str) -> bool {
    let needle = value.text.to_lowercase();
    let haystack = candidate.to_lowercase();
    if value.exact {
        haystack == needle
    } else {
        haystack.contains(&needle)
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{RerankEntry, ScoredPoint, UpsertPoint};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeEmbedder {
        queries: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
            if self.fail {
                return Err(SearchError::Request("embedding backend down".to_string()));
            }
            self.queries.lock().unwrap().push(text.to_string());
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    #[derive(Clone, Default)]
    struct FakeStore {
        points: Vec<ScoredPoint>,
        requests: Arc<Mutex<Vec<(usize, Option<String>)>>>,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn upsert(&self, _points: &[UpsertPoint]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            top_k: usize,
            filter: Option<&NativeFilter>,
        ) -> Result<Vec<ScoredPoint>, SearchError> {
            self.requests
                .lock()
                .unwrap()
                .push((top_k, filter.and_then(|f| f.item_type.clone())));
            Ok(self.points.clone())
        }

        async fn delete_by_item(&self, _item_key: &str) -> Result<(), SearchError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeReranker {
        scores: Vec<f32>,
        called: Arc<Mutex<bool>>,
        texts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Reranker for FakeReranker {
        async fn rerank(
            &self,
            _query: &str,
            texts: &[String],
        ) -> Result<Vec<RerankEntry>, SearchError> {
            *self.called.lock().unwrap() = true;
            self.texts.lock().unwrap().extend(texts.iter().cloned());
            Ok(texts
                .iter()
                .enumerate()
                .map(|(index, _)| RerankEntry {
                    index,
                    score: self.scores.get(index).copied().unwrap_or(0.0),
                })
                .collect())
        }
    }

    struct BadReranker;

    #[async_trait]
    impl Reranker for BadReranker {
        async fn rerank(
            &self,
            _query: &str,
            _texts: &[String],
        ) -> Result<Vec<RerankEntry>, SearchError> {
            Ok(vec![RerankEntry {
                index: 99,
                score: 1.0,
            }])
        }
    }

    fn payload(item_key: &str, text: &str) -> ChunkPayload {
        ChunkPayload {
            text: text.to_string(),
            item_key: item_key.to_string(),
            ..ChunkPayload::default()
        }
    }

    fn point(id: &str, score: f32, payload: ChunkPayload) -> ScoredPoint {
        ScoredPoint {
            id: id.to_string(),
            score,
            payload,
        }
    }

    fn request(text: &str) -> SearchRequest {
        SearchRequest::new(text)
    }

    #[tokio::test]
    async fn overfetch_widens_when_client_filters_apply() {
        let store = FakeStore {
            points: vec![point("a", 0.9, {
                let mut p = payload("K1", "passage");
                p.authors = vec!["Allen Dulles".to_string()];
                p
            })],
            ..FakeStore::default()
        };
        let pipeline = SearchPipeline::new(
            FakeEmbedder::default(),
            store.clone(),
            None::<FakeReranker>,
            ArchiveAliases::new(),
        );

        let mut unfiltered = request("covert budgets");
        unfiltered.top_k = 5;
        pipeline.run(&unfiltered).await.unwrap();

        let mut filtered = unfiltered.clone();
        filtered.filters.author = Some(FilterValue::fuzzy("dulles"));
        pipeline.run(&filtered).await.unwrap();

        let requests = store.requests.lock().unwrap();
        assert_eq!(requests[0].0, 30);
        assert_eq!(requests[1].0, 25);
    }

    #[tokio::test]
    async fn shorthand_type_reaches_the_native_filter() {
        let embedder = FakeEmbedder::default();
        let store = FakeStore::default();
        let pipeline = SearchPipeline::new(
            embedder.clone(),
            store.clone(),
            None::<FakeReranker>,
            ArchiveAliases::new(),
        );

        pipeline
            .run(&request("type:hearing oswald testimony"))
            .await
            .unwrap();

        assert_eq!(
            embedder.queries.lock().unwrap().as_slice(),
            ["oswald testimony".to_string()]
        );
        let requests = store.requests.lock().unwrap();
        assert_eq!(requests[0], (30, Some("hearing".to_string())));
    }

    #[tokio::test]
    async fn authors_match_against_the_joined_name_list() {
        let mut solo = payload("K1", "alpha");
        solo.authors = vec!["John J. McCloy".to_string()];
        let mut pair = payload("K2", "beta");
        pair.authors = vec!["Allen Dulles".to_string(), "Richard Helms".to_string()];
        let store = FakeStore {
            points: vec![point("a", 0.9, solo), point("b", 0.8, pair)],
            ..FakeStore::default()
        };
        let pipeline = SearchPipeline::new(
            FakeEmbedder::default(),
            store,
            None::<FakeReranker>,
            ArchiveAliases::new(),
        );

        let mut fuzzy = request("memo");
        fuzzy.filters.author = Some(FilterValue::fuzzy("dulles"));
        let results = pipeline.run(&fuzzy).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");

        let mut exact = request("memo");
        exact.filters.author = Some(FilterValue::exact("allen dulles richard helms"));
        let results = pipeline.run(&exact).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");

        let mut exact_single = request("memo");
        exact_single.filters.author = Some(FilterValue::exact("dulles"));
        let results = pipeline.run(&exact_single).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn archive_aliases_resolve_before_matching() {
        let aliases = ArchiveAliases::from_collections([(
            "DTRP: Denton Transcription Project",
            "Denton Transcription Project",
        )])
        .unwrap();
        let mut denton = payload("K1", "alpha");
        denton.archive_collection = "Denton Transcription Project".to_string();
        let mut nara = payload("K2", "beta");
        nara.archive_collection = "National Archives".to_string();
        let store = FakeStore {
            points: vec![point("a", 0.9, denton), point("b", 0.8, nara)],
            ..FakeStore::default()
        };
        let pipeline =
            SearchPipeline::new(FakeEmbedder::default(), store, None::<FakeReranker>, aliases);

        let mut by_alias = request("interview");
        by_alias.filters.archive = Some(FilterValue::fuzzy("dtrp"));
        let results = pipeline.run(&by_alias).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");

        let mut by_substring = request("interview");
        by_substring.filters.archive = Some(FilterValue::fuzzy("national"));
        let results = pipeline.run(&by_substring).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn undated_candidates_survive_date_filters() {
        let mut dated = payload("K1", "alpha");
        dated.date = "1963-11-22".to_string();
        let undated = payload("K2", "beta");
        let mut late = payload("K3", "gamma");
        late.date = "1964-05".to_string();
        let store = FakeStore {
            points: vec![
                point("a", 0.9, dated),
                point("b", 0.8, undated),
                point("c", 0.7, late),
            ],
            ..FakeStore::default()
        };
        let pipeline = SearchPipeline::new(
            FakeEmbedder::default(),
            store,
            None::<FakeReranker>,
            ArchiveAliases::new(),
        );

        let mut ranged = request("assassination cables");
        ranged.filters.date_from = Some("1963-11-22".to_string());
        ranged.filters.date_to = Some("1963-12".to_string());
        let results = pipeline.run(&ranged).await.unwrap();

        let ids: Vec<&str> = results.iter().map(|result| result.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn reranker_reorders_and_truncates_results() {
        let store = FakeStore {
            points: vec![
                point("a", 0.9, payload("K1", "alpha")),
                point("b", 0.8, payload("K2", "beta")),
                point("c", 0.7, payload("K3", "gamma")),
            ],
            ..FakeStore::default()
        };
        let reranker = FakeReranker {
            scores: vec![0.1, 0.9, 0.5],
            ..FakeReranker::default()
        };
        let pipeline = SearchPipeline::new(
            FakeEmbedder::default(),
            store,
            Some(reranker),
            ArchiveAliases::new(),
        );

        let mut two = request("berlin wall");
        two.top_k = 2;
        let results = pipeline.run(&two).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "b");
        assert_eq!(results[0].rerank_score, Some(0.9));
        assert_eq!(results[0].score, 0.8);
        assert_eq!(results[1].id, "c");
        assert_eq!(results[1].rerank_score, Some(0.5));
    }

    #[tokio::test]
    async fn reranker_is_skipped_when_filters_leave_nothing() {
        let store = FakeStore {
            points: vec![point("a", 0.9, payload("K1", "alpha"))],
            ..FakeStore::default()
        };
        let reranker = FakeReranker::default();
        let called = reranker.called.clone();
        let pipeline = SearchPipeline::new(
            FakeEmbedder::default(),
            store,
            Some(reranker),
            ArchiveAliases::new(),
        );

        let mut tagged = request("anything");
        tagged.filters.tag = Some(FilterValue::fuzzy("vietnam"));
        let results = pipeline.run(&tagged).await.unwrap();

        assert!(results.is_empty());
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn requested_depth_is_clamped() {
        let points = (0..25)
            .map(|index| {
                point(
                    &format!("p{index}"),
                    1.0 - index as f32 * 0.01,
                    payload("K", "text"),
                )
            })
            .collect();
        let store = FakeStore {
            points,
            ..FakeStore::default()
        };
        let pipeline = SearchPipeline::new(
            FakeEmbedder::default(),
            store.clone(),
            None::<FakeReranker>,
            ArchiveAliases::new(),
        );

        let mut deep = request("everything");
        deep.top_k = 50;
        let results = pipeline.run(&deep).await.unwrap();

        assert_eq!(results.len(), 20);
        assert_eq!(store.requests.lock().unwrap()[0].0, 60);
    }

    #[tokio::test]
    async fn shorthand_top_overrides_the_requested_depth() {
        let points = (0..10)
            .map(|index| point(&format!("p{index}"), 0.9, payload("K", "text")))
            .collect();
        let store = FakeStore {
            points,
            ..FakeStore::default()
        };
        let pipeline = SearchPipeline::new(
            FakeEmbedder::default(),
            store,
            None::<FakeReranker>,
            ArchiveAliases::new(),
        );

        let results = pipeline.run(&request("top:3 bretton woods memo")).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn rerank_texts_are_cut_to_the_limit() {
        let store = FakeStore {
            points: vec![point("a", 0.9, payload("K1", &"x".repeat(2_000)))],
            ..FakeStore::default()
        };
        let reranker = FakeReranker {
            scores: vec![1.0],
            ..FakeReranker::default()
        };
        let sent = reranker.texts.clone();
        let pipeline = SearchPipeline::new(
            FakeEmbedder::default(),
            store,
            Some(reranker),
            ArchiveAliases::new(),
        );

        pipeline.run(&request("long document")).await.unwrap();
        assert_eq!(sent.lock().unwrap()[0].chars().count(), RERANK_TEXT_LIMIT);
    }

    #[tokio::test]
    async fn embedding_failures_propagate() {
        let embedder = FakeEmbedder {
            fail: true,
            ..FakeEmbedder::default()
        };
        let pipeline = SearchPipeline::new(
            embedder,
            FakeStore::default(),
            None::<FakeReranker>,
            ArchiveAliases::new(),
        );

        let error = pipeline.run(&request("anything")).await.unwrap_err();
        assert!(matches!(error, SearchError::Request(_)));
    }

    #[tokio::test]
    async fn out_of_range_rerank_indexes_are_rejected() {
        let store = FakeStore {
            points: vec![point("a", 0.9, payload("K1", "alpha"))],
            ..FakeStore::default()
        };
        let pipeline = SearchPipeline::new(
            FakeEmbedder::default(),
            store,
            Some(BadReranker),
            ArchiveAliases::new(),
        );

        let error = pipeline.run(&request("anything")).await.unwrap_err();
        assert!(matches!(
            error,
            SearchError::BackendResponse { backend, .. } if backend == "reranker"
        ));
    }
}
