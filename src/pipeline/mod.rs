//! Context search orchestrator: generate, search, load, score, rank.
//!
//! One structured generation call turns the context into search pairs.
//! Each pair's query fans out to the image search backend, and every hit
//! is loaded and scored against that pair's description on a bounded
//! worker pool. Per-item failures are logged and dropped; only generation
//! and configuration failures reach the caller.

pub mod rank;

use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clip::{ClipModel, ClipScorer, EmbeddingScorer, RelevanceScorer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{LlmClient, QueryGenerator};
use crate::loader::{HttpImageLoader, ImageLoader};
use crate::search::{GoogleImageSearch, ImageSearchClient};
use crate::types::{ImageCandidate, ImageSearchResult, ScoredCandidate, SearchPair};

/// Tuning for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Candidates requested from the search backend per pair.
    pub results_per_query: usize,
    /// Worker threads for search, load and scoring.
    pub max_concurrency: usize,
    /// Budget for everything after generation returns.
    pub timeout: Duration,
    pub min_score: Option<f32>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            results_per_query: config.search.results_per_query,
            max_concurrency: config.pipeline.max_concurrency,
            timeout: Duration::from_secs(config.pipeline.timeout_secs),
            min_score: config.pipeline.min_score,
        }
    }
}

/// Point after which no new work starts. A timeout too large to represent
/// never expires.
#[derive(Debug, Clone, Copy)]
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    fn passed(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// Finds web images that match a free-text context.
pub struct ContextSearch {
    generator: Arc<dyn QueryGenerator>,
    search: Arc<dyn ImageSearchClient>,
    loader: Arc<dyn ImageLoader>,
    scorer: Arc<dyn RelevanceScorer>,
    options: PipelineOptions,
    pool: rayon::ThreadPool,
}

impl ContextSearch {
    /// Build the default pipeline with explicit search credentials.
    ///
    /// Everything else comes from [`Config::default`].
    pub fn new(google_api_key: &str, google_cx: &str) -> Result<Self> {
        let mut config = Config::default();
        config.search.api_key = Some(google_api_key.to_string());
        config.search.engine_id = Some(google_cx.to_string());
        Self::from_config(&config)
    }

    /// Build the default pipeline from configuration.
    ///
    /// Configuration is validated before any network access, including the
    /// CLIP model download.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let generator = LlmClient::from_config(&config.llm);
        let search = GoogleImageSearch::from_config(&config.search)?;
        let loader = HttpImageLoader::new(&config.loader);

        let model = ClipModel::load(&config.clip).map_err(|e| Error::Model(format!("{e:#}")))?;
        let scorer: ClipScorer = EmbeddingScorer::new(model);

        tracing::info!(
            provider = generator.provider_name(),
            max_concurrency = config.pipeline.max_concurrency,
            "context search ready"
        );

        Self::with_components(
            Arc::new(generator),
            Arc::new(search),
            Arc::new(loader),
            Arc::new(scorer),
            PipelineOptions::from_config(config),
        )
    }

    /// Assemble a pipeline from arbitrary component implementations.
    pub fn with_components(
        generator: Arc<dyn QueryGenerator>,
        search: Arc<dyn ImageSearchClient>,
        loader: Arc<dyn ImageLoader>,
        scorer: Arc<dyn RelevanceScorer>,
        options: PipelineOptions,
    ) -> Result<Self> {
        if options.max_concurrency == 0 {
            return Err(Error::Config(
                "pipeline.max_concurrency must be greater than 0".into(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_concurrency)
            .thread_name(|i| format!("contextsearch-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("failed to start worker pool: {e}")))?;

        Ok(Self {
            generator,
            search,
            loader,
            scorer,
            options,
            pool,
        })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Find up to `limit` images matching `context`, best first.
    ///
    /// A blank context or a zero limit returns an empty list without
    /// calling any backend. Blank `custom_prompt` values are ignored.
    ///
    /// # Errors
    ///
    /// Only [`Error::Generation`] is returned; search, load and score
    /// failures shrink the result instead.
    pub fn search_with_context(
        &self,
        context: &str,
        limit: usize,
        custom_prompt: Option<&str>,
    ) -> Result<Vec<ImageSearchResult>> {
        let context = context.trim();
        if context.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let custom_prompt = custom_prompt.map(str::trim).filter(|p| !p.is_empty());

        let pairs = self.generator.generate(context, custom_prompt).map_err(|e| {
            tracing::error!(error = %e, "query generation failed");
            e
        })?;
        if pairs.is_empty() {
            tracing::debug!("generator returned no pairs");
            return Ok(Vec::new());
        }

        let deadline = Deadline::after(self.options.timeout);
        tracing::debug!(pairs = pairs.len(), limit, "running image searches");

        // Collect keeps pair order, then backend order, whatever the scheduling
        let scored: Vec<ScoredCandidate> = self.pool.install(|| {
            pairs
                .par_iter()
                .flat_map_iter(|pair| self.run_pair(pair, deadline))
                .collect()
        });

        if deadline.passed() {
            tracing::warn!(
                timeout_secs = self.options.timeout.as_secs(),
                scored = scored.len(),
                "search deadline reached, ranking partial results"
            );
        }

        let results = rank::rank(scored, self.options.min_score, limit);
        tracing::debug!(results = results.len(), "context search complete");
        Ok(results)
    }

    /// Search one pair and score its hits.
    fn run_pair(&self, pair: &SearchPair, deadline: Deadline) -> Vec<ScoredCandidate> {
        if deadline.passed() {
            return Vec::new();
        }

        let candidates = match self.search.search(&pair.query, self.options.results_per_query) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(query = %pair.query, error = %e, "image search failed");
                return Vec::new();
            }
        };
        tracing::debug!(query = %pair.query, count = candidates.len(), "search candidates");

        candidates
            .par_iter()
            .filter_map(|candidate| match self.evaluate(pair, candidate, deadline) {
                Some(Ok(scored)) => Some(scored),
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "candidate dropped");
                    None
                }
                None => None,
            })
            .collect()
    }

    /// Load and score one candidate. `None` means the deadline passed first.
    fn evaluate(
        &self,
        pair: &SearchPair,
        candidate: &ImageCandidate,
        deadline: Deadline,
    ) -> Option<Result<ScoredCandidate>> {
        if deadline.passed() {
            return None;
        }
        let image = match self.loader.load(&candidate.url) {
            Ok(image) => image,
            Err(e) => return Some(Err(e)),
        };

        if deadline.passed() {
            return None;
        }
        let score = match self.scorer.score(&image, &pair.description) {
            Ok(score) => score,
            Err(e) => return Some(Err(e)),
        };

        tracing::debug!(url = %candidate.url, score, "candidate scored");
        Some(Ok(ScoredCandidate {
            url: candidate.url.clone(),
            description: pair.description.clone(),
            source_query: candidate.source_query.clone(),
            score,
        }))
    }
}
