//! Corpus service: interactions, corrections, embeddings, search.

use crate::core::error::EngineError;
use crate::core::embedding;
use crate::core::policy::PolicyDocument;
use crate::core::router;
use crate::core::store::CorpusStore;
use crate::repos::corpus::{CorpusRepository, EmbeddingRecord, Interaction};
use crate::repos::session::SessionRepository;
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub interaction_id: String,
    pub score: f32,
    pub prompt: String,
    pub response: String,
}

pub struct CorpusService<'a> {
    store: &'a CorpusStore,
    policy: PolicyDocument,
}

impl<'a> CorpusService<'a> {
    pub fn new(store: &'a CorpusStore, policy: PolicyDocument) -> Self {
        Self { store, policy }
    }

    /// Append an interaction to a session.
    pub fn append_interaction(
        &self,
        user_id: &str,
        session_id: &str,
        prompt: &str,
        response: &str,
        model: &str,
        tokens: i64,
        metadata: JsonValue,
    ) -> Result<Interaction, EngineError> {
        if prompt.is_empty() {
            return Err(EngineError::Validation("prompt required".to_string()));
        }
        if model.is_empty() {
            return Err(EngineError::Validation("model required".to_string()));
        }
        if tokens < 0 {
            return Err(EngineError::Validation("tokens must be non-negative".to_string()));
        }
        SessionRepository::new(self.store).read(session_id)?;
        self.policy.check_write("append_interaction")?;
        CorpusRepository::new(self.store).append_interaction(
            user_id, session_id, prompt, response, model, tokens, metadata,
        )
    }

    /// Append a correction: a fresh interaction whose metadata references
    /// the record it supersedes. The prior record is untouched; reads fold
    /// it away.
    pub fn append_correction(
        &self,
        user_id: &str,
        prior_id: &str,
        prompt: &str,
        response: &str,
        model: &str,
        tokens: i64,
    ) -> Result<Interaction, EngineError> {
        let prior = CorpusRepository::new(self.store).read_interaction(prior_id)?;
        self.policy.check_write("append_interaction")?;
        let metadata = serde_json::json!({"correction_of": prior.interaction_id});
        CorpusRepository::new(self.store).append_interaction(
            user_id,
            &prior.session_id,
            prompt,
            response,
            model,
            tokens,
            metadata,
        )
    }

    /// Route a prompt through the model router and append the exchange.
    pub fn converse(
        &self,
        user_id: &str,
        session_id: &str,
        prompt: &str,
        model: &str,
    ) -> Result<Interaction, EngineError> {
        SessionRepository::new(self.store).read(session_id)?;
        self.policy.check_write("append_interaction")?;
        let routed = router::route(self.store, prompt, model, user_id)?;
        CorpusRepository::new(self.store).append_interaction(
            user_id,
            session_id,
            prompt,
            &routed.response,
            &routed.model,
            routed.tokens,
            JsonValue::Object(Default::default()),
        )
    }

    pub fn get_interaction(&self, interaction_id: &str) -> Result<Interaction, EngineError> {
        CorpusRepository::new(self.store).read_interaction(interaction_id)
    }

    pub fn list_session_interactions(
        &self,
        session_id: &str,
    ) -> Result<Vec<Interaction>, EngineError> {
        CorpusRepository::new(self.store).list_session_interactions(session_id)
    }

    /// Embed an interaction's exchange text and append the vector.
    pub fn embed_interaction(
        &self,
        user_id: &str,
        interaction_id: &str,
        model: &str,
    ) -> Result<EmbeddingRecord, EngineError> {
        let interaction = CorpusRepository::new(self.store).read_interaction(interaction_id)?;
        self.policy.check_write("append_embedding")?;
        let text = format!("{}\n{}", interaction.prompt, interaction.response);
        let vector = router::embed_text(self.store, &text, model, user_id)?;
        CorpusRepository::new(self.store).append_embedding(
            user_id,
            interaction_id,
            &vector,
            model,
        )
    }

    /// Semantic search: embed the query through the router and rank every
    /// stored vector with the cosine kernel.
    pub fn search(
        &self,
        user_id: &str,
        query: &str,
        model: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, EngineError> {
        if query.is_empty() {
            return Err(EngineError::Validation("query required".to_string()));
        }
        let k = k.max(1);
        let query_vec = router::embed_text(self.store, query, model, user_id)?;
        let dim = self.store.config().embedding_dim;
        let query_vec = embedding::normalize_vector(&query_vec, dim)?;

        let repo = CorpusRepository::new(self.store);
        let mut hits: Vec<SearchHit> = Vec::new();
        for record in repo.list_embeddings()? {
            let score = embedding::cosine_similarity(&query_vec, &record.vector);
            let interaction = repo.read_interaction(&record.interaction_id)?;
            hits.push(SearchHit {
                interaction_id: record.interaction_id,
                score,
                prompt: interaction.prompt,
                response: interaction.response,
            });
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "corpus",
        "version": "0.1.0",
        "description": "Append-only interactions, corrections, embeddings, semantic search",
        "operations": [
            { "name": "append_interaction", "parameters": ["session_id", "prompt", "response", "model", "tokens", "metadata"] },
            { "name": "append_correction", "parameters": ["prior_id", "prompt", "response", "model", "tokens"] },
            { "name": "converse", "parameters": ["session_id", "prompt", "model"] },
            { "name": "embed_interaction", "parameters": ["interaction_id", "model"] },
            { "name": "search", "parameters": ["query", "model", "k"] }
        ],
        "storage": ["interactions", "embeddings"]
    })
}
