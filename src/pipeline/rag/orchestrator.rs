//! Per-case pipeline wiring: ingest fills the index, `answer` reads it.
//!
//! Ingest always replaces a case's whole chunk set. Query time never writes
//! patient data; it derives the case context, retrieves, optionally merges
//! literature, generates, and redacts the result before returning it.

use std::sync::Arc;

use serde_json::Value;

use super::context::CaseContext;
use super::generator::Generator;
use super::ollama::OllamaClient;
use super::retrieval::Retriever;
use super::summary::summarize_with_backend;
use super::types::{CompletionBackend, GenerationOptions};
use super::RagError;
use crate::config::PipelineConfig;
use crate::models::{Answer, Chunk, IntakeStep, PatientData};
use crate::pipeline::literature::ExternalSearch;
use crate::pipeline::redaction::Redactor;
use crate::pipeline::storage::{
    ChunkStore, DocumentProcessor, InMemoryChunkIndex, StorageError, TermFrequencyEncoder,
};

pub struct RagOrchestrator {
    store: Arc<dyn ChunkStore>,
    processor: DocumentProcessor,
    retriever: Retriever,
    literature: Option<ExternalSearch>,
    generator: Generator,
    backend: Arc<dyn CompletionBackend>,
    options: GenerationOptions,
    redactor: Arc<Redactor>,
    retrieval_limit: usize,
}

impl RagOrchestrator {
    /// In-memory index, term-frequency encoder, and the given backend. No
    /// literature sources until [`with_literature`](Self::with_literature).
    pub fn new(
        store: Arc<dyn ChunkStore>,
        backend: Arc<dyn CompletionBackend>,
        options: GenerationOptions,
        redactor: Arc<Redactor>,
    ) -> Self {
        let processor = DocumentProcessor::default();
        let retriever = Retriever::new(store.clone(), processor.encoder());
        Self {
            store,
            processor,
            retriever,
            literature: None,
            generator: Generator::new(backend.clone(), options),
            backend,
            options,
            redactor,
            retrieval_limit: super::retrieval::DEFAULT_RETRIEVAL_LIMIT,
        }
    }

    /// Full production wiring from configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, RagError> {
        let backend = Arc::new(OllamaClient::new(&config.completion)?);
        let literature = ExternalSearch::from_config(&config.literature)?;
        let store: Arc<dyn ChunkStore> = Arc::new(InMemoryChunkIndex::new());
        let redactor = Arc::new(Redactor::new(config.redaction_cache_capacity));

        tracing::info!(
            model = %backend.model(),
            sources = literature.source_names().len(),
            retrieval_limit = config.retrieval_limit,
            "RAG orchestrator configured"
        );

        Ok(Self::new(store, backend, GenerationOptions::from(&config.completion), redactor)
            .with_literature(literature)
            .with_retrieval_limit(config.retrieval_limit))
    }

    pub fn with_literature(mut self, literature: ExternalSearch) -> Self {
        self.literature = Some(literature);
        self
    }

    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit.max(1);
        self
    }

    pub fn with_processor(mut self, processor: DocumentProcessor) -> Self {
        self.retriever = Retriever::new(self.store.clone(), processor.encoder());
        self.processor = processor;
        self
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Replace every chunk of `case_id` with chunks built from `patient_data`.
    pub fn ingest(&self, case_id: &str, patient_data: &Value) -> Result<usize, StorageError> {
        self.ingest_record(case_id, &PatientData::from_json(patient_data))
    }

    pub fn ingest_record(&self, case_id: &str, data: &PatientData) -> Result<usize, StorageError> {
        let chunks = self.processor.process(case_id, data);
        let stored = self.store.replace_all(case_id, chunks)?;
        tracing::info!(case_id = %case_id, chunks = stored, "Case ingested");
        Ok(stored)
    }

    /// Answer a clinician question about one case. Never fails; transport
    /// and grounding problems come back as the answer's status.
    pub async fn answer(&self, query: &str, case_id: &str, include_external: bool) -> Answer {
        // Step 1: Case context from the current chunk set
        let all = self.store.get(case_id);
        let context = CaseContext::from_chunks(&all);

        // Step 2: Hybrid retrieval
        let mut candidates = self.retriever.retrieve(query, case_id, self.retrieval_limit);

        // Step 3: Optional literature, appended after patient chunks
        if include_external {
            match &self.literature {
                Some(literature) => {
                    let snippets = literature.search(query, &context).await;
                    let base = candidates.len();
                    candidates.extend(
                        snippets
                            .iter()
                            .enumerate()
                            .map(|(i, s)| Chunk::from_snippet(case_id, s, base + i)),
                    );
                }
                None => tracing::debug!("External literature requested but no sources configured"),
            }
        }

        // Step 4: Generate
        let mut answer = self.generator.generate(query, &candidates, &context).await;

        // Step 5: Redact everything leaving the pipeline
        answer.text = self.redactor.redact(&answer.text);
        for source in &mut answer.cited_sources {
            source.excerpt = self.redactor.redact(&source.excerpt);
        }

        tracing::info!(
            case_id = %case_id,
            candidates = candidates.len(),
            status = answer.status.as_str(),
            "Answer returned"
        );
        answer
    }

    /// Drop a case's chunks at the end of its session.
    pub fn close_case(&self, case_id: &str) -> usize {
        let removed = self.store.remove(case_id);
        tracing::info!(case_id = %case_id, removed, "Case closed");
        removed
    }

    pub fn case_ids(&self) -> Vec<String> {
        self.store.case_ids()
    }

    /// Structured intake summary as redacted JSON.
    pub async fn summarize_intake(&self, steps: &[IntakeStep]) -> Value {
        let summary = summarize_with_backend(self.backend.as_ref(), steps, &self.options).await;
        match serde_json::to_value(&summary) {
            Ok(value) => self.redactor.redact_structured(&value),
            Err(e) => {
                tracing::warn!(error = %e, "Intake summary serialization failed");
                Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerStatus, ExternalSnippet, IntakeStepKind, SourceKind};
    use crate::pipeline::literature::{LiteratureError, LiteratureSource};
    use crate::pipeline::rag::citation::citations_resolve;
    use crate::pipeline::rag::MockCompletion;
    use async_trait::async_trait;
    use serde_json::json;

    fn orchestrator(mock: &Arc<MockCompletion>) -> RagOrchestrator {
        RagOrchestrator::new(
            Arc::new(InMemoryChunkIndex::new()),
            mock.clone(),
            GenerationOptions::default(),
            Arc::new(Redactor::new(100)),
        )
    }

    #[tokio::test]
    async fn reingest_replaces_every_chunk() {
        let mock = Arc::new(MockCompletion::new("ok"));
        let orch = orchestrator(&mock);

        orch.ingest(
            "case-1",
            &json!({ "allergies": ["penicillin"], "familyHistory": ["father: stroke"] }),
        )
        .unwrap();
        let v1_ids: Vec<_> = orch.store().get("case-1").iter().map(|c| c.id).collect();

        orch.ingest("case-1", &json!({ "allergies": ["latex"] })).unwrap();

        let chunks = orch.retriever.retrieve("allergies family history stroke", "case-1", 50);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| !v1_ids.contains(&c.id)));
        assert!(chunks.iter().all(|c| !c.text.contains("penicillin")));
        assert!(chunks.iter().all(|c| !c.text.contains("stroke")));
    }

    #[tokio::test]
    async fn citations_in_answer_resolve() {
        let mock = Arc::new(MockCompletion::new("Allergic to latex [1][7]. Takes metformin [2]."));
        let orch = orchestrator(&mock);
        orch.ingest(
            "case-1",
            &json!({ "allergies": ["latex"], "medications": ["metformin 500mg"] }),
        )
        .unwrap();

        let answer = orch.answer("Allergies and medications?", "case-1", false).await;

        assert!(!answer.cited_sources.is_empty());
        assert!(citations_resolve(&answer.text, &answer.cited_sources));
        assert!(!answer.text.contains("[7]"));
    }

    #[tokio::test]
    async fn undocumented_finding_skips_backend() {
        let mock = Arc::new(MockCompletion::new("Chest pain noted [1]."));
        let orch = orchestrator(&mock);
        orch.ingest("case-1", &json!({ "symptoms": ["headache"] })).unwrap();

        let answer = orch.answer("Any chest pain?", "case-1", false).await;

        assert_eq!(mock.calls(), 0);
        assert_eq!(answer.status, AnswerStatus::NotInRecords);
        assert!(answer.confidence <= 0.2);
    }

    #[tokio::test]
    async fn finding_in_late_transcript_window_is_documented() {
        let mock = Arc::new(MockCompletion::new("Fainting was mentioned in the visit."));
        let orch = orchestrator(&mock).with_retrieval_limit(1);
        let transcript: Vec<String> = (1..=36)
            .map(|i| match i {
                35 => "PATIENT: I had a fainting episode last week".to_string(),
                _ => format!("DOCTOR: question {i}"),
            })
            .collect();
        orch.ingest(
            "case-1",
            &json!({ "allergies": ["latex"], "symptoms": ["headache"], "transcript": transcript }),
        )
        .unwrap();

        let retrieved = orch.retriever.retrieve("Any allergies or fainting?", "case-1", 1);
        assert!(retrieved.iter().all(|c| !c.text.contains("fainting")));

        let answer = orch.answer("Any allergies or fainting?", "case-1", false).await;

        assert_eq!(mock.calls(), 1);
        assert_ne!(answer.status, AnswerStatus::NotInRecords);
    }

    #[tokio::test]
    async fn answer_text_is_redacted() {
        let mock = Arc::new(MockCompletion::new(
            "Seen by John Smith, reachable at 555-123-4567; allergic to latex [1].",
        ));
        let orch = orchestrator(&mock);
        orch.ingest("case-1", &json!({ "allergies": ["latex"] })).unwrap();

        let answer = orch.answer("Any allergies?", "case-1", false).await;

        assert!(!answer.text.contains("John Smith"));
        assert!(!answer.text.contains("555-123-4567"));
        assert!(answer.text.contains("[REDACTED_NAME]"));
        assert!(answer.text.contains("[REDACTED_PHONE]"));
        assert!(answer.text.contains("[1]"));
    }

    #[tokio::test]
    async fn unknown_case_answers_with_disclaimer() {
        let mock = Arc::new(MockCompletion::new("Penicillin allergy is common."));
        let orch = orchestrator(&mock);

        let answer = orch.answer("Any allergies?", "missing", false).await;

        assert_eq!(answer.status, AnswerStatus::NoContext);
        assert!(answer.text.starts_with("Disclaimer:"));
        assert!(answer.cited_sources.is_empty());
    }

    struct OneSnippet;

    #[async_trait]
    impl LiteratureSource for OneSnippet {
        fn name(&self) -> &str {
            "Fixed"
        }

        async fn search(
            &self,
            _query: &str,
            _max: usize,
        ) -> Result<Vec<ExternalSnippet>, LiteratureError> {
            Ok(vec![ExternalSnippet {
                title: "Latex allergy management".into(),
                abstract_text: "Avoidance is the first-line treatment.".into(),
                url: "https://pubmed.ncbi.nlm.nih.gov/7/".into(),
                source_name: "Fixed".into(),
                confidence: 0.9,
                published_date: Some("2022".into()),
            }])
        }
    }

    #[tokio::test]
    async fn literature_is_merged_when_requested() {
        let mock = Arc::new(MockCompletion::new(
            "Allergic to latex [1].\nGeneral literature: avoidance is first-line [S1].",
        ));
        let orch = orchestrator(&mock)
            .with_literature(ExternalSearch::new(5, 600).with_source(Arc::new(OneSnippet), 10));
        orch.ingest("case-1", &json!({ "allergies": ["latex"] })).unwrap();

        let without = orch.answer("Latex allergy treatment?", "case-1", false).await;
        assert_eq!(without.cited_sources.len(), 1);

        let with = orch.answer("Latex allergy treatment?", "case-1", true).await;
        assert_eq!(with.cited_sources.len(), 2);
        assert_eq!(with.cited_sources[1].source_kind, SourceKind::External);
        assert_eq!(
            with.cited_sources[1].url.as_deref(),
            Some("https://pubmed.ncbi.nlm.nih.gov/7/")
        );
        assert!(citations_resolve(&with.text, &with.cited_sources));
    }

    #[tokio::test]
    async fn intake_summary_is_redacted() {
        let mock = Arc::new(MockCompletion::failing());
        let orch = orchestrator(&mock);
        let steps = vec![
            IntakeStep {
                step: IntakeStepKind::Identification,
                text: "John Smith, 555-123-4567".into(),
                confirmed: true,
                language: None,
            },
            IntakeStep {
                step: IntakeStepKind::Reason,
                text: "persistent cough".into(),
                confirmed: true,
                language: None,
            },
        ];

        let summary = orch.summarize_intake(&steps).await;

        assert_eq!(summary["patient_info"], "[REDACTED_NAME], [REDACTED_PHONE]");
        assert_eq!(summary["main_complaint"], "persistent cough");
    }

    #[tokio::test]
    async fn close_case_drops_chunks() {
        let mock = Arc::new(MockCompletion::new("ok"));
        let orch = orchestrator(&mock);
        orch.ingest("case-1", &json!({ "allergies": ["latex"] })).unwrap();
        orch.ingest("case-2", &json!({ "allergies": ["nuts"] })).unwrap();

        assert!(orch.close_case("case-1") > 0);
        assert!(orch.store().get("case-1").is_empty());
        assert_eq!(orch.case_ids(), vec!["case-2".to_string()]);
    }

    #[test]
    fn empty_case_id_is_rejected() {
        let mock = Arc::new(MockCompletion::new("ok"));
        let err = orchestrator(&mock)
            .ingest(" ", &json!({ "allergies": ["latex"] }))
            .unwrap_err();
        assert_eq!(err, StorageError::EmptyCaseId);
    }
}
