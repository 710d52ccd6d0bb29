use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use embedding::{CorpusCache, CorpusDocument, Embedder, RetrievedChunk};
use index::{RecordStore, RegulationRecord, ZoningMatch, ZoningQuery, resolve_zoning};
use llm::{LanguageModel, LlmError, Prompt};
use serde::{Deserialize, Serialize};

use super::address::{ParsedAddress, parse_address};
use crate::error::AgentError;
use crate::types::AgentAnswer;

const ANSWER_SYSTEM_PROMPT: &str = "\
You are a Korean building-code assistant answering questions about what may be built on a lot.
Answer in Korean using only the provided articles. Cite every article you rely on with the
reference shown in square brackets, for example [건축법 제11조]. If the articles do not settle
the question, say what is missing instead of guessing.";

/// Retrieval settings for regulation answers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulationConfig {
    /// Articles passed to the answer prompt.
    pub top_k: usize,
    pub min_similarity: f32,
    /// Documents per embedding request when the corpus is (re)built.
    pub corpus_batch_size: usize,
}

impl Default for RegulationConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.2,
            corpus_batch_size: 32,
        }
    }
}

impl RegulationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.top_k == 0 {
            return Err("regulation.top_k must be greater than 0".into());
        }
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(format!(
                "regulation.min_similarity must be within [-1, 1], got {}",
                self.min_similarity
            ));
        }
        if self.corpus_batch_size == 0 {
            return Err("regulation.corpus_batch_size must be greater than 0".into());
        }
        Ok(())
    }
}

/// A regulation answer together with what it was based on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegulationAnswer {
    pub answer: AgentAnswer,
    /// `None` when no zoning could be resolved for the question.
    pub zoning: Option<ZoningMatch>,
    /// Citations of the articles handed to the model, best first.
    pub citations: Vec<String>,
}

/// Answers zoning and building-regulation questions.
pub struct RegulationSearchAgent {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    cache: Arc<CorpusCache>,
    config: RegulationConfig,
}

impl RegulationSearchAgent {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        config: RegulationConfig,
    ) -> Self {
        let cache = Arc::new(CorpusCache::new(config.corpus_batch_size));
        Self {
            store,
            embedder,
            llm,
            cache,
            config,
        }
    }

    /// Share an existing corpus cache, e.g. one warmed at startup.
    pub fn with_cache(mut self, cache: Arc<CorpusCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<CorpusCache> {
        &self.cache
    }

    /// Embed the regulation corpus ahead of the first question.
    pub async fn warm_up(&self) -> Result<usize, AgentError> {
        let docs = self.corpus_documents()?;
        let snapshot = self
            .cache
            .ensure(self.embedder.as_ref(), &docs)
            .await
            .map_err(AgentError::retrieval)?;
        Ok(snapshot.len())
    }

    /// Like [`try_answer`](Self::try_answer) but never fails.
    pub async fn answer(&self, requester_id: &str, question: &str) -> RegulationAnswer {
        match self.try_answer(requester_id, question).await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(
                    requester_id,
                    kind = %err.kind(),
                    error = %err,
                    "regulation answer degraded"
                );
                RegulationAnswer {
                    answer: AgentAnswer::error(),
                    zoning: None,
                    citations: Vec::new(),
                }
            }
        }
    }

    pub async fn try_answer(
        &self,
        requester_id: &str,
        question: &str,
    ) -> Result<RegulationAnswer, AgentError> {
        let parsed = parse_address(question);
        let zoning = self.resolve(&parsed)?;
        tracing::debug!(
            requester_id,
            address = ?parsed.address.as_ref().map(|a| a.full()),
            tier = ?zoning.as_ref().map(|m| m.tier),
            keywords = ?parsed.keywords,
            "regulation question parsed"
        );

        let regulations = self.store.regulations().map_err(AgentError::retrieval)?;
        let allowed = candidate_ids(&regulations, zoning.as_ref(), &parsed.keywords);
        let chunks = self.rank(question, &regulations, &allowed).await?;
        let title = answer_title(zoning.as_ref());

        if chunks.is_empty() {
            return Ok(RegulationAnswer {
                answer: AgentAnswer::new(title, no_articles_answer(zoning.as_ref())),
                zoning,
                citations: Vec::new(),
            });
        }

        let by_id: Vec<&RegulationRecord> = chunks
            .iter()
            .filter_map(|chunk| regulations.iter().find(|r| r.id == chunk.source_id))
            .collect();
        let citations: Vec<String> = by_id.iter().map(|r| r.citation()).collect();

        let prompt = Prompt::text(
            ANSWER_SYSTEM_PROMPT,
            answer_context(question, zoning.as_ref(), &by_id),
        )
        .with_temperature(0.2);
        let body = self
            .llm
            .complete(&prompt)
            .await
            .map_err(AgentError::generation)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(AgentError::generation(LlmError::EmptyResponse));
        }

        let answer = format!("{body}\n\n근거 조문: {}", citations.join(" "));
        Ok(RegulationAnswer {
            answer: AgentAnswer::new(title, answer),
            zoning,
            citations,
        })
    }

    /// Parcel facts win over whatever the question spelled out.
    fn resolve(&self, parsed: &ParsedAddress) -> Result<Option<ZoningMatch>, AgentError> {
        let parcel = match &parsed.address {
            Some(address) => self
                .store
                .parcel(&address.full())
                .map_err(AgentError::retrieval)?,
            None => None,
        };

        let query = match parcel {
            Some(parcel) => ZoningQuery {
                region_code: Some(parcel.region_code),
                region_name: Some(parcel.region_name),
                zone_name: Some(parcel.zone_name),
            },
            None => ZoningQuery {
                region_code: parsed.region_code.clone(),
                region_name: parsed
                    .address
                    .as_ref()
                    .and_then(|a| a.region_name())
                    .map(str::to_string),
                zone_name: parsed.zone_name.clone(),
            },
        };
        if query == ZoningQuery::default() {
            return Ok(None);
        }

        let entries = self.store.zoning_entries().map_err(AgentError::retrieval)?;
        Ok(resolve_zoning(&entries, &query))
    }

    fn corpus_documents(&self) -> Result<Vec<CorpusDocument>, AgentError> {
        let regulations = self.store.regulations().map_err(AgentError::retrieval)?;
        Ok(documents(&regulations))
    }

    async fn rank(
        &self,
        question: &str,
        regulations: &[RegulationRecord],
        allowed: &HashSet<&str>,
    ) -> Result<Vec<RetrievedChunk>, AgentError> {
        if allowed.is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self
            .cache
            .ensure(self.embedder.as_ref(), &documents(regulations))
            .await
            .map_err(AgentError::retrieval)?;
        let query = self
            .embedder
            .embed(question)
            .await
            .map_err(AgentError::retrieval)?;
        if snapshot.dimension() != query.len() {
            tracing::warn!(
                corpus_model = snapshot.model_name(),
                corpus_dimension = snapshot.dimension(),
                query_dimension = query.len(),
                "question and corpus embeddings differ in dimension"
            );
        }
        Ok(snapshot.rank(
            &query,
            self.config.top_k,
            self.config.min_similarity,
            |doc| allowed.contains(doc.id.as_str()),
        ))
    }
}

fn documents(regulations: &[RegulationRecord]) -> Vec<CorpusDocument> {
    regulations
        .iter()
        .map(|r| CorpusDocument::new(r.id.clone(), format!("{} {}", r.citation(), r.content)))
        .collect()
}

/// Regulations eligible for ranking.
///
/// With a resolved zoning only applicable articles qualify. Without one,
/// articles mentioning any keyword qualify, or every article when none does.
fn candidate_ids<'r>(
    regulations: &'r [RegulationRecord],
    zoning: Option<&ZoningMatch>,
    keywords: &[String],
) -> HashSet<&'r str> {
    if let Some(zoning) = zoning {
        return regulations
            .iter()
            .filter(|r| r.applies_to(&zoning.entry))
            .map(|r| r.id.as_str())
            .collect();
    }
    let mentioning: HashSet<&str> = regulations
        .iter()
        .filter(|r| {
            keywords
                .iter()
                .any(|k| r.content.contains(k.as_str()) || r.title.contains(k.as_str()))
        })
        .map(|r| r.id.as_str())
        .collect();
    if mentioning.is_empty() {
        regulations.iter().map(|r| r.id.as_str()).collect()
    } else {
        mentioning
    }
}

fn answer_title(zoning: Option<&ZoningMatch>) -> String {
    match zoning {
        Some(m) => format!("{} {} 건축 규제 안내", m.entry.region_name, m.entry.zone_name),
        None => "건축 규제 안내".to_string(),
    }
}

fn answer_context(
    question: &str,
    zoning: Option<&ZoningMatch>,
    articles: &[&RegulationRecord],
) -> String {
    let mut context = format!("Question: {}\n", question.trim());
    match zoning {
        Some(m) => {
            let _ = writeln!(
                context,
                "Zoning: {} ({}) {}",
                m.entry.region_name, m.entry.region_code, m.entry.zone_name
            );
        }
        None => context.push_str("Zoning: unknown\n"),
    }
    context.push_str("\nArticles:\n");
    for article in articles {
        let _ = writeln!(context, "{}\n{}\n", article.citation(), article.content.trim());
    }
    context
}

fn no_articles_answer(zoning: Option<&ZoningMatch>) -> String {
    match zoning {
        Some(m) => format!(
            "{} {}에 대해 질문과 관련된 규제 조문을 찾지 못했습니다. 용도나 조건을 조금 더 구체적으로 알려주세요.",
            m.entry.region_name, m.entry.zone_name
        ),
        None => "질문과 관련된 규제 조문을 찾지 못했습니다. 주소나 용도지역을 함께 알려주시면 더 정확히 안내할 수 있습니다.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding::StubEmbedder;
    use index::{InMemoryStore, ParcelRecord, StoreSnapshot, ZoningEntry, ZoningTier};
    use llm::ScriptedModel;

    use crate::error::ErrorKind;

    fn regulation(id: &str, region: Option<&str>, zone: Option<&str>, content: &str) -> RegulationRecord {
        RegulationRecord {
            id: id.into(),
            region_code: region.map(str::to_string),
            zone_name: zone.map(str::to_string),
            title: format!("규정 {id}"),
            article: Some("제1조".into()),
            content: content.into(),
        }
    }

    fn snapshot() -> StoreSnapshot {
        StoreSnapshot {
            regulations: vec![
                regulation("r1", Some("11680"), Some("제2종일반주거지역"), "제2종일반주거지역에서 미용실 등 제1종 근린생활시설을 지을 수 있다"),
                regulation("r2", Some("26350"), Some("일반상업지역"), "일반상업지역에서 숙박시설을 지을 때 적용한다"),
                regulation("r3", None, None, "주차장 설치 기준은 시설 면적에 따른다"),
            ],
            zoning: vec![
                ZoningEntry {
                    region_code: "11680".into(),
                    region_name: "서울특별시 강남구".into(),
                    zone_name: "제2종일반주거지역".into(),
                    zone_code: None,
                },
                ZoningEntry {
                    region_code: "26350".into(),
                    region_name: "부산광역시 해운대구".into(),
                    zone_name: "일반상업지역".into(),
                    zone_code: None,
                },
            ],
            parcels: vec![ParcelRecord {
                address: "서울특별시 강남구 역삼동 123-45".into(),
                region_code: "11680".into(),
                region_name: "서울특별시 강남구".into(),
                zone_name: "제2종일반주거지역".into(),
            }],
            ..Default::default()
        }
    }

    fn agent(model: ScriptedModel, min_similarity: f32) -> (RegulationSearchAgent, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        let agent = RegulationSearchAgent::new(
            Arc::new(InMemoryStore::new(snapshot())),
            Arc::new(StubEmbedder::new(128)),
            model.clone(),
            RegulationConfig {
                min_similarity,
                ..Default::default()
            },
        );
        (agent, model)
    }

    #[tokio::test]
    async fn parcel_lookup_resolves_zoning_and_cites_articles() {
        let (agent, model) = agent(ScriptedModel::new().otherwise("미용실은 지을 수 있습니다 [규정 r1 제1조]"), -1.0);
        let result = agent
            .try_answer("user-1", "강남구 역삼동 123-45에 미용실 지을 수 있어?")
            .await
            .unwrap();

        let zoning = result.zoning.clone().unwrap();
        assert_eq!(zoning.tier, ZoningTier::CodeAndZone);
        assert_eq!(zoning.entry.region_code, "11680");
        assert_eq!(result.answer.title, "서울특별시 강남구 제2종일반주거지역 건축 규제 안내");
        assert_eq!(result.answer.floorplan_ids, None);
        assert!(result.citations.contains(&"[규정 r1 제1조]".to_string()));
        assert!(!result.citations.contains(&"[규정 r2 제1조]".to_string()));
        assert!(result.answer.answer.contains("근거 조문:"));

        let prompt = &model.prompts()[0];
        assert!(prompt.user.contains("Zoning: 서울특별시 강남구 (11680) 제2종일반주거지역"));
    }

    #[tokio::test]
    async fn zone_named_in_question_without_parcel() {
        let (agent, _) = agent(ScriptedModel::new().otherwise("숙박시설 기준 안내"), -1.0);
        let result = agent
            .try_answer("user-1", "해운대구 일반상업지역 호텔 가능?")
            .await
            .unwrap();
        let zoning = result.zoning.unwrap();
        assert_eq!(zoning.tier, ZoningTier::RegionNameAndZone);
        assert_eq!(zoning.entry.region_code, "26350");
        assert!(result.citations.contains(&"[규정 r2 제1조]".to_string()));
    }

    #[tokio::test]
    async fn keyword_retrieval_without_location() {
        let (agent, _) = agent(ScriptedModel::new().otherwise("주차장 기준 안내"), -1.0);
        let result = agent.try_answer("user-1", "주차장 설치 기준이 궁금해").await.unwrap();
        assert!(result.zoning.is_none());
        assert_eq!(result.answer.title, "건축 규제 안내");
        assert_eq!(result.citations, vec!["[규정 r3 제1조]".to_string()]);
    }

    #[tokio::test]
    async fn bare_lot_number_does_not_pick_a_parcel() {
        let (agent, _) = agent(ScriptedModel::new().otherwise("미용실 기준 안내"), -1.0);
        let result = agent
            .try_answer("user-1", "123-45번지에 미용실 지을 수 있어?")
            .await
            .unwrap();
        assert!(result.zoning.is_none());
        assert_eq!(result.answer.title, "건축 규제 안내");
        assert_eq!(result.citations, vec!["[규정 r1 제1조]".to_string()]);
    }

    #[tokio::test]
    async fn use_words_stay_keywords() {
        let (agent, _) = agent(ScriptedModel::new().otherwise("숙박시설 안내"), -1.0);
        let result = agent
            .try_answer("user-1", "숙박시설로 용도변경 가능해?")
            .await
            .unwrap();
        assert!(result.zoning.is_none());
        assert_eq!(result.citations, vec!["[규정 r2 제1조]".to_string()]);
    }

    #[tokio::test]
    async fn no_articles_means_no_model_call() {
        let (agent, model) = agent(ScriptedModel::new().otherwise("unused"), 1.0);
        let result = agent.try_answer("user-1", "주차장 설치 기준이 궁금해").await.unwrap();
        assert!(result.citations.is_empty());
        assert!(result.answer.answer.contains("찾지 못했습니다"));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn model_failure_degrades_with_generation_kind() {
        let (agent, _) = agent(
            ScriptedModel::new().otherwise_err(LlmError::Transport("down".into())),
            -1.0,
        );
        let err = agent
            .try_answer("user-1", "주차장 설치 기준이 궁금해")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generation);

        let degraded = agent.answer("user-1", "주차장 설치 기준이 궁금해").await;
        assert!(degraded.answer.is_error());
        assert!(degraded.zoning.is_none());
    }

    #[tokio::test]
    async fn warm_up_embeds_corpus_once() {
        let (agent, _) = agent(ScriptedModel::new(), 0.2);
        assert_eq!(agent.warm_up().await.unwrap(), 3);
        let first = agent.cache().snapshot();
        agent.warm_up().await.unwrap();
        assert!(Arc::ptr_eq(&first, &agent.cache().snapshot()));
    }
}
