use std::fmt::Write as _;
use std::sync::Arc;

use index::FloorplanFilter;
use llm::{LanguageModel, LlmError, Prompt};
use matcher::{FloorplanHit, HybridRetriever, ParsedQuery, RetrievalOutcome, parse_query};
use vision::CvAnalysisResult;

use super::{FloorplanQuery, describe_filter, metric_lines};
use crate::error::AgentError;
use crate::types::AgentAnswer;

const SEARCH_TITLE: &str = "평면도 검색 결과";
const IMAGE_TITLE: &str = "평면도 분석 결과";

const NARRATION_SYSTEM_PROMPT: &str = "\
You write the layout section of an apartment floor-plan recommendation for Korean home buyers.
For each plan given, describe in Korean how the spaces are arranged and what living there is like,
using only the facts in its description. One short paragraph per plan, headed by the plan name.
Do not invent dimensions or features.";

/// Longest description passed to the narrator per plan.
const MAX_DOCUMENT_CHARS: usize = 1_200;

/// A text search and the structured filters it ran with.
#[derive(Debug)]
pub struct TextSearch {
    /// Known before retrieval starts, so it survives a failed answer.
    pub filters: Option<FloorplanFilter>,
    pub answer: Result<AgentAnswer, AgentError>,
}

/// Answers floor-plan questions from saved records or from a fresh analysis.
pub struct FloorplanSearchAgent {
    retriever: HybridRetriever,
    llm: Arc<dyn LanguageModel>,
}

impl FloorplanSearchAgent {
    pub fn new(retriever: HybridRetriever, llm: Arc<dyn LanguageModel>) -> Self {
        Self { retriever, llm }
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// Like [`try_search`](Self::try_search) but never fails; failures are
    /// logged and replaced by [`AgentAnswer::error`].
    pub async fn search(&self, query: FloorplanQuery) -> AgentAnswer {
        match self.try_search(query).await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(kind = %err.kind(), error = %err, "floor-plan search degraded");
                AgentAnswer::error()
            }
        }
    }

    pub async fn try_search(&self, query: FloorplanQuery) -> Result<AgentAnswer, AgentError> {
        match query {
            FloorplanQuery::TextSearch {
                query,
                requester_id,
            } => self.search_text(&query, &requester_id).await.answer,
            FloorplanQuery::Image(result) => Ok(describe_analysis(&result)),
        }
    }

    /// Parse `query` once and retrieve with exactly those filters.
    pub async fn search_text(&self, query: &str, requester_id: &str) -> TextSearch {
        let parsed = parse_query(query);
        let filters = parsed.hints.clone();
        let answer = self.answer_text(query, parsed, requester_id).await;
        TextSearch { filters, answer }
    }

    async fn answer_text(
        &self,
        query: &str,
        parsed: ParsedQuery,
        requester_id: &str,
    ) -> Result<AgentAnswer, AgentError> {
        let outcome = self
            .retriever
            .retrieve(parsed)
            .await
            .map_err(AgentError::retrieval)?;
        tracing::debug!(
            requester_id,
            candidates = outcome.candidates,
            hits = outcome.hits.len(),
            "floor plans retrieved"
        );

        if outcome.hits.is_empty() {
            return Ok(AgentAnswer::new(SEARCH_TITLE, no_results_answer(&outcome))
                .with_floorplan_ids(Vec::new()));
        }

        let narration = self.narrate(query, &outcome.hits).await?;
        let answer = [
            format!("■ 선정 이유\n{}", selection_reason(&outcome)),
            format!("■ 평면 지표\n{}", hit_metrics(&outcome.hits)),
            format!("■ 공간 구성\n{narration}"),
        ]
        .join("\n\n");
        Ok(AgentAnswer::new(SEARCH_TITLE, answer).with_floorplan_ids(outcome.record_ids()))
    }

    async fn narrate(&self, query: &str, hits: &[FloorplanHit]) -> Result<String, AgentError> {
        let mut user = format!("Question: {}\n", query.trim());
        for hit in hits {
            let document = embedding::truncate_chars(&hit.record.document, MAX_DOCUMENT_CHARS);
            let _ = write!(user, "\n[{}]\n{}\n", hit.record.name, document);
        }
        let prompt = Prompt::text(NARRATION_SYSTEM_PROMPT, user);
        let narration = self
            .llm
            .complete(&prompt)
            .await
            .map_err(AgentError::generation)?;
        let narration = narration.trim();
        if narration.is_empty() {
            return Err(AgentError::generation(LlmError::EmptyResponse));
        }
        Ok(narration.to_string())
    }
}

fn selection_reason(outcome: &RetrievalOutcome) -> String {
    let filters = outcome
        .parsed
        .hints
        .as_ref()
        .map(describe_filter)
        .unwrap_or_default();
    let mut reason = String::new();
    if !filters.is_empty() {
        let _ = writeln!(reason, "조건: {}", filters.join(", "));
    }
    if outcome.parsed.has_semantic_content() {
        let _ = writeln!(reason, "\"{}\"와(과) 설명이 유사한 평면을 골랐습니다.", outcome.parsed.residual);
    } else {
        let _ = writeln!(reason, "조건을 가장 정확히 만족하는 최신 평면 순서입니다.");
    }
    for (rank, hit) in outcome.hits.iter().enumerate() {
        let _ = write!(reason, "{}. {} (#{})", rank + 1, hit.record.name, hit.record_id());
        if outcome.parsed.has_semantic_content() {
            let _ = write!(reason, " 유사도 {:.2}", hit.similarity);
        }
        reason.push('\n');
    }
    reason.trim_end().to_string()
}

fn hit_metrics(hits: &[FloorplanHit]) -> String {
    hits.iter()
        .map(|hit| {
            let mut block = format!("[{}]", hit.record.name);
            if let Some(structure) = &hit.record.structure_type {
                let _ = write!(block, " {structure}");
            }
            let lines = metric_lines(&hit.record.metrics);
            if lines.is_empty() {
                block.push_str("\n- 저장된 지표가 없습니다.");
            } else {
                for line in lines {
                    block.push('\n');
                    block.push_str(&line);
                }
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn no_results_answer(outcome: &RetrievalOutcome) -> String {
    let filters = outcome
        .parsed
        .hints
        .as_ref()
        .map(describe_filter)
        .unwrap_or_default();
    let mut answer = String::from("■ 선정 이유\n조건에 맞는 평면도를 찾지 못했습니다.");
    if !filters.is_empty() {
        let _ = write!(answer, "\n적용된 조건: {}", filters.join(", "));
        answer.push_str("\n조건을 조금 완화해서 다시 검색해 보세요.");
    }
    answer
}

fn describe_analysis(result: &CvAnalysisResult) -> AgentAnswer {
    let analysis = &result.structured_analysis;
    let mut overview = String::from("업로드한 평면도를 분석했습니다.");
    if let Some(structure) = &analysis.structure_type {
        let _ = write!(overview, " 구조: {structure}.");
    }
    if !analysis.summary.trim().is_empty() {
        let _ = write!(overview, "\n{}", analysis.summary.trim());
    }

    let metrics = if result.metrics.is_empty() {
        analysis.to_metrics()
    } else {
        result.metrics.clone()
    };
    let lines = metric_lines(&metrics);
    let metrics_section = if lines.is_empty() {
        "- 확인된 지표가 없습니다.".to_string()
    } else {
        lines.join("\n")
    };

    let layout = if result.document.trim().is_empty() {
        analysis.summary.trim()
    } else {
        result.document.trim()
    };

    let answer = [
        format!("■ 분석 개요\n{overview}"),
        format!("■ 평면 지표\n{metrics_section}"),
        format!("■ 공간 구성\n{layout}"),
    ]
    .join("\n\n");
    AgentAnswer::new(IMAGE_TITLE, answer)
}
