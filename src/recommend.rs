// Recommendation core: one prompt template, one chat-completion call, then
// repair + parse + sanitize before anything leaves this module.

use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::repair::repair_json;
use crate::taxonomy::{Taxonomy, ALL_FIELDS, TARGET_RESULTS};

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("no prompt provided")]
    EmptyPrompt,

    // The upstream call never came back in time. Kept apart from the
    // generic transport error so operators can tell the two apart.
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream request failed: {0}")]
    Upstream(String),

    // The model answered, but not with JSON we can use even after repair.
    #[error("invalid JSON from model: {detail}")]
    InvalidJson { detail: String },
}

// One recommended paper, with the capitalized field names the model is told
// to emit. Year and RelevanceScore arrive as either strings or numbers
// depending on the model's mood, so both deserialize leniently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    #[serde(rename = "Title", default)]
    pub title: String,

    #[serde(rename = "Author", default, deserialize_with = "author_text")]
    pub author: String,

    #[serde(rename = "Year", default, deserialize_with = "stringly")]
    pub year: String,

    #[serde(rename = "Abstract", default)]
    pub abstract_text: String,

    #[serde(rename = "RelevanceScore", default, deserialize_with = "lenient_score")]
    pub relevance_score: i64,

    #[serde(rename = "PaperId", default, skip_serializing_if = "String::is_empty")]
    pub paper_id: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PapersPayload {
    #[serde(default)]
    pub papers: Vec<Paper>,
}

fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i64).unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f.round() as i64).unwrap_or(0),
        _ => 0,
    })
}

fn stringly<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn author_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::String(s) => s,
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    })
}

pub fn build_prompt(query: &str) -> String {
    format!(
        "Recommend the {count} best academic papers related to \"{query}\". \
         Rank them by relevance and provide a relevance score from 0 to 100 (higher means more relevant). \
         Format the response strictly as a valid JSON object:\n\
         {{\n\
         \x20 \"papers\": [\n\
         \x20   {{\n\
         \x20     \"Title\": \"Paper title here\",\n\
         \x20     \"Author\": \"Author names here\",\n\
         \x20     \"Year\": \"Publication year\",\n\
         \x20     \"Abstract\": \"Brief summary of the paper\",\n\
         \x20     \"RelevanceScore\": \"Relevance score from 0 to 100\"\n\
         \x20   }}\n\
         \x20 ]\n\
         }}\n\
         Ensure the JSON format is valid with proper commas and syntax. \
         Do NOT include any explanation or extra text, only return JSON.",
        count = TARGET_RESULTS,
        query = query
    )
}

// Repair, parse, sanitize, assign ids. Pure, so the whole path from raw
// model text to a payload is testable without a network.
pub fn payload_from_raw(raw: &str) -> Result<PapersPayload, RecommendError> {
    let repaired = repair_json(raw);
    let mut payload: PapersPayload = serde_json::from_str(&repaired)
        .map_err(|e| RecommendError::InvalidJson { detail: e.to_string() })?;
    sanitize(&mut payload.papers);
    assign_ids(&mut payload.papers);
    Ok(payload)
}

// Drop entries with no title, clamp scores into 0..=100. Anything left
// satisfies the response invariant.
fn sanitize(papers: &mut Vec<Paper>) {
    papers.retain(|p| !p.title.trim().is_empty());
    for p in papers.iter_mut() {
        p.relevance_score = p.relevance_score.clamp(0, 100);
    }
}

fn assign_ids(papers: &mut [Paper]) {
    for (i, p) in papers.iter_mut().enumerate() {
        if p.paper_id.is_empty() {
            p.paper_id = format!("paper_{}", i + 1);
        }
    }
}

pub struct Recommender {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl Recommender {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    pub async fn recommend(
        &self,
        prompt: &str,
        field: Option<&str>,
        taxonomy: &Taxonomy,
    ) -> Result<PapersPayload, RecommendError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(RecommendError::EmptyPrompt);
        }

        let raw = self.complete(&build_prompt(prompt)).await?;
        let mut payload = payload_from_raw(&raw)?;

        if let Some(f) = field {
            if f != ALL_FIELDS {
                payload.papers = taxonomy.filter(f, payload.papers);
            }
        }

        Ok(payload)
    }

    // The single blocking point of the whole request: one POST to the
    // chat-completions endpoint.
    async fn complete(&self, instruction: &str) -> Result<String, RecommendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": instruction }],
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RecommendError::Timeout
                } else {
                    RecommendError::Upstream(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RecommendError::Timeout
            } else {
                RecommendError::Upstream(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(RecommendError::Upstream(format!(
                "completion endpoint returned {}: {}",
                status, text
            )));
        }

        let envelope: Value = serde_json::from_str(&text)
            .map_err(|e| RecommendError::Upstream(format!("unreadable completion envelope: {}", e)))?;

        envelope["choices"][0]["message"]["content"]
            .as_str()
            .map(|c| c.trim().to_string())
            .ok_or_else(|| RecommendError::Upstream("completion reply had no message content".to_string()))
    }
}
