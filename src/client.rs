// Query Submitter: the client half of the system. All UI state lives in an
// explicit state machine (idle -> searching -> success | error) driven by
// two events: a submission and its outcome. Responses carry the sequence
// number of the search that issued them, and a response whose number is no
// longer current is dropped, so a slow early search can never overwrite a
// later one.

use serde_json::json;
use std::time::Duration;

use crate::recommend::{Paper, PapersPayload};
use crate::taxonomy::{Taxonomy, ALL_FIELDS};

pub const EMPTY_QUERY_MESSAGE: &str = "You didn't type anything. Please enter a keyword.";
pub const NO_PAPERS_MESSAGE: &str = "No valid papers found. Try again.";
pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check the server and try again.";

const HISTORY_CAP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Searching,
    Success,
    Error,
}

// A paper as the table renders it: lowercase names, relevance as "<n>/100".
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayPaper {
    pub title: String,
    pub author: String,
    pub year: String,
    pub abstract_text: String,
    pub relevance: String,
    pub paper_id: String,
}

impl From<&Paper> for DisplayPaper {
    fn from(p: &Paper) -> Self {
        Self {
            title: p.title.clone(),
            author: p.author.clone(),
            year: p.year.clone(),
            abstract_text: p.abstract_text.clone(),
            relevance: format!("{}/100", p.relevance_score),
            paper_id: p.paper_id.clone(),
        }
    }
}

#[derive(Debug)]
pub enum SearchOutcome {
    // A 2xx reply, already decoded. A malformed body decodes to an empty
    // payload upstream of this type.
    Response(PapersPayload),
    // Non-2xx reply; the message is the server's error text or a generic
    // fallback when the body had none.
    ServerError(String),
    // The request itself never completed.
    NetworkError(String),
}

pub struct Submitter {
    phase: Phase,
    message: Option<String>,
    results: Vec<DisplayPaper>,
    // The last full, unfiltered result set; field-only changes re-filter
    // this locally without touching the network.
    last_full: Vec<Paper>,
    history: Vec<String>,
    field: Option<String>,
    seq: u64,
}

impl Submitter {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            message: None,
            results: Vec::new(),
            last_full: Vec::new(),
            history: Vec::new(),
            field: None,
            seq: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn results(&self) -> &[DisplayPaper] {
        &self.results
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    // Start a search. Empty input is rejected locally and changes nothing
    // else; otherwise prior results and errors are cleared and the returned
    // ticket must accompany the eventual outcome.
    pub fn begin(&mut self, text: &str) -> Result<u64, &'static str> {
        let query = text.trim();
        if query.is_empty() {
            return Err(EMPTY_QUERY_MESSAGE);
        }

        self.message = None;
        self.results.clear();
        self.last_full.clear();
        self.phase = Phase::Searching;
        self.remember(query);
        self.seq += 1;
        Ok(self.seq)
    }

    fn remember(&mut self, query: &str) {
        self.history.retain(|h| h != query);
        self.history.push(query.to_string());
        if self.history.len() > HISTORY_CAP {
            self.history.remove(0);
        }
    }

    pub fn finish(&mut self, ticket: u64, outcome: SearchOutcome, taxonomy: &Taxonomy) {
        if ticket != self.seq {
            // Superseded by a newer search; drop the stale outcome.
            return;
        }

        match outcome {
            SearchOutcome::Response(payload) if payload.papers.is_empty() => {
                self.phase = Phase::Error;
                self.message = Some(NO_PAPERS_MESSAGE.to_string());
                self.results.clear();
            }
            SearchOutcome::Response(payload) => {
                self.last_full = payload.papers;
                self.phase = Phase::Success;
                self.apply_filter(taxonomy);
            }
            SearchOutcome::ServerError(msg) => {
                self.phase = Phase::Error;
                self.message = Some(msg);
            }
            SearchOutcome::NetworkError(_) => {
                self.phase = Phase::Error;
                self.message = Some(NETWORK_ERROR_MESSAGE.to_string());
            }
        }
    }

    // A field-only change: re-filter the retained full set locally. No
    // network request is issued.
    pub fn set_field(&mut self, field: Option<String>, taxonomy: &Taxonomy) {
        self.field = field;
        if self.phase == Phase::Success {
            self.apply_filter(taxonomy);
        }
    }

    fn apply_filter(&mut self, taxonomy: &Taxonomy) {
        let filtered = match self.field.as_deref() {
            Some(f) if f != ALL_FIELDS => taxonomy.filter(f, self.last_full.clone()),
            _ => self.last_full.clone(),
        };
        self.results = filtered.iter().map(DisplayPaper::from).collect();
    }
}

impl Default for Submitter {
    fn default() -> Self {
        Self::new()
    }
}

// Thin HTTP transport to the recommendation service. Kept apart from the
// state machine so outcomes can be fed in directly under test.
pub struct ApiClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ApiClient {
    pub fn new(server_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/gpt", server_url.trim_end_matches('/')),
        })
    }

    // Always submits the bare prompt; filtering happens against the local
    // taxonomy so the full set stays available for field-only changes.
    pub async fn search(&self, prompt: &str) -> SearchOutcome {
        let body = json!({ "prompt": prompt });

        let response = match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(r) => r,
            Err(e) => return SearchOutcome::NetworkError(e.to_string()),
        };

        let status = response.status();
        let value: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                if status.is_success() {
                    // 2xx but unreadable body: surface as "no valid papers".
                    return SearchOutcome::Response(PapersPayload::default());
                }
                return SearchOutcome::ServerError(format!("Server error ({}): {}", status, e));
            }
        };

        if status.is_success() {
            let payload: PapersPayload = serde_json::from_value(value).unwrap_or_default();
            return SearchOutcome::Response(payload);
        }

        let message = value["error"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Server error ({})", status));
        SearchOutcome::ServerError(message)
    }
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", cut)
}

pub fn render(submitter: &Submitter) {
    match submitter.phase() {
        Phase::Idle => {}
        Phase::Searching => println!("Searching..."),
        Phase::Error => {
            if let Some(msg) = submitter.message() {
                println!("{}", msg);
            }
        }
        Phase::Success => {
            println!("\n{}", "=".repeat(100));
            if let Some(field) = submitter.field() {
                println!("Field: {}", field);
            }
            println!(
                "{:<10} {:<44} {:<24} {:<6} {:>9}",
                "ID", "Title", "Author", "Year", "Relevance"
            );
            println!("{}", "=".repeat(100));
            for paper in submitter.results() {
                println!(
                    "{:<10} {:<44} {:<24} {:<6} {:>9}",
                    clip(&paper.paper_id, 10),
                    clip(&paper.title, 44),
                    clip(&paper.author, 24),
                    clip(&paper.year, 6),
                    paper.relevance
                );
            }
            println!("{}\n", "=".repeat(100));
        }
    }
}
