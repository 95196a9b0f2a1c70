use crate::error::Result;
use crate::models::job::Job;
use crate::services::job_service::JobService;
use crate::services::quota_service::QuotaService;
use crate::services::scrape_service::ScrapeLogger;
use crate::utils::normalize::truncate_chars;
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use std::time::Duration;

pub const BATCH_SIZE: usize = 5;
const MAX_ATTEMPTS: u32 = 3;
const RESUME_MAX_CHARS: usize = 2500;
const JOB_DESC_MAX_CHARS: usize = 400;

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub score: i64,
    pub reasons: String,
    pub work_type: Option<String>,
}

#[derive(Debug, Default)]
pub struct ScoreOutcome {
    pub scored: i64,
    pub ai_calls: i64,
    pub failed_batches: i64,
}

#[derive(Clone)]
pub struct MatchService {
    client: Client,
}

impl MatchService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Score every unscored job of this user in bounded batches. A job
    /// only ever ends up at the sentinel or a value in 0..=100; a guessed
    /// default score is never substituted.
    pub async fn score_pending(
        &self,
        jobs: &JobService,
        quota: &QuotaService,
        cfg: &AiConfig,
        resume_text: &str,
        ai_context: &str,
        user_id: i64,
        logger: &ScrapeLogger,
    ) -> Result<ScoreOutcome> {
        let mut outcome = ScoreOutcome::default();
        if cfg.api_key.is_empty() {
            logger.log("AI matching: skipped (no API key configured)");
            return Ok(outcome);
        }

        let pending = jobs.unscored_jobs(user_id).await?;
        if pending.is_empty() {
            logger.log("AI matching: nothing to score");
            return Ok(outcome);
        }

        let resume_short = truncate_chars(resume_text, RESUME_MAX_CHARS);
        let total_batches = pending.len().div_ceil(BATCH_SIZE);

        for (batch_index, batch) in pending.chunks(BATCH_SIZE).enumerate() {
            logger.log(&format!(
                "AI matching batch {}/{} ({} jobs)...",
                batch_index + 1,
                total_batches,
                batch.len()
            ));
            let prompt = build_prompt(&resume_short, ai_context, batch);

            let mut applied = false;
            for attempt in 1..=MAX_ATTEMPTS {
                outcome.ai_calls += 1;
                match self.chat(cfg, &prompt).await {
                    Ok(content) => {
                        if let Some(entries) = parse_score_response(&content) {
                            outcome.scored +=
                                apply_entries(jobs, batch, &entries, logger).await?;
                            applied = true;
                            break;
                        }
                        logger.log(&format!(
                            "  Attempt {}/{} failed: unparseable response",
                            attempt, MAX_ATTEMPTS
                        ));
                    }
                    Err(e) => {
                        logger.log(&format!("  Attempt {}/{} failed: {}", attempt, MAX_ATTEMPTS, e));
                    }
                }
                if attempt < MAX_ATTEMPTS {
                    let jitter: u64 = rand::thread_rng().gen_range(0..500);
                    tokio::time::sleep(Duration::from_millis(3000 + jitter)).await;
                }
            }

            if !applied {
                outcome.failed_batches += 1;
                logger.log(&format!(
                    "  Batch {} failed all retries — left unscored",
                    batch_index + 1
                ));
                for job in batch {
                    jobs.set_score(job.id, -1, "AI matching failed — use Rescore to retry", None)
                        .await?;
                }
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        quota.record_ai_calls(outcome.ai_calls).await?;
        logger.log(&format!(
            "AI matching complete: {} scored, {} calls",
            outcome.scored, outcome.ai_calls
        ));
        Ok(outcome)
    }

    async fn chat(&self, cfg: &AiConfig, prompt: &str) -> anyhow::Result<String> {
        let payload = serde_json::json!({
            "model": cfg.model,
            "messages": [
                {"role": "system", "content": "You are a JSON-only API. Respond only with valid JSON arrays."},
                {"role": "user", "content": prompt}
            ],
            "stream": false
        });

        let res = self
            .client
            .post(&cfg.api_url)
            .bearer_auth(&cfg.api_key)
            .json(&payload)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("AI API error {}: {}", status, text));
        }

        let body: JsonValue = res.json().await?;
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid AI response format"))
    }
}

pub fn build_prompt(resume_short: &str, ai_context: &str, batch: &[Job]) -> String {
    let context_str = if ai_context.is_empty() {
        String::new()
    } else {
        format!("\nExtra context: {}", ai_context)
    };

    let mut jobs_text = String::new();
    for (j, job) in batch.iter().enumerate() {
        let salary = if job.salary_display.is_empty() {
            "unlisted"
        } else {
            &job.salary_display
        };
        jobs_text.push_str(&format!(
            "\nJob {}: {} @ {}\nLocation: {} | Type: {} | Salary: {}\nDesc: {}\n---",
            j + 1,
            job.title,
            job.company,
            job.location,
            job.work_type,
            salary,
            truncate_chars(&job.description, JOB_DESC_MAX_CHARS)
        ));
    }

    format!(
        "You are a technical recruiter evaluating job fit.\n\n\
         CANDIDATE RESUME:\n{}{}\n\n\
         JOBS TO SCORE:\n{}\n\n\
         Scoring: 70-100=strong match, 40-69=worth applying, 0-39=poor fit.\n\
         Boost entry-level/new-grad/associate roles. \
         Correct work_type to Remote/Hybrid/Onsite based on description.\n\n\
         YOU MUST respond with ONLY a JSON array of exactly {} objects:\n\
         [{{\"score\":85,\"reasons\":\"Strong Python match. Entry-level.\",\"work_type\":\"Remote\"}},...]\n\
         No prose, no markdown, ONLY the JSON array.",
        resume_short,
        context_str,
        jobs_text,
        batch.len()
    )
}

/// A parsed score outside 0..=100 leaves the job unscored with no retry;
/// only transport failures and unparseable responses are retried.
pub fn validated_score(raw: i64) -> Option<i64> {
    (0..=100).contains(&raw).then_some(raw)
}

fn valid_work_type(raw: &str) -> Option<String> {
    matches!(raw, "Remote" | "Hybrid" | "Onsite").then(|| raw.to_string())
}

async fn apply_entries(
    jobs: &JobService,
    batch: &[Job],
    entries: &[ScoreEntry],
    logger: &ScrapeLogger,
) -> Result<i64> {
    let mut scored = 0;
    for (j, job) in batch.iter().enumerate() {
        match entries.get(j) {
            Some(entry) => match validated_score(entry.score) {
                Some(score) => {
                    jobs.set_score(job.id, score, &entry.reasons, entry.work_type.as_deref())
                        .await?;
                    scored += 1;
                }
                None => {
                    logger.log(&format!(
                        "  '{}' scored out of range ({}) — left unscored",
                        job.title, entry.score
                    ));
                }
            },
            None => {
                jobs.set_score(job.id, -1, "Score unavailable (partial response)", None)
                    .await?;
            }
        }
    }
    Ok(scored)
}

// ── response parsing ─────────────────────────────────────────────────────
//
// Ordered strategies, strict first, each a pure function over the raw
// response text; the first one that yields entries wins.

type ParseStrategy = fn(&str) -> Option<Vec<ScoreEntry>>;

const PARSE_STRATEGIES: [ParseStrategy; 4] =
    [parse_strict, parse_relaxed, parse_objects, parse_score_lines];

pub fn parse_score_response(text: &str) -> Option<Vec<ScoreEntry>> {
    for strategy in PARSE_STRATEGIES {
        if let Some(entries) = strategy(text) {
            if !entries.is_empty() {
                return Some(entries);
            }
        }
    }
    None
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```(?:json)?\s*|\s*```$").expect("valid regex"))
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid regex"))
}

fn object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("valid regex"))
}

fn score_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)score\D{0,10}?(-?\d{1,3})"#).expect("valid regex"))
}

fn reason_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)reasons?\s*[:=]\s*"?([^"\n]+)"#).expect("valid regex"))
}

fn strip_fences(text: &str) -> String {
    fence_re().replace_all(text.trim(), "").to_string()
}

fn bracket_slice(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn entry_from_value(value: &JsonValue) -> Option<ScoreEntry> {
    let score = value
        .get("score")
        .and_then(|s| s.as_i64().or_else(|| s.as_str().and_then(|t| t.trim().parse().ok())))?;
    let reasons = value
        .get("reasons")
        .or_else(|| value.get("reason"))
        .and_then(|r| r.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let work_type = value
        .get("work_type")
        .and_then(|w| w.as_str())
        .and_then(valid_work_type);
    Some(ScoreEntry {
        score,
        reasons,
        work_type,
    })
}

fn entries_from_array(text: &str) -> Option<Vec<ScoreEntry>> {
    let slice = bracket_slice(text)?;
    let values: Vec<JsonValue> = serde_json::from_str(slice).ok()?;
    let entries: Vec<ScoreEntry> = values.iter().filter_map(entry_from_value).collect();
    (!entries.is_empty()).then_some(entries)
}

/// Strategy 1: the response is (possibly fenced) valid JSON.
fn parse_strict(text: &str) -> Option<Vec<ScoreEntry>> {
    entries_from_array(&strip_fences(text))
}

/// Strategy 2: repair trailing commas and single quotes, then parse.
fn parse_relaxed(text: &str) -> Option<Vec<ScoreEntry>> {
    let cleaned = strip_fences(text);
    let fixed = trailing_comma_re().replace_all(&cleaned, "$1").replace('\'', "\"");
    entries_from_array(&fixed)
}

/// Strategy 3: fish individual objects out of surrounding prose.
fn parse_objects(text: &str) -> Option<Vec<ScoreEntry>> {
    let cleaned = strip_fences(text);
    let mut entries = Vec::new();
    for m in object_re().find_iter(&cleaned) {
        let raw = m.as_str();
        let parsed: Option<JsonValue> = serde_json::from_str(raw)
            .ok()
            .or_else(|| serde_json::from_str(&trailing_comma_re().replace_all(raw, "$1")).ok());
        if let Some(value) = parsed {
            if let Some(entry) = entry_from_value(&value) {
                entries.push(entry);
            }
        }
    }
    (!entries.is_empty()).then_some(entries)
}

/// Strategy 4: last resort — pull score/reason pairs straight from lines.
fn parse_score_lines(text: &str) -> Option<Vec<ScoreEntry>> {
    let mut entries = Vec::new();
    for line in text.lines() {
        if let Some(caps) = score_line_re().captures(line) {
            let score: i64 = caps.get(1)?.as_str().parse().ok()?;
            let reasons = reason_line_re()
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().trim_end_matches(['}', ',']).trim().to_string())
                .unwrap_or_default();
            entries.push(ScoreEntry {
                score,
                reasons,
                work_type: None,
            });
        }
    }
    (!entries.is_empty()).then_some(entries)
}
