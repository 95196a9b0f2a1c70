use crate::error::Result;
use crate::models::job::JobCandidate;
use crate::models::user::SearchLocation;
use crate::services::scrape_service::ScrapeLogger;
use crate::utils::normalize::{
    format_thousands, infer_work_type, strip_html, synthesized_job_id, truncate_chars,
};
use reqwest::Client;
use serde_json::Value as JsonValue;
use url::Url;

const GENERAL_API_BASE: &str = "https://api.adzuna.com/v1/api/jobs/us/search";
const BOARD_API_URL: &str = "https://jsearch.p.rapidapi.com/search";
const GENERAL_PAGES: u32 = 2;
const RESULTS_PER_PAGE: u32 = 50;
const DESCRIPTION_MAX_CHARS: usize = 2500;

/// Titles rejected before any AI cost is incurred. Title text only —
/// company and location never factor into the decision.
const EXCLUDE_TITLE_KEYWORDS: [&str; 31] = [
    "senior", "sr.", " sr ", "staff ", "principal", "director", "vp ", "vice president",
    "manager", "head of", "lead ", " lead", "architect", "cto", "cso", "chief",
    "surgeon", "physician", "nurse", "dental", "attorney", "lawyer",
    "account executive", "truck driver", "cdl", "warehouse", "hvac",
    "plumber", "electrician", "carpenter", "welder",
];

pub fn is_relevant_title(title: &str) -> bool {
    let t = title.to_lowercase();
    !EXCLUDE_TITLE_KEYWORDS.iter().any(|kw| t.contains(kw))
}

// Cities rewritten to the nearest city with better listing coverage.
const LOCATION_ALIASES: [(&str, &str); 1] = [("plainfield", "Indianapolis")];

pub fn alias_location(city: &str) -> &str {
    let lowered = city.to_lowercase();
    for (from, to) in LOCATION_ALIASES {
        if lowered == from {
            return to;
        }
    }
    city
}

#[derive(Debug, Clone)]
pub struct ProviderCreds {
    pub adzuna_app_id: String,
    pub adzuna_app_key: String,
    pub jsearch_key: String,
}

#[derive(Debug, Default)]
pub struct FetchResult {
    pub candidates: Vec<JobCandidate>,
    pub calls: i64,
    pub budget_note: Option<String>,
}

#[derive(Clone)]
pub struct FetchService {
    client: Client,
}

impl FetchService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// General role/location search, paginated per (role, location) pair.
    /// A failed query is logged and skipped; the rest of the run continues.
    pub async fn search_general(
        &self,
        creds: &ProviderCreds,
        roles: &[String],
        locations: &[SearchLocation],
        remaining_daily: i64,
        logger: &ScrapeLogger,
    ) -> Result<FetchResult> {
        let mut result = FetchResult::default();
        if creds.adzuna_app_id.is_empty() || creds.adzuna_app_key.is_empty() {
            logger.log("General search: skipped (no API credentials configured)");
            return Ok(result);
        }

        logger.log(&format!(
            "General search: {} roles x {} locations...",
            roles.len(),
            locations.len()
        ));

        'outer: for location in locations {
            let where_clause = if location.state.is_empty() {
                alias_location(&location.city).to_string()
            } else {
                format!("{}, {}", alias_location(&location.city), location.state)
            };
            for role in roles {
                for page in 1..=GENERAL_PAGES {
                    if result.calls >= remaining_daily {
                        let note = "general-search daily budget exhausted".to_string();
                        logger.log(&format!("General search: {} — stopping", note));
                        result.budget_note = Some(note);
                        break 'outer;
                    }

                    let url = match self.general_url(creds, role, &where_clause, location.radius_miles, page) {
                        Ok(url) => url,
                        Err(e) => {
                            logger.log(&format!("  General [{} / {}]: bad query ({})", role, where_clause, e));
                            break;
                        }
                    };

                    let response = match self.client.get(url).send().await {
                        Ok(resp) => resp,
                        Err(e) => {
                            tracing::warn!(%role, location = %where_clause, error = %e, "general search request failed");
                            logger.log(&format!("  General [{} / {}] p{}: {}", role, where_clause, page, e));
                            break;
                        }
                    };
                    result.calls += 1;

                    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = retry_after_secs(&response);
                        logger.log(&format!(
                            "General search rate limited (retry after {}s) — skipping remaining queries",
                            retry_after
                        ));
                        result.budget_note = Some("general-search rate limited".to_string());
                        break 'outer;
                    }
                    if !response.status().is_success() {
                        logger.log(&format!(
                            "  General [{} / {}] p{}: HTTP {}",
                            role,
                            where_clause,
                            page,
                            response.status()
                        ));
                        break;
                    }

                    let body: JsonValue = match response.json().await {
                        Ok(body) => body,
                        Err(e) => {
                            logger.log(&format!("  General [{} / {}] p{}: bad payload ({})", role, where_clause, page, e));
                            break;
                        }
                    };

                    let page_candidates = parse_general_results(&body);
                    let page_len = page_candidates.len();
                    result.candidates.extend(page_candidates);
                    logger.log(&format!(
                        "  General [{} / {}] page {}: {} listings",
                        role, where_clause, page, page_len
                    ));
                    if (page_len as u32) < RESULTS_PER_PAGE {
                        break;
                    }
                }
            }
        }

        logger.log(&format!(
            "General search: {} listings, {} calls",
            result.candidates.len(),
            result.calls
        ));
        Ok(result)
    }

    fn general_url(
        &self,
        creds: &ProviderCreds,
        role: &str,
        where_clause: &str,
        radius_miles: i64,
        page: u32,
    ) -> anyhow::Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", GENERAL_API_BASE, page))?;
        let distance_km = (radius_miles * 1609 / 1000).max(1);
        url.query_pairs_mut()
            .append_pair("app_id", &creds.adzuna_app_id)
            .append_pair("app_key", &creds.adzuna_app_key)
            .append_pair("what", role)
            .append_pair("where", where_clause)
            .append_pair("distance", &distance_km.to_string())
            .append_pair("results_per_page", &RESULTS_PER_PAGE.to_string())
            .append_pair("max_days_old", "30")
            .append_pair("sort_by", "date")
            .append_pair("content-type", "application/json");
        Ok(url)
    }

    /// Targeted company-board search. `allowed` has already been bounded by
    /// the monthly budget guard; this never issues more queries than that.
    pub async fn search_company_boards(
        &self,
        creds: &ProviderCreds,
        targets: &[String],
        allowed: usize,
        logger: &ScrapeLogger,
    ) -> Result<FetchResult> {
        let mut result = FetchResult::default();
        if creds.jsearch_key.is_empty() {
            logger.log("Company boards: skipped (no API key configured)");
            return Ok(result);
        }
        if allowed == 0 {
            let note = "company-board queries skipped (monthly budget below safety margin)".to_string();
            logger.log(&format!("Company boards: {}", note));
            result.budget_note = Some(note);
            return Ok(result);
        }
        if allowed < targets.len() {
            result.budget_note = Some(format!(
                "company-board queries truncated to {} of {} (monthly budget)",
                allowed,
                targets.len()
            ));
        }

        logger.log(&format!("Company boards: targeting {} companies...", allowed));

        for target in targets.iter().take(allowed) {
            let response = self
                .client
                .get(BOARD_API_URL)
                .header("X-RapidAPI-Key", &creds.jsearch_key)
                .header("X-RapidAPI-Host", "jsearch.p.rapidapi.com")
                .query(&[
                    ("query", format!("{} in United States", target)),
                    ("page", "1".to_string()),
                    ("num_pages", "1".to_string()),
                    ("date_posted", "month".to_string()),
                ])
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(%target, error = %e, "company-board request failed");
                    logger.log(&format!("  {}: {}", target, e));
                    continue;
                }
            };
            result.calls += 1;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                logger.log("Company boards rate limited — stopping company searches");
                result.budget_note = Some("company-board provider rate limited".to_string());
                break;
            }
            if !response.status().is_success() {
                logger.log(&format!("  {}: HTTP {}", target, response.status()));
                continue;
            }

            match response.json::<JsonValue>().await {
                Ok(body) => {
                    let listings = parse_board_results(&body, target);
                    logger.log(&format!("  {}: {} listings", target, listings.len()));
                    result.candidates.extend(listings);
                }
                Err(e) => {
                    logger.log(&format!("  {}: bad payload ({})", target, e));
                }
            }
        }

        logger.log(&format!(
            "Company boards: {} listings, {} calls",
            result.candidates.len(),
            result.calls
        ));
        Ok(result)
    }
}

fn retry_after_secs(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(60)
}

fn str_field(value: &JsonValue, key: &str) -> String {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string()
}

fn num_to_i64(value: Option<&JsonValue>) -> Option<i64> {
    value.and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()).map(|f| f as i64))
    })
}

/// Map the general provider's result page into normalized candidates.
/// The pre-filter runs here so rejected titles never reach dedup or the
/// scorer.
pub fn parse_general_results(body: &JsonValue) -> Vec<JobCandidate> {
    let mut candidates = Vec::new();
    let Some(results) = body.get("results").and_then(|v| v.as_array()) else {
        return candidates;
    };

    for item in results {
        let title = str_field(item, "title").trim().to_string();
        if title.is_empty() || !is_relevant_title(&title) {
            continue;
        }
        let company = item
            .get("company")
            .and_then(|c| c.get("display_name"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let location = item
            .get("location")
            .and_then(|l| l.get("display_name"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let salary_min = num_to_i64(item.get("salary_min"));
        let salary_max = num_to_i64(item.get("salary_max"));
        let salary_display = match (salary_min, salary_max) {
            (Some(min), Some(max)) => format!(
                "${}–${}/yr",
                format_thousands(min),
                format_thousands(max)
            ),
            _ => String::new(),
        };

        let raw_id = match item.get("id") {
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let job_id = match raw_id {
            Some(id) => format!("adz_{}", id),
            None => synthesized_job_id("adz", &title, &company, &location),
        };

        let description = truncate_chars(&strip_html(&str_field(item, "description")), DESCRIPTION_MAX_CHARS);
        let apply_url = str_field(item, "redirect_url");

        candidates.push(JobCandidate {
            job_id,
            work_type: infer_work_type(&title, &location).to_string(),
            lat: item.get("latitude").and_then(|v| v.as_f64()),
            lng: item.get("longitude").and_then(|v| v.as_f64()),
            salary_min,
            salary_max,
            salary_display,
            description,
            company_url: apply_url.clone(),
            apply_url,
            source: "Adzuna".to_string(),
            date_posted: str_field(item, "created"),
            title,
            company,
            location,
        });
    }
    candidates
}

/// Map the company-board provider's payload into normalized candidates.
pub fn parse_board_results(body: &JsonValue, target: &str) -> Vec<JobCandidate> {
    let mut candidates = Vec::new();
    let Some(results) = body.get("data").and_then(|v| v.as_array()) else {
        return candidates;
    };

    for item in results {
        let title = str_field(item, "job_title").trim().to_string();
        if title.is_empty() || !is_relevant_title(&title) {
            continue;
        }
        let company = {
            let employer = str_field(item, "employer_name");
            if employer.is_empty() {
                target.to_string()
            } else {
                employer
            }
        };

        let city = str_field(item, "job_city");
        let state = str_field(item, "job_state");
        let location = match (city.is_empty(), state.is_empty()) {
            (false, false) => format!("{}, {}", city, state),
            (false, true) => city,
            (true, false) => state,
            (true, true) => str_field(item, "job_country"),
        };

        let salary_min = num_to_i64(item.get("job_min_salary"));
        let salary_max = num_to_i64(item.get("job_max_salary"));
        let period = str_field(item, "job_salary_period").to_uppercase();
        let salary_display = match (salary_min, salary_max) {
            (Some(min), Some(max)) if period == "HOUR" => format!("${}–${}/hr", min, max),
            (Some(min), Some(max)) => format!(
                "${}–${}/yr",
                format_thousands(min),
                format_thousands(max)
            ),
            (None, Some(max)) => format!("Up to ${}", format_thousands(max)),
            _ => String::new(),
        };

        let raw_id = str_field(item, "job_id");
        let job_id = if raw_id.is_empty() {
            synthesized_job_id("jsearch", &title, &company, &location)
        } else {
            raw_id
        };

        let is_remote = item.get("job_is_remote").and_then(|v| v.as_bool()).unwrap_or(false);
        let work_type = if is_remote {
            "Remote".to_string()
        } else {
            infer_work_type(&title, &location).to_string()
        };

        let apply_url = str_field(item, "job_apply_link");
        let company_url = {
            let site = str_field(item, "employer_website");
            if site.is_empty() {
                apply_url.clone()
            } else {
                site
            }
        };

        candidates.push(JobCandidate {
            job_id,
            work_type,
            lat: item.get("job_latitude").and_then(|v| v.as_f64()),
            lng: item.get("job_longitude").and_then(|v| v.as_f64()),
            salary_min,
            salary_max,
            salary_display,
            description: truncate_chars(&str_field(item, "job_description"), DESCRIPTION_MAX_CHARS),
            apply_url,
            company_url,
            source: target.to_string(),
            date_posted: str_field(item, "job_posted_at_datetime_utc"),
            title,
            company,
            location,
        });
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefilter_is_title_only_and_deterministic() {
        assert!(is_relevant_title("Software Engineer I"));
        assert!(is_relevant_title("Junior Data Analyst"));
        assert!(!is_relevant_title("Senior Software Engineer"));
        assert!(!is_relevant_title("Engineering Manager"));
        assert!(!is_relevant_title("CDL Truck Driver"));
        // Same inputs, same answer, regardless of call order.
        for _ in 0..3 {
            assert!(!is_relevant_title("Principal Architect"));
            assert!(is_relevant_title("QA Engineer"));
        }
    }

    #[test]
    fn location_alias_rewrites_known_city_only() {
        assert_eq!(alias_location("Plainfield"), "Indianapolis");
        assert_eq!(alias_location("plainfield"), "Indianapolis");
        assert_eq!(alias_location("West Lafayette"), "West Lafayette");
    }

    #[test]
    fn general_results_normalize_and_prefilter() {
        let body = json!({
            "results": [
                {
                    "id": 12345,
                    "title": "Software Engineer I",
                    "company": {"display_name": "Acme Corp"},
                    "location": {"display_name": "Indianapolis, IN"},
                    "latitude": 39.77,
                    "longitude": -86.16,
                    "salary_min": 65000.0,
                    "salary_max": 80000.0,
                    "redirect_url": "https://example.com/apply",
                    "description": "<p>Write   code</p>",
                    "created": "2026-08-01T00:00:00Z"
                },
                {
                    "id": 12346,
                    "title": "Senior Software Engineer",
                    "company": {"display_name": "Acme Corp"},
                    "location": {"display_name": "Indianapolis, IN"}
                }
            ]
        });
        let candidates = parse_general_results(&body);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.job_id, "adz_12345");
        assert_eq!(c.company, "Acme Corp");
        assert_eq!(c.salary_display, "$65,000–$80,000/yr");
        assert_eq!(c.work_type, "Onsite");
        assert_eq!(c.description, "Write code");
        assert_eq!(c.source, "Adzuna");
    }

    #[test]
    fn general_results_synthesize_missing_ids() {
        let body = json!({
            "results": [
                {
                    "title": "QA Engineer",
                    "company": {"display_name": "Acme"},
                    "location": {"display_name": "Remote"}
                }
            ]
        });
        let candidates = parse_general_results(&body);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].job_id.starts_with("adz_"));
        assert_eq!(candidates[0].work_type, "Remote");
    }

    #[test]
    fn board_results_normalize_salary_periods_and_fallback_company() {
        let body = json!({
            "data": [
                {
                    "job_id": "abc123",
                    "job_title": "Software Engineer",
                    "employer_name": "",
                    "job_city": "Columbus",
                    "job_state": "IN",
                    "job_min_salary": 30,
                    "job_max_salary": 45,
                    "job_salary_period": "HOUR",
                    "job_is_remote": false,
                    "job_apply_link": "https://example.com/a"
                }
            ]
        });
        let candidates = parse_board_results(&body, "Cummins");
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.company, "Cummins");
        assert_eq!(c.location, "Columbus, IN");
        assert_eq!(c.salary_display, "$30–$45/hr");
        assert_eq!(c.source, "Cummins");
    }

    #[test]
    fn board_results_respect_remote_flag() {
        let body = json!({
            "data": [
                {
                    "job_id": "r1",
                    "job_title": "Developer",
                    "employer_name": "Acme",
                    "job_city": "Indianapolis",
                    "job_state": "IN",
                    "job_is_remote": true
                }
            ]
        });
        let candidates = parse_board_results(&body, "Acme");
        assert_eq!(candidates[0].work_type, "Remote");
    }
}
