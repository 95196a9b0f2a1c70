use sha2::{Digest, Sha256};

/// Dedup/matching identity: lowercase title+company with everything
/// non-alphanumeric stripped. "Software Engineer I" @ "ACME CORP " and
/// "software engineer i" @ "Acme Corp" collapse to the same key.
pub fn normalized_key(title: &str, company: &str) -> String {
    format!("{}{}", title, company)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Stable id for listings whose provider payload carries no id of its own.
pub fn synthesized_job_id(source: &str, title: &str, company: &str, location: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(company.as_bytes());
    hasher.update(b"|");
    hasher.update(location.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}_{}", source.to_lowercase(), &digest[..16])
}

pub fn infer_work_type(title: &str, location: &str) -> &'static str {
    let t = title.to_lowercase();
    let l = location.to_lowercase();
    if t.contains("remote") || l.contains("remote") {
        "Remote"
    } else if t.contains("hybrid") || l.contains("hybrid") {
        "Hybrid"
    } else if location.trim().is_empty() {
        "Unknown"
    } else {
        "Onsite"
    }
}

/// Extract numeric bounds from free text like "$40,000 - $60,000".
/// Numbers at or below 1000 are treated as noise (hour rates, list indices).
pub fn parse_salary_range(text: &str) -> (Option<i64>, Option<i64>) {
    let cleaned = text.replace(',', "");
    let mut nums: Vec<i64> = Vec::new();
    let mut current = String::new();
    for c in cleaned.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            if let Ok(n) = current.parse::<i64>() {
                if n > 1000 {
                    nums.push(n);
                }
            }
            current.clear();
        }
    }
    match nums.len() {
        0 => (None, None),
        1 => (Some(nums[0]), Some(nums[0])),
        _ => (nums.iter().min().copied(), nums.iter().max().copied()),
    }
}

pub fn format_thousands(value: i64) -> String {
    let raw = value.abs().to_string();
    let mut out = String::new();
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

pub fn strip_html(input: &str) -> String {
    let mut result = String::new();
    let mut inside_tag = false;

    for c in input.chars() {
        if c == '<' {
            inside_tag = true;
        } else if c == '>' {
            inside_tag = false;
            result.push(' ');
        } else if !inside_tag {
            result.push(c);
        }
    }

    let collapsed = result
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
