use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Тег события: slug из названия + 8 hex-символов sha256(client_id, название, момент создания).
pub fn generate_tag(client_id: i64, event_name: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.to_be_bytes());
    hasher.update(event_name.as_bytes());
    hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let slug = slugify(event_name);
    if slug.is_empty() {
        format!("event-{}", &digest[..8])
    } else {
        format!("{}-{}", slug, &digest[..8])
    }
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    slug.chars().take(48).collect::<String>().trim_end_matches('-').to_string()
}

/// Публичная ссылка на событие: `{base}/event?tag=...`.
pub fn external_link(public_base_url: &str, tag: &str) -> String {
    let query = serde_urlencoded::to_string([("tag", tag)]).unwrap_or_default();
    format!("{}/event?{}", public_base_url.trim_end_matches('/'), query)
}
