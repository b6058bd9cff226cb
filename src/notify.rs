//! Downstream Notifier (C8): fire-and-forget handoff to the classification
//! service (spec.md §4.8). Never fails the document.

use crate::config::Settings;

/// POSTs `{ "extraction_ids": [extraction_id] }` to the configured endpoint.
/// A no-op when Service 2 is disabled. All failures are logged only.
pub async fn notify(http: &reqwest::Client, settings: &Settings, extraction_id: i64, doc_id: &str) {
    if !settings.service2_enabled {
        return;
    }

    let url = format!("{}{}", settings.service2_base_url, settings.service2_endpoint);
    let body = serde_json::json!({ "extraction_ids": [extraction_id] });

    let response = http
        .post(&url)
        .json(&body)
        .timeout(std::time::Duration::from_secs(settings.service2_timeout_secs))
        .send()
        .await;

    match response {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if matches!(status, 200 | 201 | 202) {
                tracing::debug!(doc_id, extraction_id, status, "downstream notify succeeded");
            } else {
                tracing::warn!(doc_id, extraction_id, status, "downstream notify returned non-success status");
            }
        }
        Err(e) => {
            tracing::warn!(doc_id, extraction_id, error = %e, "downstream notify failed");
        }
    }
}
