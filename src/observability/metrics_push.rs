use tracing::{debug, info};

use crate::constants::PUSHGATEWAY_URL_ENV;

const JOB_NAME: &str = "flight_etl";

/// Push everything recorded so far to the Prometheus Pushgateway named by
/// `FLIGHT_ETL_PUSHGATEWAY_URL`.
///
/// Returns `Ok(false)` without doing anything when the variable is unset or
/// empty.
pub async fn push_metrics(instance: &str) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let base = match std::env::var(PUSHGATEWAY_URL_ENV) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => {
            debug!("{} not set, skipping metrics push", PUSHGATEWAY_URL_ENV);
            return Ok(false);
        }
    };

    let mut body = format!(
        "# TYPE flight_etl_last_push_timestamp_seconds gauge\n\
         flight_etl_last_push_timestamp_seconds {}\n",
        chrono::Utc::now().timestamp()
    );
    if let Some(rendered) = super::metrics::render() {
        body.push_str(&rendered);
    }

    let url = push_url(&base, instance);
    let client = reqwest::Client::new();
    let response = client
        .post(&url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(format!("Pushgateway returned status {status}: {text}").into());
    }

    info!("Pushed metrics to Pushgateway for instance={}", instance);
    Ok(true)
}

fn push_url(base: &str, instance: &str) -> String {
    format!(
        "{}/metrics/job/{}/instance/{}",
        base.trim_end_matches('/'),
        JOB_NAME,
        instance
    )
}
