//! IP Enrichment (spec §4.10): a background, best-effort side effect.
//! Grounded directly in `examples/original_source/chat/tornadoapp.py`'s
//! `save_ip`/`get_or_create_ip` (`urlopen(api_url % ip)`), translated into a
//! `reqwest` call spawned once per connection off the connection's event
//! loop.

use crate::state::Matrix;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    status: Option<String>,
    isp: Option<String>,
    #[serde(alias = "countryName")]
    country: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
    #[serde(alias = "regionName")]
    region: Option<String>,
    city: Option<String>,
}

/// Upsert the `(user, ip)` pair without ever affecting the socket: every
/// error is logged and swallowed (spec §4.10, §7 "background enrichment
/// error").
pub async fn enrich(matrix: &Matrix, user_id: i64, ip: &str) {
    if let Err(e) = enrich_inner(matrix, user_id, ip).await {
        warn!(user_id, ip, error = %e, "ip enrichment failed");
    }
}

async fn enrich_inner(matrix: &Matrix, user_id: i64, ip: &str) -> anyhow::Result<()> {
    if matrix.db.ip().has_joined(user_id, ip).await? {
        return Ok(());
    }

    if matrix.db.ip().get(ip).await?.is_none() {
        match &matrix.config.ip_api.url_template {
            Some(template) => {
                let url = template.replacen("%s", ip, 1);
                match fetch_geo_ip(&url).await {
                    Ok(Some(geo)) => {
                        matrix
                            .db
                            .ip()
                            .insert_enriched(
                                ip,
                                geo.isp.as_deref(),
                                geo.country.as_deref(),
                                geo.country_code.as_deref(),
                                geo.region.as_deref(),
                                geo.city.as_deref(),
                            )
                            .await?;
                    }
                    Ok(None) | Err(_) => {
                        matrix.db.ip().insert_bare(ip).await?;
                    }
                }
            }
            None => {
                matrix.db.ip().insert_bare(ip).await?;
            }
        }
    }

    matrix.db.ip().record_user_joined(user_id, ip).await?;
    Ok(())
}

async fn fetch_geo_ip(url: &str) -> anyhow::Result<Option<GeoIpResponse>> {
    let response: GeoIpResponse = reqwest::get(url).await?.json().await?;
    if response.status.as_deref() == Some("success") {
        Ok(Some(response))
    } else {
        Ok(None)
    }
}
