use super::{Database, DbError};

/// Enriched (or bare) IP record (spec §3 `IpAddress`, §6 geo-IP contract).
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct IpRecord {
    pub ip: String,
    pub isp: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

pub struct IpRepository<'a> {
    db: &'a Database,
}

impl<'a> IpRepository<'a> {
    pub(super) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, ip: &str) -> Result<Option<IpRecord>, DbError> {
        let ip = ip.to_string();
        self.db
            .with_retry(move |pool| {
                let ip = ip.clone();
                async move {
                    sqlx::query_as::<_, IpRecord>(
                        "SELECT ip, isp, country, country_code, region, city FROM ip_addresses WHERE ip = ?",
                    )
                    .bind(&ip)
                    .fetch_optional(&pool)
                    .await
                }
            })
            .await
    }

    /// Insert a bare record (enrichment unavailable or disabled).
    pub async fn insert_bare(&self, ip: &str) -> Result<(), DbError> {
        self.insert_enriched(ip, None, None, None, None, None).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_enriched(
        &self,
        ip: &str,
        isp: Option<&str>,
        country: Option<&str>,
        country_code: Option<&str>,
        region: Option<&str>,
        city: Option<&str>,
    ) -> Result<(), DbError> {
        let ip = ip.to_string();
        let isp = isp.map(str::to_string);
        let country = country.map(str::to_string);
        let country_code = country_code.map(str::to_string);
        let region = region.map(str::to_string);
        let city = city.map(str::to_string);
        self.db
            .with_retry(move |pool| {
                let (ip, isp, country, country_code, region, city) = (
                    ip.clone(),
                    isp.clone(),
                    country.clone(),
                    country_code.clone(),
                    region.clone(),
                    city.clone(),
                );
                async move {
                    sqlx::query(
                        "INSERT OR IGNORE INTO ip_addresses (ip, isp, country, country_code, region, city) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                    )
                    .bind(&ip)
                    .bind(&isp)
                    .bind(&country)
                    .bind(&country_code)
                    .bind(&region)
                    .bind(&city)
                    .execute(&pool)
                    .await
                }
            })
            .await?;
        Ok(())
    }

    /// Record a `(user, ip)` sighting if not already present (spec §3
    /// `UserJoinedInfo`: "records a connection event if not already
    /// present for that pair").
    pub async fn record_user_joined(&self, user_id: i64, ip: &str) -> Result<(), DbError> {
        let ip = ip.to_string();
        self.db
            .with_retry(move |pool| {
                let ip = ip.clone();
                async move {
                    sqlx::query("INSERT OR IGNORE INTO user_joined_info (user_id, ip) VALUES (?, ?)")
                        .bind(user_id)
                        .bind(&ip)
                        .execute(&pool)
                        .await
                }
            })
            .await?;
        Ok(())
    }

    pub async fn has_joined(&self, user_id: i64, ip: &str) -> Result<bool, DbError> {
        let ip = ip.to_string();
        self.db
            .with_retry(move |pool| {
                let ip = ip.clone();
                async move {
                    sqlx::query_scalar::<_, bool>(
                        "SELECT EXISTS(SELECT 1 FROM user_joined_info WHERE user_id = ? AND ip = ?)",
                    )
                    .bind(user_id)
                    .bind(&ip)
                    .fetch_one(&pool)
                    .await
                }
            })
            .await
    }
}
