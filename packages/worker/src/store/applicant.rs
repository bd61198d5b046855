use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

lazy_static! {
    static ref RESULT_ID_RE: Regex = Regex::new(r"/result/(\d+)").unwrap();
}

/// External identifier of a posting: the numeric result id embedded in its
/// URL. Ordering is numeric, matching the source's reverse-chronological
/// listing order (newer postings get larger ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Parse the result id out of a listing URL, e.g.
    /// `https://www.thegradcafe.com/result/12345`.
    pub fn from_url(url: &str) -> Option<Self> {
        RESULT_ID_RE
            .captures(url)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .map(EntryId)
    }

    /// Parse a persisted watermark value.
    pub fn from_watermark(value: &str) -> Option<Self> {
        value.parse().ok().map(EntryId)
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One admissions-result posting.
///
/// Everything but the URL is optional: the source pages are loosely
/// structured and any field can be absent. Missing numeric fields stay
/// `None`; they are never coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApplicantRecord {
    pub program: Option<String>,
    pub university: Option<String>,
    pub degree: Option<String>,
    pub status: Option<String>,
    pub term: Option<String>,
    pub us_or_international: Option<String>,
    pub comments: Option<String>,
    pub decision_date: Option<String>,
    pub date_added: Option<String>,
    /// Natural key: globally unique per posting
    pub url: String,
    pub gpa: Option<f64>,
    pub gre: Option<f64>,
    pub gre_v: Option<f64>,
    pub gre_aw: Option<f64>,
    /// Program name as resolved by the external enrichment step
    pub llm_generated_program: Option<String>,
    /// University name as resolved by the external enrichment step
    pub llm_generated_university: Option<String>,
}

impl ApplicantRecord {
    /// The record's external identifier, if its URL carries one.
    pub fn entry_id(&self) -> Option<EntryId> {
        EntryId::from_url(&self.url)
    }

    /// Total number of stored records.
    pub async fn count(pool: &PgPool) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM applicants")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Find a stored record by its URL.
    pub async fn find_by_url(url: &str, pool: &PgPool) -> anyhow::Result<Option<Self>> {
        let record = sqlx::query_as::<_, ApplicantRecord>(
            "SELECT program, university, degree, status, term, us_or_international, \
             comments, decision_date, date_added, url, gpa, gre, gre_v, gre_aw, \
             llm_generated_program, llm_generated_university \
             FROM applicants WHERE url = $1",
        )
        .bind(url)
        .fetch_optional(pool)
        .await?;
        Ok(record)
    }
}
