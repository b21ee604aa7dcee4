//! Fee and collection center tables served by a Supabase project's REST endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use recyclo_core::{
    model::{BusinessHours, CenterId, CollectionCenter},
    ports::{CenterTablePort, FeeTablePort, LookupError},
};

const REST_PATH: &str = "rest/v1";
const FEE_TABLE: &str = "bigObject";
const CENTER_TABLE: &str = "renewalcenter";
const FEE_COLUMNS: &str = "objName,amount";
const CENTER_COLUMNS: &str = "objID,positnNm,positnRdnmAddr,bscTelnoCn,clctItemCn,prkMthdExpln,\
monSalsHrExplnCn,tuesSalsHrExplnCn,wedSalsHrExplnCn,thurSalsHrExplnCn,friSalsHrExplnCn,\
satSalsHrExplnCn,sunSalsHrExplnCn,point";
const ACCEPTED_ITEMS_COLUMN: &str = "clctItemCn";

/// Row from the item fee table.
#[derive(Debug, Deserialize)]
struct FeeRow {
    #[serde(default)]
    amount: Option<f64>,
}

/// Row from the collection center table, limited to the columns we select.
#[derive(Debug, Deserialize)]
struct CenterRow {
    #[serde(rename = "objID", default)]
    obj_id: Option<String>,
    #[serde(rename = "positnNm", default)]
    name: Option<String>,
    #[serde(rename = "positnRdnmAddr", default)]
    road_address: Option<String>,
    #[serde(rename = "bscTelnoCn", default)]
    phone: Option<String>,
    #[serde(rename = "clctItemCn", default)]
    accepted_items: Option<String>,
    #[serde(rename = "prkMthdExpln", default)]
    parking: Option<String>,
    #[serde(rename = "monSalsHrExplnCn", default)]
    monday: Option<String>,
    #[serde(rename = "tuesSalsHrExplnCn", default)]
    tuesday: Option<String>,
    #[serde(rename = "wedSalsHrExplnCn", default)]
    wednesday: Option<String>,
    #[serde(rename = "thurSalsHrExplnCn", default)]
    thursday: Option<String>,
    #[serde(rename = "friSalsHrExplnCn", default)]
    friday: Option<String>,
    #[serde(rename = "satSalsHrExplnCn", default)]
    saturday: Option<String>,
    #[serde(rename = "sunSalsHrExplnCn", default)]
    sunday: Option<String>,
    #[serde(default)]
    point: Option<f64>,
}

/// Only the fee column of a center row.
#[derive(Debug, Deserialize)]
struct CenterPointRow {
    #[serde(default)]
    point: Option<f64>,
}

impl From<CenterRow> for CollectionCenter {
    fn from(row: CenterRow) -> Self {
        Self {
            id: CenterId(row.obj_id.unwrap_or_default()),
            name: row.name.unwrap_or_default(),
            address: row.road_address,
            phone: row.phone,
            accepted_items: row.accepted_items,
            parking_info: row.parking,
            hours: BusinessHours::from_week([
                row.monday,
                row.tuesday,
                row.wednesday,
                row.thursday,
                row.friday,
                row.saturday,
                row.sunday,
            ]),
            point: row.point,
        }
    }
}

/// Fee and center tables of one Supabase project.
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseStore {
    /// Create a store bound to the given HTTP client, project URL, and anonymous key.
    #[must_use]
    pub fn new(client: Client, url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: url.trim().trim_end_matches('/').to_owned(),
            api_key: api_key.trim().to_owned(),
        }
    }

    fn table(&self, table: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/{REST_PATH}/{table}", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn centers(&self, req: RequestBuilder) -> Result<Vec<CollectionCenter>, LookupError> {
        let rows = fetch_json::<Vec<CenterRow>>(req).await?;
        Ok(rows.into_iter().map(CollectionCenter::from).collect())
    }
}

#[async_trait]
impl FeeTablePort for SupabaseStore {
    async fn base_amount(&self, label: &str) -> Result<Option<f64>, LookupError> {
        let name = eq_filter(label);
        let req = self.table(FEE_TABLE).query(&[
            ("select", FEE_COLUMNS),
            ("objName", name.as_str()),
            ("limit", "1"),
        ]);
        debug!(table = FEE_TABLE, label, "querying base fee");

        let rows = fetch_json::<Vec<FeeRow>>(req).await?;
        Ok(rows.into_iter().next().and_then(|row| row.amount))
    }
}

#[async_trait]
impl CenterTablePort for SupabaseStore {
    async fn by_id(&self, id: &CenterId) -> Result<Vec<CollectionCenter>, LookupError> {
        let obj_id = eq_filter(&id.0);
        let req = self
            .table(CENTER_TABLE)
            .query(&[("select", CENTER_COLUMNS), ("objID", obj_id.as_str())]);
        debug!(table = CENTER_TABLE, id = %id, "querying centers by id");

        self.centers(req).await
    }

    async fn search_accepted_items(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<CollectionCenter>, LookupError> {
        let Some(filter) = accepted_items_filter(terms) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let limit = limit.to_string();
        let req = self.table(CENTER_TABLE).query(&[
            ("select", CENTER_COLUMNS),
            ("or", filter.as_str()),
            ("limit", limit.as_str()),
        ]);
        debug!(table = CENTER_TABLE, filter = %filter, limit = %limit, "searching accepted items");

        self.centers(req).await
    }

    async fn center_amount(&self, id: &CenterId) -> Result<Option<f64>, LookupError> {
        let obj_id = eq_filter(&id.0);
        let req = self.table(CENTER_TABLE).query(&[
            ("select", "objID,point"),
            ("objID", obj_id.as_str()),
            ("limit", "1"),
        ]);
        debug!(table = CENTER_TABLE, id = %id, "querying center fee");

        let rows = fetch_json::<Vec<CenterPointRow>>(req).await?;
        Ok(rows.into_iter().next().and_then(|row| row.point))
    }
}

/// Both table ports, sharing one store.
pub struct StoreBundle {
    /// Item fee table.
    pub fees: Arc<dyn FeeTablePort>,
    /// Collection center table.
    pub centers: Arc<dyn CenterTablePort>,
}

/// Build the table ports for a Supabase project.
#[must_use]
pub fn store(client: Client, url: &str, api_key: &str) -> StoreBundle {
    let store = Arc::new(SupabaseStore::new(client, url, api_key));
    let fees = Arc::clone(&store);

    StoreBundle {
        fees,
        centers: store,
    }
}

fn eq_filter(value: &str) -> String {
    format!("eq.{value}")
}

/// PostgREST `or` filter matching any term as a case-insensitive substring.
///
/// Returns `None` when no usable term is left.
fn accepted_items_filter(terms: &[String]) -> Option<String> {
    let clauses: Vec<String> = terms
        .iter()
        .map(|term| term.trim())
        .filter(|term| !term.is_empty())
        .map(|term| {
            format!(
                "{ACCEPTED_ITEMS_COLUMN}.ilike.{}",
                quote_value(&format!("*{term}*"))
            )
        })
        .collect();

    if clauses.is_empty() {
        return None;
    }
    Some(format!("({})", clauses.join(",")))
}

/// Quote a filter value when it contains characters PostgREST treats as syntax.
fn quote_value(value: &str) -> String {
    let reserved =
        |ch: char| matches!(ch, ',' | '.' | ':' | '(' | ')' | '"' | '\\') || ch.is_whitespace();
    if !value.chars().any(reserved) {
        return value.to_owned();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

// Fetch and decode JSON, keeping the response body of failed requests.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, LookupError> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(LookupError::Status {
            status: status.as_u16(),
            body,
        });
    }

    resp.json().await.map_err(|err| {
        if err.is_decode() {
            LookupError::Decode(err.to_string())
        } else {
            LookupError::Network(err)
        }
    })
}
