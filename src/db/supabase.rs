//! Supabase (PostgREST) storage backend.
//!
//! Tables mirror `schema.sql`; timestamps are stored as bigint Unix seconds.
//! PostgREST offers no multi-statement transactions, so every write that
//! depends on a read is made conditional on what was read: the approval claim
//! is a PATCH filtered on `approved_at=is.null`, and the VIP extension is a
//! PATCH filtered on the previous `vip_expires_at`, retried when another
//! writer got there first.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::config::SupabaseConfig;
use crate::error::{AppError, Result};
use crate::models::{Charge, ChargeStatus, CreateCharge, Subscriber};
use crate::vip::extend_expiry;

/// Conditional writes tried before giving up on a contended subscriber.
const MAX_EXTEND_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    rest_url: String,
    service_key: String,
    charges_table: String,
    subscribers_table: String,
}

/// PostgREST equality filter value.
pub fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            client: Client::new(),
            rest_url: format!("{}/rest/v1", config.url),
            service_key: config.service_key.clone(),
            charges_table: config.charges_table.clone(),
            subscribers_table: config.subscribers_table.clone(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn rows<T: DeserializeOwned>(response: Response) -> Result<Vec<T>> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Database(format!(
                "Supabase error ({}): {}",
                status.as_u16(),
                text
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::Database(format!("Failed to parse Supabase response: {}", e)))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .authed(self.client.get(self.table_url(table)))
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await
            .map_err(|e| AppError::Database(format!("Supabase request failed: {}", e)))?;
        Self::rows(response).await
    }

    async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> Result<Vec<T>> {
        let response = self
            .authed(self.client.patch(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(filters)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Database(format!("Supabase request failed: {}", e)))?;
        Self::rows(response).await
    }

    async fn post<B: Serialize>(&self, table: &str, body: &B) -> Result<Response> {
        self.authed(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Database(format!("Supabase request failed: {}", e)))
    }

    async fn insert<B: Serialize, T: DeserializeOwned>(&self, table: &str, body: &B) -> Result<Vec<T>> {
        let response = self.post(table, body).await?;
        Self::rows(response).await
    }

    /// Insert unless the primary key already exists (`None` on conflict).
    async fn insert_new<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<Option<Vec<T>>> {
        let response = self.post(table, body).await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(None);
        }
        Ok(Some(Self::rows(response).await?))
    }

    // ============ Charges ============

    pub async fn insert_charge(&self, input: &CreateCharge, now: i64) -> Result<Charge> {
        let charge = input.clone().into_charge(Uuid::new_v4().to_string(), now);
        let rows: Vec<Charge> = self.insert(&self.charges_table, &charge).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::Database("Supabase returned no inserted charge".into()))
    }

    pub async fn get_charge(&self, id: &str) -> Result<Option<Charge>> {
        let rows: Vec<Charge> = self.select(&self.charges_table, &[("id", eq(id))]).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_charge_by_provider_id(&self, provider_payment_id: &str) -> Result<Option<Charge>> {
        let rows: Vec<Charge> = self
            .select(
                &self.charges_table,
                &[("provider_payment_id", eq(provider_payment_id))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn list_charges_for_subscriber(&self, subscriber: &str, limit: i64) -> Result<Vec<Charge>> {
        self.select(
            &self.charges_table,
            &[
                ("subscriber", eq(subscriber)),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    pub async fn record_provider_status(
        &self,
        id: &str,
        provider_status: &str,
        status: ChargeStatus,
        now: i64,
    ) -> Result<bool> {
        if status == ChargeStatus::Approved {
            return Err(AppError::Internal(
                "approvals must go through claim_approval".into(),
            ));
        }

        let mut filters = vec![("id", eq(id))];
        if status == ChargeStatus::Pending {
            filters.push(("status", "neq.approved".to_string()));
        }

        let rows: Vec<Charge> = self
            .patch(
                &self.charges_table,
                &filters,
                &json!({
                    "status": status,
                    "provider_status": provider_status,
                    "updated_at": now,
                }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// First approval only; see `queries::claim_approval`.
    pub async fn claim_approval(&self, id: &str, provider_status: &str, now: i64) -> Result<bool> {
        let rows: Vec<Charge> = self
            .patch(
                &self.charges_table,
                &[("id", eq(id)), ("approved_at", "is.null".to_string())],
                &json!({
                    "status": ChargeStatus::Approved,
                    "provider_status": provider_status,
                    "approved_at": now,
                    "updated_at": now,
                }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn reinstate_approval(&self, id: &str, provider_status: &str, now: i64) -> Result<bool> {
        let rows: Vec<Charge> = self
            .patch(
                &self.charges_table,
                &[
                    ("id", eq(id)),
                    ("approved_at", "not.is.null".to_string()),
                    ("status", "neq.approved".to_string()),
                ],
                &json!({
                    "status": ChargeStatus::Approved,
                    "provider_status": provider_status,
                    "updated_at": now,
                }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    // ============ Subscribers ============

    pub async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>> {
        let rows: Vec<Subscriber> = self
            .select(&self.subscribers_table, &[("id", eq(id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Add `days` of VIP time, creating the subscriber if needed.
    ///
    /// Each attempt reads the current expiry and writes the new one only if
    /// the stored value is still the one read, so concurrent grants for the
    /// same subscriber stack instead of overwriting each other.
    pub async fn extend_vip(
        &self,
        id: &str,
        email: Option<&str>,
        days: i64,
        now: i64,
    ) -> Result<Subscriber> {
        for attempt in 1..=MAX_EXTEND_ATTEMPTS {
            let written = match self.get_subscriber(id).await? {
                None => {
                    let record = Subscriber {
                        id: id.to_string(),
                        email: email.map(String::from),
                        vip_expires_at: Some(extend_expiry(None, now, days)),
                        created_at: now,
                        updated_at: now,
                    };
                    let inserted: Option<Vec<Subscriber>> =
                        self.insert_new(&self.subscribers_table, &record).await?;
                    inserted.map(|rows| rows.into_iter().next().unwrap_or(record))
                }
                Some(existing) => {
                    let guard = match existing.vip_expires_at {
                        Some(exp) => eq(&exp.to_string()),
                        None => "is.null".to_string(),
                    };

                    let mut changes = Map::new();
                    changes.insert(
                        "vip_expires_at".into(),
                        json!(extend_expiry(existing.vip_expires_at, now, days)),
                    );
                    changes.insert("updated_at".into(), json!(now));
                    if let Some(email) = email {
                        changes.insert("email".into(), json!(email));
                    }

                    let rows: Vec<Subscriber> = self
                        .patch(
                            &self.subscribers_table,
                            &[("id", eq(id)), ("vip_expires_at", guard)],
                            &Value::Object(changes),
                        )
                        .await?;
                    rows.into_iter().next()
                }
            };

            if let Some(subscriber) = written {
                return Ok(subscriber);
            }
            tracing::debug!(subscriber = %id, attempt, "VIP extension raced another writer, retrying");
        }

        Err(AppError::Database(format!(
            "VIP extension for {} kept conflicting after {} attempts",
            id, MAX_EXTEND_ATTEMPTS
        )))
    }
}
