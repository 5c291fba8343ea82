use crate::error::Result;
use crate::models::{Charge, ChargeStatus, CreateCharge, Subscriber};

use super::{DbPool, SupabaseClient, queries};

/// Where charges and entitlements are persisted.
///
/// SQLite calls are short and run inline on the request task.
#[derive(Clone)]
pub enum Store {
    Sqlite(DbPool),
    Supabase(SupabaseClient),
}

impl Store {
    pub async fn insert_charge(&self, input: &CreateCharge, now: i64) -> Result<Charge> {
        match self {
            Store::Sqlite(pool) => {
                let conn = pool.get()?;
                queries::insert_charge(&conn, input, now)
            }
            Store::Supabase(client) => client.insert_charge(input, now).await,
        }
    }

    pub async fn get_charge(&self, id: &str) -> Result<Option<Charge>> {
        match self {
            Store::Sqlite(pool) => {
                let conn = pool.get()?;
                queries::get_charge(&conn, id)
            }
            Store::Supabase(client) => client.get_charge(id).await,
        }
    }

    pub async fn get_charge_by_provider_id(&self, provider_payment_id: &str) -> Result<Option<Charge>> {
        match self {
            Store::Sqlite(pool) => {
                let conn = pool.get()?;
                queries::get_charge_by_provider_id(&conn, provider_payment_id)
            }
            Store::Supabase(client) => client.get_charge_by_provider_id(provider_payment_id).await,
        }
    }

    pub async fn list_charges_for_subscriber(&self, subscriber: &str, limit: i64) -> Result<Vec<Charge>> {
        match self {
            Store::Sqlite(pool) => {
                let conn = pool.get()?;
                queries::list_charges_for_subscriber(&conn, subscriber, limit)
            }
            Store::Supabase(client) => client.list_charges_for_subscriber(subscriber, limit).await,
        }
    }

    pub async fn record_provider_status(
        &self,
        id: &str,
        provider_status: &str,
        status: ChargeStatus,
        now: i64,
    ) -> Result<bool> {
        match self {
            Store::Sqlite(pool) => {
                let conn = pool.get()?;
                queries::record_provider_status(&conn, id, provider_status, status, now)
            }
            Store::Supabase(client) => {
                client
                    .record_provider_status(id, provider_status, status, now)
                    .await
            }
        }
    }

    pub async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>> {
        match self {
            Store::Sqlite(pool) => {
                let conn = pool.get()?;
                queries::get_subscriber(&conn, id)
            }
            Store::Supabase(client) => client.get_subscriber(id).await,
        }
    }

    /// Approve `charge` and add `days` of VIP to its subscriber, once.
    ///
    /// Returns the updated subscriber, or `None` if the charge had already
    /// been approved by an earlier notification.
    pub async fn approve_and_extend(
        &self,
        charge: &Charge,
        provider_status: &str,
        days: i64,
        now: i64,
    ) -> Result<Option<Subscriber>> {
        match self {
            Store::Sqlite(pool) => {
                let conn = pool.get()?;
                queries::approve_and_extend(&conn, charge, provider_status, days, now)
            }
            Store::Supabase(client) => {
                if !client.claim_approval(&charge.id, provider_status, now).await? {
                    client.reinstate_approval(&charge.id, provider_status, now).await?;
                    return Ok(None);
                }
                let subscriber = client
                    .extend_vip(&charge.subscriber, charge.payer_email.as_deref(), days, now)
                    .await?;
                Ok(Some(subscriber))
            }
        }
    }
}
