use rusqlite::{Connection, OptionalExtension, Params, Row, types::Type};

use crate::error::Result;
use crate::models::{Charge, ChargeStatus, Subscriber};

pub const CHARGE_COLS: &str = "id, provider_payment_id, subscriber, payer_email, amount_cents, \
     description, status, provider_status, pix_code, qr_code_base64, ticket_url, created_at, \
     updated_at, approved_at, expires_at";

pub const SUBSCRIBER_COLS: &str = "id, email, vip_expires_at, created_at, updated_at";

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

impl FromRow for Charge {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status: String = row.get(6)?;
        let status = status.parse::<ChargeStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
        })?;

        Ok(Charge {
            id: row.get(0)?,
            provider_payment_id: row.get(1)?,
            subscriber: row.get(2)?,
            payer_email: row.get(3)?,
            amount_cents: row.get(4)?,
            description: row.get(5)?,
            status,
            provider_status: row.get(7)?,
            pix_code: row.get(8)?,
            qr_code_base64: row.get(9)?,
            ticket_url: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
            approved_at: row.get(13)?,
            expires_at: row.get(14)?,
        })
    }
}

impl FromRow for Subscriber {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscriber {
            id: row.get(0)?,
            email: row.get(1)?,
            vip_expires_at: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

pub fn query_one<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>> {
    Ok(conn.query_row(sql, params, |row| T::from_row(row)).optional()?)
}

pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| T::from_row(row))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
