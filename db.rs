use crate::config::ParticipantSeed;
use crate::error::{Error, Result};
use crate::models::{
    ItemRecord, MerchantRecord, ParticipantRecord, PurchaseRecord, ReceiptRecord, ReportRow,
    SharedPaymentRecord,
};
use crate::schema;
use rusqlite::{ffi, params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const LATEST_RECEIPT: &str = "(SELECT receipt_id FROM receipts ORDER BY receipt_id DESC LIMIT 1)";

/// Handle on the ledger database. Every operation opens its own connection,
/// commits, and closes it before returning.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

/// Creates the database file if needed, applies the schema and seeds participants.
pub fn init_database(db_path: &Path, participants: &[ParticipantSeed]) -> Result<Store> {
    log::info!("Database path: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let store = Store::new(db_path);
    let mut conn = store.connect()?;
    run_migrations(&conn)?;
    seed_participants(&mut conn, participants)?;
    Ok(store)
}

fn run_migrations(connection: &Connection) -> Result<()> {
    log::info!("Running database migrations...");
    connection.execute_batch(schema::MIGRATION_0001)?;
    log::info!("Migrations applied successfully.");
    Ok(())
}

fn seed_participants(conn: &mut Connection, participants: &[ParticipantSeed]) -> Result<()> {
    let tx = conn.transaction()?;
    let mut added = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO participants (name, email)
             SELECT ?1, ?2
             WHERE NOT EXISTS (
                 SELECT 1 FROM participants
                 WHERE name = ?1 OR (?2 IS NOT NULL AND email = ?2)
             )",
        )?;
        for seed in participants {
            added += stmt.execute(params![seed.name, seed.email])?;
        }
    }
    tx.commit()?;
    if added > 0 {
        log::info!("Seeded {added} participant(s)");
    }
    Ok(())
}

fn has_extended_code(err: &rusqlite::Error, codes: &[std::os::raw::c_int]) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if codes.contains(&e.extended_code))
}

/// A UNIQUE clash on `trip_datetime`, or the trigger that aborts the insert first.
fn is_duplicate_trip(err: &rusqlite::Error) -> bool {
    has_extended_code(err, &[ffi::SQLITE_CONSTRAINT_UNIQUE, ffi::SQLITE_CONSTRAINT_TRIGGER])
}

fn check_amount(what: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{what} must be a finite number, got {value}")))
    }
}

fn check_optional_amount(what: &str, value: Option<f64>) -> Result<()> {
    value.map_or(Ok(()), |v| check_amount(what, v))
}

fn validate_merchant(merchant: &MerchantRecord) -> Result<()> {
    if merchant.ocr_name.trim().is_empty() {
        return Err(Error::InvalidInput("merchant ocr_name is empty".into()));
    }
    Ok(())
}

fn validate_item(item: &ItemRecord) -> Result<()> {
    if item.description.trim().is_empty() {
        return Err(Error::InvalidInput(format!(
            "item for merchant {} has an empty description",
            item.merchant_id
        )));
    }
    Ok(())
}

fn validate_receipt(receipt: &ReceiptRecord) -> Result<()> {
    if receipt.trip_datetime.trim().is_empty() {
        return Err(Error::InvalidInput("receipt trip_datetime is empty".into()));
    }
    check_optional_amount("subtotal", receipt.subtotal)?;
    check_optional_amount("tax", receipt.tax)?;
    check_optional_amount("total", receipt.total)
}

fn validate_purchase(purchase: &PurchaseRecord) -> Result<()> {
    check_amount("item_cost", purchase.item_cost)?;
    check_amount("discount", purchase.discount)?;
    check_optional_amount("quantity", purchase.quantity)?;
    check_optional_amount("unit_price", purchase.unit_price)?;
    if !(0.0..=1.0).contains(&purchase.debt_multiplier) {
        return Err(Error::InvalidInput(format!(
            "debt_multiplier must be within 0..=1, got {}",
            purchase.debt_multiplier
        )));
    }
    Ok(())
}

fn validate_shared_payment(payment: &SharedPaymentRecord) -> Result<()> {
    if payment.debtor == payment.creditor {
        return Err(Error::InvalidInput(format!(
            "participant {} cannot owe themselves",
            payment.debtor
        )));
    }
    check_amount("amount_owed", payment.amount_owed)
}

fn receipt_from_row(row: &Row) -> rusqlite::Result<ReceiptRecord> {
    Ok(ReceiptRecord {
        receipt_id: row.get(0)?,
        merchant_id: row.get(1)?,
        trip_datetime: row.get(2)?,
        upload_datetime: row.get(3)?,
        subtotal: row.get(4)?,
        tax: row.get(5)?,
        total: row.get(6)?,
    })
}

fn shared_payment_from_row(row: &Row) -> rusqlite::Result<SharedPaymentRecord> {
    Ok(SharedPaymentRecord {
        shared_payment_id: row.get(0)?,
        receipt_id: row.get(1)?,
        debtor: row.get(2)?,
        creditor: row.get(3)?,
        amount_owed: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        is_paid: row.get::<_, Option<bool>>(5)?.unwrap_or(false),
        paid_datetime: row.get(6)?,
    })
}

fn purchase_from_row(row: &Row) -> rusqlite::Result<PurchaseRecord> {
    Ok(PurchaseRecord {
        purchase_id: row.get(0)?,
        receipt_id: row.get(1)?,
        merchant_id: row.get(2)?,
        item_id: row.get(3)?,
        item_cost: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        discount: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
        quantity: row.get(6)?,
        unit_price: row.get(7)?,
        flag: row.get(8)?,
        notes: row.get(9)?,
        creditor: row.get(10)?,
        debtor: row.get(11)?,
        debt_multiplier: row.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
    })
}

const SHARED_PAYMENT_COLUMNS: &str =
    "shared_payment_id, receipt_id, debtor, creditor, amount_owed, is_paid, paid_datetime";

const PURCHASE_COLUMNS: &str = "purchase_id, receipt_id, merchant_id, item_id, item_cost, discount, \
     quantity, unit_price, flag, notes, creditor, debtor, debt_multiplier";

impl Store {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Foreign keys are enforced on every connection, whatever the SQLite build default.
    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }

    /// Inserts merchants, keeping the first row seen for each OCR name.
    pub fn insert_merchants(&self, merchants: &[MerchantRecord]) -> Result<usize> {
        merchants.iter().try_for_each(validate_merchant)?;
        log::debug!("opening connection to merchants");
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO merchants
                    (merchant_id, ocr_name, address, name, phone, website, city, state, zip, country)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for m in merchants {
                inserted += stmt.execute(params![
                    m.merchant_id,
                    m.ocr_name,
                    m.address,
                    m.name,
                    m.phone,
                    m.website,
                    m.city,
                    m.state,
                    m.zip,
                    m.country
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn insert_items(&self, items: &[ItemRecord]) -> Result<usize> {
        items.iter().try_for_each(validate_item)?;
        log::debug!("opening connection to items");
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO items (item_id, merchant_id, description, user_descr)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for item in items {
                inserted += stmt.execute(params![
                    item.item_id,
                    item.merchant_id,
                    item.description,
                    item.user_descr
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Inserts receipts. A trip timestamp that already exists aborts the whole batch.
    pub fn insert_receipts(&self, receipts: &[ReceiptRecord]) -> Result<usize> {
        receipts.iter().try_for_each(validate_receipt)?;
        log::debug!("opening connection to receipts");
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR ABORT INTO receipts
                    (receipt_id, merchant_id, trip_datetime, upload_datetime, subtotal, tax, total)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for r in receipts {
                stmt.execute(params![
                    r.receipt_id,
                    r.merchant_id,
                    r.trip_datetime,
                    r.upload_datetime,
                    r.subtotal,
                    r.tax,
                    r.total
                ])
                .map_err(|err| {
                    if is_duplicate_trip(&err) {
                        log::error!("Receipt for trip {} already recorded: {}", r.trip_datetime, err);
                        Error::DuplicateTrip(r.trip_datetime.clone())
                    } else {
                        Error::Database(err)
                    }
                })?;
            }
        }
        tx.commit()?;
        Ok(receipts.len())
    }

    pub fn insert_purchases(&self, purchases: &[PurchaseRecord]) -> Result<usize> {
        purchases.iter().try_for_each(validate_purchase)?;
        log::debug!("opening connection to purchases");
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO purchases ({PURCHASE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ))?;
            for p in purchases {
                stmt.execute(params![
                    p.purchase_id,
                    p.receipt_id,
                    p.merchant_id,
                    p.item_id,
                    p.item_cost,
                    p.discount,
                    p.quantity,
                    p.unit_price,
                    p.flag,
                    p.notes,
                    p.creditor,
                    p.debtor,
                    p.debt_multiplier
                ])?;
            }
        }
        tx.commit()?;
        Ok(purchases.len())
    }

    pub fn insert_shared_payments(&self, payments: &[SharedPaymentRecord]) -> Result<usize> {
        payments.iter().try_for_each(validate_shared_payment)?;
        log::debug!("opening connection to shared_payments");
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO shared_payments ({SHARED_PAYMENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ))?;
            for sp in payments {
                stmt.execute(params![
                    sp.shared_payment_id,
                    sp.receipt_id,
                    sp.debtor,
                    sp.creditor,
                    sp.amount_owed,
                    sp.is_paid,
                    sp.paid_datetime
                ])?;
            }
        }
        tx.commit()?;
        Ok(payments.len())
    }

    pub fn get_merchant_id(&self, ocr_name: &str) -> Result<i64> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT merchant_id FROM merchants WHERE ocr_name = ?1",
            params![ocr_name],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("merchant `{ocr_name}`")))
    }

    pub fn get_trip_id(&self, trip_datetime: &str) -> Result<i64> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT receipt_id FROM receipts WHERE trip_datetime = ?1",
            params![trip_datetime],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("receipt for trip {trip_datetime}")))
    }

    /// Maps each description to its item id for one merchant.
    pub fn get_item_ids(&self, descriptions: &[String], merchant_id: i64) -> Result<HashMap<String, i64>> {
        if descriptions.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.connect()?;
        let placeholders = vec!["?"; descriptions.len()].join(",");
        let sql = format!(
            "SELECT description, MIN(item_id) FROM items
             WHERE description IN ({placeholders}) AND merchant_id = ?
             GROUP BY description"
        );
        let mut stmt = conn.prepare(&sql)?;
        let values = descriptions
            .iter()
            .map(|d| rusqlite::types::Value::Text(d.clone()))
            .chain(std::iter::once(rusqlite::types::Value::Integer(merchant_id)));
        let rows = stmt.query_map(params_from_iter(values), |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut ids = HashMap::new();
        for row in rows {
            let (description, id): (String, i64) = row?;
            ids.insert(description, id);
        }
        Ok(ids)
    }

    /// Returns the descriptions not yet cataloged for this merchant, once each, in receipt order.
    pub fn new_items(&self, merchant_id: i64, descriptions: &[String]) -> Result<Vec<ItemRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT description FROM items WHERE merchant_id = ?1")?;
        let cataloged = stmt
            .query_map(params![merchant_id], |row| row.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut seen: HashSet<String> = cataloged.into_iter().flatten().collect();

        Ok(descriptions
            .iter()
            .filter(|d| seen.insert((*d).clone()))
            .map(|description| ItemRecord {
                item_id: None,
                merchant_id,
                description: description.clone(),
                user_descr: None,
            })
            .collect())
    }

    pub fn list_items(&self) -> Result<Vec<ItemRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT item_id, merchant_id, description, user_descr FROM items ORDER BY item_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ItemRecord {
                item_id: row.get(0)?,
                merchant_id: row.get(1)?,
                description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                user_descr: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn purchases_for_receipt(&self, receipt_id: i64) -> Result<Vec<PurchaseRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE receipt_id = ?1 ORDER BY purchase_id"
        ))?;
        let rows = stmt.query_map(params![receipt_id], purchase_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Manual correction of one purchase line's discount.
    pub fn update_purchase_discount(&self, purchase_id: i64, discount: f64) -> Result<()> {
        check_amount("discount", discount)?;
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE purchases SET discount = ?1 WHERE purchase_id = ?2",
            params![discount, purchase_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("purchase {purchase_id}")));
        }
        Ok(())
    }

    /// Rewrites `amount_owed` on the receipt's shared payments owed by `debtor`
    /// from the current purchase lines.
    pub fn recalculate_shared_payment(&self, receipt_id: i64, debtor: i64) -> Result<usize> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE shared_payments
             SET amount_owed = (
                 SELECT ROUND(COALESCE(SUM((p.item_cost + p.discount) * p.debt_multiplier), 0), 2)
                 FROM purchases p
                 WHERE p.receipt_id = shared_payments.receipt_id
                   AND p.debtor = shared_payments.debtor
                   AND p.creditor = shared_payments.creditor
             )
             WHERE receipt_id = ?1 AND debtor = ?2",
            params![receipt_id, debtor],
        )?;
        if updated == 0 {
            log::warn!("No shared payments owed by participant {debtor} on receipt {receipt_id}");
        }
        Ok(updated)
    }

    pub fn set_paid(&self, shared_payment_id: i64, paid: bool) -> Result<()> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE shared_payments SET is_paid = ?1 WHERE shared_payment_id = ?2",
            params![paid, shared_payment_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("shared payment {shared_payment_id}")));
        }
        Ok(())
    }

    pub fn shared_payment(&self, shared_payment_id: i64) -> Result<Option<SharedPaymentRecord>> {
        let conn = self.connect()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {SHARED_PAYMENT_COLUMNS} FROM shared_payments WHERE shared_payment_id = ?1"
                ),
                params![shared_payment_id],
                shared_payment_from_row,
            )
            .optional()?)
    }

    pub fn shared_payments_for_receipt(&self, receipt_id: i64) -> Result<Vec<SharedPaymentRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SHARED_PAYMENT_COLUMNS} FROM shared_payments
             WHERE receipt_id = ?1 ORDER BY shared_payment_id"
        ))?;
        let rows = stmt.query_map(params![receipt_id], shared_payment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Subtotal of the latest receipt, re-summed from its purchase lines.
    pub fn recent_subtotal(&self) -> Result<Option<f64>> {
        let conn = self.connect()?;
        Ok(conn.query_row(
            &format!(
                "SELECT SUM(item_cost + discount) FROM purchases WHERE receipt_id = {LATEST_RECEIPT}"
            ),
            [],
            |row| row.get(0),
        )?)
    }

    pub fn recent_receipt(&self) -> Result<Option<ReceiptRecord>> {
        let conn = self.connect()?;
        Ok(conn
            .query_row(
                "SELECT receipt_id, merchant_id, trip_datetime, upload_datetime, subtotal, tax, total
                 FROM receipts ORDER BY receipt_id DESC LIMIT 1",
                [],
                receipt_from_row,
            )
            .optional()?)
    }

    pub fn recent_shared_payments(&self) -> Result<Vec<SharedPaymentRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SHARED_PAYMENT_COLUMNS} FROM shared_payments
             WHERE receipt_id = {LATEST_RECEIPT} ORDER BY shared_payment_id"
        ))?;
        let rows = stmt.query_map([], shared_payment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every purchase line of the latest receipt with names resolved.
    pub fn report(&self) -> Result<Vec<ReportRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT
                 i.description,
                 p.item_cost,
                 p.discount,
                 (p.item_cost + p.discount) AS net_cost,
                 p.debt_multiplier AS debt_fraction,
                 p1.name AS creditor_name,
                 p2.name AS debtor_name,
                 r.trip_datetime
             FROM purchases p
                 INNER JOIN merchants m ON p.merchant_id = m.merchant_id
                 INNER JOIN receipts r ON p.receipt_id = r.receipt_id
                 INNER JOIN items i ON p.item_id = i.item_id
                 INNER JOIN participants p1 ON p.creditor = p1.participant_id
                 INNER JOIN participants p2 ON p.debtor = p2.participant_id
             WHERE r.receipt_id = {LATEST_RECEIPT}
             ORDER BY p.purchase_id"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(ReportRow {
                description: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                item_cost: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                discount: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                net_cost: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                debt_fraction: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                creditor_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                debtor_name: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                trip_datetime: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn add_participant(&self, name: &str, email: Option<&str>) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("participant name is empty".into()));
        }
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO participants (name, email) VALUES (?1, ?2)",
            params![name.trim(), email],
        )
        .map_err(|err| {
            if has_extended_code(&err, &[ffi::SQLITE_CONSTRAINT_UNIQUE]) {
                Error::InvalidInput(format!("a participant with email {} exists", email.unwrap_or("")))
            } else {
                Error::Database(err)
            }
        })?;
        Ok(conn.last_insert_rowid())
    }

    /// Fails with `NotFound` unless every id names a participant.
    pub fn require_participants(&self, ids: &[i64]) -> Result<()> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT 1 FROM participants WHERE participant_id = ?1")?;
        for id in ids {
            if !stmt.exists(params![id])? {
                return Err(Error::NotFound(format!("participant {id}")));
            }
        }
        Ok(())
    }

    pub fn list_participants(&self) -> Result<Vec<ParticipantRecord>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT participant_id, name, email FROM participants ORDER BY participant_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(ParticipantRecord {
                participant_id: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                email: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Settings;

    pub(crate) fn temp_store() -> Store {
        let path = std::env::temp_dir().join(format!("st_ledger_{}.db", uuid::Uuid::new_v4()));
        init_database(&path, &Settings::default().participants).unwrap()
    }

    fn merchant(name: &str) -> MerchantRecord {
        MerchantRecord {
            ocr_name: name.to_string(),
            ..MerchantRecord::default()
        }
    }

    fn receipt(merchant_id: i64, trip: &str) -> ReceiptRecord {
        ReceiptRecord {
            receipt_id: None,
            merchant_id,
            trip_datetime: trip.to_string(),
            upload_datetime: "2024-03-10 08:00:00".to_string(),
            subtotal: Some(15.0),
            tax: Some(1.0),
            total: Some(16.0),
        }
    }

    fn purchase(receipt_id: i64, cost: f64, discount: f64, debtor: i64, mult: f64) -> PurchaseRecord {
        PurchaseRecord {
            purchase_id: None,
            receipt_id,
            merchant_id: 1,
            item_id: None,
            item_cost: cost,
            discount,
            quantity: Some(1.0),
            unit_price: Some(cost),
            flag: None,
            notes: None,
            creditor: 2,
            debtor,
            debt_multiplier: mult,
        }
    }

    fn unpaid(receipt_id: i64, amount: f64) -> SharedPaymentRecord {
        SharedPaymentRecord {
            shared_payment_id: None,
            receipt_id,
            debtor: 1,
            creditor: 2,
            amount_owed: amount,
            is_paid: false,
            paid_datetime: None,
        }
    }

    /// Inserts the merchant and receipt a trip's child rows point at.
    fn store_receipt(store: &Store, trip: &str) -> i64 {
        store.insert_merchants(&[merchant("COSTCO #1")]).unwrap();
        let merchant_id = store.get_merchant_id("COSTCO #1").unwrap();
        store.insert_receipts(&[receipt(merchant_id, trip)]).unwrap();
        store.get_trip_id(trip).unwrap()
    }

    fn row_count(store: &Store, table: &str) -> i64 {
        let conn = store.connect().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn schema_init_is_idempotent() {
        let store = temp_store();
        let again = init_database(store.path(), &Settings::default().participants).unwrap();
        assert_eq!(again.list_participants().unwrap().len(), 2);
        let names: Vec<String> = again.list_participants().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Me".to_string(), "Friend".to_string()]);
    }

    #[test]
    fn duplicate_ocr_name_keeps_first_merchant() {
        let store = temp_store();
        let first = MerchantRecord {
            address: Some("first".into()),
            ..merchant("COSTCO #1")
        };
        let second = MerchantRecord {
            address: Some("second".into()),
            ..merchant("COSTCO #1")
        };
        assert_eq!(store.insert_merchants(&[first]).unwrap(), 1);
        assert_eq!(store.insert_merchants(&[second]).unwrap(), 0);
        assert_eq!(row_count(&store, "merchants"), 1);

        let conn = store.connect().unwrap();
        let address: String = conn
            .query_row("SELECT address FROM merchants", [], |row| row.get(0))
            .unwrap();
        assert_eq!(address, "first");
    }

    #[test]
    fn duplicate_trip_is_rejected() {
        let store = temp_store();
        let receipt_id = store_receipt(&store, "2024-03-09 14:05:00");
        let merchant_id = store.get_merchant_id("COSTCO #1").unwrap();
        let err = store
            .insert_receipts(&[receipt(merchant_id, "2024-03-09 14:05:00")])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTrip(ref trip) if trip == "2024-03-09 14:05:00"));
        assert_eq!(row_count(&store, "receipts"), 1);
        assert_eq!(store.get_trip_id("2024-03-09 14:05:00").unwrap(), receipt_id);
    }

    #[test]
    fn receipt_for_unknown_merchant_is_not_a_duplicate() {
        let store = temp_store();
        let err = store.insert_receipts(&[receipt(42, "2024-01-01 10:00:00")]).unwrap_err();
        match err {
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                assert_eq!(e.extended_code, ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
            }
            other => panic!("expected a foreign key failure, got {other:?}"),
        }
        assert_eq!(row_count(&store, "receipts"), 0);
    }

    #[test]
    fn purchases_need_known_participants() {
        let store = temp_store();
        let receipt_id = store_receipt(&store, "2024-03-09 14:05:00");
        assert!(matches!(
            store.insert_purchases(&[purchase(receipt_id, 5.0, 0.0, 9, 1.0)]),
            Err(Error::Database(_))
        ));
        assert_eq!(row_count(&store, "purchases"), 0);

        store.require_participants(&[1, 2]).unwrap();
        assert!(matches!(store.require_participants(&[1, 9]), Err(Error::NotFound(_))));
    }

    #[test]
    fn invalid_rows_fail_before_touching_the_store() {
        let store = temp_store();
        let err = store
            .insert_merchants(&[merchant("OK"), merchant("  ")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(row_count(&store, "merchants"), 0);

        let mut self_debt = unpaid(1, 3.0);
        self_debt.creditor = 1;
        assert!(matches!(
            store.insert_shared_payments(&[self_debt]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.insert_purchases(&[purchase(1, f64::NAN, 0.0, 1, 0.4)]),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(row_count(&store, "shared_payments"), 0);
        assert_eq!(row_count(&store, "purchases"), 0);
    }

    #[test]
    fn new_items_skip_cataloged_and_repeated_descriptions() {
        let store = temp_store();
        store.insert_merchants(&[merchant("COSTCO #1"), merchant("COSTCO #2")]).unwrap();
        store
            .insert_items(&[ItemRecord {
                item_id: None,
                merchant_id: 1,
                description: "MILK".into(),
                user_descr: None,
            }])
            .unwrap();
        let descriptions: Vec<String> = ["MILK", "EGGS", "EGGS", "BREAD"].iter().map(|s| s.to_string()).collect();
        let fresh = store.new_items(1, &descriptions).unwrap();
        let names: Vec<&str> = fresh.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(names, vec!["EGGS", "BREAD"]);

        // same description at another merchant is a different item
        assert_eq!(store.new_items(2, &descriptions).unwrap().len(), 3);

        store.insert_items(&fresh).unwrap();
        let ids = store.get_item_ids(&descriptions, 1).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(store.get_item_ids(&descriptions, 2).unwrap().is_empty());
    }

    #[test]
    fn paid_timestamp_only_set_on_transition() {
        let store = temp_store();
        let receipt_id = store_receipt(&store, "2024-03-09 14:05:00");
        store.insert_shared_payments(&[unpaid(receipt_id, 5.0)]).unwrap();

        let conn = store.connect().unwrap();
        let sp_id: i64 = conn
            .query_row("SELECT shared_payment_id FROM shared_payments", [], |row| row.get(0))
            .unwrap();
        drop(conn);

        // other updates leave it alone
        let conn = store.connect().unwrap();
        conn.execute("UPDATE shared_payments SET amount_owed = 6.0", []).unwrap();
        drop(conn);
        assert!(store.shared_payment(sp_id).unwrap().unwrap().paid_datetime.is_none());

        store.set_paid(sp_id, false).unwrap();
        assert!(store.shared_payment(sp_id).unwrap().unwrap().paid_datetime.is_none());

        store.set_paid(sp_id, true).unwrap();
        let paid = store.shared_payment(sp_id).unwrap().unwrap();
        assert!(paid.is_paid);
        assert!(paid.paid_datetime.is_some());

        let sentinel = "2000-01-01 00:00:00";
        let conn = store.connect().unwrap();
        conn.execute(
            "UPDATE shared_payments SET paid_datetime = ?1 WHERE shared_payment_id = ?2",
            params![sentinel, sp_id],
        )
        .unwrap();
        drop(conn);

        store.set_paid(sp_id, true).unwrap();
        assert_eq!(
            store.shared_payment(sp_id).unwrap().unwrap().paid_datetime.as_deref(),
            Some(sentinel)
        );
        let conn = store.connect().unwrap();
        conn.execute("UPDATE shared_payments SET amount_owed = 7.0", []).unwrap();
        drop(conn);
        assert_eq!(
            store.shared_payment(sp_id).unwrap().unwrap().paid_datetime.as_deref(),
            Some(sentinel)
        );

        assert!(matches!(store.set_paid(sp_id + 100, true), Err(Error::NotFound(_))));
    }

    #[test]
    fn recalculation_follows_edited_discount() {
        let store = temp_store();
        let receipt_id = store_receipt(&store, "2024-03-09 14:05:00");
        store
            .insert_purchases(&[
                purchase(receipt_id, 10.0, -2.0, 1, 0.4),
                purchase(receipt_id, 5.0, 0.0, 1, 1.0),
                purchase(receipt_id, 7.0, 0.0, 2, 1.0),
            ])
            .unwrap();
        store.insert_shared_payments(&[unpaid(receipt_id, 8.2)]).unwrap();

        let first = store.purchases_for_receipt(receipt_id).unwrap()[0].purchase_id.unwrap();
        store.update_purchase_discount(first, -5.0).unwrap();
        assert_eq!(store.recalculate_shared_payment(receipt_id, 1).unwrap(), 1);

        let expected: f64 = store
            .purchases_for_receipt(receipt_id)
            .unwrap()
            .iter()
            .filter(|p| p.debtor == 1)
            .map(|p| p.final_price())
            .sum();
        let owed = store.recent_shared_payments().unwrap()[0].amount_owed;
        assert!((owed - expected).abs() < 1e-9);
        assert!((owed - 7.0).abs() < 1e-9);
    }

    #[test]
    fn recent_queries_follow_latest_receipt() {
        let store = temp_store();
        assert!(store.recent_receipt().unwrap().is_none());
        assert!(store.recent_subtotal().unwrap().is_none());

        store_receipt(&store, "2024-03-01 10:00:00");
        let latest = store_receipt(&store, "2024-03-09 14:05:00");
        store
            .insert_purchases(&[purchase(latest, 10.0, -2.0, 1, 0.4), purchase(latest, 5.0, 0.0, 1, 1.0)])
            .unwrap();

        let recent = store.recent_receipt().unwrap().unwrap();
        assert_eq!(recent.receipt_id, Some(latest));
        assert_eq!(store.recent_subtotal().unwrap(), Some(13.0));
    }

    #[test]
    fn participant_emails_are_unique() {
        let store = temp_store();
        let id = store.add_participant("Sam", Some("sam@example.com")).unwrap();
        assert_eq!(id, 3);
        assert!(matches!(
            store.add_participant("Sammy", Some("sam@example.com")),
            Err(Error::InvalidInput(_))
        ));
    }
}
