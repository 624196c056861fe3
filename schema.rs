/// MIGRATION 0001: Receipt ledger schema.
pub const MIGRATION_0001: &str = r#"
-- Merchants: one row per OCR-extracted store name. Each store number usually
-- gets its own row; `name` groups trips to the same chain.
CREATE TABLE IF NOT EXISTS merchants (
    merchant_id INTEGER PRIMARY KEY,
    ocr_name TEXT UNIQUE,
    address TEXT,
    name TEXT,
    phone TEXT,
    website TEXT,
    city TEXT,
    state TEXT,
    zip TEXT,
    country TEXT
);

-- Receipts: one row per shopping trip.
CREATE TABLE IF NOT EXISTS receipts (
    receipt_id INTEGER PRIMARY KEY,
    merchant_id INTEGER,
    trip_datetime TEXT UNIQUE, -- YYYY-MM-DD HH:MM:SS
    upload_datetime TEXT,
    subtotal REAL,
    tax REAL,
    total REAL,
    FOREIGN KEY (merchant_id) REFERENCES merchants (merchant_id)
);

-- Items: catalog entries, distinct per merchant.
CREATE TABLE IF NOT EXISTS items (
    item_id INTEGER PRIMARY KEY,
    merchant_id INTEGER,
    description TEXT,
    user_descr TEXT,
    FOREIGN KEY (merchant_id) REFERENCES merchants (merchant_id)
);

-- Purchases: one row per receipt line.
CREATE TABLE IF NOT EXISTS purchases (
    purchase_id INTEGER PRIMARY KEY,
    receipt_id INTEGER,
    merchant_id INTEGER,
    item_id INTEGER,
    item_cost REAL,
    discount REAL,
    quantity REAL,
    unit_price REAL,
    flag TEXT,
    notes TEXT,
    creditor INTEGER,
    debtor INTEGER,
    debt_multiplier REAL,
    FOREIGN KEY (receipt_id) REFERENCES receipts (receipt_id),
    FOREIGN KEY (merchant_id) REFERENCES merchants (merchant_id),
    FOREIGN KEY (item_id) REFERENCES items (item_id),
    FOREIGN KEY (creditor) REFERENCES participants (participant_id),
    FOREIGN KEY (debtor) REFERENCES participants (participant_id)
);

-- Participants: people costs are shared with.
CREATE TABLE IF NOT EXISTS participants (
    participant_id INTEGER PRIMARY KEY,
    name TEXT,
    email TEXT UNIQUE
);

-- Shared payments: amount owed per (receipt, debtor, creditor).
CREATE TABLE IF NOT EXISTS shared_payments (
    shared_payment_id INTEGER PRIMARY KEY,
    receipt_id INTEGER,
    debtor INTEGER,
    creditor INTEGER,
    amount_owed REAL,
    is_paid INTEGER NOT NULL DEFAULT 0, -- boolean
    paid_datetime TEXT,
    FOREIGN KEY (receipt_id) REFERENCES receipts (receipt_id),
    FOREIGN KEY (debtor) REFERENCES participants (participant_id),
    FOREIGN KEY (creditor) REFERENCES participants (participant_id)
);

CREATE INDEX IF NOT EXISTS idx_items_description_merchant ON items (description, merchant_id);
CREATE INDEX IF NOT EXISTS idx_purchases_receipt_id ON purchases (receipt_id);
CREATE INDEX IF NOT EXISTS idx_shared_payments_receipt_id ON shared_payments (receipt_id);

-- Stamp paid_datetime on the unpaid -> paid transition only.
CREATE TRIGGER IF NOT EXISTS update_date_trigger
AFTER UPDATE OF is_paid ON shared_payments
WHEN new.is_paid = 1 AND (old.is_paid IS NULL OR old.is_paid = 0)
BEGIN
    UPDATE shared_payments
    SET paid_datetime = DATETIME('now')
    WHERE shared_payment_id = new.shared_payment_id;
END;

-- Reject a second receipt for the same trip before the UNIQUE check runs.
CREATE TRIGGER IF NOT EXISTS check_duplicate_trip_datetime
BEFORE INSERT ON receipts
BEGIN
    SELECT CASE
    WHEN EXISTS (SELECT 1 FROM receipts WHERE trip_datetime = NEW.trip_datetime) THEN
        RAISE(ABORT, 'Duplicate trip_datetime detected. Record not inserted.')
    END;
END;
"#;
