use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MerchantRecord {
    pub merchant_id: Option<i64>,
    pub ocr_name: String,
    pub address: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    pub item_id: Option<i64>,
    pub merchant_id: i64,
    pub description: String,
    pub user_descr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptRecord {
    pub receipt_id: Option<i64>,
    pub merchant_id: i64,
    pub trip_datetime: String,
    pub upload_datetime: String,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseRecord {
    pub purchase_id: Option<i64>,
    pub receipt_id: i64,
    pub merchant_id: i64,
    pub item_id: Option<i64>,
    pub item_cost: f64,
    pub discount: f64,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub flag: Option<String>,
    pub notes: Option<String>,
    pub creditor: i64,
    pub debtor: i64,
    pub debt_multiplier: f64,
}

impl PurchaseRecord {
    pub fn net_cost(&self) -> f64 {
        self.item_cost + self.discount
    }

    /// The part of this line the debtor owes the creditor.
    pub fn final_price(&self) -> f64 {
        self.net_cost() * self.debt_multiplier
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantRecord {
    pub participant_id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedPaymentRecord {
    pub shared_payment_id: Option<i64>,
    pub receipt_id: i64,
    pub debtor: i64,
    pub creditor: i64,
    pub amount_owed: f64,
    pub is_paid: bool,
    pub paid_datetime: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportRow {
    pub description: String,
    pub item_cost: f64,
    pub discount: f64,
    pub net_cost: f64,
    pub debt_fraction: f64,
    pub creditor_name: String,
    pub debtor_name: String,
    pub trip_datetime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestSummary {
    pub merchant_id: i64,
    pub receipt_id: i64,
    pub trip_datetime: String,
    pub new_items: usize,
    pub purchases: usize,
    pub shared_payments: Vec<SharedPaymentRecord>,
}
