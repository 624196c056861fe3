use crate::error::{Error, Result};
use crate::models::MerchantRecord;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull, NoneAsEmptyString, PickFirst};
use std::fmt;
use std::path::Path;

pub const TRIP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Two-digit years first: `%Y` would also accept "24" as the year 24.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%d.%m.%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p", "%I:%M%p"];

/// Top level of a stored OCR response.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OcrDocument {
    pub success: Option<bool>,
    pub message: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub receipts: Vec<OcrReceipt>,
}

// Numeric fields arrive as numbers, numeric strings, `null` or `""`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OcrReceipt {
    pub merchant_name: Option<String>,
    pub merchant_address: Option<String>,
    pub merchant_phone: Option<String>,
    pub merchant_website: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    #[serde_as(as = "PickFirst<(Option<_>, NoneAsEmptyString)>")]
    #[serde(default)]
    pub subtotal: Option<f64>,
    #[serde_as(as = "PickFirst<(Option<_>, NoneAsEmptyString)>")]
    #[serde(default)]
    pub tax: Option<f64>,
    #[serde_as(as = "PickFirst<(Option<_>, NoneAsEmptyString)>")]
    #[serde(default)]
    pub total: Option<f64>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub items: Vec<OcrLineItem>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OcrLineItem {
    pub description: Option<String>,
    #[serde_as(as = "PickFirst<(Option<_>, NoneAsEmptyString)>")]
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde_as(as = "PickFirst<(Option<_>, NoneAsEmptyString)>")]
    #[serde(default)]
    pub qty: Option<f64>,
    #[serde(rename = "unitPrice")]
    #[serde_as(as = "PickFirst<(Option<_>, NoneAsEmptyString)>")]
    #[serde(default)]
    pub unit_price: Option<f64>,
    pub flags: Option<String>,
    pub remarks: Option<String>,
}

impl OcrDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Only the first receipt of a response is ingested.
    pub fn into_first_receipt(self) -> Result<OcrReceipt> {
        if self.success == Some(false) {
            log::warn!("OCR service reported failure: {}", self.message.as_deref().unwrap_or(""));
        }
        let message = self.message.unwrap_or_default();
        self.receipts.into_iter().next().ok_or_else(|| {
            Error::MalformedReceipt(format!("OCR response contains no receipts {message}").trim_end().to_string())
        })
    }
}

/// A receipt line with canonical field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub item_cost: f64,
    pub discount: f64,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub flag: Option<String>,
    pub notes: Option<String>,
}

impl LineItem {
    pub fn is_discount(&self) -> bool {
        self.item_cost < 0.0
    }
}

/// A negative line folded into the discount of the line printed directly above it.
///
/// The pairing is positional: receipts are assumed to print a discount right
/// after the item it applies to. Nothing in the OCR output links the two.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountFold {
    pub discount_index: usize,
    pub target_index: usize,
    pub amount: f64,
    pub discount_description: String,
    pub target_description: String,
}

impl fmt::Display for DiscountFold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delete line {} `{}` and write {:.2} to the discount of line {} `{}`",
            self.discount_index,
            self.discount_description,
            self.amount,
            self.target_index,
            self.target_description
        )
    }
}

pub fn merchant_record(receipt: &OcrReceipt) -> Result<MerchantRecord> {
    let ocr_name = receipt
        .merchant_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::MalformedReceipt("receipt has no merchant name".into()))?;

    Ok(MerchantRecord {
        merchant_id: None,
        ocr_name: ocr_name.to_string(),
        address: receipt.merchant_address.clone(),
        name: None,
        phone: receipt.merchant_phone.clone(),
        website: receipt.merchant_website.clone(),
        city: receipt.city.clone(),
        state: receipt.state.clone(),
        zip: receipt.zip.clone(),
        country: receipt.country.clone(),
    })
}

/// Fuses the receipt's date and time into the trip identifier.
pub fn trip_datetime(date: Option<&str>, time: Option<&str>) -> Result<String> {
    let date = date
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| Error::MalformedReceipt("receipt has no date".into()))?;
    let time = time
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::MalformedReceipt(format!("receipt dated {date} has no time")))?;

    let parsed_date = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date, fmt).ok())
        .ok_or_else(|| Error::MalformedReceipt(format!("unrecognized receipt date `{date}`")))?;
    let parsed_time = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(time, fmt).ok())
        .ok_or_else(|| Error::MalformedReceipt(format!("unrecognized receipt time `{time}`")))?;

    Ok(NaiveDateTime::new(parsed_date, parsed_time)
        .format(TRIP_FORMAT)
        .to_string())
}

pub fn normalize_line_items(items: &[OcrLineItem]) -> Result<Vec<LineItem>> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let item_cost = item
                .amount
                .filter(|a| a.is_finite())
                .ok_or_else(|| Error::MalformedReceipt(format!("line {idx} has no amount")))?;
            let description = item
                .description
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            if description.is_empty() && item_cost >= 0.0 {
                return Err(Error::MalformedReceipt(format!(
                    "line {idx} ({item_cost:.2}) has no description"
                )));
            }
            Ok(LineItem {
                description,
                item_cost,
                discount: 0.0,
                quantity: item.qty,
                unit_price: item.unit_price,
                flag: item.flags.clone(),
                notes: item.remarks.clone(),
            })
        })
        .collect()
}

/// Pairs every negative line with the line directly above it.
pub fn plan_discount_folds(items: &[LineItem]) -> Result<Vec<DiscountFold>> {
    let mut folds = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        if !item.is_discount() {
            continue;
        }
        let target_index = idx.checked_sub(1).ok_or_else(|| {
            Error::MalformedReceipt(format!(
                "discount line `{}` ({:.2}) has no item above it",
                item.description, item.item_cost
            ))
        })?;
        let target = &items[target_index];
        if target.is_discount() {
            return Err(Error::MalformedReceipt(format!(
                "discount line {idx} follows another discount line"
            )));
        }
        folds.push(DiscountFold {
            discount_index: idx,
            target_index,
            amount: item.item_cost,
            discount_description: item.description.clone(),
            target_description: target.description.clone(),
        });
    }
    Ok(folds)
}

/// Writes each fold's amount into its target line and drops the discount lines.
pub fn apply_discount_folds(mut items: Vec<LineItem>, folds: &[DiscountFold]) -> Vec<LineItem> {
    for fold in folds {
        if let Some(target) = items.get_mut(fold.target_index) {
            target.discount += fold.amount;
        }
    }
    items
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !folds.iter().any(|fold| fold.discount_index == *idx))
        .map(|(_, item)| item)
        .collect()
}
