use crate::config::CostShare;
use crate::db::Store;
use crate::error::{Error, Result};
use crate::ledger;
use crate::models::{IngestSummary, PurchaseRecord, ReceiptRecord};
use crate::receipt::{self, LineItem, OcrDocument, TRIP_FORMAT};
use crate::review::Reviewer;
use std::path::Path;

pub fn ingest_file(
    store: &Store,
    share: &CostShare,
    json_path: &Path,
    reviewer: &mut dyn Reviewer,
) -> Result<IngestSummary> {
    log::info!("Ingesting {}", json_path.display());
    let document = OcrDocument::load(json_path)?;
    ingest_document(store, share, document, reviewer)
}

fn draft_purchases(lines: &[LineItem], share: &CostShare) -> Vec<PurchaseRecord> {
    lines
        .iter()
        .map(|line| PurchaseRecord {
            purchase_id: None,
            receipt_id: 0,
            merchant_id: 0,
            item_id: None,
            item_cost: line.item_cost,
            discount: line.discount,
            quantity: line.quantity,
            unit_price: line.unit_price,
            flag: line.flag.clone(),
            notes: line.notes.clone(),
            creditor: share.creditor,
            debtor: share.debtor,
            debt_multiplier: share.debt_multiplier,
        })
        .collect()
}

/// Records one OCR'd receipt: merchant, new catalog items, the receipt, its
/// purchase lines and the shared payments they imply.
///
/// Everything that needs the reviewer or can reject the payload runs before
/// the first write. Later failures (a duplicate trip, most notably) leave the
/// merchant and item rows already committed.
pub fn ingest_document(
    store: &Store,
    share: &CostShare,
    document: OcrDocument,
    reviewer: &mut dyn Reviewer,
) -> Result<IngestSummary> {
    store.require_participants(&[share.creditor, share.debtor])?;
    let ocr_receipt = document.into_first_receipt()?;
    let trip_datetime = receipt::trip_datetime(ocr_receipt.date.as_deref(), ocr_receipt.time.as_deref())
        .map_err(|err| {
            log::error!("Error with date or time from receipt: {err}");
            err
        })?;
    let merchant = receipt::merchant_record(&ocr_receipt)?;

    let mut lines = receipt::normalize_line_items(&ocr_receipt.items)?;
    let folds = receipt::plan_discount_folds(&lines)?;
    if !folds.is_empty() {
        if !reviewer.approve_discount_folds(&lines, &folds)? {
            return Err(Error::Declined("discount rows were not folded".into()));
        }
        lines = receipt::apply_discount_folds(lines, &folds);
    }
    if lines.is_empty() {
        return Err(Error::MalformedReceipt(format!("trip {trip_datetime} has no purchase lines")));
    }

    let mut purchases = draft_purchases(&lines, share);
    let overrides = reviewer.share_overrides(&lines, &purchases)?;
    ledger::assign_shares(&mut purchases, share, &overrides)?;
    if !overrides.is_empty() {
        log::info!(
            "{} line(s) paid in full by the debtor, {} by the creditor",
            overrides.debtor_only.len(),
            overrides.creditor_only.len()
        );
    }

    store.insert_merchants(std::slice::from_ref(&merchant))?;
    let merchant_id = store.get_merchant_id(&merchant.ocr_name)?;

    let descriptions: Vec<String> = lines.iter().map(|l| l.description.clone()).collect();
    let new_items = store.new_items(merchant_id, &descriptions)?;
    if !new_items.is_empty() {
        store.insert_items(&new_items)?;
    }

    store.insert_receipts(&[ReceiptRecord {
        receipt_id: None,
        merchant_id,
        trip_datetime: trip_datetime.clone(),
        upload_datetime: chrono::Local::now().format(TRIP_FORMAT).to_string(),
        subtotal: ocr_receipt.subtotal,
        tax: ocr_receipt.tax,
        total: ocr_receipt.total,
    }])?;
    let receipt_id = store.get_trip_id(&trip_datetime)?;

    let item_ids = store.get_item_ids(&descriptions, merchant_id)?;
    for (purchase, line) in purchases.iter_mut().zip(&lines) {
        purchase.receipt_id = receipt_id;
        purchase.merchant_id = merchant_id;
        purchase.item_id = item_ids.get(&line.description).copied();
    }
    store.insert_purchases(&purchases)?;

    let shared_payments = ledger::shared_payments(receipt_id, &purchases);
    if !shared_payments.is_empty() {
        store.insert_shared_payments(&shared_payments)?;
    }
    log::info!("Finished ingesting receipt {receipt_id} ({trip_datetime})");

    Ok(IngestSummary {
        merchant_id,
        receipt_id,
        trip_datetime,
        new_items: new_items.len(),
        purchases: purchases.len(),
        shared_payments: store.shared_payments_for_receipt(receipt_id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::temp_store;
    use crate::ledger::ShareOverrides;
    use crate::receipt::DiscountFold;

    struct Scripted {
        approve: bool,
        overrides: ShareOverrides,
        fold_prompts: usize,
        seen_lines: usize,
    }

    impl Scripted {
        fn new(approve: bool, overrides: ShareOverrides) -> Self {
            Self {
                approve,
                overrides,
                fold_prompts: 0,
                seen_lines: 0,
            }
        }
    }

    impl Reviewer for Scripted {
        fn approve_discount_folds(&mut self, _items: &[LineItem], _folds: &[DiscountFold]) -> Result<bool> {
            self.fold_prompts += 1;
            Ok(self.approve)
        }

        fn share_overrides(&mut self, lines: &[LineItem], _purchases: &[PurchaseRecord]) -> Result<ShareOverrides> {
            self.seen_lines = lines.len();
            Ok(self.overrides.clone())
        }
    }

    fn document(time: Option<&str>) -> OcrDocument {
        let raw = serde_json::json!({
            "success": true,
            "receipts": [{
                "merchant_name": "COSTCO WHOLESALE #123",
                "merchant_address": "1 Main St",
                "city": "Austin", "state": "TX", "zip": "78701", "country": "US",
                "date": "2024-03-09",
                "time": time,
                "subtotal": 13.0, "tax": 1.07, "total": 14.07,
                "items": [
                    {"description": "KS WATER", "amount": 10.0, "qty": 1, "unitPrice": 10.0, "flags": "", "remarks": null},
                    {"description": "/1234", "amount": -2.0, "qty": null, "unitPrice": null, "flags": "", "remarks": null},
                    {"description": "BANANAS", "amount": 5.0, "qty": 1, "unitPrice": 5.0, "flags": "", "remarks": null}
                ]
            }]
        });
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn ingests_receipt_end_to_end() {
        let store = temp_store();
        let overrides = ShareOverrides {
            debtor_only: vec![1],
            creditor_only: vec![],
        };
        let mut reviewer = Scripted::new(true, overrides);
        let summary = ingest_document(&store, &CostShare::default(), document(Some("14:05:00")), &mut reviewer).unwrap();

        assert_eq!(reviewer.fold_prompts, 1);
        assert_eq!(reviewer.seen_lines, 2);
        assert_eq!(summary.trip_datetime, "2024-03-09 14:05:00");
        assert_eq!(summary.purchases, 2);
        assert_eq!(summary.new_items, 2);

        let purchases = store.purchases_for_receipt(summary.receipt_id).unwrap();
        assert_eq!(purchases.len(), 2);
        assert_eq!(purchases[0].discount, -2.0);
        assert!(purchases.iter().all(|p| p.item_id.is_some()));

        assert_eq!(summary.shared_payments.len(), 1);
        let sp = &summary.shared_payments[0];
        assert_eq!((sp.debtor, sp.creditor), (1, 2));
        assert!((sp.amount_owed - 8.2).abs() < 1e-9);
        assert!(!sp.is_paid);
        assert!(sp.paid_datetime.is_none());

        let report = store.report().unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].description, "KS WATER");
        assert_eq!(report[0].net_cost, 8.0);
        assert_eq!(report[0].creditor_name, "Friend");
        assert_eq!(report[0].debtor_name, "Me");
    }

    #[test]
    fn declined_fold_writes_nothing() {
        let store = temp_store();
        let mut reviewer = Scripted::new(false, ShareOverrides::default());
        let err = ingest_document(&store, &CostShare::default(), document(Some("14:05:00")), &mut reviewer).unwrap_err();
        assert!(matches!(err, Error::Declined(_)));
        assert!(store.list_items().unwrap().is_empty());
        assert!(store.recent_receipt().unwrap().is_none());
    }

    #[test]
    fn missing_time_aborts_before_any_write() {
        let store = temp_store();
        let mut reviewer = Scripted::new(true, ShareOverrides::default());
        let err = ingest_document(&store, &CostShare::default(), document(None), &mut reviewer).unwrap_err();
        assert!(matches!(err, Error::MalformedReceipt(_)));
        assert_eq!(reviewer.fold_prompts, 0);
        assert!(matches!(
            store.get_merchant_id("COSTCO WHOLESALE #123"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn second_ingest_of_same_trip_fails_and_reuses_catalog() {
        let store = temp_store();
        let mut reviewer = Scripted::new(true, ShareOverrides::default());
        let first = ingest_document(&store, &CostShare::default(), document(Some("14:05:00")), &mut reviewer).unwrap();

        let err = ingest_document(&store, &CostShare::default(), document(Some("14:05:00")), &mut reviewer).unwrap_err();
        assert!(matches!(err, Error::DuplicateTrip(_)));
        assert_eq!(store.purchases_for_receipt(first.receipt_id).unwrap().len(), 2);

        let second = ingest_document(&store, &CostShare::default(), document(Some("18:30")), &mut reviewer).unwrap();
        assert_eq!(second.new_items, 0);
        assert_eq!(second.merchant_id, first.merchant_id);
        assert_eq!(store.list_items().unwrap().len(), 2);
    }

    #[test]
    fn unknown_participant_in_cost_share_writes_nothing() {
        let store = temp_store();
        let share = CostShare {
            creditor: 3,
            ..CostShare::default()
        };
        let mut reviewer = Scripted::new(true, ShareOverrides::default());
        let err = ingest_document(&store, &share, document(Some("10:00:00")), &mut reviewer).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(reviewer.fold_prompts, 0);
        assert!(store.recent_receipt().unwrap().is_none());
        assert!(store.list_items().unwrap().is_empty());

        store.add_participant("Sam", None).unwrap();
        let summary = ingest_document(&store, &share, document(Some("10:00:00")), &mut reviewer).unwrap();
        assert_eq!(summary.shared_payments[0].creditor, 3);
    }

    #[test]
    fn creditor_only_lines_drop_out_of_the_ledger() {
        let store = temp_store();
        let overrides = ShareOverrides {
            debtor_only: vec![],
            creditor_only: vec![0, 1],
        };
        let mut reviewer = Scripted::new(true, overrides);
        let summary = ingest_document(&store, &CostShare::default(), document(Some("14:05:00")), &mut reviewer).unwrap();
        assert!(summary.shared_payments.is_empty());
        assert_eq!(summary.purchases, 2);
    }
}
