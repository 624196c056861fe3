use crate::models::{IngestSummary, ItemRecord, ParticipantRecord, ReceiptRecord, ReportRow, SharedPaymentRecord};
use std::fmt::Write;

fn money(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

pub fn render_report(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    let Some(first) = rows.first() else {
        return "No purchases recorded for the latest receipt.\n".to_string();
    };
    let _ = writeln!(out, "Trip {}", first.trip_datetime);
    let _ = writeln!(
        out,
        "{:<32} {:>9} {:>9} {:>9} {:>8}  {:<12} {:<12}",
        "description", "cost", "discount", "net", "fraction", "creditor", "debtor"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<32} {:>9.2} {:>9.2} {:>9.2} {:>8.2}  {:<12} {:<12}",
            row.description,
            row.item_cost,
            row.discount,
            row.net_cost,
            row.debt_fraction,
            row.creditor_name,
            row.debtor_name
        );
    }
    let net: f64 = rows.iter().map(|r| r.net_cost).sum();
    let _ = writeln!(out, "{:<32} {:>29.2}", "total", net);
    out
}

pub fn render_receipt(receipt: &ReceiptRecord) -> String {
    format!(
        "receipt {} merchant {} trip {} uploaded {} subtotal {} tax {} total {}\n",
        receipt.receipt_id.map(|id| id.to_string()).unwrap_or_default(),
        receipt.merchant_id,
        receipt.trip_datetime,
        receipt.upload_datetime,
        money(receipt.subtotal),
        money(receipt.tax),
        money(receipt.total)
    )
}

pub fn render_shared_payments(payments: &[SharedPaymentRecord]) -> String {
    if payments.is_empty() {
        return "No shared payments.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5} {:>8} {:>7} {:>9} {:>10}  {:<19}",
        "id", "receipt", "debtor", "creditor", "owed", "paid"
    );
    for sp in payments {
        let paid = match (&sp.paid_datetime, sp.is_paid) {
            (Some(at), _) => at.clone(),
            (None, true) => "yes".to_string(),
            (None, false) => "no".to_string(),
        };
        let _ = writeln!(
            out,
            "{:>5} {:>8} {:>7} {:>9} {:>10.2}  {:<19}",
            sp.shared_payment_id.unwrap_or_default(),
            sp.receipt_id,
            sp.debtor,
            sp.creditor,
            sp.amount_owed,
            paid
        );
    }
    out
}

pub fn render_items(items: &[ItemRecord]) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(
            out,
            "{:>5} {:>8}  {}{}",
            item.item_id.unwrap_or_default(),
            item.merchant_id,
            item.description,
            item.user_descr
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default()
        );
    }
    out
}

pub fn render_participants(participants: &[ParticipantRecord]) -> String {
    let mut out = String::new();
    for p in participants {
        let _ = writeln!(
            out,
            "{:>5}  {:<20} {}",
            p.participant_id.unwrap_or_default(),
            p.name,
            p.email.as_deref().unwrap_or("")
        );
    }
    out
}

pub fn render_summary(summary: &IngestSummary) -> String {
    let mut out = format!(
        "Recorded receipt {} ({}) for merchant {}: {} purchase line(s), {} new item(s)\n",
        summary.receipt_id, summary.trip_datetime, summary.merchant_id, summary.purchases, summary.new_items
    );
    out.push_str(&render_shared_payments(&summary.shared_payments));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_lines_and_net_total() {
        let rows = vec![
            ReportRow {
                description: "KS WATER".into(),
                item_cost: 10.0,
                discount: -2.0,
                net_cost: 8.0,
                debt_fraction: 0.4,
                creditor_name: "Friend".into(),
                debtor_name: "Me".into(),
                trip_datetime: "2024-03-09 14:05:00".into(),
            },
            ReportRow {
                description: "BANANAS".into(),
                item_cost: 5.0,
                discount: 0.0,
                net_cost: 5.0,
                debt_fraction: 1.0,
                creditor_name: "Friend".into(),
                debtor_name: "Me".into(),
                trip_datetime: "2024-03-09 14:05:00".into(),
            },
        ];
        let text = render_report(&rows);
        assert!(text.starts_with("Trip 2024-03-09 14:05:00"));
        assert!(text.contains("KS WATER"));
        assert!(text.contains("13.00"));
        assert!(render_report(&[]).contains("No purchases"));
    }

    #[test]
    fn unpaid_rows_show_no() {
        let sp = SharedPaymentRecord {
            shared_payment_id: Some(4),
            receipt_id: 2,
            debtor: 1,
            creditor: 2,
            amount_owed: 8.2,
            is_paid: false,
            paid_datetime: None,
        };
        let text = render_shared_payments(&[sp]);
        assert!(text.contains("8.20"));
        assert!(text.trim_end().ends_with("no"));
    }
}
