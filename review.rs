use crate::error::{Error, Result};
use crate::ledger::ShareOverrides;
use crate::models::PurchaseRecord;
use crate::receipt::{DiscountFold, LineItem};
use std::collections::BTreeSet;
use std::io::{BufRead, Write};

/// Human decisions the ingestion pipeline cannot make on its own.
pub trait Reviewer {
    /// Shown the affected lines and the planned folds; `false` aborts ingestion.
    fn approve_discount_folds(&mut self, items: &[LineItem], folds: &[DiscountFold]) -> Result<bool>;

    /// Shown every purchase line with its default split; returns the lines to
    /// attribute in full to one party. `lines` and `purchases` are parallel.
    fn share_overrides(&mut self, lines: &[LineItem], purchases: &[PurchaseRecord]) -> Result<ShareOverrides>;
}

/// Prompts on a terminal (or any reader/writer pair).
pub struct TerminalReviewer<R, W> {
    input: R,
    output: W,
}

impl TerminalReviewer<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalReviewer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        writeln!(self.output, "{question}")?;
        self.output.flush()?;
        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(answer.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Reviewer for TerminalReviewer<R, W> {
    fn approve_discount_folds(&mut self, items: &[LineItem], folds: &[DiscountFold]) -> Result<bool> {
        let affected: BTreeSet<usize> = folds
            .iter()
            .flat_map(|f| [f.target_index, f.discount_index])
            .collect();
        writeln!(self.output, "{:>4}  {:<32} {:>9} {:>9}", "line", "description", "cost", "discount")?;
        for idx in affected {
            let item = items
                .get(idx)
                .ok_or_else(|| Error::InvalidInput(format!("fold refers to line {idx} of {}", items.len())))?;
            writeln!(
                self.output,
                "{:>4}  {:<32} {:>9.2} {:>9.2}",
                idx, item.description, item.item_cost, item.discount
            )?;
        }
        for fold in folds {
            writeln!(self.output, "  {fold}")?;
        }
        let answer = self.ask(
            "Do you approve deleting the discount row(s) and writing their cost to the discount of the row above? y/n",
        )?;
        Ok(answer == "y")
    }

    fn share_overrides(&mut self, lines: &[LineItem], purchases: &[PurchaseRecord]) -> Result<ShareOverrides> {
        writeln!(
            self.output,
            "{:>4}  {:<32} {:>9} {:>9} {:>8} {:>6}",
            "id", "description", "cost", "discount", "creditor", "debtor"
        )?;
        for (idx, (line, purchase)) in lines.iter().zip(purchases).enumerate() {
            writeln!(
                self.output,
                "{:>4}  {:<32} {:>9.2} {:>9.2} {:>8} {:>6}",
                idx, line.description, purchase.item_cost, purchase.discount, purchase.creditor, purchase.debtor
            )?;
        }
        let debtor_only =
            parse_line_ids(&self.ask("Type the ids of the lines the debtor pays in full (blank for none)")?)?;
        let creditor_only =
            parse_line_ids(&self.ask("Type the ids of the lines the creditor pays in full (blank for none)")?)?;
        Ok(ShareOverrides {
            debtor_only,
            creditor_only,
        })
    }
}

/// Parses a space (or comma) separated list of line ids.
pub fn parse_line_ids(input: &str) -> Result<Vec<usize>> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            tok.parse::<usize>()
                .map_err(|_| Error::InvalidInput(format!("`{tok}` is not a line id")))
        })
        .collect()
}
