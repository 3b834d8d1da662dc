use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::adapters::parse_lines_generic;
use crate::cell_text;

/// Legacy Mandiri layout: Posting Date | Remark | Debit | Credit | Balance
pub struct MandiriV1Adapter;

impl BankAdapter for MandiriV1Adapter {
    fn bank_name(&self) -> &'static str {
        "Bank Mandiri"
    }

    fn bank_code(&self) -> &'static str {
        "MANDIRI_V1"
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "PT BANK MANDIRI",
            "BANK MANDIRI (PERSERO)",
            "POSTING DATE",
            "REMARK",
        ]
    }

    fn parse(&self, text: &str, tables: &[Table]) -> Vec<StandardizedTransaction> {
        let account = self.extract_account_info(text);
        if tables.is_empty() {
            return parse_lines_generic(text, &account, self.bank_name());
        }

        let mut transactions = Vec::new();
        for row in data_rows(tables) {
            let Some(posting) = parse_cell_date(&cell_text(row, 0)) else {
                continue;
            };
            let description = cell_text(row, 1);
            let debit = parse_amount_minor(&cell_text(row, 2)).unwrap_or(0);
            let credit = parse_amount_minor(&cell_text(row, 3)).unwrap_or(0);
            let Some(balance) = parse_amount_minor(&cell_text(row, 4)) else {
                continue;
            };

            transactions.push(StandardizedTransaction {
                transaction_date: posting,
                posting_date: Some(posting),
                effective_date: None,
                description,
                transaction_type: String::new(),
                reference_number: String::new(),
                debit_minor: debit.abs(),
                credit_minor: credit.abs(),
                balance_minor: balance,
                bank_name: self.bank_name().to_string(),
                account_number: account.account_number.clone(),
                account_holder: account.account_holder.clone(),
                raw_data: serde_json::json!({
                    "cells": row.cells.iter().map(|cell| cell.text.clone()).collect::<Vec<_>>(),
                }),
            });
        }
        transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pajak_ocr::TableRow;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_five_column_layout_with_english_dates() {
        let adapter = MandiriV1Adapter;
        let table = Table {
            page_number: None,
            rows: vec![
                TableRow::from_texts(&["Posting Date", "Remark", "Debit", "Credit", "Balance"]),
                TableRow::from_texts(&[
                    "01 Mar 2024",
                    "BIAYA ADM",
                    "15.000,00",
                    "",
                    "4.985.000,00",
                ]),
            ],
        };

        let transactions = adapter.parse("PT BANK MANDIRI", &[table]);
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].debit_minor, 1_500_000);
        assert!(transactions[0].posting_date.is_some());
        assert_eq!(transactions[0].balance_minor, 498_500_000);
    }
}
