use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::adapters::parse_lines_generic;
use crate::cell_text;

/// MUFG corporate statement:
/// Booking Date | Value Date | Description | Customer Reference | Debit | Credit | Balance
pub struct MufgAdapter;

impl BankAdapter for MufgAdapter {
    fn bank_name(&self) -> &'static str {
        "MUFG Bank"
    }

    fn bank_code(&self) -> &'static str {
        "MUFG"
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "MUFG BANK",
            "MITSUBISHI UFJ",
            "BOOKING DATE",
            "VALUE DATE",
            "CUSTOMER REFERENCE",
            "BANK REFERENCE",
        ]
    }

    fn parse(&self, text: &str, tables: &[Table]) -> Vec<StandardizedTransaction> {
        let account = self.extract_account_info(text);
        if tables.is_empty() {
            return parse_lines_generic(text, &account, self.bank_name());
        }

        let mut transactions = Vec::new();
        for row in data_rows(tables) {
            let booking = parse_cell_date(&cell_text(row, 0));
            let value = parse_cell_date(&cell_text(row, 1));
            let Some(date) = value.or(booking) else {
                continue;
            };
            let description = cell_text(row, 2);
            let reference = cell_text(row, 3);
            let debit = parse_amount_minor(&cell_text(row, 4)).unwrap_or(0);
            let credit = parse_amount_minor(&cell_text(row, 5)).unwrap_or(0);
            let Some(balance) = parse_amount_minor(&cell_text(row, 6)) else {
                continue;
            };

            transactions.push(StandardizedTransaction {
                transaction_date: date,
                posting_date: booking,
                effective_date: value,
                description,
                transaction_type: String::new(),
                reference_number: reference,
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
    fn value_date_is_primary() {
        let adapter = MufgAdapter;
        let table = Table {
            page_number: None,
            rows: vec![
                TableRow::from_texts(&[
                    "Booking Date",
                    "Value Date",
                    "Description",
                    "Customer Reference",
                    "Debit",
                    "Credit",
                    "Balance",
                ]),
                TableRow::from_texts(&[
                    "28/02/2024",
                    "01/03/2024",
                    "OUTWARD REMITTANCE",
                    "OR-5521",
                    "10,000,000.00",
                    "",
                    "40,000,000.00",
                ]),
            ],
        };
        let transactions = adapter.parse("MUFG BANK", &[table]);

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].debit_minor, 1_000_000_000);
        assert_eq!(
            transactions[0].transaction_date,
            transactions[0].effective_date.expect("value date")
        );
    }
}
