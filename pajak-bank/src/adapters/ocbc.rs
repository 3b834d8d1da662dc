use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::adapters::parse_lines_generic;
use crate::cell_text;

/// OCBC NISP layout: Tgl Trans | Tgl Valuta | Description | Debit | Credit | Balance
pub struct OcbcAdapter;

impl BankAdapter for OcbcAdapter {
    fn bank_name(&self) -> &'static str {
        "Bank OCBC NISP"
    }

    fn bank_code(&self) -> &'static str {
        "OCBC"
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "OCBC BANK",
            "PT BANK OCBC",
            "OCBC NISP",
            "TGL TRANS",
            "TRANS DATE",
            "TGL VALUTA",
            "VALUE DATE",
        ]
    }

    fn parse(&self, text: &str, tables: &[Table]) -> Vec<StandardizedTransaction> {
        let account = self.extract_account_info(text);
        if tables.is_empty() {
            return parse_lines_generic(text, &account, self.bank_name());
        }

        let mut transactions = Vec::new();
        for row in data_rows(tables) {
            let posting = parse_cell_date(&cell_text(row, 0));
            let value = parse_cell_date(&cell_text(row, 1));
            let Some(date) = value.or(posting) else {
                continue;
            };
            let description = cell_text(row, 2);
            let debit = parse_amount_minor(&cell_text(row, 3)).unwrap_or(0);
            let credit = parse_amount_minor(&cell_text(row, 4)).unwrap_or(0);
            let Some(balance) = parse_amount_minor(&cell_text(row, 5)) else {
                continue;
            };

            transactions.push(StandardizedTransaction {
                transaction_date: date,
                posting_date: posting,
                effective_date: value,
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
    fn valuta_date_is_primary() {
        let adapter = OcbcAdapter;
        let table = Table {
            page_number: None,
            rows: vec![
                TableRow::from_texts(&[
                    "Tgl Trans",
                    "Tgl Valuta",
                    "Description",
                    "Debit",
                    "Credit",
                    "Balance",
                ]),
                TableRow::from_texts(&[
                    "09/04/2024",
                    "10/04/2024",
                    "VIRTUAL ACCOUNT IN",
                    "",
                    "7.500.000,00",
                    "17.500.000,00",
                ]),
            ],
        };
        let transactions = adapter.parse("OCBC NISP", &[table]);

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].credit_minor, 750_000_000);
        assert_eq!(
            transactions[0].transaction_date,
            transactions[0].effective_date.expect("valuta date")
        );
    }
}
