use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::adapters::parse_lines_generic;
use crate::cell_text;

/// CIMB Niaga layout:
/// Post Date | Eff Date | Description | Transaction Ref No | Debit | Credit | Balance
pub struct CimbNiagaAdapter;

impl BankAdapter for CimbNiagaAdapter {
    fn bank_name(&self) -> &'static str {
        "CIMB Niaga"
    }

    fn bank_code(&self) -> &'static str {
        "CIMB_NIAGA"
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "CIMB NIAGA",
            "PT BANK CIMB NIAGA",
            "POST DATE",
            "EFF DATE",
            "TRANSACTION REF NO",
            "TGL. TXN",
            "TXN. DATE",
            "TGL. VALUTA",
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
            let effective = parse_cell_date(&cell_text(row, 1));
            let Some(date) = effective.or(posting) else {
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
                posting_date: posting,
                effective_date: effective,
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
    fn parses_split_debit_credit_columns() {
        let adapter = CimbNiagaAdapter;
        let table = Table {
            page_number: None,
            rows: vec![
                TableRow::from_texts(&[
                    "Post Date",
                    "Eff Date",
                    "Description",
                    "Transaction Ref No",
                    "Debit",
                    "Credit",
                    "Balance",
                ]),
                TableRow::from_texts(&[
                    "11/02/2024",
                    "12/02/2024",
                    "BI FAST TRANSFER IN",
                    "CN-9912",
                    "",
                    "3.250.000,00",
                    "12.250.000,00",
                ]),
            ],
        };
        let transactions = adapter.parse("PT BANK CIMB NIAGA", &[table]);

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].credit_minor, 325_000_000);
        assert_eq!(transactions[0].reference_number, "CN-9912");
        assert_eq!(
            transactions[0].transaction_date,
            transactions[0].effective_date.expect("effective")
        );
    }
}
