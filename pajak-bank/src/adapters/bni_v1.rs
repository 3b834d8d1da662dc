use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::adapters::parse_lines_generic;
use crate::cell_text;

/// Legacy BNI layout: Tgl Trans | Uraian | Debet | Kredit | Saldo
pub struct BniV1Adapter;

impl BankAdapter for BniV1Adapter {
    fn bank_name(&self) -> &'static str {
        "Bank BNI"
    }

    fn bank_code(&self) -> &'static str {
        "BNI_V1"
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "BANK NEGARA INDONESIA",
            "PT BANK BNI",
            "TGL TRANS",
            "URAIAN",
            "DEBET",
            "KREDIT",
        ]
    }

    fn parse(&self, text: &str, tables: &[Table]) -> Vec<StandardizedTransaction> {
        let account = self.extract_account_info(text);
        if tables.is_empty() {
            return parse_lines_generic(text, &account, self.bank_name());
        }

        let mut transactions = Vec::new();
        for row in data_rows(tables) {
            let Some(date) = parse_cell_date(&cell_text(row, 0)) else {
                continue;
            };
            let description = cell_text(row, 1);
            let debit = parse_amount_minor(&cell_text(row, 2)).unwrap_or(0);
            let credit = parse_amount_minor(&cell_text(row, 3)).unwrap_or(0);
            let Some(balance) = parse_amount_minor(&cell_text(row, 4)) else {
                continue;
            };

            transactions.push(StandardizedTransaction {
                transaction_date: date,
                posting_date: None,
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
    fn parses_uraian_layout() {
        let adapter = BniV1Adapter;
        let table = Table {
            page_number: None,
            rows: vec![
                TableRow::from_texts(&["Tgl Trans", "Uraian", "Debet", "Kredit", "Saldo"]),
                TableRow::from_texts(&[
                    "10/04/2024",
                    "TARIK TUNAI",
                    "250.000,00",
                    "",
                    "1.750.000,00",
                ]),
            ],
        };
        let transactions = adapter.parse("BANK NEGARA INDONESIA", &[table]);

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].debit_minor, 25_000_000);
        assert_eq!(transactions[0].credit_minor, 0);
    }
}
