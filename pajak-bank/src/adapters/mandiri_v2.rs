use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::adapters::parse_lines_generic;
use crate::cell_text;

/// Newer Mandiri layout with a transaction-kind column:
/// Tanggal | Ket. Kode Transaksi | Jenis Trans | Debet | Kredit | Saldo
pub struct MandiriV2Adapter;

impl BankAdapter for MandiriV2Adapter {
    fn bank_name(&self) -> &'static str {
        "Bank Mandiri"
    }

    fn bank_code(&self) -> &'static str {
        "MANDIRI_V2"
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "PT BANK MANDIRI",
            "BANK MANDIRI (PERSERO)",
            "KET. KODE TRANSAKSI",
            "JENIS TRANS",
            // Typo preserved from the bank's own layout.
            "NOMER REKENING",
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
            let transaction_type = cell_text(row, 2);
            let debit = parse_amount_minor(&cell_text(row, 3)).unwrap_or(0);
            let credit = parse_amount_minor(&cell_text(row, 4)).unwrap_or(0);
            let Some(balance) = parse_amount_minor(&cell_text(row, 5)) else {
                continue;
            };

            transactions.push(StandardizedTransaction {
                transaction_date: date,
                posting_date: None,
                effective_date: None,
                description,
                transaction_type,
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
