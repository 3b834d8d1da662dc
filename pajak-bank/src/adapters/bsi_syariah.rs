use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::adapters::parse_lines_generic;
use crate::cell_text;
use crate::split_by_flag;

/// Bank Syariah Indonesia layout with a D/K flag:
/// Trx Time | Keterangan | Trx Id | D/K | Amount | Saldo
pub struct BsiSyariahAdapter;

impl BankAdapter for BsiSyariahAdapter {
    fn bank_name(&self) -> &'static str {
        "Bank Syariah Indonesia"
    }

    fn bank_code(&self) -> &'static str {
        "BSI_SYARIAH"
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "BANK SYARIAH INDONESIA",
            "BSI BANK SYARIAH",
            "BSI SYARIAH",
            "PT BSI",
            "PT. BSI",
            "TRX TIME",
            "TRXID",
            "TRX ID",
            "D/K",
        ]
    }

    fn parse(&self, text: &str, tables: &[Table]) -> Vec<StandardizedTransaction> {
        let account = self.extract_account_info(text);
        if tables.is_empty() {
            return parse_lines_generic(text, &account, self.bank_name());
        }

        let mut transactions = Vec::new();
        for row in data_rows(tables) {
            // Trx Time cells carry both date and time; the date parser reads
            // the leading date token.
            let time_cell = cell_text(row, 0);
            let date_token = time_cell.split_whitespace().next().unwrap_or_default();
            let Some(date) = parse_cell_date(date_token) else {
                continue;
            };
            let description = cell_text(row, 1);
            let trx_id = cell_text(row, 2);
            let Some(amount) = parse_amount_minor(&cell_text(row, 4)) else {
                continue;
            };
            let (debit, credit) = split_by_flag(&cell_text(row, 3), amount.abs());
            let Some(balance) = parse_amount_minor(&cell_text(row, 5)) else {
                continue;
            };

            transactions.push(StandardizedTransaction {
                transaction_date: date,
                posting_date: None,
                effective_date: None,
                description,
                transaction_type: String::new(),
                reference_number: trx_id,
                debit_minor: debit,
                credit_minor: credit,
                balance_minor: balance,
                bank_name: self.bank_name().to_string(),
                account_number: account.account_number.clone(),
                account_holder: account.account_holder.clone(),
                raw_data: serde_json::json!({
                    "trx_time": time_cell,
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
    fn dk_flag_drives_direction() {
        let adapter = BsiSyariahAdapter;
        let table = Table {
            page_number: None,
            rows: vec![
                TableRow::from_texts(&[
                    "Trx Time",
                    "Keterangan",
                    "Trx Id",
                    "D/K",
                    "Amount",
                    "Saldo",
                ]),
                TableRow::from_texts(&[
                    "07/07/2024 14:03:21",
                    "PEMBAYARAN QRIS",
                    "TRX-88102",
                    "D",
                    "125.000,00",
                    "2.375.000,00",
                ]),
                TableRow::from_texts(&[
                    "08/07/2024 09:00:02",
                    "BAGI HASIL",
                    "TRX-88211",
                    "K",
                    "10.000,00",
                    "2.385.000,00",
                ]),
            ],
        };
        let transactions = adapter.parse("BANK SYARIAH INDONESIA", &[table]);

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].debit_minor, 12_500_000);
        assert_eq!(transactions[1].credit_minor, 1_000_000);
        assert_eq!(transactions[0].reference_number, "TRX-88102");
    }
}
