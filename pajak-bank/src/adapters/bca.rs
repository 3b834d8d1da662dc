use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;
use regex_lite::Regex;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::cell_text;
use crate::split_signed;

/// Regular BCA layout: Tanggal | Keterangan | CBG | Mutasi | Saldo.
/// The mutation column is signed: `1.000,00 CR`, `(1.000,00)`, `-1.000,00`.
pub struct BcaAdapter;

impl BankAdapter for BcaAdapter {
    fn bank_name(&self) -> &'static str {
        "Bank BCA"
    }

    fn bank_code(&self) -> &'static str {
        "BCA"
    }

    fn keywords(&self) -> &'static [&'static str] {
        // BCA Syariah sits earlier in the detector list, so the plain "BCA"
        // keywords never shadow it.
        &[
            "BANK CENTRAL ASIA",
            "PT BANK CENTRAL ASIA",
            "BCA",
            "KETERANGAN",
            "CBG",
            "MUTASI",
        ]
    }

    fn parse(&self, text: &str, tables: &[Table]) -> Vec<StandardizedTransaction> {
        let account = self.extract_account_info(text);
        if tables.is_empty() {
            return self.parse_from_text(text);
        }

        let mut transactions = Vec::new();
        for row in data_rows(tables) {
            let Some(date) = parse_cell_date(&cell_text(row, 0)) else {
                continue;
            };
            let description = cell_text(row, 1);
            let branch = cell_text(row, 2);
            let Some((debit, credit)) = split_signed(&cell_text(row, 3)) else {
                continue;
            };
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
                debit_minor: debit,
                credit_minor: credit,
                balance_minor: balance,
                bank_name: self.bank_name().to_string(),
                account_number: account.account_number.clone(),
                account_holder: account.account_holder.clone(),
                raw_data: serde_json::json!({
                    "cbg": branch,
                    "cells": row.cells.iter().map(|cell| cell.text.clone()).collect::<Vec<_>>(),
                }),
            });
        }
        transactions
    }
}

impl BcaAdapter {
    /// Line fallback: `DD/MM/YYYY KETERANGAN CBG MUTASI SALDO`, with the
    /// three-digit branch code anchoring the split between description and
    /// amounts.
    fn parse_from_text(&self, text: &str) -> Vec<StandardizedTransaction> {
        let account = self.extract_account_info(text);
        let Ok(regex) = Regex::new(
            r"(?m)^\s*(\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4})\s+(.+?)\s+(\d{3})\s+([\d.,()+-]+(?:\s*(?:CR|DB|DR))?)\s+([\d.,]+)\s*$",
        ) else {
            return Vec::new();
        };

        let mut transactions = Vec::new();
        for captures in regex.captures_iter(text) {
            let (Some(date_raw), Some(description), Some(branch), Some(mutation), Some(balance_raw)) = (
                captures.get(1),
                captures.get(2),
                captures.get(3),
                captures.get(4),
                captures.get(5),
            ) else {
                continue;
            };
            let Some(date) = parse_cell_date(date_raw.as_str()) else {
                continue;
            };
            let Some((debit, credit)) = split_signed(mutation.as_str()) else {
                continue;
            };
            let Some(balance) = parse_amount_minor(balance_raw.as_str()) else {
                continue;
            };
            transactions.push(StandardizedTransaction {
                transaction_date: date,
                posting_date: None,
                effective_date: None,
                description: description.as_str().trim().to_string(),
                transaction_type: String::new(),
                reference_number: String::new(),
                debit_minor: debit,
                credit_minor: credit,
                balance_minor: balance,
                bank_name: self.bank_name().to_string(),
                account_number: account.account_number.clone(),
                account_holder: account.account_holder.clone(),
                raw_data: serde_json::json!({
                    "cbg": branch.as_str(),
                    "source": "text_fallback",
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
    fn mutasi_column_signs_drive_direction() {
        let adapter = BcaAdapter;
        let table = Table {
            page_number: None,
            rows: vec![
                TableRow::from_texts(&["Tanggal", "Keterangan", "CBG", "Mutasi", "Saldo"]),
                TableRow::from_texts(&[
                    "01/03/2024",
                    "TRSF E-BANKING",
                    "001",
                    "1.000.000,00 DB",
                    "9.000.000,00",
                ]),
                TableRow::from_texts(&[
                    "02/03/2024",
                    "SETORAN TUNAI",
                    "001",
                    "500.000,00 CR",
                    "9.500.000,00",
                ]),
                TableRow::from_texts(&[
                    "03/03/2024",
                    "BIAYA ADM",
                    "001",
                    "(15.000,00)",
                    "9.485.000,00",
                ]),
            ],
        };
        let transactions = adapter.parse("PT BANK CENTRAL ASIA", &[table]);

        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0].debit_minor, 100_000_000);
        assert_eq!(transactions[1].credit_minor, 50_000_000);
        assert_eq!(transactions[2].debit_minor, 1_500_000);
    }

    #[test]
    fn text_fallback_parses_branch_anchored_lines() {
        let adapter = BcaAdapter;
        let text = "\
PT BANK CENTRAL ASIA\n\
REKENING: 1234567890\n\
01/01/2025 TRANSFER MASUK 001 1.000.000,00 CR 10.000.000,00\n\
02/01/2025 TARIK TUNAI 001 -500.000,00 9.500.000,00\n";
        let transactions = adapter.parse(text, &[]);

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].credit_minor, 100_000_000);
        assert_eq!(transactions[1].debit_minor, 50_000_000);
        assert_eq!(transactions[1].balance_minor, 950_000_000);
        assert_eq!(transactions[0].account_number, "1234567890");
    }
}
