use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::adapters::parse_lines_generic;
use crate::cell_text;
use crate::split_by_flag;

/// Newer BNI layout with an explicit direction flag:
/// Posting Date | Effective Date | Branch | Journal | Description | Amount | DB/CR | Balance
///
/// The effective date is the primary transaction date when both are present.
pub struct BniV2Adapter;

impl BankAdapter for BniV2Adapter {
    fn bank_name(&self) -> &'static str {
        "Bank BNI"
    }

    fn bank_code(&self) -> &'static str {
        "BNI_V2"
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "BANK NEGARA INDONESIA",
            "PT BANK BNI",
            "POSTING DATE",
            "EFFECTIVE DATE",
            "DB/CR",
            "JOURNAL",
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
            let branch = cell_text(row, 2);
            let journal = cell_text(row, 3);
            let description = cell_text(row, 4);
            let Some(amount) = parse_amount_minor(&cell_text(row, 5)) else {
                continue;
            };
            let (debit, credit) = split_by_flag(&cell_text(row, 6), amount.abs());
            let Some(balance) = parse_amount_minor(&cell_text(row, 7)) else {
                continue;
            };

            transactions.push(StandardizedTransaction {
                transaction_date: date,
                posting_date: posting,
                effective_date: effective,
                description,
                transaction_type: String::new(),
                reference_number: journal,
                debit_minor: debit,
                credit_minor: credit,
                balance_minor: balance,
                bank_name: self.bank_name().to_string(),
                account_number: account.account_number.clone(),
                account_holder: account.account_holder.clone(),
                raw_data: serde_json::json!({
                    "branch": branch,
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

    fn sample_table() -> Table {
        Table {
            page_number: Some(1),
            rows: vec![
                TableRow::from_texts(&[
                    "Posting Date",
                    "Effective Date",
                    "Branch",
                    "Journal",
                    "Transaction Description",
                    "Amount",
                    "DB/CR",
                    "Balance",
                ]),
                TableRow::from_texts(&[
                    "01/03/2024",
                    "02/03/2024",
                    "0997",
                    "J-1001",
                    "PAYMENT INVOICE A-12",
                    "1.000.000,00",
                    "DB",
                    "9.000.000,00",
                ]),
                TableRow::from_texts(&[
                    "03/03/2024",
                    "03/03/2024",
                    "0997",
                    "J-1002",
                    "INCOMING TRANSFER",
                    "500.000,00",
                    "CR",
                    "9.500.000,00",
                ]),
            ],
        }
    }

    #[test]
    fn effective_date_is_primary() {
        let adapter = BniV2Adapter;
        let transactions = adapter.parse("PT BANK BNI", &[sample_table()]);

        assert_eq!(transactions.len(), 2);
        assert_eq!(
            transactions[0].transaction_date,
            transactions[0].effective_date.expect("effective date")
        );
        assert_ne!(
            Some(transactions[0].transaction_date),
            transactions[0].posting_date
        );
    }

    #[test]
    fn db_cr_flag_drives_direction() {
        let adapter = BniV2Adapter;
        let transactions = adapter.parse("PT BANK BNI", &[sample_table()]);

        assert_eq!(transactions[0].debit_minor, 100_000_000);
        assert_eq!(transactions[0].credit_minor, 0);
        assert_eq!(transactions[1].credit_minor, 50_000_000);
        assert_eq!(transactions[1].reference_number, "J-1002");
    }
}
