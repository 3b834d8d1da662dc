use pajak_ocr::Table;
use pajak_ocr::TableRow;
use pajak_parsers::parse_amount_minor;

use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::adapters::data_rows;
use crate::adapters::parse_cell_date;
use crate::adapters::parse_lines_generic;
use crate::cell_text;
use crate::split_by_flag;

/// BCA Syariah landscape layout. The full export carries up to 14 columns;
/// OCR frequently drops the operator columns, so both the wide and the
/// compact shapes are handled:
///
/// wide:    Tgl Efektif | Tgl Trans | Jam | Kode Trans | Keterangan |
///          Ket Tambahan | D/C | Nominal | Saldo | No Ref | ...
/// compact: Tgl Efektif | Tgl Trans | Kode Trans | Keterangan | D/C |
///          Nominal | Saldo
pub struct BcaSyariahAdapter;

struct RowFields {
    effective: String,
    transaction: String,
    code: String,
    description: String,
    extra: String,
    flag: String,
    amount: String,
    balance: String,
    reference: String,
}

fn map_row(row: &TableRow) -> Option<RowFields> {
    let cells = row.cells.len();
    if cells >= 9 {
        Some(RowFields {
            effective: cell_text(row, 0),
            transaction: cell_text(row, 1),
            code: cell_text(row, 3),
            description: cell_text(row, 4),
            extra: cell_text(row, 5),
            flag: cell_text(row, 6),
            amount: cell_text(row, 7),
            balance: cell_text(row, 8),
            reference: cell_text(row, 9),
        })
    } else if cells >= 7 {
        Some(RowFields {
            effective: cell_text(row, 0),
            transaction: cell_text(row, 1),
            code: cell_text(row, 2),
            description: cell_text(row, 3),
            extra: String::new(),
            flag: cell_text(row, 4),
            amount: cell_text(row, 5),
            balance: cell_text(row, 6),
            reference: String::new(),
        })
    } else {
        None
    }
}

impl BankAdapter for BcaSyariahAdapter {
    fn bank_name(&self) -> &'static str {
        "BCA Syariah"
    }

    fn bank_code(&self) -> &'static str {
        "BCA_SYARIAH"
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "BCA SYARIAH",
            "PT BANK BCA SYARIAH",
            "TANGGAL EFEKTIF",
            "TANGGAL TRANSAKSI",
            "KODE TRANSAKSI",
            "KETERANGAN TAMBAHAN",
            "KODE CABANG",
        ]
    }

    fn parse(&self, text: &str, tables: &[Table]) -> Vec<StandardizedTransaction> {
        let account = self.extract_account_info(text);
        if tables.is_empty() {
            return parse_lines_generic(text, &account, self.bank_name());
        }

        let mut transactions = Vec::new();
        for row in data_rows(tables) {
            let Some(fields) = map_row(row) else {
                continue;
            };
            let effective = parse_cell_date(&fields.effective);
            let posting = parse_cell_date(&fields.transaction);
            let Some(date) = effective.or(posting) else {
                continue;
            };
            let Some(amount) = parse_amount_minor(&fields.amount) else {
                continue;
            };
            let (debit, credit) = split_by_flag(&fields.flag, amount.abs());
            let Some(balance) = parse_amount_minor(&fields.balance) else {
                continue;
            };

            let description = if fields.extra.is_empty() {
                fields.description.clone()
            } else {
                format!("{} {}", fields.description, fields.extra)
            };

            transactions.push(StandardizedTransaction {
                transaction_date: date,
                posting_date: posting,
                effective_date: effective,
                description,
                transaction_type: fields.code,
                reference_number: fields.reference,
                debit_minor: debit,
                credit_minor: credit,
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
