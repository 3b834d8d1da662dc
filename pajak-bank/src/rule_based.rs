use chrono::NaiveDate;
use pajak_ocr::Table;
use pajak_ocr::TableRow;
use pajak_parsers::clean_text;
use pajak_parsers::parse_amount_minor;
use pajak_parsers::parse_flexible_date;
use serde::Deserialize;
use serde::Serialize;

use crate::cell_text;

/// One table row parsed without any model call, scored by completeness:
/// 0.25 date + 0.15 description + 0.30 amount + 0.30 balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub date: Option<NaiveDate>,
    pub description: String,
    pub debit_minor: i64,
    pub credit_minor: i64,
    pub balance_minor: Option<i64>,
    pub reference: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
    #[serde(default)]
    pub raw_data: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseStatistics {
    pub total: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub high_conf_percentage: f64,
    pub low_conf_percentage: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RuleBasedParser;

impl RuleBasedParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parses every data row of every table. Header rows and empty rows are
    /// skipped; rows that resist parsing come back with zero confidence
    /// rather than being dropped, so the validator sees them.
    #[must_use]
    pub fn parse_transactions(&self, tables: &[Table]) -> Vec<ParsedTransaction> {
        let mut transactions = Vec::new();
        for table in tables {
            for row in table.rows.iter().skip(1) {
                let empty = row
                    .cells
                    .iter()
                    .all(|cell| cell.text.trim().is_empty());
                if empty {
                    continue;
                }
                transactions.push(self.parse_table_row(row, table.page_number));
            }
        }
        transactions
    }

    /// Column layouts, by cell count:
    /// 5: Date | Desc | Debit | Credit | Saldo
    /// 6: Date | Desc | Debit | Credit | Saldo | Ref
    /// 4: Date | Desc | Amount | Saldo (direction inferred from sign)
    #[must_use]
    pub fn parse_table_row(&self, row: &TableRow, page_number: Option<usize>) -> ParsedTransaction {
        if row.cells.len() < 3 {
            return Self::low_confidence_row(row, page_number);
        }

        let date = parse_flexible_date(&cell_text(row, 0));
        let description = clean_text(&cell_text(row, 1));

        let (debit, credit, balance, reference, amount_present) = match row.cells.len() {
            5 => {
                let debit = parse_amount_minor(&cell_text(row, 2));
                let credit = parse_amount_minor(&cell_text(row, 3));
                let balance = parse_amount_minor(&cell_text(row, 4));
                let present = debit.is_some() || credit.is_some();
                (
                    debit.unwrap_or(0).abs(),
                    credit.unwrap_or(0).abs(),
                    balance,
                    String::new(),
                    present,
                )
            }
            count if count >= 6 => {
                let debit = parse_amount_minor(&cell_text(row, 2));
                let credit = parse_amount_minor(&cell_text(row, 3));
                let balance = parse_amount_minor(&cell_text(row, 4));
                let present = debit.is_some() || credit.is_some();
                (
                    debit.unwrap_or(0).abs(),
                    credit.unwrap_or(0).abs(),
                    balance,
                    clean_text(&cell_text(row, 5)),
                    present,
                )
            }
            4 => {
                let amount = parse_amount_minor(&cell_text(row, 2));
                let balance = parse_amount_minor(&cell_text(row, 3));
                let (debit, credit) = match amount {
                    Some(value) if value < 0 => (value.abs(), 0),
                    Some(value) => (0, value),
                    None => (0, 0),
                };
                (debit, credit, balance, String::new(), amount.is_some())
            }
            _ => (0, 0, None, String::new(), false),
        };

        let mut confidence = 0.0;
        if date.is_some() {
            confidence += 0.25;
        }
        if !description.is_empty() {
            confidence += 0.15;
        }
        if amount_present {
            confidence += 0.30;
        }
        if balance.is_some() {
            confidence += 0.30;
        }

        ParsedTransaction {
            date,
            description,
            debit_minor: debit,
            credit_minor: credit,
            balance_minor: balance,
            reference,
            confidence,
            page_number,
            raw_data: serde_json::json!({
                "row_cells": row.cells.iter().map(|cell| cell.text.clone()).collect::<Vec<_>>(),
                "cell_count": row.cells.len(),
            }),
        }
    }

    fn low_confidence_row(row: &TableRow, page_number: Option<usize>) -> ParsedTransaction {
        let joined = row
            .cells
            .iter()
            .map(|cell| cell.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        ParsedTransaction {
            date: None,
            description: clean_text(&joined),
            debit_minor: 0,
            credit_minor: 0,
            balance_minor: None,
            reference: String::new(),
            confidence: 0.0,
            page_number,
            raw_data: serde_json::json!({
                "row_cells": row.cells.iter().map(|cell| cell.text.clone()).collect::<Vec<_>>(),
                "parse_failed": true,
            }),
        }
    }

    #[must_use]
    pub fn statistics(&self, transactions: &[ParsedTransaction]) -> ParseStatistics {
        let total = transactions.len();
        let high = transactions.iter().filter(|txn| txn.confidence > 0.90).count();
        let low = transactions.iter().filter(|txn| txn.confidence < 0.70).count();
        let medium = total - high - low;
        ParseStatistics {
            total,
            high_confidence: high,
            medium_confidence: medium,
            low_confidence: low,
            high_conf_percentage: percentage(high, total),
            low_conf_percentage: percentage(low, total),
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(rows: Vec<TableRow>) -> Table {
        Table {
            page_number: Some(1),
            rows,
        }
    }

    #[test]
    fn five_column_row_scores_full_confidence() {
        let parser = RuleBasedParser::new();
        let tables = [table(vec![
            TableRow::from_texts(&["Tanggal", "Keterangan", "Debet", "Kredit", "Saldo"]),
            TableRow::from_texts(&[
                "01/03/2024",
                "SETOR TUNAI",
                "",
                "1.000.000,00",
                "11.000.000,00",
            ]),
        ])];

        let transactions = parser.parse_transactions(&tables);
        assert_eq!(transactions.len(), 1);
        let txn = &transactions[0];
        assert!((txn.confidence - 1.0).abs() < 1e-9);
        assert_eq!(txn.credit_minor, 100_000_000);
        assert_eq!(txn.balance_minor, Some(1_100_000_000));
        assert_eq!(txn.page_number, Some(1));
    }

    #[test]
    fn four_column_row_infers_direction_from_sign() {
        let parser = RuleBasedParser::new();
        let row = TableRow::from_texts(&[
            "02/03/2024",
            "TARIK TUNAI ATM",
            "-500.000,00",
            "10.500.000,00",
        ]);
        let txn = parser.parse_table_row(&row, None);

        assert_eq!(txn.debit_minor, 50_000_000);
        assert_eq!(txn.credit_minor, 0);
        assert!((txn.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn six_column_row_captures_reference() {
        let parser = RuleBasedParser::new();
        let row = TableRow::from_texts(&[
            "03/03/2024",
            "TRANSFER MASUK",
            "",
            "250.000,00",
            "10.750.000,00",
            "REF-901",
        ]);
        let txn = parser.parse_table_row(&row, None);
        assert_eq!(txn.reference, "REF-901");
    }

    #[test]
    fn short_rows_get_zero_confidence() {
        let parser = RuleBasedParser::new();
        let row = TableRow::from_texts(&["garbled", "row"]);
        let txn = parser.parse_table_row(&row, Some(3));

        assert_eq!(txn.confidence, 0.0);
        assert_eq!(txn.page_number, Some(3));
        assert_eq!(txn.raw_data["parse_failed"], true);
    }

    #[test]
    fn missing_date_and_balance_lower_confidence() {
        let parser = RuleBasedParser::new();
        let row = TableRow::from_texts(&[
            "SALDO AWAL",
            "keterangan",
            "100,00",
            "",
            "bukan angka",
        ]);
        let txn = parser.parse_table_row(&row, None);
        // Description 0.15 + amount 0.30; no date, no balance.
        assert!((txn.confidence - 0.45).abs() < 1e-9);
    }

    #[test]
    fn statistics_bucket_by_confidence() {
        let parser = RuleBasedParser::new();
        let tables = [table(vec![
            TableRow::from_texts(&["h", "h", "h", "h", "h"]),
            TableRow::from_texts(&["01/03/2024", "OK", "", "1,00", "2,00"]),
            TableRow::from_texts(&["bad", "row"]),
        ])];
        let transactions = parser.parse_transactions(&tables);
        let stats = parser.statistics(&transactions);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.high_confidence, 1);
        assert_eq!(stats.low_confidence, 1);
        assert_eq!(stats.medium_confidence, 0);
        assert_eq!(stats.high_conf_percentage, 50.0);
    }
}
