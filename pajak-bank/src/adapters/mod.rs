//! One adapter per supported statement layout. The list order in
//! [`canonical_adapters`] is the detection order.

use std::sync::Arc;

use chrono::NaiveDate;
use pajak_ocr::Table;
use pajak_ocr::TableRow;
use pajak_parsers::parse_flexible_date;
use regex_lite::Regex;

use crate::AccountInfo;
use crate::BankAdapter;
use crate::StandardizedTransaction;
use crate::split_by_description;

mod bca;
mod bca_syariah;
mod bni_v1;
mod bni_v2;
mod bri;
mod cimb_niaga;
mod mandiri_v1;
mod mandiri_v2;
mod mufg;
mod ocbc;
mod permata;
mod bsi_syariah;

pub use crate::adapters::bca::BcaAdapter;
pub use crate::adapters::bca_syariah::BcaSyariahAdapter;
pub use crate::adapters::bni_v1::BniV1Adapter;
pub use crate::adapters::bni_v2::BniV2Adapter;
pub use crate::adapters::bri::BriAdapter;
pub use crate::adapters::bsi_syariah::BsiSyariahAdapter;
pub use crate::adapters::cimb_niaga::CimbNiagaAdapter;
pub use crate::adapters::mandiri_v1::MandiriV1Adapter;
pub use crate::adapters::mandiri_v2::MandiriV2Adapter;
pub use crate::adapters::mufg::MufgAdapter;
pub use crate::adapters::ocbc::OcbcAdapter;
pub use crate::adapters::permata::PermataAdapter;

#[must_use]
pub fn canonical_adapters() -> Vec<Arc<dyn BankAdapter>> {
    vec![
        // Mandiri V2 before V1; V2 carries the more specific keywords.
        Arc::new(MandiriV2Adapter),
        Arc::new(MandiriV1Adapter),
        // BNI V2 before V1 for the same reason.
        Arc::new(BniV2Adapter),
        Arc::new(BniV1Adapter),
        // BCA Syariah before regular BCA.
        Arc::new(BcaSyariahAdapter),
        Arc::new(BcaAdapter),
        // The rest have no keyword conflicts.
        Arc::new(CimbNiagaAdapter),
        Arc::new(MufgAdapter),
        Arc::new(PermataAdapter),
        Arc::new(BriAdapter),
        Arc::new(OcbcAdapter),
        Arc::new(BsiSyariahAdapter),
    ]
}

/// Data rows of every table: header rows and fully empty rows skipped.
pub(crate) fn data_rows(tables: &[Table]) -> impl Iterator<Item = &TableRow> {
    tables.iter().flat_map(|table| {
        table.rows.iter().skip(1).filter(|row| {
            row.cells
                .iter()
                .any(|cell| !cell.text.trim().is_empty())
        })
    })
}

pub(crate) fn parse_cell_date(value: &str) -> Option<NaiveDate> {
    parse_flexible_date(value)
}

/// Line-oriented fallback shared by adapters whose statements sometimes
/// arrive without structured tables: `date description amount balance`.
/// Direction is inferred from description keywords. The regex will happily
/// match non-transaction lines; downstream validation treats this output as
/// untrusted.
pub(crate) fn parse_lines_generic(
    text: &str,
    account: &AccountInfo,
    bank_name: &str,
) -> Vec<StandardizedTransaction> {
    let Ok(regex) = Regex::new(
        r"(?m)^\s*(\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4})\s+(.+?)\s+([\d.,]+(?:,\d{2}|\.\d{2})?)\s+([\d.,]+(?:,\d{2}|\.\d{2})?)\s*$",
    ) else {
        return Vec::new();
    };

    let mut transactions = Vec::new();
    for captures in regex.captures_iter(text) {
        let (Some(date_raw), Some(description), Some(amount_raw), Some(balance_raw)) = (
            captures.get(1),
            captures.get(2),
            captures.get(3),
            captures.get(4),
        ) else {
            continue;
        };
        let Some(date) = parse_cell_date(date_raw.as_str()) else {
            continue;
        };
        let Some(amount) = pajak_parsers::parse_amount_minor(amount_raw.as_str()) else {
            continue;
        };
        let Some(balance) = pajak_parsers::parse_amount_minor(balance_raw.as_str()) else {
            continue;
        };
        let description = description.as_str().trim().to_string();
        let (debit, credit) = if amount < 0 {
            (amount.abs(), 0)
        } else {
            split_by_description(&description, amount)
        };
        transactions.push(StandardizedTransaction {
            transaction_date: date,
            posting_date: None,
            effective_date: None,
            description: description.clone(),
            transaction_type: String::new(),
            reference_number: String::new(),
            debit_minor: debit,
            credit_minor: credit,
            balance_minor: balance,
            bank_name: bank_name.to_string(),
            account_number: account.account_number.clone(),
            account_holder: account.account_holder.clone(),
            raw_data: serde_json::json!({
                "source": "text_fallback",
                "line": captures.get(0).map(|m| m.as_str()).unwrap_or_default(),
            }),
        });
    }
    transactions
}
