#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Row schemas for spreadsheet emission, one schema per document type.
//! Only the schemas are fixed here; styling and workbook mechanics belong
//! to whatever writes the bytes.

use pajak_parsers::parse_amount_minor;
use pajak_storage::ScanResult;
use serde::Serialize;
use thiserror::Error;

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// The seven-column rekening-koran layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RekeningKoranRow {
    #[serde(rename = "Tanggal")]
    pub tanggal: String,
    #[serde(rename = "Nilai Uang Masuk")]
    pub nilai_uang_masuk: String,
    #[serde(rename = "Nilai Uang Keluar")]
    pub nilai_uang_keluar: String,
    #[serde(rename = "Saldo")]
    pub saldo: String,
    #[serde(rename = "Sumber Uang Masuk")]
    pub sumber_uang_masuk: String,
    #[serde(rename = "Tujuan Uang Keluar")]
    pub tujuan_uang_keluar: String,
    #[serde(rename = "Keterangan")]
    pub keterangan: String,
}

/// Faktur pajak layout: seller block, buyer block, invoice and financial
/// fields, then the item aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FakturPajakRow {
    #[serde(rename = "Nama Seller")]
    pub nama_seller: String,
    #[serde(rename = "Alamat Seller")]
    pub alamat_seller: String,
    #[serde(rename = "NPWP Seller")]
    pub npwp_seller: String,
    #[serde(rename = "Nama Buyer")]
    pub nama_buyer: String,
    #[serde(rename = "Alamat Buyer")]
    pub alamat_buyer: String,
    #[serde(rename = "NPWP Buyer")]
    pub npwp_buyer: String,
    #[serde(rename = "Email Buyer")]
    pub email_buyer: String,
    #[serde(rename = "Tgl")]
    pub tanggal: String,
    #[serde(rename = "Nomor Faktur")]
    pub nomor_faktur: String,
    #[serde(rename = "DPP")]
    pub dpp: String,
    #[serde(rename = "PPN")]
    pub ppn: String,
    #[serde(rename = "Total")]
    pub total: String,
    #[serde(rename = "Invoice")]
    pub invoice: String,
    #[serde(rename = "Nama Barang Kena Pajak / Jasa Kena Pajak")]
    pub nama_barang_jasa: String,
    #[serde(rename = "Quantity")]
    pub quantity: String,
    #[serde(rename = "Nilai Barang")]
    pub nilai_barang: String,
    #[serde(rename = "Total Nilai Barang")]
    pub total_nilai_barang: String,
}

/// Commercial invoice layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRow {
    #[serde(rename = "No. Invoice")]
    pub invoice_number: String,
    #[serde(rename = "Tanggal")]
    pub tanggal: String,
    #[serde(rename = "Kepada")]
    pub kepada: String,
    #[serde(rename = "Alamat")]
    pub alamat: String,
    #[serde(rename = "NPWP")]
    pub npwp: String,
    #[serde(rename = "Deskripsi")]
    pub deskripsi: String,
    #[serde(rename = "Qty")]
    pub qty: String,
    #[serde(rename = "Harga Satuan")]
    pub harga_satuan: String,
    #[serde(rename = "Subtotal")]
    pub subtotal: String,
    #[serde(rename = "Total")]
    pub total: String,
}

/// PPh 23 withholding-certificate layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pph23Row {
    #[serde(rename = "Nama Wajib Pajak")]
    pub nama_wajib_pajak: String,
    #[serde(rename = "NPWP")]
    pub npwp: String,
    #[serde(rename = "Tanggal")]
    pub tanggal: String,
    #[serde(rename = "Nomor Bukti Potong")]
    pub nomor_bukti_potong: String,
    #[serde(rename = "Jenis Penghasilan")]
    pub jenis_penghasilan: String,
    #[serde(rename = "Jumlah Bruto")]
    pub jumlah_bruto: String,
    #[serde(rename = "Tarif")]
    pub tarif: String,
    #[serde(rename = "PPh Dipotong")]
    pub pph_dipotong: String,
    #[serde(rename = "Keterangan")]
    pub keterangan: String,
}

/// Fallback row for document types without a dedicated schema. Today that
/// is PPh 21 only, whose sheet layout never shipped upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummaryRow {
    #[serde(rename = "Nama File")]
    pub filename: String,
    #[serde(rename = "Jenis Dokumen")]
    pub document_type: String,
    #[serde(rename = "Nomor")]
    pub nomor: String,
    #[serde(rename = "Tanggal")]
    pub tanggal: String,
    #[serde(rename = "Penjual")]
    pub penjual: String,
    #[serde(rename = "DPP")]
    pub dpp: String,
    #[serde(rename = "PPN")]
    pub ppn: String,
    #[serde(rename = "Total")]
    pub total: String,
    #[serde(rename = "Confidence")]
    pub confidence: String,
}

/// Builds the rekening-koran rows out of one scan result's extracted data.
#[must_use]
pub fn rekening_koran_rows(result: &ScanResult) -> Vec<RekeningKoranRow> {
    let Some(rows) = result
        .extracted_data
        .get("transactions")
        .and_then(serde_json::Value::as_array)
    else {
        return Vec::new();
    };

    rows.iter()
        .map(|row| {
            let keterangan = text_field(row, "keterangan");
            let masuk = text_field(row, "kredit");
            let keluar = text_field(row, "debet");
            let credit_positive = is_positive_amount(&masuk);
            let debit_positive = is_positive_amount(&keluar);
            RekeningKoranRow {
                tanggal: text_field(row, "tanggal"),
                nilai_uang_masuk: if credit_positive { masuk } else { "0".into() },
                nilai_uang_keluar: if debit_positive { keluar } else { "0".into() },
                saldo: text_field(row, "saldo"),
                sumber_uang_masuk: if credit_positive {
                    classify_source(&keterangan)
                } else {
                    String::new()
                },
                tujuan_uang_keluar: if debit_positive {
                    classify_destination(&keterangan)
                } else {
                    String::new()
                },
                keterangan,
            }
        })
        .collect()
}

/// One row per faktur-pajak scan result.
#[must_use]
pub fn faktur_pajak_rows(results: &[ScanResult]) -> Vec<FakturPajakRow> {
    results
        .iter()
        .filter(|result| result.document_type == "faktur_pajak")
        .map(|result| {
            let source = mapped_source(result);
            let items = source
                .get("items")
                .and_then(serde_json::Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            FakturPajakRow {
                nama_seller: field_or_na(source, &["seller", "name"], &["nama_penjual"]),
                alamat_seller: field_or_na(source, &["seller", "address"], &["alamat_penjual"]),
                npwp_seller: field_or_na(source, &["seller", "npwp"], &["npwp_penjual"]),
                nama_buyer: field_or_na(source, &["buyer", "name"], &["nama_pembeli"]),
                alamat_buyer: field_or_na(source, &["buyer", "address"], &["alamat_pembeli"]),
                npwp_buyer: field_or_na(source, &["buyer", "npwp"], &["npwp_pembeli"]),
                email_buyer: field_or_na(source, &["buyer", "email"], &["email_pembeli"]),
                tanggal: date_or_na(source, &[&["invoice", "issueDate"], &["invoice", "issue_date"], &["tanggal_faktur"]]),
                nomor_faktur: field_or_na(source, &["invoice", "number"], &["nomor_faktur"]),
                dpp: rupiah_field(source, &["financials", "dpp"]),
                ppn: rupiah_field(source, &["financials", "ppn"]),
                total: rupiah_field(source, &["financials", "total"]),
                invoice: field_or_na(source, &["invoice", "reference"], &["invoice"]),
                nama_barang_jasa: items_description_list(items),
                quantity: items_total_quantity(items),
                nilai_barang: items_unit_price_list(items),
                total_nilai_barang: items_total_value(items),
            }
        })
        .collect()
}

/// One row per commercial-invoice scan result.
#[must_use]
pub fn invoice_rows(results: &[ScanResult]) -> Vec<InvoiceRow> {
    results
        .iter()
        .filter(|result| result.document_type == "invoice")
        .map(|result| {
            let source = mapped_source(result);
            let items = source
                .get("items")
                .and_then(serde_json::Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            InvoiceRow {
                invoice_number: field_or_na(source, &["invoice", "number"], &["invoice_number"]),
                tanggal: date_or_na(source, &[&["invoice", "issueDate"], &["invoice", "issue_date"], &["tanggal"]]),
                kepada: field_or_na(source, &["buyer", "name"], &["kepada"]),
                alamat: field_or_na(source, &["buyer", "address"], &["alamat"]),
                npwp: field_or_na(source, &["buyer", "npwp"], &["npwp"]),
                deskripsi: nested_text(source, &["deskripsi"])
                    .unwrap_or_else(|| items_description_list(items)),
                qty: nested_text(source, &["qty"])
                    .unwrap_or_else(|| items_total_quantity(items)),
                harga_satuan: nested_text(source, &["harga_satuan"])
                    .unwrap_or_else(|| items_unit_price_list(items)),
                subtotal: rupiah_at(source, &["financials", "subtotal"])
                    .or_else(|| rupiah_at(source, &["financials", "dpp"]))
                    .or_else(|| nested_text(source, &["subtotal"]))
                    .unwrap_or_else(|| "N/A".into()),
                total: rupiah_field(source, &["financials", "total"]),
            }
        })
        .collect()
}

/// One row per PPh 23 scan result. The field sources follow the raw-text
/// envelope the PPh parser persists.
#[must_use]
pub fn pph23_rows(results: &[ScanResult]) -> Vec<Pph23Row> {
    results
        .iter()
        .filter(|result| result.document_type == "pph23")
        .map(|result| {
            let source = mapped_source(result);
            Pph23Row {
                nama_wajib_pajak: field_or_na(
                    source,
                    &["identitas_penerima_penghasilan", "nama"],
                    &["nama_wp"],
                ),
                npwp: field_or_na(
                    source,
                    &["identitas_penerima_penghasilan", "npwp_nik"],
                    &["npwp"],
                ),
                tanggal: date_or_na(source, &[&["tanggal"], &["document", "date"]]),
                nomor_bukti_potong: field_or_na(source, &["nomor"], &["nomor_bukti_potong"]),
                jenis_penghasilan: field_or_na(source, &["jenis_penghasilan"], &["masa_pajak"]),
                jumlah_bruto: rupiah_field(source, &["penghasilan_bruto"]),
                tarif: field_or_na(source, &["tarif"], &[]),
                pph_dipotong: rupiah_field(source, &["pph"]),
                keterangan: field_or_na(source, &["keterangan"], &[]),
            }
        })
        .collect()
}

/// Fallback rows for the document types without a dedicated schema.
#[must_use]
pub fn document_summary_rows(results: &[ScanResult]) -> Vec<DocumentSummaryRow> {
    results
        .iter()
        .filter(|result| {
            !matches!(
                result.document_type.as_str(),
                "rekening_koran" | "faktur_pajak" | "invoice" | "pph23"
            )
        })
        .map(|result| {
            let source = mapped_source(result);
            DocumentSummaryRow {
                filename: result.original_filename.clone(),
                document_type: result.document_type.clone(),
                nomor: field_or_na(source, &["invoice", "number"], &["nomor"]),
                tanggal: date_or_na(source, &[&["invoice", "issueDate"], &["tanggal"]]),
                penjual: field_or_na(source, &["seller", "name"], &["nama_penjual"]),
                dpp: field_or_na(source, &["financials", "dpp"], &["dpp"]),
                ppn: field_or_na(source, &["financials", "ppn"], &["ppn"]),
                total: field_or_na(source, &["financials", "total"], &["total"]),
                confidence: format!("{:.2}", result.confidence),
            }
        })
        .collect()
}

/// Serializes rows as CSV with the schema headers.
pub fn write_csv<T: Serialize>(rows: &[T]) -> ExportResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| ExportError::Serialize(err.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Serialize(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| ExportError::Serialize(err.to_string()))
}

const SOURCE_RULES: [(&[&str], &str); 5] = [
    (&["TRANSFER", "TRSF", "TRF"], "Transfer Masuk"),
    (&["SETORAN", "SETOR", "DEPOSIT"], "Setoran"),
    (&["BUNGA", "INTEREST"], "Bunga Bank"),
    (&["GAJI", "SALARY"], "Gaji"),
    (&["KLIRING", "CLEARING"], "Kliring"),
];

const DESTINATION_RULES: [(&[&str], &str); 6] = [
    (&["ATM", "WITHDRAWAL", "TARIK TUNAI"], "Penarikan ATM"),
    (&["TRANSFER", "TRSF", "TRF"], "Transfer Keluar"),
    (&["BIAYA ADM", "ADMIN", "ADM"], "Biaya Admin"),
    (&["PAJAK", "TAX"], "Pajak"),
    (&["PULSA", "LISTRIK", "PDAM", "BPJS"], "Pembayaran Tagihan"),
    (&["DEBET", "DEBIT"], "Pembayaran"),
];

#[must_use]
pub fn classify_source(description: &str) -> String {
    let upper = description.to_uppercase();
    for (keywords, label) in SOURCE_RULES {
        if keywords.iter().any(|keyword| upper.contains(keyword)) {
            return (*label).to_string();
        }
    }
    "Transfer Masuk".to_string()
}

#[must_use]
pub fn classify_destination(description: &str) -> String {
    let upper = description.to_uppercase();
    for (keywords, label) in DESTINATION_RULES {
        if keywords.iter().any(|keyword| upper.contains(keyword)) {
            return (*label).to_string();
        }
    }
    "Pembayaran".to_string()
}

/// The smart-mapped payload when present; the flat envelope otherwise.
fn mapped_source(result: &ScanResult) -> &serde_json::Value {
    result
        .extracted_data
        .get("smart_mapped")
        .unwrap_or(&result.extracted_data)
}

fn text_field(row: &serde_json::Value, key: &str) -> String {
    match row.get(key) {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn nested_text(value: &serde_json::Value, path: &[&str]) -> Option<String> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key)?;
    }
    match cursor {
        serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Primary path first, then the flat fallback key, then `N/A`.
fn field_or_na(source: &serde_json::Value, primary: &[&str], fallback: &[&str]) -> String {
    nested_text(source, primary)
        .or_else(|| {
            if fallback.is_empty() {
                None
            } else {
                nested_text(source, fallback)
            }
        })
        .unwrap_or_else(|| "N/A".into())
}

fn date_or_na(source: &serde_json::Value, paths: &[&[&str]]) -> String {
    paths
        .iter()
        .find_map(|path| nested_text(source, path))
        .unwrap_or_else(|| "N/A".into())
}

/// `Rp 1.000.000` style, no decimals, as printed on the sheets.
fn rupiah(minor: i64) -> String {
    let units = minor / 100;
    let negative = units < 0;
    let digits = units.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if negative { "-" } else { "" };
    format!("Rp {sign}{grouped}")
}

fn rupiah_at(source: &serde_json::Value, path: &[&str]) -> Option<String> {
    nested_text(source, path)
        .as_deref()
        .and_then(parse_amount_minor)
        .map(rupiah)
}

fn rupiah_field(source: &serde_json::Value, path: &[&str]) -> String {
    rupiah_at(source, path).unwrap_or_else(|| "N/A".into())
}

fn item_text(item: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| nested_text(item, &[key]))
}

fn item_quantity(item: &serde_json::Value) -> f64 {
    item_text(item, &["quantity", "qty"])
        .map(|raw| {
            raw.chars()
                .filter(|ch| ch.is_ascii_digit() || *ch == '.')
                .collect::<String>()
        })
        .and_then(|cleaned| cleaned.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn item_unit_price_minor(item: &serde_json::Value) -> Option<i64> {
    item_text(item, &["unitPrice", "unit_price", "harga_satuan"])
        .as_deref()
        .and_then(parse_amount_minor)
}

/// A single item prints bare; several items print as a numbered list.
fn items_description_list(items: &[serde_json::Value]) -> String {
    let descriptions = items
        .iter()
        .filter_map(|item| item_text(item, &["description", "deskripsi"]))
        .collect::<Vec<_>>();
    match descriptions.len() {
        0 => "N/A".into(),
        1 => descriptions[0].clone(),
        _ => descriptions
            .iter()
            .enumerate()
            .map(|(index, description)| format!("{}. {description}", index + 1))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn items_total_quantity(items: &[serde_json::Value]) -> String {
    let total: f64 = items.iter().map(item_quantity).sum();
    if total == 0.0 {
        "-".into()
    } else if total.fract() == 0.0 {
        format!("{}", total as i64)
    } else {
        format!("{total:.2}")
    }
}

fn items_unit_price_list(items: &[serde_json::Value]) -> String {
    let prices = items
        .iter()
        .map(|item| {
            item_unit_price_minor(item)
                .map(rupiah)
                .unwrap_or_else(|| "-".into())
        })
        .collect::<Vec<_>>();
    match prices.len() {
        0 => "-".into(),
        1 => prices[0].clone(),
        _ => prices
            .iter()
            .enumerate()
            .map(|(index, price)| format!("{}. {price}", index + 1))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Sum of quantity times unit price across all items.
fn items_total_value(items: &[serde_json::Value]) -> String {
    let mut grand_total = 0i64;
    for item in items {
        let quantity = item_quantity(item);
        if quantity == 0.0 {
            continue;
        }
        if let Some(price) = item_unit_price_minor(item) {
            grand_total += (quantity * price as f64).round() as i64;
        }
    }
    if grand_total == 0 {
        "-".into()
    } else {
        rupiah(grand_total)
    }
}

fn is_positive_amount(value: &str) -> bool {
    pajak_parsers::parse_amount_minor(value).is_some_and(|minor| minor > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn bank_result() -> ScanResult {
        ScanResult {
            id: "result-1".into(),
            batch_id: "batch-1".into(),
            document_file_id: "file-1".into(),
            document_type: "rekening_koran".into(),
            original_filename: "rekening.pdf".into(),
            raw_text: String::new(),
            extracted_data: serde_json::json!({
                "transactions": [
                    {"tanggal": "2024-03-01", "keterangan": "SETORAN TUNAI", "debet": "0.00", "kredit": "1000000.00", "saldo": "11000000.00"},
                    {"tanggal": "2024-03-02", "keterangan": "TARIK TUNAI ATM", "debet": "500000.00", "kredit": "0.00", "saldo": "10500000.00"},
                    {"tanggal": "2024-03-03", "keterangan": "BIAYA ADM", "debet": "15000.00", "kredit": "0.00", "saldo": "10485000.00"},
                ],
            }),
            confidence: 0.95,
            engine_used: "test".into(),
            processing_time_seconds: 0.2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn faktur_result() -> ScanResult {
        ScanResult {
            document_type: "faktur_pajak".into(),
            original_filename: "faktur.pdf".into(),
            extracted_data: serde_json::json!({
                "smart_mapped": {
                    "seller": {
                        "name": "PT A",
                        "address": "Jl. Sudirman No. 1, Jakarta",
                        "npwp": "01.234.567.8-901.000",
                    },
                    "buyer": {
                        "name": "PT B",
                        "address": "Jl. Gatot Subroto No. 2, Jakarta",
                        "npwp": "09.876.543.2-109.000",
                        "email": "finance@ptb.example",
                    },
                    "invoice": {
                        "number": "010.000-24.00000001",
                        "issueDate": "10/03/2024",
                        "reference": "INV-2024-031",
                    },
                    "financials": {"dpp": "1.000.000", "ppn": "110.000", "total": "1.110.000"},
                    "items": [
                        {"description": "Jasa konsultasi", "quantity": 2, "unitPrice": "400.000"},
                        {"description": "Pelatihan staf", "quantity": 1, "unitPrice": "200.000"},
                    ],
                }
            }),
            ..bank_result()
        }
    }

    #[test]
    fn bank_rows_classify_sources_and_destinations() {
        let rows = rekening_koran_rows(&bank_result());
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].sumber_uang_masuk, "Setoran");
        assert_eq!(rows[0].tujuan_uang_keluar, "");
        assert_eq!(rows[0].nilai_uang_masuk, "1000000.00");

        assert_eq!(rows[1].tujuan_uang_keluar, "Penarikan ATM");
        assert_eq!(rows[1].sumber_uang_masuk, "");
        assert_eq!(rows[1].nilai_uang_masuk, "0");

        assert_eq!(rows[2].tujuan_uang_keluar, "Biaya Admin");
    }

    #[test]
    fn csv_emission_uses_schema_headers() {
        let rows = rekening_koran_rows(&bank_result());
        let csv = write_csv(&rows).expect("csv");
        let header = csv.lines().next().expect("header");
        assert_eq!(
            header,
            "Tanggal,Nilai Uang Masuk,Nilai Uang Keluar,Saldo,Sumber Uang Masuk,Tujuan Uang Keluar,Keterangan"
        );
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn faktur_rows_carry_seller_buyer_and_item_aggregates() {
        let rows = faktur_pajak_rows(&[faktur_result(), bank_result()]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];

        assert_eq!(row.nama_seller, "PT A");
        assert_eq!(row.alamat_seller, "Jl. Sudirman No. 1, Jakarta");
        assert_eq!(row.npwp_buyer, "09.876.543.2-109.000");
        assert_eq!(row.email_buyer, "finance@ptb.example");
        assert_eq!(row.tanggal, "10/03/2024");
        assert_eq!(row.nomor_faktur, "010.000-24.00000001");
        assert_eq!(row.dpp, "Rp 1.000.000");
        assert_eq!(row.ppn, "Rp 110.000");
        assert_eq!(row.total, "Rp 1.110.000");
        assert_eq!(row.invoice, "INV-2024-031");
        assert_eq!(row.nama_barang_jasa, "1. Jasa konsultasi\n2. Pelatihan staf");
        assert_eq!(row.quantity, "3");
        assert_eq!(row.nilai_barang, "1. Rp 400.000\n2. Rp 200.000");
        // 2 x 400.000 + 1 x 200.000
        assert_eq!(row.total_nilai_barang, "Rp 1.000.000");
    }

    #[test]
    fn faktur_csv_emits_the_seventeen_column_header() {
        let csv = write_csv(&faktur_pajak_rows(&[faktur_result()])).expect("csv");
        let header = csv.lines().next().expect("header");
        assert_eq!(
            header,
            "Nama Seller,Alamat Seller,NPWP Seller,Nama Buyer,Alamat Buyer,NPWP Buyer,\
             Email Buyer,Tgl,Nomor Faktur,DPP,PPN,Total,Invoice,\
             Nama Barang Kena Pajak / Jasa Kena Pajak,Quantity,Nilai Barang,Total Nilai Barang"
        );
    }

    #[test]
    fn missing_faktur_fields_fall_back_to_na() {
        let sparse = ScanResult {
            document_type: "faktur_pajak".into(),
            extracted_data: serde_json::json!({
                "smart_mapped": {
                    "seller": {"name": "PT A"},
                    "invoice": {"number": "010.000-24.00000002"},
                }
            }),
            ..bank_result()
        };
        let rows = faktur_pajak_rows(&[sparse]);
        let row = &rows[0];

        assert_eq!(row.alamat_seller, "N/A");
        assert_eq!(row.email_buyer, "N/A");
        assert_eq!(row.tanggal, "N/A");
        assert_eq!(row.dpp, "N/A");
        assert_eq!(row.nama_barang_jasa, "N/A");
        assert_eq!(row.quantity, "-");
        assert_eq!(row.nilai_barang, "-");
        assert_eq!(row.total_nilai_barang, "-");
    }

    #[test]
    fn invoice_rows_use_the_invoice_schema() {
        let invoice = ScanResult {
            document_type: "invoice".into(),
            original_filename: "invoice.pdf".into(),
            extracted_data: serde_json::json!({
                "smart_mapped": {
                    "buyer": {"name": "CV SENTOSA", "address": "Bandung", "npwp": "11.222.333.4-555.000"},
                    "invoice": {"number": "INV-77", "issueDate": "12/03/2024"},
                    "financials": {"subtotal": "900.000", "total": "999.000"},
                    "items": [{"description": "Sewa alat", "quantity": 3, "unitPrice": "300.000"}],
                }
            }),
            ..bank_result()
        };
        let rows = invoice_rows(&[invoice, bank_result()]);

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.invoice_number, "INV-77");
        assert_eq!(row.kepada, "CV SENTOSA");
        assert_eq!(row.deskripsi, "Sewa alat");
        assert_eq!(row.qty, "3");
        assert_eq!(row.harga_satuan, "Rp 300.000");
        assert_eq!(row.subtotal, "Rp 900.000");
        assert_eq!(row.total, "Rp 999.000");

        let header = write_csv(&rows).expect("csv");
        assert_eq!(
            header.lines().next().expect("header"),
            "No. Invoice,Tanggal,Kepada,Alamat,NPWP,Deskripsi,Qty,Harga Satuan,Subtotal,Total"
        );
    }

    #[test]
    fn pph23_rows_read_the_withholding_envelope() {
        let pph = ScanResult {
            document_type: "pph23".into(),
            original_filename: "bukti-potong.pdf".into(),
            extracted_data: serde_json::json!({
                "smart_mapped": {
                    "identitas_penerima_penghasilan": {
                        "nama": "PT JASA MANDIRI",
                        "npwp_nik": "02.345.678.9-012.000",
                    },
                    "nomor": "BP-23/0812",
                    "tanggal": "15/03/2024",
                    "jenis_penghasilan": "Jasa teknik",
                    "penghasilan_bruto": "5.000.000",
                    "tarif": "2%",
                    "pph": "100.000",
                }
            }),
            ..bank_result()
        };
        let rows = pph23_rows(&[pph]);

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.nama_wajib_pajak, "PT JASA MANDIRI");
        assert_eq!(row.nomor_bukti_potong, "BP-23/0812");
        assert_eq!(row.jumlah_bruto, "Rp 5.000.000");
        assert_eq!(row.tarif, "2%");
        assert_eq!(row.pph_dipotong, "Rp 100.000");

        let header = write_csv(&rows).expect("csv");
        assert_eq!(
            header.lines().next().expect("header"),
            "Nama Wajib Pajak,NPWP,Tanggal,Nomor Bukti Potong,Jenis Penghasilan,\
             Jumlah Bruto,Tarif,PPh Dipotong,Keterangan"
        );
    }

    #[test]
    fn summary_rows_cover_only_types_without_a_schema() {
        let pph21 = ScanResult {
            document_type: "pph21".into(),
            original_filename: "pph21.pdf".into(),
            extracted_data: serde_json::json!({
                "nomor": "1.3-08.23/0001",
                "tanggal": "20/03/2024",
            }),
            ..bank_result()
        };
        let rows = document_summary_rows(&[pph21, faktur_result(), bank_result()]);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document_type, "pph21");
        assert_eq!(rows[0].nomor, "1.3-08.23/0001");
    }

    #[test]
    fn classification_defaults() {
        assert_eq!(classify_source("MUTASI LAIN"), "Transfer Masuk");
        assert_eq!(classify_destination("MUTASI LAIN"), "Pembayaran");
        assert_eq!(classify_destination("BAYAR LISTRIK PLN"), "Pembayaran Tagihan");
        assert_eq!(classify_source("BUNGA DEPOSITO"), "Setoran");
    }

    #[test]
    fn rupiah_formatting_groups_without_decimals() {
        assert_eq!(rupiah(100_000_000), "Rp 1.000.000");
        assert_eq!(rupiah(50), "Rp 0");
        assert_eq!(rupiah(-12_345_00), "Rp -12.345");
    }
}
