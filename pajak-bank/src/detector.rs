use std::sync::Arc;

use crate::BankAdapter;
use crate::adapters;

/// Ordered bank detection. More specific adapters sit before their generic
/// peers (Mandiri V2 before V1, BNI V2 before V1, BCA Syariah before BCA);
/// ties go to the earlier entry, so the order is load-bearing and tested.
pub struct BankDetector {
    adapters: Vec<Arc<dyn BankAdapter>>,
}

impl Default for BankDetector {
    fn default() -> Self {
        Self {
            adapters: adapters::canonical_adapters(),
        }
    }
}

impl BankDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn adapters(&self) -> &[Arc<dyn BankAdapter>] {
        &self.adapters
    }

    /// Returns the first adapter whose keyword set matches the text.
    #[must_use]
    pub fn detect(&self, text: &str) -> Option<Arc<dyn BankAdapter>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.detect(text))
            .cloned()
    }

    #[must_use]
    pub fn detect_bank_name(&self, text: &str) -> String {
        self.detect(text)
            .map(|adapter| adapter.bank_name().to_string())
            .unwrap_or_else(|| "Unknown Bank".to_string())
    }

    #[must_use]
    pub fn detect_bank_code(&self, text: &str) -> String {
        self.detect(text)
            .map(|adapter| adapter.bank_code().to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }

    #[must_use]
    pub fn adapter_by_code(&self, bank_code: &str) -> Option<Arc<dyn BankAdapter>> {
        let upper = bank_code.to_uppercase();
        self.adapters
            .iter()
            .find(|adapter| adapter.bank_code() == upper)
            .cloned()
    }

    #[must_use]
    pub fn supported_banks(&self) -> Vec<(String, String)> {
        self.adapters
            .iter()
            .map(|adapter| {
                (
                    adapter.bank_code().to_string(),
                    adapter.bank_name().to_string(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn specific_adapters_win_over_generic_peers() {
        let detector = BankDetector::new();

        // Both "BCA" and "BCA SYARIAH" keyword families are present; the
        // Syariah adapter sits earlier in the list and must win.
        let text = "PT BANK BCA SYARIAH\nTANGGAL EFEKTIF TANGGAL TRANSAKSI\nBCA MUTASI";
        assert_eq!(detector.detect_bank_code(text), "BCA_SYARIAH");

        let text = "PT BANK MANDIRI (PERSERO)\nKET. KODE TRANSAKSI\nJENIS TRANS";
        assert_eq!(detector.detect_bank_code(text), "MANDIRI_V2");

        let text = "BANK NEGARA INDONESIA\nEFFECTIVE DATE DB/CR JOURNAL";
        assert_eq!(detector.detect_bank_code(text), "BNI_V2");
    }

    #[test]
    fn generic_adapters_still_match_without_specific_markers() {
        let detector = BankDetector::new();
        let text = "PT BANK CENTRAL ASIA\nKETERANGAN CBG MUTASI SALDO";
        assert_eq!(detector.detect_bank_code(text), "BCA");
    }

    #[test]
    fn unknown_statement_detects_nothing() {
        let detector = BankDetector::new();
        assert!(detector.detect("MONTHLY STATEMENT OF SOME FOREIGN BANK").is_none());
        assert_eq!(detector.detect_bank_name("nothing here"), "Unknown Bank");
    }

    #[test]
    fn adapter_order_is_stable() {
        let detector = BankDetector::new();
        let codes = detector
            .supported_banks()
            .into_iter()
            .map(|(code, _)| code)
            .collect::<Vec<_>>();
        assert_eq!(
            codes,
            vec![
                "MANDIRI_V2",
                "MANDIRI_V1",
                "BNI_V2",
                "BNI_V1",
                "BCA_SYARIAH",
                "BCA",
                "CIMB_NIAGA",
                "MUFG",
                "PERMATA",
                "BRI",
                "OCBC",
                "BSI_SYARIAH",
            ]
        );
    }

    #[test]
    fn lookup_by_code_is_case_insensitive() {
        let detector = BankDetector::new();
        let adapter = detector.adapter_by_code("bni_v1").expect("adapter");
        assert_eq!(adapter.bank_name(), "Bank BNI");
    }
}
