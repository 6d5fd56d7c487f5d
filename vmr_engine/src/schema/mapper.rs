use std::collections::HashMap;

use log::{debug, trace};
use regex::Regex;

use super::signatures::{signatures, SchemaSignature, OPTIONAL_BONUS, OPTIONAL_BONUS_CAP};
use crate::db_types::SourceKind;

/// Canonical field name → the actual header carrying it in this file.
pub type FieldMapping = HashMap<&'static str, String>;

/// Guards the threshold comparison against float rounding: a score that is mathematically equal to the threshold
/// must be accepted.
const SCORE_EPS: f64 = 1e-9;

/// Lowercase a header and collapse every run of punctuation or whitespace into a single space.
pub fn normalize_header(header: &str) -> String {
    let squash = Regex::new(r"[^0-9a-zа-яё]+").unwrap_or_else(|e| panic!("invalid header regex: {e}"));
    squash.replace_all(&header.to_lowercase(), " ").trim().to_string()
}

/// Score a header row against one signature.
///
/// Every matched required field contributes `1/required_count`; every matched optional field adds
/// [`OPTIONAL_BONUS`], capped at [`OPTIONAL_BONUS_CAP`]; the total is capped at 1.0. The returned mapping holds
/// every field that found a header, required and optional alike.
pub fn score_headers(sig: &SchemaSignature, headers: &[String]) -> (f64, FieldMapping) {
    let normalized: Vec<(String, &String)> = headers.iter().map(|h| (normalize_header(h), h)).collect();
    // Signature keywords are already in normalized form, so headers alone go through the regex.
    let find = |keywords: &[&str]| {
        normalized
            .iter()
            .find(|(norm, _)| keywords.iter().any(|kw| norm.contains(kw)))
            .map(|(_, original)| (*original).clone())
    };

    let mut mapping = FieldMapping::new();
    let mut required_hits = 0usize;
    for field in sig.required {
        if let Some(header) = find(field.keywords) {
            mapping.insert(field.name, header);
            required_hits += 1;
        }
    }
    let mut bonus = 0.0;
    for field in sig.optional {
        if let Some(header) = find(field.keywords) {
            mapping.insert(field.name, header);
            bonus += OPTIONAL_BONUS;
        }
    }
    let required_score = required_hits as f64 / sig.required.len() as f64;
    let score = (required_score + bonus.min(OPTIONAL_BONUS_CAP)).min(1.0);
    (score, mapping)
}

/// Resolve the source kind and field mapping for a header row.
///
/// With a `hint`, only that kind's signature is scored. Without one, every signature is scored and the
/// highest-scoring kind that clears its own threshold wins; ties go to the earlier signature (primary log first,
/// gateways last). `None` means no kind recognized the file and the caller should skip it.
pub fn detect_schema(headers: &[String], hint: Option<SourceKind>) -> Option<(SourceKind, FieldMapping)> {
    let mut best: Option<(f64, SourceKind, FieldMapping)> = None;
    for sig in signatures() {
        if hint.is_some_and(|kind| kind != sig.kind) {
            continue;
        }
        let (score, mapping) = score_headers(sig, headers);
        trace!("🗂️ {} scored {score:.2} against {} headers", sig.kind, headers.len());
        if score + SCORE_EPS < sig.threshold {
            continue;
        }
        if best.as_ref().map_or(true, |(top, _, _)| score > *top) {
            best = Some((score, sig.kind, mapping));
        }
    }
    best.map(|(score, kind, mapping)| {
        debug!("🗂️ Detected {kind} schema (score {score:.2})");
        (kind, mapping)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn primary_headers() -> Vec<String> {
        headers(&[
            "Order number",
            "Machine code",
            "Address",
            "Goods name",
            "Order price",
            "Creation time",
            "Paying time",
            "Brewing time",
            "Delivery time",
            "Refund time",
            "Order resource",
        ])
    }

    #[test]
    fn normalization_is_case_and_punctuation_insensitive() {
        assert_eq!(normalize_header("  Order__Number!  "), "order number");
        assert_eq!(normalize_header("FISCAL_CHECK_NUMBER"), "fiscal check number");
        assert_eq!(normalize_header("Номер Заказа"), "номер заказа");
    }

    #[test]
    fn primary_log_detected_from_machine_export_headers() {
        let (kind, mapping) = detect_schema(&primary_headers(), None).unwrap();
        assert_eq!(kind, SourceKind::PrimaryLog);
        assert_eq!(mapping.get("order_number").unwrap(), "Order number");
        assert_eq!(mapping.get("refund_time").unwrap(), "Refund time");
    }

    #[test]
    fn gateway_files_resolve_to_their_own_provider() {
        let payme = headers(&[
            "transaction_id",
            "transaction_time",
            "amount",
            "masked_pan",
            "merchant_id",
            "terminal_id",
            "status",
        ]);
        let (kind, _) = detect_schema(&payme, None).unwrap();
        assert_eq!(kind, SourceKind::GatewayPayme);

        let click = headers(&[
            "transaction_id",
            "transaction_time",
            "amount",
            "card_number",
            "merchant_id",
            "service_id",
            "status",
        ]);
        let (kind, _) = detect_schema(&click, None).unwrap();
        assert_eq!(kind, SourceKind::GatewayClick);

        let uzum =
            headers(&["transaction_id", "transaction_time", "amount", "masked_pan", "shop_id", "merchant_id"]);
        let (kind, _) = detect_schema(&uzum, None).unwrap();
        assert_eq!(kind, SourceKind::GatewayUzum);
    }

    #[test]
    fn unrelated_headers_are_rejected() {
        let noise = headers(&["Employee", "Department", "Salary", "Hired"]);
        assert!(detect_schema(&noise, None).is_none());
    }

    #[test]
    fn hint_restricts_detection_to_one_kind() {
        let rows = primary_headers();
        assert!(detect_schema(&rows, Some(SourceKind::FiscalReceipt)).is_none());
        let (kind, _) = detect_schema(&rows, Some(SourceKind::PrimaryLog)).unwrap();
        assert_eq!(kind, SourceKind::PrimaryLog);
    }

    #[test]
    fn score_exactly_at_threshold_is_accepted() {
        // Fiscal: 2 of 4 required (0.5) + all three optional fields (capped bonus 0.3) = 0.8, the fiscal threshold.
        let boundary = headers(&[
            "fiscal_check_number",
            "taxpayer_id",
            "cash_register_id",
            "shift_number",
            "receipt_type",
        ]);
        let sig = signatures().iter().find(|s| s.kind == SourceKind::FiscalReceipt).unwrap();
        let (score, _) = score_headers(sig, &boundary);
        assert!((score - 0.8).abs() < 1e-6);
        let (kind, _) = detect_schema(&boundary, Some(SourceKind::FiscalReceipt)).unwrap();
        assert_eq!(kind, SourceKind::FiscalReceipt);
    }

    #[test]
    fn one_keyword_below_threshold_is_rejected() {
        // Dropping one optional field leaves 0.5 + 0.2 = 0.7, one step under the fiscal threshold.
        let below = headers(&["fiscal_check_number", "taxpayer_id", "cash_register_id", "shift_number"]);
        assert!(detect_schema(&below, Some(SourceKind::FiscalReceipt)).is_none());
    }

    #[test]
    fn optional_bonus_is_capped() {
        // All nine primary optional fields present but only half the required ones: the bonus alone cannot push a
        // sparse file over the line.
        let sparse = headers(&[
            "Order number",
            "Machine code",
            "Order price",
            "Brewing time",
            "Refund time",
            "Goods name",
            "Taste name",
            "Address",
            "Order resource",
            "Payment status",
            "Brew status",
            "Reason",
        ]);
        let sig = signatures().iter().find(|s| s.kind == SourceKind::PrimaryLog).unwrap();
        let (score, _) = score_headers(sig, &sparse);
        assert!((score - 0.8).abs() < 1e-6);
    }
}
