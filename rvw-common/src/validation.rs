//! Identity-number and contact validation
//!
//! GSTIN checks both shape and the mod-36 check character. Other identifiers
//! are shape-only.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::models::{DocumentType, PayoutMethod};
use crate::{Error, Result};

static GSTIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").expect("valid GSTIN regex")
});
static PAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").expect("valid PAN regex"));
static AADHAAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[2-9][0-9]{11}$").expect("valid Aadhaar regex"));
static BANK_ACCOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{9,18}$").expect("valid account regex"));
static IFSC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{4}0[A-Z0-9]{6}$").expect("valid IFSC regex"));
static UPI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9.\-_]{2,256}@[a-zA-Z]{2,64}$").expect("valid UPI regex")
});
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("valid email regex")
});

const GSTIN_CHARSET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Trim and upper-case an identifier before validation or storage
pub fn normalize_identifier(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Compute the GSTIN check character for the first 14 characters
fn gstin_check_char(body: &[u8]) -> Option<char> {
    let mut sum: u32 = 0;
    for (i, c) in body.iter().enumerate() {
        let code = GSTIN_CHARSET.iter().position(|x| x == c)? as u32;
        let product = code * if i % 2 == 0 { 1 } else { 2 };
        sum += product / 36 + product % 36;
    }
    let check = (36 - sum % 36) % 36;
    Some(GSTIN_CHARSET[check as usize] as char)
}

/// Validate a GSTIN (format, state code and check character)
///
/// Returns the normalized GSTIN.
pub fn validate_gstin(input: &str) -> Result<String> {
    let gstin = normalize_identifier(input);

    if !GSTIN_RE.is_match(&gstin) {
        return Err(Error::InvalidInput(format!(
            "GSTIN '{}' does not match the 15-character GSTIN format",
            gstin
        )));
    }

    let state_code: u32 = gstin[0..2]
        .parse()
        .map_err(|_| Error::InvalidInput(format!("GSTIN '{}' has an invalid state code", gstin)))?;
    if !((1..=38).contains(&state_code) || state_code == 97) {
        return Err(Error::InvalidInput(format!(
            "GSTIN '{}' has unknown state code {:02}",
            gstin, state_code
        )));
    }

    let bytes = gstin.as_bytes();
    let expected = gstin_check_char(&bytes[..14])
        .ok_or_else(|| Error::InvalidInput(format!("GSTIN '{}' contains invalid characters", gstin)))?;
    if bytes[14] as char != expected {
        return Err(Error::InvalidInput(format!(
            "GSTIN '{}' has an invalid check character",
            gstin
        )));
    }

    Ok(gstin)
}

pub fn is_valid_pan(input: &str) -> bool {
    PAN_RE.is_match(&normalize_identifier(input))
}

/// Aadhaar numbers are often written in groups of four; spaces are ignored
pub fn is_valid_aadhaar(input: &str) -> bool {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    AADHAAR_RE.is_match(&digits)
}

pub fn is_valid_bank_account(input: &str) -> bool {
    BANK_ACCOUNT_RE.is_match(input.trim())
}

pub fn is_valid_ifsc(input: &str) -> bool {
    IFSC_RE.is_match(&normalize_identifier(input))
}

pub fn is_valid_upi(input: &str) -> bool {
    UPI_RE.is_match(input.trim())
}

pub fn is_valid_email(input: &str) -> bool {
    let s = input.trim();
    s.len() <= 254 && EMAIL_RE.is_match(s)
}

/// Validate a KYC document number for its document type
pub fn validate_document_number(document_type: DocumentType, number: &str) -> Result<()> {
    let ok = match document_type {
        DocumentType::Pan => is_valid_pan(number),
        DocumentType::Aadhaar => is_valid_aadhaar(number),
        DocumentType::BankAccount => is_valid_bank_account(number),
    };

    if ok {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Document number is not a valid {}",
            document_type.label()
        )))
    }
}

/// Validate withdrawal account details for the payout method
///
/// UPI payouts carry a VPA. Bank transfers carry `<account number>/<IFSC>`.
pub fn validate_payout_account(method: PayoutMethod, details: &str) -> Result<()> {
    let ok = match method {
        PayoutMethod::Upi => is_valid_upi(details),
        PayoutMethod::BankTransfer => match details.split_once('/') {
            Some((account, ifsc)) => is_valid_bank_account(account) && is_valid_ifsc(ifsc),
            None => false,
        },
    };

    if ok {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "'{}' is not valid account details for {} payouts",
            details.trim(),
            method
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_gstins_accepted() {
        for g in ["27AAPFU0939F1ZV", "29AAGCB7383J1Z4", "24AAACC1206D1ZM"] {
            assert!(validate_gstin(g).is_ok(), "{} should be valid", g);
        }
    }

    #[test]
    fn test_gstin_normalized() {
        assert_eq!(validate_gstin("  27aapfu0939f1zv ").unwrap(), "27AAPFU0939F1ZV");
    }

    #[test]
    fn test_gstin_bad_checksum_rejected() {
        assert!(validate_gstin("27AAPFU0939F1ZA").is_err());
        assert!(validate_gstin("07AAACR5055K1Z8").is_err());
    }

    #[test]
    fn test_gstin_bad_shape_rejected() {
        assert!(validate_gstin("").is_err());
        assert!(validate_gstin("27AAPFU0939F1Z").is_err());
        assert!(validate_gstin("27AAPFU0939F1YV").is_err());
        assert!(validate_gstin("2XAAPFU0939F1ZV").is_err());
    }

    #[test]
    fn test_gstin_unknown_state_rejected() {
        // Same body with state 99: shape is fine, state code is not
        let err = validate_gstin("99AAPFU0939F1ZV").unwrap_err();
        assert!(err.to_string().contains("state code"));
    }

    #[test]
    fn test_pan_and_aadhaar() {
        assert!(is_valid_pan("AAPFU0939F"));
        assert!(is_valid_pan("aapfu0939f"));
        assert!(!is_valid_pan("AAPF0939F"));

        assert!(is_valid_aadhaar("2345 6789 0123"));
        assert!(!is_valid_aadhaar("1234 5678 9012"));
        assert!(!is_valid_aadhaar("23456789012"));
    }

    #[test]
    fn test_bank_details() {
        assert!(is_valid_bank_account("123456789"));
        assert!(!is_valid_bank_account("12345678"));
        assert!(is_valid_ifsc("HDFC0001234"));
        assert!(!is_valid_ifsc("HDFC1001234"));
        assert!(is_valid_upi("someone.pay@okbank"));
        assert!(!is_valid_upi("someone@"));
    }

    #[test]
    fn test_contact_details() {
        assert!(is_valid_email("seller@example.co.in"));
        assert!(!is_valid_email("seller@example"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_document_number_by_type() {
        assert!(validate_document_number(DocumentType::Pan, "ABCDE1234F").is_ok());
        assert!(validate_document_number(DocumentType::Pan, "2345 6789 0123").is_err());
        assert!(validate_document_number(DocumentType::Aadhaar, "2345 6789 0123").is_ok());
        assert!(validate_document_number(DocumentType::BankAccount, "000123456789").is_ok());
    }

    #[test]
    fn test_payout_account_by_method() {
        assert!(validate_payout_account(PayoutMethod::Upi, "worker@okaxis").is_ok());
        assert!(validate_payout_account(PayoutMethod::Upi, "123456789/HDFC0001234").is_err());
        assert!(validate_payout_account(PayoutMethod::BankTransfer, "123456789/hdfc0001234").is_ok());
        assert!(validate_payout_account(PayoutMethod::BankTransfer, " 123456789012 / SBIN0000001 ").is_ok());
        assert!(validate_payout_account(PayoutMethod::BankTransfer, "123456789").is_err());
        assert!(validate_payout_account(PayoutMethod::BankTransfer, "12345678/HDFC0001234").is_err());
        assert!(validate_payout_account(PayoutMethod::BankTransfer, "worker@okaxis").is_err());
    }
}
