use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Card details submitted with a purchase. Checked structurally only; nothing is charged.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    #[validate(length(min = 1, message = "cardholder name is required"))]
    pub cardholder_name: String,
    #[validate(custom(function = "validate_card_number"))]
    pub card_number: String,
    #[validate(range(min = 1, max = 12, message = "expiration month must be 1-12"))]
    pub expiration_month: u32,
    #[validate(range(min = 2000, max = 2100, message = "expiration year is out of range"))]
    pub expiration_year: u32,
    #[validate(length(min = 3, max = 4, message = "cvv must be 3 or 4 digits"))]
    pub cvv: String,
    #[validate(length(min = 1, message = "billing address is required"))]
    pub billing_address: String,
    #[validate(length(min = 1, message = "billing city is required"))]
    pub billing_city: String,
    #[validate(length(min = 1, message = "billing state is required"))]
    pub billing_state: String,
    #[validate(length(min = 1, message = "billing zip is required"))]
    pub billing_zip: String,
    #[serde(default)]
    pub save_payment_info: bool,
}

impl PaymentInfo {
    /// Last four digits of the card. Masked numbers from saved cards qualify too.
    pub fn last_four_digits(&self) -> String {
        let digits: Vec<char> = self
            .card_number
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        digits[digits.len().saturating_sub(4)..].iter().collect()
    }
}

// Accepts full numbers and masked ones ("****-****-****-1234"); separators are spaces or dashes.
fn validate_card_number(card_number: &str) -> Result<(), ValidationError> {
    let compact: String = card_number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    let valid_chars = compact.chars().all(|c| c.is_ascii_digit() || c == '*');
    let trailing_digits = compact
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    let masked = compact.contains('*');

    if !valid_chars || trailing_digits < 4 || compact.len() < 12 || compact.len() > 19 {
        return Err(ValidationError::new("card_number"));
    }
    if masked && trailing_digits != 4 {
        return Err(ValidationError::new("card_number"));
    }
    Ok(())
}

/// Simplified stored card: never more than the last four digits.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPaymentMethod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cardholder_name: String,
    pub last_four_digits: String,
    pub expiration_month: i32,
    pub expiration_year: i32,
    pub billing_address: String,
    pub billing_city: String,
    pub billing_state: String,
    pub billing_zip: String,
    pub created_at: DateTime<Utc>,
}

impl SavedPaymentMethod {
    pub fn from_payment(user_id: Uuid, info: &PaymentInfo, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            cardholder_name: info.cardholder_name.clone(),
            last_four_digits: info.last_four_digits(),
            expiration_month: info.expiration_month as i32,
            expiration_year: info.expiration_year as i32,
            billing_address: info.billing_address.clone(),
            billing_city: info.billing_city.clone(),
            billing_state: info.billing_state.clone(),
            billing_zip: info.billing_zip.clone(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(card_number: &str) -> PaymentInfo {
        PaymentInfo {
            cardholder_name: "Ada Lovelace".to_string(),
            card_number: card_number.to_string(),
            expiration_month: 12,
            expiration_year: 2030,
            cvv: "123".to_string(),
            billing_address: "1 Main St".to_string(),
            billing_city: "New York".to_string(),
            billing_state: "NY".to_string(),
            billing_zip: "10001".to_string(),
            save_payment_info: false,
        }
    }

    #[test]
    fn accepts_plain_and_masked_numbers() {
        assert!(payment("4111 1111 1111 1111").validate().is_ok());
        assert!(payment("4111-1111-1111-1111").validate().is_ok());
        assert!(payment("****-****-****-4242").validate().is_ok());
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(payment("").validate().is_err());
        assert!(payment("4111 abcd 1111 1111").validate().is_err());
        assert!(payment("1234").validate().is_err());
        assert!(payment("****-****-****-****").validate().is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        let mut info = payment("4111111111111111");
        info.billing_zip.clear();
        info.expiration_month = 13;
        let errors = info.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("billing_zip"));
        assert!(fields.contains_key("expiration_month"));
    }

    #[test]
    fn keeps_only_last_four_digits() {
        assert_eq!(payment("4111 1111 1111 1234").last_four_digits(), "1234");
        assert_eq!(payment("****-****-****-9876").last_four_digits(), "9876");

        let saved = SavedPaymentMethod::from_payment(Uuid::new_v4(), &payment("4111111111115678"), Utc::now());
        assert_eq!(saved.last_four_digits, "5678");
    }
}
