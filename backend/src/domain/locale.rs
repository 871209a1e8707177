//! Locale-specific description strings for bill-payment expenses.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static PAYMENT_PREFIXES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("en", "Bill payment:"),
        ("es", "Pago factura:"),
        ("fr", "Paiement de facture:"),
        ("de", "Rechnungszahlung:"),
        ("it", "Pagamento bolletta:"),
        ("pt", "Pagamento conta:"),
        ("ru", "Оплата счета:"),
        ("ja", "請求書支払い:"),
        ("zh", "账单支付:"),
        ("hi", "बिल भुगतान:"),
        ("el", "Πληρωμή λογαριασμού:"),
        ("nl", "Rekening betaling:"),
        ("da", "Regning betaling:"),
        ("gsw", "Rächnig zahlig:"),
    ])
});

/// Description for the expense row a bill payment creates, in the user's
/// locale. Unknown locales fall back to English.
pub fn payment_description(locale: &str, category: &str, date: &str) -> String {
    let prefix = PAYMENT_PREFIXES
        .get(locale)
        .copied()
        .unwrap_or("Bill payment:");
    format!("{} {} {}", prefix, category, date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_locales() {
        assert_eq!(
            payment_description("en", "Utilities", "2025-01-15"),
            "Bill payment: Utilities 2025-01-15"
        );
        assert_eq!(
            payment_description("es", "Luz", "2025-01-15"),
            "Pago factura: Luz 2025-01-15"
        );
    }

    #[test]
    fn test_unknown_locale_falls_back_to_english() {
        assert_eq!(
            payment_description("xx", "Rent", "2025-02-01"),
            "Bill payment: Rent 2025-02-01"
        );
    }
}
