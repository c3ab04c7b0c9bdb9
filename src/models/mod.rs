pub mod decision;
pub mod invoice;
pub mod po_line;

pub use decision::{AccrualVerdict, DecisionRow};
pub use invoice::{InvoiceExtraction, InvoiceRow};
pub use po_line::{PoLine, RelatedBill};

use serde::{Deserialize, Deserializer};

/// 宽松的数值反序列化：模型偶尔会把金额写成字符串
pub(crate) fn de_f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
        Null,
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => {
            let cleaned = s.replace(',', "");
            cleaned.trim().parse::<f64>().map_err(serde::de::Error::custom)
        }
        NumberOrString::Null => Ok(0.0),
    }
}

/// 同上，但允许缺省
pub(crate) fn de_opt_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeNumber {
        Number(f64),
        String(String),
        Null,
    }

    match Option::<MaybeNumber>::deserialize(deserializer)? {
        Some(MaybeNumber::Number(n)) => Ok(Some(n)),
        Some(MaybeNumber::String(s)) => {
            let cleaned = s.replace(',', "");
            match cleaned.trim().parse::<f64>() {
                Ok(n) => Ok(Some(n)),
                Err(_) => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Amounts {
        #[serde(default, deserialize_with = "super::de_opt_f64_lenient")]
        total: Option<f64>,
        #[serde(default, deserialize_with = "super::de_f64_lenient")]
        net: f64,
    }

    #[test]
    fn test_lenient_number_parsing() {
        let a: Amounts = serde_json::from_str(r#"{"total": "1,234.50", "net": 99.9}"#).unwrap();
        assert_eq!(a.total, Some(1234.5));
        assert_eq!(a.net, 99.9);

        let a: Amounts = serde_json::from_str(r#"{"total": null, "net": "42"}"#).unwrap();
        assert_eq!(a.total, None);
        assert_eq!(a.net, 42.0);

        let a: Amounts = serde_json::from_str(r#"{"total": "n/a", "net": 0}"#).unwrap();
        assert_eq!(a.total, None);
    }
}
