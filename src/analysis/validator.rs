//! Decision validation: the only place an upstream model's shape is trusted
//! to exist at all. Everything downstream sees the canonical Prediction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{AnalysisArea, AreaAnalyses, AreaScores, Prediction};
use crate::error::{Result, TipsterError};

/// Parse a JSON field that may arrive as a number or a numeric string.
fn parse_number(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Probabilities in (1, 100] are interpreted as percentages.
fn normalize_probability(raw: Decimal) -> Result<Decimal> {
    let value = if raw > Decimal::ONE && raw <= dec!(100) {
        raw / dec!(100)
    } else {
        raw
    };
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(TipsterError::Schema(format!(
            "probability {raw} outside [0, 1] after percent normalisation"
        )));
    }
    Ok(value)
}

/// Confidence is canonical on [0, 10]; legacy 0-100 outputs divide by 10.
fn normalize_confidence(raw: Decimal) -> Result<Decimal> {
    let value = if raw > dec!(10) && raw <= dec!(100) {
        raw / dec!(10)
    } else {
        raw
    };
    if value < Decimal::ZERO || value > dec!(10) {
        return Err(TipsterError::Schema(format!(
            "confidence {raw} outside [0, 10]"
        )));
    }
    Ok(value)
}

fn text_field(blob: &Value, key: &str) -> String {
    blob.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Normalise a model's raw decision blob into a canonical Prediction, or
/// reject with SchemaError.
pub fn validate_decision(
    firm: &str,
    market_id: i64,
    blob: &Value,
    now: DateTime<Utc>,
) -> Result<Prediction> {
    if !blob.is_object() {
        return Err(TipsterError::Schema("decision is not a JSON object".into()));
    }

    let probability = blob
        .get("probability")
        .and_then(parse_number)
        .ok_or_else(|| TipsterError::Schema("probability missing or non-numeric".into()))?;
    let probability = normalize_probability(probability)?;

    let confidence = match blob.get("confidence").and_then(parse_number) {
        Some(raw) => normalize_confidence(raw)?,
        None => {
            warn!("[{firm}] confidence missing, defaulting to 5");
            dec!(5)
        }
    };

    let mut scores = AreaScores::neutral();
    let mut analyses = AreaAnalyses::default();
    for area in AnalysisArea::ALL {
        let score_key = format!("{area}_score");
        match blob.get(&score_key).and_then(parse_number) {
            Some(score) if score >= Decimal::ZERO && score <= dec!(10) => {
                scores.set(area, score);
            }
            Some(score) => {
                warn!("[{firm}] {score_key} {score} out of range, coerced to 5");
            }
            None => {
                debug!("[{firm}] {score_key} missing, defaulting to 5");
            }
        }

        analyses.set(area, text_field(blob, &format!("{area}_analysis")));
    }

    let probability_reasoning = text_field(blob, "probability_reasoning");

    Ok(Prediction {
        id: None,
        firm: firm.to_string(),
        market_id,
        probability,
        confidence,
        scores,
        analyses,
        probability_reasoning,
        skip_reason: None,
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(blob: Value) -> Result<Prediction> {
        validate_decision("ChatGPT", 1, &blob, Utc::now())
    }

    #[test]
    fn boundary_probabilities() {
        // 0 and 1 are valid as-is
        assert_eq!(
            validate(json!({"probability": 0})).unwrap().probability,
            dec!(0)
        );
        assert_eq!(
            validate(json!({"probability": 1})).unwrap().probability,
            dec!(1)
        );
        // 100 and 100.0 are percentages
        assert_eq!(
            validate(json!({"probability": 100})).unwrap().probability,
            dec!(1)
        );
        assert_eq!(
            validate(json!({"probability": 100.0})).unwrap().probability,
            dec!(1)
        );
        // already-decimal values pass through
        assert_eq!(
            validate(json!({"probability": 0.999999})).unwrap().probability,
            dec!(0.999999)
        );
        // negative rejects
        assert!(validate(json!({"probability": -0.1})).is_err());
        // beyond-percent rejects
        assert!(validate(json!({"probability": 150})).is_err());
    }

    #[test]
    fn percent_probability_normalises() {
        let p = validate(json!({"probability": 65})).unwrap();
        assert_eq!(p.probability, dec!(0.65));
    }

    #[test]
    fn numeric_strings_parse() {
        let p = validate(json!({"probability": "0.62", "confidence": "7"})).unwrap();
        assert_eq!(p.probability, dec!(0.62));
        assert_eq!(p.confidence, dec!(7));
    }

    #[test]
    fn legacy_percent_confidence_scales_down() {
        let p = validate(json!({"probability": 0.6, "confidence": 80})).unwrap();
        assert_eq!(p.confidence, dec!(8));
    }

    #[test]
    fn missing_scores_default_to_neutral() {
        let p = validate(json!({"probability": 0.6})).unwrap();
        assert_eq!(p.scores, AreaScores::neutral());
        assert!(p.scores.all_in_range());
    }

    #[test]
    fn out_of_range_scores_coerce_to_neutral() {
        let p = validate(json!({
            "probability": 0.6,
            "news_score": 14,
            "technical_score": -2,
            "sentiment_score": 7,
        }))
        .unwrap();
        assert_eq!(p.scores.news, dec!(5));
        assert_eq!(p.scores.technical, dec!(5));
        assert_eq!(p.scores.sentiment, dec!(7));
    }

    #[test]
    fn missing_probability_rejects() {
        assert!(validate(json!({"confidence": 8})).is_err());
        assert!(validate(json!({"probability": "not a number"})).is_err());
        assert!(validate(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn analysis_texts_default_to_empty() {
        let p = validate(json!({
            "probability": 0.6,
            "news_analysis": "fed minutes leaked",
        }))
        .unwrap();
        assert_eq!(p.analyses.news, "fed minutes leaked");
        assert_eq!(p.analyses.sentiment, "");
        assert_eq!(p.probability_reasoning, "");
    }
}
