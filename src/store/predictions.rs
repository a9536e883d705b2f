use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{get_dec, Store, TxHandle};
use crate::domain::{AreaAnalyses, AreaScores, Prediction};
use crate::error::Result;

const SELECT: &str = "SELECT id, firm, market_id, probability, confidence, \
    sentiment_score, news_score, technical_score, fundamental_score, volatility_score, \
    sentiment_analysis, news_analysis, technical_analysis, fundamental_analysis, volatility_analysis, \
    probability_reasoning, skip_reason, created_at FROM predictions";

fn map_prediction(row: &SqliteRow) -> Result<Prediction> {
    Ok(Prediction {
        id: Some(row.try_get("id")?),
        firm: row.try_get("firm")?,
        market_id: row.try_get("market_id")?,
        probability: get_dec(row, "probability")?,
        confidence: get_dec(row, "confidence")?,
        scores: AreaScores {
            sentiment: get_dec(row, "sentiment_score")?,
            news: get_dec(row, "news_score")?,
            technical: get_dec(row, "technical_score")?,
            fundamental: get_dec(row, "fundamental_score")?,
            volatility: get_dec(row, "volatility_score")?,
        },
        analyses: AreaAnalyses {
            sentiment: row.try_get("sentiment_analysis")?,
            news: row.try_get("news_analysis")?,
            technical: row.try_get("technical_analysis")?,
            fundamental: row.try_get("fundamental_analysis")?,
            volatility: row.try_get("volatility_analysis")?,
        },
        probability_reasoning: row.try_get("probability_reasoning")?,
        skip_reason: row.try_get("skip_reason")?,
        created_at: row.try_get("created_at")?,
    })
}

impl TxHandle {
    pub async fn insert_prediction(&mut self, prediction: &Prediction) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO predictions (firm, market_id, probability, confidence, \
             sentiment_score, news_score, technical_score, fundamental_score, volatility_score, \
             sentiment_analysis, news_analysis, technical_analysis, fundamental_analysis, \
             volatility_analysis, probability_reasoning, skip_reason, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(&prediction.firm)
        .bind(prediction.market_id)
        .bind(prediction.probability.to_string())
        .bind(prediction.confidence.to_string())
        .bind(prediction.scores.sentiment.to_string())
        .bind(prediction.scores.news.to_string())
        .bind(prediction.scores.technical.to_string())
        .bind(prediction.scores.fundamental.to_string())
        .bind(prediction.scores.volatility.to_string())
        .bind(&prediction.analyses.sentiment)
        .bind(&prediction.analyses.news)
        .bind(&prediction.analyses.technical)
        .bind(&prediction.analyses.fundamental)
        .bind(&prediction.analyses.volatility)
        .bind(&prediction.probability_reasoning)
        .bind(&prediction.skip_reason)
        .bind(prediction.created_at)
        .fetch_one(self.conn())
        .await?;

        Ok(row.get("id"))
    }

    pub async fn set_prediction_skip_reason(&mut self, id: i64, reason: &str) -> Result<()> {
        sqlx::query("UPDATE predictions SET skip_reason = ? WHERE id = ?")
            .bind(reason)
            .bind(id)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    /// Whether this firm already evaluated this market on the given UTC day.
    /// Guards cycle re-runs against double-booking.
    pub async fn prediction_exists_for_day(
        &mut self,
        firm: &str,
        market_id: i64,
        day: NaiveDate,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM predictions \
             WHERE firm = ? AND market_id = ? AND date(created_at) = ?",
        )
        .bind(firm)
        .bind(market_id)
        .bind(day.format("%Y-%m-%d").to_string())
        .fetch_one(self.conn())
        .await?;
        Ok(row.get::<i64, _>("n") > 0)
    }
}

impl Store {
    pub async fn recent_predictions(
        &self,
        firm: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Prediction>> {
        let rows = match firm {
            Some(firm) => {
                sqlx::query(&format!(
                    "{SELECT} WHERE firm = ? ORDER BY created_at DESC LIMIT ?"
                ))
                .bind(firm)
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(&format!("{SELECT} ORDER BY created_at DESC LIMIT ?"))
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await?
            }
        };
        rows.iter().map(map_prediction).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn prediction(firm: &str, market_id: i64) -> Prediction {
        Prediction {
            id: None,
            firm: firm.into(),
            market_id,
            probability: dec!(0.62),
            confidence: dec!(7),
            scores: AreaScores::neutral(),
            analyses: AreaAnalyses::default(),
            probability_reasoning: "momentum favours yes".into(),
            skip_reason: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let store = Store::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();

        let id = store
            .tx(|tx| Box::pin(async move { tx.insert_prediction(&prediction("Qwen", 11)).await }))
            .await
            .unwrap();
        assert!(id > 0);

        let preds = store.recent_predictions(Some("Qwen"), 10).await.unwrap();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].probability, dec!(0.62));
        assert!(preds[0].scores.all_in_range());
    }

    #[tokio::test]
    async fn same_day_duplicate_is_detectable() {
        let store = Store::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();

        store
            .tx(|tx| Box::pin(async move { tx.insert_prediction(&prediction("Qwen", 11)).await }))
            .await
            .unwrap();

        let today = Utc::now().date_naive();
        let (same, other_market) = store
            .tx(|tx| {
                Box::pin(async move {
                    let same = tx.prediction_exists_for_day("Qwen", 11, today).await?;
                    let other = tx.prediction_exists_for_day("Qwen", 12, today).await?;
                    Ok((same, other))
                })
            })
            .await
            .unwrap();
        assert!(same);
        assert!(!other_market);
    }
}
