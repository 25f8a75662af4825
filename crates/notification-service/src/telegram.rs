use analysis_core::{
    AnalysisError, AnalysisResult, DivergenceNotifier, DivergenceType, Interval, TelegramSettings,
};
use async_trait::async_trait;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Divergence alerts over the Telegram Bot API.
///
/// A notifier without credentials is a logging no-op, so callers never need
/// to special-case the disabled state.
pub struct TelegramNotifier {
    enabled: bool,
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let bot_token = bot_token.into();
        let chat_id = chat_id.into();
        let enabled = !bot_token.trim().is_empty() && !chat_id.trim().is_empty();
        if !enabled {
            tracing::info!("telegram notifier disabled (missing bot token or chat id)");
        }
        Self {
            enabled,
            bot_token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &TelegramSettings) -> Self {
        if settings.enabled {
            Self::new(settings.bot_token.clone(), settings.chat_id.clone())
        } else {
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl DivergenceNotifier for TelegramNotifier {
    async fn handle_divergence_result(
        &self,
        polarity: DivergenceType,
        interval: Interval,
        symbol: &str,
        result: &AnalysisResult,
    ) -> Result<(), AnalysisError> {
        if !self.enabled {
            tracing::debug!(symbol, "telegram disabled, dropping divergence alert");
            return Ok(());
        }

        let text = format_message(polarity, interval, symbol, result);
        let url = format!("{TELEGRAM_API_BASE}/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Fetch(format!("telegram send failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Fetch(format!(
                "telegram HTTP {status}: {detail}"
            )));
        }

        tracing::info!(symbol, interval = interval.as_str(), "divergence alert delivered");
        Ok(())
    }
}

fn format_message(
    polarity: DivergenceType,
    interval: Interval,
    symbol: &str,
    result: &AnalysisResult,
) -> String {
    let emoji = match polarity {
        DivergenceType::Bullish => "\u{1F4C8}",
        DivergenceType::Bearish => "\u{1F4C9}",
        DivergenceType::None => "\u{2139}",
    };
    let mut message = format!(
        "{emoji} <b>{} divergence</b> on {}\n\
         Symbol: <b>{symbol}</b>\n\
         Price: {:.2} | RSI: {:.2}\n\
         {}",
        polarity.label(),
        interval.as_str(),
        result.current_price,
        result.current_rsi,
        result.description,
    );
    if let Some(ref early) = result.early_description {
        message.push('\n');
        message.push_str(early);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn result(description: &str) -> AnalysisResult {
        AnalysisResult {
            symbol: "VNM".to_string(),
            divergence_type: DivergenceType::Bearish,
            divergence_found: true,
            current_price: 71.25,
            current_rsi: 63.4,
            description: description.to_string(),
            processing_time_ms: 12,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            interval: Interval::Day1,
            rsi_period: 14,
            timestamp: Utc::now(),
            early_signal_detected: None,
            early_description: None,
        }
    }

    #[test]
    fn message_carries_polarity_interval_symbol_and_description() {
        let text = format_message(
            DivergenceType::Bearish,
            Interval::Hour1,
            "VNM",
            &result("Bearish divergence: Price 70.00 -> 72.00"),
        );
        assert!(text.contains("Bearish divergence"));
        assert!(text.contains("1H"));
        assert!(text.contains("VNM"));
        assert!(text.contains("Price 70.00 -> 72.00"));
        assert!(text.contains("71.25"));
    }

    #[test]
    fn message_appends_early_signal_description() {
        let mut r = result("Bearish divergence");
        r.early_signal_detected = Some(true);
        r.early_description = Some("Forming bearish divergence".to_string());
        let text = format_message(DivergenceType::Bearish, Interval::Day1, "VNM", &r);
        assert!(text.contains("Forming bearish divergence"));
    }

    #[tokio::test]
    async fn disabled_notifier_swallows_alerts() {
        let notifier = TelegramNotifier::disabled();
        assert!(!notifier.is_enabled());
        notifier
            .handle_divergence_result(
                DivergenceType::Bearish,
                Interval::Day1,
                "VNM",
                &result("x"),
            )
            .await
            .unwrap();
    }

    #[test]
    fn settings_gate_construction() {
        let off = TelegramNotifier::from_settings(&TelegramSettings {
            enabled: false,
            bot_token: "token".to_string(),
            chat_id: "chat".to_string(),
        });
        assert!(!off.is_enabled());

        let on = TelegramNotifier::from_settings(&TelegramSettings {
            enabled: true,
            bot_token: "token".to_string(),
            chat_id: "chat".to_string(),
        });
        assert!(on.is_enabled());
    }
}
