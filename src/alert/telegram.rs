//! Telegram Bot API sink.
//!
//! Uses `sendMessage` (JSON body) and `sendPhoto` (multipart upload). The bot
//! token is part of every request path, so error messages built here strip
//! the request URL.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use std::time::Duration;

use super::NotificationSink;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const PHOTO_FILE_NAME: &str = "smoke_detected.jpg";

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Response envelope shared by all Bot API methods.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramSink {
    config: TelegramConfig,
    client: Client,
}

impl TelegramSink {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build telegram http client")?;
        Ok(Self { config, client })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    fn finish(&self, method: &str, result: reqwest::Result<Response>) -> Result<()> {
        let response = result
            .map_err(|err| anyhow!("{} transport error: {}", method, err.without_url()))?;
        let status = response.status();
        match response.json::<ApiResponse>() {
            Ok(body) if status.is_success() && body.ok => Ok(()),
            Ok(body) => Err(anyhow!(
                "{} rejected: HTTP {}: {}",
                method,
                status.as_u16(),
                body.description
                    .unwrap_or_else(|| "no description".to_string())
            )),
            Err(err) if status.is_success() => Err(anyhow!(
                "{} returned unreadable body: {}",
                method,
                err.without_url()
            )),
            Err(_) => Err(anyhow!("{} rejected: HTTP {}", method, status.as_u16())),
        }
    }
}

impl NotificationSink for TelegramSink {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        let result = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": destination,
                "text": text,
            }))
            .send();
        self.finish("sendMessage", result)
    }

    fn send_photo(&self, destination: &str, jpeg: &[u8], caption: &str) -> Result<()> {
        let photo = Part::bytes(jpeg.to_vec())
            .file_name(PHOTO_FILE_NAME)
            .mime_str("image/jpeg")
            .context("photo part mime type")?;
        let form = Form::new()
            .text("chat_id", destination.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);
        let result = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send();
        self.finish("sendPhoto", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(api_base: &str) -> TelegramSink {
        TelegramSink::new(TelegramConfig {
            bot_token: "123:SECRET".to_string(),
            api_base: api_base.to_string(),
            timeout: Duration::from_millis(300),
        })
        .unwrap()
    }

    #[test]
    fn method_url_embeds_token() {
        assert_eq!(
            sink("https://api.telegram.org/").method_url("sendPhoto"),
            "https://api.telegram.org/bot123:SECRET/sendPhoto"
        );
    }

    #[test]
    fn transport_errors_do_not_leak_token() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = sink(&format!("http://127.0.0.1:{}", port))
            .send_text("42", "hello")
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.starts_with("sendMessage transport error"));
        assert!(!message.contains("SECRET"));
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", sink("https://api.telegram.org").config);
        assert!(!rendered.contains("SECRET"));
    }
}
