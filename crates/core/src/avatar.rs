//! Talking-avatar videos rendered by HeyGen.

use crate::poll::{BackoffPolicy, PollOutcome, PollStatus, poll_with_backoff};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

pub const HEYGEN_API_URL: &str = "https://api.heygen.com/v2";

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("avatar request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("avatar API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("video generation failed: {0}")]
    Failed(String),
    #[error("video generation timed out after {attempts} status checks")]
    TimedOut { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoStatus {
    pub status: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl VideoStatus {
    fn into_poll_status(self) -> PollStatus<String> {
        match (self.status.as_str(), self.video_url) {
            ("completed", Some(url)) => PollStatus::Completed(url),
            ("completed", None) => {
                PollStatus::Failed("completed video has no URL".to_string())
            }
            ("failed", _) => PollStatus::Failed(
                self.error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Video generation failed".to_string()),
            ),
            _ => PollStatus::Pending,
        }
    }
}

/// Avatars and voices available to the account, passed through unmodified.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarResources {
    pub talking_photos: Value,
    pub voices: Value,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct Generated {
    video_id: String,
}

/// Turns interviewer text into a playable video.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AvatarRenderer: Send + Sync {
    /// Returns the URL of the finished video.
    async fn render(&self, text: &str) -> Result<String, AvatarError>;

    async fn list_resources(&self) -> Result<AvatarResources, AvatarError>;
}

#[derive(Debug, Clone)]
pub struct AvatarConfig {
    pub api_key: SecretString,
    pub avatar_id: String,
    pub voice_id: String,
    pub base_url: String,
}

pub struct AvatarClient {
    client: Client,
    config: AvatarConfig,
    policy: BackoffPolicy,
}

impl AvatarClient {
    pub fn new(config: AvatarConfig) -> Self {
        Self::with_policy(config, BackoffPolicy::default())
    }

    pub fn with_policy(config: AvatarConfig, policy: BackoffPolicy) -> Self {
        Self {
            client: Client::new(),
            config,
            policy,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn generate_request(&self, text: &str) -> Value {
        json!({
            "background": { "type": "color", "value": "#ffffff" },
            "clips": [{
                "avatar_id": self.config.avatar_id,
                "avatar_style": "normal",
                "input_text": text,
                "voice_id": self.config.voice_id,
                "scale": 1.5,
                "position": "center"
            }],
            "ratio": "16:9",
            "test": false,
            "version": "v1"
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, AvatarError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await?;
        decode(resp).await
    }

    /// Starts rendering and returns the video id.
    pub async fn generate(&self, text: &str) -> Result<String, AvatarError> {
        tracing::info!("Requesting avatar video for {} characters of text", text.len());
        let resp = self
            .client
            .post(self.url("/video/generate"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&self.generate_request(text))
            .send()
            .await?;
        let generated: Envelope<Generated> = decode(resp).await?;
        tracing::debug!("Video {} queued", generated.data.video_id);
        Ok(generated.data.video_id)
    }

    pub async fn status(&self, video_id: &str) -> Result<VideoStatus, AvatarError> {
        let status: Envelope<VideoStatus> = self.get_json(&format!("/videos/{video_id}")).await?;
        Ok(status.data)
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, AvatarError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AvatarError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.json::<T>().await?)
}

#[async_trait]
impl AvatarRenderer for AvatarClient {
    async fn render(&self, text: &str) -> Result<String, AvatarError> {
        let video_id = self.generate(text).await?;
        let outcome = poll_with_backoff(&self.policy, |attempt| {
            let video_id = video_id.clone();
            async move {
                tracing::debug!("Checking video {} status (attempt {})", video_id, attempt);
                Ok::<_, AvatarError>(self.status(&video_id).await?.into_poll_status())
            }
        })
        .await?;

        match outcome {
            PollOutcome::Completed(url) => {
                tracing::info!("Video {} completed", video_id);
                Ok(url)
            }
            PollOutcome::Failed(reason) => {
                tracing::error!("Video {} failed: {}", video_id, reason);
                Err(AvatarError::Failed(reason))
            }
            PollOutcome::TimedOut { attempts } => Err(AvatarError::TimedOut { attempts }),
        }
    }

    async fn list_resources(&self) -> Result<AvatarResources, AvatarError> {
        let talking_photos = self.get_json::<Value>("/talking_photo/list").await?;
        let voices = self.get_json::<Value>("/voice/list").await?;
        Ok(AvatarResources {
            talking_photos,
            voices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> AvatarClient {
        AvatarClient::new(AvatarConfig {
            api_key: SecretString::from("test-key".to_string()),
            avatar_id: "avatar-1".to_string(),
            voice_id: "voice-1".to_string(),
            base_url: base_url.to_string(),
        })
    }

    #[test]
    fn test_generate_request_uses_configured_avatar_and_voice() {
        let body = client(HEYGEN_API_URL).generate_request("Tell me about yourself.");

        assert_eq!(body["clips"][0]["avatar_id"], "avatar-1");
        assert_eq!(body["clips"][0]["voice_id"], "voice-1");
        assert_eq!(body["clips"][0]["input_text"], "Tell me about yourself.");
        assert_eq!(body["ratio"], "16:9");
    }

    #[test]
    fn test_status_maps_to_poll_status() {
        let status: Envelope<VideoStatus> = serde_json::from_str(
            r#"{"data": {"status": "completed", "video_url": "https://cdn.example/v.mp4"}}"#,
        )
        .unwrap();
        assert_eq!(
            status.data.into_poll_status(),
            PollStatus::Completed("https://cdn.example/v.mp4".to_string())
        );

        let processing = VideoStatus {
            status: "processing".to_string(),
            video_url: None,
            error: None,
        };
        assert_eq!(processing.into_poll_status(), PollStatus::Pending);

        let failed = VideoStatus {
            status: "failed".to_string(),
            video_url: None,
            error: None,
        };
        assert!(matches!(failed.into_poll_status(), PollStatus::Failed(_)));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        assert_eq!(
            client("https://api.heygen.com/v2/").url("/voice/list"),
            "https://api.heygen.com/v2/voice/list"
        );
    }

    #[tokio::test]
    async fn test_unreachable_api_is_an_http_error() {
        let err = client("http://127.0.0.1:9").render("hi").await.unwrap_err();
        assert!(matches!(err, AvatarError::Http(_)), "unexpected error: {err:?}");
    }
}
