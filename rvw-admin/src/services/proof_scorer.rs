//! Proof scoring client
//!
//! An external model rates how likely a submitted proof (screenshot URL plus
//! text) shows the review was really posted. The service only needs a
//! confidence in `[0, 1]`.

use std::time::Duration;

use async_trait::async_trait;
use rvw_common::config::ProofScorerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const USER_AGENT: &str = concat!("rvw-admin/", env!("CARGO_PKG_VERSION"));

/// Proof scorer errors
#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Scorer returned HTTP {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Confidence {0} is outside [0, 1]")]
    OutOfRange(f64),
}

/// What the scorer sees of a task
#[derive(Debug, Clone, Serialize)]
pub struct TaskProof {
    pub task_id: i64,
    pub proof_url: Option<String>,
    pub proof_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    confidence: f64,
}

/// Anything that can rate a proof
#[async_trait]
pub trait ProofScorer: Send + Sync {
    /// Confidence in `[0, 1]` that the proof is genuine
    async fn score(&self, proof: &TaskProof) -> Result<f64, ScorerError>;
}

/// Scorer reached over HTTP: `POST {task_id, proof_url, proof_text}` and
/// expect `{"confidence": f64}` back
pub struct HttpProofScorer {
    http_client: reqwest::Client,
    url: String,
}

impl HttpProofScorer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ScorerError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ScorerError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &ProofScorerConfig) -> Result<Self, ScorerError> {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl ProofScorer for HttpProofScorer {
    async fn score(&self, proof: &TaskProof) -> Result<f64, ScorerError> {
        tracing::debug!(task_id = proof.task_id, "Requesting proof score");

        let response = self
            .http_client
            .post(&self.url)
            .json(proof)
            .send()
            .await
            .map_err(|e| ScorerError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScorerError::Status(status.as_u16()));
        }

        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| ScorerError::Parse(e.to_string()))?;

        check_confidence(body.confidence)
    }
}

/// Reject NaN and anything outside `[0, 1]`
pub fn check_confidence(confidence: f64) -> Result<f64, ScorerError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(ScorerError::OutOfRange(confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/score", addr)
    }

    #[test]
    fn test_check_confidence_bounds() {
        assert_eq!(check_confidence(0.0).unwrap(), 0.0);
        assert_eq!(check_confidence(1.0).unwrap(), 1.0);
        assert!(check_confidence(1.01).is_err());
        assert!(check_confidence(-0.1).is_err());
        assert!(check_confidence(f64::NAN).is_err());
    }

    #[tokio::test]
    async fn test_http_scorer_posts_proof_and_reads_confidence() {
        let app = Router::new().route(
            "/score",
            post(|Json(body): Json<Value>| async move {
                // Echo a score derived from the request so the payload is checked
                let confidence = if body["proof_text"] == "posted 5 stars" && body["task_id"] == 7 {
                    0.93
                } else {
                    0.0
                };
                Json(json!({ "confidence": confidence }))
            }),
        );
        let url = serve(app).await;

        let scorer = HttpProofScorer::new(url, Duration::from_secs(5)).unwrap();
        let proof = TaskProof {
            task_id: 7,
            proof_url: Some("https://img.example/7.png".into()),
            proof_text: Some("posted 5 stars".into()),
        };
        assert_eq!(scorer.score(&proof).await.unwrap(), 0.93);
    }

    #[tokio::test]
    async fn test_http_scorer_rejects_out_of_range_and_errors() {
        let app = Router::new().route(
            "/score",
            post(|| async { Json(json!({ "confidence": 4.2 })) }),
        );
        let url = serve(app).await;
        let scorer = HttpProofScorer::new(url, Duration::from_secs(5)).unwrap();
        let proof = TaskProof {
            task_id: 1,
            proof_url: None,
            proof_text: None,
        };
        assert!(matches!(
            scorer.score(&proof).await,
            Err(ScorerError::OutOfRange(_))
        ));

        let app = Router::new().route(
            "/score",
            post(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
        let url = serve(app).await;
        let scorer = HttpProofScorer::new(url, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            scorer.score(&proof).await,
            Err(ScorerError::Status(503))
        ));
    }
}
