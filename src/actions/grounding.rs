//! 视觉定位客户端
//!
//! 向配置的 HTTP 服务 POST `{image_path, instruction}`，期望返回归一化坐标 `{x, y}`（0..1）。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::actions::VisualGrounding;
use crate::core::ActionError;

#[derive(Serialize)]
struct GroundingRequest<'a> {
    image_path: &'a str,
    instruction: &'a str,
}

#[derive(Debug, Deserialize)]
struct GroundingResponse {
    x: f64,
    y: f64,
}

pub struct HttpGrounding {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpGrounding {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// 坐标必须落在 [0, 1]
fn validate(resp: GroundingResponse) -> Result<(f64, f64), ActionError> {
    let in_range = |v: f64| (0.0..=1.0).contains(&v);
    if in_range(resp.x) && in_range(resp.y) {
        Ok((resp.x, resp.y))
    } else {
        Err(ActionError::Command(format!(
            "grounding returned out-of-range point ({}, {})",
            resp.x, resp.y
        )))
    }
}

#[async_trait]
impl VisualGrounding for HttpGrounding {
    async fn ground(&self, screenshot: &Path, instruction: &str) -> Result<(f64, f64), ActionError> {
        let image_path = screenshot.to_string_lossy();
        let body = GroundingRequest {
            image_path: &image_path,
            instruction,
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ActionError::Unavailable(format!("visual grounding ({})", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ActionError::Command(format!(
                "grounding service returned {}",
                status.as_u16()
            )));
        }
        let parsed: GroundingResponse = resp
            .json()
            .await
            .map_err(|e| ActionError::Command(format!("invalid grounding response: {}", e)))?;
        validate(parsed)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_range() {
        assert_eq!(validate(GroundingResponse { x: 0.5, y: 1.0 }).unwrap(), (0.5, 1.0));
        assert!(validate(GroundingResponse { x: 1.5, y: 0.2 }).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let grounding = HttpGrounding::new("http://127.0.0.1:1/ground", 2);
        let err = grounding
            .ground(Path::new("/tmp/shot.png"), "the search box")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Unavailable(_)));
    }
}
