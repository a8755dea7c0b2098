// 📷 OCR Client - Receipt extraction via the Mindee expense-receipts API
// Uploads the receipt image and maps the prediction into ReceiptItems

use crate::engine::ReceiptItem;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Production endpoint base. Tests point the client at a mock server.
pub const MINDEE_BASE_URL: &str = "https://api.mindee.net";

const PREDICT_PATH: &str = "/v1/products/mindee/expense_receipts/v5/predict";

/// Extractions below this confidence should be re-captured by the user.
/// Every caller gates on the same value.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR service error")]
    Service(String),

    #[error("OCR request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// What the caller gets back from a successful extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptExtraction {
    pub vendor: String,
    pub total: f64,
    pub items: Vec<ReceiptItem>,
    pub confidence: f64,
}

impl ReceiptExtraction {
    /// Policy gate: true when the caller should ask the user to retake
    /// the photo instead of proceeding to the split flow.
    pub fn needs_retake(&self) -> bool {
        self.confidence < CONFIDENCE_THRESHOLD
    }
}

// ============================================================================
// MINDEE RESPONSE SHAPE (only the fields we read)
// ============================================================================

#[derive(Debug, Deserialize)]
struct MindeeResponse {
    document: Option<MindeeDocument>,
}

#[derive(Debug, Deserialize)]
struct MindeeDocument {
    inference: Option<MindeeInference>,
}

#[derive(Debug, Deserialize)]
struct MindeeInference {
    prediction: Option<MindeePrediction>,
}

#[derive(Debug, Deserialize)]
struct MindeePrediction {
    supplier_name: Option<MindeeStringField>,
    total_amount: Option<MindeeAmountField>,
    #[serde(default)]
    line_items: Vec<MindeeLineItem>,
}

#[derive(Debug, Deserialize)]
struct MindeeStringField {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MindeeAmountField {
    value: Option<f64>,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MindeeLineItem {
    description: Option<String>,
    total_amount: Option<f64>,
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct OcrClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OcrClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, MINDEE_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        OcrClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Send one receipt image for extraction.
    pub async fn extract(
        &self,
        file_name: &str,
        image: Vec<u8>,
    ) -> Result<ReceiptExtraction, OcrError> {
        let part = reqwest::multipart::Part::bytes(image).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("document", part);

        let response = self
            .http
            .post(format!("{}{}", self.base_url, PREDICT_PATH))
            .header("Authorization", format!("Token {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Service(format!(
                "status {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let parsed: MindeeResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Service(format!("malformed response: {}", e)))?;

        let prediction = parsed
            .document
            .and_then(|d| d.inference)
            .and_then(|i| i.prediction)
            .ok_or_else(|| OcrError::Service("missing prediction".to_string()))?;

        Ok(extraction_from_prediction(prediction))
    }
}

/// Map the Mindee prediction into our model, with the original's fallbacks:
/// unknown vendor label, zeroed amounts, and a single "Total Amount" item
/// when no line items were recognized.
fn extraction_from_prediction(prediction: MindeePrediction) -> ReceiptExtraction {
    let vendor = prediction
        .supplier_name
        .and_then(|f| f.value)
        .unwrap_or_else(|| "Unknown Vendor".to_string());

    let (total, confidence) = match prediction.total_amount {
        Some(field) => (field.value.unwrap_or(0.0), field.confidence.unwrap_or(0.0)),
        None => (0.0, 0.0),
    };

    let mut items: Vec<ReceiptItem> = prediction
        .line_items
        .into_iter()
        .map(|line| {
            ReceiptItem::new(
                line.description.as_deref().unwrap_or("Unknown Item"),
                line.total_amount.unwrap_or(0.0),
            )
        })
        .collect();

    if items.is_empty() && total > 0.0 {
        items.push(ReceiptItem::new("Total Amount", total));
    }

    ReceiptExtraction {
        vendor,
        total,
        items,
        confidence,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mindee_body(prediction: serde_json::Value) -> serde_json::Value {
        json!({ "document": { "inference": { "prediction": prediction } } })
    }

    #[tokio::test]
    async fn test_extract_line_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT_PATH))
            .and(header("Authorization", "Token test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mindee_body(json!({
                "supplier_name": { "value": "Cafe Lahore" },
                "total_amount": { "value": 700.0, "confidence": 0.92 },
                "line_items": [
                    { "description": "Burger", "total_amount": 500.0 },
                    { "description": "Fries", "total_amount": 200.0 }
                ]
            }))))
            .mount(&server)
            .await;

        let client = OcrClient::with_base_url("test-key", &server.uri());
        let extraction = client.extract("receipt.jpg", vec![1, 2, 3]).await.unwrap();

        assert_eq!(extraction.vendor, "Cafe Lahore");
        assert_eq!(extraction.total, 700.0);
        assert_eq!(extraction.items.len(), 2);
        assert_eq!(extraction.items[0].text, "Burger");
        assert_eq!(extraction.items[0].price, 500.0);
        assert!(!extraction.items[0].is_shared);
        assert!(extraction.items[0].assigned_to.is_empty());
        assert!(!extraction.needs_retake());
    }

    #[tokio::test]
    async fn test_extract_total_amount_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(mindee_body(json!({
                "supplier_name": null,
                "total_amount": { "value": 450.0, "confidence": 0.88 },
                "line_items": []
            }))))
            .mount(&server)
            .await;

        let client = OcrClient::with_base_url("k", &server.uri());
        let extraction = client.extract("receipt.jpg", vec![0]).await.unwrap();

        assert_eq!(extraction.vendor, "Unknown Vendor");
        assert_eq!(extraction.items.len(), 1);
        assert_eq!(extraction.items[0].text, "Total Amount");
        assert_eq!(extraction.items[0].price, 450.0);
    }

    #[tokio::test]
    async fn test_low_confidence_needs_retake() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(mindee_body(json!({
                "total_amount": { "value": 100.0, "confidence": 0.4 },
                "line_items": []
            }))))
            .mount(&server)
            .await;

        let client = OcrClient::with_base_url("k", &server.uri());
        let extraction = client.extract("receipt.jpg", vec![0]).await.unwrap();

        assert!(extraction.needs_retake());
    }

    #[tokio::test]
    async fn test_service_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let client = OcrClient::with_base_url("k", &server.uri());
        let result = client.extract("receipt.jpg", vec![0]).await;

        assert!(matches!(result, Err(OcrError::Service(_))));
    }

    #[tokio::test]
    async fn test_malformed_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let client = OcrClient::with_base_url("k", &server.uri());
        let result = client.extract("receipt.jpg", vec![0]).await;

        assert!(matches!(result, Err(OcrError::Service(_))));
    }

    #[tokio::test]
    async fn test_missing_prediction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "document": {} })))
            .mount(&server)
            .await;

        let client = OcrClient::with_base_url("k", &server.uri());
        let result = client.extract("receipt.jpg", vec![0]).await;

        assert!(matches!(result, Err(OcrError::Service(_))));
    }
}
