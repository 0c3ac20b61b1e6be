use anyhow::anyhow;
use async_trait::async_trait;
use brain_tumor_service::collaborators::answer::TOO_LARGE_MESSAGE;
use brain_tumor_service::collaborators::narrative::NARRATIVE_UNAVAILABLE;
use brain_tumor_service::collaborators::{
    Answer, AnswerGenerator, ChatModel, Chatbot, ClassifierError, DecodeError, DocumentDecoder,
    GenerationError, ImageClassifier, ImageTensor, KnowledgeBase, KnowledgeError, Narrative,
    NarrativeGenerator, Prediction, ReportRenderer, TokenBudget, TumorLabel,
};
use brain_tumor_service::{AppState, RequestLimits, build_router};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::{Client, StatusCode, multipart};
use serde_json::{Value, json};
use session_store::{InMemorySessionStore, PagePayload, StoreConfig};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Treats `%PDF-` bodies as documents with one page per following line.
struct LinePagesDecoder;

#[async_trait]
impl DocumentDecoder for LinePagesDecoder {
    async fn decode(&self, raw: &[u8]) -> Result<Vec<PagePayload>, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }
        let text = std::str::from_utf8(raw).map_err(|e| DecodeError::Failed(e.to_string()))?;
        let Some(rest) = text.strip_prefix("%PDF-") else {
            return Err(DecodeError::Unsupported("expected a PDF document".to_string()));
        };
        if rest.starts_with("slow") {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(rest
            .lines()
            .skip(1)
            .map(|line| PagePayload::png(line.as_bytes().to_vec()))
            .collect())
    }
}

/// Echoes the page count and query; `fail` and `slow` queries misbehave.
struct EchoAnswers;

#[async_trait]
impl AnswerGenerator for EchoAnswers {
    async fn answer(&self, pages: &[PagePayload], query: &str) -> Result<Answer, GenerationError> {
        match query {
            "fail" => Err(GenerationError::Upstream("model offline".to_string())),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err(GenerationError::Upstream("unreachable".to_string()))
            }
            _ => Ok(Answer {
                message: format!("{} pages: {}", pages.len(), query),
                description: "stub".to_string(),
                lists: None,
            }),
        }
    }
}

struct FixedClassifier;

#[async_trait]
impl ImageClassifier for FixedClassifier {
    async fn classify(&self, tensor: &ImageTensor) -> Result<Prediction, ClassifierError> {
        assert_eq!(tensor.shape, [1, 224, 224, 3]);
        Ok(Prediction {
            label: TumorLabel::Glioma,
            confidence: 0.93,
        })
    }
}

struct StubNarrator {
    fail: bool,
}

#[async_trait]
impl NarrativeGenerator for StubNarrator {
    async fn narrate(
        &self,
        prediction: &Prediction,
        _image: &[u8],
        _media_type: &str,
    ) -> anyhow::Result<Narrative> {
        if self.fail {
            return Err(anyhow!("vision model unavailable"));
        }
        Ok(Narrative {
            header: format!("About {}", prediction.label.display_name()),
            lists: Some(vec!["Simple explanation".to_string()]),
        })
    }
}

struct StubReports;

#[async_trait]
impl ReportRenderer for StubReports {
    async fn render(
        &self,
        _image: &[u8],
        _media_type: &str,
        tumor_type: &str,
        confidence: f64,
    ) -> anyhow::Result<Vec<u8>> {
        Ok(format!("%PDF-1.4 {tumor_type} {confidence:.2}").into_bytes())
    }
}

struct StubKnowledge;

#[async_trait]
impl KnowledgeBase for StubKnowledge {
    async fn search(&self, _query: &str) -> Result<Vec<String>, KnowledgeError> {
        Ok(vec!["Gliomas arise from glial cells.".to_string()])
    }
}

struct StubChat;

#[async_trait]
impl ChatModel for StubChat {
    async fn reply(&self, _preamble: &str, question: &str) -> anyhow::Result<String> {
        Ok(format!("- {question}"))
    }
}

#[derive(Default)]
struct Options {
    store: StoreConfig,
    limits: RequestLimits,
    narrative_fails: bool,
}

struct TestApp {
    base_url: String,
    http: Client,
}

impl TestApp {
    async fn spawn(options: Options) -> Self {
        let store = Arc::new(InMemorySessionStore::new(options.store).unwrap());
        let state = AppState {
            sessions: store,
            decoder: Arc::new(LinePagesDecoder),
            answers: Arc::new(EchoAnswers),
            classifier: Arc::new(FixedClassifier),
            narrator: Arc::new(StubNarrator {
                fail: options.narrative_fails,
            }),
            reports: Arc::new(StubReports),
            chatbot: Arc::new(Chatbot::new(
                Arc::new(StubKnowledge),
                Arc::new(StubChat),
                Duration::from_secs(5),
            )),
            limits: options.limits,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn create(&self, body: &str) -> reqwest::Response {
        self.http
            .post(self.url("/sessions"))
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    async fn create_ok(&self, body: &str) -> String {
        let response = self.create(body).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        body["session_id"].as_str().unwrap().to_string()
    }

    async fn ask(&self, session_id: &str, text: &str) -> reqwest::Response {
        self.http
            .post(self.url(&format!("/sessions/{session_id}/queries")))
            .json(&json!({ "text": text }))
            .send()
            .await
            .unwrap()
    }
}

fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_pixel(16, 16, Rgb([120, 120, 120]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

fn image_form(filename: &str) -> multipart::Form {
    multipart::Form::new().part(
        "file",
        multipart::Part::bytes(png_bytes()).file_name(filename.to_string()),
    )
}

#[tokio::test]
async fn document_round_trip() {
    let app = TestApp::spawn(Options::default()).await;

    let session_id = app.create_ok("%PDF-1.7\npageA\npageB").await;

    let info: Value = app
        .http
        .get(app.url(&format!("/sessions/{session_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["page_count"], 2);
    assert_eq!(info["payload_bytes"], 10);

    let response = app.ask(&session_id, "What is the diagnosis?").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["answer"]["message"], "2 pages: What is the diagnosis?");
}

#[tokio::test]
async fn unknown_session_is_a_client_error() {
    let app = TestApp::spawn(Options::default()).await;

    let response = app.ask("nonexistent", "hello").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid or expired session ID");
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let app = TestApp::spawn(Options::default()).await;
    let session_id = app.create_ok("%PDF-1.7\npageA").await;

    let response = app.ask(&session_id, "   ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .http
        .post(app.url(&format!("/sessions/{session_id}/queries")))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bad_documents_are_rejected_without_creating_sessions() {
    let app = TestApp::spawn(Options::default()).await;

    assert_eq!(app.create("").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        app.create("GIF89a not a pdf").await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(app.create("%PDF-1.7").await.status(), StatusCode::BAD_REQUEST);

    let health: Value = app
        .http
        .get(app.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["sessions"]["sessions"], 0);
}

#[tokio::test]
async fn decode_timeout_stores_nothing() {
    let app = TestApp::spawn(Options {
        limits: RequestLimits {
            decode_timeout: Duration::from_millis(50),
            ..RequestLimits::default()
        },
        ..Options::default()
    })
    .await;

    let response = app.create("%PDF-slow\npageA").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let health: Value = app
        .http
        .get(app.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["sessions"]["sessions"], 0);
}

#[tokio::test]
async fn least_recently_used_session_is_evicted_at_capacity() {
    let app = TestApp::spawn(Options {
        store: StoreConfig::new().with_max_sessions(2),
        ..Options::default()
    })
    .await;

    let s1 = app.create_ok("%PDF-1.7\np1").await;
    let s2 = app.create_ok("%PDF-1.7\np2").await;
    let s3 = app.create_ok("%PDF-1.7\np3").await;

    assert_eq!(app.ask(&s1, "hi").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.ask(&s2, "hi").await.status(), StatusCode::OK);
    assert_eq!(app.ask(&s3, "hi").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn oversized_query_gets_explanatory_answer() {
    let app = TestApp::spawn(Options {
        limits: RequestLimits {
            token_budget: TokenBudget {
                max_tokens: 1,
                ..Default::default()
            },
            ..RequestLimits::default()
        },
        ..Options::default()
    })
    .await;
    let session_id = app.create_ok("%PDF-1.7\npageA").await;

    let response = app.ask(&session_id, "summarize everything").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["answer"]["message"], TOO_LARGE_MESSAGE);
}

#[tokio::test]
async fn generator_failures_keep_the_session() {
    let app = TestApp::spawn(Options {
        limits: RequestLimits {
            generation_timeout: Duration::from_millis(50),
            ..RequestLimits::default()
        },
        ..Options::default()
    })
    .await;
    let session_id = app.create_ok("%PDF-1.7\npageA").await;

    let response = app.ask(&session_id, "fail").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(!body["message"].as_str().unwrap().contains("model offline"));

    let response = app.ask(&session_id, "slow").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(app.ask(&session_id, "again").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let app = TestApp::spawn(Options::default()).await;
    let session_id = app.create_ok("%PDF-1.7\npageA").await;
    let url = app.url(&format!("/sessions/{session_id}"));

    let response = app.http.delete(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.http.delete(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.http.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn multipart_upload_and_ask() {
    let app = TestApp::spawn(Options::default()).await;
    let form = multipart::Form::new().part(
        "file",
        multipart::Part::bytes(b"%PDF-1.7\npageA\npageB\npageC".to_vec()).file_name("report.pdf"),
    );

    let response = app
        .http
        .post(app.url("/api/chat-pdf/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let session_id = body["session_id"].as_str().unwrap();

    let response = app
        .http
        .post(app.url(&format!("/api/chat-pdf/ask/{session_id}")))
        .json(&json!({ "text": "Summary?" }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["answer"]["message"], "3 pages: Summary?");
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let app = TestApp::spawn(Options::default()).await;
    let form = multipart::Form::new().text("note", "no file here");

    let response = app
        .http
        .post(app.url("/api/chat-pdf/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "No file uploaded");
}

#[tokio::test]
async fn predict_returns_label_and_narrative() {
    let app = TestApp::spawn(Options::default()).await;

    let response = app
        .http
        .post(app.url("/api/interface/predict"))
        .multipart(image_form("scan.png"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["result"], "glioma");
    assert_eq!(body["data"]["message"]["header"], "About Glioma Tumor");
}

#[tokio::test]
async fn predict_keeps_classification_when_narrative_fails() {
    let app = TestApp::spawn(Options {
        narrative_fails: true,
        ..Options::default()
    })
    .await;

    let response = app
        .http
        .post(app.url("/api/interface/predict"))
        .multipart(image_form("scan.jpg"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["result"], "glioma");
    assert_eq!(body["data"]["message"], NARRATIVE_UNAVAILABLE);
}

#[tokio::test]
async fn predict_rejects_unsupported_extensions() {
    let app = TestApp::spawn(Options::default()).await;

    let response = app
        .http
        .post(app.url("/api/interface/predict"))
        .multipart(image_form("scan.gif"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn report_is_returned_as_pdf_attachment() {
    let app = TestApp::spawn(Options::default()).await;
    let form = image_form("scan.png")
        .text("tumor_type", "glioma")
        .text("confidence", "93.5");

    let response = app
        .http
        .post(app.url("/api/report/generate"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    let disposition = response.headers()["content-disposition"].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"report_"));
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], b"%PDF-1.4 glioma 93.50");
}

#[tokio::test]
async fn report_requires_classification_fields() {
    let app = TestApp::spawn(Options::default()).await;
    let form = image_form("scan.png").text("confidence", "high");

    let response = app
        .http
        .post(app.url("/api/report/generate"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chatbot_answers_questions() {
    let app = TestApp::spawn(Options::default()).await;

    let body: Value = app
        .http
        .post(app.url("/api/chatbot"))
        .json(&json!({ "text": "What is a glioma?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["response"], "- What is a glioma?");
}

#[tokio::test]
async fn chatbot_rejects_blank_text() {
    let app = TestApp::spawn(Options::default()).await;

    for payload in [json!({ "text": "   " }), json!({})] {
        let response = app
            .http
            .post(app.url("/api/chatbot"))
            .json(&payload)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Text query is empty");
    }
}

#[tokio::test]
async fn malformed_json_bodies_use_the_error_shape() {
    let app = TestApp::spawn(Options::default()).await;
    let session_id = app.create_ok("%PDF-1.7\npageA").await;

    let requests = [
        app.http
            .post(app.url(&format!("/sessions/{session_id}/queries")))
            .header("content-type", "text/plain")
            .body("What is this?"),
        app.http
            .post(app.url(&format!("/sessions/{session_id}/queries")))
            .json(&json!({ "text": 5 })),
        app.http
            .post(app.url("/api/chatbot"))
            .header("content-type", "application/json")
            .body("{not json"),
    ];

    for request in requests {
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
}

#[tokio::test]
async fn root_lists_endpoints() {
    let app = TestApp::spawn(Options::default()).await;

    let body: Value = app
        .http
        .get(app.url("/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["service"], "Brain Tumor Service");
    assert!(body["endpoints"]["POST /sessions"].is_string());
}
