//! The emotion model seam.
//!
//! The classifier never knows what sits behind [`EmotionModel`]: a local
//! runtime, a remote inference service or a test double. [`ModelHandle`]
//! decides whether the model is loaded once and reused or loaded afresh for
//! every run.

use crate::error::ModelError;
use log::{debug, info};
use std::sync::{Arc, OnceLock};

/// Hugging Face model the reference deployment classifies with.
pub const DEFAULT_MODEL_ID: &str = "SamLowe/roberta-base-go_emotions";

/// Inference endpoint for [`DEFAULT_MODEL_ID`].
pub const DEFAULT_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/SamLowe/roberta-base-go_emotions";

/// Given text, return the single most likely label.
pub trait EmotionModel: Send + Sync {
    /// `max_length` is the token budget the model truncates its input to.
    fn predict(&self, text: &str, max_length: usize) -> Result<String, ModelError>;
}

/// Makes a model ready for use.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn EmotionModel>, ModelError>;
}

impl<F> ModelLoader for F
where
    F: Fn() -> Result<Arc<dyn EmotionModel>, ModelError> + Send + Sync,
{
    fn load(&self) -> Result<Arc<dyn EmotionModel>, ModelError> {
        self()
    }
}

/// When the model gets loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "web", derive(clap::ValueEnum))]
pub enum LoadPolicy {
    /// Load on first use and reuse the instance for every later run
    #[default]
    Once,
    /// Load for every run and drop it afterwards
    PerCall,
}

/// A loader plus the policy for reusing what it loads.
pub struct ModelHandle {
    loader: Arc<dyn ModelLoader>,
    policy: LoadPolicy,
    cached: OnceLock<Arc<dyn EmotionModel>>,
}

impl ModelHandle {
    pub fn new(loader: Arc<dyn ModelLoader>, policy: LoadPolicy) -> Self {
        Self {
            loader,
            policy,
            cached: OnceLock::new(),
        }
    }

    /// Wraps an already loaded model; `acquire` never fails.
    pub fn preloaded(model: Arc<dyn EmotionModel>) -> Self {
        let cached = OnceLock::new();
        let _ = cached.set(model.clone());
        let loader = move || -> Result<Arc<dyn EmotionModel>, ModelError> { Ok(model.clone()) };
        Self {
            loader: Arc::new(loader),
            policy: LoadPolicy::Once,
            cached,
        }
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    /// Returns a model ready for predictions.
    ///
    /// A failed load is never cached, so the next run tries again.
    pub fn acquire(&self) -> Result<Arc<dyn EmotionModel>, ModelError> {
        match self.policy {
            LoadPolicy::PerCall => {
                debug!("Loading emotion model for this run");
                self.loader.load()
            }
            LoadPolicy::Once => {
                if let Some(model) = self.cached.get() {
                    return Ok(model.clone());
                }
                let model = self.loader.load()?;
                info!("Emotion model loaded and cached");
                Ok(self.cached.get_or_init(|| model).clone())
            }
        }
    }
}

#[cfg(feature = "web")]
pub use http::{HttpModel, HttpModelLoader};

#[cfg(feature = "web")]
mod http {
    use super::{EmotionModel, ModelLoader};
    use crate::error::ModelError;
    use log::{debug, info, warn};
    use reqwest::StatusCode;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    // Sent once at load time to prove the endpoint answers
    const WARM_UP_TEXT: &str = "Hello";
    const WARM_UP_MAX_LENGTH: usize = 16;

    /// Settings for a text-classification inference service.
    #[derive(Clone, Debug)]
    pub struct HttpModelLoader {
        pub url: String,
        pub token: Option<String>,
        pub timeout: Duration,
    }

    impl ModelLoader for HttpModelLoader {
        /// Builds the client and classifies one short text.
        ///
        /// An unreachable host, a rejected token, an unknown model or an
        /// answer that is not a prediction list fails the load. Server-side
        /// errors and rate limits only log a warning; they may clear up by the
        /// time the real inputs are sent.
        fn load(&self) -> Result<Arc<dyn EmotionModel>, ModelError> {
            let url = reqwest::Url::parse(&self.url)
                .map_err(|e| ModelError::Load(format!("invalid model URL '{}': {}", self.url, e)))?;

            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| ModelError::Load(format!("failed to build HTTP client: {}", e)))?;

            let model = HttpModel {
                client,
                url,
                token: self.token.clone(),
            };

            match model.call(WARM_UP_TEXT, WARM_UP_MAX_LENGTH) {
                Ok(label) => debug!("Warm-up prediction: {}", label),
                Err(e) if e.is_fatal() => {
                    return Err(ModelError::Load(format!(
                        "model endpoint {} is not usable: {}",
                        model.url, e
                    )));
                }
                Err(e) => warn!("Warm-up request to {} failed: {}", model.url, e),
            }

            info!("Using emotion model endpoint {}", model.url);
            Ok(Arc::new(model))
        }
    }

    /// Emotion model served over HTTP.
    ///
    /// Speaks the Hugging Face inference API shape: the text goes out as
    /// `inputs`, and a list of `{label, score}` objects (possibly nested one
    /// level) comes back.
    pub struct HttpModel {
        client: reqwest::blocking::Client,
        url: reqwest::Url,
        token: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct Prediction {
        label: String,
        score: f64,
    }

    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    enum PredictionResponse {
        Nested(Vec<Vec<Prediction>>),
        Flat(Vec<Prediction>),
    }

    #[derive(Debug, thiserror::Error)]
    enum CallError {
        #[error("request failed: {0}")]
        Unreachable(String),

        #[error("API error ({0}): {1}")]
        Status(StatusCode, String),

        #[error("unexpected response: {0}")]
        Malformed(String),
    }

    impl CallError {
        /// Errors that no retry will fix.
        fn is_fatal(&self) -> bool {
            match self {
                CallError::Unreachable(_) | CallError::Malformed(_) => true,
                CallError::Status(status, _) => {
                    status.is_client_error() && *status != StatusCode::TOO_MANY_REQUESTS
                }
            }
        }
    }

    fn request_body(text: &str, max_length: usize) -> serde_json::Value {
        json!({
            "inputs": text,
            "parameters": {
                "truncation": true,
                "max_length": max_length,
            },
        })
    }

    impl HttpModel {
        fn call(&self, text: &str, max_length: usize) -> Result<String, CallError> {
            let mut request = self
                .client
                .post(self.url.clone())
                .json(&request_body(text, max_length));
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .map_err(|e| CallError::Unreachable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().unwrap_or_default();
                return Err(CallError::Status(status, text));
            }

            let parsed: PredictionResponse = response
                .json()
                .map_err(|e| CallError::Malformed(e.to_string()))?;

            top_label(parsed).ok_or_else(|| CallError::Malformed("no labels".to_string()))
        }
    }

    impl EmotionModel for HttpModel {
        fn predict(&self, text: &str, max_length: usize) -> Result<String, ModelError> {
            self.call(text, max_length)
                .map_err(|e| ModelError::Predict(e.to_string()))
        }
    }

    fn top_label(response: PredictionResponse) -> Option<String> {
        let predictions = match response {
            PredictionResponse::Nested(mut outer) => {
                if outer.is_empty() {
                    return None;
                }
                outer.swap_remove(0)
            }
            PredictionResponse::Flat(flat) => flat,
        };

        predictions
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|p| p.label)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::thread::{self, JoinHandle};

        const JOY: &str = r#"[[{"label":"joy","score":0.9},{"label":"neutral","score":0.1}]]"#;

        fn parse(raw: &str) -> PredictionResponse {
            serde_json::from_str(raw).unwrap()
        }

        fn loader(url: String) -> HttpModelLoader {
            HttpModelLoader {
                url,
                token: Some("secret".to_string()),
                timeout: Duration::from_secs(5),
            }
        }

        /// Answers one connection per `(status line, body)` pair, in order, and
        /// hands back the request bodies it received.
        fn serve(replies: Vec<(&'static str, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}/models/emotions", listener.local_addr().unwrap());

            let handle = thread::spawn(move || {
                let mut bodies = Vec::new();
                for (status, body) in replies {
                    let (mut stream, _) = listener.accept().unwrap();
                    bodies.push(read_request_body(&mut stream));
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    stream.write_all(response.as_bytes()).unwrap();
                }
                bodies
            });

            (url, handle)
        }

        fn read_request_body(stream: &mut impl Read) -> String {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);

                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        return String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).into_owned();
                    }
                }
            }
            String::new()
        }

        #[test]
        fn picks_highest_score_from_nested_response() {
            let response = parse(
                r#"[[{"label":"neutral","score":0.1},{"label":"joy","score":0.8},{"label":"anger","score":0.1}]]"#,
            );
            assert_eq!(top_label(response).as_deref(), Some("joy"));
        }

        #[test]
        fn accepts_flat_response() {
            let response = parse(r#"[{"label":"sadness","score":0.6},{"label":"grief","score":0.3}]"#);
            assert_eq!(top_label(response).as_deref(), Some("sadness"));
        }

        #[test]
        fn empty_response_has_no_label() {
            assert_eq!(top_label(parse("[]")), None);
            assert_eq!(top_label(parse("[[]]")), None);
        }

        #[test]
        fn request_body_carries_truncation_settings() {
            let body = request_body("I am happy today!", 512);
            assert_eq!(body["inputs"], "I am happy today!");
            assert_eq!(body["parameters"]["truncation"], true);
            assert_eq!(body["parameters"]["max_length"], 512);
        }

        #[test]
        fn invalid_url_fails_to_load() {
            assert!(matches!(
                loader("not a url".to_string()).load(),
                Err(ModelError::Load(_))
            ));
        }

        #[test]
        fn unreachable_host_fails_to_load() {
            let port = TcpListener::bind("127.0.0.1:0")
                .unwrap()
                .local_addr()
                .unwrap()
                .port();
            let result = loader(format!("http://127.0.0.1:{}/", port)).load();
            assert!(matches!(result, Err(ModelError::Load(_))));
        }

        #[test]
        fn unknown_model_fails_to_load() {
            let (url, server) = serve(vec![("404 Not Found", r#"{"error":"Model not found"}"#)]);
            let result = loader(url).load();
            server.join().unwrap();

            match result {
                Err(ModelError::Load(message)) => assert!(message.contains("404")),
                Err(other) => panic!("expected a load error, got {}", other),
                Ok(_) => panic!("expected a load error"),
            }
        }

        #[test]
        fn rejected_token_fails_to_load() {
            let (url, server) = serve(vec![("401 Unauthorized", r#"{"error":"Invalid token"}"#)]);
            assert!(matches!(loader(url).load(), Err(ModelError::Load(_))));
            server.join().unwrap();
        }

        #[test]
        fn warm_up_then_predict_sends_max_length() {
            let (url, server) = serve(vec![("200 OK", JOY), ("200 OK", JOY)]);

            let model = loader(url).load().unwrap();
            assert_eq!(model.predict("what a day", 128).unwrap(), "joy");

            let bodies = server.join().unwrap();
            assert_eq!(bodies.len(), 2);
            let sent: serde_json::Value = serde_json::from_str(&bodies[1]).unwrap();
            assert_eq!(sent["inputs"], "what a day");
            assert_eq!(sent["parameters"]["truncation"], true);
            assert_eq!(sent["parameters"]["max_length"], 128);
        }

        #[test]
        fn server_errors_are_per_prediction() {
            let (url, server) = serve(vec![
                ("503 Service Unavailable", r#"{"error":"Model is loading"}"#),
                ("500 Internal Server Error", r#"{"error":"boom"}"#),
            ]);

            let model = loader(url).load().unwrap();
            match model.predict("hello", 512) {
                Err(ModelError::Predict(message)) => assert!(message.contains("500")),
                other => panic!("expected a prediction error, got {:?}", other.map(|_| ())),
            }
            server.join().unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed;

    impl EmotionModel for Fixed {
        fn predict(&self, _text: &str, _max_length: usize) -> Result<String, ModelError> {
            Ok("joy".to_string())
        }
    }

    fn counting_loader(loads: Arc<AtomicUsize>) -> Arc<dyn ModelLoader> {
        Arc::new(move || -> Result<Arc<dyn EmotionModel>, ModelError> {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Fixed))
        })
    }

    #[test]
    fn load_once_reuses_the_model() {
        let loads = Arc::new(AtomicUsize::new(0));
        let handle = ModelHandle::new(counting_loader(loads.clone()), LoadPolicy::Once);

        for _ in 0..3 {
            handle.acquire().unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn load_per_call_loads_every_time() {
        let loads = Arc::new(AtomicUsize::new(0));
        let handle = ModelHandle::new(counting_loader(loads.clone()), LoadPolicy::PerCall);

        for _ in 0..3 {
            handle.acquire().unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let loader = move || -> Result<Arc<dyn EmotionModel>, ModelError> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ModelError::Load("weights missing".to_string()))
            } else {
                Ok(Arc::new(Fixed))
            }
        };
        let handle = ModelHandle::new(Arc::new(loader), LoadPolicy::Once);

        assert!(matches!(handle.acquire(), Err(ModelError::Load(_))));
        assert!(handle.acquire().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn preloaded_handle_predicts() {
        let handle = ModelHandle::preloaded(Arc::new(Fixed));
        let model = handle.acquire().unwrap();
        assert_eq!(model.predict("hello", 512).unwrap(), "joy");
    }
}
