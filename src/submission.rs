use crate::session::Artifact;
use anyhow::Context;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("earmark/", env!("CARGO_PKG_VERSION"));
pub const UPLOAD_PATH: &str = "/audio_upload";
pub const IDENTIFY_PATH: &str = "/identify";
pub const AUDIO_FIELD: &str = "file";
pub const AUDIO_FILENAME: &str = "recording.wav";

/// Rejections raised before any network activity. Transport and server
/// problems are not errors at this level; they come back as a
/// `TransportFailure` outcome so the shell can offer a retry.
#[derive(Debug, Error, PartialEq)]
pub enum SubmissionError {
    #[error("{0}")]
    Validation(&'static str),
}

/// Everything a submission can come back as, normalized across the two
/// endpoint shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Url(UrlOutcome),
    Audio(AudioOutcome),
    TransportFailure { message: String },
}

/// Upload endpoint body. The raw status string is preserved; only
/// "Success" is known to mean a new registration, every other status is a
/// benign duplicate/no-op signal whose exact meaning the service does not
/// document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UrlOutcome {
    pub status: String,
    pub title: Option<String>,
    pub song_id: Option<String>,
}

impl UrlOutcome {
    pub fn is_registered(&self) -> bool {
        self.status == "Success"
    }
}

/// Identification endpoint body with the candidate slots flattened into
/// rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioOutcome {
    pub match_found: bool,
    pub candidates: Vec<Candidate>,
    pub error_message: Option<String>,
}

/// One identification result. Immutable once received.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Candidate {
    pub song_id: String,
    pub title: String,
    pub channel: String,
    #[serde(rename = "url")]
    pub source_url: String,
    pub score: f64,
    #[serde(rename = "time_diff")]
    pub time_offset_secs: f64,
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    url: &'a str,
}

/// Wire shape of the identification endpoint: up to three fixed candidate
/// slots, slot 1 being the best match.
#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    match_found: bool,
    match_1: Option<Candidate>,
    match_2: Option<Candidate>,
    match_3: Option<Candidate>,
    error: Option<String>,
}

impl From<IdentifyResponse> for AudioOutcome {
    fn from(raw: IdentifyResponse) -> Self {
        let candidates = [raw.match_1, raw.match_2, raw.match_3]
            .into_iter()
            .flatten()
            .collect();

        AudioOutcome {
            match_found: raw.match_found,
            candidates,
            error_message: raw.error,
        }
    }
}

/// HTTP client for the identification service
pub struct SubmissionClient {
    http: reqwest::Client,
    base_url: String,
}

impl SubmissionClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST the URL as JSON to the upload endpoint.
    ///
    /// An input that trims to empty is rejected locally with no network
    /// call. Both registration and duplicate statuses come back as data.
    pub async fn submit_url(&self, url: &str) -> Result<SubmissionOutcome, SubmissionError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SubmissionError::Validation("enter a URL before submitting"));
        }

        let endpoint = format!("{}{}", self.base_url, UPLOAD_PATH);
        tracing::debug!(%endpoint, "Submitting URL");

        let response = match self
            .http
            .post(&endpoint)
            .json(&UploadRequest { url })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(transport_failure(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(transport_failure(format!(
                "upload endpoint returned {status}"
            )));
        }

        match response.json::<UrlOutcome>().await {
            Ok(outcome) => {
                tracing::info!(status = %outcome.status, "URL submission answered");
                Ok(SubmissionOutcome::Url(outcome))
            }
            Err(e) => Ok(transport_failure(e.to_string())),
        }
    }

    /// POST the finished take as a multipart body to the identification
    /// endpoint.
    ///
    /// A missing or empty artifact is rejected locally with no network
    /// call. `match_found` is the sole success discriminator; server
    /// explanations ride along unchanged.
    pub async fn submit_audio(
        &self,
        artifact: Option<&Artifact>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let artifact = match artifact {
            Some(artifact) if !artifact.is_empty() => artifact,
            _ => {
                return Err(SubmissionError::Validation(
                    "record a clip before submitting",
                ));
            }
        };

        let part = match multipart::Part::bytes(artifact.bytes.clone())
            .file_name(AUDIO_FILENAME)
            .mime_str(artifact.mime)
        {
            Ok(part) => part,
            Err(e) => return Ok(transport_failure(e.to_string())),
        };
        let form = multipart::Form::new().part(AUDIO_FIELD, part);

        let endpoint = format!("{}{}", self.base_url, IDENTIFY_PATH);
        tracing::debug!(%endpoint, bytes = artifact.len(), "Submitting recording");

        let response = match self.http.post(&endpoint).multipart(form).send().await {
            Ok(response) => response,
            Err(e) => return Ok(transport_failure(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(transport_failure(format!(
                "identify endpoint returned {status}"
            )));
        }

        match response.json::<IdentifyResponse>().await {
            Ok(raw) => Ok(SubmissionOutcome::Audio(raw.into())),
            Err(e) => Ok(transport_failure(e.to_string())),
        }
    }
}

fn transport_failure(message: String) -> SubmissionOutcome {
    tracing::warn!(%message, "Submission did not complete");
    SubmissionOutcome::TransportFailure { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn wav(bytes: Vec<u8>) -> Artifact {
        Artifact {
            bytes,
            mime: "audio/wav",
        }
    }

    fn client_for(server: &MockServer) -> SubmissionClient {
        SubmissionClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    /// Matches a multipart body carrying the recording under the expected
    /// field name, filename and mime type.
    struct MultipartRecording;

    impl wiremock::Match for MultipartRecording {
        fn matches(&self, request: &Request) -> bool {
            let body = String::from_utf8_lossy(&request.body);
            body.contains("name=\"file\"")
                && body.contains("filename=\"recording.wav\"")
                && body.contains("audio/wav")
        }
    }

    #[tokio::test]
    async fn test_blank_url_rejected_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server);

        assert!(matches!(
            client.submit_url("").await,
            Err(SubmissionError::Validation(_))
        ));
        assert!(matches!(
            client.submit_url("   ").await,
            Err(SubmissionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_artifact_rejected_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server);

        assert!(matches!(
            client.submit_audio(None).await,
            Err(SubmissionError::Validation(_))
        ));
        assert!(matches!(
            client.submit_audio(Some(&wav(Vec::new()))).await,
            Err(SubmissionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_url_registration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .and(body_json(json!({"url": "https://youtu.be/abc123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Success",
                "title": "Some Song",
                "song_id": "42"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);

        let outcome = client.submit_url("https://youtu.be/abc123").await.unwrap();
        match outcome {
            SubmissionOutcome::Url(url) => {
                assert!(url.is_registered());
                assert_eq!(url.title.as_deref(), Some("Some Song"));
                assert_eq!(url.song_id.as_deref(), Some("42"));
            }
            other => panic!("expected a URL outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_status_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "Song already exists"})),
            )
            .mount(&server)
            .await;
        let client = client_for(&server);

        let outcome = client.submit_url("https://youtu.be/abc123").await.unwrap();
        match outcome {
            SubmissionOutcome::Url(url) => {
                assert!(!url.is_registered());
                assert_eq!(url.status, "Song already exists");
                assert_eq!(url.title, None);
                assert_eq!(url.song_id, None);
            }
            other => panic!("expected a URL outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let outcome = client.submit_url("https://youtu.be/abc123").await.unwrap();
        match outcome {
            SubmissionOutcome::TransportFailure { message } => {
                assert!(message.contains("500"), "message was {:?}", message);
            }
            other => panic!("expected a transport failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IDENTIFY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let outcome = client.submit_audio(Some(&wav(vec![1, 2, 3]))).await.unwrap();
        assert!(matches!(
            outcome,
            SubmissionOutcome::TransportFailure { .. }
        ));
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let client = SubmissionClient::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();

        let outcome = client.submit_url("https://youtu.be/abc123").await.unwrap();
        assert!(matches!(
            outcome,
            SubmissionOutcome::TransportFailure { .. }
        ));
    }

    fn slot(n: u32) -> serde_json::Value {
        json!({
            "song_id": n.to_string(),
            "title": format!("Song {n}"),
            "channel": format!("Channel {n}"),
            "url": format!("https://www.youtube.com/watch?v=vid{n}"),
            "score": 100.0 / n as f64,
            "time_diff": n as f64 * 0.5
        })
    }

    #[tokio::test]
    async fn test_slot_flattening() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IDENTIFY_PATH))
            .and(MultipartRecording)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "match_found": true,
                "match_1": slot(1),
                "match_2": slot(2),
                "match_3": slot(3)
            })))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);

        let outcome = client
            .submit_audio(Some(&wav(vec![0; 64])))
            .await
            .unwrap();
        match outcome {
            SubmissionOutcome::Audio(audio) => {
                assert!(audio.match_found);
                assert_eq!(audio.error_message, None);
                let ids: Vec<&str> = audio
                    .candidates
                    .iter()
                    .map(|c| c.song_id.as_str())
                    .collect();
                assert_eq!(ids, vec!["1", "2", "3"]);
                assert_eq!(audio.candidates[0].source_url, "https://www.youtube.com/watch?v=vid1");
                assert_eq!(audio.candidates[0].time_offset_secs, 0.5);
                assert_eq!(audio.candidates[0].channel, "Channel 1");
            }
            other => panic!("expected an audio outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_partial_slots() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IDENTIFY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "match_found": true,
                "match_1": slot(1),
                "match_3": slot(3)
            })))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let outcome = client.submit_audio(Some(&wav(vec![0; 8]))).await.unwrap();
        match outcome {
            SubmissionOutcome::Audio(audio) => {
                let ids: Vec<&str> = audio
                    .candidates
                    .iter()
                    .map(|c| c.song_id.as_str())
                    .collect();
                assert_eq!(ids, vec!["1", "3"]);
            }
            other => panic!("expected an audio outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_match_explanation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IDENTIFY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "match_found": false,
                "error": "Low confidence match."
            })))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let outcome = client.submit_audio(Some(&wav(vec![0; 8]))).await.unwrap();
        match outcome {
            SubmissionOutcome::Audio(audio) => {
                assert!(!audio.match_found);
                assert!(audio.candidates.is_empty());
                assert_eq!(audio.error_message.as_deref(), Some("Low confidence match."));
            }
            other => panic!("expected an audio outcome, got {:?}", other),
        }
    }

    fn scored_slot(n: u32, score: f64) -> serde_json::Value {
        let mut slot = slot(n);
        slot["score"] = json!(score);
        slot
    }

    #[tokio::test]
    async fn test_response_ranks_by_score() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IDENTIFY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "match_found": true,
                "match_1": scored_slot(1, 500.0),
                "match_2": scored_slot(2, 300.0),
                "match_3": scored_slot(3, 100.0)
            })))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let outcome = client.submit_audio(Some(&wav(vec![0; 16]))).await.unwrap();
        let audio = match outcome {
            SubmissionOutcome::Audio(audio) => audio,
            other => panic!("expected an audio outcome, got {:?}", other),
        };

        let ranked = crate::ranking::Ranker::new().rank(&audio);
        let confidences: Vec<f64> = ranked.iter().map(|r| r.confidence_percent).collect();
        assert_eq!(confidences, vec![100.0, 60.0, 20.0]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.candidate.song_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
