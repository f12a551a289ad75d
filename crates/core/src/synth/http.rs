use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::{
    blocking::{
        multipart::{Form, Part},
        Client,
    },
    StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::SynthesisConfig,
    synth::{decode_wav, AudioBuffer, ClipSynthesizer, SynthesisRequest},
    Result, SpeechError,
};

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking client for the remote TTS service.
///
/// The service keeps reference voices keyed by the absolute path the caller
/// knows them under, so the same path is used for the existence check, the
/// upload and every synthesis request.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    base_url: String,
    client: Client,
    emo_text: Option<String>,
    emo_vector: Option<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct SynthesizePayload<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emo_vector: Option<&'a [f32]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emo_text: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    exists: bool,
}

impl HttpSynthesizer {
    pub fn new(base_url: &str, config: &SynthesisConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            emo_text: config.emo_text.clone(),
            emo_vector: config.emo_vector.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Asks the service whether it already holds the reference voice.
    pub fn reference_exists(&self, path: &Path) -> Result<bool> {
        let response = self
            .client
            .get(self.endpoint("/v1/check/audio"))
            .query(&[("file_name", path.to_string_lossy())])
            .timeout(CHECK_TIMEOUT)
            .send()?
            .error_for_status()?;
        Ok(response.json::<CheckResponse>()?.exists)
    }

    /// Uploads a reference voice and returns the service's JSON reply.
    pub fn upload_reference(&self, path: &Path) -> Result<serde_json::Value> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reference.wav".to_string());

        let form = Form::new()
            .part(
                "audio",
                Part::bytes(bytes).file_name(file_name).mime_str("audio/wav")?,
            )
            .text("full_path", path.to_string_lossy().into_owned());

        let response = self
            .client
            .post(self.endpoint("/v1/upload_audio"))
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// Makes sure the service can use `path` as a reference voice and returns
    /// the absolute path to send with synthesis requests.
    ///
    /// A missing local file is an error. Problems talking to the service are
    /// only logged: the service may still know the voice from an earlier run.
    pub fn prepare_reference(&self, path: &Path) -> Result<PathBuf> {
        let absolute = std::path::absolute(path)?;
        if !absolute.is_file() {
            return Err(SpeechError::msg(format!(
                "reference audio not found: {}",
                absolute.display()
            )));
        }

        let reference = absolute.display();
        if matches!(self.reference_exists(&absolute), Ok(true)) {
            tracing::debug!(%reference, "reference voice already on server");
        } else {
            match self.upload_reference(&absolute) {
                Ok(reply) => tracing::info!(%reference, %reply, "uploaded reference voice"),
                Err(err) => tracing::warn!(%reference, error = %err, "reference upload failed"),
            }
        }

        Ok(absolute)
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }

    fn payload<'a>(&'a self, request: &SynthesisRequest<'a>) -> SynthesizePayload<'a> {
        let emo_vector = self.emo_vector.as_deref();
        SynthesizePayload {
            text: request.text,
            audio_path: request
                .reference
                .map(|path| path.to_string_lossy().into_owned()),
            emo_vector,
            emo_text: match emo_vector {
                Some(_) => None,
                None => self.emo_text.as_deref(),
            },
        }
    }
}

impl ClipSynthesizer for HttpSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<AudioBuffer> {
        let response = self
            .client
            .post(self.endpoint("/v2/synthesize"))
            .json(&self.payload(request))
            .send()?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(SpeechError::msg(format!("server returned {status}: {body}")));
        }

        let bytes = response.bytes()?;
        if bytes.is_empty() {
            return Err(SpeechError::Decode("empty response body".to_string()));
        }
        decode_wav(&bytes)
    }
}
