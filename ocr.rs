use crate::config::OcrSettings;
use crate::error::{Error, Result};
use reqwest::blocking::multipart::Form;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Raw answer of the recognition service. Non-200 answers are kept so the
/// caller can decide what to do with them.
#[derive(Debug, Clone)]
pub struct OcrResponse {
    pub status: u16,
    pub body: String,
}

impl OcrResponse {
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK.as_u16()
    }

    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

pub struct OcrClient {
    http: Client,
    settings: OcrSettings,
}

impl OcrClient {
    pub fn new(settings: OcrSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { http, settings })
    }

    /// Submits an image. A timeout is retried once after the backoff; a
    /// connection failure is not retried.
    pub fn submit(&self, image_path: &Path) -> Result<OcrResponse> {
        match self.post(image_path) {
            Err(Error::Http(err)) if err.is_timeout() => {
                log::warn!(
                    "Timeout. Will wait {}s and try again",
                    self.settings.retry_backoff_secs
                );
                std::thread::sleep(Duration::from_secs(self.settings.retry_backoff_secs));
                self.post(image_path)
            }
            other => other,
        }
    }

    fn post(&self, image_path: &Path) -> Result<OcrResponse> {
        let form = Form::new()
            .text("api_key", self.settings.api_key.clone())
            .text("recognizer", self.settings.recognizer.clone())
            .text("ref_no", self.settings.ref_no.clone())
            .file("file", image_path)?;

        let response = self
            .http
            .post(&self.settings.endpoint)
            .multipart(form)
            .send()
            .map_err(classify_transport_error)?;
        let status = response.status();
        let body = response.text()?;

        if status == StatusCode::OK {
            log::info!("Status Code:{}, success!!", status.as_u16());
        } else {
            log::warn!("Bad status code: {}", status.as_u16());
        }
        Ok(OcrResponse {
            status: status.as_u16(),
            body,
        })
    }
}

fn classify_transport_error(err: reqwest::Error) -> Error {
    if err.is_connect() && !err.is_timeout() {
        log::error!("Could not connect! {err}");
        Error::Connection(err.to_string())
    } else {
        Error::Http(err)
    }
}

/// `receipts/IMG_0042.final.jpg` is stored as `IMG_0042.json`.
pub fn result_file_name(image_path: &Path) -> Result<String> {
    let file_name = image_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("{} has no file name", image_path.display())))?;
    let stem = file_name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        return Err(Error::InvalidInput(format!(
            "cannot derive a result name from {}",
            image_path.display()
        )));
    }
    Ok(format!("{stem}.json"))
}

/// Writes the response with four-space indentation, keeping non-ASCII text as is.
pub fn write_result(results_dir: &Path, image_path: &Path, json: &Value) -> Result<PathBuf> {
    std::fs::create_dir_all(results_dir)?;
    let out_path = results_dir.join(result_file_name(image_path)?);

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    json.serialize(&mut ser)?;
    std::fs::write(&out_path, buf)?;

    log::info!("Stored OCR response at {}", out_path.display());
    Ok(out_path)
}

/// Submits the image and stores its JSON response.
pub fn fetch_results(client: &OcrClient, results_dir: &Path, image_path: &Path) -> Result<(OcrResponse, PathBuf)> {
    let response = client.submit(image_path)?;
    let json = response.json()?;
    let stored = write_result(results_dir, image_path, &json)?;
    Ok((response, stored))
}
