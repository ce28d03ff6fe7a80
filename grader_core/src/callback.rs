use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::{error::Result, submission::Submission};

#[derive(Debug, Serialize, PartialEq)]
pub struct StatusView {
    pub id: u32,
    pub description: &'static str,
}

/// What the outside world learns about a finished submission.
#[derive(Debug, Serialize, PartialEq)]
pub struct ResultView {
    pub token: Uuid,
    pub status: StatusView,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub time: Option<f64>,
    pub wall_time: Option<f64>,
    pub memory: Option<u64>,
}

impl From<&Submission> for ResultView {
    fn from(s: &Submission) -> Self {
        Self {
            token: s.token,
            status: StatusView {
                id: s.status.id(),
                description: s.status.description(),
            },
            stdout: s.stdout.clone(),
            stderr: s.stderr.clone(),
            compile_output: s.compile_output.clone(),
            message: s.message.clone(),
            exit_code: s.exit_code,
            exit_signal: s.exit_signal,
            time: s.time,
            wall_time: s.wall_time,
            memory: s.memory,
        }
    }
}

/// JSON body sent to the callback url.
pub fn body(submission: &Submission) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&ResultView::from(submission))?)
}

pub struct Notifier {
    client: reqwest::Client,
}

impl Notifier {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }

    /// PUTs the result to the submission's callback url, if it has one.
    pub async fn notify(&self, submission: &Submission) -> Result<()> {
        let url = match &submission.callback_url {
            Some(url) if !url.trim().is_empty() => url,
            _ => return Ok(()),
        };
        self.client
            .put(url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body(submission)?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
