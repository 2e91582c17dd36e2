use std::time::Duration;

use bankrag_core::error::{Error, Result};
use reqwest::{Client, Response, StatusCode};

pub(crate) fn client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| Error::connection(format!("http client: {e}")))
}

pub(crate) fn send_error(what: &str, err: reqwest::Error) -> Error {
    Error::connection(format!("{what}: {err}"))
}

/// Non-2xx responses become errors; a rejected credential is a configuration problem.
pub(crate) async fn check_status(what: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::config(format!("{what}: credential rejected ({status})")));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::connection(format!("{what} returned {status}: {body}")));
    }
    Ok(resp)
}

/// `GET {base_url}/models` with bearer auth: proves the endpoint is reachable
/// and the key is accepted.
pub(crate) async fn check_openai(client: &Client, base_url: &str, api_key: &str) -> Result<()> {
    let what = "openai models endpoint";
    let resp = client
        .get(format!("{base_url}/models"))
        .bearer_auth(api_key)
        .send()
        .await
        .map_err(|e| send_error(what, e))?;
    check_status(what, resp).await?;
    Ok(())
}

pub(crate) fn require_key(api_key: Option<&str>) -> Result<String> {
    api_key
        .map(str::to_string)
        .ok_or_else(|| Error::config("cloud.api_key (or OPENAI_API_KEY) is required when mode = \"cloud\""))
}
