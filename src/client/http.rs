//! Update server client over plain HTTP, built on a reqwest blocking client.
use std::io::Write;
use std::time::Duration;

use reqwest::blocking::{Client, ClientBuilder, Response};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use super::{ClientError, UpdateServer};
use crate::agent::state::StateId;
use crate::descriptor::UpdateDescriptor;

pub const UPGRADES_ENDPOINT: &str = "/upgrades";
pub const STATE_REPORT_ENDPOINT: &str = "/report";
pub const OBJECTS_ENDPOINT: &str = "/objects";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct StateReport<'a> {
    status: String,
    error_message: &'a str,
}

pub struct HttpUpdateServer {
    server: String,
    client: Client,
    // payloads are large, only the connection is bounded
    download_client: Client,
}

impl HttpUpdateServer {
    pub fn try_new(server: &str) -> Result<Self, ClientError> {
        let client = builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ClientError::Build(err.to_string()))?;
        let download_client = builder()
            .timeout(None)
            .build()
            .map_err(|err| ClientError::Build(err.to_string()))?;

        Ok(Self {
            server: server.trim_end_matches('/').to_string(),
            client,
            download_client,
        })
    }

    fn server_url(&self, path: &str) -> String {
        format!("{}/{}", self.server, path.trim_start_matches('/'))
    }
}

fn builder() -> ClientBuilder {
    Client::builder()
        .use_rustls_tls()
        .connect_timeout(REQUEST_TIMEOUT)
}

fn request_error(url: &str, err: reqwest::Error) -> ClientError {
    ClientError::Request {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

fn expect_success(url: &str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::UnexpectedStatus {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

impl UpdateServer for HttpUpdateServer {
    fn check_update(&self) -> Result<Option<UpdateDescriptor>, ClientError> {
        let url = self.server_url(UPGRADES_ENDPOINT);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .map_err(|err| request_error(&url, err))?;

        match response.status() {
            StatusCode::OK => {
                let descriptor = response.json::<UpdateDescriptor>().map_err(|err| {
                    ClientError::InvalidResponse {
                        url: url.clone(),
                        reason: err.to_string(),
                    }
                })?;
                debug!(
                    mode = descriptor.mode(),
                    sha256sum = %descriptor.sha256sum(),
                    "update available"
                );
                Ok(Some(descriptor))
            }
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            status => Err(ClientError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            }),
        }
    }

    fn fetch_object(
        &self,
        descriptor: &UpdateDescriptor,
        dest: &mut dyn Write,
    ) -> Result<u64, ClientError> {
        let url = self.server_url(&format!("{OBJECTS_ENDPOINT}/{}", descriptor.sha256sum()));
        let response = self
            .download_client
            .get(&url)
            .send()
            .map_err(|err| request_error(&url, err))?;
        let mut response = expect_success(&url, response)?;

        let written = std::io::copy(&mut response, dest)?;
        debug!(url = %url, written, "object fetched");
        Ok(written)
    }

    fn report_state(&self, state: StateId, error_message: &str) -> Result<(), ClientError> {
        let url = self.server_url(STATE_REPORT_ENDPOINT);
        let report = StateReport {
            status: state.to_string(),
            error_message,
        };
        let response = self
            .client
            .post(&url)
            .json(&report)
            .send()
            .map_err(|err| request_error(&url, err))?;
        expect_success(&url, response)?;
        Ok(())
    }
}
