use std::time::Duration;

use desk_core::ToolError;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

pub(crate) fn build_client(service: &'static str, timeout: Duration) -> Result<Client, ToolError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ToolError::transport(service, err))
}

/// Decodes a successful JSON body, or turns any other status into `ToolError::Status`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T, ToolError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ToolError::Status {
            service,
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|err| ToolError::decode(service, err))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
