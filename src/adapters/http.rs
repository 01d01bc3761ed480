//! HTTPS backend adapter.
//!
//! Implements [`BackendPort`] against the device API. Each call opens one
//! connection with the configured timeout, attaches the device token, and
//! classifies the outcome:
//!
//! | Outcome                       | Result                          |
//! |-------------------------------|---------------------------------|
//! | 2xx + decodable JSON          | `Ok(..)`                        |
//! | 401                           | `Err(Error::Auth)`              |
//! | 404                           | `Err(Error::NotFound)`          |
//! | any other status              | `Err(Transport(Status(code)))`  |
//! | connect / timeout / read fail | `Err(Transport(..))`            |
//! | body not the expected JSON    | `Err(Transport(Decode))`        |
//!
//! The classification helpers are target-independent and unit-tested on
//! the host; the ESP-IDF client itself is gated on `target_os = "espidf"`.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result, TransportError};

/// Largest response body accepted (firmware payloads included).
pub const MAX_RESPONSE_BYTES: usize = 512 * 1024;

/// Map an HTTP status to the agent error taxonomy.
pub fn classify_status(status: u16) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        401 => Err(Error::Auth),
        404 => Err(Error::NotFound),
        other => Err(Error::Transport(TransportError::Status(other))),
    }
}

pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|_| Error::Transport(TransportError::Decode))
}

/// `User-Agent` sent with every request, e.g. `DoorLink/1.0.0 (DL-D00A01)`.
pub fn user_agent(firmware_version: &str, device_id: &str) -> String {
    format!("DoorLink/{firmware_version} ({device_id})")
}

#[cfg(target_os = "espidf")]
pub use esp::HttpBackend;

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;

    use embedded_svc::http::client::Client as HttpClient;
    use embedded_svc::http::{Method, Status};
    use embedded_svc::io::{Read, Write};
    use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};
    use log::debug;

    use super::{MAX_RESPONSE_BYTES, classify_status, decode_body};
    use crate::app::ports::BackendPort;
    use crate::error::{Error, Result, TransportError};
    use crate::protocol::{
        ACK_ENDPOINT, AckRequest, COMMAND_ENDPOINT, CommandOffer, DEVICE_TOKEN_HEADER,
        FIRMWARE_ENDPOINT, FirmwarePayload, LOG_ENDPOINT, LogSubmission, StatusReply, endpoint_url,
    };

    pub struct HttpBackend {
        base_url: String,
        token: String,
        user_agent: String,
        timeout: Duration,
    }

    fn io_error<E: core::fmt::Debug>(e: E) -> Error {
        let text = format!("{e:?}");
        debug!("HTTP | transport error: {text}");
        if text.contains("TIMEOUT") || text.contains("EAGAIN") {
            Error::Transport(TransportError::Timeout)
        } else {
            Error::Transport(TransportError::Io)
        }
    }

    impl HttpBackend {
        pub fn new(base_url: &str, token: &str, user_agent: String, timeout_ms: u32) -> Self {
            Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                token: token.to_string(),
                user_agent,
                timeout: Duration::from_millis(u64::from(timeout_ms)),
            }
        }

        fn exchange(&self, method: Method, endpoint: &str, body: Option<&[u8]>) -> Result<Vec<u8>> {
            let url = endpoint_url(&self.base_url, endpoint);
            let conf = HttpClientConfiguration {
                timeout: Some(self.timeout),
                crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                ..Default::default()
            };
            let conn = EspHttpConnection::new(&conf)
                .map_err(|_| Error::Transport(TransportError::Connect))?;
            let mut client = HttpClient::wrap(conn);

            let length = body.map_or(0, <[u8]>::len).to_string();
            let mut headers = vec![
                (DEVICE_TOKEN_HEADER, self.token.as_str()),
                ("User-Agent", self.user_agent.as_str()),
                ("Accept", "application/json"),
            ];
            if body.is_some() {
                headers.push(("Content-Type", "application/json"));
                headers.push(("Content-Length", length.as_str()));
            }

            let mut request = client
                .request(method, &url, &headers)
                .map_err(|_| Error::Transport(TransportError::Connect))?;
            if let Some(body) = body {
                request.write_all(body).map_err(io_error)?;
                request.flush().map_err(io_error)?;
            }
            let mut response = request.submit().map_err(io_error)?;
            let status = response.status();

            let mut buf = Vec::new();
            let mut chunk = [0_u8; 1024];
            loop {
                let read = response.read(&mut chunk).map_err(io_error)?;
                if read == 0 {
                    break;
                }
                if buf.len() + read > MAX_RESPONSE_BYTES {
                    return Err(Error::Transport(TransportError::Decode));
                }
                buf.extend_from_slice(&chunk[..read]);
            }

            classify_status(status)?;
            Ok(buf)
        }

        fn post_json<T: serde::Serialize>(&self, endpoint: &str, payload: &T) -> Result<()> {
            let body =
                serde_json::to_vec(payload).map_err(|_| Error::Transport(TransportError::Decode))?;
            let reply = self.exchange(Method::Post, endpoint, Some(&body))?;
            let _: StatusReply = decode_body(&reply)?;
            Ok(())
        }
    }

    impl BackendPort for HttpBackend {
        fn poll_command(&mut self) -> Result<CommandOffer> {
            let body = self.exchange(Method::Get, COMMAND_ENDPOINT, None)?;
            decode_body(&body)
        }

        fn acknowledge(&mut self, command_id: u64) -> Result<()> {
            self.post_json(ACK_ENDPOINT, &AckRequest { command_id })
        }

        fn fetch_release(&mut self) -> Result<FirmwarePayload> {
            let body = self.exchange(Method::Get, FIRMWARE_ENDPOINT, None)?;
            decode_body(&body)
        }

        fn submit_log(&mut self, entry: &LogSubmission) -> Result<()> {
            self.post_json(LOG_ENDPOINT, entry)
        }
    }
}
