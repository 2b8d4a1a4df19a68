//! Loopback redirect listener for the authorization-code flow
//!
//! Binds an ephemeral port on 127.0.0.1 and waits for the single browser
//! redirect carrying the authorization code. Requests for any other path
//! get a 404 and the listener keeps waiting; after the first request on the
//! expected path the listener stops accepting entirely.

use super::pkce;
use crate::cancel::CancellationToken;
use crate::{CoreError, Result};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const SUCCESS_PAGE: &str = "<!DOCTYPE html>\n<html><head><title>Authentication complete</title></head>\
<body><h1>Authentication complete</h1><p>You may close this page and return to your terminal.</p>\
</body></html>\n";

pub struct RedirectListener {
    listener: TcpListener,
    path: String,
    port: u16,
}

impl RedirectListener {
    /// Bind 127.0.0.1 on an ephemeral port with a random redirect path.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let path = format!("/{}", pkce::random_token(16));
        tracing::debug!(port, "bound loopback redirect listener");
        Ok(Self {
            listener,
            path,
            port,
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, self.path)
    }

    /// Wait for the browser redirect and return the authorization code.
    ///
    /// Consumes the listener: the socket is closed on every exit path, so
    /// nothing is left listening after the flow completes, fails, or is
    /// canceled.
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        loop {
            let (stream, _addr) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                _ = cancel.cancelled() => return Err(CoreError::Canceled),
            };

            match self.handle_connection(stream, expected_state).await {
                Ok(Some(code)) => return Ok(code),
                Ok(None) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Serve one connection. `Ok(None)` means "not the redirect, keep
    /// listening" (wrong path, unreadable request).
    async fn handle_connection(
        &self,
        stream: TcpStream,
        expected_state: &str,
    ) -> Result<Option<String>> {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await.is_err() {
            return Ok(None);
        }

        // "GET /path?query HTTP/1.1"
        let target = match request_line.split_whitespace().nth(1) {
            Some(target) => target,
            None => return Ok(None),
        };
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        let mut stream = reader.into_inner();
        if path != self.path {
            respond(&mut stream, "404 Not Found", "Not found\n").await;
            return Ok(None);
        }

        let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        if let Some(error) = params.get("error") {
            respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
            return Err(if error == "access_denied" {
                CoreError::Canceled
            } else {
                CoreError::AuthFailed(format!("authorization endpoint returned '{error}'"))
            });
        }

        if params.get("state").map(String::as_str) != Some(expected_state) {
            respond(&mut stream, "400 Bad Request", "State mismatch\n").await;
            return Err(CoreError::StateMismatch);
        }

        match params.get("code") {
            Some(code) => {
                respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                Ok(Some(code.clone()))
            }
            None => {
                respond(&mut stream, "400 Bad Request", "Missing code\n").await;
                Err(CoreError::AuthFailed(
                    "redirect carried no authorization code".into(),
                ))
            }
        }
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    // The browser side may already be gone; nothing useful to do about it
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationSource;
    use tokio::io::AsyncReadExt;

    async fn send_request(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_returns_code_for_matching_state() {
        let listener = RedirectListener::bind().await.unwrap();
        assert!(listener.redirect_uri().starts_with("http://127.0.0.1:"));
        let port = listener.port;
        let path = listener.path.clone();

        let wait = tokio::spawn(async move {
            listener
                .wait_for_code("expected-state", &CancellationToken::never())
                .await
        });

        let response =
            send_request(port, &format!("{path}?code=authcode&state=expected-state")).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert_eq!(wait.await.unwrap().unwrap(), "authcode");
    }

    #[tokio::test]
    async fn test_state_mismatch_fails_flow() {
        let listener = RedirectListener::bind().await.unwrap();
        let port = listener.port;
        let path = listener.path.clone();

        let wait = tokio::spawn(async move {
            listener
                .wait_for_code("expected-state", &CancellationToken::never())
                .await
        });

        send_request(port, &format!("{path}?code=authcode&state=forged")).await;
        assert!(matches!(
            wait.await.unwrap(),
            Err(CoreError::StateMismatch)
        ));
    }

    #[tokio::test]
    async fn test_wrong_path_is_404_and_flow_continues() {
        let listener = RedirectListener::bind().await.unwrap();
        let port = listener.port;
        let path = listener.path.clone();

        let wait = tokio::spawn(async move {
            listener
                .wait_for_code("expected-state", &CancellationToken::never())
                .await
        });

        let response = send_request(port, "/favicon.ico").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        send_request(port, &format!("{path}?code=late&state=expected-state")).await;
        assert_eq!(wait.await.unwrap().unwrap(), "late");
    }

    #[tokio::test]
    async fn test_access_denied_maps_to_canceled() {
        let listener = RedirectListener::bind().await.unwrap();
        let port = listener.port;
        let path = listener.path.clone();

        let wait = tokio::spawn(async move {
            listener
                .wait_for_code("expected-state", &CancellationToken::never())
                .await
        });

        send_request(port, &format!("{path}?error=access_denied")).await;
        assert!(matches!(wait.await.unwrap(), Err(CoreError::Canceled)));
    }

    #[tokio::test]
    async fn test_cancellation_unbinds_listener() {
        let listener = RedirectListener::bind().await.unwrap();
        let (source, token) = CancellationSource::new();

        let wait = tokio::spawn(async move {
            listener.wait_for_code("expected-state", &token).await
        });

        source.cancel();
        assert!(matches!(wait.await.unwrap(), Err(CoreError::Canceled)));
    }
}
