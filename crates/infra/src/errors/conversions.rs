//! Conversions from external infrastructure errors into domain errors.

use redis::RedisError;
use reqwest::Error as HttpError;
use tunelink_domain::TuneLinkError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TuneLinkError);

impl From<InfraError> for TuneLinkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TuneLinkError> for InfraError {
    fn from(value: TuneLinkError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoTuneLinkError {
    fn into_tunelink(self) -> TuneLinkError;
}

/* -------------------------------------------------------------------------- */
/* redis::RedisError → TuneLinkError */
/* -------------------------------------------------------------------------- */

impl IntoTuneLinkError for RedisError {
    fn into_tunelink(self) -> TuneLinkError {
        if self.is_timeout() {
            return TuneLinkError::Storage("redis operation timed out".into());
        }
        if self.is_connection_refusal() {
            return TuneLinkError::Storage("redis connection refused".into());
        }
        if self.is_connection_dropped() {
            return TuneLinkError::Storage("redis connection dropped".into());
        }

        match self.kind() {
            redis::ErrorKind::AuthenticationFailed => {
                TuneLinkError::Storage("redis authentication failed".into())
            }
            redis::ErrorKind::TypeError => {
                TuneLinkError::Storage("unexpected redis response type".into())
            }
            redis::ErrorKind::InvalidClientConfig => {
                TuneLinkError::Config(format!("invalid redis configuration: {self}"))
            }
            _ => TuneLinkError::Storage(format!("redis failure: {self}")),
        }
    }
}

impl From<RedisError> for InfraError {
    fn from(value: RedisError) -> Self {
        InfraError(value.into_tunelink())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TuneLinkError */
/* -------------------------------------------------------------------------- */

impl IntoTuneLinkError for HttpError {
    fn into_tunelink(self) -> TuneLinkError {
        if self.is_timeout() {
            return TuneLinkError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return TuneLinkError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => TuneLinkError::oauth("unauthorized", Some(message)),
                404 => TuneLinkError::NotFound(message),
                429 => TuneLinkError::rate_limited(message, None),
                400..=499 => TuneLinkError::oauth("invalid_request", Some(message)),
                _ => TuneLinkError::Network(message),
            };
        }

        if self.is_decode() {
            return TuneLinkError::oauth(
                "invalid_response",
                Some("Provider response could not be decoded".into()),
            );
        }

        // Display of a reqwest error includes the URL, never the form body.
        TuneLinkError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_tunelink())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::{Client, StatusCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn redis_refused_maps_to_storage_error() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));

        let mapped: TuneLinkError = InfraError::from(err).into();
        match mapped {
            TuneLinkError::Storage(msg) => assert!(msg.contains("refused")),
            other => panic!("expected storage error, got {other:?}"),
        }
    }

    #[test]
    fn redis_type_error_maps_to_storage_error() {
        let err = RedisError::from((redis::ErrorKind::TypeError, "bad type"));
        let mapped: TuneLinkError = InfraError::from(err).into();
        assert_eq!(mapped, TuneLinkError::Storage("unexpected redis response type".into()));
    }

    #[tokio::test]
    async fn http_status_401_maps_to_oauth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: TuneLinkError = InfraError::from(error).into();
        match mapped {
            TuneLinkError::OAuth { error, description } => {
                assert_eq!(error, "unauthorized");
                assert!(description.unwrap_or_default().contains("401"));
            }
            other => panic!("expected oauth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_status_503_is_retryable_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::SERVICE_UNAVAILABLE))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: TuneLinkError = InfraError::from(error).into();
        assert!(matches!(mapped, TuneLinkError::Network(_)));
        assert!(mapped.is_retryable());
    }

    #[tokio::test]
    async fn connection_failure_maps_to_network_error() {
        let client = Client::builder().no_proxy().build().unwrap();
        // Port 9 (discard) on localhost is not expected to accept HTTP connections.
        let error = client.get("http://127.0.0.1:9/").send().await.unwrap_err();

        let mapped: TuneLinkError = InfraError::from(error).into();
        assert!(matches!(mapped, TuneLinkError::Network(_)));
    }
}
