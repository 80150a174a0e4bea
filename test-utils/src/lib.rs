//! `test-utils` is used for testing in both `hostgate-lib` and `hostgate-bin`.
//! This crate does not depend on `hostgate-lib` or `hostgate-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status when
/// handling a matching request
///
/// Additional `ResponseTemplate` builder calls can be chained, e.g.
/// `mock_server!(StatusCode::OK, set_delay(Duration::from_millis(200)))`.
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Write the given TOML to a temporary config file.
///
/// The file is removed when the returned `NamedTempFile` is dropped.
#[macro_export]
macro_rules! config_file {
    ($contents:expr) => {{
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("Cannot create config file");
        file.write_all($contents.as_bytes())
            .expect("Cannot write config file");
        file
    }};
}
