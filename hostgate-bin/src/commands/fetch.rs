use std::str::FromStr;

use anyhow::{Context, Result};
use futures::future::join_all;
use hostgate_lib::{Client, CompletionHandle, ErrorKind, Request};
use http::{HeaderMap, Method};
use log::debug;
use url::Url;

use crate::{
    ExitCode,
    options::{Config, HeaderMapExt},
    stats::FetchStats,
};

/// Submit every URL `cfg.repeat` times, then wait for all outcomes.
///
/// All requests are submitted before the first one is awaited, so they
/// compete for connections the way concurrent callers would. Results are
/// reported in submission order.
pub(crate) async fn fetch(
    client: &Client,
    urls: &[String],
    cfg: &Config,
) -> Result<(FetchStats, ExitCode)> {
    let method = Method::from_str(&cfg.method.to_uppercase())
        .with_context(|| format!("Invalid request method `{}`", cfg.method))?;
    let headers = HeaderMap::from_header_pairs(&cfg.header)?;

    let mut submissions = Vec::with_capacity(urls.len() * cfg.repeat);
    for url in urls {
        let request = build_request(url, &method, &headers);
        for _ in 0..cfg.repeat {
            submissions.push((url.as_str(), submit(client, &request)));
        }
    }

    let outcomes = join_all(submissions.into_iter().map(|(url, handle)| async move {
        let result = match handle {
            Ok(handle) => handle.wait().await,
            Err(e) => Err(e),
        };
        (url, result)
    }))
    .await;

    let mut stats = FetchStats::default();
    for (url, result) in outcomes {
        match &result {
            Ok(response) => debug!("{response}"),
            Err(e) => debug!("Request to {url} failed: {e}"),
        }
        stats.add(url, &result);
    }

    let code = if stats.is_success() {
        ExitCode::Success
    } else {
        ExitCode::RequestFailure
    };
    Ok((stats, code))
}

fn build_request(url: &str, method: &Method, headers: &HeaderMap) -> Result<Request, ErrorKind> {
    let url = Url::parse(url).map_err(|e| ErrorKind::from((url.to_string(), e)))?;
    let mut request = Request::new(method.clone(), url);
    request.headers = headers.clone();
    Ok(request)
}

fn submit(
    client: &Client,
    request: &Result<Request, ErrorKind>,
) -> Result<CompletionHandle, ErrorKind> {
    request.clone().map(|request| client.submit(request))
}
