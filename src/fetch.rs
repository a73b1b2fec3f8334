use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use crate::errors::{Result, RoadSegError};
use crate::storage::staging_path;
use crate::traits::RemoteFetcher;

/// Downloads files over HTTP(S) from a URL template containing `{id}`.
///
/// The blocking client is built per call: it owns its own runtime and must
/// not be created or dropped on an async worker thread. Downloads have no
/// timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    url_template: String,
}

impl HttpFetcher {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
        }
    }

    pub fn url_for(&self, id: &str) -> String {
        self.url_template.replace("{id}", id)
    }
}

fn fetch_error<E>(url: &str, source: E) -> RoadSegError
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    RoadSegError::Fetch {
        url: url.to_string(),
        source: source.into(),
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, id: &str, destination: &Path) -> Result<()> {
        let url = self.url_for(id);
        tracing::info!(%url, destination = %destination.display(), "downloading");

        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| fetch_error(&url, e))?;
        let response = client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(&url, e))?;

        // Large files on the content host come back as an HTML confirmation page.
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.starts_with("text/html") {
            return Err(fetch_error(&url, "server answered with an HTML page instead of a raster"));
        }

        let bytes = response.bytes().map_err(|e| fetch_error(&url, e))?;

        let partial = staging_path(destination, "download");
        fs::write(&partial, &bytes)
            .map_err(|e| RoadSegError::file_system(&partial, "write download", e))?;
        fs::rename(&partial, destination)
            .map_err(|e| RoadSegError::file_system(destination, "move download into place", e))?;

        tracing::info!(%url, bytes = bytes.len(), "download complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    /// Serves one response whose body trickles out in `chunks` pieces with
    /// `pause` between them. Returns the URL template pointing at it.
    fn trickle_server(content_type: &'static str, body: Vec<u8>, chunks: usize, pause: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 2 {
                line.clear();
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            for piece in body.chunks(body.len().div_ceil(chunks).max(1)) {
                thread::sleep(pause);
                stream.write_all(piece).unwrap();
                stream.flush().unwrap();
            }
        });
        format!("http://127.0.0.1:{port}/{{id}}")
    }

    #[test]
    fn test_url_for_substitutes_id() {
        let fetcher = HttpFetcher::new("https://drive.google.com/uc?id={id}");
        assert_eq!(fetcher.url_for("abc123"), "https://drive.google.com/uc?id=abc123");
    }

    #[test]
    fn test_unreachable_host_is_fetch_error() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("scene.tif");
        // port 9 on localhost: nothing listens there
        let fetcher = HttpFetcher::new("http://127.0.0.1:9/{id}");

        let result = fetcher.fetch("scene", &destination);
        match result {
            Err(RoadSegError::Fetch { url, .. }) => assert_eq!(url, "http://127.0.0.1:9/scene"),
            other => panic!("expected fetch error, got {other:?}"),
        }
        assert!(!destination.exists());
    }

    #[test]
    fn test_slow_body_is_downloaded() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("scene.tif");
        let body = b"II*\0slow raster bytes".to_vec();
        let fetcher = HttpFetcher::new(trickle_server("image/tiff", body.clone(), 4, Duration::from_millis(300)));

        fetcher.fetch("scene", &destination).unwrap();
        assert_eq!(fs::read(&destination).unwrap(), body);
        assert!(!staging_path(&destination, "download").exists());
    }

    #[test]
    #[ignore = "streams for more than 30 seconds"]
    fn test_download_outlives_thirty_seconds() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("scene.tif");
        let body = vec![7u8; 40];
        let fetcher = HttpFetcher::new(trickle_server("image/tiff", body.clone(), 40, Duration::from_secs(1)));

        fetcher.fetch("scene", &destination).unwrap();
        assert_eq!(fs::read(&destination).unwrap(), body);
    }

    #[test]
    fn test_html_page_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("monsia.tif");
        let fetcher = HttpFetcher::new(trickle_server(
            "text/html; charset=utf-8",
            b"<html>Google Drive can't scan this file for viruses</html>".to_vec(),
            1,
            Duration::ZERO,
        ));

        let result = fetcher.fetch("large-id", &destination);
        assert!(matches!(result, Err(RoadSegError::Fetch { .. })));
        assert!(!destination.exists());
    }
}
