//! Fetch and decode candidate images.
//!
//! Every failure is a [`Error::Load`] for that URL only.

use std::io::Read;

use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::http::{build_agent, describe_error};
use crate::types::DecodedImage;

/// Retrieves an image and decodes it into pixels.
pub trait ImageLoader: Send + Sync {
    fn load(&self, url: &str) -> Result<DecodedImage>;
}

/// Loads images over HTTP(S).
pub struct HttpImageLoader {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpImageLoader {
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            agent: build_agent(config.timeout_secs, &config.user_agent),
            max_bytes: config.max_bytes,
        }
    }
}

impl Default for HttpImageLoader {
    fn default() -> Self {
        Self::new(&LoaderConfig::default())
    }
}

impl ImageLoader for HttpImageLoader {
    fn load(&self, url: &str) -> Result<DecodedImage> {
        check_scheme(url)?;

        let response = self
            .agent
            .get(url)
            .set("Accept", "image/*")
            .call()
            .map_err(|e| Error::load(url, describe_error(e)))?;

        check_content_type(url, response.header("Content-Type"))?;

        if let Some(length) = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            if length > self.max_bytes {
                return Err(Error::load(
                    url,
                    format!("payload of {} bytes exceeds limit of {}", length, self.max_bytes),
                ));
            }
        }

        // One byte past the limit tells an oversized body from an exact fit
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|e| Error::load(url, format!("failed to read body: {e}")))?;

        let decoded = decode_image(url, &bytes, self.max_bytes)?;
        tracing::debug!(
            url,
            bytes = bytes.len(),
            width = decoded.image.width(),
            height = decoded.image.height(),
            "image loaded"
        );
        Ok(decoded)
    }
}

fn check_scheme(url: &str) -> Result<()> {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::load(url, "only http and https URLs are fetched"))
    }
}

/// Reject payloads that announce themselves as something other than a raster image.
///
/// A missing header and `application/octet-stream` are left to format sniffing.
pub fn check_content_type(url: &str, content_type: Option<&str>) -> Result<()> {
    let Some(content_type) = content_type else {
        return Ok(());
    };

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "image/svg+xml" {
        return Err(Error::load(url, "vector images are not supported"));
    }
    if mime.starts_with("image/") || mime == "application/octet-stream" || mime.is_empty() {
        return Ok(());
    }

    Err(Error::load(url, format!("unsupported content type {mime}")))
}

/// Decode raw bytes, enforcing the size limit first.
pub fn decode_image(url: &str, bytes: &[u8], max_bytes: u64) -> Result<DecodedImage> {
    if bytes.is_empty() {
        return Err(Error::load(url, "empty body"));
    }
    if bytes.len() as u64 > max_bytes {
        return Err(Error::load(
            url,
            format!("payload exceeds limit of {} bytes", max_bytes),
        ));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::load(url, format!("failed to decode image: {e}")))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(Error::load(url, "image has no pixels"));
    }

    Ok(DecodedImage {
        url: url.to_string(),
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::{Cursor, Write};
    use std::net::TcpListener;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    /// Serve a single HTTP response on a local port and return its URL.
    fn serve_once(content_type: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 2048];
                let _ = std::io::Read::read(&mut stream, &mut request);
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    content_type,
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });

        format!("http://{}/image", addr)
    }

    #[test]
    fn content_type_image_accepted() {
        assert!(check_content_type("u", Some("image/jpeg")).is_ok());
        assert!(check_content_type("u", Some("Image/PNG; charset=binary")).is_ok());
        assert!(check_content_type("u", None).is_ok());
        assert!(check_content_type("u", Some("application/octet-stream")).is_ok());
    }

    #[test]
    fn content_type_html_rejected() {
        let err = check_content_type("u", Some("text/html; charset=utf-8")).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
        assert!(err.to_string().contains("text/html"));
    }

    #[test]
    fn content_type_svg_rejected() {
        assert!(check_content_type("u", Some("image/svg+xml")).is_err());
    }

    #[test]
    fn decode_png() {
        let decoded = decode_image("https://a.com/x.png", &png_bytes(8, 4), 1024 * 1024).unwrap();
        assert_eq!(decoded.url, "https://a.com/x.png");
        assert_eq!(decoded.image.width(), 8);
        assert_eq!(decoded.image.height(), 4);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_image("u", b"<html>not an image</html>", 1024).unwrap_err();
        assert!(err.to_string().contains("failed to decode"));
    }

    #[test]
    fn decode_rejects_oversized_and_empty() {
        let bytes = png_bytes(8, 8);
        assert!(decode_image("u", &bytes, 10).is_err());
        assert!(decode_image("u", &[], 10).is_err());
    }

    #[test]
    fn non_http_scheme_rejected_without_fetch() {
        let loader = HttpImageLoader::default();
        let err = loader.load("file:///etc/passwd").unwrap_err();
        assert!(err.to_string().contains("only http and https"));
    }

    #[test]
    fn loads_image_over_http() {
        let url = serve_once("image/png", png_bytes(16, 16));
        let decoded = HttpImageLoader::default().load(&url).unwrap();
        assert_eq!(decoded.image.width(), 16);
    }

    #[test]
    fn html_payload_is_load_error() {
        let url = serve_once("text/html", b"<html></html>".to_vec());
        let err = HttpImageLoader::default().load(&url).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[test]
    fn unbounded_limit_still_loads() {
        let url = serve_once("image/png", png_bytes(4, 4));
        let loader = HttpImageLoader::new(&LoaderConfig {
            max_bytes: u64::MAX,
            ..Default::default()
        });
        assert_eq!(loader.load(&url).unwrap().image.width(), 4);
    }

    #[test]
    fn oversized_payload_is_load_error() {
        let url = serve_once("image/png", png_bytes(64, 64));
        let loader = HttpImageLoader::new(&LoaderConfig {
            max_bytes: 16,
            ..Default::default()
        });
        let err = loader.load(&url).unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
    }
}
