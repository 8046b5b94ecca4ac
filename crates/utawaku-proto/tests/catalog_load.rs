use std::io::Write;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use utawaku_proto::catalog::{fetch_catalog, load_catalog, CatalogError};
use utawaku_proto::resolver::resolve;

const DOC: &str = r#"[
    {
        "videoName": "【歌枠】Karaoke night",
        "videoId": "A",
        "timestamps": [
            { "start": "0", "title": "Song1" },
            { "start": "120", "title": "Song2", "artist": "Artist2" },
            { "start": "245.5", "title": "Song3" }
        ]
    },
    {
        "videoName": "Unarchived",
        "videoId": "B",
        "timestamps": []
    }
]"#;

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

/// Serve every request on a local port with the same canned response and
/// return the catalog URL.
async fn serve(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    format!("http://{}/videos.json", addr)
}

#[tokio::test]
async fn loads_catalog_from_url() {
    let url = serve("200 OK", DOC).await;

    let catalog = load_catalog(&url).await;
    assert_eq!(catalog.len(), 2);
    let a = catalog.find("A").expect("video A");
    assert_eq!(resolve(a, 130.0).map(|e| e.title.as_str()), Some("Song2"));
}

#[tokio::test]
async fn non_success_status_degrades_to_empty_catalog() {
    let url = serve("404 Not Found", "not here").await;

    assert!(matches!(
        fetch_catalog(&url).await,
        Err(CatalogError::Status(404))
    ));
    assert!(load_catalog(&url).await.is_empty());
}

#[tokio::test]
async fn loads_catalog_from_file() {
    let file = write_temp(DOC);
    let source = file.path().to_string_lossy().to_string();

    let catalog = load_catalog(&source).await;
    assert_eq!(catalog.len(), 2);

    let a = catalog.find("A").expect("video A");
    assert_eq!(a.timestamps.len(), 3);
    assert_eq!(resolve(a, 60.0).map(|e| e.title.as_str()), Some("Song1"));
    assert_eq!(resolve(a, 245.5).map(|e| e.title.as_str()), Some("Song3"));
    assert!(resolve(catalog.find("B").expect("video B"), 10.0).is_none());
}

#[tokio::test]
async fn missing_file_degrades_to_empty_catalog() {
    let dir = tempfile::tempdir().expect("temp dir");
    let source = dir.path().join("videos.json").to_string_lossy().to_string();

    assert!(matches!(fetch_catalog(&source).await, Err(CatalogError::Io(_))));
    assert!(load_catalog(&source).await.is_empty());
}

#[tokio::test]
async fn malformed_file_degrades_to_empty_catalog() {
    let file = write_temp(r#"[{"videoName": "x", "videoId": "#);
    let source = file.path().to_string_lossy().to_string();
    assert!(load_catalog(&source).await.is_empty());

    let file = write_temp(
        r#"[{"videoName":"x","videoId":"X","timestamps":[{"start":"soon","title":"t"}]}]"#,
    );
    let source = file.path().to_string_lossy().to_string();
    assert!(matches!(
        fetch_catalog(&source).await,
        Err(CatalogError::Schema { .. })
    ));
    assert!(load_catalog(&source).await.is_empty());
}
