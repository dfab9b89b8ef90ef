//! Cloudinary client against a mocked upload API.

use mockito::{Matcher, Server};
use serde_json::json;

use gqlgate::config::{CloudinaryConfig, SignatureAlgorithm};
use gqlgate::media::{CloudinaryClient, MediaError, MediaProvider, ResourceType, UploadOptions};

fn client_for(server: &Server) -> CloudinaryClient {
    CloudinaryClient::new(CloudinaryConfig {
        cloud_name: "demo".into(),
        api_key: "key-123".into(),
        api_secret: "secret".into(),
        api_base: server.url(),
        signature_algorithm: SignatureAlgorithm::Sha1,
    })
}

#[tokio::test]
async fn upload_posts_signed_form_and_parses_reference() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1_1/demo/auto/upload")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("public_id".into(), "1700000000000".into()),
            Matcher::UrlEncoded("api_key".into(), "key-123".into()),
            Matcher::UrlEncoded("file".into(), "data:image/png;base64,AAAA".into()),
            Matcher::Regex("signature=[0-9a-f]{40}".into()),
            Matcher::Regex("timestamp=[0-9]+".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "public_id": "1700000000000",
                "secure_url": "https://res.cloudinary.com/demo/image/upload/1700000000000.png",
                "format": "png",
                "bytes": 3
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let options = UploadOptions { public_id: "1700000000000".into(), resource_type: ResourceType::Auto };
    let result = client.upload("data:image/png;base64,AAAA", &options).await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.public_id, "1700000000000");
    assert_eq!(result.secure_url, "https://res.cloudinary.com/demo/image/upload/1700000000000.png");
}

#[tokio::test]
async fn destroy_ok_and_not_found() {
    let mut server = Server::new_async().await;
    let ok = server
        .mock("POST", "/v1_1/demo/image/destroy")
        .match_body(Matcher::UrlEncoded("public_id".into(), "present".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"result":"ok"}"#)
        .create_async()
        .await;
    let missing = server
        .mock("POST", "/v1_1/demo/image/destroy")
        .match_body(Matcher::UrlEncoded("public_id".into(), "absent".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"result":"not found"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    assert_eq!(client.destroy("present").await, Ok(()));
    assert_eq!(client.destroy("absent").await, Err(MediaError::NotFound));
    ok.assert_async().await;
    missing.assert_async().await;
}

#[tokio::test]
async fn api_errors_carry_provider_message() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1_1/demo/auto/upload")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"message":"Invalid Signature abc. String to sign - 'public_id=1&timestamp=2'."}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let options = UploadOptions { public_id: "1".into(), resource_type: ResourceType::Auto };
    let err = client.upload("https://example.com/cat.png", &options).await.unwrap_err();
    match err {
        MediaError::Api { status, message } => {
            assert_eq!(status, 401);
            assert!(message.starts_with("Invalid Signature"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn unexpected_destroy_result_is_rejected() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1_1/demo/image/destroy")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"result":"error"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    assert_eq!(client.destroy("x").await, Err(MediaError::Rejected("error".into())));
}

#[tokio::test]
async fn unreachable_provider_is_transport_error() {
    let client = CloudinaryClient::new(CloudinaryConfig {
        cloud_name: "demo".into(),
        api_key: "k".into(),
        api_secret: "s".into(),
        api_base: "http://127.0.0.1:1".into(),
        signature_algorithm: SignatureAlgorithm::Sha256,
    });
    assert!(matches!(client.destroy("x").await, Err(MediaError::Transport(_))));
}
