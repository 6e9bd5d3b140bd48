//! End-to-end tests for building, sending and resolving operations.

mod common;

use std::sync::{Arc, Mutex};

use common::{mount_user_info, oauth_config, valid_token};
use esign_core::{
    CallLog, ESIGN_V21, Error, LoggedCredential, MONITOR_V2, OAuth2Credential, Operation,
    RequestLogger, UploadFile,
};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn credential(server: &MockServer) -> OAuth2Credential {
    mount_user_info(server, &server.uri(), 1).await;
    oauth_config(server)
        .credential(valid_token("access-1"))
        .unwrap()
}

#[tokio::test]
async fn test_query_reaches_server_sorted() {
    let server = MockServer::start().await;
    let credential = credential(&server).await;

    Mock::given(method("GET"))
        .and(path("/restapi/v2.1/accounts/A/envelopes"))
        .and(query_param("page_number", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"envelopes": []})))
        .expect(1)
        .mount(&server)
        .await;

    let _: Value = Operation::get("envelopes", &ESIGN_V21)
        .query("status", "active")
        .query("status", "inactive")
        .query("page_number", "2")
        .execute(&credential)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let api_call = requests
        .iter()
        .find(|r| r.url.path().starts_with("/restapi"))
        .unwrap();
    assert_eq!(
        api_call.url.query(),
        Some("page_number=2&status=active&status=inactive")
    );
}

#[tokio::test]
async fn test_not_found_is_api_error() {
    let server = MockServer::start().await;
    let credential = credential(&server).await;

    Mock::given(method("GET"))
        .and(path("/restapi/v2.1/accounts/A/envelopes/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errorCode": "ENVELOPE_NOT_FOUND",
            "message": "no such envelope"
        })))
        .mount(&server)
        .await;

    let err = Operation::get("envelopes/{envelopeId}", &ESIGN_V21)
        .path_param("envelopeId", "missing")
        .execute::<Value, _>(&credential)
        .await
        .unwrap_err();

    assert!(!err.is_transport());
    let api = err.api_error().expect("api error");
    assert_eq!(api.status.as_u16(), 404);
    assert_eq!(api.error_code.as_deref(), Some("ENVELOPE_NOT_FOUND"));
    assert_eq!(api.message, "no such envelope");
}

#[tokio::test]
async fn test_non_json_error_body_kept_as_message() {
    let server = MockServer::start().await;
    let credential = credential(&server).await;

    Mock::given(method("DELETE"))
        .and(path("/restapi/v2.1/accounts/A/templates/t-1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = Operation::delete("templates/t-1", &ESIGN_V21)
        .execute_empty(&credential)
        .await
        .unwrap_err();

    let api = err.api_error().unwrap();
    assert_eq!(api.status.as_u16(), 503);
    assert_eq!(api.error_code, None);
    assert_eq!(api.message, "upstream unavailable");
    assert_eq!(&api.raw[..], b"upstream unavailable");
}

#[tokio::test]
async fn test_transport_failure_is_not_api_error() {
    let server = MockServer::start().await;
    // Nothing listens on port 1.
    mount_user_info(&server, "http://127.0.0.1:1", 1).await;
    let credential = oauth_config(&server)
        .credential(valid_token("access-1"))
        .unwrap();

    let err = Operation::get("envelopes", &ESIGN_V21)
        .execute::<Value, _>(&credential)
        .await
        .unwrap_err();

    assert!(err.is_transport(), "unexpected error: {:?}", err);
    assert!(err.api_error().is_none());
}

#[tokio::test]
async fn test_multipart_upload_order() {
    let server = MockServer::start().await;
    let credential = credential(&server).await;

    Mock::given(method("POST"))
        .and(path("/restapi/v2.1/accounts/A/envelopes"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"envelopeId": "e-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let created: Value = Operation::post("envelopes", &ESIGN_V21)
        .json(&json!({"emailSubject": "Please sign"}))
        .file(UploadFile::from_bytes("one.pdf", "application/pdf", b"first".to_vec()))
        .file(UploadFile::from_bytes("two.txt", "text/plain", b"second".to_vec()))
        .execute(&credential)
        .await
        .unwrap();
    assert_eq!(created["envelopeId"], "e-1");

    let requests = server.received_requests().await.unwrap();
    let upload = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();

    let content_type = upload.headers.get("content-type").unwrap().to_str().unwrap();
    let boundary = content_type
        .strip_prefix("multipart/form-data; boundary=")
        .unwrap();
    let body = String::from_utf8(upload.body.clone()).unwrap();

    let json_at = body.find(r#"{"emailSubject":"Please sign"}"#).unwrap();
    let first_at = body
        .find("Content-Disposition: file; filename=\"one.pdf\";documentid=1")
        .unwrap();
    let second_at = body
        .find("Content-Disposition: file; filename=\"two.txt\";documentid=2")
        .unwrap();
    assert!(json_at < first_at && first_at < second_at);
    assert!(body.starts_with(&format!("--{}\r\nContent-Type: application/json", boundary)));
    assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
}

#[tokio::test]
async fn test_form_payload() {
    let server = MockServer::start().await;
    let credential = credential(&server).await;

    Mock::given(method("PUT"))
        .and(path("/restapi/v2.1/accounts/A/settings"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Operation::put("settings", &ESIGN_V21)
        .form([("name", "Pat Signer"), ("locale", "en")])
        .execute_empty(&credential)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let put = requests.iter().find(|r| r.method.as_str() == "PUT").unwrap();
    assert_eq!(put.body, b"name=Pat+Signer&locale=en");
}

#[tokio::test]
async fn test_download_streams_body() {
    let server = MockServer::start().await;
    let credential = credential(&server).await;

    Mock::given(method("GET"))
        .and(path("/restapi/v2.1/accounts/A/envelopes/e-1/documents/combined"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .insert_header("content-disposition", "file; filename=\"combined.pdf\"")
                .set_body_bytes(b"%PDF-1.4 body".to_vec()),
        )
        .mount(&server)
        .await;

    let download = Operation::get("envelopes/{envelopeId}/documents/combined", &ESIGN_V21)
        .path_param("envelopeId", "e-1")
        .accept("application/pdf")
        .execute_download(&credential)
        .await
        .unwrap();

    assert_eq!(download.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(download.content_length, Some(13));
    assert_eq!(download.filename(), Some("combined.pdf"));

    let mut sink = Vec::new();
    download.write_to(&mut sink).await.unwrap();
    assert_eq!(sink, b"%PDF-1.4 body");
}

#[tokio::test]
async fn test_absolute_path_skips_account() {
    let server = MockServer::start().await;
    let credential = credential(&server).await;

    Mock::given(method("GET"))
        .and(path("/restapi/service_information"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"serviceVersions": []})))
        .expect(1)
        .mount(&server)
        .await;

    let _: Value = Operation::get("/service_information", &ESIGN_V21)
        .execute(&credential)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_version_with_dedicated_host_ignores_base_uri() {
    let server = MockServer::start().await;
    mount_user_info(&server, &server.uri(), 1).await;
    let proxy = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2.0/datasets/monitor/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&proxy)
        .await;

    // Monitor has its own host; only an explicit override redirects it.
    let credential = oauth_config(&server)
        .with_host_override(proxy.uri())
        .credential(valid_token("access-1"))
        .unwrap();

    let _: Value = Operation::get("datasets/monitor/stream", &MONITOR_V2)
        .execute(&credential)
        .await
        .unwrap();
}

#[derive(Default)]
struct Recorder(Mutex<Vec<CallLog>>);

struct SharedRecorder(Arc<Recorder>);

impl RequestLogger for SharedRecorder {
    fn log(&self, call: &CallLog) {
        self.0.0.lock().unwrap().push(call.clone());
    }
}

#[tokio::test]
async fn test_logged_credential_records_calls() {
    let server = MockServer::start().await;
    let recorder = Arc::new(Recorder::default());
    let credential = LoggedCredential::new(
        credential(&server).await,
        SharedRecorder(Arc::clone(&recorder)),
    );

    Mock::given(method("POST"))
        .and(path("/restapi/v2.1/accounts/A/envelopes"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorCode": "INVALID_REQUEST_BODY",
            "message": "bad envelope"
        })))
        .mount(&server)
        .await;

    let err = Operation::post("envelopes", &ESIGN_V21)
        .json(&json!({"status": "sent"}))
        .execute::<Value, _>(&credential)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api(_)));

    let calls = recorder.0.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.status.map(|s| s.as_u16()), Some(400));
    assert_eq!(
        call.url.as_ref().unwrap().path(),
        "/restapi/v2.1/accounts/A/envelopes"
    );
    assert_eq!(&call.request_body[..], br#"{"status":"sent"}"#);
    assert!(String::from_utf8_lossy(&call.response_body).contains("INVALID_REQUEST_BODY"));
}
