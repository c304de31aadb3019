use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use bucket_store::{
    routes,
    services::{
        bucket_service::BucketService,
        metadata_store::{MetadataStore, StoreOptions},
        namespace::NamespaceManager,
    },
};
use http_body_util::BodyExt;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    service: BucketService,
    router: Router,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("buckets.db").display());
    let store = MetadataStore::connect(&url, &StoreOptions::default())
        .await
        .unwrap();
    store.migrate().await.unwrap();

    let service = BucketService::new(
        store,
        NamespaceManager::new(Duration::from_secs(30)),
        "local",
        "local",
    );
    let router = routes::routes::routes().with_state(service.clone());
    TestApp {
        _dir: dir,
        service,
        router,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str) -> Response {
        self.send_as(method, uri, None, Body::empty()).await
    }

    async fn send_as(
        &self,
        method: &str,
        uri: &str,
        access_key: Option<&str>,
        body: Body,
    ) -> Response {
        let auth = access_key.map(|key| {
            format!(
                "AWS4-HMAC-SHA256 Credential={key}/20250101/us-east-1/s3/aws4_request, \
                 SignedHeaders=host, Signature=00"
            )
        });
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| ("authorization", value))
            .into_iter()
            .collect();
        self.send_with(method, uri, &headers, body).await
    }

    async fn send_with(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Body,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn error_code(response: Response) -> String {
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    json["code"].as_str().unwrap().to_string()
}

fn bucket_names(xml: &str) -> Vec<String> {
    xml.split("<Name>")
        .skip(1)
        .filter_map(|chunk| chunk.split("</Name>").next())
        .map(str::to_string)
        .collect()
}

fn continuation_token(xml: &str) -> Option<String> {
    let start = xml.find("<ContinuationToken>")? + "<ContinuationToken>".len();
    let end = xml[start..].find("</ContinuationToken>")? + start;
    Some(xml[start..end].to_string())
}

#[tokio::test]
async fn pages_through_three_buckets() {
    let app = test_app().await;
    for name in ["alpha", "beta", "gamma"] {
        assert_eq!(app.send("PUT", &format!("/{name}")).await.status(), StatusCode::OK);
    }

    let first = app.send("GET", "/?max-keys=2").await;
    assert_eq!(first.status(), StatusCode::OK);
    let xml = body_text(first).await;
    assert_eq!(bucket_names(&xml), ["alpha", "beta"]);
    assert!(xml.contains("<IsTruncated>true</IsTruncated>"));
    let token = continuation_token(&xml).expect("truncated page carries a cursor");

    let second = app
        .send("GET", &format!("/?max-keys=2&cursor={token}"))
        .await;
    let xml = body_text(second).await;
    assert_eq!(bucket_names(&xml), ["gamma"]);
    assert!(xml.contains("<IsTruncated>false</IsTruncated>"));
    assert!(continuation_token(&xml).is_none());
}

#[tokio::test]
async fn unpaged_listing_returns_everything_in_order() {
    let app = test_app().await;
    for name in ["zulu", "mike", "alpha", "kilo"] {
        app.send("PUT", &format!("/{name}")).await;
    }

    let xml = body_text(app.send("GET", "/").await).await;
    assert_eq!(bucket_names(&xml), ["alpha", "kilo", "mike", "zulu"]);

    let again = body_text(app.send("GET", "/").await).await;
    assert_eq!(bucket_names(&again), bucket_names(&xml));
}

#[tokio::test]
async fn prefix_and_continuation_token_alias() {
    let app = test_app().await;
    for name in ["logs-a", "logs-b", "logs-c", "media"] {
        app.send("PUT", &format!("/{name}")).await;
    }

    let xml = body_text(app.send("GET", "/?prefix=logs-&max-buckets=2").await).await;
    assert_eq!(bucket_names(&xml), ["logs-a", "logs-b"]);
    assert!(xml.contains("<Prefix>logs-</Prefix>"));
    let token = continuation_token(&xml).unwrap();

    let xml = body_text(
        app.send("GET", &format!("/?prefix=logs-&continuation-token={token}"))
            .await,
    )
    .await;
    assert_eq!(bucket_names(&xml), ["logs-c"]);
}

#[tokio::test]
async fn duplicate_create_is_conflict() {
    let app = test_app().await;
    let created = app
        .send_as("PUT", "/photos", Some("ALICE"), Body::empty())
        .await;
    assert_eq!(created.status(), StatusCode::OK);
    assert_eq!(created.headers()[header::LOCATION], "/photos");

    let theirs = app
        .send_as("PUT", "/photos", Some("BOB"), Body::empty())
        .await;
    assert_eq!(theirs.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(theirs).await, "BucketAlreadyExists");

    let again = app
        .send_as("PUT", "/photos", Some("ALICE"), Body::empty())
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(again).await, "BucketAlreadyOwnedByYou");
}

#[tokio::test]
async fn invalid_name_is_bad_request() {
    let app = test_app().await;
    let response = app.send("PUT", "/Bad_Bucket").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "InvalidBucketName");

    let response = app.send("PUT", "/-leading").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_lifecycle() {
    let app = test_app().await;
    let missing = app.send("DELETE", "/ghost").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(missing).await, "NoSuchBucket");

    app.send("PUT", "/temp").await;
    assert_eq!(app.send("HEAD", "/temp").await.status(), StatusCode::OK);
    assert_eq!(
        app.send("DELETE", "/temp").await.status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(app.send("HEAD", "/temp").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_of_non_empty_bucket_is_refused() {
    let app = test_app().await;
    app.send("PUT", "/data").await;
    let recorded = app
        .send_with(
            "PUT",
            "/data/results/run-1.parquet",
            &[("content-length", "1024")],
            Body::from(vec![0u8; 1024]),
        )
        .await;
    assert_eq!(recorded.status(), StatusCode::OK);
    assert!(recorded.headers().contains_key(header::LAST_MODIFIED));

    let response = app.send("DELETE", "/data").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await, "BucketNotEmpty");
    assert_eq!(app.send("HEAD", "/data").await.status(), StatusCode::OK);

    assert_eq!(
        app.send("DELETE", "/data/results/run-1.parquet")
            .await
            .status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        app.send("DELETE", "/data").await.status(),
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn object_records_report_missing_keys_and_buckets() {
    let app = test_app().await;
    let response = app.send("PUT", "/ghost/key.txt").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, "NoSuchBucket");

    app.send("PUT", "/present").await;
    let response = app.send("DELETE", "/present/missing.txt").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, "NoSuchKey");

    let response = app
        .send_with(
            "PUT",
            "/present/sized.bin",
            &[("content-length", "not-a-number")],
            Body::empty(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "InvalidArgument");
}

#[tokio::test]
async fn canned_acl_is_set_read_and_replaced() {
    let app = test_app().await;
    let created = app
        .send_with(
            "PUT",
            "/site",
            &[("x-amz-acl", "public-read")],
            Body::empty(),
        )
        .await;
    assert_eq!(created.status(), StatusCode::OK);

    let xml = body_text(app.send("GET", "/site?acl").await).await;
    assert!(xml.contains("<AccessControlPolicy"));
    assert!(xml.contains("groups/global/AllUsers"));

    let replaced = app
        .send_with("PUT", "/site?acl", &[("x-amz-acl", "private")], Body::empty())
        .await;
    assert_eq!(replaced.status(), StatusCode::OK);
    let xml = body_text(app.send("GET", "/site?acl").await).await;
    assert!(!xml.contains("AllUsers"));
    assert!(xml.contains("<Permission>FULL_CONTROL</Permission>"));

    let bad = app
        .send_with(
            "PUT",
            "/site?acl",
            &[("x-amz-acl", "everyone-everything")],
            Body::empty(),
        )
        .await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(bad).await, "InvalidArgument");

    let missing = app.send("GET", "/nowhere?acl").await;
    assert_eq!(error_code(missing).await, "NoSuchBucket");

    let listing = app.send("GET", "/site").await;
    assert_eq!(listing.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn listing_is_scoped_to_the_caller() {
    let app = test_app().await;
    app.send_as("PUT", "/alice-logs", Some("ALICE"), Body::empty())
        .await;
    app.send_as("PUT", "/bob-logs", Some("BOB"), Body::empty())
        .await;

    let response = app.send_as("GET", "/", Some("ALICE"), Body::empty()).await;
    let xml = body_text(response).await;
    assert_eq!(bucket_names(&xml), ["alice-logs"]);
    assert!(xml.contains("<ID>ALICE</ID>"));

    // Names stay globally unique across owners.
    let clash = app
        .send_as("PUT", "/alice-logs", Some("BOB"), Body::empty())
        .await;
    assert_eq!(clash.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn location_constraint_sets_region() {
    let app = test_app().await;
    let body = r#"<CreateBucketConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
        <LocationConstraint>us-west-2</LocationConstraint>
    </CreateBucketConfiguration>"#;
    let created = app
        .send_as("PUT", "/west-bucket", None, Body::from(body))
        .await;
    assert_eq!(created.status(), StatusCode::OK);

    let head = app.send("HEAD", "/west-bucket").await;
    assert_eq!(head.headers()["x-amz-bucket-region"], "us-west-2");

    let moon = "<CreateBucketConfiguration>\
                <LocationConstraint>moon-1</LocationConstraint>\
                </CreateBucketConfiguration>";
    let bad = app
        .send_as("PUT", "/moon-bucket", None, Body::from(moon))
        .await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(bad).await, "InvalidLocationConstraint");
}

#[tokio::test]
async fn undecodable_query_values_are_invalid_argument() {
    let app = test_app().await;
    for uri in ["/?max-keys=abc", "/?max-keys=-1", "/?max-buckets=1.5"] {
        let response = app.send("GET", uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json",
            "{uri}"
        );
        assert_eq!(error_code(response).await, "InvalidArgument", "{uri}");
    }
}

#[tokio::test]
async fn non_utf8_create_body_is_malformed_xml() {
    let app = test_app().await;
    let response = app
        .send_as("PUT", "/okbucket", None, Body::from(vec![0xff_u8, 0xfe]))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "MalformedXML");
    assert_eq!(app.send("HEAD", "/okbucket").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_failure_is_internal_error() {
    let app = test_app().await;
    app.service.store.db.close().await;

    let response = app.send("PUT", "/unlucky").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(response).await, "InternalError");
    assert_eq!(app.service.namespace.in_flight(), 0);

    let ready = app.send("GET", "/readyz").await;
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn bad_cursor_is_bad_request() {
    let app = test_app().await;
    let response = app.send("GET", "/?cursor=%21%21").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "InvalidArgument");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_puts_of_one_name_admit_one() {
    let app = test_app().await;
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let router = app.router.clone();
            tokio::spawn(async move {
                let request = Request::builder()
                    .method("PUT")
                    .uri("/contested")
                    .body(Body::empty())
                    .unwrap();
                router.oneshot(request).await.unwrap().status()
            })
        })
        .collect();

    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await.unwrap());
    }
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::CONFLICT)
            .count(),
        9
    );
}

#[tokio::test]
async fn health_endpoints_answer() {
    let app = test_app().await;
    assert_eq!(app.send("GET", "/healthz").await.status(), StatusCode::OK);

    let ready = app.send("GET", "/readyz").await;
    assert_eq!(ready.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(ready).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["in_flight_reservations"], 0);
}
