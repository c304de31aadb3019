//! HTTP handlers for bucket operations.
//! Parses S3-style requests, resolves the calling principal, and delegates
//! namespace and listing concerns to `BucketService`.

use crate::{
    errors::AppError,
    extract::{Path, Query, Utf8Body},
    models::bucket::{Bucket, CannedAcl},
    services::{
        bucket_service::BucketService,
        listing::{ListPage, ListRequest},
    },
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use futures::TryStreamExt;
use quick_xml::{Reader, events::Event};
use serde::Deserialize;

const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const ALL_USERS: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
const AUTHENTICATED_USERS: &str = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";
const AMZ_ACL: HeaderName = HeaderName::from_static("x-amz-acl");

/// Query params accepted by `GET /`.
#[derive(Debug, Default, Deserialize)]
pub struct ListBucketsQuery {
    pub prefix: Option<String>,
    #[serde(alias = "continuation-token")]
    pub cursor: Option<String>,
    #[serde(rename = "max-keys", alias = "max-buckets")]
    pub max_keys: Option<usize>,
}

/// Bucket subresources selected by the query string (`?acl`).
#[derive(Debug, Default, Deserialize)]
pub struct BucketSubresource {
    pub acl: Option<String>,
}

/// GET `/`: list the caller's buckets, supports ?prefix=&cursor=&max-keys=
///
/// Without `cursor` or `max-keys` every matching bucket is returned.
pub async fn list_buckets(
    State(service): State<BucketService>,
    headers: HeaderMap,
    Query(q): Query<ListBucketsQuery>,
) -> Result<Response, AppError> {
    let owner = principal(&headers).unwrap_or_else(|| service.default_owner().to_string());
    let cursor = q.cursor.filter(|c| !c.is_empty());
    let request = ListRequest {
        owner_id: Some(owner.clone()),
        prefix: q.prefix.clone(),
        cursor: cursor.clone(),
        page_size: q.max_keys,
    };

    let page = if cursor.is_none() && q.max_keys.is_none() {
        let buckets: Vec<Bucket> = service.stream_buckets(request).try_collect().await?;
        ListPage {
            buckets,
            next_cursor: None,
        }
    } else {
        service.list_buckets(&request).await?
    };

    let xml = build_list_all_my_buckets_xml(&owner, q.prefix.as_deref(), &page);
    Ok(xml_response(StatusCode::OK, xml))
}

/// PUT `/{bucket}`: create bucket, or replace its ACL with `?acl`.
///
/// The body may carry a `CreateBucketConfiguration` with a
/// `LocationConstraint`; an empty body uses the default region. An
/// `x-amz-acl` header sets the canned ACL (default `private`).
pub async fn put_bucket(
    State(service): State<BucketService>,
    Path(bucket): Path<String>,
    Query(sub): Query<BucketSubresource>,
    headers: HeaderMap,
    Utf8Body(body): Utf8Body,
) -> Result<Response, AppError> {
    if sub.acl.is_some() {
        return put_bucket_acl(&service, &bucket, &headers).await;
    }

    let owner = principal(&headers).unwrap_or_else(|| service.default_owner().to_string());
    let region = parse_location_constraint(&body)?;
    let acl = canned_acl(&headers)?.unwrap_or_default();

    let created = service
        .create_bucket_with_acl(&bucket, &owner, region.as_deref(), acl)
        .await?;

    let xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<CreateBucketResult xmlns="{}">"#,
            r#"<Location>/{}</Location>"#,
            r#"</CreateBucketResult>"#
        ),
        S3_XMLNS,
        xml_escape(&created.name)
    );
    let mut response = xml_response(StatusCode::OK, xml);
    if let Ok(location) = HeaderValue::from_str(&format!("/{}", created.name)) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

async fn put_bucket_acl(
    service: &BucketService,
    bucket: &str,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let Some(acl) = canned_acl(headers)? else {
        return Err(AppError::not_implemented(
            "only canned ACLs via the x-amz-acl header are supported",
        ));
    };
    service.set_bucket_acl(bucket, acl).await?;
    Ok(StatusCode::OK.into_response())
}

/// GET `/{bucket}?acl`: the bucket's ACL as an `AccessControlPolicy`.
///
/// Listing objects is not served here.
pub async fn get_bucket(
    State(service): State<BucketService>,
    Path(bucket): Path<String>,
    Query(sub): Query<BucketSubresource>,
) -> Result<Response, AppError> {
    if sub.acl.is_none() {
        return Err(AppError::not_implemented(
            "object listing is not supported; use ?acl",
        ));
    }

    let found = service.get_bucket(&bucket).await?;
    Ok(xml_response(StatusCode::OK, build_access_control_policy_xml(&found)))
}

/// HEAD `/{bucket}`: existence check; reports the region in a header.
pub async fn head_bucket(
    State(service): State<BucketService>,
    Path(bucket): Path<String>,
) -> Result<Response, AppError> {
    let found = service.get_bucket(&bucket).await?;

    let mut response = Response::new(Body::empty());
    if let Ok(region) = HeaderValue::from_str(&found.region) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-amz-bucket-region"), region);
    }
    Ok(response)
}

/// DELETE `/{bucket}`: delete an empty bucket.
pub async fn delete_bucket(
    State(service): State<BucketService>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT `/{bucket}/{*key}`: record an object.
///
/// Only metadata is kept. The size comes from `Content-Length`; the payload
/// is never read.
pub async fn put_object(
    State(service): State<BucketService>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let size_bytes = match headers.get(header::CONTENT_LENGTH) {
        None => 0,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n >= 0)
            .ok_or_else(|| AppError::invalid_argument("Content-Length is not a valid size"))?,
    };

    let record = service.put_object(&bucket, &key, size_bytes).await?;
    let mut response = StatusCode::OK.into_response();
    if let Ok(modified) = HeaderValue::from_str(&record.last_modified.to_rfc2822()) {
        response.headers_mut().insert(header::LAST_MODIFIED, modified);
    }
    Ok(response)
}

/// DELETE `/{bucket}/{*key}`: remove an object record.
pub async fn delete_object(
    State(service): State<BucketService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Canned ACL from `x-amz-acl`, if the header is present.
fn canned_acl(headers: &HeaderMap) -> Result<Option<CannedAcl>, AppError> {
    let Some(value) = headers.get(AMZ_ACL) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::invalid_argument("x-amz-acl is not valid ASCII"))?;
    Ok(Some(value.parse::<CannedAcl>()?))
}

/// Access key of the caller, taken from the `Authorization` header.
///
/// Understands SigV4 (`Credential=AKID/...`) and V2 (`AWS AKID:sig`).
/// Signatures are not verified here.
fn principal(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;

    if let Some(rest) = value.strip_prefix("AWS4-HMAC-SHA256") {
        let credential = rest
            .split(',')
            .map(str::trim)
            .find_map(|part| part.strip_prefix("Credential="))?;
        return credential
            .split('/')
            .next()
            .filter(|key| !key.is_empty())
            .map(str::to_string);
    }

    value
        .strip_prefix("AWS ")?
        .split(':')
        .next()
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// Pull `LocationConstraint` out of a `CreateBucketConfiguration` body.
fn parse_location_constraint(body: &str) -> Result<Option<String>, AppError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut inside = false;
    let mut constraint = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                inside = e.local_name().as_ref() == b"LocationConstraint";
            }
            Ok(Event::Text(text)) if inside => {
                let decoded = text
                    .decode()
                    .map_err(|err| AppError::malformed_xml(err.to_string()))?;
                constraint = Some(decoded.into_owned());
            }
            Ok(Event::End(_)) => inside = false,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(AppError::malformed_xml(err.to_string())),
        }
    }

    Ok(constraint.filter(|c| !c.is_empty()))
}

fn xml_response(status: StatusCode, xml: String) -> Response {
    let mut response = Response::new(Body::from(xml));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    *response.status_mut() = status;
    response
}

fn build_list_all_my_buckets_xml(owner: &str, prefix: Option<&str>, page: &ListPage) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListAllMyBucketsResult xmlns="{}">"#,
        S3_XMLNS
    );
    let owner = xml_escape(owner);
    xml.push_str(&format!(
        "<Owner><ID>{owner}</ID><DisplayName>{owner}</DisplayName></Owner>"
    ));

    xml.push_str("<Buckets>");
    for bucket in &page.buckets {
        xml.push_str("<Bucket>");
        xml.push_str(&format!("<Name>{}</Name>", xml_escape(&bucket.name)));
        xml.push_str(&format!(
            "<CreationDate>{}</CreationDate>",
            bucket
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        xml.push_str(&format!(
            "<BucketRegion>{}</BucketRegion>",
            xml_escape(&bucket.region)
        ));
        xml.push_str("</Bucket>");
    }
    xml.push_str("</Buckets>");

    if let Some(prefix) = prefix {
        xml.push_str(&format!("<Prefix>{}</Prefix>", xml_escape(prefix)));
    }
    xml.push_str(&format!(
        "<IsTruncated>{}</IsTruncated>",
        page.is_truncated()
    ));
    if let Some(next) = &page.next_cursor {
        xml.push_str(&format!(
            "<ContinuationToken>{}</ContinuationToken>",
            xml_escape(next)
        ));
    }

    xml.push_str("</ListAllMyBucketsResult>");
    xml
}

/// Expand a canned ACL into explicit grants: the owner always holds
/// `FULL_CONTROL`, groups get what the canned ACL adds.
fn build_access_control_policy_xml(bucket: &Bucket) -> String {
    let owner = xml_escape(&bucket.owner_id);
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><AccessControlPolicy xmlns="{}">"#,
        S3_XMLNS
    );
    xml.push_str(&format!(
        "<Owner><ID>{owner}</ID><DisplayName>{owner}</DisplayName></Owner>"
    ));
    xml.push_str("<AccessControlList>");
    xml.push_str(&format!(
        r#"<Grant><Grantee xmlns:xsi="{XSI_NS}" xsi:type="CanonicalUser"><ID>{owner}</ID><DisplayName>{owner}</DisplayName></Grantee><Permission>FULL_CONTROL</Permission></Grant>"#
    ));

    let group_grants: &[(&str, &str)] = match bucket.acl {
        CannedAcl::Private => &[],
        CannedAcl::PublicRead => &[(ALL_USERS, "READ")],
        CannedAcl::PublicReadWrite => &[(ALL_USERS, "READ"), (ALL_USERS, "WRITE")],
        CannedAcl::AuthenticatedRead => &[(AUTHENTICATED_USERS, "READ")],
    };
    for (uri, permission) in group_grants {
        xml.push_str(&format!(
            r#"<Grant><Grantee xmlns:xsi="{XSI_NS}" xsi:type="Group"><URI>{uri}</URI></Grantee><Permission>{permission}</Permission></Grant>"#
        ));
    }

    xml.push_str("</AccessControlList></AccessControlPolicy>");
    xml
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
