//! Azure Blob Storage over the REST API with SharedKey authentication

use async_trait::async_trait;
use base64::Engine;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::{Client, Method, StatusCode, Url};

use crate::error::{Error, Result};

use super::BlobStore;

const API_VERSION: &str = "2021-08-06";

/// Fields of an Azure storage connection string
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionString {
    pub account_name: String,
    pub account_key: String,
    /// Blob service base URL, no trailing slash
    pub blob_endpoint: String,
}

impl ConnectionString {
    /// Parse `Key=Value;...`. `BlobEndpoint` wins over
    /// `DefaultEndpointsProtocol` + `EndpointSuffix`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut account_name = None;
        let mut account_key = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut blob_endpoint = None;

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim() {
                "AccountName" => account_name = Some(value),
                "AccountKey" => account_key = Some(value),
                "DefaultEndpointsProtocol" => protocol = value,
                "EndpointSuffix" => suffix = value,
                "BlobEndpoint" => blob_endpoint = Some(value),
                _ => {}
            }
        }

        let account_name = account_name
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Config("Connection string is missing AccountName".to_string()))?;
        let account_key = account_key
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Config("Connection string is missing AccountKey".to_string()))?;
        let blob_endpoint = blob_endpoint
            .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, account_name, suffix))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            account_name,
            account_key,
            blob_endpoint,
        })
    }
}

/// HMAC-SHA256 request signer
struct SharedKey {
    account: String,
    key: ring::hmac::Key,
}

impl SharedKey {
    fn new(account: &str, account_key: &str) -> Result<Self> {
        let secret = base64::engine::general_purpose::STANDARD
            .decode(account_key)
            .map_err(|e| Error::Config(format!("AccountKey is not valid base64: {}", e)))?;
        Ok(Self {
            account: account.to_string(),
            key: ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &secret),
        })
    }

    fn authorization(&self, method: &Method, url: &Url, headers: &HeaderMap) -> String {
        let to_sign = string_to_sign(&self.account, method, url, headers);
        let signature = ring::hmac::sign(&self.key, to_sign.as_bytes());
        format!(
            "SharedKey {}:{}",
            self.account,
            base64::engine::general_purpose::STANDARD.encode(signature.as_ref())
        )
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// The SharedKey string-to-sign for blob service version 2015-02-21 and later
fn string_to_sign(account: &str, method: &Method, url: &Url, headers: &HeaderMap) -> String {
    let content_length = match header(headers, &CONTENT_LENGTH) {
        "0" => "",
        other => other,
    };

    let mut ms_headers: Vec<(String, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| (name.as_str().to_lowercase(), value.to_str().unwrap_or_default().trim()))
        .collect();
    ms_headers.sort();
    let canonical_headers: String = ms_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    let mut canonical_resource = format!("/{}{}", account, url.path());
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect();
    params.sort();
    for (key, value) in params {
        canonical_resource.push_str(&format!("\n{}:{}", key, value));
    }

    [
        method.as_str(),
        header(headers, &reqwest::header::CONTENT_ENCODING),
        header(headers, &reqwest::header::CONTENT_LANGUAGE),
        content_length,
        "",
        header(headers, &CONTENT_TYPE),
        "",
        header(headers, &reqwest::header::IF_MODIFIED_SINCE),
        header(headers, &reqwest::header::IF_MATCH),
        header(headers, &IF_NONE_MATCH),
        header(headers, &reqwest::header::IF_UNMODIFIED_SINCE),
        header(headers, &reqwest::header::RANGE),
    ]
    .join("\n")
        + "\n"
        + &canonical_headers
        + &canonical_resource
}

/// A container in one storage account
pub struct AzureBlobStore {
    client: Client,
    signer: SharedKey,
    endpoint: String,
    container: String,
}

impl AzureBlobStore {
    /// Parse the connection string and make sure the container exists
    pub async fn connect(connection_string: &str, container: &str) -> Result<Self> {
        let parsed = ConnectionString::parse(connection_string)?;
        let store = Self {
            client: Client::new(),
            signer: SharedKey::new(&parsed.account_name, &parsed.account_key)?,
            endpoint: parsed.blob_endpoint,
            container: container.to_string(),
        };
        store.ensure_container().await?;
        tracing::info!("Azure Blob Storage initialized (container: {})", store.container);
        Ok(store)
    }

    async fn ensure_container(&self) -> Result<()> {
        let url = self.container_url(&[("restype", "container")])?;
        let response = self.send(Method::PUT, url, HeaderMap::new(), None).await?;
        match response.status() {
            status if status.is_success() => {
                tracing::info!("Created Azure Blob Storage container: {}", self.container);
                Ok(())
            }
            StatusCode::CONFLICT => {
                tracing::debug!("Azure Blob Storage container already exists: {}", self.container);
                Ok(())
            }
            status => Err(failure("create container", status, response).await),
        }
    }

    fn container_url(&self, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("Invalid blob endpoint {}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid blob endpoint {}", self.endpoint)))?
            .pop_if_empty()
            .push(&self.container);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn blob_url(&self, name: &str) -> Result<Url> {
        if name.trim().is_empty() {
            return Err(Error::BadRequest("Blob name is empty".to_string()));
        }
        let mut url = self.container_url(&[])?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid blob endpoint {}", self.endpoint)))?
            .extend(name.split('/'));
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        mut headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response> {
        let now = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert("x-ms-date", header_value(&now)?);
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        let length = body.as_ref().map_or(0, Vec::len);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

        let authorization = self.signer.authorization(&method, &url, &headers);
        headers.insert(reqwest::header::AUTHORIZATION, header_value(&authorization)?);

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|e| Error::storage(format!("Azure Blob Storage unreachable: {}", e)))
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::internal(format!("Invalid header value: {}", e)))
}

async fn failure(action: &str, status: StatusCode, response: reqwest::Response) -> Error {
    let body = response.text().await.unwrap_or_default();
    // Error bodies are not always XML; the status alone is enough then
    let code = xml_values(&body, "Code")
        .ok()
        .and_then(|codes| codes.into_iter().next())
        .unwrap_or_default();
    Error::storage(format!("Failed to {}: {} {}", action, status, code).trim_end().to_string())
}

/// Unescaped text of every `<tag>` element, in document order
fn xml_values(xml: &str, tag: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let tag = tag.as_bytes();

    let mut values = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == tag => {
                current = Some(String::new());
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == tag => {
                values.push(String::new());
            }
            Ok(Event::Text(e)) => {
                if let Some(value) = current.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::storage(format!("Invalid XML text: {}", e)))?;
                    value.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(value) = current.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == tag => {
                if let Some(value) = current.take() {
                    values.push(value);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::storage(format!(
                    "Malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }
    Ok(values)
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn upload_bytes(&self, name: &str, data: &[u8], overwrite: bool) -> Result<()> {
        let url = self.blob_url(name)?;
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        if !overwrite {
            headers.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));
        }

        let response = self.send(Method::PUT, url, headers, Some(data.to_vec())).await?;
        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::CONFLICT && !overwrite {
                return Err(Error::storage(format!("Blob already exists: {}", name)));
            }
            return Err(failure("upload blob", status, response).await);
        }
        tracing::info!(
            "Uploaded {} bytes to Azure Blob Storage: {}/{}",
            data.len(),
            self.container,
            name
        );
        Ok(())
    }

    async fn download_bytes(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let url = self.blob_url(name)?;
        let response = self.send(Method::GET, url, HeaderMap::new(), None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            status => Err(failure("download blob", status, response).await),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let url = self.blob_url(name)?;
        let response = self.send(Method::HEAD, url, HeaderMap::new(), None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(failure("check blob", status, response).await),
        }
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let url = self.blob_url(name)?;
        let response = self.send(Method::DELETE, url, HeaderMap::new(), None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => {
                tracing::info!("Deleted blob {}/{}", self.container, name);
                Ok(true)
            }
            status => Err(failure("delete blob", status, response).await),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker = String::new();

        loop {
            let mut query = vec![("restype", "container"), ("comp", "list")];
            if !prefix.is_empty() {
                query.push(("prefix", prefix));
            }
            if !marker.is_empty() {
                query.push(("marker", marker.as_str()));
            }
            let url = self.container_url(&query)?;

            let response = self.send(Method::GET, url, HeaderMap::new(), None).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(failure("list blobs", status, response).await);
            }
            let body = response.text().await?;
            names.extend(xml_values(&body, "Name")?);

            match xml_values(&body, "NextMarker")?.into_iter().find(|m| !m.is_empty()) {
                Some(next) => marker = next,
                None => break,
            }
        }
        Ok(names)
    }

    fn name(&self) -> &str {
        "azure-blob"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "secret" base64-encoded
    const KEY: &str = "c2VjcmV0";

    #[test]
    fn test_parse_connection_string() {
        let parsed = ConnectionString::parse(&format!(
            "DefaultEndpointsProtocol=https;AccountName=rfpstore;AccountKey={};EndpointSuffix=core.windows.net",
            KEY
        ))
        .unwrap();
        assert_eq!(parsed.account_name, "rfpstore");
        assert_eq!(parsed.account_key, KEY);
        assert_eq!(parsed.blob_endpoint, "https://rfpstore.blob.core.windows.net");
    }

    #[test]
    fn test_blob_endpoint_override() {
        let parsed = ConnectionString::parse(&format!(
            "AccountName=devstoreaccount1;AccountKey={};BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1/",
            KEY
        ))
        .unwrap();
        assert_eq!(parsed.blob_endpoint, "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(ConnectionString::parse("AccountName=x").is_err());
        assert!(ConnectionString::parse(&format!("AccountKey={}", KEY)).is_err());
        assert!(ConnectionString::parse("").is_err());
    }

    #[test]
    fn test_string_to_sign() {
        let url = Url::parse("https://acct.blob.core.windows.net/docs?restype=container&comp=list&prefix=docx/").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert("x-ms-date", HeaderValue::from_static("Mon, 01 Jan 2024 00:00:00 GMT"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(0usize));

        let expected = "GET\n\n\n\n\n\n\n\n\n\n\n\n\
                        x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
                        x-ms-version:2021-08-06\n\
                        /acct/docs\ncomp:list\nprefix:docx/\nrestype:container";
        assert_eq!(string_to_sign("acct", &Method::GET, &url, &headers), expected);
    }

    #[test]
    fn test_string_to_sign_put_with_conditions() {
        let url = Url::parse("https://acct.blob.core.windows.net/docs/a%20b.docx").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(5usize));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));

        let signed = string_to_sign("acct", &Method::PUT, &url, &headers);
        let lines: Vec<&str> = signed.lines().collect();
        assert_eq!(lines[0], "PUT");
        assert_eq!(lines[3], "5");
        assert_eq!(lines[5], "application/octet-stream");
        assert_eq!(lines[9], "*");
        assert_eq!(lines[12], "x-ms-blob-type:BlockBlob");
        assert_eq!(lines[13], "/acct/docs/a%20b.docx");
    }

    #[test]
    fn test_authorization_header_shape() {
        let signer = SharedKey::new("acct", KEY).unwrap();
        let url = Url::parse("https://acct.blob.core.windows.net/docs").unwrap();
        let auth = signer.authorization(&Method::GET, &url, &HeaderMap::new());
        let signature = auth.strip_prefix("SharedKey acct:").unwrap();
        assert_eq!(
            base64::engine::general_purpose::STANDARD.decode(signature).unwrap().len(),
            32
        );
        assert!(SharedKey::new("acct", "not base64!").is_err());
    }

    #[test]
    fn test_xml_values() {
        let xml = "<EnumerationResults><Blobs><Blob><Name>docx/a&amp;b.docx</Name></Blob>\
                   <Blob><Name>docx/c.docx</Name></Blob></Blobs><NextMarker>m2</NextMarker></EnumerationResults>";
        assert_eq!(xml_values(xml, "Name").unwrap(), vec!["docx/a&b.docx", "docx/c.docx"]);
        assert_eq!(xml_values(xml, "NextMarker").unwrap(), vec!["m2"]);
        assert_eq!(
            xml_values("<Error><Code>ContainerAlreadyExists</Code></Error>", "Code").unwrap(),
            vec!["ContainerAlreadyExists"]
        );
    }

    #[test]
    fn test_xml_values_character_references() {
        let xml = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
                   <EnumerationResults ContainerName=\"https://acct.blob.core.windows.net/docs\">\
                   <Blobs><Blob><Name>docx/O&#39;Brien&#x20;bid.docx</Name></Blob></Blobs>\
                   <NextMarker /></EnumerationResults>";
        assert_eq!(xml_values(xml, "Name").unwrap(), vec!["docx/O'Brien bid.docx"]);
        assert_eq!(xml_values(xml, "NextMarker").unwrap(), vec![String::new()]);
    }

    #[test]
    fn test_xml_values_malformed() {
        assert!(matches!(
            xml_values("<Blobs><Name>a</Blobs>", "Name"),
            Err(Error::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_storage_error() {
        let result = AzureBlobStore::connect(
            &format!("AccountName=acct;AccountKey={};BlobEndpoint=http://127.0.0.1:1", KEY),
            "docs",
        )
        .await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }
}
