use std::future::Future;
use std::time::Duration;

use crate::config::{Filter, SdConfig};

use super::model::{ApiError, DescribeInstancesResponse, Instance};
use super::sign;

/// Fixed page size for inventory listing calls.
pub const PAGE_SIZE: u64 = 100;

const API_VERSION: &str = "2014-05-26";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to build HTTP client: {0}")]
    BuildClient(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("API error (status={status}, code={code}, request_id={request_id}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: String,
    },
    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Aliyun ECS inventory API.
///
/// Issues signed `DescribeInstances` calls against the configured region's
/// endpoint and aggregates paginated results into one flat instance list.
#[derive(Debug, Clone)]
pub struct EcsClient {
    http: reqwest::Client,
    endpoint: String,
    region: String,
    access_key: String,
    secret_key: String,
    filters: Vec<Filter>,
}

impl EcsClient {
    pub fn new(config: &SdConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::BuildClient)?;

        Ok(Self {
            http,
            endpoint: format!("https://ecs.{}.aliyuncs.com/", config.region),
            region: config.region.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            filters: config.filters.clone(),
        })
    }

    /// Issues one signed `DescribeInstances` call for the given page.
    async fn describe_instances(&self, page_number: u64) -> Result<DescribeInstancesResponse> {
        let mut params = vec![
            ("Action".to_owned(), "DescribeInstances".to_owned()),
            ("Version".to_owned(), API_VERSION.to_owned()),
            ("Format".to_owned(), "JSON".to_owned()),
            ("AccessKeyId".to_owned(), self.access_key.clone()),
            ("SignatureMethod".to_owned(), "HMAC-SHA1".to_owned()),
            ("SignatureVersion".to_owned(), "1.0".to_owned()),
            (
                "SignatureNonce".to_owned(),
                uuid::Uuid::new_v4().to_string(),
            ),
            (
                "Timestamp".to_owned(),
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ),
            ("RegionId".to_owned(), self.region.clone()),
            ("PageNumber".to_owned(), page_number.to_string()),
            ("PageSize".to_owned(), PAGE_SIZE.to_string()),
        ];
        params.extend(filter_params(&self.filters));

        let query = sign::signed_query(&params, &self.secret_key);
        let url = format!("{}?{}", self.endpoint, query);

        let response = self.http.get(&url).send().await.map_err(Error::Http)?;
        let status = response.status();
        let body = response.bytes().await.map_err(Error::Http)?;

        decode_response(status, &body)
    }
}

/// Decodes one listing response body.
///
/// The API reports failures both through the HTTP status and, for some
/// error classes (throttling, signature problems), through an error body
/// under a 200. Either shape yields [`Error::Api`]; the error body is
/// recognized by its non-empty `Code`.
fn decode_response(
    status: reqwest::StatusCode,
    body: &[u8],
) -> Result<DescribeInstancesResponse> {
    let api_error: ApiError = serde_json::from_slice(body).unwrap_or_default();
    if !status.is_success() || !api_error.code.is_empty() {
        return Err(Error::Api {
            status: status.as_u16(),
            code: api_error.code,
            message: api_error.message,
            request_id: api_error.request_id,
        });
    }

    serde_json::from_slice(body).map_err(Error::Decode)
}

/// One page of the paginated inventory listing.
///
/// Factored out of [`EcsClient`] so pagination can be exercised without an
/// HTTP endpoint.
pub(crate) trait DescribePage {
    fn describe_page(
        &self,
        page_number: u64,
    ) -> impl Future<Output = Result<DescribeInstancesResponse>> + Send;
}

impl DescribePage for EcsClient {
    async fn describe_page(&self, page_number: u64) -> Result<DescribeInstancesResponse> {
        self.describe_instances(page_number).await
    }
}

impl crate::discovery::InstanceLister for EcsClient {
    async fn list_instances(&self) -> Result<Vec<Instance>> {
        fetch_all_instances(self).await
    }
}

/// Fetches every page of the listing and aggregates the records.
///
/// The first page supplies the total record count; `ceil(total / PAGE_SIZE)`
/// determines how many further pages to request. Any page error fails the
/// whole listing, discarding partial results.
pub(crate) async fn fetch_all_instances<C>(client: &C) -> Result<Vec<Instance>>
where
    C: DescribePage + Sync,
{
    let first = client.describe_page(1).await?;
    let pages = first.total_count.div_ceil(PAGE_SIZE);

    let mut instances = first.instances.instance;
    for page_number in 2..=pages {
        let response = client.describe_page(page_number).await?;
        instances.extend(response.instances.instance);
    }

    Ok(instances)
}

/// Translates the configured filters into query parameters.
///
/// `Status` overrides the hardcoded `Running` default; results are always
/// restricted to VPC-networked instances. Tag filters decompose into
/// discrete `Tag.N.Key`/`Tag.N.Value` entries.
fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut status = "Running".to_owned();
    let mut tags = Vec::new();

    for filter in filters {
        match filter.name.as_str() {
            "InstanceIds" => params.push(("InstanceIds".to_owned(), filter.value.clone())),
            "Status" => status = filter.value.clone(),
            // A later Tag filter replaces an earlier one wholesale.
            "Tag" => tags = split_tag(&filter.value),
            "InstanceName" => params.push(("InstanceName".to_owned(), filter.value.clone())),
            other => log::warn!("ignoring unrecognized filter `{other}`"),
        }
    }

    for (n, (key, value)) in tags.into_iter().enumerate() {
        params.push((format!("Tag.{}.Key", n + 1), key));
        params.push((format!("Tag.{}.Value", n + 1), value));
    }
    params.push(("Status".to_owned(), status));
    params.push(("InstanceNetworkType".to_owned(), "vpc".to_owned()));
    params
}

/// Decomposes a tag filter value of the form `k1:v1,k2:v2` into key/value
/// pairs. Segments that are not exactly one colon-separated pair are
/// silently dropped.
pub fn split_tag(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|segment| {
            let mut parts = segment.split(':');
            let key = parts.next()?;
            let value = parts.next()?;
            if parts.next().is_some() {
                return None;
            }
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}
