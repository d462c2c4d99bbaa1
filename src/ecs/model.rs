//! Wire types for the Aliyun ECS `DescribeInstances` API.
//!
//! The API nests repeated elements one level deeper than usual JSON
//! (`Instances.Instance`, `Tags.Tag`, ...), so every list gets its own
//! wrapper struct. All fields default so partial responses still
//! deserialize.

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeInstancesResponse {
    pub request_id: String,
    pub total_count: u64,
    pub page_number: u64,
    pub page_size: u64,
    pub instances: InstanceList,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InstanceList {
    pub instance: Vec<Instance>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Instance {
    pub instance_id: String,
    pub instance_name: String,
    pub instance_type: String,
    pub status: String,
    pub region_id: String,
    pub vpc_attributes: VpcAttributes,
    pub public_ip_address: IpAddressList,
    pub tags: TagList,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VpcAttributes {
    pub vpc_id: String,
    pub private_ip_address: IpAddressList,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IpAddressList {
    pub ip_address: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TagList {
    pub tag: Vec<Tag>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Tag {
    pub tag_key: String,
    pub tag_value: String,
}

/// Error body returned by the API on a failed request.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiError {
    pub request_id: String,
    pub code: String,
    pub message: String,
}
