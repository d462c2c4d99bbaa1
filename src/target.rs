//! Target groups and the instance-to-target mapping.
//!
//! A [`TargetGroup`] is the unit handed to the file_sd sink: zero or more
//! `host:port` addresses plus a shared label set, keyed by a stable source
//! identifier (`ecs/<instance id>`). A group carrying only its source acts
//! as a tombstone: it tells the sink that a previously published source no
//! longer exists.

use std::collections::BTreeMap;

use crate::ecs::Instance;

pub const LABEL_INSTANCE_ID: &str = "__meta_ecs_instance_id";
pub const LABEL_INSTANCE_NAME: &str = "__meta_ecs_instance_name";
pub const LABEL_INSTANCE_TYPE: &str = "__meta_ecs_instance_type";
pub const LABEL_PRIVATE_IP: &str = "__meta_ecs_private_ip";
pub const LABEL_PUBLIC_IP: &str = "__meta_ecs_public_ip";
pub const LABEL_STATUS: &str = "__meta_ecs_status";
pub const LABEL_REGION_ID: &str = "__meta_ecs_region_id";
pub const LABEL_VPC_ID: &str = "__meta_ecs_vpc_id";
const LABEL_TAG_PREFIX: &str = "__meta_ecs_tag_";

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct TargetGroup {
    /// Diff key, not part of the serialized file_sd entry.
    #[serde(skip)]
    pub source: String,
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl TargetGroup {
    /// A retraction marker for a source that disappeared from the inventory.
    pub fn tombstone(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.targets.is_empty() && self.labels.is_empty()
    }
}

/// Replaces every character outside `[a-zA-Z0-9_]` with an underscore.
pub fn sanitize_label_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Maps one instance record to its target group.
#[derive(Debug, Clone, Copy)]
pub struct TargetBuilder {
    port: u16,
}

impl TargetBuilder {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Builds the target group for `instance`.
    ///
    /// An instance without a private IP address yields a group with only
    /// the source set. It still counts as present for diffing purposes but
    /// carries no address the sink could publish.
    pub fn build(&self, instance: &Instance) -> TargetGroup {
        let mut group = TargetGroup {
            source: format!("ecs/{}", instance.instance_id),
            ..TargetGroup::default()
        };

        let private_ips = &instance.vpc_attributes.private_ip_address.ip_address;
        let Some(private_ip) = private_ips.first() else {
            log::warn!(
                "instance `{}` has no private IP address, publishing no target for it",
                instance.instance_id
            );
            return group;
        };

        group.targets = vec![format!("{}:{}", private_ip, self.port)];

        let labels = &mut group.labels;
        labels.insert(LABEL_INSTANCE_ID.to_owned(), instance.instance_id.clone());
        labels.insert(
            LABEL_INSTANCE_NAME.to_owned(),
            instance.instance_name.clone(),
        );
        labels.insert(
            LABEL_INSTANCE_TYPE.to_owned(),
            instance.instance_type.clone(),
        );
        labels.insert(LABEL_PRIVATE_IP.to_owned(), private_ip.clone());
        labels.insert(LABEL_STATUS.to_owned(), instance.status.clone());
        labels.insert(LABEL_REGION_ID.to_owned(), instance.region_id.clone());
        labels.insert(
            LABEL_VPC_ID.to_owned(),
            instance.vpc_attributes.vpc_id.clone(),
        );

        if let Some(public_ip) = instance.public_ip_address.ip_address.first() {
            labels.insert(LABEL_PUBLIC_IP.to_owned(), public_ip.clone());
        }

        for tag in &instance.tags.tag {
            if tag.tag_key.is_empty() || tag.tag_value.is_empty() {
                continue;
            }
            let name = sanitize_label_name(&tag.tag_key);
            // Colliding sanitized keys resolve last-write-wins.
            labels.insert(
                format!("{LABEL_TAG_PREFIX}{name}"),
                tag.tag_value.clone(),
            );
        }

        group
    }
}
