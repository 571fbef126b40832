//! Terraform state parser.
//!
//! Reads a `.tfstate` JSON document (state format v4) and maps managed
//! resources onto graph nodes, with `depends_on` edges taken from each
//! instance's recorded dependencies. Cross-resource references resolve
//! through an address map built in a first pass, so edges only point at
//! nodes this state actually owns.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Deserialize;

use atlas_core::{Edge, EdgeType, Node, NodeType};

use crate::error::{Result, ScanError};
use crate::parser::{ParseResult, SourceParser};
use crate::scanner::ScanOptions;

const SOURCE: &str = "terraform";

/// Attribute keys copied into node metadata when present.
const METADATA_KEYS: &[&str] = &[
    "id",
    "arn",
    "region",
    "instance_type",
    "engine",
    "private_ip",
    "public_ip",
    "ip_address",
    "dns_name",
    "cidr_block",
    "host",
];

#[derive(Deserialize)]
struct TfState {
    #[serde(default)]
    resources: Vec<TfResource>,
}

#[derive(Deserialize)]
struct TfResource {
    #[serde(default)]
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    instances: Vec<TfInstance>,
}

#[derive(Deserialize)]
struct TfInstance {
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    dependencies: Vec<String>,
}

pub struct TerraformStateParser;

#[async_trait]
impl SourceParser for TerraformStateParser {
    fn name(&self) -> &str {
        SOURCE
    }

    fn supported(&self, path: &str) -> bool {
        path.ends_with(".tfstate") || path.ends_with(".tfstate.json")
    }

    async fn parse(&self, path: &str, _options: &ScanOptions) -> Result<ParseResult> {
        let raw = tokio::fs::read_to_string(path).await?;
        parse_state(path, &raw)
    }
}

fn parse_state(path: &str, raw: &str) -> Result<ParseResult> {
    let state: TfState =
        serde_json::from_str(raw).map_err(|e| ScanError::Parse(format!("{path}: {e}")))?;

    let mut result = ParseResult::default();

    // First pass: the address map, so dependency references resolve even
    // when they point at resources declared later in the file.
    let mut address_to_id: HashMap<String, String> = HashMap::new();
    for resource in &state.resources {
        if resource.mode != "managed" {
            continue;
        }
        let Some(node_type) = map_resource_type(&resource.resource_type) else {
            continue;
        };
        let address = format!("{}.{}", resource.resource_type, resource.name);
        address_to_id.insert(
            address,
            Node::make_id(SOURCE, node_type, &resource.name),
        );
    }

    for resource in &state.resources {
        if resource.mode != "managed" {
            continue;
        }
        let Some(node_type) = map_resource_type(&resource.resource_type) else {
            result.warnings.push(format!(
                "unmapped resource type {} ({}.{})",
                resource.resource_type, resource.resource_type, resource.name
            ));
            continue;
        };

        let mut node = Node::new(SOURCE, node_type, &resource.name);
        node.source_file = path.to_string();
        node.provider = provider_label(&resource.provider);
        node.metadata = collect_metadata(resource.instances.first());
        result.nodes.push(node);

        let from_id = Node::make_id(SOURCE, node_type, &resource.name);
        for instance in &resource.instances {
            for dependency in &instance.dependencies {
                match address_to_id.get(dependency) {
                    Some(to_id) => {
                        result
                            .edges
                            .push(Edge::new(&from_id, EdgeType::DependsOn, to_id));
                    }
                    None => result.warnings.push(format!(
                        "{from_id}: dependency {dependency} not in this state"
                    )),
                }
            }
        }
    }

    // Re-discovery of the same pair from multiple instances.
    result.edges.sort_by(|a, b| a.id.cmp(&b.id));
    result.edges.dedup_by(|a, b| a.id == b.id);

    Ok(result)
}

/// Map a Terraform resource type onto an asset kind.
fn map_resource_type(resource_type: &str) -> Option<NodeType> {
    let node_type = match resource_type {
        "aws_instance" | "google_compute_instance" | "azurerm_virtual_machine" => NodeType::Vm,
        "aws_db_instance" | "google_sql_database_instance" => NodeType::Database,
        "aws_dynamodb_table" | "google_firestore_database" => NodeType::NosqlDb,
        "aws_s3_bucket" | "google_storage_bucket" => NodeType::Bucket,
        "aws_lb" | "aws_elb" | "google_compute_forwarding_rule" => NodeType::LoadBalancer,
        "aws_route53_record" | "google_dns_record_set" => NodeType::DnsRecord,
        "aws_acm_certificate" | "google_compute_ssl_certificate" => NodeType::Certificate,
        "aws_security_group" | "google_compute_firewall" => NodeType::FirewallRule,
        "aws_vpc" | "google_compute_network" => NodeType::Network,
        "aws_subnet" | "google_compute_subnetwork" => NodeType::Subnet,
        "aws_eip" | "google_compute_address" => NodeType::Ip,
        "aws_sqs_queue" => NodeType::Queue,
        "aws_sns_topic" | "google_pubsub_topic" => NodeType::Pubsub,
        "aws_iam_policy" | "google_project_iam_policy" => NodeType::IamPolicy,
        "aws_iam_group" => NodeType::IamGroup,
        "aws_kms_key" | "google_kms_crypto_key" => NodeType::KmsKey,
        "aws_iam_role" | "google_service_account" => NodeType::ServiceAccount,
        "aws_cloudfront_distribution" => NodeType::Cdn,
        "aws_ebs_volume" | "google_compute_disk" => NodeType::Disk,
        "aws_lambda_function" | "google_cloudfunctions_function" => NodeType::Function,
        "aws_api_gateway_rest_api" | "google_api_gateway_api" => NodeType::ApiGateway,
        _ => return None,
    };
    Some(node_type)
}

/// `provider["registry.terraform.io/hashicorp/aws"]` → `aws`.
fn provider_label(provider: &str) -> String {
    provider
        .rsplit('/')
        .next()
        .unwrap_or(provider)
        .trim_end_matches("\"]")
        .to_string()
}

fn collect_metadata(instance: Option<&TfInstance>) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    let Some(instance) = instance else {
        return metadata;
    };

    for key in METADATA_KEYS {
        if let Some(value) = instance.attributes.get(*key).and_then(|v| v.as_str()) {
            if !value.is_empty() {
                metadata.insert((*key).to_string(), value.to_string());
            }
        }
    }
    metadata
}
